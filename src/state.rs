// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application state management.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::{ConnectionState, PeripheralAddress};
use crate::telemetry::DerivedState;

/// Shared application state, read by the presentation layer.
#[derive(Debug, Default)]
pub struct AppState {
    /// Connection status as last reported by the connection manager.
    pub connection_status: RwLock<ConnectionState>,

    /// Connected peripheral.
    pub connected_device: RwLock<Option<PeripheralAddress>>,

    /// Telemetry-derived peripheral state for the current session.
    pub derived: RwLock<DerivedState>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a new session as connected and reset its derived state.
    pub fn set_connected(&self, address: PeripheralAddress) {
        *self.connection_status.write() = ConnectionState::Connected;
        *self.connected_device.write() = Some(address);
        *self.derived.write() = DerivedState::default();
    }

    /// Mark the session as closed and discard its derived state.
    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionState::Idle;
        *self.connected_device.write() = None;
        *self.derived.write() = DerivedState::default();
    }

    pub fn set_status(&self, status: ConnectionState) {
        *self.connection_status.write() = status;
    }

    pub fn get_status(&self) -> ConnectionState {
        *self.connection_status.read()
    }

    pub fn get_device(&self) -> Option<PeripheralAddress> {
        self.connected_device.read().clone()
    }

    pub fn get_derived(&self) -> DerivedState {
        self.derived.read().clone()
    }

    /// Replace the derived state under a single write lock.
    pub fn update_derived<R>(&self, f: impl FnOnce(&DerivedState) -> (DerivedState, R)) -> R {
        let mut derived = self.derived.write();
        let (next, result) = f(&derived);
        *derived = next;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Mode;

    #[test]
    fn test_new_session_resets_derived_state() {
        let state = AppState::new();
        state.update_derived(|_| {
            (
                DerivedState {
                    sensor_value: Some(10),
                    actuator_on: true,
                    mode: Mode::Dark,
                },
                (),
            )
        });

        state.set_connected(PeripheralAddress::new("AA:BB:CC:DD:EE:FF"));
        assert_eq!(state.get_status(), ConnectionState::Connected);
        assert_eq!(state.get_derived(), DerivedState::default());

        state.set_disconnected();
        assert_eq!(state.get_status(), ConnectionState::Idle);
        assert!(state.get_device().is_none());
    }
}
