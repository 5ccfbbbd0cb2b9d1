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

//! Control panel: the user-facing operations of a session.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bluetooth::{ConnectionManager, PeripheralAddress};
use crate::events::{DomainEvent, EventProcessor};
use crate::storage::{EventLog, StoredEvent};
use crate::telemetry::actuator_command;

/// Default number of events replayed by [`ControlPanel::load_history`].
pub const DEFAULT_HISTORY_PAGE: u32 = 20;

/// Drives one peripheral session on behalf of the user.
pub struct ControlPanel {
    manager: ConnectionManager,
    processor: Arc<EventProcessor>,
    log: Arc<dyn EventLog>,
    history_page: u32,
}

impl ControlPanel {
    pub fn new(
        manager: ConnectionManager,
        processor: Arc<EventProcessor>,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            manager,
            processor,
            log,
            history_page: DEFAULT_HISTORY_PAGE,
        }
    }

    pub fn with_history_page(mut self, page: u32) -> Self {
        self.history_page = page;
        self
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub async fn connect(&self, address: PeripheralAddress) {
        self.manager.connect(address).await;
    }

    /// Close the session and clear its derived state.
    pub async fn disconnect(&self) {
        self.manager.cancel().await;
        let state = self.processor.state();
        if let Some(device) = state.get_device() {
            info!("Disconnected from {}", device);
        }
        state.set_disconnected();
        self.processor.presenter().status(state.get_status());
    }

    /// Switch the actuator and record the command.
    ///
    /// Returns `false` when not connected; nothing is recorded then.
    pub fn set_actuator(&self, on: bool) -> bool {
        if !self.manager.send(actuator_command(on)) {
            self.processor.presenter().notify("Not connected");
            return false;
        }
        info!("Actuator commanded {}", if on { "on" } else { "off" });
        self.processor.record(DomainEvent::ActuatorCommanded { on });
        true
    }

    /// Send free text from the console.
    ///
    /// Blank input is ignored. Sent text is echoed locally and recorded.
    pub fn send_console(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if !self.manager.send(text) {
            self.processor.presenter().notify("Not connected");
            return false;
        }

        self.processor.presenter().console(&format!("[App] {}", text));
        self.processor.record(DomainEvent::ConsoleCommandSent {
            text: text.to_string(),
        });
        true
    }

    /// Latest page of the event log, oldest first.
    pub fn load_history(&self) -> Result<Vec<StoredEvent>> {
        let mut events = self.log.recent(self.history_page)?;
        events.reverse();
        debug!("Loaded {} history entries", events.len());
        Ok(events)
    }

    /// Replay the latest page of history on the console.
    pub fn show_history(&self) {
        let presenter = self.processor.presenter();
        match self.load_history() {
            Ok(events) if events.is_empty() => presenter.console("No history found"),
            Ok(events) => {
                for event in events {
                    presenter.console(&event.display_line());
                }
            }
            Err(e) => presenter.console(&format!("Failed to load history: {}", e)),
        }
    }
}
