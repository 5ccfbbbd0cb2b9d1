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

//! Telemetry parsing and derived peripheral state.
//!
//! The peripheral firmware reports its readings as free-form text lines.
//! This module turns those lines into a [`DerivedState`] plus the domain
//! events worth persisting.

mod parser;

pub use parser::{DerivedState, Mode, RawLine, TelemetryParser, TelemetryRules, TelemetryUpdate};

/// Command that switches the actuator on.
pub const ACTUATOR_ON_COMMAND: &str = "LED_ON";

/// Command that switches the actuator off.
pub const ACTUATOR_OFF_COMMAND: &str = "LED_OFF";

/// Outbound command literal for the requested actuator state.
pub fn actuator_command(on: bool) -> &'static str {
    if on {
        ACTUATOR_ON_COMMAND
    } else {
        ACTUATOR_OFF_COMMAND
    }
}
