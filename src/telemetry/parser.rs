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

//! Line parser for the peripheral's text telemetry.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::events::DomainEvent;

/// One newline-delimited record read from the peripheral, terminator excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(String);

impl RawLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Decode a record as read off the wire.
    ///
    /// Strips the trailing `\n` and an optional `\r`. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        Self(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Light mode reported by the peripheral's automatic controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Unknown,
    Dark,
    Light,
}

impl Mode {
    /// Label used in persisted event records.
    pub fn record_label(&self) -> &'static str {
        match self {
            Mode::Unknown => "Desconocido",
            Mode::Dark => "Oscuro",
            Mode::Light => "Claro",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Unknown => "unknown",
            Mode::Dark => "dark",
            Mode::Light => "light",
        };
        f.write_str(s)
    }
}

/// Current understanding of the peripheral's sensor and actuator status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedState {
    pub sensor_value: Option<i64>,
    pub actuator_on: bool,
    pub mode: Mode,
}

/// Text markers the firmware uses in its telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRules {
    /// Label preceding the sensor reading.
    pub sensor_label: String,

    /// Tokens that terminate the sensor reading. The earliest match wins.
    pub value_delimiters: Vec<String>,

    /// Automatic-mode annotation meaning "dark".
    pub dark_marker: String,

    /// Automatic-mode annotation meaning "light".
    pub light_marker: String,

    /// Phrases reporting the actuator switched on.
    pub actuator_on_markers: Vec<String>,

    /// Phrases reporting the actuator switched off.
    pub actuator_off_markers: Vec<String>,
}

impl Default for TelemetryRules {
    fn default() -> Self {
        Self {
            sensor_label: "Luz:".to_string(),
            value_delimiters: vec![" ->".to_string(), " |".to_string()],
            dark_marker: "Auto: OSCURO".to_string(),
            light_marker: "Auto: HAY LUZ".to_string(),
            actuator_on_markers: vec![
                "(LED ON)".to_string(),
                "MANUAL: LED ENCENDIDO".to_string(),
            ],
            actuator_off_markers: vec![
                "(LED OFF)".to_string(),
                "MANUAL: LED APAGADO".to_string(),
            ],
        }
    }
}

/// Result of applying one line to the prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryUpdate {
    pub state: DerivedState,
    pub events: Vec<DomainEvent>,
    /// A sensor reading was found on the line.
    pub sensor_changed: bool,
    /// An actuator marker was found; the indicator needs a refresh.
    pub actuator_changed: bool,
}

/// Stateless parser; the state it tracks is passed in and returned.
#[derive(Debug, Clone, Default)]
pub struct TelemetryParser {
    rules: TelemetryRules,
}

impl TelemetryParser {
    pub fn new(rules: TelemetryRules) -> Self {
        Self { rules }
    }

    /// Apply one line to `prior`.
    ///
    /// The sensor, mode and actuator rules are evaluated independently
    /// against the same line. Lines matching none of them leave the state
    /// untouched and produce no events.
    pub fn apply(&self, prior: &DerivedState, line: &RawLine) -> TelemetryUpdate {
        let text = line.as_str();
        let mut state = prior.clone();
        let mut events = Vec::new();

        let reading = self.sensor_value(text);
        if let Some(value) = reading {
            state.sensor_value = Some(value);
        }

        // Mode is compared against the last recorded mode, so repeated
        // annotations of the same mode stay silent.
        if let Some(mode) = self.mode(text) {
            if mode != state.mode {
                state.mode = mode;
                events.push(DomainEvent::ModeChanged {
                    mode,
                    sensor_value: state.sensor_value,
                });
            }
        }

        let actuator = self.actuator(text);
        if let Some(on) = actuator {
            state.actuator_on = on;
        }

        TelemetryUpdate {
            state,
            events,
            sensor_changed: reading.is_some(),
            actuator_changed: actuator.is_some(),
        }
    }

    fn sensor_value(&self, text: &str) -> Option<i64> {
        let label = self.rules.sensor_label.as_str();
        if label.is_empty() {
            return None;
        }

        let start = text.find(label)? + label.len();
        let rest = &text[start..];
        let end = self
            .rules
            .value_delimiters
            .iter()
            .filter(|d| !d.is_empty())
            .filter_map(|d| rest.find(d.as_str()))
            .min()
            .unwrap_or(rest.len());

        // Anything after the number (units, annotations) is ignored.
        let field = rest[..end].trim();
        let token = field.split_whitespace().next().unwrap_or_default();

        match token.parse::<i64>() {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Ignoring unparsable sensor value '{}' in '{}': {}", field, text, e);
                None
            }
        }
    }

    fn mode(&self, text: &str) -> Option<Mode> {
        if contains_marker(text, &self.rules.dark_marker) {
            Some(Mode::Dark)
        } else if contains_marker(text, &self.rules.light_marker) {
            Some(Mode::Light)
        } else {
            None
        }
    }

    fn actuator(&self, text: &str) -> Option<bool> {
        if contains_any(text, &self.rules.actuator_on_markers) {
            Some(true)
        } else if contains_any(text, &self.rules.actuator_off_markers) {
            Some(false)
        } else {
            None
        }
    }
}

fn contains_marker(text: &str, marker: &str) -> bool {
    !marker.is_empty() && text.contains(marker)
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| contains_marker(text, m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(prior: &DerivedState, line: &str) -> TelemetryUpdate {
        TelemetryParser::default().apply(prior, &RawLine::new(line))
    }

    #[test]
    fn test_sensor_and_mode_on_one_line() {
        let update = apply(&DerivedState::default(), "Luz: 512 -> Auto: OSCURO");

        assert_eq!(update.state.sensor_value, Some(512));
        assert_eq!(update.state.mode, Mode::Dark);
        assert_eq!(
            update.events,
            vec![DomainEvent::ModeChanged {
                mode: Mode::Dark,
                sensor_value: Some(512),
            }]
        );
        assert!(update.sensor_changed);
        assert!(!update.actuator_changed);
    }

    #[test]
    fn test_mode_is_debounced() {
        let first = apply(&DerivedState::default(), "Auto: OSCURO");
        let second = apply(&first.state, "Auto: OSCURO");
        assert_eq!(first.events.len(), 1);
        assert!(second.events.is_empty());

        let third = apply(&second.state, "Auto: HAY LUZ");
        assert_eq!(
            third.events,
            vec![DomainEvent::ModeChanged {
                mode: Mode::Light,
                sensor_value: None,
            }]
        );
        assert_eq!(third.state.mode, Mode::Light);
    }

    #[test]
    fn test_mode_event_uses_known_sensor_value() {
        let reading = apply(&DerivedState::default(), "Luz: 40");
        let update = apply(&reading.state, "Auto: HAY LUZ");
        assert_eq!(
            update.events,
            vec![DomainEvent::ModeChanged {
                mode: Mode::Light,
                sensor_value: Some(40),
            }]
        );
    }

    #[test]
    fn test_manual_echo_sets_actuator_without_event() {
        let update = apply(&DerivedState::default(), "MANUAL: LED ENCENDIDO");
        assert!(update.state.actuator_on);
        assert!(update.actuator_changed);
        assert!(update.events.is_empty());

        let update = apply(&update.state, "MANUAL: LED APAGADO");
        assert!(!update.state.actuator_on);
        assert!(update.actuator_changed);
    }

    #[test]
    fn test_automatic_annotation_sets_actuator() {
        let prior = DerivedState {
            actuator_on: true,
            ..Default::default()
        };
        let update = apply(&prior, "Luz: 830 -> Auto: HAY LUZ (LED OFF)");
        assert_eq!(update.state.sensor_value, Some(830));
        assert_eq!(update.state.mode, Mode::Light);
        assert!(!update.state.actuator_on);
        assert_eq!(update.events.len(), 1);
    }

    #[test]
    fn test_garbage_is_ignored() {
        let prior = DerivedState {
            sensor_value: Some(7),
            actuator_on: true,
            mode: Mode::Dark,
        };
        let update = apply(&prior, "garbage");
        assert_eq!(update.state, prior);
        assert!(update.events.is_empty());
        assert!(!update.sensor_changed);
        assert!(!update.actuator_changed);
    }

    #[test]
    fn test_unparsable_value_is_absorbed() {
        let update = apply(&DerivedState::default(), "Luz: abc -> Auto: OSCURO");
        assert_eq!(update.state.sensor_value, None);
        assert!(!update.sensor_changed);
        // Mode detection does not depend on the reading.
        assert_eq!(update.state.mode, Mode::Dark);
        assert_eq!(
            update.events,
            vec![DomainEvent::ModeChanged {
                mode: Mode::Dark,
                sensor_value: None,
            }]
        );
    }

    #[test]
    fn test_value_delimiters_and_modifiers() {
        let prior = DerivedState::default();
        assert_eq!(apply(&prior, "Luz: 300 | Auto: OSCURO").state.sensor_value, Some(300));
        assert_eq!(apply(&prior, "Luz: 301").state.sensor_value, Some(301));
        assert_eq!(apply(&prior, "Luz:302 (raw) -> x").state.sensor_value, Some(302));
        assert_eq!(apply(&prior, "Luz: -5 -> x").state.sensor_value, Some(-5));
        assert_eq!(apply(&prior, "Luz: -> x").state.sensor_value, None);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let prior = DerivedState::default();
        let line = RawLine::new("Luz: 99 -> Auto: OSCURO (LED ON)");
        let parser = TelemetryParser::default();
        assert_eq!(parser.apply(&prior, &line), parser.apply(&prior, &line));
    }

    #[test]
    fn test_raw_line_from_bytes() {
        assert_eq!(RawLine::from_bytes(b"Luz: 1\r\n").as_str(), "Luz: 1");
        assert_eq!(RawLine::from_bytes(b"plain\n").as_str(), "plain");
        assert_eq!(RawLine::from_bytes(b"tail").as_str(), "tail");
        assert_eq!(RawLine::from_bytes(b"bad \xff\n").as_str(), "bad \u{fffd}");
    }
}
