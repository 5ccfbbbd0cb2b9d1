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

//! Domain events and connection event processing.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{ConnectionEvent, ConnectionEvents, ConnectionState, PeripheralAddress};
use crate::state::AppState;
use crate::storage::EventLog;
use crate::telemetry::{Mode, RawLine, TelemetryParser};
use crate::ui::Presenter;

/// A discrete, loggable occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A connection to the peripheral was established.
    Connected { address: PeripheralAddress },
    /// A connection attempt or an established session failed.
    ConnectionFailed { reason: String },
    /// The user switched the actuator.
    ActuatorCommanded { on: bool },
    /// The peripheral's automatic mode flipped.
    ModeChanged {
        mode: Mode,
        sensor_value: Option<i64>,
    },
    /// Free text was sent from the console.
    ConsoleCommandSent { text: String },
}

/// Record handed to the event log. The log assigns the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub event_type: &'static str,
    pub data: Map<String, Value>,
}

impl DomainEvent {
    /// Record type, as stored in the event log.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Connected { .. } => "CONEXION_EXITOSA",
            DomainEvent::ConnectionFailed { .. } => "CONEXION_FALLIDA",
            DomainEvent::ActuatorCommanded { .. } => "ACCION_LED",
            DomainEvent::ModeChanged { .. } => "CAMBIO_DE_LUZ",
            DomainEvent::ConsoleCommandSent { .. } => "COMANDO_CONSOLA",
        }
    }

    pub fn to_record(&self) -> LogRecord {
        let data = match self {
            DomainEvent::Connected { address } => json!({ "deviceAddress": address.as_str() }),
            DomainEvent::ConnectionFailed { reason } => json!({ "motivo": reason }),
            DomainEvent::ActuatorCommanded { on } => {
                json!({ "estado": if *on { "ENCENDIDO" } else { "APAGADO" } })
            }
            DomainEvent::ModeChanged { mode, sensor_value } => json!({
                "nuevo_estado": mode.record_label(),
                "valor_ldr": sensor_value,
            }),
            DomainEvent::ConsoleCommandSent { text } => json!({ "comando": text }),
        };

        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        LogRecord {
            event_type: self.event_type(),
            data,
        }
    }
}

/// Consumes connection events: parses telemetry, updates shared state,
/// renders through the presenter and persists domain events.
pub struct EventProcessor {
    parser: TelemetryParser,
    state: Arc<AppState>,
    log: Arc<dyn EventLog>,
    presenter: Arc<dyn Presenter>,
}

impl EventProcessor {
    pub fn new(
        parser: TelemetryParser,
        state: Arc<AppState>,
        log: Arc<dyn EventLog>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            parser,
            state,
            log,
            presenter,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Process a single event.
    pub fn process_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting { address } => {
                info!("Connecting to {}", address);
                self.state.set_status(ConnectionState::Connecting);
                self.presenter.status(ConnectionState::Connecting);
            }
            ConnectionEvent::Connected { address } => {
                info!("Connected to {}", address);
                // Derived state belongs to a single session
                self.state.set_connected(address.clone());
                self.presenter.status(ConnectionState::Connected);
                self.record(DomainEvent::Connected { address });
            }
            ConnectionEvent::Failed { reason } => {
                warn!("Connection failed: {}", reason);
                self.state.set_status(ConnectionState::Failed);
                self.presenter.status(ConnectionState::Failed);
                self.presenter.notify(&format!("Connection failed: {}", reason));
                self.record(DomainEvent::ConnectionFailed { reason });
            }
            ConnectionEvent::LineReceived(line) => self.handle_line(&line),
        }
    }

    /// Drain events until the channel closes.
    pub async fn run(&self, mut events: ConnectionEvents) {
        while let Some(event) = events.recv().await {
            self.process_event(event);
        }
        debug!("Connection event channel closed");
    }

    fn handle_line(&self, line: &RawLine) {
        debug!("Received: {}", line);
        self.presenter.console(line.as_str());

        let update = self.state.update_derived(|prior| {
            let update = self.parser.apply(prior, line);
            (update.state.clone(), update)
        });

        if update.sensor_changed {
            if let Some(value) = update.state.sensor_value {
                self.presenter.sensor(value);
            }
        }
        if update.actuator_changed {
            self.presenter.actuator(update.state.actuator_on);
        }
        for event in update.events {
            self.record(event);
        }
    }

    /// Persist a domain event, reporting the outcome on the console.
    pub fn record(&self, event: DomainEvent) {
        let record = event.to_record();
        match self.log.append(&record) {
            Ok(()) => {
                debug!("Saved event {}", record.event_type);
                self.presenter
                    .console(&format!("[log] Event '{}' saved", record.event_type));
            }
            Err(e) => {
                error!("Failed to save event {}: {:#}", record.event_type, e);
                self.presenter.console(&format!(
                    "[log] Failed to save event '{}': {}",
                    record.event_type, e
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_mapping() {
        let record = DomainEvent::ModeChanged {
            mode: Mode::Dark,
            sensor_value: Some(512),
        }
        .to_record();
        assert_eq!(record.event_type, "CAMBIO_DE_LUZ");
        assert_eq!(record.data["nuevo_estado"], "Oscuro");
        assert_eq!(record.data["valor_ldr"], 512);

        let record = DomainEvent::ModeChanged {
            mode: Mode::Light,
            sensor_value: None,
        }
        .to_record();
        assert_eq!(record.data["nuevo_estado"], "Claro");
        assert!(record.data["valor_ldr"].is_null());
    }

    #[test]
    fn test_command_records() {
        let record = DomainEvent::ActuatorCommanded { on: false }.to_record();
        assert_eq!(record.event_type, "ACCION_LED");
        assert_eq!(record.data["estado"], "APAGADO");

        let record = DomainEvent::ConsoleCommandSent {
            text: "PING".to_string(),
        }
        .to_record();
        assert_eq!(record.event_type, "COMANDO_CONSOLA");
        assert_eq!(record.data["comando"], "PING");

        let record = DomainEvent::Connected {
            address: PeripheralAddress::new("00:11:22:33:44:55"),
        }
        .to_record();
        assert_eq!(record.event_type, "CONEXION_EXITOSA");
        assert_eq!(record.data["deviceAddress"], "00:11:22:33:44:55");
    }
}
