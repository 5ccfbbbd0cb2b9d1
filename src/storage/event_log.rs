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

//! Append-only event log.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::events::LogRecord;

/// A persisted event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: Value,
}

impl StoredEvent {
    /// One console line for history replay.
    pub fn display_line(&self) -> String {
        format!(
            "{} - type: {}, data: {}",
            self.timestamp.with_timezone(&Local).format("%d/%m %H:%M:%S"),
            self.event_type,
            self.data
        )
    }
}

/// Durable sink for domain events.
///
/// Timestamps are assigned by the log when a record is appended.
pub trait EventLog: Send + Sync {
    fn append(&self, record: &LogRecord) -> Result<()>;

    /// Most recent events, newest first.
    fn recent(&self, limit: u32) -> Result<Vec<StoredEvent>>;
}

/// Event log backed by SQLite.
#[derive(Clone)]
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
    max_entries: u32,
}

impl SqliteEventLog {
    /// Create or open the event database in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {:?}", data_dir))?;
        let db_path = data_dir.join("events.db");
        info!("Opening event log: {:?}", db_path);

        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, mainly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries: 10000,
        })
    }

    /// Set maximum number of entries to keep.
    pub fn with_max_entries(mut self, max: u32) -> Self {
        self.max_entries = max;
        self
    }

    /// Get total entry count.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove old entries beyond max_entries.
    fn cleanup_old_entries(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "DELETE FROM events WHERE id NOT IN (
                SELECT id FROM events ORDER BY timestamp DESC, id DESC LIMIT ?1
            )",
            [self.max_entries],
        )?;
        Ok(())
    }
}

impl EventLog for SqliteEventLog {
    fn append(&self, record: &LogRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        let conn = self.conn.lock();
        let timestamp = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO events (timestamp, event_type, data) VALUES (?1, ?2, ?3)",
            params![timestamp, record.event_type, data],
        )?;

        self.cleanup_old_entries(&conn)?;

        Ok(())
    }

    fn recent(&self, limit: u32) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_type, data
             FROM events
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, millis, event_type, data)| -> Result<StoredEvent> {
                let timestamp = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| anyhow!("event {} has invalid timestamp {}", id, millis))?;
                let data = serde_json::from_str(&data)
                    .with_context(|| format!("event {} has malformed data", id))?;
                Ok(StoredEvent {
                    id,
                    timestamp,
                    event_type,
                    data,
                })
            })
            .collect()
    }
}

/// Volatile event log, used when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<StoredEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, oldest first.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().clone()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, record: &LogRecord) -> Result<()> {
        let mut events = self.events.lock();
        let id = events.len() as i64 + 1;
        events.push(StoredEvent {
            id,
            timestamp: Utc::now(),
            event_type: record.event_type.to_string(),
            data: Value::Object(record.data.clone()),
        });
        Ok(())
    }

    fn recent(&self, limit: u32) -> Result<Vec<StoredEvent>> {
        let events = self.events.lock();
        Ok(events.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DomainEvent;
    use crate::telemetry::Mode;
    use tempfile::tempdir;

    #[test]
    fn test_event_log_basic() {
        let dir = tempdir().unwrap();
        let log = SqliteEventLog::new(dir.path()).unwrap();

        log.append(&DomainEvent::ActuatorCommanded { on: true }.to_record())
            .unwrap();
        log.append(
            &DomainEvent::ModeChanged {
                mode: Mode::Dark,
                sensor_value: Some(512),
            }
            .to_record(),
        )
        .unwrap();

        let events = log.recent(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "CAMBIO_DE_LUZ");
        assert_eq!(events[0].data["valor_ldr"], 512);
        assert_eq!(events[1].event_type, "ACCION_LED");
        assert_eq!(events[1].data["estado"], "ENCENDIDO");
    }

    #[test]
    fn test_recent_is_bounded() {
        let log = SqliteEventLog::in_memory().unwrap();
        for i in 0..5 {
            log.append(
                &DomainEvent::ConsoleCommandSent {
                    text: format!("cmd{}", i),
                }
                .to_record(),
            )
            .unwrap();
        }

        let events = log.recent(3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data["comando"], "cmd4");
        assert_eq!(events[2].data["comando"], "cmd2");
    }

    #[test]
    fn test_max_entries_cleanup() {
        let log = SqliteEventLog::in_memory().unwrap().with_max_entries(2);
        for on in [true, false, true] {
            log.append(&DomainEvent::ActuatorCommanded { on }.to_record())
                .unwrap();
        }
        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn test_memory_log_newest_first() {
        let log = MemoryEventLog::new();
        log.append(&DomainEvent::ActuatorCommanded { on: true }.to_record())
            .unwrap();
        log.append(&DomainEvent::ActuatorCommanded { on: false }.to_record())
            .unwrap();

        let recent = log.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].data["estado"], "APAGADO");
        assert_eq!(log.events().len(), 2);
    }
}
