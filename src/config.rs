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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::{PeripheralAddress, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RFCOMM_CHANNEL};
use crate::panel::DEFAULT_HISTORY_PAGE;
use crate::telemetry::TelemetryRules;

const APP_DIR: &str = "iot-hub";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the event log.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Event history settings.
    pub history: HistoryConfig,

    /// Telemetry markers understood by the parser.
    pub telemetry: TelemetryRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Peripheral used when none is given on the command line.
    pub default_address: Option<String>,

    /// RFCOMM channel of the serial port service.
    pub rfcomm_channel: u8,

    /// Bound on the connect handshake, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            default_address: None,
            rfcomm_channel: DEFAULT_RFCOMM_CHANNEL,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl BluetoothConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn default_address(&self) -> Option<PeripheralAddress> {
        self.default_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(PeripheralAddress::new)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Persist events to disk.
    pub enabled: bool,

    /// Events shown per history replay.
    pub page_size: u32,

    /// Maximum number of stored events.
    pub max_entries: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: DEFAULT_HISTORY_PAGE,
            max_entries: 10000,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = config_dir();
        std::fs::create_dir_all(&config_dir)?;

        let mut config = Self::load_from(&config_dir.join("config.toml"))?;

        // Set data directory
        config.data_dir = data_dir();
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Load from `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {:?}", path))?;
            toml::from_str(&content).with_context(|| format!("parsing {:?}", path))
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_written_on_first_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.bluetooth.rfcomm_channel, 1);
        assert_eq!(config.history.page_size, 20);
        assert_eq!(config.telemetry, TelemetryRules::default());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[bluetooth]\ndefault_address = \"00:11:22:33:44:55\"\n\n[telemetry]\nsensor_label = \"Light:\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.bluetooth.default_address(),
            Some(PeripheralAddress::new("00:11:22:33:44:55"))
        );
        assert_eq!(config.bluetooth.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.telemetry.sensor_label, "Light:");
        assert_eq!(config.telemetry.dark_marker, "Auto: OSCURO");
        assert!(config.history.enabled);
    }
}
