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

//! IoT Hub desktop application

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iot_hub::bluetooth::{
    event_channel, BluezDirectory, ConnectionManager, DeviceDirectory, PeripheralAddress,
    RfcommTransport,
};
use iot_hub::config::Config;
use iot_hub::events::EventProcessor;
use iot_hub::panel::ControlPanel;
use iot_hub::state::AppState;
use iot_hub::storage::{EventLog, MemoryEventLog, SqliteEventLog};
use iot_hub::telemetry::TelemetryParser;
use iot_hub::ui::{Presenter, TerminalPresenter};

#[derive(Debug, Parser)]
#[command(name = "iot-hub", version, about = "Bluetooth serial companion for IoT Hub peripherals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List devices known to the Bluetooth adapter
    Devices,
    /// Print the latest page of the event log
    History,
    /// Open an interactive session with a peripheral
    Connect {
        /// Peripheral address; falls back to bluetooth.default_address
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("iot_hub=info".parse()?))
        .init();

    info!("Starting IoT Hub v{}...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let log: Arc<dyn EventLog> = if config.history.enabled {
        Arc::new(SqliteEventLog::new(&config.data_dir)?.with_max_entries(config.history.max_entries))
    } else {
        Arc::new(MemoryEventLog::new())
    };

    match cli.command {
        Some(Command::Devices) => list_devices().await,
        Some(Command::History) => {
            let mut events = log.recent(config.history.page_size)?;
            events.reverse();
            if events.is_empty() {
                println!("No history found");
            }
            for event in events {
                println!("{}", event.display_line());
            }
            Ok(())
        }
        Some(Command::Connect { address }) => {
            let address = address
                .map(PeripheralAddress::new)
                .or_else(|| config.bluetooth.default_address())
                .ok_or_else(|| anyhow!("no peripheral address given and none configured"))?;
            run_session(&config, log, address).await
        }
        None => match config.bluetooth.default_address() {
            Some(address) => run_session(&config, log, address).await,
            None => list_devices().await,
        },
    }
}

async fn list_devices() -> Result<()> {
    let directory = BluezDirectory::new().await?;
    let devices = directory.devices().await?;
    if devices.is_empty() {
        println!("No devices found");
    }
    for device in devices {
        let marker = if device.paired { "*" } else { " " };
        println!("{} {}  {}", marker, device.address, device.name);
    }
    Ok(())
}

async fn run_session(config: &Config, log: Arc<dyn EventLog>, address: PeripheralAddress) -> Result<()> {
    let state = AppState::new();
    let presenter: Arc<dyn Presenter> = Arc::new(TerminalPresenter::new());
    let processor = Arc::new(EventProcessor::new(
        TelemetryParser::new(config.telemetry.clone()),
        state,
        Arc::clone(&log),
        presenter,
    ));

    let (event_tx, event_rx) = event_channel();
    let transport = Arc::new(RfcommTransport::new(config.bluetooth.rfcomm_channel));
    let manager = ConnectionManager::new(transport, event_tx)
        .with_connect_timeout(config.bluetooth.connect_timeout());
    let panel = ControlPanel::new(manager, Arc::clone(&processor), log)
        .with_history_page(config.history.page_size);

    // Handle connection events
    let processor_events = Arc::clone(&processor);
    let events_task = tokio::spawn(async move {
        processor_events.run(event_rx).await;
    });

    panel.connect(address).await;
    println!("Commands: on, off, history, quit; anything else is sent as-is");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "on" => { panel.set_actuator(true); }
                    "off" => { panel.set_actuator(false); }
                    "history" => panel.show_history(),
                    "quit" | "exit" => break,
                    text => { panel.send_console(text); }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    panel.disconnect().await;
    drop(panel);
    let _ = events_task.await;

    info!("IoT Hub stopped");
    Ok(())
}
