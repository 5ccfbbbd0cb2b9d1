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

//! Known-device listing from the BlueZ adapter.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::transport::PeripheralAddress;

/// A device the user can pick as connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub name: String,
    pub address: PeripheralAddress,
    pub paired: bool,
}

/// Source of selectable peripherals.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn devices(&self) -> Result<Vec<KnownDevice>>;
}

/// Devices BlueZ already knows about on the default adapter.
pub struct BluezDirectory {
    adapter: bluer::Adapter,
}

impl BluezDirectory {
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        // Ensure adapter is powered on
        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self { adapter })
    }
}

#[async_trait]
impl DeviceDirectory for BluezDirectory {
    async fn devices(&self) -> Result<Vec<KnownDevice>> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await? {
            let device = self.adapter.device(addr)?;
            let name = device.alias().await.unwrap_or_else(|_| addr.to_string());
            let paired = device.is_paired().await.unwrap_or(false);
            devices.push(KnownDevice {
                name,
                address: addr.into(),
                paired,
            });
        }

        // Paired devices first, then by name.
        devices.sort_by(|a, b| b.paired.cmp(&a.paired).then_with(|| a.name.cmp(&b.name)));
        Ok(devices)
    }
}
