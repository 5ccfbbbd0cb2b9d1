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

//! Transport seam and the BlueZ RFCOMM implementation.

use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::Address;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};
use uuid::Uuid;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel the peripheral serves SPP on.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Stable identifier of a peripheral, usually a MAC-style address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Address> for PeripheralAddress {
    fn from(address: Address) -> Self {
        Self(address.to_string())
    }
}

/// Errors raised while opening a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address cannot be resolved to a device.
    #[error("invalid peripheral address '{0}'")]
    InvalidAddress(String),
    /// The handshake did not complete in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
    /// The peripheral refused the connection or is busy.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        address: PeripheralAddress,
        #[source]
        source: std::io::Error,
    },
}

/// Bidirectional byte stream to a peripheral.
pub trait PeripheralStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> PeripheralStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn PeripheralStream>;

/// Factory for peripheral streams.
///
/// Dropping the returned stream closes it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, address: &PeripheralAddress) -> Result<BoxedStream, TransportError>;
}

/// Serial Port Profile over a BlueZ RFCOMM socket.
#[derive(Debug, Clone)]
pub struct RfcommTransport {
    channel: u8,
}

impl RfcommTransport {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }
}

impl Default for RfcommTransport {
    fn default() -> Self {
        Self::new(DEFAULT_RFCOMM_CHANNEL)
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    async fn connect(&self, address: &PeripheralAddress) -> Result<BoxedStream, TransportError> {
        let device: Address = address
            .as_str()
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;

        debug!(
            "Opening RFCOMM channel {} on {} (service {})",
            self.channel, device, SPP_UUID
        );

        let stream = Stream::connect(SocketAddr::new(device, self.channel))
            .await
            .map_err(|source| TransportError::ConnectFailed {
                address: address.clone(),
                source,
            })?;

        info!("RFCOMM link to {} established", device);
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let transport = RfcommTransport::default();
        let result = transport.connect(&PeripheralAddress::new("not-an-address")).await;
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[test]
    fn test_address_ordering_and_display() {
        let a = PeripheralAddress::from("00:00:00:00:00:01");
        let b = PeripheralAddress::from("00:00:00:00:00:02");
        assert!(a < b);
        assert_eq!(a.to_string(), "00:00:00:00:00:01");
    }
}
