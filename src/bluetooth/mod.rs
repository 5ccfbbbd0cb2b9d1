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

//! Bluetooth communication module.
//!
//! Handles the RFCOMM client link to the peripheral and its line protocol.

mod connection;
mod directory;
mod reader;
mod transport;

pub use connection::{
    event_channel, ConnectionEvent, ConnectionEvents, ConnectionManager, ConnectionState,
    EventSender, Gauge, DEFAULT_CONNECT_TIMEOUT,
};
pub use directory::{BluezDirectory, DeviceDirectory, KnownDevice};
pub use transport::{
    BoxedStream, PeripheralAddress, PeripheralStream, RfcommTransport, Transport,
    TransportError, DEFAULT_RFCOMM_CHANNEL, SPP_UUID,
};
