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

//! IoT Hub: Bluetooth serial companion for Arduino-class peripherals.
//!
//! Connects to a peripheral over RFCOMM, reads its line-oriented telemetry,
//! tracks the derived sensor/actuator state and keeps an event log.

pub mod bluetooth;
pub mod config;
pub mod events;
pub mod panel;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod ui;
