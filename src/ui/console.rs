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

//! Terminal rendering of connection status, console traffic and telemetry.

use std::io::Write;

use crate::bluetooth::ConnectionState;

/// Receives everything the user should see.
pub trait Presenter: Send + Sync {
    /// Connection status changed.
    fn status(&self, state: ConnectionState);

    /// A console line: peripheral output, local echo or log notice.
    fn console(&self, line: &str);

    /// New sensor reading.
    fn sensor(&self, value: i64);

    /// Actuator indicator needs a refresh.
    fn actuator(&self, on: bool);

    /// One-shot notification.
    fn notify(&self, message: &str);
}

/// Writes to stdout, one line per update.
#[derive(Debug, Default)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    pub fn new() -> Self {
        Self
    }

    fn print(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout is not worth failing the session over.
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

impl Presenter for TerminalPresenter {
    fn status(&self, state: ConnectionState) {
        self.print(&format!("* Status: {}", state.as_str()));
    }

    fn console(&self, line: &str) {
        self.print(line);
    }

    fn sensor(&self, value: i64) {
        self.print(&format!("* Light level: {}", value));
    }

    fn actuator(&self, on: bool) {
        let indicator = if on { "● LED on" } else { "○ LED off" };
        self.print(&format!("* {}", indicator));
    }

    fn notify(&self, message: &str) {
        self.print(&format!("! {}", message));
    }
}
