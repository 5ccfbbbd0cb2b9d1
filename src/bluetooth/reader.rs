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

//! Background loops bound to one transport.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{GaugeGuard, Shared};
use super::transport::BoxedStream;
use crate::telemetry::RawLine;

/// Read newline-delimited records and deliver them in order.
///
/// Ends on EOF, on a read error, on a failure reported by the writer, or
/// when the session it belongs to has been superseded. Never restarts.
pub(crate) async fn read_loop(
    shared: Arc<Shared>,
    generation: u64,
    reader: ReadHalf<BoxedStream>,
    mut write_failures: mpsc::Receiver<std::io::Error>,
    _transport: Arc<GaugeGuard>,
    _reader: GaugeGuard,
) {
    info!("Line reader started");

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    let reason = loop {
        buf.clear();

        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    info!("Connection closed by remote");
                    break "connection closed by peripheral".to_string();
                }
                Ok(_) => {
                    let line = RawLine::from_bytes(&buf);
                    if !shared.deliver_line(generation, line) {
                        debug!("Session superseded, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    break format!("read error: {}", e);
                }
            },
            Some(e) = write_failures.recv() => {
                break format!("write error: {}", e);
            }
        }
    };

    shared.fail_session(generation, reason);
}

/// Write queued lines to the transport until the queue closes.
pub(crate) async fn write_loop(
    mut writer: WriteHalf<BoxedStream>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    failures: mpsc::Sender<std::io::Error>,
    _transport: Arc<GaugeGuard>,
) {
    while let Some(line) = outbound.recv().await {
        debug!("Sending: {}", line.trim_end());
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!("Error writing to peripheral: {}", e);
            // The reader turns this into the session's single failure event.
            let _ = failures.try_send(e);
            break;
        }
    }
    debug!("Writer stopped");
}

async fn write_line(writer: &mut WriteHalf<BoxedStream>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
