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

//! Connection lifecycle for a single peripheral.
//!
//! [`ConnectionManager`] owns at most one transport at a time. The connect
//! handshake runs on its own task; once it succeeds a reader task and a
//! writer task take over the stream halves. Every transition and every
//! event emission happens under one lock and is tagged with the session
//! generation, so work belonging to a torn-down session is dropped instead
//! of delivered.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::reader::{read_loop, write_loop};
use super::transport::{BoxedStream, PeripheralAddress, Transport, TransportError};
use crate::telemetry::RawLine;

/// Default bound on the connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    /// Status text shown to the user.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Connection failed",
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt started.
    Connecting { address: PeripheralAddress },
    /// The transport is open and the reader is running.
    Connected { address: PeripheralAddress },
    /// The attempt or the established session failed.
    Failed { reason: String },
    /// A line arrived from the peripheral.
    LineReceived(RawLine),
}

/// Session generation shared by an [`EventSender`] and its [`ConnectionEvents`].
#[derive(Debug, Default)]
struct Epoch(AtomicU64);

/// Sending side of the connection event channel, owned by the manager.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<(u64, ConnectionEvent)>,
    epoch: Arc<Epoch>,
}

/// Receiving side of the connection event channel.
///
/// Events are tagged with the session that produced them. Anything still
/// queued when that session is torn down is discarded here, so once
/// `cancel()` or a new `connect()` returns, nothing from the old session
/// is handed out.
#[derive(Debug)]
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<(u64, ConnectionEvent)>,
    epoch: Arc<Epoch>,
}

/// Create a connection event channel.
pub fn event_channel() -> (EventSender, ConnectionEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let epoch = Arc::new(Epoch::default());
    (
        EventSender {
            tx,
            epoch: Arc::clone(&epoch),
        },
        ConnectionEvents { rx, epoch },
    )
}

impl ConnectionEvents {
    fn current(&self, generation: u64) -> bool {
        let live = self.epoch.0.load(Ordering::SeqCst) == generation;
        if !live {
            debug!("Dropping event from retired session {}", generation);
        }
        live
    }

    /// Next event of the live session. `None` once the manager is gone.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        while let Some((generation, event)) = self.rx.recv().await {
            if self.current(generation) {
                return Some(event);
            }
        }
        None
    }

    /// Next queued event of the live session, without waiting.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        while let Ok((generation, event)) = self.rx.try_recv() {
            if self.current(generation) {
                return Some(event);
            }
        }
        None
    }
}

/// Live/peak counter for session resources.
#[derive(Debug, Default)]
pub struct Gauge {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub(crate) fn acquire(self: &Arc<Self>) -> GaugeGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }

    /// Currently held.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Releases one unit of a [`Gauge`] on drop.
pub(crate) struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    generation: u64,
    address: Option<PeripheralAddress>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Inner {
    /// Signal every task of the current session to stop and open a new
    /// generation. The returned handles must be awaited to know they are gone.
    fn retire(&mut self, epoch: &Epoch) -> Vec<JoinHandle<()>> {
        self.generation += 1;
        epoch.0.store(self.generation, Ordering::SeqCst);
        self.outbound = None;
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        tasks
    }
}

/// State shared between the manager and its background tasks.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    events: EventSender,
    transports: Arc<Gauge>,
    readers: Arc<Gauge>,
}

impl Shared {
    /// Callers hold the `inner` lock and pass its generation.
    fn emit(&self, generation: u64, event: ConnectionEvent) {
        if self.events.tx.send((generation, event)).is_err() {
            debug!("Connection event dropped, no consumer");
        }
    }

    /// Forward a line if `generation` is still the live, connected session.
    pub(crate) fn deliver_line(&self, generation: u64, line: RawLine) -> bool {
        let inner = self.inner.lock();
        if inner.generation != generation || inner.state != ConnectionState::Connected {
            return false;
        }
        self.emit(generation, ConnectionEvent::LineReceived(line));
        true
    }

    /// Terminate a connected session after a transport error.
    pub(crate) fn fail_session(&self, generation: u64, reason: String) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != ConnectionState::Connected {
            return;
        }
        warn!("Session failed: {}", reason);
        inner.state = ConnectionState::Failed;
        // Closing the queue stops the writer, which releases the stream.
        inner.outbound = None;
        self.emit(generation, ConnectionEvent::Failed { reason });
    }

    /// Complete a connect attempt.
    fn install(
        self: &Arc<Self>,
        generation: u64,
        address: PeripheralAddress,
        outcome: Result<BoxedStream, TransportError>,
    ) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            // Superseded by cancel() or a newer connect(); the stream, if
            // any, is dropped here.
            debug!("Discarding stale connection attempt to {}", address);
            return;
        }

        match outcome {
            Ok(stream) => {
                let transport = Arc::new(self.transports.acquire());
                let (read_half, write_half) = tokio::io::split(stream);
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (failure_tx, failure_rx) = mpsc::channel(1);

                inner.state = ConnectionState::Connected;
                inner.outbound = Some(outbound_tx);
                info!("Connected to {}", address);
                self.emit(generation, ConnectionEvent::Connected { address });

                let writer = tokio::spawn(write_loop(
                    write_half,
                    outbound_rx,
                    failure_tx,
                    Arc::clone(&transport),
                ));
                let reader = tokio::spawn(read_loop(
                    Arc::clone(self),
                    generation,
                    read_half,
                    failure_rx,
                    transport,
                    self.readers.acquire(),
                ));
                inner.tasks.push(writer);
                inner.tasks.push(reader);
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", address, e);
                inner.state = ConnectionState::Failed;
                self.emit(
                    generation,
                    ConnectionEvent::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }
}

/// Wait until aborted session tasks are gone.
async fn settle(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!("Session task failed: {}", e);
            }
        }
    }
}

/// Owns the connection to one peripheral at a time.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    /// Create an idle manager. Lifecycle and line events go to `event_tx`.
    pub fn new(transport: Arc<dyn Transport>, event_tx: EventSender) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                events: event_tx,
                transports: Arc::new(Gauge::default()),
                readers: Arc::new(Gauge::default()),
            }),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Address of the current or last attempted session.
    pub fn address(&self) -> Option<PeripheralAddress> {
        self.shared.inner.lock().address.clone()
    }

    /// Open transports.
    pub fn transports(&self) -> &Gauge {
        &self.shared.transports
    }

    /// Running line readers.
    pub fn readers(&self) -> &Gauge {
        &self.shared.readers
    }

    /// Connect to `address`, replacing any existing session.
    ///
    /// Returns once the previous session is fully stopped and the handshake
    /// has been started; the outcome arrives as a `Connected` or `Failed`
    /// event.
    pub async fn connect(&self, address: PeripheralAddress) {
        let (generation, retired) = {
            let mut inner = self.shared.inner.lock();
            let retired = inner.retire(&self.shared.events.epoch);
            inner.state = ConnectionState::Connecting;
            inner.address = Some(address.clone());
            self.shared.emit(
                inner.generation,
                ConnectionEvent::Connecting {
                    address: address.clone(),
                },
            );
            (inner.generation, retired)
        };

        settle(retired).await;

        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        let timeout = self.connect_timeout;
        let task = tokio::spawn(async move {
            info!("Connecting to {}...", address);
            let outcome = match tokio::time::timeout(timeout, transport.connect(&address)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            };
            shared.install(generation, address, outcome);
        });

        let mut inner = self.shared.inner.lock();
        if inner.generation == generation {
            inner.tasks.push(task);
        } else {
            task.abort();
        }
    }

    /// Queue `text` plus a line terminator for the peripheral.
    ///
    /// A no-op unless connected. Write failures end the session through a
    /// `Failed` event instead of being returned here.
    pub fn send(&self, text: &str) -> bool {
        let inner = self.shared.inner.lock();
        if inner.state != ConnectionState::Connected {
            debug!("Not connected, dropping outbound '{}'", text);
            return false;
        }
        match &inner.outbound {
            Some(outbound) => outbound.send(format!("{}\n", text)).is_ok(),
            None => false,
        }
    }

    /// Stop the session, close the transport and return to `Idle`.
    ///
    /// Events the session already queued are discarded by the receiver.
    pub async fn cancel(&self) {
        let retired = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Idle && inner.tasks.is_empty() {
                return;
            }
            info!("Closing connection");
            let retired = inner.retire(&self.shared.events.epoch);
            inner.state = ConnectionState::Idle;
            inner.address = None;
            retired
        };
        settle(retired).await;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.inner.lock().retire(&self.shared.events.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_tracks_peak() {
        let gauge = Arc::new(Gauge::default());
        let a = gauge.acquire();
        let b = gauge.acquire();
        assert_eq!(gauge.live(), 2);
        drop(a);
        drop(b);
        let _c = gauge.acquire();
        assert_eq!(gauge.live(), 1);
        assert_eq!(gauge.peak(), 2);
    }

    #[test]
    fn test_retired_events_are_discarded() {
        let (tx, mut rx) = event_channel();
        let mut inner = Inner::default();
        let line = |text: &str| ConnectionEvent::LineReceived(RawLine::new(text));

        tx.tx.send((inner.generation, line("old"))).unwrap();
        inner.retire(&tx.epoch);
        tx.tx.send((inner.generation, line("new"))).unwrap();

        assert_eq!(rx.try_recv(), Some(line("new")));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting...");
    }
}
