//! Self-healing link to the detection service.
//!
//! One background task owns the link: it connects, pumps frames out and
//! detections in, and after every failure or drop waits out the backoff delay
//! before trying again. Other components observe it through a cheap, cloneable
//! [`ConnectionHandle`].

use crate::config::ConnectionConfig;
use crate::connection::backoff::{Backoff, RetryCounter};
use crate::connection::transport::{Connector, Link};
use crate::connection::{ConnectionEvent, ConnectionState};
use crate::error::VisionError;
use crate::protocol::{DetectionSnapshot, parse_detections};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Link parameters, fixed for the lifetime of a manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub backoff: Backoff,
    pub connect_timeout: Duration,
}

impl From<&ConnectionConfig> for ConnectionSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            backoff: Backoff::new(config.base_delay(), config.max_delay()),
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

/// Counters describing link activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connect_attempts: u64,
    pub frames_sent: u64,
    /// Frames offered while disconnected.
    pub frames_dropped: u64,
    pub malformed_messages: u64,
    /// Consecutive failures since the last successful connect.
    pub retries: u32,
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    malformed_messages: AtomicU64,
}

struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    detections_tx: watch::Sender<DetectionSnapshot>,
    /// Freshest outbound frame; older ones are overwritten, never queued.
    frame_tx: watch::Sender<Option<String>>,
    retries: RetryCounter,
    counters: Counters,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

/// Read-only view of the link plus the outbound frame entry point.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The most recent valid snapshot received from the service.
    pub fn latest_detections(&self) -> DetectionSnapshot {
        self.shared.detections_tx.borrow().clone()
    }

    pub fn subscribe_detections(&self) -> watch::Receiver<DetectionSnapshot> {
        self.shared.detections_tx.subscribe()
    }

    /// Offer a frame payload for transmission.
    ///
    /// Returns false and drops the frame unless the link is connected. Frames are
    /// never buffered for a later connection.
    pub fn send(&self, frame: String) -> bool {
        if !self.state().is_connected() {
            self.shared
                .counters
                .frames_dropped
                .fetch_add(1, Ordering::Relaxed);
            trace!("dropping frame while disconnected");
            return false;
        }
        self.shared.frame_tx.send_replace(Some(frame));
        true
    }

    pub fn stats(&self) -> ConnectionStats {
        let counters = &self.shared.counters;
        ConnectionStats {
            connect_attempts: counters.connect_attempts.load(Ordering::Relaxed),
            frames_sent: counters.frames_sent.load(Ordering::Relaxed),
            frames_dropped: counters.frames_dropped.load(Ordering::Relaxed),
            malformed_messages: counters.malformed_messages.load(Ordering::Relaxed),
            retries: self.shared.retries.get(),
        }
    }
}

/// Owner of the link task.
///
/// Dropping the manager cancels the task; [`ConnectionManager::close`] also
/// waits for the link to be released.
pub struct ConnectionManager {
    handle: ConnectionHandle,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting in the background.
    ///
    /// Must be called from within a tokio runtime. Returns the manager and the
    /// receiver of lifecycle and detection events.
    pub fn start(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (detections_tx, _) = watch::channel(DetectionSnapshot::default());
        let (frame_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            state_tx,
            detections_tx,
            frame_tx,
            retries: RetryCounter::default(),
            counters: Counters::default(),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let link_loop = LinkLoop {
            settings,
            connector,
            shared: Arc::clone(&shared),
            events: events_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(link_loop.run());

        (
            Self {
                handle: ConnectionHandle { shared },
                cancel,
                task: Some(task),
            },
            events_rx,
        )
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Stop reconnecting, release the link and wait for the task to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!("connection task failed: {e}");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Attempt {
    Opened(Link),
    Failed(VisionError),
    Cancelled,
}

enum SessionEnd {
    Closed(VisionError),
    Cancelled,
}

struct LinkLoop {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
}

impl LinkLoop {
    async fn run(self) {
        info!(endpoint = %self.settings.endpoint, "connection manager started");

        loop {
            let reason = match self.open().await {
                Attempt::Cancelled => break,
                Attempt::Failed(e) => e,
                Attempt::Opened(link) => {
                    self.on_open();
                    match self.session(link).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed(e) => e,
                    }
                }
            };

            let delay = self.on_close(&reason);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        info!("connection manager stopped");
    }

    async fn open(&self) -> Attempt {
        self.shared
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);
        debug!(endpoint = %self.settings.endpoint, "opening link");

        let timeout = self.settings.connect_timeout;
        let connect = tokio::time::timeout(timeout, self.connector.connect(&self.settings.endpoint));

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Attempt::Cancelled,
            result = connect => match result {
                Ok(Ok(link)) => Attempt::Opened(link),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(_) => Attempt::Failed(VisionError::ConnectTimeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }

    fn on_open(&self) {
        self.shared.retries.reset();
        self.shared.set_state(ConnectionState::Connected);
        info!(endpoint = %self.settings.endpoint, "connected to detection service");
        self.emit(ConnectionEvent::Connected);
    }

    /// Record the drop and return how long to wait before the next attempt.
    fn on_close(&self, reason: &VisionError) -> Duration {
        self.shared.set_state(ConnectionState::Disconnected);

        let attempt = self.shared.retries.get();
        let delay = self.settings.backoff.delay(attempt);
        warn!(
            error = %reason,
            attempt,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "link to detection service down, scheduling reconnect"
        );
        self.emit(ConnectionEvent::Disconnected {
            attempt,
            retry_in: delay,
        });
        self.shared.retries.increment();
        delay
    }

    async fn session(&self, link: Link) -> SessionEnd {
        let Link {
            mut outbound,
            mut inbound,
        } = link;
        // Marks any frame left over from a previous session as seen.
        let mut frames = self.shared.frame_tx.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Err(e) = outbound.close().await {
                        debug!(error = %e, "link close failed");
                    }
                    return SessionEnd::Cancelled;
                }
                message = inbound.next() => match message {
                    Some(Ok(payload)) => self.on_message(&payload),
                    Some(Err(e)) if !e.is_link_fatal() => self.on_malformed(&e),
                    Some(Err(e)) => return SessionEnd::Closed(e),
                    None => {
                        return SessionEnd::Closed(VisionError::Transport {
                            message: "link closed by detection service".to_string(),
                        });
                    }
                },
                changed = frames.changed() => {
                    if changed.is_err() {
                        return SessionEnd::Cancelled;
                    }
                    let frame = frames.borrow_and_update().clone();
                    if let Some(frame) = frame {
                        if let Err(e) = outbound.send(frame).await {
                            return SessionEnd::Closed(e);
                        }
                        self.shared
                            .counters
                            .frames_sent
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    fn on_message(&self, payload: &str) {
        match parse_detections(payload) {
            Ok(snapshot) => {
                trace!(pieces = snapshot.len(), "detections received");
                self.shared.detections_tx.send_replace(snapshot.clone());
                self.emit(ConnectionEvent::Detections(snapshot));
            }
            Err(e) => self.on_malformed(&e),
        }
    }

    fn on_malformed(&self, error: &VisionError) {
        let seen = self
            .shared
            .counters
            .malformed_messages
            .fetch_add(1, Ordering::Relaxed);
        if seen == 0 {
            error!(%error, "discarding malformed message from detection service");
        } else {
            debug!(%error, discarded = seen + 1, "discarding malformed message");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            trace!("connection event receiver dropped");
        }
    }
}
