//! Network infrastructure for the console application.
//!
//! Owns the TCP connection to the panel controller and its whole lifecycle:
//!
//! - `ConnectionManager` holds the socket and drives the state machine
//!   `Disconnected → Connecting → Connected → Errored → Connecting → …`,
//!   with `disconnect()` reachable from every state.
//! - Inbound frames are decoded and forwarded on an `mpsc` channel together
//!   with lifecycle transitions, in delivery order, so the sync loop sees
//!   one serialized event stream.
//! - Reconnects use capped exponential backoff, reset on every successful
//!   connect. The retry loop never gives up; `disconnect()` is the only
//!   way to stop it, and it also cancels a pending backoff sleep.
//!
//! Transport errors never escape this module as panics or raw `io::Error`s;
//! they surface as an [`ErrorInfo`] on the `Errored` transition, and
//! `send()` while not connected fails fast with [`SendError::NotConnected`]
//! rather than buffering. A disarm written to a dead socket must not
//! resurrect and fire after reconnect.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canpanel_core::protocol::messages::HEADER_SIZE;
use canpanel_core::{decode_event, ConnectionState, ErrorInfo, InboundEvent};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, Mutex, Notify},
    time,
};
use tracing::{debug, info, warn};

use crate::application::dispatch::FrameSink;

/// A frame whose header declares more than this is a stream desync, not a
/// real message; the connection is torn down and re-established.
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Errors returned by [`ConnectionManager::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// No socket is open; the command is rejected, never queued.
    #[error("not connected to the panel")]
    NotConnected,

    /// The write itself failed; the read loop will drive the reconnect.
    #[error("socket write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the console's connection to the panel.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Address of the panel controller's TCP listener.
    pub panel_addr: SocketAddr,
    /// How long a single connect attempt may take before counting as failed.
    pub connect_timeout: Duration,
    /// First reconnect delay after a failure.
    pub backoff_initial: Duration,
    /// Ceiling for the reconnect delay.
    pub backoff_max: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            panel_addr: "127.0.0.1:9000".parse().unwrap(),
            connect_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Events emitted by the connection manager to the sync loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The lifecycle state changed; `error` is set only for `Errored`.
    Transition {
        state: ConnectionState,
        error: Option<ErrorInfo>,
    },
    /// A frame arrived and decoded cleanly.
    Frame(InboundEvent),
}

// ── Backoff policy ────────────────────────────────────────────────────────────

/// Exponential reconnect backoff with a ceiling.
///
/// Each failure doubles the next delay up to `max`; a successful connection
/// resets it to `initial`.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(self.max);
        delay
    }

    /// Resets the schedule to the initial delay.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

// ── Connection manager ────────────────────────────────────────────────────────

/// Manages the persistent TCP connection from the console to the panel.
pub struct ConnectionManager {
    config: ConnectionConfig,
    write_half: Arc<Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>>,
    /// Whether the user currently wants a connection. `connect()` sets it,
    /// `disconnect()` clears it; the run loop only acts while it is set.
    desired: AtomicBool,
    /// Wakes the run loop out of idle waits and backoff sleeps.
    wake: Notify,
    /// Last emitted lifecycle state, for transition dedup.
    last_state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    /// Creates a new (not yet started) `ConnectionManager`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
            desired: AtomicBool::new(false),
            wake: Notify::new(),
            last_state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Spawns the connection run loop and returns the event receiver.
    ///
    /// The loop starts idle; call [`connect`](Self::connect) to begin
    /// dialing. The loop ends when the receiver is dropped.
    pub fn start(self: Arc<Self>) -> mpsc::Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            self.run(tx).await;
        });
        rx
    }

    /// Requests a connection. Idempotent; also shortcuts a pending backoff
    /// sleep so a user-initiated connect is immediate.
    pub fn connect(&self) {
        self.desired.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Tears the connection down and stops reconnecting until the next
    /// [`connect`](Self::connect). Cancels any pending backoff sleep.
    pub async fn disconnect(&self) {
        self.desired.store(false, Ordering::Relaxed);
        // Drop the write half right away so send() fails fast even before
        // the run loop observes the flag.
        *self.write_half.lock().await = None;
        self.wake.notify_one();
    }

    /// Writes one encoded frame to the socket.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] when no socket is open;
    /// [`SendError::Io`] when the write fails (the read loop then drives
    /// the `Errored` transition and reconnect).
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SendError> {
        let mut guard = self.write_half.lock().await;
        match guard.as_mut() {
            None => Err(SendError::NotConnected),
            Some(writer) => match writer.write_all(bytes).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    // The socket is dead; clear it so later sends fail fast.
                    *guard = None;
                    Err(SendError::Io(e))
                }
            },
        }
    }

    fn desired(&self) -> bool {
        self.desired.load(Ordering::Relaxed)
    }

    /// Emits a lifecycle transition unless it repeats the previous state.
    async fn transition(
        &self,
        tx: &mpsc::Sender<ConnectionEvent>,
        state: ConnectionState,
        error: Option<ErrorInfo>,
    ) {
        {
            let mut last = self.last_state.lock().await;
            if *last == state {
                return;
            }
            *last = state;
        }
        let _ = tx.send(ConnectionEvent::Transition { state, error }).await;
    }

    /// The connection run loop: dial, read until failure, back off, repeat.
    async fn run(self: Arc<Self>, tx: mpsc::Sender<ConnectionEvent>) {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        loop {
            if tx.is_closed() {
                return;
            }
            if !self.desired() {
                self.transition(&tx, ConnectionState::Disconnected, None).await;
                self.wake.notified().await;
                continue;
            }

            self.transition(&tx, ConnectionState::Connecting, None).await;

            let attempt = time::timeout(
                self.config.connect_timeout,
                TcpStream::connect(self.config.panel_addr),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(stream)) => {
                    info!("connected to panel at {}", self.config.panel_addr);
                    backoff.reset();

                    let (read_half, write_half) = stream.into_split();
                    *self.write_half.lock().await = Some(write_half);
                    self.transition(&tx, ConnectionState::Connected, None).await;

                    let outcome = self.drive_connection(read_half, &tx).await;
                    *self.write_half.lock().await = None;
                    outcome
                }
                Ok(Err(e)) => {
                    warn!("could not connect to panel at {}: {e}", self.config.panel_addr);
                    Some(ErrorInfo::new(format!("connect failed: {e}")))
                }
                Err(_) => {
                    warn!(
                        "connect to {} timed out after {:?}",
                        self.config.panel_addr, self.config.connect_timeout
                    );
                    Some(ErrorInfo::new(format!(
                        "connect timed out after {:?}",
                        self.config.connect_timeout
                    )))
                }
            };

            if !self.desired() {
                // Explicit disconnect: skip Errored and go idle.
                continue;
            }

            let cause =
                failure.unwrap_or_else(|| ErrorInfo::new("connection closed by panel"));
            self.transition(&tx, ConnectionState::Errored, Some(cause)).await;

            let delay = backoff.next_delay();
            debug!("reconnecting in {delay:?}");
            tokio::select! {
                _ = time::sleep(delay) => {}
                // disconnect() (or a redundant connect()) interrupts the
                // backoff sleep; the top of the loop re-checks `desired`.
                _ = self.wake.notified() => {}
            }
        }
    }

    /// Runs the read task for one established connection until it fails or
    /// `disconnect()` aborts it. Returns the failure cause, or `None` for a
    /// deliberate disconnect.
    async fn drive_connection(
        &self,
        reader: tokio::net::tcp::OwnedReadHalf,
        tx: &mpsc::Sender<ConnectionEvent>,
    ) -> Option<ErrorInfo> {
        let mut read_task = tokio::spawn(read_frames(reader, tx.clone()));
        loop {
            tokio::select! {
                joined = &mut read_task => {
                    return joined.unwrap_or_else(|e| {
                        Some(ErrorInfo::new(format!("read task failed: {e}")))
                    });
                }
                _ = self.wake.notified() => {
                    if !self.desired() {
                        read_task.abort();
                        return None;
                    }
                    // Redundant connect() while connected: nothing to do.
                }
            }
        }
    }
}

/// Reads framed messages off the socket and forwards decoded events.
///
/// A malformed frame is logged and dropped without touching state; only
/// socket-level failures end the loop.
async fn read_frames(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    tx: mpsc::Sender<ConnectionEvent>,
) -> Option<ErrorInfo> {
    loop {
        let mut header_buf = vec![0u8; HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            return Some(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ErrorInfo::new("connection closed by panel")
            } else {
                ErrorInfo::new(format!("read error: {e}"))
            });
        }

        // Payload length is at bytes 4..8 (big-endian u32).
        let payload_len = u32::from_be_bytes(header_buf[4..8].try_into().unwrap()) as usize;
        if payload_len > MAX_PAYLOAD_BYTES {
            // Once the framing is lost there is no way to resynchronise
            // mid-stream; force a reconnect.
            return Some(ErrorInfo::new(format!(
                "frame declares {payload_len} byte payload; stream out of sync"
            )));
        }

        let mut full_msg = header_buf;
        full_msg.resize(HEADER_SIZE + payload_len, 0);
        if payload_len > 0 {
            if let Err(e) = reader.read_exact(&mut full_msg[HEADER_SIZE..]).await {
                return Some(ErrorInfo::new(format!("read error: {e}")));
            }
        }

        match decode_event(&full_msg) {
            Ok((event, _)) => {
                debug!("received {:?}", event.message_type());
                if tx.send(ConnectionEvent::Frame(event)).await.is_err() {
                    // Receiver gone; the supervisor is shutting down.
                    return None;
                }
            }
            Err(e) => {
                warn!("dropping malformed frame: {e}");
            }
        }
    }
}

#[async_trait]
impl FrameSink for ConnectionManager {
    async fn send_frame(&self, frame: Vec<u8>) -> Result<(), SendError> {
        self.send(&frame).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
