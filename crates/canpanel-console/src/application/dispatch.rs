//! CommandDispatcher: the only write path the presentation layer gets.
//!
//! A dispatch call validates the intent against the current store snapshot,
//! maps it to a wire command, and hands the encoded bytes to a [`FrameSink`]
//! (the connection manager in production, a recording double in tests).
//! Dispatch never touches canonical state; effects come back from the panel
//! as status pushes.
//!
//! Success means "accepted by transport", nothing stronger; there is no
//! application-level acknowledgement protocol. A disarm that the panel never
//! acted on shows up as an unchanged arm status, not as a dispatch error.
//!
//! The dispatcher also owns the single repeating-send timer. The handle is
//! stored in the dispatcher rather than detached so that
//! [`cancel_repeat`](CommandDispatcher::cancel_repeat), which the sync loop
//! calls on every transition away from `Connected`, can synchronously
//! guarantee that no further frame leaves after the cancel returns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use canpanel_core::{
    encode_command, ConnectionState, OutboundCommand, RawFrame, SequenceCounter, ValidationError,
    WireCommand,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::infrastructure::network::SendError;
use crate::infrastructure::store::Store;

/// Rejection of a dispatched intent. Returned synchronously to the caller;
/// canonical state is never mutated by a failed (or successful) dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The connection is not up; the command is rejected, never queued.
    #[error("not connected to the panel")]
    NotConnected,

    /// The profile index does not exist in the current profile list.
    #[error("profile index {index} out of range ({profile_count} profiles)")]
    InvalidProfile { index: usize, profile_count: usize },

    /// The command payload failed validation before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The transport accepted the connection check but the write failed.
    #[error("transport rejected the command: {0}")]
    Transport(SendError),
}

/// Where encoded frames go. The connection manager implements this; tests
/// substitute a recording double.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Delivers one encoded frame to the transport.
    async fn send_frame(&self, frame: Vec<u8>) -> Result<(), SendError>;
}

/// Validates and forwards user intents; owns the repeat-send timer.
pub struct CommandDispatcher {
    store: Arc<Store>,
    sink: Arc<dyn FrameSink>,
    seq: Arc<SequenceCounter>,
    /// Handle of the active repeating-send task, if any. At most one exists;
    /// starting a new one aborts the previous one first.
    repeat: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<Store>, sink: Arc<dyn FrameSink>, seq: Arc<SequenceCounter>) -> Self {
        Self {
            store,
            sink,
            seq,
            repeat: Mutex::new(None),
        }
    }

    /// Validates `command` against the current snapshot and sends it.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotConnected`] while the connection is anything
    ///   but `Connected`, checked at call time. If the connection drops
    ///   between the check and the write, the sink's own failure is
    ///   surfaced the same way.
    /// - [`DispatchError::InvalidProfile`] for an out-of-range profile.
    /// - [`DispatchError::Validation`] for a zero repeat interval.
    pub async fn dispatch(&self, command: OutboundCommand) -> Result<(), DispatchError> {
        let snapshot = self.store.snapshot();
        if snapshot.connection != ConnectionState::Connected {
            return Err(DispatchError::NotConnected);
        }

        debug!("dispatching {command:?}");
        match command {
            OutboundCommand::Disarm => self.send_wire(WireCommand::Disarm).await,
            OutboundCommand::ArmWithProfile(index) => {
                let profile_count = snapshot.alarm_profiles.len();
                if index >= profile_count {
                    return Err(DispatchError::InvalidProfile {
                        index,
                        profile_count,
                    });
                }
                self.send_wire(WireCommand::Arm {
                    profile: index as u16,
                })
                .await
            }
            OutboundCommand::ClearData => self.send_wire(WireCommand::ClearData).await,
            OutboundCommand::TestAlarm => self.send_wire(WireCommand::TestAlarm).await,
            OutboundCommand::GetAttention => self.send_wire(WireCommand::GetAttention).await,
            OutboundCommand::ToggleGarageDoor => {
                self.send_wire(WireCommand::ToggleGarageDoor).await
            }
            OutboundCommand::SendFrameOnce(frame) => self.send_wire(WireCommand::Raw(frame)).await,
            OutboundCommand::SendFrameRepeatedly { frame, interval } => {
                if interval.is_zero() {
                    return Err(ValidationError::ZeroInterval.into());
                }
                self.start_repeat(frame, interval);
                Ok(())
            }
            OutboundCommand::StopSendingFrame => {
                self.cancel_repeat();
                Ok(())
            }
        }
    }

    /// Aborts the repeating-send task, if one is active. Idempotent, and
    /// synchronous: after it returns, no further repeated frame is sent.
    pub fn cancel_repeat(&self) {
        if let Some(handle) = self.repeat.lock().expect("repeat lock poisoned").take() {
            handle.abort();
            debug!("repeating send cancelled");
        }
    }

    /// Starts the periodic re-send task, replacing any previous one.
    ///
    /// The first frame goes out one interval after the start, then one per
    /// interval until cancelled or until the transport rejects a send.
    fn start_repeat(&self, frame: RawFrame, interval: Duration) {
        self.cancel_repeat();

        let sink = Arc::clone(&self.sink);
        let seq = Arc::clone(&self.seq);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                // Re-encode each tick so every frame gets its own sequence
                // number and correlation id.
                let bytes = encode_command(&WireCommand::Raw(frame), seq.next(), Uuid::new_v4());
                if let Err(e) = sink.send_frame(bytes).await {
                    warn!("repeating send stopped by transport: {e}");
                    break;
                }
            }
        });
        *self.repeat.lock().expect("repeat lock poisoned") = Some(handle);
        debug!("repeating send of {frame} every {interval:?}");
    }

    async fn send_wire(&self, command: WireCommand) -> Result<(), DispatchError> {
        let bytes = encode_command(&command, self.seq.next(), Uuid::new_v4());
        match self.sink.send_frame(bytes).await {
            Ok(()) => Ok(()),
            // The connection dropped between the snapshot check and the
            // write; indistinguishable from having been disconnected at
            // call time, so it is reported the same way.
            Err(SendError::NotConnected) => Err(DispatchError::NotConnected),
            Err(e) => Err(DispatchError::Transport(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
