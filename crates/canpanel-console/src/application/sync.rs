//! The panel sync loop: the single serialized apply path.
//!
//! All inbound frames and lifecycle transitions flow through one mpsc
//! channel in transport delivery order, and this loop is the only caller of
//! [`Store::apply`]. That construction (one writer, one ordered queue) is
//! what makes the ordering guarantees hold without any cross-thread
//! reasoning: there is simply no second mutator to race with.
//!
//! Two side effects ride along with the fold:
//!
//! - On any transition away from `Connected`, the dispatcher's repeating
//!   send is force-cancelled *before* the transition is applied, so no
//!   frame can be emitted against a connection the state already knows is
//!   gone.
//! - On every transition to `Connected`, the loop asks the panel to re-push
//!   its status, event log, and profile list. Reconnect keeps stale data on
//!   screen; this burst is what replaces it.

use std::sync::Arc;

use canpanel_core::{encode_command, ConnectionState, SequenceCounter, StateEvent, WireCommand};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::dispatch::{CommandDispatcher, FrameSink};
use crate::infrastructure::network::ConnectionEvent;
use crate::infrastructure::store::Store;

/// Runs until the event channel closes (i.e. the connection manager's run
/// loop ends).
pub async fn run_sync_loop(
    store: Arc<Store>,
    dispatcher: Arc<CommandDispatcher>,
    sink: Arc<dyn FrameSink>,
    seq: Arc<SequenceCounter>,
    mut events: tokio::sync::mpsc::Receiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Transition { state, error } => {
                info!("connection transition: {state:?}");
                if state != ConnectionState::Connected {
                    // Must happen before the state becomes visible: a
                    // subscriber that observes the transition may rely on
                    // no further repeated frame existing.
                    dispatcher.cancel_repeat();
                }
                store.apply(StateEvent::Connection { state, error });
                if state == ConnectionState::Connected {
                    request_refresh(sink.as_ref(), &seq).await;
                }
            }
            ConnectionEvent::Frame(inbound) => {
                store.apply(StateEvent::Inbound(inbound));
            }
        }
    }
}

/// Asks the panel to re-push everything the console mirrors.
async fn request_refresh(sink: &dyn FrameSink, seq: &SequenceCounter) {
    for command in [
        WireCommand::RequestStatus,
        WireCommand::RequestEvents,
        WireCommand::RequestProfiles,
    ] {
        let bytes = encode_command(&command, seq.next(), Uuid::new_v4());
        if let Err(e) = sink.send_frame(bytes).await {
            // The connection may have dropped again already; the next
            // Connected transition will retry the refresh.
            warn!("refresh request failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use canpanel_core::protocol::messages::MessageType;
    use canpanel_core::{
        ArmStatus, ErrorInfo, InboundEvent, OutboundCommand, PanelState, RawFrame, StatusSnapshot,
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::infrastructure::network::SendError;

    struct RecordingSink {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }

        fn message_types(&self) -> Vec<u8> {
            self.frames.lock().unwrap().iter().map(|f| f[1]).collect()
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&self, frame: Vec<u8>) -> Result<(), SendError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<Store>,
        dispatcher: Arc<CommandDispatcher>,
        sink: Arc<RecordingSink>,
        tx: mpsc::Sender<ConnectionEvent>,
    }

    fn spawn_harness() -> Harness {
        let store = Arc::new(Store::new(PanelState::new(16)));
        let sink = RecordingSink::new();
        let seq = Arc::new(SequenceCounter::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&store),
            sink.clone() as Arc<dyn FrameSink>,
            Arc::clone(&seq),
        ));
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run_sync_loop(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            sink.clone() as Arc<dyn FrameSink>,
            seq,
            rx,
        ));
        Harness {
            store,
            dispatcher,
            sink,
            tx,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Advances the paused clock in small steps, yielding between steps so
    /// a repeating task can observe every tick deadline it re-arms.
    async fn advance_by(total: Duration, step: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            tokio::time::advance(step).await;
            settle().await;
            elapsed += step;
        }
    }

    #[tokio::test]
    async fn test_transitions_and_frames_reach_the_store_in_order() {
        let h = spawn_harness();

        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Connecting,
            error: None,
        })
        .await
        .unwrap();
        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Connected,
            error: None,
        })
        .await
        .unwrap();
        h.tx.send(ConnectionEvent::Frame(InboundEvent::StatusUpdate(
            StatusSnapshot {
                arm_status: ArmStatus::Armed,
                profile_number: 1,
            },
        )))
        .await
        .unwrap();
        settle().await;

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_eq!(snapshot.status.unwrap().profile_number, 1);
    }

    #[tokio::test]
    async fn test_connected_transition_triggers_refresh_burst() {
        let h = spawn_harness();

        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Connected,
            error: None,
        })
        .await
        .unwrap();
        settle().await;

        assert_eq!(
            h.sink.message_types(),
            vec![
                MessageType::RequestStatus as u8,
                MessageType::RequestEvents as u8,
                MessageType::RequestProfiles as u8,
            ]
        );
    }

    #[tokio::test]
    async fn test_errored_transition_records_the_cause() {
        let h = spawn_harness();

        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Errored,
            error: Some(ErrorInfo::new("read error: reset by peer")),
        })
        .await
        .unwrap();
        settle().await;

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Errored);
        assert_eq!(
            snapshot.last_error,
            Some(ErrorInfo::new("read error: reset by peer"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_away_from_connected_cancels_repeat_send() {
        let h = spawn_harness();

        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Connected,
            error: None,
        })
        .await
        .unwrap();
        settle().await;
        let refresh_frames = h.sink.message_types().len();

        let frame = RawFrame::parse("0x75", "0x14", "0xAA", "0x00").unwrap();
        h.dispatcher
            .dispatch(OutboundCommand::SendFrameRepeatedly {
                frame,
                interval: Duration::from_millis(500),
            })
            .await
            .unwrap();
        settle().await;
        advance_by(Duration::from_millis(1100), Duration::from_millis(100)).await;
        assert_eq!(h.sink.message_types().len(), refresh_frames + 2);

        // The socket dies: the sync loop must kill the timer on its own,
        // without any StopSendingFrame from the user.
        h.tx.send(ConnectionEvent::Transition {
            state: ConnectionState::Errored,
            error: Some(ErrorInfo::new("connection closed by panel")),
        })
        .await
        .unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(
            h.sink.message_types().len(),
            refresh_frames + 2,
            "no repeated frame may be sent after the connection is gone"
        );
    }
}
