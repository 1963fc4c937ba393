//! Canonical application state and the pure reducer that mutates it.
//!
//! [`PanelState`] is the single source of truth for everything a UI may
//! display: connection health, the latest status snapshot pushed by the
//! panel, the bounded event log, and the profile list. It is mutated in
//! exactly one place, [`reduce`], in response to either a decoded inbound
//! event or a connection-lifecycle transition. Nothing else writes to it;
//! a command dispatch never touches it directly.
//!
//! The reducer is deterministic: no clock reads, no randomness, no I/O.
//! Given the same state and event it always produces the same output, which
//! is what makes the properties in the test module checkable at all.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::protocol::messages::InboundEvent;

// ── Connection lifecycle ──────────────────────────────────────────────────────

/// Health of the socket connection to the panel.
///
/// Exactly one state is active at a time. Transitions are driven solely by
/// the connection manager; the reducer only records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection and none wanted (initial state, or after an explicit
    /// disconnect).
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The socket is open and frames are flowing.
    Connected,
    /// The socket failed; a reconnect attempt is pending behind backoff.
    Errored,
}

/// A user-presentable description of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ── Panel-reported state ──────────────────────────────────────────────────────

/// Arm state reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ArmStatus {
    Disarmed = 0x00,
    Armed = 0x01,
    Unknown = 0xFF,
}

impl TryFrom<u8> for ArmStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ArmStatus::Disarmed),
            0x01 => Ok(ArmStatus::Armed),
            0xFF => Ok(ArmStatus::Unknown),
            _ => Err(()),
        }
    }
}

/// Wholesale description of the panel's arm state.
///
/// Snapshots are authoritative and atomic: a newer snapshot always replaces
/// the previous one in full, never field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub arm_status: ArmStatus,
    /// Index of the active profile. Meaningful only when `arm_status` is
    /// [`ArmStatus::Armed`].
    pub profile_number: u16,
}

/// A named arming configuration, identified by its position in the profile
/// list.
///
/// Profiles are never reordered or removed individually; the panel replaces
/// the whole list when it changes. Index −1 ("disarm") is a UI affordance
/// and never appears in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub name: String,
    /// CAN node ids monitored while this profile is armed.
    pub devices: Vec<u8>,
}

/// One entry of the panel's event log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_secs: u64,
    /// Event category, e.g. `"ARMED"`, `"DISARMED"`, `"ALARM"`.
    pub kind: String,
    /// Free-form detail, e.g. which sensor tripped or which method armed.
    pub detail: String,
}

// ── Canonical state ───────────────────────────────────────────────────────────

/// The canonical application state: the only thing a UI observes.
///
/// Created once per session with [`PanelState::new`] and discarded on
/// teardown. There is no durable storage; the panel itself is the system of
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    pub connection: ConnectionState,
    pub last_error: Option<ErrorInfo>,
    /// Latest known status, `None` until the first snapshot arrives.
    pub status: Option<StatusSnapshot>,
    /// Bounded event log, oldest evicted first on overflow.
    pub past_events: VecDeque<EventRecord>,
    pub alarm_profiles: Vec<ProfileDescriptor>,
    event_cap: usize,
}

impl PanelState {
    /// Creates the initial session state: disconnected, nothing known yet.
    ///
    /// `event_cap` bounds `past_events`; it is fixed for the lifetime of the
    /// state so the reducer stays deterministic.
    pub fn new(event_cap: usize) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            last_error: None,
            status: None,
            past_events: VecDeque::new(),
            alarm_profiles: Vec::new(),
            event_cap,
        }
    }

    /// Maximum number of retained event records.
    pub fn event_cap(&self) -> usize {
        self.event_cap
    }
}

/// Input to the reducer: either a decoded panel event or a connection
/// lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    Inbound(InboundEvent),
    Connection {
        state: ConnectionState,
        error: Option<ErrorInfo>,
    },
}

// ── Reducer ───────────────────────────────────────────────────────────────────

/// Folds one event into the canonical state, returning the new state.
///
/// Rules:
/// - `StatusUpdate` and `ProfilesReplaced` replace their field wholesale.
/// - `EventAppended` appends; the oldest record is evicted once the log
///   exceeds the configured cap.
/// - `ErrorNotice` sets `last_error` but never changes `connection`.
/// - A transition to `Connecting` or `Disconnected` clears `last_error`; a
///   transition to `Errored` records the failure cause. A transition to
///   `Connected` deliberately leaves `status`, `past_events`, and
///   `alarm_profiles` in place: stale data beats a blank screen, and the
///   panel pushes fresh snapshots right after reconnect.
pub fn reduce(mut state: PanelState, event: StateEvent) -> PanelState {
    match event {
        StateEvent::Inbound(InboundEvent::StatusUpdate(snapshot)) => {
            state.status = Some(snapshot);
        }
        StateEvent::Inbound(InboundEvent::EventAppended(record)) => {
            state.past_events.push_back(record);
            while state.past_events.len() > state.event_cap {
                state.past_events.pop_front();
            }
        }
        StateEvent::Inbound(InboundEvent::ProfilesReplaced(profiles)) => {
            state.alarm_profiles = profiles;
        }
        StateEvent::Inbound(InboundEvent::ErrorNotice(info)) => {
            state.last_error = Some(info);
        }
        StateEvent::Connection {
            state: connection,
            error,
        } => {
            state.connection = connection;
            match connection {
                ConnectionState::Connecting | ConnectionState::Disconnected => {
                    state.last_error = None;
                }
                ConnectionState::Errored => {
                    state.last_error = error;
                }
                ConnectionState::Connected => {}
            }
        }
    }
    state
}

// ── Tests ─────────────────────────────────────────────────────────────────────
