//! # canpanel-core
//!
//! Shared library for CanPanel containing the wire protocol codec, the
//! canonical application state, and the pure reducer that folds inbound
//! panel events into it.
//!
//! This crate is used by the console application and by any future
//! headless tooling that speaks to the panel. It has zero dependencies on
//! sockets, OS APIs, or UI frameworks.
//!
//! # Architecture overview
//!
//! CanPanel is a supervisory console for a CAN-bus alarm controller (alarm
//! panel, garage door, sirens, motion and door sensors) reachable over a
//! persistent TCP connection. The controller is the single source of truth;
//! the console mirrors its state and forwards user intents.
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the socket. Panel events and
//!   console commands are encoded into a compact binary format (32-byte
//!   header + payload) and decoded back into typed Rust values.
//!
//! - **`domain`** – Pure business logic: the canonical [`PanelState`]
//!   snapshot, the [`reduce`] function that is its sole mutator, and the
//!   [`OutboundCommand`] intents a UI may dispatch.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `canpanel_core::PanelState` instead of the full module path.
pub use domain::command::{OutboundCommand, RawFrame, ValidationError};
pub use domain::state::{
    reduce, ArmStatus, ConnectionState, ErrorInfo, EventRecord, PanelState, ProfileDescriptor,
    StateEvent, StatusSnapshot,
};
pub use protocol::codec::{decode_event, encode_command, DecodeError};
pub use protocol::messages::{InboundEvent, WireCommand};
pub use protocol::sequence::SequenceCounter;
