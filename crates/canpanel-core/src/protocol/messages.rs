//! All CanPanel wire message types.
//!
//! The panel pushes [`InboundEvent`]s; the console sends [`WireCommand`]s.
//! Both travel in the frame format defined in [`crate::protocol::codec`].

use serde::{Deserialize, Serialize};

use crate::domain::command::RawFrame;
use crate::domain::state::{ErrorInfo, EventRecord, ProfileDescriptor, StatusSnapshot};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 32;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes on the wire.
///
/// Panel-to-console events occupy 0x01–0x0F; console-to-panel commands
/// occupy 0x10–0x2F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Panel → console (0x01–0x0F)
    Status = 0x01,
    Event = 0x02,
    Profiles = 0x03,
    ErrorNotice = 0x04,
    // Console → panel (0x10–0x2F)
    Disarm = 0x10,
    Arm = 0x11,
    ClearData = 0x12,
    TestAlarm = 0x13,
    GetAttention = 0x14,
    ToggleGarageDoor = 0x15,
    Raw = 0x16,
    RequestStatus = 0x20,
    RequestEvents = 0x21,
    RequestProfiles = 0x22,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Status),
            0x02 => Ok(MessageType::Event),
            0x03 => Ok(MessageType::Profiles),
            0x04 => Ok(MessageType::ErrorNotice),
            0x10 => Ok(MessageType::Disarm),
            0x11 => Ok(MessageType::Arm),
            0x12 => Ok(MessageType::ClearData),
            0x13 => Ok(MessageType::TestAlarm),
            0x14 => Ok(MessageType::GetAttention),
            0x15 => Ok(MessageType::ToggleGarageDoor),
            0x16 => Ok(MessageType::Raw),
            0x20 => Ok(MessageType::RequestStatus),
            0x21 => Ok(MessageType::RequestEvents),
            0x22 => Ok(MessageType::RequestProfiles),
            _ => Err(()),
        }
    }
}

// ── Panel → console ───────────────────────────────────────────────────────────

/// One decoded unit of inbound data from the panel.
///
/// Every variant maps one-to-one onto a reducer rule; decoding a frame and
/// folding it into [`crate::PanelState`] is the whole inbound pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Authoritative, atomically-replacing arm-state snapshot.
    StatusUpdate(StatusSnapshot),
    /// One new entry for the bounded event log.
    EventAppended(EventRecord),
    /// The full profile list, replacing whatever the console held.
    ProfilesReplaced(Vec<ProfileDescriptor>),
    /// A panel-side fault report; does not affect connection state.
    ErrorNotice(ErrorInfo),
}

impl InboundEvent {
    /// Returns the [`MessageType`] discriminant for this event.
    pub fn message_type(&self) -> MessageType {
        match self {
            InboundEvent::StatusUpdate(_) => MessageType::Status,
            InboundEvent::EventAppended(_) => MessageType::Event,
            InboundEvent::ProfilesReplaced(_) => MessageType::Profiles,
            InboundEvent::ErrorNotice(_) => MessageType::ErrorNotice,
        }
    }
}

// ── Console → panel ───────────────────────────────────────────────────────────

/// One encodable unit of outbound command traffic.
///
/// The dispatcher maps validated [`crate::OutboundCommand`] intents onto
/// these; the `Request*` variants are issued by the sync loop after every
/// reconnect so the panel re-pushes its snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    Disarm,
    Arm { profile: u16 },
    ClearData,
    TestAlarm,
    GetAttention,
    ToggleGarageDoor,
    Raw(RawFrame),
    RequestStatus,
    RequestEvents,
    RequestProfiles,
}

impl WireCommand {
    /// Returns the [`MessageType`] discriminant for this command.
    pub fn message_type(&self) -> MessageType {
        match self {
            WireCommand::Disarm => MessageType::Disarm,
            WireCommand::Arm { .. } => MessageType::Arm,
            WireCommand::ClearData => MessageType::ClearData,
            WireCommand::TestAlarm => MessageType::TestAlarm,
            WireCommand::GetAttention => MessageType::GetAttention,
            WireCommand::ToggleGarageDoor => MessageType::ToggleGarageDoor,
            WireCommand::Raw(_) => MessageType::Raw,
            WireCommand::RequestStatus => MessageType::RequestStatus,
            WireCommand::RequestEvents => MessageType::RequestEvents,
            WireCommand::RequestProfiles => MessageType::RequestProfiles,
        }
    }
}
