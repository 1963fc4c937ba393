//! Binary codec for CanPanel wire frames.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][correlation:16][payload:N]
//! ```
//! Total header size: 32 bytes. All multi-byte integers are big-endian.
//! `correlation` is a UUID stamped by the sender so panel-side logs can tie
//! a command to its origin; panel pushes carry the nil UUID.
//!
//! Frames are self-delimiting: `payload_len` tells the reader exactly how
//! many bytes follow the header, so a stream reader never needs a scan or a
//! sentinel.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::state::{ArmStatus, ErrorInfo, EventRecord, ProfileDescriptor, StatusSnapshot};
use crate::protocol::messages::{
    InboundEvent, MessageType, WireCommand, HEADER_SIZE, PROTOCOL_VERSION,
};

/// Errors raised while decoding an inbound frame.
///
/// A decode failure never mutates canonical state: the connection manager
/// logs it and drops the frame.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The message type is valid but flows console-to-panel, so it can never
    /// arrive here.
    #[error("message type 0x{0:02X} is not a panel-to-console event")]
    UnexpectedDirection(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8
    /// error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`WireCommand`] into a byte vector including the 32-byte header.
///
/// The sequence number is **not** set by this function – pass a
/// pre-incremented value from a [`crate::protocol::SequenceCounter`].
///
/// Encoding is infallible: [`crate::RawFrame`] fields are validated at
/// construction, and every other payload is fixed-width.
///
/// # Examples
///
/// ```rust
/// use canpanel_core::protocol::{encode_command, messages::WireCommand};
/// use uuid::Uuid;
///
/// let bytes = encode_command(&WireCommand::Disarm, 0, Uuid::nil());
/// assert_eq!(bytes.len(), 32); // empty payload, header only
/// assert_eq!(bytes[1], 0x10); // Disarm type code
/// ```
pub fn encode_command(cmd: &WireCommand, sequence_number: u64, correlation: Uuid) -> Vec<u8> {
    let payload = encode_command_payload(cmd);
    let mut buf = header(cmd.message_type(), payload.len(), sequence_number, correlation);
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes one [`InboundEvent`] from the beginning of `bytes`.
///
/// Returns the decoded event and the total number of bytes consumed (header
/// + payload), so the caller can advance its read cursor.
///
/// Decode is pure and total over well-formed input; any malformation yields
/// a [`DecodeError`] and leaves the caller free to drop the frame.
///
/// # Errors
///
/// Returns [`DecodeError`] if the bytes are malformed.
pub fn decode_event(bytes: &[u8]) -> Result<(InboundEvent, usize), DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| DecodeError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(DecodeError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    // seq (bytes 8..16) and correlation (bytes 16..32) are carried for
    // diagnostics only; no reordering or reassembly happens at this layer.

    let payload = &bytes[HEADER_SIZE..total_needed];
    let event = decode_event_payload(msg_type, payload)?;
    Ok((event, total_needed))
}

fn header(
    msg_type: MessageType,
    payload_len: usize,
    sequence_number: u64,
    correlation: Uuid,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
    buf.push(PROTOCOL_VERSION);
    buf.push(msg_type as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(payload_len as u32).to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(correlation.as_bytes());
    buf
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_command_payload(cmd: &WireCommand) -> Vec<u8> {
    let mut buf = Vec::new();
    match cmd {
        WireCommand::Arm { profile } => buf.extend_from_slice(&profile.to_be_bytes()),
        WireCommand::Raw(frame) => {
            buf.push(frame.sender);
            buf.push(frame.receiver);
            buf.push(frame.message);
            buf.push(frame.frame_type);
        }
        // All remaining commands carry no payload.
        WireCommand::Disarm
        | WireCommand::ClearData
        | WireCommand::TestAlarm
        | WireCommand::GetAttention
        | WireCommand::ToggleGarageDoor
        | WireCommand::RequestStatus
        | WireCommand::RequestEvents
        | WireCommand::RequestProfiles => {}
    }
    buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_event_payload(msg_type: MessageType, payload: &[u8]) -> Result<InboundEvent, DecodeError> {
    match msg_type {
        MessageType::Status => decode_status(payload).map(InboundEvent::StatusUpdate),
        MessageType::Event => decode_event_record(payload).map(InboundEvent::EventAppended),
        MessageType::Profiles => decode_profiles(payload).map(InboundEvent::ProfilesReplaced),
        MessageType::ErrorNotice => decode_error_notice(payload).map(InboundEvent::ErrorNotice),
        other => Err(DecodeError::UnexpectedDirection(other as u8)),
    }
}

fn decode_status(p: &[u8]) -> Result<StatusSnapshot, DecodeError> {
    // 1 (arm_status) + 2 (profile_number) = 3
    require_len(p, 3, "Status")?;
    let arm_status = ArmStatus::try_from(p[0])
        .map_err(|_| DecodeError::MalformedPayload(format!("unknown arm status: {}", p[0])))?;
    let profile_number = u16::from_be_bytes([p[1], p[2]]);
    Ok(StatusSnapshot {
        arm_status,
        profile_number,
    })
}

fn decode_event_record(p: &[u8]) -> Result<EventRecord, DecodeError> {
    // 8 (timestamp) + 2 (kind len) + 2 (detail len) minimum
    require_len(p, 12, "Event")?;
    let timestamp_secs = read_u64(p, 0)?;
    let (kind, kind_end) = read_length_prefixed_string(p, 8)?;
    let (detail, _) = read_length_prefixed_string(p, kind_end)?;
    Ok(EventRecord {
        timestamp_secs,
        kind,
        detail,
    })
}

fn decode_profiles(p: &[u8]) -> Result<Vec<ProfileDescriptor>, DecodeError> {
    require_len(p, 1, "Profiles")?;
    let count = p[0] as usize;
    let mut profiles = Vec::with_capacity(count);
    let mut off = 1;
    for _ in 0..count {
        let (name, name_end) = read_length_prefixed_string(p, off)?;
        require_len(p, name_end + 1, "Profiles.device_count")?;
        let device_count = p[name_end] as usize;
        let devices_end = name_end + 1 + device_count;
        require_len(p, devices_end, "Profiles.devices")?;
        let devices = p[name_end + 1..devices_end].to_vec();
        profiles.push(ProfileDescriptor { name, devices });
        off = devices_end;
    }
    Ok(profiles)
}

fn decode_error_notice(p: &[u8]) -> Result<ErrorInfo, DecodeError> {
    let (message, _) = read_length_prefixed_string(p, 0)?;
    Ok(ErrorInfo { message })
}

// ── Panel-side encoders (test and simulator support) ──────────────────────────

/// Encodes an [`InboundEvent`] the way the panel does.
///
/// The shipping console never calls this; it exists so tests and panel
/// simulators can produce byte-exact inbound traffic.
pub fn encode_event(event: &InboundEvent, sequence_number: u64) -> Vec<u8> {
    let payload = encode_event_payload(event);
    let mut buf = header(event.message_type(), payload.len(), sequence_number, Uuid::nil());
    buf.extend_from_slice(&payload);
    buf
}

fn encode_event_payload(event: &InboundEvent) -> Vec<u8> {
    let mut buf = Vec::new();
    match event {
        InboundEvent::StatusUpdate(s) => {
            buf.push(s.arm_status as u8);
            buf.extend_from_slice(&s.profile_number.to_be_bytes());
        }
        InboundEvent::EventAppended(r) => {
            buf.extend_from_slice(&r.timestamp_secs.to_be_bytes());
            write_length_prefixed_string(&mut buf, &r.kind);
            write_length_prefixed_string(&mut buf, &r.detail);
        }
        InboundEvent::ProfilesReplaced(profiles) => {
            buf.push(profiles.len().min(u8::MAX as usize) as u8);
            for profile in profiles.iter().take(u8::MAX as usize) {
                write_length_prefixed_string(&mut buf, &profile.name);
                buf.push(profile.devices.len().min(u8::MAX as usize) as u8);
                buf.extend_from_slice(&profile.devices[..profile.devices.len().min(u8::MAX as usize)]);
            }
        }
        InboundEvent::ErrorNotice(info) => {
            write_length_prefixed_string(&mut buf, &info.message);
        }
    }
    buf
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), DecodeError> {
    if buf.len() < needed {
        Err(DecodeError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, DecodeError> {
    if buf.len() < offset + 8 {
        return Err(DecodeError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    Ok(u64::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ]))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), DecodeError> {
    if buf.len() < offset + 2 {
        return Err(DecodeError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(DecodeError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| DecodeError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::RawFrame;

    fn round_trip(event: &InboundEvent) -> InboundEvent {
        let encoded = encode_event(event, 7);
        let (decoded, consumed) = decode_event(&encoded).expect("decode failed");
        assert_eq!(
            consumed,
            encoded.len(),
            "consumed bytes should equal total encoded size"
        );
        decoded
    }

    // ── Status ───────────────────────────────────────────────────────────────

    #[test]
    fn test_status_armed_round_trip() {
        let event = InboundEvent::StatusUpdate(StatusSnapshot {
            arm_status: ArmStatus::Armed,
            profile_number: 2,
        });
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_status_unknown_round_trip() {
        let event = InboundEvent::StatusUpdate(StatusSnapshot {
            arm_status: ArmStatus::Unknown,
            profile_number: 0,
        });
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_status_rejects_unknown_arm_byte() {
        let mut bytes = encode_event(
            &InboundEvent::StatusUpdate(StatusSnapshot {
                arm_status: ArmStatus::Armed,
                profile_number: 0,
            }),
            0,
        );
        bytes[HEADER_SIZE] = 0x42; // corrupt the arm_status byte
        assert!(matches!(
            decode_event(&bytes),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    // ── Event ────────────────────────────────────────────────────────────────

    #[test]
    fn test_event_record_round_trip() {
        let event = InboundEvent::EventAppended(EventRecord {
            timestamp_secs: 1_700_000_123,
            kind: "ALARM".to_string(),
            detail: "garage motion sensor 0x80".to_string(),
        });
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_event_record_with_empty_strings_round_trip() {
        let event = InboundEvent::EventAppended(EventRecord {
            timestamp_secs: 0,
            kind: String::new(),
            detail: String::new(),
        });
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_event_record_truncated_detail_is_malformed() {
        let full = encode_event(
            &InboundEvent::EventAppended(EventRecord {
                timestamp_secs: 1,
                kind: "ARMED".to_string(),
                detail: "button".to_string(),
            }),
            0,
        );
        // Chop off the last 3 payload bytes but leave the declared
        // payload_len intact so only the string read fails.
        let mut bytes = full[..full.len() - 3].to_vec();
        let new_payload_len = (bytes.len() - HEADER_SIZE) as u32;
        bytes[4..8].copy_from_slice(&new_payload_len.to_be_bytes());
        assert!(matches!(
            decode_event(&bytes),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    // ── Profiles ─────────────────────────────────────────────────────────────

    #[test]
    fn test_profiles_round_trip() {
        let event = InboundEvent::ProfilesReplaced(vec![
            ProfileDescriptor {
                name: "Away".to_string(),
                devices: vec![0x30, 0x31, 0x75, 0x80],
            },
            ProfileDescriptor {
                name: "Night".to_string(),
                devices: vec![0x30, 0x31],
            },
            ProfileDescriptor {
                name: "Garage only".to_string(),
                devices: vec![0x80],
            },
        ]);
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_profiles_empty_list_round_trip() {
        let event = InboundEvent::ProfilesReplaced(vec![]);
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn test_profiles_with_no_devices_round_trip() {
        let event = InboundEvent::ProfilesReplaced(vec![ProfileDescriptor {
            name: "Silent".to_string(),
            devices: vec![],
        }]);
        assert_eq!(round_trip(&event), event);
    }

    // ── ErrorNotice ──────────────────────────────────────────────────────────

    #[test]
    fn test_error_notice_round_trip() {
        let event = InboundEvent::ErrorNotice(ErrorInfo::new("serial bus desync"));
        assert_eq!(round_trip(&event), event);
    }

    // ── Command encoding ─────────────────────────────────────────────────────

    #[test]
    fn test_disarm_is_header_only() {
        let bytes = encode_command(&WireCommand::Disarm, 3, Uuid::nil());
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes[1], MessageType::Disarm as u8);
    }

    #[test]
    fn test_arm_carries_profile_number() {
        let bytes = encode_command(&WireCommand::Arm { profile: 0x0102 }, 0, Uuid::nil());
        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(bytes[1], MessageType::Arm as u8);
        assert_eq!(&bytes[HEADER_SIZE..], &[0x01, 0x02]);
    }

    #[test]
    fn test_raw_frame_payload_bytes_in_bus_order() {
        let frame = RawFrame::parse("0x75", "0x14", "0xAA", "0x00").unwrap();
        let bytes = encode_command(&WireCommand::Raw(frame), 0, Uuid::nil());
        assert_eq!(&bytes[HEADER_SIZE..], &[0x75, 0x14, 0xAA, 0x00]);
    }

    #[test]
    fn test_refresh_requests_are_header_only() {
        for cmd in [
            WireCommand::RequestStatus,
            WireCommand::RequestEvents,
            WireCommand::RequestProfiles,
        ] {
            let bytes = encode_command(&cmd, 0, Uuid::nil());
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(bytes[1], cmd.message_type() as u8);
        }
    }

    #[test]
    fn test_header_encodes_sequence_number_correctly() {
        let seq = 0x1234_5678_9ABC_DEF0u64;
        let bytes = encode_command(&WireCommand::TestAlarm, seq, Uuid::nil());
        let decoded_seq = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(decoded_seq, seq);
    }

    #[test]
    fn test_header_encodes_correlation_uuid() {
        let correlation = Uuid::new_v4();
        let bytes = encode_command(&WireCommand::ClearData, 0, correlation);
        assert_eq!(&bytes[16..32], correlation.as_bytes());
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_event(&[]);
        assert!(matches!(result, Err(DecodeError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_header_returns_insufficient_data() {
        let result = decode_event(&[0x01, 0x02]); // only 2 bytes
        assert!(matches!(result, Err(DecodeError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = PROTOCOL_VERSION;
        bytes[1] = 0xEE; // unknown type
        let result = decode_event(&bytes);
        assert!(matches!(result, Err(DecodeError::UnknownMessageType(0xEE))));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = 0x99; // wrong version
        bytes[1] = MessageType::Status as u8;
        let result = decode_event(&bytes);
        assert!(matches!(result, Err(DecodeError::UnsupportedVersion(0x99))));
    }

    #[test]
    fn test_decode_command_type_returns_unexpected_direction() {
        // A Disarm frame flows console-to-panel; receiving one is a protocol
        // violation, not a crash.
        let bytes = encode_command(&WireCommand::Disarm, 0, Uuid::nil());
        let result = decode_event(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::UnexpectedDirection(0x10))
        ));
    }

    #[test]
    fn test_decode_payload_length_exceeds_available_returns_error() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = PROTOCOL_VERSION;
        bytes[1] = MessageType::Status as u8;
        // Declare 100 bytes of payload, but provide none
        bytes[4..8].copy_from_slice(&100u32.to_be_bytes());
        let result = decode_event(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::PayloadLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_in_event_kind_is_malformed() {
        let mut bytes = encode_event(
            &InboundEvent::EventAppended(EventRecord {
                timestamp_secs: 1,
                kind: "AB".to_string(),
                detail: String::new(),
            }),
            0,
        );
        // kind bytes start after 8 (timestamp) + 2 (length prefix)
        bytes[HEADER_SIZE + 10] = 0xFF;
        bytes[HEADER_SIZE + 11] = 0xFE;
        assert!(matches!(
            decode_event(&bytes),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_consumes_exactly_one_frame_from_a_stream() {
        // Two frames back to back: decode must report the first frame's
        // length so the caller can resume at the second.
        let first = encode_event(
            &InboundEvent::StatusUpdate(StatusSnapshot {
                arm_status: ArmStatus::Armed,
                profile_number: 1,
            }),
            0,
        );
        let second = encode_event(&InboundEvent::ErrorNotice(ErrorInfo::new("x")), 1);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let (event, consumed) = decode_event(&stream).unwrap();
        assert_eq!(consumed, first.len());
        assert!(matches!(event, InboundEvent::StatusUpdate(_)));

        let (event, _) = decode_event(&stream[consumed..]).unwrap();
        assert!(matches!(event, InboundEvent::ErrorNotice(_)));
    }
}
