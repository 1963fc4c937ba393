//! User command intents and the raw CAN frame they may carry.
//!
//! [`OutboundCommand`] is the complete vocabulary the presentation layer may
//! dispatch. The dispatcher validates an intent against the current state
//! snapshot, maps it to a wire command, and hands the encoded bytes to the
//! connection manager; intents never touch canonical state themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection of malformed user input, raised before any transport I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A raw-frame field did not parse as a single hex byte (0x00–0xFF).
    #[error("field `{field}` is not a hex byte: {value:?}")]
    InvalidHexByte { field: &'static str, value: String },

    /// A repeating send was requested with a zero interval.
    #[error("repeat interval must be greater than zero")]
    ZeroInterval,
}

/// One raw device-level CAN message: sender id, receiver id, message byte,
/// and device-type byte, exactly as the bus carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub sender: u8,
    pub receiver: u8,
    pub message: u8,
    pub frame_type: u8,
}

impl RawFrame {
    /// Builds a frame from the four hex-string fields a UI collects.
    ///
    /// Accepts `"0x75"` and `"75"` forms. Each field must parse to a single
    /// byte; the first field that does not fails the whole parse, so nothing
    /// half-validated can reach the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidHexByte`] naming the offending
    /// field.
    pub fn parse(
        sender: &str,
        receiver: &str,
        message: &str,
        frame_type: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            sender: parse_hex_byte("sender", sender)?,
            receiver: parse_hex_byte("receiver", receiver)?,
            message: parse_hex_byte("message", message)?,
            frame_type: parse_hex_byte("type", frame_type)?,
        })
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:#04x}-{:#04x}-{:#04x}-{:#04x}",
            self.sender, self.receiver, self.message, self.frame_type
        )
    }
}

fn parse_hex_byte(field: &'static str, raw: &str) -> Result<u8, ValidationError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ValidationError::InvalidHexByte {
            field,
            value: raw.to_string(),
        });
    }
    u8::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidHexByte {
        field,
        value: raw.to_string(),
    })
}

/// Everything the presentation layer is allowed to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Disarm the panel.
    Disarm,
    /// Arm the panel under the profile at the given index.
    ArmWithProfile(usize),
    /// Clear the panel's accumulated event history.
    ClearData,
    /// Sound the alarm devices briefly as a test.
    TestAlarm,
    /// Ring the attention chime on paired phones.
    GetAttention,
    /// Toggle the garage door relay.
    ToggleGarageDoor,
    /// Put one raw frame on the CAN bus.
    SendFrameOnce(RawFrame),
    /// Re-send the frame every `interval` until stopped or disconnected.
    SendFrameRepeatedly { frame: RawFrame, interval: Duration },
    /// Cancel the repeating send, if any. Safe to issue when none is active.
    StopSendingFrame,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_prefixed_hex() {
        let frame = RawFrame::parse("0x75", "0x14", "0xAA", "0x00").unwrap();
        assert_eq!(
            frame,
            RawFrame {
                sender: 0x75,
                receiver: 0x14,
                message: 0xAA,
                frame_type: 0x00,
            }
        );
    }

    #[test]
    fn test_parse_accepts_bare_hex_and_whitespace() {
        let frame = RawFrame::parse(" 75 ", "14", "aa", "00").unwrap();
        assert_eq!(frame.sender, 0x75);
        assert_eq!(frame.message, 0xAA);
    }

    #[test]
    fn test_parse_rejects_value_above_byte_range() {
        let result = RawFrame::parse("0x100", "0x14", "0xAA", "0x00");
        assert_eq!(
            result,
            Err(ValidationError::InvalidHexByte {
                field: "sender",
                value: "0x100".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_non_hex_garbage() {
        let result = RawFrame::parse("0x75", "door", "0xAA", "0x00");
        assert!(matches!(
            result,
            Err(ValidationError::InvalidHexByte { field: "receiver", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_field() {
        let result = RawFrame::parse("0x75", "0x14", "", "0x00");
        assert!(matches!(
            result,
            Err(ValidationError::InvalidHexByte { field: "message", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bare_prefix() {
        let result = RawFrame::parse("0x75", "0x14", "0xAA", "0x");
        assert!(matches!(
            result,
            Err(ValidationError::InvalidHexByte { field: "type", .. })
        ));
    }

    #[test]
    fn test_display_formats_like_the_bus() {
        let frame = RawFrame::parse("0x75", "0x14", "0xAA", "0x00").unwrap();
        assert_eq!(frame.to_string(), "0x75-0x14-0xaa-0x00");
    }
}
