//! Protocol module containing the wire message types and the binary codec.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_event, encode_command, DecodeError};
pub use messages::*;
pub use sequence::SequenceCounter;
