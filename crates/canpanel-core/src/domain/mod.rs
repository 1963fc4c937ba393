//! Domain module: canonical state, the reducer, and user command intents.

pub mod command;
pub mod state;

pub use command::{OutboundCommand, RawFrame, ValidationError};
pub use state::*;
