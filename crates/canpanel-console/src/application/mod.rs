//! Application layer use cases for the console.
//!
//! - **`dispatch`** – Validates user intents against the current state
//!   snapshot and forwards them as encoded frames through a [`FrameSink`].
//!   Owns the one repeating-send timer the system allows.
//!
//! - **`sync`** – The single serialized apply path: consumes connection
//!   events in delivery order, folds them into the store, force-cancels the
//!   repeat timer on any transition away from `Connected`, and asks the
//!   panel for fresh snapshots after every reconnect.
//!
//! [`FrameSink`]: dispatch::FrameSink

pub mod dispatch;
pub mod sync;
