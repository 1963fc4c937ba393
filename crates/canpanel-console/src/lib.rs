//! canpanel-console library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the console do?
//!
//! The console is the supervisory client for a CAN-bus alarm controller.
//! The controller is the single source of truth; the console:
//!
//! 1. Keeps one persistent TCP connection to the controller alive,
//!    reconnecting with capped exponential backoff whenever it drops.
//! 2. Decodes the controller's pushes (status, events, profiles, faults)
//!    and folds them into one canonical [`canpanel_core::PanelState`]
//!    through a single serialized apply path.
//! 3. Publishes immutable state snapshots to subscribers (the UI) on
//!    every change.
//! 4. Validates user intents against the current snapshot and forwards
//!    them as encoded command frames, rejecting (never queueing) while
//!    the connection is down.

/// Application layer: command dispatch and the panel sync loop.
pub mod application;

/// Infrastructure layer: socket connection, state store, configuration.
pub mod infrastructure;
