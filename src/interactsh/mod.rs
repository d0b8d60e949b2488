// src/interactsh/mod.rs

//! Out-of-band interaction monitor.
//!
//! Wraps a long-lived `interactsh-client` listener process. Interactions the
//! listener reports on stdout are buffered in memory and drained by `poll`
//! with at-most-once delivery per poll caller. At most one session is active
//! per workspace.

pub mod monitor;
pub mod session;

pub use monitor::InteractshMonitor;
pub use session::{InteractionEvent, PollResult, SessionStatus, StatusReport};
