// src/exec/mod.rs

//! Process execution: spawning, output capture and termination.
//!
//! The [`runner::ProcessRunner`] implements the sync-vs-background split: a
//! command that exits within the caller's threshold produces a
//! [`runner::SyncResult`]; one that keeps running is handed back as a
//! [`runner::ProcessHandle`] for the job manager to supervise.

pub mod buffer;
pub mod kill;
pub mod runner;

pub use buffer::{OutputBuffer, SharedBuffer};
pub use runner::{Execution, ProcessHandle, ProcessRunner, SyncResult};
