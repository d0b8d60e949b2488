// src/jobs/mod.rs

//! Background job tracking: the job record and state machine, the
//! concurrent-safe store, and the manager that supervises processes.

pub mod job;
pub mod manager;
pub mod store;

pub use job::{Job, JobId, JobState, JobStatus, JobSummary};
pub use manager::{JobManager, SubmitOutcome};
pub use store::JobStore;
