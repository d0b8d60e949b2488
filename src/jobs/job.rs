// src/jobs/job.rs

//! The job record and its state machine.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::exec::SharedBuffer;
use crate::exec::runner::command_preview;

pub type JobId = String;

/// Job lifecycle states. `Running` is the only non-terminal state; a job
/// transitions out of it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// One tracked background command execution.
///
/// The supervising task is the only writer of terminal state; everyone else
/// reads snapshots. The process handle itself never lives here; it is owned
/// exclusively by the supervising task in the job manager.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,
    /// Overall deadline requested for this job.
    pub timeout: Duration,
    /// Set only on terminal states reached via normal process exit.
    pub exit_code: Option<i32>,
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
    /// Taken by the first `cancel` call; signals the supervising task.
    pub(crate) cancel_tx: Option<oneshot::Sender<()>>,
    /// Observes terminal transitions published by the supervising task.
    pub(crate) state_rx: watch::Receiver<JobState>,
}

impl Job {
    /// Apply a terminal transition. Forward-only: once terminal, further
    /// calls are ignored (the state machine has no transitions out of
    /// terminal states).
    pub(crate) fn apply_terminal(&mut self, state: JobState, exit_code: Option<i32>) {
        if self.state.is_terminal() {
            return;
        }
        debug_assert!(state.is_terminal());
        self.state = state;
        self.exit_code = exit_code;
        self.ended_at = Some(SystemTime::now());
    }

    pub fn runtime(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(SystemTime::now);
        end.duration_since(self.started_at).unwrap_or(Duration::ZERO)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            command: command_preview(&self.command),
            state: self.state,
            started_at: unix_secs(self.started_at),
            ended_at: self.ended_at.map(unix_secs),
            runtime_secs: self.runtime().as_secs_f64(),
            timeout_secs: self.timeout.as_secs(),
            exit_code: self.exit_code,
        }
    }

    pub fn status(&self) -> JobStatus {
        let (stdout, stdout_trunc) = {
            let buf = self.stdout.lock().expect("stdout buffer poisoned");
            (buf.to_string_lossy(), buf.truncated())
        };
        let (stderr, stderr_trunc) = {
            let buf = self.stderr.lock().expect("stderr buffer poisoned");
            (buf.to_string_lossy(), buf.truncated())
        };

        JobStatus {
            job_id: self.id.clone(),
            command: self.command.clone(),
            state: self.state,
            runtime_secs: self.runtime().as_secs_f64(),
            stdout,
            stderr,
            exit_code: self.exit_code,
            truncated: stdout_trunc || stderr_trunc,
        }
    }
}

/// Compact listing entry, without output buffers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub command: String,
    pub state: JobState,
    pub started_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<f64>,
    pub runtime_secs: f64,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Full snapshot including (possibly partial) output.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub command: String,
    pub state: JobState,
    pub runtime_secs: f64,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

pub(crate) fn unix_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::OutputBuffer;

    fn running_job(id: &str) -> (Job, watch::Sender<JobState>) {
        let (state_tx, state_rx) = watch::channel(JobState::Running);
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let job = Job {
            id: id.to_string(),
            command: "sleep 999".to_string(),
            state: JobState::Running,
            started_at: SystemTime::now(),
            ended_at: None,
            timeout: Duration::from_secs(300),
            exit_code: None,
            stdout: OutputBuffer::shared(1024),
            stderr: OutputBuffer::shared(1024),
            cancel_tx: Some(cancel_tx),
            state_rx,
        };
        (job, state_tx)
    }

    #[test]
    fn terminal_transition_is_applied_once() {
        let (mut job, _tx) = running_job("job-1");

        job.apply_terminal(JobState::Completed, Some(0));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.exit_code, Some(0));
        let ended = job.ended_at;
        assert!(ended.is_some());

        // A second transition must not overwrite the first.
        job.apply_terminal(JobState::Failed, Some(1));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.exit_code, Some(0));
        assert_eq!(job.ended_at, ended);
    }

    #[test]
    fn status_snapshot_reflects_buffers() {
        let (job, _tx) = running_job("job-2");
        job.stdout
            .lock()
            .unwrap()
            .append(b"partial output so far");

        let status = job.status();
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.stdout, "partial output so far");
        assert!(!status.truncated);
        assert!(status.exit_code.is_none());
    }
}
