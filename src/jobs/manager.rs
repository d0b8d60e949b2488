// src/jobs/manager.rs

//! Job Manager: orchestrates the process runner and the job store.
//!
//! Each background job gets exactly one supervising task that owns the child
//! process handle. Nothing else signals the process directly; `cancel` only
//! talks to the supervising task, so "process just exited naturally" and
//! "cancel requested" resolve to exactly one terminal transition.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::errors::Result;
use crate::exec::runner::command_preview;
use crate::exec::{Execution, ProcessHandle, ProcessRunner, SyncResult, kill};
use crate::jobs::job::{Job, JobId, JobState, JobStatus, JobSummary};
use crate::jobs::store::{JobStore, SharedJob};

/// Hard ceiling on per-job timeouts (10 hours, for long scans).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(36_000);

/// Bound on waiting for the output readers once the child is gone. A
/// grandchild can hold the pipes open long after the job's own process
/// exited; the job is finalized with whatever output is buffered by then.
const READER_JOIN_GRACE: Duration = Duration::from_secs(3);

/// What `submit` produced.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The command finished within the synchronous threshold; no job exists.
    Sync(SyncResult),
    /// The command keeps running under supervision.
    Background { job_id: JobId },
}

pub struct JobManager {
    store: JobStore,
    runner: ProcessRunner,
    config: ExecutionConfig,
    next_id: AtomicU64,
}

impl JobManager {
    pub fn new(config: ExecutionConfig) -> Arc<Self> {
        Arc::new(Self {
            store: JobStore::new(),
            runner: ProcessRunner::new(&config),
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Run `command` with an overall deadline of `timeout`.
    ///
    /// The command runs synchronously for up to
    /// `min(timeout, sync_threshold)`; if it is still going after that it is
    /// promoted to a background job and the caller gets the job id
    /// immediately.
    pub async fn submit(
        &self,
        command: &str,
        timeout_for_job: Duration,
        cwd: Option<PathBuf>,
    ) -> Result<SubmitOutcome> {
        let timeout_for_job = timeout_for_job.min(MAX_TIMEOUT).max(Duration::from_secs(1));
        let threshold = timeout_for_job.min(self.config.sync_threshold());

        let execution = self
            .runner
            .execute(command, cwd.as_deref(), threshold)
            .await?;

        match execution {
            Execution::Sync(result) => Ok(SubmitOutcome::Sync(result)),
            Execution::Background(handle) => {
                let job_id = self.next_job_id();
                info!(
                    job = %job_id,
                    cmd = %command_preview(command),
                    timeout_secs = timeout_for_job.as_secs(),
                    "promoting command to background job"
                );

                let (state_tx, state_rx) = watch::channel(JobState::Running);
                let (cancel_tx, cancel_rx) = oneshot::channel();

                let job = Job {
                    id: job_id.clone(),
                    command: command.to_string(),
                    state: JobState::Running,
                    started_at: handle.started_at,
                    ended_at: None,
                    timeout: timeout_for_job,
                    exit_code: None,
                    stdout: handle.stdout.clone(),
                    stderr: handle.stderr.clone(),
                    cancel_tx: Some(cancel_tx),
                    state_rx,
                };
                let shared = self.store.put(job).await;

                // Time already burned in the synchronous window counts
                // against the job's overall deadline.
                let remaining = timeout_for_job.saturating_sub(threshold);
                let grace = self.config.cancel_grace();
                tokio::spawn(supervise(
                    handle, shared, state_tx, cancel_rx, remaining, grace,
                ));

                Ok(SubmitOutcome::Background { job_id })
            }
        }
    }

    /// Current snapshot of a job, including partial output while `Running`.
    pub async fn get_status(&self, id: &str) -> Result<JobStatus> {
        let shared = self.store.get(id).await?;
        let job = shared.lock().await;
        Ok(job.status())
    }

    /// All non-evicted job summaries, ordered by start time.
    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        self.store.list().await
    }

    /// Cancel a job. Idempotent: an already-terminal job returns its state
    /// unchanged; a running job is signalled (SIGTERM, grace, SIGKILL) and
    /// this call waits for the terminal transition before returning.
    pub async fn cancel(&self, id: &str) -> Result<JobState> {
        let shared = self.store.get(id).await?;

        let mut state_rx = {
            let mut job = shared.lock().await;
            if job.state.is_terminal() {
                debug!(job = %id, state = ?job.state, "cancel on terminal job is a no-op");
                return Ok(job.state);
            }
            if let Some(tx) = job.cancel_tx.take() {
                // The supervising task may have finished just now; a failed
                // send means a terminal transition is already on its way.
                let _ = tx.send(());
            }
            job.state_rx.clone()
        };

        // The supervisor resolves within grace + kill; the margin covers
        // scheduling slack, not a longer wait for the process.
        let bound = self.config.cancel_grace() + Duration::from_secs(10);
        let waited = timeout(bound, async {
            loop {
                let state = *state_rx.borrow_and_update();
                if state.is_terminal() {
                    return state;
                }
                if state_rx.changed().await.is_err() {
                    return *state_rx.borrow();
                }
            }
        })
        .await;

        match waited {
            Ok(state) => Ok(state),
            Err(_) => {
                warn!(job = %id, "timed out waiting for cancellation to finalize");
                Ok(shared.lock().await.state)
            }
        }
    }

    /// Remove a finished job immediately (explicit acknowledgment).
    pub async fn evict(&self, id: &str) -> Result<()> {
        self.store.evict(id).await
    }

    /// Periodic sweep evicting jobs past the retention window.
    pub fn spawn_eviction_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(manager.config.sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cutoff = SystemTime::now() - manager.config.retention();
                let evicted = manager.store.evict_finished_before(cutoff).await;
                if evicted > 0 {
                    info!(evicted, "retention sweep evicted finished jobs");
                }
            }
        })
    }

    /// Cancel all running jobs and wait (bounded) for their processes to be
    /// reaped. Used on process-wide shutdown.
    pub async fn shutdown(&self) {
        let jobs = self.store.all().await;
        let mut waiters: Vec<watch::Receiver<JobState>> = Vec::new();

        for shared in jobs {
            let mut job = shared.lock().await;
            if !job.state.is_terminal() {
                info!(job = %job.id, "cancelling running job for shutdown");
                if let Some(tx) = job.cancel_tx.take() {
                    let _ = tx.send(());
                }
                waiters.push(job.state_rx.clone());
            }
        }

        let bound = self.config.cancel_grace() + Duration::from_secs(5);
        for mut rx in waiters {
            let _ = timeout(bound, async {
                loop {
                    if rx.borrow_and_update().is_terminal() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        }
    }

    fn next_job_id(&self) -> JobId {
        format!("job-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

enum Ending {
    Natural(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Supervise one background job to its single terminal transition.
///
/// Owns the child exclusively. Waits for natural exit, the job deadline, or
/// a cancel signal, whichever comes first, then finalizes output and state
/// atomically (under the job lock) before publishing the transition.
async fn supervise(
    mut handle: ProcessHandle,
    shared: SharedJob,
    state_tx: watch::Sender<JobState>,
    mut cancel_rx: oneshot::Receiver<()>,
    remaining: Duration,
    grace: Duration,
) {
    let job_id = { shared.lock().await.id.clone() };

    let ending = tokio::select! {
        res = handle.child.wait() => Ending::Natural(res),
        _ = sleep(remaining) => Ending::TimedOut,
        res = &mut cancel_rx => match res {
            Ok(()) => Ending::Cancelled,
            // Sender dropped without firing (job record gone before the
            // process finished should not happen; fall back to waiting).
            Err(_) => Ending::Natural(handle.child.wait().await),
        },
    };

    let (state, exit_code) = match ending {
        Ending::Natural(Ok(status)) => {
            let read_failed = join_readers(&job_id, &mut handle.readers).await;
            if status.success() && !read_failed {
                (JobState::Completed, status.code())
            } else {
                (JobState::Failed, status.code())
            }
        }
        Ending::Natural(Err(err)) => {
            error!(job = %job_id, error = %err, "waiting on child process failed");
            join_readers(&job_id, &mut handle.readers).await;
            (JobState::Failed, None)
        }
        Ending::TimedOut => {
            info!(job = %job_id, "job deadline reached; terminating process");
            if let Err(err) = kill::terminate(&mut handle.child, grace).await {
                warn!(job = %job_id, error = %err, "error terminating timed-out process");
            }
            join_readers(&job_id, &mut handle.readers).await;
            (JobState::TimedOut, None)
        }
        Ending::Cancelled => {
            info!(job = %job_id, "cancellation requested; terminating process");
            if let Err(err) = kill::terminate(&mut handle.child, grace).await {
                warn!(job = %job_id, error = %err, "error terminating cancelled process");
            }
            join_readers(&job_id, &mut handle.readers).await;
            (JobState::Cancelled, None)
        }
    };

    // Finalize output and state together: the job lock covers both, so no
    // caller ever observes a terminal state with half-finished buffers.
    {
        let mut job = shared.lock().await;
        job.apply_terminal(state, exit_code);
    }
    let _ = state_tx.send(state);

    info!(job = %job_id, state = ?state, exit_code = ?exit_code, "job reached terminal state");
}

/// Join the output reader tasks; returns true if any stream failed past its
/// retry budget.
///
/// The join is bounded by [`READER_JOIN_GRACE`]: a reader still blocked on a
/// pipe some grandchild holds open is aborted so the terminal transition
/// follows the real process exit, not the grandchild's EOF. An abandoned
/// reader is not a stream failure.
async fn join_readers(
    job_id: &str,
    readers: &mut Vec<JoinHandle<std::io::Result<()>>>,
) -> bool {
    let deadline = Instant::now() + READER_JOIN_GRACE;
    let mut failed = false;
    for mut handle in readers.drain(..) {
        let left = deadline.saturating_duration_since(Instant::now());
        match timeout(left, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                warn!(job = %job_id, error = %err, "output stream reader failed");
                failed = true;
            }
            Ok(Err(err)) => {
                error!(job = %job_id, error = %err, "output stream reader panicked");
                failed = true;
            }
            Err(_elapsed) => {
                warn!(
                    job = %job_id,
                    "output pipe still held after process exit; abandoning reader"
                );
                handle.abort();
            }
        }
    }
    failed
}
