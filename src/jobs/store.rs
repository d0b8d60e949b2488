// src/jobs/store.rs

//! Concurrent-safe job store.
//!
//! Layout: an outer map lock plus one lock per job. The outer lock is held
//! only for map operations; per-job mutation serializes on the job's own
//! lock, so updates to unrelated jobs never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{JobrunError, Result};
use crate::jobs::job::{Job, JobId, JobState, JobSummary};

pub type SharedJob = Arc<Mutex<Job>>;

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, SharedJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job, returning the shared handle for the supervising task.
    pub async fn put(&self, job: Job) -> SharedJob {
        let id = job.id.clone();
        let shared = Arc::new(Mutex::new(job));
        self.jobs.lock().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: &str) -> Result<SharedJob> {
        self.jobs
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobrunError::JobNotFound(id.to_string()))
    }

    /// Atomic read-modify-write on one job.
    pub async fn update<T>(&self, id: &str, mutator: impl FnOnce(&mut Job) -> T) -> Result<T> {
        let shared = self.get(id).await?;
        let mut job = shared.lock().await;
        Ok(mutator(&mut job))
    }

    /// Consistent per-job summaries, ordered by `started_at`.
    ///
    /// The listing is a sequence of individually consistent snapshots; each
    /// job is locked while its summary is taken, so no torn reads of a
    /// single job's fields.
    pub async fn list(&self) -> Vec<JobSummary> {
        let shared: Vec<SharedJob> = self.jobs.lock().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(shared.len());
        for job in shared {
            summaries.push(job.lock().await.summary());
        }

        summaries.sort_by(|a, b| {
            a.started_at
                .partial_cmp(&b.started_at)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        summaries
    }

    /// Remove a finished job. Evicting a `Running` job is forbidden.
    pub async fn evict(&self, id: &str) -> Result<()> {
        let mut map = self.jobs.lock().await;
        let shared = map
            .get(id)
            .cloned()
            .ok_or_else(|| JobrunError::JobNotFound(id.to_string()))?;

        let job = shared.lock().await;
        if !job.state.is_terminal() {
            return Err(JobrunError::Other(anyhow::anyhow!(
                "refusing to evict job '{id}' while it is running"
            )));
        }
        drop(job);

        map.remove(id);
        debug!(job = %id, "evicted job");
        Ok(())
    }

    /// Sweep out terminal jobs whose `ended_at` is older than `cutoff`.
    /// Returns how many were evicted.
    pub async fn evict_finished_before(&self, cutoff: SystemTime) -> usize {
        let mut map = self.jobs.lock().await;
        let mut stale: Vec<JobId> = Vec::new();

        for (id, shared) in map.iter() {
            let job = shared.lock().await;
            if job.state.is_terminal()
                && job.ended_at.is_some_and(|ended| ended < cutoff)
            {
                stale.push(id.clone());
            }
        }

        for id in &stale {
            map.remove(id);
            debug!(job = %id, "evicted job past retention window");
        }
        stale.len()
    }

    /// All live job handles (used for process-wide shutdown).
    pub async fn all(&self) -> Vec<SharedJob> {
        self.jobs.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
