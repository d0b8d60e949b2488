#![allow(dead_code)]

pub use jobrun_test_utils::init_tracing;

use std::time::Duration;

use jobrun::jobs::{JobManager, JobState};

/// Poll a job until it reaches a terminal state, panicking after `secs`.
pub async fn wait_for_terminal(manager: &JobManager, job_id: &str, secs: u64) -> JobState {
    let attempts = secs * 20;
    for _ in 0..attempts {
        let status = manager
            .get_status(job_id)
            .await
            .expect("job should exist while waiting for terminal state");
        if status.state.is_terminal() {
            return status.state;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {job_id} did not reach a terminal state within {secs}s");
}
