// tests/eviction.rs
//
// Retention sweep and explicit eviction: finished jobs age out, running jobs
// never do.

#![cfg(unix)]

mod common;
use crate::common::{init_tracing, wait_for_terminal};

use std::error::Error;
use std::time::Duration;

use jobrun::errors::JobrunError;
use jobrun::jobs::{JobManager, JobState, SubmitOutcome};
use jobrun_test_utils::builders::TestConfigBuilder;

type TestResult = Result<(), Box<dyn Error>>;

async fn background_job(manager: &JobManager, command: &str) -> String {
    match manager
        .submit(command, Duration::from_secs(300), None)
        .await
        .expect("submit should succeed")
    {
        SubmitOutcome::Background { job_id } => job_id,
        SubmitOutcome::Sync(_) => panic!("command should have been promoted: {command}"),
    }
}

#[tokio::test]
async fn finished_jobs_age_out_of_the_store() -> TestResult {
    init_tracing();
    let manager = JobManager::new(
        TestConfigBuilder::new()
            .retention_secs(1)
            .sweep_interval_secs(1)
            .build_execution(),
    );
    let sweep = manager.spawn_eviction_sweep();

    let job_id = background_job(&manager, "sleep 2").await;
    let state = wait_for_terminal(&manager, &job_id, 10).await;
    assert_eq!(state, JobState::Completed);

    // Past the retention window plus one sweep interval, the job is gone.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let err = manager.get_status(&job_id).await.unwrap_err();
    assert!(matches!(err, JobrunError::JobNotFound(_)));
    assert!(manager.list_jobs().await.is_empty());

    sweep.abort();
    Ok(())
}

#[tokio::test]
async fn running_jobs_survive_the_sweep() -> TestResult {
    init_tracing();
    let manager = JobManager::new(
        TestConfigBuilder::new()
            .retention_secs(1)
            .sweep_interval_secs(1)
            .build_execution(),
    );
    let sweep = manager.spawn_eviction_sweep();

    let job_id = background_job(&manager, "sleep 30").await;

    // Several sweep intervals later the running job is still tracked.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let status = manager.get_status(&job_id).await?;
    assert_eq!(status.state, JobState::Running);
    assert_eq!(manager.list_jobs().await.len(), 1);

    sweep.abort();
    manager.cancel(&job_id).await?;
    Ok(())
}

#[tokio::test]
async fn explicit_eviction_requires_terminal_state() -> TestResult {
    init_tracing();
    let manager = JobManager::new(TestConfigBuilder::new().build_execution());

    let job_id = background_job(&manager, "sleep 30").await;
    assert!(
        manager.evict(&job_id).await.is_err(),
        "evicting a running job must be refused"
    );

    manager.cancel(&job_id).await?;
    manager.evict(&job_id).await?;

    let err = manager.get_status(&job_id).await.unwrap_err();
    assert!(matches!(err, JobrunError::JobNotFound(_)));
    Ok(())
}
