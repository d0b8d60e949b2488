// tests/sync_background.rs
//
// The sync-vs-background split: fast commands return a result directly and
// never create a job; slow commands are promoted to supervised background
// jobs that reach the terminal state matching their real exit behavior.

#![cfg(unix)]

mod common;
use crate::common::{init_tracing, wait_for_terminal};

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jobrun::errors::JobrunError;
use jobrun::jobs::{JobManager, JobState, SubmitOutcome};
use jobrun_test_utils::builders::TestConfigBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn manager() -> Arc<JobManager> {
    JobManager::new(TestConfigBuilder::new().build_execution())
}

#[tokio::test]
async fn fast_command_returns_sync_result_and_no_job() -> TestResult {
    init_tracing();
    let manager = manager();

    let outcome = manager
        .submit("echo hello && echo oops >&2", Duration::from_secs(30), None)
        .await?;

    match outcome {
        SubmitOutcome::Sync(result) => {
            assert_eq!(result.stdout, "hello\n");
            assert_eq!(result.stderr, "oops\n");
            assert_eq!(result.exit_code, Some(0));
            assert!(!result.truncated);
        }
        SubmitOutcome::Background { job_id } => {
            panic!("echo should not become a background job (got {job_id})")
        }
    }

    assert!(
        manager.list_jobs().await.is_empty(),
        "no job record may exist for a synchronous command"
    );
    Ok(())
}

#[tokio::test]
async fn fast_failing_command_reports_its_exit_code() -> TestResult {
    init_tracing();
    let manager = manager();

    let outcome = manager.submit("exit 3", Duration::from_secs(30), None).await?;
    match outcome {
        SubmitOutcome::Sync(result) => assert_eq!(result.exit_code, Some(3)),
        SubmitOutcome::Background { .. } => panic!("exit 3 should finish synchronously"),
    }
    Ok(())
}

#[tokio::test]
async fn unknown_command_surfaces_as_shell_failure() -> TestResult {
    init_tracing();
    let manager = manager();

    // The shell wrapper turns "command not found" into exit code 127.
    let outcome = manager
        .submit("definitely-not-a-real-command-xyz", Duration::from_secs(30), None)
        .await?;
    match outcome {
        SubmitOutcome::Sync(result) => {
            assert_eq!(result.exit_code, Some(127));
            assert!(!result.stderr.is_empty());
        }
        SubmitOutcome::Background { .. } => panic!("should finish synchronously"),
    }
    Ok(())
}

#[tokio::test]
async fn spawn_error_for_missing_cwd() -> TestResult {
    init_tracing();
    let manager = manager();

    let err = manager
        .submit(
            "echo hi",
            Duration::from_secs(30),
            Some(PathBuf::from("/definitely/not/a/dir")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, JobrunError::SpawnError(_)));
    Ok(())
}

#[tokio::test]
async fn slow_command_promotes_to_background_and_completes() -> TestResult {
    init_tracing();
    let manager = manager();

    // Threshold is 1s; this outlives it and gets promoted.
    let outcome = manager
        .submit("echo started; sleep 3", Duration::from_secs(30), None)
        .await?;
    let job_id = match outcome {
        SubmitOutcome::Background { job_id } => job_id,
        SubmitOutcome::Sync(_) => panic!("sleep 3 should be promoted to a background job"),
    };

    // Still running, with the early output already captured.
    let status = manager.get_status(&job_id).await?;
    assert_eq!(status.state, JobState::Running);
    assert!(status.stdout.contains("started"));
    assert!(status.exit_code.is_none());

    let state = wait_for_terminal(&manager, &job_id, 10).await;
    assert_eq!(state, JobState::Completed);

    let status = manager.get_status(&job_id).await?;
    assert_eq!(status.exit_code, Some(0));
    assert!(status.stdout.contains("started"));
    Ok(())
}

#[tokio::test]
async fn background_failure_is_reported_with_exit_code() -> TestResult {
    init_tracing();
    let manager = manager();

    let outcome = manager
        .submit("sleep 2; exit 5", Duration::from_secs(30), None)
        .await?;
    let job_id = match outcome {
        SubmitOutcome::Background { job_id } => job_id,
        SubmitOutcome::Sync(_) => panic!("should be promoted"),
    };

    let state = wait_for_terminal(&manager, &job_id, 10).await;
    assert_eq!(state, JobState::Failed);
    assert_eq!(manager.get_status(&job_id).await?.exit_code, Some(5));
    Ok(())
}

#[tokio::test]
async fn held_pipes_do_not_block_submit_past_the_threshold() -> TestResult {
    init_tracing();
    let manager = manager();

    // The shell exits immediately, but the backgrounded sleep inherits the
    // output pipes and holds them far beyond the 1s threshold. The caller
    // must get a background job at the threshold, not wait for EOF.
    let started = Instant::now();
    let outcome = manager
        .submit("sleep 30 & echo hi", Duration::from_secs(60), None)
        .await?;
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "submit blocked {:?}, well past the 1s threshold",
        started.elapsed()
    );

    match outcome {
        SubmitOutcome::Background { .. } => {}
        SubmitOutcome::Sync(_) => {
            panic!("a held pipe should promote the command to a background job")
        }
    }
    Ok(())
}

#[tokio::test]
async fn held_pipes_do_not_defer_the_terminal_transition() -> TestResult {
    init_tracing();
    let manager = manager();

    let outcome = manager
        .submit("sleep 30 & echo hi", Duration::from_secs(60), None)
        .await?;
    let job_id = match outcome {
        SubmitOutcome::Background { job_id } => job_id,
        SubmitOutcome::Sync(_) => panic!("should be promoted"),
    };

    // The supervisor must finalize shortly after the real exit, with the
    // output that made it into the buffers, not 30s later at EOF.
    let state = wait_for_terminal(&manager, &job_id, 8).await;
    assert_eq!(state, JobState::Completed);

    let status = manager.get_status(&job_id).await?;
    assert_eq!(status.exit_code, Some(0));
    assert!(status.stdout.contains("hi"));
    Ok(())
}

#[tokio::test]
async fn job_exceeding_its_deadline_times_out() -> TestResult {
    init_tracing();
    let manager = manager();

    let outcome = manager
        .submit("sleep 30", Duration::from_secs(2), None)
        .await?;
    let job_id = match outcome {
        SubmitOutcome::Background { job_id } => job_id,
        SubmitOutcome::Sync(_) => panic!("sleep 30 should be promoted"),
    };

    let state = wait_for_terminal(&manager, &job_id, 10).await;
    assert_eq!(state, JobState::TimedOut);

    // Killed by the manager, so no exit code from a normal process exit.
    assert!(manager.get_status(&job_id).await?.exit_code.is_none());
    Ok(())
}
