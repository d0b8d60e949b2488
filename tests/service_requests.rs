// tests/service_requests.rs
//
// The service boundary: request parsing, response shapes, and the stable
// error kinds surfaced to callers.

#![cfg(unix)]

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::time::Duration;

use jobrun::config::ConfigFile;
use jobrun::interactsh::InteractshMonitor;
use jobrun::jobs::{JobManager, JobState};
use jobrun::service::{Request, Service};
use jobrun_test_utils::builders::TestConfigBuilder;
use jobrun_test_utils::stub::ready_listener_script;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

fn service_with(config: ConfigFile) -> Service {
    let manager = JobManager::new(config.execution.clone());
    let monitor = InteractshMonitor::new(config.interactsh.clone());
    Service::new(manager, monitor, config)
}

fn service() -> Service {
    service_with(TestConfigBuilder::new().build())
}

fn request(line: &str) -> Request {
    serde_json::from_str(line).expect("request should parse")
}

#[tokio::test]
async fn run_command_sync_response_shape() -> TestResult {
    init_tracing();
    let service = service();

    let response = service
        .handle(request(r#"{"op":"run_command","command":"echo hi"}"#))
        .await?;
    assert_eq!(response["mode"], "sync");
    assert_eq!(response["stdout"], "hi\n");
    assert_eq!(response["exit_code"], 0);
    assert_eq!(response["truncated"], false);
    Ok(())
}

#[tokio::test]
async fn background_job_round_trip_through_requests() -> TestResult {
    init_tracing();
    let service = service();

    let response = service
        .handle(request(
            r#"{"op":"run_command","command":"sleep 30","timeout_secs":300}"#,
        ))
        .await?;
    assert_eq!(response["mode"], "background");
    let job_id = response["job_id"].as_str().expect("job id").to_string();

    let status = service
        .handle(Request::GetJobStatus {
            job_id: job_id.clone(),
        })
        .await?;
    assert_eq!(status["job_id"], job_id.as_str());
    assert_eq!(status["state"], "running");

    let listing = service.handle(Request::ListBackgroundJobs).await?;
    assert_eq!(listing["total_count"], 1);
    assert_eq!(listing["jobs"][0]["job_id"], job_id.as_str());

    let cancelled = service
        .handle(Request::CancelJob {
            job_id: job_id.clone(),
        })
        .await?;
    assert_eq!(cancelled["job_id"], job_id.as_str());
    assert_eq!(
        cancelled["state"],
        serde_json::to_value(JobState::Cancelled)?
    );
    Ok(())
}

#[tokio::test]
async fn empty_command_is_rejected() -> TestResult {
    init_tracing();
    let service = service();

    let err = service
        .handle(request(r#"{"op":"run_command","command":"   "}"#))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "spawn_error");
    Ok(())
}

#[tokio::test]
async fn unknown_job_surfaces_not_found_kind() -> TestResult {
    init_tracing();
    let service = service();

    let err = service
        .handle(request(r#"{"op":"get_job_status","job_id":"job-999"}"#))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    Ok(())
}

#[tokio::test]
async fn workspace_info_reflects_configuration() -> TestResult {
    init_tracing();
    let service = service_with(
        TestConfigBuilder::new()
            .workspace("/tmp/jobrun-ws")
            .output_cap_bytes(4096)
            .build(),
    );

    let info = service.handle(Request::WorkspaceInfo).await?;
    assert_eq!(info["workspace_dir"], "/tmp/jobrun-ws");
    assert_eq!(info["sync_threshold_secs"], 1);
    assert_eq!(info["output_cap_bytes"], 4096);
    assert_eq!(info["interactsh_enabled"], false);
    Ok(())
}

#[tokio::test]
async fn interactsh_requests_drive_the_monitor() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let script = ready_listener_script(dir.path(), "oast.test", &[]);
    let service = service_with(
        TestConfigBuilder::new()
            .interactsh_client(script.display().to_string(), "oast.test")
            .build(),
    );

    let started = service.handle(Request::StartInteractsh).await?;
    let domain = started["correlation_domain"].as_str().expect("domain");
    assert!(domain.ends_with(".oast.test"));

    let status = service.handle(Request::GetInteractshStatus).await?;
    assert_eq!(status["status"], "active");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let polled = service.handle(Request::PollInteractsh).await?;
    assert_eq!(polled["count"], 0);
    assert_eq!(polled["listener_failed"], false);

    let stopped = service.handle(Request::StopInteractsh).await?;
    assert_eq!(stopped["status"], "stopped");
    Ok(())
}

#[tokio::test]
async fn disabled_interactsh_surfaces_config_error_kind() -> TestResult {
    init_tracing();
    let service = service();

    let err = service.handle(Request::StartInteractsh).await.unwrap_err();
    assert_eq!(err.kind(), "config_error");
    Ok(())
}

#[tokio::test]
async fn run_command_respects_cwd() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let service = service();

    let response = service
        .handle(Request::RunCommand {
            command: "pwd".to_string(),
            timeout_secs: None,
            cwd: Some(dir.path().to_path_buf()),
        })
        .await?;
    assert_eq!(response["mode"], "sync");
    let stdout = response["stdout"].as_str().expect("stdout");
    assert!(stdout.trim_end().ends_with(
        dir.path()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("dir name")
    ));
    Ok(())
}
