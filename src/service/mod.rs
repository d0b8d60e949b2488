// src/service/mod.rs

//! Service boundary adapter.
//!
//! Translates inbound operation requests into calls on the job manager and
//! interaction monitor and serializes results. The transport is
//! line-delimited JSON over stdin/stdout and is intentionally thin; all
//! semantics live in the components behind it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{JobrunError, Result};
use crate::interactsh::InteractshMonitor;
use crate::jobs::{JobManager, SubmitOutcome};

/// Default per-command deadline when the caller does not provide one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One inbound operation request.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    RunCommand {
        command: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    GetJobStatus {
        job_id: String,
    },
    ListBackgroundJobs,
    CancelJob {
        job_id: String,
    },
    StartInteractsh,
    GetInteractshStatus,
    PollInteractsh,
    StopInteractsh,
    WorkspaceInfo,
}

pub struct Service {
    manager: Arc<JobManager>,
    monitor: Arc<InteractshMonitor>,
    config: ConfigFile,
}

impl Service {
    pub fn new(
        manager: Arc<JobManager>,
        monitor: Arc<InteractshMonitor>,
        config: ConfigFile,
    ) -> Self {
        Self {
            manager,
            monitor,
            config,
        }
    }

    /// Dispatch one request to the owning component.
    pub async fn handle(&self, request: Request) -> Result<Value> {
        match request {
            Request::RunCommand {
                command,
                timeout_secs,
                cwd,
            } => {
                if command.trim().is_empty() {
                    return Err(JobrunError::SpawnError(
                        "command cannot be empty".to_string(),
                    ));
                }
                let timeout = timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TIMEOUT);

                match self.manager.submit(&command, timeout, cwd).await? {
                    SubmitOutcome::Sync(result) => Ok(json!({
                        "mode": "sync",
                        "stdout": result.stdout,
                        "stderr": result.stderr,
                        "exit_code": result.exit_code,
                        "truncated": result.truncated,
                    })),
                    SubmitOutcome::Background { job_id } => Ok(json!({
                        "mode": "background",
                        "job_id": job_id,
                    })),
                }
            }

            Request::GetJobStatus { job_id } => {
                let status = self.manager.get_status(&job_id).await?;
                Ok(serde_json::to_value(status).map_err(anyhow::Error::from)?)
            }

            Request::ListBackgroundJobs => {
                let jobs = self.manager.list_jobs().await;
                Ok(json!({
                    "total_count": jobs.len(),
                    "jobs": jobs,
                }))
            }

            Request::CancelJob { job_id } => {
                let state = self.manager.cancel(&job_id).await?;
                Ok(json!({
                    "job_id": job_id,
                    "state": state,
                }))
            }

            Request::StartInteractsh => {
                let started = self.monitor.start().await?;
                Ok(serde_json::to_value(started).map_err(anyhow::Error::from)?)
            }

            Request::GetInteractshStatus => {
                let report = self.monitor.status().await;
                Ok(serde_json::to_value(report).map_err(anyhow::Error::from)?)
            }

            Request::PollInteractsh => {
                let result = self.monitor.poll().await?;
                Ok(json!({
                    "count": result.events.len(),
                    "events": result.events,
                    "listener_failed": result.listener_failed,
                }))
            }

            Request::StopInteractsh => {
                let report = self.monitor.stop().await?;
                Ok(serde_json::to_value(report).map_err(anyhow::Error::from)?)
            }

            Request::WorkspaceInfo => Ok(json!({
                "workspace_dir": self.config.execution.workspace_dir,
                "sync_threshold_secs": self.config.execution.sync_threshold_secs,
                "retention_secs": self.config.execution.retention_secs,
                "output_cap_bytes": self.config.execution.output_cap_bytes,
                "interactsh_enabled": self.config.interactsh.enabled,
            })),
        }
    }

    /// Serve requests from stdin, one JSON object per line, until EOF or
    /// shutdown.
    pub async fn serve_stdio(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = tokio::io::stdout();

        info!("service boundary listening on stdio");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = shutdown.changed() => {
                    info!("shutdown requested; leaving service loop");
                    return Ok(());
                }
            };

            let Some(line) = line else {
                debug!("stdin closed; leaving service loop");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    debug!(?request, "handling request");
                    match self.handle(request).await {
                        Ok(value) => value,
                        Err(err) => error_response(&err),
                    }
                }
                Err(err) => {
                    warn!(error = %err, "unparseable request line");
                    json!({
                        "error": {
                            "kind": "bad_request",
                            "message": format!("invalid request: {err}"),
                        }
                    })
                }
            };

            let mut out = serde_json::to_string(&response).map_err(anyhow::Error::from)?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
}

/// Map an error to its stable wire shape.
fn error_response(err: &JobrunError) -> Value {
    json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    })
}
