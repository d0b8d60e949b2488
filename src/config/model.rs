// src/config/model.rs

//! Configuration data model.
//!
//! `RawConfigFile` is what `toml` deserializes directly; `ConfigFile` is the
//! validated form the rest of the application works with. Conversion happens
//! via `TryFrom` in [`validate`](crate::config::validate).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Raw, unvalidated configuration as read from `Jobrun.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub interactsh: InteractshConfig,
}

/// `[execution]` section: process running, job lifecycle and retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Directory commands run in (and the only place spawned tools should
    /// write to).
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Commands finishing within this many seconds return synchronously;
    /// anything slower is promoted to a background job.
    #[serde(default = "default_sync_threshold_secs")]
    pub sync_threshold_secs: u64,

    /// Grace period between SIGTERM and SIGKILL when cancelling a job.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Finished jobs are evicted once `ended_at` is older than this.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How often the eviction sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Per-stream cap on buffered output; beyond it output is dropped and
    /// the job is marked truncated.
    #[serde(default = "default_output_cap_bytes")]
    pub output_cap_bytes: usize,
}

/// `[interactsh]` section: out-of-band interaction listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractshConfig {
    /// Whether `start_interactsh` is allowed at all.
    #[serde(default)]
    pub enabled: bool,

    /// interactsh server the listener registers against.
    #[serde(default = "default_interactsh_server")]
    pub server: String,

    /// Optional auth token for self-hosted servers.
    #[serde(default)]
    pub token: Option<String>,

    /// Listener client executable. Tests point this at a stub script.
    #[serde(default = "default_client_command")]
    pub client_command: String,

    /// How long to wait for the listener to report its payload domain
    /// before giving up on `start`.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_sync_threshold_secs() -> u64 {
    60
}

fn default_cancel_grace_secs() -> u64 {
    5
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_output_cap_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_interactsh_server() -> String {
    "oast.pro".to_string()
}

fn default_client_command() -> String {
    "interactsh-client".to_string()
}

fn default_readiness_timeout_secs() -> u64 {
    30
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            sync_threshold_secs: default_sync_threshold_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            output_cap_bytes: default_output_cap_bytes(),
        }
    }
}

impl Default for InteractshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: default_interactsh_server(),
            token: None,
            client_command: default_client_command(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub execution: ExecutionConfig,
    pub interactsh: InteractshConfig,
}

impl ConfigFile {
    /// Construct without re-running validation. Only `validate` should call
    /// this.
    pub(crate) fn new_unchecked(
        execution: ExecutionConfig,
        interactsh: InteractshConfig,
    ) -> Self {
        Self {
            execution,
            interactsh,
        }
    }
}

impl ExecutionConfig {
    pub fn sync_threshold(&self) -> Duration {
        Duration::from_secs(self.sync_threshold_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl InteractshConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}
