// crates/test-utils/src/builders.rs

//! Builders for test configurations with fast thresholds.

use std::path::Path;

use jobrun::config::{ConfigFile, ExecutionConfig, InteractshConfig};

/// Builds a [`ConfigFile`] tuned for tests: one-second thresholds so the
/// sync-vs-background split and cancellation can be exercised quickly.
pub struct TestConfigBuilder {
    execution: ExecutionConfig,
    interactsh: InteractshConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut execution = ExecutionConfig::default();
        execution.sync_threshold_secs = 1;
        execution.cancel_grace_secs = 1;
        Self {
            execution,
            interactsh: InteractshConfig::default(),
        }
    }

    pub fn workspace(mut self, dir: impl AsRef<Path>) -> Self {
        self.execution.workspace_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn sync_threshold_secs(mut self, secs: u64) -> Self {
        self.execution.sync_threshold_secs = secs;
        self
    }

    pub fn cancel_grace_secs(mut self, secs: u64) -> Self {
        self.execution.cancel_grace_secs = secs;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.execution.retention_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.execution.sweep_interval_secs = secs;
        self
    }

    pub fn output_cap_bytes(mut self, cap: usize) -> Self {
        self.execution.output_cap_bytes = cap;
        self
    }

    /// Enable interactsh with `command` standing in for the real
    /// `interactsh-client` (typically a stub script).
    pub fn interactsh_client(mut self, command: impl Into<String>, server: impl Into<String>) -> Self {
        self.interactsh.enabled = true;
        self.interactsh.client_command = command.into();
        self.interactsh.server = server.into();
        self.interactsh.readiness_timeout_secs = 5;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile {
            execution: self.execution,
            interactsh: self.interactsh,
        }
    }

    pub fn build_execution(self) -> ExecutionConfig {
        self.execution
    }

    pub fn build_interactsh(self) -> InteractshConfig {
        self.interactsh
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
