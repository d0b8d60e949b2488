// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.execution, raw.interactsh))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_execution(cfg)?;
    validate_interactsh(cfg)?;
    Ok(())
}

fn validate_execution(cfg: &RawConfigFile) -> Result<()> {
    let exec = &cfg.execution;

    if exec.sync_threshold_secs == 0 {
        return Err(JobrunError::ConfigError(
            "[execution].sync_threshold_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if exec.cancel_grace_secs == 0 {
        return Err(JobrunError::ConfigError(
            "[execution].cancel_grace_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if exec.sweep_interval_secs == 0 {
        return Err(JobrunError::ConfigError(
            "[execution].sweep_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if exec.output_cap_bytes == 0 {
        return Err(JobrunError::ConfigError(
            "[execution].output_cap_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_interactsh(cfg: &RawConfigFile) -> Result<()> {
    let ia = &cfg.interactsh;

    if !ia.enabled {
        // Disabled sections are not validated further; a half-filled
        // [interactsh] block should not prevent plain job execution.
        return Ok(());
    }

    if ia.server.trim().is_empty() {
        return Err(JobrunError::ConfigError(
            "[interactsh].server must not be empty when interactsh is enabled".to_string(),
        ));
    }

    if ia.client_command.trim().is_empty() {
        return Err(JobrunError::ConfigError(
            "[interactsh].client_command must not be empty when interactsh is enabled"
                .to_string(),
        ));
    }

    if ia.readiness_timeout_secs == 0 {
        return Err(JobrunError::ConfigError(
            "[interactsh].readiness_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
