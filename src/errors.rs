// src/errors.rs

//! Crate-wide error taxonomy and `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to spawn command: {0}")]
    SpawnError(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("No interactsh session has been started")]
    SessionNotFound,

    #[error("An interactsh session is already active")]
    AlreadyActive,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobrunError {
    /// Stable machine-readable kind, used by the service boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            JobrunError::ConfigError(_) | JobrunError::TomlError(_) => "config_error",
            JobrunError::SpawnError(_) => "spawn_error",
            JobrunError::JobNotFound(_) | JobrunError::SessionNotFound => "not_found",
            JobrunError::AlreadyActive => "already_active",
            JobrunError::IoError(_) => "io_error",
            JobrunError::Other(_) => "internal_error",
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobrunError>;
