// src/interactsh/session.rs

//! Session and event types for the interaction monitor.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::jobs::job::unix_secs;

/// Listener session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Active,
    Stopped,
    Failed,
}

impl SessionStatus {
    /// Whether this session still holds the single-session slot.
    pub fn occupies_slot(self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Active)
    }
}

/// One recorded out-of-band callback (DNS/HTTP/...).
#[derive(Debug, Clone, Serialize)]
pub struct InteractionEvent {
    pub protocol: String,
    /// Remote address the interaction came from.
    pub source: String,
    /// Raw request / payload the listener captured.
    pub payload: String,
    /// Unix seconds, assigned when the event reached the buffer.
    pub received_at: f64,
}

/// Wire format of one interaction line as `interactsh-client` emits it.
#[derive(Debug, Deserialize)]
pub struct RawInteraction {
    pub protocol: String,
    #[serde(rename = "full-id", default)]
    pub full_id: String,
    #[serde(rename = "remote-address", default)]
    pub remote_address: String,
    #[serde(rename = "raw-request", default)]
    pub raw_request: String,
}

impl RawInteraction {
    pub fn into_event(self, received_at: SystemTime) -> InteractionEvent {
        InteractionEvent {
            protocol: self.protocol,
            source: self.remote_address,
            payload: self.raw_request,
            received_at: unix_secs(received_at),
        }
    }
}

/// Answer to a `status` query.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_secs: Option<f64>,
}

impl StatusReport {
    /// Report for "no session has ever been started".
    pub fn stopped() -> Self {
        Self {
            status: SessionStatus::Stopped,
            session_id: None,
            correlation_domain: None,
            runtime_secs: None,
        }
    }
}

/// Drained events plus the lazily-surfaced listener failure flag.
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub events: Vec<InteractionEvent>,
    pub listener_failed: bool,
}
