// src/interactsh/monitor.rs

//! Lifecycle management for the out-of-band listener process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex as StdMutex};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::InteractshConfig;
use crate::errors::{JobrunError, Result};
use crate::exec::kill;
use crate::interactsh::session::{
    InteractionEvent, PollResult, RawInteraction, SessionStatus, StatusReport,
};
use crate::jobs::job::unix_secs;

/// Grace between SIGTERM and SIGKILL when stopping the listener.
const STOP_GRACE: Duration = Duration::from_secs(5);
/// Shorter grace for a listener that never became ready.
const STARTUP_KILL_GRACE: Duration = Duration::from_secs(2);

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\x1b)?\[[0-9;]*m").expect("static regex"));

/// Returned by a successful `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: String,
    pub correlation_domain: String,
    pub server: String,
}

struct SessionInner {
    session_id: String,
    correlation_domain: Option<String>,
    status: SessionStatus,
    started_at: SystemTime,
    child: Child,
    events: Arc<StdMutex<Vec<InteractionEvent>>>,
    reader: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// Lazy crash detection: an `Active` session whose listener has exited
    /// becomes `Failed`. There is deliberately no watchdog; this runs on the
    /// next `status`/`poll`/`start` call.
    fn refresh_liveness(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(exit)) => {
                warn!(
                    session = %self.session_id,
                    exit_code = exit.code(),
                    "listener process exited unexpectedly; marking session failed"
                );
                self.status = SessionStatus::Failed;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(session = %self.session_id, error = %err, "could not probe listener process");
            }
        }
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            status: self.status,
            session_id: Some(self.session_id.clone()),
            correlation_domain: self.correlation_domain.clone(),
            runtime_secs: Some(unix_secs(SystemTime::now()) - unix_secs(self.started_at)),
        }
    }
}

/// Owns the single listener session per workspace.
pub struct InteractshMonitor {
    config: InteractshConfig,
    inner: Mutex<Option<SessionInner>>,
    next_id: AtomicU64,
}

impl InteractshMonitor {
    pub fn new(config: InteractshConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Start the listener and wait for it to report its payload domain.
    ///
    /// Rejects with `AlreadyActive` while a session is `Starting` or
    /// `Active`; the caller must `stop` first. A previously `Failed` or
    /// `Stopped` session does not hold the slot.
    pub async fn start(&self) -> Result<StartedSession> {
        if !self.config.enabled {
            return Err(JobrunError::ConfigError(
                "interactsh is disabled in configuration".to_string(),
            ));
        }

        let session_id = format!("oob-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut lines = {
            let mut inner = self.inner.lock().await;
            if let Some(session) = inner.as_mut() {
                session.refresh_liveness();
                if session.status.occupies_slot() {
                    return Err(JobrunError::AlreadyActive);
                }
            }

            let mut cmd = Command::new(&self.config.client_command);
            cmd.arg("-s").arg(&self.config.server).arg("-n").arg("1");
            if let Some(token) = &self.config.token {
                cmd.arg("-t").arg(token);
            }
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            #[cfg(unix)]
            cmd.process_group(0);

            let mut child = cmd.spawn().map_err(|e| {
                JobrunError::SpawnError(format!(
                    "spawning listener '{}': {e}",
                    self.config.client_command
                ))
            })?;

            let stdout = child.stdout.take().ok_or_else(|| {
                JobrunError::SpawnError("listener stdout was not piped".to_string())
            })?;

            // Consume stderr so buffers don't fill; log at debug.
            if let Some(stderr) = child.stderr.take() {
                let session = session_id.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(session = %session, "listener stderr: {}", line);
                    }
                });
            }

            info!(session = %session_id, server = %self.config.server, "listener starting");
            *inner = Some(SessionInner {
                session_id: session_id.clone(),
                correlation_domain: None,
                status: SessionStatus::Starting,
                started_at: SystemTime::now(),
                child,
                events: Arc::new(StdMutex::new(Vec::new())),
                reader: None,
            });

            BufReader::new(stdout).lines()
        };

        // Readiness probe runs outside the session lock so status queries
        // stay responsive while the listener registers.
        let patterns = payload_patterns(&self.config.server);
        let readiness = timeout(
            self.config.readiness_timeout(),
            wait_for_domain(&mut lines, &patterns),
        )
        .await;

        match readiness {
            Ok(Some(domain)) => {
                let mut inner = self.inner.lock().await;
                match inner.as_mut() {
                    Some(session)
                        if session.session_id == session_id
                            && session.status == SessionStatus::Starting =>
                    {
                        session.status = SessionStatus::Active;
                        session.correlation_domain = Some(domain.clone());
                        let events = session.events.clone();
                        session.reader =
                            Some(tokio::spawn(read_events(lines, events, session_id.clone())));

                        info!(
                            session = %session_id,
                            domain = %domain,
                            "listener active"
                        );
                        Ok(StartedSession {
                            session_id,
                            correlation_domain: domain,
                            server: self.config.server.clone(),
                        })
                    }
                    _ => Err(JobrunError::SpawnError(
                        "listener session was stopped during startup".to_string(),
                    )),
                }
            }
            Ok(None) | Err(_) => {
                let mut inner = self.inner.lock().await;
                if let Some(session) = inner.as_mut() {
                    if session.session_id == session_id
                        && session.status == SessionStatus::Starting
                    {
                        if let Err(err) =
                            kill::terminate(&mut session.child, STARTUP_KILL_GRACE).await
                        {
                            warn!(session = %session_id, error = %err, "error killing unready listener");
                        }
                        *inner = None;
                    }
                }
                Err(JobrunError::SpawnError(format!(
                    "listener did not report a payload domain within {}s",
                    self.config.readiness_timeout_secs
                )))
            }
        }
    }

    /// Current session status; probes listener liveness lazily.
    pub async fn status(&self) -> StatusReport {
        let mut inner = self.inner.lock().await;
        match inner.as_mut() {
            Some(session) => {
                session.refresh_liveness();
                session.report()
            }
            None => StatusReport::stopped(),
        }
    }

    /// Drain all events buffered since the previous poll.
    ///
    /// Swap-and-clear under the buffer lock: each event is delivered at most
    /// once. After a listener crash this returns no events and sets
    /// `listener_failed`.
    pub async fn poll(&self) -> Result<PollResult> {
        let mut inner = self.inner.lock().await;
        let session = inner.as_mut().ok_or(JobrunError::SessionNotFound)?;
        session.refresh_liveness();

        if session.status == SessionStatus::Failed {
            return Ok(PollResult {
                events: Vec::new(),
                listener_failed: true,
            });
        }

        let events = {
            let mut buffer = session.events.lock().expect("event buffer poisoned");
            std::mem::take(&mut *buffer)
        };
        debug!(session = %session.session_id, count = events.len(), "drained interaction events");

        Ok(PollResult {
            events,
            listener_failed: false,
        })
    }

    /// Stop the listener and release the session slot. Stopping an already
    /// stopped session is a no-op returning the current report.
    pub async fn stop(&self) -> Result<StatusReport> {
        let mut inner = self.inner.lock().await;
        let session = inner.as_mut().ok_or(JobrunError::SessionNotFound)?;

        if session.status == SessionStatus::Stopped {
            return Ok(session.report());
        }

        info!(session = %session.session_id, "stopping listener");
        if let Err(err) = kill::terminate(&mut session.child, STOP_GRACE).await {
            warn!(session = %session.session_id, error = %err, "error terminating listener");
        }

        // The reader ends on stdout EOF; give it a moment, then cut it loose.
        if let Some(reader) = session.reader.take() {
            if timeout(Duration::from_secs(1), reader).await.is_err() {
                debug!(session = %session.session_id, "listener reader did not finish; detaching");
            }
        }

        session.status = SessionStatus::Stopped;
        Ok(session.report())
    }

    /// Best-effort stop used during process-wide shutdown.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(_) | Err(JobrunError::SessionNotFound) => {}
            Err(err) => warn!(error = %err, "error stopping listener during shutdown"),
        }
    }
}

/// Read startup output until a line contains a payload domain.
///
/// Returns `None` on EOF or read error (the listener died before
/// registering).
async fn wait_for_domain(
    lines: &mut Lines<BufReader<ChildStdout>>,
    patterns: &[Regex],
) -> Option<String> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let clean = strip_ansi(&line);
                debug!("listener: {}", clean.trim_end());
                for pattern in patterns {
                    if let Some(found) = pattern.find(&clean) {
                        return Some(found.as_str().to_string());
                    }
                }
            }
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "error reading listener startup output");
                return None;
            }
        }
    }
}

/// Consume listener stdout for the lifetime of the session, appending parsed
/// interactions to the shared buffer.
async fn read_events(
    mut lines: Lines<BufReader<ChildStdout>>,
    events: Arc<StdMutex<Vec<InteractionEvent>>>,
    session_id: String,
) {
    while let Ok(Some(line)) = lines.next_line().await {
        let clean = strip_ansi(&line);
        let trimmed = clean.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<RawInteraction>(trimmed) {
            Ok(raw) => {
                let event = raw.into_event(SystemTime::now());
                debug!(
                    session = %session_id,
                    protocol = %event.protocol,
                    source = %event.source,
                    "recorded out-of-band interaction"
                );
                events.lock().expect("event buffer poisoned").push(event);
            }
            Err(_) => {
                debug!(session = %session_id, "listener: {}", trimmed);
            }
        }
    }
    debug!(session = %session_id, "listener stdout closed");
}

/// Payload-domain patterns for each configured server (comma-separated
/// lists are supported, protocol prefixes ignored): 20+ alphanumerics
/// followed by the server domain.
fn payload_patterns(server: &str) -> Vec<Regex> {
    server
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|srv| {
            let host = srv
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            let pattern = format!(r"[a-zA-Z0-9]{{20,}}\.{}", regex::escape(host));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(server = %srv, error = %err, "could not build payload pattern");
                    None
                }
            }
        })
        .collect()
}

fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").into_owned()
}
