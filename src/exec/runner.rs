// src/exec/runner.rs

//! Process Runner: spawns a command, streams its output, and decides between
//! a synchronous result and a still-running handle.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::errors::{JobrunError, Result};
use crate::exec::buffer::{OutputBuffer, SharedBuffer};

const READ_CHUNK: usize = 8192;
const MAX_READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Result of a command that exited within the caller's threshold.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

/// A command that outlived the threshold and keeps running.
///
/// The handle owns the child exclusively; the job manager converts it into a
/// tracked job and becomes the only component allowed to signal the process.
pub struct ProcessHandle {
    pub child: Child,
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
    pub readers: Vec<JoinHandle<std::io::Result<()>>>,
    pub started_at: SystemTime,
}

/// Outcome of [`ProcessRunner::execute`].
pub enum Execution {
    Sync(SyncResult),
    Background(ProcessHandle),
}

/// Spawns shell commands in the workspace and supervises their output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workspace_dir: PathBuf,
    output_cap: usize,
}

impl ProcessRunner {
    pub fn new(cfg: &ExecutionConfig) -> Self {
        Self {
            workspace_dir: cfg.workspace_dir.clone(),
            output_cap: cfg.output_cap_bytes,
        }
    }

    /// Run `command` through the platform shell in `cwd` (default: the
    /// workspace directory).
    ///
    /// Returns [`Execution::Sync`] if the process exits before `threshold`
    /// elapses; otherwise [`Execution::Background`] with the process still
    /// running. The process is never killed here on threshold expiry.
    pub async fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        threshold: Duration,
    ) -> Result<Execution> {
        let cwd = cwd.unwrap_or(&self.workspace_dir);

        info!(cmd = %command_preview(command), cwd = %cwd.display(), "spawning command");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(cwd)
            .kill_on_drop(true);

        // Own process group, so cancellation can signal the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        let started_at = SystemTime::now();
        let spawned = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            JobrunError::SpawnError(format!(
                "spawning '{}' in {}: {e}",
                command_preview(command),
                cwd.display()
            ))
        })?;

        let stdout_buf = OutputBuffer::shared(self.output_cap);
        let stderr_buf = OutputBuffer::shared(self.output_cap);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_stream_reader(stdout, stdout_buf.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_stream_reader(stderr, stderr_buf.clone(), "stderr"));
        }

        match timeout(threshold, child.wait()).await {
            Ok(status) => {
                let status = status?;

                // Streams normally hit EOF right after exit, but not when
                // something the command spawned still holds the pipes
                // (`sleep 30 & echo hi`, or a tool daemonizing a helper).
                // Join only within what is left of the threshold; readers
                // still blocked past it are handed over for background
                // supervision rather than blocking the caller.
                let deadline = spawned + threshold;
                let mut lingering: Vec<JoinHandle<std::io::Result<()>>> = Vec::new();
                for mut handle in readers {
                    let left = deadline.saturating_duration_since(Instant::now());
                    match timeout(left, &mut handle).await {
                        Ok(Ok(Ok(()))) => {}
                        Ok(Ok(Err(e))) => return Err(JobrunError::IoError(e)),
                        Ok(Err(e)) => {
                            return Err(JobrunError::Other(anyhow::anyhow!(
                                "output reader panicked: {e}"
                            )));
                        }
                        Err(_elapsed) => lingering.push(handle),
                    }
                }

                if !lingering.is_empty() {
                    debug!(
                        exit_code = status.code(),
                        "process exited but its output pipes are still held; \
                         handing over for background supervision"
                    );
                    return Ok(Execution::Background(ProcessHandle {
                        child,
                        stdout: stdout_buf,
                        stderr: stderr_buf,
                        readers: lingering,
                        started_at,
                    }));
                }

                let (stdout, stdout_trunc) = {
                    let buf = stdout_buf.lock().expect("stdout buffer poisoned");
                    (buf.to_string_lossy(), buf.truncated())
                };
                let (stderr, stderr_trunc) = {
                    let buf = stderr_buf.lock().expect("stderr buffer poisoned");
                    (buf.to_string_lossy(), buf.truncated())
                };

                debug!(
                    exit_code = status.code(),
                    stdout_bytes = stdout.len(),
                    stderr_bytes = stderr.len(),
                    "command finished within threshold"
                );

                Ok(Execution::Sync(SyncResult {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    truncated: stdout_trunc || stderr_trunc,
                }))
            }
            Err(_elapsed) => {
                debug!(
                    threshold_secs = threshold.as_secs_f64(),
                    "threshold elapsed; handing process over for background supervision"
                );
                Ok(Execution::Background(ProcessHandle {
                    child,
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    readers,
                    started_at,
                }))
            }
        }
    }
}

/// Consume one output stream into `buf`.
///
/// Read errors are retried up to [`MAX_READ_RETRIES`] consecutive times
/// before the stream is abandoned with the error; the caller decides what
/// that means for the job.
fn spawn_stream_reader<R>(
    mut stream: R,
    buf: SharedBuffer,
    stream_name: &'static str,
) -> JoinHandle<std::io::Result<()>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        let mut retries = 0u32;

        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    retries = 0;
                    buf.lock().expect("output buffer poisoned").append(&chunk[..n]);
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_READ_RETRIES {
                        warn!(
                            stream = stream_name,
                            error = %e,
                            "giving up reading stream after repeated errors"
                        );
                        return Err(e);
                    }
                    debug!(
                        stream = stream_name,
                        attempt = retries,
                        error = %e,
                        "transient read error; retrying"
                    );
                    sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    })
}

/// Shorten a command line to its first 100 chars for log output.
pub(crate) fn command_preview(command: &str) -> String {
    const MAX: usize = 100;
    if command.chars().count() <= MAX {
        command.to_string()
    } else {
        let head: String = command.chars().take(MAX).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    enum Step {
        Data(&'static [u8]),
        TransientError,
    }

    /// An `AsyncRead` that replays a fixed script of reads; exhaustion is
    /// EOF.
    struct ScriptedStream {
        steps: VecDeque<Step>,
    }

    impl AsyncRead for ScriptedStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.steps.pop_front() {
                Some(Step::Data(bytes)) => {
                    buf.put_slice(bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Step::TransientError) => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "interrupted",
                ))),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    #[tokio::test]
    async fn reader_retries_transient_errors_and_keeps_data() {
        let stream = ScriptedStream {
            steps: VecDeque::from([
                Step::TransientError,
                Step::Data(b"part1"),
                Step::TransientError,
                Step::TransientError,
                Step::Data(b"part2"),
            ]),
        };
        let buf = OutputBuffer::shared(1024);

        let result = spawn_stream_reader(stream, buf.clone(), "stdout")
            .await
            .expect("reader task should not panic");
        assert!(result.is_ok());
        assert_eq!(buf.lock().unwrap().to_string_lossy(), "part1part2");
    }

    #[tokio::test]
    async fn reader_gives_up_past_the_retry_limit() {
        // One more consecutive error than the retry budget allows.
        let steps = (0..=MAX_READ_RETRIES).map(|_| Step::TransientError).collect();
        let stream = ScriptedStream { steps };
        let buf = OutputBuffer::shared(1024);

        let err = spawn_stream_reader(stream, buf.clone(), "stderr")
            .await
            .expect("reader task should not panic")
            .expect_err("reader should give up");
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(buf.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_counter_resets_after_a_successful_read() {
        // Errors interleaved with data never exceed the consecutive budget.
        let mut steps = VecDeque::new();
        for _ in 0..3 {
            for _ in 0..MAX_READ_RETRIES {
                steps.push_back(Step::TransientError);
            }
            steps.push_back(Step::Data(b"x"));
        }
        let stream = ScriptedStream { steps };
        let buf = OutputBuffer::shared(1024);

        let result = spawn_stream_reader(stream, buf.clone(), "stdout")
            .await
            .expect("reader task should not panic");
        assert!(result.is_ok());
        assert_eq!(buf.lock().unwrap().to_string_lossy(), "xxx");
    }
}
