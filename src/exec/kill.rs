// src/exec/kill.rs

//! Graceful-then-forced termination of a child process group.
//!
//! Children are spawned in their own process group (see
//! [`runner`](crate::exec::runner)) so that shell pipelines and grandchildren
//! go down with them. Termination escalates: SIGTERM to the group, a bounded
//! grace wait, then SIGKILL. `kill_on_drop(true)` on every spawned command
//! remains the last-resort reaper.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Terminate `child` (and its process group), waiting up to `grace` between
/// the polite signal and the forced kill. Returns the final exit status, so
/// the caller can still record how the process went down.
pub async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    // The process may have just exited on its own; reap it and report that.
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    signal_group(child, GroupSignal::Term);

    match timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                pid = child.id(),
                grace_secs = grace.as_secs(),
                "process did not exit within grace period; force killing"
            );
            signal_group(child, GroupSignal::Kill);
            // `Child::kill` sends SIGKILL to the direct child and awaits it,
            // covering non-unix targets and any stragglers.
            child.kill().await?;
            child.wait().await
        }
    }
}

enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // `id()` is None once the child has been reaped; nothing left to signal.
    let Some(pid) = child.id() else {
        return;
    };

    let sig = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    // The child is its own process group leader, so pgid == pid.
    if let Err(err) = killpg(Pid::from_raw(pid as i32), sig) {
        debug!(pid, ?sig, error = %err, "killpg failed (process group may be gone)");
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: GroupSignal) {
    // No process groups; the `Child::kill` fallback in `terminate` handles it.
}
