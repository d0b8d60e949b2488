// crates/test-utils/src/stub.rs

//! Stub listener scripts standing in for `interactsh-client` in tests.

use std::path::{Path, PathBuf};

/// Write an executable shell script into `dir` and return its path.
///
/// `body` runs under `sh`; the script receives whatever arguments the
/// monitor passes to the real client and is free to ignore them.
#[cfg(unix)]
pub fn write_stub_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!("#!/bin/sh\n{body}\n");
    std::fs::write(&path, script).expect("write stub script");

    let mut perms = std::fs::metadata(&path)
        .expect("stat stub script")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub script");

    path
}

/// A stub that registers a payload domain for `server` and then idles,
/// optionally printing `events` (one JSON object per element) first.
#[cfg(unix)]
pub fn ready_listener_script(dir: &Path, server: &str, events: &[&str]) -> PathBuf {
    let mut body = String::new();
    body.push_str(&format!(
        "echo '[INF] abcdefghij0123456789klmnop.{server}'\n"
    ));
    for event in events {
        body.push_str(&format!("echo '{event}'\n"));
    }
    body.push_str("sleep 60\n");
    write_stub_script(dir, "stub-listener.sh", &body)
}
