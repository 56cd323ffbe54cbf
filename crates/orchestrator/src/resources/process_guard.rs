//! RAII guard for worker process lifetime.
//!
//! A worker that is never waited on stays in the process table. The guard
//! records whether the child has been reaped and, when it is dropped early,
//! kills the process so the runtime can reap it in the background.

use std::process::ExitStatus;

use tokio::process::Child;
use tracing::{debug, warn};

/// Owns a spawned worker until its exit status has been collected.
///
/// # Example
///
/// ```ignore
/// let mut guard = ProcessGuard::new(child);
/// // ... read the worker's output ...
/// let status = guard.wait().await?; // reaps the child
/// // Dropping an unreaped guard kills the worker instead
/// ```
pub struct ProcessGuard {
    child: Child,
    pid: Option<u32>,
    reaped: bool,
}

impl ProcessGuard {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        debug!(pid = ?pid, "Process guard created");

        Self {
            child,
            pid,
            reaped: false,
        }
    }

    /// OS process id captured at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the exit status has been collected.
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// Wait for the process to exit and collect its status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        debug!(pid = ?self.pid, status = %status, "Worker process reaped");
        Ok(status)
    }

    /// Kill the process if it is still running, then reap it.
    pub async fn kill(&mut self) -> std::io::Result<ExitStatus> {
        if let Err(e) = self.child.start_kill() {
            // Already exited; waiting below still collects the status.
            debug!(pid = ?self.pid, error = %e, "Kill signal not delivered");
        }
        self.wait().await
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if !self.reaped {
            warn!(
                pid = ?self.pid,
                "Process guard dropped before the worker was reaped - killing"
            );

            let _ = self.child.start_kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_guard_initial_state() {
        let guard = ProcessGuard::new(spawn("exit 0"));

        assert!(!guard.is_reaped());
        assert!(guard.pid().is_some());
    }

    #[tokio::test]
    async fn test_guard_wait_reaps() {
        let mut guard = ProcessGuard::new(spawn("exit 3"));

        let status = guard.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(guard.is_reaped());
    }

    #[tokio::test]
    async fn test_guard_kill_stops_long_running_process() {
        let mut guard = ProcessGuard::new(spawn("exec sleep 30"));

        let status = guard.kill().await.unwrap();
        assert!(!status.success());
        assert!(guard.is_reaped());
    }

    #[tokio::test]
    async fn test_guard_kill_after_exit_still_reaps() {
        let mut guard = ProcessGuard::new(spawn("exit 0"));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let status = guard.kill().await.unwrap();
        assert!(status.success() || status.code().is_none());
        assert!(guard.is_reaped());
    }
}
