//! Worker process adapter.
//!
//! Spawns one external search worker for an [`InvocationSpec`], exposes its
//! stdout as a lazy sequence of lines and keeps stderr on a separate,
//! diagnostics-only path.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::plan::InvocationSpec;
use crate::resources::ProcessGuard;

/// Number of trailing stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for stderr EOF after the worker has been reaped.
/// Grandchildren of the worker may keep the pipe open indefinitely.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How a worker ended.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    pub status: ExitStatus,
    /// Last lines the worker wrote to stderr.
    pub stderr_tail: Vec<String>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Human-readable exit reason, e.g. `exit code 2`.
    pub fn describe(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

/// A running search worker.
pub struct WorkerProcess {
    guard: ProcessGuard,
    stdout: Split<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl WorkerProcess {
    /// Start the worker described by `spec`.
    pub async fn spawn(spec: &InvocationSpec) -> Result<Self> {
        let mut command = Command::new(spec.binary());
        command
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = spawn_with_text_file_busy_retry(&mut command)
            .await
            .map_err(|e| OrchestratorError::launch(spec.binary(), e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let guard = ProcessGuard::new(child);

        let stdout = stdout.ok_or_else(|| {
            OrchestratorError::launch(
                spec.binary(),
                std::io::Error::new(std::io::ErrorKind::Other, "worker stdout was not captured"),
            )
        })?;

        info!(
            pid = ?guard.pid(),
            position = %spec.position(),
            invocation = %spec,
            "Worker started"
        );

        Ok(Self {
            stdout: BufReader::new(stdout).split(b'\n'),
            stderr: stderr.map(|stderr| tokio::spawn(collect_stderr(stderr, guard.pid()))),
            guard,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.guard.pid()
    }

    /// Next line of stdout, or `None` once the worker closed it.
    ///
    /// Resolves as soon as the worker flushes a newline. Bytes that are not
    /// valid UTF-8 are replaced rather than failing the read.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let Some(mut bytes) = self.stdout.next_segment().await? else {
            return Ok(None);
        };

        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Wait for the worker to exit and reap it.
    pub async fn wait(&mut self) -> Result<WorkerExit> {
        let status = self.guard.wait().await?;
        Ok(self.exit(status).await)
    }

    /// Stop the worker if it is still running and reap it.
    pub async fn terminate(&mut self) -> Result<WorkerExit> {
        debug!(pid = ?self.pid(), "Terminating worker");
        let status = self.guard.kill().await?;
        Ok(self.exit(status).await)
    }

    async fn exit(&mut self, status: ExitStatus) -> WorkerExit {
        let stderr_tail = match self.stderr.take() {
            Some(mut handle) => {
                match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
                    Ok(joined) => joined.unwrap_or_default(),
                    Err(_) => {
                        debug!(pid = ?self.pid(), "Worker stderr still open after exit");
                        handle.abort();
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        WorkerExit {
            status,
            stderr_tail,
        }
    }
}

/// A freshly replaced worker binary can briefly fail with ETXTBSY while
/// another process still holds it open for writing.
async fn spawn_with_text_file_busy_retry(command: &mut Command) -> std::io::Result<Child> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;

    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(e)
                if e.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                debug!(attempt, "Worker binary busy, retrying spawn");
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drain a worker's stderr, logging each line and keeping the tail.
async fn collect_stderr<R>(stderr: R, pid: Option<u32>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).split(b'\n');

    loop {
        match lines.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(pid = ?pid, line = %line, "Worker stderr");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(pid = ?pid, error = %e, "Failed to read worker stderr");
                break;
            }
        }
    }

    tail.into()
}
