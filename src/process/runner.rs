//! Process runner — one shell command from spawn to reap.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ExecContext, ProcessHandle, ProcessRegistry, Signal, signal_process_group};
use crate::error::{ToolError, ToolResult};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How long output pipes may stay open after the shell itself has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolve the shell used to run commands: `bash` from `PATH`, else `sh`.
pub fn default_shell() -> PathBuf {
    which::which("bash").unwrap_or_else(|_| PathBuf::from("sh"))
}

/// One command to run.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: String,
    pub work_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            work_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Success,
    Failed,
}

/// Result of a command that ran, whatever its exit code.
#[derive(Debug, Clone, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub status: ExecStatus,
    #[serde(rename = "timeout")]
    pub timed_out: bool,
}

/// Runs commands through a shell and tracks them in a [`ProcessRegistry`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    registry: ProcessRegistry,
    shell: PathBuf,
}

impl ProcessRunner {
    pub fn new(registry: ProcessRegistry, shell: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            shell: shell.into(),
        }
    }

    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run `request` to completion, timeout or cancellation.
    ///
    /// A non-zero exit is a successful call with [`ExecStatus::Failed`].
    pub async fn run(&self, request: &ExecRequest) -> ToolResult<ExecOutput> {
        if let Some(dir) = &request.work_dir {
            validate_work_dir(dir).await?;
        }

        let ctx = ExecContext::with_timeout(request.timeout);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&request.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.work_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ToolError::SpawnFailed {
            command: request.command.clone(),
            source,
        })?;
        let Some(pid) = child.id() else {
            return Err(ToolError::Execution {
                source: std::io::Error::other("spawned process has no pid"),
            });
        };

        let (exit_tx, exit_rx) = watch::channel(None);
        let handle = ProcessHandle::new(pid, ctx.cancel_handle(), exit_rx);
        let _registration = match self.registry.register(handle) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(pid, "registry closed, killing freshly spawned command");
                signal_process_group(pid, Signal::Kill);
                let _ = child.wait().await;
                return Err(e);
            }
        };

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());
        let started = Instant::now();
        info!(pid, command = %request.command, timeout_secs = request.timeout.as_secs(), "command started");

        let waited = wait_for_exit(&mut child, &ctx, pid).await;
        exit_tx.send_replace(Some(match &waited {
            Ok((status, _)) => exit_code(*status),
            Err(_) => -1,
        }));

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;

        let (status, timed_out) = waited.map_err(|source| {
            if ctx.deadline_exceeded() {
                ToolError::TimedOut {
                    seconds: request.timeout.as_secs(),
                }
            } else {
                ToolError::Execution { source }
            }
        })?;

        let exit_code = exit_code(status);
        info!(
            pid,
            exit_code,
            timed_out,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command finished"
        );

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            status: if exit_code == 0 {
                ExecStatus::Success
            } else {
                ExecStatus::Failed
            },
            timed_out,
        })
    }
}

async fn validate_work_dir(dir: &Path) -> ToolResult<()> {
    let meta = tokio::fs::metadata(dir)
        .await
        .map_err(|source| ToolError::InvalidWorkDir {
            path: dir.to_path_buf(),
            source,
        })?;
    if !meta.is_dir() {
        return Err(ToolError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Wait for the child, reacting to context cancellation.
///
/// Returns the exit status and whether the deadline killed the command.
async fn wait_for_exit(
    child: &mut Child,
    ctx: &ExecContext,
    pid: u32,
) -> std::io::Result<(ExitStatus, bool)> {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = ctx.done() => None,
    };
    if let Some(status) = exited {
        return status.map(|s| (s, false));
    }

    if ctx.deadline_exceeded() {
        warn!(pid, "deadline exceeded, killing command");
        signal_process_group(pid, Signal::Kill);
        if let Err(e) = child.start_kill() {
            debug!(pid, error = %e, "start_kill after group kill");
        }
        return child.wait().await.map(|s| (s, true));
    }

    // Shutdown sweep: the coordinator delivers the signals.
    debug!(pid, "execution context cancelled, waiting for exit");
    child.wait().await.map(|s| (s, false))
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Accumulates one output pipe in the background.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            debug!(error = %e, "output pipe read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("output pipe still open after exit, keeping what was captured");
                task.abort();
            }
        }
        let bytes = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(ProcessRegistry::new(), default_shell())
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr_separately() {
        let out = runner()
            .run(&ExecRequest::new("echo out; echo err >&2"))
            .await
            .expect("run");
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.status, ExecStatus::Success);
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn test_stdin_is_empty() {
        let out = runner()
            .run(&ExecRequest::new("cat; echo done"))
            .await
            .expect("run");
        assert_eq!(out.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_failure() {
        let runner = ProcessRunner::new(ProcessRegistry::new(), "/nonexistent/shell-binary");
        let err = runner
            .run(&ExecRequest::new("true"))
            .await
            .expect_err("spawn must fail");
        assert!(matches!(err, ToolError::SpawnFailed { .. }));
        assert_eq!(runner.registry().registered_total(), 0);
    }

    #[tokio::test]
    async fn test_work_dir_that_is_a_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let runner = runner();
        let err = runner
            .run(&ExecRequest::new("pwd").with_work_dir(file.path()))
            .await
            .expect_err("must reject");
        assert!(matches!(err, ToolError::NotADirectory { .. }));
        assert_eq!(runner.registry().registered_total(), 0);
    }

    #[tokio::test]
    async fn test_closed_registry_refuses_to_run() {
        let runner = runner();
        runner.registry().drain();
        let err = runner
            .run(&ExecRequest::new("sleep 30"))
            .await
            .expect_err("must refuse");
        assert!(matches!(err, ToolError::ShuttingDown));
    }
}
