//! Subprocess execution under a hard deadline
//!
//! Compile checks, functional cases and sandbox probes all go through
//! [`run`]. A missing binary maps to [`ToolError::Unavailable`], an expired
//! deadline kills the child and maps to [`ToolError::Timeout`].

use crate::error::ToolError;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Description of a process to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    stdin: Option<String>,
    timeout: Duration,
}

impl CommandSpec {
    /// New spec with a 30 second deadline
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Append one argument
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory
    #[inline]
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Text written to stdin; stdin is closed when unset
    #[inline]
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Hard deadline
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
    /// Wall-clock time
    pub duration: Duration,
}

impl CommandOutput {
    /// Exit code zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run a process to completion or until its deadline.
pub async fn run(spec: CommandSpec) -> Result<CommandOutput, ToolError> {
    let tool = spec.program.clone();
    let io_err = |source: std::io::Error| ToolError::Io {
        tool: tool.clone(),
        source,
    };

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ToolError::Unavailable { tool: tool.clone() }
        } else {
            io_err(source)
        }
    })?;

    if let (Some(input), Some(mut pipe)) = (spec.stdin, child.stdin.take()) {
        tokio::spawn(async move {
            // The child may exit without reading; a broken pipe is not our failure.
            let _ = pipe.write_all(input.as_bytes()).await;
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    });
    let mut stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    });

    // One deadline covers the exit and both pipes; a background grandchild
    // may hold the pipes open after the child exits.
    let deadline = tokio::time::Instant::now() + spec.timeout;
    let finished = tokio::time::timeout_at(deadline, async {
        let status = child.wait().await;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (status, stdout, stderr)
    })
    .await;

    match finished {
        Ok((status, stdout, stderr)) => {
            let status = status.map_err(io_err)?;
            Ok(CommandOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                duration: start.elapsed(),
            })
        }
        Err(_) => {
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(e) = child.kill().await {
                    tracing::warn!(tool = %tool, error = %e, "failed to kill timed-out process");
                }
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(ToolError::Timeout {
                tool,
                secs: spec.timeout.as_secs(),
            })
        }
    }
}

/// Whether `program` can be spawned at all
pub async fn is_available(program: &str) -> bool {
    let probe = CommandSpec::new(program)
        .arg("--version")
        .timeout(Duration::from_secs(10));
    !matches!(run(probe).await, Err(ToolError::Unavailable { .. }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let out = run(CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = run(CommandSpec::new("cat").stdin("line one\n")).await.unwrap();
        assert_eq!(out.stdout, "line one\n");
        assert!(out.success());
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = run(CommandSpec::new("definitely-not-a-real-binary-mend"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(!is_available("definitely-not-a-real-binary-mend").await);
    }

    #[tokio::test]
    async fn deadline_kills_child() {
        let started = Instant::now();
        let err = run(CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn deadline_covers_pipes_held_by_background_children() {
        let started = Instant::now();
        let err = run(CommandSpec::new("sh")
            .args(["-c", "sleep 10 & echo hi"])
            .timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
