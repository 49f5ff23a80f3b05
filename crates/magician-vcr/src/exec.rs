//! Subprocess execution with captured output and a hard timeout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::RunnerError;

/// A fully described process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Run `spec` to completion.
///
/// Launch failures are errors. A timeout kills the process and is reported
/// through [`CommandOutput::timed_out`], keeping whatever it printed so far.
pub async fn execute(spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|source| RunnerError::Launch {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = Capture::spawn(child.stdout.take());
    let stderr = Capture::spawn(child.stderr.take());

    let status = match spec.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(command = %spec.display(), "process timed out, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out process");
                }
                None
            }
        },
        None => Some(child.wait().await?),
    };

    // Pipes inherited by grandchildren may stay open after a kill.
    let drain = if status.is_some() { None } else { Some(DRAIN_AFTER_KILL) };
    let (stdout, stderr) = tokio::join!(stdout.finish(drain), stderr.finish(drain));

    Ok(CommandOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
        timed_out: status.is_none(),
    })
}

const DRAIN_AFTER_KILL: Duration = Duration::from_secs(2);

/// Output of one pipe, collected by a background task as it arrives.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait for the pipe to close, at most `limit` when given.
    async fn finish(mut self, limit: Option<Duration>) -> String {
        if let Some(mut task) = self.task.take() {
            match limit {
                Some(limit) => {
                    if tokio::time::timeout(limit, &mut task).await.is_err() {
                        task.abort();
                    }
                }
                None => {
                    let _ = task.await;
                }
            }
        }
        let bytes = self.buffer.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = execute(&spec).await.expect("execute failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let output = execute(&CommandSpec::new("false")).await.expect("execute failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut env = BTreeMap::new();
        env.insert("VCR_MODE".to_string(), "REPLAYING".to_string());
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $VCR_MODE; pwd; echo oops >&2"])
            .envs(env)
            .current_dir(dir.path());
        let output = execute(&spec).await.expect("execute failed");
        assert!(output.stdout.starts_with("REPLAYING\n"));
        let canonical = dir.path().canonicalize().expect("canonicalize");
        assert!(output.stdout.contains(canonical.to_string_lossy().as_ref()));
        assert!(output.combined().ends_with("oops\n"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(50));
        let output = execute(&spec).await.expect("execute failed");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo '--- PASS: TestAccA (0.10s)'; echo building >&2; sleep 5"])
            .timeout(Duration::from_millis(500));
        let output = execute(&spec).await.expect("execute failed");
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert_eq!(output.stdout, "--- PASS: TestAccA (0.10s)\n");
        assert_eq!(output.stderr, "building\n");
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_error() {
        let err = execute(&CommandSpec::new("/definitely/not/a/binary"))
            .await
            .expect_err("launch should fail");
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("go").args(["test", "./..."]);
        assert_eq!(spec.display(), "go test ./...");
    }
}
