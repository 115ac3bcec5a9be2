use super::ScriptRunner;
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::time::Instant;

/// Deadline `max_seconds` from now; `None` when negative (no limit).
pub fn deadline_after(max_seconds: i64) -> Option<Instant> {
    u64::try_from(max_seconds)
        .ok()
        .map(|seconds| Instant::now() + Duration::from_secs(seconds))
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ScriptRunner for ProcessRunner {
    async fn run(
        &self,
        executable: &Path,
        working_dir: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ScriptProcess> {
        let mut cmd = tokio::process::Command::new(executable);
        cmd.args(args);
        cmd.current_dir(working_dir);
        cmd.env_clear();
        cmd.envs(env);

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            AppError::IllegalState(format!(
                "Failed to start script {}: {}",
                executable.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Started {} (pid {:?}) with args {:?}",
            executable.display(),
            child.id(),
            args
        );

        Ok(ScriptProcess {
            command: executable.display().to_string(),
            child,
            status: None,
        })
    }
}

/// Live handle to a spawned script.
#[derive(Debug)]
pub struct ScriptProcess {
    command: String,
    child: Child,
    status: Option<ExitStatus>,
}

impl ScriptProcess {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Waits for the process to exit, killing it at `deadline`. `None` waits without limit.
    /// `max_seconds` is the configured limit reported in the timeout error; the caller derives
    /// `deadline` from it with [`deadline_after`] before any other use of the process.
    pub async fn wait_until(&mut self, deadline: Option<Instant>, max_seconds: i64) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }

        let status = match deadline {
            None => self.child.wait().await?,
            Some(deadline) => match tokio::time::timeout_at(deadline, self.child.wait()).await {
                Ok(status) => status?,
                Err(_elapsed) => return Err(self.kill_for_timeout(max_seconds).await),
            },
        };

        self.status = Some(status);
        Ok(())
    }

    /// Kills the process after it overran `max_seconds` and returns the matching error.
    pub async fn kill_for_timeout(&mut self, max_seconds: i64) -> AppError {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill {}: {}", self.command, e);
        }
        match self.child.wait().await {
            Ok(status) => self.status = Some(status),
            Err(e) => tracing::warn!("Failed to reap {}: {}", self.command, e),
        }
        AppError::ScriptTimeout {
            command: self.command.clone(),
            seconds: max_seconds,
        }
    }

    pub fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit code of a terminated process; `-1` when it was ended by a signal.
    pub fn exit_code(&self) -> Result<i32> {
        self.status
            .map(|status| status.code().unwrap_or(-1))
            .ok_or_else(|| {
                AppError::IllegalState(format!(
                    "Exit code of {} requested before the process terminated",
                    self.command
                ))
            })
    }
}
