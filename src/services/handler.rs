use crate::config::ScriptConfigs;
use crate::error::{AppError, Result};
use crate::executor::environment::{self, DATASET_INSTALL_PATH, PROJECT_ID};
use crate::executor::exit_status::ScriptStatus;
use crate::executor::process::deadline_after;
use crate::executor::streams::{collect_lines, relay_lines};
use crate::executor::{ProcessRunner, ScriptKind, ScriptProcess, ScriptRunner};
use crate::metrics::{ERROR_OUTCOME, ScriptMetrics, TIMEOUT_OUTCOME};
use crate::models::{DatasetId, ProjectId};
use crate::paths::{self, DatasetPathFactory};
use crate::services::database::DatabaseResolver;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant as Deadline;

/// A single dataset operation.
pub trait Handler {
    type Output;

    /// Entries this handler adds over the inherited environment.
    fn script_env(&self) -> HashMap<String, String>;

    async fn run(self) -> Result<Self::Output>;
}

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct HandlerBase {
    pub scripts: Arc<ScriptConfigs>,
    pub custom_path: String,
    pub runner: ProcessRunner,
    pub metrics: Arc<ScriptMetrics>,
    pub paths: DatasetPathFactory,
    pub resolver: DatabaseResolver,
}

/// One script launch.
pub struct ScriptCall<'a> {
    pub kind: ScriptKind,
    pub dataset_id: &'a DatasetId,
    pub working_dir: &'a Path,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdin_lines: Vec<String>,
}

#[derive(Debug)]
pub struct ScriptOutcome<S> {
    pub status: S,
    /// Lines the script wrote to stdout.
    pub warnings: Vec<String>,
}

impl HandlerBase {
    pub fn build_env(
        &self,
        dataset_id: &DatasetId,
        extra: HashMap<String, String>,
    ) -> HashMap<String, String> {
        environment::build_script_env(&self.custom_path, dataset_id, extra)
    }

    /// Runs a script to completion. Stdout is collected and stderr relayed to the log on
    /// separate tasks, both drained before the exit code is read. The time limit covers
    /// feeding stdin as well as waiting for exit.
    pub async fn execute_script<S: ScriptStatus>(
        &self,
        call: ScriptCall<'_>,
    ) -> Result<ScriptOutcome<S>> {
        let script = self.scripts.get(call.kind);
        tracing::info!(
            "Executing {} script for dataset {}",
            call.kind,
            call.dataset_id
        );

        let started = Instant::now();
        let deadline = deadline_after(script.max_seconds);
        let mut process = match self
            .runner
            .run(&script.path, call.working_dir, &call.args, &call.env)
            .await
        {
            Ok(process) => process,
            Err(e) => return Err(self.script_failed(&call, started, e)),
        };

        let stdout = process.take_stdout();
        let stderr = process.take_stderr();
        let tag = format!("[{}][{}]", call.kind, call.dataset_id);
        let stdout_task = tokio::spawn(async move {
            match stdout {
                Some(stdout) => collect_lines(stdout).await,
                None => Vec::new(),
            }
        });
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                relay_lines(stderr, tag).await;
            }
        });

        let fed = feed_stdin(&mut process, &call.stdin_lines, deadline, script.max_seconds).await;
        let waited = match fed {
            Ok(()) => process.wait_until(deadline, script.max_seconds).await,
            Err(e) => Err(e),
        };
        if let Err(e) = waited {
            stdout_task.abort();
            stderr_task.abort();
            return Err(self.script_failed(&call, started, e));
        }

        let warnings = stdout_task
            .await
            .map_err(|e| AppError::IllegalState(format!("stdout reader failed: {}", e)))?;
        stderr_task
            .await
            .map_err(|e| AppError::IllegalState(format!("stderr reader failed: {}", e)))?;

        let status = S::from(process.exit_code()?);
        let elapsed = started.elapsed();
        self.metrics.record(call.kind, elapsed, &status.metric_label());
        tracing::debug!(
            "{} script for dataset {} finished as {:?} in {:.3}s",
            call.kind,
            call.dataset_id,
            status,
            elapsed.as_secs_f64()
        );

        Ok(ScriptOutcome { status, warnings })
    }

    /// Records and logs a script that produced no exit code.
    fn script_failed(&self, call: &ScriptCall<'_>, started: Instant, error: AppError) -> AppError {
        let outcome = match error {
            AppError::ScriptTimeout { .. } => TIMEOUT_OUTCOME,
            _ => ERROR_OUTCOME,
        };
        self.metrics.record(call.kind, started.elapsed(), outcome);
        tracing::error!(
            "{} script failed for dataset {}: {}",
            call.kind,
            call.dataset_id,
            error
        );
        error
    }
}

/// Feeds `lines` to the script, killing it if `deadline` passes first.
async fn feed_stdin(
    process: &mut ScriptProcess,
    lines: &[String],
    deadline: Option<Deadline>,
    max_seconds: i64,
) -> Result<()> {
    let Some(deadline) = deadline else {
        return write_stdin(process, lines).await;
    };
    let written = tokio::time::timeout_at(deadline, write_stdin(process, lines)).await;
    match written {
        Ok(written) => written,
        Err(_elapsed) => Err(process.kill_for_timeout(max_seconds).await),
    }
}

/// Writes `lines` to the script's stdin and closes it. Write failures are ignored once the
/// script has exited.
async fn write_stdin(process: &mut ScriptProcess, lines: &[String]) -> Result<()> {
    let Some(mut stdin) = process.take_stdin() else {
        return Ok(());
    };

    for line in lines {
        let written = stdin.write_all(format!("{}\n", line).as_bytes()).await;
        if let Err(e) = written {
            tracing::error!("Failed writing to {} stdin: {}", process.command(), e);
            if process.is_alive() {
                return Err(e.into());
            }
            return Ok(());
        }
    }

    if let Err(e) = stdin.shutdown().await {
        tracing::error!("Failed closing {} stdin: {}", process.command(), e);
        if process.is_alive() {
            return Err(e.into());
        }
    }
    Ok(())
}

/// Error for an exit code outside the script's table.
pub fn unexpected_exit(kind: ScriptKind, dataset_id: &DatasetId, code: i32) -> AppError {
    tracing::error!(
        "{} script failed for dataset {} with unexpected exit code {}",
        kind,
        dataset_id,
        code
    );
    AppError::UnexpectedExitCode {
        script: kind.to_string(),
        code,
    }
}

/// Environment entries shared by the handlers that touch an install.
pub fn installation_env(project: &ProjectId, install_path: &Path) -> HashMap<String, String> {
    HashMap::from([
        (PROJECT_ID.to_string(), project.to_string()),
        (
            DATASET_INSTALL_PATH.to_string(),
            install_path.display().to_string(),
        ),
    ])
}

/// Refuses to start when `install_path` already exists, then runs `pipeline`. With
/// `cleanup_on_failure`, anything a failed pipeline left at `install_path` is removed.
pub async fn with_install_lifecycle<T, Fut>(
    install_path: &Path,
    dataset_id: &DatasetId,
    cleanup_on_failure: bool,
    pipeline: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if install_path.exists() {
        tracing::error!(
            "Install directory for dataset {} already exists: {}",
            dataset_id,
            install_path.display()
        );
        return Err(AppError::InstallDirConflict(install_path.to_path_buf()));
    }

    let result = pipeline.await;
    if result.is_err() && cleanup_on_failure {
        if let Err(e) = paths::remove_install_dir(install_path, dataset_id) {
            tracing::warn!(
                "Failed to remove install directory {} after failure: {}",
                install_path.display(),
                e
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::exit_status::{CompatibilityStatus, SuccessOnlyStatus};
    use crate::test_support::{TestContext, dataset_id};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn collects_stdout_and_maps_exit_code() {
        let ctx = TestContext::new();
        ctx.set_script(
            ScriptKind::CheckCompatibility,
            "while read -r dep version; do echo \"missing $dep@$version\"; done\necho oops >&2\nexit 1",
        );
        let id = dataset_id();

        let outcome: ScriptOutcome<CompatibilityStatus> = ctx
            .base()
            .execute_script(ScriptCall {
                kind: ScriptKind::CheckCompatibility,
                dataset_id: &id,
                working_dir: ctx.workspace(),
                args: vec![],
                env: ctx.base().build_env(&id, HashMap::new()),
                stdin_lines: vec!["genome\t68".to_string(), "annotation\t2".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(outcome.status, CompatibilityStatus::Incompatible);
        assert_eq!(outcome.warnings, vec!["missing genome@68", "missing annotation@2"]);
        assert_eq!(
            ctx.metrics()
                .outcome_count(ScriptKind::CheckCompatibility, "incompatible"),
            1
        );
    }

    #[tokio::test]
    async fn timeout_is_recorded_and_propagated() {
        let ctx = TestContext::new();
        ctx.set_script(ScriptKind::Uninstall, "exec sleep 30");
        ctx.set_max_seconds(ScriptKind::Uninstall, 1);
        let id = dataset_id();

        let result: Result<ScriptOutcome<SuccessOnlyStatus>> = ctx
            .base()
            .execute_script(ScriptCall {
                kind: ScriptKind::Uninstall,
                dataset_id: &id,
                working_dir: ctx.workspace(),
                args: vec![id.to_string()],
                env: ctx.base().build_env(&id, HashMap::new()),
                stdin_lines: vec![],
            })
            .await;

        assert_matches!(result, Err(AppError::ScriptTimeout { seconds: 1, .. }));
        assert_eq!(ctx.metrics().outcome_count(ScriptKind::Uninstall, "timeout"), 1);
    }

    #[tokio::test]
    async fn timeout_covers_stdin_the_script_never_reads() {
        let ctx = TestContext::new();
        ctx.set_script(ScriptKind::CheckCompatibility, "exec sleep 20");
        ctx.set_max_seconds(ScriptKind::CheckCompatibility, 1);
        let id = dataset_id();
        // Far more than a pipe buffer holds.
        let stdin_lines = (0..5000)
            .map(|i| format!("resource_identifier_{:08}\t{:032}", i, i))
            .collect();

        let result: Result<ScriptOutcome<CompatibilityStatus>> = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ctx.base().execute_script(ScriptCall {
                kind: ScriptKind::CheckCompatibility,
                dataset_id: &id,
                working_dir: ctx.workspace(),
                args: vec![],
                env: ctx.base().build_env(&id, HashMap::new()),
                stdin_lines,
            }),
        )
        .await
        .expect("script was not killed at its time limit");

        assert_matches!(result, Err(AppError::ScriptTimeout { seconds: 1, .. }));
        assert_eq!(
            ctx.metrics()
                .outcome_count(ScriptKind::CheckCompatibility, "timeout"),
            1
        );
    }

    #[tokio::test]
    async fn failed_spawn_is_recorded_as_error() {
        let ctx = TestContext::new();
        let base = ctx.base();
        std::fs::remove_file(&base.scripts.get(ScriptKind::Uninstall).path).unwrap();
        let id = dataset_id();

        let result: Result<ScriptOutcome<SuccessOnlyStatus>> = base
            .execute_script(ScriptCall {
                kind: ScriptKind::Uninstall,
                dataset_id: &id,
                working_dir: ctx.workspace(),
                args: vec![id.to_string()],
                env: base.build_env(&id, HashMap::new()),
                stdin_lines: vec![],
            })
            .await;

        assert_matches!(result, Err(AppError::IllegalState(_)));
        assert_eq!(ctx.metrics().outcome_count(ScriptKind::Uninstall, "error"), 1);
    }

    #[tokio::test]
    async fn lifecycle_rejects_existing_install_without_running_pipeline() {
        let ctx = TestContext::new();
        let id = dataset_id();
        let install = ctx.workspace().join("existing");
        std::fs::create_dir(&install).unwrap();

        let mut ran = false;
        let result = with_install_lifecycle(&install, &id, true, async {
            ran = true;
            Ok(())
        })
        .await;

        assert_matches!(result, Err(AppError::InstallDirConflict(path)) if path == install);
        assert!(!ran);
        assert!(install.exists());
    }

    #[tokio::test]
    async fn lifecycle_cleans_up_after_failure() {
        let ctx = TestContext::new();
        let id = dataset_id();
        let install = ctx.workspace().join("new-install");

        let result: Result<()> = with_install_lifecycle(&install, &id, true, async {
            std::fs::create_dir(&install)?;
            Err(AppError::IllegalState("boom".to_string()))
        })
        .await;

        assert_matches!(result, Err(AppError::IllegalState(_)));
        assert!(!install.exists());
    }
}
