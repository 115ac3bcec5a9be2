use super::handler::{Handler, HandlerBase, ScriptCall, installation_env, unexpected_exit};
use crate::config::database::WILDCARD_DATA_TYPE;
use crate::error::Result;
use crate::executor::ScriptKind;
use crate::executor::exit_status::SuccessOnlyStatus;
use crate::models::UninstallRequest;
use crate::paths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Removes a dataset from the target database, then from disk.
pub struct UninstallHandler<'a> {
    base: &'a HandlerBase,
    workspace: &'a Path,
    request: UninstallRequest,
    install_path: PathBuf,
}

impl<'a> UninstallHandler<'a> {
    pub fn new(
        base: &'a HandlerBase,
        workspace: &'a Path,
        request: UninstallRequest,
    ) -> Result<Self> {
        let install_path = base
            .paths
            .make_path(&request.project_id, &request.dataset_id)?;
        Ok(Self {
            base,
            workspace,
            request,
            install_path,
        })
    }
}

impl Handler for UninstallHandler<'_> {
    type Output = ();

    fn script_env(&self) -> HashMap<String, String> {
        installation_env(&self.request.project_id, &self.install_path)
    }

    async fn run(self) -> Result<()> {
        let dataset_id = &self.request.dataset_id;
        let data_type = self
            .request
            .data_type
            .as_deref()
            .unwrap_or(WILDCARD_DATA_TYPE);
        let db = self
            .base
            .resolver
            .resolve(&self.request.project_id, data_type)
            .await?;

        let mut extra = self.script_env();
        extra.extend(db.to_env_map());

        let outcome = self
            .base
            .execute_script::<SuccessOnlyStatus>(ScriptCall {
                kind: ScriptKind::Uninstall,
                dataset_id,
                working_dir: self.workspace,
                args: vec![dataset_id.to_string()],
                env: self.base.build_env(dataset_id, extra),
                stdin_lines: Vec::new(),
            })
            .await?;

        if let SuccessOnlyStatus::Unexpected(code) = outcome.status {
            return Err(unexpected_exit(ScriptKind::Uninstall, dataset_id, code));
        }

        paths::remove_install_dir(&self.install_path, dataset_id)?;
        tracing::info!("Uninstalled dataset {}", dataset_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::test_support::{TestContext, dataset_id, project_id};
    use assert_matches::assert_matches;
    use std::fs;

    fn request() -> UninstallRequest {
        UninstallRequest {
            dataset_id: dataset_id(),
            project_id: project_id(),
            data_type: None,
        }
    }

    fn installed(ctx: &TestContext) {
        fs::create_dir_all(ctx.install_path().join("data")).unwrap();
        fs::write(ctx.install_path().join("data/rows.tsv"), "1\n").unwrap();
    }

    #[tokio::test]
    async fn success_removes_install_directory() {
        let ctx = TestContext::new();
        let args = ctx.scratch().join("args");
        ctx.set_script(
            ScriptKind::Uninstall,
            &format!("echo \"$1 $DB_NAME $DB_USER\" > {}", args.display()),
        );
        installed(&ctx);

        let base = ctx.base();
        UninstallHandler::new(&base, ctx.workspace(), request())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert!(!ctx.install_path().exists());
        assert_eq!(
            fs::read_to_string(args).unwrap().trim(),
            format!("{} plasmo plas_w", dataset_id())
        );
        let leftovers = fs::read_dir(ctx.install_path().parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn missing_install_directory_is_not_an_error() {
        let ctx = TestContext::new();

        let base = ctx.base();
        UninstallHandler::new(&base, ctx.workspace(), request())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert!(!ctx.install_path().exists());
    }

    #[tokio::test]
    async fn failed_script_leaves_install_directory() {
        let ctx = TestContext::new();
        ctx.set_script(ScriptKind::Uninstall, "echo 'cannot drop schema' >&2\nexit 2");
        installed(&ctx);

        let base = ctx.base();
        let err = UninstallHandler::new(&base, ctx.workspace(), request())
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert_matches!(err, AppError::UnexpectedExitCode { code: 2, .. });
        assert!(ctx.install_path().join("data/rows.tsv").exists());
    }
}
