use super::handler::{
    Handler, HandlerBase, ScriptCall, installation_env, unexpected_exit, with_install_lifecycle,
};
use crate::error::Result;
use crate::executor::ScriptKind;
use crate::executor::exit_status::SuccessOnlyStatus;
use crate::models::{DatasetId, InstallMetaRequest};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

const META_FILE_NAME: &str = "meta.json";

/// Installs dataset metadata into the target database.
pub struct InstallMetaHandler<'a> {
    base: &'a HandlerBase,
    workspace: &'a Path,
    request: InstallMetaRequest,
    install_path: PathBuf,
}

impl<'a> InstallMetaHandler<'a> {
    pub fn new(
        base: &'a HandlerBase,
        workspace: &'a Path,
        request: InstallMetaRequest,
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

    async fn install(&self) -> Result<()> {
        let request = &self.request;
        let db = self
            .base
            .resolver
            .resolve(&request.project_id, &request.meta.dataset_type.name)
            .await?;

        let meta_file = self.workspace.join(META_FILE_NAME);
        serde_json::to_writer(File::create_new(&meta_file)?, &request.meta)?;

        let mut extra = self.script_env();
        extra.extend(db.to_env_map());
        let env = self.base.build_env(&request.dataset_id, extra);

        run_install_meta(self.base, &request.dataset_id, self.workspace, &meta_file, env).await
    }
}

impl Handler for InstallMetaHandler<'_> {
    type Output = ();

    fn script_env(&self) -> HashMap<String, String> {
        installation_env(&self.request.project_id, &self.install_path)
    }

    async fn run(self) -> Result<()> {
        with_install_lifecycle(
            &self.install_path,
            &self.request.dataset_id,
            false,
            self.install(),
        )
        .await
    }
}

/// Runs the install-meta script with `(datasetID, metaFile)`; shared with install-data.
pub(super) async fn run_install_meta(
    base: &HandlerBase,
    dataset_id: &DatasetId,
    working_dir: &Path,
    meta_file: &Path,
    env: HashMap<String, String>,
) -> Result<()> {
    let outcome = base
        .execute_script::<SuccessOnlyStatus>(ScriptCall {
            kind: ScriptKind::InstallMeta,
            dataset_id,
            working_dir,
            args: vec![dataset_id.to_string(), meta_file.display().to_string()],
            env,
            stdin_lines: Vec::new(),
        })
        .await?;

    match outcome.status {
        SuccessOnlyStatus::Success => {
            tracing::info!("Installed meta for dataset {}", dataset_id);
            Ok(())
        }
        SuccessOnlyStatus::Unexpected(code) => {
            Err(unexpected_exit(ScriptKind::InstallMeta, dataset_id, code))
        }
    }
}
