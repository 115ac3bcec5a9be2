use super::handler::{
    Handler, HandlerBase, ScriptCall, installation_env, unexpected_exit, with_install_lifecycle,
};
use super::install_meta::run_install_meta;
use crate::archive;
use crate::error::{AppError, Result};
use crate::executor::ScriptKind;
use crate::executor::exit_status::{CompatibilityStatus, InstallDataStatus};
use crate::models::{DatasetMeta, InstallDataRequest};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const INSTALL_DIR_NAME: &str = "install";
const META_FILE_NAME: &str = "dataset-meta.json";
const MANIFEST_FILE_NAME: &str = "dataset-manifest.json";

/// Installs a prepared dataset: meta, compatibility check, then data.
pub struct InstallDataHandler<'a> {
    base: &'a HandlerBase,
    workspace: &'a Path,
    payload: PathBuf,
    request: InstallDataRequest,
    install_path: PathBuf,
}

impl<'a> InstallDataHandler<'a> {
    pub fn new(
        base: &'a HandlerBase,
        workspace: &'a Path,
        payload: PathBuf,
        request: InstallDataRequest,
    ) -> Result<Self> {
        let install_path = base
            .paths
            .make_path(&request.project_id, &request.dataset_id)?;
        Ok(Self {
            base,
            workspace,
            payload,
            request,
            install_path,
        })
    }

    fn unpack_payload(&self, install_dir: &Path) -> Result<DatasetMeta> {
        fs::create_dir(install_dir)?;
        archive::unpack_zip(&self.payload, install_dir)?;
        if let Err(e) = fs::remove_file(&self.payload) {
            tracing::warn!("Failed to remove install payload {}: {}", self.payload.display(), e);
        }

        let meta_file = install_dir.join(META_FILE_NAME);
        if !meta_file.is_file() {
            tracing::error!(
                "Install payload for dataset {} has no {}",
                self.request.dataset_id,
                META_FILE_NAME
            );
            return Err(AppError::IllegalState(format!(
                "install payload is missing {}",
                META_FILE_NAME
            )));
        }

        Ok(serde_json::from_slice(&fs::read(&meta_file)?)?)
    }

    async fn check_compatibility(
        &self,
        meta: &DatasetMeta,
        env: HashMap<String, String>,
    ) -> Result<Vec<String>> {
        let dataset_id = &self.request.dataset_id;
        let stdin_lines = meta
            .dependencies
            .iter()
            .map(|d| format!("{}\t{}", d.resource_identifier, d.resource_version))
            .collect();

        let outcome = self
            .base
            .execute_script::<CompatibilityStatus>(ScriptCall {
                kind: ScriptKind::CheckCompatibility,
                dataset_id,
                working_dir: self.workspace,
                args: Vec::new(),
                env,
                stdin_lines,
            })
            .await?;

        match outcome.status {
            CompatibilityStatus::Compatible => Ok(outcome.warnings),
            CompatibilityStatus::Incompatible => {
                tracing::info!(
                    "Dataset {} is incompatible with project {}",
                    dataset_id,
                    self.request.project_id
                );
                Err(AppError::Compatibility(outcome.warnings))
            }
            CompatibilityStatus::Unexpected(code) => Err(unexpected_exit(
                ScriptKind::CheckCompatibility,
                dataset_id,
                code,
            )),
        }
    }

    async fn install(&self) -> Result<Vec<String>> {
        let dataset_id = &self.request.dataset_id;
        let install_dir = self.workspace.join(INSTALL_DIR_NAME);
        let meta = self.unpack_payload(&install_dir)?;

        let db = self
            .base
            .resolver
            .resolve(&self.request.project_id, &meta.dataset_type.name)
            .await?;
        let mut extra = self.script_env();
        extra.extend(db.to_env_map());
        let env = self.base.build_env(dataset_id, extra);

        let meta_file = install_dir.join(META_FILE_NAME);
        run_install_meta(self.base, dataset_id, self.workspace, &meta_file, env.clone()).await?;

        let mut warnings = Vec::new();
        if meta.dependencies.is_empty() {
            tracing::debug!("Dataset {} declares no dependencies", dataset_id);
        } else {
            warnings.extend(self.check_compatibility(&meta, env.clone()).await?);
        }

        fs::remove_file(&meta_file)?;
        let manifest_file = install_dir.join(MANIFEST_FILE_NAME);
        if manifest_file.exists() {
            fs::remove_file(&manifest_file)?;
        }

        let outcome = self
            .base
            .execute_script::<InstallDataStatus>(ScriptCall {
                kind: ScriptKind::InstallData,
                dataset_id,
                working_dir: self.workspace,
                args: vec![dataset_id.to_string(), install_dir.display().to_string()],
                env,
                stdin_lines: Vec::new(),
            })
            .await?;

        match outcome.status {
            InstallDataStatus::Success => {
                tracing::info!("Installed data for dataset {}", dataset_id);
                warnings.extend(outcome.warnings);
                Ok(warnings)
            }
            InstallDataStatus::ValidationFailure => {
                tracing::info!("Install-data rejected dataset {} for validation errors", dataset_id);
                Err(AppError::Validation(outcome.warnings))
            }
            InstallDataStatus::Unexpected(code) => {
                Err(unexpected_exit(ScriptKind::InstallData, dataset_id, code))
            }
        }
    }
}

impl Handler for InstallDataHandler<'_> {
    type Output = Vec<String>;

    fn script_env(&self) -> HashMap<String, String> {
        installation_env(&self.request.project_id, &self.install_path)
    }

    async fn run(self) -> Result<Vec<String>> {
        with_install_lifecycle(
            &self.install_path,
            &self.request.dataset_id,
            true,
            self.install(),
        )
        .await
    }
}
