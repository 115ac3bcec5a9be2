use super::handler::{Handler, HandlerBase, ScriptCall, unexpected_exit};
use crate::archive;
use crate::error::{AppError, Result};
use crate::executor::ScriptKind;
use crate::executor::environment::IMPORT_ID;
use crate::executor::exit_status::ImportStatus;
use crate::models::{DatasetMeta, ImportDetails};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const INPUT_DIR_NAME: &str = "input";
const OUTPUT_DIR_NAME: &str = "output";
const MANIFEST_FILE_NAME: &str = "manifest.json";
const META_FILE_NAME: &str = "meta.json";
const WARNINGS_FILE_NAME: &str = "warnings.json";
const RESULT_FILE_NAME: &str = "output.tar.gz";

#[derive(Debug, Serialize, PartialEq)]
pub struct ManifestFile {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    input_files: &'a [ManifestFile],
    data_files: &'a [ManifestFile],
}

#[derive(Debug, Serialize)]
struct WarningsFile<'a> {
    warnings: &'a [String],
}

/// Turns an uploaded `.tar.gz` into an import result archive by running the import script.
pub struct ImportHandler<'a> {
    base: &'a HandlerBase,
    workspace: &'a Path,
    payload: PathBuf,
    details: ImportDetails,
    import_id: Uuid,
}

impl<'a> ImportHandler<'a> {
    pub fn new(
        base: &'a HandlerBase,
        workspace: &'a Path,
        payload: PathBuf,
        details: ImportDetails,
    ) -> Self {
        Self {
            base,
            workspace,
            payload,
            details,
            import_id: Uuid::new_v4(),
        }
    }

    fn unpack_input(&self, input_dir: &Path) -> Result<Vec<ManifestFile>> {
        let files = archive::unpack_tar_gz(&self.payload, input_dir)?;
        if let Err(e) = fs::remove_file(&self.payload) {
            tracing::warn!("Failed to remove import payload {}: {}", self.payload.display(), e);
        }

        if files.is_empty() {
            return Err(AppError::EmptyInput);
        }

        files
            .into_iter()
            .map(|relative| {
                let size = fs::metadata(input_dir.join(&relative))?.len();
                Ok(ManifestFile {
                    name: relative.to_string_lossy().into_owned(),
                    size,
                })
            })
            .collect()
    }

    fn collect_output_files(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut outputs = fs::read_dir(output_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;

        if outputs.is_empty() {
            tracing::error!(
                "Import script produced no output files for dataset {}",
                self.details.dataset_id
            );
            return Err(AppError::IllegalState(
                "import script produced no output files".to_string(),
            ));
        }

        outputs.sort();
        Ok(outputs)
    }

    fn write_result_files(
        &self,
        output_dir: &Path,
        input_files: &[ManifestFile],
        outputs: &[PathBuf],
        warnings: &[String],
    ) -> Result<Vec<PathBuf>> {
        let data_files = outputs
            .iter()
            .map(|path| {
                Ok(ManifestFile {
                    name: file_name(path),
                    size: fs::metadata(path)?.len(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let meta: DatasetMeta = self.details.meta.normalized();
        let manifest = Manifest {
            input_files,
            data_files: &data_files,
        };

        Ok(vec![
            write_json_new(&output_dir.join(MANIFEST_FILE_NAME), &manifest)?,
            write_json_new(&output_dir.join(META_FILE_NAME), &meta)?,
            write_json_new(&output_dir.join(WARNINGS_FILE_NAME), &WarningsFile { warnings })?,
        ])
    }
}

impl Handler for ImportHandler<'_> {
    type Output = PathBuf;

    fn script_env(&self) -> HashMap<String, String> {
        HashMap::from([(IMPORT_ID.to_string(), self.import_id.to_string())])
    }

    async fn run(self) -> Result<PathBuf> {
        let dataset_id = &self.details.dataset_id;
        let input_dir = self.workspace.join(INPUT_DIR_NAME);
        let output_dir = self.workspace.join(OUTPUT_DIR_NAME);
        fs::create_dir(&input_dir)?;
        fs::create_dir(&output_dir)?;

        let input_files = self.unpack_input(&input_dir)?;
        tracing::debug!(
            "Unpacked {} input files for dataset {}",
            input_files.len(),
            dataset_id
        );

        let outcome = self
            .base
            .execute_script::<ImportStatus>(ScriptCall {
                kind: ScriptKind::Import,
                dataset_id,
                working_dir: self.workspace,
                args: vec![
                    input_dir.display().to_string(),
                    output_dir.display().to_string(),
                ],
                env: self.base.build_env(dataset_id, self.script_env()),
                stdin_lines: Vec::new(),
            })
            .await?;

        match outcome.status {
            ImportStatus::Success => {
                tracing::info!("Import script completed successfully for dataset {}", dataset_id)
            }
            ImportStatus::ValidationFailure => {
                tracing::info!("Import script rejected dataset {} for validation errors", dataset_id);
                return Err(AppError::Validation(outcome.warnings));
            }
            ImportStatus::Unexpected(code) => {
                return Err(unexpected_exit(ScriptKind::Import, dataset_id, code));
            }
        }

        fs::remove_dir_all(&input_dir)?;

        let mut outputs = self.collect_output_files(&output_dir)?;
        let written =
            self.write_result_files(&output_dir, &input_files, &outputs, &outcome.warnings)?;
        outputs.extend(written);

        let result = self.workspace.join(RESULT_FILE_NAME);
        archive::pack_tar_gz(&outputs, &result)?;
        fs::remove_dir_all(&output_dir)?;

        Ok(result)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let file = File::create_new(path)?;
    serde_json::to_writer(file, value)?;
    Ok(path.to_path_buf())
}
