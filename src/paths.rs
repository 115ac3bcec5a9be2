use crate::error::Result;
use crate::models::{DatasetId, ProjectId};
use chrono::Local;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "dataset-handler-";
const DELETING_PREFIX: &str = "deleting-";

/// Derives `{root}/{site_build}/{project}/{dataset}` install directories.
#[derive(Debug, Clone)]
pub struct DatasetPathFactory {
    root: PathBuf,
    site_build: String,
}

impl DatasetPathFactory {
    pub fn new(root: impl Into<PathBuf>, site_build: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            site_build: site_build.into(),
        }
    }

    pub fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join(&self.site_build).join(project.as_str())
    }

    /// Install path for the dataset. The project directory is created if missing; the dataset
    /// directory itself is not.
    pub fn make_path(&self, project: &ProjectId, dataset: &DatasetId) -> Result<PathBuf> {
        let project_dir = self.project_dir(project);
        std::fs::create_dir_all(&project_dir)?;
        Ok(project_dir.join(dataset.as_str()))
    }
}

/// Private per-request workspace, removed when dropped.
pub fn new_workspace(workspace_root: &Path) -> Result<TempDir> {
    std::fs::create_dir_all(workspace_root)?;
    let dir = tempfile::Builder::new()
        .prefix(WORKSPACE_PREFIX)
        .tempdir_in(workspace_root)?;
    Ok(dir)
}

/// Removes an install directory by renaming it to a `deleting-` sibling first, so the original
/// path disappears atomically. A missing directory is not an error.
pub fn remove_install_dir(install_path: &Path, dataset: &DatasetId) -> Result<()> {
    if !install_path.exists() {
        return Ok(());
    }

    let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S");
    let name = format!("{}{}-{}", DELETING_PREFIX, dataset, stamp);
    let doomed = match install_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    };

    match std::fs::rename(install_path, &doomed) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    tracing::debug!(
        "Renamed {} to {} for removal",
        install_path.display(),
        doomed.display()
    );

    std::fs::remove_dir_all(&doomed)?;
    Ok(())
}
