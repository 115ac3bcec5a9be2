//! Fixtures shared by unit tests.

use crate::config::{DatabaseConfigMap, RawDatabaseConfig, ScriptConfig, ScriptConfigs};
use crate::executor::{ProcessRunner, ScriptKind};
use crate::metrics::ScriptMetrics;
use crate::models::dataset::DatasetType;
use crate::models::{DatasetId, DatasetMeta, ImportDetails, ProjectId, SecretString};
use crate::paths::DatasetPathFactory;
use crate::services::database::DatabaseResolver;
use crate::services::handler::HandlerBase;
use flate2::{Compression, write::GzEncoder};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const TEST_PROJECT: &str = "PlasmoDB";
pub const TEST_SITE_BUILD: &str = "build-68";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap();
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

pub fn dataset_id() -> DatasetId {
    DatasetId::parse("0123456789abcdef0123456789abcdef").unwrap()
}

pub fn project_id() -> ProjectId {
    ProjectId::parse(TEST_PROJECT).unwrap()
}

pub fn sample_meta() -> DatasetMeta {
    DatasetMeta {
        dataset_type: DatasetType {
            name: "genelist".to_string(),
            version: "1.0".to_string(),
        },
        projects: vec![TEST_PROJECT.to_string()],
        owner: "12345".to_string(),
        name: "My gene list".to_string(),
        summary: Some(" ".to_string()),
        description: None,
        dependencies: vec![],
    }
}

pub fn import_details() -> ImportDetails {
    ImportDetails {
        dataset_id: dataset_id(),
        meta: sample_meta(),
    }
}

/// Scratch directories, generated scripts and a direct database target for `TEST_PROJECT`.
pub struct TestContext {
    root: TempDir,
    workspace: PathBuf,
    scratch: PathBuf,
    scripts: Mutex<ScriptConfigs>,
    metrics: Arc<ScriptMetrics>,
    databases: Arc<DatabaseConfigMap>,
}

impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let bin = root.path().join("bin");
        let workspace = root.path().join("workspace");
        let scratch = root.path().join("scratch");
        for dir in [&bin, &workspace, &scratch] {
            fs::create_dir(dir).unwrap();
        }

        let mut scripts = ScriptConfigs::default();
        for kind in ScriptKind::ALL {
            scripts.set(
                kind,
                ScriptConfig {
                    path: write_script(&bin, kind.as_str(), "exit 0"),
                    max_seconds: 30,
                },
            );
        }

        let target = RawDatabaseConfig {
            name: Some(TEST_PROJECT.to_string()),
            host: Some("db.local".to_string()),
            db_name: Some("plasmo".to_string()),
            platform: Some("postgres".to_string()),
            user: Some("plas_w".to_string()),
            pass: Some(SecretString::new("hunter2")),
            ..Default::default()
        };
        let databases = DatabaseConfigMap::from_raw(vec![("test".to_string(), target)]).unwrap();

        Self {
            root,
            workspace,
            scratch,
            scripts: Mutex::new(scripts),
            metrics: Arc::new(ScriptMetrics::new()),
            databases: Arc::new(databases),
        }
    }

    pub fn set_script(&self, kind: ScriptKind, body: &str) {
        let path = write_script(&self.root.path().join("bin"), kind.as_str(), body);
        let mut scripts = self.scripts.lock().unwrap();
        let max_seconds = scripts.get(kind).max_seconds;
        scripts.set(kind, ScriptConfig { path, max_seconds });
    }

    pub fn set_max_seconds(&self, kind: ScriptKind, max_seconds: i64) {
        let mut scripts = self.scripts.lock().unwrap();
        let path = scripts.get(kind).path.clone();
        scripts.set(kind, ScriptConfig { path, max_seconds });
    }

    pub fn base(&self) -> HandlerBase {
        HandlerBase {
            scripts: Arc::new(self.scripts.lock().unwrap().clone()),
            custom_path: String::new(),
            runner: ProcessRunner,
            metrics: self.metrics.clone(),
            paths: DatasetPathFactory::new(self.install_root(), TEST_SITE_BUILD),
            resolver: DatabaseResolver::new(self.databases.clone(), None),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Directory outside the workspace for files a test inspects afterwards.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    pub fn install_root(&self) -> PathBuf {
        self.root.path().join("install")
    }

    pub fn install_path(&self) -> PathBuf {
        self.install_root()
            .join(TEST_SITE_BUILD)
            .join(TEST_PROJECT)
            .join(dataset_id().as_str())
    }

    pub fn metrics(&self) -> &ScriptMetrics {
        &self.metrics
    }
}
