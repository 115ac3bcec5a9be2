pub mod environment;
pub mod exit_status;
pub mod process;
pub mod streams;

pub use process::{ProcessRunner, ScriptProcess};

use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// The five site-provided plugin scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Import,
    InstallMeta,
    InstallData,
    CheckCompatibility,
    Uninstall,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 5] = [
        ScriptKind::Import,
        ScriptKind::InstallMeta,
        ScriptKind::InstallData,
        ScriptKind::CheckCompatibility,
        ScriptKind::Uninstall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Import => "import",
            ScriptKind::InstallMeta => "install-meta",
            ScriptKind::InstallData => "install-data",
            ScriptKind::CheckCompatibility => "check-compatibility",
            ScriptKind::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ScriptRunner {
    /// Spawns `executable` with piped standard streams and exactly the given environment.
    async fn run(
        &self,
        executable: &Path,
        working_dir: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ScriptProcess>;
}
