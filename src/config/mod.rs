pub mod database;

pub use database::{DatabaseConfigMap, DatabaseTarget, RawDatabaseConfig};

use crate::executor::ScriptKind;
use crate::ldap::LdapHost;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const CONFIG_FILE_ENV: &str = "HANDLER_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "conf/config.json";
const DEFAULT_SCRIPT_DIR: &str = "/opt/veupathdb/bin";
const DEFAULT_MAX_DURATION: &str = "1h";
const DEFAULT_LDAP_PORT: u16 = 389;

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptConfig {
    pub path: PathBuf,
    /// Negative means no limit.
    pub max_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct ScriptConfigs {
    scripts: HashMap<ScriptKind, ScriptConfig>,
}

impl ScriptConfigs {
    pub fn get(&self, kind: ScriptKind) -> &ScriptConfig {
        &self.scripts[&kind]
    }

    pub fn set(&mut self, kind: ScriptKind, config: ScriptConfig) {
        self.scripts.insert(kind, config);
    }
}

impl Default for ScriptConfigs {
    fn default() -> Self {
        let max_seconds = parse_duration(DEFAULT_MAX_DURATION).unwrap_or(3600);
        let scripts = ScriptKind::ALL
            .into_iter()
            .map(|kind| {
                let config = ScriptConfig {
                    path: Path::new(DEFAULT_SCRIPT_DIR).join(kind.as_str()),
                    max_seconds,
                };
                (kind, config)
            })
            .collect();
        Self { scripts }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LdapConfig {
    pub servers: Vec<LdapHost>,
    pub base_dn: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workspace_root: PathBuf,
    pub install_root: PathBuf,
    pub site_build: String,
    pub custom_path: String,
    pub scripts: ScriptConfigs,
    pub ldap: LdapConfig,
    pub databases: DatabaseConfigMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            workspace_root: std::env::temp_dir().join("dataset_handler"),
            install_root: PathBuf::from("/datasets"),
            site_build: "build-1".to_string(),
            custom_path: String::new(),
            scripts: ScriptConfigs::default(),
            ldap: LdapConfig::default(),
            databases: DatabaseConfigMap::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let vars: Vec<(String, String)> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::from_vars(vars)
    }

    pub fn from_vars(vars: Vec<(String, String)>) -> Result<Self> {
        let env: HashMap<String, String> = vars.iter().cloned().collect();
        let mut config = Self::default();
        let mut raw_targets = Vec::new();

        let file_path = env
            .get(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if let Some(file_config) = Self::from_conf_file(&file_path)? {
            raw_targets.extend(
                file_config
                    .install_targets
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(i, raw)| (format!("installTargets[{}]", i), raw)),
            );
            config.apply_file(file_config)?;
        }

        config.apply_env(&env)?;

        raw_targets.extend(database::raw_configs_from_env(vars)?);
        config.databases = DatabaseConfigMap::from_raw(raw_targets)?;
        Ok(config)
    }

    fn from_conf_file(path: &Path) -> Result<Option<FileConfig>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) -> Result<()> {
        if let Some(host) = file_config.server_host {
            self.host = host;
        }
        if let Some(port) = file_config.server_port {
            self.port = port;
        }
        if let Some(root) = file_config.workspace_root {
            self.workspace_root = root;
        }
        if let Some(root) = file_config.dataset_install_root {
            self.install_root = root;
        }
        if let Some(site_build) = file_config.site_build {
            self.site_build = site_build;
        }
        if let Some(custom_path) = file_config.custom_path {
            self.custom_path = custom_path;
        }
        if let Some(servers) = file_config.ldap_servers {
            self.ldap.servers = servers
                .iter()
                .map(|s| parse_ldap_host(s))
                .collect::<Result<_>>()?;
        }
        if let Some(base_dn) = file_config.oracle_base_dn {
            self.ldap.base_dn = base_dn;
        }
        for (name, script) in file_config.scripts {
            let kind = ScriptKind::ALL
                .into_iter()
                .find(|k| k.as_str() == name)
                .with_context(|| format!("Unknown script {} in config file", name))?;
            let mut current = self.scripts.get(kind).clone();
            if let Some(path) = script.path {
                current.path = path;
            }
            if let Some(duration) = script.max_duration {
                current.max_seconds = parse_duration(&duration)?;
            }
            self.scripts.set(kind, current);
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        if let Some(host) = env.get("SERVER_HOST") {
            self.host = host.clone();
        }
        if let Some(port) = env.get("SERVER_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("SERVER_PORT is not a valid port: {}", port))?;
        }
        if let Some(root) = env.get("WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(root) = env.get("DATASET_INSTALL_ROOT") {
            self.install_root = PathBuf::from(root);
        }
        if let Some(site_build) = env.get("SITE_BUILD") {
            self.site_build = site_build.clone();
        }
        if let Some(custom_path) = env.get("CUSTOM_PATH") {
            self.custom_path = custom_path.clone();
        }
        if let Some(servers) = env.get("LDAP_SERVER") {
            self.ldap.servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_ldap_host)
                .collect::<Result<_>>()?;
        }
        if let Some(base_dn) = env.get("ORACLE_BASE_DN") {
            self.ldap.base_dn = base_dn.clone();
        }

        for kind in ScriptKind::ALL {
            let prefix = script_env_prefix(kind);
            let mut current = self.scripts.get(kind).clone();
            if let Some(path) = env.get(&format!("{}_SCRIPT_PATH", prefix)) {
                current.path = PathBuf::from(path);
            }
            if let Some(duration) = env.get(&format!("{}_SCRIPT_MAX_DURATION", prefix)) {
                current.max_seconds = parse_duration(duration)
                    .with_context(|| format!("Invalid {}_SCRIPT_MAX_DURATION", prefix))?;
            }
            self.scripts.set(kind, current);
        }
        Ok(())
    }

    /// Startup checks that the scripts and install targets are usable.
    pub fn validate(&self) -> Result<()> {
        for kind in ScriptKind::ALL {
            let path = &self.scripts.get(kind).path;
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("{} script not found: {}", kind, path.display()))?;
            if !metadata.is_file() {
                bail!("{} script is not a file: {}", kind, path.display());
            }
            if metadata.permissions().mode() & 0o111 == 0 {
                bail!("{} script is not executable: {}", kind, path.display());
            }
        }

        if self.databases.is_empty() {
            bail!("No install targets are configured");
        }
        if self.databases.any_ldap() {
            if self.ldap.servers.is_empty() {
                bail!("LDAP_SERVER is required when an install target uses an LDAP lookup");
            }
            if self.ldap.base_dn.trim().is_empty() {
                bail!("ORACLE_BASE_DN is required when an install target uses an LDAP lookup");
            }
        }
        Ok(())
    }
}

fn script_env_prefix(kind: ScriptKind) -> &'static str {
    match kind {
        ScriptKind::Import => "IMPORT",
        ScriptKind::InstallMeta => "INSTALL_META",
        ScriptKind::InstallData => "INSTALL_DATA",
        ScriptKind::CheckCompatibility => "CHECK_COMPAT",
        ScriptKind::Uninstall => "UNINSTALL",
    }
}

fn parse_ldap_host(raw: &str) -> Result<LdapHost> {
    match raw.rsplit_once(':') {
        Some((host, port)) => Ok(LdapHost {
            host: host.to_string(),
            port: port
                .parse()
                .with_context(|| format!("Invalid LDAP server port in {}", raw))?,
        }),
        None => Ok(LdapHost {
            host: raw.to_string(),
            port: DEFAULT_LDAP_PORT,
        }),
    }
}

/// Parses `1h`, `30m`, `45s`, `1h30m`, bare seconds, or a negative number for no limit.
pub fn parse_duration(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("Duration cannot be empty");
    }
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(seconds);
    }

    let mut total: i64 = 0;
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => bail!("Invalid duration unit '{}' in {}", c, raw),
        };
        let value: i64 = digits
            .parse()
            .with_context(|| format!("Missing number before '{}' in {}", c, raw))?;
        total += value * unit;
        digits.clear();
    }
    if !digits.is_empty() {
        bail!("Duration {} ends without a unit", raw);
    }
    Ok(total)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    server_host: Option<String>,
    server_port: Option<u16>,
    workspace_root: Option<PathBuf>,
    dataset_install_root: Option<PathBuf>,
    site_build: Option<String>,
    custom_path: Option<String>,
    ldap_servers: Option<Vec<String>>,
    oracle_base_dn: Option<String>,
    #[serde(default)]
    scripts: HashMap<String, FileScriptConfig>,
    #[serde(default)]
    install_targets: Vec<RawDatabaseConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileScriptConfig {
    path: Option<PathBuf>,
    max_duration: Option<String>,
}
