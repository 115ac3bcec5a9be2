use crate::executor::environment::DB_CONNECTION_PREFIX;
use crate::models::{DbPlatform, SecretString};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

pub const WILDCARD_DATA_TYPE: &str = "*";

/// One install target as written in the config file or spread across env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDatabaseConfig {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub ldap: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_name: Option<String>,
    pub user: Option<String>,
    pub pass: Option<SecretString>,
    pub schema: Option<String>,
    pub platform: Option<String>,
    pub data_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseTarget {
    Direct {
        host: String,
        port: u16,
        db_name: String,
        platform: DbPlatform,
    },
    Ldap {
        lookup_key: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfigEntry {
    pub project: String,
    pub user: String,
    pub pass: SecretString,
    pub schema: String,
    pub target: DatabaseTarget,
}

impl DatabaseConfigEntry {
    pub fn uses_ldap(&self) -> bool {
        matches!(self.target, DatabaseTarget::Ldap { .. })
    }
}

impl RawDatabaseConfig {
    /// Validated entry plus the data types it serves, or `None` when disabled.
    fn into_entry(self, source: &str) -> Result<Option<(DatabaseConfigEntry, Vec<String>)>> {
        let project = non_blank(self.name)
            .with_context(|| format!("Install target {} has no project name", source))?;

        if !self.enabled.unwrap_or(true) {
            tracing::warn!("Install target {} ({}) is disabled", project, source);
            return Ok(None);
        }

        let user = non_blank(self.user)
            .with_context(|| format!("Install target {} has no user", project))?;
        let pass = self
            .pass
            .filter(|p| !p.expose().is_empty())
            .with_context(|| format!("Install target {} has no password", project))?;
        let schema = non_blank(self.schema).unwrap_or_else(|| user.clone());

        let ldap = non_blank(self.ldap);
        let host = non_blank(self.host);
        let db_name = non_blank(self.db_name);

        let target = match (ldap, host, db_name) {
            (Some(lookup_key), None, None) => DatabaseTarget::Ldap { lookup_key },
            (None, Some(host), Some(db_name)) => {
                let platform = match non_blank(self.platform) {
                    Some(raw) => DbPlatform::from_platform_str(&raw).with_context(|| {
                        format!("Install target {} has unknown platform {}", project, raw)
                    })?,
                    None => DbPlatform::Oracle,
                };
                DatabaseTarget::Direct {
                    host,
                    port: self.port.unwrap_or_else(|| platform.default_port()),
                    db_name,
                    platform,
                }
            }
            (Some(_), _, _) => bail!(
                "Install target {} sets both an LDAP key and direct connection fields",
                project
            ),
            _ => bail!(
                "Install target {} needs either an LDAP key or a host and database name",
                project
            ),
        };

        let data_types = match self.data_types {
            Some(types) if !types.is_empty() => types,
            _ => vec![WILDCARD_DATA_TYPE.to_string()],
        };

        tracing::info!("Install target {} is enabled", project);
        Ok(Some((
            DatabaseConfigEntry {
                project,
                user,
                pass,
                schema,
                target,
            },
            data_types,
        )))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Install targets keyed by (project, data type).
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfigMap {
    entries: HashMap<(String, String), DatabaseConfigEntry>,
}

impl DatabaseConfigMap {
    pub fn from_raw(raw: Vec<(String, RawDatabaseConfig)>) -> Result<Self> {
        let mut entries = HashMap::new();
        for (source, config) in raw {
            let Some((entry, data_types)) = config.into_entry(&source)? else {
                continue;
            };
            for data_type in data_types {
                let key = (entry.project.clone(), data_type.trim().to_string());
                if entries.insert(key, entry.clone()).is_some() {
                    bail!(
                        "Install target {} configured more than once for data type {}",
                        entry.project,
                        data_type
                    );
                }
            }
        }
        Ok(Self { entries })
    }

    /// Exact (project, data type) match, falling back to the project's wildcard entry.
    pub fn get(&self, project: &str, data_type: &str) -> Option<&DatabaseConfigEntry> {
        self.entries
            .get(&(project.to_string(), data_type.to_string()))
            .or_else(|| {
                self.entries
                    .get(&(project.to_string(), WILDCARD_DATA_TYPE.to_string()))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn any_ldap(&self) -> bool {
        self.entries.values().any(DatabaseConfigEntry::uses_ldap)
    }
}

/// Groups `DB_CONNECTION_<FIELD>_<KEY>` variables into one raw target per `<KEY>`.
pub fn raw_configs_from_env(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<(String, RawDatabaseConfig)>> {
    const FIELDS: [&str; 11] = [
        "ENABLED",
        "NAME",
        "LDAP",
        "HOST",
        "PORT",
        "DB_NAME",
        "USER",
        "PASS",
        "SCHEMA",
        "PLATFORM",
        "DATA_TYPES",
    ];

    let mut grouped: BTreeMap<String, RawDatabaseConfig> = BTreeMap::new();
    for (name, value) in vars {
        let Some(rest) = name.strip_prefix(DB_CONNECTION_PREFIX) else {
            continue;
        };
        let Some((field, key)) = FIELDS.iter().find_map(|field| {
            rest.strip_prefix(field)
                .and_then(|r| r.strip_prefix('_'))
                .filter(|key| !key.is_empty())
                .map(|key| (*field, key.to_string()))
        }) else {
            tracing::warn!("Ignoring unrecognized database variable {}", name);
            continue;
        };

        let raw = grouped.entry(key).or_default();
        match field {
            "ENABLED" => {
                raw.enabled = Some(
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("{} must be true or false", name))?,
                )
            }
            "NAME" => raw.name = Some(value),
            "LDAP" => raw.ldap = Some(value),
            "HOST" => raw.host = Some(value),
            "PORT" => {
                raw.port = Some(
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("{} is not a valid port", name))?,
                )
            }
            "DB_NAME" => raw.db_name = Some(value),
            "USER" => raw.user = Some(value),
            "PASS" => raw.pass = Some(SecretString::new(value)),
            "SCHEMA" => raw.schema = Some(value),
            "PLATFORM" => raw.platform = Some(value),
            "DATA_TYPES" => {
                raw.data_types = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            _ => {}
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(key, raw)| (format!("{}*_{}", DB_CONNECTION_PREFIX, key), raw))
        .collect())
}
