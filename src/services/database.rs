use crate::config::{DatabaseConfigMap, DatabaseTarget};
use crate::error::{AppError, Result};
use crate::ldap::DirectoryLookup;
use crate::models::{DatabaseDetails, DbPlatform, ProjectId};
use std::sync::Arc;

/// Resolves (project, data type) pairs to database coordinates.
#[derive(Clone)]
pub struct DatabaseResolver {
    configs: Arc<DatabaseConfigMap>,
    directory: Option<Arc<dyn DirectoryLookup>>,
}

impl DatabaseResolver {
    pub fn new(configs: Arc<DatabaseConfigMap>, directory: Option<Arc<dyn DirectoryLookup>>) -> Self {
        Self { configs, directory }
    }

    pub async fn resolve(&self, project: &ProjectId, data_type: &str) -> Result<DatabaseDetails> {
        let entry = self
            .configs
            .get(project.as_str(), data_type)
            .ok_or_else(|| AppError::UnrecognizedProject {
                project: project.to_string(),
                data_type: data_type.to_string(),
            })?;

        match &entry.target {
            DatabaseTarget::Direct {
                host,
                port,
                db_name,
                platform,
            } => Ok(DatabaseDetails {
                host: host.clone(),
                port: *port,
                name: db_name.clone(),
                user: entry.user.clone(),
                pass: entry.pass.clone(),
                schema: entry.schema.clone(),
                platform: *platform,
            }),
            DatabaseTarget::Ldap { lookup_key } => {
                let directory = self.directory.as_ref().ok_or_else(|| {
                    AppError::IllegalState(format!(
                        "Install target {} needs LDAP but no directory service is configured",
                        entry.project
                    ))
                })?;
                let desc = directory.require_singular_net_desc(lookup_key).await?;
                tracing::debug!(
                    "Resolved {} for project {} to {}:{}",
                    lookup_key,
                    project,
                    desc.host,
                    desc.port
                );
                Ok(DatabaseDetails {
                    host: desc.host,
                    port: desc.port,
                    name: desc.service_name,
                    user: entry.user.clone(),
                    pass: entry.pass.clone(),
                    schema: entry.schema.clone(),
                    platform: DbPlatform::Oracle,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawDatabaseConfig;
    use crate::ldap::net_desc::NetDesc;
    use crate::models::SecretString;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    struct StaticDirectory;

    #[async_trait]
    impl DirectoryLookup for StaticDirectory {
        async fn require_singular_net_desc(&self, common_name: &str) -> Result<NetDesc> {
            if common_name != "plas-inc" {
                return Err(AppError::LookupNotFound(common_name.to_string()));
            }
            Ok(NetDesc {
                host: "ora.example.org".to_string(),
                port: 1521,
                service_name: "plas.world".to_string(),
            })
        }
    }

    fn resolver() -> DatabaseResolver {
        let ldap = RawDatabaseConfig {
            name: Some("PlasmoDB".to_string()),
            ldap: Some("plas-inc".to_string()),
            user: Some("vdi_w".to_string()),
            pass: Some(SecretString::new("pw")),
            ..Default::default()
        };
        let direct = RawDatabaseConfig {
            name: Some("ToxoDB".to_string()),
            host: Some("pg.local".to_string()),
            db_name: Some("toxo".to_string()),
            platform: Some("postgresql".to_string()),
            user: Some("vdi_w".to_string()),
            pass: Some(SecretString::new("pw")),
            schema: Some("vdi_schema".to_string()),
            data_types: Some(vec!["bigwig".to_string()]),
            ..Default::default()
        };
        let configs = DatabaseConfigMap::from_raw(vec![
            ("ldap".to_string(), ldap),
            ("direct".to_string(), direct),
        ])
        .unwrap();
        DatabaseResolver::new(Arc::new(configs), Some(Arc::new(StaticDirectory)))
    }

    #[tokio::test]
    async fn direct_entries_are_returned_verbatim() {
        let details = resolver()
            .resolve(&ProjectId::parse("ToxoDB").unwrap(), "bigwig")
            .await
            .unwrap();
        assert_eq!(details.host, "pg.local");
        assert_eq!(details.port, 5432);
        assert_eq!(details.schema, "vdi_schema");
        assert_eq!(details.platform, DbPlatform::Postgres);
    }

    #[tokio::test]
    async fn ldap_entries_use_the_directory_and_wildcard_fallback() {
        let details = resolver()
            .resolve(&ProjectId::parse("PlasmoDB").unwrap(), "genelist")
            .await
            .unwrap();
        assert_eq!(details.host, "ora.example.org");
        assert_eq!(details.name, "plas.world");
        assert_eq!(details.schema, "vdi_w");
        assert_eq!(details.platform, DbPlatform::Oracle);
    }

    #[tokio::test]
    async fn unknown_project_is_unrecognized() {
        let err = resolver()
            .resolve(&ProjectId::parse("FungiDB").unwrap(), "genelist")
            .await
            .unwrap_err();
        assert_matches!(err, AppError::UnrecognizedProject { project, .. } if project == "FungiDB");

        let err = resolver()
            .resolve(&ProjectId::parse("ToxoDB").unwrap(), "genelist")
            .await
            .unwrap_err();
        assert_matches!(err, AppError::UnrecognizedProject { .. });
    }
}
