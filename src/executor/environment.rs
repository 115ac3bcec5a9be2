use crate::models::DatasetId;
use std::collections::HashMap;

/// Prefix of the service's own database settings; never exposed to scripts.
pub const DB_CONNECTION_PREFIX: &str = "DB_CONNECTION_";

pub const PATH: &str = "PATH";
pub const DATASET_ID: &str = "DATASET_ID";
pub const PROJECT_ID: &str = "PROJECT_ID";
pub const IMPORT_ID: &str = "IMPORT_ID";
pub const DATASET_INSTALL_PATH: &str = "DATASET_INSTALL_PATH";
pub const DB_HOST: &str = "DB_HOST";
pub const DB_PORT: &str = "DB_PORT";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASS: &str = "DB_PASS";
pub const DB_SCHEMA: &str = "DB_SCHEMA";
pub const DB_PLATFORM: &str = "DB_PLATFORM";

/// Environment for one script invocation, derived from the current process environment.
pub fn build_script_env(
    custom_path: &str,
    dataset_id: &DatasetId,
    extra: HashMap<String, String>,
) -> HashMap<String, String> {
    let ambient = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    build_env_from(ambient, custom_path, dataset_id, extra)
}

pub(crate) fn build_env_from(
    ambient: impl IntoIterator<Item = (String, String)>,
    custom_path: &str,
    dataset_id: &DatasetId,
    extra: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = ambient
        .into_iter()
        .filter(|(key, _)| !key.starts_with(DB_CONNECTION_PREFIX))
        .collect();

    if !custom_path.trim().is_empty() {
        let path = match env.get(PATH) {
            Some(current) if !current.is_empty() => format!("{}:{}", current, custom_path),
            _ => custom_path.to_string(),
        };
        env.insert(PATH.to_string(), path);
    }

    env.insert(DATASET_ID.to_string(), dataset_id.to_string());
    env.extend(extra);
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambient() -> Vec<(String, String)> {
        vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("DB_CONNECTION_PASS_APPDB".to_string(), "secret".to_string()),
            ("LANG".to_string(), "C".to_string()),
        ]
    }

    fn dataset() -> DatasetId {
        DatasetId::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap()
    }

    #[test]
    fn strips_service_database_settings() {
        let env = build_env_from(ambient(), "", &dataset(), HashMap::new());
        assert!(!env.contains_key("DB_CONNECTION_PASS_APPDB"));
        assert_eq!(env["LANG"], "C");
        assert_eq!(env[DATASET_ID], "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn appends_custom_path() {
        let env = build_env_from(ambient(), "/opt/site/bin", &dataset(), HashMap::new());
        assert_eq!(env[PATH], "/usr/bin:/opt/site/bin");

        let unchanged = build_env_from(ambient(), "   ", &dataset(), HashMap::new());
        assert_eq!(unchanged[PATH], "/usr/bin");
    }

    #[test]
    fn handler_entries_win_on_collision() {
        let extra = HashMap::from([
            (DATASET_ID.to_string(), "override".to_string()),
            (PROJECT_ID.to_string(), "PlasmoDB".to_string()),
        ]);
        let env = build_env_from(ambient(), "", &dataset(), extra);
        assert_eq!(env[DATASET_ID], "override");
        assert_eq!(env[PROJECT_ID], "PlasmoDB");
    }

    #[test]
    fn identical_inputs_give_identical_environments() {
        let extra = HashMap::from([(PROJECT_ID.to_string(), "ToxoDB".to_string())]);
        let first = build_env_from(ambient(), "/x", &dataset(), extra.clone());
        let second = build_env_from(ambient(), "/x", &dataset(), extra);
        assert_eq!(first, second);
    }
}
