use crate::executor::environment::{
    DB_HOST, DB_NAME, DB_PASS, DB_PLATFORM, DB_PORT, DB_SCHEMA, DB_USER,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// String value that never prints its contents.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbPlatform {
    Oracle,
    Postgres,
}

impl DbPlatform {
    pub fn from_platform_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "oracle" => Some(Self::Oracle),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "Oracle",
            Self::Postgres => "Postgresql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Oracle => 1521,
            Self::Postgres => 5432,
        }
    }
}

/// Resolved coordinates of the database a dataset is installed into.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDetails {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub pass: SecretString,
    pub schema: String,
    pub platform: DbPlatform,
}

impl DatabaseDetails {
    pub fn to_env_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (DB_HOST.to_string(), self.host.clone()),
            (DB_PORT.to_string(), self.port.to_string()),
            (DB_NAME.to_string(), self.name.clone()),
            (DB_USER.to_string(), self.user.clone()),
            (DB_PASS.to_string(), self.pass.expose().to_string()),
            (DB_SCHEMA.to_string(), self.schema.clone()),
            (DB_PLATFORM.to_string(), self.platform.as_str().to_string()),
        ])
    }
}
