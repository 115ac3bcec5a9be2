use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

const DATASET_ID_LENGTH: usize = 32;

/// Fixed-length hexadecimal dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if raw.len() != DATASET_ID_LENGTH || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::BadRequest(format!("invalid dataset ID value: {}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DatasetId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-blank project identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if raw.trim().is_empty() {
            return Err(AppError::BadRequest(
                "project ID cannot be blank".to_string(),
            ));
        }
        // Used as a directory name under the install root.
        let mut components = Path::new(raw).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_name || raw.contains(['/', '\\', '\0']) {
            return Err(AppError::BadRequest(format!("invalid project ID value: {:?}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectId> for String {
    fn from(value: ProjectId) -> Self {
        value.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetType {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDependency {
    pub resource_identifier: String,
    pub resource_version: String,
    pub resource_display_name: String,
}

/// Dataset metadata as posted by callers and as stored in install payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    pub projects: Vec<String>,
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DatasetDependency>,
}

impl DatasetMeta {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.dataset_type.name.trim().is_empty() {
            return Err(bad_request("type.name cannot be blank"));
        }
        if self.dataset_type.version.trim().is_empty() {
            return Err(bad_request("type.version cannot be blank"));
        }
        if self.projects.is_empty() {
            return Err(bad_request("projects cannot be empty"));
        }
        if self.projects.iter().any(|p| p.trim().is_empty()) {
            return Err(bad_request("projects cannot contain a blank string"));
        }
        if self.owner.trim().is_empty() {
            return Err(bad_request("owner cannot be blank"));
        }
        if self.name.trim().is_empty() {
            return Err(bad_request("name cannot be blank"));
        }
        for dependency in &self.dependencies {
            if dependency.resource_identifier.trim().is_empty() {
                return Err(bad_request("dependency.resourceIdentifier cannot be blank"));
            }
            if dependency.resource_version.trim().is_empty() {
                return Err(bad_request("dependency.resourceVersion cannot be blank"));
            }
            if dependency.resource_display_name.trim().is_empty() {
                return Err(bad_request("dependency.resourceDisplayName cannot be blank"));
            }
        }
        Ok(())
    }

    /// Copy with blank optional text fields dropped.
    pub fn normalized(&self) -> Self {
        let non_blank = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Self {
            summary: non_blank(&self.summary),
            description: non_blank(&self.description),
            ..self.clone()
        }
    }
}

fn bad_request(message: &str) -> AppError {
    AppError::BadRequest(message.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportDetails {
    #[serde(rename = "datasetID")]
    pub dataset_id: DatasetId,
    pub meta: DatasetMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallMetaRequest {
    #[serde(rename = "datasetID")]
    pub dataset_id: DatasetId,
    #[serde(rename = "projectID")]
    pub project_id: ProjectId,
    pub meta: DatasetMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallDataRequest {
    #[serde(rename = "datasetID")]
    pub dataset_id: DatasetId,
    #[serde(rename = "projectID")]
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UninstallRequest {
    #[serde(rename = "datasetID")]
    pub dataset_id: DatasetId,
    #[serde(rename = "projectID")]
    pub project_id: ProjectId,
    /// Dataset type name used to pick the target database; wildcard when absent.
    #[serde(default, rename = "dataType")]
    pub data_type: Option<String>,
}
