use crate::ldap::DirectoryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Input archive contained no files")]
    EmptyInput,

    #[error("Dataset failed validation")]
    Validation(Vec<String>),

    #[error("Dataset is incompatible with the target site")]
    Compatibility(Vec<String>),

    #[error("Install directory already exists: {}", .0.display())]
    InstallDirConflict(PathBuf),

    #[error("No database configured for project '{project}' and data type '{data_type}'")]
    UnrecognizedProject { project: String, data_type: String },

    #[error("Directory lookup for '{0}' matched more than one entry")]
    AmbiguousLookup(String),

    #[error("Directory lookup for '{0}' matched no entries")]
    LookupNotFound(String),

    #[error("Directory service error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Invalid net descriptor: {0}")]
    NetDescParse(String),

    #[error("Script {command} exceeded its maximum duration of {seconds} seconds")]
    ScriptTimeout { command: String, seconds: i64 },

    #[error("Script {script} exited with unexpected code {code}")]
    UnexpectedExitCode { script: String, code: i32 },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::EmptyInput | AppError::UnrecognizedProject { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::InstallDirConflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::IM_A_TEAPOT,
            AppError::Compatibility(_) => {
                StatusCode::from_u16(420).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(warnings) | AppError::Compatibility(warnings) => {
                json!({ "warnings": warnings })
            }
            other => {
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", other);
                }
                json!({ "error": other.to_string() })
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
