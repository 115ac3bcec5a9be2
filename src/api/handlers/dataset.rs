use crate::api::dto::dataset::WarningsResponse;
use crate::api::routes::AppState;
use crate::error::{AppError, Result};
use crate::models::{ImportDetails, InstallDataRequest, InstallMetaRequest, UninstallRequest};
use crate::paths;
use crate::services::{
    Handler, ImportHandler, InstallDataHandler, InstallMetaHandler, UninstallHandler,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const DETAILS_FIELD: &str = "details";
const PAYLOAD_FIELD: &str = "payload";
const IMPORT_PAYLOAD_NAME: &str = "import.tar.gz";
const INSTALL_PAYLOAD_NAME: &str = "install.zip";
const IMPORT_RESULT_NAME: &str = "import-result.tar.gz";

struct Upload {
    details: Bytes,
    payload: PathBuf,
}

/// Reads the `details` and `payload` parts of a multipart upload, streaming the payload into
/// `workspace/file_name`.
async fn read_upload(mut multipart: Multipart, workspace: &Path, file_name: &str) -> Result<Upload> {
    let mut details = None;
    let mut payload = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(DETAILS_FIELD) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                details = Some(bytes);
            }
            Some(PAYLOAD_FIELD) => {
                let path = workspace.join(file_name);
                let mut file = tokio::fs::File::create_new(&path).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                payload = Some(path);
            }
            other => {
                tracing::debug!("Ignoring unexpected multipart field {:?}", other);
            }
        }
    }

    let details = details
        .ok_or_else(|| AppError::BadRequest(format!("missing '{}' part", DETAILS_FIELD)))?;
    let payload = payload
        .ok_or_else(|| AppError::BadRequest(format!("missing '{}' part", PAYLOAD_FIELD)))?;
    Ok(Upload { details, payload })
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| AppError::BadRequest(e.to_string()))
}

pub async fn import(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let workspace = paths::new_workspace(&state.workspace_root)?;
    let upload = read_upload(multipart, workspace.path(), IMPORT_PAYLOAD_NAME).await?;
    let details: ImportDetails = parse_json(&upload.details)?;
    details.meta.validate()?;

    let result = ImportHandler::new(&state.base, workspace.path(), upload.payload, details)
        .run()
        .await?;
    let body = tokio::fs::read(&result).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", IMPORT_RESULT_NAME),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn install_meta(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let request: InstallMetaRequest = parse_json(&body)?;
    request.meta.validate()?;

    let workspace = paths::new_workspace(&state.workspace_root)?;
    InstallMetaHandler::new(&state.base, workspace.path(), request)?
        .run()
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn install_data(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<WarningsResponse>> {
    let workspace = paths::new_workspace(&state.workspace_root)?;
    let upload = read_upload(multipart, workspace.path(), INSTALL_PAYLOAD_NAME).await?;
    let request: InstallDataRequest = parse_json(&upload.details)?;

    let warnings = InstallDataHandler::new(&state.base, workspace.path(), upload.payload, request)?
        .run()
        .await?;
    Ok(Json(WarningsResponse { warnings }))
}

pub async fn uninstall(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let request: UninstallRequest = parse_json(&body)?;

    let workspace = paths::new_workspace(&state.workspace_root)?;
    UninstallHandler::new(&state.base, workspace.path(), request)?
        .run()
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
