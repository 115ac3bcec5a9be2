use super::handlers::{dataset, system};
use crate::services::HandlerBase;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub base: HandlerBase,
    pub workspace_root: PathBuf,
}

pub fn create_router(base: HandlerBase, workspace_root: PathBuf) -> Router {
    let state = AppState {
        base,
        workspace_root,
    };

    Router::new()
        .route("/health", get(system::health_check))
        .route("/metrics", get(system::metrics))
        // Dataset operations
        .route("/import", post(dataset::import))
        .route("/install/meta", post(dataset::install_meta))
        .route("/install/data", post(dataset::install_data))
        .route("/uninstall", post(dataset::uninstall))
        // Payload archives routinely exceed the default request body limit.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}
