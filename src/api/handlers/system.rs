use crate::api::dto::dataset::HealthResponse;
use crate::api::routes::AppState;
use axum::{Json, extract::State, http::header, response::IntoResponse};

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.base.metrics.render(),
    )
}
