use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WarningsResponse {
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
