use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub metadata: String,
    pub version: String,
}

fn configured(present: bool) -> String {
    if present { "configured" } else { "unavailable" }.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.transfer.has_blob_store() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        storage: configured(state.transfer.has_blob_store()),
        metadata: configured(state.transfer.metadata().is_some()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
