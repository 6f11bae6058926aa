use crate::AppState;
use crate::api::error::AppError;
use crate::services::transfer::ShortLinkInfo;
use axum::{
    Json,
    extract::{Path, State},
};

/// File details behind a short link, without consuming it.
#[utoipa::path(
    get,
    path = "/private/short/{short_key}",
    params(
        ("short_key" = String, Path, description = "Short alias")
    ),
    responses(
        (status = 200, description = "Short link details", body = ShortLinkInfo),
        (status = 404, description = "Short link not found"),
        (status = 410, description = "File expired"),
        (status = 500, description = "Metadata store unavailable")
    ),
    tag = "files"
)]
pub async fn short_link_info(
    State(state): State<AppState>,
    Path(short_key): Path<String>,
) -> Result<Json<ShortLinkInfo>, AppError> {
    Ok(Json(state.transfer.short_link_info(&short_key).await?))
}
