use crate::AppState;
use crate::api::error::AppError;
use crate::services::transfer::{
    FileListing, IngestReceipt, IngestRequest, ResolveOptions, ServedFile, ShortLink,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Overrides the configured one-time download policy
    pub one_time: Option<bool>,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[validate(range(min = 1, message = "expiresInHours must be positive"))]
    pub expires_in_hours: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/private/files",
    responses(
        (status = 200, description = "Stored files, enriched with metadata where available", body = [FileListing]),
        (status = 500, description = "Blob store unavailable")
    ),
    tag = "files"
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileListing>>, AppError> {
    Ok(Json(state.transfer.list().await?))
}

#[utoipa::path(
    post,
    path = "/private/upload",
    request_body(content = Multipart, description = "Multipart form with a `file` field and an optional `expiresInHours` field"),
    responses(
        (status = 200, description = "File uploaded", body = IngestReceipt),
        (status = 400, description = "Missing, empty or oversized file"),
        (status = 413, description = "Request body too large"),
        (status = 500, description = "Blob store unavailable")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReceipt>, AppError> {
    let mut upload: Option<IngestRequest> = None;
    let mut expires_in_hours: Option<i64> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("length limit exceeded") {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err_msg)
        }
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;

                upload = Some(IngestRequest {
                    data,
                    filename,
                    content_type,
                    expires_in_hours: None,
                });
            }
            "expiresInHours" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let text = text.trim();
                if !text.is_empty() {
                    expires_in_hours = Some(text.parse().map_err(|_| {
                        AppError::BadRequest(format!("Invalid expiresInHours: {}", text))
                    })?);
                }
            }
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    upload.expires_in_hours = expires_in_hours;

    Ok(Json(state.transfer.ingest(upload).await?))
}

/// `attachment` with an ASCII fallback plus an RFC 5987 `filename*`.
pub(crate) fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

fn file_response(served: ServedFile) -> Result<Response, AppError> {
    let cache_control = if served.consumed {
        "private, no-cache, no-store, must-revalidate"
    } else {
        "private, no-cache"
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, served.content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&served.filename))
        .header(header::CONTENT_LENGTH, served.data.len())
        .header(header::CACHE_CONTROL, cache_control);

    if !served.etag.is_empty() {
        builder = builder.header(header::ETAG, served.etag);
    }
    if served.consumed {
        builder = builder
            .header(header::EXPIRES, "0")
            .header(header::PRAGMA, "no-cache");
    }

    builder
        .body(Body::from(served.data))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}

#[utoipa::path(
    get,
    path = "/private/download/{key}",
    params(
        ("key" = String, Path, description = "Primary key or short alias"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found"),
        (status = 410, description = "File expired"),
        (status = 500, description = "Blob store unavailable")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let options = ResolveOptions {
        one_time: query.one_time.unwrap_or(state.config.one_time_downloads),
    };

    let served = state.transfer.resolve(&key, options).await?;
    tracing::info!(
        "📤 Serving {} as {} (one_time={})",
        served.key,
        served.filename,
        options.one_time
    );

    file_response(served)
}

#[utoipa::path(
    delete,
    path = "/private/delete/{key}",
    params(
        ("key" = String, Path, description = "Primary key")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 500, description = "Blob store unavailable")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.transfer.purge(&key).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "File deleted successfully".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/private/files/{key}/link",
    params(
        ("key" = String, Path, description = "Primary key")
    ),
    request_body = CreateLinkRequest,
    responses(
        (status = 200, description = "Short link created", body = ShortLink),
        (status = 400, description = "Invalid expiration"),
        (status = 404, description = "File metadata not found"),
        (status = 410, description = "File expired"),
        (status = 500, description = "Metadata store unavailable")
    ),
    tag = "files"
)]
pub async fn create_link(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<Json<ShortLink>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(
        state
            .transfer
            .create_short_link(&key, req.expires_in_hours)
            .await?,
    ))
}
