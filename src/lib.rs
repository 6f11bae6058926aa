pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::TransferConfig;
use crate::services::transfer::TransferService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn,
    routing::{delete, get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::files::list_files,
        api::handlers::files::upload_file,
        api::handlers::files::download_file,
        api::handlers::files::delete_file,
        api::handlers::files::create_link,
        api::handlers::short::short_link_info,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::files::CreateLinkRequest,
            api::handlers::files::DeleteResponse,
            services::transfer::IngestReceipt,
            services::transfer::FileListing,
            services::transfer::ShortLinkInfo,
            services::transfer::ShortLink,
            services::metadata::FileRecord,
        )
    ),
    tags(
        (name = "files", description = "Upload, download and delete endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub transfer: TransferService,
    pub config: TransferConfig,
}

impl AppState {
    pub fn new(transfer: TransferService, config: TransferConfig) -> Self {
        Self { transfer, config }
    }
}

fn cors_layer(config: &TransferConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    // Leave room for multipart framing on top of the file itself.
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/private/files", get(api::handlers::files::list_files))
        .route("/private/upload", post(api::handlers::files::upload_file))
        .route(
            "/private/download/:key",
            get(api::handlers::files::download_file),
        )
        .route(
            "/private/short/:short_key",
            get(api::handlers::short::short_link_info),
        )
        .route(
            "/private/files/:key/link",
            post(api::handlers::files::create_link),
        )
        .route(
            "/private/delete/:key",
            delete(api::handlers::files::delete_file),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
