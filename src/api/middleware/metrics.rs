use axum::{extract::Request, http::Method, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Coarse operation label for a request, so transfer traffic can be
/// aggregated without the per-file keys in the path.
fn operation(method: &Method, path: &str) -> &'static str {
    let mut segments = path.trim_start_matches('/').split('/');
    match (method, segments.next(), segments.next()) {
        (&Method::GET, Some("health"), _) => "health",
        (&Method::GET, Some("private"), Some("files")) => "list",
        (&Method::POST, Some("private"), Some("upload")) => "upload",
        (&Method::GET, Some("private"), Some("download")) => "download",
        (&Method::GET, Some("private"), Some("short")) => "short_link_info",
        (&Method::POST, Some("private"), Some("files")) => "create_link",
        (&Method::DELETE, Some("private"), Some("delete")) => "delete",
        _ => "other",
    }
}

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let op = operation(&method, req.uri().path());

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        warn!(
            target: "metrics",
            operation = op,
            method = %method,
            status,
            latency_ms = %latency_ms,
            "request_failed"
        );
    } else {
        info!(
            target: "metrics",
            operation = op,
            method = %method,
            status,
            latency_ms = %latency_ms,
            "request_completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_labels() {
        assert_eq!(operation(&Method::POST, "/private/upload"), "upload");
        assert_eq!(
            operation(&Method::GET, "/private/download/Ab3dEf9h"),
            "download"
        );
        assert_eq!(
            operation(&Method::POST, "/private/files/k/link"),
            "create_link"
        );
        assert_eq!(operation(&Method::GET, "/private/files"), "list");
        assert_eq!(operation(&Method::GET, "/swagger-ui"), "other");
    }
}
