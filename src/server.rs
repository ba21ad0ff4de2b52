//! HTTP surface.
//!
//! Every `GET` (and, through axum's method routing, `HEAD`) under `/` is an
//! image lookup. The handler derives the client's capability from `Accept`,
//! runs the synchronous [`Responder`] on tokio's blocking pool (file reads
//! and codec work must not stall the reactor), and converts the resulting
//! [`ResponseSpec`] into an HTTP response.

use crate::imaging::ImageBackend;
use crate::negotiate::ClientCapability;
use crate::pipeline::Responder;
use crate::response::ResponseSpec;
use crate::storage::Storage;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the router for a shared responder.
pub fn router<B, S>(responder: Arc<Responder<B, S>>) -> Router
where
    B: ImageBackend + 'static,
    S: Storage + 'static,
{
    Router::new()
        .route("/{*path}", get(serve_image::<B, S>))
        .layer(TraceLayer::new_for_http())
        .with_state(responder)
}

async fn serve_image<B, S>(
    State(responder): State<Arc<Responder<B, S>>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response
where
    B: ImageBackend + 'static,
    S: Storage + 'static,
{
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let capability = ClientCapability::from_accept(accept.as_deref());

    match tokio::task::spawn_blocking(move || responder.respond(&path, capability)).await {
        Ok(spec) => into_response(spec),
        Err(e) => {
            error!(error = %e, "request pipeline panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Convert an assembled response into an axum response.
pub fn into_response(spec: ResponseSpec) -> Response {
    let ResponseSpec {
        status,
        content_type,
        headers,
        body,
    } = spec;

    let len = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let map = response.headers_mut();
    map.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Some(content_type) = content_type {
        map.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    for (name, value) in headers {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                map.insert(name, value);
            }
            Err(_) => error!(header = name, "dropping header with invalid value"),
        }
    }
    response
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn serve(host: &str, port: u16, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_response_copies_status_type_and_headers() {
        let response = into_response(ResponseSpec {
            status: StatusCode::OK,
            content_type: Some("image/webp"),
            headers: vec![("x-image-stats", "status=failure;".to_string())],
            body: vec![1, 2, 3],
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/webp");
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert_eq!(headers["x-image-stats"], "status=failure;");
    }

    #[test]
    fn into_response_without_content_type() {
        let response = into_response(ResponseSpec {
            status: StatusCode::NOT_FOUND,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        });

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn invalid_header_value_is_dropped() {
        let response = into_response(ResponseSpec {
            status: StatusCode::OK,
            content_type: Some("image/png"),
            headers: vec![("x-cache-key", "bad\nvalue".to_string())],
            body: vec![0],
        });
        assert!(response.headers().get("x-cache-key").is_none());
    }
}
