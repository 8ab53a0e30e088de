//! The HTTP shell: one POST endpoint that unwraps the transport envelope,
//! hands the inner payload to the registry, and wraps the quadruple back
//! up. Everything else (method, media type, body shape) is policed here so
//! handlers never see raw HTTP.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::registry::ServiceRegistry;
use crate::transport::{self, TransportMessage};

pub const API_PREFIX: &str = "/api/v1/auth";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<ServiceRegistry>,
}

/// Builds the axum router serving `/api/v1/auth/<subpath>`.
pub fn router(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route(&format!("{API_PREFIX}/{{*path}}"), any(auth_endpoint))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { registry })
}

async fn auth_endpoint(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return respond(TransportMessage::error("405", "Method Not Allowed", ""));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.contains("application/json") {
        return respond(TransportMessage::error(
            "415",
            "Unsupported Media Type",
            content_type,
        ));
    }

    let message = match transport::unwrap(&body) {
        Ok(message) => message,
        Err(e) => {
            return respond(TransportMessage::error("400", "Transport unwrapping failed", e));
        }
    };

    let normalized = normalize_path(&path);
    debug!(path = %normalized, "dispatching auth request");
    let reply = state.registry.dispatch(&normalized, &message.payload);
    respond(TransportMessage::from(reply))
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn respond(message: TransportMessage) -> Response {
    let code = StatusCode::from_u16(transport::http_status_code(&message.status))
        .unwrap_or(StatusCode::OK);
    (code, Json(message)).into_response()
}
