//! API routes configuration

use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{any, get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::handlers::*;
use crate::AppState;

/// Create API routes
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.service.max_body_bytes;

    // CORS headers on every webhook response, preflight included
    let webhook = Router::new()
        .route("/iot/webhook", any(ingest_webhook))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, X-API-Key, X-Signature"),
        ))
        .layer(RequestBodyLimitLayer::new(max_body));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/{id}", get(get_alert))
        .route("/api/alerts/{id}/resolve", post(resolve_alert))
        .route("/api/devices/{id}/telemetry/latest", get(latest_telemetry))
        .route("/api/sweeps", post(run_sweep))
        .merge(webhook)
        .layer(middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}
