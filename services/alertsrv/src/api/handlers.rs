//! API handlers for the alert service

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{debug, error, info, warn};

use common::{AppError, HealthStatus, PaginatedResponse, SuccessResponse};
use errors::{ErrorCategory, StockwatchError};
use stockwatch_model::collections::ALERTS;
use stockwatch_model::{Alert, TelemetrySample};
use stockwatch_store::{DocumentStoreExt, Filter};

use crate::api::models::*;
use crate::services::{IngestAck, IngestRequest, SweepReport};
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy(
        state.config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
    ))
}

/// Device telemetry webhook
///
/// Answers CORS preflight with 204 and any other non-POST method with 405
/// before looking at the request.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    if method != Method::POST {
        return AppError::from(StockwatchError::MethodNotAllowed(method.to_string())).into_response();
    }

    let request = IngestRequest {
        api_key: header_str(&headers, API_KEY_HEADER),
        signature: header_str(&headers, SIGNATURE_HEADER),
        body: &body,
    };

    match state.gateway.ingest(request).await {
        Ok(ack) => Json(SuccessResponse::<IngestAck>::new(ack)).into_response(),
        Err(e) => {
            log_rejection(&e);
            AppError::from(e).into_response()
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn log_rejection(err: &StockwatchError) {
    match err.category() {
        ErrorCategory::Client => debug!("Webhook rejected ({}): {}", err.status_code(), err),
        ErrorCategory::Dependency => warn!("Webhook failed on dependency: {}", err),
        _ => error!("Webhook failed: {}", err),
    }
}

/// List alerts, newest first
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<PaginatedResponse<Alert>>, AppError> {
    let mut filters = Vec::new();
    if let Some(warehouse_id) = &query.warehouse_id {
        filters.push(Filter::eq("warehouseId", warehouse_id.as_str()));
    }
    if let Some(resolved) = query.resolved {
        filters.push(Filter::eq("resolved", resolved));
    }
    if let Some(alert_type) = query.alert_type {
        filters.push(Filter::eq("type", alert_type.as_str()));
    }
    if let Some(severity) = query.severity {
        filters.push(Filter::eq("severity", severity.as_str()));
    }

    let mut alerts: Vec<Alert> = state
        .store
        .query_as(ALERTS, &filters)
        .await
        .map_err(StockwatchError::from)?;
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    Ok(Json(PaginatedResponse::from_slice(
        alerts,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    )))
}

async fn load_alert(state: &AppState, id: &str) -> Result<Alert, AppError> {
    state
        .store
        .get_as::<Alert>(ALERTS, id)
        .await
        .map_err(StockwatchError::from)?
        .ok_or_else(|| {
            StockwatchError::NotFound {
                resource: format!("alert {}", id),
            }
            .into()
        })
}

/// Get one alert
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<Alert>>, AppError> {
    let alert = load_alert(&state, &id).await?;
    Ok(Json(SuccessResponse::new(alert)))
}

/// Resolve an alert; resolving twice keeps the first resolution
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<SuccessResponse<Alert>>, AppError> {
    let resolved_by = request.resolved_by.trim();
    if resolved_by.is_empty() {
        return Err(StockwatchError::MissingField("resolvedBy".into()).into());
    }

    let mut alert = load_alert(&state, &id).await?;
    if alert.resolve(resolved_by, state.clock.now()) {
        state
            .store
            .put_as(ALERTS, &alert.id, &alert)
            .await
            .map_err(StockwatchError::from)?;
        info!("Alert {} resolved by {}", alert.id, resolved_by);
    }
    Ok(Json(SuccessResponse::new(alert)))
}

/// Latest accepted telemetry sample of a device
pub async fn latest_telemetry(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<SuccessResponse<TelemetrySample>>, AppError> {
    let sample = state.gateway.latest_sample(&device_id).await?.ok_or_else(|| {
        AppError::from(StockwatchError::NotFound {
            resource: format!("telemetry for device {}", device_id),
        })
    })?;
    Ok(Json(SuccessResponse::new(sample)))
}

/// Run a device health sweep now
pub async fn run_sweep(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<SweepReport>>, AppError> {
    let report = state.sweeper.sweep_once().await?;
    Ok(Json(SuccessResponse::new(report)))
}
