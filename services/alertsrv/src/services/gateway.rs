//! Telemetry ingestion
//!
//! Guards run in a fixed order and the first failure rejects the request
//! before anything is written:
//!
//! 1. `deviceId` and `data` present (400)
//! 2. API key header present (401)
//! 3. per-device rate limit (429)
//! 4. device exists (404)
//! 5. API key matches (403)
//! 6. signature valid, per the device's signature policy (403)
//!
//! Accepted samples go to the device's latest slot and to history, and the
//! device is marked online, all in one batch. Detection runs afterwards; its failures are
//! logged and never change the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use errors::{StockwatchError, StockwatchResult};
use stockwatch_model::collections::{DEVICES, SHELVES, TELEMETRY_HISTORY, TELEMETRY_LATEST};
use stockwatch_model::{Device, JsonMap, PresenceStatus, Shelf, SignaturePolicy, TelemetrySample};
use stockwatch_store::{DocumentStore, DocumentStoreExt, TimeProvider, WriteOp};

use crate::services::credentials;
use crate::services::pipeline::AlertPipeline;
use crate::services::rate_limiter::RateLimiter;

/// Raw inputs of one webhook call
#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub api_key: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAck {
    pub device_id: String,
    /// Server receive time
    pub timestamp: DateTime<Utc>,
    pub alerts_created: usize,
}

pub struct IngestionGateway {
    store: Arc<dyn DocumentStore>,
    limiter: Arc<dyn RateLimiter>,
    pipeline: Arc<AlertPipeline>,
    clock: Arc<dyn TimeProvider>,
}

impl IngestionGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        limiter: Arc<dyn RateLimiter>,
        pipeline: Arc<AlertPipeline>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            limiter,
            pipeline,
            clock,
        }
    }

    pub async fn ingest(&self, request: IngestRequest<'_>) -> StockwatchResult<IngestAck> {
        let payload: Value = serde_json::from_slice(request.body)
            .map_err(|_| StockwatchError::BadRequest("Request body must be valid JSON".into()))?;
        let Some(body) = payload.as_object() else {
            return Err(StockwatchError::BadRequest(
                "Request body must be a JSON object".into(),
            ));
        };

        let device_id = body
            .get("deviceId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StockwatchError::MissingField("deviceId".into()))?;
        let data = match body.get("data") {
            Some(Value::Object(data)) => data.clone(),
            None | Some(Value::Null) => return Err(StockwatchError::MissingField("data".into())),
            Some(_) => return Err(StockwatchError::BadRequest("data must be a JSON object".into())),
        };

        let api_key = request
            .api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StockwatchError::Unauthorized("Missing X-API-Key header".into()))?;

        if !self.limiter.allow(device_id).await {
            return Err(StockwatchError::RateLimitExceeded);
        }

        let device: Device = self
            .store
            .get_as(DEVICES, device_id)
            .await?
            .ok_or_else(|| StockwatchError::DeviceNotFound(device_id.to_string()))?;

        if !credentials::verify_device_key(&device, api_key) {
            warn!("Rejected telemetry for {}: API key mismatch", device_id);
            return Err(StockwatchError::Forbidden("Invalid API key".into()));
        }
        check_signature(&device, &payload, request.signature)?;

        let now = self.clock.now();
        let sample = TelemetrySample {
            device_id: device.id.clone(),
            device_type: body
                .get("deviceType")
                .and_then(Value::as_str)
                .map(str::to_string),
            data,
            timestamp: parse_timestamp(body.get("timestamp"))?.unwrap_or(now),
            received_at: now,
        };
        self.persist(&device, &sample, now).await?;
        debug!("Accepted telemetry from {}", device.id);

        let alerts_created = self.detect(&device, &sample).await;
        Ok(IngestAck {
            device_id: device.id,
            timestamp: now,
            alerts_created,
        })
    }

    /// Most recent accepted sample for a device
    pub async fn latest_sample(&self, device_id: &str) -> StockwatchResult<Option<TelemetrySample>> {
        Ok(self.store.get_as(TELEMETRY_LATEST, device_id).await?)
    }

    async fn persist(
        &self,
        device: &Device,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
    ) -> StockwatchResult<()> {
        let doc = serde_json::to_value(sample)
            .map_err(|e| StockwatchError::Internal(format!("Failed to encode sample: {}", e)))?;

        let mut presence = JsonMap::new();
        presence.insert("status".into(), json!(PresenceStatus::Online));
        presence.insert("lastHeartbeat".into(), json!(now));
        if let Some(level) = sample.battery_level() {
            presence.insert("batteryLevel".into(), json!(level));
        }

        // All or nothing: a failed write leaves no trace of the sample
        self.store
            .batch(vec![
                WriteOp::put(TELEMETRY_LATEST, &device.id, doc.clone()),
                WriteOp::put(TELEMETRY_HISTORY, &history_key(now), doc),
                WriteOp::merge(DEVICES, &device.id, Value::Object(presence)),
            ])
            .await?;
        Ok(())
    }

    async fn detect(&self, device: &Device, sample: &TelemetrySample) -> usize {
        let shelf = match device.shelf_id.as_deref() {
            Some(shelf_id) => match self.store.get_as::<Shelf>(SHELVES, shelf_id).await {
                Ok(shelf) => shelf,
                Err(e) => {
                    error!("Shelf lookup failed for {}: {}", shelf_id, e);
                    None
                },
            },
            None => None,
        };

        let report = self.pipeline.on_telemetry(device, shelf.as_ref(), sample).await;
        if report.failed > 0 {
            error!(
                "{} alert candidates failed for device {}",
                report.failed, device.id
            );
        }
        report.created
    }
}

fn check_signature(device: &Device, payload: &Value, signature: Option<&str>) -> StockwatchResult<()> {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty());
    let secret = device.shared_secret.as_deref().filter(|s| !s.is_empty());

    match (signature, secret) {
        (Some(signature), Some(secret)) => {
            if credentials::verify_signature(&canonical_json(payload), signature, secret) {
                Ok(())
            } else {
                warn!("Rejected telemetry for {}: signature mismatch", device.id);
                Err(StockwatchError::Forbidden("Invalid signature".into()))
            }
        },
        _ if device.signature_policy == SignaturePolicy::Required => {
            warn!("Rejected unsigned telemetry for {}", device.id);
            Err(StockwatchError::Forbidden("Signature required".into()))
        },
        _ => Ok(()),
    }
}

/// History ids sort by arrival: `<epoch millis>-<uuid>`
fn history_key(received_at: DateTime<Utc>) -> String {
    format!("{:013}-{}", received_at.timestamp_millis(), uuid::Uuid::new_v4())
}

/// Compact JSON with object keys sorted at every level
pub fn canonical_json(value: &Value) -> Vec<u8> {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                Value::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
            },
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    // Serializing a Value cannot fail
    serde_json::to_vec(&sorted(value)).unwrap_or_default()
}

/// RFC 3339 string or integer epoch milliseconds
fn parse_timestamp(value: Option<&Value>) -> StockwatchResult<Option<DateTime<Utc>>> {
    let invalid = || StockwatchError::BadRequest("Invalid timestamp".into());
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| invalid()),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(Some)
            .ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}
