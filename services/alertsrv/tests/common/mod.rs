//! Common test utilities and helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use alertsrv::notifier::{Channel, DeliveryChannel, OutboundMessage};
use alertsrv::services::credentials::hash_api_key;
use alertsrv::services::SlidingWindowLimiter;
use alertsrv::{AlertSrvConfig, AppState};
use errors::StockwatchResult;
use stockwatch_model::collections::{DEVICES, SHELVES, USERS};
use stockwatch_store::{DocumentStore, ManualTimeProvider, MemoryStore};

pub const WAREHOUSE: &str = "wh-1";
pub const API_KEY: &str = "sk-test-7f3a9c";
pub const SECRET: &str = "shared-secret";

/// Delivery channel that records what it was asked to send
#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<OutboundMessage>>,
    /// Time each delivery takes
    pub latency: Duration,
}

impl RecordingDelivery {
    pub fn slow(latency: Duration) -> Self {
        Self {
            sent: Mutex::default(),
            latency,
        }
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.sent.lock().iter().filter(|m| m.channel == channel).count()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    async fn deliver(&self, message: &OutboundMessage) -> StockwatchResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: axum::Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualTimeProvider>,
    pub delivery: Arc<RecordingDelivery>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Build an app over an in-memory store with a manual clock
pub fn create_test_app(max_requests: u32) -> TestApp {
    create_test_app_with_delivery(max_requests, RecordingDelivery::default())
}

pub fn create_test_app_with_delivery(max_requests: u32, delivery: RecordingDelivery) -> TestApp {
    let config = AlertSrvConfig::default();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualTimeProvider::new(start_time()));
    let delivery = Arc::new(delivery);
    let limiter = Arc::new(SlidingWindowLimiter::new(
        std::time::Duration::from_secs(60),
        max_requests,
        clock.clone(),
    ));

    let state = AppState::new(config, store.clone(), limiter, delivery.clone(), clock.clone()).unwrap();
    let router = alertsrv::api::create_router(state.clone());

    TestApp {
        state,
        router,
        store,
        clock,
        delivery,
    }
}

impl TestApp {
    /// Weight sensor on shelf `sh-1` (max 100 kg)
    pub async fn seed_weight_device(&self, id: &str) {
        self.store
            .put(SHELVES, "sh-1", json!({"warehouseId": WAREHOUSE, "maxWeight": 100.0}))
            .await
            .unwrap();
        self.store
            .put(
                DEVICES,
                id,
                json!({
                    "type": "weight",
                    "warehouseId": WAREHOUSE,
                    "shelfId": "sh-1",
                    "name": "Scale A",
                    "apiKeyHash": hash_api_key(API_KEY),
                    "sharedSecret": SECRET
                }),
            )
            .await
            .unwrap();
    }

    pub async fn seed_temperature_device(&self, id: &str, policy: &str) {
        self.store
            .put(
                DEVICES,
                id,
                json!({
                    "type": "temperature",
                    "warehouseId": WAREHOUSE,
                    "name": "Cold room probe",
                    "apiKeyHash": hash_api_key(API_KEY),
                    "sharedSecret": SECRET,
                    "signaturePolicy": policy
                }),
            )
            .await
            .unwrap();
    }

    pub async fn seed_user(&self, id: &str, role: &str, email: Option<&str>, phone: Option<&str>) {
        let mut user = json!({"warehouseId": WAREHOUSE, "role": role});
        if let Some(email) = email {
            user["email"] = json!(email);
        }
        if let Some(phone) = phone {
            user["phone"] = json!(phone);
        }
        self.store.put(USERS, id, user).await.unwrap();
    }

    /// Wait until the background fan-out has delivered `expected` messages
    pub async fn wait_for_deliveries(&self, expected: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.delivery.sent.lock().len() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "expected {} deliveries, got {}",
            expected,
            self.delivery.sent.lock().len()
        );
    }

    /// POST the payload to the webhook with the given headers
    pub async fn post_telemetry(
        &self,
        payload: &Value,
        api_key: Option<&str>,
        signature: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/iot/webhook")
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        if let Some(signature) = signature {
            builder = builder.header("x-signature", signature);
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap();
        send(&self.router, request).await
    }

    pub async fn json_request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        send(&self.router, request).await
    }
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, body)
}
