//! Scheduled device health sweep
//!
//! Marks devices whose heartbeat went stale as offline and raises
//! `sensor_failure` for each one that transitions, plus `low_battery` for
//! every device reporting a low level. Presence changes for one sweep go out
//! as a single batch; alert candidates are submitted one by one.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use errors::{StockwatchError, StockwatchResult};
use stockwatch_model::collections::DEVICES;
use stockwatch_model::{Device, PresenceStatus};
use stockwatch_store::{DocumentStore, TimeProvider, WriteOp};

use crate::services::detector;
use crate::services::pipeline::AlertPipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// Cron expression; a leading seconds field is optional
    pub schedule: String,
    pub stale_after_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: "0 */15 * * * *".to_string(),
            stale_after_secs: 900,
        }
    }
}

impl SweeperConfig {
    pub fn parse_schedule(&self) -> StockwatchResult<Schedule> {
        let expression = self.schedule.trim();
        // Classic five-field crontab: fire at second 0
        let expression = if expression.split_whitespace().count() == 5 {
            format!("0 {}", expression)
        } else {
            expression.to_string()
        };
        Schedule::from_str(&expression)
            .with_context(|| format!("Invalid sweeper schedule '{}'", self.schedule))
            .map_err(|e| StockwatchError::InvalidConfig {
                field: "sweeper.schedule".into(),
                reason: format!("{:#}", e),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: usize,
    pub marked_offline: usize,
    pub alerts_created: usize,
    pub alerts_suppressed: usize,
    pub errors: usize,
}

pub struct DeviceHealthSweeper {
    store: Arc<dyn DocumentStore>,
    pipeline: Arc<AlertPipeline>,
    clock: Arc<dyn TimeProvider>,
    schedule: Schedule,
    stale_after: chrono::Duration,
}

impl DeviceHealthSweeper {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pipeline: Arc<AlertPipeline>,
        clock: Arc<dyn TimeProvider>,
        config: &SweeperConfig,
    ) -> StockwatchResult<Self> {
        Ok(Self {
            store,
            pipeline,
            clock,
            schedule: config.parse_schedule()?,
            stale_after: chrono::Duration::seconds(config.stale_after_secs as i64),
        })
    }

    /// Run one sweep at the clock's current time
    pub async fn sweep_once(&self) -> StockwatchResult<SweepReport> {
        let now = self.clock.now();
        let docs = self.store.query(DEVICES, &[]).await?;
        let mut report = SweepReport {
            scanned: docs.len(),
            ..Default::default()
        };

        let mut presence_updates = Vec::new();
        let mut candidates = Vec::new();
        for doc in docs {
            let device: Device = match doc.decode(DEVICES) {
                Ok(device) => device,
                Err(e) => {
                    warn!("Skipping unreadable device record: {}", e);
                    report.errors += 1;
                    continue;
                },
            };

            if device.is_stale(now, self.stale_after) && !device.is_offline() {
                presence_updates.push(WriteOp::merge(
                    DEVICES,
                    &device.id,
                    json!({ "status": PresenceStatus::Offline }),
                ));
                candidates.extend(detector::evaluate_presence(
                    &device,
                    device.status,
                    PresenceStatus::Offline,
                ));
            }
            if let Some(level) = device.battery_level {
                candidates.extend(detector::evaluate_battery(
                    &device,
                    level,
                    self.pipeline.thresholds(),
                ));
            }
        }

        if !presence_updates.is_empty() {
            report.marked_offline = presence_updates.len();
            self.store.batch(presence_updates).await?;
        }

        let raised = self.pipeline.raise(candidates).await;
        report.alerts_created = raised.created;
        report.alerts_suppressed = raised.suppressed;
        report.errors += raised.failed;

        info!(
            "Device sweep: {} scanned, {} marked offline, {} alerts created, {} suppressed, {} errors",
            report.scanned,
            report.marked_offline,
            report.alerts_created,
            report.alerts_suppressed,
            report.errors
        );
        Ok(report)
    }

    fn until_next_run(&self) -> Option<Duration> {
        let next = self.schedule.upcoming(Utc).next()?;
        Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Sweep on schedule until the returned token is cancelled
    pub fn start(self: Arc<Self>) -> (JoinHandle<()>, CancellationToken) {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            info!("Device health sweeper started");
            loop {
                let Some(delay) = self.until_next_run() else {
                    warn!("Sweep schedule has no upcoming run, sweeper exiting");
                    break;
                };
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        if let Err(e) = self.sweep_once().await {
                            error!("Device sweep failed: {}", e);
                        }
                    }
                    () = task_token.cancelled() => {
                        info!("Device health sweeper stopped");
                        break;
                    }
                }
            }
        });

        (handle, token)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockwatch_model::collections::ALERTS;
    use stockwatch_model::{Alert, AlertType};
    use stockwatch_store::{DocumentStoreExt, ManualTimeProvider, MemoryStore};

    use crate::services::dedup::Deduplicator;
    use crate::services::detector::Thresholds;

    fn sweeper(store: Arc<MemoryStore>, clock: Arc<ManualTimeProvider>) -> DeviceHealthSweeper {
        let dedup = Arc::new(Deduplicator::new(store.clone(), clock.clone()));
        let pipeline = Arc::new(AlertPipeline::new(dedup, Thresholds::default()));
        DeviceHealthSweeper::new(store, pipeline, clock, &SweeperConfig::default()).unwrap()
    }

    async fn put_device(store: &MemoryStore, id: &str, heartbeat: Option<&str>, battery: Option<u8>) {
        store
            .put(
                DEVICES,
                id,
                json!({
                    "type": "weight",
                    "warehouseId": "wh-1",
                    "apiKeyHash": "00",
                    "status": "online",
                    "lastHeartbeat": heartbeat,
                    "batteryLevel": battery
                }),
            )
            .await
            .unwrap();
    }

    fn clock() -> Arc<ManualTimeProvider> {
        Arc::new(ManualTimeProvider::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 20, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_stale_device_goes_offline_once() {
        let store = Arc::new(MemoryStore::new());
        put_device(&store, "dev-stale", Some("2026-03-01T08:00:00Z"), None).await;
        put_device(&store, "dev-fresh", Some("2026-03-01T08:10:00Z"), None).await;
        put_device(&store, "dev-never", None, None).await;
        let sweeper = sweeper(store.clone(), clock());

        let first = sweeper.sweep_once().await.unwrap();
        assert_eq!(first.scanned, 3);
        assert_eq!(first.marked_offline, 1);
        assert_eq!(first.alerts_created, 1);

        let device: Device = store.get_as(DEVICES, "dev-stale").await.unwrap().unwrap();
        assert!(device.is_offline());
        let alerts: Vec<Alert> = store.query_as(ALERTS, &[]).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::SensorFailure);
        assert_eq!(alerts[0].device_id.as_deref(), Some("dev-stale"));

        let second = sweeper.sweep_once().await.unwrap();
        assert_eq!(second.marked_offline, 0);
        assert_eq!(second.alerts_created, 0);
        assert_eq!(store.len(ALERTS), 1);
    }

    #[tokio::test]
    async fn test_low_battery_raised_once() {
        let store = Arc::new(MemoryStore::new());
        put_device(&store, "dev-1", Some("2026-03-01T08:19:00Z"), Some(15)).await;
        put_device(&store, "dev-2", Some("2026-03-01T08:19:00Z"), Some(80)).await;
        let sweeper = sweeper(store.clone(), clock());

        let first = sweeper.sweep_once().await.unwrap();
        assert_eq!(first.alerts_created, 1);
        let second = sweeper.sweep_once().await.unwrap();
        assert_eq!(second.alerts_created, 0);
        assert_eq!(second.alerts_suppressed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_device_is_counted() {
        let store = Arc::new(MemoryStore::new());
        store.put(DEVICES, "junk", json!({"type": "toaster"})).await.unwrap();
        put_device(&store, "dev-1", Some("2026-03-01T07:00:00Z"), None).await;

        let report = sweeper(store, clock()).sweep_once().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.marked_offline, 1);
    }

    #[test]
    fn test_schedule_validation() {
        let config = SweeperConfig {
            schedule: "every quarter hour".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.parse_schedule(),
            Err(StockwatchError::InvalidConfig { .. })
        ));
        assert!(SweeperConfig::default().parse_schedule().is_ok());
    }

    #[test]
    fn test_five_field_schedule_runs_at_second_zero() {
        let crontab = SweeperConfig {
            schedule: "*/15 * * * *".into(),
            ..Default::default()
        };
        let from = Utc.with_ymd_and_hms(2026, 3, 1, 8, 7, 30).unwrap();
        let upcoming: Vec<_> = crontab.parse_schedule().unwrap().after(&from).take(2).collect();
        assert_eq!(
            upcoming,
            vec![
                Utc.with_ymd_and_hms(2026, 3, 1, 8, 15, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_and_cancel() {
        let store = Arc::new(MemoryStore::new());
        let sweeper = Arc::new(sweeper(store, clock()));
        let (handle, token) = sweeper.start();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
