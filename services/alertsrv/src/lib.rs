//! Alert Service Library
//!
//! Telemetry ingestion, alert detection with deduplication, notification
//! fan-out and the scheduled device health sweep.

pub mod api;
pub mod config;
pub mod notifier;
pub mod services;

use std::sync::Arc;

use errors::StockwatchResult;
use stockwatch_store::{DocumentStore, TimeProvider};

pub use config::AlertSrvConfig;
pub use notifier::{NotificationReport, Notifier};
pub use services::{
    AlertPipeline, Deduplicator, DeviceHealthSweeper, IngestionGateway, InventoryWatcher,
    RateLimiter,
};

use notifier::{DeliveryChannel, PlainTextFormatter, StoreRoleDirectory};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AlertSrvConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn TimeProvider>,
    pub pipeline: Arc<AlertPipeline>,
    pub gateway: Arc<IngestionGateway>,
    pub sweeper: Arc<DeviceHealthSweeper>,
    pub watcher: Arc<InventoryWatcher>,
}

impl AppState {
    /// Wire the pipeline over the given store, limiter and delivery channel
    pub fn new(
        config: AlertSrvConfig,
        store: Arc<dyn DocumentStore>,
        limiter: Arc<dyn RateLimiter>,
        delivery: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn TimeProvider>,
    ) -> StockwatchResult<Self> {
        let notifier = Notifier::new(
            store.clone(),
            Arc::new(StoreRoleDirectory::new(store.clone())),
            Arc::new(PlainTextFormatter::new(config.notifier.dashboard_url.clone())),
            delivery,
            clock.clone(),
        )
        .with_sms_for_critical_only(config.notifier.sms_for_critical_only);

        let dedup = Deduplicator::new(store.clone(), clock.clone()).with_notifier(Arc::new(notifier));
        let pipeline = Arc::new(AlertPipeline::new(
            Arc::new(dedup),
            config.detector.clone(),
        ));

        let gateway = Arc::new(IngestionGateway::new(
            store.clone(),
            limiter,
            pipeline.clone(),
            clock.clone(),
        ));
        let sweeper = Arc::new(DeviceHealthSweeper::new(
            store.clone(),
            pipeline.clone(),
            clock.clone(),
            &config.sweeper,
        )?);
        let watcher = Arc::new(InventoryWatcher::new(store.clone(), pipeline.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
            pipeline,
            gateway,
            sweeper,
            watcher,
        })
    }
}
