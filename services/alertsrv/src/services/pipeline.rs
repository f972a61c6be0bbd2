//! Detection to deduplication glue
//!
//! Runs the detector rules for one observation and pushes every candidate
//! through the deduplicator. Submission errors are logged per candidate and
//! never abort the remaining ones.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use stockwatch_model::{Device, InventoryRecord, Shelf, TelemetrySample};

use crate::services::dedup::Deduplicator;
use crate::services::detector::{self, AlertCandidate, Thresholds};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaiseReport {
    pub created: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub alert_ids: Vec<String>,
}

impl RaiseReport {
    pub fn absorb(&mut self, other: RaiseReport) {
        self.created += other.created;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
        self.alert_ids.extend(other.alert_ids);
    }
}

pub struct AlertPipeline {
    dedup: Arc<Deduplicator>,
    thresholds: Thresholds,
}

impl AlertPipeline {
    pub fn new(dedup: Arc<Deduplicator>, thresholds: Thresholds) -> Self {
        Self { dedup, thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub async fn raise(&self, candidates: Vec<AlertCandidate>) -> RaiseReport {
        let mut report = RaiseReport::default();
        for candidate in candidates {
            let alert_type = candidate.alert_type;
            match self.dedup.submit(candidate).await {
                Ok(outcome) if outcome.created => {
                    report.created += 1;
                    report.alert_ids.push(outcome.alert_id);
                },
                Ok(_) => report.suppressed += 1,
                Err(e) => {
                    error!("Failed to submit {} candidate: {}", alert_type, e);
                    report.failed += 1;
                },
            }
        }
        report
    }

    pub async fn on_telemetry(
        &self,
        device: &Device,
        shelf: Option<&Shelf>,
        sample: &TelemetrySample,
    ) -> RaiseReport {
        let candidates = detector::evaluate_telemetry(device, shelf, sample, &self.thresholds);
        self.raise(candidates).await
    }

    pub async fn on_inventory_change(
        &self,
        previous: Option<&InventoryRecord>,
        current: &InventoryRecord,
    ) -> RaiseReport {
        self.raise(detector::evaluate_inventory(previous, current)).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stockwatch_model::collections::ALERTS;
    use stockwatch_model::{Alert, AlertType, Severity};
    use stockwatch_store::{DocumentStore, DocumentStoreExt, MemoryStore, SystemTimeProvider};

    fn record(quantity: u32) -> InventoryRecord {
        InventoryRecord {
            id: "inv-1".into(),
            product_id: "p-1".into(),
            product_name: None,
            warehouse_id: "wh-1".into(),
            shelf_id: Some("sh-1".into()),
            quantity,
            min_stock_level: 5,
            max_stock_level: None,
        }
    }

    async fn resolve_all(store: &MemoryStore) {
        for doc in store.query(ALERTS, &[]).await.unwrap() {
            store.merge(ALERTS, &doc.id, json!({"resolved": true})).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_inventory_sequence() {
        let store = Arc::new(MemoryStore::new());
        let dedup = Arc::new(Deduplicator::new(store.clone(), Arc::new(SystemTimeProvider)));
        let pipeline = AlertPipeline::new(dedup, Thresholds::default());

        let quantities = [15, 15, 3, 0, 0, 12, 2];
        let mut previous: Option<InventoryRecord> = None;
        let mut fired = Vec::new();

        for (index, quantity) in quantities.into_iter().enumerate() {
            if index == 5 {
                resolve_all(&store).await;
            }
            let current = record(quantity);
            let report = pipeline.on_inventory_change(previous.as_ref(), &current).await;
            assert_eq!(report.failed, 0);
            for id in report.alert_ids {
                let alert: Alert = store.get_as(ALERTS, &id).await.unwrap().unwrap();
                fired.push((index, alert.alert_type, alert.severity));
            }
            previous = Some(current);
        }

        assert_eq!(
            fired,
            vec![
                (2, AlertType::LowStock, Severity::Warning),
                (3, AlertType::OutOfStock, Severity::Critical),
                (6, AlertType::LowStock, Severity::Warning),
            ]
        );
    }

    #[tokio::test]
    async fn test_refall_without_resolution_is_suppressed() {
        let store = Arc::new(MemoryStore::new());
        let dedup = Arc::new(Deduplicator::new(store.clone(), Arc::new(SystemTimeProvider)));
        let pipeline = AlertPipeline::new(dedup, Thresholds::default());

        let first = pipeline.on_inventory_change(Some(&record(15)), &record(3)).await;
        assert_eq!(first.created, 1);

        pipeline.on_inventory_change(Some(&record(3)), &record(12)).await;
        let again = pipeline.on_inventory_change(Some(&record(12)), &record(2)).await;
        assert_eq!(again.created, 0);
        assert_eq!(again.suppressed, 1);

        let open: Vec<Alert> = store.query_as(ALERTS, &[]).await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(open[0].created_at <= Utc::now());
    }
}
