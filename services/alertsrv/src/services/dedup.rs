//! Alert deduplication
//!
//! Single entry point for every detection rule. A candidate becomes an alert
//! only when no unresolved alert exists for the same warehouse, type and
//! subject. The existence check runs against the store on every submission.
//!
//! Fan-out for a new alert runs on its own task; submission returns as soon
//! as the alert is stored.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use errors::{StockwatchError, StockwatchResult};
use stockwatch_model::collections::ALERTS;
use stockwatch_model::Alert;
use stockwatch_store::{DocumentStore, DocumentStoreExt, Filter, TimeProvider};

use crate::notifier::{NotificationReport, Notifier};
use crate::services::detector::AlertCandidate;

#[derive(Debug)]
pub struct SubmitOutcome {
    pub created: bool,
    /// New alert id, or the id of the open alert that suppressed the candidate
    pub alert_id: String,
    /// Background fan-out for a created alert
    pub notification: Option<JoinHandle<NotificationReport>>,
}

pub struct Deduplicator {
    store: Arc<dyn DocumentStore>,
    notifier: Option<Arc<Notifier>>,
    clock: Arc<dyn TimeProvider>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            notifier: None,
            clock,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn submit(&self, candidate: AlertCandidate) -> StockwatchResult<SubmitOutcome> {
        let subject = candidate.subject().ok_or_else(|| {
            StockwatchError::InvariantViolation(format!(
                "{} candidate in warehouse {} has no subject",
                candidate.alert_type, candidate.warehouse_id
            ))
        })?;

        let filters = [
            Filter::eq("warehouseId", candidate.warehouse_id.as_str()),
            Filter::eq("type", candidate.alert_type.as_str()),
            Filter::eq("resolved", false),
            Filter::eq(subject.field(), subject.id()),
        ];
        let mut open: Vec<Alert> = self
            .store
            .query_as::<Alert>(ALERTS, &filters)
            .await?
            .into_iter()
            // A device alert also carries a shelf id; only the most specific subject counts
            .filter(|alert| alert.subject().as_ref() == Some(&subject))
            .collect();

        if !open.is_empty() {
            if open.len() > 1 {
                warn!(
                    "{} unresolved {} alerts for {} in warehouse {}",
                    open.len(),
                    candidate.alert_type,
                    subject,
                    candidate.warehouse_id
                );
            }
            open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let existing = open.swap_remove(0);
            debug!(
                "Suppressed {} for {}: alert {} still open",
                candidate.alert_type, subject, existing.id
            );
            return Ok(SubmitOutcome {
                created: false,
                alert_id: existing.id,
                notification: None,
            });
        }

        let subject_label = candidate.subject_label.clone();
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type: candidate.alert_type,
            severity: candidate.severity,
            warehouse_id: candidate.warehouse_id,
            shelf_id: candidate.shelf_id,
            device_id: candidate.device_id,
            product_id: candidate.product_id,
            message: candidate.message,
            details: candidate.details,
            resolved: false,
            created_at: self.clock.now(),
            resolved_by: None,
            resolved_at: None,
        };
        self.store.put_as(ALERTS, &alert.id, &alert).await?;
        info!(
            "Created {} {} alert {} for {}",
            alert.severity, alert.alert_type, alert.id, subject
        );

        let notification = self.notifier.clone().map(|notifier| {
            let alert = alert.clone();
            tokio::spawn(async move { notifier.notify(&alert, &subject_label).await })
        });

        Ok(SubmitOutcome {
            created: true,
            alert_id: alert.id,
            notification,
        })
    }
}
