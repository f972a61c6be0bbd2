//! Inventory change listener
//!
//! Subscribes to the inventory collection's change feed and runs the stock
//! rules on every update, using the event's before-image as the previous
//! value.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use errors::StockwatchResult;
use stockwatch_model::collections::INVENTORY;
use stockwatch_model::InventoryRecord;
use stockwatch_store::{ChangeEvent, Document, DocumentStore};

use crate::services::pipeline::{AlertPipeline, RaiseReport};

pub struct InventoryWatcher {
    store: Arc<dyn DocumentStore>,
    pipeline: Arc<AlertPipeline>,
}

impl InventoryWatcher {
    pub fn new(store: Arc<dyn DocumentStore>, pipeline: Arc<AlertPipeline>) -> Self {
        Self { store, pipeline }
    }

    /// Evaluate one change event; deletions and unreadable records are skipped
    pub async fn handle_change(&self, event: ChangeEvent) -> RaiseReport {
        let Some(after) = event.after else {
            debug!("Inventory {} removed", event.id);
            return RaiseReport::default();
        };
        let current: InventoryRecord = match Document::new(event.id.clone(), after).decode(INVENTORY) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring inventory change: {}", e);
                return RaiseReport::default();
            },
        };
        let previous: Option<InventoryRecord> = event
            .before
            .and_then(|before| Document::new(event.id, before).decode(INVENTORY).ok());

        self.pipeline
            .on_inventory_change(previous.as_ref(), &current)
            .await
    }

    /// Subscribe and process changes until the returned token is cancelled
    pub async fn start(self: Arc<Self>) -> StockwatchResult<(JoinHandle<()>, CancellationToken)> {
        let mut changes = self.store.watch(INVENTORY).await?;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            info!("Inventory watcher started");
            loop {
                tokio::select! {
                    event = changes.next() => {
                        let Some(event) = event else {
                            error!("Inventory change feed closed");
                            break;
                        };
                        let report = self.handle_change(event).await;
                        if report.created > 0 {
                            debug!("Inventory change raised {} alerts", report.created);
                        }
                    }
                    () = task_token.cancelled() => {
                        info!("Inventory watcher stopped");
                        break;
                    }
                }
            }
        });

        Ok((handle, token))
    }
}
