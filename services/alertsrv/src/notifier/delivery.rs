//! Outbound message delivery
//!
//! The notifier hands each message to a [`DeliveryChannel`]. The default
//! channel appends to the `notification-queue` collection for an external
//! mailer/SMS worker; the webhook channel posts straight to a relay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use errors::{StockwatchError, StockwatchResult};
use stockwatch_model::collections::NOTIFICATION_QUEUE;
use stockwatch_store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

/// One queued email or SMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub channel: Channel,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// SMS text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub priority: Priority,
    pub alert_id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync + 'static {
    async fn deliver(&self, message: &OutboundMessage) -> StockwatchResult<()>;
}

/// Appends messages to the notification queue collection
pub struct QueueDelivery {
    store: Arc<dyn DocumentStore>,
}

impl QueueDelivery {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeliveryChannel for QueueDelivery {
    async fn deliver(&self, message: &OutboundMessage) -> StockwatchResult<()> {
        let mut doc = serde_json::to_value(message)?;
        if let Some(map) = doc.as_object_mut() {
            map.insert("status".into(), "pending".into());
        }
        let id = self.store.add(NOTIFICATION_QUEUE, doc).await?;
        debug!("Queued {} notification {} for alert {}", message.channel.as_str(), id, message.alert_id);
        Ok(())
    }
}

/// Posts each message as JSON to a relay endpoint
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> StockwatchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookDelivery {
    async fn deliver(&self, message: &OutboundMessage) -> StockwatchResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| StockwatchError::Delivery {
                channel: message.channel.as_str().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StockwatchError::Delivery {
                channel: message.channel.as_str().to_string(),
                message: format!("relay responded {}", status),
            });
        }
        Ok(())
    }
}
