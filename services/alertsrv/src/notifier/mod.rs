//! Alert notification fan-out
//!
//! Recipients are the warehouse's users whose role is routed for the
//! alert's severity:
//!
//! | severity | roles                  |
//! |----------|------------------------|
//! | critical | admin, manager         |
//! | warning  | admin, manager, staff  |
//! | info     | everyone               |
//!
//! Every recipient with an email address gets an email; SMS goes out only
//! for critical alerts. A failed delivery is logged and counted, never
//! raised.

pub mod delivery;
pub mod format;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use errors::StockwatchResult;
use stockwatch_model::collections::USERS;
use stockwatch_model::{Alert, Role, Severity, User};
use stockwatch_store::{DocumentStore, DocumentStoreExt, Filter, TimeProvider};

pub use delivery::{Channel, DeliveryChannel, OutboundMessage, Priority, QueueDelivery, WebhookDelivery};
pub use format::{EmailContent, MessageFormatter, PlainTextFormatter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Queue,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub delivery: DeliveryKind,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    pub sms_for_critical_only: bool,
    pub dashboard_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryKind::Queue,
            webhook_url: None,
            webhook_timeout_secs: 10,
            sms_for_critical_only: true,
            dashboard_url: None,
        }
    }
}

impl NotifierConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

/// Source of user roles
#[async_trait]
pub trait RoleDirectory: Send + Sync + 'static {
    async fn role_of(&self, user_id: &str) -> StockwatchResult<Option<Role>>;
}

/// Reads the `role` field of the user document
pub struct StoreRoleDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreRoleDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RoleDirectory for StoreRoleDirectory {
    async fn role_of(&self, user_id: &str) -> StockwatchResult<Option<Role>> {
        let user: Option<User> = self.store.get_as(USERS, user_id).await?;
        Ok(user.and_then(|u| u.role))
    }
}

/// Roles that receive alerts of `severity`
pub fn routed_to(severity: Severity, role: Option<Role>) -> bool {
    match severity {
        Severity::Critical => matches!(role, Some(Role::Admin | Role::Manager)),
        Severity::Warning => role.is_some(),
        Severity::Info => true,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReport {
    pub emails_sent: usize,
    pub sms_sent: usize,
    pub failures: usize,
}

pub struct Notifier {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn RoleDirectory>,
    formatter: Arc<dyn MessageFormatter>,
    delivery: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn TimeProvider>,
    sms_for_critical_only: bool,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn RoleDirectory>,
        formatter: Arc<dyn MessageFormatter>,
        delivery: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            directory,
            formatter,
            delivery,
            clock,
            sms_for_critical_only: true,
        }
    }

    pub fn with_sms_for_critical_only(mut self, enabled: bool) -> Self {
        self.sms_for_critical_only = enabled;
        self
    }

    /// Fan an alert out to its recipients
    pub async fn notify(&self, alert: &Alert, subject_label: &str) -> NotificationReport {
        let mut report = NotificationReport::default();

        let recipients = match self.recipients(alert).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    event = "notification_failed",
                    alert_id = %alert.id,
                    "Recipient lookup failed: {}",
                    e
                );
                report.failures += 1;
                return report;
            },
        };

        let priority = if alert.severity == Severity::Critical {
            Priority::High
        } else {
            Priority::Normal
        };
        let send_sms = alert.severity == Severity::Critical || !self.sms_for_critical_only;
        let email = self.formatter.email(alert, subject_label);
        let sms_text = send_sms.then(|| self.formatter.sms(alert, subject_label));

        let mut outbound = Vec::new();
        for user in &recipients {
            if let Some(address) = user.email() {
                outbound.push((
                    user.id.as_str(),
                    OutboundMessage {
                        channel: Channel::Email,
                        to: address.to_string(),
                        subject: Some(email.subject.clone()),
                        body: Some(email.body.clone()),
                        html: email.html.clone(),
                        message: None,
                        priority,
                        alert_id: alert.id.clone(),
                        created_at: self.clock.now(),
                    },
                ));
            }
            if let (Some(number), Some(text)) = (user.phone(), sms_text.as_ref()) {
                outbound.push((
                    user.id.as_str(),
                    OutboundMessage {
                        channel: Channel::Sms,
                        to: number.to_string(),
                        subject: None,
                        body: None,
                        html: None,
                        message: Some(text.clone()),
                        priority,
                        alert_id: alert.id.clone(),
                        created_at: self.clock.now(),
                    },
                ));
            }
        }

        // One slow recipient must not hold up the others
        let results = join_all(
            outbound
                .iter()
                .map(|(user_id, message)| async move { (message.channel, self.send(message, user_id).await) }),
        )
        .await;
        for (channel, delivered) in results {
            match (channel, delivered) {
                (Channel::Email, true) => report.emails_sent += 1,
                (Channel::Sms, true) => report.sms_sent += 1,
                (_, false) => report.failures += 1,
            }
        }

        info!(
            "Alert {} ({} {}) notified: {} emails, {} sms, {} failures",
            alert.id, alert.severity, alert.alert_type, report.emails_sent, report.sms_sent, report.failures
        );
        report
    }

    async fn recipients(&self, alert: &Alert) -> StockwatchResult<Vec<User>> {
        let users: Vec<User> = self
            .store
            .query_as(USERS, &[Filter::eq("warehouseId", alert.warehouse_id.as_str())])
            .await?;

        let mut recipients = Vec::with_capacity(users.len());
        for user in users {
            let role = match self.directory.role_of(&user.id).await {
                Ok(role) => role,
                Err(e) => {
                    warn!("Role lookup failed for user {}: {}", user.id, e);
                    continue;
                },
            };
            if routed_to(alert.severity, role) {
                recipients.push(user);
            }
        }
        debug!("Alert {} routed to {} users", alert.id, recipients.len());
        Ok(recipients)
    }

    async fn send(&self, message: &OutboundMessage, user_id: &str) -> bool {
        match self.delivery.deliver(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    event = "notification_failed",
                    alert_id = %message.alert_id,
                    channel = message.channel.as_str(),
                    user_id = user_id,
                    "Delivery failed: {}",
                    e
                );
                false
            },
        }
    }
}
