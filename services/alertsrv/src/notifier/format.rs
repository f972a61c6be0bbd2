//! Message rendering for alert notifications

use stockwatch_model::Alert;

const SMS_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
}

pub trait MessageFormatter: Send + Sync + 'static {
    fn email(&self, alert: &Alert, subject_label: &str) -> EmailContent;
    fn sms(&self, alert: &Alert, subject_label: &str) -> String;
}

/// Plain text email with a minimal HTML twin, and a single-segment SMS
#[derive(Debug, Clone, Default)]
pub struct PlainTextFormatter {
    /// Link appended to emails when set
    pub dashboard_url: Option<String>,
}

impl PlainTextFormatter {
    pub fn new(dashboard_url: Option<String>) -> Self {
        Self { dashboard_url }
    }

    fn lines(&self, alert: &Alert, subject_label: &str) -> Vec<String> {
        let mut lines = vec![
            alert.message.clone(),
            String::new(),
            format!("Type: {}", type_label(alert)),
            format!("Severity: {}", alert.severity),
            format!("Warehouse: {}", alert.warehouse_id),
        ];
        match alert.subject() {
            Some(subject) if subject.id() != subject_label => {
                lines.push(format!("Subject: {} ({})", subject_label, subject));
            },
            Some(subject) => lines.push(format!("Subject: {}", subject)),
            None => lines.push(format!("Subject: {}", subject_label)),
        }
        lines.push(format!("Raised at: {}", alert.created_at.to_rfc3339()));
        for (key, value) in &alert.details {
            let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            lines.push(format!("{}: {}", key, value));
        }
        if let Some(url) = &self.dashboard_url {
            lines.push(String::new());
            lines.push(format!("{}/alerts/{}", url.trim_end_matches('/'), alert.id));
        }
        lines
    }
}

impl MessageFormatter for PlainTextFormatter {
    fn email(&self, alert: &Alert, subject_label: &str) -> EmailContent {
        let lines = self.lines(alert, subject_label);
        let html = lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| format!("<p>{}</p>", escape_html(line)))
            .collect::<String>();

        EmailContent {
            subject: format!(
                "[{}] {}: {}",
                alert.severity.as_str().to_uppercase(),
                type_label(alert),
                alert.message
            ),
            body: lines.join("\n"),
            html: Some(html),
        }
    }

    fn sms(&self, alert: &Alert, _subject_label: &str) -> String {
        let text = format!(
            "STOCKWATCH {}: {}",
            alert.severity.as_str().to_uppercase(),
            alert.message
        );
        if text.chars().count() <= SMS_MAX_CHARS {
            return text;
        }
        let mut truncated: String = text.chars().take(SMS_MAX_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    }
}

/// "low_stock" -> "Low stock"
fn type_label(alert: &Alert) -> String {
    let raw = alert.alert_type.as_str().replace('_', " ");
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
