//! Tracing setup for stockwatch services
//!
//! Console output uses a compact `timestamp [LEVEL] message` format. File
//! output rolls daily under the configured log directory. HTTP access lines
//! are emitted under the `api_access` target and land in their own file.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target used by the HTTP access logger
pub const API_ACCESS_TARGET: &str = "api_access";

/// Bracketed label and ANSI colour for a level
fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("[ERROR]", "\x1b[31m"),
        Level::WARN => ("[WARN]", "\x1b[33m"),
        Level::INFO => ("[INFO]", "\x1b[32m"),
        Level::DEBUG => ("[DEBUG]", "\x1b[34m"),
        Level::TRACE => ("[TRACE]", "\x1b[35m"),
    }
}

/// `2026-03-02T08:00:00.000000Z [INFO] Sweep finished scanned=42`
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let (label, color) = level_style(*event.metadata().level());
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        if writer.has_ansi_escapes() {
            write!(writer, "{stamp} {color}{label}\x1b[0m ")?;
        } else {
            write!(writer, "{stamp} {label} ")?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// Non-blocking writers flush only while their guards are alive
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

fn keep_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    /// Directory the daily files roll in
    pub log_dir: PathBuf,
    /// JSON lines instead of bracketed text in the service log file
    pub enable_json: bool,
    /// Write `api_access` events to `<service>_api.log`
    pub enable_api_log: bool,
    pub api_log_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_json: false,
            enable_api_log: true,
            api_log_level: Level::INFO,
        }
    }
}

/// `RUST_LOG` wins; an `api_access` directive is appended when it has none
fn filter_directives(config: &LogConfig) -> String {
    let api_level = if config.enable_api_log {
        config.api_log_level.as_str().to_lowercase()
    } else {
        "off".to_string()
    };

    match std::env::var("RUST_LOG") {
        Ok(env_str) if env_str.contains(API_ACCESS_TARGET) => env_str,
        Ok(env_str) => format!("{},{}={}", env_str, API_ACCESS_TARGET, api_level),
        Err(_) => format!(
            "info,{}=debug,{}={}",
            config.service_name, API_ACCESS_TARGET, api_level
        ),
    }
}

fn is_access_event(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target() == API_ACCESS_TARGET
}

/// Daily rolling non-blocking writer for `<dir>/<file_name>.YYYY-MM-DD`
fn rolling_writer(config: &LogConfig, file_name: String) -> NonBlocking {
    let appender = tracing_appender::rolling::daily(&config.log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    keep_guard(guard);
    writer
}

/// Install console, service file and access file layers
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;
    let env_filter = EnvFilter::try_new(filter_directives(&config))?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(LineFormat)
        .boxed();

    let service_writer = rolling_writer(&config, format!("{}.log", config.service_name));
    let service_file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(service_writer)
            .with_target(true)
            .with_filter(filter::filter_fn(|m| !is_access_event(m)))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(service_writer)
            .with_ansi(false)
            .event_format(LineFormat)
            .with_filter(filter::filter_fn(|m| !is_access_event(m)))
            .boxed()
    };

    let access_file_layer = config.enable_api_log.then(|| {
        fmt::layer()
            .with_writer(rolling_writer(&config, format!("{}_api.log", config.service_name)))
            .with_ansi(false)
            .event_format(LineFormat)
            .with_filter(filter::filter_fn(is_access_event))
            .boxed()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(service_file_layer)
        .with(access_file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

/// Access-log middleware: one `api_access` event per request.
///
/// Only method, path, status and latency are recorded. Headers and bodies
/// stay out of the log since webhook calls carry device credentials.
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::Method;
    use tracing::{debug, info};

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if matches!(method, Method::GET | Method::HEAD | Method::OPTIONS) {
        debug!(target: API_ACCESS_TARGET, %method, %path, status, elapsed_ms, "HTTP request");
    } else {
        info!(target: API_ACCESS_TARGET, %method, %path, status, elapsed_ms, "HTTP request");
    }

    response
}
