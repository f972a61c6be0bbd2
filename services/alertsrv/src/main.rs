//! Alert Service (alertsrv)
//!
//! Device telemetry webhook, inventory and device health alerting, and
//! notification fan-out for warehouse operators.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::serve;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::prelude::RedisClient;
use common::service_bootstrap::{init_logging, print_startup_banner, ServiceInfo};
use errors::{StockwatchError, StockwatchResult};
use stockwatch_store::{DocumentStore, MemoryStore, RedisStore, SystemTimeProvider, TimeProvider};

use alertsrv::api::create_router;
use alertsrv::config::{AlertSrvConfig, StoreBackend};
use alertsrv::notifier::{DeliveryChannel, DeliveryKind, QueueDelivery, WebhookDelivery};
use alertsrv::services::rate_limiter::{
    start_prune_task, RateLimitBackend, RateLimiter, RedisWindowLimiter, SlidingWindowLimiter,
};
use alertsrv::AppState;

#[derive(Parser, Debug)]
#[command(name = "alertsrv", version, about = "Warehouse alert service")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ALERTSRV_CONFIG")]
    config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Run one device health sweep and exit
    #[arg(long)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() -> StockwatchResult<()> {
    let args = Args::parse();
    let config = AlertSrvConfig::load(args.config.as_deref())?;

    let service_info = ServiceInfo::new(
        config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
        "Warehouse Telemetry Alerting Service",
        config.service.port,
    );
    init_logging(&service_info, &config.logging.dir, config.logging.json)?;
    print_startup_banner(&service_info);

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let redis = if needs_redis(&config) {
        let client = RedisClient::new(&config.store.redis_url).await?;
        info!("Connected to Redis at {}", config.store.redis_url);
        Some(Arc::new(client))
    } else {
        None
    };

    let store: Arc<dyn DocumentStore> = match (&config.store.backend, &redis) {
        (StoreBackend::Redis, Some(client)) => {
            Arc::new(RedisStore::from_client(client.clone(), config.store.key_prefix.clone()))
        },
        _ => {
            warn!("Using in-memory document store; data is lost on restart");
            Arc::new(MemoryStore::new())
        },
    };

    let limiter: Arc<dyn RateLimiter> = match (&config.rate_limit.backend, &redis) {
        (RateLimitBackend::Redis, Some(client)) => Arc::new(RedisWindowLimiter::new(
            client.clone(),
            config.store.key_prefix.clone(),
            &config.rate_limit,
            clock.clone(),
        )),
        _ => Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit, clock.clone())),
    };

    let delivery: Arc<dyn DeliveryChannel> = match config.notifier.delivery {
        DeliveryKind::Queue => Arc::new(QueueDelivery::new(store.clone())),
        DeliveryKind::Webhook => {
            let url = config.notifier.webhook_url.clone().ok_or_else(|| {
                StockwatchError::InvalidConfig {
                    field: "notifier.webhook_url".into(),
                    reason: "required for webhook delivery".into(),
                }
            })?;
            Arc::new(WebhookDelivery::new(url, config.notifier.webhook_timeout())?)
        },
    };

    let state = AppState::new(config.clone(), store, limiter.clone(), delivery, clock)?;

    if args.sweep_once {
        let report = state.sweeper.sweep_once().await?;
        info!(
            "Sweep finished: {} devices, {} offline, {} alerts",
            report.scanned, report.marked_offline, report.alerts_created
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // Background tasks
    let (watcher_handle, watcher_token) = state.watcher.clone().start().await?;
    let sweeper_task = config.sweeper.enabled.then(|| state.sweeper.clone().start());
    if sweeper_task.is_none() {
        warn!("Device health sweeper disabled");
    }
    let (prune_handle, prune_token) = start_prune_task(
        limiter,
        Duration::from_secs(config.rate_limit.prune_interval_secs.max(1)),
    );

    let addr: SocketAddr = config.bind_address().parse().map_err(|e| {
        StockwatchError::InvalidConfig {
            field: "service.host".into(),
            reason: format!("invalid bind address '{}': {}", config.bind_address(), e),
        }
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);
    info!("Webhook: http://{}/iot/webhook", addr);

    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();
    let app = create_router(state);
    let server_handle = tokio::spawn(async move {
        let shutdown = common::shutdown::shutdown_signal(server_token);
        if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("Server error: {}", e);
        }
    });

    shutdown_token.cancelled().await;
    info!("Shutting down alertsrv");

    watcher_token.cancel();
    prune_token.cancel();
    if let Some((_, token)) = &sweeper_task {
        token.cancel();
    }

    let _ = server_handle.await;
    let _ = watcher_handle.await;
    let _ = prune_handle.await;
    if let Some((handle, _)) = sweeper_task {
        let _ = handle.await;
    }

    info!("alertsrv stopped");
    Ok(())
}

fn needs_redis(config: &AlertSrvConfig) -> bool {
    config.store.backend == StoreBackend::Redis || config.rate_limit.backend == RateLimitBackend::Redis
}
