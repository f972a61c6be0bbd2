//! Process startup helpers: identity, banner and tracing setup

use crate::logging::{self, LogConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// What the banner and log files are named after
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub port: u16,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            port,
        }
    }
}

pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███████╗████████╗ ██████╗  ██████╗██╗  ██╗██╗    ██╗ █████╗ ████████╗ ██████╗██╗  ██╗
 ██╔════╝╚══██╔══╝██╔═══██╗██╔════╝██║ ██╔╝██║    ██║██╔══██╗╚══██╔══╝██╔════╝██║  ██║
 ███████╗   ██║   ██║   ██║██║     █████╔╝ ██║ █╗ ██║███████║   ██║   ██║     ███████║
 ╚════██║   ██║   ██║   ██║██║     ██╔═██╗ ██║███╗██║██╔══██║   ██║   ██║     ██╔══██║
 ███████║   ██║   ╚██████╔╝╚██████╗██║  ██╗╚███╔███╔╝██║  ██║   ██║   ╚██████╗██║  ██║
 ╚══════╝   ╚═╝    ╚═════╝  ╚═════╝╚═╝  ╚═╝ ╚══╝╚══╝ ╚═╝  ╚═╝   ╚═╝    ╚═════╝╚═╝  ╚═╝
    "#;

    info!("{}", banner);
    info!(
        " {} v{} | {} | port {}",
        service.name, service.version, service.description, service.port
    );
}

/// Install the tracing subscriber, writing under `<root>/<service name>/`.
///
/// `STOCKWATCH_LOG_DIR` overrides `log_root`.
pub fn init_logging(service: &ServiceInfo, log_root: &Path, json: bool) -> anyhow::Result<()> {
    let root = std::env::var("STOCKWATCH_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| log_root.to_path_buf());

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: root.join(&service.name),
        enable_json: json,
        ..Default::default()
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))
}
