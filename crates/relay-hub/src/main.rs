//! # relay-hub
//!
//! Broadcast hub binary: loads settings, starts the HTTP/WebSocket server,
//! and drains it on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::HandlerKind;
use relay_server::shutdown::DEFAULT_GRACE;
use relay_server::{HubConfig, HubServer, RateLimitConfig};
use relay_settings::{LogFormat, RateLimitSettings, RelaySettings};

/// Real-time broadcast hub.
#[derive(Parser, Debug)]
#[command(name = "relay-hub", about = "Real-time WebSocket broadcast hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory served at `GET /` (overrides settings).
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Message handler: `hilo` or `silent` (overrides settings).
    #[arg(long)]
    handler: Option<HandlerKind>,
}

impl Cli {
    /// Flags win over file and environment.
    fn apply(&self, mut settings: RelaySettings) -> RelaySettings {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(kind) = self.handler {
            settings.handler = kind;
        }
        settings
    }
}

fn rate_limit(limit: RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig {
        interval_ms: limit.interval_ms,
        burst: limit.burst,
    }
}

fn hub_config(settings: &RelaySettings) -> HubConfig {
    let hub = &settings.hub;
    HubConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        subscriber_buffer: hub.subscriber_buffer,
        max_payload_bytes: hub.max_payload_bytes,
        max_frame_bytes: hub.max_frame_bytes,
        write_timeout_ms: hub.write_timeout_ms,
        max_session_secs: hub.max_session_secs,
        publish_limit: rate_limit(hub.publish_limit),
        connection_limit: rate_limit(hub.connection_limit),
        static_dir: settings.server.static_dir.as_ref().map(PathBuf::from),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: the log level comes from them.
    let path = cli
        .config
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let settings = cli.apply(settings);

    let level = settings.logging.level.as_filter_str();
    match settings.logging.format {
        LogFormat::Compact => relay_core::logging::init_subscriber(level),
        LogFormat::Json => relay_core::logging::init_json_subscriber(level),
    }

    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let handler = relay_core::handlers::build(settings.handler);
    let server = HubServer::new(hub_config(&settings), handler).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        handler = %settings.handler,
        static_dir = ?settings.server.static_dir,
        "relay hub listening on http://{addr}"
    );

    relay_server::shutdown::wait_for_signal().await;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(server.hub(), handle, DEFAULT_GRACE)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
