//! # Bridge Daemon
//!
//! Runs the vacuum bridge as a standalone process.
//!
//! ## Usage
//! ```bash
//! # Use the default config path (~/.config/rovac/bridge.toml)
//! cargo run -p rovac-bridge --bin rovac-bridge
//!
//! # Specify a config file
//! cargo run -p rovac-bridge --bin rovac-bridge -- --config ./bridge.toml
//!
//! # Credentials via environment
//! ROVAC_EMAIL=me@example.com ROVAC_PASSWORD=secret cargo run -p rovac-bridge
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rovac_bridge::{BridgeAgent, EntityAdapter};
use rovac_core::codec::StatusDelta;
use rovac_core::state::DeviceState;

/// Adapter that mirrors bridge activity into the log.
struct LogAdapter;

impl EntityAdapter for LogAdapter {
    fn on_state(&self, state: &DeviceState) {
        info!(
            battery = ?state.battery_percent,
            charging = ?state.charging,
            action = ?state.action,
            connected = state.mqtt_connected,
            "State updated"
        );
    }

    fn on_event(&self, delta: &StatusDelta) {
        if let StatusDelta::Unrecognized { code, payload } = delta {
            info!(code, %payload, "Unrecognized status code");
        }
    }

    fn on_connectivity(&self, connected: bool) {
        if connected {
            info!("Robot session online");
        } else {
            info!("Robot session offline");
        }
    }
}

fn parse_config_path() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match rovac_bridge::BridgeConfig::load(parse_config_path()) {
        Ok(config) => config,
        Err(e) => {
            error!(?e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut agent = BridgeAgent::with_adapter(config, Arc::new(LogAdapter));

    if let Err(e) = agent.start().await {
        error!(?e, "Failed to start bridge");
        std::process::exit(1);
    }

    // Run until interrupted
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received"),
        Err(e) => error!(?e, "Failed to listen for interrupt"),
    }

    if let Err(e) = agent.shutdown().await {
        error!(?e, "Shutdown error");
    }
}
