//! # Bridge Agent
//!
//! Main orchestrator for the vacuum bridge. Coordinates cloud
//! authentication, the MQTT session, and the state aggregator.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       BridgeAgent Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        BridgeAgent                               │  │
//! │  │                                                                  │  │
//! │  │  • Authenticates and resolves user + device on start             │  │
//! │  │  • Spawns and manages session and aggregator                     │  │
//! │  │  • Routes snapshots and events to the entity adapter             │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   CloudApi     │  │    Session     │  │   StateAggregator      │    │
//! │  │   (REST)       │  │    (MQTT)      │  │                        │    │
//! │  │                │  │                │  │ Folds deltas into the  │    │
//! │  │ OAuth tokens,  │  │ Reconnecting   │  │ DeviceState snapshot   │    │
//! │  │ user + devices │  │ broker link    │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  STARTUP SEQUENCE                                                       │
//! │  ────────────────                                                       │
//! │  1. validate config          4. confirm device in account               │
//! │  2. password grant           5. spawn session (user_id as username)     │
//! │  3. resolve user_id          6. spawn aggregator + status router        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use rovac_core::codec::StatusDelta;
use rovac_core::state::DeviceState;
use rovac_core::CommandIntent;

use crate::aggregator::{AggregatorHandle, StateAggregator};
use crate::auth::TokenManager;
use crate::cloud::CloudApi;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{ConnectionState, Session, SessionConfig, SessionHandle};

// =============================================================================
// Bridge Status
// =============================================================================

/// Current bridge status for external queries.
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    /// Current MQTT connection state.
    pub connection_state: ConnectionState,

    /// Whether the session is currently up.
    pub is_connected: bool,

    /// The device this bridge is serving.
    pub device_id: Option<String>,

    /// Device name from the cloud listing (if any).
    pub device_name: Option<String>,

    /// When the agent started (ISO8601).
    pub started_at: Option<String>,

    /// Last error message (if any).
    pub last_error: Option<String>,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        BridgeStatus {
            connection_state: ConnectionState::Disconnected,
            is_connected: false,
            device_id: None,
            device_name: None,
            started_at: None,
            last_error: None,
        }
    }
}

// =============================================================================
// Entity Adapter Trait
// =============================================================================

/// Callbacks for the layer sitting on top of the bridge (an automation
/// platform integration, a CLI display, a test probe).
pub trait EntityAdapter: Send + Sync {
    /// Called with every new state snapshot.
    fn on_state(&self, state: &DeviceState);

    /// Called with every decoded delta, including ones that do not touch
    /// the snapshot (system events, unrecognized codes).
    fn on_event(&self, delta: &StatusDelta);

    /// Called when the session connectivity flips.
    fn on_connectivity(&self, connected: bool);
}

/// No-op adapter for testing and headless operation.
pub struct NoOpAdapter;

impl EntityAdapter for NoOpAdapter {
    fn on_state(&self, _state: &DeviceState) {}
    fn on_event(&self, _delta: &StatusDelta) {}
    fn on_connectivity(&self, _connected: bool) {}
}

// =============================================================================
// Bridge Agent
// =============================================================================

/// Main agent that orchestrates the bridge.
pub struct BridgeAgent {
    /// Bridge configuration.
    config: Arc<BridgeConfig>,

    /// Current status.
    status: Arc<RwLock<BridgeStatus>>,

    /// Adapter for upstream notifications.
    adapter: Arc<dyn EntityAdapter>,

    /// Session handle (set after start).
    session: Option<SessionHandle>,

    /// Aggregator handle (set after start).
    aggregator: Option<AggregatorHandle>,

    /// Shutdown sender for the status router.
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl BridgeAgent {
    /// Creates a new agent with a no-op adapter.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_adapter(config, Arc::new(NoOpAdapter))
    }

    /// Creates a new agent with a custom adapter.
    pub fn with_adapter(config: BridgeConfig, adapter: Arc<dyn EntityAdapter>) -> Self {
        BridgeAgent {
            config: Arc::new(config),
            status: Arc::new(RwLock::new(BridgeStatus::default())),
            adapter,
            session: None,
            aggregator: None,
            shutdown_tx: None,
        }
    }

    /// Returns the current status.
    pub async fn status(&self) -> BridgeStatus {
        self.status.read().await.clone()
    }

    /// Starts the bridge.
    ///
    /// Authenticates against the cloud, resolves the user and device, then
    /// spawns the session and aggregator. Returns once everything is
    /// running; the session reconnects on its own from then on.
    pub async fn start(&mut self) -> BridgeResult<()> {
        self.config.validate()?;

        info!(
            cloud_url = %self.config.cloud.base_url,
            "Starting bridge agent"
        );

        // Cloud client + token manager share one credential cache
        let api = CloudApi::new(&self.config.cloud)?;
        let tokens = TokenManager::new(
            api.clone(),
            self.config.account.email.clone(),
            self.config.account.password.clone(),
            std::time::Duration::from_secs(self.config.cloud.refresh_margin_secs),
        );

        // Fail fast on bad credentials before spawning anything
        tokens.get_valid_token().await?;

        let user_id = api.get_user_id(&tokens).await?;
        let device = self.resolve_device(&api, &tokens).await?;

        info!(
            device_id = %device.device_id,
            device_name = device.name.as_deref().unwrap_or("-"),
            "Resolved target device"
        );

        // Spawn session
        let session_config = SessionConfig {
            host: self.config.mqtt_host()?,
            port: self.config.mqtt.port,
            device_id: device.device_id.clone(),
            username: user_id,
            keep_alive: self.config.mqtt.keep_alive(),
            connect_timeout: std::time::Duration::from_secs(self.config.mqtt.connect_timeout_secs),
            poll_interval: self.config.mqtt.poll_interval(),
            initial_backoff: std::time::Duration::from_millis(self.config.mqtt.initial_backoff_ms),
            max_backoff: std::time::Duration::from_secs(self.config.mqtt.max_backoff_secs),
        };
        let (session_handle, session_rx) = Session::spawn(session_config, tokens);
        self.session = Some(session_handle.clone());

        // Spawn aggregator over the session's event stream
        let aggregator = StateAggregator::spawn(session_rx);
        self.aggregator = Some(aggregator.clone());

        // Spawn status router
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        tokio::spawn(Self::status_router(
            self.status.clone(),
            self.adapter.clone(),
            session_handle,
            aggregator.subscribe_state(),
            aggregator.subscribe_events(),
            shutdown_rx,
        ));

        // Update status
        {
            let mut s = self.status.write().await;
            s.device_id = Some(device.device_id);
            s.device_name = device.name;
            s.started_at = Some(chrono::Utc::now().to_rfc3339());
        }

        info!("Bridge agent started");
        Ok(())
    }

    /// Picks the target device from the account's listing.
    ///
    /// An explicitly configured ID must exist in the account. With no ID
    /// configured, a single-device account adopts its only device.
    async fn resolve_device(
        &self,
        api: &CloudApi,
        tokens: &TokenManager<CloudApi>,
    ) -> BridgeResult<crate::cloud::DeviceInfo> {
        let devices = api.get_devices(tokens).await?;

        let configured = self.config.device_id();
        if !configured.is_empty() {
            return devices
                .into_iter()
                .find(|d| d.device_id == configured)
                .ok_or_else(|| BridgeError::DeviceNotFound(configured.to_string()));
        }

        let count = devices.len();
        match devices.into_iter().next() {
            Some(device) if count == 1 => {
                info!(device_id = %device.device_id, "Adopted the account's only device");
                Ok(device)
            }
            Some(_) => {
                warn!(count, "Multiple devices registered, none configured");
                Err(BridgeError::MissingDeviceId)
            }
            None => Err(BridgeError::DeviceNotFound(
                "account has no registered devices".into(),
            )),
        }
    }

    /// Sends one command to the robot.
    pub async fn send_command(&self, intent: CommandIntent) -> BridgeResult<()> {
        let session = self
            .session
            .as_ref()
            .ok_or(BridgeError::ShuttingDown)?;

        debug!(command = %intent, "Sending command");
        session.publish(intent.encode()).await
    }

    /// Returns a receiver that always holds the latest snapshot.
    pub fn subscribe_state(&self) -> BridgeResult<watch::Receiver<DeviceState>> {
        self.aggregator
            .as_ref()
            .map(|a| a.subscribe_state())
            .ok_or(BridgeError::ShuttingDown)
    }

    /// Returns a receiver of every decoded delta.
    pub fn subscribe_events(&self) -> BridgeResult<broadcast::Receiver<StatusDelta>> {
        self.aggregator
            .as_ref()
            .map(|a| a.subscribe_events())
            .ok_or(BridgeError::ShuttingDown)
    }

    /// Returns the current snapshot.
    pub fn current_state(&self) -> BridgeResult<DeviceState> {
        self.aggregator
            .as_ref()
            .map(|a| a.current_state())
            .ok_or(BridgeError::ShuttingDown)
    }

    /// Stops the bridge gracefully.
    pub async fn shutdown(&mut self) -> BridgeResult<()> {
        info!("Shutting down bridge agent");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(session) = self.session.take() {
            let _ = session.shutdown().await;
        }

        if let Some(aggregator) = self.aggregator.take() {
            let _ = aggregator.shutdown().await;
        }

        {
            let mut s = self.status.write().await;
            s.connection_state = ConnectionState::Disconnected;
            s.is_connected = false;
        }

        info!("Bridge agent stopped");
        Ok(())
    }

    /// Mirrors aggregator output into the status struct and the adapter.
    async fn status_router(
        status: Arc<RwLock<BridgeStatus>>,
        adapter: Arc<dyn EntityAdapter>,
        session: SessionHandle,
        mut state_rx: watch::Receiver<DeviceState>,
        mut event_rx: broadcast::Receiver<StatusDelta>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut was_connected = false;

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        warn!("State channel closed");
                        break;
                    }

                    let snapshot = state_rx.borrow_and_update().clone();

                    {
                        let mut s = status.write().await;
                        s.is_connected = snapshot.mqtt_connected;
                        s.connection_state = session.state().await;
                    }

                    if snapshot.mqtt_connected != was_connected {
                        was_connected = snapshot.mqtt_connected;
                        adapter.on_connectivity(was_connected);
                    }

                    adapter.on_state(&snapshot);
                }

                event = event_rx.recv() => {
                    match event {
                        Ok(delta) => adapter.on_event(&delta),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Adapter fell behind the event stream");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Status router received shutdown");
                    break;
                }
            }
        }

        info!("Status router stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_status_default() {
        let status = BridgeStatus::default();
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
        assert!(!status.is_connected);
        assert!(status.device_id.is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        // Default config has no credentials; start must fail before any
        // network traffic
        let mut agent = BridgeAgent::new(BridgeConfig::default());
        let err = agent.start().await.unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_accessors_before_start() {
        let agent = BridgeAgent::new(BridgeConfig::default());
        assert!(agent.current_state().is_err());
        assert!(agent.subscribe_state().is_err());
        assert!(matches!(
            agent.send_command(CommandIntent::Start).await.unwrap_err(),
            BridgeError::ShuttingDown
        ));
    }
}
