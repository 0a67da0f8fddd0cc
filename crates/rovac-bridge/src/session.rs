//! # MQTT Session
//!
//! MQTT client with automatic reconnection and backoff.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       MQTT Session States                               │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │Disconnected│ ──────────────► │ Connecting │                         │
//! │  └────────────┘                 └─────┬──────┘                         │
//! │        ▲                              │                                 │
//! │        │                    success   │   failure                       │
//! │        │                        ┌─────┴─────┐                          │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                   │
//! │        │              │ Connected  │  │ Backoff    │                   │
//! │        │              └─────┬──────┘  └─────┬──────┘                   │
//! │        │                    │               │                           │
//! │        │              disconnect/error      │  timer expired            │
//! │        │                    │               │                           │
//! │        │                    ▼               │                           │
//! │        │              ┌────────────┐        │                           │
//! │        └───────────── │Reconnecting│ ◄──────┘                          │
//! │                       └────────────┘                                    │
//! │                                                                         │
//! │  ON EVERY CONNECT                                                       │
//! │  ────────────────                                                       │
//! │  1. Fetch a fresh OAuth token (it is both password and client ID)      │
//! │  2. Subscribe to device/{id}/app                                        │
//! │  3. Send the real-time subscription (f:40) and one-shot queries         │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential)                                         │
//! │  ──────────────────────────────                                         │
//! │  500ms, 1s, 2s, ... capped at 60s                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport as MqttTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use rovac_core::codec::{self, StatusDelta};
use rovac_core::codes;
use rovac_core::FunctionMessage;

use crate::auth::{TokenEndpoint, TokenManager};
use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Session State
// =============================================================================

/// Connection state for the MQTT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Waiting before reconnection attempt.
    Backoff,
    /// Reconnection in progress.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// What the session reports to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session came up and housekeeping messages were sent.
    Online,
    /// The session went down; deltas stop until the next `Online`.
    Offline,
    /// One decoded status update from the robot.
    Delta(StatusDelta),
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Configuration for the MQTT session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker hostname.
    pub host: String,

    /// Broker port (TLS).
    pub port: u16,

    /// Device whose topics to use.
    pub device_id: String,

    /// MQTT username (the cloud user UUID).
    pub username: String,

    /// Keep-alive interval.
    pub keep_alive: Duration,

    /// Time allowed for the broker to answer CONNECT.
    pub connect_timeout: Duration,

    /// Interval between one-shot state polls.
    pub poll_interval: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: String::new(),
            port: 8883,
            device_id: String::new(),
            username: String::new(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Handle for interacting with the session from other components.
#[derive(Clone)]
pub struct SessionHandle {
    /// Sender for outgoing command messages.
    outgoing_tx: mpsc::Sender<FunctionMessage>,

    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,

    /// Shutdown signal.
    shutdown_tx: mpsc::Sender<()>,
}

impl SessionHandle {
    /// Publishes one command message to the robot.
    ///
    /// Fails fast with [`BridgeError::NotConnected`] while the session is
    /// down instead of queueing the command for an unknown later.
    pub async fn publish(&self, message: FunctionMessage) -> BridgeResult<()> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(BridgeError::NotConnected);
        }
        self.outgoing_tx
            .send(message)
            .await
            .map_err(|_| BridgeError::ChannelError("Session task is gone".into()))
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Returns true if currently connected.
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Triggers graceful shutdown (stop-update message, then disconnect).
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| BridgeError::ChannelError("Failed to send shutdown signal".into()))
    }
}

// =============================================================================
// MQTT Session
// =============================================================================

/// Outcome of one connection's inner loop.
enum LoopExit {
    /// Shutdown was requested; do not reconnect.
    Shutdown,
    /// The connection dropped; reconnect after backoff.
    ConnectionLost,
}

/// MQTT session with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let (handle, mut events) = Session::spawn(config, tokens);
///
/// handle.publish(CommandIntent::Start.encode()).await?;
///
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// ```
pub struct Session<E: TokenEndpoint> {
    config: SessionConfig,
    tokens: TokenManager<E>,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_rx: mpsc::Receiver<FunctionMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<E: TokenEndpoint + 'static> Session<E> {
    /// Creates a new session and spawns its background task.
    ///
    /// Returns a handle for publishing commands and a receiver for session
    /// events.
    pub fn spawn(
        config: SessionConfig,
        tokens: TokenManager<E>,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<FunctionMessage>(64);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let session = Session {
            config,
            tokens,
            state: state.clone(),
            outgoing_rx,
            event_tx,
            shutdown_rx,
        };

        // Spawn background task
        tokio::spawn(session.run());

        let handle = SessionHandle {
            outgoing_tx,
            state,
            shutdown_tx,
        };

        (handle, event_rx)
    }

    /// Main session loop.
    async fn run(mut self) {
        info!(
            host = %self.config.host,
            port = self.config.port,
            device_id = %self.config.device_id,
            "Session starting"
        );

        let mut backoff = create_backoff(&self.config);

        loop {
            // Check for shutdown
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Session received shutdown signal");
                break;
            }

            *self.state.write().await = ConnectionState::Connecting;

            match self.connect().await {
                Ok((client, eventloop)) => {
                    info!("MQTT session established");
                    *self.state.write().await = ConnectionState::Connected;

                    // Reset backoff on successful connection
                    backoff.reset();

                    let exit = self.connection_loop(client, eventloop).await;

                    *self.state.write().await = ConnectionState::Disconnected;
                    let _ = self.event_tx.send(SessionEvent::Offline).await;

                    if matches!(exit, LoopExit::Shutdown) {
                        break;
                    }
                }
                Err(e) => {
                    error!(?e, "Failed to connect to broker");
                }
            }

            // Connection lost or failed - enter backoff
            *self.state.write().await = ConnectionState::Backoff;

            match backoff.next_backoff() {
                Some(duration) => {
                    debug!(?duration, "Waiting before reconnect");

                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {
                            *self.state.write().await = ConnectionState::Reconnecting;
                        }
                        _ = self.shutdown_rx.recv() => {
                            info!("Shutdown during backoff");
                            break;
                        }
                    }
                }
                None => {
                    // Unreachable with max_elapsed_time = None
                    error!("Backoff exhausted");
                    break;
                }
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        info!("Session stopped");
    }

    /// Fetches a fresh token and drives the handshake to CONNACK.
    ///
    /// The token serves as both the MQTT password and the client ID, so a
    /// reconnect after token expiry always re-enters here and picks up a
    /// fresh one.
    async fn connect(&self) -> BridgeResult<(AsyncClient, EventLoop)> {
        let token = self.tokens.get_valid_token().await?;

        let mut options =
            MqttOptions::new(token.clone(), self.config.host.clone(), self.config.port);
        options.set_credentials(self.config.username.clone(), token);
        options.set_keep_alive(self.config.keep_alive);
        options.set_transport(MqttTransport::tls_with_default_config());

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        // Drive the event loop until the broker answers CONNECT
        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            return Ok(());
                        }
                        return Err(BridgeError::Connection(format!(
                            "Broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(BridgeError::Connection(e.to_string())),
                }
            }
        };

        match timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BridgeError::Timeout(self.config.connect_timeout.as_secs()));
            }
        }

        Ok((client, eventloop))
    }

    /// Post-CONNACK housekeeping: subscribe and prime the data stream.
    async fn on_connected(&self, client: &AsyncClient) -> BridgeResult<()> {
        let status_topic = codes::status_topic(&self.config.device_id);
        client.subscribe(&status_topic, QoS::AtLeastOnce).await?;
        debug!(topic = %status_topic, "Subscribed to status topic");

        self.send_message(client, codec::realtime_subscription())
            .await?;
        for query in codec::state_queries() {
            self.send_message(client, query).await?;
        }

        let _ = self.event_tx.send(SessionEvent::Online).await;
        Ok(())
    }

    /// Main connection loop - handles publishing, receiving, and polling.
    async fn connection_loop(&mut self, client: AsyncClient, mut eventloop: EventLoop) -> LoopExit {
        if let Err(e) = self.on_connected(&client).await {
            warn!(?e, "Post-connect housekeeping failed");
            return LoopExit::ConnectionLost;
        }

        let mut poll_interval = tokio::time::interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; housekeeping already queried
        poll_interval.tick().await;

        loop {
            tokio::select! {
                // Handle outgoing commands
                Some(msg) = self.outgoing_rx.recv() => {
                    debug!(code = msg.f, "Publishing command");
                    if let Err(e) = self.send_message(&client, msg).await {
                        error!(?e, "Publish failed");
                        return LoopExit::ConnectionLost;
                    }
                }

                // Handle broker traffic
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_publish(&publish.topic, &publish.payload).await;
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            info!("Broker sent disconnect");
                            return LoopExit::ConnectionLost;
                        }
                        Ok(_) => {
                            // Acks, pings, outgoing echoes
                        }
                        Err(e) => {
                            error!(?e, "MQTT connection error");
                            return LoopExit::ConnectionLost;
                        }
                    }
                }

                // Re-query state the push stream does not carry
                _ = poll_interval.tick() => {
                    debug!("Polling one-shot state");
                    for query in codec::state_queries() {
                        if let Err(e) = self.send_message(&client, query).await {
                            error!(?e, "State poll failed");
                            return LoopExit::ConnectionLost;
                        }
                    }
                }

                // Check for shutdown
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing session");
                    let _ = self.send_message(&client, codec::stop_realtime()).await;
                    let _ = client.disconnect().await;
                    return LoopExit::Shutdown;
                }
            }
        }
    }

    /// Serializes and publishes one message on the command topic.
    async fn send_message(&self, client: &AsyncClient, msg: FunctionMessage) -> BridgeResult<()> {
        let payload = msg.to_json()?;
        client
            .publish(
                codes::command_topic(&self.config.device_id),
                QoS::AtLeastOnce,
                false,
                payload.into_bytes(),
            )
            .await?;
        Ok(())
    }

    /// Decodes one inbound status payload and forwards the delta.
    ///
    /// A malformed payload is logged and dropped; it never takes the
    /// session down.
    async fn handle_publish(&self, topic: &str, payload: &[u8]) {
        match rovac_core::decode(payload) {
            Ok(delta) => {
                if let StatusDelta::Unrecognized { code, .. } = &delta {
                    debug!(code, "Unrecognized function code");
                }
                if self.event_tx.send(SessionEvent::Delta(delta)).await.is_err() {
                    warn!("Session event receiver dropped");
                }
            }
            Err(e) => {
                warn!(topic, ?e, "Dropping undecodable status payload");
            }
        }
    }
}

/// Creates the exponential backoff policy.
///
/// Jitter is disabled so the delay sequence is strictly non-decreasing up
/// to the cap.
fn create_backoff(config: &SessionConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: config.initial_backoff,
        max_interval: config.max_backoff,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None, // No limit on total time
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Backoff.to_string(), "backoff");
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 8883);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_non_decreasing_and_capped() {
        let config = SessionConfig::default();
        let mut backoff = create_backoff(&config);

        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let next = backoff.next_backoff().expect("backoff must not exhaust");
            assert!(next >= previous, "{:?} < {:?}", next, previous);
            assert!(next <= config.max_backoff);
            previous = next;
        }
        // After enough doublings the cap must have been reached
        assert_eq!(previous, config.max_backoff);
    }

    #[test]
    fn test_backoff_reset_returns_to_initial() {
        let config = SessionConfig::default();
        let mut backoff = create_backoff(&config);

        for _ in 0..5 {
            backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(config.initial_backoff));
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails_fast() {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<FunctionMessage>(4);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel::<()>(1);
        let handle = SessionHandle {
            outgoing_tx,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            shutdown_tx,
        };

        let err = handle.publish(FunctionMessage::new(35)).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
        // Nothing was enqueued for a later connection
        assert!(outgoing_rx.try_recv().is_err());

        assert!(!handle.is_connected().await);
        assert_eq!(handle.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_while_connected_enqueues() {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<FunctionMessage>(4);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel::<()>(1);
        let handle = SessionHandle {
            outgoing_tx,
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
            shutdown_tx,
        };

        handle.publish(FunctionMessage::new(36)).await.unwrap();
        assert_eq!(outgoing_rx.try_recv().unwrap().f, 36);
    }
}
