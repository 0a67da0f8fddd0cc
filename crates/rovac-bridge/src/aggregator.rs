//! # State Aggregator Module
//!
//! Folds the session's event stream into one [`DeviceState`] snapshot and
//! fans it out to consumers.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        State Aggregator                                 │
//! │                                                                         │
//! │   Session ──SessionEvent──► ┌─────────────────┐                        │
//! │   (Online / Offline /       │                 │                        │
//! │    Delta)                   │   Aggregator    │                        │
//! │                             │                 │                        │
//! │                             │  ┌───────────┐  │                        │
//! │                             │  │ Device    │  │  single mutable copy   │
//! │                             │  │ State     │  │  lives here, nowhere   │
//! │                             │  └───────────┘  │  else                  │
//! │                             └───────┬─────────┘                        │
//! │                                     │                                  │
//! │              ┌──────────────────────┴──────────────────────┐           │
//! │              ▼ watch::Receiver<DeviceState>                ▼           │
//! │     latest snapshot (coalescing,            broadcast::Receiver        │
//! │     late subscribers see current)           <StatusDelta> per-event    │
//! │                                             stream (system events,     │
//! │                                             unrecognized codes)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshot consumers get a `watch` channel (only the latest value matters);
//! consumers that care about every delta, including ones that do not touch
//! the snapshot, get a `broadcast` channel.

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use rovac_core::codec::StatusDelta;
use rovac_core::state::DeviceState;

use crate::error::{BridgeError, BridgeResult};
use crate::session::SessionEvent;

/// Capacity of the per-delta broadcast channel. Slow subscribers lag and
/// lose old deltas rather than stalling the aggregator.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Aggregator Handle
// =============================================================================

/// Commands for the aggregator.
#[derive(Debug)]
enum AggregatorCommand {
    /// Shutdown the aggregator.
    Shutdown,
}

/// Handle for reading aggregated state and controlling the aggregator.
#[derive(Clone)]
pub struct AggregatorHandle {
    /// Command sender.
    cmd_tx: mpsc::Sender<AggregatorCommand>,

    /// Latest snapshot.
    state_rx: watch::Receiver<DeviceState>,

    /// Per-delta stream. Held here so late subscribers can still attach.
    event_tx: broadcast::Sender<StatusDelta>,
}

impl AggregatorHandle {
    /// Returns a receiver that always holds the latest snapshot.
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state_rx.clone()
    }

    /// Returns a receiver of every decoded delta, in arrival order.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StatusDelta> {
        self.event_tx.subscribe()
    }

    /// Returns the current snapshot.
    pub fn current_state(&self) -> DeviceState {
        self.state_rx.borrow().clone()
    }

    /// Shuts down the aggregator.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.cmd_tx
            .send(AggregatorCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::ChannelError("Aggregator channel closed".into()))
    }
}

// =============================================================================
// State Aggregator
// =============================================================================

/// Owns the device state and folds session events into it.
pub struct StateAggregator {
    state: DeviceState,
    state_tx: watch::Sender<DeviceState>,
    event_tx: broadcast::Sender<StatusDelta>,
}

impl StateAggregator {
    /// Spawns the aggregator over a session event stream.
    pub fn spawn(session_rx: mpsc::Receiver<SessionEvent>) -> AggregatorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(DeviceState::default());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let aggregator = StateAggregator {
            state: DeviceState::default(),
            state_tx,
            event_tx: event_tx.clone(),
        };

        tokio::spawn(aggregator.run(session_rx, cmd_rx));

        AggregatorHandle {
            cmd_tx,
            state_rx,
            event_tx,
        }
    }

    /// Main aggregator loop.
    async fn run(
        mut self,
        mut session_rx: mpsc::Receiver<SessionEvent>,
        mut cmd_rx: mpsc::Receiver<AggregatorCommand>,
    ) {
        info!("State aggregator started");

        loop {
            tokio::select! {
                event = session_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            // Session task is gone; nothing more to fold
                            warn!("Session event stream closed");
                            break;
                        }
                    }
                }
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        AggregatorCommand::Shutdown => {
                            info!("State aggregator shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Folds one session event into the snapshot.
    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Online => {
                debug!("Session online");
                self.state.mqtt_connected = true;
                self.publish_snapshot();
            }
            SessionEvent::Offline => {
                // Connectivity flips; the last known telemetry stays visible
                debug!("Session offline");
                self.state.mqtt_connected = false;
                self.publish_snapshot();
            }
            SessionEvent::Delta(delta) => {
                let changed = self.state.apply(&delta);
                debug!(kind = delta.kind(), changed, "Applied status delta");

                // Every delta reaches event subscribers, even ones that do
                // not touch the snapshot (system events, unrecognized codes)
                let _ = self.event_tx.send(delta);

                // One snapshot publication per applied delta, changed or not
                self.publish_snapshot();
            }
        }
    }

    fn publish_snapshot(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }
}
