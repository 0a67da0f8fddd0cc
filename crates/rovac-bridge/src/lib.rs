//! # rovac-bridge: Cloud + MQTT Engine for the Vacuum Bridge
//!
//! Connects a cloud-paired robot vacuum to local consumers: it
//! authenticates against the vendor cloud, holds an MQTT session to the
//! robot's topics, and aggregates the status stream into one queryable
//! snapshot.
//!
//! ## Component Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           rovac-bridge                                  │
//! │                                                                         │
//! │  ┌───────────┐   tokens    ┌───────────┐  SessionEvent  ┌───────────┐  │
//! │  │   auth    │◄───────────►│  session  │───────────────►│aggregator │  │
//! │  │  Token    │             │  MQTT +   │                │  Device   │  │
//! │  │  Manager  │             │  backoff  │                │  State    │  │
//! │  └─────┬─────┘             └─────▲─────┘                └─────▲─────┘  │
//! │        │ grants                  │ commands                   │ reads   │
//! │  ┌─────▼─────┐             ┌─────┴──────────────────────────────────┐  │
//! │  │   cloud   │             │                agent                   │  │
//! │  │  REST API │◄────────────│  orchestration + EntityAdapter fanout  │  │
//! │  └───────────┘  user/devs  └────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`] - [`BridgeAgent`] orchestrator and the [`EntityAdapter`] seam
//! - [`aggregator`] - Folds session events into [`DeviceState`] snapshots
//! - [`auth`] - OAuth token lifecycle ([`TokenManager`])
//! - [`cloud`] - Cloud REST client (token grants, user, device list)
//! - [`config`] - TOML + environment configuration
//! - [`error`] - [`BridgeError`] and retry categorization
//! - [`session`] - Reconnecting MQTT session
//!
//! [`DeviceState`]: rovac_core::DeviceState

pub mod agent;
pub mod aggregator;
pub mod auth;
pub mod cloud;
pub mod config;
pub mod error;
pub mod session;

pub use agent::{BridgeAgent, BridgeStatus, EntityAdapter, NoOpAdapter};
pub use aggregator::{AggregatorHandle, StateAggregator};
pub use auth::{Credential, TokenEndpoint, TokenGrant, TokenManager};
pub use cloud::{CloudApi, DeviceInfo};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use session::{ConnectionState, Session, SessionConfig, SessionEvent, SessionHandle};
