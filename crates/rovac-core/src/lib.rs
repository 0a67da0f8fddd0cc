//! # rovac-core: Pure Protocol Logic for the Vacuum Bridge
//!
//! This crate pins down the robot's function-code wire protocol as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        rovac Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Entity Layer (external collaborator)             │   │
//! │  │        subscribe_state ──► send_command ──► current_state       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 rovac-bridge (Tokio engine)                     │   │
//! │  │       Token manager, MQTT session, State aggregator             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rovac-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   codes   │  │   codec   │  │  command  │  │   state   │  │   │
//! │  │   │ fn codes  │  │ encode /  │  │  Command  │  │  Device   │  │   │
//! │  │   │ FanSpeed  │  │  decode   │  │  Intent   │  │  State    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO MQTT • PURE FUNCTIONS               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Wire Protocol
//!
//! Every message, in either direction, is one JSON object tagged with an
//! integer function code:
//!
//! ```json
//! { "f": 24, "p": 1 }
//! ```
//!
//! Commands go to `device/{device_id}/robot`; status updates arrive on
//! `device/{device_id}/app`. The parameter `p` is optional and its shape
//! depends entirely on `f`.
//!
//! ## Modules
//!
//! - [`codes`] - Function-code constants, fan speeds, action codes, topics
//! - [`codec`] - Wire struct, status decoding, session housekeeping messages
//! - [`command`] - [`CommandIntent`] and its fixed encodings
//! - [`state`] - [`DeviceState`] snapshot and the delta fold
//! - [`error`] - Protocol error types

pub mod codec;
pub mod codes;
pub mod command;
pub mod error;
pub mod state;

pub use codec::{decode, FunctionMessage, StatusDelta};
pub use codes::{ActionCode, DeviceMode, FanSpeed};
pub use command::CommandIntent;
pub use error::ProtocolError;
pub use state::{DeviceState, DockPose, Position, WifiInfo};
