//! # Function Codes and Protocol Enums
//!
//! The integer tags the robot speaks, plus the small enums layered on top of
//! them (fan speed levels, action codes, sweep/mop mode) and the MQTT topic
//! scheme.
//!
//! Codes were captured from the vendor app's traffic; the ones this crate
//! does not decode yet (maps, firmware updates, virtual walls) are still
//! listed so the table stays a complete protocol reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

// =============================================================================
// Function Codes: App → Robot
// =============================================================================

pub const CMD_JOYSTICK: i64 = 20;
/// p=1: start sweep, p=2: pause
pub const CMD_ACTION: i64 = 24;
pub const CMD_GET_SWEEP_MODE: i64 = 25;
pub const CMD_GET_STATUS: i64 = 26;
/// p: `{"x": float, "y": float}`
pub const CMD_SPOT_CLEAN: i64 = 27;
/// p: `{"x": float, "y": float}`
pub const CMD_MOVE_TO: i64 = 28;
pub const CMD_SET_VIRTUAL_WALL: i64 = 29;
pub const CMD_GET_MAP: i64 = 33;
pub const CMD_GET_BATTERY: i64 = 34;
pub const CMD_STOP: i64 = 35;
/// Return to charging dock
pub const CMD_DOCK: i64 = 36;
/// Subscribe to real-time data push
pub const CMD_START_UPDATE: i64 = 40;
pub const CMD_STOP_UPDATE: i64 = 41;
pub const CMD_GET_INFO: i64 = 42;
/// p: 0=normal, 1=silence, 2=high, 3=full
pub const CMD_SET_SWEEP_MODE: i64 = 59;
/// p: true/false
pub const CMD_CHILD_LOCK: i64 = 61;
pub const CMD_GET_DEVICE_INFO: i64 = 62;
pub const CMD_GET_NETWORK: i64 = 77;

// =============================================================================
// Function Codes: Robot → App
// =============================================================================

pub const RESP_POSE: i64 = 1;
pub const RESP_CURRENT_ACTION: i64 = 2;
pub const RESP_BATTERY: i64 = 3;
pub const RESP_CHARGING: i64 = 4;
pub const RESP_DC_CONNECTED: i64 = 5;
pub const RESP_TEMPERATURE: i64 = 6;
pub const RESP_EXPLORE_MAP: i64 = 7;
pub const RESP_SWEEP_MAP: i64 = 8;
pub const RESP_VIRTUAL_WALL: i64 = 9;
pub const RESP_SWEEP_TIME: i64 = 12;
pub const RESP_FW_PROCESS: i64 = 13;
pub const RESP_FW_INFO: i64 = 14;
pub const RESP_DOCK_POSE: i64 = 22;
pub const RESP_NETWORK_INFO: i64 = 24;
pub const RESP_SWEEP_MODE: i64 = 25;
pub const RESP_SWEEP_MOP_MODE: i64 = 32;
pub const RESP_SYSTEM_EVENT: i64 = 50;

// =============================================================================
// MQTT Topics
// =============================================================================

/// Topic the bridge publishes commands to.
pub fn command_topic(device_id: &str) -> String {
    format!("device/{}/robot", device_id)
}

/// Topic the robot publishes status updates to.
pub fn status_topic(device_id: &str) -> String {
    format!("device/{}/app", device_id)
}

// =============================================================================
// Fan Speed (Sweep Mode)
// =============================================================================

/// Suction level, as understood by function code 59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanSpeed {
    #[default]
    Normal,
    Silence,
    High,
    Full,
}

impl FanSpeed {
    /// Returns the wire-level integer for this speed.
    pub fn level(self) -> i64 {
        match self {
            FanSpeed::Normal => 0,
            FanSpeed::Silence => 1,
            FanSpeed::High => 2,
            FanSpeed::Full => 3,
        }
    }

    /// Maps a wire-level integer back to a speed, if it is a known level.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(FanSpeed::Normal),
            1 => Some(FanSpeed::Silence),
            2 => Some(FanSpeed::High),
            3 => Some(FanSpeed::Full),
            _ => None,
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanSpeed::Normal => write!(f, "Normal"),
            FanSpeed::Silence => write!(f, "Silence"),
            FanSpeed::High => write!(f, "High"),
            FanSpeed::Full => write!(f, "Full"),
        }
    }
}

impl FromStr for FanSpeed {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(FanSpeed::Normal),
            "silence" | "silent" => Ok(FanSpeed::Silence),
            "high" => Ok(FanSpeed::High),
            "full" | "max" => Ok(FanSpeed::Full),
            other => Err(ProtocolError::MalformedPayload(format!(
                "unknown fan speed: '{}'. Valid options: normal, silence, high, full",
                other
            ))),
        }
    }
}

// =============================================================================
// Action Codes
// =============================================================================

/// What the robot reports it is currently doing (function code 2, field `an`).
///
/// The firmware's full enumeration is not published; codes outside the known
/// set are carried through as [`ActionCode::Other`] rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCode {
    Idle,
    Sweeping,
    GoingHome,
    Charging,
    Exploring,
    Stuck,
    Paused,
    /// An action code the known table does not cover; the raw value is kept.
    Other(i64),
}

impl ActionCode {
    /// Maps a wire-level action code to a variant.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ActionCode::Idle,
            1 => ActionCode::Sweeping,
            2 => ActionCode::GoingHome,
            3 => ActionCode::Charging,
            4 => ActionCode::Exploring,
            5 => ActionCode::Stuck,
            6 => ActionCode::Paused,
            other => ActionCode::Other(other),
        }
    }

    /// Returns the wire-level integer for this action.
    pub fn code(self) -> i64 {
        match self {
            ActionCode::Idle => 0,
            ActionCode::Sweeping => 1,
            ActionCode::GoingHome => 2,
            ActionCode::Charging => 3,
            ActionCode::Exploring => 4,
            ActionCode::Stuck => 5,
            ActionCode::Paused => 6,
            ActionCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCode::Idle => write!(f, "idle"),
            ActionCode::Sweeping => write!(f, "sweeping"),
            ActionCode::GoingHome => write!(f, "going_home"),
            ActionCode::Charging => write!(f, "charging"),
            ActionCode::Exploring => write!(f, "exploring"),
            ActionCode::Stuck => write!(f, "stuck"),
            ActionCode::Paused => write!(f, "paused"),
            ActionCode::Other(code) => write!(f, "action_{}", code),
        }
    }
}

// =============================================================================
// Device Mode (Sweep / Mop)
// =============================================================================

/// Whether the robot is configured to sweep or mop (function code 32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Sweep,
    Mop,
    /// A mode the known table does not cover; the raw value is kept.
    Other(i64),
}

impl DeviceMode {
    /// Maps a wire-level mode to a variant.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => DeviceMode::Sweep,
            1 => DeviceMode::Mop,
            other => DeviceMode::Other(other),
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Sweep => write!(f, "sweep"),
            DeviceMode::Mop => write!(f, "mop"),
            DeviceMode::Other(code) => write!(f, "mode_{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(command_topic("abc-123"), "device/abc-123/robot");
        assert_eq!(status_topic("abc-123"), "device/abc-123/app");
    }

    #[test]
    fn test_fan_speed_levels() {
        assert_eq!(FanSpeed::Normal.level(), 0);
        assert_eq!(FanSpeed::Silence.level(), 1);
        assert_eq!(FanSpeed::High.level(), 2);
        assert_eq!(FanSpeed::Full.level(), 3);

        for level in 0..=3 {
            let speed = FanSpeed::from_level(level).unwrap();
            assert_eq!(speed.level(), level);
        }
        assert!(FanSpeed::from_level(4).is_none());
        assert!(FanSpeed::from_level(-1).is_none());
    }

    #[test]
    fn test_fan_speed_parsing() {
        assert_eq!("normal".parse::<FanSpeed>().unwrap(), FanSpeed::Normal);
        assert_eq!("Silence".parse::<FanSpeed>().unwrap(), FanSpeed::Silence);
        assert_eq!("HIGH".parse::<FanSpeed>().unwrap(), FanSpeed::High);
        assert_eq!("max".parse::<FanSpeed>().unwrap(), FanSpeed::Full);
        assert!("turbo".parse::<FanSpeed>().is_err());
    }

    #[test]
    fn test_action_code_round_trip() {
        for code in 0..=6 {
            assert_eq!(ActionCode::from_code(code).code(), code);
        }
        assert_eq!(ActionCode::from_code(42), ActionCode::Other(42));
        assert_eq!(ActionCode::Other(42).code(), 42);
    }

    #[test]
    fn test_action_code_display() {
        assert_eq!(ActionCode::Sweeping.to_string(), "sweeping");
        assert_eq!(ActionCode::GoingHome.to_string(), "going_home");
        assert_eq!(ActionCode::Other(99).to_string(), "action_99");
    }

    #[test]
    fn test_device_mode() {
        assert_eq!(DeviceMode::from_code(0), DeviceMode::Sweep);
        assert_eq!(DeviceMode::from_code(1), DeviceMode::Mop);
        assert_eq!(DeviceMode::from_code(7), DeviceMode::Other(7));
    }
}
