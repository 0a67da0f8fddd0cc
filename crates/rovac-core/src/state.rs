//! # Device State Snapshot
//!
//! The aggregated view of the robot, built by folding [`StatusDelta`]s into
//! a [`DeviceState`]. The fold is pure: the aggregator task in the bridge
//! crate owns the single mutable copy and everyone else sees cloned
//! snapshots, so there is no field-level locking anywhere.
//!
//! Every field except `mqtt_connected` is an `Option`: until the robot has
//! reported a value, the bridge does not pretend to know it.

use serde::{Deserialize, Serialize};

use crate::codec::StatusDelta;
use crate::codes::{ActionCode, DeviceMode, FanSpeed};

/// The robot's pose on its map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    /// Heading in radians.
    pub yaw: f64,
}

/// Where the charging dock sits on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DockPose {
    pub x: f64,
    pub y: f64,
}

/// The Wi-Fi network the robot reports being on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// The latest known value of everything the robot has reported.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// Whether the MQTT session is currently up. Maintained by the session,
    /// not by any status delta.
    pub mqtt_connected: bool,

    pub battery_percent: Option<u8>,
    pub charging: Option<bool>,
    pub dc_connected: Option<bool>,
    pub position: Option<Position>,
    pub dock_position: Option<DockPose>,
    pub action: Option<ActionCode>,
    /// Free-form action label, when the firmware supplies one.
    pub action_name: Option<String>,
    pub board_temperature: Option<f64>,
    pub device_mode: Option<DeviceMode>,
    pub sweep_mode: Option<FanSpeed>,
    pub sweep_time_seconds: Option<u32>,
    pub wifi: Option<WifiInfo>,
}

impl DeviceState {
    /// Folds one delta into the snapshot.
    ///
    /// Only the field the delta addresses changes; everything else keeps its
    /// previous value. Returns whether the snapshot changed at all.
    pub fn apply(&mut self, delta: &StatusDelta) -> bool {
        let before = self.clone();
        match delta {
            StatusDelta::Position(pose) => self.position = Some(*pose),
            StatusDelta::Action { code, name } => {
                self.action = Some(*code);
                if name.is_some() {
                    self.action_name = name.clone();
                }
            }
            StatusDelta::Battery(percent) => self.battery_percent = Some(*percent),
            StatusDelta::Charging(on) => self.charging = Some(*on),
            StatusDelta::DcConnected(on) => self.dc_connected = Some(*on),
            StatusDelta::BoardTemperature(celsius) => self.board_temperature = Some(*celsius),
            StatusDelta::SweepTime(seconds) => self.sweep_time_seconds = Some(*seconds),
            StatusDelta::DockPose(pose) => self.dock_position = Some(*pose),
            StatusDelta::Network(wifi) => self.wifi = Some(wifi.clone()),
            StatusDelta::SweepMode(speed) => self.sweep_mode = Some(*speed),
            StatusDelta::DeviceMode(mode) => self.device_mode = Some(*mode),
            // System events and unrecognized codes are forwarded to listeners
            // but do not touch the snapshot.
            StatusDelta::SystemEvent(_) | StatusDelta::Unrecognized { .. } => {}
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_touches_only_addressed_field() {
        let mut state = DeviceState {
            battery_percent: Some(50),
            charging: Some(false),
            ..Default::default()
        };

        assert!(state.apply(&StatusDelta::Battery(51)));
        assert_eq!(state.battery_percent, Some(51));
        // Untouched fields keep their values
        assert_eq!(state.charging, Some(false));
        assert!(state.position.is_none());
    }

    #[test]
    fn test_apply_reports_no_change() {
        let mut state = DeviceState::default();
        assert!(state.apply(&StatusDelta::Charging(true)));
        // Same value again: no change
        assert!(!state.apply(&StatusDelta::Charging(true)));
    }

    #[test]
    fn test_unrecognized_leaves_snapshot_alone() {
        let mut state = DeviceState {
            battery_percent: Some(80),
            ..Default::default()
        };
        let untouched = state.clone();

        assert!(!state.apply(&StatusDelta::Unrecognized {
            code: 99,
            payload: json!("x"),
        }));
        assert!(!state.apply(&StatusDelta::SystemEvent(json!({"event": 7}))));
        assert_eq!(state, untouched);
    }

    #[test]
    fn test_action_name_persists_across_unnamed_updates() {
        let mut state = DeviceState::default();
        state.apply(&StatusDelta::Action {
            code: ActionCode::Sweeping,
            name: Some("Sweeping".into()),
        });
        // A follow-up without a name keeps the last label
        state.apply(&StatusDelta::Action {
            code: ActionCode::Paused,
            name: None,
        });
        assert_eq!(state.action, Some(ActionCode::Paused));
        assert_eq!(state.action_name.as_deref(), Some("Sweeping"));
    }

    #[test]
    fn test_full_fold() {
        let mut state = DeviceState::default();
        let deltas = [
            StatusDelta::Battery(90),
            StatusDelta::Charging(false),
            StatusDelta::Position(Position {
                x: 1.0,
                y: 2.0,
                yaw: 0.0,
            }),
            StatusDelta::SweepMode(FanSpeed::High),
            StatusDelta::DeviceMode(DeviceMode::Sweep),
        ];
        for delta in &deltas {
            state.apply(delta);
        }

        assert_eq!(state.battery_percent, Some(90));
        assert_eq!(state.charging, Some(false));
        assert_eq!(state.position.map(|p| p.x), Some(1.0));
        assert_eq!(state.sweep_mode, Some(FanSpeed::High));
        assert_eq!(state.device_mode, Some(DeviceMode::Sweep));
        assert!(!state.mqtt_connected);
    }
}
