//! # Command Intents
//!
//! The fixed set of operations a caller can ask the robot to perform, and
//! their wire encodings. Every intent encodes to exactly one
//! [`FunctionMessage`]; there is no command that needs a multi-message
//! exchange.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::codec::FunctionMessage;
use crate::codes::{self, FanSpeed};

/// A high-level command, independent of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandIntent {
    /// Begin (or resume) a cleaning run.
    Start,
    /// Pause the current run in place.
    Pause,
    /// Stop the current run entirely.
    Stop,
    /// Drive back to the charging dock.
    ReturnToDock,
    /// Change the suction level.
    SetFanSpeed(FanSpeed),
    /// Clean a spot around the given map coordinate.
    SpotClean { x: f64, y: f64 },
}

impl CommandIntent {
    /// Encodes this intent as its wire message.
    ///
    /// Encodings are fixed:
    ///
    /// | Intent          | Wire form            |
    /// |-----------------|----------------------|
    /// | `Start`         | `{"f":24,"p":1}`     |
    /// | `Pause`         | `{"f":24,"p":2}`     |
    /// | `Stop`          | `{"f":35}`           |
    /// | `ReturnToDock`  | `{"f":36}`           |
    /// | `SetFanSpeed`   | `{"f":59,"p":level}` |
    /// | `SpotClean`     | `{"f":27,"p":{x,y}}` |
    pub fn encode(self) -> FunctionMessage {
        match self {
            CommandIntent::Start => FunctionMessage::with_param(codes::CMD_ACTION, json!(1)),
            CommandIntent::Pause => FunctionMessage::with_param(codes::CMD_ACTION, json!(2)),
            CommandIntent::Stop => FunctionMessage::new(codes::CMD_STOP),
            CommandIntent::ReturnToDock => FunctionMessage::new(codes::CMD_DOCK),
            CommandIntent::SetFanSpeed(speed) => {
                FunctionMessage::with_param(codes::CMD_SET_SWEEP_MODE, json!(speed.level()))
            }
            CommandIntent::SpotClean { x, y } => {
                FunctionMessage::with_param(codes::CMD_SPOT_CLEAN, json!({ "x": x, "y": y }))
            }
        }
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandIntent::Start => write!(f, "start"),
            CommandIntent::Pause => write!(f, "pause"),
            CommandIntent::Stop => write!(f, "stop"),
            CommandIntent::ReturnToDock => write!(f, "return_to_dock"),
            CommandIntent::SetFanSpeed(speed) => write!(f, "set_fan_speed({})", speed),
            CommandIntent::SpotClean { x, y } => write!(f, "spot_clean({:.2},{:.2})", x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(intent: CommandIntent) -> String {
        intent.encode().to_json().unwrap()
    }

    #[test]
    fn test_fixed_encodings() {
        assert_eq!(wire(CommandIntent::Start), r#"{"f":24,"p":1}"#);
        assert_eq!(wire(CommandIntent::Pause), r#"{"f":24,"p":2}"#);
        assert_eq!(wire(CommandIntent::Stop), r#"{"f":35}"#);
        assert_eq!(wire(CommandIntent::ReturnToDock), r#"{"f":36}"#);
    }

    #[test]
    fn test_fan_speed_encoding() {
        assert_eq!(
            wire(CommandIntent::SetFanSpeed(FanSpeed::High)),
            r#"{"f":59,"p":2}"#
        );
        assert_eq!(
            wire(CommandIntent::SetFanSpeed(FanSpeed::Normal)),
            r#"{"f":59,"p":0}"#
        );
        assert_eq!(
            wire(CommandIntent::SetFanSpeed(FanSpeed::Full)),
            r#"{"f":59,"p":3}"#
        );
    }

    #[test]
    fn test_spot_clean_encoding() {
        let msg = CommandIntent::SpotClean { x: 1.5, y: -2.0 }.encode();
        assert_eq!(msg.f, codes::CMD_SPOT_CLEAN);
        let p = msg.p.unwrap();
        assert_eq!(p["x"], json!(1.5));
        assert_eq!(p["y"], json!(-2.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(CommandIntent::Start.to_string(), "start");
        assert_eq!(
            CommandIntent::SetFanSpeed(FanSpeed::Silence).to_string(),
            "set_fan_speed(Silence)"
        );
    }
}
