//! # Function-Code Codec
//!
//! Encoding and decoding of the robot's JSON wire messages.
//!
//! ## Decode Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Status Decode Pipeline                          │
//! │                                                                         │
//! │   raw MQTT payload                                                      │
//! │        │                                                                │
//! │        ▼ serde_json parse          ──fail──► ProtocolError::Malformed   │
//! │   JSON value                                                            │
//! │        │                                                                │
//! │        ▼ read integer "f" tag      ──fail──► ProtocolError::MissingF..  │
//! │   (code, param)                                                         │
//! │        │                                                                │
//! │        ▼ DECODERS lookup table                                          │
//! │   ┌──────────────┬───────────────────────────────────────────────┐     │
//! │   │ known code   │ per-code decoder                              │     │
//! │   │              │   shape ok   ──► typed StatusDelta            │     │
//! │   │              │   shape bad  ──► StatusDelta::Unrecognized    │     │
//! │   ├──────────────┼───────────────────────────────────────────────┤     │
//! │   │ unknown code │ StatusDelta::Unrecognized (never dropped)     │     │
//! │   └──────────────┴───────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The dispatch is a lookup table of `(code, decoder fn)` pairs rather than a
//! conditional chain, so adding a code is one new row plus one new function.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::codes::{self, ActionCode, DeviceMode, FanSpeed};
use crate::error::ProtocolError;
use crate::state::{DockPose, Position, WifiInfo};

// =============================================================================
// Wire Message
// =============================================================================

/// One function-code message, in either direction.
///
/// Serializes as `{"f": 24, "p": 1}`; `p` is omitted entirely when absent,
/// matching the vendor app's traffic byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMessage {
    /// The function code tag.
    pub f: i64,

    /// The parameter; shape depends on `f`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<Value>,
}

impl FunctionMessage {
    /// Creates a parameterless message.
    pub fn new(code: i64) -> Self {
        FunctionMessage { f: code, p: None }
    }

    /// Creates a message with a parameter.
    pub fn with_param(code: i64, param: Value) -> Self {
        FunctionMessage {
            f: code,
            p: Some(param),
        }
    }

    /// Serializes to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Session Housekeeping Messages
// =============================================================================

/// The real-time push subscription request sent after every (re)connect.
///
/// The flag set mirrors the vendor app: streaming telemetry on, bulky map
/// payloads off.
pub fn realtime_subscription() -> FunctionMessage {
    FunctionMessage::with_param(
        codes::CMD_START_UPDATE,
        json!({
            "pose": true,
            "currentAction": true,
            "batteryPercentage": true,
            "batteryCharging": true,
            "dcConnected": true,
            "boardTemperature": true,
            "exploreMap": false,
            "sweepMap": false,
            "virtualWall": false,
            "sweepTime": true,
            "sweepArea": true,
            "dockPose": true,
            "sweepingRegion": false,
        }),
    )
}

/// Tells the robot to stop pushing real-time updates (sent at shutdown).
pub fn stop_realtime() -> FunctionMessage {
    FunctionMessage::new(codes::CMD_STOP_UPDATE)
}

/// One-shot queries for data the real-time stream does not carry
/// (sweep mode, network info), issued on connect and on the periodic poll.
pub fn state_queries() -> Vec<FunctionMessage> {
    vec![
        FunctionMessage::new(codes::CMD_GET_BATTERY),
        FunctionMessage::new(codes::CMD_GET_STATUS),
        FunctionMessage::new(codes::CMD_GET_SWEEP_MODE),
        FunctionMessage::new(codes::CMD_GET_NETWORK),
    ]
}

// =============================================================================
// Status Deltas
// =============================================================================

/// A single decoded status update, tagged by function code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusDelta {
    /// Code 1: current pose.
    Position(Position),

    /// Code 2: current action.
    Action {
        code: ActionCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Code 3: battery percent (0-100).
    Battery(u8),

    /// Code 4: charging flag.
    Charging(bool),

    /// Code 5: DC power connected flag.
    DcConnected(bool),

    /// Code 6: main board temperature.
    BoardTemperature(f64),

    /// Code 12: accumulated sweep time in seconds.
    SweepTime(u32),

    /// Code 22: charging dock pose.
    DockPose(DockPose),

    /// Code 24: Wi-Fi network info.
    Network(WifiInfo),

    /// Code 25: current sweep mode (fan speed).
    SweepMode(FanSpeed),

    /// Code 32: sweep/mop device mode.
    DeviceMode(DeviceMode),

    /// Code 50: firmware system event, carried through verbatim.
    SystemEvent(Value),

    /// Any code the table does not recognize, or a recognized code whose
    /// parameter had an unexpected shape. Forwarded for diagnostic
    /// visibility, never dropped silently.
    Unrecognized { code: i64, payload: Value },
}

impl StatusDelta {
    /// Returns the delta kind as a string (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            StatusDelta::Position(_) => "position",
            StatusDelta::Action { .. } => "action",
            StatusDelta::Battery(_) => "battery",
            StatusDelta::Charging(_) => "charging",
            StatusDelta::DcConnected(_) => "dc_connected",
            StatusDelta::BoardTemperature(_) => "board_temperature",
            StatusDelta::SweepTime(_) => "sweep_time",
            StatusDelta::DockPose(_) => "dock_pose",
            StatusDelta::Network(_) => "network",
            StatusDelta::SweepMode(_) => "sweep_mode",
            StatusDelta::DeviceMode(_) => "device_mode",
            StatusDelta::SystemEvent(_) => "system_event",
            StatusDelta::Unrecognized { .. } => "unrecognized",
        }
    }
}

// =============================================================================
// Decode
// =============================================================================

/// A per-code decoder: returns `None` when the parameter shape is wrong,
/// which degrades the message to [`StatusDelta::Unrecognized`].
type Decoder = fn(&Value) -> Option<StatusDelta>;

/// The dispatch table from function code to decode strategy.
const DECODERS: &[(i64, Decoder)] = &[
    (codes::RESP_POSE, decode_pose),
    (codes::RESP_CURRENT_ACTION, decode_action),
    (codes::RESP_BATTERY, decode_battery),
    (codes::RESP_CHARGING, decode_charging),
    (codes::RESP_DC_CONNECTED, decode_dc_connected),
    (codes::RESP_TEMPERATURE, decode_temperature),
    (codes::RESP_SWEEP_TIME, decode_sweep_time),
    (codes::RESP_DOCK_POSE, decode_dock_pose),
    (codes::RESP_NETWORK_INFO, decode_network),
    (codes::RESP_SWEEP_MODE, decode_sweep_mode),
    (codes::RESP_SWEEP_MOP_MODE, decode_device_mode),
    (codes::RESP_SYSTEM_EVENT, decode_system_event),
];

/// Decodes one inbound status payload into a [`StatusDelta`].
///
/// Fails only when the JSON cannot be parsed or the `f` tag is missing or
/// non-integer. Everything else - unknown codes, recognized codes with
/// unexpected parameter shapes - decodes to [`StatusDelta::Unrecognized`].
pub fn decode(raw: &[u8]) -> Result<StatusDelta, ProtocolError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;

    let code = value
        .get("f")
        .and_then(Value::as_i64)
        .ok_or(ProtocolError::MissingFunctionCode)?;

    let param = value.get("p").cloned().unwrap_or(Value::Null);

    let delta = DECODERS
        .iter()
        .find(|(c, _)| *c == code)
        .and_then(|(_, decoder)| decoder(&param))
        .unwrap_or(StatusDelta::Unrecognized {
            code,
            payload: param,
        });

    Ok(delta)
}

fn decode_pose(param: &Value) -> Option<StatusDelta> {
    Some(StatusDelta::Position(Position {
        x: param.get("x")?.as_f64()?,
        y: param.get("y")?.as_f64()?,
        yaw: param.get("yaw")?.as_f64()?,
    }))
}

fn decode_action(param: &Value) -> Option<StatusDelta> {
    let code = param.get("an")?.as_i64()?;
    let name = param
        .get("actionName")
        .and_then(Value::as_str)
        .map(String::from);
    Some(StatusDelta::Action {
        code: ActionCode::from_code(code),
        name,
    })
}

fn decode_battery(param: &Value) -> Option<StatusDelta> {
    let percent = param.as_i64()?;
    if (0..=100).contains(&percent) {
        Some(StatusDelta::Battery(percent as u8))
    } else {
        None
    }
}

fn decode_charging(param: &Value) -> Option<StatusDelta> {
    decode_flag(param).map(StatusDelta::Charging)
}

fn decode_dc_connected(param: &Value) -> Option<StatusDelta> {
    decode_flag(param).map(StatusDelta::DcConnected)
}

/// Some firmware revisions send booleans, others 0/1 integers.
fn decode_flag(param: &Value) -> Option<bool> {
    param.as_bool().or_else(|| param.as_i64().map(|n| n != 0))
}

fn decode_temperature(param: &Value) -> Option<StatusDelta> {
    param.as_f64().map(StatusDelta::BoardTemperature)
}

fn decode_sweep_time(param: &Value) -> Option<StatusDelta> {
    let seconds = param.as_i64()?;
    u32::try_from(seconds).ok().map(StatusDelta::SweepTime)
}

fn decode_dock_pose(param: &Value) -> Option<StatusDelta> {
    Some(StatusDelta::DockPose(DockPose {
        x: param.get("x")?.as_f64()?,
        y: param.get("y")?.as_f64()?,
    }))
}

fn decode_network(param: &Value) -> Option<StatusDelta> {
    if !param.is_object() {
        return None;
    }
    Some(StatusDelta::Network(WifiInfo {
        ssid: param.get("ssid").and_then(Value::as_str).map(String::from),
        ip: param.get("ip").and_then(Value::as_str).map(String::from),
    }))
}

fn decode_sweep_mode(param: &Value) -> Option<StatusDelta> {
    param
        .as_i64()
        .and_then(FanSpeed::from_level)
        .map(StatusDelta::SweepMode)
}

fn decode_device_mode(param: &Value) -> Option<StatusDelta> {
    let mode = param.get("device_mode")?.as_i64()?;
    Some(StatusDelta::DeviceMode(DeviceMode::from_code(mode)))
}

fn decode_system_event(param: &Value) -> Option<StatusDelta> {
    Some(StatusDelta::SystemEvent(param.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_message_wire_form() {
        let msg = FunctionMessage::with_param(24, json!(1));
        assert_eq!(msg.to_json().unwrap(), r#"{"f":24,"p":1}"#);

        // No parameter: "p" must be absent, not null
        let msg = FunctionMessage::new(35);
        assert_eq!(msg.to_json().unwrap(), r#"{"f":35}"#);
    }

    #[test]
    fn test_decode_battery() {
        let delta = decode(br#"{"f":3,"p":85}"#).unwrap();
        assert_eq!(delta, StatusDelta::Battery(85));
    }

    #[test]
    fn test_decode_charging() {
        let delta = decode(br#"{"f":4,"p":true}"#).unwrap();
        assert_eq!(delta, StatusDelta::Charging(true));

        // Integer-flag firmware variant
        let delta = decode(br#"{"f":4,"p":1}"#).unwrap();
        assert_eq!(delta, StatusDelta::Charging(true));
        let delta = decode(br#"{"f":4,"p":0}"#).unwrap();
        assert_eq!(delta, StatusDelta::Charging(false));
    }

    #[test]
    fn test_decode_position() {
        let delta = decode(br#"{"f":1,"p":{"x":1.2,"y":3.4,"yaw":0.5}}"#).unwrap();
        assert_eq!(
            delta,
            StatusDelta::Position(Position {
                x: 1.2,
                y: 3.4,
                yaw: 0.5
            })
        );
    }

    #[test]
    fn test_decode_action() {
        let delta = decode(br#"{"f":2,"p":{"an":1}}"#).unwrap();
        assert_eq!(
            delta,
            StatusDelta::Action {
                code: ActionCode::Sweeping,
                name: None
            }
        );

        let delta = decode(br#"{"f":2,"p":{"an":42,"actionName":"Mystery"}}"#).unwrap();
        assert_eq!(
            delta,
            StatusDelta::Action {
                code: ActionCode::Other(42),
                name: Some("Mystery".into())
            }
        );
    }

    #[test]
    fn test_unknown_code_is_forwarded() {
        let delta = decode(br#"{"f":99,"p":"x"}"#).unwrap();
        assert_eq!(
            delta,
            StatusDelta::Unrecognized {
                code: 99,
                payload: json!("x")
            }
        );
    }

    #[test]
    fn test_wrong_shape_degrades_not_errors() {
        // Recognized code, parameter of the wrong shape: must degrade,
        // never raise
        let delta = decode(br#"{"f":1,"p":"not-a-pose"}"#).unwrap();
        assert!(matches!(delta, StatusDelta::Unrecognized { code: 1, .. }));

        // Battery out of range counts as wrong shape
        let delta = decode(br#"{"f":3,"p":250}"#).unwrap();
        assert!(matches!(delta, StatusDelta::Unrecognized { code: 3, .. }));

        // Action parameter that is not an object
        let delta = decode(br#"{"f":2,"p":7}"#).unwrap();
        assert!(matches!(delta, StatusDelta::Unrecognized { code: 2, .. }));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode(br#"{"p":85}"#),
            Err(ProtocolError::MissingFunctionCode)
        ));
        assert!(matches!(
            decode(br#"{"f":"three","p":85}"#),
            Err(ProtocolError::MissingFunctionCode)
        ));
    }

    #[test]
    fn test_decode_supplemental_codes() {
        assert_eq!(
            decode(br#"{"f":6,"p":41.5}"#).unwrap(),
            StatusDelta::BoardTemperature(41.5)
        );
        assert_eq!(
            decode(br#"{"f":12,"p":1800}"#).unwrap(),
            StatusDelta::SweepTime(1800)
        );
        assert_eq!(
            decode(br#"{"f":22,"p":{"x":0.1,"y":-0.2}}"#).unwrap(),
            StatusDelta::DockPose(DockPose { x: 0.1, y: -0.2 })
        );
        assert_eq!(
            decode(br#"{"f":24,"p":{"ssid":"home","ip":"10.0.0.7"}}"#).unwrap(),
            StatusDelta::Network(WifiInfo {
                ssid: Some("home".into()),
                ip: Some("10.0.0.7".into())
            })
        );
        assert_eq!(
            decode(br#"{"f":25,"p":2}"#).unwrap(),
            StatusDelta::SweepMode(FanSpeed::High)
        );
        assert_eq!(
            decode(br#"{"f":32,"p":{"device_mode":1}}"#).unwrap(),
            StatusDelta::DeviceMode(DeviceMode::Mop)
        );
        assert_eq!(
            decode(br#"{"f":5,"p":true}"#).unwrap(),
            StatusDelta::DcConnected(true)
        );
    }

    #[test]
    fn test_scalar_codes_round_trip() {
        // Battery and charging exist in both directions: a wire message
        // built from the value decodes back to the same value
        let wire = FunctionMessage::with_param(codes::RESP_BATTERY, json!(85))
            .to_json()
            .unwrap();
        assert_eq!(decode(wire.as_bytes()).unwrap(), StatusDelta::Battery(85));

        let wire = FunctionMessage::with_param(codes::RESP_CHARGING, json!(true))
            .to_json()
            .unwrap();
        assert_eq!(decode(wire.as_bytes()).unwrap(), StatusDelta::Charging(true));
    }

    #[test]
    fn test_housekeeping_messages() {
        let sub = realtime_subscription();
        assert_eq!(sub.f, codes::CMD_START_UPDATE);
        let flags = sub.p.unwrap();
        assert_eq!(flags["pose"], json!(true));
        assert_eq!(flags["exploreMap"], json!(false));

        assert_eq!(stop_realtime().to_json().unwrap(), r#"{"f":41}"#);

        let queries: Vec<i64> = state_queries().iter().map(|m| m.f).collect();
        assert_eq!(queries, vec![34, 26, 25, 77]);
    }
}
