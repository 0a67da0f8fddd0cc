//! # Bridge Error Types
//!
//! Error types for cloud and MQTT operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Cloud         │  │     Session             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  AuthFailed     │  │  Connection             │ │
//! │  │  MissingDevice  │  │  CloudApi       │  │  NotConnected           │ │
//! │  │  ConfigLoad/Save│  │  DeviceNotFound │  │  Timeout                │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Protocol errors from rovac-core fold in via #[from].                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rovac_core::ProtocolError;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error type covering cloud, session, and configuration failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum BridgeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No device ID configured and none could be discovered.
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Cloud Errors
    // =========================================================================
    /// Authentication against the cloud failed (bad credentials, revoked
    /// refresh token, or an OAuth error response).
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// A cloud REST call failed with a non-auth error.
    #[error("Cloud API error: {0}")]
    CloudApi(String),

    /// The cloud returned an unexpected status code.
    #[error("Cloud API returned HTTP {status}: {body}")]
    CloudStatus { status: u16, body: String },

    /// The configured device does not appear in the account's device list.
    #[error("Device {0} not found in cloud account")]
    DeviceNotFound(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Failed to establish or hold the MQTT connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A publish was attempted while the session was down.
    #[error("Not connected to the MQTT broker")]
    NotConnected,

    /// An operation timed out.
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// A message could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Failed to serialize an outgoing message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed (the peer task is gone).
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The agent is shutting down.
    #[error("Bridge is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(0)
        } else if err.is_connect() {
            BridgeError::Connection(err.to_string())
        } else {
            BridgeError::CloudApi(err.to_string())
        }
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        BridgeError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl BridgeError {
    /// Returns true if this error is recoverable and the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures (network issues)
    /// - Timeouts
    /// - 5xx cloud responses
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Authentication rejections
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Connection(_) | BridgeError::Timeout(_) => true,
            BridgeError::CloudStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error means credentials should be invalidated.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BridgeError::AuthFailed(_))
            || matches!(self, BridgeError::CloudStatus { status: 401, .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidConfig(_)
                | BridgeError::MissingDeviceId
                | BridgeError::ConfigLoadFailed(_)
                | BridgeError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BridgeError::Connection("network error".into()).is_retryable());
        assert!(BridgeError::Timeout(30).is_retryable());
        assert!(BridgeError::CloudStatus {
            status: 503,
            body: "unavailable".into()
        }
        .is_retryable());

        assert!(!BridgeError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!BridgeError::AuthFailed("rejected".into()).is_retryable());
        assert!(!BridgeError::CloudStatus {
            status: 404,
            body: "not found".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_auth_errors() {
        assert!(BridgeError::AuthFailed("bad password".into()).is_auth_error());
        assert!(BridgeError::CloudStatus {
            status: 401,
            body: "unauthorized".into()
        }
        .is_auth_error());
        assert!(!BridgeError::NotConnected.is_auth_error());
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: BridgeError = ProtocolError::MissingFunctionCode.into();
        assert!(err.to_string().contains("function code"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::DeviceNotFound("vac-042".into());
        assert!(err.to_string().contains("vac-042"));
        assert_eq!(
            BridgeError::NotConnected.to_string(),
            "Not connected to the MQTT broker"
        );
    }
}
