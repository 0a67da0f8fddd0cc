//! # Protocol Error Types
//!
//! A decode failure never carries more blame than the single message that
//! caused it: the session logs it and moves on.

use thiserror::Error;

/// Errors raised while decoding a function-code message.
///
/// Only structural problems are errors: unparseable JSON or a missing/
/// non-integer `f` tag. A *recognized* code with an unexpected parameter
/// shape is not an error - it degrades to [`StatusDelta::Unrecognized`]
/// to tolerate firmware variance.
///
/// [`StatusDelta::Unrecognized`]: crate::codec::StatusDelta::Unrecognized
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The JSON parsed, but the `f` tag is absent or not an integer.
    #[error("missing or non-integer function code")]
    MissingFunctionCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::MalformedPayload("unexpected end of input".into());
        assert!(err.to_string().contains("malformed payload"));
        assert_eq!(
            ProtocolError::MissingFunctionCode.to_string(),
            "missing or non-integer function code"
        );
    }
}
