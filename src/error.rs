// src/error.rs
//! Error types for the STUN codec and the ICE candidate model

use thiserror::Error;

/// Result type used throughout the crate
pub type StackResult<T> = Result<T, StackError>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum StackError {
    /// STUN codec errors
    #[error("STUN error: {0}")]
    Stun(#[from] StunError),

    /// ICE component errors
    #[error("ICE error: {0}")]
    Ice(#[from] IceError),
}

/// STUN codec error types
#[derive(Error, Debug)]
pub enum StunError {
    /// The wire image could not be parsed: truncated buffer, length
    /// mismatch, bad fingerprint.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The attribute is not applicable to the message type it was added to.
    #[error("the attribute {attribute} is not allowed in a {message}")]
    IllegalAttribute {
        attribute: String,
        message: String,
    },

    /// A mandatory attribute for the message type is missing at encode time.
    #[error("a mandatory attribute ({0}) is missing")]
    InvalidState(String),

    /// A caller-supplied value is out of range (e.g. a transaction id that
    /// is not 12 bytes).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown comprehension-required attributes were found while decoding.
    #[error("unknown comprehension-required attributes: {0:?}")]
    UnknownAttributes(Vec<u16>),
}

/// ICE component error types
#[derive(Error, Debug)]
pub enum IceError {
    /// Component ids are positive integers between 1 and 256.
    #[error("component id {0} is outside [1, 256]")]
    InvalidComponentId(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let stun_err = StunError::Malformed("message len < 20".to_string());
        let err: StackError = stun_err.into();

        match err {
            StackError::Stun(StunError::Malformed(reason)) => {
                assert_eq!(reason, "message len < 20");
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = StunError::IllegalAttribute {
            attribute: "DATA".to_string(),
            message: "BINDING-REQUEST".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "the attribute DATA is not allowed in a BINDING-REQUEST"
        );
    }
}
