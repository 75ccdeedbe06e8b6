// src/config.rs
//! Stack configuration passed into encode operations
//!
//! The host application configures the codec through an immutable value
//! rather than process-wide state, so two stacks in the same process can
//! encode with different settings.

use serde::{Deserialize, Serialize};

/// Codec configuration (`stack.software`, `stack.always_sign`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// `stack.software`: value of the SOFTWARE attribute to add to every
    /// outgoing message that does not already carry one.
    pub software: Option<String>,

    /// `stack.always_sign`: append a FINGERPRINT attribute to every
    /// outgoing message that does not already carry one.
    pub always_sign: bool,

    /// RFC 3489 compatibility. Off by default; when enabled, encoding
    /// additionally verifies that every mandatory attribute for the
    /// message type is present. Classic STUN behavior beyond that
    /// (16-byte transaction ids included) stays unimplemented.
    pub rfc3489_compat: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            software: None,
            always_sign: false,
            rfc3489_compat: false,
        }
    }
}

impl StackConfig {
    /// Configuration with a SOFTWARE attribute value
    pub fn with_software(software: impl Into<String>) -> Self {
        Self {
            software: Some(software.into()),
            ..Self::default()
        }
    }
}
