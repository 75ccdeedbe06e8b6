// src/lib.rs
//! STUN/TURN message codec and ICE candidate model for NAT traversal
//! endpoints.
//!
//! Two tightly coupled subsystems make up the crate:
//!
//! - [`stun`]: a bit-exact codec for the TLV-framed STUN/TURN wire
//!   protocol, including attribute padding, magic cookie handling,
//!   FINGERPRINT CRCs, MESSAGE-INTEGRITY HMACs and per-message-type
//!   attribute validity.
//! - [`ice`]: the candidate model for a media-stream [`Component`]:
//!   thread-safe storage, prioritization, redundancy elimination and
//!   default selection for the candidates of one transport flow.
//!
//! Network I/O, candidate harvesting and the connectivity-check state
//! machine are the host application's business; the two subsystems meet
//! only in the ICE attributes (PRIORITY, ICE-CONTROLLING, ICE-CONTROLLED,
//! USE-CANDIDATE) that connectivity-check messages carry.

pub mod config;
pub mod error;
pub mod ice;
pub mod stun;

pub use config::StackConfig;
pub use error::{IceError, StackError, StackResult, StunError};
pub use ice::{
    Candidate, CandidateSocket, CandidateType, Component, LocalCandidate, StreamId,
    Transport, TransportAddress,
};
pub use stun::{
    Attribute, AttributeType, CredentialKey, Integrity, Message, MessageClass, Presentity,
    TransactionId,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the logging system
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
