// src/stun/mod.rs
//! STUN/TURN message codec (RFC 5389, RFC 5766)
//!
//! The codec is byte-level and synchronous: it turns typed messages into
//! wire images and back, and never touches a socket. Sending, receiving
//! and retransmission timing belong to the host application.

pub mod attribute;
pub mod auth;
pub mod message;

pub use attribute::{error_code, Attribute, AttributeType, Integrity, Presentity};
pub use auth::CredentialKey;
pub use message::{
    Message, MessageClass, TransactionId, HEADER_LENGTH, MAGIC_COOKIE,
    TRANSACTION_ID_LENGTH,
};
