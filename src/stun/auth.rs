// src/stun/auth.rs
//! Credential keys and the digests computed over message bytes
//!
//! MESSAGE-INTEGRITY carries an HMAC-SHA1 under a short-term or long-term
//! credential key; FINGERPRINT carries a CRC32 of the message XOR'd with
//! the STUN magic value.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;

use crate::error::{StackResult, StunError};

/// XOR'd into the CRC32 so STUN packets can be told apart from other
/// protocols sharing the socket.
const FINGERPRINT_XOR: u32 = 0x5354_554E;

/// Key under which MESSAGE-INTEGRITY digests are computed
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialKey(Vec<u8>);

impl CredentialKey {
    /// Short-term credential key: the password bytes themselves
    /// (RFC 5389 Section 15.4).
    pub fn short_term(password: &str) -> Self {
        Self(password.as_bytes().to_vec())
    }

    /// Long-term credential key:
    /// `MD5(username ":" realm ":" password)` (RFC 5389 Section 15.4).
    pub fn long_term(username: &str, realm: &str, password: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update([username, realm, password].join(":"));
        Self(hasher.finalize().to_vec())
    }

    /// Raw key material
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialKey({} bytes)", self.0.len())
    }
}

/// HMAC-SHA1 digest over a sequence of byte slices.
///
/// Callers pass the message prefix in pieces so the header length field
/// can be substituted without copying the whole buffer.
pub fn hmac_sha1(key: &[u8], chunks: &[&[u8]]) -> StackResult<[u8; 20]> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|_| StunError::InvalidArgument("invalid HMAC key".to_string()))?;

    for chunk in chunks {
        mac.update(chunk);
    }

    Ok(mac.finalize().into_bytes().into())
}

/// CRC32 fingerprint over a sequence of byte slices
pub fn fingerprint(chunks: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk);
    }

    hasher.finalize() ^ FINGERPRINT_XOR
}
