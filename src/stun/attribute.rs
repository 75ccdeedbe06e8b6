// src/stun/attribute.rs
//! STUN/TURN/ICE attribute codec
//!
//! Attributes are TLV encoded: a 2-byte type, a 2-byte payload length and
//! the payload itself. The length field never counts the padding that
//! aligns the next attribute to a 4-byte boundary; the message layer owns
//! that padding.
//!
//! ```bash
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Type                  |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Value (variable)                    ....
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, BytesMut};

use crate::error::{StackResult, StunError};
use crate::stun::auth::CredentialKey;
use crate::stun::message::{TransactionId, MAGIC_COOKIE};

/// Attribute header size: type (2) + length (2)
pub const ATTRIBUTE_HEADER_LENGTH: usize = 4;

/// STUN attribute type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeType(pub u16);

impl AttributeType {
    // Comprehension-required range (0x0000-0x7FFF)
    pub const MAPPED_ADDRESS: AttributeType = AttributeType(0x0001);
    pub const RESPONSE_ADDRESS: AttributeType = AttributeType(0x0002);
    pub const CHANGE_REQUEST: AttributeType = AttributeType(0x0003);
    pub const SOURCE_ADDRESS: AttributeType = AttributeType(0x0004);
    pub const CHANGED_ADDRESS: AttributeType = AttributeType(0x0005);
    pub const USERNAME: AttributeType = AttributeType(0x0006);
    pub const PASSWORD: AttributeType = AttributeType(0x0007);
    pub const MESSAGE_INTEGRITY: AttributeType = AttributeType(0x0008);
    pub const ERROR_CODE: AttributeType = AttributeType(0x0009);
    pub const UNKNOWN_ATTRIBUTES: AttributeType = AttributeType(0x000A);
    pub const REFLECTED_FROM: AttributeType = AttributeType(0x000B);
    pub const CHANNEL_NUMBER: AttributeType = AttributeType(0x000C);
    pub const LIFETIME: AttributeType = AttributeType(0x000D);
    pub const XOR_PEER_ADDRESS: AttributeType = AttributeType(0x0012);
    pub const DATA: AttributeType = AttributeType(0x0013);
    pub const REALM: AttributeType = AttributeType(0x0014);
    pub const NONCE: AttributeType = AttributeType(0x0015);
    pub const XOR_RELAYED_ADDRESS: AttributeType = AttributeType(0x0016);
    pub const EVEN_PORT: AttributeType = AttributeType(0x0018);
    pub const REQUESTED_TRANSPORT: AttributeType = AttributeType(0x0019);
    pub const DONT_FRAGMENT: AttributeType = AttributeType(0x001A);
    pub const XOR_MAPPED_ADDRESS: AttributeType = AttributeType(0x0020);
    pub const XOR_ONLY: AttributeType = AttributeType(0x0021);
    pub const RESERVATION_TOKEN: AttributeType = AttributeType(0x0022);
    pub const PRIORITY: AttributeType = AttributeType(0x0024);
    pub const USE_CANDIDATE: AttributeType = AttributeType(0x0025);

    // Comprehension-optional range (0x8000-0xFFFF)
    pub const SOFTWARE: AttributeType = AttributeType(0x8022);
    pub const ALTERNATE_SERVER: AttributeType = AttributeType(0x8023);
    pub const FINGERPRINT: AttributeType = AttributeType(0x8028);
    pub const ICE_CONTROLLED: AttributeType = AttributeType(0x8029);
    pub const ICE_CONTROLLING: AttributeType = AttributeType(0x802A);

    /// Numeric type code
    pub fn value(self) -> u16 {
        self.0
    }

    /// Agents must reject messages carrying unknown attributes from this
    /// range (RFC 5389 Section 15).
    pub fn is_comprehension_required(self) -> bool {
        self.0 < 0x8000
    }

    /// RFC name of the attribute, or `None` for codes this stack does not
    /// know.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::MAPPED_ADDRESS => "MAPPED-ADDRESS",
            Self::RESPONSE_ADDRESS => "RESPONSE-ADDRESS",
            Self::CHANGE_REQUEST => "CHANGE-REQUEST",
            Self::SOURCE_ADDRESS => "SOURCE-ADDRESS",
            Self::CHANGED_ADDRESS => "CHANGED-ADDRESS",
            Self::USERNAME => "USERNAME",
            Self::PASSWORD => "PASSWORD",
            Self::MESSAGE_INTEGRITY => "MESSAGE-INTEGRITY",
            Self::ERROR_CODE => "ERROR-CODE",
            Self::UNKNOWN_ATTRIBUTES => "UNKNOWN-ATTRIBUTES",
            Self::REFLECTED_FROM => "REFLECTED-FROM",
            Self::CHANNEL_NUMBER => "CHANNEL-NUMBER",
            Self::LIFETIME => "LIFETIME",
            Self::XOR_PEER_ADDRESS => "XOR-PEER-ADDRESS",
            Self::DATA => "DATA",
            Self::REALM => "REALM",
            Self::NONCE => "NONCE",
            Self::XOR_RELAYED_ADDRESS => "XOR-RELAYED-ADDRESS",
            Self::EVEN_PORT => "EVEN-PORT",
            Self::REQUESTED_TRANSPORT => "REQUESTED-TRANSPORT",
            Self::DONT_FRAGMENT => "DONT-FRAGMENT",
            Self::XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
            Self::XOR_ONLY => "XOR-ONLY",
            Self::RESERVATION_TOKEN => "RESERVATION-TOKEN",
            Self::PRIORITY => "PRIORITY",
            Self::USE_CANDIDATE => "USE-CANDIDATE",
            Self::SOFTWARE => "SOFTWARE",
            Self::ALTERNATE_SERVER => "ALTERNATE-SERVER",
            Self::FINGERPRINT => "FINGERPRINT",
            Self::ICE_CONTROLLED => "ICE-CONTROLLED",
            Self::ICE_CONTROLLING => "ICE-CONTROLLING",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "UNKNOWN-{:04X}", self.0),
        }
    }
}

/// Standard ERROR-CODE values (RFC 5389 Section 15.6, RFC 5766 Section 15)
pub mod error_code {
    pub const TRY_ALTERNATE: u16 = 300;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const UNKNOWN_ATTRIBUTE: u16 = 420;
    pub const ALLOCATION_MISMATCH: u16 = 437;
    pub const STALE_NONCE: u16 = 438;
    pub const WRONG_CREDENTIALS: u16 = 441;
    pub const UNSUPPORTED_TRANSPORT_PROTOCOL: u16 = 442;
    pub const ALLOCATION_QUOTA_REACHED: u16 = 486;
    pub const SERVER_ERROR: u16 = 500;
    pub const INSUFFICIENT_CAPACITY: u16 = 508;

    /// Default reason phrase for a code
    pub fn default_reason(code: u16) -> &'static str {
        match code {
            TRY_ALTERNATE => "Try Alternate",
            BAD_REQUEST => "Bad Request",
            UNAUTHORIZED => "Unauthorized",
            FORBIDDEN => "Forbidden",
            UNKNOWN_ATTRIBUTE => "Unknown Attribute",
            ALLOCATION_MISMATCH => "Allocation Mismatch",
            STALE_NONCE => "Stale Nonce",
            WRONG_CREDENTIALS => "Wrong Credentials",
            UNSUPPORTED_TRANSPORT_PROTOCOL => "Unsupported Transport Protocol",
            ALLOCATION_QUOTA_REACHED => "Allocation Quota Reached",
            SERVER_ERROR => "Server Error",
            INSUFFICIENT_CAPACITY => "Insufficient Capacity",
            _ => "Unknown Error",
        }
    }
}

/// MESSAGE-INTEGRITY payload
///
/// The digest depends on the message bytes preceding the attribute, so the
/// value is either a key to compute it with at emit time, or the 20 bytes
/// that came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// Compute the HMAC-SHA1 over the message when it is emitted
    Key(CredentialKey),
    /// A digest as received (or precomputed); emitted verbatim
    Digest([u8; 20]),
}

/// A STUN attribute: a tagged variant over the attribute kinds this stack
/// understands, plus a raw fallback for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    // Address attributes
    MappedAddress(SocketAddr),
    ResponseAddress(SocketAddr),
    SourceAddress(SocketAddr),
    ChangedAddress(SocketAddr),
    ReflectedFrom(SocketAddr),
    AlternateServer(SocketAddr),
    XorMappedAddress(SocketAddr),
    XorPeerAddress(SocketAddr),
    XorRelayedAddress(SocketAddr),

    // String attributes
    Username(String),
    Password(String),
    Realm(String),
    Nonce(String),
    Software(String),

    // Content-dependent attributes
    MessageIntegrity(Integrity),
    Fingerprint(u32),

    ErrorCode { code: u16, reason: String },
    UnknownAttributes(Vec<u16>),

    // Numeric attributes
    ChannelNumber(u16),
    Lifetime(u32),
    Priority(u32),
    IceControlled(u64),
    IceControlling(u64),

    // Flag attributes (presence indicates true)
    UseCandidate,
    XorOnly,
    DontFragment,
    EvenPort(bool),

    RequestedTransport(u8),
    ChangeRequest { change_ip: bool, change_port: bool },
    Data(Vec<u8>),
    ReservationToken([u8; 8]),

    /// Attribute with a type code this stack does not know
    Unknown { attr_type: u16, data: Vec<u8> },
}

impl Attribute {
    /// Type code of this attribute
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::MappedAddress(_) => AttributeType::MAPPED_ADDRESS,
            Self::ResponseAddress(_) => AttributeType::RESPONSE_ADDRESS,
            Self::SourceAddress(_) => AttributeType::SOURCE_ADDRESS,
            Self::ChangedAddress(_) => AttributeType::CHANGED_ADDRESS,
            Self::ReflectedFrom(_) => AttributeType::REFLECTED_FROM,
            Self::AlternateServer(_) => AttributeType::ALTERNATE_SERVER,
            Self::XorMappedAddress(_) => AttributeType::XOR_MAPPED_ADDRESS,
            Self::XorPeerAddress(_) => AttributeType::XOR_PEER_ADDRESS,
            Self::XorRelayedAddress(_) => AttributeType::XOR_RELAYED_ADDRESS,
            Self::Username(_) => AttributeType::USERNAME,
            Self::Password(_) => AttributeType::PASSWORD,
            Self::Realm(_) => AttributeType::REALM,
            Self::Nonce(_) => AttributeType::NONCE,
            Self::Software(_) => AttributeType::SOFTWARE,
            Self::MessageIntegrity(_) => AttributeType::MESSAGE_INTEGRITY,
            Self::Fingerprint(_) => AttributeType::FINGERPRINT,
            Self::ErrorCode { .. } => AttributeType::ERROR_CODE,
            Self::UnknownAttributes(_) => AttributeType::UNKNOWN_ATTRIBUTES,
            Self::ChannelNumber(_) => AttributeType::CHANNEL_NUMBER,
            Self::Lifetime(_) => AttributeType::LIFETIME,
            Self::Priority(_) => AttributeType::PRIORITY,
            Self::IceControlled(_) => AttributeType::ICE_CONTROLLED,
            Self::IceControlling(_) => AttributeType::ICE_CONTROLLING,
            Self::UseCandidate => AttributeType::USE_CANDIDATE,
            Self::XorOnly => AttributeType::XOR_ONLY,
            Self::DontFragment => AttributeType::DONT_FRAGMENT,
            Self::EvenPort(_) => AttributeType::EVEN_PORT,
            Self::RequestedTransport(_) => AttributeType::REQUESTED_TRANSPORT,
            Self::ChangeRequest { .. } => AttributeType::CHANGE_REQUEST,
            Self::Data(_) => AttributeType::DATA,
            Self::ReservationToken(_) => AttributeType::RESERVATION_TOKEN,
            Self::Unknown { attr_type, .. } => AttributeType(*attr_type),
        }
    }

    /// Payload length in bytes, excluding the 4-byte attribute header and
    /// excluding padding.
    pub fn data_length(&self) -> u16 {
        match self {
            Self::MappedAddress(addr)
            | Self::ResponseAddress(addr)
            | Self::SourceAddress(addr)
            | Self::ChangedAddress(addr)
            | Self::ReflectedFrom(addr)
            | Self::AlternateServer(addr)
            | Self::XorMappedAddress(addr)
            | Self::XorPeerAddress(addr)
            | Self::XorRelayedAddress(addr) => match addr.ip() {
                IpAddr::V4(_) => 8,
                IpAddr::V6(_) => 20,
            },
            Self::Username(s)
            | Self::Password(s)
            | Self::Realm(s)
            | Self::Nonce(s)
            | Self::Software(s) => s.len() as u16,
            Self::MessageIntegrity(_) => 20,
            Self::Fingerprint(_) => 4,
            Self::ErrorCode { reason, .. } => 4 + reason.len() as u16,
            Self::UnknownAttributes(codes) => 2 * codes.len() as u16,
            Self::ChannelNumber(_) => 4,
            Self::Lifetime(_) => 4,
            Self::Priority(_) => 4,
            Self::IceControlled(_) | Self::IceControlling(_) => 8,
            Self::UseCandidate | Self::XorOnly | Self::DontFragment => 0,
            Self::EvenPort(_) => 1,
            Self::RequestedTransport(_) => 4,
            Self::ChangeRequest { .. } => 4,
            Self::Data(data) => data.len() as u16,
            Self::ReservationToken(_) => 8,
            Self::Unknown { data, .. } => data.len() as u16,
        }
    }

    /// Serialize the attribute header and payload into `buf`.
    ///
    /// Padding is not written here; the message layer pads between
    /// attributes. MESSAGE-INTEGRITY and FINGERPRINT values that depend on
    /// the message prefix are computed by the message encoder; this method
    /// emits a stored digest verbatim and a `Key` integrity as 20 zero
    /// bytes.
    pub fn encode(&self, buf: &mut BytesMut, tid: &TransactionId) {
        buf.put_u16(self.attribute_type().value());
        buf.put_u16(self.data_length());

        match self {
            Self::MappedAddress(addr)
            | Self::ResponseAddress(addr)
            | Self::SourceAddress(addr)
            | Self::ChangedAddress(addr)
            | Self::ReflectedFrom(addr)
            | Self::AlternateServer(addr) => encode_address(buf, addr, false, tid),
            Self::XorMappedAddress(addr)
            | Self::XorPeerAddress(addr)
            | Self::XorRelayedAddress(addr) => encode_address(buf, addr, true, tid),
            Self::Username(s)
            | Self::Password(s)
            | Self::Realm(s)
            | Self::Nonce(s)
            | Self::Software(s) => buf.put_slice(s.as_bytes()),
            Self::MessageIntegrity(Integrity::Digest(digest)) => buf.put_slice(digest),
            Self::MessageIntegrity(Integrity::Key(_)) => buf.put_bytes(0, 20),
            Self::Fingerprint(value) => buf.put_u32(*value),
            Self::ErrorCode { code, reason } => {
                buf.put_u16(0);
                buf.put_u8((code / 100) as u8);
                buf.put_u8((code % 100) as u8);
                buf.put_slice(reason.as_bytes());
            }
            Self::UnknownAttributes(codes) => {
                for code in codes {
                    buf.put_u16(*code);
                }
            }
            Self::ChannelNumber(number) => {
                buf.put_u16(*number);
                buf.put_u16(0);
            }
            Self::Lifetime(value) | Self::Priority(value) => buf.put_u32(*value),
            Self::IceControlled(value) | Self::IceControlling(value) => buf.put_u64(*value),
            Self::UseCandidate | Self::XorOnly | Self::DontFragment => {}
            Self::EvenPort(reserve_next) => {
                buf.put_u8(if *reserve_next { 0x80 } else { 0x00 });
            }
            Self::RequestedTransport(protocol) => {
                buf.put_u8(*protocol);
                buf.put_bytes(0, 3);
            }
            Self::ChangeRequest { change_ip, change_port } => {
                let flags =
                    ((*change_ip as u32) << 2) | ((*change_port as u32) << 1);
                buf.put_u32(flags);
            }
            Self::Data(data) => buf.put_slice(data),
            Self::ReservationToken(token) => buf.put_slice(token),
            Self::Unknown { data, .. } => buf.put_slice(data),
        }
    }

    /// Parse one attribute from the start of `buf` and return it together
    /// with its payload length; the caller advances past the header, the
    /// payload and the padding.
    pub fn decode(buf: &[u8], tid: &TransactionId) -> StackResult<(Attribute, u16)> {
        if buf.len() < ATTRIBUTE_HEADER_LENGTH {
            return Err(StunError::Malformed("attribute header too short".to_string()).into());
        }

        let attr_type = AttributeType(u16::from_be_bytes([buf[0], buf[1]]));
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;

        if buf.len() - ATTRIBUTE_HEADER_LENGTH < length {
            return Err(StunError::Malformed(format!(
                "attribute {} declares {} payload bytes but only {} remain",
                attr_type,
                length,
                buf.len() - ATTRIBUTE_HEADER_LENGTH
            ))
            .into());
        }

        let value = &buf[ATTRIBUTE_HEADER_LENGTH..ATTRIBUTE_HEADER_LENGTH + length];

        let attribute = match attr_type {
            AttributeType::MAPPED_ADDRESS => {
                Self::MappedAddress(decode_address(value, false, tid)?)
            }
            AttributeType::RESPONSE_ADDRESS => {
                Self::ResponseAddress(decode_address(value, false, tid)?)
            }
            AttributeType::SOURCE_ADDRESS => {
                Self::SourceAddress(decode_address(value, false, tid)?)
            }
            AttributeType::CHANGED_ADDRESS => {
                Self::ChangedAddress(decode_address(value, false, tid)?)
            }
            AttributeType::REFLECTED_FROM => {
                Self::ReflectedFrom(decode_address(value, false, tid)?)
            }
            AttributeType::ALTERNATE_SERVER => {
                Self::AlternateServer(decode_address(value, false, tid)?)
            }
            AttributeType::XOR_MAPPED_ADDRESS => {
                Self::XorMappedAddress(decode_address(value, true, tid)?)
            }
            AttributeType::XOR_PEER_ADDRESS => {
                Self::XorPeerAddress(decode_address(value, true, tid)?)
            }
            AttributeType::XOR_RELAYED_ADDRESS => {
                Self::XorRelayedAddress(decode_address(value, true, tid)?)
            }
            AttributeType::USERNAME => Self::Username(decode_string(attr_type, value)?),
            AttributeType::PASSWORD => Self::Password(decode_string(attr_type, value)?),
            AttributeType::REALM => Self::Realm(decode_string(attr_type, value)?),
            AttributeType::NONCE => Self::Nonce(decode_string(attr_type, value)?),
            AttributeType::SOFTWARE => Self::Software(decode_string(attr_type, value)?),
            AttributeType::MESSAGE_INTEGRITY => {
                let digest: [u8; 20] = value.try_into().map_err(|_| {
                    StunError::Malformed("MESSAGE-INTEGRITY must be 20 bytes".to_string())
                })?;
                Self::MessageIntegrity(Integrity::Digest(digest))
            }
            AttributeType::FINGERPRINT => {
                Self::Fingerprint(decode_u32(attr_type, value)?)
            }
            AttributeType::ERROR_CODE => {
                if value.len() < 4 {
                    return Err(
                        StunError::Malformed("ERROR-CODE too short".to_string()).into()
                    );
                }
                let class = (value[2] & 0x07) as u16;
                let number = value[3] as u16;
                let reason = decode_string(attr_type, &value[4..])?;
                Self::ErrorCode {
                    code: class * 100 + number,
                    reason,
                }
            }
            AttributeType::UNKNOWN_ATTRIBUTES => {
                if value.len() % 2 != 0 {
                    return Err(StunError::Malformed(
                        "UNKNOWN-ATTRIBUTES payload is not a list of 16-bit codes".to_string(),
                    )
                    .into());
                }
                let codes = value
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Self::UnknownAttributes(codes)
            }
            AttributeType::CHANNEL_NUMBER => {
                if value.len() != 4 {
                    return Err(StunError::Malformed(
                        "CHANNEL-NUMBER must be 4 bytes".to_string(),
                    )
                    .into());
                }
                Self::ChannelNumber(u16::from_be_bytes([value[0], value[1]]))
            }
            AttributeType::LIFETIME => Self::Lifetime(decode_u32(attr_type, value)?),
            AttributeType::PRIORITY => Self::Priority(decode_u32(attr_type, value)?),
            AttributeType::ICE_CONTROLLED => {
                Self::IceControlled(decode_u64(attr_type, value)?)
            }
            AttributeType::ICE_CONTROLLING => {
                Self::IceControlling(decode_u64(attr_type, value)?)
            }
            AttributeType::USE_CANDIDATE => {
                decode_empty(attr_type, value)?;
                Self::UseCandidate
            }
            AttributeType::XOR_ONLY => {
                decode_empty(attr_type, value)?;
                Self::XorOnly
            }
            AttributeType::DONT_FRAGMENT => {
                decode_empty(attr_type, value)?;
                Self::DontFragment
            }
            AttributeType::EVEN_PORT => {
                if value.is_empty() {
                    return Err(
                        StunError::Malformed("EVEN-PORT must carry a flag byte".to_string())
                            .into(),
                    );
                }
                Self::EvenPort(value[0] & 0x80 != 0)
            }
            AttributeType::REQUESTED_TRANSPORT => {
                if value.len() != 4 {
                    return Err(StunError::Malformed(
                        "REQUESTED-TRANSPORT must be 4 bytes".to_string(),
                    )
                    .into());
                }
                Self::RequestedTransport(value[0])
            }
            AttributeType::CHANGE_REQUEST => {
                let flags = decode_u32(attr_type, value)?;
                Self::ChangeRequest {
                    change_ip: flags & 0x04 != 0,
                    change_port: flags & 0x02 != 0,
                }
            }
            AttributeType::DATA => Self::Data(value.to_vec()),
            AttributeType::RESERVATION_TOKEN => {
                let token: [u8; 8] = value.try_into().map_err(|_| {
                    StunError::Malformed("RESERVATION-TOKEN must be 8 bytes".to_string())
                })?;
                Self::ReservationToken(token)
            }
            _ => Self::Unknown {
                attr_type: attr_type.value(),
                data: value.to_vec(),
            },
        };

        Ok((attribute, length as u16))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[len={}]",
            self.attribute_type(),
            self.data_length()
        )
    }
}

/// Padding needed to bring `len` to the next 4-byte boundary
pub(crate) fn pad4(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn encode_address(buf: &mut BytesMut, addr: &SocketAddr, xor: bool, tid: &TransactionId) {
    buf.put_u8(0);

    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(0x01);

            let mut port = addr.port();
            let mut octets = ip.octets();

            if xor {
                port ^= (u32::from_be_bytes(MAGIC_COOKIE) >> 16) as u16;
                for i in 0..4 {
                    octets[i] ^= MAGIC_COOKIE[i];
                }
            }

            buf.put_u16(port);
            buf.put_slice(&octets);
        }
        IpAddr::V6(ip) => {
            buf.put_u8(0x02);

            let mut port = addr.port();
            let mut octets = ip.octets();

            if xor {
                port ^= (u32::from_be_bytes(MAGIC_COOKIE) >> 16) as u16;
                let tid_bytes = tid.as_bytes();
                for i in 0..4 {
                    octets[i] ^= MAGIC_COOKIE[i];
                }
                for i in 0..12 {
                    octets[i + 4] ^= tid_bytes[i];
                }
            }

            buf.put_u16(port);
            buf.put_slice(&octets);
        }
    }
}

fn decode_address(value: &[u8], xor: bool, tid: &TransactionId) -> StackResult<SocketAddr> {
    if value.len() < 4 {
        return Err(StunError::Malformed("address attribute too short".to_string()).into());
    }

    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);

    if xor {
        port ^= (u32::from_be_bytes(MAGIC_COOKIE) >> 16) as u16;
    }

    match family {
        0x01 => {
            if value.len() != 8 {
                return Err(
                    StunError::Malformed("IPv4 address must be 8 bytes".to_string()).into()
                );
            }

            let mut octets = [0u8; 4];
            octets.copy_from_slice(&value[4..8]);

            if xor {
                for i in 0..4 {
                    octets[i] ^= MAGIC_COOKIE[i];
                }
            }

            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        0x02 => {
            if value.len() != 20 {
                return Err(
                    StunError::Malformed("IPv6 address must be 20 bytes".to_string()).into()
                );
            }

            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);

            if xor {
                let tid_bytes = tid.as_bytes();
                for i in 0..4 {
                    octets[i] ^= MAGIC_COOKIE[i];
                }
                for i in 0..12 {
                    octets[i + 4] ^= tid_bytes[i];
                }
            }

            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        other => {
            Err(StunError::Malformed(format!("unknown address family: {}", other)).into())
        }
    }
}

fn decode_string(attr_type: AttributeType, value: &[u8]) -> StackResult<String> {
    String::from_utf8(value.to_vec())
        .map_err(|_| StunError::Malformed(format!("{} is not valid UTF-8", attr_type)).into())
}

fn decode_u32(attr_type: AttributeType, value: &[u8]) -> StackResult<u32> {
    let bytes: [u8; 4] = value
        .try_into()
        .map_err(|_| StunError::Malformed(format!("{} must be 4 bytes", attr_type)))?;
    Ok(u32::from_be_bytes(bytes))
}

fn decode_u64(attr_type: AttributeType, value: &[u8]) -> StackResult<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| StunError::Malformed(format!("{} must be 8 bytes", attr_type)))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_empty(attr_type: AttributeType, value: &[u8]) -> StackResult<()> {
    if !value.is_empty() {
        return Err(StunError::Malformed(format!("{} must be empty", attr_type)).into());
    }

    Ok(())
}

/// Whether an attribute may, must or must not appear in a message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentity {
    NotApplicable,
    Conditional,
    Optional,
    Mandatory,
}

use Presentity::Conditional as C;
use Presentity::Mandatory as M;
use Presentity::NotApplicable as NA;
use Presentity::Optional as O;

/// Row applied to attribute codes without their own table row
pub(crate) const UNKNOWN_OPTIONAL_ROW: [Presentity; 14] =
    [O, O, O, O, O, O, O, O, O, O, O, O, NA, NA];

/// Which attributes are present in which messages. Mandatory attributes
/// must be included, optional ones may be, conditional ones depend on some
/// other aspect of the message, and not-applicable ones must not appear.
///
/// Columns:                          Binding   Shared   Shared   Shared  Alloc   Alloc   Rfrsh   Rfrsh   ChnlBnd ChnlBnd Send    Data
///                 Binding   Binding Error     Secret   Secret   Secret  Req.    Resp.   Req.    Resp.   Req.    Resp.   Indic.  Indic.
///                 Req.      Resp.   Resp.     Req.     Resp.    Error
///                                                               Resp.
#[rustfmt::skip]
pub(crate) const PRESENTITY_TABLE: [(AttributeType, [Presentity; 14]); 31] = [
    (AttributeType::MAPPED_ADDRESS,      [NA, M,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::RESPONSE_ADDRESS,    [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::CHANGE_REQUEST,      [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::SOURCE_ADDRESS,      [NA, M,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::CHANGED_ADDRESS,     [NA, M,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::USERNAME,            [O,  NA, NA, NA, M,  NA, O,  NA, O,  NA, O,  NA, NA, NA]),
    (AttributeType::PASSWORD,            [NA, NA, NA, NA, M,  NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::MESSAGE_INTEGRITY,   [O,  O,  NA, NA, NA, NA, O,  O,  O,  O,  O,  O,  NA, NA]),
    (AttributeType::ERROR_CODE,          [NA, NA, M,  NA, NA, M,  NA, M,  NA, M,  NA, M,  NA, NA]),
    (AttributeType::UNKNOWN_ATTRIBUTES,  [NA, NA, C,  NA, NA, C,  NA, C,  NA, C,  NA, C,  NA, NA]),
    (AttributeType::REFLECTED_FROM,      [NA, C,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::XOR_MAPPED_ADDRESS,  [NA, M,  NA, NA, NA, NA, NA, M,  NA, NA, NA, NA, NA, NA]),
    (AttributeType::XOR_ONLY,            [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::SOFTWARE,            [NA, O,  O,  NA, O,  O,  O,  O,  O,  O,  O,  O,  O,  NA]),
    (AttributeType::ALTERNATE_SERVER,    [O,  O,  O,  O,  O,  O,  NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::REALM,               [O,  NA, NA, NA, M,  NA, O,  O,  O,  O,  O,  O,  NA, NA]),
    (AttributeType::NONCE,               [O,  NA, NA, NA, M,  NA, O,  O,  O,  O,  O,  O,  NA, NA]),
    (AttributeType::FINGERPRINT,         [O,  O,  O,  O,  O,  O,  O,  O,  O,  O,  O,  O,  NA, NA]),
    (AttributeType::CHANNEL_NUMBER,      [NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, M,  NA, NA, NA]),
    (AttributeType::LIFETIME,            [NA, NA, NA, NA, NA, NA, O,  NA, M,  NA, NA, NA, NA, NA]),
    (AttributeType::XOR_PEER_ADDRESS,    [NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, M,  NA, M,  M ]),
    (AttributeType::DATA,                [NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, O,  M ]),
    (AttributeType::XOR_RELAYED_ADDRESS, [NA, NA, NA, NA, NA, NA, NA, M,  NA, NA, NA, NA, NA, NA]),
    (AttributeType::EVEN_PORT,           [NA, NA, NA, NA, NA, NA, O,  NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::REQUESTED_TRANSPORT, [NA, NA, NA, NA, NA, NA, M,  NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::DONT_FRAGMENT,       [NA, NA, NA, NA, NA, NA, O,  NA, NA, NA, NA, NA, O,  NA]),
    (AttributeType::RESERVATION_TOKEN,   [NA, NA, NA, NA, NA, NA, O,  O,  NA, NA, NA, NA, NA, NA]),
    (AttributeType::PRIORITY,            [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::ICE_CONTROLLING,     [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::ICE_CONTROLLED,      [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
    (AttributeType::USE_CANDIDATE,       [O,  NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA, NA]),
];

/// Presentity row for an attribute type
pub(crate) fn presentity_row(attr_type: AttributeType) -> &'static [Presentity; 14] {
    PRESENTITY_TABLE
        .iter()
        .find(|(t, _)| *t == attr_type)
        .map(|(_, row)| row)
        .unwrap_or(&UNKNOWN_OPTIONAL_ROW)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid() -> TransactionId {
        TransactionId::from_bytes([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
        ])
    }

    fn roundtrip(attribute: Attribute) -> Attribute {
        let tid = tid();
        let mut buf = BytesMut::new();
        attribute.encode(&mut buf, &tid);

        let (decoded, consumed) = Attribute::decode(&buf, &tid).unwrap();
        assert_eq!(consumed, attribute.data_length());
        decoded
    }

    #[test]
    fn test_pad4() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(4), 0);
        assert_eq!(pad4(5), 3);
        assert_eq!(pad4(6), 2);
        assert_eq!(pad4(7), 1);
    }

    #[test]
    fn test_xor_mapped_address_vector() {
        // RFC 5769 server-reflexive address
        let addr: SocketAddr = "192.0.2.1:32853".parse().unwrap();
        let attribute = Attribute::XorMappedAddress(addr);

        let mut buf = BytesMut::new();
        attribute.encode(&mut buf, &tid());

        assert_eq!(
            &buf[..],
            &[0x00, 0x20, 0x00, 0x08, 0x00, 0x01, 0xA1, 0x47, 0xE1, 0x12, 0xA6, 0x43]
        );
    }

    #[test]
    fn test_xor_address_roundtrip_v6() {
        let addr: SocketAddr = "[2001:db8:1234:5678:11:2233:4455:6677]:32853"
            .parse()
            .unwrap();
        let decoded = roundtrip(Attribute::XorPeerAddress(addr));
        assert_eq!(decoded, Attribute::XorPeerAddress(addr));
    }

    #[test]
    fn test_plain_address_roundtrip() {
        let addr: SocketAddr = "10.0.0.7:9".parse().unwrap();
        assert_eq!(
            roundtrip(Attribute::MappedAddress(addr)),
            Attribute::MappedAddress(addr)
        );
    }

    #[test]
    fn test_string_attribute_roundtrip() {
        let attribute = Attribute::Username("alice".to_string());
        assert_eq!(attribute.data_length(), 5);
        assert_eq!(roundtrip(attribute.clone()), attribute);
    }

    #[test]
    fn test_error_code_roundtrip() {
        let attribute = Attribute::ErrorCode {
            code: error_code::STALE_NONCE,
            reason: error_code::default_reason(error_code::STALE_NONCE).to_string(),
        };
        assert_eq!(roundtrip(attribute.clone()), attribute);
    }

    #[test]
    fn test_flag_attributes() {
        assert_eq!(Attribute::UseCandidate.data_length(), 0);
        assert_eq!(roundtrip(Attribute::UseCandidate), Attribute::UseCandidate);
        assert_eq!(roundtrip(Attribute::EvenPort(true)), Attribute::EvenPort(true));
    }

    #[test]
    fn test_truncated_attribute_rejected() {
        // USERNAME declaring 16 payload bytes with only 4 present
        let buf = [0x00u8, 0x06, 0x00, 0x10, 0x61, 0x62, 0x63, 0x64];
        let err = Attribute::decode(&buf, &tid()).unwrap_err();
        assert!(err.to_string().contains("declares"));
    }

    #[test]
    fn test_unknown_attribute_preserved() {
        let buf = [0x80u8, 0xAA, 0x00, 0x02, 0xBE, 0xEF];
        let (attribute, consumed) = Attribute::decode(&buf, &tid()).unwrap();

        assert_eq!(consumed, 2);
        assert_eq!(
            attribute,
            Attribute::Unknown {
                attr_type: 0x80AA,
                data: vec![0xBE, 0xEF]
            }
        );
        assert!(!attribute.attribute_type().is_comprehension_required());
    }

    #[test]
    fn test_presentity_lookup() {
        // USERNAME is optional in a Binding Request, off-table codes fall
        // back to the unknown-optional row
        assert_eq!(presentity_row(AttributeType::USERNAME)[0], Presentity::Optional);
        assert_eq!(presentity_row(AttributeType::USERNAME)[1], Presentity::NotApplicable);
        assert_eq!(presentity_row(AttributeType(0x7777))[0], Presentity::Optional);
        assert_eq!(presentity_row(AttributeType(0x7777))[12], Presentity::NotApplicable);
    }
}
