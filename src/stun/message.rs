// src/stun/message.rs
//! STUN message codec
//!
//! STUN messages are TLV (type-length-value) encoded using big endian
//! (network ordered) binary. Every message starts with a 20-byte header
//! followed by a series of attributes, the set of which depends on the
//! message type.
//!
//! ```bash
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie (0x2112A442)             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::fmt;

use bytes::{BufMut, BytesMut};
use rand::RngCore;

use crate::config::StackConfig;
use crate::error::{StackResult, StunError};
use crate::stun::attribute::{
    pad4, presentity_row, Attribute, AttributeType, Integrity, Presentity,
    ATTRIBUTE_HEADER_LENGTH,
};
use crate::stun::auth;

/// STUN header size: type (2) + length (2) + cookie (4) + transaction id (12)
pub const HEADER_LENGTH: usize = 20;

/// The magic cookie (0x2112A442)
pub const MAGIC_COOKIE: [u8; 4] = [0x21, 0x12, 0xA4, 0x42];

/// Transaction id size in bytes
pub const TRANSACTION_ID_LENGTH: usize = 12;

// Message classes, selected by the two class bits of the 16-bit type
pub const STUN_REQUEST: u16 = 0x0000;
pub const STUN_INDICATION: u16 = 0x0010;
pub const STUN_SUCCESS_RESP: u16 = 0x0100;
pub const STUN_ERROR_RESP: u16 = 0x0110;

const CLASS_MASK: u16 = 0x0110;

// STUN methods
pub const STUN_METHOD_BINDING: u16 = 0x0001;
pub const STUN_METHOD_SHARED_SECRET: u16 = 0x0002;

// TURN methods
pub const TURN_METHOD_ALLOCATE: u16 = 0x0003;
pub const TURN_METHOD_REFRESH: u16 = 0x0004;
pub const TURN_METHOD_SEND: u16 = 0x0006;
pub const TURN_METHOD_DATA: u16 = 0x0007;
pub const TURN_METHOD_CHANNELBIND: u16 = 0x0009;

pub const BINDING_REQUEST: u16 = STUN_METHOD_BINDING | STUN_REQUEST;
pub const BINDING_RESPONSE: u16 = STUN_METHOD_BINDING | STUN_SUCCESS_RESP;
pub const BINDING_ERROR_RESPONSE: u16 = STUN_METHOD_BINDING | STUN_ERROR_RESP;
pub const SHARED_SECRET_REQUEST: u16 = STUN_METHOD_SHARED_SECRET | STUN_REQUEST;
pub const SHARED_SECRET_RESPONSE: u16 = STUN_METHOD_SHARED_SECRET | STUN_SUCCESS_RESP;
pub const SHARED_SECRET_ERROR_RESPONSE: u16 = STUN_METHOD_SHARED_SECRET | STUN_ERROR_RESP;
pub const ALLOCATE_REQUEST: u16 = TURN_METHOD_ALLOCATE | STUN_REQUEST;
pub const ALLOCATE_RESPONSE: u16 = TURN_METHOD_ALLOCATE | STUN_SUCCESS_RESP;
pub const ALLOCATE_ERROR_RESPONSE: u16 = TURN_METHOD_ALLOCATE | STUN_ERROR_RESP;
pub const REFRESH_REQUEST: u16 = TURN_METHOD_REFRESH | STUN_REQUEST;
pub const REFRESH_RESPONSE: u16 = TURN_METHOD_REFRESH | STUN_SUCCESS_RESP;
pub const REFRESH_ERROR_RESPONSE: u16 = TURN_METHOD_REFRESH | STUN_ERROR_RESP;
pub const CHANNELBIND_REQUEST: u16 = TURN_METHOD_CHANNELBIND | STUN_REQUEST;
pub const CHANNELBIND_RESPONSE: u16 = TURN_METHOD_CHANNELBIND | STUN_SUCCESS_RESP;
pub const CHANNELBIND_ERROR_RESPONSE: u16 = TURN_METHOD_CHANNELBIND | STUN_ERROR_RESP;
pub const SEND_INDICATION: u16 = TURN_METHOD_SEND | STUN_INDICATION;
pub const DATA_INDICATION: u16 = TURN_METHOD_DATA | STUN_INDICATION;

/// STUN message class, a decoded view of the type's class bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    /// Class of a raw message type
    pub fn of(message_type: u16) -> Self {
        match message_type & CLASS_MASK {
            STUN_REQUEST => Self::Request,
            STUN_INDICATION => Self::Indication,
            STUN_SUCCESS_RESP => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        }
    }
}

/// Determines whether `message_type` is a request
pub fn is_request_type(message_type: u16) -> bool {
    message_type & CLASS_MASK == STUN_REQUEST
}

/// Determines whether `message_type` is an indication
pub fn is_indication_type(message_type: u16) -> bool {
    message_type & CLASS_MASK == STUN_INDICATION
}

/// Determines whether `message_type` is a success response
pub fn is_success_response_type(message_type: u16) -> bool {
    message_type & CLASS_MASK == STUN_SUCCESS_RESP
}

/// Determines whether `message_type` is an error response
pub fn is_error_response_type(message_type: u16) -> bool {
    message_type & CLASS_MASK == STUN_ERROR_RESP
}

/// Method bits of a message type
pub fn method_of(message_type: u16) -> u16 {
    message_type & !CLASS_MASK
}

/// STUN transaction id (96 bits), correlating a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; TRANSACTION_ID_LENGTH]);

impl TransactionId {
    /// Generate a random transaction id
    pub fn new() -> Self {
        let mut id = [0u8; TRANSACTION_ID_LENGTH];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    /// Transaction id from a fixed byte array
    pub fn from_bytes(bytes: [u8; TRANSACTION_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Transaction id from a slice; anything but 12 bytes is refused.
    /// 16-byte RFC 3489 ids are not supported.
    pub fn from_slice(slice: &[u8]) -> StackResult<Self> {
        if slice.len() != TRANSACTION_ID_LENGTH {
            return Err(StunError::InvalidArgument(format!(
                "transaction id must be {} bytes, got {}",
                TRANSACTION_ID_LENGTH,
                slice.len()
            ))
            .into());
        }

        let mut id = [0u8; TRANSACTION_ID_LENGTH];
        id.copy_from_slice(slice);
        Ok(Self(id))
    }

    /// Raw bytes of the id
    pub fn as_bytes(&self) -> &[u8; TRANSACTION_ID_LENGTH] {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A STUN message: a 16-bit type, a transaction id and an ordered list of
/// attributes keyed by type code (at most one attribute per code; adding a
/// duplicate replaces the existing one in place).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    message_type: u16,
    transaction_id: TransactionId,
    attributes: Vec<Attribute>,
}

impl Message {
    /// Creates an empty message of the given type
    pub fn new(message_type: u16, transaction_id: TransactionId) -> Self {
        Self {
            message_type,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Binding Request (0x0001)
    pub fn binding_request(transaction_id: TransactionId) -> Self {
        Self::new(BINDING_REQUEST, transaction_id)
    }

    /// Binding Response (0x0101)
    pub fn binding_response(transaction_id: TransactionId) -> Self {
        Self::new(BINDING_RESPONSE, transaction_id)
    }

    /// Allocate Request (0x0003)
    pub fn allocate_request(transaction_id: TransactionId) -> Self {
        Self::new(ALLOCATE_REQUEST, transaction_id)
    }

    /// Send Indication (0x0016)
    pub fn send_indication(transaction_id: TransactionId) -> Self {
        Self::new(SEND_INDICATION, transaction_id)
    }

    /// The message type
    pub fn message_type(&self) -> u16 {
        self.message_type
    }

    /// The message class derived from the type bits
    pub fn class(&self) -> MessageClass {
        MessageClass::of(self.message_type)
    }

    /// The transaction id
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Replaces the transaction id
    pub fn set_transaction_id(&mut self, transaction_id: TransactionId) {
        self.transaction_id = transaction_id;
    }

    /// Human readable name of the message type. Names do not matter from
    /// the protocol point of view, they only show up in diagnostics.
    pub fn name(&self) -> &'static str {
        match self.message_type {
            BINDING_REQUEST => "BINDING-REQUEST",
            BINDING_RESPONSE => "BINDING-RESPONSE",
            BINDING_ERROR_RESPONSE => "BINDING-ERROR-RESPONSE",
            SHARED_SECRET_REQUEST => "SHARED-SECRET-REQUEST",
            SHARED_SECRET_RESPONSE => "SHARED-SECRET-RESPONSE",
            SHARED_SECRET_ERROR_RESPONSE => "SHARED-SECRET-ERROR-RESPONSE",
            ALLOCATE_REQUEST => "ALLOCATE-REQUEST",
            ALLOCATE_RESPONSE => "ALLOCATE-RESPONSE",
            ALLOCATE_ERROR_RESPONSE => "ALLOCATE-ERROR-RESPONSE",
            REFRESH_REQUEST => "REFRESH-REQUEST",
            REFRESH_RESPONSE => "REFRESH-RESPONSE",
            REFRESH_ERROR_RESPONSE => "REFRESH-ERROR-RESPONSE",
            CHANNELBIND_REQUEST => "CHANNELBIND-REQUEST",
            CHANNELBIND_RESPONSE => "CHANNELBIND-RESPONSE",
            CHANNELBIND_ERROR_RESPONSE => "CHANNELBIND-ERROR-RESPONSE",
            SEND_INDICATION => "SEND-INDICATION",
            DATA_INDICATION => "DATA-INDICATION",
            _ => "UNKNOWN-MESSAGE",
        }
    }

    /// Length of the attribute section in bytes: each attribute counts its
    /// 4-byte header, its payload and the padding to the next 4-byte
    /// boundary.
    pub fn data_length(&self) -> u16 {
        self.attributes
            .iter()
            .map(|attribute| {
                let len = ATTRIBUTE_HEADER_LENGTH + attribute.data_length() as usize;
                (len + pad4(len)) as u16
            })
            .sum()
    }

    /// Adds an attribute. An attribute whose type code is already present
    /// replaces the existing one without changing its position. Attributes
    /// that are not applicable to this message type are refused.
    pub fn add_attribute(&mut self, attribute: Attribute) -> StackResult<()> {
        let attr_type = attribute.attribute_type();

        if self.presentity_of(attr_type) == Presentity::NotApplicable {
            return Err(StunError::IllegalAttribute {
                attribute: attr_type.to_string(),
                message: self.name().to_string(),
            }
            .into());
        }

        self.push_attribute(attribute);
        Ok(())
    }

    /// Replace-in-place insertion without the applicability check; used
    /// where the attribute was already vetted or came off the wire.
    fn push_attribute(&mut self, attribute: Attribute) {
        let attr_type = attribute.attribute_type();

        match self
            .attributes
            .iter()
            .position(|a| a.attribute_type() == attr_type)
        {
            Some(pos) => self.attributes[pos] = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Whether the message contains an attribute with the given type
    pub fn contains(&self, attr_type: AttributeType) -> bool {
        self.attributes
            .iter()
            .any(|a| a.attribute_type() == attr_type)
    }

    /// The attribute with the given type, if present
    pub fn get_attribute(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == attr_type)
    }

    /// Removes and returns the attribute with the given type
    pub fn remove_attribute(&mut self, attr_type: AttributeType) -> Option<Attribute> {
        let pos = self
            .attributes
            .iter()
            .position(|a| a.attribute_type() == attr_type)?;
        Some(self.attributes.remove(pos))
    }

    /// All attributes in their current order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Number of attributes currently contained by the message
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Presentity of an attribute type under this message's type. Message
    /// types without a column in the table get a permissive answer.
    pub fn presentity_of(&self, attr_type: AttributeType) -> Presentity {
        match presentity_column(self.message_type) {
            Some(column) => presentity_row(attr_type)[column],
            None => Presentity::Optional,
        }
    }

    /// Returns the binary representation of this message.
    ///
    /// MESSAGE-INTEGRITY is forced to be the penultimate attribute and
    /// FINGERPRINT the last one; their payloads are computed over the
    /// message bytes written before them, with the header length field
    /// adjusted to end at the attribute being digested.
    pub fn encode(&self, config: &StackConfig) -> StackResult<Vec<u8>> {
        let mut message = self.clone();
        message.prepare_for_encoding(config);

        if config.rfc3489_compat {
            message.validate_attribute_presentity()?;
        }

        let data_length = message.data_length();
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + data_length as usize);

        buf.put_u16(message.message_type);
        buf.put_u16(data_length);
        buf.put_slice(&MAGIC_COOKIE);
        buf.put_slice(message.transaction_id.as_bytes());

        for attribute in &message.attributes {
            let start = buf.len();

            match attribute {
                Attribute::MessageIntegrity(Integrity::Key(key)) => {
                    // digest the prefix as if the message ended with this
                    // attribute (start + header + 20 digest bytes)
                    let adjusted =
                        ((start + 24 - HEADER_LENGTH) as u16).to_be_bytes();
                    let digest = auth::hmac_sha1(
                        key.as_bytes(),
                        &[&buf[0..2], &adjusted, &buf[4..start]],
                    )?;

                    buf.put_u16(AttributeType::MESSAGE_INTEGRITY.value());
                    buf.put_u16(20);
                    buf.put_slice(&digest);
                }
                Attribute::Fingerprint(_) => {
                    let adjusted =
                        ((start + 8 - HEADER_LENGTH) as u16).to_be_bytes();
                    let crc = auth::fingerprint(&[&buf[0..2], &adjusted, &buf[4..start]]);

                    buf.put_u16(AttributeType::FINGERPRINT.value());
                    buf.put_u16(4);
                    buf.put_u32(crc);
                }
                _ => attribute.encode(&mut buf, &message.transaction_id),
            }

            let payload_len = buf.len() - start - ATTRIBUTE_HEADER_LENGTH;
            buf.put_bytes(0, pad4(payload_len));
        }

        Ok(buf.to_vec())
    }

    /// Asserts attribute order and adds attributes requested through the
    /// configuration: MESSAGE-INTEGRITY and FINGERPRINT move to the end,
    /// SOFTWARE is added when configured and absent, and a FINGERPRINT is
    /// synthesized when `always_sign` is set. Remembered attributes go
    /// back without a presentity check; they were vetted when first added.
    fn prepare_for_encoding(&mut self, config: &StackConfig) {
        let integrity = self.remove_attribute(AttributeType::MESSAGE_INTEGRITY);
        let mut fingerprint = self.remove_attribute(AttributeType::FINGERPRINT);

        if let Some(software) = &config.software {
            if !self.contains(AttributeType::SOFTWARE)
                && self.presentity_of(AttributeType::SOFTWARE) != Presentity::NotApplicable
            {
                self.attributes.push(Attribute::Software(software.clone()));
            }
        }

        if let Some(integrity) = integrity {
            self.attributes.push(integrity);
        }

        if fingerprint.is_none()
            && config.always_sign
            && self.presentity_of(AttributeType::FINGERPRINT) != Presentity::NotApplicable
        {
            fingerprint = Some(Attribute::Fingerprint(0));
        }

        if let Some(fingerprint) = fingerprint {
            self.attributes.push(fingerprint);
        }
    }

    /// Verify that the message has every attribute that is mandatory for
    /// its type.
    fn validate_attribute_presentity(&self) -> StackResult<()> {
        let column = match presentity_column(self.message_type) {
            Some(column) => column,
            None => return Ok(()),
        };

        for (attr_type, row) in crate::stun::attribute::PRESENTITY_TABLE.iter() {
            if row[column] == Presentity::Mandatory && !self.contains(*attr_type) {
                return Err(StunError::InvalidState(attr_type.to_string()).into());
            }
        }

        Ok(())
    }

    /// Constructs a message from its binary representation. Bytes past the
    /// declared length are ignored; the magic cookie is read but its value
    /// is not checked.
    pub fn decode(buf: &[u8]) -> StackResult<Message> {
        if buf.len() < HEADER_LENGTH {
            return Err(StunError::Malformed(format!(
                "message is {} bytes, shorter than the 20 byte header",
                buf.len()
            ))
            .into());
        }

        let message_type = u16::from_be_bytes([buf[0], buf[1]]);
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;

        if buf.len() - HEADER_LENGTH < length {
            return Err(StunError::Malformed(format!(
                "declared length {} overruns the {} byte buffer",
                length,
                buf.len()
            ))
            .into());
        }

        let transaction_id = TransactionId::from_slice(&buf[8..HEADER_LENGTH])?;
        let mut message = Message::new(message_type, transaction_id);
        let mut unknown = Vec::new();
        let mut consumed = 0usize;

        while consumed < length {
            let offset = HEADER_LENGTH + consumed;
            let (attribute, data_length) = Attribute::decode(
                &buf[offset..HEADER_LENGTH + length],
                &message.transaction_id,
            )?;

            if let Attribute::Fingerprint(received) = attribute {
                let computed = auth::fingerprint(&[&buf[..offset]]);
                if computed != received {
                    tracing::trace!(
                        "incoming message carries a wrong FINGERPRINT: was {:#010x}, should have been {:#010x}",
                        received,
                        computed
                    );
                    return Err(StunError::Malformed("bad fingerprint".to_string()).into());
                }
            }

            if let Attribute::Unknown { attr_type, .. } = &attribute {
                if AttributeType(*attr_type).is_comprehension_required() {
                    unknown.push(*attr_type);
                }
            }

            message.push_attribute(attribute);

            let len = ATTRIBUTE_HEADER_LENGTH + data_length as usize;
            consumed += len + pad4(len);
        }

        if !unknown.is_empty() {
            return Err(StunError::UnknownAttributes(unknown).into());
        }

        Ok(message)
    }

    /// Checks the MESSAGE-INTEGRITY digest of an encoded message against
    /// the given key. `raw` is the full wire image the message arrived in.
    pub fn verify_integrity(raw: &[u8], key: &super::auth::CredentialKey) -> StackResult<()> {
        if raw.len() < HEADER_LENGTH {
            return Err(StunError::Malformed("message len < 20".to_string()).into());
        }

        let length = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let end = (HEADER_LENGTH + length).min(raw.len());
        let mut offset = HEADER_LENGTH;

        while offset + ATTRIBUTE_HEADER_LENGTH <= end {
            let attr_type = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            let attr_len = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;

            if attr_type == AttributeType::MESSAGE_INTEGRITY.value() {
                if attr_len != 20 || offset + 24 > end {
                    return Err(StunError::Malformed(
                        "MESSAGE-INTEGRITY must be 20 bytes".to_string(),
                    )
                    .into());
                }

                let adjusted = ((offset + 24 - HEADER_LENGTH) as u16).to_be_bytes();
                let computed = auth::hmac_sha1(
                    key.as_bytes(),
                    &[&raw[0..2], &adjusted, &raw[4..offset]],
                )?;

                if computed != raw[offset + 4..offset + 24] {
                    return Err(StunError::Malformed(
                        "MESSAGE-INTEGRITY mismatch".to_string(),
                    )
                    .into());
                }

                return Ok(());
            }

            let len = ATTRIBUTE_HEADER_LENGTH + attr_len;
            offset += len + pad4(len);
        }

        Err(StunError::Malformed("no MESSAGE-INTEGRITY attribute".to_string()).into())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(0x{:04x})[attrib.count={} len={} tranID={}]",
            self.name(),
            self.message_type,
            self.attribute_count(),
            self.data_length(),
            self.transaction_id
        )
    }
}

/// Column of a message type in the presentity table, or `None` for types
/// the table does not cover (TURN error responses).
pub(crate) fn presentity_column(message_type: u16) -> Option<usize> {
    match message_type {
        BINDING_REQUEST => Some(0),
        BINDING_RESPONSE => Some(1),
        BINDING_ERROR_RESPONSE => Some(2),
        SHARED_SECRET_REQUEST => Some(3),
        SHARED_SECRET_RESPONSE => Some(4),
        SHARED_SECRET_ERROR_RESPONSE => Some(5),
        ALLOCATE_REQUEST => Some(6),
        ALLOCATE_RESPONSE => Some(7),
        REFRESH_REQUEST => Some(8),
        REFRESH_RESPONSE => Some(9),
        CHANNELBIND_REQUEST => Some(10),
        CHANNELBIND_RESPONSE => Some(11),
        SEND_INDICATION => Some(12),
        DATA_INDICATION => Some(13),
        _ => None,
    }
}
