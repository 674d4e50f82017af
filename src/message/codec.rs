//! Encoded wire form of a [`Message`].
//!
//! Transports that move messages across a byte boundary encode them with
//! bincode's standard configuration. Decoding restores the identifier,
//! headers and payload exactly.

use std::collections::BTreeMap;

use bincode::{
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

use super::{HeaderValue, Message, MessageId};

/// Owned, bincode-friendly mirror of [`Message`].
#[derive(Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct WireMessage {
    id: String,
    headers: BTreeMap<String, HeaderValue>,
    payload: Vec<u8>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.as_str().to_owned(),
            headers: message.headers.clone(),
            payload: message.payload.to_vec(),
        }
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: MessageId::new(wire.id),
            headers: wire.headers,
            payload: wire.payload.into(),
        }
    }
}

impl Message {
    /// Encode the message into its wire form.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if bincode cannot serialize the message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_to_vec(WireMessage::from(self), config::standard())
    }

    /// Decode a message from its wire form, returning the message and the
    /// number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the bytes are not a valid encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let (wire, used): (WireMessage, usize) = decode_from_slice(bytes, config::standard())?;
        Ok((wire.into(), used))
    }
}
