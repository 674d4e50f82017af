//! Messages exchanged through a [`crate::SyncGateway`].
//!
//! A [`Message`] is an opaque payload plus a header map. The gateway reads
//! three attributes: the unique [`MessageId`], the optional reply-to hint and
//! the optional correlation header. Everything else travels untouched.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use uuid::Uuid;

pub mod codec;

pub use codec::WireMessage;

/// Header carrying the name of the destination replies must be sent to.
pub const REPLY_TO: &str = "reply_to";

/// Default header used to echo a request's correlation key on its reply.
pub const CORRELATION_ID: &str = "correlation_id";

/// Unique identifier assigned to every message at construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh, globally unique identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Wrap an existing identifier, for example one assigned by a broker.
    ///
    /// An empty identifier is replaced by a generated one.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            return Self::generate();
        }
        Self(id)
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Value stored under a message header.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum HeaderValue {
    /// UTF-8 text.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
}

impl HeaderValue {
    /// Return the text content if this is a [`HeaderValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Integer(_) | Self::Boolean(_) => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self { Self::Text(value) }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self { Self::Integer(value) }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self { Self::Boolean(value) }
}

/// Payload plus headers, with a unique identifier.
///
/// Header keys are unique; setting an existing key replaces its value.
///
/// # Examples
///
/// ```
/// use replygate::message::{CORRELATION_ID, Message};
///
/// let msg = Message::new("<ping/>").with_header(CORRELATION_ID, "R-1");
/// assert_eq!(msg.header_text(CORRELATION_ID), Some("R-1"));
/// assert_eq!(msg.payload().as_ref(), b"<ping/>");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    headers: BTreeMap<String, HeaderValue>,
    payload: Bytes,
}

impl Message {
    /// Create a message with a freshly generated identifier and no headers.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            id: MessageId::generate(),
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Replace the generated identifier.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set a header in place, returning the previous value.
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        self.headers.insert(name.into(), value.into())
    }

    /// Remove a header, returning its value if present.
    pub fn remove_header(&mut self, name: &str) -> Option<HeaderValue> { self.headers.remove(name) }

    /// Unique identifier of this message.
    #[must_use]
    pub fn id(&self) -> &MessageId { &self.id }

    /// Look up a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> { self.headers.get(name) }

    /// Look up a header and return it only if it holds non-empty text.
    #[must_use]
    pub fn header_text(&self, name: &str) -> Option<&str> {
        self.header(name)
            .and_then(HeaderValue::as_text)
            .filter(|text| !text.is_empty())
    }

    /// Destination named by the [`REPLY_TO`] header, if any.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> { self.header_text(REPLY_TO) }

    /// All headers in key order.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, HeaderValue> { &self.headers }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}
