//! Correlation keys and the strategies that derive them.
//!
//! A [`CorrelationKey`] ties a reply to the request that caused it. The
//! default [`HeaderCorrelator`] keys a request by its correlation header (or,
//! when absent, its message identifier) and expects the remote party to echo
//! that value back in the same header on the reply.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::message::{CORRELATION_ID, Message};

/// Prefix of the context variable holding a gateway's latest key.
pub const KEY_NAME_PREFIX: &str = "replygate_correlator_";

/// Identifier matching a reply to its originating request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey(Arc<str>);

impl CorrelationKey {
    /// Create a key from a non-empty string.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::EmptyKey`] if `key` is empty.
    pub fn new(key: impl AsRef<str>) -> Result<Self, CorrelationError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(CorrelationError::EmptyKey);
        }
        Ok(Self(Arc::from(key)))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Failures while deriving or looking up correlation keys.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    /// The reply does not carry the configured correlation header.
    #[error("reply message has no correlation header '{header}'")]
    MissingHeader {
        /// Header that was expected to hold the key.
        header: String,
    },
    /// No key was saved under the requested name.
    #[error("failed to get correlation key for '{name}'")]
    UnknownKeyName {
        /// Name the key was looked up under.
        name: String,
    },
    /// A correlation key must not be empty.
    #[error("correlation key must not be empty")]
    EmptyKey,
}

/// Derives correlation keys for requests and their replies.
///
/// Implementations must be pure and symmetric: under the transport's echoing
/// contract, `key_for(reply)` returns exactly what `generate(request)`
/// returned for the matching request.
pub trait CorrelationStrategy: Send + Sync + 'static {
    /// Key for an outgoing request.
    fn generate(&self, request: &Message) -> CorrelationKey;

    /// Key carried by an incoming reply.
    ///
    /// # Errors
    ///
    /// Returns a [`CorrelationError`] when the reply carries no key.
    fn key_for(&self, reply: &Message) -> Result<CorrelationKey, CorrelationError>;

    /// Header the key is stamped into on outgoing requests, if any.
    fn header(&self) -> Option<&str> { None }

    /// Name under which the latest key of `gateway` is stored in a
    /// [`CorrelationContext`].
    fn key_name(&self, gateway: &str) -> String { format!("{KEY_NAME_PREFIX}{gateway}") }
}

/// Default strategy keyed by a single header.
///
/// # Examples
///
/// ```
/// use replygate::{
///     correlation::{CorrelationStrategy, HeaderCorrelator},
///     message::{CORRELATION_ID, Message},
/// };
///
/// let correlator = HeaderCorrelator::default();
/// let request = Message::new("ping");
/// let key = correlator.generate(&request);
///
/// let reply = Message::new("pong").with_header(CORRELATION_ID, request.id().as_str());
/// assert_eq!(correlator.key_for(&reply), Ok(key));
/// ```
#[derive(Clone, Debug)]
pub struct HeaderCorrelator {
    header: String,
}

impl HeaderCorrelator {
    /// Correlate on `header` instead of [`CORRELATION_ID`].
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderCorrelator {
    fn default() -> Self { Self::new(CORRELATION_ID) }
}

impl CorrelationStrategy for HeaderCorrelator {
    fn generate(&self, request: &Message) -> CorrelationKey {
        let raw = request
            .header_text(&self.header)
            .unwrap_or_else(|| request.id().as_str());
        // MessageId::new never yields an empty id; header_text skips empty values.
        CorrelationKey(Arc::from(raw))
    }

    fn key_for(&self, reply: &Message) -> Result<CorrelationKey, CorrelationError> {
        reply
            .header_text(&self.header)
            .map(|raw| CorrelationKey(Arc::from(raw)))
            .ok_or_else(|| CorrelationError::MissingHeader {
                header: self.header.clone(),
            })
    }

    fn header(&self) -> Option<&str> { Some(&self.header) }
}

/// Per-test variable scope remembering the latest key sent by each gateway.
///
/// Lets a later step wait for "the reply to whatever I sent last" without
/// threading the key through by hand.
#[derive(Clone, Debug, Default)]
pub struct CorrelationContext {
    keys: HashMap<String, CorrelationKey>,
}

impl CorrelationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Store `key` under `name`, replacing any earlier key.
    pub fn save_correlation_key(&mut self, name: impl Into<String>, key: CorrelationKey) {
        self.keys.insert(name.into(), key);
    }

    /// Fetch the key stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::UnknownKeyName`] if nothing was saved.
    pub fn correlation_key(&self, name: &str) -> Result<CorrelationKey, CorrelationError> {
        self.keys
            .get(name)
            .cloned()
            .ok_or_else(|| CorrelationError::UnknownKeyName {
                name: name.to_owned(),
            })
    }
}
