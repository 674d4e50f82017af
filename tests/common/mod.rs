//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use replygate::{CorrelationKey, Message, message::CORRELATION_ID};

/// Result type for tests that propagate errors with `?`.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Build a correlation key, panicking on an empty string.
pub fn key(raw: &str) -> CorrelationKey { CorrelationKey::new(raw).expect("non-empty key") }

/// A reply carrying `key` in the default correlation header.
pub fn reply(key: &str, payload: &str) -> Message {
    Message::new(payload.to_owned()).with_header(CORRELATION_ID, key)
}

/// Payload of `message` as UTF-8 text.
pub fn text(message: &Message) -> String {
    String::from_utf8_lossy(message.payload().as_ref()).into_owned()
}
