//! Boundary with the transport adapter that physically moves messages.
//!
//! The gateway never talks to a broker directly. It dispatches requests,
//! manages ephemeral reply destinations and registers its reply callback
//! through this trait, so any queue, topic or in-memory channel can back it.

use std::{io, sync::Arc};

use async_trait::async_trait;

use crate::{destination::DestinationRef, message::Message};

/// Callback invoked by a transport for every inbound message on a
/// destination it was registered for.
///
/// Callbacks run on transport-owned threads or tasks and must not block.
pub type ReplyCallback = Arc<dyn Fn(Message) + Send + Sync + 'static>;

/// Errors reported synchronously by a transport adapter.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is not connected or has been shut down.
    #[error("transport unavailable")]
    Unavailable,
    /// The transport refused the operation.
    #[error("transport rejected operation: {0}")]
    Rejected(String),
    /// The named destination does not exist.
    #[error("unknown destination '{0}'")]
    UnknownDestination(String),
    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Operations the gateway needs from a message transport.
///
/// `send` is fire-and-forget: success means the transport accepted the
/// message, not that anybody consumed it. Ephemeral destination creation and
/// deletion are generally not idempotent, so callers must delete each created
/// destination exactly once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Dispatch `message` to `destination`.
    async fn send(&self, destination: &DestinationRef, message: Message)
    -> Result<(), TransportError>;

    /// Create a uniquely named destination that lives for one exchange.
    async fn create_ephemeral(&self) -> Result<DestinationRef, TransportError>;

    /// Delete a destination previously returned by [`Transport::create_ephemeral`].
    async fn delete(&self, destination: &DestinationRef) -> Result<(), TransportError>;

    /// Resolve a destination from its configured name.
    ///
    /// The default implementation treats the name as the destination.
    async fn resolve(&self, name: &str) -> Result<DestinationRef, TransportError> {
        Ok(DestinationRef::new(name))
    }

    /// Register `callback` for every message arriving on `destination`.
    ///
    /// Exactly one callback is registered per destination.
    fn listen(
        &self,
        destination: &DestinationRef,
        callback: ReplyCallback,
    ) -> Result<(), TransportError>;
}
