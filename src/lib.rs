#![doc(html_root_url = "https://docs.rs/replygate/latest")]
//! Public API for the `replygate` library.
//!
//! This crate layers synchronous request/reply exchanges over transports
//! that only offer fire-and-forget sends and asynchronous delivery. A
//! [`SyncGateway`] tags each request with a correlation key, names a reply
//! destination, and waits for the matching reply with bounded polling.

pub mod config;
pub mod correlation;
pub mod destination;
pub mod error;
pub mod gateway;
pub mod loopback;
pub mod message;
pub mod metrics;
pub mod poller;
pub mod prelude;
pub mod registry;
pub mod transport;

pub use config::{ConfigError, CorrelationMode, GatewayConfig, ReplyMode};
pub use correlation::{
    CorrelationContext,
    CorrelationError,
    CorrelationKey,
    CorrelationStrategy,
    HeaderCorrelator,
};
pub use destination::{
    DestinationError,
    DestinationLease,
    DestinationRef,
    ReplyDestination,
    ReplyDestinationStrategy,
};
pub use error::{GatewayError, Result};
pub use gateway::{ExchangeState, ReplyHandle, SyncGateway, SyncGatewayBuilder};
pub use message::{HeaderValue, Message, MessageId, WireMessage};
pub use metrics::{
    EPHEMERAL_DESTINATIONS_ACTIVE,
    RECEIVE_TIMEOUTS,
    REPLIES_CLAIMED,
    REPLIES_DELIVERED,
    REPLIES_DROPPED,
    SEND_FAILURES,
};
pub use poller::{PollTimeout, RetryPoller};
pub use registry::PendingReplyRegistry;
pub use transport::{ReplyCallback, Transport, TransportError};
