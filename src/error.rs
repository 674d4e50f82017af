//! Canonical error and result types for the crate.
//!
//! `GatewayError` is the single error surfaced by [`crate::SyncGateway`]
//! operations. Timeouts are an expected outcome and carry enough context
//! (key, destination, elapsed time, poll count) to tell a flaky system from a
//! slow one.

use std::time::Duration;

use crate::{
    correlation::{CorrelationError, CorrelationKey},
    destination::{DestinationError, DestinationRef},
    gateway::ExchangeState,
    transport::TransportError,
};

/// Top-level error type exposed by `replygate`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The reply destination could not be created, resolved or listened on.
    /// Fatal for this send only.
    #[error("reply destination unavailable for correlation key '{key}'")]
    Destination {
        /// Key of the affected exchange.
        key: CorrelationKey,
        /// Underlying destination failure.
        #[source]
        source: DestinationError,
    },
    /// A correlation key could not be derived or found.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// The transport refused the request. The reply destination has already
    /// been released.
    #[error("failed to send message to '{destination}' (correlation key '{key}')")]
    Send {
        /// Key of the failed exchange.
        key: CorrelationKey,
        /// Destination the request was addressed to.
        destination: DestinationRef,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
    /// No correlated reply arrived in time. Not a transport fault.
    #[error(
        "action timeout after {timeout_ms} milliseconds. Failed to receive synchronous reply \
         message on endpoint: '{destination}' (correlation key '{key}', {attempts} checks in \
         {elapsed:?})",
        timeout_ms = .timeout.as_millis()
    )]
    ReceiveTimeout {
        /// Key that was waited on.
        key: CorrelationKey,
        /// Reply destination, or the gateway name when none is known.
        destination: String,
        /// Configured timeout.
        timeout: Duration,
        /// Time actually spent waiting.
        elapsed: Duration,
        /// Number of registry checks performed.
        attempts: u32,
    },
    /// The exchange is not waiting for a reply.
    #[error("exchange with correlation key '{key}' is {state}; no reply can be received")]
    InvalidState {
        /// Key of the exchange.
        key: CorrelationKey,
        /// Its current state.
        state: ExchangeState,
    },
}

impl GatewayError {
    /// Whether this error is a receive timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool { matches!(self, Self::ReceiveTimeout { .. }) }
}

/// Canonical result alias used by `replygate` public APIs.
pub type Result<T> = std::result::Result<T, GatewayError>;
