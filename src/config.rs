//! Gateway configuration.
//!
//! Defaults follow the conventions of synchronous test endpoints: wait five
//! seconds for a reply, re-check every half second, correlate on the
//! [`CORRELATION_ID`] header and create an ephemeral reply destination per
//! request.

use std::time::Duration;

use crate::{destination::DestinationRef, message::CORRELATION_ID};

/// Default time `receive` waits for a correlated reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default pause between registry checks while waiting.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);
/// Default age after which unclaimed replies are discarded.
pub const DEFAULT_REPLY_TTL: Duration = Duration::from_secs(60);
/// Smallest polling interval accepted; shorter values are raised to it.
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(1);

/// How reply destinations are chosen when the request names none.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ReplyMode {
    /// Create a temporary destination per request.
    #[default]
    Ephemeral,
    /// Use one long-lived destination for every request.
    Shared(DestinationRef),
    /// Resolve the named destination on every send.
    Named(String),
}

/// Whether replies without a correlation key are acceptable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Replies without a key are dropped and logged.
    #[default]
    Mandatory,
    /// Replies without a key queue under a default key; the first such
    /// reply is handed to the first waiter that finds nothing under its own
    /// key.
    Optional,
}

/// Errors raised while building a gateway.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No request destination was configured.
    #[error("unable to send message - request destination not set")]
    MissingDestination,
    /// The correlation header name was empty.
    #[error("correlation header name must not be empty")]
    EmptyCorrelationHeader,
}

/// Settings consumed by [`crate::SyncGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Gateway name, used in diagnostics and correlation key names.
    pub name: String,
    /// Where requests are sent.
    pub destination: Option<DestinationRef>,
    /// Default receive timeout.
    pub timeout: Duration,
    /// Pause between registry checks.
    pub polling_interval: Duration,
    /// Header echoing the correlation key on replies.
    pub correlation_header: String,
    /// Reply destination selection.
    pub reply_mode: ReplyMode,
    /// Handling of replies without a key.
    pub correlation_mode: CorrelationMode,
    /// Age after which unclaimed replies are pruned; `None` keeps them.
    pub reply_ttl: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "sync-gateway".to_owned(),
            destination: None,
            timeout: DEFAULT_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            correlation_header: CORRELATION_ID.to_owned(),
            reply_mode: ReplyMode::default(),
            correlation_mode: CorrelationMode::default(),
            reply_ttl: Some(DEFAULT_REPLY_TTL),
        }
    }
}

impl GatewayConfig {
    /// Clamp the polling interval to [`MIN_POLLING_INTERVAL`].
    ///
    /// A zero interval would turn the receive loop into a busy spin.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use replygate::config::{GatewayConfig, MIN_POLLING_INTERVAL};
    ///
    /// let cfg = GatewayConfig {
    ///     polling_interval: Duration::ZERO,
    ///     ..GatewayConfig::default()
    /// };
    /// assert_eq!(cfg.normalized().polling_interval, MIN_POLLING_INTERVAL);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.polling_interval = self.polling_interval.max(MIN_POLLING_INTERVAL);
        self
    }

    /// Check the settings needed to send.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDestination`] without a request
    /// destination and [`ConfigError::EmptyCorrelationHeader`] when the
    /// header name is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.is_none() {
            return Err(ConfigError::MissingDestination);
        }
        if self.correlation_header.is_empty() {
            return Err(ConfigError::EmptyCorrelationHeader);
        }
        Ok(())
    }
}
