//! Builder for configuring a [`SyncGateway`].

use std::{sync::Arc, time::Duration};

use super::SyncGateway;
use crate::{
    config::{ConfigError, CorrelationMode, GatewayConfig, ReplyMode},
    correlation::{CorrelationStrategy, HeaderCorrelator},
    destination::DestinationRef,
    transport::Transport,
};

/// Builder for [`SyncGateway`].
///
/// Starts from [`GatewayConfig::default`]; only the request destination is
/// mandatory. Construct via [`SyncGateway::builder`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::{sync::Arc, time::Duration};
///
/// use replygate::{SyncGateway, Transport};
///
/// # fn demo<T: Transport>(transport: Arc<T>) {
/// let gateway = SyncGateway::builder(transport)
///     .name("orders")
///     .destination("orders.request")
///     .shared_reply_destination("orders.reply")
///     .timeout(Duration::from_secs(2))
///     .polling_interval(Duration::from_millis(50))
///     .build()
///     .expect("failed to build gateway");
/// # drop(gateway);
/// # }
/// ```
pub struct SyncGatewayBuilder<T: Transport> {
    transport: Arc<T>,
    config: GatewayConfig,
    correlator: Option<Arc<dyn CorrelationStrategy>>,
}

impl<T: Transport> SyncGatewayBuilder<T> {
    pub(super) fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            config: GatewayConfig::default(),
            correlator: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in diagnostics and context key names.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Destination requests are sent to.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.config.destination = Some(DestinationRef::new(destination));
        self
    }

    /// Default receive timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Pause between registry checks while waiting for a reply.
    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.config.polling_interval = interval;
        self
    }

    /// Header the remote party echoes the correlation key in.
    ///
    /// Ignored when a custom [`Self::correlator`] is supplied.
    #[must_use]
    pub fn correlation_header(mut self, header: impl Into<String>) -> Self {
        self.config.correlation_header = header.into();
        self
    }

    /// Create an ephemeral reply destination per request (the default).
    #[must_use]
    pub fn ephemeral_replies(mut self) -> Self {
        self.config.reply_mode = ReplyMode::Ephemeral;
        self
    }

    /// Receive every reply on one pre-configured destination.
    #[must_use]
    pub fn shared_reply_destination(mut self, destination: impl Into<String>) -> Self {
        self.config.reply_mode = ReplyMode::Shared(DestinationRef::new(destination));
        self
    }

    /// Resolve the reply destination from `name` on every send.
    #[must_use]
    pub fn reply_destination_name(mut self, name: impl Into<String>) -> Self {
        self.config.reply_mode = ReplyMode::Named(name.into());
        self
    }

    /// How replies without a correlation key are treated.
    #[must_use]
    pub fn correlation_mode(mut self, mode: CorrelationMode) -> Self {
        self.config.correlation_mode = mode;
        self
    }

    /// Age after which unclaimed replies are discarded; `None` keeps them.
    #[must_use]
    pub fn reply_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.reply_ttl = ttl;
        self
    }

    /// Use a custom correlation strategy.
    #[must_use]
    pub fn correlator(mut self, correlator: impl CorrelationStrategy) -> Self {
        let correlator: Arc<dyn CorrelationStrategy> = Arc::new(correlator);
        self.correlator = Some(correlator);
        self
    }

    /// Build the gateway.
    ///
    /// The polling interval is normalised with [`GatewayConfig::normalized`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when [`GatewayConfig::validate`] fails.
    pub fn build(self) -> Result<SyncGateway<T>, ConfigError> {
        let config = self.config.normalized();
        config.validate()?;
        let destination = config
            .destination
            .clone()
            .ok_or(ConfigError::MissingDestination)?;
        let correlator: Arc<dyn CorrelationStrategy> = match self.correlator {
            Some(correlator) => correlator,
            None => Arc::new(HeaderCorrelator::new(config.correlation_header.clone())),
        };
        Ok(SyncGateway::from_parts(
            config,
            destination,
            self.transport,
            correlator,
        ))
    }
}
