//! Synchronous request/reply over an asynchronous transport.
//!
//! [`SyncGateway`] sends a request, remembers how its reply will be
//! recognised, and later waits for that reply by polling the
//! [`PendingReplyRegistry`] that the transport's listener fills through
//! [`SyncGateway::on_reply`]. One gateway serves any number of concurrent
//! exchanges; exchanges with different correlation keys never block each
//! other.
//!
//! Each exchange moves through [`ExchangeState`]:
//! `Created → Sent → AwaitingReply → {Completed | TimedOut | Failed}`.
//! Ephemeral reply destinations are released on every exit path.

use std::{fmt, sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{error, info, warn};

use crate::{
    config::{CorrelationMode, GatewayConfig},
    correlation::{CorrelationContext, CorrelationKey, CorrelationStrategy},
    destination::{
        DestinationError,
        DestinationLease,
        DestinationRef,
        ReplyDestination,
        ReplyDestinationStrategy,
    },
    error::{GatewayError, Result},
    message::{Message, REPLY_TO},
    metrics,
    poller::{PollTimeout, RetryPoller},
    registry::PendingReplyRegistry,
    transport::{ReplyCallback, Transport},
};

mod builder;

pub use builder::SyncGatewayBuilder;

/// Lifecycle of a single request/reply exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    /// Key derived, nothing dispatched yet.
    Created,
    /// Request accepted by the transport.
    Sent,
    /// A receive is polling for the reply.
    AwaitingReply,
    /// The reply was claimed.
    Completed,
    /// No reply arrived in time.
    TimedOut,
    /// Dispatch failed.
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::AwaitingReply => "awaiting reply",
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything the transport listener needs to file a reply.
struct ReplyInbox {
    registry: PendingReplyRegistry,
    correlator: Arc<dyn CorrelationStrategy>,
    mode: CorrelationMode,
}

impl ReplyInbox {
    fn accept(&self, reply: Message) {
        match self.correlator.key_for(&reply) {
            Ok(key) => {
                self.registry.deliver(key, reply);
                metrics::inc_delivered();
            }
            Err(_) if self.mode == CorrelationMode::Optional => {
                self.registry.deliver_uncorrelated(reply);
                metrics::inc_delivered();
            }
            Err(e) => {
                metrics::inc_dropped();
                warn!(
                    error = %e,
                    message_id = %reply.id(),
                    "dropping reply message without correlation key"
                );
            }
        }
    }

    fn claim(&self, key: &CorrelationKey) -> Option<Message> {
        self.registry.claim(key).or_else(|| match self.mode {
            CorrelationMode::Optional => self.registry.claim_uncorrelated(),
            CorrelationMode::Mandatory => None,
        })
    }
}

/// An in-flight exchange returned by [`SyncGateway::send`].
///
/// Owns the exchange's reply destination. Dropping a handle that still
/// holds an ephemeral destination deletes it in the background.
pub struct ReplyHandle<T: Transport> {
    key: CorrelationKey,
    lease: DestinationLease<T>,
    state: ExchangeState,
}

impl<T: Transport> ReplyHandle<T> {
    /// Correlation key of the exchange.
    #[must_use]
    pub fn key(&self) -> &CorrelationKey { &self.key }

    /// Where the reply is expected.
    #[must_use]
    pub fn reply_destination(&self) -> &ReplyDestination { self.lease.destination() }

    /// Current exchange state.
    #[must_use]
    pub fn state(&self) -> ExchangeState { self.state }

    /// Give up on the exchange and release its reply destination now.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError::Delete`] if an ephemeral destination could
    /// not be deleted.
    pub async fn close(mut self) -> std::result::Result<(), DestinationError> {
        self.lease.release().await
    }
}

impl<T: Transport> fmt::Debug for ReplyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("key", &self.key)
            .field("reply_destination", self.lease.destination())
            .field("state", &self.state)
            .finish()
    }
}

/// Request/reply gateway over a fire-and-forget [`Transport`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::{sync::Arc, time::Duration};
///
/// use replygate::{Message, SyncGateway, Transport};
///
/// # async fn demo<T: Transport>(transport: Arc<T>) -> replygate::Result<()> {
/// let gateway = SyncGateway::builder(transport)
///     .destination("orders.request")
///     .polling_interval(Duration::from_millis(100))
///     .build()
///     .expect("valid configuration");
///
/// let mut handle = gateway.send(Message::new("<order/>")).await?;
/// let reply = gateway.receive(&mut handle, Duration::from_secs(2)).await?;
/// # drop(reply);
/// # Ok(())
/// # }
/// ```
pub struct SyncGateway<T: Transport> {
    config: GatewayConfig,
    destination: DestinationRef,
    transport: Arc<T>,
    destinations: ReplyDestinationStrategy<T>,
    inbox: Arc<ReplyInbox>,
    listening: DashMap<DestinationRef, ()>,
}

impl<T: Transport> SyncGateway<T> {
    /// Start configuring a gateway over `transport`.
    #[must_use]
    pub fn builder(transport: Arc<T>) -> SyncGatewayBuilder<T> { SyncGatewayBuilder::new(transport) }

    fn from_parts(
        config: GatewayConfig,
        destination: DestinationRef,
        transport: Arc<T>,
        correlator: Arc<dyn CorrelationStrategy>,
    ) -> Self {
        let registry = match config.reply_ttl {
            Some(ttl) => PendingReplyRegistry::with_ttl(ttl),
            None => PendingReplyRegistry::new(),
        };
        let inbox = Arc::new(ReplyInbox {
            registry,
            correlator,
            mode: config.correlation_mode,
        });
        let destinations =
            ReplyDestinationStrategy::new(Arc::clone(&transport), config.reply_mode.clone());
        Self {
            config,
            destination,
            transport,
            destinations,
            inbox,
            listening: DashMap::new(),
        }
    }

    /// Gateway name.
    #[must_use]
    pub fn name(&self) -> &str { &self.config.name }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig { &self.config }

    /// Replies delivered but not yet claimed.
    #[must_use]
    pub fn registry(&self) -> &PendingReplyRegistry { &self.inbox.registry }

    /// Context variable name holding this gateway's latest correlation key.
    #[must_use]
    pub fn key_name(&self) -> String { self.inbox.correlator.key_name(&self.config.name) }

    /// Callback suitable for [`Transport::listen`], forwarding to
    /// [`Self::on_reply`]. It keeps the registry alive, not the gateway.
    #[must_use]
    pub fn reply_callback(&self) -> ReplyCallback {
        let inbox = Arc::clone(&self.inbox);
        Arc::new(move |reply| inbox.accept(reply))
    }

    /// File an inbound reply under its correlation key.
    ///
    /// Called from transport listener threads. Never blocks and never fails:
    /// replies for unknown keys are stored until claimed or pruned, and
    /// replies without a key are dropped (or queued in
    /// [`CorrelationMode::Optional`]) and logged.
    pub fn on_reply(&self, reply: Message) { self.inbox.accept(reply); }

    /// Drop unclaimed replies older than the configured TTL.
    pub fn prune_abandoned(&self) -> usize { self.inbox.registry.prune_expired() }

    /// Send `request`, keyed by the configured correlation strategy.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Destination`] if no reply destination could be
    /// set up (nothing is sent) and [`GatewayError::Send`] if the transport
    /// rejects the request (the destination is released first).
    pub async fn send(&self, request: Message) -> Result<ReplyHandle<T>> {
        let key = self.inbox.correlator.generate(&request);
        self.dispatch(request, key, false).await
    }

    /// Send `request` under an explicit correlation key.
    ///
    /// The key is stamped into the correlation header, replacing any value
    /// already there.
    ///
    /// # Errors
    ///
    /// As for [`Self::send`].
    pub async fn send_with_key(
        &self,
        request: Message,
        key: CorrelationKey,
    ) -> Result<ReplyHandle<T>> {
        self.dispatch(request, key, true).await
    }

    /// Send `request` and remember its key in `ctx` under [`Self::key_name`].
    ///
    /// # Errors
    ///
    /// As for [`Self::send`]; `ctx` is untouched on failure.
    pub async fn send_in_context(
        &self,
        request: Message,
        ctx: &mut CorrelationContext,
    ) -> Result<ReplyHandle<T>> {
        let handle = self.send(request).await?;
        ctx.save_correlation_key(self.key_name(), handle.key.clone());
        Ok(handle)
    }

    async fn dispatch(
        &self,
        mut request: Message,
        key: CorrelationKey,
        explicit_key: bool,
    ) -> Result<ReplyHandle<T>> {
        let mut lease = self.destinations.acquire(&request).await.map_err(|source| {
            metrics::inc_send_failures();
            GatewayError::Destination {
                key: key.clone(),
                source,
            }
        })?;

        if let Err(source) = self.listen(lease.destination()) {
            metrics::inc_send_failures();
            release_logged(&mut lease, &key).await;
            return Err(GatewayError::Destination { key, source });
        }

        request.set_header(REPLY_TO, lease.destination().destination().name());
        if let Some(header) = self.inbox.correlator.header() {
            if explicit_key || request.header_text(header).is_none() {
                request.set_header(header, key.as_str());
            }
        }

        if let Err(source) = self.transport.send(&self.destination, request).await {
            metrics::inc_send_failures();
            warn!(
                correlation_key = %key,
                destination = %self.destination,
                state = %ExchangeState::Failed,
                error = %source,
                "failed to send request message"
            );
            release_logged(&mut lease, &key).await;
            return Err(GatewayError::Send {
                key,
                destination: self.destination.clone(),
                source,
            });
        }

        info!(
            correlation_key = %key,
            destination = %self.destination,
            reply_destination = %lease.destination(),
            "message was sent to destination '{}'",
            self.destination
        );
        Ok(ReplyHandle {
            key,
            lease,
            state: ExchangeState::Sent,
        })
    }

    fn listen(&self, destination: &ReplyDestination) -> std::result::Result<(), DestinationError> {
        let dest = destination.destination();
        let listen = || {
            self.transport
                .listen(dest, self.reply_callback())
                .map_err(|source| DestinationError::Listen {
                    destination: dest.clone(),
                    source,
                })
        };
        if destination.is_ephemeral() {
            return listen();
        }
        // Registration happens under the entry lock so no request is sent
        // to a shared destination before its listener exists.
        match self.listening.entry(dest.clone()) {
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                listen()?;
                slot.insert(());
                Ok(())
            }
        }
    }

    /// Wait up to `timeout` for the reply to `handle`.
    ///
    /// The registry is checked at once and then every polling interval; the
    /// reply destination is released whether or not a reply arrives.
    ///
    /// Dropping the returned future before the wait ends leaves the handle
    /// in [`ExchangeState::Sent`], ready for another receive.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ReceiveTimeout`] if no correlated reply arrives
    /// in time and [`GatewayError::InvalidState`] if the handle is not in the
    /// [`ExchangeState::Sent`] state.
    pub async fn receive(&self, handle: &mut ReplyHandle<T>, timeout: Duration) -> Result<Message> {
        if handle.state != ExchangeState::Sent {
            return Err(GatewayError::InvalidState {
                key: handle.key.clone(),
                state: handle.state,
            });
        }
        let ReplyHandle { key, lease, state } = handle;
        let key = &*key;
        let mut awaiting = AwaitingReply::enter(state);
        info!(
            correlation_key = %key,
            reply_destination = %lease.destination(),
            "receiving reply message on destination '{}'",
            lease.destination()
        );

        let outcome = self.poller(timeout).poll(|| self.inbox.claim(key)).await;
        let destination = lease.destination().to_string();
        let result = match outcome {
            Ok(reply) => {
                awaiting.settle(ExchangeState::Completed);
                metrics::inc_claimed();
                info!(
                    correlation_key = %key,
                    message_id = %reply.id(),
                    "received reply message on destination '{destination}'"
                );
                Ok(reply)
            }
            Err(timed_out) => {
                awaiting.settle(ExchangeState::TimedOut);
                // A reply racing the deadline would otherwise never be claimed.
                self.inbox.registry.remove(key);
                Err(self.timeout_error(key.clone(), destination, timeout, timed_out))
            }
        };
        release_logged(lease, key).await;
        result
    }

    /// [`Self::receive`] with the configured default timeout.
    ///
    /// # Errors
    ///
    /// As for [`Self::receive`].
    pub async fn receive_default(&self, handle: &mut ReplyHandle<T>) -> Result<Message> {
        self.receive(handle, self.config.timeout).await
    }

    /// Wait for a reply stored under an arbitrary `key`.
    ///
    /// Useful with shared reply destinations where the key is known but no
    /// handle is at hand. Releases nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ReceiveTimeout`] if nothing arrives in time.
    pub async fn receive_key(&self, key: &CorrelationKey, timeout: Duration) -> Result<Message> {
        match self.poller(timeout).poll(|| self.inbox.claim(key)).await {
            Ok(reply) => {
                metrics::inc_claimed();
                info!(correlation_key = %key, message_id = %reply.id(), "received reply message");
                Ok(reply)
            }
            Err(timed_out) => {
                let destination = self.config.name.clone();
                Err(self.timeout_error(key.clone(), destination, timeout, timed_out))
            }
        }
    }

    /// Wait for the reply to the latest request sent through `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Correlation`] if `ctx` holds no key for this
    /// gateway, otherwise as for [`Self::receive_key`].
    pub async fn receive_latest(
        &self,
        ctx: &CorrelationContext,
        timeout: Duration,
    ) -> Result<Message> {
        let key = ctx.correlation_key(&self.key_name())?;
        self.receive_key(&key, timeout).await
    }

    /// Send `request` and wait for its reply with the default timeout.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::send`] or [`Self::receive`].
    pub async fn exchange(&self, request: Message) -> Result<Message> {
        let mut handle = self.send(request).await?;
        self.receive_default(&mut handle).await
    }

    fn poller(&self, timeout: Duration) -> RetryPoller {
        RetryPoller::new(self.config.polling_interval, timeout)
    }

    fn timeout_error(
        &self,
        key: CorrelationKey,
        destination: String,
        timeout: Duration,
        timed_out: PollTimeout,
    ) -> GatewayError {
        metrics::inc_timeouts();
        warn!(
            correlation_key = %key,
            destination = %destination,
            timeout_ms = timeout.as_millis(),
            elapsed_ms = timed_out.elapsed.as_millis(),
            attempts = timed_out.attempts,
            gateway = %self.config.name,
            "no reply message within timeout"
        );
        GatewayError::ReceiveTimeout {
            key,
            destination,
            timeout,
            elapsed: timed_out.elapsed,
            attempts: timed_out.attempts,
        }
    }
}

/// Marks a handle as awaiting its reply for the length of one receive.
///
/// A receive dropped before it settles puts the handle back to
/// [`ExchangeState::Sent`] so it can be received again.
struct AwaitingReply<'a> {
    state: &'a mut ExchangeState,
    settled: bool,
}

impl<'a> AwaitingReply<'a> {
    fn enter(state: &'a mut ExchangeState) -> Self {
        *state = ExchangeState::AwaitingReply;
        Self {
            state,
            settled: false,
        }
    }

    fn settle(&mut self, outcome: ExchangeState) {
        *self.state = outcome;
        self.settled = true;
    }
}

impl Drop for AwaitingReply<'_> {
    fn drop(&mut self) {
        if !self.settled {
            *self.state = ExchangeState::Sent;
        }
    }
}

async fn release_logged<T: Transport>(lease: &mut DestinationLease<T>, key: &CorrelationKey) {
    if let Err(e) = lease.release().await {
        error!(correlation_key = %key, error = %e, "error while deleting reply destination");
    }
}
