//! Reply destinations and their lifecycle.
//!
//! A request's replies arrive on one of three kinds of destination:
//!
//! - [`ReplyDestination::Ephemeral`]: created through the transport for a single exchange and
//!   deleted once that exchange ends, whatever the outcome.
//! - [`ReplyDestination::Shared`]: a long-lived, pre-configured destination shared by concurrent
//!   exchanges. Replies are told apart solely by correlation key.
//! - [`ReplyDestination::Named`]: resolved from a name on every send.
//!
//! [`ReplyDestinationStrategy::acquire`] hands out a [`DestinationLease`]
//! that deletes an ephemeral destination exactly once: either when
//! [`DestinationLease::release`] is awaited or, failing that, from its drop
//! guard. Deletion is not transactional with claiming the reply; a crash
//! between the two leaks the remote destination.

use std::{fmt, sync::Arc};

use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::{
    config::ReplyMode,
    message::Message,
    metrics,
    transport::{Transport, TransportError},
};

/// Transport-level name of a destination.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationRef(String);

impl DestinationRef {
    /// Wrap a destination name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    /// Borrow the destination name.
    #[must_use]
    pub fn name(&self) -> &str { &self.0 }
}

impl fmt::Display for DestinationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for DestinationRef {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Where replies for one request must arrive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyDestination {
    /// Created for this exchange and deleted afterwards.
    Ephemeral(DestinationRef),
    /// Pre-configured and shared between exchanges.
    Shared(DestinationRef),
    /// Resolved from a name at send time.
    Named(DestinationRef),
}

impl ReplyDestination {
    /// The underlying transport destination.
    #[must_use]
    pub fn destination(&self) -> &DestinationRef {
        match self {
            Self::Ephemeral(dest) | Self::Shared(dest) | Self::Named(dest) => dest,
        }
    }

    /// Whether this destination must be deleted after use.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool { matches!(self, Self::Ephemeral(_)) }
}

impl fmt::Display for ReplyDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.destination(), f)
    }
}

/// Failures creating, resolving or deleting reply destinations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    /// The transport could not create an ephemeral destination.
    #[error("failed to create ephemeral reply destination")]
    Create(#[source] TransportError),
    /// The transport could not delete an ephemeral destination.
    #[error("failed to delete ephemeral reply destination '{destination}'")]
    Delete {
        /// Destination that could not be deleted.
        destination: DestinationRef,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
    /// A named destination could not be resolved.
    #[error("failed to resolve reply destination '{name}'")]
    Resolve {
        /// Name that failed to resolve.
        name: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
    /// The reply callback could not be registered.
    #[error("failed to listen on reply destination '{destination}'")]
    Listen {
        /// Destination the listener was meant for.
        destination: DestinationRef,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
}

/// Decides where replies must arrive and owns ephemeral lifecycles.
///
/// Resolution order for a request:
///
/// 1. a [`crate::message::REPLY_TO`] header on the request, resolved as a named destination;
/// 2. the configured [`ReplyMode`].
pub struct ReplyDestinationStrategy<T> {
    transport: Arc<T>,
    mode: ReplyMode,
}

impl<T: Transport> ReplyDestinationStrategy<T> {
    /// Create a strategy resolving through `transport` according to `mode`.
    #[must_use]
    pub fn new(transport: Arc<T>, mode: ReplyMode) -> Self { Self { transport, mode } }

    /// Configured reply mode.
    #[must_use]
    pub fn mode(&self) -> &ReplyMode { &self.mode }

    /// Decide the reply destination for `request`.
    ///
    /// Ephemeral destinations returned here must be passed to
    /// [`Self::release`] exactly once; prefer [`Self::acquire`], which
    /// enforces that.
    ///
    /// # Errors
    ///
    /// Returns a [`DestinationError`] if creation or resolution fails. No
    /// destination is left behind in that case.
    pub async fn resolve(&self, request: &Message) -> Result<ReplyDestination, DestinationError> {
        if let Some(name) = request.reply_to() {
            return self.resolve_named(name).await;
        }
        match &self.mode {
            ReplyMode::Shared(dest) => Ok(ReplyDestination::Shared(dest.clone())),
            ReplyMode::Named(name) => self.resolve_named(name).await,
            ReplyMode::Ephemeral => {
                let dest = self
                    .transport
                    .create_ephemeral()
                    .await
                    .map_err(DestinationError::Create)?;
                metrics::inc_ephemeral_destinations();
                debug!(destination = %dest, "created ephemeral reply destination");
                Ok(ReplyDestination::Ephemeral(dest))
            }
        }
    }

    /// Release a destination obtained from [`Self::resolve`].
    ///
    /// Deletes ephemeral destinations; shared and named ones are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError::Delete`] if the transport fails to delete
    /// an ephemeral destination.
    pub async fn release(&self, destination: &ReplyDestination) -> Result<(), DestinationError> {
        release_with(self.transport.as_ref(), destination).await
    }

    /// Resolve a destination wrapped in a lease that guarantees release.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Self::resolve`].
    pub async fn acquire(&self, request: &Message) -> Result<DestinationLease<T>, DestinationError> {
        let destination = self.resolve(request).await?;
        Ok(DestinationLease {
            destination,
            transport: Arc::clone(&self.transport),
            released: false,
        })
    }

    async fn resolve_named(&self, name: &str) -> Result<ReplyDestination, DestinationError> {
        self.transport
            .resolve(name)
            .await
            .map(ReplyDestination::Named)
            .map_err(|source| DestinationError::Resolve {
                name: name.to_owned(),
                source,
            })
    }
}

async fn release_with<T: Transport + ?Sized>(
    transport: &T,
    destination: &ReplyDestination,
) -> Result<(), DestinationError> {
    let ReplyDestination::Ephemeral(dest) = destination else {
        return Ok(());
    };
    debug!(destination = %dest, "deleting ephemeral reply destination");
    transport
        .delete(dest)
        .await
        .map_err(|source| DestinationError::Delete {
            destination: dest.clone(),
            source,
        })?;
    metrics::dec_ephemeral_destinations();
    Ok(())
}

/// Scoped ownership of a resolved reply destination.
///
/// Deletion of an ephemeral destination completes at most once. If the
/// lease is dropped before [`DestinationLease::release`] completes,
/// including while its delete is still in flight, the deletion is spawned
/// onto the current Tokio runtime.
pub struct DestinationLease<T: Transport> {
    destination: ReplyDestination,
    transport: Arc<T>,
    released: bool,
}

impl<T: Transport> DestinationLease<T> {
    /// The leased destination.
    #[must_use]
    pub fn destination(&self) -> &ReplyDestination { &self.destination }

    /// Whether the destination has already been released.
    #[must_use]
    pub fn is_released(&self) -> bool { self.released }

    /// Release the destination. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError::Delete`] if deleting an ephemeral
    /// destination fails. The deletion is not retried.
    pub async fn release(&mut self) -> Result<(), DestinationError> {
        if self.released {
            return Ok(());
        }
        // Only mark the lease once the delete has finished. A caller dropped
        // mid-delete leaves the drop guard armed.
        let result = release_with(self.transport.as_ref(), &self.destination).await;
        self.released = true;
        result
    }
}

impl<T: Transport> Drop for DestinationLease<T> {
    fn drop(&mut self) {
        if self.released || !self.destination.is_ephemeral() {
            return;
        }
        self.released = true;
        let destination = self.destination.clone();
        let Ok(runtime) = Handle::try_current() else {
            error!(
                destination = %destination,
                "ephemeral reply destination leaked: no runtime to delete it"
            );
            return;
        };
        warn!(
            destination = %destination,
            "reply destination lease dropped before release; deleting in background"
        );
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            if let Err(e) = release_with(transport.as_ref(), &destination).await {
                error!(error = %e, "background deletion of reply destination failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{loopback::LoopbackTransport, message::REPLY_TO};

    type Fixture = (
        Arc<LoopbackTransport>,
        ReplyDestinationStrategy<LoopbackTransport>,
    );

    fn strategy(mode: ReplyMode) -> Fixture {
        let transport = Arc::new(LoopbackTransport::new());
        let strategy = ReplyDestinationStrategy::new(Arc::clone(&transport), mode);
        (transport, strategy)
    }

    #[rstest]
    #[case(ReplyMode::Ephemeral)]
    #[case(ReplyMode::Shared(DestinationRef::new("shared")))]
    #[case(ReplyMode::Named("named".into()))]
    #[tokio::test]
    async fn reply_to_header_takes_precedence(#[case] mode: ReplyMode) {
        let (transport, strategy) = strategy(mode);
        let request = Message::new("x").with_header(REPLY_TO, "caller.replies");

        let resolved = strategy.resolve(&request).await.expect("resolves");

        assert_eq!(
            resolved,
            ReplyDestination::Named(DestinationRef::new("caller.replies"))
        );
        assert_eq!(transport.created_count(), 0);
    }

    #[tokio::test]
    async fn mode_decides_without_reply_to_header() {
        let request = Message::new("x");

        let (_, shared) = strategy(ReplyMode::Shared(DestinationRef::new("shared")));
        assert_eq!(
            shared.resolve(&request).await.expect("shared"),
            ReplyDestination::Shared(DestinationRef::new("shared"))
        );

        let (_, named) = strategy(ReplyMode::Named("named".into()));
        assert_eq!(
            named.resolve(&request).await.expect("named"),
            ReplyDestination::Named(DestinationRef::new("named"))
        );

        let (transport, ephemeral) = strategy(ReplyMode::Ephemeral);
        let resolved = ephemeral.resolve(&request).await.expect("ephemeral");
        assert!(resolved.is_ephemeral());
        assert_eq!(transport.created_count(), 1);
    }

    #[tokio::test]
    async fn only_ephemeral_destinations_are_deleted() {
        let (transport, strategy) = strategy(ReplyMode::Ephemeral);
        strategy
            .release(&ReplyDestination::Shared(DestinationRef::new("shared")))
            .await
            .expect("shared release is a no-op");
        assert!(transport.deleted().is_empty());

        let ephemeral = strategy.resolve(&Message::new("x")).await.expect("created");
        strategy.release(&ephemeral).await.expect("deleted");
        assert_eq!(transport.deleted(), vec![ephemeral.destination().clone()]);
    }

    #[tokio::test]
    async fn create_failure_leaves_nothing_behind() {
        let (transport, strategy) = strategy(ReplyMode::Ephemeral);
        transport.fail_create(true);

        let err = strategy
            .resolve(&Message::new("x"))
            .await
            .expect_err("create fails");

        assert!(matches!(err, DestinationError::Create(_)));
        assert_eq!(transport.live_ephemeral_count(), 0);
    }

    #[tokio::test]
    async fn lease_release_is_idempotent() {
        let (transport, strategy) = strategy(ReplyMode::Ephemeral);
        let mut lease = strategy.acquire(&Message::new("x")).await.expect("lease");

        lease.release().await.expect("first release");
        lease.release().await.expect("second release is a no-op");
        drop(lease);
        tokio::task::yield_now().await;

        assert_eq!(transport.deleted().len(), 1);
    }

    #[tokio::test]
    async fn dropped_lease_deletes_in_background() {
        let (transport, strategy) = strategy(ReplyMode::Ephemeral);
        let lease = strategy.acquire(&Message::new("x")).await.expect("lease");
        let destination = lease.destination().destination().clone();

        drop(lease);
        for _ in 0..10 {
            if !transport.deleted().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.deleted(), vec![destination]);
        assert_eq!(transport.live_ephemeral_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_dropped_mid_delete_is_still_deleted() {
        let (transport, strategy) = strategy(ReplyMode::Ephemeral);
        transport.slow_delete(std::time::Duration::from_millis(100));
        let mut lease = strategy.acquire(&Message::new("x")).await.expect("lease");

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(30), lease.release()).await;
        assert!(cancelled.is_err(), "delete should still be in flight");
        assert!(!lease.is_released());
        assert_eq!(transport.live_ephemeral_count(), 1);

        drop(lease);
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        assert_eq!(transport.live_ephemeral_count(), 0);
    }
}
