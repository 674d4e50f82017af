//! Registry of replies waiting to be claimed.
//!
//! `PendingReplyRegistry` is the only point where the transport's listener
//! threads and waiting callers meet. Listeners [`deliver`] replies keyed by
//! [`CorrelationKey`]; waiters [`claim`] them with a non-blocking poll.
//! A key with no entry means "still awaiting". Locks are held only for the
//! map operation itself, never across I/O or a sleep.
//!
//! Delivering twice for an unclaimed key keeps the later reply (last write
//! wins). Duplicates are logged but not rejected.
//!
//! [`deliver`]: PendingReplyRegistry::deliver
//! [`claim`]: PendingReplyRegistry::claim

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{correlation::CorrelationKey, message::Message};

struct PendingReply {
    message: Message,
    delivered_at: Instant,
}

impl PendingReply {
    fn new(message: Message) -> Self {
        Self {
            message,
            delivered_at: Instant::now(),
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.delivered_at) >= ttl
    }
}

/// Deliveries sweep for expired replies at most this many times per TTL.
const SWEEPS_PER_TTL: u32 = 4;

fn millis(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }

/// Concurrent store of delivered, not yet claimed replies.
pub struct PendingReplyRegistry {
    correlated: DashMap<CorrelationKey, PendingReply>,
    uncorrelated: Mutex<VecDeque<PendingReply>>,
    ttl: Option<Duration>,
    origin: Instant,
    // Milliseconds after `origin` at which a delivery may sweep again.
    next_sweep: AtomicU64,
}

impl Default for PendingReplyRegistry {
    fn default() -> Self {
        Self {
            correlated: DashMap::new(),
            uncorrelated: Mutex::new(VecDeque::new()),
            ttl: None,
            origin: Instant::now(),
            next_sweep: AtomicU64::new(0),
        }
    }
}

impl PendingReplyRegistry {
    /// Create a registry that never prunes unclaimed replies.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a registry that discards replies left unclaimed for `ttl`.
    ///
    /// Expired entries are pruned by [`Self::prune_expired`] and by
    /// deliveries, which sweep at most four times per `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Store `message` under `key`, replacing any unclaimed reply.
    ///
    /// Never fails and only holds shard locks briefly, plus an occasional
    /// TTL sweep, so it is safe to call from transport listener threads.
    /// Returns the replaced reply.
    pub fn deliver(&self, key: CorrelationKey, message: Message) -> Option<Message> {
        self.sweep_if_due();
        let replaced = self
            .correlated
            .insert(key.clone(), PendingReply::new(message))
            .map(|pending| pending.message);
        if let Some(previous) = &replaced {
            warn!(
                correlation_key = %key,
                replaced_message_id = %previous.id(),
                "duplicate reply for unclaimed correlation key; keeping the latest"
            );
        } else {
            debug!(correlation_key = %key, "reply stored");
        }
        replaced
    }

    /// Queue a reply that carries no correlation key.
    ///
    /// Uncorrelated replies are claimed in arrival order.
    pub fn deliver_uncorrelated(&self, message: Message) {
        self.sweep_if_due();
        debug!(message_id = %message.id(), "uncorrelated reply queued");
        self.lock_uncorrelated().push_back(PendingReply::new(message));
    }

    /// Remove and return the reply stored under `key`, if any.
    #[must_use]
    pub fn claim(&self, key: &CorrelationKey) -> Option<Message> {
        self.correlated.remove(key).map(|(_, pending)| pending.message)
    }

    /// Remove and return the oldest uncorrelated reply, if any.
    #[must_use]
    pub fn claim_uncorrelated(&self) -> Option<Message> {
        self.lock_uncorrelated()
            .pop_front()
            .map(|pending| pending.message)
    }

    /// Discard any reply stored under `key`, returning whether one existed.
    pub fn remove(&self, key: &CorrelationKey) -> bool { self.correlated.remove(key).is_some() }

    /// Whether a reply is waiting under `key`.
    #[must_use]
    pub fn contains(&self, key: &CorrelationKey) -> bool { self.correlated.contains_key(key) }

    /// Number of unclaimed replies, correlated or not.
    #[must_use]
    pub fn len(&self) -> usize { self.correlated.len() + self.lock_uncorrelated().len() }

    /// Whether no reply is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drop replies older than the configured TTL, returning how many went.
    ///
    /// Does nothing when the registry was built without a TTL.
    /// `DashMap::retain` takes per-shard write locks, so concurrent
    /// deliveries and claims may contend briefly.
    pub fn prune_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = Instant::now();
        let before = self.correlated.len();
        self.correlated
            .retain(|_, pending| !pending.is_expired(now, ttl));
        let mut pruned = before.saturating_sub(self.correlated.len());

        let mut queue = self.lock_uncorrelated();
        let queued = queue.len();
        queue.retain(|pending| !pending.is_expired(now, ttl));
        pruned += queued - queue.len();
        drop(queue);

        if pruned > 0 {
            debug!(pruned, "pruned abandoned replies");
        }
        pruned
    }

    /// Prune on behalf of a delivery unless a sweep ran recently.
    ///
    /// Only the caller that advances `next_sweep` sweeps, so concurrent
    /// deliveries never sweep twice for the same slot.
    fn sweep_if_due(&self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let now = millis(self.origin.elapsed());
        let due = self.next_sweep.load(Ordering::Acquire);
        if now < due {
            return;
        }
        let next = now.saturating_add(millis(ttl / SWEEPS_PER_TTL));
        if self
            .next_sweep
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.prune_expired();
        }
    }

    fn lock_uncorrelated(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingReply>> {
        self.uncorrelated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    use super::*;

    fn key(raw: &str) -> CorrelationKey { CorrelationKey::new(raw).expect("non-empty key") }

    #[allow(
        unused_braces,
        reason = "rustc false positive for single-line rstest fixtures"
    )]
    #[fixture]
    fn registry() -> PendingReplyRegistry { PendingReplyRegistry::new() }

    #[rstest]
    fn claim_removes_the_reply(registry: PendingReplyRegistry) {
        let reply = Message::new("pong");
        registry.deliver(key("A"), reply.clone());

        assert_eq!(registry.claim(&key("A")), Some(reply));
        assert_eq!(registry.claim(&key("A")), None);
        assert!(registry.is_empty());
    }

    #[rstest]
    fn claim_never_returns_another_keys_reply(registry: PendingReplyRegistry) {
        registry.deliver(key("B"), Message::new("for B"));
        assert_eq!(registry.claim(&key("A")), None);
        assert!(registry.contains(&key("B")));
    }

    #[rstest]
    fn second_delivery_wins(registry: PendingReplyRegistry) {
        let first = Message::new("first");
        let second = Message::new("second");
        assert_eq!(registry.deliver(key("A"), first.clone()), None);
        assert_eq!(registry.deliver(key("A"), second.clone()), Some(first));
        assert_eq!(registry.claim(&key("A")), Some(second));
    }

    #[rstest]
    fn uncorrelated_replies_are_claimed_in_arrival_order(registry: PendingReplyRegistry) {
        let first = Message::new("1");
        let second = Message::new("2");
        registry.deliver_uncorrelated(first.clone());
        registry.deliver_uncorrelated(second.clone());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.claim_uncorrelated(), Some(first));
        assert_eq!(registry.claim_uncorrelated(), Some(second));
        assert_eq!(registry.claim_uncorrelated(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_replies_are_pruned_on_delivery() {
        let registry = PendingReplyRegistry::with_ttl(Duration::from_secs(1));
        registry.deliver(key("old"), Message::new("old"));
        registry.deliver_uncorrelated(Message::new("old uncorrelated"));
        tokio::time::advance(Duration::from_secs(2)).await;

        registry.deliver(key("new"), Message::new("new"));

        assert!(!registry.contains(&key("old")));
        assert!(registry.contains(&key("new")));
        assert_eq!(registry.claim_uncorrelated(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn deliveries_sweep_at_most_once_per_quarter_ttl() {
        let registry = PendingReplyRegistry::with_ttl(Duration::from_secs(1));
        registry.deliver(key("X"), Message::new("x"));
        tokio::time::advance(Duration::from_millis(900)).await;
        registry.deliver(key("Y"), Message::new("y"));

        // X has expired, but the sweep at 900 ms is too recent.
        tokio::time::advance(Duration::from_millis(100)).await;
        registry.deliver(key("Z"), Message::new("z"));
        assert!(registry.contains(&key("X")));

        tokio::time::advance(Duration::from_millis(150)).await;
        registry.deliver(key("W"), Message::new("w"));
        assert!(!registry.contains(&key("X")));
        assert!(registry.contains(&key("Y")));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_without_ttl_keeps_everything() {
        let registry = PendingReplyRegistry::new();
        registry.deliver(key("old"), Message::new("old"));
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(registry.prune_expired(), 0);
        assert!(registry.contains(&key("old")));
    }

    #[test]
    fn concurrent_deliveries_for_distinct_keys_are_all_claimable() {
        let registry = Arc::new(PendingReplyRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..50 {
                        registry.deliver(key(&format!("{n}-{i}")), Message::new(format!("{n}-{i}")));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("delivery thread panicked");
        }

        for n in 0..8 {
            for i in 0..50 {
                let reply = registry
                    .claim(&key(&format!("{n}-{i}")))
                    .expect("reply delivered");
                assert_eq!(reply.payload().as_ref(), format!("{n}-{i}").as_bytes());
            }
        }
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn claim_returns_the_last_delivered_reply(payloads in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let registry = PendingReplyRegistry::new();
            for payload in &payloads {
                registry.deliver(key("K"), Message::new(payload.clone()));
            }
            let claimed = registry.claim(&key("K")).expect("delivered at least once");
            let last = payloads.last().expect("non-empty");
            prop_assert_eq!(claimed.payload().as_ref(), last.as_bytes());
            prop_assert!(registry.is_empty());
        }
    }
}
