//! Metric helpers for `replygate`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking replies stored in the registry.
pub const REPLIES_DELIVERED: &str = "replygate_replies_delivered_total";
/// Name of the counter tracking replies handed to a waiter.
pub const REPLIES_CLAIMED: &str = "replygate_replies_claimed_total";
/// Name of the counter tracking replies dropped for lack of a key.
pub const REPLIES_DROPPED: &str = "replygate_replies_dropped_total";
/// Name of the counter tracking receives that gave up waiting.
pub const RECEIVE_TIMEOUTS: &str = "replygate_receive_timeouts_total";
/// Name of the counter tracking failed request dispatches.
pub const SEND_FAILURES: &str = "replygate_send_failures_total";
/// Name of the gauge tracking live ephemeral reply destinations.
pub const EPHEMERAL_DESTINATIONS_ACTIVE: &str = "replygate_ephemeral_destinations_active";

/// Record a reply stored in the registry.
pub fn inc_delivered() {
    #[cfg(feature = "metrics")]
    counter!(REPLIES_DELIVERED).increment(1);
}

/// Record a reply claimed by a waiter.
pub fn inc_claimed() {
    #[cfg(feature = "metrics")]
    counter!(REPLIES_CLAIMED).increment(1);
}

/// Record a reply dropped without a correlation key.
pub fn inc_dropped() {
    #[cfg(feature = "metrics")]
    counter!(REPLIES_DROPPED).increment(1);
}

/// Record a receive timeout.
pub fn inc_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(RECEIVE_TIMEOUTS).increment(1);
}

/// Record a failed dispatch.
pub fn inc_send_failures() {
    #[cfg(feature = "metrics")]
    counter!(SEND_FAILURES).increment(1);
}

/// Increment the live ephemeral destinations gauge.
pub fn inc_ephemeral_destinations() {
    #[cfg(feature = "metrics")]
    gauge!(EPHEMERAL_DESTINATIONS_ACTIVE).increment(1.0);
}

/// Decrement the live ephemeral destinations gauge.
pub fn dec_ephemeral_destinations() {
    #[cfg(feature = "metrics")]
    gauge!(EPHEMERAL_DESTINATIONS_ACTIVE).decrement(1.0);
}
