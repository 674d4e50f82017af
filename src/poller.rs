//! Bounded retry loop turning a non-blocking check into a timed wait.
//!
//! The delivering side of an exchange runs on a transport callback that has
//! no handle on whichever task is waiting, so waiters re-check instead of
//! being woken. Latency is bounded by the polling interval.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::config::MIN_POLLING_INTERVAL;

/// Returned when the probe never produced a value before the timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no result after {attempts} attempts in {elapsed:?}")]
pub struct PollTimeout {
    /// Number of times the probe was evaluated.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Repeatedly evaluates a probe until it yields a value or time runs out.
///
/// The probe is always evaluated once up front, so a zero timeout still
/// checks exactly once. Each pause lasts `interval` or whatever remains of
/// the timeout, whichever is shorter, and the probe is evaluated again after
/// the final pause so a value arriving during it is not lost. A caller
/// therefore waits at most `timeout` plus scheduling overshoot.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use replygate::poller::RetryPoller;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let poller = RetryPoller::new(Duration::from_millis(5), Duration::from_millis(50));
/// let mut calls = 0;
/// let value = poller
///     .poll(|| {
///         calls += 1;
///         (calls == 3).then_some("ready")
///     })
///     .await;
/// assert_eq!(value, Ok("ready"));
/// # }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPoller {
    interval: Duration,
    timeout: Duration,
}

impl RetryPoller {
    /// Create a poller; `interval` is raised to at least
    /// [`MIN_POLLING_INTERVAL`].
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLLING_INTERVAL),
            timeout,
        }
    }

    /// Pause between evaluations.
    #[must_use]
    pub fn interval(&self) -> Duration { self.interval }

    /// Overall time budget.
    #[must_use]
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Evaluate `probe` until it returns `Some` or the timeout elapses.
    ///
    /// No lock may be held by `probe` across calls; it runs on the waiting
    /// task between sleeps.
    ///
    /// # Errors
    ///
    /// Returns [`PollTimeout`] once the timeout is exhausted.
    pub async fn poll<T, F>(&self, mut probe: F) -> Result<T, PollTimeout>
    where
        F: FnMut() -> Option<T>,
    {
        let started = Instant::now();
        let deadline = started.checked_add(self.timeout).unwrap_or_else(far_future);
        let mut attempts = 1;
        if let Some(value) = probe() {
            return Ok(value);
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let pause = self.interval.min(remaining);
            debug!(
                retry_in_ms = pause.as_millis(),
                "reply message did not arrive yet - retrying in {}ms",
                pause.as_millis()
            );
            sleep(pause).await;

            attempts += 1;
            if let Some(value) = probe() {
                return Ok(value);
            }
        }

        Err(PollTimeout {
            attempts,
            elapsed: started.elapsed(),
        })
    }
}

// Roughly thirty years; used when the timeout overflows `Instant`.
fn far_future() -> Instant { Instant::now() + Duration::from_secs(86_400 * 365 * 30) }
