//! Retry bookkeeping for rate-limited calls.
//!
//! Only the "remote asked us to slow down" case is retried. The pacing comes
//! from each 429 response; there is no backoff schedule of our own.

use crate::config::RetryOnRateLimit;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Attempt counter for one call.
///
/// Owned by the future driving the call and never shared.
///
/// # Examples
///
/// ```
/// use restexec::retry::RetryState;
///
/// let mut state = RetryState::new(2);
/// assert!(state.record_rate_limit());
/// assert!(state.record_rate_limit());
/// assert!(!state.record_rate_limit());
/// assert_eq!(state.attempts(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
}

impl RetryState {
    /// Creates a fresh state with an inclusive retry ceiling.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Rate-limited attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The inclusive retry ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Records a rate-limited attempt and returns whether a retry is allowed.
    pub fn record_rate_limit(&mut self) -> bool {
        match self.attempts.checked_add(1) {
            Some(attempts) => {
                self.attempts = attempts;
                attempts <= self.max_attempts
            }
            None => false,
        }
    }
}

/// How a wait between attempts ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full delay elapsed; the call may try again.
    Elapsed,
    /// The cancellation token fired.
    Cancelled,
    /// The delay would run past the call's deadline.
    DeadlineExceeded,
}

/// Drives the retry decision for one call carrying a [`RetryOnRateLimit`].
#[derive(Debug)]
pub(crate) struct RetryController<'a> {
    policy: &'a RetryOnRateLimit,
    state: RetryState,
    deadline: Option<Instant>,
}

impl<'a> RetryController<'a> {
    pub(crate) fn new(policy: &'a RetryOnRateLimit, started: Instant) -> Self {
        Self {
            policy,
            state: RetryState::new(policy.max_attempts()),
            // A deadline past what `Instant` can represent is no deadline at all.
            deadline: policy
                .deadline()
                .and_then(|budget| started.checked_add(budget)),
        }
    }

    pub(crate) fn state(&self) -> RetryState {
        self.state
    }

    /// Returns the delay before the next attempt, or `None` once the budget is
    /// spent.
    pub(crate) fn next_delay(&mut self, retry_after: Duration) -> Option<Duration> {
        if !self.state.record_rate_limit() {
            return None;
        }
        Some(match self.policy.max_wait() {
            Some(cap) => retry_after.min(cap),
            None => retry_after,
        })
    }

    pub(crate) async fn wait(&self, delay: Duration) -> WaitOutcome {
        wait(delay, self.deadline, self.policy.cancellation()).await
    }
}

/// Sleeps for `delay` unless cancelled first or the deadline cannot be met.
///
/// A delay that would end past `deadline` fails immediately instead of
/// sleeping into a certain failure.
pub async fn wait(
    delay: Duration,
    deadline: Option<Instant>,
    cancellation: Option<&CancellationToken>,
) -> WaitOutcome {
    if let Some(deadline) = deadline {
        match Instant::now().checked_add(delay) {
            Some(resume) if resume <= deadline => {}
            _ => return WaitOutcome::DeadlineExceeded,
        }
    }

    match cancellation {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => WaitOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => WaitOutcome::Elapsed,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            WaitOutcome::Elapsed
        }
    }
}
