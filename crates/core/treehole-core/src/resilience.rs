//! Retry policy and poll-until helper
//!
//! A [`RetryPolicy`] is a plain value: its delay schedule can be inspected
//! without running any timers. [`poll_until`] consumes one to drive an
//! asynchronous job to completion.

use crate::{Result, TreeholeError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// Add a fixed step after every attempt
    Linear(Duration),
    /// Multiply by a factor after every attempt
    Exponential(f64),
}

/// Backoff schedule bounded by an overall deadline
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first pending probe
    pub initial_delay: Duration,
    /// Growth applied between attempts
    pub growth: Growth,
    /// Upper bound on any single delay
    pub cap: Duration,
    /// Overall time budget measured from the first probe
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(400),
            growth: Growth::Linear(Duration::from_millis(200)),
            cap: Duration::from_millis(1000),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Same schedule with a different deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay following `delay`
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let next = match self.growth {
            Growth::Linear(step) => delay.saturating_add(step),
            Growth::Exponential(factor) => {
                Duration::from_secs_f64((delay.as_secs_f64() * factor).min(self.cap.as_secs_f64()))
            }
        };
        next.min(self.cap)
    }

    /// The infinite delay schedule, starting at `initial_delay`
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay.min(self.cap)), move |d| {
            Some(self.next_delay(*d))
        })
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Job finished
    Ready(T),
    /// Job still running
    Pending,
}

/// Probe until ready, sleeping per `policy` between pending results.
///
/// Probe errors are returned immediately. Once the policy's timeout has
/// elapsed without a ready result, fails with `timeout_message`.
pub async fn poll_until<T, F, Fut>(
    policy: &RetryPolicy,
    timeout_message: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let started = Instant::now();
    let mut delays = policy.delays();
    let mut attempt = 0;

    while started.elapsed() < policy.timeout {
        attempt += 1;
        match probe(attempt).await? {
            PollStatus::Ready(value) => {
                debug!(attempt, elapsed = ?started.elapsed(), "poll ready");
                return Ok(value);
            }
            PollStatus::Pending => {
                let delay = delays.next().unwrap_or(policy.cap);
                debug!(attempt, ?delay, "poll pending");
                tokio::time::sleep(delay).await;
            }
        }
    }

    warn!(attempts = attempt, timeout = ?policy.timeout, "poll timed out");
    Err(TreeholeError::timeout(timeout_message))
}
