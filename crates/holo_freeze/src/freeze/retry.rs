//! Bounded retry loop with exponential backoff and cancellation.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

/// Backoff and budget for a retry loop.
#[derive(Clone, Debug)]
pub struct RetryOptions {
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
    /// Growth factor applied after every attempt.
    pub multiplier: f64,
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 20,
        }
    }
}

/// Iterator-style retry driver.
///
/// ```ignore
/// let mut retry = Retry::start(opts, draining.clone());
/// while retry.next().await {
///     // one attempt
/// }
/// ```
pub struct Retry {
    opts: RetryOptions,
    closer: CancellationToken,
    attempt: u32,
    backoff: Duration,
    cancelled: bool,
}

impl Retry {
    pub fn start(opts: RetryOptions, closer: CancellationToken) -> Self {
        let backoff = opts.initial_backoff.min(opts.max_backoff);
        Self {
            opts,
            closer,
            attempt: 0,
            backoff,
            cancelled: false,
        }
    }

    /// Wait for the next attempt. The first call returns immediately.
    ///
    /// Returns false once the budget is spent or the closer fires.
    pub async fn next(&mut self) -> bool {
        if self.closer.is_cancelled() {
            self.cancelled = true;
            return false;
        }
        if self.attempt >= self.opts.max_attempts {
            return false;
        }
        if self.attempt > 0 {
            if self.backoff.is_zero() {
                // Still let dispatched tasks make progress between attempts.
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = self.closer.cancelled() => {
                        self.cancelled = true;
                        return false;
                    }
                    _ = time::sleep(self.backoff) => {}
                }
            }
            self.backoff = self.next_backoff();
        }
        self.attempt += 1;
        true
    }

    /// Number of attempts handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the loop stopped because the closer fired.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    fn next_backoff(&self) -> Duration {
        let multiplier = if self.opts.multiplier.is_finite() {
            self.opts.multiplier.max(1.0)
        } else {
            1.0
        };
        let next_nanos = (self.backoff.as_nanos() as f64 * multiplier).min(u64::MAX as f64);
        Duration::from_nanos(next_nanos as u64).min(self.opts.max_backoff)
    }
}
