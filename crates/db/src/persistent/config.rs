//! How the dispute manager retries storage operations that failed transiently.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{DEFAULT_FIRST_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_RETRIES};

/// Retry policy for storage operations.
///
/// A tick gives up on a setup once the retries are exhausted and picks it up again on the next
/// tick, so the total delay should stay well below the poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of retries after the first failed attempt.
    pub retries: u32,

    /// Delay before the first retry.
    pub first_backoff: Duration,

    /// Upper bound on the delay between two retries.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            first_backoff: DEFAULT_FIRST_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `retries` times with a fixed `backoff`.
    pub const fn fixed(retries: u32, backoff: Duration) -> Self {
        Self {
            retries,
            first_backoff: backoff,
            max_backoff: backoff,
        }
    }

    /// Delay before retry number `retry`, counted from one.
    pub fn backoff(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(31);
        self.first_backoff
            .saturating_mul(1 << doublings)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            retries: 10,
            first_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        };

        let delays: Vec<_> = (1..=6).map(|retry| policy.backoff(retry)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 800, 1000, 1000].map(Duration::from_millis)
        );
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));

        let fixed = RetryPolicy::fixed(3, Duration::from_millis(5));
        assert_eq!(fixed.backoff(1), fixed.backoff(3));
    }
}
