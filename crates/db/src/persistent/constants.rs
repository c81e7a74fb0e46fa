//! Defaults of the retry policy.

use std::time::Duration;

/// Number of retries after the first failed attempt.
pub const DEFAULT_RETRIES: u32 = 5;

/// Delay before the first retry. Every further retry waits twice as long as the previous one.
pub const DEFAULT_FIRST_BACKOFF: Duration = Duration::from_millis(250);

/// Upper bound on the delay between two retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(4);
