//! Retry policy for sends that fail transiently.

use std::time::Duration;

/// How often, and how patiently, the mailer retries a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one.
    ///
    /// Default: 3
    pub retries: u8,

    /// Delay before the first retry. Doubles on every further retry.
    ///
    /// Default: 1 second
    pub base_delay: Duration,

    /// Caps the exponential backoff.
    ///
    /// Default: 30 seconds
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u8) -> Self {
        Self {
            retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// A policy that retries immediately.
    #[must_use]
    pub const fn immediate(retries: u8) -> Self {
        Self {
            retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns `true` if another attempt may follow `retries_made` retries.
    #[must_use]
    pub const fn should_retry(&self, retries_made: u8) -> bool {
        retries_made < self.retries
    }

    /// The pause before retry number `retries_made + 1`.
    #[must_use]
    pub fn delay(&self, retries_made: u8) -> Duration {
        let factor = 1u32 << u32::from(retries_made).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
