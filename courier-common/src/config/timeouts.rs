//! Deadlines applied to each relay round trip.
//!
//! The relay configuration carries a single `timeout` in (fractional)
//! seconds. It bounds the TCP connect, the TLS handshake and every
//! command/reply exchange. The DATA payload gets a longer allowance because
//! the relay usually scans the message before replying.

use std::time::Duration;

use super::ConfigError;

/// The DATA payload deadline is this multiple of the command deadline.
const DATA_FACTOR: u32 = 4;

/// Client-side deadlines for one SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// Establishing the TCP connection (and the implicit TLS handshake).
    pub connect: Duration,

    /// Any single command and its reply, including STARTTLS and AUTH.
    pub command: Duration,

    /// Writing the message payload and reading the final reply.
    pub data: Duration,
}

impl ClientTimeouts {
    /// Derives all deadlines from one base duration.
    #[must_use]
    pub const fn uniform(base: Duration) -> Self {
        Self {
            connect: base,
            command: base,
            data: base.saturating_mul(DATA_FACTOR),
        }
    }

    /// Derives deadlines from a configured number of seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `secs` is not a positive,
    /// finite number.
    pub fn from_secs_f64(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: format!("expected a positive number of seconds, got {secs}"),
            });
        }

        Duration::try_from_secs_f64(secs)
            .map(Self::uniform)
            .map_err(|e| ConfigError::InvalidValue {
                field: "timeout",
                reason: e.to_string(),
            })
    }
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(5))
    }
}
