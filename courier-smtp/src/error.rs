//! Session error taxonomy.
//!
//! Establishment errors ([`Phase::Dial`] through [`Phase::Authentication`])
//! mean no usable session exists. Transaction errors
//! ([`Phase::Envelope`], [`Phase::Transmission`]) abort one message and leave
//! the session idle and reusable.

use core::fmt::{self, Display};
use std::time::Duration;

use thiserror::Error;

use crate::client::{ClientError, Response};

/// The protocol step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Configuration,
    Dial,
    Greeting,
    Upgrade,
    Authentication,
    Envelope,
    Transmission,
    Closed,
}

impl Phase {
    /// Returns `true` for phases that run once, while establishing a session.
    #[must_use]
    pub const fn is_establishment(self) -> bool {
        matches!(
            self,
            Self::Configuration | Self::Dial | Self::Greeting | Self::Upgrade | Self::Authentication
        )
    }
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Configuration => "configuration",
            Self::Dial => "dial",
            Self::Greeting => "greeting",
            Self::Upgrade => "upgrade",
            Self::Authentication => "authentication",
            Self::Envelope => "envelope",
            Self::Transmission => "transmission",
            Self::Closed => "closed",
        })
    }
}

/// Why a step failed: the relay said no, the network failed, or the step
/// ran out of time.
#[derive(Debug, Error)]
pub enum Cause {
    #[error("relay replied {code}: {message}")]
    Rejected { code: u16, message: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Refused(String),
}

impl Cause {
    pub(crate) fn rejected(response: &Response) -> Self {
        Self::Rejected {
            code: response.code,
            message: response.message(),
        }
    }

    /// The relay's reply code, if the relay answered.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) const fn is_connection_lost(&self) -> bool {
        match self {
            Self::Client(error) => error.is_connection_lost(),
            Self::Timeout(_) => true,
            Self::Rejected { .. } | Self::Refused(_) => false,
        }
    }
}

/// Errors from [`SmtpSession`](crate::SmtpSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configured port selects neither implicit TLS nor STARTTLS.
    #[error("Unsupported port {0} for SMTP. Only 465 and 587 are supported")]
    UnsupportedPort(u16),

    /// The configuration cannot describe a session.
    #[error("Invalid session configuration: {0}")]
    Configuration(String),

    /// TCP connect, or the implicit TLS handshake, failed.
    #[error("Failed to connect to {address}: {cause}")]
    Dial {
        address: String,
        #[source]
        cause: Cause,
    },

    /// The banner or EHLO/HELO exchange failed.
    #[error("Greeting failed: {0}")]
    Greeting(#[source] Cause),

    /// STARTTLS was advertised but the upgrade failed.
    #[error("STARTTLS failed: {0}")]
    Upgrade(#[source] Cause),

    /// AUTH PLAIN was refused or impossible.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] Cause),

    /// The relay refused the sender or a recipient.
    #[error("Relay rejected {address}: {cause}")]
    EnvelopeRejected {
        address: String,
        #[source]
        cause: Cause,
    },

    /// DATA was refused, could not be written, or was not accepted.
    #[error("Message transmission failed: {0}")]
    Transmission(#[source] Cause),

    /// The payload was terminated but the relay's reply never arrived. The
    /// message may have been delivered.
    #[error("Message delivery unconfirmed: {0}")]
    Unconfirmed(#[source] Cause),

    /// The connection has been lost or closed.
    #[error("Session is closed")]
    Closed,
}

impl SessionError {
    /// The step that failed.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::UnsupportedPort(_) | Self::Configuration(_) => Phase::Configuration,
            Self::Dial { .. } => Phase::Dial,
            Self::Greeting(_) => Phase::Greeting,
            Self::Upgrade(_) => Phase::Upgrade,
            Self::Authentication(_) => Phase::Authentication,
            Self::EnvelopeRejected { .. } => Phase::Envelope,
            Self::Transmission(_) | Self::Unconfirmed(_) => Phase::Transmission,
            Self::Closed => Phase::Closed,
        }
    }

    /// The underlying cause, when there is one.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Dial { cause, .. }
            | Self::EnvelopeRejected { cause, .. }
            | Self::Greeting(cause)
            | Self::Upgrade(cause)
            | Self::Authentication(cause)
            | Self::Transmission(cause)
            | Self::Unconfirmed(cause) => Some(cause),
            Self::UnsupportedPort(_) | Self::Configuration(_) | Self::Closed => None,
        }
    }

    /// The relay's reply code, if the relay answered.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        self.cause().and_then(Cause::code)
    }

    /// Returns `true` if the same attempt might succeed later: network
    /// failures, timeouts and 4xx replies. Configuration, credentials and
    /// 5xx replies are permanent, and so is an unconfirmed delivery, since
    /// repeating it could deliver the message twice.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UnsupportedPort(_) | Self::Configuration(_) | Self::Unconfirmed(_) => false,
            Self::Closed => true,
            Self::Authentication(cause) => cause.code().is_some_and(|code| (400..500).contains(&code)),
            _ => self
                .cause()
                .is_some_and(|cause| cause.code().is_none_or(|code| (400..500).contains(&code))),
        }
    }
}
