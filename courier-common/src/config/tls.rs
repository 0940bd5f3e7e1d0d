//! TLS certificate validation settings for relay connections.

use serde::{Deserialize, Serialize};

/// Controls whether to accept invalid or self-signed relay certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Whether to accept invalid TLS certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: Setting this to `true` disables certificate validation
    /// and makes the connection vulnerable to man-in-the-middle attacks.
    ///
    /// Default: `false` (validate certificates)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TlsCertificatePolicy {
    /// A policy that validates certificates against the native root store.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }

    /// A policy for relays with self-signed certificates.
    ///
    /// **WARNING**: Only use in test environments. Do not use in production.
    #[must_use]
    pub const fn insecure() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }

    /// Returns `true` if invalid certificates should be accepted.
    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}
