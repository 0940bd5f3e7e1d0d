//! Configuration types for the courier relay client.
//!
//! - [`mail`]: relay address, credentials and sender defaults
//! - [`timeouts`]: per-step deadlines derived from the configured timeout
//! - [`tls`]: certificate validation policy

pub mod mail;
pub mod timeouts;
pub mod tls;

use std::{io, path::PathBuf};

use thiserror::Error;

pub use mail::MailConfig;
pub use timeouts::ClientTimeouts;
pub use tls::TlsCertificatePolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`MailConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is empty or missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field holds a value that cannot be used.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
