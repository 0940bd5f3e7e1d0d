//! Error types for the low-level SMTP client.

use std::io;

use thiserror::Error;

/// Errors raised while talking to the relay, before any protocol meaning is
/// attached to them.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The relay sent something that is not an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// TLS configuration or handshake failed.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The relay closed the connection.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

impl ClientError {
    /// Returns `true` if the connection can no longer be used.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed | Self::TlsError(_))
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
