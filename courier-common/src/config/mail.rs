//! Relay configuration consumed by the session driver.
//!
//! ```toml
//! smtp_host = "smtp.example.com"
//! smtp_port = 587
//! username = "mailer@example.com"
//! auth_secret = "app-password"
//! from = "mailer@example.com"
//! timeout = 5.0
//! retry = 3
//! ```

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use super::{ClientTimeouts, ConfigError, TlsCertificatePolicy};

/// Relay address, credentials and sender defaults.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MailConfig {
    /// Relay host name, also used as the TLS server name.
    pub smtp_host: String,

    /// Relay port. Only 465 (implicit TLS) and 587 (STARTTLS) are accepted
    /// when a session is established.
    ///
    /// Default: 587
    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    /// Account name for AUTH PLAIN.
    pub username: String,

    /// Secret for AUTH PLAIN. Never logged.
    #[serde(default, alias = "auth_code")]
    pub auth_secret: String,

    /// Sender used when a message does not name one.
    #[serde(default)]
    pub from: String,

    /// Deadline in seconds for each network step.
    ///
    /// Default: 5.0
    #[serde(default = "defaults::timeout")]
    pub timeout: f64,

    /// Additional attempts made by the mailer after a transient failure.
    ///
    /// Default: 3
    #[serde(default = "defaults::retry")]
    pub retry: u8,

    /// Name announced in EHLO/HELO.
    ///
    /// Default: `localhost`
    #[serde(default = "defaults::helo_domain")]
    pub helo_domain: String,

    #[serde(default, flatten)]
    pub tls: TlsCertificatePolicy,
}

impl MailConfig {
    /// Creates a configuration with defaults for everything but the relay
    /// address and credentials.
    #[must_use]
    pub fn new(
        smtp_host: impl Into<String>,
        smtp_port: u16,
        username: impl Into<String>,
        auth_secret: impl Into<String>,
    ) -> Self {
        Self {
            smtp_host: smtp_host.into(),
            smtp_port,
            username: username.into(),
            auth_secret: auth_secret.into(),
            from: String::new(),
            timeout: defaults::timeout(),
            retry: defaults::retry(),
            helo_domain: defaults::helo_domain(),
            tls: TlsCertificatePolicy::default(),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document is malformed or fails
    /// [`MailConfig::validate`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Checks the fields the session driver cannot work without.
    ///
    /// The port is deliberately not checked here: an unsupported port is
    /// reported by the session driver as its own failure kind.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp_host.trim().is_empty() {
            return Err(ConfigError::MissingField("smtp_host"));
        }

        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingField("username"));
        }

        if self.helo_domain.trim().is_empty() {
            return Err(ConfigError::MissingField("helo_domain"));
        }

        self.timeouts().map(|_| ())
    }

    /// Per-step deadlines derived from [`MailConfig::timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the timeout is not positive.
    pub fn timeouts(&self) -> Result<ClientTimeouts, ConfigError> {
        ClientTimeouts::from_secs_f64(self.timeout)
    }

    /// `host:port` of the relay.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.smtp_host, self.smtp_port)
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("auth_secret", &"<redacted>")
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("helo_domain", &self.helo_domain)
            .field("tls", &self.tls)
            .finish()
    }
}

mod defaults {
    pub const fn smtp_port() -> u16 {
        587
    }

    pub const fn timeout() -> f64 {
        5.0
    }

    pub const fn retry() -> u8 {
        3
    }

    pub fn helo_domain() -> String {
        String::from("localhost")
    }
}
