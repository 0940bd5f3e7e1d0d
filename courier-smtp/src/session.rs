//! Session driver: one authenticated connection to one relay.
//!
//! [`SmtpSession::establish`] runs dial, greeting, TLS negotiation and
//! authentication, then hands back an idle session. [`SmtpSession::send`]
//! runs one mail transaction per call and can be repeated until
//! [`SmtpSession::close`].

use core::fmt::{self, Display};
use std::{future::Future, time::Duration};

use courier_common::{
    config::{ClientTimeouts, MailConfig, TlsCertificatePolicy},
    internal,
};

use crate::{
    client::{self, Capabilities, Response, SmtpClient},
    error::{Cause, SessionError},
    message::Message,
};

/// How the connection is secured, chosen by port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportSecurity {
    /// TLS from the first byte (port 465).
    Implicit,
    /// Plaintext first, upgraded with STARTTLS when advertised (port 587).
    StartTls,
}

impl TransportSecurity {
    pub const IMPLICIT_PORT: u16 = 465;
    pub const STARTTLS_PORT: u16 = 587;
}

impl TryFrom<u16> for TransportSecurity {
    type Error = SessionError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        match port {
            Self::IMPLICIT_PORT => Ok(Self::Implicit),
            Self::STARTTLS_PORT => Ok(Self::StartTls),
            other => Err(SessionError::UnsupportedPort(other)),
        }
    }
}

/// AUTH PLAIN credentials. The secret is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything needed to establish a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay host. Used for TLS server name verification and, unless
    /// `connect_to` is set, for dialing.
    pub host: String,
    /// Relay port; selects [`TransportSecurity`].
    pub port: u16,
    /// Dial this `host:port` instead of `host`/`port`, keeping `host` as the
    /// TLS server name.
    pub connect_to: Option<String>,
    pub credentials: Credentials,
    /// Name announced in EHLO/HELO.
    pub helo_domain: String,
    pub timeouts: ClientTimeouts,
    pub tls: TlsCertificatePolicy,
}

impl SessionConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            connect_to: None,
            credentials,
            helo_domain: String::from("localhost"),
            timeouts: ClientTimeouts::default(),
            tls: TlsCertificatePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_connect_to(mut self, address: impl Into<String>) -> Self {
        self.connect_to = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_helo_domain(mut self, domain: impl Into<String>) -> Self {
        self.helo_domain = domain.into();
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsCertificatePolicy) -> Self {
        self.tls = tls;
        self
    }

    /// `host:port` as configured, for logs and errors.
    #[must_use]
    pub fn relay(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn dial_address(&self) -> String {
        self.connect_to.clone().unwrap_or_else(|| self.relay())
    }
}

impl TryFrom<&MailConfig> for SessionConfig {
    type Error = SessionError;

    fn try_from(config: &MailConfig) -> Result<Self, Self::Error> {
        let timeouts = config
            .timeouts()
            .map_err(|e| SessionError::Configuration(e.to_string()))?;

        Ok(Self::new(
            config.smtp_host.clone(),
            config.smtp_port,
            Credentials::new(config.username.clone(), config.auth_secret.clone()),
        )
        .with_helo_domain(config.helo_domain.clone())
        .with_timeouts(timeouts)
        .with_tls(config.tls))
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connected,
    SecureConnected,
    Authenticated,
    TransactionOpen,
    Closed,
}

impl Display for SessionState {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::SecureConnected => "secure-connected",
            Self::Authenticated => "authenticated",
            Self::TransactionOpen => "transaction-open",
            Self::Closed => "closed",
        })
    }
}

/// Runs `step` under `limit`, folding both failure modes into a [`Cause`].
async fn bounded<T>(
    limit: Duration,
    step: impl Future<Output = client::Result<T>>,
) -> Result<T, Cause> {
    match tokio::time::timeout(limit, step).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Cause::Client(e)),
        Err(_) => Err(Cause::Timeout(limit)),
    }
}

fn expect_success(response: &Response) -> Result<(), Cause> {
    if response.is_success() {
        Ok(())
    } else {
        Err(Cause::rejected(response))
    }
}

fn is_localhost(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// An established, authenticated SMTP session.
///
/// Transactions run strictly one after another: [`SmtpSession::send`] takes
/// `&mut self`, and the session is not meant to be shared across tasks.
pub struct SmtpSession {
    client: SmtpClient,
    state: SessionState,
    capabilities: Capabilities,
    timeouts: ClientTimeouts,
    relay: String,
}

impl SmtpSession {
    /// Dials the relay and runs greeting, TLS negotiation and AUTH PLAIN.
    ///
    /// The port is checked before any network activity: 465 selects
    /// implicit TLS, 587 STARTTLS. On 587 a relay that does not advertise
    /// STARTTLS is used in plaintext with a warning; a relay that advertises
    /// it but fails the upgrade is an error.
    ///
    /// # Errors
    ///
    /// Returns the first failing establishment step. No session exists
    /// afterwards.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(relay = %config.relay(), username = %config.credentials.username())
    )]
    pub async fn establish(config: SessionConfig) -> Result<Self, SessionError> {
        let security = TransportSecurity::try_from(config.port)?;
        let address = config.dial_address();
        let relay = config.relay();
        let accept_invalid_certs = config.tls.accepts_invalid_certs();

        internal!(level = DEBUG, "Dialing {address} ({security:?})");

        let dial = async {
            match security {
                TransportSecurity::Implicit => {
                    SmtpClient::connect_tls(address.as_str(), config.host.as_str(), accept_invalid_certs)
                        .await
                }
                TransportSecurity::StartTls => {
                    SmtpClient::connect(address.as_str(), config.host.as_str(), accept_invalid_certs)
                        .await
                }
            }
        };
        let client = bounded(config.timeouts.connect, dial)
            .await
            .map_err(|cause| SessionError::Dial {
                address: address.clone(),
                cause,
            })?;

        let mut session = Self {
            client,
            state: SessionState::Disconnected,
            capabilities: Capabilities::default(),
            timeouts: config.timeouts,
            relay,
        };
        session.transition(if session.client.is_encrypted() {
            SessionState::SecureConnected
        } else {
            SessionState::Connected
        });
        tracing::info!(%address, encrypted = session.is_encrypted(), "Connected");

        session.greet(&config.helo_domain).await?;

        if security == TransportSecurity::StartTls {
            session.negotiate_starttls(&config.helo_domain).await?;
        }

        session
            .authenticate(&config.credentials, &config.host)
            .await?;

        tracing::info!(encrypted = session.is_encrypted(), "Session established");
        Ok(session)
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Extensions from the most recent EHLO. Empty after a HELO fallback.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.client.is_encrypted()
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(from = %self.state, to = %next, "Session state");
        self.state = next;
    }

    async fn greet(&mut self, helo_domain: &str) -> Result<(), SessionError> {
        let banner = bounded(self.timeouts.command, self.client.read_greeting())
            .await
            .map_err(SessionError::Greeting)?;

        if banner.code != 220 {
            return Err(SessionError::Greeting(Cause::rejected(&banner)));
        }

        self.hello(helo_domain).await.map_err(SessionError::Greeting)
    }

    /// EHLO, falling back to HELO when the relay refuses it.
    async fn hello(&mut self, helo_domain: &str) -> Result<(), Cause> {
        let ehlo = bounded(self.timeouts.command, self.client.ehlo(helo_domain)).await?;
        if ehlo.is_success() {
            self.capabilities = Capabilities::from_ehlo(&ehlo);
            return Ok(());
        }

        tracing::debug!(code = ehlo.code, "EHLO refused, falling back to HELO");
        let helo = bounded(self.timeouts.command, self.client.helo(helo_domain)).await?;
        expect_success(&helo)?;
        self.capabilities = Capabilities::default();
        Ok(())
    }

    async fn negotiate_starttls(&mut self, helo_domain: &str) -> Result<(), SessionError> {
        if !self.capabilities.supports_starttls() {
            tracing::warn!(
                relay = %self.relay,
                "Relay does not advertise STARTTLS, continuing without encryption"
            );
            return Ok(());
        }

        let response = bounded(self.timeouts.command, self.client.starttls())
            .await
            .map_err(SessionError::Upgrade)?;
        expect_success(&response).map_err(SessionError::Upgrade)?;
        self.transition(SessionState::SecureConnected);

        // Capabilities learned in plaintext are discarded.
        self.hello(helo_domain).await.map_err(SessionError::Upgrade)
    }

    async fn authenticate(
        &mut self,
        credentials: &Credentials,
        host: &str,
    ) -> Result<(), SessionError> {
        if !self.is_encrypted() && !is_localhost(host) {
            return Err(SessionError::Authentication(Cause::Refused(
                "refusing to send credentials over an unencrypted connection".to_string(),
            )));
        }

        // The relay's reply decides; HELO relays advertise nothing at all.
        if !self.capabilities.supports_auth("PLAIN") {
            tracing::debug!("Relay does not list PLAIN, attempting it anyway");
        }

        let response = bounded(
            self.timeouts.command,
            self.client
                .auth_plain(credentials.username(), credentials.secret()),
        )
        .await
        .map_err(SessionError::Authentication)?;
        expect_success(&response).map_err(SessionError::Authentication)?;

        self.transition(SessionState::Authenticated);
        tracing::info!(username = %credentials.username(), "Authenticated");
        Ok(())
    }

    /// Sends one message: MAIL FROM, RCPT TO for every To, Cc and Bcc
    /// recipient in that order, then DATA.
    ///
    /// A failed transaction is reset with RSET and the session stays usable.
    /// If the connection is lost, the session becomes
    /// [`SessionState::Closed`] and later calls fail with
    /// [`SessionError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EnvelopeRejected`] naming the refused address,
    /// [`SessionError::Transmission`] for DATA failures,
    /// [`SessionError::Unconfirmed`] when the payload was terminated but no
    /// reply arrived, or [`SessionError::Closed`].
    #[tracing::instrument(level = "debug", skip_all, fields(relay = %self.relay))]
    pub async fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        match self.state {
            SessionState::Authenticated => {}
            SessionState::TransactionOpen => {
                // A previous send was dropped mid-exchange; the stream is
                // out of step with the protocol.
                self.transition(SessionState::Closed);
                return Err(SessionError::Closed);
            }
            _ => return Err(SessionError::Closed),
        }

        check_envelope(message)?;

        self.transition(SessionState::TransactionOpen);
        let outcome = self.transact(message).await;

        match &outcome {
            Ok(()) => self.transition(SessionState::Authenticated),
            Err(error) if error.cause().is_some_and(Cause::is_connection_lost) => {
                tracing::warn!(%error, "Connection lost during transaction");
                self.transition(SessionState::Closed);
            }
            Err(error) => {
                tracing::debug!(%error, "Transaction failed, resetting");
                self.reset().await;
            }
        }

        outcome
    }

    async fn transact(&mut self, message: &Message) -> Result<(), SessionError> {
        let limit = self.timeouts.command;

        let sender = message.sender().email();
        bounded(limit, self.client.mail_from(sender))
            .await
            .and_then(|response| expect_success(&response))
            .map_err(|cause| SessionError::EnvelopeRejected {
                address: sender.to_string(),
                cause,
            })?;

        let mut recipients = 0usize;
        for recipient in message.envelope_recipients() {
            bounded(limit, self.client.rcpt_to(recipient))
                .await
                .and_then(|response| expect_success(&response))
                .map_err(|cause| SessionError::EnvelopeRejected {
                    address: recipient.to_string(),
                    cause,
                })?;
            recipients += 1;
        }

        let response = bounded(limit, self.client.data())
            .await
            .map_err(SessionError::Transmission)?;
        if !response.is_intermediate() {
            return Err(SessionError::Transmission(Cause::rejected(&response)));
        }

        let encoded = message.encode();
        bounded(
            self.timeouts.data,
            self.client
                .send_data(&[encoded.header.as_slice(), encoded.body.as_slice()]),
        )
        .await
        .map_err(SessionError::Transmission)?;

        // The terminator is on the wire: without a reply the relay may
        // already have accepted the message.
        let response = bounded(self.timeouts.data, self.client.data_reply())
            .await
            .map_err(SessionError::Unconfirmed)?;
        expect_success(&response).map_err(SessionError::Transmission)?;

        tracing::info!(recipients, bytes = encoded.len(), "Message accepted");
        Ok(())
    }

    /// Returns the relay to idle after a failed transaction.
    async fn reset(&mut self) {
        match bounded(self.timeouts.command, self.client.rset()).await {
            Ok(response) => {
                if !response.is_success() {
                    tracing::warn!(code = response.code, "RSET refused");
                }
                self.transition(SessionState::Authenticated);
            }
            Err(cause) => {
                tracing::warn!(%cause, "RSET failed, closing session");
                self.transition(SessionState::Closed);
            }
        }
    }

    /// Sends QUIT and drops the connection. Failures are logged, not
    /// returned.
    pub async fn close(mut self) {
        if self.state != SessionState::Closed {
            if let Err(cause) = bounded(self.timeouts.command, self.client.quit()).await {
                tracing::debug!(%cause, "QUIT failed");
            }
        }

        self.transition(SessionState::Closed);
        tracing::info!(relay = %self.relay, "Session closed");
    }
}

/// Rejects envelopes the relay could never accept, before any command is
/// sent.
fn check_envelope(message: &Message) -> Result<(), SessionError> {
    let mut recipients = message.envelope_recipients().peekable();

    if recipients.peek().is_none() {
        return Err(SessionError::EnvelopeRejected {
            address: String::new(),
            cause: Cause::Refused("message has no recipients".to_string()),
        });
    }

    if recipients.any(str::is_empty) {
        return Err(SessionError::EnvelopeRejected {
            address: String::new(),
            cause: Cause::Refused("recipient address is empty".to_string()),
        });
    }

    Ok(())
}
