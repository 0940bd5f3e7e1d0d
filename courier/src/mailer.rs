//! One-call sending on top of [`SmtpSession`].

use std::borrow::Cow;

use courier_common::config::MailConfig;
use courier_smtp::{Address, Message, SessionConfig, SessionError, SmtpSession};

use crate::retry::RetryPolicy;

/// Sends messages through the relay named in a [`MailConfig`].
///
/// Every [`Mailer::send`] opens its own session and closes it afterwards.
/// Transient failures are retried with a fresh session; permanent ones
/// (unsupported port, bad credentials, 5xx replies) are returned at once.
#[derive(Debug, Clone)]
pub struct Mailer {
    default_from: String,
    session: SessionConfig,
    retry: RetryPolicy,
}

impl Mailer {
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the configuration cannot
    /// describe a session.
    pub fn new(config: &MailConfig) -> Result<Self, SessionError> {
        Ok(Self {
            default_from: config.from.clone(),
            session: SessionConfig::try_from(config)?,
            retry: RetryPolicy::new(config.retry),
        })
    }

    /// Dial `address` instead of the configured host and port. The host is
    /// still used for TLS verification.
    #[must_use]
    pub fn with_connect_to(mut self, address: impl Into<String>) -> Self {
        self.session = self.session.with_connect_to(address);
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The message as it will be sent: an empty sender address is replaced
    /// by the configured default, keeping the display name.
    #[must_use]
    pub fn prepare<'a>(&self, message: &'a Message) -> Cow<'a, Message> {
        let sender = message.sender();
        if !sender.is_empty() || self.default_from.is_empty() {
            return Cow::Borrowed(message);
        }

        Cow::Owned(message.clone().from(Address::with_name(
            self.default_from.clone(),
            sender.display_name().unwrap_or_default(),
        )))
    }

    /// Sends `message`, retrying transient failures.
    ///
    /// Once the payload has been terminated, a missing reply is reported as
    /// [`SessionError::Unconfirmed`] and is not retried: the relay may have
    /// accepted the message, and sending it again could deliver it twice.
    ///
    /// # Errors
    ///
    /// Returns the last [`SessionError`] once the failure is permanent or
    /// the retries are used up.
    pub async fn send(&self, message: &Message) -> Result<(), SessionError> {
        let message = self.prepare(message);
        let mut retries_made = 0;

        loop {
            match self.attempt(&message).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_transient() && self.retry.should_retry(retries_made) => {
                    let delay = self.retry.delay(retries_made);
                    retries_made += 1;
                    tracing::warn!(
                        %error,
                        phase = %error.phase(),
                        retry = retries_made,
                        of = self.retry.retries,
                        ?delay,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::error!(%error, phase = %error.phase(), "Send failed");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(&self, message: &Message) -> Result<(), SessionError> {
        let mut session = SmtpSession::establish(self.session.clone()).await?;
        let outcome = session.send(message).await;
        session.close().await;
        outcome
    }
}
