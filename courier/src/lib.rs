//! Sending mail through one authenticated relay.
//!
//! [`Mailer`] turns a [`MailConfig`](courier_common::config::MailConfig) and a
//! [`Message`](courier_smtp::Message) into a delivered message: it fills in
//! the default sender, runs one SMTP session per send and retries transient
//! failures.

pub mod mailer;
pub mod retry;

pub use mailer::Mailer;
pub use retry::RetryPolicy;
