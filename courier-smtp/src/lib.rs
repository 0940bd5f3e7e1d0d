//! Outbound SMTP for a single relay.
//!
//! Two pieces, used in sequence:
//!
//! - [`message`]: turns a logical [`Message`] into RFC 5322 header bytes and
//!   a base64, optionally `multipart/alternative`, body.
//! - [`session`]: dials the relay, negotiates implicit TLS or STARTTLS,
//!   authenticates with AUTH PLAIN and runs one transaction per message.
//!
//! ```no_run
//! use courier_common::config::MailConfig;
//! use courier_smtp::{Address, Message, SessionConfig, SmtpSession};
//!
//! # async fn example() -> Result<(), courier_smtp::SessionError> {
//! let config = MailConfig::new("smtp.example.com", 587, "mailer", "secret");
//! let mut session = SmtpSession::establish(SessionConfig::try_from(&config)?).await?;
//!
//! let message = Message::new()
//!     .from(Address::new("mailer@example.com"))
//!     .to(Address::with_name("ada@example.com", "Ada"))
//!     .subject("Hi")
//!     .text("hello");
//!
//! session.send(&message).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod session;

pub use error::{Phase, SessionError};
pub use message::{Address, ContentType, EncodedMessage, Message};
pub use session::{
    Credentials, SessionConfig, SessionState, SmtpSession, TransportSecurity,
};
