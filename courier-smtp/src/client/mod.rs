//! Low-level SMTP client used by the session driver.
//!
//! - Plain TCP and implicit TLS connections
//! - In-place STARTTLS upgrade
//! - AUTH PLAIN
//! - Multi-line reply parsing and EHLO capability discovery
//! - Dot-stuffed DATA transfer
//!
//! Commands and replies are traced under the `outgoing` and `incoming`
//! spans; the AUTH argument never is.

mod capabilities;
mod connection;
mod data;
mod error;
mod response;
mod smtp_client;

pub use capabilities::{Capabilities, Extension};
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
