//! Logical email messages and their wire encoding.
//!
//! [`Message`] is built by the caller and encoded into two byte strings that
//! the session writes verbatim as the DATA payload: the header block
//! (terminated by an empty line) and the base64 body.
//!
//! # Examples
//!
//! ```
//! use courier_smtp::{Address, Message};
//!
//! let message = Message::new()
//!     .from(Address::with_name("mailer@example.com", "Mailer"))
//!     .to(Address::new("a@x.com"))
//!     .subject("Hi")
//!     .text("hello");
//!
//! let encoded = message.encode();
//! assert!(encoded.header.starts_with(b"Subject: Hi\r\n"));
//! assert_eq!(encoded.body, b"aGVsbG8=\r\n");
//! ```

mod address;
pub mod encoding;

use core::fmt::{self, Display};
use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

use chrono::{Local, Utc};

pub use address::Address;
use address::format_list;
use encoding::{CRLF, encode_phrase, wrap_base64};

/// Body sent when a message has neither a text nor an HTML part.
pub const PLACEHOLDER_BODY: &str = "No content";

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=UTF-8";

static BOUNDARY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Top-level `Content-Type` of an encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// Text and HTML alternatives separated by `boundary`.
    Alternative { boundary: String },
    Html,
    Text,
}

impl ContentType {
    /// Value of the top-level `Content-Transfer-Encoding` header.
    ///
    /// A multipart entity may only be declared `7bit`, `8bit` or `binary`
    /// (RFC 2045 section 6.4); its parts carry their own base64 encoding.
    #[must_use]
    pub const fn transfer_encoding(&self) -> &'static str {
        match self {
            Self::Alternative { .. } => "7bit",
            Self::Html | Self::Text => "base64",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alternative { boundary } => {
                write!(fmt, "multipart/alternative; boundary=\"{boundary}\"")
            }
            Self::Html => fmt.write_str(TEXT_HTML),
            Self::Text => fmt.write_str(TEXT_PLAIN),
        }
    }
}

/// The encoded DATA payload, header block first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

impl EncodedMessage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.header;
        bytes.extend(self.body);
        bytes
    }
}

/// How the body is laid out, decided once from which parts are present.
enum Body<'a> {
    Alternative {
        boundary: &'a str,
        text: &'a str,
        html: &'a str,
    },
    Single {
        content_type: ContentType,
        content: &'a str,
    },
}

/// A logical email.
///
/// Bcc recipients are envelope-only: they never appear in the encoded
/// header. Empty text or HTML bodies count as absent.
#[derive(Debug, Clone, Default)]
pub struct Message {
    from: Address,
    reply_to: Vec<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<String>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    boundary: OnceLock<String>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender, used for both the `From` header and `MAIL FROM`.
    #[must_use]
    pub fn from(mut self, from: impl Into<Address>) -> Self {
        self.from = from.into();
        self
    }

    #[must_use]
    pub fn reply_to(mut self, address: impl Into<Address>) -> Self {
        self.reply_to.push(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<Address>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn extend_to<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Address>,
    {
        self.to.extend(addresses.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<Address>) -> Self {
        self.cc.push(address.into());
        self
    }

    #[must_use]
    pub fn extend_cc<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Address>,
    {
        self.cc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds a blind recipient. Only the envelope will name it.
    #[must_use]
    pub fn bcc(mut self, email: impl Into<String>) -> Self {
        self.bcc.push(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = (!text.is_empty()).then_some(text);
        self
    }

    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        let html = html.into();
        self.html = (!html.is_empty()).then_some(html);
        self
    }

    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.from
    }

    /// Every envelope recipient in `RCPT TO` order: To, then Cc, then Bcc.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(&self.cc)
            .map(Address::email)
            .chain(self.bcc.iter().map(String::as_str))
    }

    /// The boundary between alternatives. Generated on first use and fixed
    /// for the lifetime of the message.
    fn boundary(&self) -> &str {
        self.boundary.get_or_init(generate_boundary)
    }

    fn body(&self) -> Body<'_> {
        match (self.text.as_deref(), self.html.as_deref()) {
            (Some(text), Some(html)) => Body::Alternative {
                boundary: self.boundary(),
                text,
                html,
            },
            (None, Some(html)) => Body::Single {
                content_type: ContentType::Html,
                content: html,
            },
            (Some(text), None) => Body::Single {
                content_type: ContentType::Text,
                content: text,
            },
            (None, None) => Body::Single {
                content_type: ContentType::Text,
                content: PLACEHOLDER_BODY,
            },
        }
    }

    /// The top-level content type, consistent with [`Message::encode_body`].
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        match self.body() {
            Body::Alternative { boundary, .. } => ContentType::Alternative {
                boundary: boundary.to_owned(),
            },
            Body::Single { content_type, .. } => content_type,
        }
    }

    /// Encodes the header block, dated now.
    #[must_use]
    pub fn encode_header(&self) -> Vec<u8> {
        self.encode_header_dated(&Local::now().to_rfc2822())
    }

    fn encode_header_dated(&self, date: &str) -> Vec<u8> {
        let mut header = Vec::with_capacity(512);

        if !self.subject.is_empty() {
            push_field(&mut header, "Subject", &encode_phrase(&self.subject));
        }

        push_field(&mut header, "From", &self.from.to_string());

        if self.to.is_empty() && self.cc.is_empty() {
            push_field(&mut header, "To", "undisclosed-recipients:;");
        } else if !self.to.is_empty() {
            push_field(&mut header, "To", &format_list(&self.to));
        }

        if !self.cc.is_empty() {
            push_field(&mut header, "Cc", &format_list(&self.cc));
        }

        if !self.reply_to.is_empty() {
            push_field(&mut header, "Reply-To", &format_list(&self.reply_to));
        }

        let content_type = self.content_type();
        push_field(&mut header, "MIME-Version", "1.0");
        push_field(&mut header, "Date", date);
        push_field(&mut header, "Content-Type", &content_type.to_string());
        push_field(
            &mut header,
            "Content-Transfer-Encoding",
            content_type.transfer_encoding(),
        );
        header.extend_from_slice(CRLF);

        header
    }

    /// Encodes the body that follows the header block.
    #[must_use]
    pub fn encode_body(&self) -> Vec<u8> {
        match self.body() {
            Body::Alternative {
                boundary,
                text,
                html,
            } => {
                let mut body = Vec::with_capacity((text.len() + html.len()) * 4 / 3 + 256);

                for (content_type, content) in [(TEXT_PLAIN, text), (TEXT_HTML, html)] {
                    push_delimiter(&mut body, boundary, false);
                    push_field(&mut body, "Content-Type", content_type);
                    push_field(&mut body, "Content-Transfer-Encoding", "base64");
                    body.extend_from_slice(CRLF);
                    body.extend(wrap_base64(content.as_bytes()));
                }

                push_delimiter(&mut body, boundary, true);
                body
            }
            Body::Single { content, .. } => wrap_base64(content.as_bytes()),
        }
    }

    /// Encodes header and body together.
    #[must_use]
    pub fn encode(&self) -> EncodedMessage {
        EncodedMessage {
            header: self.encode_header(),
            body: self.encode_body(),
        }
    }
}

fn push_field(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(CRLF);
}

fn push_delimiter(out: &mut Vec<u8>, boundary: &str, close: bool) {
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundary.as_bytes());
    if close {
        out.extend_from_slice(b"--");
    }
    out.extend_from_slice(CRLF);
}

/// `_` never occurs in standard base64, so the boundary cannot collide with
/// encoded part content.
fn generate_boundary() -> String {
    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros());
    let sequence = BOUNDARY_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    format!("_{nanos}_{}_{sequence}_", now.timestamp())
}
