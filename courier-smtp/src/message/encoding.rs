//! Transfer encodings used by the message encoder.

use std::borrow::Cow;

use base64::{Engine, engine::general_purpose::STANDARD};

/// Maximum encoded characters per body line (RFC 2045 section 6.8).
pub const LINE_LENGTH: usize = 76;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Base64-encodes `content`, hard-wrapping every [`LINE_LENGTH`] characters.
///
/// Every line, including the last, ends in CRLF. Empty input produces no
/// lines at all.
#[must_use]
pub fn wrap_base64(content: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(content);
    let lines = encoded.len().div_ceil(LINE_LENGTH);
    let mut wrapped = Vec::with_capacity(encoded.len() + lines * CRLF.len());

    for line in encoded.as_bytes().chunks(LINE_LENGTH) {
        wrapped.extend_from_slice(line);
        wrapped.extend_from_slice(CRLF);
    }

    wrapped
}

/// Wraps `text` in a single RFC 2047 `B` encoded-word.
#[must_use]
pub fn encoded_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(text.as_bytes()))
}

/// Header-safe form of free text: printable ASCII passes through unchanged,
/// anything else becomes an encoded-word.
///
/// Control characters (CR and LF in particular) are always encoded, so caller
/// text can never start a new header line.
#[must_use]
pub fn encode_phrase(text: &str) -> Cow<'_, str> {
    if text.bytes().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(encoded_word(text))
    }
}
