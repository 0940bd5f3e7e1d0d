//! SMTP reply parsing (RFC 5321 section 4.2).

use super::error::{ClientError, Result};

/// One line of a possibly multi-line reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The three-digit reply code.
    pub code: u16,
    /// `false` for `250-...` continuation lines.
    pub is_last: bool,
    /// The text after the code and separator.
    pub message: String,
}

impl ResponseLine {
    /// Parses a single reply line without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line does not start with a
    /// three-digit code followed by a space, a dash or nothing.
    pub fn parse(line: &str) -> Result<Self> {
        let code = line
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u16>().ok())
            .ok_or_else(|| ClientError::ParseError(format!("Invalid status code in '{line}'")))?;

        let rest = &line[3..];
        let (is_last, message) = match rest.as_bytes().first() {
            None => (true, ""),
            Some(b' ') => (true, &rest[1..]),
            Some(b'-') => (false, &rest[1..]),
            Some(_) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator after status code in '{line}'"
                )));
            }
        };

        Ok(Self {
            code,
            is_last,
            message: message.to_string(),
        })
    }
}

/// A complete reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The reply code shared by every line.
    pub code: u16,
    /// The text of each line, in order.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined with newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. `354` after DATA.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Parses the first complete reply in `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if
    /// the buffer does not yet hold a final line. Lines may end in CRLF or a
    /// bare LF; invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` for a malformed line or when the
    /// lines of a multi-line reply disagree on the code.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = ResponseLine::parse(&String::from_utf8_lossy(raw))?;
            match code {
                None => code = Some(line.code),
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
