//! DATA payload framing (RFC 5321 section 4.5.2).

/// Streams payload chunks into wire form: a leading `.` on any line is
/// doubled, a bare LF becomes CRLF, and [`DotStuffer::finish`] appends the
/// `.` terminator line.
///
/// State carries across chunks, so a header and body written separately are
/// framed exactly as if they were one buffer.
#[derive(Debug)]
pub(crate) struct DotStuffer {
    at_line_start: bool,
    after_cr: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self {
            at_line_start: true,
            after_cr: false,
        }
    }
}

impl DotStuffer {
    pub(crate) fn stuff(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 64 + 2);

        for &byte in chunk {
            if self.at_line_start && byte == b'.' {
                out.push(b'.');
            }
            if byte == b'\n' && !self.after_cr {
                out.push(b'\r');
            }
            out.push(byte);

            self.at_line_start = byte == b'\n';
            self.after_cr = byte == b'\r';
        }

        out
    }

    /// The bytes that close the payload: a CRLF if the last line is
    /// unterminated, then `.` CRLF.
    pub(crate) fn finish(self) -> Vec<u8> {
        if self.at_line_start {
            b".\r\n".to_vec()
        } else if self.after_cr {
            b"\n.\r\n".to_vec()
        } else {
            b"\r\n.\r\n".to_vec()
        }
    }
}
