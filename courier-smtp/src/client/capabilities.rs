use core::fmt::{self, Display};

use super::response::Response;

/// An ESMTP extension advertised by the relay in its EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// STARTTLS (RFC 3207): the connection may be upgraded in place.
    Starttls,

    /// AUTH (RFC 4954) with the advertised SASL mechanisms, upper-cased.
    Auth(Vec<String>),

    /// Anything else, kept verbatim.
    Other(String),
}

impl Extension {
    /// Parses one EHLO line such as `AUTH PLAIN LOGIN`.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();

        match keyword.as_str() {
            "STARTTLS" => Self::Starttls,
            "AUTH" => Self::Auth(words.map(str::to_ascii_uppercase).collect()),
            _ => Self::Other(line.trim().to_string()),
        }
    }
}

impl Display for Extension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starttls => fmt.write_str("STARTTLS"),
            Self::Auth(mechanisms) if mechanisms.is_empty() => fmt.write_str("AUTH"),
            Self::Auth(mechanisms) => write!(fmt, "AUTH {}", mechanisms.join(" ")),
            Self::Other(line) => fmt.write_str(line),
        }
    }
}

/// The extension set from the most recent EHLO.
///
/// Empty after a HELO fallback, since HELO advertises nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    extensions: Vec<Extension>,
}

impl Capabilities {
    /// Reads the extensions from an EHLO reply. The first line is the
    /// relay's greeting and is skipped.
    pub fn from_ehlo(response: &Response) -> Self {
        Self {
            extensions: response
                .lines
                .iter()
                .skip(1)
                .filter(|line| !line.trim().is_empty())
                .map(|line| Extension::parse(line))
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains(&Extension::Starttls)
    }

    /// The advertised AUTH mechanisms, or `None` when AUTH is not offered.
    pub fn auth_mechanisms(&self) -> Option<&[String]> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }

    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.auth_mechanisms()
            .is_some_and(|mechanisms| mechanisms.iter().any(|m| m.eq_ignore_ascii_case(mechanism)))
    }
}
