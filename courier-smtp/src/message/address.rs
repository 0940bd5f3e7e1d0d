use core::{
    convert::Infallible,
    fmt::{self, Display},
    str::FromStr,
};

use super::encoding::encode_phrase;

/// A mailbox with an optional display name.
///
/// Formats as the bare address, `Name <address>` for an ASCII name, or
/// `=?UTF-8?B?...?= <address>` when the name needs encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    email: String,
    display_name: Option<String>,
}

impl Address {
    /// An address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
        }
    }

    /// An address shown as `name`. An empty name is the same as none.
    #[must_use]
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            email: email.into(),
            display_name: (!name.is_empty()).then_some(name),
        }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_empty()
    }
}

impl Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.email.is_empty() {
            return Ok(());
        }

        match &self.display_name {
            Some(name) => write!(fmt, "{} <{}>", encode_phrase(name), self.email),
            None => fmt.write_str(&self.email),
        }
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

/// Parses `Name <address>`, `<address>` or a bare address. Quotes around the
/// name are dropped.
impl FromStr for Address {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let Some((name, rest)) = s.split_once('<') else {
            return Ok(Self::new(s));
        };
        let Some(email) = rest.strip_suffix('>') else {
            return Ok(Self::new(s));
        };

        Ok(Self::with_name(email.trim(), name.trim().trim_matches('"')))
    }
}

/// Header form of an address list: every entry is followed by a comma.
pub(crate) fn format_list(addresses: &[Address]) -> String {
    addresses.iter().fold(String::new(), |mut list, address| {
        list.push_str(&address.to_string());
        list.push(',');
        list
    })
}
