//! Mailbox addresses.

use crate::encoding::encode_q;
use crate::error::{Error, Result};
use std::fmt;

/// Display name plus email address, as used in `From`, `To` and `Cc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// Display name; may be empty.
    pub name: String,
    /// Bare email address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox from a display name and an address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Creates a mailbox without a display name.
    #[must_use]
    pub fn bare(address: impl Into<String>) -> Self {
        Self::new(String::new(), address)
    }

    /// Returns the part after the `@`, or the whole address if there is none.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .split_once('@')
            .map_or(self.address.as_str(), |(_, domain)| domain)
    }

    /// Basic sanity check of the address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is empty, contains a
    /// line break, or lacks exactly one `@` between a local part and domain.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.address.is_empty() {
            "address cannot be empty"
        } else if self.address.contains(['\r', '\n']) {
            "address cannot contain line breaks"
        } else {
            match self.address.split_once('@') {
                None => "address must contain @",
                Some((_, domain)) if domain.contains('@') => "address must have exactly one @",
                Some((local, domain)) if local.is_empty() || domain.is_empty() => {
                    "local and domain parts cannot be empty"
                }
                Some(_) => return Ok(()),
            }
        };
        Err(Error::InvalidAddress {
            address: self.address.clone(),
            reason,
        })
    }
}

impl fmt::Display for Mailbox {
    /// Formats as `"Name" <addr>`, `=?utf-8?q?...?= <addr>` or `<addr>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            return write!(f, "<{}>", self.address);
        }
        let printable = self.name.chars().all(|c| c == ' ' || c == '\t' || c.is_ascii_graphic());
        if printable {
            let escaped = self.name.replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "\"{escaped}\" <{}>", self.address)
        } else {
            write!(f, "{} <{}>", encode_q(&self.name), self.address)
        }
    }
}

/// Joins mailboxes into an address-list header value.
pub(crate) fn join(mailboxes: &[&Mailbox]) -> String {
    mailboxes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_display_bare() {
        assert_eq!(Mailbox::bare("to@to.to").to_string(), "<to@to.to>");
    }

    #[test]
    fn test_display_quoted_name() {
        assert_eq!(
            Mailbox::new("Martin \"T\"", "me@example.com").to_string(),
            "\"Martin \\\"T\\\"\" <me@example.com>"
        );
    }

    #[test]
    fn test_display_encoded_name() {
        assert_eq!(
            Mailbox::new("Jörg", "j@example.com").to_string(),
            "=?utf-8?q?J=C3=B6rg?= <j@example.com>"
        );
    }

    #[test]
    fn test_domain() {
        assert_eq!(Mailbox::bare("me@example.com").domain(), "example.com");
        assert_eq!(Mailbox::bare("localonly").domain(), "localonly");
    }

    #[test]
    fn test_validate() {
        assert!(Mailbox::bare("user@example.com").validate().is_ok());
        assert!(Mailbox::bare("").validate().is_err());
        assert!(Mailbox::bare("userexample.com").validate().is_err());
        assert!(Mailbox::bare("a@b@c").validate().is_err());
        assert!(Mailbox::bare("@example.com").validate().is_err());
        assert!(Mailbox::bare("user@").validate().is_err());

        let err = Mailbox::bare("x@y.z\r\nRCPT TO:<evil@e.com>")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_join() {
        let a = Mailbox::bare("a@x.com");
        let b = Mailbox::new("B", "b@x.com");
        assert_eq!(join(&[&a, &b]), "<a@x.com>, \"B\" <b@x.com>");
    }
}
