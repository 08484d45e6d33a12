//! ESMTP extension table.

use std::collections::HashMap;

/// Extensions advertised in an EHLO reply.
///
/// Keywords are stored upper-cased; the value is the rest of the line
/// (empty when the keyword has no parameters).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    entries: HashMap<String, String>,
    auth: Vec<String>,
}

impl Extensions {
    /// Builds the table from EHLO reply lines. The first line is the
    /// server greeting and is skipped.
    #[must_use]
    pub fn from_ehlo(lines: &[String]) -> Self {
        let mut ext = Self::default();
        for line in lines.iter().skip(1) {
            let (keyword, params) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            if keyword.is_empty() {
                continue;
            }
            ext.entries
                .insert(keyword.to_ascii_uppercase(), params.to_string());
        }
        if let Some(mechs) = ext.entries.get("AUTH") {
            ext.auth = mechs.split_whitespace().map(str::to_string).collect();
        }
        ext
    }

    /// Returns whether `keyword` was advertised, case-insensitively.
    #[must_use]
    pub fn contains(&self, keyword: &str) -> bool {
        self.entries.contains_key(&keyword.to_ascii_uppercase())
    }

    /// Returns the parameter string of `keyword`.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.entries
            .get(&keyword.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Raw AUTH mechanism names in advertised order.
    #[must_use]
    pub fn auth_names(&self) -> &[String] {
        &self.auth
    }

    /// AUTH mechanisms this crate implements, in advertised order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.auth.iter().filter_map(|m| AuthMechanism::parse(m)).collect()
    }

    /// Maximum message size from `SIZE`, if advertised with a value.
    #[must_use]
    pub fn max_size(&self) -> Option<usize> {
        self.get("SIZE").and_then(|s| s.trim().parse().ok())
    }

    /// Returns true if no extensions are known (HELO session).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// CRAM-MD5 - challenge-response
    CramMd5,
    /// `XOAUTH2` - `OAuth2` bearer token
    XOAuth2,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
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

    fn ehlo(lines: &[&str]) -> Extensions {
        let lines: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();
        Extensions::from_ehlo(&lines)
    }

    #[test]
    fn test_from_ehlo() {
        let ext = ehlo(&[
            "mx.example.com greets you",
            "8BITMIME",
            "size 10240000",
            "AUTH PLAIN LOGIN CRAM-MD5 SCRAM-SHA-256",
            "STARTTLS",
        ]);
        assert!(ext.contains("8bitmime"));
        assert!(ext.contains("STARTTLS"));
        assert!(!ext.contains("SMTPUTF8"));
        assert_eq!(ext.get("SIZE"), Some("10240000"));
        assert_eq!(ext.get("8BITMIME"), Some(""));
        assert_eq!(ext.max_size(), Some(10_240_000));
        assert_eq!(ext.auth_names().len(), 4);
        assert_eq!(
            ext.auth_mechanisms(),
            vec![
                AuthMechanism::Plain,
                AuthMechanism::Login,
                AuthMechanism::CramMd5
            ]
        );
    }

    #[test]
    fn test_greeting_only() {
        let ext = ehlo(&["mx.example.com"]);
        assert!(ext.is_empty());
        assert!(ext.auth_mechanisms().is_empty());
        assert_eq!(ext.max_size(), None);
    }

    #[test]
    fn test_mechanism_names() {
        assert_eq!(AuthMechanism::parse("cram-md5"), Some(AuthMechanism::CramMd5));
        assert_eq!(AuthMechanism::parse("GSSAPI"), None);
        assert_eq!(AuthMechanism::XOAuth2.to_string(), "XOAUTH2");
    }
}
