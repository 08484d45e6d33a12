//! SASL mechanisms for SMTP AUTH.
//!
//! A [`Mechanism`] produces the mechanism name with an optional initial
//! response, then answers each decoded server challenge. The client takes
//! care of base64 and of aborting the exchange when a step fails.

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};
use crate::types::AuthMechanism;

/// Client side of a SASL exchange.
pub trait Mechanism: Send {
    /// Returns the mechanism name and the initial response, if the
    /// mechanism sends one with the AUTH command. An empty response is
    /// treated as none.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange cannot start.
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)>;

    /// Answers a decoded `334` challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is unexpected; the client then
    /// cancels the exchange with `*`.
    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// PLAIN (RFC 4616).
#[derive(Debug, Clone)]
pub struct Plain {
    identity: String,
    username: String,
    password: String,
}

impl Plain {
    /// Creates PLAIN credentials. An empty `identity` means "same as
    /// `username`".
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Mechanism for Plain {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        let ir = format!("{}\0{}\0{}", self.identity, self.username, self.password);
        Ok((AuthMechanism::Plain.as_str().into(), Some(ir.into_bytes())))
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        Err(Error::Sasl("unexpected server challenge".into()))
    }
}

/// LOGIN (draft-murchison-sasl-login).
///
/// The username goes out as the initial response; later challenges are
/// answered by their prompt text.
#[derive(Debug, Clone)]
pub struct Login {
    username: String,
    password: String,
}

impl Login {
    /// Creates LOGIN credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Mechanism for Login {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        Ok((
            AuthMechanism::Login.as_str().into(),
            Some(self.username.clone().into_bytes()),
        ))
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        match challenge {
            b"Password:" => Ok(self.password.clone().into_bytes()),
            b"Username:" => Ok(self.username.clone().into_bytes()),
            _ => Err(Error::Sasl("unexpected server challenge".into())),
        }
    }
}

/// CRAM-MD5 (RFC 2195).
#[derive(Debug, Clone)]
pub struct CramMd5 {
    username: String,
    secret: String,
}

impl CramMd5 {
    /// Creates CRAM-MD5 credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl Mechanism for CramMd5 {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        Ok((AuthMechanism::CramMd5.as_str().into(), None))
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let mut mac = Hmac::<Md5>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Sasl(e.to_string()))?;
        mac.update(challenge);
        let digest = mac.finalize().into_bytes();

        let mut response = self.username.clone();
        response.push(' ');
        for byte in digest {
            response.push_str(&format!("{byte:02x}"));
        }
        Ok(response.into_bytes())
    }
}

/// `XOAUTH2` bearer token authentication.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`. On failure the
/// server sends a JSON error as a challenge; it is answered with an empty
/// line so the server can finish with its error reply.
#[derive(Debug, Clone)]
pub struct XOAuth2 {
    username: String,
    token: String,
}

impl XOAuth2 {
    /// Creates `XOAUTH2` credentials from an access token.
    #[must_use]
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl Mechanism for XOAuth2 {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        let ir = format!("user={}\x01auth=Bearer {}\x01\x01", self.username, self.token);
        Ok((AuthMechanism::XOAuth2.as_str().into(), Some(ir.into_bytes())))
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        tracing::debug!(
            error = %String::from_utf8_lossy(challenge),
            "XOAUTH2 rejected"
        );
        Ok(Vec::new())
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

    #[test]
    fn test_plain() {
        let mut m = Plain::new("", "user", "pass");
        let (name, ir) = m.start().unwrap();
        assert_eq!(name, "PLAIN");
        assert_eq!(ir.unwrap(), b"\0user\0pass");
        assert!(m.next(b"anything").is_err());
    }

    #[test]
    fn test_login() {
        let mut m = Login::new("user", "pass");
        let (name, ir) = m.start().unwrap();
        assert_eq!(name, "LOGIN");
        assert_eq!(ir.unwrap(), b"user");
        assert_eq!(m.next(b"Password:").unwrap(), b"pass");
        assert_eq!(m.next(b"Username:").unwrap(), b"user");
        assert!(m.next(b"Who?").is_err());
    }

    #[test]
    fn test_cram_md5_rfc2195_vector() {
        let mut m = CramMd5::new("tim", "tanstaaftanstaaf");
        let (name, ir) = m.start().unwrap();
        assert_eq!(name, "CRAM-MD5");
        assert!(ir.is_none());
        let resp = m
            .next(b"<1896.697170952@postoffice.reston.mci.net>")
            .unwrap();
        assert_eq!(
            String::from_utf8(resp).unwrap(),
            "tim b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn test_xoauth2() {
        let mut m = XOAuth2::new("test@test.com", "abc");
        let (name, ir) = m.start().unwrap();
        assert_eq!(name, "XOAUTH2");
        assert_eq!(ir.unwrap(), b"user=test@test.com\x01auth=Bearer abc\x01\x01");
        assert!(m.next(b"{\"status\":\"401\"}").unwrap().is_empty());
    }
}
