//! Error types for SMTP operations.

use std::fmt;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// RFC 3463 enhanced status code, e.g. `5.1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnhancedCode(pub [u16; 3]);

impl EnhancedCode {
    /// Returns the class digit (2, 4 or 5).
    #[must_use]
    pub const fn class(self) -> u16 {
        self.0[0]
    }
}

impl fmt::Display for EnhancedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server name is not a valid DNS name or IP address.
    #[error("invalid server name: {0}")]
    InvalidDnsName(String),

    /// Server answered with an unexpected reply code.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Enhanced status code, when the message starts with one.
        enhanced: Option<EnhancedCode>,
        /// Error message from server, without the enhanced code.
        message: String,
    },

    /// Malformed reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command argument contained CR or LF.
    #[error("smtp: a line must not contain CR or LF")]
    LineBreak,

    /// Operation not valid in the current session state.
    #[error("invalid state for operation: {0}")]
    InvalidState(String),

    /// Read or write did not finish within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// Feature not advertised by the server.
    #[error("server does not support {0}")]
    NotSupported(String),

    /// SASL mechanism failure.
    #[error("sasl: {0}")]
    Sasl(String),

    /// An earlier HELO/EHLO exchange failed.
    #[error("hello failed: {0}")]
    HelloFailed(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message, splitting off a
    /// leading enhanced status code.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let (enhanced, message) = crate::parser::split_enhanced_code(&message);
        Self::SmtpError {
            code,
            enhanced,
            message,
        }
    }

    /// Returns the reply code if this is a server rejection.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::SmtpError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true for every server rejection that is not transient.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { .. }) && !self.is_transient()
    }

    /// Returns true if the connection itself failed, as opposed to the
    /// server rejecting a command.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::InvalidDnsName(_) | Self::Timeout
        )
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
    fn test_smtp_error_enhanced() {
        let err = Error::smtp_error(550, "5.1.1 No such user");
        match &err {
            Error::SmtpError {
                code,
                enhanced,
                message,
            } => {
                assert_eq!(*code, 550);
                assert_eq!(*enhanced, Some(EnhancedCode([5, 1, 1])));
                assert_eq!(message, "No such user");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "SMTP error 550: No such user");
    }

    #[test]
    fn test_classification() {
        let transient = Error::smtp_error(451, "try later");
        assert!(transient.is_transient());
        assert!(!transient.is_permanent());
        assert_eq!(transient.code(), Some(451));

        // Codes outside 4xx are permanent, including odd ones.
        assert!(Error::smtp_error(354, "x").is_permanent());
        assert!(!Error::Timeout.is_permanent());
        assert!(Error::Timeout.is_connection_error());
        assert!(!Error::LineBreak.is_connection_error());
    }

    #[test]
    fn test_enhanced_display() {
        assert_eq!(EnhancedCode([4, 7, 0]).to_string(), "4.7.0");
        assert_eq!(EnhancedCode([4, 7, 0]).class(), 4);
    }
}
