//! Error types for sending mail.

use std::io;

/// Result type alias for mailer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from building or delivering a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message could not be built.
    #[error("building message: {0}")]
    Message(#[from] blackmail_mime::Error),

    /// SMTP session failure.
    #[error("{0}")]
    Smtp(#[from] blackmail_smtp::Error),

    /// Relay URL could not be used.
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Credentials were given but no usable AUTH mechanism is offered.
    #[error("server does not support a usable AUTH mechanism (offered: {0})")]
    AuthUnsupported(String),

    /// TLS was required but the server does not offer STARTTLS.
    #[error("{0} does not offer STARTTLS and TLS is required")]
    TlsRequired(String),

    /// Writing the message failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Delivery to one recipient domain failed.
    #[error("delivery to {domain} failed: {source}")]
    Delivery {
        /// Recipient domain.
        domain: String,
        /// Last failure for that domain.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns true if the message itself was invalid, so nothing was sent.
    #[must_use]
    pub const fn is_build_error(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Returns true if retrying later may succeed (4xx reply or a
    /// connection failure).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Smtp(err) => err.is_transient() || err.is_connection_error(),
            Self::Delivery { source, .. } => source.is_transient(),
            Self::Io(_) => true,
            _ => false,
        }
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
    fn test_build_error_classification() {
        let err = Error::from(blackmail_mime::Error::NoRecipients);
        assert!(err.is_build_error());
        assert!(!err.is_transient());

        let err = Error::from(blackmail_smtp::Error::smtp_error(550, "5.1.1 no"));
        assert!(!err.is_build_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_delivery_wraps_transient() {
        let err = Error::Delivery {
            domain: "example.com".to_string(),
            source: Box::new(Error::from(blackmail_smtp::Error::smtp_error(
                451, "later",
            ))),
        };
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "delivery to example.com failed: SMTP error 451: later"
        );
    }
}
