//! Error types for message assembly.

use std::io;

/// Result type alias for message assembly.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a caller-supplied body callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message assembly error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A part carried a construction error; `position` is 1-based.
    #[error("part {position}: {source}")]
    Part {
        /// Position of the offending part in the argument list.
        position: usize,
        /// The deferred construction error.
        #[source]
        source: Box<Error>,
    },

    /// No To, Cc or Bcc recipient was given.
    #[error("need at least one recipient")]
    NoRecipients,

    /// No body part was given.
    #[error("need at least one body part")]
    NoBody,

    /// A key/value list had an odd number of elements.
    #[error("odd argument count")]
    OddArgumentCount,

    /// A `key<sep>value` string was missing its separator.
    #[error("missing {separator:?} in {input:?}")]
    MissingSeparator {
        /// Expected separator.
        separator: char,
        /// The offending input.
        input: String,
    },

    /// Invalid email address.
    #[error("invalid email address {address:?}: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A body-producing callback failed.
    #[error("body: {0}")]
    Body(#[source] BoxError),

    /// Signing a `multipart/signed` container failed.
    #[error("signing: {0}")]
    Signing(String),

    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps this error with the 1-based position of the part that carried it.
    #[must_use]
    pub fn at_part(self, position: usize) -> Self {
        Self::Part {
            position,
            source: Box::new(self),
        }
    }
}
