//! Detached signatures for `multipart/signed` containers.

use crate::error::BoxError;

/// Produces a detached signature over the first part of a signed container.
///
/// `content` is that part exactly as serialized, MIME headers included. The
/// returned signature is usually ASCII-armored; bare LFs are converted to
/// CRLF before it is embedded.
pub trait Signer: Send + Sync {
    /// Signs `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be produced.
    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, BoxError>;
}

impl<F> Signer for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, BoxError> {
        self(content)
    }
}
