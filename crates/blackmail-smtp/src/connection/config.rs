//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by every session a [`Client`](super::Client) runs.
#[derive(Clone)]
pub struct ClientConfig {
    /// Name sent with EHLO/HELO.
    pub local_name: String,
    /// Limit for each read and each write; `None` waits forever.
    pub timeout: Option<Duration>,
    /// TLS settings for STARTTLS and implicit TLS; `None` uses the
    /// webpki roots.
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl ClientConfig {
    /// Creates the default configuration: `localhost`, 5 minute timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local_name: "localhost".to_string(),
            timeout: Some(Duration::from_secs(300)),
            tls: None,
        }
    }

    /// Sets the EHLO/HELO name.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TLS client configuration.
    #[must_use]
    pub fn tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("local_name", &self.local_name)
            .field("timeout", &self.timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}
