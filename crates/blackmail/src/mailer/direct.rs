//! Mailer that delivers straight to each recipient domain's MX hosts.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use blackmail_mime::{Mailbox, MessageBuilder, Part};
use blackmail_smtp::{Client, ClientConfig, MailOptions};
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::Mailer;
use crate::error::{Error, Result};

/// Looks up mail exchangers for a domain.
pub trait MxResolver: Send + Sync {
    /// Returns the hosts to try for `domain`, most preferred first.
    ///
    /// Implementations fall back to `domain` itself when there are no MX
    /// records or the lookup fails.
    fn lookup_mx(&self, domain: &str) -> impl Future<Output = Vec<String>> + Send;
}

/// Resolver using the system DNS configuration.
///
/// The configuration is read on first use.
#[derive(Default)]
pub struct SystemResolver {
    inner: OnceCell<TokioAsyncResolver>,
}

impl fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemResolver")
            .field("initialized", &self.inner.initialized())
            .finish()
    }
}

impl MxResolver for SystemResolver {
    async fn lookup_mx(&self, domain: &str) -> Vec<String> {
        let resolver = match self
            .inner
            .get_or_try_init(|| async { TokioAsyncResolver::tokio_from_system_conf() })
            .await
        {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!(%err, "cannot load system resolver configuration");
                return vec![domain.to_string()];
            }
        };

        match resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let records = lookup
                    .iter()
                    .map(|mx| (mx.preference(), mx.exchange().to_utf8()))
                    .collect();
                mx_hosts(domain, records)
            }
            Err(err) => {
                debug!(domain, %err, "MX lookup failed, using the domain itself");
                vec![domain.to_string()]
            }
        }
    }
}

/// Orders `(preference, host)` records and falls back to `domain`.
fn mx_hosts(domain: &str, mut records: Vec<(u16, String)>) -> Vec<String> {
    records.sort_by_key(|(preference, _)| *preference);
    let hosts: Vec<String> = records
        .into_iter()
        .map(|(_, host)| host.trim_end_matches('.').to_string())
        .filter(|host| !host.is_empty())
        .collect();
    if hosts.is_empty() {
        vec![domain.to_string()]
    } else {
        hosts
    }
}

/// Settings for direct delivery.
#[derive(Clone)]
pub struct DirectOptions {
    /// EHLO name; defaults to the machine's host name.
    pub hello_name: String,
    /// SMTP port on the MX hosts.
    pub port: u16,
    /// Skip hosts that do not offer STARTTLS.
    pub require_tls: bool,
    /// Limit for each network read and write.
    pub timeout: Option<Duration>,
    /// TLS settings for STARTTLS.
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl Default for DirectOptions {
    fn default() -> Self {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        Self {
            hello_name: if host.is_empty() {
                "localhost".to_string()
            } else {
                host
            },
            port: 25,
            require_tls: false,
            timeout: Some(Duration::from_secs(60)),
            tls: None,
        }
    }
}

impl fmt::Debug for DirectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectOptions")
            .field("hello_name", &self.hello_name)
            .field("port", &self.port)
            .field("require_tls", &self.require_tls)
            .field("timeout", &self.timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Delivers to the MX hosts of every recipient domain.
///
/// Recipients are grouped by domain. For each domain the MX hosts are
/// tried in preference order: a connection failure (or a host without
/// STARTTLS when TLS is required) moves on to the next host, while an SMTP
/// rejection stops delivery for that domain. Every domain is attempted;
/// the first failure is returned as [`Error::Delivery`].
#[derive(Debug)]
pub struct DirectMailer<R = SystemResolver> {
    resolver: R,
    options: DirectOptions,
    builder: MessageBuilder,
}

impl DirectMailer {
    /// Creates a mailer using the system resolver.
    #[must_use]
    pub fn new(options: DirectOptions) -> Self {
        Self::with_resolver(SystemResolver::default(), options)
    }
}

impl<R: MxResolver> DirectMailer<R> {
    /// Creates a mailer using `resolver` for MX lookups.
    #[must_use]
    pub fn with_resolver(resolver: R, options: DirectOptions) -> Self {
        Self {
            resolver,
            options,
            builder: MessageBuilder::new(),
        }
    }

    /// Uses `builder` to assemble messages.
    #[must_use]
    pub fn with_builder(mut self, builder: MessageBuilder) -> Self {
        self.builder = builder;
        self
    }

    async fn deliver_domain(
        &self,
        domain: &str,
        from: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<()> {
        let hosts = self.resolver.lookup_mx(domain).await;
        let mut last = None;

        for host in &hosts {
            match self.deliver_host(host, from, recipients, message).await {
                Ok(()) => {
                    info!(domain, host = %host, recipients = recipients.len(), "message delivered");
                    return Ok(());
                }
                Err(err) if is_soft(&err) => {
                    warn!(domain, host = %host, %err, "mail host unusable, trying next");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last.unwrap_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mail hosts for {domain}"),
            ))
        }))
    }

    async fn deliver_host(
        &self,
        host: &str,
        from: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<()> {
        let mut config = ClientConfig::new()
            .local_name(self.options.hello_name.clone())
            .timeout(self.options.timeout);
        if let Some(tls) = &self.options.tls {
            config = config.tls(Arc::clone(tls));
        }

        let mut client = Client::connect(host, self.options.port, config).await?;
        client.hello(&self.options.hello_name).await?;

        if client.extensions().contains("STARTTLS") {
            client = client.starttls().await?;
        } else if self.options.require_tls {
            return Err(Error::TlsRequired(host.to_string()));
        }

        let options = MailOptions {
            size: Some(message.len()),
            ..MailOptions::default()
        };
        let response = client.send_mail(from, recipients, message, &options).await?;
        debug!(host, status = %response.status_text, "DATA accepted");

        if let Err(err) = client.quit().await {
            warn!(host, %err, "QUIT failed after delivery");
        }
        Ok(())
    }
}

impl<R: MxResolver> Mailer for DirectMailer<R> {
    async fn send(&self, subject: &str, from: &Mailbox, parts: Vec<Part>) -> Result<()> {
        let message = self.builder.build(subject, from, parts)?;

        let mut first_error = None;
        for (domain, recipients) in group_by_domain(&message.recipients) {
            if let Err(err) = self
                .deliver_domain(&domain, &from.address, &recipients, &message.bytes)
                .await
            {
                warn!(domain = %domain, %err, "delivery failed");
                first_error.get_or_insert(Error::Delivery {
                    domain,
                    source: Box::new(err),
                });
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Groups addresses by lowercased domain, keeping first-seen order.
///
/// An address without `@` is its own domain.
#[must_use]
pub fn group_by_domain(recipients: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for rcpt in recipients {
        let domain = rcpt
            .rsplit_once('@')
            .map_or(rcpt.as_str(), |(_, domain)| domain)
            .to_ascii_lowercase();
        match groups.iter_mut().find(|(d, _)| *d == domain) {
            Some((_, list)) => list.push(rcpt.clone()),
            None => groups.push((domain, vec![rcpt.clone()])),
        }
    }
    groups
}

/// Failures that justify trying the next MX host.
fn is_soft(err: &Error) -> bool {
    match err {
        Error::Smtp(err) => err.is_connection_error(),
        Error::TlsRequired(_) => true,
        _ => false,
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

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_group_by_domain() {
        let groups = group_by_domain(&strings(&[
            "a@one.example",
            "b@two.example",
            "c@One.Example",
            "local",
        ]));
        assert_eq!(
            groups,
            vec![
                (
                    "one.example".to_string(),
                    strings(&["a@one.example", "c@One.Example"])
                ),
                ("two.example".to_string(), strings(&["b@two.example"])),
                ("local".to_string(), strings(&["local"])),
            ]
        );
    }

    #[test]
    fn test_mx_hosts_ordering() {
        let hosts = mx_hosts(
            "example.com",
            vec![
                (20, "mx2.example.com.".to_string()),
                (10, "mx1.example.com.".to_string()),
                (20, "mx3.example.com.".to_string()),
            ],
        );
        assert_eq!(
            hosts,
            strings(&["mx1.example.com", "mx2.example.com", "mx3.example.com"])
        );
    }

    #[test]
    fn test_mx_hosts_fallback() {
        assert_eq!(mx_hosts("example.com", vec![]), strings(&["example.com"]));
        assert_eq!(
            mx_hosts("example.com", vec![(0, ".".to_string())]),
            strings(&["example.com"])
        );
    }

    #[test]
    fn test_soft_errors() {
        let refused = Error::from(blackmail_smtp::Error::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
        assert!(is_soft(&refused));
        assert!(is_soft(&Error::TlsRequired("mx".to_string())));
        assert!(!is_soft(&Error::from(blackmail_smtp::Error::smtp_error(
            550,
            "5.7.1 blocked"
        ))));
    }

    #[test]
    fn test_default_options() {
        let options = DirectOptions::default();
        assert_eq!(options.port, 25);
        assert!(!options.hello_name.is_empty());
        assert!(!options.require_tls);
    }
}
