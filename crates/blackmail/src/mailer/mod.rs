//! Delivery backends.
//!
//! Every mailer builds the message with a [`MessageBuilder`] and then hands
//! the bytes to its transport:
//!
//! - [`WriterMailer`] writes to any `io::Write` (stdout, a file, a buffer)
//! - [`RelayMailer`] submits through one SMTP server given by URL
//! - [`DirectMailer`] looks up MX hosts and delivers to each recipient
//!   domain itself

mod direct;
mod relay;
mod writer;

use std::future::Future;
use std::io::Stdout;

use blackmail_mime::{Mailbox, MessageBuilder, Part};

pub use direct::{DirectMailer, DirectOptions, MxResolver, SystemResolver, group_by_domain};
pub use relay::{RelayMailer, RelayOptions};
pub use writer::WriterMailer;

use crate::error::Result;

/// Sends messages built from parts.
pub trait Mailer: Send + Sync {
    /// Builds the message and delivers it to every To, Cc and Bcc
    /// recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Message`](crate::Error::Message) if the parts do not
    /// form a valid message, or a delivery error.
    fn send(
        &self,
        subject: &str,
        from: &Mailbox,
        parts: Vec<Part>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// A mailer chosen at run time by name or relay URL.
#[derive(Debug)]
pub enum AnyMailer {
    /// `stdout`
    Stdout(WriterMailer<Stdout>),
    /// `direct`
    Direct(DirectMailer),
    /// `smtp://…` or `smtps://…`
    Relay(RelayMailer),
}

impl AnyMailer {
    /// Parses `stdout`, `direct`, or a relay URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`](crate::Error::InvalidUrl) for anything
    /// else.
    pub fn parse(target: &str, builder: MessageBuilder) -> Result<Self> {
        match target {
            "stdout" => Ok(Self::Stdout(
                WriterMailer::new(std::io::stdout()).with_builder(builder),
            )),
            "direct" => Ok(Self::Direct(
                DirectMailer::new(DirectOptions::default()).with_builder(builder),
            )),
            url => Ok(Self::Relay(
                RelayMailer::new(url, RelayOptions::default())?.with_builder(builder),
            )),
        }
    }
}

impl Mailer for AnyMailer {
    async fn send(&self, subject: &str, from: &Mailbox, parts: Vec<Part>) -> Result<()> {
        match self {
            Self::Stdout(m) => m.send(subject, from, parts).await,
            Self::Direct(m) => m.send(subject, from, parts).await,
            Self::Relay(m) => m.send(subject, from, parts).await,
        }
    }
}
