//! Mailer that writes messages to a stream.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use blackmail_mime::{Mailbox, MessageBuilder, Part};
use tracing::debug;

use super::Mailer;
use crate::error::Result;

/// Writes each message, followed by a newline, to `W`.
///
/// Meant for development and tests. Concurrent sends are serialized so
/// messages never interleave.
#[derive(Debug)]
pub struct WriterMailer<W> {
    sink: Mutex<W>,
    builder: MessageBuilder,
}

impl<W: Write + Send> WriterMailer<W> {
    /// Creates a mailer writing to `sink`.
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
            builder: MessageBuilder::new(),
        }
    }

    /// Uses `builder` to assemble messages.
    #[must_use]
    pub fn with_builder(mut self, builder: MessageBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Returns the sink.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Mailer for WriterMailer<W> {
    async fn send(&self, subject: &str, from: &Mailbox, parts: Vec<Part>) -> Result<()> {
        let message = self.builder.build(subject, from, parts)?;

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(&message.bytes)?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        drop(sink);

        debug!(
            bytes = message.bytes.len(),
            recipients = message.recipients.len(),
            "message written"
        );
        Ok(())
    }
}
