//! SMTP client session.

use std::future::Future;
use std::io;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::data::{DataResponse, DataWriter};
use super::{ClientConfig, SmtpStream, connect_plain, connect_tls};
use crate::auth::Mechanism;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Extensions, Reply, ReplyCode};

/// Upper bound on lines in one reply.
const MAX_REPLY_LINES: usize = 1000;

/// Where a session stands in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting read, no HELO/EHLO yet.
    Connected,
    /// HELO/EHLO done, extensions known.
    Helloed,
    /// AUTH succeeded.
    Authenticated,
    /// MAIL accepted, collecting recipients.
    InTransaction,
    /// DATA accepted, message body being written.
    DataPhase,
    /// QUIT done or the connection failed.
    Closed,
}

/// Optional parameters of the MAIL command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailOptions {
    /// Message size in bytes, sent as `SIZE=` when the server has `SIZE`.
    pub size: Option<usize>,
    /// Request `SMTPUTF8`; fails if the server does not offer it.
    pub utf8: bool,
    /// Request `REQUIRETLS`; fails if the server does not offer it.
    pub require_tls: bool,
    /// `AUTH=` identity, dropped when the server has no `AUTH`.
    pub auth: Option<String>,
}

/// An SMTP client session over any async byte stream.
///
/// Commands are strictly sequential: every method takes `&mut self` and
/// waits for the reply before returning. HELO/EHLO runs on first use.
#[derive(Debug)]
pub struct Client<S> {
    stream: BufReader<S>,
    config: ClientConfig,
    server_name: String,
    greeting: String,
    state: SessionState,
    did_hello: bool,
    explicit_hello: bool,
    hello_error: Option<String>,
    extensions: Extensions,
    recipients: Vec<String>,
    authenticated: bool,
}

impl Client<SmtpStream> {
    /// Connects over plain TCP and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the greeting is not 220.
    pub async fn connect(host: &str, port: u16, config: ClientConfig) -> Result<Self> {
        let stream = with_timeout(config.timeout, connect_plain(host, port)).await?;
        Self::new(stream, host, config).await
    }

    /// Connects with implicit TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails or the
    /// greeting is not 220.
    pub async fn connect_tls(host: &str, port: u16, config: ClientConfig) -> Result<Self> {
        let stream = with_timeout(
            config.timeout,
            connect_tls(host, port, config.tls.clone()),
        )
        .await?;
        Self::new(stream, host, config).await
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }

    /// Sends STARTTLS, upgrades the stream and repeats EHLO over it.
    ///
    /// The certificate is checked against the server name given at
    /// connect time. Extensions seen before the upgrade are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses, the handshake fails, or the
    /// second EHLO fails. The session is unusable afterwards.
    pub async fn starttls(mut self) -> Result<Self> {
        self.ensure_hello().await?;
        if self.state != SessionState::Helloed {
            return Err(Error::InvalidState(format!(
                "STARTTLS not allowed in {:?}",
                self.state
            )));
        }
        self.expect(Command::StartTls, |code| code == ReplyCode::SERVICE_READY)
            .await?;

        let limit = self.config.timeout;
        let tls = self.config.tls.clone();
        let plain = self.stream.into_inner();
        let upgraded = with_timeout(limit, plain.upgrade_to_tls(&self.server_name, tls)).await?;
        self.stream = BufReader::new(upgraded);
        debug!(server = %self.server_name, "STARTTLS complete");

        self.extensions = Extensions::default();
        self.ehlo().await?;
        Ok(self)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an open stream and reads the server greeting.
    ///
    /// `server_name` is used for STARTTLS certificate checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not 220.
    pub async fn new(stream: S, server_name: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let mut client = Self {
            stream: BufReader::new(stream),
            config,
            server_name: server_name.into(),
            greeting: String::new(),
            state: SessionState::Connected,
            did_hello: false,
            explicit_hello: false,
            hello_error: None,
            extensions: Extensions::default(),
            recipients: Vec::new(),
            authenticated: false,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.to_error());
        }
        client.greeting = greeting.message_text();
        Ok(client)
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Server greeting text.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Extensions from the last EHLO; empty before hello or after HELO.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Recipients accepted in the current transaction.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns true after a successful AUTH.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Borrows the underlying stream.
    #[must_use]
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Sends HELO/EHLO with `local_name` instead of the configured name.
    ///
    /// Only needed to override the name, and only before any other
    /// command. Calling it again afterwards returns the first outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineBreak`] for a name with CR/LF,
    /// [`Error::InvalidState`] if another command already ran, or the
    /// hello failure.
    pub async fn hello(&mut self, local_name: &str) -> Result<()> {
        validate_line(local_name)?;
        if self.did_hello {
            if !self.explicit_hello {
                return Err(Error::InvalidState(
                    "hello called after other methods".into(),
                ));
            }
            return self.cached_hello();
        }
        self.explicit_hello = true;
        self.config.local_name = local_name.to_string();
        self.ensure_hello().await
    }

    /// Reports whether the server advertised `name`, with its parameters.
    pub async fn extension(&mut self, name: &str) -> (bool, String) {
        if self.ensure_hello().await.is_err() {
            return (false, String::new());
        }
        self.extensions
            .get(name)
            .map_or((false, String::new()), |params| (true, params.to_string()))
    }

    /// Runs a SASL exchange.
    ///
    /// An empty initial response is left off the AUTH line. A failed
    /// exchange leaves the session open; call [`close`](Self::close) if
    /// it will not be retried.
    ///
    /// # Errors
    ///
    /// Returns the server rejection, or the mechanism failure after
    /// cancelling the exchange with `*`.
    pub async fn auth<M>(&mut self, mechanism: &mut M) -> Result<()>
    where
        M: Mechanism + ?Sized,
    {
        self.ensure_hello().await?;
        match self.state {
            SessionState::Helloed => {}
            SessionState::Authenticated => {
                return Err(Error::InvalidState("already authenticated".into()));
            }
            other => {
                return Err(Error::InvalidState(format!("AUTH not allowed in {other:?}")));
            }
        }

        let (name, initial) = mechanism.start()?;
        let initial_response = initial
            .filter(|ir| !ir.is_empty())
            .map(|ir| STANDARD.encode(ir));
        let mut reply = self
            .command(Command::Auth {
                mechanism: name.clone(),
                initial_response,
            })
            .await?;

        loop {
            let step = match reply.code {
                ReplyCode::AUTH_SUCCESS => {
                    self.authenticated = true;
                    self.state = SessionState::Authenticated;
                    debug!(mechanism = %name, "authenticated");
                    return Ok(());
                }
                ReplyCode::AUTH_CONTINUE => STANDARD
                    .decode(reply.message_text().trim())
                    .map_err(|e| Error::Sasl(format!("malformed challenge: {e}")))
                    .and_then(|challenge| mechanism.next(&challenge)),
                _ => Err(reply.to_error()),
            };

            match step {
                Ok(response) => {
                    reply = self
                        .command(Command::AuthResponse(STANDARD.encode(response)))
                        .await?;
                }
                Err(err) => {
                    self.abort_auth().await;
                    return Err(err);
                }
            }
        }
    }

    /// Starts a transaction with `MAIL FROM`.
    ///
    /// `BODY=8BITMIME` is added whenever the server offers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineBreak`] for an address with CR/LF,
    /// [`Error::NotSupported`] for a requested extension the server lacks,
    /// or the server rejection.
    pub async fn mail(&mut self, from: &str, options: &MailOptions) -> Result<()> {
        validate_line(from)?;
        self.ensure_hello().await?;
        if !matches!(
            self.state,
            SessionState::Helloed | SessionState::Authenticated
        ) {
            return Err(Error::InvalidState(format!(
                "MAIL not allowed in {:?}",
                self.state
            )));
        }

        let mut params = Vec::new();
        if self.extensions.contains("8BITMIME") {
            params.push("BODY=8BITMIME".to_string());
        }
        if let Some(size) = options.size
            && size != 0
            && self.extensions.contains("SIZE")
        {
            params.push(format!("SIZE={size}"));
        }
        if options.require_tls {
            if !self.extensions.contains("REQUIRETLS") {
                return Err(Error::NotSupported("REQUIRETLS".into()));
            }
            params.push("REQUIRETLS".to_string());
        }
        if options.utf8 {
            if !self.extensions.contains("SMTPUTF8") {
                return Err(Error::NotSupported("SMTPUTF8".into()));
            }
            params.push("SMTPUTF8".to_string());
        }
        if let Some(identity) = &options.auth
            && self.extensions.contains("AUTH")
        {
            params.push(format!("AUTH={}", encode_xtext(identity)));
        }

        self.expect(
            Command::MailFrom {
                from: from.to_string(),
                params,
            },
            |code| code == ReplyCode::OK,
        )
        .await?;
        self.recipients.clear();
        self.state = SessionState::InTransaction;
        Ok(())
    }

    /// Adds a recipient with `RCPT TO`. Any 25x reply is success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineBreak`] for an address with CR/LF,
    /// [`Error::InvalidState`] outside a transaction, or the server
    /// rejection.
    pub async fn rcpt(&mut self, to: &str) -> Result<()> {
        validate_line(to)?;
        self.check_open()?;
        if self.state != SessionState::InTransaction {
            return Err(Error::InvalidState("RCPT requires MAIL first".into()));
        }
        self.expect(Command::RcptTo { to: to.to_string() }, |code| {
            code.as_u16() / 10 == 25
        })
        .await?;
        self.recipients.push(to.to_string());
        Ok(())
    }

    /// Sends DATA and returns the writer for the message body.
    ///
    /// The writer must be closed to finish the transaction; until then the
    /// session accepts no other command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] without accepted recipients, or the
    /// server rejection.
    pub async fn data(&mut self) -> Result<DataWriter<'_, S>> {
        self.check_open()?;
        if self.state != SessionState::InTransaction || self.recipients.is_empty() {
            return Err(Error::InvalidState(
                "DATA requires at least one recipient".into(),
            ));
        }
        self.expect(Command::Data, |code| code == ReplyCode::START_DATA)
            .await?;
        self.state = SessionState::DataPhase;
        Ok(DataWriter::new(self))
    }

    /// Runs one whole transaction: MAIL, RCPT for each recipient, DATA.
    ///
    /// # Errors
    ///
    /// Returns the first failing step.
    pub async fn send_mail<T: AsRef<str>>(
        &mut self,
        from: &str,
        to: &[T],
        message: &[u8],
        options: &MailOptions,
    ) -> Result<DataResponse> {
        self.mail(from, options).await?;
        for rcpt in to {
            self.rcpt(rcpt.as_ref()).await?;
        }
        let mut writer = self.data().await?;
        writer.write(message).await?;
        writer.close().await
    }

    /// Aborts the current transaction with RSET.
    ///
    /// # Errors
    ///
    /// Returns the hello failure or the server rejection.
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.expect(Command::Rset, |code| code == ReplyCode::OK).await?;
        self.recipients.clear();
        self.state = self.idle_state();
        Ok(())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns the hello failure or the server rejection.
    pub async fn noop(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.expect(Command::Noop, |code| code == ReplyCode::OK).await?;
        Ok(())
    }

    /// Asks the server to verify `address` with VRFY.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineBreak`] for an address with CR/LF, or the
    /// server rejection. Many servers never confirm addresses.
    pub async fn verify(&mut self, address: &str) -> Result<()> {
        validate_line(address)?;
        self.ensure_hello().await?;
        self.expect(
            Command::Vrfy {
                address: address.to_string(),
            },
            |code| code == ReplyCode::OK,
        )
        .await?;
        Ok(())
    }

    /// Sends QUIT and shuts the stream down.
    ///
    /// # Errors
    ///
    /// Returns the server rejection, in which case the connection stays
    /// open and [`close`](Self::close) should be used.
    pub async fn quit(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.expect(Command::Quit, |code| code == ReplyCode::CLOSING)
            .await?;
        self.state = SessionState::Closed;
        let limit = self.config.timeout;
        let stream = self.stream.get_mut();
        with_timeout(limit, async { Ok(stream.shutdown().await?) }).await
    }

    /// Shuts the stream down without QUIT.
    ///
    /// # Errors
    ///
    /// Returns the shutdown failure.
    pub async fn close(mut self) -> Result<()> {
        self.state = SessionState::Closed;
        let limit = self.config.timeout;
        let stream = self.stream.get_mut();
        with_timeout(limit, async { Ok(stream.shutdown().await?) }).await
    }

    pub(super) async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let limit = self.config.timeout;
        let stream = self.stream.get_mut();
        let result = with_timeout(limit, async {
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok(())
        })
        .await;
        self.track(result)
    }

    pub(super) async fn finish_data(&mut self) -> Result<DataResponse> {
        let reply = self.read_reply().await?;
        self.recipients.clear();
        self.state = self.idle_state();
        if reply.code != ReplyCode::OK {
            return Err(reply.to_error());
        }
        Ok(DataResponse {
            status_text: reply.message_text(),
        })
    }

    async fn ensure_hello(&mut self) -> Result<()> {
        self.check_open()?;
        if self.did_hello {
            return self.cached_hello();
        }
        self.did_hello = true;
        match self.run_hello().await {
            Ok(()) => {
                self.state = SessionState::Helloed;
                Ok(())
            }
            Err(err) => {
                self.hello_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn cached_hello(&self) -> Result<()> {
        match &self.hello_error {
            Some(message) => Err(Error::HelloFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn run_hello(&mut self) -> Result<()> {
        match self.ehlo().await {
            // A dead transport gets no second greeting
            Err(err) if !err.is_connection_error() => {
                debug!(%err, "EHLO rejected, falling back to HELO");
                self.extensions = Extensions::default();
                let hostname = self.config.local_name.clone();
                self.expect(Command::Helo { hostname }, |code| code == ReplyCode::OK)
                    .await?;
                Ok(())
            }
            other => other,
        }
    }

    async fn ehlo(&mut self) -> Result<()> {
        let hostname = self.config.local_name.clone();
        let reply = self
            .expect(Command::Ehlo { hostname }, |code| code == ReplyCode::OK)
            .await?;
        self.extensions = Extensions::from_ehlo(&reply.message);
        Ok(())
    }

    async fn abort_auth(&mut self) {
        if let Err(err) = self.command(Command::AuthResponse("*".into())).await {
            debug!(%err, "AUTH abort failed");
        }
    }

    const fn idle_state(&self) -> SessionState {
        if self.authenticated {
            SessionState::Authenticated
        } else {
            SessionState::Helloed
        }
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            SessionState::Closed => Err(Error::InvalidState("connection closed".into())),
            SessionState::DataPhase => Err(Error::InvalidState("data writer not closed".into())),
            _ => Ok(()),
        }
    }

    async fn expect(&mut self, cmd: Command, accept: impl Fn(ReplyCode) -> bool) -> Result<Reply> {
        let reply = self.command(cmd).await?;
        if accept(reply.code) {
            Ok(reply)
        } else {
            Err(reply.to_error())
        }
    }

    async fn command(&mut self, cmd: Command) -> Result<Reply> {
        trace!("C: {cmd}");
        self.write_raw(&cmd.serialize()).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let limit = self.config.timeout;
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = with_timeout(limit, async {
                Ok(self.stream.read_line(&mut line).await?)
            })
            .await;
            let n = self.track(read)?;
            if n == 0 {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "server closed connection");
                return self.track(Err(eof.into()));
            }

            let line = line.trim_end_matches(['\r', '\n']).to_string();
            trace!("S: {line}");
            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(Error::Protocol("reply too long".into()));
            }
        }

        parse_reply(&lines)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_connection_error()
        {
            self.state = SessionState::Closed;
        }
        result
    }
}

/// Rejects command arguments that would break the command line.
///
/// # Errors
///
/// Returns [`Error::LineBreak`] if `line` contains CR or LF.
pub fn validate_line(line: &str) -> Result<()> {
    if line.contains(['\r', '\n']) {
        return Err(Error::LineBreak);
    }
    Ok(())
}

/// RFC 3461 xtext: `+`, `=`, controls and non-ASCII become `+XX`.
fn encode_xtext(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if (b'!'..=b'~').contains(&byte) && byte != b'+' && byte != b'=' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("+{byte:02X}"));
        }
    }
    out
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout)?,
        None => fut.await,
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
    fn test_validate_line() {
        assert!(validate_line("user@example.com").is_ok());
        assert!(matches!(
            validate_line("a@b.com>\r\nDATA"),
            Err(Error::LineBreak)
        ));
        assert!(validate_line("a\nb").is_err());
        assert!(validate_line("a\rb").is_err());
    }

    #[test]
    fn test_encode_xtext() {
        assert_eq!(encode_xtext("e=mc2@example.com"), "e+3Dmc2@example.com");
        assert_eq!(encode_xtext("a+b c"), "a+2Bb+20c");
        assert_eq!(encode_xtext("é"), "+C3+A9");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
