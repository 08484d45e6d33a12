//! Session tests for the SMTP client.
//!
//! A mock stream replays canned server replies and records what the client
//! sent, so whole dialogues run without a server.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use blackmail_smtp::auth::{CramMd5, Login, Plain};
use blackmail_smtp::{
    AuthMechanism, Client, ClientConfig, EnhancedCode, Error, MailOptions, Mechanism,
    SessionState,
};

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Vec<u8>,
}

impl MockStream {
    fn new(responses: &str) -> Self {
        Self {
            responses: Cursor::new(responses.as_bytes().to_vec()),
            sent: Vec::new(),
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

async fn client(responses: &str) -> Client<MockStream> {
    Client::new(MockStream::new(responses), "mx.example.com", ClientConfig::new())
        .await
        .unwrap()
}

fn sent(client: &Client<MockStream>) -> String {
    String::from_utf8(client.get_ref().sent.clone()).unwrap()
}

const EHLO_REPLY: &str = "250-mx.example.com\r\n\
                          250-8BITMIME\r\n\
                          250-SIZE 35651584\r\n\
                          250 AUTH LOGIN PLAIN\r\n";

#[tokio::test]
async fn test_full_session() {
    let responses = format!(
        "220 mx.example.com ESMTP\r\n{EHLO_REPLY}\
         250 2.1.0 Ok\r\n\
         250 2.1.5 Ok\r\n\
         251 2.1.5 User not local; will forward\r\n\
         354 End data with <CR><LF>.<CR><LF>\r\n\
         250 2.0.0 Ok: queued as 4BCD\r\n\
         221 2.0.0 Bye\r\n"
    );
    let mut c = client(&responses).await;
    assert_eq!(c.greeting(), "mx.example.com ESMTP");
    assert_eq!(c.state(), SessionState::Connected);

    c.mail("from@example.com", &MailOptions::default())
        .await
        .unwrap();
    assert_eq!(c.state(), SessionState::InTransaction);
    c.rcpt("a@example.net").await.unwrap();
    c.rcpt("b@example.org").await.unwrap();
    assert_eq!(c.recipients(), ["a@example.net", "b@example.org"]);

    let mut w = c.data().await.unwrap();
    w.write(b"Subject: hi\r\n\r\n.leading\nend").await.unwrap();
    let resp = w.close().await.unwrap();
    assert_eq!(resp.status_text, "2.0.0 Ok: queued as 4BCD");
    assert_eq!(c.state(), SessionState::Helloed);
    assert!(c.recipients().is_empty());

    c.quit().await.unwrap();
    assert_eq!(c.state(), SessionState::Closed);

    assert_eq!(
        sent(&c),
        "EHLO localhost\r\n\
         MAIL FROM:<from@example.com> BODY=8BITMIME\r\n\
         RCPT TO:<a@example.net>\r\n\
         RCPT TO:<b@example.org>\r\n\
         DATA\r\n\
         Subject: hi\r\n\r\n..leading\r\nend\r\n.\r\n\
         QUIT\r\n"
    );
}

#[tokio::test]
async fn test_scripted_send_mail() {
    let mock = tokio_test::io::Builder::new()
        .read(b"220 mx ready\r\n")
        .write(b"EHLO client.example.com\r\n")
        .read(b"250-mx\r\n250 SIZE 1000\r\n")
        .write(b"MAIL FROM:<> SIZE=12\r\n")
        .read(b"250 ok\r\n")
        .write(b"RCPT TO:<rcpt@example.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go\r\n")
        .write(b"body\r\n")
        .write(b".\r\n")
        .read(b"250 queued\r\n")
        .build();

    let config = ClientConfig::new().local_name("client.example.com");
    let mut c = Client::new(mock, "mx", config).await.unwrap();
    let options = MailOptions {
        size: Some(12),
        ..MailOptions::default()
    };
    let resp = c
        .send_mail("", &["rcpt@example.com"], b"body\n", &options)
        .await
        .unwrap();
    assert_eq!(resp.status_text, "queued");
}

#[tokio::test]
async fn test_ehlo_falls_back_to_helo() {
    let mut c = client(
        "220 legacy\r\n\
         502 5.5.1 Unrecognized command\r\n\
         250 legacy hello\r\n\
         250 Sender OK\r\n",
    )
    .await;

    c.mail("a@example.com", &MailOptions::default())
        .await
        .unwrap();
    assert!(c.extensions().is_empty());
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\nHELO localhost\r\nMAIL FROM:<a@example.com>\r\n"
    );
}

#[tokio::test]
async fn test_hello_failure_is_cached() {
    let mut c = client(
        "220 hello world\r\n\
         421 4.3.2 busy\r\n\
         421 Service not available, closing transmission channel\r\n",
    )
    .await;

    let err = c.hello("customhost").await.unwrap_err();
    match err {
        Error::SmtpError { code, message, .. } => {
            assert_eq!(code, 421);
            assert_eq!(
                message,
                "Service not available, closing transmission channel"
            );
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(matches!(c.noop().await, Err(Error::HelloFailed(_))));
    assert!(matches!(
        c.hello("customhost").await,
        Err(Error::HelloFailed(_))
    ));
    assert_eq!(sent(&c), "EHLO customhost\r\nHELO customhost\r\n");
}

#[tokio::test]
async fn test_ehlo_421_retries_helo() {
    let mut c = client("220 hi\r\n421 4.3.2 busy\r\n250 hello\r\n").await;

    c.hello("me").await.unwrap();
    assert_eq!(c.state(), SessionState::Helloed);
    assert!(c.extensions().is_empty());
    assert_eq!(sent(&c), "EHLO me\r\nHELO me\r\n");
}

#[tokio::test]
async fn test_malformed_ehlo_reply_retries_helo() {
    let mut c = client("220 hi\r\n250-mx\r\n251 mixed codes\r\n250 hello\r\n").await;

    c.hello("me").await.unwrap();
    assert_eq!(sent(&c), "EHLO me\r\nHELO me\r\n");
}

#[tokio::test]
async fn test_hello_rules() {
    let mut c = client(&format!("220 hi\r\n{EHLO_REPLY}")).await;
    c.hello("me.example.com").await.unwrap();
    // A repeated hello is a no-op.
    c.hello("me.example.com").await.unwrap();
    assert_eq!(sent(&c), "EHLO me.example.com\r\n");
    assert_eq!(c.state(), SessionState::Helloed);

    let mut c = client(&format!("220 hi\r\n{EHLO_REPLY}250 ok\r\n")).await;
    c.noop().await.unwrap();
    assert!(matches!(
        c.hello("late.example.com").await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_extension_lookup() {
    let mut c = client(&format!("220 hi\r\n{EHLO_REPLY}")).await;
    assert_eq!(c.extension("aUtH").await, (true, "LOGIN PLAIN".to_string()));
    assert_eq!(c.extension("DSN").await, (false, String::new()));
    assert_eq!(c.extensions().max_size(), Some(35_651_584));
    assert_eq!(
        c.extensions().auth_mechanisms(),
        vec![AuthMechanism::Login, AuthMechanism::Plain]
    );
}

#[tokio::test]
async fn test_auth_plain() {
    let mut c = client(&format!(
        "220 hi\r\n{EHLO_REPLY}235 2.7.0 Accepted\r\n250 ok\r\n"
    ))
    .await;
    c.auth(&mut Plain::new("", "user", "pass")).await.unwrap();
    assert!(c.is_authenticated());
    assert_eq!(c.state(), SessionState::Authenticated);

    assert!(matches!(
        c.auth(&mut Plain::new("", "user", "pass")).await,
        Err(Error::InvalidState(_))
    ));

    c.mail("user@example.com", &MailOptions::default())
        .await
        .unwrap();
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\n\
         AUTH PLAIN AHVzZXIAcGFzcw==\r\n\
         MAIL FROM:<user@example.com> BODY=8BITMIME\r\n"
    );
}

#[tokio::test]
async fn test_auth_rejected_sends_abort() {
    let mut c = client(
        "220 hello world\r\n\
         250-mx.google.com at your service\r\n\
         250 AUTH LOGIN PLAIN\r\n\
         535-Invalid credentials\r\n\
         535 please see www.example.com\r\n\
         501 5.7.0 Authentication aborted\r\n",
    )
    .await;

    let err = c.auth(&mut Plain::new("", "user", "pass")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "SMTP error 535: Invalid credentials\nplease see www.example.com"
    );
    assert!(err.is_permanent());
    assert!(!c.is_authenticated());
    assert_eq!(c.state(), SessionState::Helloed);
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\nAUTH PLAIN AHVzZXIAcGFzcw==\r\n*\r\n"
    );
}

/// Mechanism whose initial response is present but empty.
struct EmptyInitial;

impl Mechanism for EmptyInitial {
    fn start(&mut self) -> blackmail_smtp::Result<(String, Option<Vec<u8>>)> {
        Ok(("EXTERNAL".to_string(), Some(Vec::new())))
    }

    fn next(&mut self, _challenge: &[u8]) -> blackmail_smtp::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_auth_empty_initial_response_is_omitted() {
    let mut c = client("220 hi\r\n250 mx\r\n235 ok\r\n").await;
    c.auth(&mut EmptyInitial).await.unwrap();
    assert!(c.is_authenticated());
    assert_eq!(sent(&c), "EHLO localhost\r\nAUTH EXTERNAL\r\n");
}

#[tokio::test]
async fn test_auth_mechanism_error_sends_abort() {
    let mut c = client(
        "220 hi\r\n\
         250 mx\r\n\
         334 \r\n\
         501 cancelled\r\n",
    )
    .await;

    let err = c.auth(&mut Plain::new("", "u", "p")).await.unwrap_err();
    assert!(matches!(err, Error::Sasl(_)));
    assert!(sent(&c).ends_with("\r\n*\r\n"));
}

#[tokio::test]
async fn test_auth_login_exchange() {
    let mut c = client(
        "220 hi\r\n\
         250 mx\r\n\
         334 UGFzc3dvcmQ6\r\n\
         235 ok\r\n",
    )
    .await;
    c.auth(&mut Login::new("user", "pass")).await.unwrap();
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\nAUTH LOGIN dXNlcg==\r\ncGFzcw==\r\n"
    );
}

#[tokio::test]
async fn test_auth_cram_md5_exchange() {
    let mut c = client(
        "220 hi\r\n\
         250 mx\r\n\
         334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n\
         235 ok\r\n",
    )
    .await;
    c.auth(&mut CramMd5::new("tim", "tanstaaftanstaaf"))
        .await
        .unwrap();
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\n\
         AUTH CRAM-MD5\r\n\
         dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n"
    );
}

#[tokio::test]
async fn test_line_breaks_rejected_before_sending() {
    let mut c = client("220 hi\r\n").await;
    let injected = "user@example.com>\r\nDATA\r\nInjected body\r\n.\r\nQUIT";

    assert!(matches!(
        c.mail(injected, &MailOptions::default()).await,
        Err(Error::LineBreak)
    ));
    assert!(matches!(c.rcpt(injected).await, Err(Error::LineBreak)));
    assert!(matches!(c.verify(injected).await, Err(Error::LineBreak)));
    assert!(matches!(
        c.hello("host\nMAIL FROM:<x>").await,
        Err(Error::LineBreak)
    ));
    assert!(sent(&c).is_empty());
}

#[tokio::test]
async fn test_enhanced_code_on_rejection() {
    let mut c = client(&format!(
        "220 hi\r\n{EHLO_REPLY}\
         250 ok\r\n\
         550 5.1.1 <nobody@example.net>: Recipient address rejected\r\n"
    ))
    .await;
    c.mail("a@example.com", &MailOptions::default())
        .await
        .unwrap();

    let err = c.rcpt("nobody@example.net").await.unwrap_err();
    match &err {
        Error::SmtpError {
            code,
            enhanced,
            message,
        } => {
            assert_eq!(*code, 550);
            assert_eq!(*enhanced, Some(EnhancedCode([5, 1, 1])));
            assert_eq!(message, "<nobody@example.net>: Recipient address rejected");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_permanent());
    assert!(c.recipients().is_empty());
    assert_eq!(c.state(), SessionState::InTransaction);

    // No accepted recipient, so DATA is refused locally.
    assert!(matches!(c.data().await, Err(Error::InvalidState(_))));
    assert!(!sent(&c).contains("DATA"));
}

#[tokio::test]
async fn test_transient_rejection() {
    let mut c = client(&format!(
        "220 hi\r\n{EHLO_REPLY}451 4.3.0 Try again later\r\n"
    ))
    .await;
    let err = c
        .mail("a@example.com", &MailOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(c.state(), SessionState::Helloed);
}

#[tokio::test]
async fn test_mail_options_require_extensions() {
    let mut c = client(&format!("220 hi\r\n{EHLO_REPLY}250 ok\r\n")).await;
    let utf8 = MailOptions {
        utf8: true,
        ..MailOptions::default()
    };
    assert!(matches!(
        c.mail("a@example.com", &utf8).await,
        Err(Error::NotSupported(ext)) if ext == "SMTPUTF8"
    ));
    let require_tls = MailOptions {
        require_tls: true,
        ..MailOptions::default()
    };
    assert!(matches!(
        c.mail("a@example.com", &require_tls).await,
        Err(Error::NotSupported(_))
    ));

    let options = MailOptions {
        size: Some(2048),
        auth: Some("e=mc2@example.com".to_string()),
        ..MailOptions::default()
    };
    c.mail("a@example.com", &options).await.unwrap();
    assert_eq!(
        sent(&c),
        "EHLO localhost\r\n\
         MAIL FROM:<a@example.com> BODY=8BITMIME SIZE=2048 AUTH=e+3Dmc2@example.com\r\n"
    );
}

#[tokio::test]
async fn test_reset_clears_transaction() {
    let mut c = client(&format!(
        "220 hi\r\n{EHLO_REPLY}250 ok\r\n250 ok\r\n250 flushed\r\n"
    ))
    .await;
    c.mail("a@example.com", &MailOptions::default())
        .await
        .unwrap();
    c.rcpt("b@example.com").await.unwrap();
    c.reset().await.unwrap();
    assert!(c.recipients().is_empty());
    assert_eq!(c.state(), SessionState::Helloed);
    assert!(matches!(
        c.rcpt("c@example.com").await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_rejected_data_returns_to_idle() {
    let mut c = client(&format!(
        "220 hi\r\n{EHLO_REPLY}\
         250 ok\r\n250 ok\r\n354 go\r\n\
         554 5.7.1 Message rejected as spam\r\n"
    ))
    .await;
    c.mail("a@example.com", &MailOptions::default())
        .await
        .unwrap();
    c.rcpt("b@example.com").await.unwrap();
    let mut w = c.data().await.unwrap();
    w.write(b"spam\r\n").await.unwrap();
    let err = w.close().await.unwrap_err();
    assert_eq!(err.code(), Some(554));
    assert_eq!(c.state(), SessionState::Helloed);
    assert!(sent(&c).ends_with("DATA\r\nspam\r\n.\r\n"));
}

#[tokio::test]
async fn test_server_hangup_closes_session() {
    let mut c = client("220 hi\r\n").await;
    let err = c.noop().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(c.state(), SessionState::Closed);
    assert!(matches!(c.noop().await, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn test_bad_greeting() {
    let result = Client::new(
        MockStream::new("554 5.3.2 No service\r\n"),
        "mx",
        ClientConfig::new(),
    )
    .await;
    match result {
        Err(err) => assert_eq!(err.code(), Some(554)),
        Ok(_) => panic!("greeting should be rejected"),
    }
}

#[tokio::test]
async fn test_read_timeout() {
    let (client_io, mut server) = tokio::io::duplex(1024);
    server.write_all(b"220 slow.example.com\r\n").await.unwrap();

    let config = ClientConfig::new().timeout(Some(Duration::from_millis(50)));
    let mut c = Client::new(client_io, "slow.example.com", config)
        .await
        .unwrap();
    let err = c.noop().await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(c.state(), SessionState::Closed);
    drop(server);
}
