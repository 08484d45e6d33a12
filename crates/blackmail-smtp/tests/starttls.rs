//! STARTTLS against an in-process listener with a self-signed certificate.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use blackmail_smtp::{Client, ClientConfig, SmtpStream};

/// Lines the server read, split at the TLS handshake.
#[derive(Debug, Default)]
struct Transcript {
    plain: Vec<String>,
    secure: Vec<String>,
}

async fn read_line<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

async fn reply<S: AsyncWrite + Unpin>(stream: &mut S, text: &str) {
    stream.write_all(text.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

/// Serves one session: advertises `X-PLAIN-ONLY` before TLS and `8BITMIME` after.
async fn tls_server() -> (u16, CertificateDer<'static>, JoinHandle<Transcript>) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let mut transcript = Transcript::default();
        let (socket, _) = listener.accept().await.unwrap();
        let mut plain = BufReader::new(socket);

        reply(&mut plain, "220 mx.test ESMTP\r\n").await;
        transcript.plain.push(read_line(&mut plain).await);
        reply(
            &mut plain,
            "250-mx.test\r\n250-STARTTLS\r\n250 X-PLAIN-ONLY\r\n",
        )
        .await;
        transcript.plain.push(read_line(&mut plain).await);
        reply(&mut plain, "220 2.0.0 Ready to start TLS\r\n").await;

        let tls = acceptor.accept(plain.into_inner()).await.unwrap();
        let mut secure = BufReader::new(tls);
        transcript.secure.push(read_line(&mut secure).await);
        reply(&mut secure, "250-mx.test\r\n250 8BITMIME\r\n").await;
        transcript.secure.push(read_line(&mut secure).await);
        reply(&mut secure, "221 2.0.0 Bye\r\n").await;

        transcript
    });

    (port, cert, handle)
}

fn trusting(cert: CertificateDer<'static>) -> Arc<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(cert).unwrap();
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

#[tokio::test]
async fn test_starttls_upgrades_and_repeats_ehlo() {
    let (port, cert, server) = tls_server().await;

    let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let config = ClientConfig::new()
        .timeout(Some(Duration::from_secs(5)))
        .tls(trusting(cert));
    let mut client = Client::new(SmtpStream::Plain(tcp), "localhost", config)
        .await
        .unwrap();

    client.hello("client.test").await.unwrap();
    assert!(!client.is_tls());
    assert!(client.extensions().contains("STARTTLS"));
    assert!(client.extensions().contains("X-PLAIN-ONLY"));

    let mut client = client.starttls().await.unwrap();
    assert!(client.is_tls());
    assert!(!client.extensions().contains("X-PLAIN-ONLY"));
    assert!(!client.extensions().contains("STARTTLS"));
    assert!(client.extensions().contains("8BITMIME"));

    client.quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(transcript.plain, ["EHLO client.test", "STARTTLS"]);
    assert_eq!(transcript.secure, ["EHLO client.test", "QUIT"]);
}

#[tokio::test]
async fn test_starttls_rejects_untrusted_certificate() {
    let (port, _cert, server) = tls_server().await;

    let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let other = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let config = ClientConfig::new()
        .local_name("client.test")
        .timeout(Some(Duration::from_secs(5)))
        .tls(trusting(other.cert.der().clone()));
    let client = Client::new(SmtpStream::Plain(tcp), "localhost", config)
        .await
        .unwrap();

    let err = client.starttls().await.unwrap_err();
    assert!(err.is_connection_error(), "{err}");
    server.abort();
}
