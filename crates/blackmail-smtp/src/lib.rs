//! # blackmail-smtp
//!
//! An async SMTP client implementing RFC 5321 as a checked state machine.
//!
//! ## Features
//!
//! - **Session states**: hello runs on first use, DATA needs recipients,
//!   a failed connection refuses further commands
//! - **EHLO with HELO fallback** and an extension table
//! - **TLS**: implicit TLS (port 465) and STARTTLS via rustls
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5, XOAUTH2
//! - **MAIL parameters**: 8BITMIME, SIZE, SMTPUTF8, REQUIRETLS, AUTH
//! - **Injection safety**: CR/LF in addresses and names is rejected before
//!   anything reaches the wire
//! - **Structured errors** with RFC 3463 enhanced status codes
//!
//! ## Quick Start
//!
//! ```ignore
//! use blackmail_smtp::{Client, ClientConfig, MailOptions, auth::Plain};
//!
//! #[tokio::main]
//! async fn main() -> blackmail_smtp::Result<()> {
//!     let client = Client::connect("smtp.example.com", 587, ClientConfig::new()).await?;
//!     let mut client = client.starttls().await?;
//!     client.auth(&mut Plain::new("", "user@example.com", "password")).await?;
//!
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!     client
//!         .send_mail("user@example.com", &["friend@example.net"], message, &MailOptions::default())
//!         .await?;
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected ── hello ──→ Helloed ── auth ──→ Authenticated
//!                           │                     │
//!                           └──── mail ───────────┘
//!                                  ↓
//!                            InTransaction ── data ──→ DataPhase ── close ──→ Helloed
//! ```
//!
//! Every state can reach `Closed` through QUIT or a transport failure.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use auth::Mechanism;
pub use connection::{
    Client, ClientConfig, DataResponse, DataWriter, MailOptions, SessionState, SmtpStream,
    validate_line,
};
pub use error::{EnhancedCode, Error, Result};
pub use types::{AuthMechanism, Extensions, Reply, ReplyCode};
