//! SMTP session management.

mod client;
mod config;
mod data;
mod stream;

pub use client::{Client, MailOptions, SessionState, validate_line};
pub use config::ClientConfig;
pub use data::{DataResponse, DataWriter};
pub use stream::{SmtpStream, connect_plain, connect_tls, default_tls_config};
