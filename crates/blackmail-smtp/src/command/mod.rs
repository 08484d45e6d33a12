//! SMTP command builder.

use std::fmt;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Mechanism name
        mechanism: String,
        /// Base64 initial response
        initial_response: Option<String>,
    },
    /// Continuation line of a SASL exchange (base64, or `*` to abort)
    AuthResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: String,
        /// ESMTP parameters such as `BODY=8BITMIME`
        params: Vec<String>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// VRFY - Verify address
    Vrfy {
        /// Address to verify
        address: String,
    },
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Wire form of the command, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = self.line();
        line.push_str("\r\n");
        line.into_bytes()
    }

    fn line(&self) -> String {
        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(ir),
            } => format!("AUTH {mechanism} {ir}"),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {mechanism}"),
            Self::AuthResponse(resp) => resp.clone(),
            Self::MailFrom { from, params } => params
                .iter()
                .fold(format!("MAIL FROM:<{from}>"), |mut line, param| {
                    line.push(' ');
                    line.push_str(param);
                    line
                }),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Vrfy { address } => format!("VRFY {address}"),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

/// Log form of the command, with credentials replaced.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => write!(f, "AUTH {mechanism} <redacted>"),
            Self::AuthResponse(resp) if resp != "*" => f.write_str("<redacted>"),
            _ => f.write_str(&self.line()),
        }
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
    fn test_greetings() {
        let helo = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        let ehlo = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(helo.serialize(), b"HELO client.example.com\r\n");
        assert_eq!(ehlo.serialize(), b"EHLO localhost\r\n");
    }

    #[test]
    fn test_auth_with_and_without_initial_response() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");

        let cmd = Command::Auth {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH CRAM-MD5\r\n");
    }

    #[test]
    fn test_mail_from_with_params() {
        let cmd = Command::MailFrom {
            from: "sender@example.com".to_string(),
            params: vec!["BODY=8BITMIME".to_string(), "SIZE=12345".to_string()],
        };
        assert_eq!(
            cmd.serialize(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn test_null_reverse_path() {
        let cmd = Command::MailFrom {
            from: String::new(),
            params: Vec::new(),
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<>\r\n");
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(
            Command::RcptTo {
                to: "rcpt@example.com".to_string()
            }
            .serialize(),
            b"RCPT TO:<rcpt@example.com>\r\n"
        );
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
        assert_eq!(
            Command::Vrfy {
                address: "root".to_string()
            }
            .serialize(),
            b"VRFY root\r\n"
        );
    }

    #[test]
    fn test_display_redacts_credentials() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("c2VjcmV0".to_string()),
        };
        assert_eq!(cmd.to_string(), "AUTH PLAIN <redacted>");
        assert_eq!(
            Command::AuthResponse("c2VjcmV0".to_string()).to_string(),
            "<redacted>"
        );
        assert_eq!(Command::AuthResponse("*".to_string()).to_string(), "*");
        assert_eq!(Command::Noop.to_string(), "NOOP");
    }
}
