//! SMTP response parser.

use crate::error::{EnhancedCode, Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// Every line must carry the same code.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };

    let code_str = first
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("reply too short: {first}")))?;
    let code = code_str
        .parse::<u16>()
        .ok()
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| Error::Protocol(format!("invalid reply code: {code_str}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if line.get(0..3) != Some(code_str) {
            return Err(Error::Protocol(format!("mismatched reply code: {line}")));
        }
        if line.len() > 3 && !matches!(line.as_bytes()[3], b' ' | b'-') {
            return Err(Error::Protocol(format!("malformed reply line: {line}")));
        }
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the
/// last line. A bare code also ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

/// Parses `X.Y.Z` into an enhanced status code.
#[must_use]
pub fn parse_enhanced_code(s: &str) -> Option<EnhancedCode> {
    let mut code = [0u16; 3];
    let mut parts = s.split('.');
    for slot in &mut code {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(EnhancedCode(code))
}

/// Splits a reply message into its leading enhanced code and the rest.
///
/// Messages without a recognizable code are returned whole.
#[must_use]
pub fn split_enhanced_code(message: &str) -> (Option<EnhancedCode>, String) {
    if let Some((head, rest)) = message.split_once(' ')
        && let Some(code) = parse_enhanced_code(head)
    {
        return (Some(code), rest.to_string());
    }
    (None, message.to_string())
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
    fn test_parse_single_line_reply() {
        let lines = vec!["250 OK".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            "250-mx.example.com".to_string(),
            "250-8BITMIME".to_string(),
            "250 AUTH PLAIN LOGIN".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.message,
            vec!["mx.example.com", "8BITMIME", "AUTH PLAIN LOGIN"]
        );
    }

    #[test]
    fn test_parse_empty_text() {
        let reply = parse_reply(&["334 ".to_string()]).unwrap();
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply(&["354".to_string()]).unwrap();
        assert_eq!(reply.code.as_u16(), 354);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("25"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["25".to_string()]).is_err());
        assert!(parse_reply(&["ABC OK".to_string()]).is_err());
        assert!(parse_reply(&["999 what".to_string()]).is_err());
        assert!(parse_reply(&["250xOK".to_string()]).is_err());
        assert!(parse_reply(&["250-a".to_string(), "251 b".to_string()]).is_err());
    }

    #[test]
    fn test_parse_enhanced_code() {
        assert_eq!(parse_enhanced_code("5.7.1"), Some(EnhancedCode([5, 7, 1])));
        assert_eq!(
            parse_enhanced_code("4.4.12"),
            Some(EnhancedCode([4, 4, 12]))
        );
        assert_eq!(parse_enhanced_code("5.7"), None);
        assert_eq!(parse_enhanced_code("5.7.1.2"), None);
        assert_eq!(parse_enhanced_code("x.7.1"), None);
        assert_eq!(parse_enhanced_code(""), None);
    }

    #[test]
    fn test_split_enhanced_code() {
        assert_eq!(
            split_enhanced_code("2.0.0 Ok: queued as 12345"),
            (Some(EnhancedCode([2, 0, 0])), "Ok: queued as 12345".to_string())
        );
        assert_eq!(
            split_enhanced_code("Relaying denied"),
            (None, "Relaying denied".to_string())
        );
        assert_eq!(split_enhanced_code("5.1.1"), (None, "5.1.1".to_string()));
    }
}
