//! Content-transfer and header encodings.
//!
//! Supports line-wrapped Base64, Quoted-Printable, RFC 2047 Q-encoding for
//! header values and RFC 2231 extended parameter values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::{self, Write};

/// Maximum encoded line length for Base64 bodies, excluding CRLF.
pub const BASE64_LINE_LENGTH: usize = 76;

/// Raw bytes per Base64 line (57 bytes encode to exactly 76 characters).
const BASE64_CHUNK: usize = BASE64_LINE_LENGTH / 4 * 3;

/// Longest RFC 2047 encoded word, including the `=?utf-8?q?` and `?=` framing.
const MAX_ENCODED_WORD: usize = 75;

const Q_PREFIX: &str = "=?utf-8?q?";
const Q_SUFFIX: &str = "?=";

/// Characters that may appear unescaped in an RFC 2231 extended value.
const ATTRIBUTE_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

const UPPER_HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Writes `data` as Base64 wrapped at 76 characters per CRLF-terminated line.
///
/// Every line but the last holds exactly 76 characters; the final partial
/// chunk is still CRLF-terminated. Empty input writes nothing.
///
/// # Errors
///
/// Returns an error if writing to `w` fails.
pub fn write_base64_wrapped<W: Write + ?Sized>(w: &mut W, data: &[u8]) -> io::Result<()> {
    let mut line = String::with_capacity(BASE64_LINE_LENGTH + 2);
    for chunk in data.chunks(BASE64_CHUNK) {
        line.clear();
        STANDARD.encode_string(chunk, &mut line);
        line.push_str("\r\n");
        w.write_all(line.as_bytes())?;
    }
    Ok(())
}

/// Encodes `data` as wrapped Base64 (see [`write_base64_wrapped`]).
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let mut out = Vec::with_capacity(data.len() / 3 * 4 + data.len() / 28 + 4);
    // Writing into a Vec cannot fail.
    let _ = write_base64_wrapped(&mut out, data);
    String::from_utf8_lossy(&out).into_owned()
}

/// Encodes text with Quoted-Printable (RFC 2045).
///
/// Bare LF and CR are first normalized to CRLF so they become hard line
/// breaks instead of escaped `=0A` sequences.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> Vec<u8> {
    quoted_printable::encode(normalize_crlf(data))
}

/// Converts bare `\n` and `\r` into `\r\n`.
pub(crate) fn normalize_crlf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 40);
    let mut iter = data.iter().copied().peekable();
    while let Some(b) = iter.next() {
        match b {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            _ => out.push(b),
        }
    }
    out
}

/// Returns true if a header value must be RFC 2047 encoded.
fn needs_encoding(s: &str) -> bool {
    s.bytes().any(|b| (b < b' ' || b > b'~') && b != b'\t')
}

/// Encodes a header value with RFC 2047 "Q" encoding in UTF-8.
///
/// Values made of printable ASCII are returned unchanged. Longer values are
/// split into several encoded words separated by a space, never splitting a
/// multi-byte character.
#[must_use]
pub fn encode_q(value: &str) -> String {
    if !needs_encoding(value) {
        return value.to_string();
    }

    let max_content = MAX_ENCODED_WORD - Q_PREFIX.len() - Q_SUFFIX.len();
    let mut out = String::with_capacity(value.len() * 3);
    let mut word_len = 0;
    let mut buf = [0u8; 4];

    out.push_str(Q_PREFIX);
    for ch in value.chars() {
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        let encoded_len: usize = bytes.iter().map(|&b| q_byte_len(b)).sum();
        if word_len + encoded_len > max_content {
            out.push_str(Q_SUFFIX);
            out.push(' ');
            out.push_str(Q_PREFIX);
            word_len = 0;
        }
        for &b in bytes {
            push_q_byte(&mut out, b);
        }
        word_len += encoded_len;
    }
    out.push_str(Q_SUFFIX);
    out
}

const fn is_q_literal(b: u8) -> bool {
    b >= b'!' && b <= b'~' && b != b'=' && b != b'?' && b != b'_'
}

const fn q_byte_len(b: u8) -> usize {
    if b == b' ' || is_q_literal(b) { 1 } else { 3 }
}

fn push_q_byte(out: &mut String, b: u8) {
    if b == b' ' {
        out.push('_');
    } else if is_q_literal(b) {
        out.push(char::from(b));
    } else {
        out.push('=');
        out.push(char::from(UPPER_HEX[usize::from(b >> 4)]));
        out.push(char::from(UPPER_HEX[usize::from(b & 0x0f)]));
    }
}

/// Percent-encodes a parameter value for the RFC 2231 `name*=utf-8''...` form.
#[must_use]
pub fn encode_rfc2231(value: &str) -> String {
    utf8_percent_encode(value, ATTRIBUTE_CHAR).to_string()
}

/// Returns true if every character is in the 7-bit ASCII range.
#[must_use]
pub fn is_ascii(s: &str) -> bool {
    s.chars().all(|c| c <= '\x7f')
}

/// Formats a number in lowercase base 36.
#[must_use]
pub fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(13);
    while n > 0 {
        // n % 36 < 36, so the cast is lossless.
        #[allow(clippy::cast_possible_truncation)]
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_short_input() {
        assert_eq!(encode_base64_wrapped(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==\r\n");
    }

    #[test]
    fn test_base64_empty_input() {
        assert_eq!(encode_base64_wrapped(b""), "");
    }

    #[test]
    fn test_base64_exact_line() {
        let encoded = encode_base64_wrapped(&[0u8; 57]);
        assert_eq!(encoded.len(), 78);
        assert!(encoded.ends_with("\r\n"));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_base64_wraps_after_57_bytes() {
        let encoded = encode_base64_wrapped(&[0xffu8; 58]);
        let lines: Vec<&str> = encoded.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1], "/w==");
    }

    proptest! {
        #[test]
        fn base64_lines_are_76_columns(data in proptest::collection::vec(any::<u8>(), 0..2000)) {
            let encoded = encode_base64_wrapped(&data);
            let lines: Vec<&str> = encoded.split_terminator("\r\n").collect();
            prop_assert_eq!(lines.len(), data.len().div_ceil(57));
            if let Some((last, full)) = lines.split_last() {
                for line in full {
                    prop_assert_eq!(line.len(), 76);
                }
                prop_assert!(!last.is_empty() && last.len() <= 76);
            }
            let joined: String = lines.concat();
            prop_assert_eq!(STANDARD.decode(joined).unwrap(), data);
        }

        #[test]
        fn q_encoded_words_stay_short(s in "\\PC{0,120}") {
            for word in encode_q(&s).split(' ') {
                if word.starts_with("=?") {
                    prop_assert!(word.len() <= MAX_ENCODED_WORD);
                }
            }
        }
    }

    #[test]
    fn test_quoted_printable_plain() {
        assert_eq!(encode_quoted_printable(b"hello"), b"hello");
    }

    #[test]
    fn test_quoted_printable_escapes_equals() {
        assert_eq!(encode_quoted_printable(b"Hello=there"), b"Hello=3Dthere");
    }

    #[test]
    fn test_quoted_printable_utf8() {
        let encoded = encode_quoted_printable("Héllo".as_bytes());
        assert_eq!(encoded, b"H=C3=A9llo");
    }

    #[test]
    fn test_normalize_crlf() {
        assert_eq!(normalize_crlf(b"a\nb\r\nc\rd"), b"a\r\nb\r\nc\r\nd");
    }

    #[test]
    fn test_encode_q_ascii_untouched() {
        assert_eq!(encode_q("Hello there"), "Hello there");
        assert_eq!(encode_q("tab\there"), "tab\there");
    }

    #[test]
    fn test_encode_q_utf8() {
        assert_eq!(encode_q("€.png"), "=?utf-8?q?=E2=82=AC.png?=");
        assert_eq!(encode_q("Héllo wörld"), "=?utf-8?q?H=C3=A9llo_w=C3=B6rld?=");
    }

    #[test]
    fn test_encode_q_splits_long_values() {
        let value = "é".repeat(30);
        let encoded = encode_q(&value);
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        for word in words {
            assert!(word.starts_with("=?utf-8?q?"));
            assert!(word.ends_with("?="));
        }
    }

    #[test]
    fn test_encode_rfc2231() {
        assert_eq!(encode_rfc2231("€ \".jpeg"), "%E2%82%AC%20%22.jpeg");
        assert_eq!(encode_rfc2231("plain-name_1.txt"), "plain-name_1.txt");
    }

    #[test]
    fn test_is_ascii() {
        assert!(is_ascii("test \".jpeg"));
        assert!(!is_ascii("€.png"));
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(999_999), "lflr");
    }
}
