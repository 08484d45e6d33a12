//! Content type classification and guessing.

use crate::encoding::{encode_quoted_printable, write_base64_wrapped};
use std::fmt;
use std::io::{self, Write};

/// `text/plain`.
pub const TEXT_PLAIN: &str = "text/plain";
/// `text/html`.
pub const TEXT_HTML: &str = "text/html";
/// `multipart/mixed`.
pub const MULTIPART_MIXED: &str = "multipart/mixed";
/// `multipart/alternative`.
pub const MULTIPART_ALTERNATIVE: &str = "multipart/alternative";
/// `multipart/related`.
pub const MULTIPART_RELATED: &str = "multipart/related";
/// `multipart/signed` with the OpenPGP protocol parameters.
pub const MULTIPART_SIGNED: &str =
    "multipart/signed; protocol=\"application/pgp-signature\"; micalg=pgp-sha256";
/// Detached OpenPGP signature.
pub const PGP_SIGNATURE: &str = "application/pgp-signature";
/// Fallback for unknown binary data.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Returns true for `text/*` types.
#[must_use]
pub fn is_text(ct: &str) -> bool {
    ct.starts_with("text/")
}

/// Returns true for `text/plain`, with or without parameters.
#[must_use]
pub fn is_plain(ct: &str) -> bool {
    ct.starts_with(TEXT_PLAIN)
}

/// Returns true for `text/html`, with or without parameters.
#[must_use]
pub fn is_html(ct: &str) -> bool {
    ct.starts_with(TEXT_HTML)
}

/// Returns true for `multipart/*` types.
#[must_use]
pub fn is_multipart(ct: &str) -> bool {
    ct.starts_with("multipart/")
}

/// Returns true for `multipart/signed` containers.
#[must_use]
pub fn is_signed(ct: &str) -> bool {
    ct.starts_with("multipart/signed")
}

/// Content-Transfer-Encoding applied to a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Body written as-is.
    SevenBit,
    /// Base64 wrapped at 76 columns.
    Base64,
    /// Quoted-Printable.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Picks the header content type and encoding for a leaf part.
    ///
    /// Text types get `charset=utf-8` and Quoted-Printable, detached
    /// signatures are already armored ASCII, anything else is Base64.
    #[must_use]
    pub fn for_content_type(ct: &str) -> (String, Self) {
        if is_text(ct) {
            (format!("{ct}; charset=utf-8"), Self::QuotedPrintable)
        } else if ct == PGP_SIGNATURE {
            (ct.to_string(), Self::SevenBit)
        } else {
            (ct.to_string(), Self::Base64)
        }
    }

    /// Writes `body` to `w` in this encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn write<W: Write + ?Sized>(self, w: &mut W, body: &[u8]) -> io::Result<()> {
        match self {
            Self::SevenBit => w.write_all(body),
            Self::Base64 => write_base64_wrapped(w, body),
            Self::QuotedPrintable => w.write_all(&encode_quoted_printable(body)),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

const EXTENSIONS: &[(&str, &str)] = &[
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".gif", "image/gif"),
    (".webp", "image/webp"),
    (".svg", "image/svg+xml"),
    (".pdf", "application/pdf"),
    (".zip", "application/zip"),
    (".gz", "application/gzip"),
    (".json", "application/json"),
    (".xml", "text/xml"),
    (".txt", "text/plain"),
    (".htm", "text/html"),
    (".html", "text/html"),
    (".css", "text/css"),
    (".csv", "text/csv"),
    (".ics", "text/calendar"),
    (".asc", PGP_SIGNATURE),
];

/// Looks up a content type by the filename's extension, case-insensitively.
#[must_use]
pub fn by_extension(filename: &str) -> Option<&'static str> {
    let dot = filename.rfind('.')?;
    let ext = filename[dot..].to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

/// Returns the first known extension for a content type, with its dot.
#[must_use]
pub fn extension_for(ct: &str) -> Option<&'static str> {
    let bare = ct.split(';').next().unwrap_or(ct).trim();
    EXTENSIONS
        .iter()
        .find(|(_, t)| t.eq_ignore_ascii_case(bare))
        .map(|(e, _)| *e)
}

/// Guesses a content type from the leading bytes of `body`.
#[must_use]
pub fn sniff(body: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/gzip"),
    ];
    if let Some((_, ct)) = SIGNATURES.iter().find(|(magic, _)| body.starts_with(magic)) {
        return ct;
    }
    if body.len() >= 12 && body.starts_with(b"RIFF") && &body[8..12] == b"WEBP" {
        return "image/webp";
    }

    let head = &body[..body.len().min(512)];
    let binary = head
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | 0x1b));
    if body.is_empty() || binary {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

/// Fills in a missing content type or filename for an attachment.
///
/// An empty content type is guessed from the filename extension, then from
/// the body. An empty filename becomes `attachment<ext>` when the type has
/// a known extension. When both are empty the result is
/// `application/octet-stream` named `data`.
#[must_use]
pub fn guess(content_type: &str, filename: &str, body: &[u8]) -> (String, String) {
    match (content_type.is_empty(), filename.is_empty()) {
        (true, true) => (OCTET_STREAM.to_string(), "data".to_string()),
        (true, false) => {
            let ct = by_extension(filename).unwrap_or_else(|| sniff(body));
            (ct.to_string(), filename.to_string())
        }
        (false, true) => {
            let name = extension_for(content_type)
                .map(|ext| format!("attachment{ext}"))
                .unwrap_or_default();
            (content_type.to_string(), name)
        }
        (false, false) => (content_type.to_string(), filename.to_string()),
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
    fn test_predicates() {
        assert!(is_text("text/plain"));
        assert!(is_plain("text/plain; format=flowed"));
        assert!(is_html("text/html"));
        assert!(!is_html("text/plain"));
        assert!(is_multipart(MULTIPART_RELATED));
        assert!(is_signed(MULTIPART_SIGNED));
        assert!(!is_signed(MULTIPART_MIXED));
    }

    #[test]
    fn test_for_content_type() {
        assert_eq!(
            TransferEncoding::for_content_type("text/html"),
            ("text/html; charset=utf-8".to_string(), TransferEncoding::QuotedPrintable)
        );
        assert_eq!(
            TransferEncoding::for_content_type(PGP_SIGNATURE),
            (PGP_SIGNATURE.to_string(), TransferEncoding::SevenBit)
        );
        assert_eq!(
            TransferEncoding::for_content_type("image/png"),
            ("image/png".to_string(), TransferEncoding::Base64)
        );
    }

    #[test]
    fn test_transfer_encoding_display() {
        assert_eq!(TransferEncoding::SevenBit.to_string(), "7bit");
        assert_eq!(TransferEncoding::Base64.to_string(), "base64");
        assert_eq!(
            TransferEncoding::QuotedPrintable.to_string(),
            "quoted-printable"
        );
    }

    #[test]
    fn test_write_seven_bit_passthrough() {
        let mut out = Vec::new();
        TransferEncoding::SevenBit.write(&mut out, b"a=b\r\n").unwrap();
        assert_eq!(out, b"a=b\r\n");
    }

    #[test]
    fn test_by_extension() {
        assert_eq!(by_extension("logo.PNG"), Some("image/png"));
        assert_eq!(by_extension("archive.tar.gz"), Some("application/gzip"));
        assert_eq!(by_extension("README"), None);
        assert_eq!(by_extension("file.unknownext"), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "image/png");
        assert_eq!(sniff(b"\xff\xd8\xff\xe0\0\x10JFIF"), "image/jpeg");
        assert_eq!(sniff(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff(b"just some words\n"), TEXT_PLAIN);
        assert_eq!(sniff(&[0, 1, 2, 3]), OCTET_STREAM);
        assert_eq!(sniff(b""), OCTET_STREAM);
    }

    #[test]
    fn test_guess_both_empty() {
        assert_eq!(
            guess("", "", b"anything"),
            (OCTET_STREAM.to_string(), "data".to_string())
        );
    }

    #[test]
    fn test_guess_type_from_filename_then_body() {
        assert_eq!(guess("", "logo.png", b"").0, "image/png");
        assert_eq!(guess("", "blob", b"%PDF-1.4").0, "application/pdf");
        assert_eq!(guess("", "blob", &[0u8, 159, 146, 150]).0, OCTET_STREAM);
    }

    #[test]
    fn test_guess_filename_from_type() {
        assert_eq!(guess("image/jpeg", "", b"").1, "attachment.jpg");
        assert_eq!(guess("application/x-custom", "", b"").1, "");
        assert_eq!(
            guess("image/png", "keep.bin", b""),
            ("image/png".to_string(), "keep.bin".to_string())
        );
    }
}
