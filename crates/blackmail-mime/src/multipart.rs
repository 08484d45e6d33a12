//! Multipart body framing.

use std::collections::BTreeMap;
use std::io::{self, Write};

/// Writes boundary delimiters around the parts of one multipart body.
///
/// The first delimiter is `--boundary`; every later one is preceded by a
/// CRLF that belongs to the delimiter, not to the previous part's body.
pub(crate) struct MultipartWriter<'a> {
    out: &'a mut Vec<u8>,
    boundary: String,
    started: bool,
}

impl<'a> MultipartWriter<'a> {
    pub(crate) const fn new(out: &'a mut Vec<u8>, boundary: String) -> Self {
        Self {
            out,
            boundary,
            started: false,
        }
    }

    /// Writes the delimiter for the next part and returns the sink for its
    /// headers and body.
    pub(crate) fn next_part(&mut self) -> io::Result<&mut Vec<u8>> {
        if self.started {
            write!(self.out, "\r\n--{}\r\n", self.boundary)?;
        } else {
            write!(self.out, "--{}\r\n", self.boundary)?;
        }
        self.started = true;
        Ok(&mut *self.out)
    }

    /// Writes the closing delimiter.
    pub(crate) fn close(self) -> io::Result<()> {
        if self.started {
            write!(self.out, "\r\n--{}--\r\n", self.boundary)
        } else {
            write!(self.out, "--{}--\r\n", self.boundary)
        }
    }
}

/// Writes part headers sorted by name, followed by the blank line.
pub(crate) fn write_part_headers<W: Write + ?Sized>(
    w: &mut W,
    headers: &BTreeMap<&str, String>,
) -> io::Result<()> {
    for (key, value) in headers {
        write!(w, "{key}: {value}\r\n")?;
    }
    w.write_all(b"\r\n")
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
    fn test_framing() {
        let mut out = Vec::new();
        let mut mp = MultipartWriter::new(&mut out, "XXX".to_string());
        let part = mp.next_part().unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type", "text/plain".to_string());
        headers.insert("Content-Disposition", "inline".to_string());
        write_part_headers(part, &headers).unwrap();
        part.extend_from_slice(b"one");
        mp.next_part().unwrap().extend_from_slice(b"\r\ntwo");
        mp.close().unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--XXX\r\nContent-Disposition: inline\r\nContent-Type: text/plain\r\n\r\none\
             \r\n--XXX\r\n\r\ntwo\r\n--XXX--\r\n"
        );
    }

    #[test]
    fn test_empty_close() {
        let mut out = Vec::new();
        MultipartWriter::new(&mut out, "b".to_string()).close().unwrap();
        assert_eq!(out, b"--b--\r\n");
    }
}
