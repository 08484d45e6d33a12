//! Ordered header sets.

use crate::encoding::encode_q;
use crate::error::Error;
use std::io::{self, Write};

/// Ordered list of user-supplied headers.
///
/// Keys are stored in canonical form (`message-id` becomes `Message-Id`) so
/// lookups are case-insensitive. A set built from malformed arguments keeps
/// the error and surfaces it when the message is assembled.
#[derive(Debug, Default)]
pub struct HeaderSet {
    headers: Vec<(String, String)>,
    error: Option<Error>,
}

impl HeaderSet {
    /// Creates a new empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a flat `key, value, key, value, ...` list.
    ///
    /// An odd number of elements yields a set carrying
    /// [`Error::OddArgumentCount`].
    #[must_use]
    pub fn from_list<S: AsRef<str>>(key_values: &[S]) -> Self {
        if key_values.len() % 2 == 1 {
            return Self::failed(Error::OddArgumentCount);
        }
        let mut set = Self::new();
        for pair in key_values.chunks_exact(2) {
            set.push(pair[0].as_ref(), pair[1].as_ref());
        }
        set
    }

    /// Builds a set from `key<sep>value` strings such as `"X-Tag: value"`.
    ///
    /// Whitespace around the value is trimmed. An entry without the
    /// separator yields a set carrying [`Error::MissingSeparator`].
    #[must_use]
    pub fn from_kv<S: AsRef<str>>(separator: char, entries: &[S]) -> Self {
        let mut set = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            let Some((key, value)) = entry.split_once(separator) else {
                return Self::failed(Error::MissingSeparator {
                    separator,
                    input: entry.to_string(),
                });
            };
            set.push(key.trim(), value.trim());
        }
        set
    }

    /// Creates a set that only carries a construction error.
    #[must_use]
    pub fn failed(error: Error) -> Self {
        Self {
            headers: Vec::new(),
            error: Some(error),
        }
    }

    /// Adds a header at the end of the set.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((canonical_key(name), value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = canonical_key(name);
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Removes the first header named `name` and returns its value.
    ///
    /// Returns an empty string if the header was not set. The order of the
    /// remaining headers is preserved.
    pub fn remove(&mut self, name: &str) -> String {
        let name = canonical_key(name);
        self.headers
            .iter()
            .position(|(k, _)| *k == name)
            .map(|i| self.headers.remove(i).1)
            .unwrap_or_default()
    }

    /// Appends the headers of `other`, taking over its error if it has one.
    pub fn append(&mut self, other: Self) {
        if other.error.is_some() {
            self.error = other.error;
        }
        self.headers.extend(other.headers);
    }

    /// Returns the stored construction error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Removes and returns the stored construction error.
    pub const fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Returns the number of headers.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the set holds no headers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Writes every header as `Key: value\r\n`, Q-encoding non-ASCII values.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        for (key, value) in &self.headers {
            write_header(w, key, value)?;
        }
        Ok(())
    }

    /// Writes `key`, preferring the value stored in this set over `fallback`.
    ///
    /// A stored value is removed once written, so a later [`write`](Self::write)
    /// does not emit it a second time.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn write_default<W: Write + ?Sized>(
        &mut self,
        w: &mut W,
        key: &str,
        fallback: &str,
    ) -> io::Result<()> {
        let key = canonical_key(key);
        let user = self.remove(&key);
        let value = if user.is_empty() { fallback } else { &user };
        write_header(w, &key, value)
    }
}

fn write_header<W: Write + ?Sized>(w: &mut W, key: &str, value: &str) -> io::Result<()> {
    write!(w, "{key}: {}\r\n", encode_q(value))
}

/// Canonicalizes a header key: `content-type` becomes `Content-Type`.
///
/// Keys containing a space or other non-token characters are returned
/// unchanged.
#[must_use]
pub fn canonical_key(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

const fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
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

    fn written(set: &HeaderSet) -> String {
        let mut out = Vec::new();
        set.write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("MESSAGE-ID"), "Message-Id");
        assert_eq!(canonical_key("x-mine"), "X-Mine");
        assert_eq!(canonical_key("Content-Type"), "Content-Type");
        assert_eq!(canonical_key("bad key"), "bad key");
    }

    #[test]
    fn test_from_list() {
        let set = HeaderSet::from_list(&["Header", "value", "X-MINE", "2nd"]);
        assert!(set.error().is_none());
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("x-mine"), Some("2nd"));
    }

    #[test]
    fn test_from_list_odd_count() {
        let set = HeaderSet::from_list(&["Header"]);
        assert!(matches!(set.error(), Some(Error::OddArgumentCount)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_from_kv() {
        let set = HeaderSet::from_kv(':', &["X-Tag: one", "Reply-To:me@example.com"]);
        assert!(set.error().is_none());
        assert_eq!(set.get("X-Tag"), Some("one"));
        assert_eq!(set.get("reply-to"), Some("me@example.com"));
    }

    #[test]
    fn test_from_kv_missing_separator() {
        let set = HeaderSet::from_kv(':', &["X-Tag one"]);
        assert!(matches!(
            set.error(),
            Some(Error::MissingSeparator { separator: ':', .. })
        ));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut set = HeaderSet::from_list(&["A", "1", "B", "2", "C", "3"]);
        assert_eq!(set.remove("b"), "2");
        assert_eq!(set.remove("b"), "");
        let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "C"]);
    }

    #[test]
    fn test_append_propagates_error() {
        let mut set = HeaderSet::from_list(&["A", "1"]);
        set.append(HeaderSet::from_list(&["B", "2"]));
        assert_eq!(set.len(), 2);
        assert!(set.error().is_none());

        set.append(HeaderSet::from_list(&["odd"]));
        assert!(set.error().is_some());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_write_encodes_non_ascii() {
        let set = HeaderSet::from_list(&["X-Plain", "hello", "X-Utf8", "héllo"]);
        assert_eq!(
            written(&set),
            "X-Plain: hello\r\nX-Utf8: =?utf-8?q?h=C3=A9llo?=\r\n"
        );
    }

    #[test]
    fn test_write_default_prefers_user_value() {
        let mut set = HeaderSet::from_list(&["MESSAGE-ID", "ID", "X-Other", "x"]);
        let mut out = Vec::new();
        set.write_default(&mut out, "Message-Id", "<generated>").unwrap();
        set.write_default(&mut out, "Subject", "Hello").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Message-Id: ID\r\nSubject: Hello\r\n"
        );
        assert_eq!(written(&set), "X-Other: x\r\n");
    }
}
