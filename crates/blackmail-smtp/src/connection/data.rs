//! DATA phase writer.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use crate::error::Result;

/// Final server reply to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResponse {
    /// Reply text, often carrying a queue id.
    pub status_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotState {
    Begin,
    BeginLine,
    Cr,
    Data,
}

/// Streams a message body inside DATA.
///
/// Bare LF becomes CRLF and lines starting with `.` get a second dot.
/// [`close`](Self::close) writes the terminating `.` line and reads the
/// final reply.
#[derive(Debug)]
pub struct DataWriter<'a, S> {
    client: &'a mut Client<S>,
    state: DotState,
    buf: Vec<u8>,
}

impl<'a, S> DataWriter<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) const fn new(client: &'a mut Client<S>) -> Self {
        Self {
            client,
            state: DotState::Begin,
            buf: Vec::new(),
        }
    }

    /// Writes a chunk of the message. Chunks may split lines anywhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.clear();
        self.state = dot_stuff(self.state, data, &mut self.buf);
        self.client.write_raw(&self.buf).await
    }

    /// Ends the message and returns the server's acceptance.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the server rejects the
    /// message.
    pub async fn close(mut self) -> Result<DataResponse> {
        let tail: &[u8] = match self.state {
            DotState::Cr => b"\n.\r\n",
            DotState::BeginLine => b".\r\n",
            DotState::Begin | DotState::Data => b"\r\n.\r\n",
        };
        self.client.write_raw(tail).await?;
        self.client.finish_data().await
    }
}

fn dot_stuff(mut state: DotState, data: &[u8], out: &mut Vec<u8>) -> DotState {
    out.reserve(data.len() + data.len() / 32);
    for &byte in data {
        if matches!(state, DotState::Begin | DotState::BeginLine) {
            state = DotState::Data;
            if byte == b'.' {
                out.push(b'.');
            }
        }
        match state {
            DotState::Cr => {
                state = if byte == b'\n' {
                    DotState::BeginLine
                } else {
                    DotState::Data
                };
            }
            _ => match byte {
                b'\r' => state = DotState::Cr,
                b'\n' => {
                    out.push(b'\r');
                    state = DotState::BeginLine;
                }
                _ => {}
            },
        }
        out.push(byte);
    }
    state
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

    fn stuff(chunks: &[&[u8]]) -> (Vec<u8>, DotState) {
        let mut out = Vec::new();
        let mut state = DotState::Begin;
        for chunk in chunks {
            state = dot_stuff(state, chunk, &mut out);
        }
        (out, state)
    }

    #[test]
    fn test_leading_dots_doubled() {
        let (out, state) = stuff(&[b".first\r\nmid\r\n.second\n"]);
        assert_eq!(out, b"..first\r\nmid\r\n..second\r\n");
        assert_eq!(state, DotState::BeginLine);
    }

    #[test]
    fn test_bare_lf_normalized() {
        let (out, state) = stuff(&[b"a\nb"]);
        assert_eq!(out, b"a\r\nb");
        assert_eq!(state, DotState::Data);
    }

    #[test]
    fn test_split_chunks() {
        let (out, state) = stuff(&[b"line\r", b"\n.", b"dot"]);
        assert_eq!(out, b"line\r\n..dot");
        assert_eq!(state, DotState::Data);

        let (_, state) = stuff(&[b"end\r"]);
        assert_eq!(state, DotState::Cr);
    }

    #[test]
    fn test_inner_dots_untouched() {
        let (out, _) = stuff(&[b"a.b\r\n..\r\n"]);
        assert_eq!(out, b"a.b\r\n...\r\n");
    }
}
