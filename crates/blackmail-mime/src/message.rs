//! Message assembly.

use crate::address::{self, Mailbox};
use crate::content_type::{MULTIPART_ALTERNATIVE, MULTIPART_MIXED, MULTIPART_RELATED, TransferEncoding};
use crate::encoding::{base36, encode_q, encode_rfc2231, is_ascii, normalize_crlf};
use crate::error::{Error, Result};
use crate::header::HeaderSet;
use crate::multipart::{MultipartWriter, write_part_headers};
use crate::part::{BodyPart, Part, Recipient, RecipientKind};
use crate::sign::Signer;
use crate::source::Sources;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// An assembled message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// CRLF-terminated RFC 5322 message.
    pub bytes: Vec<u8>,
    /// Envelope recipients: every To, Cc and Bcc address in part order.
    pub recipients: Vec<String>,
}

/// Assembles messages from parts.
///
/// The builder holds no per-message state; one instance can be shared and
/// used from several threads at once.
#[derive(Clone, Default)]
pub struct MessageBuilder {
    sources: Sources,
    signer: Option<Arc<dyn Signer>>,
}

impl fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuilder")
            .field("sources", &self.sources)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

impl MessageBuilder {
    /// Creates a builder using the system clock and random source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given clock and random source.
    #[must_use]
    pub fn with_sources(mut self, sources: Sources) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the signer used for `multipart/signed` containers.
    #[must_use]
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Returns the clock and random source.
    #[must_use]
    pub const fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Creates an attachment whose Content-ID uses this builder's sources.
    #[must_use]
    pub fn attachment(&self, content_type: &str, filename: &str, body: impl Into<Vec<u8>>) -> BodyPart {
        BodyPart::attachment_with(&self.sources, content_type, filename, body)
    }

    /// Creates an inline image whose Content-ID uses this builder's sources.
    #[must_use]
    pub fn inline_image(&self, content_type: &str, filename: &str, body: impl Into<Vec<u8>>) -> BodyPart {
        BodyPart::inline_with(&self.sources, content_type, filename, body)
    }

    /// Assembles a message.
    ///
    /// Headers set through a [`HeaderSet`] part replace the generated
    /// `From`, `To`, `Cc`, `Message-Id`, `Date` and `Subject` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Part`] for the first part carrying a construction
    /// error, [`Error::NoRecipients`] or [`Error::NoBody`] if either list is
    /// empty, and [`Error::Signing`] if a signed container cannot be signed.
    pub fn build(
        &self,
        subject: &str,
        from: &Mailbox,
        parts: impl IntoIterator<Item = Part>,
    ) -> Result<RenderedMessage> {
        let mut parts: Vec<Part> = parts.into_iter().collect();
        for (i, part) in parts.iter_mut().enumerate() {
            if let Some(e) = part.take_error() {
                return Err(e.at_part(i + 1));
            }
        }

        let Split {
            bodies,
            recipients,
            mut headers,
        } = split(parts);
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }
        if bodies.is_empty() {
            return Err(Error::NoBody);
        }

        let mut msg = Vec::with_capacity(1024);
        write_address_headers(&mut msg, &mut headers, from, &recipients)?;

        let now = self.sources.clock.now();
        let message_id = format!(
            "<blackmail-{}-{}@{}>",
            timestamp(&now),
            base36(self.sources.random.token()),
            from.domain()
        );
        headers.write_default(&mut msg, "Message-Id", &message_id)?;
        headers.write_default(&mut msg, "Date", &now.format(DATE_FORMAT).to_string())?;
        headers.write_default(&mut msg, "Subject", subject)?;
        headers.write(&mut msg)?;

        let recipients = recipients
            .into_iter()
            .map(|r| r.mailbox().address.clone())
            .collect();

        if let [only] = bodies.as_slice()
            && only.is_text()
        {
            let (ct, cte) = TransferEncoding::for_content_type(&only.content_type);
            write!(msg, "Content-Type: {ct}\r\nContent-Transfer-Encoding: {cte}\r\n\r\n")?;
            cte.write(&mut msg, &only.body)?;
            return Ok(RenderedMessage {
                bytes: msg,
                recipients,
            });
        }

        let container = top_level(bodies);
        debug!(
            content_type = %container.content_type,
            parts = container.parts.len(),
            "assembling multipart message"
        );

        let boundary = self.sources.boundary();
        write!(
            msg,
            "Mime-Version: 1.0\r\nContent-Type: {};\r\n\tboundary=\"{boundary}\"\r\n\r\n",
            container.content_type
        )?;
        let mut assembly = Assembly {
            sources: &self.sources,
            pending: Vec::new(),
        };
        let mut writer = MultipartWriter::new(&mut msg, boundary);
        assembly.write_children(&mut writer, &container)?;
        writer.close()?;

        let bytes = self.apply_signatures(msg, assembly.pending)?;
        Ok(RenderedMessage { bytes, recipients })
    }

    fn apply_signatures(&self, mut bytes: Vec<u8>, pending: Vec<PendingSignature>) -> Result<Vec<u8>> {
        if pending.is_empty() {
            return Ok(bytes);
        }
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::Signing("no signer configured".to_string()))?;
        for p in pending {
            let signature = signer
                .sign(&p.content)
                .map_err(|e| Error::Signing(e.to_string()))?;
            bytes = replace_all(&bytes, p.token.as_bytes(), &normalize_crlf(&signature));
        }
        Ok(bytes)
    }
}

/// Assembles a message with the system clock and random source and no signer.
///
/// # Errors
///
/// See [`MessageBuilder::build`].
pub fn build(subject: &str, from: &Mailbox, parts: impl IntoIterator<Item = Part>) -> Result<RenderedMessage> {
    MessageBuilder::new().build(subject, from, parts)
}

struct Split {
    bodies: Vec<BodyPart>,
    recipients: Vec<Recipient>,
    headers: HeaderSet,
}

fn split(parts: Vec<Part>) -> Split {
    let mut split = Split {
        bodies: Vec::new(),
        recipients: Vec::new(),
        headers: HeaderSet::new(),
    };
    for part in parts {
        match part {
            Part::Body(b) => split.bodies.push(b),
            Part::Bodies(bs) => split.bodies.extend(bs),
            Part::Recipient(r) => split.recipients.push(r),
            Part::Recipients(rs) => split.recipients.extend(rs),
            Part::Headers(h) => split.headers.append(h),
        }
    }
    split
}

fn write_address_headers(
    msg: &mut Vec<u8>,
    headers: &mut HeaderSet,
    from: &Mailbox,
    recipients: &[Recipient],
) -> Result<()> {
    let of_kind = |kind| {
        recipients
            .iter()
            .filter(|r| r.kind() == kind)
            .map(Recipient::mailbox)
            .collect::<Vec<_>>()
    };
    let to = of_kind(RecipientKind::To);
    let cc = of_kind(RecipientKind::Cc);
    let has_bcc = recipients.iter().any(|r| r.kind() == RecipientKind::Bcc);

    headers.write_default(msg, "From", &from.to_string())?;
    if !to.is_empty() {
        headers.write_default(msg, "To", &address::join(&to))?;
    } else if has_bcc {
        headers.write_default(msg, "To", "undisclosed-recipients:;")?;
    }
    if !cc.is_empty() {
        headers.write_default(msg, "Cc", &address::join(&cc))?;
    }
    Ok(())
}

/// Picks the top-level container for two or more bodies, or a lone multipart.
fn top_level(mut bodies: Vec<BodyPart>) -> BodyPart {
    if bodies.len() == 1 && bodies[0].is_multipart() {
        if let Some(only) = bodies.pop() {
            return only;
        }
    }
    let alternative = bodies.len() <= 2
        && bodies
            .iter()
            .all(|b| b.is_plain() || b.is_html() || b.content_type == MULTIPART_RELATED);
    let ct = if alternative {
        MULTIPART_ALTERNATIVE
    } else {
        MULTIPART_MIXED
    };
    BodyPart::multipart(ct, bodies)
}

/// `YYYYMMDDhhmmss.ffff` in UTC.
pub(crate) fn timestamp(t: &DateTime<FixedOffset>) -> String {
    let utc = t.with_timezone(&Utc);
    format!(
        "{}.{:04}",
        utc.format("%Y%m%d%H%M%S"),
        (utc.timestamp_subsec_nanos() / 100_000).min(9_999)
    )
}

struct PendingSignature {
    token: String,
    content: Vec<u8>,
}

struct Assembly<'a> {
    sources: &'a Sources,
    pending: Vec<PendingSignature>,
}

impl Assembly<'_> {
    fn write_children(&mut self, writer: &mut MultipartWriter<'_>, container: &BodyPart) -> Result<()> {
        let cids: Vec<&str> = container
            .parts
            .iter()
            .map(BodyPart::content_id)
            .filter(|cid| !cid.is_empty())
            .collect();

        let mut signed_content = None;
        for (i, child) in container.parts.iter().enumerate() {
            let out = writer.next_part()?;
            let start = out.len();
            self.write_part(out, child, &cids)?;
            if i == 0 && container.is_signed() {
                signed_content = Some(out[start..].to_vec());
            }
        }

        if container.is_signed() {
            let token = self.sources.boundary();
            let placeholder = BodyPart::signature_placeholder(&token);
            self.write_part(writer.next_part()?, &placeholder, &[])?;
            self.pending.push(PendingSignature {
                token,
                content: signed_content.unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn write_part(&mut self, out: &mut Vec<u8>, part: &BodyPart, cids: &[&str]) -> Result<()> {
        if !part.is_multipart() {
            return write_leaf(out, part, cids);
        }
        let boundary = self.sources.boundary();
        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type",
            format!("{};\r\n\tboundary=\"{boundary}\"", part.content_type),
        );
        write_part_headers(out, &headers)?;
        let mut nested = MultipartWriter::new(out, boundary);
        self.write_children(&mut nested, part)?;
        nested.close()?;
        Ok(())
    }
}

fn write_leaf(out: &mut Vec<u8>, part: &BodyPart, cids: &[&str]) -> Result<()> {
    let (mut ct, cte) = TransferEncoding::for_content_type(&part.content_type);
    let mut headers = BTreeMap::new();
    if !part.content_id.is_empty() {
        headers.insert("Content-Id", format!("<{}>", part.content_id));
    }
    if let Some(disposition) = part.disposition {
        let disposition = disposition.as_str();
        if is_ascii(&part.filename) {
            let escaped = part.filename.replace('"', "\\\"");
            headers.insert(
                "Content-Disposition",
                format!("{disposition}; filename=\"{escaped}\""),
            );
            ct = format!("{ct}; name=\"{}\"", encode_q(&escaped));
        } else {
            headers.insert(
                "Content-Disposition",
                format!("{disposition}; filename*=utf-8''{}", encode_rfc2231(&part.filename)),
            );
            ct = format!("{ct}; name=\"{}\"", encode_q(&part.filename));
        }
    }
    headers.insert("Content-Transfer-Encoding", cte.to_string());
    headers.insert("Content-Type", ct);
    write_part_headers(out, &headers)?;

    if part.is_html() && !cids.is_empty() {
        cte.write(out, &substitute_cids(&part.body, cids))?;
    } else {
        cte.write(out, &part.body)?;
    }
    Ok(())
}

/// Rewrites `src="cid:blackmail:N"` to the Nth Content-ID, counting from 1.
fn substitute_cids(body: &[u8], cids: &[&str]) -> Vec<u8> {
    cids.iter()
        .enumerate()
        .fold(body.to_vec(), |body, (i, cid)| {
            let find = format!("src=\"cid:blackmail:{}\"", i + 1);
            let replace = format!("src=\"cid:{cid}\"");
            replace_all(&body, find.as_bytes(), replace.as_bytes())
        })
}

fn replace_all(haystack: &[u8], needle: &[u8], with: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.windows(needle.len()).position(|w| w == needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(with);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
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
    use crate::content_type::{TEXT_HTML, TEXT_PLAIN};
    use crate::part::{html, text};

    #[test]
    fn test_timestamp() {
        let t = DateTime::parse_from_rfc3339("2019-06-18T15:37:00.123456789+02:00").unwrap();
        assert_eq!(timestamp(&t), "20190618133700.1234");
        let t = DateTime::parse_from_rfc3339("2019-06-18T13:37:00Z").unwrap();
        assert_eq!(timestamp(&t), "20190618133700.0000");
    }

    #[test]
    fn test_top_level_selection() {
        assert_eq!(top_level(vec![text("a"), html("b")]).content_type, MULTIPART_ALTERNATIVE);
        assert_eq!(
            top_level(vec![text("a"), BodyPart::new("application/octet-stream", "b")]).content_type,
            MULTIPART_MIXED
        );
        assert_eq!(top_level(vec![text("a"), html("b"), text("c")]).content_type, MULTIPART_MIXED);
        assert_eq!(
            top_level(vec![text("a"), BodyPart::multipart(MULTIPART_RELATED, vec![html("b")])])
                .content_type,
            MULTIPART_ALTERNATIVE
        );
    }

    #[test]
    fn test_top_level_hoists_single_multipart() {
        let related = BodyPart::multipart(MULTIPART_RELATED, vec![html("b"), text("c")]);
        let top = top_level(vec![related]);
        assert_eq!(top.content_type, MULTIPART_RELATED);
        assert_eq!(top.parts.len(), 2);
        assert_eq!(top.parts[0].content_type, TEXT_HTML);
    }

    #[test]
    fn test_single_non_text_body_is_mixed() {
        let top = top_level(vec![BodyPart::new("image/png", "x")]);
        assert_eq!(top.content_type, MULTIPART_MIXED);
        assert_eq!(top.parts[0].content_type, "image/png");
        assert_ne!(top.parts[0].content_type, TEXT_PLAIN);
    }

    #[test]
    fn test_substitute_cids_in_order() {
        let body = br#"<img src="cid:blackmail:2"><img src="cid:blackmail:1">"#;
        let out = substitute_cids(body, &["first@x", "second@x"]);
        assert_eq!(out, br#"<img src="cid:second@x"><img src="cid:first@x">"#);
    }

    #[test]
    fn test_replace_all() {
        assert_eq!(replace_all(b"aXbXc", b"X", b"--"), b"a--b--c");
        assert_eq!(replace_all(b"abc", b"", b"z"), b"abc");
        assert_eq!(replace_all(b"abc", b"abc", b""), b"");
    }
}
