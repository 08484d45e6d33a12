//! Message parts.
//!
//! A message is assembled from an unordered list of [`Part`]s: bodies,
//! recipients and extra headers. Every part can carry a construction error
//! which the builder reports, with the part's position, before doing any
//! other work.

use crate::address::Mailbox;
use crate::content_type::{self, MULTIPART_RELATED, MULTIPART_SIGNED, PGP_SIGNATURE, TEXT_HTML, TEXT_PLAIN};
use crate::encoding::base36;
use crate::error::{BoxError, Error};
use crate::header::HeaderSet;
use crate::source::Sources;

/// How an attachment is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Offered as a separate file.
    Attachment,
    /// Displayed inline, usually referenced from HTML by Content-ID.
    Inline,
}

impl Disposition {
    /// Returns the `Content-Disposition` token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// A body, attachment, inline image or multipart container.
#[derive(Debug, Default)]
pub struct BodyPart {
    pub(crate) content_type: String,
    pub(crate) body: Vec<u8>,
    pub(crate) parts: Vec<BodyPart>,
    pub(crate) disposition: Option<Disposition>,
    pub(crate) filename: String,
    pub(crate) content_id: String,
    pub(crate) error: Option<Error>,
}

impl BodyPart {
    /// Creates a body part with the given content type.
    #[must_use]
    pub fn new(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Creates a multipart container holding `parts`.
    #[must_use]
    pub fn multipart(content_type: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            content_type: content_type.into(),
            parts,
            ..Self::default()
        }
    }

    /// Creates an attachment, guessing a missing content type or filename.
    ///
    /// The Content-ID is derived from the current time, a hash of the body
    /// and a random token drawn from `sources`.
    #[must_use]
    pub fn attachment_with(
        sources: &Sources,
        content_type: &str,
        filename: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self::file(sources, Disposition::Attachment, content_type, filename, body.into())
    }

    /// Creates an inline image; see [`attachment_with`](Self::attachment_with).
    #[must_use]
    pub fn inline_with(
        sources: &Sources,
        content_type: &str,
        filename: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self::file(sources, Disposition::Inline, content_type, filename, body.into())
    }

    fn file(
        sources: &Sources,
        disposition: Disposition,
        content_type: &str,
        filename: &str,
        body: Vec<u8>,
    ) -> Self {
        let (content_type, filename) = content_type::guess(content_type, filename, &body);
        let content_id = content_id(sources, &body);
        Self {
            content_type,
            body,
            disposition: Some(disposition),
            filename,
            content_id,
            ..Self::default()
        }
    }

    /// Creates a part that only carries a construction error.
    #[must_use]
    pub fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the raw, unencoded body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the sub-parts of a multipart container.
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        &self.parts
    }

    /// Returns the attachment filename; empty for plain bodies.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the Content-ID without angle brackets; empty if none.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Returns the disposition of an attachment or inline image.
    #[must_use]
    pub const fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    /// Returns the construction error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Removes the first construction error of this part or its children.
    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error
            .take()
            .or_else(|| self.parts.iter_mut().find_map(Self::take_error))
    }

    pub(crate) fn is_text(&self) -> bool {
        content_type::is_text(&self.content_type)
    }

    pub(crate) fn is_html(&self) -> bool {
        content_type::is_html(&self.content_type)
    }

    pub(crate) fn is_plain(&self) -> bool {
        content_type::is_plain(&self.content_type)
    }

    pub(crate) fn is_multipart(&self) -> bool {
        content_type::is_multipart(&self.content_type)
    }

    pub(crate) fn is_signed(&self) -> bool {
        content_type::is_signed(&self.content_type)
    }

    /// Placeholder signature sub-part whose body is replaced after assembly.
    pub(crate) fn signature_placeholder(token: &str) -> Self {
        Self {
            content_type: PGP_SIGNATURE.to_string(),
            body: token.as_bytes().to_vec(),
            disposition: Some(Disposition::Attachment),
            filename: "signature.asc".to_string(),
            ..Self::default()
        }
    }
}

/// `{UTC timestamp}-{fnv1a(body) base36}-{token base36}@blackmail`.
fn content_id(sources: &Sources, body: &[u8]) -> String {
    format!(
        "{}-{}-{}@blackmail",
        crate::message::timestamp(&sources.clock.now()),
        base36(u64::from(fnv1a32(body))),
        base36(sources.random.token()),
    )
}

fn fnv1a32(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5, |hash: u32, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

/// Who receives the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    /// Listed in `To`.
    To,
    /// Listed in `Cc`.
    Cc,
    /// Receives the message without being listed in any header.
    Bcc,
}

/// One recipient of the message.
#[derive(Debug)]
pub struct Recipient {
    kind: RecipientKind,
    mailbox: Mailbox,
    error: Option<Error>,
}

impl Recipient {
    /// Creates a recipient; an invalid address is kept as a construction error.
    #[must_use]
    pub fn new(kind: RecipientKind, mailbox: Mailbox) -> Self {
        let error = mailbox.validate().err();
        Self {
            kind,
            mailbox,
            error,
        }
    }

    /// Creates a recipient that only carries a construction error.
    #[must_use]
    pub fn failed(kind: RecipientKind, error: Error) -> Self {
        Self {
            kind,
            mailbox: Mailbox::default(),
            error: Some(error),
        }
    }

    /// Returns the recipient kind.
    #[must_use]
    pub const fn kind(&self) -> RecipientKind {
        self.kind
    }

    /// Returns the recipient's mailbox.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Returns the construction error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

/// One constituent of a message.
#[derive(Debug)]
pub enum Part {
    /// A body, attachment or container.
    Body(BodyPart),
    /// Several bodies at once.
    Bodies(Vec<BodyPart>),
    /// A single recipient.
    Recipient(Recipient),
    /// Several recipients at once.
    Recipients(Vec<Recipient>),
    /// Extra headers, overriding generated ones with the same name.
    Headers(HeaderSet),
}

impl Part {
    /// Returns the first construction error carried by this part.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Body(b) => b.error(),
            Self::Bodies(bs) => bs.iter().find_map(BodyPart::error),
            Self::Recipient(r) => r.error(),
            Self::Recipients(rs) => rs.iter().find_map(Recipient::error),
            Self::Headers(h) => h.error(),
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        match self {
            Self::Body(b) => b.take_error(),
            Self::Bodies(bs) => bs.iter_mut().find_map(BodyPart::take_error),
            Self::Recipient(r) => r.error.take(),
            Self::Recipients(rs) => rs.iter_mut().find_map(|r| r.error.take()),
            Self::Headers(h) => h.take_error(),
        }
    }
}

impl From<BodyPart> for Part {
    fn from(part: BodyPart) -> Self {
        Self::Body(part)
    }
}

impl From<Vec<BodyPart>> for Part {
    fn from(parts: Vec<BodyPart>) -> Self {
        Self::Bodies(parts)
    }
}

impl From<Recipient> for Part {
    fn from(recipient: Recipient) -> Self {
        Self::Recipient(recipient)
    }
}

impl From<Vec<Recipient>> for Part {
    fn from(recipients: Vec<Recipient>) -> Self {
        Self::Recipients(recipients)
    }
}

impl From<HeaderSet> for Part {
    fn from(headers: HeaderSet) -> Self {
        Self::Headers(headers)
    }
}

/// Body with an explicit content type.
#[must_use]
pub fn body(content_type: &str, body: impl Into<Vec<u8>>) -> BodyPart {
    BodyPart::new(content_type, body)
}

/// `text/plain` body.
#[must_use]
pub fn text(body: impl Into<Vec<u8>>) -> BodyPart {
    BodyPart::new(TEXT_PLAIN, body)
}

/// `text/html` body.
#[must_use]
pub fn html(body: impl Into<Vec<u8>>) -> BodyPart {
    BodyPart::new(TEXT_HTML, body)
}

/// `text/html` body with inline images, wrapped in `multipart/related`.
///
/// Reference the images from the HTML as `src="cid:blackmail:1"`,
/// `src="cid:blackmail:2"` and so on, in the order they are passed.
#[must_use]
pub fn html_with_images(body: impl Into<Vec<u8>>, images: Vec<BodyPart>) -> BodyPart {
    if images.is_empty() {
        return html(body);
    }
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(html(body));
    parts.extend(images);
    BodyPart::multipart(MULTIPART_RELATED, parts)
}

/// Body produced by a callback; a failure is deferred into the part.
pub fn body_with<F, E>(content_type: &str, produce: F) -> BodyPart
where
    F: FnOnce() -> std::result::Result<Vec<u8>, E>,
    E: Into<BoxError>,
{
    match produce() {
        Ok(bytes) => BodyPart::new(content_type, bytes),
        Err(e) => BodyPart::failed(Error::Body(e.into())),
    }
}

/// `multipart/signed` container; the builder needs a signer to render it.
#[must_use]
pub fn signed(parts: Vec<BodyPart>) -> BodyPart {
    BodyPart::multipart(MULTIPART_SIGNED, parts)
}

/// Attachment using the system clock and random source.
#[must_use]
pub fn attachment(content_type: &str, filename: &str, body: impl Into<Vec<u8>>) -> BodyPart {
    BodyPart::attachment_with(&Sources::default(), content_type, filename, body)
}

/// Inline image using the system clock and random source.
#[must_use]
pub fn inline_image(content_type: &str, filename: &str, body: impl Into<Vec<u8>>) -> BodyPart {
    BodyPart::inline_with(&Sources::default(), content_type, filename, body)
}

/// Headers from a flat `key, value, ...` list.
#[must_use]
pub fn headers<S: AsRef<str>>(key_values: &[S]) -> HeaderSet {
    HeaderSet::from_list(key_values)
}

/// Headers from `key<sep>value` strings.
#[must_use]
pub fn headers_kv<S: AsRef<str>>(separator: char, entries: &[S]) -> HeaderSet {
    HeaderSet::from_kv(separator, entries)
}

/// Headers marking the message as an automatic reply.
#[must_use]
pub fn autoreply_headers() -> HeaderSet {
    HeaderSet::from_list(&[
        "Auto-Submitted",
        "auto-replied",
        "X-Auto-Response-Suppress",
        "All",
        "Precedence",
        "auto_reply",
    ])
}

fn recipients<S: AsRef<str>>(kind: RecipientKind, addresses: &[S]) -> Vec<Recipient> {
    addresses
        .iter()
        .map(|a| Recipient::new(kind, Mailbox::bare(a.as_ref())))
        .collect()
}

fn named<S: AsRef<str>>(kind: RecipientKind, name_address: &[S]) -> Vec<Recipient> {
    if name_address.len() % 2 == 1 {
        return vec![Recipient::failed(kind, Error::OddArgumentCount)];
    }
    name_address
        .chunks_exact(2)
        .map(|pair| Recipient::new(kind, Mailbox::new(pair[0].as_ref(), pair[1].as_ref())))
        .collect()
}

fn mailboxes(kind: RecipientKind, list: impl IntoIterator<Item = Mailbox>) -> Vec<Recipient> {
    list.into_iter().map(|m| Recipient::new(kind, m)).collect()
}

/// `To` recipients from bare addresses.
#[must_use]
pub fn to<S: AsRef<str>>(addresses: &[S]) -> Vec<Recipient> {
    recipients(RecipientKind::To, addresses)
}

/// `Cc` recipients from bare addresses.
#[must_use]
pub fn cc<S: AsRef<str>>(addresses: &[S]) -> Vec<Recipient> {
    recipients(RecipientKind::Cc, addresses)
}

/// `Bcc` recipients from bare addresses.
#[must_use]
pub fn bcc<S: AsRef<str>>(addresses: &[S]) -> Vec<Recipient> {
    recipients(RecipientKind::Bcc, addresses)
}

/// `To` recipients from `name, address, ...` pairs.
#[must_use]
pub fn to_names<S: AsRef<str>>(name_address: &[S]) -> Vec<Recipient> {
    named(RecipientKind::To, name_address)
}

/// `Cc` recipients from `name, address, ...` pairs.
#[must_use]
pub fn cc_names<S: AsRef<str>>(name_address: &[S]) -> Vec<Recipient> {
    named(RecipientKind::Cc, name_address)
}

/// `Bcc` recipients from `name, address, ...` pairs.
#[must_use]
pub fn bcc_names<S: AsRef<str>>(name_address: &[S]) -> Vec<Recipient> {
    named(RecipientKind::Bcc, name_address)
}

/// `To` recipients from mailboxes.
#[must_use]
pub fn to_mailboxes(list: impl IntoIterator<Item = Mailbox>) -> Vec<Recipient> {
    mailboxes(RecipientKind::To, list)
}

/// `Cc` recipients from mailboxes.
#[must_use]
pub fn cc_mailboxes(list: impl IntoIterator<Item = Mailbox>) -> Vec<Recipient> {
    mailboxes(RecipientKind::Cc, list)
}

/// `Bcc` recipients from mailboxes.
#[must_use]
pub fn bcc_mailboxes(list: impl IntoIterator<Item = Mailbox>) -> Vec<Recipient> {
    mailboxes(RecipientKind::Bcc, list)
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
    use crate::source::{FixedClock, SequenceRandom};
    use chrono::{DateTime, FixedOffset};

    fn sources() -> Sources {
        let at: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2019-06-18T13:37:00.123456789Z").unwrap();
        Sources::new(FixedClock(at), SequenceRandom::new(42))
    }

    #[test]
    fn test_fnv1a32() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_attachment_content_id() {
        let part = BodyPart::attachment_with(&sources(), "image/png", "a.png", b"".to_vec());
        assert_eq!(part.content_id(), "20190618133700.1234-ztntfp-16@blackmail");
        assert_eq!(part.disposition(), Some(Disposition::Attachment));
    }

    #[test]
    fn test_inline_guesses_type() {
        let part = BodyPart::inline_with(&sources(), "", "logo.png", b"x".to_vec());
        assert_eq!(part.content_type(), "image/png");
        assert_eq!(part.filename(), "logo.png");
        assert_eq!(part.disposition(), Some(Disposition::Inline));
    }

    #[test]
    fn test_content_ids_are_unique() {
        let s = sources();
        let a = BodyPart::attachment_with(&s, "image/png", "a.png", b"same".to_vec());
        let b = BodyPart::attachment_with(&s, "image/png", "a.png", b"same".to_vec());
        assert_ne!(a.content_id(), b.content_id());
    }

    #[test]
    fn test_html_with_images() {
        let s = sources();
        let part = html_with_images(
            "<img src=\"cid:blackmail:1\">",
            vec![BodyPart::inline_with(&s, "image/png", "i.png", b"x".to_vec())],
        );
        assert_eq!(part.content_type(), MULTIPART_RELATED);
        assert_eq!(part.parts().len(), 2);
        assert_eq!(part.parts()[0].content_type(), TEXT_HTML);

        assert_eq!(html_with_images("<b>x</b>", vec![]).content_type(), TEXT_HTML);
    }

    #[test]
    fn test_body_with_defers_error() {
        let part = body_with(TEXT_PLAIN, || Err::<Vec<u8>, _>("oh noes!"));
        assert!(matches!(part.error(), Some(Error::Body(_))));
        assert_eq!(part.error().unwrap().to_string(), "body: oh noes!");

        let ok = body_with(TEXT_PLAIN, || Ok::<_, std::io::Error>(b"fine".to_vec()));
        assert!(ok.error().is_none());
        assert_eq!(ok.body(), b"fine");
    }

    #[test]
    fn test_recipient_helpers() {
        let list = to(&["a@x.com", "b@x.com"]);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|r| r.kind() == RecipientKind::To));

        let named = cc_names(&["Name", "n@x.com"]);
        assert_eq!(named[0].mailbox(), &Mailbox::new("Name", "n@x.com"));
        assert_eq!(named[0].kind(), RecipientKind::Cc);

        let odd = bcc_names(&["Name"]);
        assert!(matches!(odd[0].error(), Some(Error::OddArgumentCount)));
    }

    #[test]
    fn test_invalid_recipient_keeps_error() {
        let part = Part::from(to(&["not-an-address"]));
        assert!(matches!(part.error(), Some(Error::InvalidAddress { .. })));
    }

    #[test]
    fn test_take_error_finds_nested() {
        let mut part = Part::from(BodyPart::multipart(
            MULTIPART_RELATED,
            vec![html("x"), BodyPart::failed(Error::NoBody)],
        ));
        assert!(part.error().is_none());
        assert!(matches!(part.take_error(), Some(Error::NoBody)));
        assert!(part.take_error().is_none());
    }

    #[test]
    fn test_autoreply_headers() {
        let h = autoreply_headers();
        assert_eq!(h.get("Auto-Submitted"), Some("auto-replied"));
        assert_eq!(h.get("precedence"), Some("auto_reply"));
        assert_eq!(h.len(), 3);
    }
}
