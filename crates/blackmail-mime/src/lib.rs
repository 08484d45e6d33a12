//! # blackmail-mime
//!
//! Assembles RFC 5322 / MIME messages from an unordered list of parts.
//!
//! ## Features
//!
//! - **Structure selection**: single text part, `multipart/alternative`,
//!   `multipart/mixed`, or a hoisted `multipart/related` container
//! - **Header overrides**: user headers replace generated `Message-Id`,
//!   `Date`, `Subject` and address headers
//! - **Attachments and inline images**: type guessing, RFC 2231 filenames,
//!   `cid:blackmail:N` references rewritten to real Content-IDs
//! - **Encodings**: Quoted-Printable, 76-column Base64, RFC 2047 headers
//! - **Deterministic output**: injectable clock and random source
//!
//! ## Quick Start
//!
//! ```ignore
//! use blackmail_mime::{Mailbox, build, text, to};
//!
//! let message = build(
//!     "Hi",
//!     &Mailbox::bare("a@x.com"),
//!     [to(&["b@y.com"]).into(), text("hello").into()],
//! )?;
//! assert_eq!(message.recipients, vec!["b@y.com"]);
//! ```
//!
//! ### HTML with inline images
//!
//! ```ignore
//! use blackmail_mime::{Mailbox, build, html_with_images, inline_image, text, to};
//!
//! let logo = std::fs::read("logo.png")?;
//! let message = build(
//!     "Newsletter",
//!     &Mailbox::new("News", "news@example.com"),
//!     [
//!         to(&["reader@example.com"]).into(),
//!         text("Plain version").into(),
//!         html_with_images(
//!             r#"<img src="cid:blackmail:1">"#,
//!             vec![inline_image("", "logo.png", logo)],
//!         )
//!         .into(),
//!     ],
//! )?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod error;
mod header;
mod message;
mod multipart;
mod part;
mod sign;
mod source;

pub mod content_type;
pub mod encoding;

pub use address::Mailbox;
pub use content_type::TransferEncoding;
pub use error::{BoxError, Error, Result};
pub use header::{HeaderSet, canonical_key};
pub use message::{MessageBuilder, RenderedMessage, build};
pub use part::{
    BodyPart, Disposition, Part, Recipient, RecipientKind, attachment, autoreply_headers, bcc,
    bcc_mailboxes, bcc_names, body, body_with, cc, cc_mailboxes, cc_names, headers, headers_kv,
    html, html_with_images, inline_image, signed, text, to, to_mailboxes, to_names,
};
pub use sign::Signer;
pub use source::{
    Clock, FixedClock, RandomSource, SequenceRandom, Sources, SystemClock, SystemRandom,
    TOKEN_BOUND,
};
