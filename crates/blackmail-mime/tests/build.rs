//! End-to-end tests for message assembly.
//!
//! Every builder here runs on a frozen clock and a counting random source,
//! so the generated Message-Id, Date and Content-ID values are stable.

#![allow(clippy::unwrap_used)]

use blackmail_mime::{
    BodyPart, Error, FixedClock, Mailbox, MessageBuilder, Part, RenderedMessage, SequenceRandom,
    Sources, autoreply_headers, bcc, body, body_with, cc, cc_names, headers, headers_kv, html,
    html_with_images, signed, text, to, to_names,
};
use chrono::DateTime;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

fn builder() -> MessageBuilder {
    let at = DateTime::parse_from_rfc3339("2019-06-18T13:37:00.123456789Z").unwrap();
    MessageBuilder::new().with_sources(Sources::new(FixedClock(at), SequenceRandom::new(42)))
}

fn me() -> Mailbox {
    Mailbox::bare("me@example.com")
}

fn render(subject: &str, parts: Vec<Part>) -> (String, Vec<String>) {
    let RenderedMessage { bytes, recipients } = builder().build(subject, &me(), parts).unwrap();
    (String::from_utf8(bytes).unwrap(), recipients)
}

/// Extracts every `boundary="..."` value in order of appearance.
fn boundaries(msg: &str) -> Vec<String> {
    msg.split("boundary=\"")
        .skip(1)
        .map(|rest| rest.split('"').next().unwrap().to_string())
        .collect()
}

fn header_count(msg: &str, name: &str) -> usize {
    let head = msg.split("\r\n\r\n").next().unwrap();
    head.lines()
        .filter(|l| l.starts_with(&format!("{name}: ")))
        .count()
}

#[test]
fn test_basic_single_text_part() {
    let (msg, rcpt) = render(
        "Basic test",
        vec![to(&["to@to.to"]).into(), text("Hello=there").into()],
    );
    assert_eq!(
        msg,
        "From: <me@example.com>\r\n\
         To: <to@to.to>\r\n\
         Message-Id: <blackmail-20190618133700.1234-16@example.com>\r\n\
         Date: Tue, 18 Jun 2019 13:37:00 +0000\r\n\
         Subject: Basic test\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n\
         \r\n\
         Hello=3Dthere"
    );
    assert_eq!(rcpt, vec!["to@to.to"]);
}

#[test]
fn test_end_to_end_scenario() {
    let parts: Vec<Part> = vec![to(&["b@y.com"]).into(), text("hello").into()];
    let message = blackmail_mime::build("Hi", &Mailbox::bare("a@x.com"), parts).unwrap();
    let msg = String::from_utf8(message.bytes).unwrap();
    assert!(msg.contains("To: <b@y.com>\r\n"));
    assert!(!msg.contains("Mime-Version"));
    assert!(!msg.contains("boundary"));
    assert_eq!(message.recipients, vec!["b@y.com"]);
}

#[test]
fn test_names_and_cc() {
    let (msg, rcpt) = render(
        "Names",
        vec![
            to_names(&["to", "to@to.to"]).into(),
            cc_names(&["cc", "cc@cc.occ", "cc2", "asd@asd.qqq"]).into(),
            text("Hello").into(),
        ],
    );
    assert!(msg.starts_with(
        "From: <me@example.com>\r\n\
         To: \"to\" <to@to.to>\r\n\
         Cc: \"cc\" <cc@cc.occ>, \"cc2\" <asd@asd.qqq>\r\n"
    ));
    assert_eq!(rcpt, vec!["to@to.to", "cc@cc.occ", "asd@asd.qqq"]);
}

#[test]
fn test_recipient_round_trip_includes_bcc() {
    let (msg, rcpt) = render(
        "Cc/Bcc",
        vec![
            to(&["to@to.to"]).into(),
            cc(&["cc@cc.occ", "asd@asd.qqq"]).into(),
            bcc(&["bcc@bcc.bcc", "x@x.x"]).into(),
            text("Hello").into(),
        ],
    );
    assert_eq!(
        rcpt,
        vec!["to@to.to", "cc@cc.occ", "asd@asd.qqq", "bcc@bcc.bcc", "x@x.x"]
    );
    assert!(!msg.contains("bcc@bcc.bcc"));
    assert!(!msg.contains("Bcc:"));
}

#[test]
fn test_bcc_only_sets_undisclosed_recipients() {
    let (msg, rcpt) = render(
        "Only Bcc",
        vec![bcc(&["bcc@bcc.bcc", "x@x.x"]).into(), text("Newsletter").into()],
    );
    assert!(msg.contains("To: undisclosed-recipients:;\r\n"));
    assert!(!msg.contains("Cc:"));
    assert_eq!(rcpt, vec!["bcc@bcc.bcc", "x@x.x"]);
}

#[test]
fn test_undisclosed_recipients_ignores_cc() {
    let (msg, _) = render(
        "Cc and Bcc",
        vec![
            cc(&["cc@cc.cc"]).into(),
            bcc(&["bcc@bcc.bcc"]).into(),
            text("x").into(),
        ],
    );
    assert!(msg.contains("To: undisclosed-recipients:;\r\n"));
    assert!(msg.contains("Cc: <cc@cc.cc>\r\n"));
}

#[test]
fn test_custom_headers_keep_order() {
    let (msg, _) = render(
        "Custom headers",
        vec![
            to(&["to@to.to"]).into(),
            text("Hello").into(),
            headers(&["Header", "value", "X-Mine", "qwe", "X-MINE", "2nd"]).into(),
        ],
    );
    assert!(msg.contains(
        "Subject: Custom headers\r\nHeader: value\r\nX-Mine: qwe\r\nX-Mine: 2nd\r\nContent-Type:"
    ));
}

#[test]
fn test_user_headers_override_generated_ones() {
    let (msg, _) = render(
        "Generated subject",
        vec![
            to(&["to@to.to"]).into(),
            text("Hello").into(),
            headers(&[
                "MESSAGE-ID",
                "ID",
                "Date",
                "yesterday",
                "subject",
                "Mine",
                "To",
                "list:;",
                "From",
                "other@example.com",
            ])
            .into(),
        ],
    );
    for (name, value) in [
        ("Message-Id", "ID"),
        ("Date", "yesterday"),
        ("Subject", "Mine"),
        ("To", "list:;"),
        ("From", "other@example.com"),
    ] {
        assert_eq!(header_count(&msg, name), 1, "{name} appears once");
        assert!(msg.contains(&format!("{name}: {value}\r\n")));
    }
}

#[test]
fn test_headers_kv_and_autoreply() {
    let (msg, _) = render(
        "Re: autoreply",
        vec![
            to(&["cust@example.com"]).into(),
            autoreply_headers().into(),
            headers_kv(':', &["List-Id: <foo>", "In-Reply-To: <prev@example.com>"]).into(),
            text("Auto respond").into(),
        ],
    );
    assert!(msg.contains(
        "Auto-Submitted: auto-replied\r\n\
         X-Auto-Response-Suppress: All\r\n\
         Precedence: auto_reply\r\n\
         List-Id: <foo>\r\n\
         In-Reply-To: <prev@example.com>\r\n"
    ));
}

#[test]
fn test_non_ascii_header_values_are_encoded() {
    let (msg, _) = render(
        "Grüße",
        vec![to(&["to@to.to"]).into(), text("x").into()],
    );
    assert!(msg.contains("Subject: =?utf-8?q?Gr=C3=BC=C3=9Fe?=\r\n"));
}

#[test]
fn test_alternative_text_and_html() {
    let (msg, _) = render(
        "text and html",
        vec![
            to(&["to@to.to"]).into(),
            text("<b>text</b> <").into(),
            html("<b>html</b> <").into(),
        ],
    );
    let b = &boundaries(&msg)[0];
    assert_eq!(b.len(), 60);
    let expected = format!(
        "From: <me@example.com>\r\n\
         To: <to@to.to>\r\n\
         Message-Id: <blackmail-20190618133700.1234-16@example.com>\r\n\
         Date: Tue, 18 Jun 2019 13:37:00 +0000\r\n\
         Subject: text and html\r\n\
         Mime-Version: 1.0\r\n\
         Content-Type: multipart/alternative;\r\n\
         \tboundary=\"{b}\"\r\n\
         \r\n\
         --{b}\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         <b>text</b> <\r\n\
         --{b}\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         <b>html</b> <\r\n\
         --{b}--\r\n"
    );
    assert_eq!(msg, expected);
}

#[test]
fn test_text_and_attachment_is_mixed() {
    let b = builder();
    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        text("Look at my file").into(),
        b.attachment("application/octet-stream", "blob.bin", vec![0u8, 1, 2]).into(),
    ];
    let msg = String::from_utf8(b.build("Attachment", &me(), parts).unwrap().bytes).unwrap();
    assert!(msg.contains("Mime-Version: 1.0\r\nContent-Type: multipart/mixed;\r\n"));
    assert!(msg.contains(
        "Content-Disposition: attachment; filename=\"blob.bin\"\r\n\
         Content-Id: <"
    ));
    assert!(msg.contains(
        "Content-Transfer-Encoding: base64\r\n\
         Content-Type: application/octet-stream; name=\"blob.bin\"\r\n\
         \r\n\
         AAEC\r\n"
    ));
}

#[test]
fn test_three_parts_are_mixed() {
    let (msg, _) = render(
        "Three",
        vec![
            to(&["to@to.to"]).into(),
            text("a").into(),
            html("b").into(),
            text("c").into(),
        ],
    );
    assert!(msg.contains("Content-Type: multipart/mixed;\r\n"));
}

#[test]
fn test_attachment_filenames() {
    let b = builder();
    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        text("Look at my images!").into(),
        b.attachment("image/jpeg", "test \".jpeg", PNG).into(),
        b.attachment("image/png", "€.png", PNG).into(),
    ];
    let msg = String::from_utf8(b.build("Files", &me(), parts).unwrap().bytes).unwrap();
    assert!(msg.contains("Content-Disposition: attachment; filename=\"test \\\".jpeg\"\r\n"));
    assert!(msg.contains("Content-Type: image/jpeg; name=\"test \\\".jpeg\"\r\n"));
    assert!(msg.contains("Content-Disposition: attachment; filename*=utf-8''%E2%82%AC.png\r\n"));
    assert!(msg.contains("Content-Type: image/png; name=\"=?utf-8?q?=E2=82=AC.png?=\"\r\n"));
}

#[test]
fn test_inline_image_cid_substitution() {
    let b = builder();
    let first = b.inline_image("image/png", "one.png", PNG);
    let second = b.inline_image("", "two.png", b"second image".to_vec());
    let (cid1, cid2) = (first.content_id().to_string(), second.content_id().to_string());
    assert_ne!(cid1, cid2);

    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        html_with_images(
            "<img src=\"cid:blackmail:1\">\n<img src=\"cid:blackmail:2\">",
            vec![first, second],
        )
        .into(),
    ];
    let msg = String::from_utf8(b.build("Inline", &me(), parts).unwrap().bytes).unwrap();

    // A lone related container is hoisted to the top level.
    assert!(msg.contains("Mime-Version: 1.0\r\nContent-Type: multipart/related;\r\n"));
    assert_eq!(boundaries(&msg).len(), 1);
    assert!(msg.contains(&format!(
        "<img src=3D\"cid:{cid1}\">\r\n<img src=3D\"cid:{cid2}\">"
    )));
    assert!(msg.contains(&format!("Content-Id: <{cid1}>\r\n")));
    assert!(msg.contains("Content-Disposition: inline; filename=\"two.png\"\r\n"));
}

#[test]
fn test_cid_counting_includes_attachments() {
    let b = builder();
    let attached = b.attachment("application/pdf", "doc.pdf", b"%PDF-1.4".to_vec());
    let inline = b.inline_image("image/png", "img.png", PNG);
    let cid_inline = inline.content_id().to_string();

    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        Part::Bodies(vec![
            html(r#"<img src="cid:blackmail:2">"#),
            attached,
            inline,
        ]),
    ];
    let msg = String::from_utf8(b.build("Count", &me(), parts).unwrap().bytes).unwrap();
    assert!(msg.contains(&format!("<img src=3D\"cid:{cid_inline}\">")));
}

#[test]
fn test_nested_related_inside_alternative() {
    let b = builder();
    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        text("plain").into(),
        html_with_images(
            r#"<img src="cid:blackmail:1">"#,
            vec![b.inline_image("image/png", "i.png", PNG)],
        )
        .into(),
    ];
    let msg = String::from_utf8(b.build("Nested", &me(), parts).unwrap().bytes).unwrap();
    let bs = boundaries(&msg);
    assert_eq!(bs.len(), 2);
    assert_ne!(bs[0], bs[1]);
    assert!(msg.contains("Content-Type: multipart/alternative;\r\n"));
    assert!(msg.contains(&format!(
        "--{}\r\nContent-Type: multipart/related;\r\n\tboundary=\"{}\"\r\n\r\n--{}\r\n",
        bs[0], bs[1], bs[1]
    )));
    assert!(msg.ends_with(&format!("\r\n--{}--\r\n\r\n--{}--\r\n", bs[1], bs[0])));
}

fn build_err(parts: Vec<Part>) -> Error {
    builder().build("x", &me(), parts).unwrap_err()
}

#[test]
fn test_part_error_reported_with_position() {
    let err = build_err(vec![
        to(&["to@to.to"]).into(),
        body_with("text/plain", || Err::<Vec<u8>, _>("oh noes!")).into(),
    ]);
    assert_eq!(err.to_string(), "part 2: body: oh noes!");
    assert!(matches!(err, Error::Part { position: 2, .. }));
}

#[test]
fn test_odd_header_count_is_part_error() {
    let err = build_err(vec![to(&["to@to.to"]).into(), headers(&[""]).into()]);
    assert_eq!(err.to_string(), "part 2: odd argument count");
}

#[test]
fn test_first_error_wins_before_validation() {
    let err = build_err(vec![headers(&["a"]).into(), to(&["broken"]).into()]);
    assert!(matches!(err, Error::Part { position: 1, .. }));
}

#[test]
fn test_missing_recipients_and_body() {
    let err = build_err(vec![text("x").into()]);
    assert!(matches!(err, Error::NoRecipients));
    assert_eq!(err.to_string(), "need at least one recipient");

    let err = build_err(vec![to(&["to@to.to"]).into()]);
    assert!(matches!(err, Error::NoBody));
    assert_eq!(err.to_string(), "need at least one body part");
}

#[test]
fn test_signed_requires_signer() {
    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        signed(vec![text("signed text")]).into(),
    ];
    let err = builder().build("Signed", &me(), parts).unwrap_err();
    assert!(matches!(err, Error::Signing(_)));
}

#[test]
fn test_signed_container_embeds_signature() {
    let signer = |content: &[u8]| -> Result<Vec<u8>, blackmail_mime::BoxError> {
        assert!(content.starts_with(b"Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(content.ends_with(b"signed text"));
        Ok(b"-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n".to_vec())
    };
    let parts: Vec<Part> = vec![
        to(&["to@to.to"]).into(),
        signed(vec![text("signed text")]).into(),
    ];
    let msg = builder()
        .with_signer(signer)
        .build("Signed", &me(), parts)
        .unwrap();
    let msg = String::from_utf8(msg.bytes).unwrap();
    assert!(msg.contains("Content-Type: multipart/signed; protocol=\"application/pgp-signature\""));
    assert!(msg.contains(
        "Content-Disposition: attachment; filename=\"signature.asc\"\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         Content-Type: application/pgp-signature; name=\"signature.asc\"\r\n\
         \r\n\
         -----BEGIN PGP SIGNATURE-----\r\nabc\r\n-----END PGP SIGNATURE-----\r\n"
    ));
}

#[test]
fn test_single_non_text_body_uses_mime() {
    let (msg, _) = render(
        "Calendar",
        vec![
            to(&["to@to.to"]).into(),
            body("application/json", b"{}".to_vec()).into(),
        ],
    );
    assert!(msg.contains("Mime-Version: 1.0\r\n"));
    assert!(msg.contains("Content-Transfer-Encoding: base64\r\nContent-Type: application/json\r\n\r\ne30=\r\n"));
}

#[test]
fn test_builder_is_shareable_across_threads() {
    let b = std::sync::Arc::new(builder());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let b = std::sync::Arc::clone(&b);
            std::thread::spawn(move || {
                let to_addr = format!("user{i}@example.com");
                let parts: Vec<Part> = vec![to(&[to_addr]).into(), text("hi").into()];
                b.build("x", &me(), parts).unwrap().recipients
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), vec![format!("user{i}@example.com")]);
    }
}

#[test]
fn test_bodies_part_is_flattened() {
    let (msg, _) = render(
        "Bodies",
        vec![
            to(&["to@to.to"]).into(),
            Part::Bodies(vec![BodyPart::new("text/plain", "a"), html("b")]),
        ],
    );
    assert!(msg.contains("Content-Type: multipart/alternative;\r\n"));
}
