//! Turns a raw message into an [`EmailRecord`].

use mailhook_mime::{Message, decode_header};

use crate::attachment::AttachmentExtractor;
use crate::error::{Error, Result};
use crate::record::EmailRecord;

/// Parses `raw`, saves accepted attachments and decodes the headers and body.
///
/// Attachments are written before the headers are decoded, in the order
/// their parts appear in the message. Every non-multipart part carrying a
/// `Content-Disposition` header is offered to the extractor.
///
/// # Errors
///
/// - [`Error::Parse`] if the MIME structure is invalid.
/// - [`Error::Decode`] if Subject, From or a filename uses an unknown charset.
/// - [`Error::AttachmentWrite`] if an attachment cannot be written.
pub async fn assemble(raw: &[u8], extractor: &AttachmentExtractor) -> Result<EmailRecord> {
    let message = Message::parse(raw).map_err(Error::Parse)?;

    let mut attachment_paths = Vec::new();
    for part in message
        .walk()
        .filter(|part| !part.is_multipart() && part.has_disposition())
    {
        if let Some(path) = extractor.save(part).await? {
            attachment_paths.push(path);
        }
    }

    let title = decode_header(message.subject()).map_err(Error::Decode)?;
    let sender = decode_header(message.from()).map_err(Error::Decode)?;

    Ok(EmailRecord {
        title,
        sender,
        body: message.body_text(),
        attachment_paths,
    })
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
    use std::path::PathBuf;

    use super::*;
    use crate::config::normalize_extensions;

    fn extractor(name: &str, extensions: &[&str]) -> AttachmentExtractor {
        let dir = std::env::temp_dir().join(format!(
            "mailhook-assemble-{name}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        AttachmentExtractor::new(dir, normalize_extensions(extensions))
    }

    const MIXED: &[u8] = b"From: =?koi8-r?B?98HT0Q==?= <vasya@example.ru>\r\n\
Subject: =?utf-8?Q?=D0=A1=D1=87=D0=B5=D1=82?= 42\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain body\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Html body</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer\r\n\
Content-Type: image/png\r\n\
Content-Disposition: attachment; filename=\"logo.png\"\r\n\
\r\n\
png\r\n\
--outer\r\n\
Content-Type: application/zip\r\n\
Content-Disposition: attachment; filename=\"docs.ZIP\"\r\n\
\r\n\
PK\r\n\
--outer--\r\n";

    #[tokio::test]
    async fn test_assembles_mixed_message() {
        let extractor = extractor("mixed", &[".pdf", ".zip"]);
        let record = assemble(MIXED, &extractor).await.unwrap();

        assert_eq!(record.title, "Счет 42");
        assert_eq!(record.sender, "Вася <vasya@example.ru>");
        assert_eq!(record.body.trim_end(), "Plain body");

        let names: Vec<PathBuf> = record
            .attachment_paths
            .iter()
            .map(|p| PathBuf::from(p.file_name().unwrap()))
            .collect();
        assert_eq!(names, vec![PathBuf::from("invoice.pdf"), PathBuf::from("docs.ZIP")]);
        assert_eq!(
            std::fs::read(&record.attachment_paths[0]).unwrap(),
            b"%PDF-1.4\n"
        );
    }

    #[tokio::test]
    async fn test_extension_set_selects_attachments() {
        let extractor = extractor("png-only", &["png"]);
        let record = assemble(MIXED, &extractor).await.unwrap();

        assert_eq!(record.attachment_paths.len(), 1);
        assert!(record.attachment_paths[0].ends_with("logo.png"));
        assert_eq!(std::fs::read(&record.attachment_paths[0]).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_html_only_body() {
        let raw = b"Subject: hi\r\n\
Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Hi <b>there</b></p>\r\n\
--b--\r\n";

        let record = assemble(raw, &extractor("html", &[])).await.unwrap();
        assert_eq!(record.body, "Hi there");
        assert!(record.attachment_paths.is_empty());
    }

    #[tokio::test]
    async fn test_missing_headers_are_empty() {
        let record = assemble(b"\r\njust a body", &extractor("bare", &[]))
            .await
            .unwrap();
        assert_eq!(record.title, "");
        assert_eq!(record.sender, "");
        assert_eq!(record.body, "just a body");
    }

    #[tokio::test]
    async fn test_unknown_subject_charset() {
        let raw = b"Subject: =?x-unknown?Q?hi?=\r\n\r\nbody";
        let err = assemble(raw, &extractor("charset", &[])).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_multipart_without_boundary() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        let err = assemble(raw, &extractor("boundary", &[])).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
