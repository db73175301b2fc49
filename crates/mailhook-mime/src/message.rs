//! MIME message structure and handling.

use std::fmt;

use crate::charset::decode_lossy;
use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::html;

/// Maximum multipart nesting accepted by the parser.
const MAX_DEPTH: usize = 32;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// MIME entity: headers, raw body and, for multipart types, child parts.
#[derive(Debug, Clone, Default)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body as transmitted (still transfer-encoded).
    pub body: Vec<u8>,
    /// Child parts (empty unless the content type is multipart).
    pub parts: Vec<Part>,
}

impl Part {
    /// Creates a new leaf part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            parts: Vec::new(),
        }
    }

    /// Parses a MIME entity from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart entity has no boundary or nesting is
    /// unreasonably deep.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_nested(raw, 0)
    }

    fn parse_nested(raw: &[u8], depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::Parse(format!(
                "multipart nesting deeper than {MAX_DEPTH}"
            )));
        }

        let (head, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head));
        let mut part = Self::new(headers, body.to_vec());

        let content_type = part.content_type();
        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            part.parts = split_multipart(body, boundary)
                .into_iter()
                .map(|child| Self::parse_nested(child, depth + 1))
                .collect::<Result<_>>()?;
        }

        Ok(part)
    }

    /// Gets the content type, defaulting to `text/plain` when the header is
    /// absent or unparseable.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Returns true if this part is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type().is_multipart()
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if a non-empty `Content-Disposition` header is present.
    #[must_use]
    pub fn has_disposition(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|v| !v.trim().is_empty())
    }

    /// Gets the parsed `Content-Disposition` header.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Returns the declared filename, still possibly RFC 2047 encoded.
    ///
    /// Looks at the disposition `filename` parameter first and falls back to
    /// the content type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        self.disposition()
            .and_then(|cd| cd.filename().map(str::to_string))
            .or_else(|| self.content_type().name().map(str::to_string))
            .filter(|name| !name.is_empty())
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// Base64 that cannot be decoded yields the raw body unchanged.
    #[must_use]
    pub fn decode_body(&self) -> Vec<u8> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => {
                decode_base64(&self.body).unwrap_or_else(|_| self.body.clone())
            }
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            _ => self.body.clone(),
        }
    }

    /// Gets the decoded body as text in the declared charset, replacing
    /// malformed sequences.
    #[must_use]
    pub fn text(&self) -> String {
        let content_type = self.content_type();
        decode_lossy(&self.decode_body(), content_type.charset())
    }

    /// Iterates over this part and all descendants, depth-first.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

/// Depth-first iterator over a part tree.
#[derive(Debug)]
pub struct Walk<'a> {
    stack: Vec<&'a Part>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Part;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.stack.pop()?;
        self.stack.extend(part.parts.iter().rev());
        Some(part)
    }
}

/// MIME message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    root: Part,
}

impl Message {
    /// Parses a complete RFC 822 message.
    ///
    /// # Errors
    ///
    /// Returns an error if the MIME structure is invalid.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(Self {
            root: Part::parse(raw)?,
        })
    }

    /// Returns the top-level entity.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Returns the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Gets the raw Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.root.headers.get("subject")
    }

    /// Gets the raw From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.root.headers.get("from")
    }

    /// Checks if this is a multipart message.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.root.is_multipart()
    }

    /// Iterates over every part, starting with the message itself.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        self.root.walk()
    }

    /// Finds the first part of the given type in depth-first order.
    #[must_use]
    pub fn find_part(&self, main: &str, sub: &str) -> Option<&Part> {
        self.walk().find(|part| part.content_type().is(main, sub))
    }

    /// Extracts a best-effort plain text body.
    ///
    /// - multipart: the first `text/plain` part; otherwise the first
    ///   `text/html` part with markup stripped; otherwise an empty string.
    /// - single part: the payload itself, whatever its type.
    #[must_use]
    pub fn body_text(&self) -> String {
        if !self.is_multipart() {
            return self.root.text();
        }

        if let Some(part) = self.find_part("text", "plain") {
            return part.text();
        }

        self.find_part("text", "html")
            .map(|part| html::to_text(&part.text()))
            .unwrap_or_default()
    }
}

/// Splits an entity into header block and body at the first empty line.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&raw[..0], body);
    }
    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&raw[..0], body);
    }

    let mut search_from = 0;
    while let Some(offset) = raw[search_from..].iter().position(|&b| b == b'\n') {
        let line_end = search_from + offset + 1;
        let rest = &raw[line_end..];
        if let Some(body) = rest.strip_prefix(b"\r\n") {
            return (&raw[..line_end], body);
        }
        if let Some(body) = rest.strip_prefix(b"\n") {
            return (&raw[..line_end], body);
        }
        search_from = line_end;
    }

    (raw, &raw[raw.len()..])
}

/// Splits a multipart body into the raw bytes of each part.
///
/// Preamble and epilogue are dropped. The line break preceding a delimiter
/// belongs to the delimiter. A missing close delimiter is tolerated.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |offset| pos + offset);
        let line = trim_line_end(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter)
            && (rest.is_empty() || rest == b"--")
        {
            if let Some(start) = current {
                parts.push(&body[start..strip_trailing_break(body, start, pos)]);
            }
            if rest == b"--" {
                return parts;
            }
            current = Some((line_end + 1).min(body.len()));
        }

        pos = line_end + 1;
    }

    if let Some(start) = current {
        parts.push(&body[start..]);
    }
    parts
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// Returns `end` moved back over one CRLF or LF, never before `start`.
fn strip_trailing_break(body: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
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

    const MIXED: &[u8] = b"From: sender@example.com\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
This is the preamble.\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hello <b>HTML</b></p>\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Hello caf=C3=A9\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n\
epilogue\r\n";

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_parse_single_part() {
        let raw = b"From: sender@example.com\r\nSubject: Test\r\n\r\nHello, World!";
        let message = Message::parse(raw).unwrap();

        assert_eq!(message.from(), Some("sender@example.com"));
        assert_eq!(message.subject(), Some("Test"));
        assert!(!message.is_multipart());
        assert_eq!(message.body_text(), "Hello, World!");
    }

    #[test]
    fn test_parse_lf_only() {
        let raw = b"Subject: Test\n\nLine one\nLine two\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject(), Some("Test"));
        assert_eq!(message.body_text(), "Line one\nLine two\n");
    }

    #[test]
    fn test_parse_nested_multipart() {
        let message = Message::parse(MIXED).unwrap();
        assert!(message.is_multipart());
        assert_eq!(message.root().parts.len(), 2);
        assert_eq!(message.root().parts[0].parts.len(), 2);

        let types: Vec<String> = message.walk().map(|p| p.content_type().essence()).collect();
        assert_eq!(
            types,
            vec![
                "multipart/mixed",
                "multipart/alternative",
                "text/html",
                "text/plain",
                "application/pdf"
            ]
        );
    }

    #[test]
    fn test_body_prefers_plain_over_earlier_html() {
        let message = Message::parse(MIXED).unwrap();
        assert_eq!(message.body_text(), "Hello café");
    }

    #[test]
    fn test_body_html_only() {
        let raw = b"Content-Type: multipart/alternative; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Hi <b>there</b></p>\r\n\
--b--\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.body_text(), "Hi there");
    }

    #[test]
    fn test_body_multipart_without_text_is_empty() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: image/png\r\n\
\r\n\
PNG\r\n\
--b--\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.body_text(), "");
    }

    #[test]
    fn test_attachment_part() {
        let message = Message::parse(MIXED).unwrap();
        let pdf = message.find_part("application", "pdf").unwrap();

        assert!(pdf.has_disposition());
        assert_eq!(pdf.filename().as_deref(), Some("report.pdf"));
        assert_eq!(pdf.decode_body(), b"%PDF-1.4\n");
    }

    #[test]
    fn test_missing_boundary() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        assert!(matches!(Message::parse(raw), Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_missing_close_delimiter_tolerated() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\nonly part";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.root().parts.len(), 1);
        assert_eq!(message.root().parts[0].body, b"only part");
    }

    #[test]
    fn test_body_charset_conversion() {
        let raw = b"Content-Type: text/plain; charset=windows-1251\r\n\r\n\xCF\xF0\xE8\xE2\xE5\xF2";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.body_text(), "Привет");
    }

    #[test]
    fn test_filename_falls_back_to_content_type_name() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "application/zip; name=\"data.zip\"");
        headers.add("Content-Disposition", "attachment");
        let part = Part::new(headers, Vec::new());
        assert_eq!(part.filename().as_deref(), Some("data.zip"));
    }

    #[test]
    fn test_split_header_body_without_separator() {
        let (head, body) = split_header_body(b"Subject: only headers\r\n");
        assert_eq!(head, b"Subject: only headers\r\n");
        assert!(body.is_empty());
    }
}
