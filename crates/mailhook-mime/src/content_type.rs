//! MIME content type and disposition handling.

use std::collections::HashMap;

use crate::charset::decode_lossy;
use crate::error::{Error, Result};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates the implicit `text/plain` type used when none is declared.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns true if this type is `main/sub` (case-insensitive).
    #[must_use]
    pub fn is(&self, main: &str, sub: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main) && self.sub_type.eq_ignore_ascii_case(sub)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the legacy `name` parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));

        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;

        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: parse_parameters(params),
        })
    }
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased (e.g., "attachment", "inline").
    pub disposition: String,
    /// Parameters with RFC 2231 continuations already joined and decoded.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition header value. Never fails; unknown input yields
    /// whatever could be read.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        Self {
            disposition: kind.trim().to_lowercase(),
            parameters: parse_parameters(params),
        }
    }

    /// Returns true for `attachment` dispositions.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition == "attachment"
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}

/// A single RFC 2231 parameter section: index, extended flag, raw value.
type Section = (u32, bool, String);

/// Parses `; key=value` parameter lists.
///
/// Handles quoted strings (including `;` inside quotes) and RFC 2231
/// extended/continued parameters (`filename*=utf-8''...`, `name*0=...`).
fn parse_parameters(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut sections: HashMap<String, Vec<Section>> = HashMap::new();

    for segment in split_unquoted(input, ';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());

        if let Some((name, rest)) = key.split_once('*') {
            let extended = rest.is_empty() || rest.ends_with('*');
            let index = rest.trim_end_matches('*');
            let index = if index.is_empty() {
                0
            } else {
                match index.parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                }
            };
            sections
                .entry(name.to_string())
                .or_default()
                .push((index, extended, value));
        } else if !key.is_empty() {
            params.insert(key, value);
        }
    }

    // Extended forms win over plain ones
    for (name, mut parts) in sections {
        parts.sort_by_key(|(index, _, _)| *index);
        params.insert(name, join_sections(&parts));
    }

    params
}

/// Joins RFC 2231 sections, percent-decoding extended ones.
fn join_sections(sections: &[Section]) -> String {
    let mut charset: Option<&str> = None;
    let mut bytes = Vec::new();

    for (i, (_, extended, value)) in sections.iter().enumerate() {
        if !extended {
            bytes.extend_from_slice(value.as_bytes());
            continue;
        }

        let mut text = value.as_str();
        if i == 0 {
            let mut pieces = text.splitn(3, '\'');
            if let (Some(cs), Some(_language), Some(rest)) =
                (pieces.next(), pieces.next(), pieces.next())
            {
                if !cs.is_empty() {
                    charset = Some(cs);
                }
                text = rest;
            }
        }
        bytes.extend(percent_decode(text));
    }

    decode_lossy(&bytes, charset)
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = s.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Splits on `sep` outside double quotes.
fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' && in_quotes {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Removes surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; charset=utf-8").unwrap();
        assert_eq!(ct.essence(), "text/plain");
        assert!(ct.is("text", "plain"));
        assert!(ct.is_text());
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_content_type_parse_semicolon_inside_quotes() {
        let ct = ContentType::parse("application/pdf; name=\"a;b.pdf\"; x=1").unwrap();
        assert_eq!(ct.name(), Some("a;b.pdf"));
        assert_eq!(ct.parameters.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("garbage").is_err());
        assert!(ContentType::parse("text/").is_err());
    }

    #[test]
    fn test_disposition_filename() {
        let cd = ContentDisposition::parse("Attachment; filename=\"report.PDF\"");
        assert!(cd.is_attachment());
        assert_eq!(cd.filename(), Some("report.PDF"));
    }

    #[test]
    fn test_disposition_rfc2231_extended() {
        let cd = ContentDisposition::parse("attachment; filename*=utf-8''%D0%BE%D1%82%D1%87%D0%B5%D1%82.pdf");
        assert_eq!(cd.filename(), Some("отчет.pdf"));
    }

    #[test]
    fn test_disposition_rfc2231_continuation() {
        let cd = ContentDisposition::parse(
            "attachment; filename*0=\"long_\"; filename*1=\"name.zip\"",
        );
        assert_eq!(cd.filename(), Some("long_name.zip"));
    }

    #[test]
    fn test_disposition_without_parameters() {
        let cd = ContentDisposition::parse("inline");
        assert_eq!(cd.disposition, "inline");
        assert_eq!(cd.filename(), None);
    }
}
