//! Charset lookup and conversion.

use encoding_rs::{Encoding, UTF_8};

use crate::error::{Error, Result};

/// Resolves a MIME charset label to an encoding.
///
/// An empty label and ASCII labels mean UTF-8. An RFC 2231 language suffix
/// (`utf-8*en`) is ignored.
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if the label is not recognized.
pub fn lookup_charset(label: &str) -> Result<&'static Encoding> {
    let label = label.split('*').next().unwrap_or_default().trim();
    // 8-bit text labelled as ASCII is UTF-8 far more often than anything else
    if label.is_empty()
        || label.eq_ignore_ascii_case("us-ascii")
        || label.eq_ignore_ascii_case("ascii")
    {
        return Ok(UTF_8);
    }
    Encoding::for_label(label.as_bytes()).ok_or_else(|| Error::UnknownCharset(label.to_string()))
}

/// Decodes bytes in the given charset, replacing malformed sequences with U+FFFD.
///
/// Unknown or missing charsets fall back to UTF-8.
#[must_use]
pub fn decode_lossy(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| lookup_charset(label).ok())
        .unwrap_or(UTF_8);
    let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_labels() {
        assert_eq!(lookup_charset("utf-8").unwrap(), UTF_8);
        assert_eq!(lookup_charset("UTF-8").unwrap(), UTF_8);
        assert_eq!(lookup_charset("").unwrap(), UTF_8);
        assert_eq!(lookup_charset("utf-8*en").unwrap(), UTF_8);
        assert_eq!(lookup_charset("koi8-r").unwrap().name(), "KOI8-R");
    }

    #[test]
    fn test_lookup_unknown_label() {
        let err = lookup_charset("x-no-such-charset").unwrap_err();
        assert!(matches!(err, Error::UnknownCharset(ref l) if l == "x-no-such-charset"));
    }

    #[test]
    fn test_decode_lossy_replaces_garbage() {
        assert_eq!(decode_lossy(b"ok\xFF", Some("utf-8")), "ok\u{FFFD}");
    }

    #[test]
    fn test_decode_lossy_windows_1251() {
        // "Привет" in windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode_lossy(&bytes, Some("windows-1251")), "Привет");
    }

    #[test]
    fn test_decode_lossy_unknown_falls_back() {
        assert_eq!(decode_lossy("héllo".as_bytes(), Some("bogus")), "héllo");
    }
}
