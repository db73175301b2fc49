//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::charset::lookup_charset;
use crate::error::Result;

/// Base64 engine that tolerates missing or superfluous padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes Base64 data, ignoring embedded whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed. Escapes that are not followed by two hex
/// digits are kept literally.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        match data.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            Some(&[hi, lo]) => {
                if let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) {
                    result.push((hi << 4) | lo);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            _ => {
                // Soft break right before the end of input
                if matches!(data.get(i + 1), Some(b'\n' | b'\r')) {
                    i = data.len();
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
        }
    }

    result
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// A parsed `=?charset?encoding?text?=` token.
struct EncodedWord<'a> {
    charset: &'a str,
    encoding: u8,
    text: &'a str,
}

/// Parses an encoded word at the start of `input`.
///
/// Returns the word and the number of bytes it spans.
fn parse_encoded_word(input: &str) -> Option<(EncodedWord<'_>, usize)> {
    let rest = input.strip_prefix("=?")?;
    let charset_end = rest.find('?')?;
    let charset = &rest[..charset_end];
    if charset.contains(char::is_whitespace) {
        return None;
    }

    let after = &rest[charset_end + 1..];
    let encoding = match after.as_bytes() {
        [enc @ (b'B' | b'b' | b'Q' | b'q'), b'?', ..] => enc.to_ascii_uppercase(),
        _ => return None,
    };

    let text_rest = &after[2..];
    let text_end = text_rest.find("?=")?;
    let consumed = 2 + charset_end + 1 + 2 + text_end + 2;

    Some((
        EncodedWord {
            charset,
            encoding,
            text: &text_rest[..text_end],
        },
        consumed,
    ))
}

/// Decodes the payload of an encoded word.
///
/// Returns `Ok(None)` if the payload itself is malformed Base64, in which case
/// the caller keeps the word literally.
fn decode_encoded_word(word: &EncodedWord<'_>) -> Result<Option<String>> {
    let encoding = lookup_charset(word.charset)?;

    let bytes = if word.encoding == b'B' {
        match decode_base64(word.text.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        }
    } else {
        let underscored: Vec<u8> = word
            .text
            .bytes()
            .map(|b| if b == b'_' { b' ' } else { b })
            .collect();
        decode_quoted_printable(&underscored)
    };

    let (text, _had_errors) = encoding.decode_without_bom_handling(&bytes);
    Ok(Some(text.into_owned()))
}

/// Decodes a header value that may contain RFC 2047 encoded words.
///
/// Each encoded word is decoded with its declared charset, UTF-8 when the
/// label is empty. Malformed bytes become U+FFFD. Whitespace separating two
/// adjacent encoded words is dropped; all other text is kept verbatim.
///
/// Absent or empty input yields an empty string.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownCharset`] if an encoded word names a
/// charset that is not recognized.
pub fn decode_header(value: Option<&str>) -> Result<String> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(String::new());
    };

    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(idx) = rest.find("=?") {
        let (before, candidate) = rest.split_at(idx);

        let decoded = match parse_encoded_word(candidate) {
            Some((word, consumed)) => decode_encoded_word(&word)?.map(|text| (text, consumed)),
            None => None,
        };

        match decoded {
            Some((text, consumed)) => {
                if !(after_word && before.chars().all(char::is_whitespace)) {
                    result.push_str(before);
                }
                result.push_str(&text);
                rest = &candidate[consumed..];
                after_word = true;
            }
            None => {
                result.push_str(before);
                result.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::Error;
    use proptest::prelude::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_missing_padding() {
        let decoded = decode_base64(b"SGk").unwrap();
        assert_eq!(decoded, b"Hi");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!"), b"Hello, World!");
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_bad_escape_kept() {
        assert_eq!(decode_quoted_printable(b"a=ZZb"), b"a=ZZb");
        assert_eq!(decode_quoted_printable(b"end="), b"end=");
    }

    #[test]
    fn test_decode_header_absent() {
        assert_eq!(decode_header(None).unwrap(), "");
        assert_eq!(decode_header(Some("")).unwrap(), "");
    }

    #[test]
    fn test_decode_header_base64() {
        assert_eq!(decode_header(Some("=?utf-8?B?SMOpbGxv?=")).unwrap(), "Héllo");
    }

    #[test]
    fn test_decode_header_q_encoding() {
        assert_eq!(
            decode_header(Some("=?utf-8?Q?H=C3=A9llo_world?=")).unwrap(),
            "Héllo world"
        );
    }

    #[test]
    fn test_decode_header_mixed_charsets() {
        // "Привет" in koi8-r followed by "Héllo" in utf-8
        let value = "=?koi8-r?B?8NLJ18XU?= =?utf-8?B?SMOpbGxv?=";
        assert_eq!(decode_header(Some(value)).unwrap(), "ПриветHéllo");
    }

    #[test]
    fn test_decode_header_keeps_plain_text_between_words() {
        let value = "Re: =?utf-8?Q?caf=C3=A9?= menu";
        assert_eq!(decode_header(Some(value)).unwrap(), "Re: café menu");
    }

    #[test]
    fn test_decode_header_display_name_and_address() {
        let value = "=?utf-8?B?0JjQstCw0L0=?= <ivan@example.com>";
        assert_eq!(
            decode_header(Some(value)).unwrap(),
            "Иван <ivan@example.com>"
        );
    }

    #[test]
    fn test_decode_header_empty_charset_defaults_to_utf8() {
        assert_eq!(decode_header(Some("=??B?SMOpbGxv?=")).unwrap(), "Héllo");
    }

    #[test]
    fn test_decode_header_replaces_bad_bytes() {
        // 0xFF is never valid UTF-8
        assert_eq!(decode_header(Some("=?utf-8?Q?ok=FF?=")).unwrap(), "ok\u{FFFD}");
    }

    #[test]
    fn test_decode_header_unknown_charset() {
        let err = decode_header(Some("=?x-klingon?B?SGk=?=")).unwrap_err();
        assert!(matches!(err, Error::UnknownCharset(_)));
    }

    #[test]
    fn test_decode_header_malformed_word_is_literal() {
        assert_eq!(decode_header(Some("=?utf-8?X?abc?=")).unwrap(), "=?utf-8?X?abc?=");
        assert_eq!(decode_header(Some("price =? 5")).unwrap(), "price =? 5");
    }

    proptest! {
        #[test]
        fn prop_plain_ascii_header_unchanged(value in "[ -<>-~]{0,80}") {
            prop_assert_eq!(decode_header(Some(&value)).unwrap(), value);
        }
    }
}
