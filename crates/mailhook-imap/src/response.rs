//! IMAP response parser.
//!
//! Understands the subset of RFC 9051 responses the client acts on: status
//! responses (tagged and untagged), `CAPABILITY`, `SEARCH`, `EXISTS` and the
//! message literal of a `FETCH`. Everything else parses as
//! [`UntaggedResponse::Other`].

#![allow(clippy::missing_errors_doc)]

use crate::{Error, Result};

/// Status condition of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed or not allowed.
    Bad,
    /// Connection is already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: String,
        /// Response status.
        status: Status,
        /// Human-readable text, without any response code.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation(String),
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK/NO/BAD/PREAUTH/BYE [code] text`.
    Status {
        /// Status condition.
        status: Status,
        /// Bracketed response code, e.g. `CAPABILITY IMAP4rev1 IDLE`.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`, capability names uppercased.
    Capability(Vec<String>),
    /// `* SEARCH ...` message numbers in server order.
    Search(Vec<u32>),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* n FETCH (...)`.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Full message from an `RFC822` or `BODY[]` item, if present.
        message: Option<Vec<u8>>,
    },
    /// Any other untagged response, kept as text.
    Other(String),
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response as produced by
    /// [`FramedStream::read_response`](crate::FramedStream::read_response).
    pub fn parse(input: &[u8]) -> Result<Response> {
        let (first, rest) = split_word(input);
        if first.is_empty() {
            return Err(parse_error(0, "empty response"));
        }

        match first {
            b"*" => Self::parse_untagged(rest, input.len() - rest.len()),
            b"+" => Ok(Response::Continuation(line_text(rest))),
            tag => {
                let (word, text) = split_word(rest);
                let status = std::str::from_utf8(word)
                    .ok()
                    .and_then(Status::parse)
                    .ok_or_else(|| parse_error(tag.len() + 1, "expected status after tag"))?;
                let (_, text) = split_code(text);
                Ok(Response::Tagged {
                    tag: String::from_utf8_lossy(tag).into_owned(),
                    status,
                    text,
                })
            }
        }
    }

    fn parse_untagged(input: &[u8], offset: usize) -> Result<Response> {
        let (word, rest) = split_word(input);
        let word_str = String::from_utf8_lossy(word);

        if let Some(status) = Status::parse(&word_str) {
            let (code, text) = split_code(rest);
            return Ok(Response::Untagged(UntaggedResponse::Status { status, code, text }));
        }

        let untagged = if word_str.eq_ignore_ascii_case("CAPABILITY") {
            UntaggedResponse::Capability(
                line_text(rest)
                    .split_ascii_whitespace()
                    .map(str::to_ascii_uppercase)
                    .collect(),
            )
        } else if word_str.eq_ignore_ascii_case("SEARCH") {
            UntaggedResponse::Search(parse_search(rest))
        } else if let Ok(number) = word_str.parse::<u32>() {
            let (kind, data) = split_word(rest);
            match String::from_utf8_lossy(kind).to_ascii_uppercase().as_str() {
                "EXISTS" => UntaggedResponse::Exists(number),
                "FETCH" => UntaggedResponse::Fetch {
                    seq: number,
                    message: fetch_message(data),
                },
                "" => return Err(parse_error(offset + word.len(), "expected keyword after number")),
                _ => UntaggedResponse::Other(line_text(input)),
            }
        } else {
            UntaggedResponse::Other(line_text(input))
        };

        Ok(Response::Untagged(untagged))
    }
}

/// Extracts the capability list from a `[CAPABILITY ...]` response code.
#[must_use]
pub(crate) fn capabilities_from_code(code: &str) -> Option<Vec<String>> {
    let (name, list) = code.split_once(' ').unwrap_or((code, ""));
    name.eq_ignore_ascii_case("CAPABILITY").then(|| {
        list.split_ascii_whitespace()
            .map(str::to_ascii_uppercase)
            .collect()
    })
}

fn parse_error(position: usize, message: &str) -> Error {
    Error::Parse {
        position,
        message: message.to_string(),
    }
}

/// Splits off the first space-delimited word.
fn split_word(input: &[u8]) -> (&[u8], &[u8]) {
    let input = trim_line_end(input);
    match input.iter().position(|&b| b == b' ') {
        Some(pos) => (&input[..pos], &input[pos + 1..]),
        None => (input, &input[input.len()..]),
    }
}

fn trim_line_end(input: &[u8]) -> &[u8] {
    let input = input.strip_suffix(b"\n").unwrap_or(input);
    input.strip_suffix(b"\r").unwrap_or(input)
}

fn line_text(input: &[u8]) -> String {
    String::from_utf8_lossy(trim_line_end(input)).trim().to_string()
}

/// Separates a leading `[code]` from the response text.
fn split_code(input: &[u8]) -> (Option<String>, String) {
    let text = line_text(input);
    if let Some(inner) = text.strip_prefix('[')
        && let Some(end) = inner.find(']')
    {
        let code = inner[..end].to_string();
        let rest = inner[end + 1..].trim().to_string();
        return (Some(code), rest);
    }
    (None, text)
}

/// Parses the numbers of a SEARCH response, skipping modifiers such as
/// `(MODSEQ 123)`.
fn parse_search(input: &[u8]) -> Vec<u32> {
    let text = line_text(input);
    let mut depth = 0usize;
    let mut ids = Vec::new();

    for token in text.split_ascii_whitespace() {
        let opens = token.matches('(').count();
        let closes = token.matches(')').count();
        if depth == 0
            && opens == 0
            && let Ok(id) = token.parse()
        {
            ids.push(id);
        }
        depth = (depth + opens).saturating_sub(closes);
    }

    ids
}

/// Finds the message carried by an `RFC822` or `BODY[]` fetch item.
fn fetch_message(data: &[u8]) -> Option<Vec<u8>> {
    [b"RFC822 ".as_slice(), b"BODY[] ".as_slice()]
        .into_iter()
        .find_map(|item| {
            let start = find_ignore_case(data, item)? + item.len();
            item_value(&data[start..])
        })
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Reads an nstring: a literal, a quoted string or NIL.
fn item_value(input: &[u8]) -> Option<Vec<u8>> {
    match input.first()? {
        b'{' => {
            let close = input.iter().position(|&b| b == b'}')?;
            let digits = &input[1..close];
            let digits = digits.strip_suffix(b"+").unwrap_or(digits);
            let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
            let after = &input[close + 1..];
            let body = after
                .strip_prefix(b"\r\n")
                .or_else(|| after.strip_prefix(b"\n"))?;
            body.get(..len).map(<[u8]>::to_vec)
        }
        b'"' => {
            let mut out = Vec::new();
            let mut escaped = false;
            for &b in &input[1..] {
                match (escaped, b) {
                    (false, b'\\') => escaped = true,
                    (false, b'"') => return Some(out),
                    _ => {
                        out.push(b);
                        escaped = false;
                    }
                }
            }
            None
        }
        _ => None,
    }
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
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_tagged_ok() {
        let parsed = ResponseParser::parse(b"A0001 OK [READ-WRITE] SELECT completed\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Tagged {
                tag: "A0001".to_string(),
                status: Status::Ok,
                text: "SELECT completed".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tagged_no() {
        let parsed =
            ResponseParser::parse(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
                .unwrap();
        assert!(matches!(
            parsed,
            Response::Tagged { status: Status::No, ref text, .. } if text == "Invalid credentials"
        ));
    }

    #[test]
    fn test_parse_tagged_garbage_status() {
        let err = ResponseParser::parse(b"A0000 MAYBE\r\n").unwrap_err();
        assert!(matches!(err, Error::Parse { position: 6, .. }));
    }

    #[test]
    fn test_parse_empty() {
        assert!(ResponseParser::parse(b"\r\n").is_err());
    }

    #[test]
    fn test_parse_greeting_with_capabilities() {
        let parsed =
            ResponseParser::parse(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] ready\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Status { status, code, text }) = parsed else {
            panic!("expected untagged status");
        };
        assert_eq!(status, Status::Ok);
        assert_eq!(text, "ready");
        assert_eq!(
            capabilities_from_code(&code.unwrap()),
            Some(vec!["IMAP4REV1".to_string(), "STARTTLS".to_string()])
        );
    }

    #[test]
    fn test_parse_capability() {
        let parsed = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Untagged(UntaggedResponse::Capability(vec![
                "IMAP4REV1".to_string(),
                "IDLE".to_string()
            ]))
        );
    }

    #[test]
    fn test_parse_search() {
        let parsed = ResponseParser::parse(b"* SEARCH 2 5 9\r\n").unwrap();
        assert_eq!(parsed, Response::Untagged(UntaggedResponse::Search(vec![2, 5, 9])));

        let parsed = ResponseParser::parse(b"* SEARCH\r\n").unwrap();
        assert_eq!(parsed, Response::Untagged(UntaggedResponse::Search(vec![])));

        let parsed = ResponseParser::parse(b"* SEARCH 3 4 (MODSEQ 917162500)\r\n").unwrap();
        assert_eq!(parsed, Response::Untagged(UntaggedResponse::Search(vec![3, 4])));
    }

    #[test]
    fn test_parse_exists() {
        let parsed = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
        assert_eq!(parsed, Response::Untagged(UntaggedResponse::Exists(23)));
    }

    #[test]
    fn test_parse_fetch_literal() {
        let raw = b"* 7 FETCH (FLAGS (\\Seen) RFC822 {11}\r\nSubject: x\n)\r\n";
        let parsed = ResponseParser::parse(raw).unwrap();
        assert_eq!(
            parsed,
            Response::Untagged(UntaggedResponse::Fetch {
                seq: 7,
                message: Some(b"Subject: x\n".to_vec()),
            })
        );
    }

    #[test]
    fn test_parse_fetch_body_quoted_and_nil() {
        let parsed = ResponseParser::parse(b"* 1 FETCH (BODY[] \"a \\\"b\\\"\")\r\n").unwrap();
        assert!(matches!(
            parsed,
            Response::Untagged(UntaggedResponse::Fetch { message: Some(ref m), .. }) if m == b"a \"b\""
        ));

        let parsed = ResponseParser::parse(b"* 1 FETCH (RFC822 NIL)\r\n").unwrap();
        assert!(matches!(
            parsed,
            Response::Untagged(UntaggedResponse::Fetch { message: None, .. })
        ));
    }

    #[test]
    fn test_parse_fetch_flags_only() {
        let parsed = ResponseParser::parse(b"* 3 FETCH (FLAGS (\\Seen) RFC822.SIZE 44)\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Untagged(UntaggedResponse::Fetch { seq: 3, message: None })
        );
    }

    #[test]
    fn test_parse_continuation_and_other() {
        assert_eq!(
            ResponseParser::parse(b"+ go ahead\r\n").unwrap(),
            Response::Continuation("go ahead".to_string())
        );
        assert_eq!(
            ResponseParser::parse(b"* 4 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other("4 RECENT".to_string()))
        );
        assert_eq!(
            ResponseParser::parse(b"* FLAGS (\\Seen \\Answered)\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other("FLAGS (\\Seen \\Answered)".to_string()))
        );
    }

    proptest! {
        #[test]
        fn prop_search_ids_preserved(ids in proptest::collection::vec(1u32.., 0..50)) {
            let mut line = String::from("* SEARCH");
            for id in &ids {
                line.push(' ');
                line.push_str(&id.to_string());
            }
            line.push_str("\r\n");

            let parsed = ResponseParser::parse(line.as_bytes()).unwrap();
            prop_assert_eq!(parsed, Response::Untagged(UntaggedResponse::Search(ids)));
        }
    }
}
