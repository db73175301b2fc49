//! Header block parsing.

/// Headers of one MIME entity, in the order they appeared.
///
/// Lookups ignore case. Values are unfolded but not decoded; see
/// [`crate::decode_header`].
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value of the named header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of the named header, in order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the block has no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a header block up to the first empty line.
    ///
    /// Continuation lines (leading space or tab) are joined to the previous
    /// header with a single space. Lines that are neither a `Name: value`
    /// pair nor a continuation are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();

        for line in text.lines().take_while(|line| !line.is_empty()) {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.entries.last_mut() {
                    let folded = line.trim();
                    if !folded.is_empty() {
                        value.push(' ');
                        value.push_str(folded);
                    }
                }
                continue;
            }

            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    headers.add(name.trim(), value.trim());
                }
                // A stray line also ends any folding.
                _ => headers.entries.push((String::new(), String::new())),
            }
        }

        headers.entries.retain(|(name, _)| !name.is_empty());
        headers
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
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut headers = Headers::new();
        assert!(headers.is_empty());

        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("Subject"), None);
    }

    #[test]
    fn test_value_outlives_lookup_name() {
        let headers = Headers::parse("Subject: hello\r\n");
        let value = {
            let name = String::from("SUBJECT").to_lowercase();
            headers.get(&name)
        };
        assert_eq!(value, Some("hello"));
    }

    #[test]
    fn test_repeated_headers_keep_order() {
        let headers = Headers::parse("Received: from a\r\nX: y\r\nReceived: from b\r\n");
        let received: Vec<&str> = headers.values("received").collect();
        assert_eq!(received, vec!["from a", "from b"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_parse_stops_at_blank_line() {
        let text = "From: sender@example.com\r\n\
                    Subject: Test Message\r\n\
                    Content-Type: text/plain;\r\n \
                    charset=utf-8\r\n\
                    \r\n\
                    Body: not a header\r\n";

        let headers = Headers::parse(text);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(headers.get("Body"), None);
    }

    #[test]
    fn test_folded_encoded_words() {
        let text = "Subject: =?utf-8?B?SMOpbGxv?=\r\n\t=?utf-8?B?SMOpbGxv?=\r\n";
        assert_eq!(
            Headers::parse(text).get("subject"),
            Some("=?utf-8?B?SMOpbGxv?= =?utf-8?B?SMOpbGxv?=")
        );
    }

    #[test]
    fn test_garbage_line_breaks_folding() {
        let text = "Subject: one\r\nnot a header\r\n two\r\nFrom: a@b\r\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.get("subject"), Some("one"));
        assert_eq!(headers.get("from"), Some("a@b"));
    }
}
