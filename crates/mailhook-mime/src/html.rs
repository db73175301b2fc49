//! HTML to plain text conversion.
//!
//! This is a tag stripper, not an HTML parser: block-level elements start a
//! new line, inline elements are dropped, `script` and `style` contents are
//! skipped and character references are unescaped. Each resulting line has
//! its whitespace collapsed and empty lines are omitted.

/// Elements that start a new line of text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section", "table",
    "tbody", "td", "tfoot", "th", "thead", "title", "tr", "ul",
];

/// Elements whose contents are not text.
const SKIPPED_TAGS: &[&str] = &["script", "style"];

/// Converts HTML markup to plain text lines joined with `\n`.
#[must_use]
pub fn to_text(html: &str) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        current.push_str(&unescape(&rest[..lt]));
        let markup = &rest[lt..];

        if let Some(comment) = markup.strip_prefix("<!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        // "<" not opening a tag is literal text
        if !markup[1..].starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!') {
            current.push('<');
            rest = &markup[1..];
            continue;
        }

        // An unterminated tag runs to the end of the input.
        let Some(gt) = markup.find('>') else {
            rest = "";
            break;
        };
        let tag = &markup[1..gt];
        rest = &markup[gt + 1..];

        let closing = tag.starts_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !closing && SKIPPED_TAGS.contains(&name.as_str()) {
            rest = skip_element(rest, &name);
            continue;
        }

        if BLOCK_TAGS.contains(&name.as_str()) {
            flush_line(&mut current, &mut lines);
        }
    }

    current.push_str(&unescape(rest));
    flush_line(&mut current, &mut lines);

    lines.join("\n")
}

/// Returns the input after the closing tag of `name`, or "" if it never closes.
fn skip_element<'a>(input: &'a str, name: &str) -> &'a str {
    let lower = input.to_ascii_lowercase();
    let close = format!("</{name}");
    lower
        .find(&close)
        .and_then(|start| input[start..].find('>').map(|end| &input[start + end + 1..]))
        .unwrap_or("")
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

/// Unescapes named and numeric character references.
///
/// Unknown references are kept literally.
#[must_use]
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];

        let decoded = candidate
            .get(1..candidate.len().min(12))
            .and_then(|window| window.find(';'))
            .and_then(|semi| {
                let entity = &candidate[1..=semi];
                decode_entity(entity).map(|c| (c, semi + 2))
            });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }

    Some(match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "mdash" => '—',
        "ndash" => '–',
        "hellip" => '…',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_markup_is_joined() {
        assert_eq!(to_text("<p>Hi <b>there</b></p>"), "Hi there");
    }

    #[test]
    fn test_blocks_become_lines() {
        let html = "<html><body><h1>Title</h1><div>First</div>\n<p>Second<br>Third</p></body></html>";
        assert_eq!(to_text(html), "Title\nFirst\nSecond\nThird");
    }

    #[test]
    fn test_script_and_style_are_skipped() {
        let html = "<style>p { color: red; }</style><p>Visible</p><SCRIPT>alert('x')</SCRIPT>";
        assert_eq!(to_text(html), "Visible");
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(to_text("<p>a<!-- hidden <b>x</b> -->b</p>"), "ab");
    }

    #[test]
    fn test_entities() {
        assert_eq!(to_text("<p>Fish &amp; chips &lt;3 &#233;&#x41;</p>"), "Fish & chips <3 éA");
        assert_eq!(unescape("AT&T; &bogus;"), "AT&T; &bogus;");
    }

    #[test]
    fn test_literal_less_than() {
        assert_eq!(to_text("<p>1 < 2</p>"), "1 < 2");
    }

    #[test]
    fn test_unterminated_tag_is_dropped() {
        assert_eq!(to_text("Hello <b"), "Hello");
        assert_eq!(to_text("<p>Hi</p>there <a href=\"x"), "Hi\nthere");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(to_text("  just text  "), "just text");
    }
}
