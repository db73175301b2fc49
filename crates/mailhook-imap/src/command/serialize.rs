//! Command serialization helpers.

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// Returns true if the text would break command framing.
#[must_use]
pub fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn astring(s: &str) -> String {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_atom_is_written_bare() {
        assert_eq!(astring("INBOX"), "INBOX");
        assert_eq!(astring("user@mail.ru"), "user@mail.ru");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        assert_eq!(astring(""), "\"\"");
        assert_eq!(astring("Sent Items"), "\"Sent Items\"");
        assert_eq!(astring("pa\"ss\\"), "\"pa\\\"ss\\\\\"");
        assert_eq!(astring("Входящие"), "\"Входящие\"");
    }

    #[test]
    fn test_line_break_detection() {
        assert!(has_line_break("UNSEEN\r\nA1 DELETE INBOX"));
        assert!(!has_line_break("UNSEEN FROM \"boss\""));
    }
}
