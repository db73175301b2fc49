//! IMAP command builder.
//!
//! Only the commands a polling listener issues are modelled.

mod serialize;
mod tag_generator;

pub use serialize::has_line_break;
pub use tag_generator::TagGenerator;

use serialize::write_astring;

/// IMAP command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// SEARCH command.
    Search {
        /// Search criteria, written verbatim (e.g. `UNSEEN`).
        criteria: String,
    },
    /// FETCH of the complete message (`RFC822`), which sets `\Seen`.
    FetchRfc822 {
        /// Message sequence number.
        sequence: u32,
    },
}

// The password must never reach logs
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capability => f.write_str("Capability"),
            Self::Logout => f.write_str("Logout"),
            Self::StartTls => f.write_str("StartTls"),
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Select { mailbox } => f.debug_struct("Select").field("mailbox", mailbox).finish(),
            Self::Search { criteria } => {
                f.debug_struct("Search").field("criteria", criteria).finish()
            }
            Self::FetchRfc822 { sequence } => f
                .debug_struct("FetchRfc822")
                .field("sequence", sequence)
                .finish(),
        }
    }
}

impl Command {
    /// Returns the command name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Search { .. } => "SEARCH",
            Self::FetchRfc822 { .. } => "FETCH",
        }
    }

    /// Serializes the command with the given tag, including the final CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                buf.extend_from_slice(criteria.trim().as_bytes());
            }

            Self::FetchRfc822 { sequence } => {
                buf.extend_from_slice(format!("FETCH {sequence} RFC822").as_bytes());
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
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
    fn test_capability_command() {
        assert_eq!(Command::Capability.serialize("A001"), b"A001 CAPABILITY\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@mail.ru".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize("A0000"),
            b"A0000 LOGIN user@mail.ru \"pass word\"\r\n"
        );
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{cmd:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_select_command() {
        let cmd = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(cmd.serialize("A0001"), b"A0001 SELECT INBOX\r\n");
    }

    #[test]
    fn test_search_criteria_verbatim() {
        let cmd = Command::Search {
            criteria: "UNSEEN FROM \"boss@example.com\"".to_string(),
        };
        assert_eq!(
            cmd.serialize("A0002"),
            b"A0002 SEARCH UNSEEN FROM \"boss@example.com\"\r\n"
        );
    }

    #[test]
    fn test_fetch_rfc822_command() {
        let cmd = Command::FetchRfc822 { sequence: 12 };
        assert_eq!(cmd.serialize("A0003"), b"A0003 FETCH 12 RFC822\r\n");
        assert_eq!(cmd.name(), "FETCH");
    }
}
