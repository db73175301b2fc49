//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time.
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: Initial state after connection
//! - `Authenticated`: After successful LOGIN
//! - `Selected`: After successful SELECT
//!
//! Each state only exposes methods that are valid for that state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, TagGenerator};
use crate::response::{Response, ResponseParser, Status, UntaggedResponse};
use crate::{Error, Result};

/// IMAP client connection with type-state.
///
/// The type parameter `State` tracks the connection state at compile time.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<String>,
    pub(crate) state: State,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A state transition the server refused.
///
/// The connection is still open, so the client is handed back in the state
/// it was left in. Converts into the underlying [`Error`] for use with `?`.
pub struct Rejected<C> {
    /// The client, still usable (at least for LOGOUT).
    pub client: C,
    /// Why the transition failed.
    pub error: Error,
}

impl<C> std::fmt::Debug for Rejected<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<C> From<Rejected<C>> for Error {
    fn from(rejected: Rejected<C>) -> Self {
        rejected.error
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities, uppercased.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Checks if the server advertised a capability (case-insensitive).
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Sends a CAPABILITY command and updates the stored capabilities.
    pub async fn capability(&mut self) -> Result<Vec<String>> {
        let responses = self.execute(&Command::Capability).await?;
        self.update_capabilities(&responses);
        Ok(self.capabilities.clone())
    }

    /// Sends a command and reads its responses up to the tagged completion,
    /// which must be OK. The tagged response is included as the last element.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tag_gen.next_tag();
        tracing::debug!(tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let responses = ResponseAccumulator::new(tag.as_str())
            .read_until_tagged(&mut self.stream)
            .await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(responses)
    }

    /// Sends LOGOUT and waits for the completion, tolerating a server that
    /// hangs up right after its BYE.
    pub(crate) async fn send_logout(&mut self) -> Result<()> {
        let tag = self.tag_gen.next_tag();
        self.stream
            .write_command(&Command::Logout.serialize(&tag))
            .await?;

        match ResponseAccumulator::new(tag.as_str())
            .read_until_tagged(&mut self.stream)
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Replaces the capability list from any untagged CAPABILITY response.
    pub(crate) fn update_capabilities(&mut self, responses: &[Vec<u8>]) {
        for response_bytes in responses {
            if let Ok(Response::Untagged(UntaggedResponse::Capability(caps))) =
                ResponseParser::parse(response_bytes)
            {
                self.capabilities = caps;
            }
        }
    }

    /// Wraps an error together with this client.
    pub(crate) fn rejected(self, error: Error) -> Rejected<Self> {
        Rejected {
            client: self,
            error,
        }
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            state,
        }
    }

    /// Checks that the tagged response is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        for response_bytes in responses.iter().rev() {
            if let Ok(Response::Tagged {
                tag: resp_tag,
                status,
                text,
            }) = ResponseParser::parse(response_bytes)
                && resp_tag == tag
            {
                return match status {
                    Status::Ok | Status::PreAuth => Ok(()),
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    Status::Bye => Err(Error::Bye(text)),
                };
            }
        }

        Err(Error::Protocol("missing tagged response".to_string()))
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
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_capability_refresh() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\n")
            .read(b"A0000 OK done\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        assert!(client.capabilities().is_empty());

        let caps = client.capability().await.unwrap();
        assert_eq!(caps.len(), 3);
        assert!(client.has_capability("idle"));
        assert!(client.has_capability("AUTH=PLAIN"));
    }

    #[tokio::test]
    async fn test_bad_completion_is_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 CAPABILITY\r\n")
            .read(b"A0000 BAD unknown command\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let err = client.capability().await.unwrap_err();
        assert!(matches!(err, Error::Bad(ref text) if text == "unknown command"));
    }

    #[test]
    fn test_missing_tagged_response() {
        let responses = vec![b"* OK still going\r\n".to_vec()];
        let err = Client::<tokio_test::io::Mock, NotAuthenticated>::check_tagged_ok(
            &responses, "A0000",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
