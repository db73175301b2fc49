//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::{Client, Rejected};
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::response::{Response, ResponseParser, UntaggedResponse};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    ///
    /// Consumes self and returns a selected client on success. A refused
    /// SELECT hands the client back unchanged.
    pub async fn select(
        mut self,
        mailbox: &str,
    ) -> std::result::Result<Client<S, Selected>, Rejected<Self>> {
        match select_mailbox(&mut self, mailbox).await {
            Ok(exists) => Ok(self.transition(Selected::new(mailbox, exists))),
            Err(e) => Err(self.rejected(e)),
        }
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        self.send_logout().await
    }
}

/// Runs SELECT and returns the EXISTS count from its responses.
pub(super) async fn select_mailbox<S, State>(
    client: &mut Client<S, State>,
    mailbox: &str,
) -> Result<u32>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let responses = client
        .execute(&Command::Select {
            mailbox: mailbox.to_string(),
        })
        .await?;

    let exists = responses
        .iter()
        .rev()
        .find_map(|bytes| match ResponseParser::parse(bytes) {
            Ok(Response::Untagged(UntaggedResponse::Exists(n))) => Some(n),
            _ => None,
        })
        .unwrap_or(0);

    tracing::debug!(mailbox, exists, "mailbox selected");
    Ok(exists)
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
    use crate::Error;

    fn login_script(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user pass\r\n")
            .read(b"A0000 OK done\r\n")
    }

    #[tokio::test]
    async fn test_select_reads_exists() {
        let mock = login_script(&mut Builder::new())
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* FLAGS (\\Seen \\Answered)\r\n")
            .read(b"* 17 EXISTS\r\n")
            .read(b"* 0 RECENT\r\n")
            .read(b"A0001 OK [READ-WRITE] SELECT completed\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        let selected = client.select("INBOX").await.unwrap();

        assert_eq!(selected.state.mailbox(), "INBOX");
        assert_eq!(selected.state.exists(), 17);
    }

    #[tokio::test]
    async fn test_select_missing_mailbox() {
        let mock = login_script(&mut Builder::new())
            .write(b"A0001 SELECT \"No Such\"\r\n")
            .read(b"A0001 NO [NONEXISTENT] Unknown mailbox\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        let err = client.select("No Such").await.unwrap_err();

        assert!(matches!(err.error, Error::No(ref text) if text == "Unknown mailbox"));
    }

    #[tokio::test]
    async fn test_select_retry_after_refusal() {
        let mock = login_script(&mut Builder::new())
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"A0001 NO [UNAVAILABLE] try again\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 4 EXISTS\r\n")
            .read(b"A0002 OK done\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        let rejected = client.select("INBOX").await.unwrap_err();
        let selected = rejected.client.select("INBOX").await.unwrap();

        assert_eq!(selected.state.exists(), 4);
    }
}
