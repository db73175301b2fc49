//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::authenticated::select_mailbox;
use super::states::{Authenticated, Selected};
use super::{Client, Rejected};
use crate::command::{Command, has_line_break};
use crate::response::{Response, ResponseParser, UntaggedResponse};
use crate::{Error, Result};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the currently selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Returns the message count reported by the last SELECT.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.state.exists()
    }

    /// Selects a mailbox again (or a different one), refreshing the state.
    ///
    /// A failed SELECT closes the current mailbox, so the client comes back
    /// authenticated.
    pub async fn select(
        mut self,
        mailbox: &str,
    ) -> std::result::Result<Self, Rejected<Client<S, Authenticated>>> {
        match select_mailbox(&mut self, mailbox).await {
            Ok(exists) => {
                self.state = Selected::new(mailbox, exists);
                Ok(self)
            }
            Err(e) => Err(self.transition(Authenticated).rejected(e)),
        }
    }

    /// Searches the mailbox with raw criteria such as `UNSEEN`.
    ///
    /// Returns message sequence numbers in the order the server sent them.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        if criteria.trim().is_empty() || has_line_break(criteria) {
            return Err(Error::InvalidState(format!(
                "invalid search criteria: {criteria:?}"
            )));
        }

        let responses = self
            .execute(&Command::Search {
                criteria: criteria.to_string(),
            })
            .await?;

        let mut results = Vec::new();
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Search(ids))) =
                ResponseParser::parse(response_bytes)
            {
                results.extend(ids);
            }
        }

        tracing::debug!(criteria, count = results.len(), "search finished");
        Ok(results)
    }

    /// Fetches the complete message with the given sequence number.
    ///
    /// Uses `RFC822` rather than `BODY.PEEK[]`, so the server sets `\Seen`.
    pub async fn fetch_rfc822(&mut self, sequence: u32) -> Result<Vec<u8>> {
        let responses = self.execute(&Command::FetchRfc822 { sequence }).await?;

        responses
            .iter()
            .find_map(|bytes| match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::Fetch {
                    seq,
                    message: Some(message),
                })) if seq == sequence => Some(message),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol(format!("no message data for {sequence}")))
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        self.send_logout().await
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

    fn selected_script(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user pass\r\n")
            .read(b"A0000 OK done\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"A0001 OK done\r\n")
    }

    async fn selected(mock: tokio_test::io::Mock) -> Client<tokio_test::io::Mock, Selected> {
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        client.select("INBOX").await.unwrap()
    }

    #[tokio::test]
    async fn test_search_and_fetch() {
        let mock = selected_script(&mut Builder::new())
            .write(b"A0002 SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 2 3\r\n")
            .read(b"A0002 OK SEARCH completed\r\n")
            .write(b"A0003 FETCH 2 RFC822\r\n")
            .read(b"* 2 FETCH (RFC822 {15}\r\n")
            .read(b"Subject: hi\r\n\r\n")
            .read(b" FLAGS (\\Seen))\r\n")
            .read(b"A0003 OK FETCH completed\r\n")
            .build();

        let mut client = selected(mock).await;
        assert_eq!(client.mailbox(), "INBOX");
        assert_eq!(client.exists(), 3);

        assert_eq!(client.search("UNSEEN").await.unwrap(), vec![2, 3]);
        assert_eq!(client.fetch_rfc822(2).await.unwrap(), b"Subject: hi\r\n\r\n");
    }

    #[tokio::test]
    async fn test_fetch_without_message_data() {
        let mock = selected_script(&mut Builder::new())
            .write(b"A0002 FETCH 9 RFC822\r\n")
            .read(b"A0002 OK FETCH completed\r\n")
            .build();

        let mut client = selected(mock).await;
        let err = client.fetch_rfc822(9).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_search_rejects_injection() {
        let mock = selected_script(&mut Builder::new()).build();

        let mut client = selected(mock).await;
        assert!(client.search("UNSEEN\r\nA9 LOGOUT").await.is_err());
        assert!(client.search("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_reselect_refreshes_exists() {
        let mock = selected_script(&mut Builder::new())
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 5 EXISTS\r\n")
            .read(b"A0002 OK done\r\n")
            .write(b"A0003 LOGOUT\r\n")
            .read(b"* BYE bye\r\n")
            .read(b"A0003 OK LOGOUT completed\r\n")
            .build();

        let client = selected(mock).await;
        let client = client.select("INBOX").await.unwrap();
        assert_eq!(client.exists(), 5);
        client.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_reselect_falls_back_to_authenticated() {
        let mock = selected_script(&mut Builder::new())
            .write(b"A0002 SELECT Archive\r\n")
            .read(b"A0002 NO [NONEXISTENT] no such mailbox\r\n")
            .write(b"A0003 LOGOUT\r\n")
            .read(b"* BYE bye\r\n")
            .read(b"A0003 OK LOGOUT completed\r\n")
            .build();

        let client = selected(mock).await;
        let rejected = client.select("Archive").await.unwrap_err();
        assert!(matches!(rejected.error, Error::No(_)));
        rejected.client.logout().await.unwrap();
    }
}
