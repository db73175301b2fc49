//! Mail transport seam.
//!
//! The listener only talks to a [`Connector`] and the [`MailSession`] it
//! yields. [`ImapConnector`] implements both on top of `mailhook-imap`;
//! tests substitute in-memory implementations.

#![allow(async_fn_in_trait)]
#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use mailhook_imap::{
    Authenticated, Client, Config as ImapConfig, ImapStream, NotAuthenticated, Rejected, Selected,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{ListenerConfig, Security};

/// Failure reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Error from the IMAP client.
    #[error(transparent)]
    Imap(#[from] mailhook_imap::Error),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Opens sessions with a mail server.
pub trait Connector {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Connects to `host:port` and waits for the server greeting.
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Session, TransportError>;
}

/// An open session with a mail server.
pub trait MailSession {
    /// Logs in with the given credentials.
    async fn authenticate(&mut self, user: &str, secret: &str) -> Result<(), TransportError>;

    async fn select(&mut self, mailbox: &str) -> Result<(), TransportError>;

    async fn search(&mut self, criterion: &str) -> Result<Vec<u32>, TransportError>;

    /// Fetches the full RFC 822 message with the given id, marking it seen.
    async fn fetch(&mut self, id: u32) -> Result<Vec<u8>, TransportError>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<(), TransportError>;
}

/// [`Connector`] backed by the IMAP client.
#[derive(Debug, Clone, Copy)]
pub struct ImapConnector {
    security: Security,
    connect_timeout: Duration,
}

impl ImapConnector {
    /// Creates a connector with the given security mode and timeout.
    #[must_use]
    pub const fn new(security: Security, connect_timeout: Duration) -> Self {
        Self {
            security,
            connect_timeout,
        }
    }

    /// Creates a connector from the listener configuration.
    #[must_use]
    pub const fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config.security, config.connect_timeout)
    }
}

impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, host: &str, port: u16) -> Result<ImapSession, TransportError> {
        let config = ImapConfig::builder(host)
            .port(port)
            .security(self.security.into())
            .connect_timeout(self.connect_timeout)
            .build();

        let client = Client::connect(&config).await?;
        Ok(ImapSession::new(client))
    }
}

/// Where the wrapped client currently is in the IMAP state machine.
enum ImapState<S> {
    Closed,
    Connected(Client<S, NotAuthenticated>),
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
}

/// [`MailSession`] over a type-state IMAP client.
///
/// The client is moved between states as commands succeed. A refused LOGIN
/// or SELECT leaves it in the state the server reports, so a later retry or
/// [`MailSession::logout`] still reaches the server.
pub struct ImapSession<S = ImapStream> {
    state: ImapState<S>,
}

impl<S> std::fmt::Debug for ImapSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ImapState::Closed => "Closed",
            ImapState::Connected(_) => "Connected",
            ImapState::Authenticated(_) => "Authenticated",
            ImapState::Selected(_) => "Selected",
        };
        f.debug_struct("ImapSession").field("state", &state).finish()
    }
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a freshly connected client.
    #[must_use]
    pub const fn new(client: Client<S, NotAuthenticated>) -> Self {
        Self {
            state: ImapState::Connected(client),
        }
    }

    fn selected(&mut self) -> Result<&mut Client<S, Selected>, TransportError> {
        match &mut self.state {
            ImapState::Selected(client) => Ok(client),
            _ => Err(TransportError::Other("no mailbox selected".to_string())),
        }
    }
}

impl<S> MailSession for ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn authenticate(&mut self, user: &str, secret: &str) -> Result<(), TransportError> {
        match std::mem::replace(&mut self.state, ImapState::Closed) {
            ImapState::Connected(client) => match client.login(user, secret).await {
                Ok(client) => {
                    self.state = ImapState::Authenticated(client);
                    Ok(())
                }
                Err(Rejected { client, error }) => {
                    self.state = ImapState::Connected(client);
                    Err(error.into())
                }
            },
            other => {
                self.state = other;
                Err(TransportError::Other("session is not awaiting login".to_string()))
            }
        }
    }

    async fn select(&mut self, mailbox: &str) -> Result<(), TransportError> {
        let outcome = match std::mem::replace(&mut self.state, ImapState::Closed) {
            ImapState::Authenticated(client) => client.select(mailbox).await,
            ImapState::Selected(client) => client.select(mailbox).await,
            other => {
                self.state = other;
                return Err(TransportError::Other("session is not logged in".to_string()));
            }
        };

        match outcome {
            Ok(client) => {
                self.state = ImapState::Selected(client);
                Ok(())
            }
            Err(Rejected { client, error }) => {
                self.state = ImapState::Authenticated(client);
                Err(error.into())
            }
        }
    }

    async fn search(&mut self, criterion: &str) -> Result<Vec<u32>, TransportError> {
        Ok(self.selected()?.search(criterion).await?)
    }

    async fn fetch(&mut self, id: u32) -> Result<Vec<u8>, TransportError> {
        Ok(self.selected()?.fetch_rfc822(id).await?)
    }

    async fn logout(&mut self) -> Result<(), TransportError> {
        match std::mem::replace(&mut self.state, ImapState::Closed) {
            ImapState::Closed => Ok(()),
            ImapState::Connected(client) => Ok(client.logout().await?),
            ImapState::Authenticated(client) => Ok(client.logout().await?),
            ImapState::Selected(client) => Ok(client.logout().await?),
        }
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

    async fn session(mock: tokio_test::io::Mock) -> ImapSession<tokio_test::io::Mock> {
        ImapSession::new(Client::from_stream(mock).await.unwrap())
    }

    #[tokio::test]
    async fn test_session_walks_imap_states() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 OK done\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 1\r\n")
            .read(b"A0002 OK done\r\n")
            .write(b"A0003 FETCH 1 RFC822\r\n")
            .read(b"* 1 FETCH (RFC822 {4}\r\nab\r\n)\r\n")
            .read(b"A0003 OK done\r\n")
            .write(b"A0004 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\n")
            .read(b"A0004 OK done\r\n")
            .write(b"A0005 LOGOUT\r\n")
            .read(b"* BYE\r\n")
            .read(b"A0005 OK done\r\n")
            .build();

        let mut session = session(mock).await;
        session.authenticate("user", "secret").await.unwrap();
        session.select("INBOX").await.unwrap();
        assert_eq!(session.search("UNSEEN").await.unwrap(), vec![1]);
        assert_eq!(session.fetch(1).await.unwrap(), b"ab\r\n");
        session.select("INBOX").await.unwrap();
        session.logout().await.unwrap();

        // Already closed.
        session.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_search_before_select() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 OK done\r\n")
            .build();

        let mut session = session(mock).await;
        session.authenticate("user", "secret").await.unwrap();

        let err = session.search("UNSEEN").await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[tokio::test]
    async fn test_rejected_login_still_logs_out() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .write(b"A0001 LOGOUT\r\n")
            .read(b"* BYE\r\n")
            .read(b"A0001 OK done\r\n")
            .build();

        let mut session = session(mock).await;
        let err = session.authenticate("user", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Imap(mailhook_imap::Error::Auth(_))
        ));

        assert!(format!("{session:?}").contains("Connected"));
        session.logout().await.unwrap();
        assert!(format!("{session:?}").contains("Closed"));
    }

    #[tokio::test]
    async fn test_refused_select_still_logs_out() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 OK done\r\n")
            .write(b"A0001 SELECT Missing\r\n")
            .read(b"A0001 NO [NONEXISTENT] Unknown mailbox\r\n")
            .write(b"A0002 LOGOUT\r\n")
            .read(b"* BYE\r\n")
            .read(b"A0002 OK done\r\n")
            .build();

        let mut session = session(mock).await;
        session.authenticate("user", "secret").await.unwrap();

        let err = session.select("Missing").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Imap(mailhook_imap::Error::No(_))
        ));
        session.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_can_be_retried() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 OK done\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"A0001 NO [UNAVAILABLE] busy\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\n")
            .read(b"A0002 OK done\r\n")
            .write(b"A0003 SEARCH UNSEEN\r\n")
            .read(b"* SEARCH\r\n")
            .read(b"A0003 OK done\r\n")
            .build();

        let mut session = session(mock).await;
        session.authenticate("user", "secret").await.unwrap();

        assert!(session.select("INBOX").await.is_err());
        session.select("INBOX").await.unwrap();
        assert!(session.search("UNSEEN").await.unwrap().is_empty());
    }
}
