//! Implementation for the not-authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::{Client, Rejected};
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator, has_line_break};
use crate::connection::framed::FramedStream;
use crate::connection::{Config, ImapStream, Security, connect_plain, connect_tls};
use crate::response::{Response, ResponseParser, Status, UntaggedResponse, capabilities_from_code};
use crate::{Error, Result};

impl Client<ImapStream, NotAuthenticated> {
    /// Opens a session as described by `config`: TCP connect, TLS according
    /// to the security mode and the server greeting, all bounded by the
    /// connect timeout.
    pub async fn connect(config: &Config) -> Result<Self> {
        let establish = async {
            match config.security {
                Security::Implicit => {
                    let stream = connect_tls(&config.host, config.port).await?;
                    Self::from_stream(stream).await
                }
                Security::StartTls => {
                    let stream = connect_plain(&config.host, config.port).await?;
                    Self::from_stream(stream).await?.starttls(&config.host).await
                }
                Security::None => {
                    let stream = connect_plain(&config.host, config.port).await?;
                    Self::from_stream(stream).await
                }
            }
        };

        let client = tokio::time::timeout(config.connect_timeout, establish)
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        tracing::info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "connected"
        );
        Ok(client)
    }

    /// Upgrades the connection with STARTTLS and refreshes the capabilities,
    /// which the server may change once the channel is encrypted.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if !self.capabilities.is_empty() && !self.has_capability("STARTTLS") {
            return Err(Error::InvalidState(
                "server does not advertise STARTTLS".to_string(),
            ));
        }
        self.execute(&Command::StartTls).await?;

        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(stream),
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            state: NotAuthenticated,
        };
        client.capability().await?;
        Ok(client)
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting and any capabilities it carries.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let capabilities = match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Ok | Status::PreAuth,
                code,
                ..
            }) => code
                .as_deref()
                .and_then(capabilities_from_code)
                .unwrap_or_default(),
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {}",
                    String::from_utf8_lossy(&greeting).trim_end()
                )));
            }
        };

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success. A NO
    /// completion is reported as [`Error::Auth`]; on any failure the
    /// unauthenticated client comes back inside [`Rejected`].
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> std::result::Result<Client<S, Authenticated>, Rejected<Self>> {
        if self.has_capability("LOGINDISABLED") {
            let error = Error::Auth("LOGIN is disabled by the server".to_string());
            return Err(self.rejected(error));
        }
        if has_line_break(username) || has_line_break(password) {
            let error = Error::Auth("credentials contain line breaks".to_string());
            return Err(self.rejected(error));
        }

        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let responses = match self.execute(&command).await {
            Ok(responses) => responses,
            Err(Error::No(text)) => return Err(self.rejected(Error::Auth(text))),
            Err(e) => return Err(self.rejected(e)),
        };
        self.update_capabilities(&responses);

        tracing::debug!(username, "logged in");
        Ok(self.transition(Authenticated))
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
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_greeting_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] ready\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.has_capability("LOGINDISABLED"));

        let err = client.login("user", "pass").await.unwrap_err();
        assert!(matches!(err.error, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();

        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(ref text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user@mail.ru secret\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE\r\n")
            .read(b"A0000 OK LOGIN completed\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user@mail.ru", "secret").await.unwrap();
        assert!(client.has_capability("IDLE"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err.error, Error::Auth(ref text) if text == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_rejected_login_can_still_log_out() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user wrong\r\n")
            .read(b"A0000 NO Invalid credentials\r\n")
            .write(b"A0001 LOGOUT\r\n")
            .read(b"* BYE logging out\r\n")
            .read(b"A0001 OK LOGOUT completed\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let rejected = client.login("user", "wrong").await.unwrap_err();
        rejected.client.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejects_line_breaks() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();

        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "a\r\nA1 DELETE INBOX").await.unwrap_err();
        assert!(matches!(err.error, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_logout_tolerates_hangup() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGOUT\r\n")
            .read(b"* BYE logging out\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        client.logout().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        // Accepts the TCP connection but never sends a greeting
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder("127.0.0.1")
            .port(port)
            .security(Security::None)
            .connect_timeout(Duration::from_secs(3))
            .build();

        let err = Client::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(3)));
        drop(listener);
    }
}
