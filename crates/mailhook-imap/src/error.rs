//! Client errors.

use std::time::Duration;

use thiserror::Error;

/// Failure of an IMAP exchange.
///
/// The `No`, `Bad` and `Bye` variants carry the text of the server's status
/// response; `Auth` is a refused LOGIN.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or TLS stream failure.
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The host name is not usable for TLS verification.
    #[error("host is not a valid TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A response line could not be parsed.
    #[error("malformed response at byte {position}: {message}")]
    Parse {
        /// Offset into the line.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// LOGIN was refused or not possible.
    #[error("login refused: {0}")]
    Auth(String),

    /// Tagged NO completion.
    #[error("server said NO: {0}")]
    No(String),

    /// Tagged BAD completion.
    #[error("server said BAD: {0}")]
    Bad(String),

    /// The server is closing the connection.
    #[error("server said BYE: {0}")]
    Bye(String),

    /// Connecting took longer than the configured limit.
    #[error("no server greeting within {0:?}")]
    Timeout(Duration),

    /// The command cannot be issued in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The server broke the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
