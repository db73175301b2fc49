//! Error types for the listener.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can end a listener run or fail its construction.
///
/// Protocol failures are tagged with the step that produced them.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the server.
    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),

    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] TransportError),

    /// Mailbox could not be selected.
    #[error("Cannot select mailbox {mailbox:?}: {source}")]
    Mailbox {
        /// Mailbox name from the configuration.
        mailbox: String,
        /// Underlying transport failure.
        source: TransportError,
    },

    /// SEARCH failed.
    #[error("Search failed: {0}")]
    Search(#[source] TransportError),

    /// A message could not be fetched.
    #[error("Fetching message {id} failed: {source}")]
    Fetch {
        /// Message sequence number.
        id: u32,
        /// Underlying transport failure.
        source: TransportError,
    },

    /// Message structure could not be parsed.
    #[error("Malformed message: {0}")]
    Parse(#[source] mailhook_mime::Error),

    /// A header used an unknown charset.
    #[error("Cannot decode header: {0}")]
    Decode(#[source] mailhook_mime::Error),

    /// An attachment could not be written to disk.
    #[error("Cannot write attachment {path:?}: {source}")]
    AttachmentWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// A registered handler returned an error.
    #[error("Handler #{index} failed: {source}")]
    Handler {
        /// Position of the handler in registration order.
        index: usize,
        /// Error returned by the handler.
        source: anyhow::Error,
    },

    /// The run was interrupted (for example by Ctrl-C).
    #[error("Stopped by user")]
    UserStopped,

    /// The download directory does not exist and cannot be created.
    #[error("Download directory {path:?} is unusable: {source}")]
    DownloadDir {
        /// Configured directory.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
