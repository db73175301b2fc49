//! # mailhook-imap
//!
//! A small async IMAP client covering what a polling listener needs:
//! connect (implicit TLS, STARTTLS or plaintext), LOGIN, SELECT, SEARCH,
//! FETCH of whole messages and LOGOUT.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailhook_imap::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> mailhook_imap::Result<()> {
//!     let config = Config::builder("imap.example.com").build();
//!     let client = Client::connect(&config).await?;
//!
//!     // A refused LOGIN or SELECT hands the client back inside
//!     // `Rejected`, so the caller can still log out.
//!     let client = client.login("user@example.com", "password").await?;
//!     let mut inbox = client.select("INBOX").await?;
//!
//!     for seq in inbox.search("UNSEEN").await? {
//!         let raw = inbox.fetch_rfc822(seq).await?;
//!         println!("message {seq}: {} bytes", raw.len());
//!     }
//!
//!     inbox.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! The client uses the type-state pattern so that only commands valid in the
//! current IMAP state can be issued:
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── select() ───→ Selected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │      Selected       │ ─── select() ───→ Selected
//! └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command serialization and tag generation
//! - [`connection`]: streams, framing and the type-state client
//! - [`response`]: parser for the responses the client consumes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, FramedStream, ImapStream, NotAuthenticated,
    Rejected, ResponseAccumulator, Security, Selected,
};
pub use error::{Error, Result};
pub use response::{Response, ResponseParser, Status, UntaggedResponse};
