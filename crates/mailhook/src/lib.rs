//! # mailhook
//!
//! Polls an IMAP mailbox and turns every new email into an
//! [`EmailRecord`] for registered handlers.
//!
//! ## Features
//!
//! - **Polling**: SELECT, SEARCH and FETCH on an interval over one session
//! - **Decoding**: RFC 2047 headers in any charset, plain text or stripped HTML bodies
//! - **Attachments**: saved to disk when their extension is accepted
//! - **Handlers**: ordered callbacks with configurable failure handling
//! - **Stopping**: cooperative stop or interrupt between cycles
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use mailhook::{ImapConnector, Listener, ListenerConfig};
//!
//! let config = ListenerConfig::builder("ivan@mail.ru", "app password")
//!     .accepted_extensions(["pdf", "xlsx"])
//!     .build();
//!
//! let mut listener = Listener::new(config.clone(), ImapConnector::from_config(&config)).await?;
//! listener.on_new_email(|email| {
//!     println!("{} from {}", email.title, email.sender);
//!     Ok(())
//! });
//!
//! listener.start(Duration::from_secs(5)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod assemble;
pub mod attachment;
pub mod config;
mod error;
pub mod handler;
pub mod listener;
mod record;
pub mod transport;

pub use assemble::assemble;
pub use attachment::AttachmentExtractor;
pub use config::{FailurePolicy, HandlerFailure, ListenerConfig, ListenerConfigBuilder, Security};
pub use error::{Error, Result};
pub use handler::{Handler, HandlerRegistry};
pub use listener::{Listener, SessionState, StopHandle};
pub use record::EmailRecord;
pub use transport::{Connector, ImapConnector, ImapSession, MailSession, TransportError};
