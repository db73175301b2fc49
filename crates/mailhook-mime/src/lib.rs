//! # mailhook-mime
//!
//! MIME parsing and header decoding used by the mailhook listener.
//!
//! ## Features
//!
//! - **Message parsing**: Parse raw RFC 822 bytes into a tree of parts
//! - **Header decoding**: RFC 2047 encoded words in any charset `encoding_rs` knows
//! - **Transfer encodings**: Lenient Base64 and Quoted-Printable decoding
//! - **Body extraction**: Plain text first, markup-stripped HTML second
//! - **Attachments**: Content-Disposition and RFC 2231 filename parameters
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailhook_mime::{Message, decode_header};
//!
//! let raw = b"From: =?utf-8?B?SMOpbGxv?= <a@example.com>\r\n\
//!             Subject: Test\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = Message::parse(raw)?;
//! let sender = decode_header(message.from())?;
//! println!("{sender}: {}", message.body_text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod charset;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;
pub mod html;

pub use charset::{decode_lossy, lookup_charset};
pub use content_type::{ContentDisposition, ContentType};
pub use encoding::decode_header;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding, Walk};
