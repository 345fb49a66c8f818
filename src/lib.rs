//! An asynchronous IMAP client engine ([RFC 3501](https://tools.ietf.org/html/rfc3501) and a few
//! extensions).
//!
//! Commands are pipelined: every [`Client`] method writes its command right away and hands back a
//! [`Listener`] future for the outcome, so several commands can be in flight at once. Untagged
//! responses are passed to every outstanding command and to the handlers registered with
//! [`Connection::add_response_handler`], in the order the server sent them.
//!
//! The protocol state lives in a [`Connection`], which does no I/O itself. An [`ImapStream`]
//! drives a connection over an async socket and must be polled alongside the code using the
//! client, typically with `futures::join!` on a single task.
//!
//! To connect, use the [`connect`] function, or [`Client::new`] for a stream you set up yourself.
//!
//! ```no_run
//! use async_imap_engine::error::Result;
//! use async_imap_engine::imap_proto::{AttributeValue, Response};
//!
//! async fn fetch_inbox_top() -> Result<Option<Vec<u8>>> {
//!     let (client, stream) = async_imap_engine::connect("imap.example.com", 993, true).await?;
//!
//!     let session = async {
//!         client.greeting().await?;
//!         client.login("me@example.com", "password")?.await?;
//!
//!         // SELECT and FETCH are sent without waiting for each other
//!         client.select("INBOX")?;
//!         let messages = client.fetch("1", "RFC822")?.await?;
//!
//!         // be nice to the server and log out
//!         client.logout()?.await?;
//!         Ok::<_, async_imap_engine::error::Error>(messages)
//!     };
//!     let (driven, messages) = futures::join!(stream.run(), session);
//!     driven?;
//!
//!     let messages = messages?;
//!     let body = messages.first().and_then(|reply| match reply.parsed() {
//!         Response::Fetch(_, attributes) => attributes.iter().find_map(|attr| match attr {
//!             AttributeValue::Rfc822(Some(body)) => Some(body.to_vec()),
//!             _ => None,
//!         }),
//!         _ => None,
//!     });
//!     Ok(body)
//! }
//! ```
#![warn(missing_docs)]
#![deny(rust_2018_idioms, unsafe_code)]

// Reexport imap_proto for easier access.
pub use imap_proto;

pub mod authenticator;
mod client;
mod config;
pub mod connection;
pub mod continuation;
pub mod error;
pub mod extensions;
pub mod formatter;
mod imap_stream;
pub mod listener;
mod parse;
mod sender;
pub mod types;
pub mod utf7;

pub use crate::authenticator::{Authenticator, Authenticators, Credentials};
pub use crate::client::*;
pub use crate::config::Config;
pub use crate::connection::{Connection, Transport};
pub use crate::imap_stream::{ChannelTransport, ImapStream, LineAssembler};
pub use crate::listener::Listener;

#[cfg(test)]
mod mock_stream;
