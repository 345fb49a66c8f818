//! IMAP error types.

use std::io::Error as IoError;
use std::sync::Arc;

use base64::DecodeError;

/// A convenience wrapper around `Result` for `async_imap_engine::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A set of errors that can occur in the IMAP client.
///
/// Errors are `Clone` because a single connection failure is delivered to every command that is
/// still outstanding at that moment.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    #[error("io: {0}")]
    Io(Arc<IoError>),
    /// A BAD response from the IMAP server.
    #[error("bad response: {0}")]
    Bad(String),
    /// A NO response from the IMAP server.
    #[error("no response: {0}")]
    No(String),
    /// The server said BYE without being asked to log out.
    #[error("bye response: {0}")]
    Bye(String),
    /// The connection was terminated unexpectedly.
    #[error("connection lost")]
    ConnectionLost,
    /// Error parsing a server response.
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    /// Command arguments could not be serialized.
    #[error("format: {0}")]
    Format(#[from] FormatError),
    /// The server sent a continuation request while nothing was waiting for one.
    #[error("unexpected continuation response from server")]
    UnexpectedContinuation,
    /// The server completed a command that was never sent on this connection.
    #[error("tagged response for unknown command: {0}")]
    UnknownTag(String),
    /// No authenticator is registered under the requested mechanism name.
    #[error("unknown authentication mechanism: {0}")]
    UnknownMechanism(String),
    /// The local authenticator could not answer the server's challenge.
    #[error("authentication: {0}")]
    Authentication(String),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// An error occured while trying to parse a server response.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ParseError {
    /// The line could not be parsed as an IMAP response.
    #[error("unable to parse response: {0:?}")]
    Invalid(Vec<u8>),
    /// The server sent a line longer than the client is willing to buffer.
    #[error("incoming data too large: {0} bytes")]
    TooLarge(usize),
    /// The client could not find or decode the server's authentication challenge.
    #[error("unable to parse authentication response: {0} - {1:?}")]
    Authentication(String, Option<DecodeError>),
    /// A mailbox name was not valid modified UTF-7.
    #[error("invalid modified UTF-7 mailbox name: {0}")]
    Utf7(String),
}

/// An argument could not be turned into IMAP wire syntax.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// IMAP numbers are unsigned 32-bit integers.
    #[error("number out of range: {0}")]
    NumberOutOfRange(i128),
}
