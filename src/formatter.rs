//! Serialization of command arguments into IMAP wire syntax.
//!
//! Formatting produces a list of [`Token`]s. Plain tokens can be written straight away; literal
//! tokens carry a payload that may only be sent once the server has answered the `{size}`
//! announcement with a continuation request; [`Connection`](crate::Connection) takes care of that.
//!
//! Formatting is done completely before anything is written, so an argument that cannot be
//! serialized is reported to the caller and no partial command ever reaches the wire.

use chrono::{Datelike, Timelike};

use crate::error::{FormatError, Result};
use crate::types::{Argument, Command};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A piece of formatted output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bytes that can be sent immediately.
    Bytes(Vec<u8>),
    /// A payload to send after the server's continuation request.
    Literal(Vec<u8>),
}

/// How a string argument is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Empty,
    Atom,
    Quoted,
    Literal,
}

fn encoding_of(s: &[u8]) -> Encoding {
    if s.is_empty() {
        return Encoding::Empty;
    }
    if s.iter().any(|&b| b >= 0x80 || b == b'\r' || b == b'\n') {
        return Encoding::Literal;
    }
    if s.iter().any(|&b| {
        matches!(b, b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b'\\') || b < 0x20 || b == 0x7f
    }) {
        return Encoding::Quoted;
    }
    Encoding::Atom
}

#[derive(Debug, Default)]
struct Formatter {
    tokens: Vec<Token>,
}

impl Formatter {
    fn put(&mut self, bytes: &[u8]) {
        if let Some(Token::Bytes(last)) = self.tokens.last_mut() {
            last.extend_from_slice(bytes);
        } else {
            self.tokens.push(Token::Bytes(bytes.to_vec()));
        }
    }

    fn literal(&mut self, bytes: &[u8]) {
        self.tokens.push(Token::Literal(bytes.to_vec()));
    }

    fn argument(&mut self, arg: &Argument) -> Result<()> {
        match arg {
            Argument::Nil => self.put(b"NIL"),
            Argument::Str(s) => self.string(s),
            Argument::Number(n) => self.number(*n)?,
            Argument::List(items) => {
                self.put(b"(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.put(b" ");
                    }
                    self.argument(item)?;
                }
                self.put(b")");
            }
            Argument::Time(t) => {
                let s = format!(
                    "\"{:2}-{}-{:04} {:02}:{:02}:{:02} +0000\"",
                    t.day(),
                    MONTHS[t.month0() as usize],
                    t.year(),
                    t.hour(),
                    t.minute(),
                    t.second()
                );
                self.put(s.as_bytes());
            }
            Argument::Flag(name) => {
                self.put(b"\\");
                self.put(name.as_bytes());
            }
            Argument::Raw(text) => self.put(text.as_bytes()),
            Argument::Literal(bytes) => self.literal(bytes),
        }
        Ok(())
    }

    fn string(&mut self, s: &[u8]) {
        match encoding_of(s) {
            Encoding::Empty => self.put(b"\"\""),
            Encoding::Literal => self.literal(s),
            Encoding::Quoted => {
                let mut quoted = Vec::with_capacity(s.len() + 2);
                quoted.push(b'"');
                for &b in s {
                    if b == b'"' || b == b'\\' {
                        quoted.push(b'\\');
                    }
                    quoted.push(b);
                }
                quoted.push(b'"');
                self.put(&quoted);
            }
            Encoding::Atom => self.put(s),
        }
    }

    fn number(&mut self, n: i128) -> Result<()> {
        if n < 0 || n >= 1 << 32 {
            return Err(FormatError::NumberOutOfRange(n).into());
        }
        self.put(n.to_string().as_bytes());
        Ok(())
    }
}

/// Formats a single argument.
pub fn format(arg: &Argument) -> Result<Vec<Token>> {
    let mut f = Formatter::default();
    f.argument(arg)?;
    Ok(f.tokens)
}

/// Formats a whole command: `tag SP verb (SP arg)* CRLF`.
pub fn format_command(command: &Command) -> Result<Vec<Token>> {
    let mut f = Formatter::default();
    f.put(command.tag().0.as_bytes());
    f.put(b" ");
    f.put(command.name().as_bytes());
    for arg in command.args() {
        f.put(b" ");
        f.argument(arg)?;
    }
    f.put(b"\r\n");
    Ok(f.tokens)
}
