//! Writing commands to the transport.
//!
//! Everything is written from inside [`ContinuationSync::when_not_awaiting`], so the bytes of
//! one command never end up in the middle of another command's continuation exchange.
//!
//! [`ContinuationSync::when_not_awaiting`]: crate::continuation::ContinuationSync::when_not_awaiting

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use base64::Engine;

use crate::authenticator::Authenticator;
use crate::connection::Connection;
use crate::formatter::Token;
use crate::parse::parse_authenticate_challenge;
use crate::types::Command;

const CRLF: &[u8] = b"\r\n";

impl Connection {
    pub(crate) fn send_tokens(&self, tokens: Vec<Token>, command: &Command) {
        for token in tokens {
            match token {
                Token::Bytes(bytes) => self.send_string(bytes, command),
                Token::Literal(bytes) => self.send_literal(bytes, command),
            }
        }
    }

    /// Writes bytes to the transport as they are.
    pub(crate) fn send_data(&self, data: &[u8]) -> io::Result<()> {
        log::trace!("C: {:?}", String::from_utf8_lossy(data));
        self.inner.transport.write_bytes(data)
    }

    /// Appends to the line buffer and writes every complete line in it.
    fn send_line_buffered(&self, data: &[u8]) -> io::Result<()> {
        let mut lines = Vec::new();
        {
            let mut buffer = self.inner.line_buffer.borrow_mut();
            buffer.extend_from_slice(data);
            while let Some(pos) = buffer.windows(2).position(|w| w == CRLF) {
                lines.push(buffer.split_to(pos + 2));
            }
        }
        for line in lines {
            self.send_data(&line)?;
        }
        Ok(())
    }

    /// Sends part of a command once no continuation exchange is in progress.
    pub(crate) fn send_string(&self, bytes: Vec<u8>, command: &Command) {
        let weak = self.downgrade();
        let command = command.clone();
        self.inner.continuations.when_not_awaiting(move || {
            let connection = match weak.upgrade() {
                Some(connection) => connection,
                None => return,
            };
            if completed(&command) {
                return;
            }
            if let Err(err) = connection.send_line_buffered(&bytes) {
                command.fail(err.into());
            }
        });
    }

    /// Announces a literal, then sends it when the server asks for it.
    pub(crate) fn send_literal(&self, bytes: Vec<u8>, command: &Command) {
        let weak = self.downgrade();
        let command = command.clone();
        let sync = self.inner.continuations.clone();
        self.inner.continuations.when_not_awaiting(move || {
            let connection = match weak.upgrade() {
                Some(connection) => connection,
                None => return,
            };
            if completed(&command) {
                return;
            }
            let marker = format!("{{{}}}\r\n", bytes.len());
            if let Err(err) = connection.send_line_buffered(marker.as_bytes()) {
                command.fail(err.into());
                return;
            }

            let waiter = sync.await_continuations();
            let this = waiter.clone();
            let failed = command.clone();
            waiter.listen(move |_| {
                if !completed(&failed) {
                    if let Some(connection) = weak.upgrade() {
                        if let Err(err) = connection.send_data(&bytes) {
                            failed.fail(err.into());
                        }
                    }
                }
                this.stop();
            });
            // released on resolution, not on stop: the line is out and the payload must follow
            command.bothback(move |_| waiter.stop());
        });
    }

    /// Answers every continuation request with `authenticator` until the command completes.
    ///
    /// A challenge that is not base64, or that the authenticator cannot answer, cancels the
    /// exchange with `*` and fails the command. Challenges arriving after the command was
    /// stopped are answered with `*` as well.
    pub fn send_authentication_data(
        &self,
        authenticator: Box<dyn Authenticator>,
        command: &Command,
    ) {
        let weak = self.downgrade();
        let command = command.clone();
        let sync = self.inner.continuations.clone();
        self.inner.continuations.when_not_awaiting(move || {
            let waiter = sync.await_continuations();
            let authenticator = RefCell::new(authenticator);
            let failed = command.clone();
            waiter.listen(move |reply| {
                let connection = match weak.upgrade() {
                    Some(connection) => connection,
                    None => return,
                };
                if failed.is_stopped() {
                    if let Err(err) = connection.send_data(b"*\r\n") {
                        log::debug!("unable to cancel authentication: {}", err);
                    }
                    return;
                }
                let answer = parse_authenticate_challenge(reply)
                    .and_then(|challenge| authenticator.borrow_mut().process(&challenge));
                match answer {
                    Ok(data) => {
                        let mut line = base64::engine::general_purpose::STANDARD
                            .encode(data)
                            .into_bytes();
                        line.extend_from_slice(CRLF);
                        if let Err(err) = connection.send_data(&line) {
                            failed.fail(err.into());
                        }
                    }
                    Err(err) => {
                        log::warn!("aborting authentication: {}", err);
                        if let Err(err) = connection.send_data(b"*\r\n") {
                            log::debug!("unable to cancel authentication: {}", err);
                        }
                        failed.fail(err);
                    }
                }
            });
            command.bothback(move |_| waiter.stop());
        });
    }

    /// Absorbs the server's `+ idling` and arranges for `DONE` to be written when the IDLE
    /// command is stopped by its caller.
    ///
    /// `DONE` is only written once the server has started idling; a stop that comes earlier
    /// takes effect when `+ idling` arrives.
    pub fn prepare_idle_termination(&self, command: &Command) {
        let weak = self.downgrade();
        let command = command.clone();
        let sync = self.inner.continuations.clone();
        self.inner.continuations.when_not_awaiting(move || {
            let waiter = sync.await_continuations();
            let idling = Rc::new(Cell::new(false));

            let end = {
                let weak = weak.clone();
                let idle = command.clone();
                let waiter = waiter.clone();
                move || {
                    if !completed(&idle) {
                        if let Some(connection) = weak.upgrade() {
                            if let Err(err) = connection.send_data(b"DONE\r\n") {
                                log::debug!("unable to end IDLE: {}", err);
                            }
                        }
                    }
                    waiter.stop();
                }
            };
            let end = Rc::new(end);

            let started = idling.clone();
            let idle = command.clone();
            let on_continuation = end.clone();
            waiter.listen(move |_| {
                started.set(true);
                if idle.is_stopped() {
                    (*on_continuation)();
                }
            });
            command.stopback(move || {
                if idling.get() {
                    (*end)();
                }
            });
            command.bothback(move |_| waiter.stop());
        });
    }
}

/// Whether the server has already answered the command, so the rest of it must not be sent.
fn completed(command: &Command) -> bool {
    if command.is_resolved() {
        log::debug!("not sending the rest of {}, it already completed", command.tag().0);
        return true;
    }
    false
}
