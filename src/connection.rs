//! The protocol engine: command registration and routing of server responses.
//!
//! A [`Connection`] does no I/O of its own. Bytes from the server are fed in with
//! [`Connection::receive_data`], the end of the stream is signalled with
//! [`Connection::unbind`], and everything the client sends goes out through a [`Transport`].
//! [`ImapStream`](crate::ImapStream) wires a connection to an async socket.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::mem;
use std::rc::{Rc, Weak};

use bytes::BytesMut;
use imap_proto::{Response, Status};

use crate::config::Config;
use crate::continuation::ContinuationSync;
use crate::error::{Error, Result};
use crate::formatter;
use crate::imap_stream::LineAssembler;
use crate::listener::Listener;
use crate::parse::parse_response;
use crate::types::{Argument, Command, IdGenerator, PendingCommands, Reply};

/// The outbound half of a connection.
pub trait Transport {
    /// Queues bytes for the server.
    fn write_bytes(&self, data: &[u8]) -> io::Result<()>;

    /// Closes the connection. Called at most once.
    fn close(&self);
}

pub(crate) struct Inner {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) config: Config,
    ids: RefCell<IdGenerator>,
    pending: RefCell<PendingCommands>,
    handlers: RefCell<Vec<Listener<()>>>,
    pub(crate) continuations: ContinuationSync,
    assembler: RefCell<LineAssembler>,
    pub(crate) line_buffer: RefCell<BytesMut>,
    session: Listener<()>,
    greeting: Listener<Reply>,
    failure: RefCell<Option<Error>>,
    closed: Cell<bool>,
}

/// An IMAP connection.
///
/// Commands are pipelined: [`Connection::send_command`] writes the command (or as much of it as
/// can be written before the server has to ask for more) and returns at once. Untagged responses
/// are passed to every response handler and every outstanding command, in the order the server
/// sent them, and each tagged response resolves the command it belongs to.
///
/// Cloning a connection gives another handle to the same state.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Rc<Inner>,
}

#[derive(Clone)]
pub(crate) struct WeakConnection(Weak<Inner>);

impl WeakConnection {
    pub(crate) fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("pending", &self.inner.pending.borrow().len())
            .field("handlers", &self.inner.handlers.borrow().len())
            .field("continuations", &self.inner.continuations)
            .field("failure", &self.inner.failure.borrow())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

impl Connection {
    /// Creates a connection writing to `transport`.
    pub fn new<T: Transport + 'static>(transport: T, config: Config) -> Connection {
        let connection = Connection {
            inner: Rc::new(Inner {
                transport: Box::new(transport),
                ids: RefCell::new(IdGenerator::with_prefix(config.tag_prefix.clone())),
                config,
                pending: RefCell::new(PendingCommands::default()),
                handlers: RefCell::new(Vec::new()),
                continuations: ContinuationSync::new(),
                assembler: RefCell::new(LineAssembler::new()),
                line_buffer: RefCell::new(BytesMut::new()),
                session: Listener::new(),
                greeting: Listener::new(),
                failure: RefCell::new(None),
                closed: Cell::new(false),
            }),
        };
        connection.listen_for_greeting();
        connection
    }

    /// The first untagged response settles the greeting, whatever it is; only `BYE` fails it.
    fn listen_for_greeting(&self) {
        let greeting = self.inner.greeting.clone();
        let handler = self.add_response_handler(move |reply| {
            if reply.is_bye() {
                greeting.fail(Error::Bye(reply.information()));
            } else {
                greeting.succeed(reply.clone());
            }
        });
        self.inner.greeting.bothback(move |_| handler.stop());

        let greeting = self.inner.greeting.clone();
        self.inner
            .session
            .errback(move |err| greeting.fail(err.clone()));
    }

    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Rc::downgrade(&self.inner))
    }

    /// The configuration this connection was created with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Succeeds with the server greeting; fails if the server greets with `BYE` or the
    /// connection fails before any greeting arrives.
    pub fn greeting(&self) -> Listener<Reply> {
        self.inner.greeting.clone()
    }

    /// The session listener. It fails with the error that brought the connection down, or
    /// succeeds when the connection closes after [`Connection::stop`].
    pub fn session(&self) -> Listener<()> {
        self.inner.session.clone()
    }

    /// Marks the session as ending: a `BYE` or the end of the stream are expected from now on.
    pub fn stop(&self) {
        self.inner.session.stop();
    }

    /// Whether a command currently owns the continuation stream.
    pub fn is_awaiting_continuation(&self) -> bool {
        self.inner.continuations.is_awaiting_continuation()
    }

    fn dead(&self) -> Option<Error> {
        if let Some(err) = self.inner.failure.borrow().as_ref() {
            return Some(err.clone());
        }
        if self.inner.closed.get() {
            return Some(Error::ConnectionLost);
        }
        None
    }

    /// Sends a command and returns it without waiting for the server.
    ///
    /// Arguments that cannot be formatted are reported here and nothing is sent. On a
    /// connection that has already failed, the returned command has failed with the same error.
    pub fn send_command<S: AsRef<str>>(&self, name: S, args: Vec<Argument>) -> Result<Command> {
        let tag = self.inner.ids.borrow_mut().next_tag();
        let command = Command::new(tag, name, args);
        let tokens = formatter::format_command(&command)?;

        if let Some(err) = self.dead() {
            command.fail(err);
            return Ok(command);
        }

        self.inner.pending.borrow_mut().insert(command.clone());
        let weak = self.downgrade();
        let tag = command.tag().clone();
        command.stopback(move || {
            if let Some(connection) = weak.upgrade() {
                connection.inner.pending.borrow_mut().retire(&tag);
            }
        });

        self.send_tokens(tokens, &command);
        Ok(command)
    }

    /// Registers `handler` for every untagged response until the returned listener is stopped.
    ///
    /// Stopping the listener succeeds it. It fails with the connection error if the connection
    /// goes down first.
    pub fn add_response_handler<F>(&self, handler: F) -> Listener<()>
    where
        F: Fn(&Reply) + 'static,
    {
        let listener = Listener::with_handler(handler);
        let succeed = listener.clone();
        listener.stopback(move || succeed.succeed(()));

        if let Some(err) = self.dead() {
            listener.fail(err);
            return listener;
        }

        self.inner.handlers.borrow_mut().push(listener.clone());
        let weak = self.downgrade();
        let this = listener.clone();
        listener.bothback(move |_| {
            if let Some(connection) = weak.upgrade() {
                connection
                    .inner
                    .handlers
                    .borrow_mut()
                    .retain(|h| !h.ptr_eq(&this));
            }
        });
        listener
    }

    /// Feeds bytes received from the server.
    pub fn receive_data(&self, data: &[u8]) {
        if self.inner.failure.borrow().is_some() {
            log::warn!("dropping {} bytes received after failure", data.len());
            return;
        }
        let pushed = self.inner.assembler.borrow_mut().push(data);
        if let Err(err) = pushed {
            self.fail_all(err);
            return;
        }

        loop {
            let line = self.inner.assembler.borrow_mut().next_line();
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    self.fail_all(err);
                    break;
                }
            };
            log::trace!("S: {:?}", String::from_utf8_lossy(&line));

            match parse_response(line) {
                Ok(reply) => self.receive_response(Rc::new(reply)),
                Err(err) => {
                    self.fail_all(err);
                    break;
                }
            }
            if self.inner.failure.borrow().is_some() {
                break;
            }
        }
    }

    /// Routes one parsed response.
    pub fn receive_response(&self, reply: Reply) {
        match reply.parsed() {
            Response::Continue { .. } => {
                if let Err(err) = self.inner.continuations.receive_continuation(&reply) {
                    self.fail_all(err);
                }
            }
            Response::Done { tag, status, .. } => {
                let command = self.inner.pending.borrow_mut().take(tag);
                match command {
                    Some(command) => {
                        command.receive_event(&reply);
                        match status {
                            Status::No => command.fail(Error::No(reply.information())),
                            Status::Bad => command.fail(Error::Bad(reply.information())),
                            _ => command.succeed(reply.clone()),
                        }
                    }
                    None => self.fail_all(Error::UnknownTag(tag.0.clone())),
                }
            }
            _ => {
                let handlers = self.inner.handlers.borrow().clone();
                for handler in handlers {
                    handler.receive_event(&reply);
                }
                let commands = self.inner.pending.borrow().active();
                for command in commands {
                    command.receive_event(&reply);
                }

                if reply.is_bye() {
                    if self.inner.session.is_stopped() {
                        log::debug!("server said BYE, session ending");
                        self.inner.session.succeed(());
                    } else {
                        self.fail_all(Error::Bye(reply.information()));
                    }
                }
            }
        }
    }

    /// Fails the session, every response handler and every outstanding command with `error`,
    /// then closes the transport.
    pub fn fail_all(&self, error: Error) {
        {
            let mut failure = self.inner.failure.borrow_mut();
            if failure.is_some() {
                return;
            }
            *failure = Some(error.clone());
        }
        log::debug!("connection failed: {}", error);

        self.inner.session.fail(error.clone());
        loop {
            let commands = self.inner.pending.borrow_mut().drain();
            if commands.is_empty() {
                break;
            }
            for command in commands {
                command.fail(error.clone());
            }
        }
        let handlers = mem::take(&mut *self.inner.handlers.borrow_mut());
        for handler in handlers {
            handler.fail(error.clone());
        }
        self.close();
    }

    /// To be called when the stream has closed.
    pub fn unbind(&self) {
        if self.inner.failure.borrow().is_some() {
            return;
        }
        let pending = !self.inner.pending.borrow().is_empty();
        if pending || !self.inner.session.is_stopped() {
            self.fail_all(Error::ConnectionLost);
        } else {
            self.close();
            if !self.inner.session.is_resolved() {
                self.inner.session.succeed(());
            }
        }
    }

    /// Closes the transport, once.
    pub fn close(&self) {
        if !self.inner.closed.replace(true) {
            log::debug!("closing connection");
            self.inner.transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock_stream::MockTransport;

    fn connect() -> (Connection, MockTransport) {
        let transport = MockTransport::default();
        let config = Config {
            tag_prefix: "X".into(),
            ..Config::default()
        };
        (Connection::new(transport.clone(), config), transport)
    }

    fn outcome<T: Clone + 'static>(listener: &Listener<T>) -> Rc<RefCell<Option<Result<T>>>> {
        let slot = Rc::new(RefCell::new(None));
        let s = slot.clone();
        listener.bothback(move |res| *s.borrow_mut() = Some(res.clone()));
        slot
    }

    #[test]
    fn greeting_succeeds_on_the_first_status() {
        let (conn, _) = connect();
        let greeting = outcome(&conn.greeting());
        conn.receive_data(b"* OK [CAPABILITY IMAP4rev1] ready\r\n");
        match &*greeting.borrow() {
            Some(Ok(reply)) => assert_eq!(reply.information(), "ready"),
            other => panic!("unexpected: {:?}", other),
        };
    }

    #[test]
    fn greeting_fails_on_bye() {
        let (conn, transport) = connect();
        let greeting = outcome(&conn.greeting());
        conn.receive_data(b"* BYE too busy\r\n");
        match &*greeting.borrow() {
            Some(Err(Error::Bye(text))) => assert_eq!(text, "too busy"),
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn greeting_settles_on_the_first_untagged_response() {
        let (conn, _) = connect();
        let greeting = outcome(&conn.greeting());
        conn.receive_data(b"* CAPABILITY IMAP4rev1 IDLE\r\n* OK ready\r\n");
        match &*greeting.borrow() {
            Some(Ok(reply)) => assert!(matches!(reply.parsed(), Response::Capabilities(_))),
            other => panic!("unexpected: {:?}", other),
        };
        assert!(!conn.session().is_resolved());
    }

    #[test]
    fn tagged_responses_resolve_their_command() {
        let (conn, transport) = connect();
        let noop = conn.send_command("NOOP", vec![]).unwrap();
        let select = conn.send_command("SELECT", vec!["INBOX".into()]).unwrap();
        assert_eq!(transport.written(), b"X0001 NOOP\r\nX0002 SELECT INBOX\r\n");

        let noop_done = outcome(noop.listener());
        let select_done = outcome(select.listener());
        conn.receive_data(b"X0002 NO no such mailbox\r\nX0001 OK done\r\n");

        assert!(matches!(&*noop_done.borrow(), Some(Ok(_))));
        match &*select_done.borrow() {
            Some(Err(Error::No(text))) => assert_eq!(text, "no such mailbox"),
            other => panic!("unexpected: {:?}", other),
        };
    }

    #[test]
    fn bad_responses_fail_only_their_command() {
        let (conn, _) = connect();
        let first = conn.send_command("FOO", vec![]).unwrap();
        let second = conn.send_command("NOOP", vec![]).unwrap();
        conn.receive_data(b"X0001 BAD unknown command\r\n");
        assert!(matches!(&*outcome(first.listener()).borrow(), Some(Err(Error::Bad(_)))));
        assert!(!second.is_resolved());
        assert!(!conn.session().is_resolved());
    }

    #[test]
    fn untagged_responses_reach_handlers_then_commands() {
        let (conn, _) = connect();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let command = conn.send_command("NOOP", vec![]).unwrap();
        let s = seen.clone();
        command.listen(move |reply| s.borrow_mut().push(format!("command {}", reply.information())));
        let s = seen.clone();
        let handler = conn.add_response_handler(move |reply| {
            s.borrow_mut().push(format!("handler {:?}", reply.parsed()))
        });

        conn.receive_data(b"* 3 EXISTS\r\n");
        handler.stop();
        conn.receive_data(b"* 4 EXISTS\r\n");

        assert_eq!(
            *seen.borrow(),
            vec![
                "handler MailboxData(Exists(3))".to_string(),
                "command ".to_string(),
                "command ".to_string(),
            ]
        );
        assert!(matches!(&*outcome(&handler).borrow(), Some(Ok(()))));
    }

    #[test]
    fn formatting_errors_are_returned_and_nothing_is_sent() {
        let (conn, transport) = connect();
        let res = conn.send_command("FETCH", vec![Argument::Number(-1)]);
        assert!(matches!(res, Err(Error::Format(_))));
        assert!(transport.written().is_empty());
        assert!(conn.inner.pending.borrow().is_empty());
    }

    #[test]
    fn fail_all_fails_everything_and_closes_once() {
        let (conn, transport) = connect();
        let first = conn.send_command("NOOP", vec![]).unwrap();
        let second = conn.send_command("NOOP", vec![]).unwrap();
        let handler = conn.add_response_handler(|_| {});

        conn.fail_all(Error::ConnectionLost);
        conn.fail_all(Error::Bye("again".into()));

        for listener in &[first.listener().clone(), second.listener().clone()] {
            assert!(matches!(&*outcome(listener).borrow(), Some(Err(Error::ConnectionLost))));
        }
        assert!(matches!(&*outcome(&handler).borrow(), Some(Err(Error::ConnectionLost))));
        assert!(matches!(&*outcome(&conn.session()).borrow(), Some(Err(Error::ConnectionLost))));
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn commands_on_a_failed_connection_fail_at_once() {
        let (conn, transport) = connect();
        conn.receive_data(b"* BYE shutting down\r\n");
        let command = conn.send_command("NOOP", vec![]).unwrap();
        assert!(matches!(&*outcome(command.listener()).borrow(), Some(Err(Error::Bye(_)))));
        assert!(transport.written().is_empty());
    }

    #[test]
    fn unknown_tags_are_fatal() {
        let (conn, transport) = connect();
        let command = conn.send_command("NOOP", vec![]).unwrap();
        conn.receive_data(b"Z0001 OK what\r\n");
        assert!(matches!(&*outcome(command.listener()).borrow(), Some(Err(Error::UnknownTag(_)))));
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn malformed_lines_are_fatal() {
        let (conn, _) = connect();
        let command = conn.send_command("NOOP", vec![]).unwrap();
        conn.receive_data(b"this is not imap\r\n");
        assert!(matches!(&*outcome(command.listener()).borrow(), Some(Err(Error::Parse(_)))));
    }

    #[test]
    fn unexpected_continuations_are_fatal() {
        let (conn, _) = connect();
        conn.receive_data(b"+ hello\r\n");
        assert!(matches!(
            &*outcome(&conn.session()).borrow(),
            Some(Err(Error::UnexpectedContinuation))
        ));
    }

    #[test]
    fn stopped_commands_still_receive_their_completion() {
        let (conn, _) = connect();
        let command = conn.send_command("FETCH", vec![Argument::raw("1:* FLAGS")]).unwrap();
        let result = outcome(command.listener());
        let seen = Rc::new(RefCell::new(0));
        let s = seen.clone();
        command.listen(move |_| *s.borrow_mut() += 1);

        command.stop();
        conn.receive_data(b"* 1 FETCH (FLAGS (\\Seen))\r\nX0001 OK done\r\n");

        assert_eq!(*seen.borrow(), 0);
        assert!(matches!(&*result.borrow(), Some(Ok(_))));
        assert!(!conn.session().is_stopped());
        assert!(conn.inner.pending.borrow().is_empty());
    }

    #[test]
    fn unbind_with_pending_commands_loses_the_connection() {
        let (conn, _) = connect();
        let command = conn.send_command("NOOP", vec![]).unwrap();
        conn.unbind();
        assert!(matches!(&*outcome(command.listener()).borrow(), Some(Err(Error::ConnectionLost))));
    }

    #[test]
    fn expected_bye_ends_the_session_cleanly() {
        let (conn, _) = connect();
        conn.stop();
        let logout = conn.send_command("LOGOUT", vec![]).unwrap();
        conn.receive_data(b"* BYE logging out\r\nX0001 OK LOGOUT completed\r\n");
        conn.unbind();
        assert!(matches!(&*outcome(logout.listener()).borrow(), Some(Ok(_))));
        assert!(matches!(&*outcome(&conn.session()).borrow(), Some(Ok(()))));
    }

    #[test]
    fn lines_may_arrive_in_pieces() {
        let (conn, _) = connect();
        let command = conn.send_command("FETCH", vec![Argument::raw("1 BODY[]")]).unwrap();
        let bodies = Rc::new(RefCell::new(Vec::new()));
        let b = bodies.clone();
        command.listen(move |reply| b.borrow_mut().push(reply.raw().to_vec()));

        let data = b"* 1 FETCH (BODY[] {12}\r\nhello\r\nworld)\r\nX0001 OK done\r\n";
        for chunk in data.chunks(3) {
            conn.receive_data(chunk);
        }
        // the tagged completion is delivered as the last event
        assert_eq!(
            *bodies.borrow(),
            vec![
                b"* 1 FETCH (BODY[] {12}\r\nhello\r\nworld)\r\n".to_vec(),
                b"X0001 OK done\r\n".to_vec(),
            ]
        );
        assert!(command.is_resolved());
    }
}
