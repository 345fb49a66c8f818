use std::fmt;
use std::mem;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::Rc;

use futures::task::{Context, Poll};
use imap_proto::RequestId;

use crate::error::Result;
use crate::listener::Listener;
use crate::types::{Argument, Reply};

/// A command sent to the server.
///
/// A `Command` is a [`Listener`]: while it is outstanding it receives every untagged response
/// the server sends (which may belong to other commands running in parallel), and it succeeds
/// with its tagged `OK` response or fails with the `NO`/`BAD` text or a connection error.
/// Awaiting a command yields that outcome. Calling `stop` cancels interest in it.
#[derive(Clone)]
pub struct Command {
    listener: Listener<Reply>,
    tag: RequestId,
    name: Rc<str>,
    args: Rc<[Argument]>,
}

impl Command {
    /// Creates a command; it is not sent anywhere yet.
    pub fn new<S: AsRef<str>>(tag: RequestId, name: S, args: Vec<Argument>) -> Self {
        Command {
            listener: Listener::new(),
            tag,
            name: name.as_ref().into(),
            args: args.into(),
        }
    }

    /// The tag correlating this command with its completion.
    pub fn tag(&self) -> &RequestId {
        &self.tag
    }

    /// The command verb, e.g. `SELECT` or `UID FETCH`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The arguments following the verb.
    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// The underlying listener.
    pub fn listener(&self) -> &Listener<Reply> {
        &self.listener
    }
}

impl Deref for Command {
    type Target = Listener<Reply>;

    fn deref(&self) -> &Listener<Reply> {
        &self.listener
    }
}

impl Future for Command {
    type Output = Result<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.listener).poll(cx)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("tag", &self.tag.0)
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("listener", &self.listener)
            .finish()
    }
}

/// The commands a connection is still waiting on.
///
/// Active commands receive untagged responses. A command that stopped before the server
/// completed it (an IDLE after `DONE`, a cancelled FETCH, an AUTHENTICATE aborted locally) is
/// detached: it no longer hears untagged data, but its tag stays known until the tagged
/// completion arrives.
#[derive(Debug, Default)]
pub struct PendingCommands {
    active: Vec<Command>,
    detached: Vec<Command>,
}

impl PendingCommands {
    /// Registers a freshly sent command.
    pub fn insert(&mut self, command: Command) {
        self.active.push(command);
    }

    /// Removes the command awaiting `tag`, active or detached.
    pub fn take(&mut self, tag: &RequestId) -> Option<Command> {
        if let Some(pos) = self.active.iter().position(|c| c.tag() == tag) {
            return Some(self.active.remove(pos));
        }
        let pos = self.detached.iter().position(|c| c.tag() == tag)?;
        Some(self.detached.remove(pos))
    }

    /// Called once a command has stopped: it no longer observes untagged responses but is
    /// kept until its tagged response is taken.
    pub fn retire(&mut self, tag: &RequestId) {
        if let Some(pos) = self.active.iter().position(|c| c.tag() == tag) {
            let command = self.active.remove(pos);
            self.detached.push(command);
        }
    }

    /// Removes and returns every outstanding command.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut all = mem::take(&mut self.active);
        all.append(&mut self.detached);
        all
    }

    /// The commands that should observe untagged responses, oldest first.
    pub fn active(&self) -> Vec<Command> {
        self.active.clone()
    }

    /// Whether no command is outstanding.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.detached.is_empty()
    }

    /// The number of outstanding commands.
    pub fn len(&self) -> usize {
        self.active.len() + self.detached.len()
    }
}
