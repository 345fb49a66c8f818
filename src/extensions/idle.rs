//! Adds support for the IMAP IDLE command specificed in [RFC2177](https://tools.ietf.org/html/rfc2177).

use std::fmt;
use std::time::Duration;

use async_channel::Receiver;
use async_std::future::timeout;
use futures::FutureExt;
use imap_proto::{Response, Status};

use crate::connection::Connection;
use crate::error::Result;
use crate::types::{Command, Reply, UnsolicitedResponse};

/// `Handle` allows a client to wait for changes to the selected mailbox.
///
/// It wraps a running [`IDLE` command](https://tools.ietf.org/html/rfc2177#section-3). The
/// untagged responses the server sends while idling are queued in the handle until
/// [`Handle::wait`] picks them up.
///
/// Note that the server MAY consider a client inactive if it has an IDLE command running, and if
/// such a server has an inactivity timeout it MAY log the client off implicitly at the end of its
/// timeout period. Because of that, clients using IDLE are advised to terminate the IDLE and
/// re-issue it at least every 29 minutes to avoid being logged off.
///
/// Other commands may be sent while idling; they are written once the IDLE has ended.
pub struct Handle {
    command: Command,
    receiver: Receiver<Reply>,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("command", &self.command)
            .field("queued", &self.receiver.len())
            .finish()
    }
}

/// Possible responses that happen on an open idle connection.
#[derive(Debug, PartialEq, Eq)]
pub enum IdleResponse {
    /// The IDLE command stopped, either through [`Handle::done`] on another handle to it or
    /// because the server ended it.
    ManualInterrupt,
    /// The idle connection timed out, because of the user set timeout.
    Timeout,
    /// The server has indicated that some new action has happened.
    NewData(Reply),
}

impl IdleResponse {
    /// Classifies new data, `None` for the other variants.
    pub fn unsolicited(&self) -> Option<UnsolicitedResponse> {
        match self {
            IdleResponse::NewData(reply) => Some(UnsolicitedResponse::from(reply)),
            _ => None,
        }
    }
}

impl Handle {
    /// Sends `IDLE` on `connection`.
    pub(crate) fn new(connection: &Connection) -> Result<Handle> {
        let command = connection.send_command("IDLE", vec![])?;
        connection.prepare_idle_termination(&command);

        let (sender, receiver) = async_channel::unbounded();
        let closing = sender.clone();
        command.listen(move |reply| match reply.parsed() {
            // keepalives
            Response::Data {
                status: Status::Ok, ..
            } => log::trace!("idle keepalive: {}", reply.information()),
            // the tagged completion resolves the command and closes the queue
            Response::Done { .. } => {}
            _ => {
                if sender.try_send(reply.clone()).is_err() {
                    log::debug!("idle handle gone, dropping response");
                }
            }
        });
        command.stopback(move || {
            closing.close();
        });
        Ok(Handle { command, receiver })
    }

    /// The running IDLE command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Waits for the next response from the server.
    ///
    /// Fails with the command's error if the server rejected `IDLE` or the connection failed.
    pub async fn wait(&self) -> Result<IdleResponse> {
        match self.receiver.recv().await {
            Ok(reply) => Ok(IdleResponse::NewData(reply)),
            Err(_) => match self.command.clone().now_or_never() {
                Some(Err(err)) => Err(err),
                _ => Ok(IdleResponse::ManualInterrupt),
            },
        }
    }

    /// Like [`Handle::wait`], but gives up after `dur`.
    pub async fn wait_with_timeout(&self, dur: Duration) -> Result<IdleResponse> {
        match timeout(dur, self.wait()).await {
            Ok(res) => res,
            Err(_err) => Ok(IdleResponse::Timeout),
        }
    }

    /// Ends the IDLE by sending `DONE`. The returned command completes with the server's
    /// tagged response.
    pub fn done(self) -> Command {
        self.command.stop();
        self.command
    }
}
