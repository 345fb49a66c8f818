//! Synchronization of the outbound stream around continuation requests.
//!
//! IMAP is mostly an unsynchronized exchange of lines, but some commands need the server to
//! acknowledge each part before the client sends the next one:
//!
//! ```text
//! C: A0001 AUTHENTICATE LOGIN
//! S: +
//! C: am9l
//! S: +
//! C: YmxvZ3M=
//! S: A0001 OK authenticated
//!
//! C: A0002 SELECT {8}
//! S: + continue
//! C: All Mail
//! S: A0002 OK
//! ```
//!
//! While one part of the client waits for continuations nothing else may be written, so every
//! write goes through [`ContinuationSync::when_not_awaiting`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::listener::Listener;
use crate::types::Reply;

/// Tracks the waiter, if any, that currently owns the continuation stream.
#[derive(Debug, Clone, Default)]
pub struct ContinuationSync {
    awaiting: Rc<RefCell<Option<Listener<()>>>>,
}

impl ContinuationSync {
    /// Creates a synchronizer in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether some waiter currently receives the continuation requests.
    pub fn is_awaiting_continuation(&self) -> bool {
        self.awaiting.borrow().is_some()
    }

    /// Runs `block` as soon as nobody is waiting for a continuation.
    ///
    /// When idle the block runs immediately. Otherwise it is queued on the current waiter and
    /// re-evaluated when that waiter stops; if an earlier queued block started a new wait in the
    /// meantime, the later ones move to the new waiter's queue.
    pub fn when_not_awaiting<F>(&self, block: F)
    where
        F: FnOnce() + 'static,
    {
        let current = self.awaiting.borrow().clone();
        match current {
            None => block(),
            Some(waiter) => {
                let this = self.clone();
                waiter.bothback(move |_| this.when_not_awaiting(block));
            }
        }
    }

    /// Returns a waiter that receives every continuation request, once all earlier waiters
    /// have stopped, until it is itself stopped.
    ///
    /// Attach the handler with [`Listener::listen`] right away.
    pub fn await_continuations(&self) -> Listener<()> {
        let waiter = Listener::new();
        let this = self.clone();
        let queued = waiter.clone();
        self.when_not_awaiting(move || {
            *this.awaiting.borrow_mut() = Some(queued.clone());
            let done = queued.clone();
            queued.stopback(move || {
                {
                    let mut awaiting = this.awaiting.borrow_mut();
                    if awaiting.as_ref().map_or(false, |w| w.ptr_eq(&done)) {
                        *awaiting = None;
                    }
                }
                done.succeed(());
            });
        });
        waiter
    }

    /// Hands a continuation request to the active waiter.
    pub fn receive_continuation(&self, reply: &Reply) -> Result<()> {
        let current = self.awaiting.borrow().clone();
        match current {
            Some(waiter) => {
                waiter.receive_event(reply);
                Ok(())
            }
            None => Err(Error::UnexpectedContinuation),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parse::parse_response;

    fn continuation() -> Reply {
        Rc::new(parse_response(BytesMut::from(&b"+ go ahead\r\n"[..])).unwrap())
    }

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn runs_immediately_when_idle() {
        let sync = ContinuationSync::new();
        let seen = log();
        let s = seen.clone();
        sync.when_not_awaiting(move || s.borrow_mut().push("ran"));
        assert_eq!(*seen.borrow(), vec!["ran"]);
    }

    #[test]
    fn waits_until_the_waiter_stops() {
        let sync = ContinuationSync::new();
        let waiter = sync.await_continuations();
        assert!(sync.is_awaiting_continuation());

        let seen = log();
        let s = seen.clone();
        sync.when_not_awaiting(move || s.borrow_mut().push("ran"));
        assert!(seen.borrow().is_empty());

        waiter.stop();
        assert_eq!(*seen.borrow(), vec!["ran"]);
        assert!(!sync.is_awaiting_continuation());
    }

    #[test]
    fn waiters_are_mutually_exclusive() {
        let sync = ContinuationSync::new();
        let seen = log();

        let first = sync.await_continuations();
        let s = seen.clone();
        first.listen(move |_| s.borrow_mut().push("first"));
        let second = sync.await_continuations();
        let s = seen.clone();
        second.listen(move |_| s.borrow_mut().push("second"));

        sync.receive_continuation(&continuation()).unwrap();
        first.stop();
        sync.receive_continuation(&continuation()).unwrap();
        second.stop();

        assert_eq!(*seen.borrow(), vec!["first", "second"]);
        assert!(!sync.is_awaiting_continuation());
    }

    #[test]
    fn queued_blocks_run_in_order_and_follow_new_waits() {
        let sync = ContinuationSync::new();
        let seen = log();
        let waiter = sync.await_continuations();

        let s = seen.clone();
        let inner = sync.clone();
        let next = Rc::new(RefCell::new(None));
        let slot = next.clone();
        sync.when_not_awaiting(move || {
            s.borrow_mut().push("a");
            *slot.borrow_mut() = Some(inner.await_continuations());
        });
        let s = seen.clone();
        sync.when_not_awaiting(move || s.borrow_mut().push("b"));

        waiter.stop();
        assert_eq!(*seen.borrow(), vec!["a"]);

        let second = next.borrow_mut().take().unwrap();
        second.stop();
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn stopping_a_queued_waiter_does_not_release_the_active_one() {
        let sync = ContinuationSync::new();
        let active = sync.await_continuations();
        let queued = sync.await_continuations();
        queued.stop();
        assert!(sync.is_awaiting_continuation());
        active.stop();
        assert!(!sync.is_awaiting_continuation());
    }

    #[test]
    fn continuation_while_idle_is_an_error() {
        let sync = ContinuationSync::new();
        match sync.receive_continuation(&continuation()) {
            Err(Error::UnexpectedContinuation) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
