//! A cancellable future with a multicast event stream.
//!
//! A [`Listener`] is the control-flow primitive underneath every in-flight command, every
//! response subscription and every continuation waiter. It has two phases:
//!
//! ```text
//!   create |---[listening]---> [stop] ---> [succeed/fail]
//! ```
//!
//! While listening it passes every event it receives to the handlers registered with
//! [`Listener::listen`]. Calling [`Listener::stop`] ends the event phase and runs the stopbacks.
//! Resolving it with [`Listener::succeed`] or [`Listener::fail`] stops it (if nobody did so yet)
//! and hands the outcome to every outcome handler, including ones registered afterwards.
//!
//! The library that creates a listener usually feeds it events and resolves it, while the code
//! holding it calls `stop` to cancel. A listener can also be awaited: it is a [`Future`] whose
//! output is the outcome.
//!
//! Listeners are single-threaded handles; cloning one gives another handle to the same state.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;

use futures::task::{Context, Poll, Waker};

use crate::error::Error;
use crate::types::Reply;

type EventHandler<Ev> = Rc<dyn Fn(&Ev)>;
type OutcomeHandler<T, E> = Box<dyn FnOnce(&Result<T, E>)>;

struct Inner<T, E, Ev> {
    listeners: Vec<EventHandler<Ev>>,
    stopbacks: Vec<Box<dyn FnOnce()>>,
    outcome: Option<Rc<Result<T, E>>>,
    outcome_handlers: Vec<OutcomeHandler<T, E>>,
    wakers: Vec<Waker>,
    stopped: bool,
}

/// A cancellable subscriber to an event stream that eventually resolves to `Result<T, E>`.
pub struct Listener<T, E = Error, Ev = Reply> {
    inner: Rc<RefCell<Inner<T, E, Ev>>>,
}

impl<T, E, Ev> Clone for Listener<T, E, Ev> {
    fn clone(&self) -> Self {
        Listener {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E, Ev> Default for Listener<T, E, Ev> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E, Ev> fmt::Debug for Listener<T, E, Ev> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Listener")
            .field("listeners", &inner.listeners.len())
            .field("stopped", &inner.stopped)
            .field("resolved", &inner.outcome.is_some())
            .finish()
    }
}

impl<T, E, Ev> Listener<T, E, Ev> {
    /// Creates a listener with no subscribers.
    pub fn new() -> Self {
        Listener {
            inner: Rc::new(RefCell::new(Inner {
                listeners: Vec::new(),
                stopbacks: Vec::new(),
                outcome: None,
                outcome_handlers: Vec::new(),
                wakers: Vec::new(),
                stopped: false,
            })),
        }
    }

    /// Whether `stop` has been called, directly or through resolution.
    pub fn is_stopped(&self) -> bool {
        self.inner.borrow().stopped
    }

    /// Whether the listener has succeeded or failed.
    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    /// Returns true if both handles refer to the same listener.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a block to be called when the listener is stopped.
    ///
    /// If the listener is already stopped the block runs immediately.
    pub fn stopback<F>(&self, block: F) -> &Self
    where
        F: FnOnce() + 'static,
    {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.stopped {
                inner.stopbacks.push(Box::new(block));
                return self;
            }
        }
        block();
        self
    }

    /// Stops the listener: no further events reach the `listen` handlers and all stopbacks run.
    ///
    /// Calling `stop` more than once has no further effect.
    pub fn stop(&self) {
        let (listeners, stopbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.stopped {
                return;
            }
            inner.stopped = true;
            (
                mem::take(&mut inner.listeners),
                mem::take(&mut inner.stopbacks),
            )
        };
        drop(listeners);
        for stopback in stopbacks {
            stopback();
        }
    }

    /// Resolves the listener successfully.
    pub fn succeed(&self, value: T) {
        self.resolve(Ok(value));
    }

    /// Resolves the listener with an error.
    pub fn fail(&self, error: E) {
        self.resolve(Err(error));
    }

    fn resolve(&self, outcome: Result<T, E>) {
        let outcome = Rc::new(outcome);
        {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                log::debug!("listener resolved twice, ignoring the second outcome");
                return;
            }
            inner.outcome = Some(outcome.clone());
        }

        self.stop();

        let (handlers, wakers) = {
            let mut inner = self.inner.borrow_mut();
            (
                mem::take(&mut inner.outcome_handlers),
                mem::take(&mut inner.wakers),
            )
        };
        for handler in handlers {
            handler(&outcome);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Registers a block to be called with the outcome, whichever it is.
    ///
    /// If the listener is already resolved the block runs immediately.
    pub fn bothback<F>(&self, block: F) -> &Self
    where
        F: FnOnce(&Result<T, E>) + 'static,
    {
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            match inner.outcome.clone() {
                Some(outcome) => outcome,
                None => {
                    inner.outcome_handlers.push(Box::new(block));
                    return self;
                }
            }
        };
        block(&outcome);
        self
    }

    /// Registers a block to be called with the value if the listener succeeds.
    pub fn callback<F>(&self, block: F) -> &Self
    where
        F: FnOnce(&T) + 'static,
    {
        self.bothback(move |outcome| {
            if let Ok(value) = outcome {
                block(value);
            }
        })
    }

    /// Registers a block to be called with the error if the listener fails.
    pub fn errback<F>(&self, block: F) -> &Self
    where
        F: FnOnce(&E) + 'static,
    {
        self.bothback(move |outcome| {
            if let Err(error) = outcome {
                block(error);
            }
        })
    }
}

impl<T, E, Ev> Listener<T, E, Ev>
where
    Ev: 'static,
{
    /// Creates a listener with one event handler already registered.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Ev) + 'static,
    {
        let listener = Self::new();
        listener.listen(handler);
        listener
    }

    /// Registers a handler for every event received until the listener stops.
    ///
    /// Handlers registered on a stopped listener are never called.
    pub fn listen<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Ev) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if !inner.stopped {
            inner.listeners.push(Rc::new(handler));
        }
        drop(inner);
        self
    }

    /// Passes the event to every handler registered so far, in registration order.
    ///
    /// Handlers added while the event is being dispatched only see later events.
    pub fn receive_event(&self, event: &Ev) {
        let listeners = {
            let inner = self.inner.borrow();
            if inner.stopped {
                return;
            }
            inner.listeners.clone()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl<T, E, Ev> Listener<T, E, Ev>
where
    T: 'static,
    E: Clone + 'static,
    Ev: 'static,
{
    /// Returns a listener that succeeds when this one does, with the value passed through `map`.
    ///
    /// Failures and events are forwarded to the new listener. Stopping the new listener stops
    /// this one, but stopping or resolving this one never stops the new one early, and resolving
    /// the new one leaves this one alone.
    pub fn transform<U, F>(&self, map: F) -> Listener<U, E, Ev>
    where
        U: 'static,
        F: FnOnce(&T) -> U + 'static,
    {
        let derived = Listener::new();

        let up = derived.clone();
        self.bothback(move |outcome| match outcome {
            Ok(value) => up.succeed(map(value)),
            Err(error) => up.fail(error.clone()),
        });

        let up = derived.clone();
        self.listen(move |event| up.receive_event(event));

        let down = self.clone();
        derived.stopback(move || down.stop());

        derived
    }
}

impl<T, E, Ev> Future for Listener<T, E, Ev>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.outcome.as_ref() {
            Some(outcome) => Poll::Ready((**outcome).clone()),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
