//! Promise states, reactions and thenables.

use crate::queue::TaskQueue;
use sage_core::Error;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Observable state of a promise
#[derive(Debug, Clone)]
pub enum PromiseState<T> {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Fulfilled(T),
    /// Settled with an error
    Rejected(Error),
}

type Reaction<T> = Box<dyn FnOnce(Result<T, Error>)>;

struct Inner<T> {
    state: PromiseState<T>,
    reactions: Vec<Reaction<T>>,
}

/// Single-threaded promise bound to a [`TaskQueue`].
///
/// A promise settles at most once; later attempts are ignored. Reactions
/// always run from the queue, never inline, even when the promise is
/// already settled.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
    queue: TaskQueue,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    pub(crate) fn pending(queue: TaskQueue) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: PromiseState::Pending,
                reactions: Vec::new(),
            })),
            queue,
        }
    }

    /// Settle the promise. Returns `false` if it was already settled.
    pub(crate) fn settle(&self, outcome: Result<T, Error>) -> bool {
        let reactions = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return false;
            }
            inner.state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(error) => PromiseState::Rejected(error.clone()),
            };
            std::mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            let outcome = outcome.clone();
            self.queue.enqueue(Box::new(move || reaction(outcome)));
        }
        true
    }

    /// Settle from any thenable: values settle now, deferred work is queued,
    /// promises are followed.
    pub(crate) fn settle_from(&self, thenable: Thenable<T>) {
        match thenable {
            Thenable::Value(value) => {
                self.settle(Ok(value));
            }
            Thenable::Deferred(compute) => {
                let target = self.clone();
                self.queue.enqueue(Box::new(move || {
                    target.settle(compute());
                }));
            }
            Thenable::Promise(source) => {
                let target = self.clone();
                source.subscribe(Box::new(move |outcome| {
                    target.settle(outcome);
                }));
            }
        }
    }

    fn subscribe(&self, reaction: Reaction<T>) {
        let settled = self.outcome();
        match settled {
            Some(outcome) => self.queue.enqueue(Box::new(move || reaction(outcome))),
            None => self.inner.borrow_mut().reactions.push(reaction),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PromiseState<T> {
        self.inner.borrow().state.clone()
    }

    /// Settled outcome, `None` while pending
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, Error>> {
        match &self.inner.borrow().state {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Check if still pending
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Pending)
    }

    /// Check if fulfilled
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Fulfilled(_))
    }

    /// Check if rejected
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Rejected(_))
    }

    /// Queue this promise's reactions run on
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// React to either outcome
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, Error> + 'static,
        R: FnOnce(Error) -> Result<U, Error> + 'static,
    {
        let next = Promise::pending(self.queue.clone());
        let target = next.clone();
        self.subscribe(Box::new(move |outcome| {
            let result = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(error) => on_rejected(error),
            };
            target.settle(result);
        }));
        next
    }

    /// Map the fulfilled value. Rejections pass through.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, Error> + 'static,
    {
        self.then_or_else(on_fulfilled, Err)
    }

    /// Chain a step that yields a thenable of its own
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Thenable<U>, Error> + 'static,
    {
        let next = Promise::pending(self.queue.clone());
        let target = next.clone();
        self.subscribe(Box::new(move |outcome| match outcome.and_then(on_fulfilled) {
            Ok(thenable) => target.settle_from(thenable),
            Err(error) => {
                target.settle(Err(error));
            }
        }));
        next
    }

    /// Recover from a rejection
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T, Error> + 'static,
    {
        self.then_or_else(Ok, on_rejected)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner.borrow().state {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Handle given to [`crate::SyncPromiseAdapter::create`] to settle the promise.
pub struct Resolver<T> {
    promise: Promise<T>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T: Clone + 'static> Resolver<T> {
    pub(crate) fn new(promise: Promise<T>) -> Self {
        Self { promise }
    }

    /// Fulfill. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.promise.settle(Ok(value))
    }

    /// Reject. Returns `false` if already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.promise.settle(Err(error))
    }

    /// Follow another thenable
    pub fn resolve_with(&self, thenable: Thenable<T>) {
        self.promise.settle_from(thenable);
    }

    /// Queue the promise lives on
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        self.promise.queue()
    }
}

/// What a resolver may hand back: a ready value, deferred work, or a promise.
pub enum Thenable<T> {
    /// Ready value
    Value(T),
    /// Work run from the task queue when adopted
    Deferred(Box<dyn FnOnce() -> Result<T, Error>>),
    /// Engine promise
    Promise(Promise<T>),
}

impl<T> Thenable<T> {
    /// Ready value
    #[must_use]
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Deferred computation
    #[must_use]
    pub fn deferred<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<T, Error> + 'static,
    {
        Self::Deferred(Box::new(compute))
    }

    /// Check if the value is available without running the queue
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> From<Promise<T>> for Thenable<T> {
    fn from(promise: Promise<T>) -> Self {
        Self::Promise(promise)
    }
}

impl From<Value> for Thenable<Value> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Thenable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
        }
    }
}
