//! Synchronous promise adapter: creation, combinators and blocking wait.

use crate::promise::{Promise, Resolver, Thenable};
use crate::queue::TaskQueue;
use sage_core::{Error, InvariantViolation};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Error from [`SyncPromiseAdapter::wait`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    /// The promise was rejected
    #[error("{0}")]
    Rejected(Error),
    /// The queue ran dry while the promise was still pending
    #[error("Could not resolve promise")]
    Stalled,
}

impl From<WaitError> for Error {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Rejected(error) => error,
            WaitError::Stalled => {
                InvariantViolation("Could not resolve promise".to_string()).into()
            }
        }
    }
}

/// Creates promises on one task queue and drives them to completion.
#[derive(Debug, Clone, Default)]
pub struct SyncPromiseAdapter {
    queue: TaskQueue,
}

impl SyncPromiseAdapter {
    /// Adapter with a fresh queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter on an existing queue
    #[must_use]
    pub fn with_queue(queue: TaskQueue) -> Self {
        Self { queue }
    }

    /// Queue driven by this adapter
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Create a promise settled through a [`Resolver`].
    ///
    /// An `Err` returned by `executor` rejects the promise unless it was
    /// already settled.
    pub fn create<T, F>(&self, executor: F) -> Promise<T>
    where
        T: Clone + 'static,
        F: FnOnce(Resolver<T>) -> Result<(), Error>,
    {
        let promise = Promise::pending(self.queue.clone());
        let resolver = Resolver::new(promise.clone());
        if let Err(error) = executor(resolver) {
            promise.settle(Err(error));
        }
        promise
    }

    /// Promise already fulfilled with `value`
    #[must_use]
    pub fn create_fulfilled<T: Clone + 'static>(&self, value: T) -> Promise<T> {
        let promise = Promise::pending(self.queue.clone());
        promise.settle(Ok(value));
        promise
    }

    /// Promise already rejected with `error`
    #[must_use]
    pub fn create_rejected<T: Clone + 'static>(&self, error: Error) -> Promise<T> {
        let promise = Promise::pending(self.queue.clone());
        promise.settle(Err(error));
        promise
    }

    /// Convert any thenable into a promise on this adapter's queue.
    ///
    /// A promise from another queue is followed by a task on this queue that
    /// drains the foreign queue until the promise settles. If it is still
    /// pending once its queue runs dry, the adopted promise is rejected.
    pub fn adopt<T: Clone + 'static>(&self, thenable: Thenable<T>) -> Promise<T> {
        match thenable {
            Thenable::Promise(promise) if promise.queue().same_queue(&self.queue) => promise,
            Thenable::Promise(foreign) => {
                let promise = Promise::pending(self.queue.clone());
                let target = promise.clone();
                self.queue.enqueue(Box::new(move || {
                    while foreign.is_pending() && foreign.queue().run_next() {}
                    let outcome = foreign.outcome().unwrap_or_else(|| {
                        tracing::warn!("promise from a foreign queue never settled");
                        Err(InvariantViolation("Could not resolve promise".to_string()).into())
                    });
                    target.settle(outcome);
                }));
                promise
            }
            other => {
                let promise = Promise::pending(self.queue.clone());
                promise.settle_from(other);
                promise
            }
        }
    }

    /// Combine thenables into one promise of their values, in input order.
    ///
    /// Ready values count as settled immediately. The first rejection
    /// rejects the combined promise.
    pub fn all<T: Clone + 'static>(&self, items: Vec<Thenable<T>>) -> Promise<Vec<T>> {
        let combined: Promise<Vec<T>> = Promise::pending(self.queue.clone());
        let total = items.len();
        let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; total]));
        let remaining = Rc::new(Cell::new(total));

        for (index, item) in items.into_iter().enumerate() {
            match item {
                Thenable::Value(value) => {
                    slots.borrow_mut()[index] = Some(value);
                    remaining.set(remaining.get() - 1);
                }
                other => {
                    let slots = Rc::clone(&slots);
                    let remaining = Rc::clone(&remaining);
                    let target = combined.clone();
                    let settled_ok = move |value: T| {
                        slots.borrow_mut()[index] = Some(value);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            target.settle(Ok(Self::collect(&slots)));
                        }
                        Ok(())
                    };
                    let target = combined.clone();
                    let settled_err = move |error: Error| {
                        target.settle(Err(error));
                        Ok(())
                    };
                    self.adopt(other).then_or_else(settled_ok, settled_err);
                }
            }
        }

        if remaining.get() == 0 {
            combined.settle(Ok(Self::collect(&slots)));
        }
        combined
    }

    fn collect<T>(slots: &Rc<RefCell<Vec<Option<T>>>>) -> Vec<T> {
        slots.borrow_mut().iter_mut().filter_map(Option::take).collect()
    }

    /// Drain the queue until `promise` settles.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Rejected`] if the promise was rejected and
    /// [`WaitError::Stalled`] if the queue emptied while it was pending.
    pub fn wait<T: Clone + 'static>(&self, promise: &Promise<T>) -> Result<T, WaitError> {
        while promise.is_pending() && self.queue.run_next() {}
        match promise.outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(error)) => Err(WaitError::Rejected(error)),
            None => {
                tracing::warn!(ticks = self.queue.ticks(), "task queue drained with promise pending");
                Err(WaitError::Stalled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_create_and_wait() {
        let adapter = SyncPromiseAdapter::new();
        let promise = adapter.create(|resolver: Resolver<i32>| {
            resolver.resolve(42);
            Ok(())
        });
        assert_eq!(adapter.wait(&promise).unwrap(), 42);
    }

    #[test]
    fn test_create_executor_error_rejects() {
        let adapter = SyncPromiseAdapter::new();
        let promise: Promise<i32> = adapter.create(|_| Err(Error::user("refused")));
        match adapter.wait(&promise) {
            Err(WaitError::Rejected(e)) => assert_eq!(e.message(), "refused"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_create_fulfilled_and_rejected() {
        let adapter = SyncPromiseAdapter::new();
        assert!(adapter.create_fulfilled(1).is_fulfilled());
        assert!(adapter.create_rejected::<i32>(Error::new("x")).is_rejected());
    }

    #[test]
    fn test_wait_stalls_on_never_settled() {
        let adapter = SyncPromiseAdapter::new();
        let promise: Promise<i32> = adapter.create(|_| Ok(()));
        let err = adapter.wait(&promise).unwrap_err();
        assert!(matches!(err, WaitError::Stalled));
        let err: Error = err.into();
        assert_eq!(err.message(), "Invariant violation: Could not resolve promise");
    }

    #[test]
    fn test_resolver_settles_later() {
        let adapter = SyncPromiseAdapter::new();
        let slot: Rc<RefCell<Option<Resolver<&'static str>>>> = Rc::new(RefCell::new(None));
        let stash = Rc::clone(&slot);
        let promise = adapter.create(move |resolver| {
            *stash.borrow_mut() = Some(resolver);
            Ok(())
        });
        let resolver = slot.borrow_mut().take().unwrap();
        adapter.queue().enqueue(Box::new(move || {
            resolver.resolve("late");
        }));
        assert_eq!(adapter.wait(&promise).unwrap(), "late");
    }

    #[test]
    fn test_adopt_deferred_runs_from_queue() {
        let adapter = SyncPromiseAdapter::new();
        let promise = adapter.adopt(Thenable::deferred(|| Ok(7)));
        assert!(promise.is_pending());
        assert_eq!(adapter.wait(&promise).unwrap(), 7);
    }

    #[test]
    fn test_adopt_same_queue_promise_is_identity() {
        let adapter = SyncPromiseAdapter::new();
        let promise = adapter.create_fulfilled(1);
        let adopted = adapter.adopt(Thenable::from(promise.clone()));
        assert!(adopted.is_fulfilled());
    }

    #[test]
    fn test_adopt_foreign_settled_promise() {
        let adapter = SyncPromiseAdapter::new();
        let other = SyncPromiseAdapter::new();
        let adopted = adapter.adopt(Thenable::from(other.create_fulfilled("x")));
        assert!(adopted.queue().same_queue(adapter.queue()));
        assert_eq!(adapter.wait(&adopted).unwrap(), "x");

        let rejected: Promise<i32> = adapter.adopt(Thenable::from(other.create_rejected(Error::new("bad"))));
        match adapter.wait(&rejected) {
            Err(WaitError::Rejected(e)) => assert_eq!(e.message(), "bad"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_adopt_foreign_pending_promise_drains_its_queue() {
        let adapter = SyncPromiseAdapter::new();
        let other = SyncPromiseAdapter::new();
        let foreign = other.adopt(Thenable::deferred(|| Ok(5)));
        assert!(foreign.is_pending());
        let adopted = adapter.adopt(Thenable::from(foreign.then(|v| Ok(v * 2))));
        assert_eq!(adapter.wait(&adopted).unwrap(), 10);
    }

    #[test]
    fn test_adopt_foreign_never_settled_rejects() {
        let adapter = SyncPromiseAdapter::new();
        let other = SyncPromiseAdapter::new();
        let stuck: Promise<i32> = other.create(|_| Ok(()));
        let adopted = adapter.adopt(Thenable::from(stuck));
        match adapter.wait(&adopted) {
            Err(WaitError::Rejected(e)) => {
                assert_eq!(e.message(), "Invariant violation: Could not resolve promise");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_all_empty() {
        let adapter = SyncPromiseAdapter::new();
        let combined = adapter.all::<i32>(Vec::new());
        assert_eq!(adapter.wait(&combined).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_all_mixed_items() {
        let adapter = SyncPromiseAdapter::new();
        let items = vec![
            Thenable::value(1),
            Thenable::deferred(|| Ok(2)),
            Thenable::from(adapter.create_fulfilled(3)),
        ];
        let combined = adapter.all(items);
        assert_eq!(adapter.wait(&combined).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_all_rejects_on_first_rejection() {
        let adapter = SyncPromiseAdapter::new();
        let items = vec![
            Thenable::value(1),
            Thenable::deferred(|| Err(Error::new("first"))),
            Thenable::deferred(|| Err(Error::new("second"))),
        ];
        let combined = adapter.all(items);
        match adapter.wait(&combined) {
            Err(WaitError::Rejected(e)) => assert_eq!(e.message(), "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_all_keeps_index_order(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
            let adapter = SyncPromiseAdapter::new();
            let resolvers: Rc<RefCell<Vec<Option<Resolver<usize>>>>> =
                Rc::new(RefCell::new(Vec::new()));
            let mut items = Vec::new();
            for _ in 0..order.len() {
                let stash = Rc::clone(&resolvers);
                let promise = adapter.create(move |resolver| {
                    stash.borrow_mut().push(Some(resolver));
                    Ok(())
                });
                items.push(Thenable::from(promise));
            }
            let combined = adapter.all(items);

            // settle in shuffled order
            for &index in &order {
                let resolver = resolvers.borrow_mut()[index].take().unwrap();
                adapter.queue().enqueue(Box::new(move || {
                    resolver.resolve(index);
                }));
            }

            let values = adapter.wait(&combined).unwrap();
            prop_assert_eq!(values, (0..order.len()).collect::<Vec<_>>());
        }

        #[test]
        fn prop_settle_once(first: i32, second: i32) {
            let adapter = SyncPromiseAdapter::new();
            let promise = adapter.create(|resolver| {
                resolver.resolve(first);
                resolver.resolve(second);
                resolver.reject(Error::new("ignored"));
                Ok(())
            });
            prop_assert_eq!(adapter.wait(&promise).unwrap(), first);
        }
    }
}
