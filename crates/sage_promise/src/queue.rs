//! FIFO task queue driving promise reactions.
//!
//! The queue is completely cooperative:
//! - No threads, tasks run on the caller's stack when drained
//! - Strict FIFO order
//! - A tick is counted for every task that runs

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Deferred unit of work
pub type Task = Box<dyn FnOnce()>;

struct QueueState {
    tasks: VecDeque<Task>,
    ticks: u64,
}

/// Shared handle to a task queue.
///
/// Cloning the handle shares the same queue. The queue is `!Send`; every
/// execution owns its own.
#[derive(Clone)]
pub struct TaskQueue {
    state: Rc<RefCell<QueueState>>,
}

impl TaskQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(QueueState {
                tasks: VecDeque::new(),
                ticks: 0,
            })),
        }
    }

    /// Append a task
    pub fn enqueue(&self, task: Task) {
        self.state.borrow_mut().tasks.push_back(task);
    }

    /// Run the oldest task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running: tasks enqueue follow-ups.
        let task = {
            let mut state = self.state.borrow_mut();
            let task = state.tasks.pop_front();
            if task.is_some() {
                state.ticks = state.ticks.saturating_add(1);
            }
            task
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drain until empty, returning the number of tasks run
    pub fn run_all(&self) -> u64 {
        let start = self.ticks();
        while self.run_next() {}
        self.ticks() - start
    }

    /// Number of queued tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Check if no task is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().tasks.is_empty()
    }

    /// Tasks run so far
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.borrow().ticks
    }

    /// Check if two handles share one queue
    #[must_use]
    pub fn same_queue(&self, other: &TaskQueue) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("ticks", &self.ticks())
            .finish()
    }
}
