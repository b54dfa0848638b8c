//! Minimal `std::future`/`std::promise`-style handle, sized for the thread
//! pool only: no waker, no executor integration — just a value a worker
//! thread produces and the submitter thread blocks on.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

pub(crate) struct Shared<T> {
    state: Mutex<Option<Result<T>>>,
    cv: Condvar,
}

impl<T> Shared<T> {
    fn new() -> Arc<Self> {
        Arc::new(Shared {
            state: Mutex::new(None),
            cv: Condvar::new(),
        })
    }
}

/// Resolves when the task a [`crate::pool::ThreadPool`] ran for it completes,
/// fails, panics, or is dropped unrun because the pool shut down.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> TaskFuture<T> {
    /// Blocks the calling thread until the task's result is ready.
    pub fn wait(self) -> Result<T> {
        let mut guard = self.shared.state.lock();
        loop {
            if guard.is_some() {
                return guard.take().unwrap();
            }
            self.shared.cv.wait(&mut guard);
        }
    }

    /// Non-blocking poll: `None` if the task hasn't completed yet.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.shared.state.lock().take()
    }
}

/// Drop guard carried inside the boxed task closure. If the closure runs to
/// completion it marks itself `done` after publishing the result; if the
/// closure is dropped *unrun* (pool shutdown clearing the queue), this runs
/// instead and resolves the future with [`Error::PoolShutDown`] so no
/// submitter ever blocks forever on a cancelled task.
pub(crate) struct Completion<T> {
    shared: Arc<Shared<T>>,
    done: bool,
}

impl<T> Completion<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Completion { shared, done: false }
    }

    pub(crate) fn publish(mut self, result: Result<T>) {
        *self.shared.state.lock() = Some(result);
        self.shared.cv.notify_all();
        self.done = true;
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if !self.done {
            let mut guard = self.shared.state.lock();
            if guard.is_none() {
                *guard = Some(Err(Error::PoolShutDown));
            }
            self.shared.cv.notify_all();
        }
    }
}

pub(crate) fn new_pair<T>() -> (Arc<Shared<T>>, TaskFuture<T>) {
    let shared = Shared::new();
    let future = TaskFuture {
        shared: shared.clone(),
    };
    (shared, future)
}

/// Fan-in of an ordered sequence of [`TaskFuture`]s, as returned by
/// [`crate::pool::ThreadPool::submit_blocks`].
pub struct MultiFuture<T> {
    futures: Vec<TaskFuture<T>>,
}

impl<T> MultiFuture<T> {
    pub fn new() -> Self {
        MultiFuture { futures: Vec::new() }
    }

    pub fn add(&mut self, fut: TaskFuture<T>) {
        self.futures.push(fut);
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Blocks until every child future is satisfied. The first error
    /// observed (in submission order) is returned, but every child is still
    /// waited on so no worker is left holding an undrained result.
    pub fn wait(self) -> Result<()> {
        let mut first_err = None;
        for fut in self.futures {
            if let Err(e) = fut.wait() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Like [`Self::wait`], but collects every child's value in submission
    /// order.
    pub fn wait_all(self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.futures.len());
        let mut first_err = None;
        for fut in self.futures {
            match fut.wait() {
                Ok(v) => results.push(v),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl<T> Default for MultiFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}
