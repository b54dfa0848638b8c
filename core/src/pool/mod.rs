//! A fixed-size thread pool whose workers are pinned 1:1 to a caller-supplied
//! list of logical cores. Condvar-guarded FIFO queue, panic-safe task
//! execution, and a typed error channel for task failures.

mod future;

pub use future::{MultiFuture, TaskFuture};

use crate::affinity;
use crate::error::{Error, Result};
use future::Completion;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

type Task = Box<dyn FnOnce() + Send>;

struct Queue {
    tasks: Mutex<VecDeque<Task>>,
    cv: Condvar,
    stop: AtomicBool,
}

/// Fixed workers pinned 1:1 to a caller-supplied core list.
///
/// Constructing the pool fails if `cores` is not a subset of
/// [`affinity::available_cores`] — the `CoreList` invariant is enforced here
/// rather than left to the caller.
pub struct ThreadPool {
    queue: Arc<Queue>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(cores: &affinity::CoreList) -> Result<Self> {
        let available = affinity::available_cores()?;
        if let Some(bad) = cores.iter().find(|&c| !available.contains(c)) {
            return Err(Error::InvalidCore(bad));
        }

        let queue = Arc::new(Queue {
            tasks: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(cores.len());
        for core in cores.iter() {
            let queue = Arc::clone(&queue);
            let handle = std::thread::Builder::new()
                .name(format!("substrate-worker-{core}"))
                .spawn(move || worker_loop(core, queue))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        debug!(workers = workers.len(), "thread pool started");
        Ok(ThreadPool { queue, workers })
    }

    /// Number of pinned workers (`|CoreList|`).
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a single task, returning a future for its result.
    pub fn submit_task<F, R>(&self, f: F) -> Result<TaskFuture<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.queue.stop.load(Ordering::SeqCst) {
            return Err(Error::PoolShutDown);
        }

        let (shared, future) = future::new_pair::<R>();
        let completion = Completion::new(shared);
        let task: Task = Box::new(move || {
            let completion = completion;
            let result = catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| Error::TaskFailed(panic_message(&payload)));
            completion.publish(result);
        });

        {
            let mut queue = self.queue.tasks.lock();
            if self.queue.stop.load(Ordering::SeqCst) {
                return Err(Error::PoolShutDown);
            }
            queue.push_back(task);
        }
        self.queue.cv.notify_one();
        Ok(future)
    }

    /// Partitions `[first, last)` into `max(1, desired_blocks)` contiguous
    /// sub-ranges (`desired_blocks = None` defaults to [`Self::thread_count`])
    /// and submits one task per non-empty sub-range.
    pub fn submit_blocks<F, R>(
        &self,
        first: usize,
        last: usize,
        block: F,
        desired_blocks: Option<usize>,
    ) -> Result<MultiFuture<R>>
    where
        F: Fn(usize, usize) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let mut multi = MultiFuture::new();
        if last <= first {
            return Ok(multi);
        }

        let m = desired_blocks.unwrap_or_else(|| self.thread_count()).max(1);
        let total = last - first;
        let block_size = (total + m - 1) / m;
        let block = Arc::new(block);

        let mut start = first;
        while start < last {
            let end = (start + block_size).min(last);
            let block = Arc::clone(&block);
            let fut = self.submit_task(move || (block)(start, end))?;
            multi.add(fut);
            start = end;
        }
        Ok(multi)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.queue.stop.store(true, Ordering::SeqCst);
        self.queue.cv.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("thread pool shut down");
    }
}

fn worker_loop(core: usize, queue: Arc<Queue>) {
    if let Err(e) = affinity::set_affinity(core) {
        warn!(core, error = %e, "worker failed to pin to its assigned core");
    }

    loop {
        let task = {
            let mut tasks = queue.tasks.lock();
            loop {
                if let Some(task) = tasks.pop_front() {
                    break Some(task);
                }
                if queue.stop.load(Ordering::SeqCst) {
                    break None;
                }
                queue.cv.wait(&mut tasks);
            }
        };
        match task {
            Some(task) => {
                trace!(core, "running task");
                task();
            }
            None => return,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::CoreList;
    use std::sync::atomic::AtomicUsize;

    fn pool(n: usize) -> ThreadPool {
        let cores = available_n_cores(n);
        ThreadPool::new(&cores).expect("pool creation should succeed")
    }

    fn available_n_cores(n: usize) -> CoreList {
        let available = affinity::available_cores().unwrap();
        CoreList::new(available.iter().take(n.max(1)))
    }

    #[test]
    fn identity_tasks_round_trip() {
        let pool = pool(4);
        let futures: Vec<_> = (0..64)
            .map(|i| pool.submit_task(move || i).unwrap())
            .collect();
        for (i, fut) in futures.into_iter().enumerate() {
            assert_eq!(fut.wait().unwrap(), i);
        }
    }

    #[test]
    fn submit_blocks_covers_range_disjointly() {
        let pool = pool(4);
        let multi = pool
            .submit_blocks(
                0,
                1_000_000usize,
                |start, end| (start..end).map(|v| v as u64).sum::<u64>(),
                None,
            )
            .unwrap();
        let total: u64 = multi.wait_all().unwrap().into_iter().sum();
        assert_eq!(total, 499_999_500_000);
    }

    #[test]
    fn submit_blocks_empty_range_yields_empty_multi_future() {
        let pool = pool(2);
        let multi = pool
            .submit_blocks(10, 10, |s: usize, e: usize| e - s, None)
            .unwrap();
        assert!(multi.is_empty());
        multi.wait().unwrap();
    }

    #[test]
    fn submit_blocks_never_yields_more_sub_ranges_than_requested() {
        let pool = pool(4);
        let multi = pool
            .submit_blocks(0usize, 10, |s, e| (s, e), Some(3))
            .unwrap();
        assert!(multi.len() <= 3);
    }

    #[test]
    fn fifo_within_one_submitter_thread() {
        let pool = pool(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut futures = Vec::new();
        for i in 0..32 {
            let order = Arc::clone(&order);
            futures.push(pool.submit_task(move || order.lock().push(i)).unwrap());
        }
        for fut in futures {
            fut.wait().unwrap();
        }
        let observed = order.lock();
        let expected: Vec<i32> = (0..32).collect();
        assert_eq!(*observed, expected);
    }

    #[test]
    fn task_panic_is_caught_and_reported() {
        let pool = pool(2);
        let fut = pool.submit_task(|| -> i32 { panic!("boom") }).unwrap();
        match fut.wait() {
            Err(Error::TaskFailed(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }

    #[test]
    fn dropping_the_pool_resolves_outstanding_futures_one_way_or_another() {
        let pool = pool(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let fut = pool
            .submit_task(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        drop(pool);
        // Either the task ran before shutdown (Ok) or it was cancelled
        // (PoolShutDown); either way the future must resolve, never hang.
        match fut.wait() {
            Ok(()) => assert_eq!(counter.load(Ordering::SeqCst), 1),
            Err(Error::PoolShutDown) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn submit_after_explicit_stop_is_rejected() {
        let pool = pool(1);
        pool.queue.stop.store(true, Ordering::SeqCst);
        pool.queue.cv.notify_all();
        match pool.submit_task(|| 1) {
            Err(Error::PoolShutDown) => {}
            Ok(_) => panic!("expected submission to a stopped pool to be rejected"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
