//! Bounded worker pool.
//!
//! A fixed set of threads drains one FIFO queue. The queue is guarded by a
//! mutex and a counting semaphore tracks how many items are waiting.
//! Submission never blocks: a full queue hands the item straight back.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::sync::{Mutex, Semaphore};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("worker queue capacity must be non-zero")]
    NoCapacity,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Returned by [`WorkerPool::append`] when the queue is at capacity.
/// Carries the rejected job back to the caller.
#[derive(Debug)]
pub struct QueueFull<J>(pub J);

/// Something a worker runs for each dequeued job.
pub trait Handler<J>: Send + Sync + 'static {
    fn handle(&self, job: J);
}

impl<J, F> Handler<J> for F
where
    F: Fn(J) + Send + Sync + 'static,
{
    fn handle(&self, job: J) {
        self(job)
    }
}

struct Shared<J> {
    queue: Mutex<VecDeque<J>>,
    pending: Semaphore,
    capacity: usize,
    stop: AtomicBool,
}

pub struct WorkerPool<J: Send + 'static> {
    shared: Arc<Shared<J>>,
    workers: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Spawns `workers` threads that feed every job to `handler`.
    pub fn new<H>(workers: usize, capacity: usize, handler: H) -> Result<Self, PoolError>
    where
        H: Handler<J>,
    {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        if capacity == 0 {
            return Err(PoolError::NoCapacity);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            pending: Semaphore::new(0),
            capacity,
            stop: AtomicBool::new(false),
        });
        let handler = Arc::new(handler);

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(workers),
        };
        for id in 0..workers {
            let shared = Arc::clone(&pool.shared);
            let handler = Arc::clone(&handler);
            // On spawn failure `pool` drops here and joins the threads
            // already started.
            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || run(&shared, &*handler))?;
            pool.workers.push(handle);
        }

        tracing::info!(workers, capacity, "Worker pool started");
        Ok(pool)
    }

    /// Enqueues a job, or hands it back if the queue is full.
    pub fn append(&self, job: J) -> Result<(), QueueFull<J>> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                return Err(QueueFull(job));
            }
            queue.push_back(job);
        }
        self.shared.pending.release();
        Ok(())
    }

    /// Jobs waiting to be picked up.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.pending.release_many(self.workers.len());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

fn run<J, H: Handler<J> + ?Sized>(shared: &Shared<J>, handler: &H) {
    loop {
        shared.pending.acquire();
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let Some(job) = shared.queue.lock().pop_front() else {
            continue;
        };
        handler.handle(job);
    }
}
