//! Bounded worker pools for asynchronous side effects.
//!
//! A [`WorkerPool`] owns a bounded queue and a fixed set of consumer tasks.
//! Producers never block: when the queue is full the job is dropped, logged
//! and counted. Shutdown closes the queue, lets the workers drain what is
//! already queued and waits for every one of them to exit.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::events::EmailNotification;
use crate::store::Reservation;

/// A unit of work a pool can carry.
pub trait Job: Send + 'static {
    /// Short description used in log lines.
    fn describe(&self) -> String;
}

impl Job for EmailNotification {
    fn describe(&self) -> String {
        format!("email '{}' to {}", self.subject, self.to)
    }
}

impl Job for Reservation {
    fn describe(&self) -> String {
        format!("reservation #{} for book {}", self.id, self.book_id)
    }
}

/// Point-in-time copy of a pool's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    /// Every call to `dispatch`.
    pub attempted: u64,
    /// Jobs accepted into the queue.
    pub enqueued: u64,
    /// Jobs abandoned because the queue was full or closed.
    pub dropped: u64,
    /// Jobs a worker finished handling.
    pub processed: u64,
}

#[derive(Debug, Default)]
struct DispatchStats {
    attempted: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
}

impl DispatchStats {
    fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-size pool of workers consuming one bounded queue.
pub struct WorkerPool<T: Job> {
    name: &'static str,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
}

impl<T: Job> WorkerPool<T> {
    /// Create the queue and spawn `config.workers` consumers on `runtime`.
    pub fn spawn(name: &'static str, config: &PoolConfig, runtime: &Handle) -> CatalogResult<Self> {
        if config.capacity == 0 {
            return Err(CatalogError::Startup(format!(
                "{} pool needs a queue capacity above zero",
                name
            )));
        }
        if config.workers == 0 {
            return Err(CatalogError::Startup(format!(
                "{} pool needs at least one worker",
                name
            )));
        }

        let (sender, receiver) = mpsc::channel(config.capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..config.workers)
            .map(|worker_id| {
                runtime.spawn(run_worker(
                    name,
                    worker_id,
                    receiver.clone(),
                    stats.clone(),
                    config.processing_delay,
                ))
            })
            .collect();

        debug!(
            pool = name,
            workers = config.workers,
            capacity = config.capacity,
            "Worker pool started"
        );

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
        })
    }

    /// Pool name used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Try to enqueue a job without blocking.
    ///
    /// On a full or closed queue the job is dropped and reported; it is
    /// never retried.
    pub fn dispatch(&self, job: T) -> CatalogResult<()> {
        self.stats.attempted.fetch_add(1, Ordering::Relaxed);

        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(pool = self.name, job = %job.describe(), "Queue closed, dropping job");
            return Err(CatalogError::QueueClosed(self.name));
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(pool = self.name, job = %job.describe(), "Queue full, dropping job");
                Err(CatalogError::QueueFull(self.name))
            }
            Err(TrySendError::Closed(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(pool = self.name, job = %job.describe(), "Queue closed, dropping job");
                Err(CatalogError::QueueClosed(self.name))
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Returns true until `shutdown` has been called.
    pub fn is_open(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Close the queue and wait for every worker to drain and exit.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        for worker in workers {
            if let Err(err) = worker.await {
                warn!(pool = self.name, error = %err, "Worker ended abnormally");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            pool = self.name,
            processed = stats.processed,
            dropped = stats.dropped,
            "Worker pool stopped"
        );
    }
}

async fn run_worker<T: Job>(
    pool: &'static str,
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    stats: Arc<DispatchStats>,
    delay: Duration,
) {
    loop {
        // Only the wait for the next item happens under the lock, so another
        // worker can pull while this one is processing.
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let description = job.describe();
        debug!(pool, worker_id, job = %description, "Processing job");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        stats.processed.fetch_add(1, Ordering::Relaxed);
        info!(pool, worker_id, job = %description, "Job processed");
    }

    debug!(pool, worker_id, "Worker stopped");
}
