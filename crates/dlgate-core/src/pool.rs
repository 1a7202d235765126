//! Direct-handoff worker pool.
//!
//! No work queue lives inside the pool: `execute` hands the unit straight to a
//! worker parked waiting for work, or spawns a new named thread. Parked workers
//! exit after the idle timeout, so no threads stay warm after a burst.
//! Capacity is never limited here; the dispatcher only hands over work once it
//! has granted a concurrency slot.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Unit of work handed to a worker thread.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

struct ParkedWorker {
    id: usize,
    tx: SyncSender<Work>,
}

struct PoolShared {
    parked: Mutex<Vec<ParkedWorker>>,
    idle_timeout: Duration,
    thread_prefix: String,
    spawned: AtomicUsize,
    live: AtomicUsize,
}

impl PoolShared {
    fn parked(&self) -> MutexGuard<'_, Vec<ParkedWorker>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park until handed work or the idle timeout elapses.
    fn wait_for_work(&self, id: usize) -> Option<Work> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.parked().push(ParkedWorker { id, tx });
        match rx.recv_timeout(self.idle_timeout) {
            Ok(work) => Some(work),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                let mut parked = self.parked();
                if let Some(pos) = parked.iter().position(|w| w.id == id) {
                    parked.remove(pos);
                    None
                } else {
                    // Claimed between the timeout and taking the lock; the send
                    // happened under the lock, so the work is already buffered.
                    rx.try_recv().ok()
                }
            }
        }
    }
}

/// Decrements the live-thread count when a worker exits, panicking or not.
struct LiveGuard<'a>(&'a AtomicUsize);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn worker_loop(shared: Arc<PoolShared>, id: usize, first: Work) {
    let _live = LiveGuard(&shared.live);
    let mut next = Some(first);
    while let Some(work) = next.take() {
        work();
        next = shared.wait_for_work(id);
    }
    tracing::trace!(worker = id, "idle worker exiting");
}

/// Thread pool with zero core threads, unbounded size and direct handoff.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(thread_prefix: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                parked: Mutex::new(Vec::new()),
                idle_timeout,
                thread_prefix: thread_prefix.into(),
                spawned: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Run `work` on a parked worker if one is waiting, else on a new thread.
    /// Fails only if the OS refuses to spawn a thread.
    pub fn execute(&self, work: Work) -> io::Result<()> {
        let mut work = work;
        {
            let mut parked = self.shared.parked();
            while let Some(worker) = parked.pop() {
                match worker.tx.try_send(work) {
                    Ok(()) => return Ok(()),
                    // Worker gone (or already holding work); try the next one.
                    Err(TrySendError::Full(w)) | Err(TrySendError::Disconnected(w)) => work = w,
                }
            }
        }
        self.spawn(work)
    }

    fn spawn(&self, first: Work) -> io::Result<()> {
        let id = self.shared.spawned.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{}", self.shared.thread_prefix, id);
        let shared = Arc::clone(&self.shared);
        self.shared.live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(shared, id, first));
        match spawned {
            Ok(_) => {
                tracing::trace!(thread = %name, "spawned download worker");
                Ok(())
            }
            Err(e) => {
                self.shared.live.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Worker threads currently alive (running or parked).
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Worker threads parked waiting for work.
    pub fn idle_workers(&self) -> usize {
        self.shared.parked().len()
    }

    /// Total threads spawned over the pool's lifetime.
    pub fn spawned_workers(&self) -> usize {
        self.shared.spawned.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("thread_prefix", &self.shared.thread_prefix)
            .field("idle_timeout", &self.shared.idle_timeout)
            .field("live", &self.live_workers())
            .finish()
    }
}
