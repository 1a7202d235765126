//! Runner whose transfers block until the test releases them.
//!
//! Records start order, the worker thread each transfer ran on, and the peak
//! number of transfers in flight. `prepare` can late-bind a task's path.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use dlgate_core::{DownloadTask, JobAborted, TaskId, TaskRunner};

#[derive(Default)]
struct Gate {
    released: HashSet<TaskId>,
    open: bool,
    started: Vec<TaskId>,
    threads: Vec<Option<String>>,
    in_flight: usize,
    peak: usize,
    late_paths: HashMap<TaskId, PathBuf>,
}

#[derive(Default)]
pub struct GatedRunner {
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let `task`'s transfer complete.
    pub fn release(&self, task: &DownloadTask) {
        self.gate.lock().unwrap().released.insert(task.id());
        self.changed.notify_all();
    }

    /// Let every current and future transfer complete.
    pub fn open(&self) {
        self.gate.lock().unwrap().open = true;
        self.changed.notify_all();
    }

    /// Bind `path` to `task` during `prepare`, as if learned from headers.
    pub fn bind_late(&self, task: &DownloadTask, path: impl Into<PathBuf>) {
        self.gate
            .lock()
            .unwrap()
            .late_paths
            .insert(task.id(), path.into());
    }

    /// Tasks whose transfer started, in start order.
    pub fn started(&self) -> Vec<TaskId> {
        self.gate.lock().unwrap().started.clone()
    }

    pub fn thread_names(&self) -> Vec<Option<String>> {
        self.gate.lock().unwrap().threads.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.gate.lock().unwrap().peak
    }

    /// Block until at least `n` transfers have started.
    pub fn wait_started(&self, n: usize, timeout: Duration) -> bool {
        let gate = self.gate.lock().unwrap();
        let (gate, _) = self
            .changed
            .wait_timeout_while(gate, timeout, |g| g.started.len() < n)
            .unwrap();
        gate.started.len() >= n
    }
}

impl TaskRunner for GatedRunner {
    fn prepare(&self, task: &DownloadTask) -> anyhow::Result<()> {
        let late = self.gate.lock().unwrap().late_paths.remove(&task.id());
        if let Some(path) = late {
            task.bind_path(path)?;
        }
        Ok(())
    }

    fn transfer(&self, task: &DownloadTask) -> anyhow::Result<()> {
        let mut gate = self.gate.lock().unwrap();
        gate.started.push(task.id());
        gate.threads
            .push(thread::current().name().map(str::to_string));
        gate.in_flight += 1;
        gate.peak = gate.peak.max(gate.in_flight);
        self.changed.notify_all();

        let result = loop {
            if gate.open || gate.released.contains(&task.id()) {
                break Ok(());
            }
            if task.is_canceled() {
                break Err(JobAborted.into());
            }
            // Cancellation sets a flag without notifying; poll it.
            gate = self
                .changed
                .wait_timeout(gate, Duration::from_millis(10))
                .unwrap()
                .0;
        };
        gate.in_flight -= 1;
        result
    }
}
