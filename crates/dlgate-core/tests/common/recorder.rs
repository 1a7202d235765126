//! Notifier that records every terminal event.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use dlgate_core::{CompletionNotifier, DownloadTask, EndCause, TaskId};

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<(TaskId, EndCause)>>,
    changed: Condvar,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(TaskId, EndCause)> {
        self.events.lock().unwrap().clone()
    }

    /// Causes reported for one task, in order.
    pub fn causes_for(&self, task: &DownloadTask) -> Vec<EndCause> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == task.id())
            .map(|(_, cause)| *cause)
            .collect()
    }

    pub fn count(&self, cause: EndCause) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| *c == cause)
            .count()
    }

    /// Block until at least `n` events were recorded.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let events = self.events.lock().unwrap();
        let (events, _) = self
            .changed
            .wait_timeout_while(events, timeout, |e| e.len() < n)
            .unwrap();
        events.len() >= n
    }
}

impl CompletionNotifier for Recorder {
    fn task_end(&self, task: &Arc<DownloadTask>, cause: EndCause, _error: Option<&anyhow::Error>) {
        self.events.lock().unwrap().push((task.id(), cause));
        self.changed.notify_all();
    }
}
