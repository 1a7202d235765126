//! Tracked sets owned by the dispatcher, all behind its single lock.

use serde::Serialize;
use std::sync::Arc;

use super::ready::ReadyQueue;
use crate::call::Call;
use crate::pool::WorkerPool;

#[derive(Default)]
pub(crate) struct DispatchState {
    pub(crate) ready: ReadyQueue,
    pub(crate) running_async: Vec<Arc<dyn Call>>,
    pub(crate) running_sync: Vec<Arc<dyn Call>>,
    /// Created on the first async dispatch.
    pub(crate) pool: Option<WorkerPool>,
}

impl DispatchState {
    /// Remove `call` from whichever running set holds it. Returns the mode it
    /// was tracked under (true for async), or `None` if it was not a member.
    pub(crate) fn remove_running(&mut self, call: &Arc<dyn Call>) -> Option<bool> {
        for (is_async, set) in [(true, &mut self.running_async), (false, &mut self.running_sync)] {
            if let Some(pos) = set.iter().position(|c| Arc::ptr_eq(c, call)) {
                set.remove(pos);
                return Some(is_async);
            }
        }
        None
    }

    /// Running calls, sync set first.
    pub(crate) fn running(&self) -> impl Iterator<Item = &Arc<dyn Call>> {
        self.running_sync.iter().chain(self.running_async.iter())
    }

    pub(crate) fn stats(&self, max_concurrency: usize) -> DispatcherStats {
        DispatcherStats {
            ready: self.ready.len(),
            running_async: self.running_async.len(),
            running_sync: self.running_sync.len(),
            max_concurrency,
            pool_started: self.pool.is_some(),
            live_workers: self.pool.as_ref().map_or(0, WorkerPool::live_workers),
        }
    }
}

/// Point-in-time view of the dispatcher's tracked sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Async calls waiting for a slot.
    pub ready: usize,
    pub running_async: usize,
    pub running_sync: usize,
    pub max_concurrency: usize,
    /// Whether the worker pool has been created yet.
    pub pool_started: bool,
    pub live_workers: usize,
}

impl DispatcherStats {
    /// Free async slots.
    pub fn available(&self) -> usize {
        self.max_concurrency.saturating_sub(self.running_async)
    }

    /// Calls tracked in any set.
    pub fn tracked(&self) -> usize {
        self.ready + self.running_async + self.running_sync
    }
}
