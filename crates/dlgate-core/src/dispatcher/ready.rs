//! Ready queue: async calls waiting for a concurrency slot.
//!
//! Ordered by priority (higher first), then by submission sequence so equal
//! priorities keep FIFO order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::call::Call;
use crate::task::TaskId;

struct ReadyCall {
    call: Arc<dyn Call>,
    priority: i32,
    sequence: u64,
}

impl PartialEq for ReadyCall {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for ReadyCall {}

impl PartialOrd for ReadyCall {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyCall {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then lower sequence (older) first
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

#[derive(Default)]
pub(crate) struct ReadyQueue {
    heap: BinaryHeap<ReadyCall>,
    next_sequence: u64,
}

impl ReadyQueue {
    pub(crate) fn push(&mut self, call: Arc<dyn Call>) {
        let priority = call.task().priority();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ReadyCall {
            call,
            priority,
            sequence,
        });
    }

    /// Highest-priority, oldest call.
    pub(crate) fn pop(&mut self) -> Option<Arc<dyn Call>> {
        self.heap.pop().map(|ready| ready.call)
    }

    /// Remove the call for `task`, if queued.
    pub(crate) fn remove_task(&mut self, task: TaskId) -> Option<Arc<dyn Call>> {
        let pos = self.heap.iter().position(|r| r.call.task().id() == task)?;
        let mut calls = std::mem::take(&mut self.heap).into_vec();
        let removed = calls.swap_remove(pos);
        self.heap = BinaryHeap::from(calls);
        Some(removed.call)
    }

    /// Queued calls in promotion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn Call>> {
        let mut sorted: Vec<&ReadyCall> = self.heap.iter().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.into_iter().map(|r| &r.call)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
