//! Completion notifiers: where terminal events go.
//!
//! The dispatcher reports every terminal transition it decides (rejections,
//! queue cancellations, spawn failures) through a [`CompletionNotifier`];
//! runner-backed calls report the outcome of the transfer through the same
//! notifier, so each submitted task yields exactly one event.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cause::{EndCause, TaskEnd};
use crate::task::DownloadTask;

/// Receives terminal events. Called from dispatcher callers and worker threads.
pub trait CompletionNotifier: Send + Sync {
    fn task_end(&self, task: &Arc<DownloadTask>, cause: EndCause, error: Option<&anyhow::Error>);
}

/// Logs each terminal event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl CompletionNotifier for LoggingNotifier {
    fn task_end(&self, task: &Arc<DownloadTask>, cause: EndCause, error: Option<&anyhow::Error>) {
        match (cause, error) {
            (EndCause::Completed, _) => {
                tracing::info!(task = %task.id(), url = task.url(), "task completed")
            }
            (_, Some(e)) => {
                tracing::warn!(task = %task.id(), url = task.url(), %cause, "task ended: {:#}", e)
            }
            (_, None) => tracing::info!(task = %task.id(), url = task.url(), %cause, "task ended"),
        }
    }
}

/// Forwards owned [`TaskEnd`] events over an unbounded channel.
///
/// Sending never blocks, so it is safe from worker threads and from inside
/// dispatcher operations. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TaskEnd>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<TaskEnd>) -> Self {
        Self { tx }
    }

    /// Notifier plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl CompletionNotifier for ChannelNotifier {
    fn task_end(&self, task: &Arc<DownloadTask>, cause: EndCause, error: Option<&anyhow::Error>) {
        let event = TaskEnd {
            task_id: task.id(),
            url: task.url().to_string(),
            cause,
            error: error.map(|e| format!("{:#}", e)),
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(task = %task.id(), "terminal event dropped: receiver closed");
        }
    }
}
