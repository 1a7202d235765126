//! Calls: one submission attempt of a task, and the runner that does the work.
//!
//! The dispatcher never transfers bytes itself. It asks a [`CallFactory`] for
//! a fresh [`Call`] per admitted submission, runs it on a worker thread (async)
//! or on the caller's thread (sync), and calls `finish` once `run` returns.
//!
//! [`RunnerCall`] is the stock implementation: it drives a [`TaskRunner`]
//! through prepare → post-start conflict check → transfer and reports exactly
//! one terminal event to the notifier.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::cancel::JobAborted;
use crate::cause::EndCause;
use crate::dispatcher::Dispatcher;
use crate::notify::CompletionNotifier;
use crate::task::DownloadTask;

/// One execution attempt of a task. Compared by reference identity.
pub trait Call: Send + Sync {
    fn task(&self) -> &Arc<DownloadTask>;

    /// True when dispatched through `enqueue`, false for `execute`.
    fn is_async(&self) -> bool;

    /// Do the work. Must return once the task's cancel token is observed.
    /// The dispatcher calls `finish` for this call right after `run` returns.
    fn run(&self, dispatcher: &Dispatcher);

    /// Cooperative cancel signal. Invoked under the dispatcher lock: must not
    /// call back into the dispatcher.
    fn cancel(&self) {
        self.task().cancel_token().cancel();
    }
}

/// Creates a fresh [`Call`] for each admitted submission.
pub trait CallFactory: Send + Sync {
    fn create_call(&self, task: Arc<DownloadTask>, is_async: bool) -> Arc<dyn Call>;
}

/// The transfer collaborator behind [`RunnerCall`].
///
/// Return [`JobAborted`] (or any error wrapping it) when stopping because the
/// task's cancel token was set; it is reported as `Canceled`, not `Error`.
/// A panic in either step is reported as `Error`.
pub trait TaskRunner: Send + Sync {
    /// Resolve what is needed before the transfer, e.g. probe headers and
    /// bind the target path with [`DownloadTask::bind_path`].
    fn prepare(&self, _task: &DownloadTask) -> anyhow::Result<()> {
        Ok(())
    }

    fn transfer(&self, task: &DownloadTask) -> anyhow::Result<()>;
}

/// [`Call`] that drives a [`TaskRunner`] and reports the outcome.
pub struct RunnerCall {
    task: Arc<DownloadTask>,
    is_async: bool,
    runner: Arc<dyn TaskRunner>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl RunnerCall {
    pub fn new(
        task: Arc<DownloadTask>,
        is_async: bool,
        runner: Arc<dyn TaskRunner>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            task,
            is_async,
            runner,
            notifier,
        }
    }

    fn drive(&self, dispatcher: &Dispatcher) -> (EndCause, Option<anyhow::Error>) {
        let task = &self.task;
        if task.is_canceled() {
            return (EndCause::Canceled, None);
        }

        if let Err(e) = self.runner.prepare(task) {
            return classify_failure(task, e);
        }
        if task.is_canceled() {
            return (EndCause::Canceled, None);
        }

        // Path may only be known now; another running task may already own it.
        if dispatcher.is_file_conflict_after_run(task) {
            tracing::warn!(task = %task.id(), path = ?task.path(), "target file busy after prepare");
            return (EndCause::FileBusy, None);
        }

        match self.runner.transfer(task) {
            Ok(()) if task.is_canceled() => (EndCause::Canceled, None),
            Ok(()) => (EndCause::Completed, None),
            Err(e) => classify_failure(task, e),
        }
    }
}

fn classify_failure(task: &DownloadTask, e: anyhow::Error) -> (EndCause, Option<anyhow::Error>) {
    if e.chain().any(|c| c.is::<JobAborted>()) {
        tracing::debug!(task = %task.id(), "runner stopped on cancel");
        (EndCause::Canceled, None)
    } else {
        (EndCause::Error, Some(e))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl Call for RunnerCall {
    fn task(&self) -> &Arc<DownloadTask> {
        &self.task
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn run(&self, dispatcher: &Dispatcher) {
        tracing::debug!(task = %self.task.id(), is_async = self.is_async, "call started");
        let (cause, error) = panic::catch_unwind(AssertUnwindSafe(|| self.drive(dispatcher)))
            .unwrap_or_else(|payload| {
                let msg = panic_message(payload.as_ref());
                tracing::error!(task = %self.task.id(), panic = msg, "runner panicked");
                (
                    EndCause::Error,
                    Some(anyhow::anyhow!("runner panicked: {}", msg)),
                )
            });
        self.notifier.task_end(&self.task, cause, error.as_ref());
    }
}

/// Factory producing [`RunnerCall`]s that share one runner and notifier.
pub struct RunnerCallFactory {
    runner: Arc<dyn TaskRunner>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl RunnerCallFactory {
    pub fn new(runner: Arc<dyn TaskRunner>, notifier: Arc<dyn CompletionNotifier>) -> Self {
        Self { runner, notifier }
    }
}

impl CallFactory for RunnerCallFactory {
    fn create_call(&self, task: Arc<DownloadTask>, is_async: bool) -> Arc<dyn Call> {
        Arc::new(RunnerCall::new(
            task,
            is_async,
            Arc::clone(&self.runner),
            Arc::clone(&self.notifier),
        ))
    }
}
