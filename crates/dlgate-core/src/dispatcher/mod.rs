//! Admission-controlled dispatcher for download tasks.
//!
//! Decides for every submitted task whether it conflicts with a tracked one,
//! whether it runs now or waits in the ready queue, and promotes waiting tasks
//! as async slots free up. All bookkeeping happens under one lock; terminal
//! events decided under the lock are delivered after it is released, before
//! the operation returns.

mod conflict;
mod guard;
mod ready;
mod state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::call::{Call, CallFactory, RunnerCallFactory, TaskRunner};
use crate::cause::EndCause;
use crate::config::DispatchConfig;
use crate::notify::CompletionNotifier;
use crate::pool::WorkerPool;
use crate::task::DownloadTask;

use guard::FinishGuard;
use state::DispatchState;

pub use state::DispatcherStats;

/// Terminal event decided under the lock, delivered after it is released.
struct Ended {
    task: Arc<DownloadTask>,
    cause: EndCause,
    error: Option<anyhow::Error>,
}

impl Ended {
    fn new(task: Arc<DownloadTask>, cause: EndCause) -> Self {
        Self {
            task,
            cause,
            error: None,
        }
    }
}

struct Inner {
    config: DispatchConfig,
    factory: Arc<dyn CallFactory>,
    notifier: Arc<dyn CompletionNotifier>,
    state: Mutex<DispatchState>,
}

/// Cheaply cloneable handle to one dispatcher instance.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// `factory` creates the call for each admitted submission; `notifier`
    /// receives the terminal events the dispatcher itself decides.
    pub fn new(
        config: DispatchConfig,
        factory: Arc<dyn CallFactory>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        let config = DispatchConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                notifier,
                state: Mutex::new(DispatchState::default()),
            }),
        }
    }

    /// Dispatcher whose calls drive `runner` and report to the same `notifier`.
    pub fn with_runner(
        config: DispatchConfig,
        runner: Arc<dyn TaskRunner>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        let factory = Arc::new(RunnerCallFactory::new(runner, Arc::clone(&notifier)));
        Self::new(config, factory, notifier)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.config.max_concurrency
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, ended: Vec<Ended>) {
        for e in ended {
            self.inner
                .notifier
                .task_end(&e.task, e.cause, e.error.as_ref());
        }
    }

    /// Submit `task` to run on a worker thread. Runs now if an async slot is
    /// free, otherwise waits in the ready queue. Rejections are reported to
    /// the notifier before this returns.
    pub fn enqueue(&self, task: Arc<DownloadTask>) {
        let mut ended = Vec::new();
        {
            let mut state = self.lock_state();
            if let Some(cause) = conflict::inspect_for_conflict(&task, &state) {
                tracing::warn!(task = %task.id(), url = task.url(), %cause, "task rejected");
                ended.push(Ended::new(task, cause));
            } else {
                let call = self.inner.factory.create_call(Arc::clone(&task), true);
                if state.running_async.len() < self.inner.config.max_concurrency {
                    state.running_async.push(Arc::clone(&call));
                    tracing::debug!(task = %task.id(), running = state.running_async.len(), "task dispatched");
                    self.dispatch_locked(&mut state, call, &mut ended);
                } else {
                    state.ready.push(call);
                    tracing::debug!(
                        task = %task.id(),
                        priority = task.priority(),
                        queued = state.ready.len(),
                        "task queued"
                    );
                }
            }
        }
        self.deliver(ended);
    }

    /// Run `task` on the calling thread. Returns once its call has finished,
    /// or right away if it was rejected. Sync tasks do not use async slots.
    pub fn execute(&self, task: Arc<DownloadTask>) {
        let mut ended = Vec::new();
        let admitted = {
            let mut state = self.lock_state();
            if let Some(cause) = conflict::inspect_for_conflict(&task, &state) {
                tracing::warn!(task = %task.id(), url = task.url(), %cause, "task rejected");
                ended.push(Ended::new(task, cause));
                None
            } else {
                let call = self.inner.factory.create_call(task, false);
                state.running_sync.push(Arc::clone(&call));
                Some(call)
            }
        };
        self.deliver(ended);

        if let Some(call) = admitted {
            self.run_call(&call);
        }
    }

    /// Request cooperative cancellation of every tracked call. Set membership
    /// does not change here; each call leaves when it finishes.
    pub fn cancel_all(&self) {
        let state = self.lock_state();
        let mut count = 0usize;
        for call in state.ready.iter().chain(state.running()) {
            call.cancel();
            count += 1;
        }
        tracing::info!(count, "cancel requested for all tasks");
    }

    /// Cancel `task`. A queued task is dropped and reported `Canceled` right
    /// away; a running one is asked to stop. Returns false if not tracked.
    pub fn cancel(&self, task: &DownloadTask) -> bool {
        let mut ended = Vec::new();
        let found = {
            let mut state = self.lock_state();
            if let Some(call) = state.ready.remove_task(task.id()) {
                tracing::debug!(task = %task.id(), "queued task canceled");
                ended.push(Ended::new(Arc::clone(call.task()), EndCause::Canceled));
                true
            } else if let Some(call) = state.running().find(|c| c.task().id() == task.id()) {
                tracing::debug!(task = %task.id(), "cancel requested for running task");
                call.cancel();
                true
            } else {
                false
            }
        };
        self.deliver(ended);
        found
    }

    /// Report that `call` stopped running. The dispatcher calls this itself,
    /// through a drop guard, once `Call::run` returns or unwinds; a `Call`
    /// implementation must not call it. It is public as the checked entry
    /// point of the exactly-once contract: the call must be in a running set.
    /// Finishing a call tracked as async promotes ready tasks.
    ///
    /// # Panics
    ///
    /// If `call` is in neither running set (double finish, or a call that was
    /// never dispatched).
    pub fn finish(&self, call: &Arc<dyn Call>) {
        let mut ended = Vec::new();
        {
            let mut state = self.lock_state();
            let Some(was_async) = state.remove_running(call) else {
                drop(state);
                panic!(
                    "call wasn't in flight: task {} (async: {})",
                    call.task().id(),
                    call.is_async()
                );
            };
            tracing::debug!(task = %call.task().id(), is_async = was_async, "call finished");
            if was_async {
                self.promote_locked(&mut state, &mut ended);
            }
        }
        self.deliver(ended);
    }

    /// True if another running task already targets `task`'s path. For runners
    /// that learn the path only after starting. Queued tasks are not checked.
    pub fn is_file_conflict_after_run(&self, task: &DownloadTask) -> bool {
        let state = self.lock_state();
        conflict::file_conflict_after_run(task, &state)
    }

    pub fn stats(&self) -> DispatcherStats {
        self.lock_state().stats(self.inner.config.max_concurrency)
    }

    /// Fill free async slots from the ready queue, skipping (and ending with
    /// `FileBusy`) calls whose path is now taken by a running task.
    fn promote_locked(&self, state: &mut DispatchState, ended: &mut Vec<Ended>) {
        if state.ready.is_empty() {
            return;
        }
        while state.running_async.len() < self.inner.config.max_concurrency {
            let Some(call) = state.ready.pop() else {
                break;
            };
            let task = Arc::clone(call.task());
            if conflict::file_conflict_after_run(&task, state) {
                tracing::warn!(task = %task.id(), path = ?task.path(), "queued task's file is busy");
                ended.push(Ended::new(task, EndCause::FileBusy));
                continue;
            }
            state.running_async.push(Arc::clone(&call));
            tracing::debug!(
                task = %task.id(),
                priority = task.priority(),
                remaining = state.ready.len(),
                "task promoted"
            );
            self.dispatch_locked(state, call, ended);
        }
    }

    /// Hand an already-admitted async call to the pool, creating it on first use.
    fn dispatch_locked(
        &self,
        state: &mut DispatchState,
        call: Arc<dyn Call>,
        ended: &mut Vec<Ended>,
    ) {
        let config = &self.inner.config;
        let pool = state.pool.get_or_insert_with(|| {
            tracing::debug!(prefix = %config.thread_name_prefix, "starting worker pool");
            WorkerPool::new(config.thread_name_prefix.clone(), config.worker_idle_timeout())
        });

        let dispatcher = self.clone();
        let work_call = Arc::clone(&call);
        let spawned = pool.execute(Box::new(move || dispatcher.run_call(&work_call)));

        if let Err(e) = spawned {
            tracing::error!(task = %call.task().id(), "could not start download worker: {}", e);
            state.remove_running(&call);
            ended.push(Ended {
                task: Arc::clone(call.task()),
                cause: EndCause::Error,
                error: Some(anyhow::Error::new(e).context("spawn download worker")),
            });
        }
    }

    fn run_call(&self, call: &Arc<dyn Call>) {
        let _finish = FinishGuard {
            dispatcher: self,
            call,
        };
        call.run(self);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            DispatchConfig::default(),
            Arc::new(IdleFactory),
            Arc::new(NullNotifier),
        )
    }

    #[test]
    #[should_panic(expected = "call wasn't in flight")]
    fn finishing_an_undispatched_call_panics() {
        let d = dispatcher();
        let call = IdleCall::new(DownloadTask::new("u").into(), true);
        d.finish(&call);
    }

    #[test]
    fn finish_follows_the_tracked_set_not_the_reported_mode() {
        let d = Dispatcher::new(
            DispatchConfig {
                max_concurrency: 1,
                ..DispatchConfig::default()
            },
            Arc::new(IdleFactory),
            Arc::new(NullNotifier),
        );
        // Reports sync, but holds the only async slot.
        let call = IdleCall::new(DownloadTask::new("a").into(), false);
        d.lock_state().running_async.push(Arc::clone(&call));
        d.enqueue(DownloadTask::new("b").into());
        assert_eq!(d.stats().ready, 1);

        d.finish(&call);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while d.stats().tracked() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(d.stats().tracked(), 0);
    }

    #[test]
    fn finish_removes_exactly_one_call() {
        let d = dispatcher();
        let a = IdleCall::new(DownloadTask::new("a").into(), true);
        let b = IdleCall::new(DownloadTask::new("b").into(), true);
        {
            let mut state = d.lock_state();
            state.running_async.push(Arc::clone(&a));
            state.running_async.push(Arc::clone(&b));
        }
        d.finish(&a);
        let stats = d.stats();
        assert_eq!(stats.running_async, 1);
        assert_eq!(stats.available(), d.max_concurrency() - 1);
    }

    #[test]
    fn zero_concurrency_is_clamped_to_one() {
        let d = Dispatcher::new(
            DispatchConfig {
                max_concurrency: 0,
                ..DispatchConfig::default()
            },
            Arc::new(IdleFactory),
            Arc::new(NullNotifier),
        );
        assert_eq!(d.max_concurrency(), 1);
    }

    #[test]
    fn sync_execute_leaves_nothing_tracked() {
        let d = dispatcher();
        d.execute(DownloadTask::new("u").into());
        let stats = d.stats();
        assert_eq!(stats.tracked(), 0);
        assert!(!stats.pool_started);
    }
}
