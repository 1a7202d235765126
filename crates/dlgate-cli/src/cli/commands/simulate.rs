//! `dlgate simulate` – push simulated download jobs through the dispatcher.
//!
//! Each job sleeps for the configured transfer time in small steps, checking
//! its cancel token between steps. Ctrl-C cancels everything still tracked.

use anyhow::Result;
use dlgate_core::config::DispatchConfig;
use dlgate_core::{
    ChannelNotifier, Dispatcher, DownloadTask, EndCause, JobAborted, TaskEnd, TaskRunner,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(20);
const PRIORITY_LEVELS: usize = 5;

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub jobs: usize,
    pub max_concurrency: Option<usize>,
    pub duration_ms: u64,
    pub shared_path_every: usize,
    pub sync: bool,
    pub json: bool,
}

/// Runner that "downloads" by sleeping; binds a per-job file name in `prepare`
/// when the job did not come with one, like a name learned from headers.
struct SimulatedRunner {
    duration: Duration,
    out_dir: PathBuf,
}

impl TaskRunner for SimulatedRunner {
    fn prepare(&self, task: &DownloadTask) -> Result<()> {
        if task.path().is_none() {
            task.bind_path(self.out_dir.join(format!("job-{}.bin", task.id().get())))?;
        }
        Ok(())
    }

    fn transfer(&self, task: &DownloadTask) -> Result<()> {
        let started = Instant::now();
        while started.elapsed() < self.duration {
            task.cancel_token().check()?;
            std::thread::sleep(TICK.min(self.duration));
        }
        if task.is_canceled() {
            return Err(JobAborted.into());
        }
        Ok(())
    }
}

/// Per-cause tally printed at the end of a run.
#[derive(Debug, Default, Serialize)]
pub(crate) struct Summary {
    pub(crate) submitted: usize,
    pub(crate) completed: usize,
    pub(crate) error: usize,
    pub(crate) canceled: usize,
    pub(crate) file_busy: usize,
    pub(crate) same_task_busy: usize,
    pub(crate) elapsed_ms: u128,
}

impl Summary {
    pub(crate) fn record(&mut self, cause: EndCause) {
        let slot = match cause {
            EndCause::Completed => &mut self.completed,
            EndCause::Error => &mut self.error,
            EndCause::Canceled => &mut self.canceled,
            EndCause::FileBusy => &mut self.file_busy,
            EndCause::SameTaskBusy => &mut self.same_task_busy,
        };
        *slot += 1;
    }
}

/// Build the i-th simulated job. Every `shared_every`-th job targets the shared file.
pub(crate) fn simulated_task(i: usize, shared_every: usize, out_dir: &std::path::Path) -> DownloadTask {
    let mut builder = DownloadTask::builder(format!("https://sim.invalid/file-{i}"))
        .priority((i % PRIORITY_LEVELS) as i32);
    if shared_every > 0 && i % shared_every == 0 {
        builder = builder.path(out_dir.join("shared.bin"));
    }
    builder.build()
}

fn print_event(event: &TaskEnd, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        match &event.error {
            Some(err) => println!("{:<8} {:<15} {}  ({})", event.task_id.get(), event.cause, event.url, err),
            None => println!("{:<8} {:<15} {}", event.task_id.get(), event.cause, event.url),
        }
    }
    Ok(())
}

pub async fn run_simulate(cfg: &DispatchConfig, opts: &SimulateOptions) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(n) = opts.max_concurrency {
        cfg.max_concurrency = n;
    }
    cfg.validate()?;

    let out_dir = std::env::temp_dir().join("dlgate-sim");
    let runner = Arc::new(SimulatedRunner {
        duration: Duration::from_millis(opts.duration_ms),
        out_dir: out_dir.clone(),
    });
    let (notifier, mut events) = ChannelNotifier::channel();
    let dispatcher = Dispatcher::with_runner(cfg, runner, Arc::new(notifier));
    tracing::info!(
        jobs = opts.jobs,
        max_concurrency = dispatcher.max_concurrency(),
        sync = opts.sync,
        "simulation started"
    );

    let started = Instant::now();
    for i in 0..opts.jobs {
        let task = Arc::new(simulated_task(i, opts.shared_path_every, &out_dir));
        if opts.sync {
            let d = dispatcher.clone();
            tokio::task::spawn_blocking(move || d.execute(task));
        } else {
            dispatcher.enqueue(task);
        }
    }
    if !opts.json {
        let stats = dispatcher.stats();
        println!(
            "submitted {} job(s): {} running, {} queued, {} sync",
            opts.jobs, stats.running_async, stats.ready, stats.running_sync
        );
    }

    let mut summary = Summary {
        submitted: opts.jobs,
        ..Summary::default()
    };
    let mut remaining = opts.jobs;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while remaining > 0 {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, opts.json)?;
                summary.record(event.cause);
                remaining -= 1;
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("interrupt received, canceling all jobs");
                dispatcher.cancel_all();
            }
        }
    }
    summary.elapsed_ms = started.elapsed().as_millis();

    if opts.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "done in {} ms: {} completed, {} canceled, {} file busy, {} same task busy, {} error",
            summary.elapsed_ms,
            summary.completed,
            summary.canceled,
            summary.file_busy,
            summary.same_task_busy,
            summary.error
        );
    }
    tracing::info!(completed = summary.completed, canceled = summary.canceled, "simulation finished");
    Ok(())
}
