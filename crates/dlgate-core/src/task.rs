//! Download task model: identity, target path, priority and cancel flag.
//!
//! A task is owned by the caller and shared with the dispatcher as
//! `Arc<DownloadTask>`. Identity is a process-unique `TaskId` allocated at
//! construction; two tasks built from the same URL are still distinct tasks.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::cancel::CancelToken;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Returned by [`DownloadTask::bind_path`] when the path was already bound.
#[derive(Debug, thiserror::Error)]
#[error("task {task} already targets {}", .existing.display())]
pub struct PathAlreadyBound {
    pub task: TaskId,
    pub existing: PathBuf,
}

/// One download job as seen by the dispatcher.
pub struct DownloadTask {
    id: TaskId,
    url: String,
    path: OnceLock<PathBuf>,
    priority: i32,
    cancel: CancelToken,
}

impl DownloadTask {
    /// Task with no target path yet and priority 0.
    pub fn new(url: impl Into<String>) -> Self {
        Self::builder(url).build()
    }

    pub fn builder(url: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            url: url.into(),
            path: None,
            priority: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Target file, if known. May become `Some` later via [`bind_path`](Self::bind_path).
    pub fn path(&self) -> Option<&Path> {
        self.path.get().map(PathBuf::as_path)
    }

    /// Late-bind the target path (e.g. once the response headers name the file).
    /// A path can be bound only once.
    pub fn bind_path(&self, path: impl Into<PathBuf>) -> Result<(), PathAlreadyBound> {
        self.path.set(path.into()).map_err(|_| PathAlreadyBound {
            task: self.id,
            existing: self.path.get().cloned().unwrap_or_default(),
        })
    }

    /// Higher runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// True when both tasks target the same non-empty file path.
    pub(crate) fn same_path_as(&self, other: &DownloadTask) -> bool {
        match (self.path(), other.path()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("path", &self.path())
            .field("priority", &self.priority)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// Builder for [`DownloadTask`].
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    url: String,
    path: Option<PathBuf>,
    priority: i32,
}

impl TaskBuilder {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> DownloadTask {
        let path = OnceLock::new();
        if let Some(p) = self.path {
            let _ = path.set(p);
        }
        DownloadTask {
            id: TaskId::next(),
            url: self.url,
            path,
            priority: self.priority,
            cancel: CancelToken::new(),
        }
    }

    /// Build straight into the shared form the dispatcher takes.
    pub fn into_shared(self) -> Arc<DownloadTask> {
        Arc::new(self.build())
    }
}
