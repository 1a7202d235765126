//! Cooperative cancellation: shared cancel tokens and the abort error runners return.
//!
//! Every task owns a `CancelToken`. The dispatcher sets it when a running call
//! is canceled; the runner polls it and stops at the next safe point. Nothing
//! in this crate interrupts a worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error a runner returns when it stopped because its task was canceled.
#[derive(Debug, thiserror::Error)]
#[error("job aborted by user")]
pub struct JobAborted;

/// Cheaply cloneable cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(JobAborted)` once cancellation was requested, for `?` at checkpoints.
    pub fn check(&self) -> Result<(), JobAborted> {
        if self.is_canceled() {
            Err(JobAborted)
        } else {
            Ok(())
        }
    }
}
