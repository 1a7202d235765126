//! RAII guard that reports a call as finished when dropped.

use std::sync::Arc;

use super::Dispatcher;
use crate::call::Call;

/// Calls [`Dispatcher::finish`] on drop, so a panicking `run` still frees its slot.
pub(super) struct FinishGuard<'a> {
    pub(super) dispatcher: &'a Dispatcher,
    pub(super) call: &'a Arc<dyn Call>,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.finish(self.call);
    }
}
