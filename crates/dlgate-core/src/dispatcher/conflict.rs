//! Conflict detection across the tracked sets.
//!
//! Admission scans `ready`, then `running_async`, then `running_sync`, and the
//! first call that shares the candidate's identity (`SameTaskBusy`) or target
//! path (`FileBusy`) decides. Within one call identity is checked first.

use std::sync::Arc;

use super::state::DispatchState;
use crate::call::Call;
use crate::cause::EndCause;
use crate::task::DownloadTask;

fn inspect<'a>(
    task: &DownloadTask,
    calls: impl IntoIterator<Item = &'a Arc<dyn Call>>,
) -> Option<EndCause> {
    calls.into_iter().find_map(|call| {
        let other = call.task();
        if other.id() == task.id() {
            Some(EndCause::SameTaskBusy)
        } else if other.same_path_as(task) {
            Some(EndCause::FileBusy)
        } else {
            None
        }
    })
}

/// Admission check: the cause to reject `task` with, if any.
pub(crate) fn inspect_for_conflict(task: &DownloadTask, state: &DispatchState) -> Option<EndCause> {
    inspect(task, state.ready.iter())
        .or_else(|| inspect(task, &state.running_async))
        .or_else(|| inspect(task, &state.running_sync))
}

/// Post-start check: another running task already targets `task`'s path.
/// Queued calls are not considered.
pub(crate) fn file_conflict_after_run(task: &DownloadTask, state: &DispatchState) -> bool {
    if task.path().is_none() {
        return false;
    }
    state
        .running()
        .any(|call| call.task().id() != task.id() && call.task().same_path_as(task))
}
