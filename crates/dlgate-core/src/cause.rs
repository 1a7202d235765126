//! Terminal causes reported for every submitted task.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::TaskId;

/// Why a task reached its terminal state.
///
/// The dispatcher itself produces `Canceled` (queued task removed),
/// `SameTaskBusy`, `FileBusy` and `Error` (worker could not be started);
/// runners produce the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndCause {
    Completed,
    Error,
    Canceled,
    /// Another tracked task targets the same file.
    FileBusy,
    /// The same task is already queued or running.
    SameTaskBusy,
}

impl EndCause {
    pub fn as_str(self) -> &'static str {
        match self {
            EndCause::Completed => "completed",
            EndCause::Error => "error",
            EndCause::Canceled => "canceled",
            EndCause::FileBusy => "file_busy",
            EndCause::SameTaskBusy => "same_task_busy",
        }
    }
}

impl fmt::Display for EndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Owned terminal event, for notifiers that forward events elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEnd {
    pub task_id: TaskId,
    pub url: String,
    pub cause: EndCause,
    /// Rendered error chain when the cause carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cause_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&EndCause::SameTaskBusy).unwrap(),
            "\"SAME_TASK_BUSY\""
        );
        assert_eq!(
            serde_json::to_string(&EndCause::FileBusy).unwrap(),
            "\"FILE_BUSY\""
        );
    }

    #[test]
    fn task_end_omits_missing_error() {
        let task = crate::task::DownloadTask::new("https://example.com/a");
        let end = TaskEnd {
            task_id: task.id(),
            url: "https://example.com/a".into(),
            cause: EndCause::Canceled,
            error: None,
        };
        let json = serde_json::to_string(&end).unwrap();
        let expected = format!(
            r#"{{"task_id":{},"url":"https://example.com/a","cause":"CANCELED"}}"#,
            task.id().get()
        );
        assert_eq!(json, expected);
    }
}
