pub mod config;
pub mod logging;

pub mod call;
pub mod cancel;
pub mod cause;
pub mod dispatcher;
pub mod notify;
pub mod pool;
pub mod task;

pub use call::{Call, CallFactory, RunnerCall, RunnerCallFactory, TaskRunner};
pub use cancel::{CancelToken, JobAborted};
pub use cause::{EndCause, TaskEnd};
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use notify::{ChannelNotifier, CompletionNotifier, LoggingNotifier};
pub use task::{DownloadTask, TaskBuilder, TaskId};
