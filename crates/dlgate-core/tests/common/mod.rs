//! Shared fixtures for dispatcher integration tests.

#![allow(dead_code)]

pub mod gated_runner;
pub mod recorder;

use std::thread;
use std::time::{Duration, Instant};

/// Generous upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `cond` until it holds or `timeout` elapses; returns its final value.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
