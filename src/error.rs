// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

/// Returned by [`crate::Channel::send`] and [`crate::Channel::close`] when the
/// channel is already closed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelClosed;

impl fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("send on closed channel")
    }
}

impl std::error::Error for ChannelClosed {}

/// Panic payload raised when a scheduler-only operation (`yield_now`, a channel
/// op, `enter_syscall`) is invoked without a running task to resolve it against.
///
/// This is a programmer error rather than a recoverable condition, so it is
/// raised with [`std::panic::panic_any`] instead of returned as a `Result`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedulerMisuse(pub String);

impl fmt::Display for SchedulerMisuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler misuse: {}", self.0)
    }
}

impl std::error::Error for SchedulerMisuse {}

#[track_caller]
pub(crate) fn scheduler_misuse(what: &str) -> ! {
    let err = SchedulerMisuse(format!("{what} called from outside a running task"));
    // Panic with the rendered message rather than the struct itself: the
    // default panic hook only prints `&str`/`String` payloads, and this
    // panic is meant to be read, not caught and downcast.
    std::panic::panic_any(err.to_string())
}

/// Captured outcome of a task whose entry closure panicked.
///
/// Stored on the [`crate::TaskHandle`] once the task reaches the `Dead` state;
/// never propagates into the scheduler loop itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskFailure {
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// Extracts a human-readable message from a `catch_unwind` panic payload.
pub(crate) fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
