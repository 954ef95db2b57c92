// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `corun`: a Go-style concurrency runtime.
//!
//! Cheap user-space tasks (`go`), unbuffered rendezvous channels
//! (`make_channel`), a cooperative `yield_now`, and a syscall-offload bridge
//! (`enter_syscall`) so a blocking call never stalls the scheduler.
//!
//! A task is a dedicated OS thread gated by a condvar baton: at any moment
//! exactly one task's thread holds the baton and every other task thread is
//! parked waiting for it. This gives goroutine-style suspend/resume without
//! stack switching, at the cost of one OS thread per live task — see
//! `DESIGN.md` for why that tradeoff was chosen over stackful fibers.
//!
//! Every free function here resolves against an *ambient* runtime: called
//! from inside a task, it targets that task's own scheduler; called from
//! plain top-level code, it targets a runtime created lazily per OS thread.
//! There is no hidden process-wide singleton, and each `#[test]` function
//! (which the standard harness already runs on its own OS thread) gets an
//! isolated runtime for free.

mod bridge;
mod channel;
mod error;
mod scheduler;
mod task;

use scheduler::Scheduler;
use std::any::Any;
use std::cell::RefCell;
use std::panic;
use std::sync::Arc;

pub use channel::{make_channel, Channel};
pub use error::{ChannelClosed, SchedulerMisuse, TaskFailure};
pub use task::{TaskHandle, TaskId, TaskState};

/// An isolated instance of the runtime: its own run queue and its own
/// syscall bridge. Most programs never construct one directly and use the
/// ambient free functions instead; `Runtime` exists for tests and embedders
/// that want more than one independent scheduler in the same process.
pub struct Runtime {
    scheduler: Arc<Scheduler>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime with the default bridge capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bridge_capacity(bridge::DEFAULT_CAPACITY)
    }

    /// Creates a runtime whose syscall bridge never grows past `capacity`
    /// worker threads.
    #[must_use]
    pub fn with_bridge_capacity(capacity: usize) -> Self {
        Self {
            scheduler: Scheduler::new(capacity),
        }
    }

    /// Spawns `f` as a new task on this runtime. Returns immediately; `f`
    /// runs the next time this runtime's scheduler reaches it in `run`.
    pub fn go<F>(&self, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.spawn(Box::new(f))
    }

    /// Marks `f` as this runtime's entry task. Call before `run`.
    pub fn main_task<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.set_main_task(Box::new(f));
    }

    /// Pumps this runtime's scheduler until its run queue is empty and its
    /// syscall bridge is idle.
    pub fn run(&self) {
        self.scheduler.run();
    }
}

thread_local! {
    /// The runtime an OS thread falls back to when no task's own scheduler
    /// is available — i.e. when a free function is called from plain
    /// top-level code rather than from inside a running task.
    static DEFAULT_RUNTIME: RefCell<Option<Arc<Scheduler>>> = const { RefCell::new(None) };
}

/// Resolves the scheduler a free function should act on: the current
/// task's own scheduler if called from inside a task, otherwise this OS
/// thread's lazily created default runtime.
fn ambient_scheduler() -> Arc<Scheduler> {
    if let Some(task) = Scheduler::current_task() {
        return task.scheduler();
    }
    DEFAULT_RUNTIME.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.get_or_insert_with(|| Scheduler::new(bridge::DEFAULT_CAPACITY))
            .clone()
    })
}

/// Spawns `f` as a new task on the ambient runtime.
///
/// Returns immediately without running `f`; the task becomes runnable and
/// starts executing the next time `run` pumps its scheduler.
pub fn go<F>(f: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    ambient_scheduler().spawn(Box::new(f))
}

/// Suspends the calling task, re-enqueues it at the tail of the run queue,
/// and lets another runnable task go next.
///
/// # Panics
///
/// Panics if called from outside a running task.
pub fn yield_now() {
    Scheduler::yield_now();
}

/// Marks `f` as the ambient runtime's entry task. Call before `run`.
pub fn main_task<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    ambient_scheduler().set_main_task(Box::new(f));
}

/// Pumps the ambient runtime's scheduler until its run queue is empty and
/// its syscall bridge is idle.
pub fn run() {
    ambient_scheduler().run();
}

/// Runs `f` on the syscall bridge's thread pool, parking the calling task
/// until it completes.
///
/// Use this to wrap a blocking call (file I/O, a blocking network call, a
/// CPU-bound computation that should not monopolize the scheduler thread)
/// so the rest of the runtime keeps making progress while it runs.
///
/// # Panics
///
/// Panics if called from outside a running task. Re-raises `f`'s panic (via
/// [`std::panic::resume_unwind`], preserving the original payload) in the
/// calling task if `f` panics on the bridge thread.
pub fn enter_syscall<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let task = Scheduler::current_task().unwrap_or_else(|| error::scheduler_misuse("enter_syscall"));
    let job: Box<dyn FnOnce() -> Box<dyn Any + Send> + Send> =
        Box::new(move || Box::new(f()) as Box<dyn Any + Send>);
    Scheduler::submit_syscall(task.clone(), job);
    Scheduler::park_current();

    match task.take_result::<Result<Box<dyn Any + Send>, Box<dyn Any + Send>>>() {
        Ok(boxed) => *boxed
            .downcast::<R>()
            .unwrap_or_else(|_| panic!("enter_syscall result had the wrong type")),
        Err(payload) => panic::resume_unwind(payload),
    }
}
