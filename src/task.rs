// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::TaskFailure;
use crate::scheduler::Scheduler;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;

static_assertions::assert_impl_all!(TaskRef: Send, Sync);
static_assertions::assert_impl_all!(TaskHandle: Send, Sync);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A monotonically increasing task identifier, useful as a debug aid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of this id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a [`Task`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    /// Queued for execution, waiting for the scheduler to reach it.
    Runnable,
    /// Currently the one task executing on the scheduler thread's behalf.
    Running,
    /// Suspended on a channel op or a syscall, referenced by exactly one wait
    /// structure.
    Parked,
    /// Entry closure returned or panicked; holds no context.
    Dead,
}

/// A single task's private "run gate": the scheduler flips it open and the
/// task's own OS thread blocks on it whenever it is not the one task allowed
/// to make progress. This is the task's resumable execution context.
struct RunGate {
    may_run: Mutex<bool>,
    cv: Condvar,
}

impl RunGate {
    fn new() -> Self {
        Self {
            may_run: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut may_run = self.may_run.lock().unwrap();
        *may_run = true;
        self.cv.notify_one();
    }

    fn wait_until_open(&self) {
        let mut may_run = self.may_run.lock().unwrap();
        while !*may_run {
            may_run = self.cv.wait(may_run).unwrap();
        }
        *may_run = false;
    }
}

pub(crate) struct TaskInner {
    id: TaskId,
    state: Mutex<TaskState>,
    gate: RunGate,
    result_slot: Mutex<Option<Box<dyn Any + Send>>>,
    failure: Mutex<Option<TaskFailure>>,
    scheduler: Weak<Scheduler>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// A reference-counted handle to a task, shared between the scheduler, any
/// wait structure it is parked on, and its own dedicated OS thread.
#[derive(Clone)]
pub struct TaskRef(pub(crate) Arc<TaskInner>);

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.0.id)
            .field("state", &*self.0.state.lock().unwrap())
            .finish()
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl TaskRef {
    pub(crate) fn new(scheduler: &Weak<Scheduler>) -> Self {
        TaskRef(Arc::new(TaskInner {
            id: TaskId::next(),
            state: Mutex::new(TaskState::Runnable),
            gate: RunGate::new(),
            result_slot: Mutex::new(None),
            failure: Mutex::new(None),
            scheduler: scheduler.clone(),
            thread: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn state(&self) -> TaskState {
        *self.0.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *self.0.state.lock().unwrap() = state;
    }

    pub(crate) fn scheduler(&self) -> Arc<Scheduler> {
        self.0
            .scheduler
            .upgrade()
            .expect("task outlived its scheduler")
    }

    pub(crate) fn set_thread(&self, handle: JoinHandle<()>) {
        *self.0.thread.lock().unwrap() = Some(handle);
    }

    /// Opens this task's run gate, letting its dedicated OS thread make
    /// progress until it next yields, parks, or terminates.
    pub(crate) fn signal_run(&self) {
        self.0.gate.open();
    }

    /// Blocks the calling (task) thread until the scheduler opens the gate
    /// again.
    pub(crate) fn wait_for_run(&self) {
        self.0.gate.wait_until_open();
    }

    /// Stores a value in this task's single-slot mailbox, to be read back by
    /// the task itself immediately after it wakes.
    pub(crate) fn put_result<T: Send + 'static>(&self, value: T) {
        *self.0.result_slot.lock().unwrap() = Some(Box::new(value));
    }

    /// Takes the value out of this task's mailbox.
    ///
    /// # Panics
    ///
    /// Panics if no value was stored, or if it was stored under a different
    /// type; both are internal bugs in this crate, never a user-facing error.
    pub(crate) fn take_result<T: Send + 'static>(&self) -> T {
        let boxed = self
            .0
            .result_slot
            .lock()
            .unwrap()
            .take()
            .expect("result slot was empty on wake");
        *boxed
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("result slot held the wrong type"))
    }

    pub(crate) fn record_failure(&self, failure: TaskFailure) {
        *self.0.failure.lock().unwrap() = Some(failure);
    }

    /// The captured panic, if this task's entry closure panicked. Only
    /// meaningful once `state() == TaskState::Dead`.
    #[must_use]
    pub fn failure(&self) -> Option<TaskFailure> {
        self.0.failure.lock().unwrap().clone()
    }
}

/// A handle to a spawned task, returned by [`crate::go`].
///
/// Dropping a `TaskHandle` does not affect the task: it keeps running (or
/// waiting) independently, matching Go's fire-and-forget goroutines.
#[derive(Clone, Debug)]
pub struct TaskHandle(pub(crate) TaskRef);

impl TaskHandle {
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.0.id()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.0.state()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.0.state(), TaskState::Dead)
    }

    /// The task's captured panic, if it failed. Always `None` while the task
    /// is still alive.
    #[must_use]
    pub fn failure(&self) -> Option<TaskFailure> {
        self.0.failure()
    }
}
