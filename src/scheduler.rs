// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The single-threaded cooperative scheduler: a FIFO run queue, a
//! thread-per-task execution context, and the main pump loop.

use crate::bridge::SyscallBridge;
use crate::error::{describe_panic, scheduler_misuse, TaskFailure};
use crate::task::{TaskHandle, TaskRef, TaskState};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

thread_local! {
    /// The task whose dedicated OS thread is the one currently executing.
    /// `None` on any thread that is not a task's own thread (the outer
    /// program thread, a bridge worker, ...).
    static CURRENT_TASK: RefCell<Option<TaskRef>> = const { RefCell::new(None) };
}

/// Outcome of a single resume step, reported by a task's own thread back to
/// the scheduler thread that resumed it.
enum StepOutcome {
    Yielded,
    Parked,
    Finished,
}

struct SchedulerState {
    run_queue: VecDeque<TaskRef>,
    pending_main: Option<Box<dyn FnOnce() + Send>>,
}

/// Owns the run queue, the syscall bridge, and the main pump loop.
///
/// A `Scheduler` is single-threaded cooperative: exactly one task is ever
/// `Running` at a time, and suspension only ever happens at `yield_now`, a
/// parking channel op, `enter_syscall`, or task termination.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    bridge: SyscallBridge,
    step_tx: crossbeam_channel::Sender<StepOutcome>,
    step_rx: crossbeam_channel::Receiver<StepOutcome>,
}

impl Scheduler {
    pub(crate) fn new(bridge_capacity: usize) -> Arc<Self> {
        let (step_tx, step_rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                run_queue: VecDeque::new(),
                pending_main: None,
            }),
            bridge: SyscallBridge::new(bridge_capacity),
            step_tx,
            step_rx,
        })
    }

    /// Marks `fn` as the program's entry task; spawned right before the next
    /// `run()` call pumps the scheduler.
    pub(crate) fn set_main_task(&self, f: Box<dyn FnOnce() + Send>) {
        self.state.lock().unwrap().pending_main = Some(f);
    }

    /// Creates a task, starts its dedicated OS thread (parked on its run
    /// gate), and enqueues it at the tail of the run queue. Never runs it
    /// inline.
    pub(crate) fn spawn(self: &Arc<Self>, f: Box<dyn FnOnce() + Send>) -> TaskHandle {
        let weak: Weak<Scheduler> = Arc::downgrade(self);
        let task = TaskRef::new(&weak);

        let thread_task = task.clone();
        let handle = std::thread::Builder::new()
            .name(thread_task.id().to_string())
            .spawn(move || task_main(thread_task, f))
            .expect("failed to spawn task thread");
        task.set_thread(handle);

        tracing::trace!(task = %task.id(), "spawned");
        self.enqueue_runnable(task.clone());
        TaskHandle(task)
    }

    fn enqueue_runnable(&self, task: TaskRef) {
        task.set_state(TaskState::Runnable);
        self.state.lock().unwrap().run_queue.push_back(task);
    }

    /// The task whose own OS thread is calling this, if any.
    pub(crate) fn current_task() -> Option<TaskRef> {
        CURRENT_TASK.with(|c| c.borrow().clone())
    }

    /// Re-enqueues the calling task at the tail of the run queue and blocks
    /// its thread until the scheduler resumes it again.
    pub(crate) fn yield_now() {
        let task = Self::current_task().unwrap_or_else(|| scheduler_misuse("yield_now"));
        let scheduler = task.scheduler();
        scheduler.enqueue_runnable(task.clone());
        scheduler
            .step_tx
            .send(StepOutcome::Yielded)
            .expect("scheduler thread gone while yielding");
        task.wait_for_run();
    }

    /// Suspends the calling task without re-enqueueing it; some other actor
    /// (a channel counterparty, `close`, or a completed bridge descriptor)
    /// must call `unpark` later.
    pub(crate) fn park_current() {
        let task = Self::current_task().unwrap_or_else(|| scheduler_misuse("a channel operation"));
        task.set_state(TaskState::Parked);
        task.scheduler()
            .step_tx
            .send(StepOutcome::Parked)
            .expect("scheduler thread gone while parking");
        task.wait_for_run();
    }

    /// Makes a parked task runnable again. Safe to call from another task's
    /// thread or from the scheduler's own bridge-drain step.
    pub(crate) fn unpark(task: &TaskRef) {
        task.scheduler().enqueue_runnable(task.clone());
    }

    pub(crate) fn submit_syscall(
        task: TaskRef,
        job: Box<dyn FnOnce() -> Box<dyn Any + Send> + Send>,
    ) {
        task.scheduler().bridge.submit(task, job);
    }

    /// Resumes `task` and blocks until it yields, parks, or finishes.
    fn resume(&self, task: TaskRef) {
        task.set_state(TaskState::Running);
        let _span = tracing::trace_span!("resume", task = %task.id()).entered();
        task.signal_run();
        match self.step_rx.recv().expect("task thread vanished mid-step") {
            StepOutcome::Yielded | StepOutcome::Parked => {}
            StepOutcome::Finished => {
                tracing::trace!(task = %task.id(), "dead");
            }
        }
    }

    fn drain_bridge_completions(&self) {
        while let Ok(completion) = self.bridge.completion_rx.try_recv() {
            self.bridge.mark_completed();
            tracing::trace!(task = %completion.task.id(), "syscall completed");
            completion.task.put_result(completion.outcome);
            Self::unpark(&completion.task);
        }
    }

    /// Pumps the scheduler: spawns the marked main task (if any), then loops
    /// draining bridge completions and resuming the run queue head until the
    /// run queue is empty and no bridge work is outstanding.
    pub(crate) fn run(self: &Arc<Self>) {
        let main = self.state.lock().unwrap().pending_main.take();
        if let Some(f) = main {
            self.spawn(f);
        }

        loop {
            self.drain_bridge_completions();

            let next = self.state.lock().unwrap().run_queue.pop_front();
            match next {
                Some(task) => self.resume(task),
                None if self.bridge.outstanding() > 0 => {
                    let completion = self
                        .bridge
                        .completion_rx
                        .recv()
                        .expect("bridge has outstanding work but no worker can ever complete it");
                    self.bridge.mark_completed();
                    tracing::trace!(task = %completion.task.id(), "syscall completed");
                    completion.task.put_result(completion.outcome);
                    Self::unpark(&completion.task);
                }
                None => break,
            }
        }
    }
}

fn task_main(task: TaskRef, entry: Box<dyn FnOnce() + Send>) {
    task.wait_for_run();
    CURRENT_TASK.with(|c| *c.borrow_mut() = Some(task.clone()));

    let result = panic::catch_unwind(AssertUnwindSafe(entry));

    task.set_state(TaskState::Dead);
    if let Err(payload) = result {
        task.record_failure(TaskFailure {
            message: describe_panic(payload.as_ref()),
        });
    }

    task.scheduler()
        .step_tx
        .send(StepOutcome::Finished)
        .expect("scheduler thread gone while finishing");
}
