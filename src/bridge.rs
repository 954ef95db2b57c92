// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The syscall-offload bridge: a thread pool that runs blocking calls on
//! behalf of parked tasks so the single-threaded scheduler never blocks.
//!
//! A shared job queue that idle workers block on doubles as the pending
//! queue for the next idle worker, and the pool grows on demand up to a
//! fixed cap rather than pre-spawning every worker.

use crate::task::TaskRef;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Default worker cap.
pub const DEFAULT_CAPACITY: usize = 64;

type Job = Box<dyn FnOnce() -> Box<dyn Any + Send> + Send>;
type JobOutcome = Result<Box<dyn Any + Send>, Box<dyn Any + Send>>;

pub(crate) struct Completion {
    pub(crate) task: TaskRef,
    pub(crate) outcome: JobOutcome,
}

struct Descriptor {
    task: TaskRef,
    job: Job,
}

#[derive(Default)]
struct PoolState {
    spawned: usize,
    busy: usize,
}

pub(crate) struct SyscallBridge {
    cap: usize,
    state: Arc<Mutex<PoolState>>,
    outstanding: AtomicUsize,
    job_tx: crossbeam_channel::Sender<Descriptor>,
    job_rx: crossbeam_channel::Receiver<Descriptor>,
    completion_tx: crossbeam_channel::Sender<Completion>,
    pub(crate) completion_rx: crossbeam_channel::Receiver<Completion>,
}

impl SyscallBridge {
    pub(crate) fn new(cap: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            cap: cap.max(1),
            state: Arc::new(Mutex::new(PoolState::default())),
            outstanding: AtomicUsize::new(0),
            job_tx,
            job_rx,
            completion_tx,
            completion_rx,
        }
    }

    /// Number of syscalls submitted but not yet completed.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Call once per `Completion` taken off `completion_rx`.
    pub(crate) fn mark_completed(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Hands `job` off to a worker thread, spawning a new one if the pool
    /// looks saturated and the cap allows it.
    pub(crate) fn submit(&self, task: TaskRef, job: Job) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.busy >= state.spawned && state.spawned < self.cap {
            state.spawned += 1;
            self.spawn_worker();
        }
        drop(state);

        tracing::trace!(task = %task.id(), "submitting syscall to bridge");
        self.job_tx
            .send(Descriptor { task, job })
            .expect("bridge worker threads are never all dropped while the bridge is alive");
    }

    fn spawn_worker(&self) {
        let job_rx = self.job_rx.clone();
        let completion_tx = self.completion_tx.clone();
        let state = Arc::clone(&self.state);
        thread::Builder::new()
            .name("corun-bridge-worker".into())
            .spawn(move || {
                while let Ok(desc) = job_rx.recv() {
                    state.lock().unwrap().busy += 1;
                    tracing::trace!(task = %desc.task.id(), "bridge worker running syscall");
                    let outcome = panic::catch_unwind(AssertUnwindSafe(desc.job));
                    state.lock().unwrap().busy -= 1;
                    completion_tx
                        .send(Completion {
                            task: desc.task,
                            outcome,
                        })
                        .ok();
                }
            })
            .expect("failed to spawn bridge worker thread");
    }
}
