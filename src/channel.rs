// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Unbuffered, typed rendezvous channels.

use crate::error::{scheduler_misuse, ChannelClosed};
use crate::scheduler::Scheduler;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Inner<T> {
    send_q: VecDeque<(crate::task::TaskRef, T)>,
    recv_q: VecDeque<crate::task::TaskRef>,
    closed: bool,
}

/// An unbuffered rendezvous channel: `send` and `recv` only ever complete by
/// pairing a sender with a receiver, directly or by parking until one shows
/// up. No internal buffer and no `select` across channels — deliberately
/// unbuffered, one channel at a time.
pub struct Channel<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Creates a new, open, unbuffered channel.
#[must_use]
pub fn make_channel<T: Send + 'static>() -> Channel<T> {
    Channel {
        inner: Arc::new(Mutex::new(Inner {
            send_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            closed: false,
        })),
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Sends `value`, blocking the calling task until a receiver takes it.
    ///
    /// If a receiver is already parked waiting, the rendezvous happens
    /// immediately and this call returns without the caller ever leaving the
    /// `Running` state.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if the channel is already closed, or if it
    /// is closed while this call is parked waiting for a receiver.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a running task.
    pub fn send(&self, value: T) -> Result<(), ChannelClosed> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ChannelClosed);
        }
        if let Some(receiver) = inner.recv_q.pop_front() {
            drop(inner);
            receiver.put_result(Some(value));
            Scheduler::unpark(&receiver);
            return Ok(());
        }

        let me = Scheduler::current_task().unwrap_or_else(|| scheduler_misuse("Channel::send"));
        inner.send_q.push_back((me.clone(), value));
        drop(inner);

        Scheduler::park_current();
        me.take_result::<Result<(), ChannelClosed>>()
    }

    /// Receives a value, blocking the calling task until a sender provides
    /// one or the channel is closed.
    ///
    /// Returns `None` once the channel is closed and no further values are
    /// pending.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a running task.
    pub fn recv(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((sender, value)) = inner.send_q.pop_front() {
            drop(inner);
            sender.put_result(Ok::<(), ChannelClosed>(()));
            Scheduler::unpark(&sender);
            return Some(value);
        }
        if inner.closed {
            return None;
        }

        let me = Scheduler::current_task().unwrap_or_else(|| scheduler_misuse("Channel::recv"));
        inner.recv_q.push_back(me.clone());
        drop(inner);

        Scheduler::park_current();
        me.take_result::<Option<T>>()
    }

    /// Closes the channel.
    ///
    /// Every parked receiver wakes with `None`. Every parked sender wakes
    /// with `Err(ChannelClosed)`. Any later `send` fails immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if the channel was already closed — closing
    /// is a one-shot operation, not idempotent.
    pub fn close(&self) -> Result<(), ChannelClosed> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ChannelClosed);
        }
        inner.closed = true;
        let receivers: Vec<_> = inner.recv_q.drain(..).collect();
        let senders: Vec<_> = inner.send_q.drain(..).collect();
        drop(inner);

        for task in receivers {
            task.put_result::<Option<T>>(None);
            Scheduler::unpark(&task);
        }
        for (task, _value) in senders {
            task.put_result::<Result<(), ChannelClosed>>(Err(ChannelClosed));
            Scheduler::unpark(&task);
        }
        Ok(())
    }

    /// `true` once `close` has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{go, run};
    use std::sync::Mutex as StdMutex;

    #[test]
    fn direct_rendezvous_does_not_park_the_sender() {
        let c = make_channel::<i32>();
        let received = Arc::new(StdMutex::new(None));
        let received2 = Arc::clone(&received);
        let c2 = c.clone();

        go(move || {
            *received2.lock().unwrap() = c2.recv();
        });
        go(move || {
            c.send(42).unwrap();
        });
        run();

        assert_eq!(*received.lock().unwrap(), Some(42));
    }

    #[test]
    fn close_wakes_pending_receiver_with_none() {
        let c = make_channel::<i32>();
        let saw_close = Arc::new(StdMutex::new(false));
        let saw_close2 = Arc::clone(&saw_close);
        let c2 = c.clone();

        go(move || {
            *saw_close2.lock().unwrap() = c2.recv().is_none();
        });
        go(move || {
            c.close().unwrap();
        });
        run();

        assert!(*saw_close.lock().unwrap());
    }

    #[test]
    fn second_close_fails() {
        let c = make_channel::<i32>();
        assert!(c.close().is_ok());
        assert_eq!(c.close(), Err(ChannelClosed));
    }

    #[test]
    fn send_after_close_fails() {
        let c = make_channel::<i32>();
        c.close().unwrap();
        assert_eq!(c.send(1), Err(ChannelClosed));
    }
}
