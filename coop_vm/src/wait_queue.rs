// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wait queues.
//!
//! A wait queue is a FIFO of suspended threads owned by the domain. A thread is in at most one
//! queue at a time; the queue holds the link and the thread keeps a back-reference so that
//! [`Domain::abort`] can unlink it.

use alloc::collections::VecDeque;
use core::fmt;

use crate::domain::Domain;
use crate::thread::{ThreadId, ThreadStateError};
use crate::vm::RunOutcome;

/// Identifies a wait queue within its domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueId(pub(crate) u32);

impl QueueId {
    /// Returns the queue's creation index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    waiters: VecDeque<ThreadId>,
}

/// A woken thread and how its run ended.
pub type Woken = (ThreadId, RunOutcome);

impl Domain {
    /// Creates an empty wait queue.
    pub fn create_queue(&mut self) -> QueueId {
        let id = QueueId(self.queues.len() as u32);
        self.queues.push(WaitQueue::default());
        id
    }

    /// Number of waiters, or `None` if `queue` does not belong to this domain.
    #[must_use]
    pub fn queue_len(&self, queue: QueueId) -> Option<usize> {
        self.queues.get(queue.index()).map(|q| q.waiters.len())
    }

    /// Returns `true` if `queue` has no waiters.
    ///
    /// # Panics
    ///
    /// Panics if `queue` does not belong to this domain.
    #[must_use]
    pub fn queue_is_empty(&self, queue: QueueId) -> bool {
        self.queues[queue.index()].waiters.is_empty()
    }

    /// Marks `thread` suspended and appends it to `queue`.
    ///
    /// A thread already waiting elsewhere moves to `queue`. Any abort callback is dropped:
    /// aborting a queued thread only unlinks it.
    pub fn queue_suspend(&mut self, queue: QueueId, thread: ThreadId) {
        let slot = &mut self.threads[thread.index()];
        let previous = slot.wait_queue.replace(queue);
        slot.abort_fn = None;
        slot.suspended = true;
        if let Some(previous) = previous {
            self.unlink_waiter(previous, thread);
        }
        self.queues[queue.index()].waiters.push_back(thread);
    }

    /// Returns the thread that would wake next, without removing it.
    #[must_use]
    pub fn queue_next(&self, queue: QueueId) -> Option<ThreadId> {
        self.queues[queue.index()].waiters.front().copied()
    }

    /// Removes the head of `queue` without running it.
    ///
    /// The thread stays suspended; continue it with [`Domain::resume`].
    pub fn queue_pop(&mut self, queue: QueueId) -> Option<ThreadId> {
        let thread = self.queues[queue.index()].waiters.pop_front()?;
        self.threads[thread.index()].wait_queue = None;
        Some(thread)
    }

    /// Wakes the head of `queue` and runs it.
    ///
    /// Returns `Ok(None)` if the queue is empty. Fails with [`ThreadStateError::Running`],
    /// leaving the queue untouched, if the head is the thread currently executing.
    pub fn queue_resume_void(
        &mut self,
        queue: QueueId,
    ) -> Result<Option<Woken>, ThreadStateError> {
        self.queue_wake(queue, None)
    }

    /// Like [`Domain::queue_resume_void`], but first hands `value` to the head as the result of
    /// the native call it is suspended in.
    ///
    /// A head with no pending result slot is woken without one.
    pub fn queue_resume_int(
        &mut self,
        queue: QueueId,
        value: i32,
    ) -> Result<Option<Woken>, ThreadStateError> {
        self.queue_wake(queue, Some(value))
    }

    fn queue_wake(
        &mut self,
        queue: QueueId,
        value: Option<i32>,
    ) -> Result<Option<Woken>, ThreadStateError> {
        let Some(head) = self.queue_next(queue) else {
            return Ok(None);
        };
        if self.threads[head.index()].state.is_none() {
            return Err(ThreadStateError::Running);
        }
        self.queue_pop(queue);
        if let Some(value) = value {
            match self.set_resume_int(head, value) {
                Ok(()) | Err(ThreadStateError::NotStarted | ThreadStateError::NoPendingResult) => {}
                Err(e) => return Err(e),
            }
        }
        let outcome = self.resume_unchecked(head)?;
        Ok(Some((head, outcome)))
    }

    /// Moves the head of `from` to the back of `to` without waking it.
    pub fn queue_transfer_next(&mut self, from: QueueId, to: QueueId) -> Option<ThreadId> {
        if from == to {
            return self.queue_next(from);
        }
        let thread = self.queues[from.index()].waiters.pop_front()?;
        self.threads[thread.index()].wait_queue = Some(to);
        self.queues[to.index()].waiters.push_back(thread);
        Some(thread)
    }

    /// Moves every waiter of `from` to the back of `to`, preserving order.
    pub fn queue_transfer_all(&mut self, from: QueueId, to: QueueId) {
        if from == to {
            return;
        }
        let moved = core::mem::take(&mut self.queues[from.index()].waiters);
        for &thread in &moved {
            self.threads[thread.index()].wait_queue = Some(to);
        }
        self.queues[to.index()].waiters.extend(moved);
    }

    /// Empties `queue`. The removed threads stay suspended.
    pub fn queue_reset(&mut self, queue: QueueId) {
        let removed = core::mem::take(&mut self.queues[queue.index()].waiters);
        for thread in removed {
            self.threads[thread.index()].wait_queue = None;
        }
    }

    pub(crate) fn unlink_waiter(&mut self, queue: QueueId, thread: ThreadId) {
        let waiters = &mut self.queues[queue.index()].waiters;
        if let Some(pos) = waiters.iter().position(|&t| t == thread) {
            waiters.remove(pos);
        }
    }
}
