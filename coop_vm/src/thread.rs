// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative script threads.
//!
//! A thread is a frame stack over one shared operand stack. It is idle when it has no frames,
//! suspended when a native callback parked it mid-call, and running while the interpreter holds
//! its state. Threads live in the domain and are addressed by [`ThreadId`].
//!
//! Functions taking a [`ThreadId`] panic if the id does not belong to this domain (for
//! example after [`Domain::clear`]).

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::domain::{Domain, DomainError};
use crate::function::Function;
use crate::object::ObjectError;
use crate::value::FuncId;
use crate::vm::{AbortReason, IntRun, RunOutcome};
use crate::wait_queue::QueueId;

/// Identifies a thread within its domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) u32);

impl ThreadId {
    /// Returns the thread's creation index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Callback fired once when a suspended thread is aborted.
pub type AbortFn = Rc<dyn Fn(&mut Domain, ThreadId)>;

/// One activation record.
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) function: Rc<Function>,
    /// `None` until the frame first runs.
    pub(crate) pc: Option<u32>,
    pub(crate) bp: u32,
    pub(crate) sp: u32,
}

/// The part of a thread the interpreter checks out while it runs.
#[derive(Debug, Default)]
pub(crate) struct ThreadState {
    pub(crate) frames: Vec<Frame>,
    pub(crate) stack: Vec<i32>,
}

pub(crate) struct ThreadSlot {
    /// `None` while the thread is running.
    pub(crate) state: Option<ThreadState>,
    pub(crate) vars: Vec<i32>,
    pub(crate) suspended: bool,
    pub(crate) wait_queue: Option<QueueId>,
    pub(crate) abort_fn: Option<AbortFn>,
    /// Abort requested while the thread was running; honored when control returns to it.
    pub(crate) pending_abort: Option<AbortReason>,
    pub(crate) join_queue: QueueId,
}

/// Misuse of the thread state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadStateError {
    /// The thread is currently executing.
    Running,
    /// The thread is not suspended.
    NotSuspended,
    /// The thread is parked in a wait queue; wake it through the queue.
    Enqueued,
    /// The thread has no frames.
    NotStarted,
    /// The suspended frame has no result slot to write.
    NoPendingResult,
    /// The function id is not registered.
    UnknownFunction(FuncId),
}

impl fmt::Display for ThreadStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("thread is running"),
            Self::NotSuspended => f.write_str("thread is not suspended"),
            Self::Enqueued => f.write_str("thread is waiting in a queue"),
            Self::NotStarted => f.write_str("thread has no frames"),
            Self::NoPendingResult => f.write_str("suspended frame has no result slot"),
            Self::UnknownFunction(id) => write!(f, "unknown function {id}"),
        }
    }
}

impl core::error::Error for ThreadStateError {}

impl Domain {
    /// Creates an idle thread with zeroed thread variables and its own join queue.
    pub fn create_thread(&mut self) -> ThreadId {
        let join_queue = self.create_queue();
        let id = ThreadId(self.threads.len() as u32);
        self.threads.push(ThreadSlot {
            state: Some(ThreadState::default()),
            vars: vec![0; self.thread_var_count],
            suspended: false,
            wait_queue: None,
            abort_fn: None,
            pending_abort: None,
            join_queue,
        });
        id
    }

    /// Returns `true` if `thread` belongs to this domain.
    #[must_use]
    pub fn thread_exists(&self, thread: ThreadId) -> bool {
        thread.index() < self.threads.len()
    }

    /// Number of threads created since the last [`Domain::clear`].
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// The thread whose bytecode or native callback is currently executing.
    #[must_use]
    pub fn active_thread(&self) -> Option<ThreadId> {
        self.active
    }

    /// Returns `true` while the interpreter is executing `thread` (possibly inside a nested
    /// run of another thread).
    #[must_use]
    pub fn is_running(&self, thread: ThreadId) -> bool {
        self.threads[thread.index()].state.is_none()
    }

    /// Returns `true` if `thread` is suspended.
    #[must_use]
    pub fn is_suspended(&self, thread: ThreadId) -> bool {
        self.threads[thread.index()].suspended
    }

    /// Returns `true` if `thread` has no frames and is not running.
    #[must_use]
    pub fn is_idle(&self, thread: ThreadId) -> bool {
        self.threads[thread.index()]
            .state
            .as_ref()
            .is_some_and(|s| s.frames.is_empty())
    }

    /// Frame stack depth, or `None` while the thread is running.
    #[must_use]
    pub fn frame_depth(&self, thread: ThreadId) -> Option<usize> {
        self.threads[thread.index()]
            .state
            .as_ref()
            .map(|s| s.frames.len())
    }

    /// The wait queue `thread` is parked in, if any.
    #[must_use]
    pub fn waiting_on(&self, thread: ThreadId) -> Option<QueueId> {
        self.threads[thread.index()].wait_queue
    }

    /// The queue other threads can wait on to join `thread`.
    #[must_use]
    pub fn join_queue(&self, thread: ThreadId) -> QueueId {
        self.threads[thread.index()].join_queue
    }

    /// Reads thread variable `index` of `thread`.
    #[must_use]
    pub fn thread_var(&self, thread: ThreadId, index: u8) -> Option<i32> {
        self.threads[thread.index()]
            .vars
            .get(usize::from(index))
            .copied()
    }

    /// Writes thread variable `index` of `thread`.
    pub fn set_thread_var(
        &mut self,
        thread: ThreadId,
        index: u8,
        value: i32,
    ) -> Result<(), DomainError> {
        let slot = self.threads[thread.index()]
            .vars
            .get_mut(usize::from(index))
            .ok_or(DomainError::NoSuchVariable { index })?;
        *slot = value;
        Ok(())
    }

    /// Pushes a fresh frame for `function` without running it.
    ///
    /// A thread that is suspended or still holds frames is aborted first, so its abort callback
    /// fires and it leaves any wait queue.
    pub fn start_void(
        &mut self,
        thread: ThreadId,
        function: FuncId,
    ) -> Result<(), ThreadStateError> {
        let f = self
            .function(function)
            .cloned()
            .ok_or(ThreadStateError::UnknownFunction(function))?;
        let slot = &self.threads[thread.index()];
        let Some(state) = slot.state.as_ref() else {
            return Err(ThreadStateError::Running);
        };
        if slot.suspended || !state.frames.is_empty() {
            self.abort(thread);
        }
        let state = self.threads[thread.index()]
            .state
            .as_mut()
            .ok_or(ThreadStateError::Running)?;
        state.frames.push(Frame {
            function: f,
            pc: None,
            bp: 0,
            sp: 0,
        });
        Ok(())
    }

    /// Starts `function` on `thread` and runs it until it completes, suspends or aborts.
    pub fn run_void(
        &mut self,
        thread: ThreadId,
        function: FuncId,
    ) -> Result<RunOutcome, ThreadStateError> {
        self.start_void(thread, function)?;
        let state = self.checkout(thread)?;
        Ok(self.run(thread, state))
    }

    /// Like [`Domain::run_void`], also returning the value in the entry frame's result slot.
    ///
    /// The value is only meaningful when the outcome is [`RunOutcome::Completed`]; a call-depth
    /// abort leaves 0 there.
    pub fn run_int(
        &mut self,
        thread: ThreadId,
        function: FuncId,
    ) -> Result<IntRun, ThreadStateError> {
        let outcome = self.run_void(thread, function)?;
        let value = self.result_int(thread).unwrap_or(0);
        Ok(IntRun { outcome, value })
    }

    /// The value in the entry frame's result slot, or `None` while `thread` is running.
    ///
    /// After an int function completes (synchronously or after any number of resumes) this is
    /// its return value.
    #[must_use]
    pub fn result_int(&self, thread: ThreadId) -> Option<i32> {
        self.threads[thread.index()]
            .state
            .as_ref()
            .map(|s| s.stack.first().copied().unwrap_or(0))
    }

    /// Continues a suspended thread that is not parked in a wait queue.
    ///
    /// The abort callback is dropped without firing. A suspended thread with no frames
    /// completes immediately.
    pub fn resume(&mut self, thread: ThreadId) -> Result<RunOutcome, ThreadStateError> {
        let slot = &self.threads[thread.index()];
        if slot.state.is_none() {
            return Err(ThreadStateError::Running);
        }
        if !slot.suspended {
            return Err(ThreadStateError::NotSuspended);
        }
        if slot.wait_queue.is_some() {
            return Err(ThreadStateError::Enqueued);
        }
        self.resume_unchecked(thread)
    }

    pub(crate) fn resume_unchecked(
        &mut self,
        thread: ThreadId,
    ) -> Result<RunOutcome, ThreadStateError> {
        let slot = &mut self.threads[thread.index()];
        slot.suspended = false;
        slot.abort_fn = None;
        if slot.state.as_ref().is_some_and(|s| s.frames.is_empty()) {
            return Ok(RunOutcome::Completed);
        }
        let state = self.checkout(thread)?;
        Ok(self.run(thread, state))
    }

    /// Supplies the result of the native call `thread` is suspended in.
    pub fn set_resume_int(&mut self, thread: ThreadId, value: i32) -> Result<(), ThreadStateError> {
        let slot = &mut self.threads[thread.index()];
        if !slot.suspended {
            return Err(ThreadStateError::NotSuspended);
        }
        let state = slot.state.as_mut().ok_or(ThreadStateError::Running)?;
        let frame = state.frames.last().ok_or(ThreadStateError::NotStarted)?;
        if frame.pc.is_none() {
            return Err(ThreadStateError::NoPendingResult);
        }
        let slot_index = (frame.sp as usize)
            .checked_sub(1)
            .ok_or(ThreadStateError::NoPendingResult)?;
        let cell = state
            .stack
            .get_mut(slot_index)
            .ok_or(ThreadStateError::NoPendingResult)?;
        *cell = value;
        Ok(())
    }

    /// Marks `thread` suspended with an optional abort callback.
    ///
    /// Called by native callbacks on the active thread; the interpreter returns
    /// [`RunOutcome::Suspended`] once the callback returns.
    pub fn suspend(&mut self, thread: ThreadId, abort_fn: Option<AbortFn>) {
        let slot = &mut self.threads[thread.index()];
        slot.suspended = true;
        slot.abort_fn = abort_fn;
    }

    /// Suspends the active thread, returning it, or `None` outside of a run.
    pub fn suspend_active(&mut self, abort_fn: Option<AbortFn>) -> Option<ThreadId> {
        let thread = self.active?;
        self.suspend(thread, abort_fn);
        Some(thread)
    }

    /// Aborts `thread`: clears its frames and suspension, removes it from its wait queue and
    /// fires its abort callback once. Aborting an idle thread does nothing.
    ///
    /// A running thread stops as soon as control returns to its own bytecode, reporting
    /// [`AbortReason::Requested`].
    pub fn abort(&mut self, thread: ThreadId) {
        self.abort_with(thread, AbortReason::Requested);
    }

    /// Aborts the active thread because a native argument could not be decoded.
    ///
    /// Does nothing outside of a run.
    pub fn fault_active(&mut self, error: ObjectError) {
        if let Some(thread) = self.active {
            self.abort_with(thread, AbortReason::BadArgument(error));
        }
    }

    fn abort_with(&mut self, thread: ThreadId, reason: AbortReason) {
        let slot = &mut self.threads[thread.index()];
        match slot.state.as_mut() {
            Some(state) => state.frames.clear(),
            None => {
                slot.pending_abort.get_or_insert(reason);
            }
        }
        self.detach_aborted(thread);
    }

    /// Clears suspension, leaves any wait queue and fires the abort callback if one is armed.
    pub(crate) fn detach_aborted(&mut self, thread: ThreadId) {
        let slot = &mut self.threads[thread.index()];
        slot.suspended = false;
        let queue = slot.wait_queue.take();
        let abort_fn = slot.abort_fn.take();
        if let Some(queue) = queue {
            self.unlink_waiter(queue, thread);
        }
        if let Some(abort_fn) = abort_fn {
            abort_fn(self, thread);
        }
    }

    pub(crate) fn checkout(&mut self, thread: ThreadId) -> Result<ThreadState, ThreadStateError> {
        self.threads[thread.index()]
            .state
            .take()
            .ok_or(ThreadStateError::Running)
    }
}
