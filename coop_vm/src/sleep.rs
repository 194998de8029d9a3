// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Timed wake-ups for scripts.
//!
//! [`SleepScheduler`] parks the active thread until an emulated tick and continues it from
//! [`SleepScheduler::run_due`]. The host decides what a tick is; the scheduler only orders
//! them. Sleepers with the same wake tick continue in the order they went to sleep.

use alloc::collections::BinaryHeap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::cmp::Reverse;

use crate::domain::Domain;
use crate::function::FunctionFlags;
use crate::thread::{AbortFn, ThreadId};
use crate::thunk::ExternalMethod;
use crate::vm::RunOutcome;

#[derive(Debug, Default)]
struct SleepHeap {
    /// `(wake tick, sequence, thread)`, earliest first.
    entries: BinaryHeap<Reverse<(u64, u64, ThreadId)>>,
    next_seq: u64,
}

/// A min-heap of sleeping threads keyed by wake tick.
///
/// Cloning yields another handle to the same heap.
#[derive(Clone, Debug, Default)]
pub struct SleepScheduler {
    heap: Rc<RefCell<SleepHeap>>,
}

impl SleepScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the active thread until `now + cycles`.
    ///
    /// Returns `false` without suspending when `cycles <= 0` or no thread is running. Aborting
    /// the sleeper removes its entry.
    pub fn sleep_active(&self, domain: &mut Domain, now: u64, cycles: i32) -> bool {
        let Ok(cycles) = u64::try_from(cycles) else {
            return false;
        };
        if cycles == 0 {
            return false;
        }
        let Some(thread) = domain.active_thread() else {
            return false;
        };

        {
            let mut heap = self.heap.borrow_mut();
            let seq = heap.next_seq;
            heap.next_seq += 1;
            heap.entries
                .push(Reverse((now.saturating_add(cycles), seq, thread)));
        }

        let heap = Rc::clone(&self.heap);
        let on_abort: AbortFn = Rc::new(move |_domain: &mut Domain, aborted: ThreadId| {
            heap.borrow_mut()
                .entries
                .retain(|Reverse((_, _, t))| *t != aborted);
        });
        domain.suspend(thread, Some(on_abort));
        true
    }

    /// Continues every thread whose wake tick is at or before `now`, earliest first.
    ///
    /// Threads that go back to sleep while being continued wait for a later call, even if their
    /// new wake tick has already passed. Sleepers that are no longer suspended are dropped.
    pub fn run_due(&self, domain: &mut Domain, now: u64) -> Vec<(ThreadId, RunOutcome)> {
        let cutoff = self.heap.borrow().next_seq;
        let mut woken = Vec::new();
        loop {
            let next = {
                let mut heap = self.heap.borrow_mut();
                match heap.entries.peek() {
                    Some(&Reverse((wake, seq, _))) if wake <= now && seq < cutoff => {
                        heap.entries.pop().map(|Reverse((_, _, t))| t)
                    }
                    _ => None,
                }
            };
            let Some(thread) = next else {
                break;
            };
            if let Ok(outcome) = domain.resume(thread) {
                woken.push((thread, outcome));
            }
        }
        woken
    }

    /// Earliest pending wake tick.
    #[must_use]
    pub fn next_wake(&self) -> Option<u64> {
        self.heap
            .borrow()
            .entries
            .peek()
            .map(|Reverse((wake, _, _))| *wake)
    }

    /// Number of sleeping threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.borrow().entries.len()
    }

    /// Returns `true` if no thread is sleeping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every sleeper without waking it.
    pub fn clear(&self) {
        self.heap.borrow_mut().entries.clear();
    }

    /// A `sleep(cycles)` native reading the current tick from `clock`.
    pub fn sleep_method(&self, clock: impl Fn() -> u64 + 'static) -> ExternalMethod {
        let sched = self.clone();
        ExternalMethod::bind_static("sleep", move |domain: &mut Domain, cycles: i32| {
            sched.sleep_active(domain, clock(), cycles);
        })
        .with_flags(FunctionFlags::ASYNC)
    }
}
