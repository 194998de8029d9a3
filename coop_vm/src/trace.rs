// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for `coop_vm`.
//!
//! Tracing is optional and is designed to be `no_std` friendly.
//! The interpreter only emits events requested by a [`TraceMask`].
//!
//! To enable tracing, install a [`TraceSink`] with [`Domain::set_trace_sink`]. The sink sees
//! every run in the domain, including runs nested inside native callbacks.

#[cfg(doc)]
use crate::domain::Domain;

use crate::function::Function;
use crate::opcode::Opcode;
use crate::thread::ThreadId;
use crate::vm::AbortInfo;

/// A set of trace events requested by a [`TraceSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Trace run boundaries.
    ///
    /// Enables:
    /// - [`TraceSink::run_start`]
    /// - [`TraceSink::run_end`]
    pub const RUN: Self = Self(1 << 0);
    /// Trace each executed instruction.
    ///
    /// Enables:
    /// - [`TraceSink::instr`]
    pub const INSTR: Self = Self(1 << 1);
    /// Trace call frames.
    ///
    /// Enables (for [`ScopeKind::CallFrame`]):
    /// - [`TraceSink::scope_enter`]
    /// - [`TraceSink::scope_exit`]
    pub const CALL: Self = Self(1 << 2);
    /// Trace native calls.
    ///
    /// Enables (for [`ScopeKind::NativeCall`]):
    /// - [`TraceSink::scope_enter`]
    /// - [`TraceSink::scope_exit`]
    pub const HOST: Self = Self(1 << 3);
    /// Trace suspensions.
    ///
    /// Enables:
    /// - [`TraceSink::suspend`]
    pub const SUSPEND: Self = Self(1 << 4);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// The kind of scope being entered/exited.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// A script function activation.
    ///
    /// Entered when the frame first executes and exited when it returns. Frames discarded by
    /// an abort, or still live when a run suspends, are not exited.
    CallFrame,
    /// A native method call.
    NativeCall {
        /// Index into the calling function's method table.
        method: u8,
        /// `true` for static calls.
        is_static: bool,
    },
}

/// Run outcome for tracing.
#[derive(Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The frame stack emptied.
    Completed,
    /// A native callback suspended the thread.
    Suspended,
    /// The run was aborted.
    Aborted(&'a AbortInfo),
}

/// A trace sink that can receive interpreter events.
pub trait TraceSink {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Called when a run starts or resumes.
    ///
    /// Called only if `mask()` includes [`TraceMask::RUN`].
    ///
    /// - `thread`: thread being run
    /// - `function`: function of the innermost frame
    /// - `depth`: frame stack depth
    fn run_start(&mut self, _thread: ThreadId, _function: &Function, _depth: usize) {}

    /// Called for each executed instruction.
    ///
    /// Called only if `mask()` includes [`TraceMask::INSTR`].
    fn instr(
        &mut self,
        _thread: ThreadId,
        _function: &Function,
        _pc: u32,
        _next_pc: u32,
        _opcode: Opcode,
    ) {
    }

    /// Called when entering a profiling scope.
    ///
    /// Called only if `mask()` includes:
    /// - [`TraceMask::CALL`] (for [`ScopeKind::CallFrame`])
    /// - [`TraceMask::HOST`] (for [`ScopeKind::NativeCall`])
    ///
    /// `function` is the entered function for call frames and the calling function for native
    /// calls; `pc` is the call site for native calls and 0 for call frames.
    fn scope_enter(&mut self, _kind: ScopeKind, _function: &Function, _pc: u32) {}

    /// Called when exiting a profiling scope. Arguments mirror [`TraceSink::scope_enter`].
    fn scope_exit(&mut self, _kind: ScopeKind, _function: &Function, _pc: u32) {}

    /// Called when a native callback suspends the running thread.
    ///
    /// Called only if `mask()` includes [`TraceMask::SUSPEND`].
    fn suspend(&mut self, _thread: ThreadId, _function: &Function, _pc: u32) {}

    /// Called at the end of a run.
    ///
    /// Called only if `mask()` includes [`TraceMask::RUN`].
    fn run_end(&mut self, _thread: ThreadId, _outcome: TraceOutcome<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::domain::Domain;
    use crate::function::FunctionDef;
    use crate::thunk::NativeThunk;
    use crate::value::{FuncId, TYPE_INT};
    use crate::verifier::VerifyConfig;
    use alloc::boxed::Box;
    use alloc::format;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        mask: Option<TraceMask>,
        events: Rc<RefCell<Vec<String>>>,
    }

    impl TraceSink for Recorder {
        fn mask(&self) -> TraceMask {
            self.mask.unwrap_or(TraceMask::NONE)
        }

        fn run_start(&mut self, thread: ThreadId, function: &Function, depth: usize) {
            self.events
                .borrow_mut()
                .push(format!("start {thread} {} {depth}", function.name()));
        }

        fn instr(&mut self, _: ThreadId, _: &Function, pc: u32, _: u32, opcode: Opcode) {
            self.events
                .borrow_mut()
                .push(format!("{pc} {}", opcode.mnemonic()));
        }

        fn scope_enter(&mut self, kind: ScopeKind, function: &Function, _pc: u32) {
            self.events
                .borrow_mut()
                .push(format!("enter {kind:?} {}", function.name()));
        }

        fn scope_exit(&mut self, kind: ScopeKind, function: &Function, _pc: u32) {
            self.events
                .borrow_mut()
                .push(format!("exit {kind:?} {}", function.name()));
        }

        fn suspend(&mut self, thread: ThreadId, _: &Function, pc: u32) {
            self.events
                .borrow_mut()
                .push(format!("suspend {thread} {pc}"));
        }

        fn run_end(&mut self, thread: ThreadId, outcome: TraceOutcome<'_>) {
            self.events
                .borrow_mut()
                .push(format!("end {thread} {outcome:?}"));
        }
    }

    fn program(d: &mut Domain) -> FuncId {
        let mut leaf = Asm::new();
        leaf.int_const8(2);
        leaf.return_int();
        let leaf = d.add_function(
            Function::new(
                FunctionDef::new("leaf", TYPE_INT, leaf.finish().unwrap()),
                &VerifyConfig::default(),
            )
            .unwrap(),
        );
        let park = NativeThunk::new(|d, _| {
            d.suspend_active(None);
            0
        });
        let mut main = Asm::new();
        main.function_call_int(0, leaf);
        main.static_method_call_void(0, 0);
        main.return_int();
        d.add_function(
            Function::new(
                FunctionDef::new("main", TYPE_INT, main.finish().unwrap()).with_methods(vec![park]),
                &VerifyConfig::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn masked_events_only() {
        let mut d = Domain::default();
        let f = program(&mut d);
        let events = Rc::new(RefCell::new(Vec::new()));
        d.set_trace_sink(Some(Box::new(Recorder {
            mask: Some(TraceMask::RUN | TraceMask::SUSPEND),
            events: Rc::clone(&events),
        })));
        let t = d.create_thread();
        assert!(d.run_void(t, f).unwrap().is_suspended());
        assert!(d.resume(t).unwrap().is_completed());
        assert_eq!(
            *events.borrow(),
            vec![
                "start t0 main 1",
                "suspend t0 3",
                "end t0 Suspended",
                "start t0 main 1",
                "end t0 Completed",
            ]
        );
    }

    #[test]
    fn call_and_native_scopes_nest() {
        let mut d = Domain::default();
        let f = program(&mut d);
        let events = Rc::new(RefCell::new(Vec::new()));
        d.set_trace_sink(Some(Box::new(Recorder {
            mask: Some(TraceMask::CALL | TraceMask::HOST | TraceMask::INSTR),
            events: Rc::clone(&events),
        })));
        let t = d.create_thread();
        d.run_void(t, f).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![
                "enter CallFrame main",
                "0 function_call_int",
                "enter CallFrame leaf",
                "0 int_const8",
                "2 return_int",
                "exit CallFrame leaf",
                "3 static_method_call_void",
                "enter NativeCall { method: 0, is_static: true } main",
                "exit NativeCall { method: 0, is_static: true } main",
            ]
        );
    }

    #[test]
    fn sink_without_mask_sees_nothing() {
        let mut d = Domain::default();
        let f = program(&mut d);
        let events = Rc::new(RefCell::new(Vec::new()));
        d.set_trace_sink(Some(Box::new(Recorder {
            mask: None,
            events: Rc::clone(&events),
        })));
        let t = d.create_thread();
        d.run_void(t, f).unwrap();
        assert!(events.borrow().is_empty());
        assert!(d.take_trace_sink().is_some());
    }
}
