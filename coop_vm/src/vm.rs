// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bytecode interpreter.
//!
//! A run executes the innermost frame of a thread until the frame stack empties, a native
//! callback suspends the thread, or the run is aborted. Program counter and stack pointer live
//! in locals while a frame executes and are written back to the frame only at call and
//! suspension points.

use alloc::string::String;
use core::fmt;
use core::ops::Range;

use crate::bytecode::{Instr, branch_target};
use crate::domain::Domain;
use crate::function::Function;
use crate::object::ObjectError;
use crate::thread::{Frame, ThreadId, ThreadState};
use crate::trace::{ScopeKind, TraceMask, TraceOutcome};

/// Execution limits for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Loop checks allowed per run; the check that exhausts the budget aborts the thread.
    pub loop_budget: u32,
    /// Maximum frame stack depth.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            loop_budget: 10_000,
            max_call_depth: 100,
        }
    }
}

/// Why a run was aborted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The loop budget ran out.
    LoopLimit,
    /// A call would exceed [`Limits::max_call_depth`].
    CallDepth,
    /// [`Domain::abort`] was called on the running thread.
    Requested,
    /// A bound native could not decode its arguments.
    BadArgument(ObjectError),
    /// The bytecode could not be executed (undecodable instruction, bad branch target or
    /// out-of-range table index).
    InvalidBytecode,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoopLimit => f.write_str("loop budget exhausted"),
            Self::CallDepth => f.write_str("call depth limit exceeded"),
            Self::Requested => f.write_str("aborted by request"),
            Self::BadArgument(e) => write!(f, "bad native argument: {e}"),
            Self::InvalidBytecode => f.write_str("invalid bytecode"),
        }
    }
}

/// Where and why a run was aborted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbortInfo {
    /// Name of the function executing at the abort.
    pub function: String,
    /// Byte offset of the aborting instruction.
    pub pc: u32,
    /// Abort reason.
    pub reason: AbortReason,
}

impl fmt::Display for AbortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "abort in {} pc={}: {}", self.function, self.pc, self.reason)
    }
}

impl core::error::Error for AbortInfo {}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The frame stack emptied.
    Completed,
    /// A native callback suspended the thread; frames are intact.
    Suspended,
    /// The frame stack was discarded.
    Aborted(AbortInfo),
}

impl RunOutcome {
    /// Returns `true` for [`RunOutcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` for [`RunOutcome::Suspended`].
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }

    /// Abort details, if the run was aborted.
    #[must_use]
    pub fn abort_info(&self) -> Option<&AbortInfo> {
        match self {
            Self::Aborted(info) => Some(info),
            _ => None,
        }
    }

    fn as_trace(&self) -> TraceOutcome<'_> {
        match self {
            Self::Completed => TraceOutcome::Completed,
            Self::Suspended => TraceOutcome::Suspended,
            Self::Aborted(info) => TraceOutcome::Aborted(info),
        }
    }
}

/// The result of [`Domain::run_int`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntRun {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// The entry frame's result slot.
    pub value: i32,
}

/// `a / b` with the VM's total division rules.
#[must_use]
pub fn int_div(a: i32, b: i32) -> i32 {
    match b {
        0 => 0,
        -1 => a.wrapping_neg(),
        _ => a / b,
    }
}

/// `a % b` with the VM's total remainder rules.
#[must_use]
pub fn int_mod(a: i32, b: i32) -> i32 {
    match b {
        -1..=1 => 0,
        _ => a % b,
    }
}

#[inline(always)]
fn binop(stack: &mut [i32], sp: &mut usize, f: impl FnOnce(i32, i32) -> i32) {
    *sp -= 1;
    let b = stack[*sp];
    let a = &mut stack[*sp - 1];
    *a = f(*a, b);
}

/// A pending native call: argument window and optional result slot.
struct NativeCall {
    method: u8,
    args: Range<usize>,
    result: Option<usize>,
    is_static: bool,
}

impl Domain {
    /// Runs `thread` with its checked-out `state`, restoring both afterwards.
    pub(crate) fn run(&mut self, thread: ThreadId, mut state: ThreadState) -> RunOutcome {
        let prev_active = self.active.replace(thread);
        if self.trace_mask.contains(TraceMask::RUN)
            && let Some(t) = self.trace.as_mut()
            && let Some(frame) = state.frames.last()
        {
            t.run_start(thread, &frame.function, state.frames.len());
        }

        let outcome = self.dispatch(thread, &mut state);

        let slot = &mut self.threads[thread.index()];
        slot.state = Some(state);
        slot.pending_abort = None;
        self.active = prev_active;

        if self.trace_mask.contains(TraceMask::RUN)
            && let Some(t) = self.trace.as_mut()
        {
            t.run_end(thread, outcome.as_trace());
        }
        outcome
    }

    fn dispatch(&mut self, thread: ThreadId, st: &mut ThreadState) -> RunOutcome {
        let mut loop_budget = self.limits.loop_budget;

        'frames: loop {
            let Some(frame) = st.frames.last() else {
                return RunOutcome::Completed;
            };
            let function = frame.function.clone();
            let bp = frame.bp as usize;
            let (mut pc, mut sp) = match frame.pc {
                Some(pc) => (pc as usize, frame.sp as usize),
                None => {
                    let locals_end = bp + function.local_slots() as usize;
                    let params_end = (bp + function.param_slots() as usize).min(locals_end);
                    let limit = bp + function.stack_slots() as usize;
                    if st.stack.len() < limit {
                        st.stack.resize(limit, 0);
                    }
                    st.stack[params_end..locals_end].fill(0);
                    if self.trace_mask.contains(TraceMask::CALL)
                        && let Some(t) = self.trace.as_mut()
                    {
                        t.scope_enter(ScopeKind::CallFrame, &function, 0);
                    }
                    (0, locals_end)
                }
            };
            let code = function.bytecode();

            loop {
                let at = pc;

                macro_rules! abort {
                    ($reason:expr) => {
                        return self.abort_run(st, &function, at, $reason)
                    };
                }
                macro_rules! jump {
                    ($delta:expr) => {
                        match branch_target(pc, $delta) {
                            Some(target) => pc = target,
                            None => abort!(AbortReason::InvalidBytecode),
                        }
                    };
                }

                let Ok((instr, next)) = Instr::decode(code, pc) else {
                    abort!(AbortReason::InvalidBytecode);
                };
                if self.trace_mask.contains(TraceMask::INSTR)
                    && let Some(t) = self.trace.as_mut()
                {
                    t.instr(thread, &function, at as u32, next as u32, instr.opcode());
                }
                pc = next;

                let call = match instr {
                    Instr::Nop => None,
                    Instr::Pop => {
                        sp -= 1;
                        None
                    }
                    Instr::Dup => {
                        st.stack[sp] = st.stack[sp - 1];
                        sp += 1;
                        None
                    }
                    Instr::IVLoad { index } => {
                        let Some(&v) = self.globals.get(usize::from(index)) else {
                            abort!(AbortReason::InvalidBytecode);
                        };
                        st.stack[sp] = v;
                        sp += 1;
                        None
                    }
                    Instr::IVStore { index } => {
                        sp -= 1;
                        let Some(slot) = self.globals.get_mut(usize::from(index)) else {
                            abort!(AbortReason::InvalidBytecode);
                        };
                        *slot = st.stack[sp];
                        None
                    }
                    Instr::ILLoad { index } => {
                        st.stack[sp] = st.stack[bp + usize::from(index)];
                        sp += 1;
                        None
                    }
                    Instr::ILStore { index } => {
                        sp -= 1;
                        st.stack[bp + usize::from(index)] = st.stack[sp];
                        None
                    }
                    Instr::ISLoad { index } => {
                        let Some(&v) = self.specials.get(usize::from(index)) else {
                            abort!(AbortReason::InvalidBytecode);
                        };
                        st.stack[sp] = v;
                        sp += 1;
                        None
                    }
                    Instr::ITLoad { index } => {
                        let vars = &self.threads[thread.index()].vars;
                        let Some(&v) = vars.get(usize::from(index)) else {
                            abort!(AbortReason::InvalidBytecode);
                        };
                        st.stack[sp] = v;
                        sp += 1;
                        None
                    }
                    Instr::IntConst { value } => {
                        st.stack[sp] = value;
                        sp += 1;
                        None
                    }
                    Instr::IntConst8 { value } => {
                        st.stack[sp] = i32::from(value);
                        sp += 1;
                        None
                    }
                    Instr::IntAdd => {
                        binop(&mut st.stack, &mut sp, i32::wrapping_add);
                        None
                    }
                    Instr::IntSub => {
                        binop(&mut st.stack, &mut sp, i32::wrapping_sub);
                        None
                    }
                    Instr::IntMul => {
                        binop(&mut st.stack, &mut sp, i32::wrapping_mul);
                        None
                    }
                    Instr::IntDiv => {
                        binop(&mut st.stack, &mut sp, int_div);
                        None
                    }
                    Instr::IntMod => {
                        binop(&mut st.stack, &mut sp, int_mod);
                        None
                    }
                    Instr::IntAnd => {
                        binop(&mut st.stack, &mut sp, |a, b| a & b);
                        None
                    }
                    Instr::IntOr => {
                        binop(&mut st.stack, &mut sp, |a, b| a | b);
                        None
                    }
                    Instr::IntXor => {
                        binop(&mut st.stack, &mut sp, |a, b| a ^ b);
                        None
                    }
                    Instr::IntAsr => {
                        binop(&mut st.stack, &mut sp, |a, b| a >> (b & 31));
                        None
                    }
                    Instr::IntAsl => {
                        binop(&mut st.stack, &mut sp, |a, b| a << (b & 31));
                        None
                    }
                    Instr::Not => {
                        let v = &mut st.stack[sp - 1];
                        *v = i32::from(*v == 0);
                        None
                    }
                    Instr::And => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a != 0 && b != 0));
                        None
                    }
                    Instr::Or => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a != 0 || b != 0));
                        None
                    }
                    Instr::IntLt => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a < b));
                        None
                    }
                    Instr::IntLe => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a <= b));
                        None
                    }
                    Instr::IntGt => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a > b));
                        None
                    }
                    Instr::IntGe => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a >= b));
                        None
                    }
                    Instr::IntEq => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a == b));
                        None
                    }
                    Instr::IntNe => {
                        binop(&mut st.stack, &mut sp, |a, b| i32::from(a != b));
                        None
                    }
                    Instr::IntNeg => {
                        let v = &mut st.stack[sp - 1];
                        *v = v.wrapping_neg();
                        None
                    }
                    Instr::IntNot => {
                        let v = &mut st.stack[sp - 1];
                        *v = !*v;
                        None
                    }
                    Instr::Jz { delta } => {
                        sp -= 1;
                        if st.stack[sp] == 0 {
                            jump!(delta.into());
                        }
                        None
                    }
                    Instr::Jnz { delta } => {
                        sp -= 1;
                        if st.stack[sp] != 0 {
                            jump!(delta.into());
                        }
                        None
                    }
                    Instr::Jmp { delta } => {
                        jump!(delta.into());
                        None
                    }
                    Instr::Ljz { delta } => {
                        sp -= 1;
                        if st.stack[sp] == 0 {
                            jump!(delta);
                        }
                        None
                    }
                    Instr::Ljnz { delta } => {
                        sp -= 1;
                        if st.stack[sp] != 0 {
                            jump!(delta);
                        }
                        None
                    }
                    Instr::Ljmp { delta } => {
                        jump!(delta);
                        None
                    }
                    Instr::LoopChk => {
                        loop_budget = loop_budget.saturating_sub(1);
                        if loop_budget == 0 {
                            abort!(AbortReason::LoopLimit);
                        }
                        None
                    }
                    Instr::MethodCallVoid { argc, method } => {
                        let base = sp - usize::from(argc) - 1;
                        let args = base..sp;
                        sp = base;
                        Some(NativeCall {
                            method,
                            args,
                            result: None,
                            is_static: false,
                        })
                    }
                    Instr::MethodCallInt { argc, method } => {
                        let base = sp - usize::from(argc) - 1;
                        let args = base..sp;
                        sp = base + 1;
                        Some(NativeCall {
                            method,
                            args,
                            result: Some(base),
                            is_static: false,
                        })
                    }
                    Instr::StaticMethodCallVoid { argc, method } => {
                        let base = sp - usize::from(argc);
                        let args = base..sp;
                        sp = base;
                        Some(NativeCall {
                            method,
                            args,
                            result: None,
                            is_static: true,
                        })
                    }
                    Instr::StaticMethodCallInt { argc, method } => {
                        let base = sp - usize::from(argc);
                        let args = base..sp;
                        sp = base + 1;
                        Some(NativeCall {
                            method,
                            args,
                            result: Some(base),
                            is_static: true,
                        })
                    }
                    Instr::FunctionCallVoid { argc, func } | Instr::FunctionCallInt { argc, func } => {
                        let returns_int = matches!(instr, Instr::FunctionCallInt { .. });
                        let Some(callee) = self.functions.get(usize::from(func)).cloned() else {
                            abort!(AbortReason::InvalidBytecode);
                        };
                        sp -= usize::from(argc);
                        if let Some(frame) = st.frames.last_mut() {
                            frame.pc = Some(pc as u32);
                            frame.sp = (sp + usize::from(returns_int)) as u32;
                        }
                        if st.frames.len() >= self.limits.max_call_depth {
                            if returns_int {
                                st.stack[sp] = 0;
                            }
                            abort!(AbortReason::CallDepth);
                        }
                        st.frames.push(Frame {
                            function: callee,
                            pc: None,
                            bp: sp as u32,
                            sp: sp as u32,
                        });
                        continue 'frames;
                    }
                    Instr::ReturnInt => {
                        st.stack[bp] = st.stack[sp - 1];
                        self.pop_frame(st, &function);
                        continue 'frames;
                    }
                    Instr::ReturnVoid => {
                        self.pop_frame(st, &function);
                        continue 'frames;
                    }
                };

                if let Some(call) = call
                    && let Some(outcome) = self.call_native(thread, st, &function, at, pc, sp, call)
                {
                    return outcome;
                }
            }
        }
    }

    /// Invokes a native method. Returns an outcome if the run must stop.
    #[allow(clippy::too_many_arguments, reason = "interpreter registers")]
    fn call_native(
        &mut self,
        thread: ThreadId,
        st: &mut ThreadState,
        function: &Function,
        at: usize,
        pc: usize,
        sp: usize,
        call: NativeCall,
    ) -> Option<RunOutcome> {
        let Some(thunk) = function.method(call.method) else {
            return Some(self.abort_run(st, function, at, AbortReason::InvalidBytecode));
        };
        let kind = ScopeKind::NativeCall {
            method: call.method,
            is_static: call.is_static,
        };
        if self.trace_mask.contains(TraceMask::HOST)
            && let Some(t) = self.trace.as_mut()
        {
            t.scope_enter(kind, function, at as u32);
        }

        let ret = thunk.call(self, &st.stack[call.args]);

        if self.trace_mask.contains(TraceMask::HOST)
            && let Some(t) = self.trace.as_mut()
        {
            t.scope_exit(kind, function, at as u32);
        }
        if let Some(slot) = call.result {
            st.stack[slot] = ret;
        }

        let slot = &mut self.threads[thread.index()];
        if let Some(reason) = slot.pending_abort.take() {
            // The callback may have parked the thread again after aborting it.
            self.detach_aborted(thread);
            return Some(self.abort_run(st, function, at, reason));
        }
        if slot.suspended {
            if let Some(frame) = st.frames.last_mut() {
                frame.pc = Some(pc as u32);
                frame.sp = sp as u32;
            }
            if self.trace_mask.contains(TraceMask::SUSPEND)
                && let Some(t) = self.trace.as_mut()
            {
                t.suspend(thread, function, at as u32);
            }
            return Some(RunOutcome::Suspended);
        }
        None
    }

    fn pop_frame(&mut self, st: &mut ThreadState, function: &Function) {
        st.frames.pop();
        if self.trace_mask.contains(TraceMask::CALL)
            && let Some(t) = self.trace.as_mut()
        {
            t.scope_exit(ScopeKind::CallFrame, function, 0);
        }
    }

    fn abort_run(
        &mut self,
        st: &mut ThreadState,
        function: &Function,
        pc: usize,
        reason: AbortReason,
    ) -> RunOutcome {
        if matches!(reason, AbortReason::LoopLimit | AbortReason::CallDepth) {
            self.report_safety_abort(function.name());
        }
        st.frames.clear();
        RunOutcome::Aborted(AbortInfo {
            function: function.name().into(),
            pc: pc as u32,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::function::FunctionDef;
    use crate::thunk::NativeThunk;
    use crate::value::{FuncId, TYPE_INT, TYPE_VOID};
    use crate::verifier::VerifyConfig;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    fn add(d: &mut Domain, def: FunctionDef) -> FuncId {
        d.add_function(Function::new(def, &VerifyConfig::default()).unwrap())
    }

    fn eval(build: impl FnOnce(&mut Asm)) -> i32 {
        let mut a = Asm::new();
        build(&mut a);
        a.return_int();
        let mut d = Domain::default();
        let f = add(&mut d, FunctionDef::new("eval", TYPE_INT, a.finish().unwrap()));
        let t = d.create_thread();
        let r = d.run_int(t, f).unwrap();
        assert_eq!(r.outcome, RunOutcome::Completed);
        r.value
    }

    fn binary(a: i32, b: i32, op: fn(&mut Asm) -> &mut Asm) -> i32 {
        eval(|asm| {
            asm.int_const(a);
            asm.int_const(b);
            op(asm);
        })
    }

    #[test]
    fn literal_addition() {
        assert_eq!(
            eval(|a| {
                a.int_const8(5);
                a.int_const8(7);
                a.int_add();
            }),
            12
        );
    }

    #[test]
    fn division_is_total() {
        assert_eq!(binary(17, 0, Asm::int_div), 0);
        assert_eq!(binary(i32::MIN, -1, Asm::int_div), i32::MIN);
        assert_eq!(binary(17, -1, Asm::int_div), -17);
        assert_eq!(binary(-17, 5, Asm::int_div), -3);
        for d in [-1, 0, 1] {
            assert_eq!(binary(12345, d, Asm::int_mod), 0);
        }
        assert_eq!(binary(i32::MIN, -1, Asm::int_mod), 0);
        assert_eq!(binary(-17, 5, Asm::int_mod), -2);
    }

    #[test]
    fn shifts_mask_their_count() {
        assert_eq!(binary(1, 33, Asm::int_asl), 2);
        assert_eq!(binary(-64, 34, Asm::int_asr), -16);
        assert_eq!(binary(5, -1, Asm::int_asl), binary(5, 31, Asm::int_asl));
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(binary(i32::MAX, 1, Asm::int_add), i32::MIN);
        assert_eq!(binary(i32::MIN, 1, Asm::int_sub), i32::MAX);
        assert_eq!(
            eval(|a| {
                a.int_const(i32::MIN);
                a.int_neg();
            }),
            i32::MIN
        );
    }

    #[test]
    fn logic_produces_zero_or_one() {
        assert_eq!(binary(7, 9, Asm::and), 1);
        assert_eq!(binary(7, 0, Asm::and), 0);
        assert_eq!(binary(0, -3, Asm::or), 1);
        assert_eq!(binary(-3, 4, Asm::int_lt), 1);
        assert_eq!(binary(4, 4, Asm::int_le), 1);
        assert_eq!(binary(4, 4, Asm::int_gt), 0);
        assert_eq!(binary(4, 5, Asm::int_ne), 1);
        assert_eq!(
            eval(|a| {
                a.int_const8(9);
                a.not();
            }),
            0
        );
        assert_eq!(
            eval(|a| {
                a.int_const8(0);
                a.int_not();
            }),
            -1
        );
    }

    #[test]
    fn globals_specials_and_thread_vars() {
        let mut d = Domain::default();
        let g = d.declare_global(40).unwrap();
        let s = d.declare_special(2).unwrap();
        let tv = d.declare_thread_var().unwrap();
        let mut a = Asm::new();
        a.iv_load(g);
        a.is_load(s);
        a.int_add();
        a.dup();
        a.iv_store(g);
        a.it_load(tv);
        a.int_add();
        a.return_int();
        let f = add(&mut d, FunctionDef::new("vars", TYPE_INT, a.finish().unwrap()));
        let t = d.create_thread();
        d.set_thread_var(t, tv, 100).unwrap();
        assert_eq!(d.run_int(t, f).unwrap().value, 142);
        assert_eq!(d.global(g), Some(42));
    }

    #[test]
    fn loop_budget_aborts_on_the_last_check() {
        let mut d = Domain::new(Limits {
            loop_budget: 50,
            ..Limits::default()
        });
        let g = d.declare_global(0).unwrap();
        let mut a = Asm::new();
        let top = a.label();
        a.place(top).unwrap();
        a.loop_chk();
        a.iv_load(g);
        a.int_const8(1);
        a.int_add();
        a.iv_store(g);
        a.jmp(top);
        let f = add(&mut d, FunctionDef::new("spin", TYPE_VOID, a.finish().unwrap()));

        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);
        d.set_loop_handler(move |name| sink.borrow_mut().push(String::from(name)));

        let t = d.create_thread();
        let out = d.run_void(t, f).unwrap();
        let info = out.abort_info().unwrap();
        assert_eq!(info.reason, AbortReason::LoopLimit);
        assert_eq!(info.function, "spin");
        assert_eq!(info.pc, 0);
        assert_eq!(d.global(g), Some(49));
        assert_eq!(*reports.borrow(), vec![String::from("spin")]);
        assert!(d.is_idle(t));
    }

    #[test]
    fn unbounded_recursion_hits_the_depth_cap() {
        let mut d = Domain::default();
        let mut a = Asm::new();
        a.function_call_int(0, FuncId(0));
        a.return_int();
        let f = add(&mut d, FunctionDef::new("recurse", TYPE_INT, a.finish().unwrap()));

        let reports = Rc::new(Cell::new(0));
        let count = Rc::clone(&reports);
        d.set_loop_handler(move |_| count.set(count.get() + 1));

        let t = d.create_thread();
        let r = d.run_int(t, f).unwrap();
        assert_eq!(r.value, 0);
        assert_eq!(
            r.outcome.abort_info().map(|i| i.reason),
            Some(AbortReason::CallDepth)
        );
        assert_eq!(reports.get(), 1);
        assert!(d.is_idle(t));
    }

    #[test]
    fn function_arguments_become_leading_locals() {
        let mut d = Domain::default();
        let mut sub = Asm::new();
        sub.il_load(0);
        sub.il_load(1);
        sub.int_sub();
        sub.il_load(2);
        sub.int_add();
        sub.return_int();
        let callee = add(
            &mut d,
            FunctionDef::new("sub", TYPE_INT, sub.finish().unwrap())
                .with_params(2)
                .with_locals(3),
        );

        let mut main = Asm::new();
        main.int_const8(3);
        main.int_const8(10);
        main.int_const8(4);
        main.function_call_int(2, callee);
        main.int_add();
        main.return_int();
        let f = add(&mut d, FunctionDef::new("main", TYPE_INT, main.finish().unwrap()));

        let t = d.create_thread();
        // 3 + (10 - 4 + 0)
        assert_eq!(d.run_int(t, f).unwrap().value, 9);
    }

    #[test]
    fn branches_select_paths() {
        let abs = |x: i32| {
            eval(|a| {
                let neg = a.label();
                let done = a.label();
                a.int_const(x);
                a.dup();
                a.int_const8(0);
                a.int_lt();
                a.jnz(neg);
                a.jmp(done);
                a.place(neg).unwrap();
                a.int_neg();
                a.place(done).unwrap();
            })
        };
        assert_eq!(abs(-5), 5);
        assert_eq!(abs(6), 6);
    }

    #[test]
    fn long_branches_select_paths() {
        let pick = |cond: i8| {
            eval(|a| {
                let zero = a.label();
                let done = a.label();
                a.int_const8(cond);
                a.ljz(zero);
                a.int_const8(1);
                a.ljmp(done);
                a.place(zero).unwrap();
                a.int_const8(2);
                a.place(done).unwrap();
            })
        };
        assert_eq!(pick(0), 2);
        assert_eq!(pick(1), 1);
    }

    #[test]
    fn method_calls_window_the_stack() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let record = NativeThunk::new(move |_d, args| {
            log.borrow_mut().push(args.to_vec());
            args.iter().sum()
        });

        let mut d = Domain::default();
        let mut a = Asm::new();
        a.int_const8(100);
        // object + 2 args -> result replaces the object
        a.int_const8(1);
        a.int_const8(2);
        a.int_const8(3);
        a.method_call_int(2, 0);
        // object + 1 arg, nothing pushed
        a.int_const8(4);
        a.int_const8(5);
        a.method_call_void(1, 0);
        // 0 args -> result pushed
        a.static_method_call_int(0, 0);
        a.int_const8(6);
        a.static_method_call_void(1, 0);
        a.int_add();
        a.int_add();
        a.return_int();
        let def = FunctionDef::new("calls", TYPE_INT, a.finish().unwrap()).with_methods(vec![record]);
        let f = add(&mut d, def);
        let t = d.create_thread();
        assert_eq!(d.run_int(t, f).unwrap().value, 100 + 6);
        assert_eq!(
            *seen.borrow(),
            vec![vec![1, 2, 3], vec![4, 5], vec![], vec![6]]
        );
    }

    #[test]
    fn abort_from_own_callback_stops_the_run() {
        let mut d = Domain::default();
        let kill = NativeThunk::new(|d, _| {
            let me = d.active_thread().unwrap();
            d.abort(me);
            0
        });
        let mut a = Asm::new();
        a.static_method_call_void(0, 0);
        a.return_void();
        let def = FunctionDef::new("suicide", TYPE_VOID, a.finish().unwrap()).with_methods(vec![kill]);
        let f = add(&mut d, def);
        let t = d.create_thread();
        let out = d.run_void(t, f).unwrap();
        assert_eq!(
            out.abort_info().map(|i| i.reason),
            Some(AbortReason::Requested)
        );
        assert!(d.is_idle(t));
    }

    #[test]
    fn undecodable_bytecode_aborts() {
        let mut d = Domain::default();
        let f = d.add_function(Function::from_trusted(
            FunctionDef::new("bad", TYPE_VOID, vec![0x00, 0xEE]),
            0,
        ));
        let t = d.create_thread();
        let out = d.run_void(t, f).unwrap();
        let info = out.abort_info().unwrap();
        assert_eq!(info.reason, AbortReason::InvalidBytecode);
        assert_eq!(info.pc, 1);
    }

    #[test]
    fn nested_runs_restore_the_active_thread() {
        let mut d = Domain::default();
        let mut inner = Asm::new();
        inner.return_void();
        let inner_f = add(&mut d, FunctionDef::new("inner", TYPE_VOID, inner.finish().unwrap()));

        let observed = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&observed);
        let spawn = NativeThunk::new(move |d, _| {
            let outer = d.active_thread();
            let t = d.create_thread();
            let out = d.run_void(t, inner_f).unwrap();
            log.borrow_mut().push((outer, d.active_thread(), out.is_completed()));
            0
        });
        let mut a = Asm::new();
        a.static_method_call_void(0, 0);
        a.return_void();
        let def = FunctionDef::new("outer", TYPE_VOID, a.finish().unwrap()).with_methods(vec![spawn]);
        let f = add(&mut d, def);
        let t = d.create_thread();
        assert!(d.run_void(t, f).unwrap().is_completed());
        assert_eq!(*observed.borrow(), vec![(Some(t), Some(t), true)]);
        assert_eq!(d.active_thread(), None);
    }

    #[test]
    fn running_thread_cannot_be_restarted() {
        let mut d = Domain::default();
        let result = Rc::new(Cell::new(None));
        let out = Rc::clone(&result);
        let restart = NativeThunk::new(move |d, _| {
            let me = d.active_thread().unwrap();
            out.set(Some(d.run_void(me, FuncId(0)).err()));
            0
        });
        let mut a = Asm::new();
        a.static_method_call_void(0, 0);
        a.return_void();
        let def = FunctionDef::new("again", TYPE_VOID, a.finish().unwrap()).with_methods(vec![restart]);
        let f = add(&mut d, def);
        let t = d.create_thread();
        assert!(d.run_void(t, f).unwrap().is_completed());
        assert_eq!(
            result.get(),
            Some(Some(crate::thread::ThreadStateError::Running))
        );
    }
}
