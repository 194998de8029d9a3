// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Function verification.
//!
//! The verifier rejects bytecode the interpreter cannot execute safely and computes the
//! worst-case operand stack size of one activation:
//! - every instruction decodes and every branch lands on an instruction boundary
//! - control never runs off the end of the code
//! - the operand stack never underflows and has one depth at every merge point
//! - local and native method indices are in range
//!
//! Global, special, thread-variable and function indices depend on the domain a function is
//! registered with; the interpreter checks those at run time.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{BytecodeError, Instr, Instrs, branch_target};
use crate::function::FunctionDef;

/// Verifier limits.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Maximum stack slots (locals included) per activation.
    pub max_stack_slots: u32,
    /// Maximum bytecode length in bytes.
    pub max_code_len: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_stack_slots: 4096,
            max_code_len: 1 << 20,
        }
    }
}

/// A verification error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The bytecode failed to decode.
    Decode(BytecodeError),
    /// The bytecode is longer than [`VerifyConfig::max_code_len`].
    CodeTooLarge {
        /// Bytecode length.
        len: usize,
    },
    /// More locals than one-byte operands can address.
    TooManyLocals {
        /// Declared local slot count.
        locals: u32,
    },
    /// More parameters than locals.
    ParamsExceedLocals {
        /// Declared parameter count.
        params: u32,
        /// Declared local slot count.
        locals: u32,
    },
    /// A branch target is out of bounds or not an instruction boundary.
    InvalidJumpTarget {
        /// Offset of the branch.
        pc: u32,
        /// Resolved target, if it is not negative.
        target: Option<u32>,
    },
    /// Execution can run past the last instruction.
    FallsOffEnd {
        /// Offset of the last instruction reached.
        pc: u32,
    },
    /// An instruction pops more values than the stack holds.
    StackUnderflow {
        /// Offset of the instruction.
        pc: u32,
    },
    /// Two paths reach an instruction with different stack depths.
    StackMismatch {
        /// Offset of the merge point.
        pc: u32,
        /// Depth recorded first.
        expected: u32,
        /// Depth on the later path.
        actual: u32,
    },
    /// A local index is not below the local slot count.
    LocalOutOfRange {
        /// Offset of the instruction.
        pc: u32,
        /// The local index.
        index: u8,
    },
    /// A native method index is not in the method table.
    MethodOutOfRange {
        /// Offset of the instruction.
        pc: u32,
        /// The method index.
        index: u8,
    },
    /// The activation needs more than [`VerifyConfig::max_stack_slots`].
    StackTooDeep {
        /// Required slots, locals included.
        slots: u32,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode failed: {e}"),
            Self::CodeTooLarge { len } => write!(f, "bytecode too large ({len} bytes)"),
            Self::TooManyLocals { locals } => write!(f, "too many locals ({locals})"),
            Self::ParamsExceedLocals { params, locals } => {
                write!(f, "{params} parameters exceed {locals} locals")
            }
            Self::InvalidJumpTarget { pc, target } => match target {
                Some(t) => write!(f, "branch at pc {pc} targets invalid pc {t}"),
                None => write!(f, "branch at pc {pc} targets a negative pc"),
            },
            Self::FallsOffEnd { pc } => write!(f, "control falls off the end after pc {pc}"),
            Self::StackUnderflow { pc } => write!(f, "stack underflow at pc {pc}"),
            Self::StackMismatch {
                pc,
                expected,
                actual,
            } => write!(
                f,
                "stack depth mismatch at pc {pc} (expected {expected}, got {actual})"
            ),
            Self::LocalOutOfRange { pc, index } => {
                write!(f, "local {index} out of range at pc {pc}")
            }
            Self::MethodOutOfRange { pc, index } => {
                write!(f, "method {index} out of range at pc {pc}")
            }
            Self::StackTooDeep { slots } => write!(f, "activation needs {slots} stack slots"),
        }
    }
}

impl core::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BytecodeError> for VerifyError {
    fn from(e: BytecodeError) -> Self {
        Self::Decode(e)
    }
}

/// Values popped and pushed by `instr`.
#[must_use]
pub fn stack_effect(instr: &Instr) -> (u32, u32) {
    match *instr {
        Instr::Nop
        | Instr::Jmp { .. }
        | Instr::Ljmp { .. }
        | Instr::LoopChk
        | Instr::ReturnVoid => (0, 0),
        Instr::Pop
        | Instr::IVStore { .. }
        | Instr::ILStore { .. }
        | Instr::Jz { .. }
        | Instr::Jnz { .. }
        | Instr::Ljz { .. }
        | Instr::Ljnz { .. }
        | Instr::ReturnInt => (1, 0),
        Instr::Dup => (1, 2),
        Instr::IVLoad { .. }
        | Instr::ILLoad { .. }
        | Instr::ISLoad { .. }
        | Instr::ITLoad { .. }
        | Instr::IntConst { .. }
        | Instr::IntConst8 { .. } => (0, 1),
        Instr::IntAdd
        | Instr::IntSub
        | Instr::IntMul
        | Instr::IntDiv
        | Instr::IntMod
        | Instr::IntAnd
        | Instr::IntOr
        | Instr::IntXor
        | Instr::IntAsr
        | Instr::IntAsl
        | Instr::And
        | Instr::Or
        | Instr::IntLt
        | Instr::IntLe
        | Instr::IntGt
        | Instr::IntGe
        | Instr::IntEq
        | Instr::IntNe => (2, 1),
        Instr::Not | Instr::IntNeg | Instr::IntNot => (1, 1),
        Instr::MethodCallVoid { argc, .. } => (u32::from(argc) + 1, 0),
        Instr::MethodCallInt { argc, .. } => (u32::from(argc) + 1, 1),
        Instr::StaticMethodCallVoid { argc, .. } | Instr::FunctionCallVoid { argc, .. } => {
            (u32::from(argc), 0)
        }
        Instr::StaticMethodCallInt { argc, .. } | Instr::FunctionCallInt { argc, .. } => {
            (u32::from(argc), 1)
        }
    }
}

/// Verifies `def` and returns its stack slot count (worst-case operand depth plus locals).
pub fn verify_function(def: &FunctionDef, cfg: &VerifyConfig) -> Result<u32, VerifyError> {
    let code = def.bytecode.as_slice();
    if code.len() > cfg.max_code_len {
        return Err(VerifyError::CodeTooLarge { len: code.len() });
    }
    if def.local_slots > 256 {
        return Err(VerifyError::TooManyLocals {
            locals: def.local_slots,
        });
    }
    if def.param_slots > def.local_slots {
        return Err(VerifyError::ParamsExceedLocals {
            params: def.param_slots,
            locals: def.local_slots,
        });
    }

    if code.is_empty() {
        return Err(VerifyError::FallsOffEnd { pc: 0 });
    }

    // Decode everything up front; index instructions by pc.
    let mut at_pc: Vec<Option<(Instr, usize)>> = vec![None; code.len()];
    for r in Instrs::new(code) {
        let (pc, instr) = r?;
        at_pc[pc] = Some((instr, pc + instr.opcode().encoded_len()));
    }

    let mut depth_at: Vec<Option<u32>> = vec![None; code.len()];
    let mut work = vec![0_usize];
    depth_at[0] = Some(0);
    let mut max_depth = 0_u32;

    while let Some(pc) = work.pop() {
        let Some((instr, next)) = at_pc[pc] else {
            // Only instruction boundaries are queued.
            continue;
        };
        let depth = depth_at[pc].unwrap_or(0);
        let pc32 = pc as u32;

        match instr {
            Instr::ILLoad { index } | Instr::ILStore { index }
                if u32::from(index) >= def.local_slots =>
            {
                return Err(VerifyError::LocalOutOfRange { pc: pc32, index });
            }
            Instr::MethodCallVoid { method, .. }
            | Instr::MethodCallInt { method, .. }
            | Instr::StaticMethodCallVoid { method, .. }
            | Instr::StaticMethodCallInt { method, .. }
                if usize::from(method) >= def.methods.len() =>
            {
                return Err(VerifyError::MethodOutOfRange {
                    pc: pc32,
                    index: method,
                });
            }
            _ => {}
        }

        let (pops, pushes) = stack_effect(&instr);
        let after = depth
            .checked_sub(pops)
            .ok_or(VerifyError::StackUnderflow { pc: pc32 })?
            + pushes;
        max_depth = max_depth.max(after);

        let mut succ = |target: usize| -> Result<(), VerifyError> {
            match depth_at[target] {
                None => {
                    depth_at[target] = Some(after);
                    work.push(target);
                    Ok(())
                }
                Some(expected) if expected == after => Ok(()),
                Some(expected) => Err(VerifyError::StackMismatch {
                    pc: target as u32,
                    expected,
                    actual: after,
                }),
            }
        };

        if let Some(delta) = instr.branch_delta() {
            let target = branch_target(next, delta);
            match target {
                Some(t) if t < code.len() && at_pc[t].is_some() => succ(t)?,
                _ => {
                    return Err(VerifyError::InvalidJumpTarget {
                        pc: pc32,
                        target: target.map(|t| t as u32),
                    });
                }
            }
        }
        if !instr.opcode().is_terminator() {
            if next >= code.len() {
                return Err(VerifyError::FallsOffEnd { pc: pc32 });
            }
            succ(next)?;
        }
    }

    let slots = max_depth + def.local_slots;
    if slots > cfg.max_stack_slots {
        return Err(VerifyError::StackTooDeep { slots });
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::thunk::NativeThunk;
    use crate::value::{TYPE_INT, TYPE_VOID};

    fn def(a: Asm) -> FunctionDef {
        FunctionDef::new("f", TYPE_INT, a.finish().unwrap())
    }

    fn verify(d: &FunctionDef) -> Result<u32, VerifyError> {
        verify_function(d, &VerifyConfig::default())
    }

    #[test]
    fn straight_line_depth() {
        let mut a = Asm::new();
        a.int_const8(1).int_const8(2).int_const8(3);
        a.int_add().int_add().return_int();
        assert_eq!(verify(&def(a)), Ok(3));
    }

    #[test]
    fn locals_add_to_slots() {
        let mut a = Asm::new();
        a.il_load(3).return_int();
        assert_eq!(verify(&def(a).with_locals(4)), Ok(5));
    }

    #[test]
    fn underflow_is_rejected() {
        let mut a = Asm::new();
        a.int_const8(1).int_add().return_int();
        assert_eq!(verify(&def(a)), Err(VerifyError::StackUnderflow { pc: 2 }));
    }

    #[test]
    fn merge_depth_must_agree() {
        let mut a = Asm::new();
        let join = a.label();
        a.int_const8(0).jz(join);
        a.int_const8(7);
        a.place(join).unwrap();
        a.return_void();
        assert_eq!(
            verify(&def(a)),
            Err(VerifyError::StackMismatch {
                pc: 6,
                expected: 0,
                actual: 1,
            })
        );
    }

    #[test]
    fn falling_off_the_end_is_rejected() {
        let mut a = Asm::new();
        a.int_const8(1).pop();
        assert_eq!(verify(&def(a)), Err(VerifyError::FallsOffEnd { pc: 2 }));
        assert_eq!(
            verify(&FunctionDef::new("empty", TYPE_VOID, Vec::new())),
            Err(VerifyError::FallsOffEnd { pc: 0 })
        );
    }

    #[test]
    fn branch_into_operand_is_rejected() {
        // jmp +(-1): lands on the jmp's own operand byte.
        let d = FunctionDef::new("f", TYPE_VOID, vec![0x22, 0xFF, 0x2D]);
        assert_eq!(
            verify(&d),
            Err(VerifyError::InvalidJumpTarget {
                pc: 0,
                target: Some(1),
            })
        );
        let d = FunctionDef::new("f", TYPE_VOID, vec![0x22, 0xF0]);
        assert_eq!(
            verify(&d),
            Err(VerifyError::InvalidJumpTarget { pc: 0, target: None })
        );
    }

    #[test]
    fn table_indices_are_checked() {
        let mut a = Asm::new();
        a.il_load(0).return_int();
        assert_eq!(
            verify(&def(a)),
            Err(VerifyError::LocalOutOfRange { pc: 0, index: 0 })
        );

        let mut a = Asm::new();
        a.static_method_call_void(0, 1).return_void();
        let d = def(a).with_methods(vec![NativeThunk::new(|_, _| 0)]);
        assert_eq!(
            verify(&d),
            Err(VerifyError::MethodOutOfRange { pc: 0, index: 1 })
        );
    }

    #[test]
    fn params_must_fit_in_locals() {
        let mut a = Asm::new();
        a.return_void();
        assert_eq!(
            verify(&def(a).with_params(2).with_locals(1)),
            Err(VerifyError::ParamsExceedLocals {
                params: 2,
                locals: 1
            })
        );
    }

    #[test]
    fn loops_converge() {
        let mut a = Asm::new();
        let top = a.label();
        a.place(top).unwrap();
        a.loop_chk().int_const8(1).jnz(top).return_void();
        assert_eq!(verify(&def(a)), Ok(1));
    }

    #[test]
    fn stack_limit_is_enforced() {
        let mut a = Asm::new();
        for _ in 0..10 {
            a.int_const8(0);
        }
        a.return_int();
        let cfg = VerifyConfig {
            max_stack_slots: 8,
            ..VerifyConfig::default()
        };
        assert_eq!(
            verify_function(&def(a), &cfg),
            Err(VerifyError::StackTooDeep { slots: 10 })
        );
    }
}
