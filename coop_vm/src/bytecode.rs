// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction decoding and encoding.
//!
//! Bytecode is a flat byte stream: one opcode byte followed by zero to four operand bytes (see
//! [`OperandShape`]). Multi-byte immediates and long branch deltas are little-endian `i32`.
//! Branch deltas are relative to the end of the branch instruction.

use alloc::vec::Vec;
use core::fmt;

use crate::opcode::{Opcode, OperandShape};

/// A bytecode decoding error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BytecodeError {
    /// The instruction at `pc` runs past the end of the stream.
    UnexpectedEnd {
        /// Offset of the truncated instruction.
        pc: usize,
    },
    /// The opcode byte at `pc` is not recognized.
    UnknownOpcode {
        /// Offset of the opcode byte.
        pc: usize,
        /// The unrecognized byte.
        byte: u8,
    },
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd { pc } => write!(f, "truncated instruction at pc {pc}"),
            Self::UnknownOpcode { pc, byte } => {
                write!(f, "unknown opcode 0x{byte:02X} at pc {pc}")
            }
        }
    }
}

impl core::error::Error for BytecodeError {}

/// A decoded instruction.
#[allow(missing_docs, reason = "operands are described by the opcode docs")]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    Nop,
    Pop,
    Dup,
    IVLoad { index: u8 },
    IVStore { index: u8 },
    ILLoad { index: u8 },
    ILStore { index: u8 },
    ISLoad { index: u8 },
    ITLoad { index: u8 },
    IntConst { value: i32 },
    IntConst8 { value: i8 },
    IntAdd,
    IntSub,
    IntMul,
    IntDiv,
    IntMod,
    IntAnd,
    IntOr,
    IntXor,
    IntAsr,
    IntAsl,
    Not,
    And,
    Or,
    IntLt,
    IntLe,
    IntGt,
    IntGe,
    IntEq,
    IntNe,
    IntNeg,
    IntNot,
    Jz { delta: i8 },
    Jnz { delta: i8 },
    Jmp { delta: i8 },
    Ljz { delta: i32 },
    Ljnz { delta: i32 },
    Ljmp { delta: i32 },
    LoopChk,
    MethodCallVoid { argc: u8, method: u8 },
    MethodCallInt { argc: u8, method: u8 },
    StaticMethodCallVoid { argc: u8, method: u8 },
    StaticMethodCallInt { argc: u8, method: u8 },
    FunctionCallVoid { argc: u8, func: u8 },
    FunctionCallInt { argc: u8, func: u8 },
    ReturnVoid,
    ReturnInt,
}

impl Instr {
    /// Decodes the instruction at `pc`, returning it with the offset of the next instruction.
    pub fn decode(code: &[u8], pc: usize) -> Result<(Self, usize), BytecodeError> {
        let &byte = code.get(pc).ok_or(BytecodeError::UnexpectedEnd { pc })?;
        let op = Opcode::from_u8(byte).ok_or(BytecodeError::UnknownOpcode { pc, byte })?;
        let next = pc + op.encoded_len();
        let operands = code
            .get(pc + 1..next)
            .ok_or(BytecodeError::UnexpectedEnd { pc })?;

        let u8_at = |i: usize| operands[i];
        let i32_le = || i32::from_le_bytes([operands[0], operands[1], operands[2], operands[3]]);

        let instr = match op {
            Opcode::Nop => Self::Nop,
            Opcode::Pop => Self::Pop,
            Opcode::Dup => Self::Dup,
            Opcode::IVLoad => Self::IVLoad { index: u8_at(0) },
            Opcode::IVStore => Self::IVStore { index: u8_at(0) },
            Opcode::ILLoad => Self::ILLoad { index: u8_at(0) },
            Opcode::ILStore => Self::ILStore { index: u8_at(0) },
            Opcode::ISLoad => Self::ISLoad { index: u8_at(0) },
            Opcode::ITLoad => Self::ITLoad { index: u8_at(0) },
            Opcode::IntConst => Self::IntConst { value: i32_le() },
            Opcode::IntConst8 => Self::IntConst8 {
                value: u8_at(0) as i8,
            },
            Opcode::IntAdd => Self::IntAdd,
            Opcode::IntSub => Self::IntSub,
            Opcode::IntMul => Self::IntMul,
            Opcode::IntDiv => Self::IntDiv,
            Opcode::IntMod => Self::IntMod,
            Opcode::IntAnd => Self::IntAnd,
            Opcode::IntOr => Self::IntOr,
            Opcode::IntXor => Self::IntXor,
            Opcode::IntAsr => Self::IntAsr,
            Opcode::IntAsl => Self::IntAsl,
            Opcode::Not => Self::Not,
            Opcode::And => Self::And,
            Opcode::Or => Self::Or,
            Opcode::IntLt => Self::IntLt,
            Opcode::IntLe => Self::IntLe,
            Opcode::IntGt => Self::IntGt,
            Opcode::IntGe => Self::IntGe,
            Opcode::IntEq => Self::IntEq,
            Opcode::IntNe => Self::IntNe,
            Opcode::IntNeg => Self::IntNeg,
            Opcode::IntNot => Self::IntNot,
            Opcode::Jz => Self::Jz {
                delta: u8_at(0) as i8,
            },
            Opcode::Jnz => Self::Jnz {
                delta: u8_at(0) as i8,
            },
            Opcode::Jmp => Self::Jmp {
                delta: u8_at(0) as i8,
            },
            Opcode::Ljz => Self::Ljz { delta: i32_le() },
            Opcode::Ljnz => Self::Ljnz { delta: i32_le() },
            Opcode::Ljmp => Self::Ljmp { delta: i32_le() },
            Opcode::LoopChk => Self::LoopChk,
            Opcode::MethodCallVoid => Self::MethodCallVoid {
                argc: u8_at(0),
                method: u8_at(1),
            },
            Opcode::MethodCallInt => Self::MethodCallInt {
                argc: u8_at(0),
                method: u8_at(1),
            },
            Opcode::StaticMethodCallVoid => Self::StaticMethodCallVoid {
                argc: u8_at(0),
                method: u8_at(1),
            },
            Opcode::StaticMethodCallInt => Self::StaticMethodCallInt {
                argc: u8_at(0),
                method: u8_at(1),
            },
            Opcode::FunctionCallVoid => Self::FunctionCallVoid {
                argc: u8_at(0),
                func: u8_at(1),
            },
            Opcode::FunctionCallInt => Self::FunctionCallInt {
                argc: u8_at(0),
                func: u8_at(1),
            },
            Opcode::ReturnVoid => Self::ReturnVoid,
            Opcode::ReturnInt => Self::ReturnInt,
        };
        Ok((instr, next))
    }

    /// Returns the opcode for this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Pop => Opcode::Pop,
            Self::Dup => Opcode::Dup,
            Self::IVLoad { .. } => Opcode::IVLoad,
            Self::IVStore { .. } => Opcode::IVStore,
            Self::ILLoad { .. } => Opcode::ILLoad,
            Self::ILStore { .. } => Opcode::ILStore,
            Self::ISLoad { .. } => Opcode::ISLoad,
            Self::ITLoad { .. } => Opcode::ITLoad,
            Self::IntConst { .. } => Opcode::IntConst,
            Self::IntConst8 { .. } => Opcode::IntConst8,
            Self::IntAdd => Opcode::IntAdd,
            Self::IntSub => Opcode::IntSub,
            Self::IntMul => Opcode::IntMul,
            Self::IntDiv => Opcode::IntDiv,
            Self::IntMod => Opcode::IntMod,
            Self::IntAnd => Opcode::IntAnd,
            Self::IntOr => Opcode::IntOr,
            Self::IntXor => Opcode::IntXor,
            Self::IntAsr => Opcode::IntAsr,
            Self::IntAsl => Opcode::IntAsl,
            Self::Not => Opcode::Not,
            Self::And => Opcode::And,
            Self::Or => Opcode::Or,
            Self::IntLt => Opcode::IntLt,
            Self::IntLe => Opcode::IntLe,
            Self::IntGt => Opcode::IntGt,
            Self::IntGe => Opcode::IntGe,
            Self::IntEq => Opcode::IntEq,
            Self::IntNe => Opcode::IntNe,
            Self::IntNeg => Opcode::IntNeg,
            Self::IntNot => Opcode::IntNot,
            Self::Jz { .. } => Opcode::Jz,
            Self::Jnz { .. } => Opcode::Jnz,
            Self::Jmp { .. } => Opcode::Jmp,
            Self::Ljz { .. } => Opcode::Ljz,
            Self::Ljnz { .. } => Opcode::Ljnz,
            Self::Ljmp { .. } => Opcode::Ljmp,
            Self::LoopChk => Opcode::LoopChk,
            Self::MethodCallVoid { .. } => Opcode::MethodCallVoid,
            Self::MethodCallInt { .. } => Opcode::MethodCallInt,
            Self::StaticMethodCallVoid { .. } => Opcode::StaticMethodCallVoid,
            Self::StaticMethodCallInt { .. } => Opcode::StaticMethodCallInt,
            Self::FunctionCallVoid { .. } => Opcode::FunctionCallVoid,
            Self::FunctionCallInt { .. } => Opcode::FunctionCallInt,
            Self::ReturnVoid => Opcode::ReturnVoid,
            Self::ReturnInt => Opcode::ReturnInt,
        }
    }

    /// Returns the branch delta for branch instructions.
    #[must_use]
    pub fn branch_delta(&self) -> Option<i32> {
        match *self {
            Self::Jz { delta } | Self::Jnz { delta } | Self::Jmp { delta } => Some(delta.into()),
            Self::Ljz { delta } | Self::Ljnz { delta } | Self::Ljmp { delta } => Some(delta),
            _ => None,
        }
    }

    /// Appends the encoded instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().byte());
        match *self {
            Self::IVLoad { index }
            | Self::IVStore { index }
            | Self::ILLoad { index }
            | Self::ILStore { index }
            | Self::ISLoad { index }
            | Self::ITLoad { index } => out.push(index),
            Self::IntConst8 { value } => out.push(value as u8),
            Self::Jz { delta } | Self::Jnz { delta } | Self::Jmp { delta } => {
                out.push(delta as u8);
            }
            Self::IntConst { value: imm }
            | Self::Ljz { delta: imm }
            | Self::Ljnz { delta: imm }
            | Self::Ljmp { delta: imm } => out.extend_from_slice(&imm.to_le_bytes()),
            Self::MethodCallVoid { argc, method }
            | Self::MethodCallInt { argc, method }
            | Self::StaticMethodCallVoid { argc, method }
            | Self::StaticMethodCallInt { argc, method } => out.extend_from_slice(&[argc, method]),
            Self::FunctionCallVoid { argc, func } | Self::FunctionCallInt { argc, func } => {
                out.extend_from_slice(&[argc, func]);
            }
            _ => {}
        }
    }
}

/// Resolves a branch delta against the offset of the following instruction.
///
/// Returns `None` if the target would be negative.
#[must_use]
pub fn branch_target(next_pc: usize, delta: i32) -> Option<usize> {
    let target = i64::try_from(next_pc).ok()? + i64::from(delta);
    usize::try_from(target).ok()
}

/// Iterates instructions in order from offset 0, yielding `(pc, instr)`.
///
/// Stops after the first decoding error, which is yielded as the final item.
#[derive(Clone, Debug)]
pub struct Instrs<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instrs<'a> {
    /// Creates an iterator over `code`.
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pc: 0,
            failed: false,
        }
    }
}

impl Iterator for Instrs<'_> {
    type Item = Result<(usize, Instr), BytecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        match Instr::decode(self.code, self.pc) {
            Ok((instr, next)) => {
                let pc = self.pc;
                self.pc = next;
                Some(Ok((pc, instr)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
