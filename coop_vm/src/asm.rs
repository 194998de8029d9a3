// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small bytecode assembler.
//!
//! Used by tests, benches and embedders that build functions without the script compiler.
//! Branches take [`Label`]s and are patched in [`Asm::finish`]: short forms (`jz`, `jnz`,
//! `jmp`) must land within an `i8` delta, long forms (`ljz`, `ljnz`, `ljmp`) within `i32`.

use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::Instr;
use crate::value::FuncId;

/// A label for control-flow targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A bytecode builder error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced but never placed.
    UnresolvedLabel,
    /// A label was placed twice.
    LabelPlacedTwice,
    /// A short branch target is further than an `i8` delta allows.
    BranchOutOfRange {
        /// Offset of the branch instruction.
        at: u32,
    },
    /// A function index does not fit the one-byte operand.
    FunctionOutOfRange {
        /// Offset of the call instruction.
        at: u32,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel => write!(f, "label was referenced but never placed"),
            Self::LabelPlacedTwice => write!(f, "label was placed twice"),
            Self::BranchOutOfRange { at } => write!(f, "short branch at pc {at} out of range"),
            Self::FunctionOutOfRange { at } => {
                write!(f, "function index at pc {at} does not fit in a byte")
            }
        }
    }
}

impl core::error::Error for AsmError {}

/// Bytecode builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    bytes: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    error: Option<AsmError>,
}

#[derive(Clone, Debug)]
struct Fixup {
    /// Offset of the branch opcode.
    at: usize,
    label: Label,
    kind: FixupKind,
}

#[derive(Copy, Clone, Debug)]
enum FixupKind {
    Rel8,
    Rel32,
}

impl Asm {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current byte offset ("pc") in the output.
    #[must_use]
    pub fn pc(&self) -> u32 {
        u32::try_from(self.bytes.len()).unwrap_or(u32::MAX)
    }

    /// Allocates a new label.
    #[must_use]
    pub fn label(&mut self) -> Label {
        let id = u32::try_from(self.labels.len()).unwrap_or(u32::MAX);
        self.labels.push(None);
        Label(id)
    }

    /// Places `label` at the current `pc`.
    pub fn place(&mut self, label: Label) -> Result<(), AsmError> {
        let pc = self.pc();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(AsmError::UnresolvedLabel)?;
        if slot.is_some() {
            return Err(AsmError::LabelPlacedTwice);
        }
        *slot = Some(pc);
        Ok(())
    }

    /// Finalizes and returns the encoded bytecode.
    pub fn finish(mut self) -> Result<Vec<u8>, AsmError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        for f in &self.fixups {
            let Some(target) = self.labels.get(f.label.0 as usize).and_then(|x| *x) else {
                return Err(AsmError::UnresolvedLabel);
            };
            match f.kind {
                FixupKind::Rel8 => {
                    let next = f.at + 2;
                    let delta = i64::from(target) - next as i64;
                    let delta = i8::try_from(delta).map_err(|_| AsmError::BranchOutOfRange {
                        at: f.at as u32,
                    })?;
                    self.bytes[f.at + 1] = delta as u8;
                }
                FixupKind::Rel32 => {
                    let next = f.at + 5;
                    let delta = (i64::from(target) - next as i64) as i32;
                    self.bytes[f.at + 1..next].copy_from_slice(&delta.to_le_bytes());
                }
            }
        }
        Ok(self.bytes)
    }

    fn emit(&mut self, instr: Instr) -> &mut Self {
        instr.encode(&mut self.bytes);
        self
    }

    fn branch(&mut self, instr: Instr, label: Label, kind: FixupKind) -> &mut Self {
        self.fixups.push(Fixup {
            at: self.bytes.len(),
            label,
            kind,
        });
        self.emit(instr)
    }

    fn func_index(&mut self, func: FuncId) -> u8 {
        match u8::try_from(func.0) {
            Ok(index) => index,
            Err(_) => {
                let at = self.pc();
                self.error.get_or_insert(AsmError::FunctionOutOfRange { at });
                0
            }
        }
    }

    /// `nop`.
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instr::Nop)
    }

    /// `pop`.
    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instr::Pop)
    }

    /// `dup`.
    pub fn dup(&mut self) -> &mut Self {
        self.emit(Instr::Dup)
    }

    /// `iv_load index`.
    pub fn iv_load(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::IVLoad { index })
    }

    /// `iv_store index`.
    pub fn iv_store(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::IVStore { index })
    }

    /// `il_load index`.
    pub fn il_load(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::ILLoad { index })
    }

    /// `il_store index`.
    pub fn il_store(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::ILStore { index })
    }

    /// `is_load index`.
    pub fn is_load(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::ISLoad { index })
    }

    /// `it_load index`.
    pub fn it_load(&mut self, index: u8) -> &mut Self {
        self.emit(Instr::ITLoad { index })
    }

    /// `int_const value` (5 bytes).
    pub fn int_const(&mut self, value: i32) -> &mut Self {
        self.emit(Instr::IntConst { value })
    }

    /// `int_const8 value` (2 bytes).
    pub fn int_const8(&mut self, value: i8) -> &mut Self {
        self.emit(Instr::IntConst8 { value })
    }

    /// Pushes `value` using the shortest encoding.
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        match i8::try_from(value) {
            Ok(v) => self.int_const8(v),
            Err(_) => self.int_const(value),
        }
    }

    /// `int_add`.
    pub fn int_add(&mut self) -> &mut Self {
        self.emit(Instr::IntAdd)
    }

    /// `int_sub`.
    pub fn int_sub(&mut self) -> &mut Self {
        self.emit(Instr::IntSub)
    }

    /// `int_mul`.
    pub fn int_mul(&mut self) -> &mut Self {
        self.emit(Instr::IntMul)
    }

    /// `int_div`.
    pub fn int_div(&mut self) -> &mut Self {
        self.emit(Instr::IntDiv)
    }

    /// `int_mod`.
    pub fn int_mod(&mut self) -> &mut Self {
        self.emit(Instr::IntMod)
    }

    /// `int_and`.
    pub fn int_and(&mut self) -> &mut Self {
        self.emit(Instr::IntAnd)
    }

    /// `int_or`.
    pub fn int_or(&mut self) -> &mut Self {
        self.emit(Instr::IntOr)
    }

    /// `int_xor`.
    pub fn int_xor(&mut self) -> &mut Self {
        self.emit(Instr::IntXor)
    }

    /// `int_asr`.
    pub fn int_asr(&mut self) -> &mut Self {
        self.emit(Instr::IntAsr)
    }

    /// `int_asl`.
    pub fn int_asl(&mut self) -> &mut Self {
        self.emit(Instr::IntAsl)
    }

    /// `not`.
    pub fn not(&mut self) -> &mut Self {
        self.emit(Instr::Not)
    }

    /// `and`.
    pub fn and(&mut self) -> &mut Self {
        self.emit(Instr::And)
    }

    /// `or`.
    pub fn or(&mut self) -> &mut Self {
        self.emit(Instr::Or)
    }

    /// `int_lt`.
    pub fn int_lt(&mut self) -> &mut Self {
        self.emit(Instr::IntLt)
    }

    /// `int_le`.
    pub fn int_le(&mut self) -> &mut Self {
        self.emit(Instr::IntLe)
    }

    /// `int_gt`.
    pub fn int_gt(&mut self) -> &mut Self {
        self.emit(Instr::IntGt)
    }

    /// `int_ge`.
    pub fn int_ge(&mut self) -> &mut Self {
        self.emit(Instr::IntGe)
    }

    /// `int_eq`.
    pub fn int_eq(&mut self) -> &mut Self {
        self.emit(Instr::IntEq)
    }

    /// `int_ne`.
    pub fn int_ne(&mut self) -> &mut Self {
        self.emit(Instr::IntNe)
    }

    /// `int_neg`.
    pub fn int_neg(&mut self) -> &mut Self {
        self.emit(Instr::IntNeg)
    }

    /// `int_not`.
    pub fn int_not(&mut self) -> &mut Self {
        self.emit(Instr::IntNot)
    }

    /// `jz target` (short).
    pub fn jz(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Jz { delta: 0 }, target, FixupKind::Rel8)
    }

    /// `jnz target` (short).
    pub fn jnz(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Jnz { delta: 0 }, target, FixupKind::Rel8)
    }

    /// `jmp target` (short).
    pub fn jmp(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Jmp { delta: 0 }, target, FixupKind::Rel8)
    }

    /// `ljz target` (long).
    pub fn ljz(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Ljz { delta: 0 }, target, FixupKind::Rel32)
    }

    /// `ljnz target` (long).
    pub fn ljnz(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Ljnz { delta: 0 }, target, FixupKind::Rel32)
    }

    /// `ljmp target` (long).
    pub fn ljmp(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::Ljmp { delta: 0 }, target, FixupKind::Rel32)
    }

    /// `loop_chk`.
    pub fn loop_chk(&mut self) -> &mut Self {
        self.emit(Instr::LoopChk)
    }

    /// `method_call_void argc, method`.
    pub fn method_call_void(&mut self, argc: u8, method: u8) -> &mut Self {
        self.emit(Instr::MethodCallVoid { argc, method })
    }

    /// `method_call_int argc, method`.
    pub fn method_call_int(&mut self, argc: u8, method: u8) -> &mut Self {
        self.emit(Instr::MethodCallInt { argc, method })
    }

    /// `static_method_call_void argc, method`.
    pub fn static_method_call_void(&mut self, argc: u8, method: u8) -> &mut Self {
        self.emit(Instr::StaticMethodCallVoid { argc, method })
    }

    /// `static_method_call_int argc, method`.
    pub fn static_method_call_int(&mut self, argc: u8, method: u8) -> &mut Self {
        self.emit(Instr::StaticMethodCallInt { argc, method })
    }

    /// `function_call_void argc, func`.
    pub fn function_call_void(&mut self, argc: u8, func: FuncId) -> &mut Self {
        let func = self.func_index(func);
        self.emit(Instr::FunctionCallVoid { argc, func })
    }

    /// `function_call_int argc, func`.
    pub fn function_call_int(&mut self, argc: u8, func: FuncId) -> &mut Self {
        let func = self.func_index(func);
        self.emit(Instr::FunctionCallInt { argc, func })
    }

    /// `return_void`.
    pub fn return_void(&mut self) -> &mut Self {
        self.emit(Instr::ReturnVoid)
    }

    /// `return_int`.
    pub fn return_int(&mut self) -> &mut Self {
        self.emit(Instr::ReturnInt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn backward_short_branch() {
        let mut a = Asm::new();
        let top = a.label();
        a.place(top).unwrap();
        a.loop_chk().jmp(top);
        // loop_chk at 0, jmp at 1..3 -> delta = 0 - 3
        assert_eq!(a.finish().unwrap(), vec![0x26, 0x22, 0xFD]);
    }

    #[test]
    fn forward_long_branch() {
        let mut a = Asm::new();
        let end = a.label();
        a.int_const8(0).ljz(end).nop().nop();
        a.place(end).unwrap();
        a.return_void();
        let code = a.finish().unwrap();
        assert_eq!(&code[2..7], &[0x23, 2, 0, 0, 0]);
    }

    #[test]
    fn short_branch_range_is_checked() {
        let mut a = Asm::new();
        let end = a.label();
        a.jmp(end);
        for _ in 0..200 {
            a.nop();
        }
        a.place(end).unwrap();
        assert_eq!(a.finish(), Err(AsmError::BranchOutOfRange { at: 0 }));
    }

    #[test]
    fn labels_must_be_placed_once() {
        let mut a = Asm::new();
        let l = a.label();
        a.jz(l);
        assert_eq!(a.clone().finish(), Err(AsmError::UnresolvedLabel));
        a.place(l).unwrap();
        assert_eq!(a.place(l), Err(AsmError::LabelPlacedTwice));
    }

    #[test]
    fn push_int_picks_shortest_form() {
        let mut a = Asm::new();
        a.push_int(-128).push_int(128);
        assert_eq!(a.finish().unwrap(), vec![0x0A, 0x80, 0x09, 0x80, 0, 0, 0]);
    }

    #[test]
    fn function_index_must_fit_a_byte() {
        let mut a = Asm::new();
        a.nop().function_call_void(0, FuncId(300));
        assert_eq!(a.finish(), Err(AsmError::FunctionOutOfRange { at: 1 }));
    }
}
