// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// @generated by coop_vm_codegen. Do not edit by hand.

/// Operand encodings that follow an opcode byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandShape {
    /// No operand.
    None,
    /// One unsigned byte index.
    U8,
    /// One signed byte immediate.
    I8,
    /// One signed byte branch delta.
    Rel8,
    /// A little-endian `i32` immediate.
    I32,
    /// A little-endian `i32` branch delta.
    Rel32,
    /// An argument count byte followed by a callee index byte.
    Call,
}

/// Static metadata for one opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Stable, parseable opcode name.
    pub mnemonic: &'static str,
    /// Operand encoding following the opcode byte.
    pub shape: OperandShape,
    /// `true` if control never falls through to the next instruction.
    pub is_terminator: bool,
}

/// Number of defined opcodes.
pub const OPCODE_COUNT: usize = 47;

static OPCODE_INFO_BY_BYTE: [OpcodeInfo; 47] = [
    OpcodeInfo { mnemonic: "nop", shape: OperandShape::None, is_terminator: false }, // 0x00 Nop
    OpcodeInfo { mnemonic: "pop", shape: OperandShape::None, is_terminator: false }, // 0x01 Pop
    OpcodeInfo { mnemonic: "dup", shape: OperandShape::None, is_terminator: false }, // 0x02 Dup
    OpcodeInfo { mnemonic: "iv_load", shape: OperandShape::U8, is_terminator: false }, // 0x03 IVLoad
    OpcodeInfo { mnemonic: "iv_store", shape: OperandShape::U8, is_terminator: false }, // 0x04 IVStore
    OpcodeInfo { mnemonic: "il_load", shape: OperandShape::U8, is_terminator: false }, // 0x05 ILLoad
    OpcodeInfo { mnemonic: "il_store", shape: OperandShape::U8, is_terminator: false }, // 0x06 ILStore
    OpcodeInfo { mnemonic: "is_load", shape: OperandShape::U8, is_terminator: false }, // 0x07 ISLoad
    OpcodeInfo { mnemonic: "it_load", shape: OperandShape::U8, is_terminator: false }, // 0x08 ITLoad
    OpcodeInfo { mnemonic: "int_const", shape: OperandShape::I32, is_terminator: false }, // 0x09 IntConst
    OpcodeInfo { mnemonic: "int_const8", shape: OperandShape::I8, is_terminator: false }, // 0x0A IntConst8
    OpcodeInfo { mnemonic: "int_add", shape: OperandShape::None, is_terminator: false }, // 0x0B IntAdd
    OpcodeInfo { mnemonic: "int_sub", shape: OperandShape::None, is_terminator: false }, // 0x0C IntSub
    OpcodeInfo { mnemonic: "int_mul", shape: OperandShape::None, is_terminator: false }, // 0x0D IntMul
    OpcodeInfo { mnemonic: "int_div", shape: OperandShape::None, is_terminator: false }, // 0x0E IntDiv
    OpcodeInfo { mnemonic: "int_mod", shape: OperandShape::None, is_terminator: false }, // 0x0F IntMod
    OpcodeInfo { mnemonic: "int_and", shape: OperandShape::None, is_terminator: false }, // 0x10 IntAnd
    OpcodeInfo { mnemonic: "int_or", shape: OperandShape::None, is_terminator: false }, // 0x11 IntOr
    OpcodeInfo { mnemonic: "int_xor", shape: OperandShape::None, is_terminator: false }, // 0x12 IntXor
    OpcodeInfo { mnemonic: "int_asr", shape: OperandShape::None, is_terminator: false }, // 0x13 IntAsr
    OpcodeInfo { mnemonic: "int_asl", shape: OperandShape::None, is_terminator: false }, // 0x14 IntAsl
    OpcodeInfo { mnemonic: "not", shape: OperandShape::None, is_terminator: false }, // 0x15 Not
    OpcodeInfo { mnemonic: "and", shape: OperandShape::None, is_terminator: false }, // 0x16 And
    OpcodeInfo { mnemonic: "or", shape: OperandShape::None, is_terminator: false }, // 0x17 Or
    OpcodeInfo { mnemonic: "int_lt", shape: OperandShape::None, is_terminator: false }, // 0x18 IntLt
    OpcodeInfo { mnemonic: "int_le", shape: OperandShape::None, is_terminator: false }, // 0x19 IntLe
    OpcodeInfo { mnemonic: "int_gt", shape: OperandShape::None, is_terminator: false }, // 0x1A IntGt
    OpcodeInfo { mnemonic: "int_ge", shape: OperandShape::None, is_terminator: false }, // 0x1B IntGe
    OpcodeInfo { mnemonic: "int_eq", shape: OperandShape::None, is_terminator: false }, // 0x1C IntEq
    OpcodeInfo { mnemonic: "int_ne", shape: OperandShape::None, is_terminator: false }, // 0x1D IntNe
    OpcodeInfo { mnemonic: "int_neg", shape: OperandShape::None, is_terminator: false }, // 0x1E IntNeg
    OpcodeInfo { mnemonic: "int_not", shape: OperandShape::None, is_terminator: false }, // 0x1F IntNot
    OpcodeInfo { mnemonic: "jz", shape: OperandShape::Rel8, is_terminator: false }, // 0x20 Jz
    OpcodeInfo { mnemonic: "jnz", shape: OperandShape::Rel8, is_terminator: false }, // 0x21 Jnz
    OpcodeInfo { mnemonic: "jmp", shape: OperandShape::Rel8, is_terminator: true }, // 0x22 Jmp
    OpcodeInfo { mnemonic: "ljz", shape: OperandShape::Rel32, is_terminator: false }, // 0x23 Ljz
    OpcodeInfo { mnemonic: "ljnz", shape: OperandShape::Rel32, is_terminator: false }, // 0x24 Ljnz
    OpcodeInfo { mnemonic: "ljmp", shape: OperandShape::Rel32, is_terminator: true }, // 0x25 Ljmp
    OpcodeInfo { mnemonic: "loop_chk", shape: OperandShape::None, is_terminator: false }, // 0x26 LoopChk
    OpcodeInfo { mnemonic: "method_call_void", shape: OperandShape::Call, is_terminator: false }, // 0x27 MethodCallVoid
    OpcodeInfo { mnemonic: "method_call_int", shape: OperandShape::Call, is_terminator: false }, // 0x28 MethodCallInt
    OpcodeInfo { mnemonic: "static_method_call_void", shape: OperandShape::Call, is_terminator: false }, // 0x29 StaticMethodCallVoid
    OpcodeInfo { mnemonic: "static_method_call_int", shape: OperandShape::Call, is_terminator: false }, // 0x2A StaticMethodCallInt
    OpcodeInfo { mnemonic: "function_call_void", shape: OperandShape::Call, is_terminator: false }, // 0x2B FunctionCallVoid
    OpcodeInfo { mnemonic: "function_call_int", shape: OperandShape::Call, is_terminator: false }, // 0x2C FunctionCallInt
    OpcodeInfo { mnemonic: "return_void", shape: OperandShape::None, is_terminator: true }, // 0x2D ReturnVoid
    OpcodeInfo { mnemonic: "return_int", shape: OperandShape::None, is_terminator: true }, // 0x2E ReturnInt
];

/// Bytecode opcode byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// No operation.
    Nop = 0x00,
    /// Discards the top stack value.
    Pop = 0x01,
    /// Pushes a copy of the top stack value.
    Dup = 0x02,
    /// Pushes global variable `index`.
    IVLoad = 0x03,
    /// Pops a value into global variable `index`.
    IVStore = 0x04,
    /// Pushes frame local `index`.
    ILLoad = 0x05,
    /// Pops a value into frame local `index`.
    ILStore = 0x06,
    /// Pushes special (host-exposed) variable `index`.
    ISLoad = 0x07,
    /// Pushes thread variable `index`.
    ITLoad = 0x08,
    /// Pushes a little-endian `i32` immediate.
    IntConst = 0x09,
    /// Pushes a sign-extended `i8` immediate.
    IntConst8 = 0x0A,
    /// Pops `b`, `a`; pushes `a + b` (wrapping).
    IntAdd = 0x0B,
    /// Pops `b`, `a`; pushes `a - b` (wrapping).
    IntSub = 0x0C,
    /// Pops `b`, `a`; pushes `a * b` (wrapping).
    IntMul = 0x0D,
    /// Pops `b`, `a`; pushes `a / b`.
    ///
    /// Division by zero yields 0 and division by -1 yields the wrapping negation.
    IntDiv = 0x0E,
    /// Pops `b`, `a`; pushes `a % b`.
    ///
    /// A divisor of -1, 0 or 1 yields 0.
    IntMod = 0x0F,
    /// Pops `b`, `a`; pushes `a & b`.
    IntAnd = 0x10,
    /// Pops `b`, `a`; pushes `a | b`.
    IntOr = 0x11,
    /// Pops `b`, `a`; pushes `a ^ b`.
    IntXor = 0x12,
    /// Pops `b`, `a`; pushes `a >> (b & 31)` (arithmetic).
    IntAsr = 0x13,
    /// Pops `b`, `a`; pushes `a << (b & 31)`.
    IntAsl = 0x14,
    /// Replaces the top value with 1 if it is zero, else 0.
    Not = 0x15,
    /// Pops `b`, `a`; pushes 1 if both are non-zero, else 0.
    And = 0x16,
    /// Pops `b`, `a`; pushes 1 if either is non-zero, else 0.
    Or = 0x17,
    /// Pops `b`, `a`; pushes `a < b` as 0/1.
    IntLt = 0x18,
    /// Pops `b`, `a`; pushes `a <= b` as 0/1.
    IntLe = 0x19,
    /// Pops `b`, `a`; pushes `a > b` as 0/1.
    IntGt = 0x1A,
    /// Pops `b`, `a`; pushes `a >= b` as 0/1.
    IntGe = 0x1B,
    /// Pops `b`, `a`; pushes `a == b` as 0/1.
    IntEq = 0x1C,
    /// Pops `b`, `a`; pushes `a != b` as 0/1.
    IntNe = 0x1D,
    /// Negates the top value (wrapping).
    IntNeg = 0x1E,
    /// Bitwise-complements the top value.
    IntNot = 0x1F,
    /// Pops a value; branches by an `i8` delta if it is zero.
    Jz = 0x20,
    /// Pops a value; branches by an `i8` delta if it is non-zero.
    Jnz = 0x21,
    /// Branches by an `i8` delta.
    Jmp = 0x22,
    /// Pops a value; branches by an `i32` delta if it is zero.
    Ljz = 0x23,
    /// Pops a value; branches by an `i32` delta if it is non-zero.
    Ljnz = 0x24,
    /// Branches by an `i32` delta.
    Ljmp = 0x25,
    /// Consumes one unit of the per-run loop budget.
    LoopChk = 0x26,
    /// Calls native method `index` with an object and `argc` arguments; pushes nothing.
    MethodCallVoid = 0x27,
    /// Calls native method `index` with an object and `argc` arguments; the result replaces the object.
    MethodCallInt = 0x28,
    /// Calls native static method `index` with `argc` arguments; pushes nothing.
    StaticMethodCallVoid = 0x29,
    /// Calls native static method `index` with `argc` arguments; pushes the result.
    StaticMethodCallInt = 0x2A,
    /// Calls script function `index` with `argc` arguments; pushes nothing.
    FunctionCallVoid = 0x2B,
    /// Calls script function `index` with `argc` arguments; pushes the result.
    FunctionCallInt = 0x2C,
    /// Returns from the current frame.
    ReturnVoid = 0x2D,
    /// Returns the top value from the current frame.
    ReturnInt = 0x2E,
}

impl Opcode {
    /// Every opcode, in byte order.
    pub const ALL: [Self; 47] = [
        Self::Nop,
        Self::Pop,
        Self::Dup,
        Self::IVLoad,
        Self::IVStore,
        Self::ILLoad,
        Self::ILStore,
        Self::ISLoad,
        Self::ITLoad,
        Self::IntConst,
        Self::IntConst8,
        Self::IntAdd,
        Self::IntSub,
        Self::IntMul,
        Self::IntDiv,
        Self::IntMod,
        Self::IntAnd,
        Self::IntOr,
        Self::IntXor,
        Self::IntAsr,
        Self::IntAsl,
        Self::Not,
        Self::And,
        Self::Or,
        Self::IntLt,
        Self::IntLe,
        Self::IntGt,
        Self::IntGe,
        Self::IntEq,
        Self::IntNe,
        Self::IntNeg,
        Self::IntNot,
        Self::Jz,
        Self::Jnz,
        Self::Jmp,
        Self::Ljz,
        Self::Ljnz,
        Self::Ljmp,
        Self::LoopChk,
        Self::MethodCallVoid,
        Self::MethodCallInt,
        Self::StaticMethodCallVoid,
        Self::StaticMethodCallInt,
        Self::FunctionCallVoid,
        Self::FunctionCallInt,
        Self::ReturnVoid,
        Self::ReturnInt,
    ];

    /// Decodes an opcode byte.
    #[must_use]
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => Self::Nop,
            0x01 => Self::Pop,
            0x02 => Self::Dup,
            0x03 => Self::IVLoad,
            0x04 => Self::IVStore,
            0x05 => Self::ILLoad,
            0x06 => Self::ILStore,
            0x07 => Self::ISLoad,
            0x08 => Self::ITLoad,
            0x09 => Self::IntConst,
            0x0A => Self::IntConst8,
            0x0B => Self::IntAdd,
            0x0C => Self::IntSub,
            0x0D => Self::IntMul,
            0x0E => Self::IntDiv,
            0x0F => Self::IntMod,
            0x10 => Self::IntAnd,
            0x11 => Self::IntOr,
            0x12 => Self::IntXor,
            0x13 => Self::IntAsr,
            0x14 => Self::IntAsl,
            0x15 => Self::Not,
            0x16 => Self::And,
            0x17 => Self::Or,
            0x18 => Self::IntLt,
            0x19 => Self::IntLe,
            0x1A => Self::IntGt,
            0x1B => Self::IntGe,
            0x1C => Self::IntEq,
            0x1D => Self::IntNe,
            0x1E => Self::IntNeg,
            0x1F => Self::IntNot,
            0x20 => Self::Jz,
            0x21 => Self::Jnz,
            0x22 => Self::Jmp,
            0x23 => Self::Ljz,
            0x24 => Self::Ljnz,
            0x25 => Self::Ljmp,
            0x26 => Self::LoopChk,
            0x27 => Self::MethodCallVoid,
            0x28 => Self::MethodCallInt,
            0x29 => Self::StaticMethodCallVoid,
            0x2A => Self::StaticMethodCallInt,
            0x2B => Self::FunctionCallVoid,
            0x2C => Self::FunctionCallInt,
            0x2D => Self::ReturnVoid,
            0x2E => Self::ReturnInt,
            _ => return None,
        })
    }

    /// Returns opcode metadata for this opcode.
    #[must_use]
    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_INFO_BY_BYTE[usize::from(self as u8)]
    }
}
