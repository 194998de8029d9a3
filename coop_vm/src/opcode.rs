// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode byte values for the instruction set.
//!
//! This module is a small wrapper around generated opcode tables.

include!("opcodes_gen.rs");

impl OperandShape {
    /// Number of operand bytes following the opcode byte.
    #[must_use]
    pub const fn operand_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 | Self::I8 | Self::Rel8 => 1,
            Self::Call => 2,
            Self::I32 | Self::Rel32 => 4,
        }
    }
}

impl Opcode {
    /// Returns the opcode byte value.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Stable, parseable opcode name, as printed by the disassembler.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Operand encoding following the opcode byte.
    #[must_use]
    pub fn shape(self) -> OperandShape {
        self.info().shape
    }

    /// Total encoded length, opcode byte included.
    #[must_use]
    pub fn encoded_len(self) -> usize {
        1 + self.shape().operand_len()
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn is_terminator(self) -> bool {
        self.info().is_terminator
    }

    /// Returns `true` for the six call opcodes.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self.shape(), OperandShape::Call)
    }
}
