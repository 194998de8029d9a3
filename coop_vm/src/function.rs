// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compiled script functions.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::thunk::NativeThunk;
use crate::value::TypeInfo;
use crate::verifier::{VerifyConfig, VerifyError, verify_function};

/// Function and native-method flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FunctionFlags(u32);

impl core::ops::BitOr for FunctionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for FunctionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FunctionFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// May suspend the calling thread.
    pub const ASYNC: Self = Self(1 << 0);
    /// May suspend on a serial I/O completion.
    pub const ASYNC_SIO: Self = Self(1 << 1);
    /// May suspend on a raw serial I/O event.
    pub const ASYNC_RAW_SIO: Self = Self(1 << 2);
    /// Every async bit.
    pub const ASYNC_ALL: Self = Self(0xFF);
    /// A native method that takes no object argument.
    pub const STATIC: Self = Self(1 << 8);

    /// Returns `true` if this set includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if this set shares any bit with `other`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// The input to [`Function::new`]: everything a compiler produces for one function.
#[derive(Clone, Debug)]
pub struct FunctionDef {
    /// Name used in diagnostics.
    pub name: String,
    /// Declared return type.
    pub return_type: TypeInfo,
    /// Encoded instruction stream.
    pub bytecode: Vec<u8>,
    /// Native callbacks addressed by the method-call opcodes.
    pub methods: Vec<NativeThunk>,
    /// Leading local slots that receive the caller's arguments.
    pub param_slots: u32,
    /// Frame local slot count (parameters included).
    pub local_slots: u32,
    /// Async flags.
    pub flags: FunctionFlags,
}

impl FunctionDef {
    /// Creates a definition with no locals, parameters or native methods.
    pub fn new(name: impl Into<String>, return_type: TypeInfo, bytecode: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            return_type,
            bytecode,
            methods: Vec::new(),
            param_slots: 0,
            local_slots: 0,
            flags: FunctionFlags::NONE,
        }
    }

    /// Sets the local slot count.
    #[must_use]
    pub fn with_locals(mut self, local_slots: u32) -> Self {
        self.local_slots = local_slots;
        self
    }

    /// Sets the parameter count. Parameters occupy the first `param_slots` locals.
    #[must_use]
    pub fn with_params(mut self, param_slots: u32) -> Self {
        self.param_slots = param_slots;
        self
    }

    /// Sets the native method table.
    #[must_use]
    pub fn with_methods(mut self, methods: Vec<NativeThunk>) -> Self {
        self.methods = methods;
        self
    }

    /// Sets the function flags.
    #[must_use]
    pub fn with_flags(mut self, flags: FunctionFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// An immutable compiled function.
///
/// Functions are shared between the domain's function table and every frame executing them.
pub struct Function {
    name: Box<str>,
    return_type: TypeInfo,
    bytecode: Box<[u8]>,
    methods: Box<[NativeThunk]>,
    param_slots: u32,
    local_slots: u32,
    stack_slots: u32,
    flags: FunctionFlags,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("code_len", &self.bytecode.len())
            .field("methods", &self.methods.len())
            .field("param_slots", &self.param_slots)
            .field("local_slots", &self.local_slots)
            .field("stack_slots", &self.stack_slots)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Function {
    /// Verifies `def` and computes its worst-case stack slot count.
    pub fn new(def: FunctionDef, cfg: &VerifyConfig) -> Result<Self, VerifyError> {
        let stack_slots = verify_function(&def, cfg)?;
        Ok(Self::from_trusted(def, stack_slots))
    }

    /// Wraps compiler output whose stack slot count was computed elsewhere.
    ///
    /// No verification is performed. Malformed bytecode aborts the running thread rather than
    /// corrupting memory, but stack accesses past `stack_slots` will panic.
    #[must_use]
    pub fn from_trusted(def: FunctionDef, stack_slots: u32) -> Self {
        Self {
            name: def.name.into_boxed_str(),
            return_type: def.return_type,
            bytecode: def.bytecode.into_boxed_slice(),
            methods: def.methods.into_boxed_slice(),
            param_slots: def.param_slots,
            local_slots: def.local_slots,
            stack_slots: stack_slots.max(def.local_slots),
            flags: def.flags,
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return type.
    #[must_use]
    pub fn return_type(&self) -> TypeInfo {
        self.return_type
    }

    /// Encoded instruction stream.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Native method `index`, if present.
    #[must_use]
    pub fn method(&self, index: u8) -> Option<&NativeThunk> {
        self.methods.get(usize::from(index))
    }

    /// Number of native methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Leading local slots that receive the caller's arguments.
    #[must_use]
    pub fn param_slots(&self) -> u32 {
        self.param_slots
    }

    /// Frame local slot count.
    #[must_use]
    pub fn local_slots(&self) -> u32 {
        self.local_slots
    }

    /// Worst-case operand stack slots for one activation, locals included.
    #[must_use]
    pub fn stack_slots(&self) -> u32 {
        self.stack_slots
    }

    /// Function flags.
    #[must_use]
    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }
}
