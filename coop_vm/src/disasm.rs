// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler.
//!
//! One instruction per line, prefixed with its byte offset. Branch targets are resolved to
//! labels (`@L0`, `@L1`, ...) numbered in offset order, with the entry point always `@L0`.

use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{BytecodeError, Instr, Instrs, branch_target};
use crate::domain::Domain;
use crate::function::Function;
use crate::value::FuncId;

/// A decoded view of one function.
#[derive(Debug)]
pub struct FunctionDisassembly<'a> {
    function: &'a Function,
    id: Option<FuncId>,
    instrs: Vec<(usize, Instr)>,
    error: Option<BytecodeError>,
}

impl<'a> FunctionDisassembly<'a> {
    /// Decodes `function`. Decoding stops at the first error, which is kept.
    #[must_use]
    pub fn new(function: &'a Function) -> Self {
        let mut instrs = Vec::new();
        let mut error = None;
        for item in Instrs::new(function.bytecode()) {
            match item {
                Ok(pair) => instrs.push(pair),
                Err(e) => error = Some(e),
            }
        }
        Self {
            function,
            id: None,
            instrs,
            error,
        }
    }

    /// Returns the decoded `(pc, instr)` pairs.
    #[must_use]
    pub fn instrs(&self) -> &[(usize, Instr)] {
        &self.instrs
    }

    /// Returns the decoding error, if the bytecode is malformed.
    #[must_use]
    pub fn error(&self) -> Option<&BytecodeError> {
        self.error.as_ref()
    }

    /// Returns the sorted label offsets: the entry point plus every in-bounds branch target.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        let mut pcs = Vec::with_capacity(1 + self.instrs.len() / 4);
        pcs.push(0);
        for &(pc, instr) in &self.instrs {
            if let Some(delta) = instr.branch_delta()
                && let Some(target) = branch_target(pc + instr.opcode().encoded_len(), delta)
            {
                pcs.push(target);
            }
        }
        pcs.sort_unstable();
        pcs.dedup();
        pcs
    }
}

/// Disassembly of every function registered with a domain.
#[derive(Debug)]
pub struct Disassembly<'a> {
    functions: Vec<FunctionDisassembly<'a>>,
}

impl<'a> Disassembly<'a> {
    /// Returns the per-function views in registration order.
    #[must_use]
    pub fn functions(&self) -> &[FunctionDisassembly<'a>] {
        &self.functions
    }
}

/// Disassembles a single function.
#[must_use]
pub fn disassemble_function(function: &Function) -> FunctionDisassembly<'_> {
    FunctionDisassembly::new(function)
}

/// Disassembles every function in `domain`.
#[must_use]
pub fn disassemble(domain: &Domain) -> Disassembly<'_> {
    let functions = domain
        .functions
        .iter()
        .enumerate()
        .map(|(ix, f)| FunctionDisassembly {
            id: Some(FuncId(ix as u32)),
            ..FunctionDisassembly::new(f)
        })
        .collect();
    Disassembly { functions }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fd) in self.functions.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            fmt::Display::fmt(fd, f)?;
        }
        Ok(())
    }
}

impl fmt::Display for FunctionDisassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.function;
        write!(f, "func ")?;
        if let Some(id) = self.id {
            write!(f, "{id} ")?;
        }
        writeln!(
            f,
            "\"{}\": returns={} params={} locals={} stack={}",
            func.name(),
            func.return_type(),
            func.param_slots(),
            func.local_slots(),
            func.stack_slots()
        )?;

        let labels = self.labels();
        for &(pc, instr) in &self.instrs {
            if let Ok(ix) = labels.binary_search(&pc) {
                writeln!(f, "  @L{ix}:")?;
            }
            write!(f, "  {pc:06}: {}", instr.opcode().mnemonic())?;
            fmt_operands(f, pc, &instr, &labels)?;
            writeln!(f)?;
        }
        if let Some(e) = &self.error {
            writeln!(f, "  <decode error: {e}>")?;
        }
        Ok(())
    }
}

fn fmt_operands(
    f: &mut fmt::Formatter<'_>,
    pc: usize,
    instr: &Instr,
    labels: &[usize],
) -> fmt::Result {
    match *instr {
        Instr::IVLoad { index }
        | Instr::IVStore { index }
        | Instr::ILLoad { index }
        | Instr::ILStore { index }
        | Instr::ISLoad { index }
        | Instr::ITLoad { index } => write!(f, " {index}"),
        Instr::IntConst { value } => write!(f, " {value}"),
        Instr::IntConst8 { value } => write!(f, " {value}"),
        Instr::MethodCallVoid { argc, method }
        | Instr::MethodCallInt { argc, method }
        | Instr::StaticMethodCallVoid { argc, method }
        | Instr::StaticMethodCallInt { argc, method } => write!(f, " {argc}, m{method}"),
        Instr::FunctionCallVoid { argc, func } | Instr::FunctionCallInt { argc, func } => {
            write!(f, " {argc}, {}", FuncId(u32::from(func)))
        }
        _ => match instr.branch_delta() {
            Some(delta) => {
                let next = pc + instr.opcode().encoded_len();
                match branch_target(next, delta) {
                    Some(target) => match labels.binary_search(&target) {
                        Ok(ix) => write!(f, " @L{ix}"),
                        Err(_) => write!(f, " @{target:06}"),
                    },
                    None => write!(f, " <{delta:+}>"),
                }
            }
            None => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::function::FunctionDef;
    use crate::value::{TYPE_INT, TYPE_VOID};
    use crate::verifier::VerifyConfig;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn labels_resolve_branch_targets() {
        let mut a = Asm::new();
        let top = a.label();
        let done = a.label();
        a.place(top).unwrap();
        a.loop_chk().il_load(0).jz(done);
        a.il_load(0).int_const8(1).int_sub().il_store(0);
        a.jmp(top);
        a.place(done).unwrap();
        a.return_void();
        let def = FunctionDef::new("countdown", TYPE_VOID, a.finish().unwrap())
            .with_params(1)
            .with_locals(1);
        let func = Function::new(def, &VerifyConfig::default()).unwrap();

        let text = disassemble_function(&func).to_string();
        assert_eq!(
            text,
            "func \"countdown\": returns=void params=1 locals=1 stack=3\n\
             \x20 @L0:\n\
             \x20 000000: loop_chk\n\
             \x20 000001: il_load 0\n\
             \x20 000003: jz @L1\n\
             \x20 000005: il_load 0\n\
             \x20 000007: int_const8 1\n\
             \x20 000009: int_sub\n\
             \x20 000010: il_store 0\n\
             \x20 000012: jmp @L0\n\
             \x20 @L1:\n\
             \x20 000014: return_void\n"
        );
    }

    #[test]
    fn domain_listing_names_functions_and_calls() {
        let mut d = Domain::default();
        let mut a = Asm::new();
        a.int_const8(2).return_int();
        let two = d.add_function(
            Function::new(
                FunctionDef::new("two", TYPE_INT, a.finish().unwrap()),
                &VerifyConfig::default(),
            )
            .unwrap(),
        );
        let mut a = Asm::new();
        a.function_call_int(0, two).int_const(100_000).int_add().return_int();
        d.add_function(
            Function::new(
                FunctionDef::new("main", TYPE_INT, a.finish().unwrap()),
                &VerifyConfig::default(),
            )
            .unwrap(),
        );

        let text = disassemble(&d).to_string();
        assert!(text.contains("func f0 \"two\""));
        assert!(text.contains("func f1 \"main\""));
        assert!(text.contains("000000: function_call_int 0, f0"));
        assert!(text.contains("000003: int_const 100000"));
    }

    #[test]
    fn malformed_bytecode_keeps_the_decoded_prefix() {
        let def = FunctionDef::new("bad", TYPE_VOID, vec![0x00, 0xFE]);
        let func = Function::from_trusted(def, 0);
        let dis = disassemble_function(&func);
        assert_eq!(dis.instrs().len(), 1);
        assert_eq!(
            dis.error(),
            Some(&BytecodeError::UnknownOpcode { pc: 1, byte: 0xFE })
        );
        assert!(dis.to_string().ends_with("<decode error: unknown opcode 0xFE at pc 1>\n"));
    }
}
