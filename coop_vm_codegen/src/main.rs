// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![doc = "Code generator for `coop_vm` opcode tables.\n\n\
          This is a std-only build tool crate. It is not shipped as part of the core VM.\n"]

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Deserialize, Clone)]
struct Spec {
    version: u32,
    opcodes: Vec<OpcodeSpec>,
}

#[derive(Deserialize, Clone)]
struct OpcodeSpec {
    name: String,
    mnemonic: String,
    byte: String,
    operands: String,
    terminator: bool,
    doc: Option<String>,
}

fn parse_u8_hex(s: &str) -> Result<u8> {
    let s = s.trim();
    let raw = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(raw, 16).with_context(|| format!("invalid opcode byte '{s}'"))
}

fn fmt_hex_u8(b: u8) -> String {
    format!("0x{b:02X}")
}

fn sort_and_validate_ops(ops: &mut [(u8, OpcodeSpec)]) -> Result<()> {
    ops.sort_by(|(b0, o0), (b1, o1)| b0.cmp(b1).then_with(|| o0.name.cmp(&o1.name)));

    for w in ops.windows(2) {
        let (b0, o0) = &w[0];
        let (b1, o1) = &w[1];
        if b0 == b1 {
            bail!(
                "duplicate opcode byte {}: {} and {}",
                fmt_hex_u8(*b0),
                o0.name,
                o1.name
            );
        }
        if o0.name == o1.name {
            bail!("duplicate opcode name '{}'", o0.name);
        }
    }

    // The interpreter indexes metadata by opcode byte, so the table must be dense.
    for (i, (b, op)) in ops.iter().enumerate() {
        if usize::from(*b) != i {
            bail!(
                "opcode bytes must be contiguous from 0x00; {} has byte {} at position {}",
                op.name,
                fmt_hex_u8(*b),
                i
            );
        }
    }
    Ok(())
}

fn operand_shape_rust(shape: &str) -> Result<&'static str> {
    Ok(match shape {
        "none" => "OperandShape::None",
        "u8" => "OperandShape::U8",
        "i8" => "OperandShape::I8",
        "rel8" => "OperandShape::Rel8",
        "i32" => "OperandShape::I32",
        "rel32" => "OperandShape::Rel32",
        "call" => "OperandShape::Call",
        other => bail!("unknown operand shape '{other}'"),
    })
}

fn generate(spec: Spec) -> Result<String> {
    if spec.version != 1 {
        bail!("unsupported opcodes.json version {}", spec.version);
    }

    let mut ops: Vec<(u8, OpcodeSpec)> = Vec::with_capacity(spec.opcodes.len());
    for op in spec.opcodes {
        let b = parse_u8_hex(&op.byte)?;
        ops.push((b, op));
    }

    sort_and_validate_ops(&mut ops)?;

    let mut out = String::new();
    out.push_str("// Copyright 2026 the Coop VM Authors\n");
    out.push_str("// SPDX-License-Identifier: Apache-2.0 OR MIT\n\n");
    out.push_str("// @generated by coop_vm_codegen. Do not edit by hand.\n");
    out.push('\n');

    out.push_str("/// Operand encodings that follow an opcode byte.\n");
    out.push_str("#[derive(Copy, Clone, Debug, PartialEq, Eq)]\n");
    out.push_str("pub enum OperandShape {\n");
    out.push_str("    /// No operand.\n");
    out.push_str("    None,\n");
    out.push_str("    /// One unsigned byte index.\n");
    out.push_str("    U8,\n");
    out.push_str("    /// One signed byte immediate.\n");
    out.push_str("    I8,\n");
    out.push_str("    /// One signed byte branch delta.\n");
    out.push_str("    Rel8,\n");
    out.push_str("    /// A little-endian `i32` immediate.\n");
    out.push_str("    I32,\n");
    out.push_str("    /// A little-endian `i32` branch delta.\n");
    out.push_str("    Rel32,\n");
    out.push_str("    /// An argument count byte followed by a callee index byte.\n");
    out.push_str("    Call,\n");
    out.push_str("}\n\n");

    out.push_str("/// Static metadata for one opcode.\n");
    out.push_str("#[derive(Copy, Clone, Debug, PartialEq, Eq)]\n");
    out.push_str("pub struct OpcodeInfo {\n");
    out.push_str("    /// Stable, parseable opcode name.\n");
    out.push_str("    pub mnemonic: &'static str,\n");
    out.push_str("    /// Operand encoding following the opcode byte.\n");
    out.push_str("    pub shape: OperandShape,\n");
    out.push_str("    /// `true` if control never falls through to the next instruction.\n");
    out.push_str("    pub is_terminator: bool,\n");
    out.push_str("}\n\n");

    out.push_str("/// Number of defined opcodes.\n");
    out.push_str(&format!("pub const OPCODE_COUNT: usize = {};\n\n", ops.len()));

    out.push_str(&format!(
        "static OPCODE_INFO_BY_BYTE: [OpcodeInfo; {}] = [\n",
        ops.len()
    ));
    for (b, op) in &ops {
        out.push_str(&format!(
            "    OpcodeInfo {{ mnemonic: \"{}\", shape: {}, is_terminator: {} }}, // {} {}\n",
            op.mnemonic,
            operand_shape_rust(&op.operands)?,
            op.terminator,
            fmt_hex_u8(*b),
            op.name
        ));
    }
    out.push_str("];\n\n");

    out.push_str("/// Bytecode opcode byte.\n");
    out.push_str("#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]\n");
    out.push_str("#[repr(u8)]\n");
    out.push_str("pub enum Opcode {\n");
    for (b, op) in &ops {
        let doc = op
            .doc
            .as_deref()
            .with_context(|| format!("missing doc for opcode {}", op.name))?;
        for line in doc.lines() {
            if line.is_empty() {
                out.push_str("    ///\n");
            } else {
                out.push_str(&format!("    /// {line}\n"));
            }
        }
        out.push_str(&format!("    {} = {},\n", op.name, fmt_hex_u8(*b)));
    }
    out.push_str("}\n\n");

    out.push_str("impl Opcode {\n");
    out.push_str("    /// Every opcode, in byte order.\n");
    out.push_str(&format!("    pub const ALL: [Self; {}] = [\n", ops.len()));
    for (_b, op) in &ops {
        out.push_str(&format!("        Self::{},\n", op.name));
    }
    out.push_str("    ];\n\n");

    out.push_str("    /// Decodes an opcode byte.\n");
    out.push_str("    #[must_use]\n");
    out.push_str("    pub fn from_u8(b: u8) -> Option<Self> {\n");
    out.push_str("        Some(match b {\n");
    for (b, op) in &ops {
        out.push_str(&format!(
            "            {} => Self::{},\n",
            fmt_hex_u8(*b),
            op.name
        ));
    }
    out.push_str("            _ => return None,\n");
    out.push_str("        })\n");
    out.push_str("    }\n\n");

    out.push_str("    /// Returns opcode metadata for this opcode.\n");
    out.push_str("    #[must_use]\n");
    out.push_str("    pub fn info(self) -> &'static OpcodeInfo {\n");
    out.push_str("        &OPCODE_INFO_BY_BYTE[usize::from(self as u8)]\n");
    out.push_str("    }\n");
    out.push_str("}\n");

    Ok(out)
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let spec_path: PathBuf = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("coop_vm/opcodes.json"));
    let opcode_out_path: PathBuf = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("coop_vm/src/opcodes_gen.rs"));
    if args.next().is_some() {
        bail!("usage: coop_vm_codegen [spec.json] [opcodes_out.rs]");
    }

    let json =
        fs::read_to_string(&spec_path).with_context(|| format!("read {}", spec_path.display()))?;
    let spec: Spec =
        serde_json::from_str(&json).with_context(|| format!("parse {}", spec_path.display()))?;

    let opcode_rendered = generate(spec)?;

    if let Some(parent) = opcode_out_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&opcode_out_path, opcode_rendered.as_bytes())
        .with_context(|| format!("write {}", opcode_out_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OpcodeSpec, Spec, generate, sort_and_validate_ops};
    use std::fs;
    use std::path::PathBuf;

    fn normalize_newlines(s: &str) -> String {
        // git autocrlf can check generated files out with `\r\n` line endings.
        s.replace("\r\n", "\n").replace('\r', "\n")
    }

    fn op(name: &str, byte: u8) -> (u8, OpcodeSpec) {
        (
            byte,
            OpcodeSpec {
                name: name.to_string(),
                mnemonic: name.to_lowercase(),
                byte: format!("0x{byte:02X}"),
                operands: "none".to_string(),
                terminator: false,
                doc: Some("Doc.".to_string()),
            },
        )
    }

    #[test]
    fn generated_file_is_up_to_date() {
        let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let workspace_root = workspace_root.parent().expect("workspace root");

        let spec_path = workspace_root.join("coop_vm/opcodes.json");
        let opcode_out_path = workspace_root.join("coop_vm/src/opcodes_gen.rs");

        let json = fs::read_to_string(&spec_path).expect("read opcodes.json");
        let spec: Spec = serde_json::from_str(&json).expect("parse opcodes.json");

        let rendered = generate(spec).expect("render opcodes_gen.rs");
        let existing = fs::read_to_string(&opcode_out_path).expect("read opcodes_gen.rs");

        assert_eq!(
            normalize_newlines(&rendered),
            normalize_newlines(&existing),
            "opcodes_gen.rs is out of date; re-run: cargo run -p coop_vm_codegen"
        );
    }

    #[test]
    fn rejects_duplicate_bytes() {
        let mut ops = vec![op("A", 0), op("B", 0)];
        let err = sort_and_validate_ops(&mut ops).unwrap_err();
        assert!(err.to_string().contains("duplicate opcode byte"));
    }

    #[test]
    fn rejects_gaps_in_byte_space() {
        let mut ops = vec![op("A", 0), op("B", 2)];
        let err = sort_and_validate_ops(&mut ops).unwrap_err();
        assert!(err.to_string().contains("contiguous"));
    }

    #[test]
    fn rejects_unknown_operand_shape() {
        let mut spec_op = op("A", 0).1;
        spec_op.operands = "u16".to_string();
        let spec = Spec {
            version: 1,
            opcodes: vec![spec_op],
        };
        let err = generate(spec).unwrap_err();
        assert!(err.to_string().contains("unknown operand shape"));
    }
}
