// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `coop_vm`: a stack bytecode VM with cooperative, suspendable script threads.
//!
//! Scripts drive emulated devices. A script thread runs until it returns, or until a native
//! callback parks it (waiting for an I/O completion, a timer, another thread) and hands control
//! back to the host. The host continues it later with its frames intact.
//!
//! All state lives in a [`Domain`](domain::Domain): variables, native objects, functions,
//! threads and wait queues. Every value a script manipulates is an `i32`; strings, objects and
//! function references are indices into domain tables that only native callbacks dereference.
//!
//! ## Example
//!
//! ```
//! use coop_vm::asm::Asm;
//! use coop_vm::domain::Domain;
//! use coop_vm::function::{Function, FunctionDef};
//! use coop_vm::thunk::NativeThunk;
//! use coop_vm::value::TYPE_INT;
//! use coop_vm::verifier::VerifyConfig;
//! use coop_vm::vm::RunOutcome;
//!
//! let mut domain = Domain::default();
//! let queue = domain.create_queue();
//!
//! // `return wait() + 1`, where `wait` parks the caller on `queue`.
//! let wait = NativeThunk::new(move |d, _args| {
//!     if let Some(t) = d.active_thread() {
//!         d.queue_suspend(queue, t);
//!     }
//!     0
//! });
//! let mut a = Asm::new();
//! a.static_method_call_int(0, 0).int_const8(1).int_add().return_int();
//! let def = FunctionDef::new("main", TYPE_INT, a.finish()?).with_methods(vec![wait]);
//! let main = domain.add_function(Function::new(def, &VerifyConfig::default())?);
//!
//! let thread = domain.create_thread();
//! let run = domain.run_int(thread, main)?;
//! assert_eq!(run.outcome, RunOutcome::Suspended);
//!
//! let (woken, outcome) = domain.queue_resume_int(queue, 41)?.unwrap();
//! assert_eq!((woken, outcome), (thread, RunOutcome::Completed));
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod bytecode;
pub mod disasm;
pub mod domain;
pub mod function;
pub mod object;
pub mod opcode;
pub mod sleep;
pub mod thread;
pub mod thunk;
pub mod trace;
pub mod value;
pub mod verifier;
pub mod vm;
pub mod wait_queue;
