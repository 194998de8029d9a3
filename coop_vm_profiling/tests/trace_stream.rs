// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration test that drives a real scope stream through the profiling adapter.
//!
//! Run with:
//! `cargo test -p coop_vm_profiling`

#![allow(missing_docs, reason = "integration test crate")]

use std::cell::Cell;
use std::rc::Rc;

use coop_vm::asm::Asm;
use coop_vm::domain::Domain;
use coop_vm::function::{Function, FunctionDef};
use coop_vm::thunk::NativeThunk;
use coop_vm::trace::{ScopeKind, TraceOutcome, TraceSink};
use coop_vm::value::{FuncId, TYPE_INT};
use coop_vm::verifier::VerifyConfig;
use coop_vm::vm::RunOutcome;

use coop_vm_profiling::{FunctionNameResolver, LabelResolver, ProfilingTraceSink};

#[derive(Clone, Default)]
struct CountingResolver {
    call_frames: Rc<Cell<usize>>,
    native_calls: Rc<Cell<usize>>,
}

impl LabelResolver for CountingResolver {
    fn call_frame_label(&mut self, function: &Function) -> Option<String> {
        self.call_frames.set(self.call_frames.get() + 1);
        Some(format!("call_frame:{}", function.name()))
    }

    fn native_call_label(
        &mut self,
        function: &Function,
        method: u8,
        _is_static: bool,
    ) -> Option<String> {
        self.native_calls.set(self.native_calls.get() + 1);
        Some(format!("native:{}:{method}", function.name()))
    }
}

/// `main` calls `leaf(42)`, then parks in a native until the host resumes it.
fn build(d: &mut Domain) -> FuncId {
    let mut leaf = Asm::new();
    leaf.il_load(0).return_int();
    let leaf = d.add_function(
        Function::new(
            FunctionDef::new("leaf", TYPE_INT, leaf.finish().unwrap())
                .with_params(1)
                .with_locals(1),
            &VerifyConfig::default(),
        )
        .unwrap(),
    );

    let park = NativeThunk::new(|d, args| {
        d.suspend_active(None);
        args[0]
    });
    let mut main = Asm::new();
    main.int_const8(42).function_call_int(1, leaf);
    main.static_method_call_int(1, 0).return_int();
    d.add_function(
        Function::new(
            FunctionDef::new("main", TYPE_INT, main.finish().unwrap()).with_methods(vec![park]),
            &VerifyConfig::default(),
        )
        .unwrap(),
    )
}

#[test]
fn profiling_sink_handles_real_scope_stream() {
    let _tracy = tracy_client::Client::start();
    let mut d = Domain::default();
    let main = build(&mut d);

    let resolver = CountingResolver::default();
    d.set_trace_sink(Some(Box::new(ProfilingTraceSink::with_resolver(
        resolver.clone(),
    ))));

    let t = d.create_thread();
    let run = d.run_int(t, main).unwrap();
    assert_eq!(run.outcome, RunOutcome::Suspended);
    d.set_resume_int(t, 7).unwrap();
    assert_eq!(d.resume(t), Ok(RunOutcome::Completed));

    assert_eq!(resolver.call_frames.get(), 2);
    assert_eq!(resolver.native_calls.get(), 1);
}

#[test]
fn zones_close_when_a_run_ends() {
    let _tracy = tracy_client::Client::start();
    let f = Function::from_trusted(FunctionDef::new("f", TYPE_INT, vec![0x2E]), 1);
    let t = Domain::default().create_thread();
    let mut sink = ProfilingTraceSink::<FunctionNameResolver>::new();

    sink.run_start(t, &f, 1);
    sink.scope_enter(ScopeKind::CallFrame, &f, 0);
    sink.scope_enter(
        ScopeKind::NativeCall {
            method: 0,
            is_static: true,
        },
        &f,
        0,
    );
    assert_eq!(sink.open_zones(), 3);
    sink.suspend(t, &f, 0);
    sink.run_end(t, TraceOutcome::Suspended);
    assert_eq!(sink.open_zones(), 0);

    // A resumed frame exits a scope it entered in an earlier run.
    sink.run_start(t, &f, 1);
    sink.scope_exit(ScopeKind::CallFrame, &f, 0);
    assert_eq!(sink.open_zones(), 1);
    sink.run_end(t, TraceOutcome::Completed);
    assert_eq!(sink.open_zones(), 0);
}
