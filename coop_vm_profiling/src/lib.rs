// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracy profiling for `coop_vm`.
//!
//! [`ProfilingTraceSink`] turns runs, call frames and native calls into nested Tracy zones.
//! Install it with [`Domain::set_trace_sink`]. A Tracy client must be running
//! (`tracy_client::Client::start()`) before the sink is created; otherwise the sink records
//! nothing.
//!
//! Zones opened inside a run are closed when the run ends, so a thread that suspends or aborts
//! never leaves dangling zones behind. A resumed thread opens a fresh run zone.
//!
//! [`Domain::set_trace_sink`]: coop_vm::domain::Domain::set_trace_sink

use coop_vm::function::Function;
use coop_vm::thread::ThreadId;
use coop_vm::trace::{ScopeKind, TraceMask, TraceOutcome, TraceSink};
use tracy_client::{Client, Span};

/// Names zones.
///
/// Returning `None` skips the zone; its matching exit is skipped too.
pub trait LabelResolver {
    /// Label for a script function activation.
    fn call_frame_label(&mut self, function: &Function) -> Option<String>;

    /// Label for a native call made from `function`.
    fn native_call_label(
        &mut self,
        function: &Function,
        method: u8,
        is_static: bool,
    ) -> Option<String>;
}

/// Labels zones with function names; native calls as `caller::m{index}`.
#[derive(Clone, Debug, Default)]
pub struct FunctionNameResolver;

impl LabelResolver for FunctionNameResolver {
    fn call_frame_label(&mut self, function: &Function) -> Option<String> {
        Some(function.name().to_owned())
    }

    fn native_call_label(
        &mut self,
        function: &Function,
        method: u8,
        is_static: bool,
    ) -> Option<String> {
        let sep = if is_static { "::" } else { "." };
        Some(format!("{}{sep}m{method}", function.name()))
    }
}

/// A [`TraceSink`] that emits Tracy zones.
pub struct ProfilingTraceSink<R = FunctionNameResolver> {
    client: Option<Client>,
    resolver: R,
    /// Open zones, innermost last. `None` marks a scope the resolver declined to name.
    spans: Vec<Option<Span>>,
    /// `spans.len()` at the start of each active run, innermost last.
    run_marks: Vec<usize>,
}

impl<R> core::fmt::Debug for ProfilingTraceSink<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProfilingTraceSink")
            .field("running", &self.client.is_some())
            .field("open_zones", &self.spans.len())
            .finish_non_exhaustive()
    }
}

impl ProfilingTraceSink<FunctionNameResolver> {
    /// Creates a sink labelling zones by function name.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(FunctionNameResolver)
    }
}

impl Default for ProfilingTraceSink<FunctionNameResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: LabelResolver> ProfilingTraceSink<R> {
    /// Creates a sink with a custom label resolver.
    #[must_use]
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            client: Client::running(),
            resolver,
            spans: Vec::new(),
            run_marks: Vec::new(),
        }
    }

    /// Number of zones currently open.
    #[must_use]
    pub fn open_zones(&self) -> usize {
        self.spans.len()
    }

    fn open(&mut self, label: Option<String>) {
        let span = match (&self.client, label) {
            // `span_alloc` consumes its client; clones share the same profiler connection.
            (Some(client), Some(label)) => Some(client.clone().span_alloc(
                Some(&label),
                "coop_vm",
                file!(),
                line!(),
                0,
            )),
            _ => None,
        };
        self.spans.push(span);
    }

    fn close(&mut self) {
        // Never close the run zone itself; frames resumed from an earlier run exit here too.
        let floor = self.run_marks.last().map_or(0, |mark| mark + 1);
        if self.spans.len() > floor {
            self.spans.pop();
        }
    }
}

impl<R: LabelResolver> TraceSink for ProfilingTraceSink<R> {
    fn mask(&self) -> TraceMask {
        TraceMask::RUN | TraceMask::CALL | TraceMask::HOST | TraceMask::SUSPEND
    }

    fn run_start(&mut self, thread: ThreadId, function: &Function, depth: usize) {
        self.run_marks.push(self.spans.len());
        self.open(Some(format!("run {thread} {} depth={depth}", function.name())));
    }

    fn scope_enter(&mut self, kind: ScopeKind, function: &Function, _pc: u32) {
        let label = match kind {
            ScopeKind::CallFrame => self.resolver.call_frame_label(function),
            ScopeKind::NativeCall { method, is_static } => {
                self.resolver.native_call_label(function, method, is_static)
            }
        };
        self.open(label);
    }

    fn scope_exit(&mut self, _kind: ScopeKind, _function: &Function, _pc: u32) {
        self.close();
    }

    fn suspend(&mut self, thread: ThreadId, function: &Function, pc: u32) {
        if let Some(Some(span)) = self.spans.last() {
            span.emit_text(&format!("suspend {thread} in {} at pc {pc}", function.name()));
        }
    }

    fn run_end(&mut self, _thread: ThreadId, outcome: TraceOutcome<'_>) {
        if let TraceOutcome::Aborted(info) = outcome
            && let Some(client) = &self.client
        {
            client.message(&info.to_string(), 0);
        }
        let mark = self.run_marks.pop().unwrap_or(0);
        // Close innermost first.
        while self.spans.len() > mark {
            self.spans.pop();
        }
    }
}
