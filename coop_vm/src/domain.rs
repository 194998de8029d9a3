// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shared execution environment.
//!
//! A [`Domain`] owns everything scripts can reach: global and special variables, the object
//! table, registered functions, threads and wait queues. Every access from the interpreter goes
//! through the domain by index, so native callbacks can freely create threads, register objects
//! or wake queues while a script is running.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::function::Function;
use crate::object::DomainObject;
use crate::thread::{ThreadId, ThreadSlot};
use crate::trace::{TraceMask, TraceSink};
use crate::value::FuncId;
use crate::vm::Limits;
use crate::wait_queue::WaitQueue;

/// Maximum number of variables of each kind; bytecode addresses them with one byte.
pub const MAX_VARIABLES: usize = 256;

/// Domain configuration errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DomainError {
    /// Variables can only be declared before the first thread is created.
    LayoutSealed,
    /// More than [`MAX_VARIABLES`] variables of one kind.
    TooManyVariables,
    /// No variable with this index.
    NoSuchVariable {
        /// The requested index.
        index: u8,
    },
    /// The operation is not allowed while a thread is running.
    Busy,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LayoutSealed => f.write_str("variables cannot be declared after threads exist"),
            Self::TooManyVariables => write!(f, "more than {MAX_VARIABLES} variables"),
            Self::NoSuchVariable { index } => write!(f, "no variable with index {index}"),
            Self::Busy => f.write_str("a thread is running"),
        }
    }
}

impl core::error::Error for DomainError {}

/// Diagnostic callback invoked with the offending function's name on a safety abort.
pub type LoopHandler = Box<dyn FnMut(&str)>;

/// A script execution domain.
pub struct Domain {
    pub(crate) globals: Vec<i32>,
    pub(crate) specials: Vec<i32>,
    pub(crate) objects: Vec<DomainObject>,
    pub(crate) functions: Vec<Rc<Function>>,
    pub(crate) thread_var_count: usize,
    pub(crate) threads: Vec<ThreadSlot>,
    pub(crate) queues: Vec<WaitQueue>,
    pub(crate) active: Option<ThreadId>,
    pub(crate) limits: Limits,
    pub(crate) loop_handler: Option<LoopHandler>,
    pub(crate) trace: Option<Box<dyn TraceSink>>,
    pub(crate) trace_mask: TraceMask,
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("globals", &self.globals.len())
            .field("specials", &self.specials.len())
            .field("objects", &self.objects.len())
            .field("functions", &self.functions.len())
            .field("threads", &self.threads.len())
            .field("queues", &self.queues.len())
            .field("active", &self.active)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl Domain {
    /// Creates an empty domain.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            globals: Vec::new(),
            specials: Vec::new(),
            objects: Vec::new(),
            functions: Vec::new(),
            thread_var_count: 0,
            threads: Vec::new(),
            queues: Vec::new(),
            active: None,
            limits,
            loop_handler: None,
            trace: None,
            trace_mask: TraceMask::NONE,
        }
    }

    /// Execution limits applied to every run.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Replaces the execution limits.
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Installs the diagnostic callback for loop-budget and call-depth aborts.
    pub fn set_loop_handler(&mut self, handler: impl FnMut(&str) + 'static) {
        self.loop_handler = Some(Box::new(handler));
    }

    /// Removes the diagnostic callback.
    pub fn clear_loop_handler(&mut self) {
        self.loop_handler = None;
    }

    /// Installs (or removes) the trace sink. The sink's mask is sampled once, here.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.trace_mask = sink.as_ref().map_or(TraceMask::NONE, |s| s.mask());
        self.trace = sink;
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.trace_mask = TraceMask::NONE;
        self.trace.take()
    }

    pub(crate) fn report_safety_abort(&mut self, function_name: &str) {
        if let Some(handler) = self.loop_handler.as_mut() {
            handler(function_name);
        }
    }

    /// Registers a function and returns its index.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.add_shared_function(Rc::new(function))
    }

    /// Registers an already shared function.
    pub fn add_shared_function(&mut self, function: Rc<Function>) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    /// Looks up a registered function.
    #[must_use]
    pub fn function(&self, id: FuncId) -> Option<&Rc<Function>> {
        self.functions.get(id.index())
    }

    /// Finds a registered function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name() == name)
            .map(|i| FuncId(i as u32))
    }

    /// Number of registered functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn check_layout_open(&self, len: usize) -> Result<u8, DomainError> {
        if !self.threads.is_empty() {
            return Err(DomainError::LayoutSealed);
        }
        u8::try_from(len).map_err(|_| DomainError::TooManyVariables)
    }

    /// Declares a global variable and returns its index.
    pub fn declare_global(&mut self, init: i32) -> Result<u8, DomainError> {
        let index = self.check_layout_open(self.globals.len())?;
        self.globals.push(init);
        Ok(index)
    }

    /// Declares a special (host-exposed) variable and returns its index.
    pub fn declare_special(&mut self, init: i32) -> Result<u8, DomainError> {
        let index = self.check_layout_open(self.specials.len())?;
        self.specials.push(init);
        Ok(index)
    }

    /// Declares a thread variable and returns its index. Each thread starts with zero.
    pub fn declare_thread_var(&mut self) -> Result<u8, DomainError> {
        let index = self.check_layout_open(self.thread_var_count)?;
        self.thread_var_count += 1;
        Ok(index)
    }

    /// Reads global variable `index`.
    #[must_use]
    pub fn global(&self, index: u8) -> Option<i32> {
        self.globals.get(usize::from(index)).copied()
    }

    /// Writes global variable `index`.
    pub fn set_global(&mut self, index: u8, value: i32) -> Result<(), DomainError> {
        let slot = self
            .globals
            .get_mut(usize::from(index))
            .ok_or(DomainError::NoSuchVariable { index })?;
        *slot = value;
        Ok(())
    }

    /// Reads special variable `index`.
    #[must_use]
    pub fn special(&self, index: u8) -> Option<i32> {
        self.specials.get(usize::from(index)).copied()
    }

    /// Writes special variable `index`. Scripts can only read specials.
    pub fn set_special(&mut self, index: u8, value: i32) -> Result<(), DomainError> {
        let slot = self
            .specials
            .get_mut(usize::from(index))
            .ok_or(DomainError::NoSuchVariable { index })?;
        *slot = value;
        Ok(())
    }

    /// Number of thread variables each thread carries.
    #[must_use]
    pub fn thread_var_count(&self) -> usize {
        self.thread_var_count
    }

    /// Releases every thread, queue, function, object and variable.
    ///
    /// Limits, the loop handler and the trace sink are kept. Fails with
    /// [`DomainError::Busy`] when called from inside a running thread.
    pub fn clear(&mut self) -> Result<(), DomainError> {
        if self.active.is_some() {
            return Err(DomainError::Busy);
        }
        self.threads.clear();
        self.queues.clear();
        self.functions.clear();
        self.objects.clear();
        self.globals.clear();
        self.specials.clear();
        self.thread_var_count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_are_indexed_in_declaration_order() {
        let mut d = Domain::default();
        assert_eq!(d.declare_global(5), Ok(0));
        assert_eq!(d.declare_global(6), Ok(1));
        assert_eq!(d.declare_special(-1), Ok(0));
        assert_eq!(d.global(1), Some(6));
        d.set_global(0, 9).unwrap();
        assert_eq!(d.global(0), Some(9));
        assert_eq!(d.special(0), Some(-1));
        assert_eq!(
            d.set_special(3, 1),
            Err(DomainError::NoSuchVariable { index: 3 })
        );
    }

    #[test]
    fn layout_seals_once_threads_exist() {
        let mut d = Domain::default();
        d.declare_thread_var().unwrap();
        let _t = d.create_thread();
        assert_eq!(d.declare_global(0), Err(DomainError::LayoutSealed));
        assert_eq!(d.declare_thread_var(), Err(DomainError::LayoutSealed));
    }

    #[test]
    fn variable_count_is_bounded_by_operand_width() {
        let mut d = Domain::default();
        for _ in 0..MAX_VARIABLES {
            d.declare_global(0).unwrap();
        }
        assert_eq!(d.declare_global(0), Err(DomainError::TooManyVariables));
    }

    #[test]
    fn clear_releases_everything() {
        let mut d = Domain::default();
        d.declare_global(1).unwrap();
        d.add_string("s");
        let q = d.create_queue();
        let t = d.create_thread();
        d.clear().unwrap();
        assert_eq!(d.function_count(), 0);
        assert_eq!(d.object_count(), 0);
        assert_eq!(d.thread_count(), 0);
        assert_eq!(d.global(0), None);
        assert!(d.queue_len(q).is_none());
        assert!(!d.thread_exists(t));
        // The layout is open again.
        assert_eq!(d.declare_global(0), Ok(0));
    }
}
