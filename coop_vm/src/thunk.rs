// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Native callbacks and the typed binding layer.
//!
//! The interpreter calls every native through the same raw shape, `fn(&mut Domain, &[i32]) ->
//! i32`: the argument slice is exactly the callee's operand stack slots and the return value is
//! ignored for void calls. [`ExternalMethod::bind_static`] and [`ExternalMethod::bind_method`]
//! wrap ordinary Rust functions into that shape, decoding strings, functions and objects
//! through the domain tables.
//!
//! A binding whose argument fails to decode does not call the Rust function; it aborts the
//! calling thread with [`AbortReason::BadArgument`](crate::vm::AbortReason::BadArgument).

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::domain::Domain;
use crate::function::FunctionFlags;
use crate::object::{ObjRef, ObjectError, VmObject};
use crate::value::{FuncId, ObjId, TYPE_FUNCTION_PTR, TYPE_INT, TYPE_STRING, TYPE_VOID, TypeInfo};

/// The raw native callback shape.
pub type ThunkFn = dyn Fn(&mut Domain, &[i32]) -> i32;

/// A shared native callback.
#[derive(Clone)]
pub struct NativeThunk(Rc<ThunkFn>);

impl NativeThunk {
    /// Wraps a raw callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Domain, &[i32]) -> i32 + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invokes the callback.
    pub fn call(&self, domain: &mut Domain, args: &[i32]) -> i32 {
        (self.0)(domain, args)
    }
}

impl fmt::Debug for NativeThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeThunk(..)")
    }
}

/// A value a binding can decode from one argument slot.
pub trait ThunkArg: Sized {
    /// Declared type of the argument.
    const TYPE: TypeInfo;

    /// Decodes a raw script value.
    fn decode(domain: &Domain, raw: i32) -> Result<Self, ObjectError>;
}

impl ThunkArg for i32 {
    const TYPE: TypeInfo = TYPE_INT;

    fn decode(_domain: &Domain, raw: i32) -> Result<Self, ObjectError> {
        Ok(raw)
    }
}

impl ThunkArg for Rc<str> {
    const TYPE: TypeInfo = TYPE_STRING;

    fn decode(domain: &Domain, raw: i32) -> Result<Self, ObjectError> {
        let id = ObjId::from_raw(raw).ok_or(ObjectError::OutOfRange { raw })?;
        domain.string(id)
    }
}

impl ThunkArg for FuncId {
    const TYPE: TypeInfo = TYPE_FUNCTION_PTR;

    fn decode(domain: &Domain, raw: i32) -> Result<Self, ObjectError> {
        let id = u32::try_from(raw)
            .ok()
            .map(FuncId)
            .filter(|&id| domain.function(id).is_some());
        id.ok_or(ObjectError::UnknownFunction { raw })
    }
}

impl<T: VmObject> ThunkArg for ObjRef<T> {
    const TYPE: TypeInfo = TypeInfo::object(T::CLASS_NAME);

    fn decode(domain: &Domain, raw: i32) -> Result<Self, ObjectError> {
        let id = ObjId::from_raw(raw).ok_or(ObjectError::OutOfRange { raw })?;
        domain.object::<T>(id)
    }
}

/// A value a binding can return to a script.
pub trait ThunkReturn {
    /// Declared return type.
    const TYPE: TypeInfo;

    /// Converts to the raw return slot value.
    fn into_raw(self) -> i32;
}

impl ThunkReturn for () {
    const TYPE: TypeInfo = TYPE_VOID;

    fn into_raw(self) -> i32 {
        0
    }
}

impl ThunkReturn for i32 {
    const TYPE: TypeInfo = TYPE_INT;

    fn into_raw(self) -> i32 {
        self
    }
}

/// A Rust function usable as a static native: `fn(&mut Domain, A0, ..) -> R`.
pub trait StaticThunk<Args, R> {
    /// Return type followed by argument types.
    fn signature() -> Vec<TypeInfo>;

    /// Wraps `self` into a raw callback.
    fn into_thunk(self) -> NativeThunk;
}

/// A Rust function usable as an instance native: `fn(&mut T, &mut Domain, A0, ..) -> R`.
///
/// The object is passed in argument slot 0.
pub trait MethodThunk<T, Args, R> {
    /// Return type followed by the object type and argument types.
    fn signature() -> Vec<TypeInfo>;

    /// Wraps `self` into a raw callback.
    fn into_thunk(self) -> NativeThunk;
}

fn arg<A: ThunkArg>(domain: &Domain, args: &[i32], position: usize) -> Result<A, ObjectError> {
    let &raw = args
        .get(position)
        .ok_or(ObjectError::MissingArgument { position })?;
    A::decode(domain, raw)
}

macro_rules! impl_thunks {
    ($($ty:ident $var:ident $pos:tt),*) => {
        impl<F, R, $($ty,)*> StaticThunk<($($ty,)*), R> for F
        where
            F: Fn(&mut Domain, $($ty),*) -> R + 'static,
            R: ThunkReturn,
            $($ty: ThunkArg,)*
        {
            fn signature() -> Vec<TypeInfo> {
                vec![R::TYPE, $($ty::TYPE),*]
            }

            fn into_thunk(self) -> NativeThunk {
                NativeThunk::new(move |domain: &mut Domain, args: &[i32]| {
                    let _ = args;
                    let decoded = (|| -> Result<_, ObjectError> {
                        Ok(($(arg::<$ty>(domain, args, $pos)?,)*))
                    })();
                    match decoded {
                        Ok(($($var,)*)) => (self)(domain, $($var),*).into_raw(),
                        Err(err) => {
                            domain.fault_active(err);
                            0
                        }
                    }
                })
            }
        }

        impl<F, T, R, $($ty,)*> MethodThunk<T, ($($ty,)*), R> for F
        where
            F: Fn(&mut T, &mut Domain, $($ty),*) -> R + 'static,
            T: VmObject,
            R: ThunkReturn,
            $($ty: ThunkArg,)*
        {
            fn signature() -> Vec<TypeInfo> {
                vec![R::TYPE, TypeInfo::object(T::CLASS_NAME), $($ty::TYPE),*]
            }

            fn into_thunk(self) -> NativeThunk {
                NativeThunk::new(move |domain: &mut Domain, args: &[i32]| {
                    let decoded = (|| -> Result<_, ObjectError> {
                        let this = arg::<ObjRef<T>>(domain, args, 0)?;
                        Ok((this, ($(arg::<$ty>(domain, args, $pos + 1)?,)*)))
                    })();
                    let (this, ($($var,)*)) = match decoded {
                        Ok(v) => v,
                        Err(err) => {
                            domain.fault_active(err);
                            return 0;
                        }
                    };
                    let Ok(mut this) = this.try_borrow_mut() else {
                        domain.fault_active(ObjectError::Busy);
                        return 0;
                    };
                    (self)(&mut *this, domain, $($var),*).into_raw()
                })
            }
        }
    };
}

impl_thunks!();
impl_thunks!(A0 a0 0);
impl_thunks!(A0 a0 0, A1 a1 1);
impl_thunks!(A0 a0 0, A1 a1 1, A2 a2 2);
impl_thunks!(A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3);

/// A named native callback with its inferred signature.
#[derive(Clone, Debug)]
pub struct ExternalMethod {
    /// Script-visible name.
    pub name: &'static str,
    /// The raw callback.
    pub thunk: NativeThunk,
    /// Return type followed by argument types (the object first, for instance methods).
    pub types: Vec<TypeInfo>,
    /// Async and `STATIC` flags.
    pub flags: FunctionFlags,
}

impl ExternalMethod {
    /// Binds a static native.
    pub fn bind_static<Args, R, F>(name: &'static str, f: F) -> Self
    where
        F: StaticThunk<Args, R>,
    {
        Self {
            name,
            types: F::signature(),
            thunk: f.into_thunk(),
            flags: FunctionFlags::STATIC,
        }
    }

    /// Binds an instance native on objects of class `T`.
    pub fn bind_method<T, Args, R, F>(name: &'static str, f: F) -> Self
    where
        F: MethodThunk<T, Args, R>,
    {
        Self {
            name,
            types: F::signature(),
            thunk: f.into_thunk(),
            flags: FunctionFlags::NONE,
        }
    }

    /// Adds flags (typically async bits).
    #[must_use]
    pub fn with_flags(mut self, flags: FunctionFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Declared return type.
    #[must_use]
    pub fn return_type(&self) -> TypeInfo {
        self.types.first().copied().unwrap_or(TYPE_VOID)
    }

    /// Declared argument types, the object first for instance methods.
    #[must_use]
    pub fn arg_types(&self) -> &[TypeInfo] {
        self.types.get(1..).unwrap_or_default()
    }

    /// Returns `true` if the method takes no object argument.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FunctionFlags::STATIC)
    }
}

/// A native class description handed to the compiler.
#[derive(Clone, Debug)]
pub struct ObjectClass {
    /// Class name, matching [`VmObject::CLASS_NAME`] for instance methods.
    pub name: &'static str,
    /// Static and instance methods.
    pub methods: Vec<ExternalMethod>,
}

impl ObjectClass {
    /// Creates an empty class.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            methods: Vec::new(),
        }
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(mut self, method: ExternalMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&ExternalMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeClass;
    use core::cell::RefCell;

    struct Counter {
        total: i32,
    }

    impl VmObject for Counter {
        const CLASS_NAME: &'static str = "Counter";
    }

    impl Counter {
        fn add(&mut self, _domain: &mut Domain, amount: i32) -> i32 {
            self.total += amount;
            self.total
        }
    }

    fn sum3(_domain: &mut Domain, a: i32, b: i32, c: i32) -> i32 {
        a + b + c
    }

    fn length(_domain: &mut Domain, s: Rc<str>) -> i32 {
        s.len() as i32
    }

    fn noop(_domain: &mut Domain) {}

    #[test]
    fn static_binding_infers_signature_and_flags() {
        let m = ExternalMethod::bind_static("Sum3", sum3);
        assert!(m.is_static());
        assert_eq!(m.return_type(), TYPE_INT);
        assert_eq!(m.arg_types(), &[TYPE_INT, TYPE_INT, TYPE_INT]);

        let mut d = Domain::default();
        assert_eq!(m.thunk.call(&mut d, &[1, 2, 3]), 6);

        let v = ExternalMethod::bind_static("Noop", noop);
        assert!(v.return_type().is_void());
        assert!(v.arg_types().is_empty());
    }

    #[test]
    fn string_arguments_decode_through_the_domain() {
        let mut d = Domain::default();
        let s = d.add_string("abcd");
        let m = ExternalMethod::bind_static("Len", length);
        assert_eq!(m.types[1].class, TypeClass::String);
        assert_eq!(m.thunk.call(&mut d, &[s.as_raw()]), 4);
    }

    #[test]
    fn instance_binding_receives_the_object() {
        let mut d = Domain::default();
        let counter = Rc::new(RefCell::new(Counter { total: 10 }));
        let id = d.add_object(&counter);

        let m = ExternalMethod::bind_method("Add", Counter::add);
        assert!(!m.is_static());
        assert_eq!(m.arg_types()[0], TypeInfo::object("Counter"));

        assert_eq!(m.thunk.call(&mut d, &[id.as_raw(), 5]), 15);
        assert_eq!(counter.borrow().total, 15);
    }

    #[test]
    fn undecodable_arguments_skip_the_call() {
        let mut d = Domain::default();
        let m = ExternalMethod::bind_static("Len", length);
        // No thread is running, so the fault has nothing to abort.
        assert_eq!(m.thunk.call(&mut d, &[42]), 0);
        assert_eq!(m.thunk.call(&mut d, &[]), 0);
    }

    #[test]
    fn object_class_lookup() {
        let class = ObjectClass::new("Counter")
            .with_method(ExternalMethod::bind_method("Add", Counter::add))
            .with_method(ExternalMethod::bind_static("Sum3", sum3));
        assert!(class.method("Add").is_some());
        assert!(class.method("Sum3").unwrap().is_static());
        assert!(class.method("Missing").is_none());
    }
}
