// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The domain object table: strings and weakly held native objects.
//!
//! Scripts see both as plain `i32` indices. Strings are owned by the domain. Native objects
//! stay owned by the host; the table only keeps a [`Weak`] reference, so an object dropped by
//! the host decodes as [`ObjectError::Released`].

use alloc::rc::{Rc, Weak};
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use crate::domain::Domain;
use crate::value::ObjId;

/// A host-owned native object reachable from scripts.
pub type ObjRef<T> = Rc<RefCell<T>>;

/// A native type that scripts can hold references to.
pub trait VmObject: Any {
    /// Class name reported in type signatures.
    const CLASS_NAME: &'static str;
}

pub(crate) enum DomainObject {
    Str(Rc<str>),
    Native {
        class: &'static str,
        object: Weak<dyn Any>,
    },
}

/// Failure to resolve a script value through the object or function tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectError {
    /// The value is not a valid object table index.
    OutOfRange {
        /// The raw script value.
        raw: i32,
    },
    /// The value is not a valid function table index.
    UnknownFunction {
        /// The raw script value.
        raw: i32,
    },
    /// The native object was dropped by the host.
    Released,
    /// A string was expected.
    NotAString,
    /// A native object was expected.
    NotAnObject,
    /// The native object has a different class.
    ClassMismatch {
        /// Class the callee expects.
        expected: &'static str,
        /// Class registered for the index.
        found: &'static str,
    },
    /// The native object is already mutably borrowed by an outer call.
    Busy,
    /// Fewer arguments were passed than the callee decodes.
    MissingArgument {
        /// Zero-based argument position.
        position: usize,
    },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { raw } => write!(f, "object index {raw} out of range"),
            Self::UnknownFunction { raw } => write!(f, "function index {raw} out of range"),
            Self::Released => f.write_str("native object was released"),
            Self::NotAString => f.write_str("expected a string"),
            Self::NotAnObject => f.write_str("expected a native object"),
            Self::ClassMismatch { expected, found } => {
                write!(f, "expected object of class {expected}, found {found}")
            }
            Self::Busy => f.write_str("native object is already borrowed"),
            Self::MissingArgument { position } => write!(f, "missing argument {position}"),
        }
    }
}

impl core::error::Error for ObjectError {}

impl ObjId {
    /// Interprets a script value as an object index.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }
}

impl Domain {
    /// Registers a string and returns its script value.
    pub fn add_string(&mut self, s: impl Into<Rc<str>>) -> ObjId {
        self.push_object(DomainObject::Str(s.into()))
    }

    /// Registers a weak reference to a host object and returns its script value.
    pub fn add_object<T: VmObject>(&mut self, object: &ObjRef<T>) -> ObjId {
        let object: Rc<dyn Any> = object.clone();
        self.push_object(DomainObject::Native {
            class: T::CLASS_NAME,
            object: Rc::downgrade(&object),
        })
    }

    /// Number of entries in the object table.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Resolves a string.
    pub fn string(&self, id: ObjId) -> Result<Rc<str>, ObjectError> {
        match self.entry(id)? {
            DomainObject::Str(s) => Ok(Rc::clone(s)),
            DomainObject::Native { .. } => Err(ObjectError::NotAString),
        }
    }

    /// Resolves a native object of class `T`.
    pub fn object<T: VmObject>(&self, id: ObjId) -> Result<ObjRef<T>, ObjectError> {
        match self.entry(id)? {
            DomainObject::Str(_) => Err(ObjectError::NotAnObject),
            DomainObject::Native { class, object } => {
                let object = object.upgrade().ok_or(ObjectError::Released)?;
                object
                    .downcast::<RefCell<T>>()
                    .map_err(|_| ObjectError::ClassMismatch {
                        expected: T::CLASS_NAME,
                        found: class,
                    })
            }
        }
    }

    fn push_object(&mut self, object: DomainObject) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    fn entry(&self, id: ObjId) -> Result<&DomainObject, ObjectError> {
        self.objects.get(id.index()).ok_or(ObjectError::OutOfRange {
            raw: id.as_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Port(i32);

    impl VmObject for Port {
        const CLASS_NAME: &'static str = "Port";
    }

    struct Timer;

    impl VmObject for Timer {
        const CLASS_NAME: &'static str = "Timer";
    }

    #[test]
    fn strings_resolve_by_index() {
        let mut d = Domain::default();
        let a = d.add_string("hello");
        let b = d.add_string("world");
        assert_eq!(&*d.string(a).unwrap(), "hello");
        assert_eq!(&*d.string(b).unwrap(), "world");
        assert_eq!(
            d.string(ObjId(9)),
            Err(ObjectError::OutOfRange { raw: 9 })
        );
    }

    #[test]
    fn native_objects_are_weak() {
        let mut d = Domain::default();
        let port = Rc::new(RefCell::new(Port(7)));
        let id = d.add_object(&port);
        assert_eq!(d.object::<Port>(id).unwrap().borrow().0, 7);
        assert!(matches!(
            d.object::<Timer>(id),
            Err(ObjectError::ClassMismatch {
                expected: "Timer",
                found: "Port"
            })
        ));
        assert_eq!(d.string(id), Err(ObjectError::NotAString));
        drop(port);
        assert!(matches!(d.object::<Port>(id), Err(ObjectError::Released)));
    }

    #[test]
    fn negative_raw_values_are_not_ids() {
        assert_eq!(ObjId::from_raw(-1), None);
        assert_eq!(ObjId::from_raw(4), Some(ObjId(4)));
    }
}
