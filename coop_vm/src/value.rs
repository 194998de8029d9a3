// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value identifiers and compile-time type descriptors.
//!
//! At run time every value is an `i32`. Strings, objects and functions are carried as indices
//! into the [`Domain`](crate::domain::Domain) tables; the types below give those indices a
//! name at the native-call boundary.

use core::fmt;

/// Index of a [`Function`](crate::function::Function) registered with a domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl FuncId {
    /// Returns the raw table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Index into a domain's object table (strings and native objects).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u32);

impl ObjId {
    /// Returns the raw table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The value a script sees for this object.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

/// Coarse type classes used by the compiler and by native signatures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// No value.
    Void,
    /// A computed integer.
    Int,
    /// A compile-time integer constant.
    IntConst,
    /// An assignable global or special integer variable.
    IntLValueVariable,
    /// An assignable frame local.
    IntLValueLocal,
    /// A native object reference.
    Object,
    /// An assignable object variable.
    ObjectLValue,
    /// A domain string reference.
    String,
    /// A compile-time string constant.
    StringConst,
    /// A script function reference.
    FunctionPointer,
    /// A native object class name.
    ObjectClass,
}

/// A type descriptor: class, class-specific index and optional object class name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// Type class.
    pub class: TypeClass,
    /// Class-specific index (variable slot, constant value, and so on).
    pub index: u32,
    /// Object class name for [`TypeClass::Object`] values.
    pub object_class: Option<&'static str>,
}

impl TypeInfo {
    /// Creates a descriptor with no index and no object class.
    #[must_use]
    pub const fn new(class: TypeClass) -> Self {
        Self {
            class,
            index: 0,
            object_class: None,
        }
    }

    /// Creates an object descriptor for the named class.
    #[must_use]
    pub const fn object(class_name: &'static str) -> Self {
        Self {
            class: TypeClass::Object,
            index: 0,
            object_class: Some(class_name),
        }
    }

    /// Returns `true` for the integer classes (including lvalues and constants).
    #[must_use]
    pub const fn is_int(&self) -> bool {
        matches!(
            self.class,
            TypeClass::Int
                | TypeClass::IntConst
                | TypeClass::IntLValueVariable
                | TypeClass::IntLValueLocal
        )
    }

    /// Returns `true` for [`TypeClass::Void`].
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self.class, TypeClass::Void)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.class, self.object_class) {
            (TypeClass::Void, _) => f.write_str("void"),
            (TypeClass::String | TypeClass::StringConst, _) => f.write_str("string"),
            (TypeClass::FunctionPointer, _) => f.write_str("function"),
            (TypeClass::Object | TypeClass::ObjectLValue, Some(name)) => f.write_str(name),
            (TypeClass::Object | TypeClass::ObjectLValue, None) => f.write_str("object"),
            (TypeClass::ObjectClass, _) => f.write_str("class"),
            _ => f.write_str("int"),
        }
    }
}

/// `void`.
pub const TYPE_VOID: TypeInfo = TypeInfo::new(TypeClass::Void);
/// `int`.
pub const TYPE_INT: TypeInfo = TypeInfo::new(TypeClass::Int);
/// `string`.
pub const TYPE_STRING: TypeInfo = TypeInfo::new(TypeClass::String);
/// A script function reference.
pub const TYPE_FUNCTION_PTR: TypeInfo = TypeInfo::new(TypeClass::FunctionPointer);
