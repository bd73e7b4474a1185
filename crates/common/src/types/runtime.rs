// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Values and descriptors as the debugged runtime reports them.
//!
//! Nothing here is inspected yet: a [`RawValue`] is an opaque handle into the
//! target process. The snapshot builder turns raw values into document
//! [`Value`](crate::types::Value)s.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity token of a live object in the target process
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

/// Identity of a thread in the target process
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

/// A thread as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// Thread identity
    pub id: ThreadId,
    /// Thread name, used for admission control
    pub name: String,
}

impl ThreadInfo {
    /// Create a thread descriptor
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self { id: ThreadId(id), name: name.into() }
    }
}

/// A primitive value held directly by a variable, field or array slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Primitive {
    /// `boolean`
    Boolean(bool),
    /// `char`
    Char(char),
    /// `byte`
    Byte(i8),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
}

/// An uninspected value in the target process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RawValue {
    /// The null reference
    Null,
    /// A primitive
    Primitive(Primitive),
    /// A reference to a live object
    Object(ObjectId),
}

impl From<Primitive> for RawValue {
    fn from(value: Primitive) -> Self {
        Self::Primitive(value)
    }
}

impl From<ObjectId> for RawValue {
    fn from(value: ObjectId) -> Self {
        Self::Object(value)
    }
}

/// Kind of a reference type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// A class
    Class,
    /// An interface
    Interface,
    /// An array type
    Array,
}

/// Runtime type of an object
///
/// `ancestors` lists every supertype the type is assignable to (superclasses
/// and implemented interfaces, transitively), which lets the inspector decide
/// an object's shape without loading the type on the tracer side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Fully qualified type name, e.g. `java.util.ArrayList` or `int[]`
    pub name: String,
    /// Whether this is a class, an interface or an array type
    pub kind: TypeKind,
    /// All supertypes, transitively
    pub ancestors: Vec<String>,
}

impl TypeInfo {
    /// Describe a class type without supertypes
    pub fn class(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: TypeKind::Class, ancestors: Vec::new() }
    }

    /// Describe an array type
    pub fn array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Array,
            ancestors: vec!["java.lang.Object".to_string()],
        }
    }

    /// Add supertypes to this descriptor
    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ancestors.extend(ancestors.into_iter().map(Into::into));
        self
    }

    /// Whether values of this type can be assigned to `type_name`
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.name == type_name || self.ancestors.iter().any(|a| a == type_name)
    }

    /// Whether this is an array type
    pub fn is_array(&self) -> bool {
        self.kind == TypeKind::Array
    }

    /// Whether this is a class type
    pub fn is_class(&self) -> bool {
        self.kind == TypeKind::Class
    }
}

/// A code location in the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Declaring type of the executing method
    pub type_name: String,
    /// Executing method name
    pub method: String,
    /// One-based line number, or `-1` when unknown
    pub line: i32,
}

impl Location {
    /// Create a location
    pub fn new(type_name: impl Into<String>, method: impl Into<String>, line: i32) -> Self {
        Self { type_name: type_name.into(), method: method.into(), line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.type_name, self.method, self.line)
    }
}

/// Handle on a live stack frame
///
/// Handles are only valid while the thread stays suspended and no method has
/// been invoked in the target since they were obtained. Backends reject stale
/// handles with [`VmError::InvalidFrame`](crate::VmError::InvalidFrame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    /// Thread owning the frame
    pub thread: ThreadId,
    /// Depth from the innermost frame (0 = current frame)
    pub depth: usize,
    /// Backend-defined validity token
    pub epoch: u64,
}

/// A method to invoke on a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Method name
    pub name: &'static str,
    /// JNI signature, when the name alone is ambiguous
    pub signature: Option<&'static str>,
}

impl MethodRef {
    /// A method selected by name only
    pub const fn named(name: &'static str) -> Self {
        Self { name, signature: None }
    }

    /// A method selected by name and signature
    pub const fn with_signature(name: &'static str, signature: &'static str) -> Self {
        Self { name, signature: Some(signature) }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signature {
            Some(signature) => write!(f, "{}{}", self.name, signature),
            None => f.write_str(self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability_includes_self_and_ancestors() {
        let list = TypeInfo::class("java.util.ArrayList")
            .with_ancestors(["java.util.List", "java.util.Collection"]);

        assert!(list.is_assignable_to("java.util.ArrayList"));
        assert!(list.is_assignable_to("java.util.Collection"));
        assert!(!list.is_assignable_to("java.util.Map"));
        assert!(list.is_class());
        assert!(!list.is_array());
    }

    #[test]
    fn test_method_ref_display() {
        assert_eq!(MethodRef::named("entrySet").to_string(), "entrySet");
        assert_eq!(
            MethodRef::with_signature("toArray", "()[Ljava/lang/Object;").to_string(),
            "toArray()[Ljava/lang/Object;"
        );
    }

    #[test]
    fn test_identity_serializes_transparently() {
        assert_eq!(serde_json::to_string(&ObjectId(42)).unwrap(), "42");
        assert_eq!(ObjectId(42).to_string(), "42");
    }
}
