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

//! The snapshot document.
//!
//! A [`Snapshot`] captures one moment of the traced program: its call stack
//! (outermost frame first) and every heap object reachable from the stack.
//! Heap objects are never inlined into values; a [`Value::Reference`] names
//! the object's identity key in [`Snapshot::heap`], which keeps the document
//! finite for cyclic and shared object graphs.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::types::{ObjectId, Primitive};

/// Largest magnitude (exclusive) a `long` may have to be encoded as a JSON number.
///
/// Beyond 2^53 a double cannot represent every integer, so such values are
/// encoded as decimal text instead.
pub const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// A routine was entered
    Call,
    /// A routine returned, or the traced thread ended
    Return,
    /// An exception was thrown
    Exception,
    /// Any other step
    Line,
}

/// Heap of one snapshot, keyed by object identity
pub type Heap = BTreeMap<ObjectId, HeapObject>;

/// One inspected moment in execution
///
/// `stack` and `heap` are shared pointers: the snapshot emitted when the traced
/// thread dies after an uncaught exception reuses the exception snapshot's
/// stack and heap instead of copying them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Event classification
    pub kind: SnapshotKind,
    /// Call stack, outermost frame first
    pub stack: Arc<Vec<Frame>>,
    /// Objects reachable from the stack
    pub heap: Arc<Heap>,
}

impl Snapshot {
    /// Create a snapshot owning a freshly captured stack and heap
    pub fn new(kind: SnapshotKind, stack: Vec<Frame>, heap: Heap) -> Self {
        Self { kind, stack: Arc::new(stack), heap: Arc::new(heap) }
    }

    /// Current (innermost) frame
    pub fn current_frame(&self) -> Option<&Frame> {
        self.stack.last()
    }

    /// Look up a heap object by the key a [`Value::Reference`] carries
    pub fn resolve(&self, id: ObjectId) -> Option<&HeapObject> {
        self.heap.get(&id)
    }
}

/// One activation record on the call stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Zero-based source line
    pub source_line: i32,
    /// Name of the executing routine
    pub name: String,
    /// Visible variables in the order the runtime reports them
    pub variables: Vec<Variable>,
}

impl Frame {
    /// Find a visible variable by name
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.iter().find(|v| v.name == name).map(|v| &v.value)
    }
}

/// A named variable visible in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// Inspected value
    pub value: Value,
}

/// An inspected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// The null reference
    Null,
    /// A value fully described inline
    Literal(Literal),
    /// A heap object, by identity key
    Reference(ObjectId),
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Reference(id)
    }
}

impl Value {
    /// The referenced heap key, if this is a reference
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The literal, if this is a literal
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }
}

/// A literal in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// Boolean
    Boolean(bool),
    /// Integer that a double represents exactly
    Integer(i64),
    /// Finite floating point number
    Float(f64),
    /// Text: strings, chars, wide integers, non-finite floats and opaque labels
    Text(String),
}

impl Literal {
    /// Text literal
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Label for a value whose shape is not recognized
    pub fn opaque(runtime_type_name: &str) -> Self {
        Self::Text(format!("type {runtime_type_name}"))
    }

    fn float(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else if value.is_nan() {
            Self::text("NaN")
        } else if value.is_sign_positive() {
            Self::text("Infinity")
        } else {
            Self::text("-Infinity")
        }
    }
}

impl From<Primitive> for Literal {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Boolean(b) => Self::Boolean(b),
            Primitive::Char(c) => Self::Text(c.to_string()),
            Primitive::Byte(v) => Self::Integer(v.into()),
            Primitive::Short(v) => Self::Integer(v.into()),
            Primitive::Int(v) => Self::Integer(v.into()),
            Primitive::Long(v) if v.unsigned_abs() < MAX_EXACT_INTEGER => Self::Integer(v),
            Primitive::Long(v) => Self::Text(v.to_string()),
            Primitive::Float(v) => Self::float(v.into()),
            Primitive::Double(v) => Self::float(v),
        }
    }
}

/// Structural shape of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    /// Fixed-length array
    Array,
    /// Linked-list collection
    LinkedSequence,
    /// Any other list collection
    OrderedSequence,
    /// Non-list collection
    Set,
    /// Associative container
    Map,
    /// Object with named fields
    Aggregate,
}

/// A serialized container or aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObject {
    /// Structural shape
    pub shape: Shape,
    /// Concrete runtime type of the inspected object
    pub runtime_type_name: String,
    /// True only for aggregate types declared by the traced program
    pub user_defined: bool,
    /// Members in positional, entry or declaration order
    pub members: Vec<Member>,
}

impl HeapObject {
    /// A heap object without members yet
    pub fn new(shape: Shape, runtime_type_name: impl Into<String>, user_defined: bool) -> Self {
        let runtime_type_name = runtime_type_name.into();
        Self { shape, runtime_type_name, user_defined, members: Vec::new() }
    }

    /// Find a member by field name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|m| matches!(&m.key, MemberKey::Field(field) if field == name))
            .map(|m| &m.value)
    }
}

/// One member of a heap object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Position, map key or field name
    pub key: MemberKey,
    /// Member value
    pub value: Value,
}

/// Key of a heap object member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberKey {
    /// Position in an array, sequence or set
    Index(usize),
    /// Field name of an aggregate
    Field(String),
    /// Key of a map entry
    Value(Value),
}

/// Information about the fault that ended the traced thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowInfo {
    /// Runtime type name of the uncaught exception
    pub exception_type_name: String,
    /// Detail message of the exception, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_long_literal_precision_boundary() {
        let below = (1i64 << 53) - 1;
        assert_eq!(Literal::from(Primitive::Long(below)), Literal::Integer(below));
        assert_eq!(Literal::from(Primitive::Long(-below)), Literal::Integer(-below));

        assert_eq!(
            Literal::from(Primitive::Long(1 << 53)),
            Literal::text("9007199254740992")
        );
        assert_eq!(
            Literal::from(Primitive::Long(i64::MIN)),
            Literal::text("-9223372036854775808")
        );
    }

    #[test]
    fn test_wide_integers_survive_json() {
        let value = Value::Literal(Literal::from(Primitive::Long(i64::MAX)));
        let encoded = serde_json::to_value(&value).unwrap();
        assert_eq!(encoded, json!({"kind": "literal", "value": "9223372036854775807"}));

        let decoded: Value = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_primitive_literals() {
        assert_eq!(Literal::from(Primitive::Boolean(true)), Literal::Boolean(true));
        assert_eq!(Literal::from(Primitive::Char('x')), Literal::text("x"));
        assert_eq!(Literal::from(Primitive::Byte(-3)), Literal::Integer(-3));
        assert_eq!(Literal::from(Primitive::Double(1.5)), Literal::Float(1.5));
        assert_eq!(Literal::from(Primitive::Double(f64::NAN)), Literal::text("NaN"));
        assert_eq!(Literal::from(Primitive::Float(f32::NEG_INFINITY)), Literal::text("-Infinity"));
    }

    #[test]
    fn test_snapshot_document_layout() {
        let mut heap = Heap::new();
        heap.insert(
            ObjectId(17),
            HeapObject {
                shape: Shape::OrderedSequence,
                runtime_type_name: "java.util.ArrayList".into(),
                user_defined: false,
                members: vec![Member {
                    key: MemberKey::Index(0),
                    value: Value::Literal(Literal::Integer(1)),
                }],
            },
        );
        let snapshot = Snapshot::new(
            SnapshotKind::Line,
            vec![Frame {
                source_line: 4,
                name: "main".into(),
                variables: vec![
                    Variable { name: "list".into(), value: Value::Reference(ObjectId(17)) },
                    Variable { name: "none".into(), value: Value::Null },
                ],
            }],
            heap,
        );

        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            encoded,
            json!({
                "kind": "line",
                "stack": [{
                    "sourceLine": 4,
                    "name": "main",
                    "variables": [
                        {"name": "list", "value": {"kind": "reference", "value": 17}},
                        {"name": "none", "value": {"kind": "null"}}
                    ]
                }],
                "heap": {
                    "17": {
                        "shape": "ordered-sequence",
                        "runtimeTypeName": "java.util.ArrayList",
                        "userDefined": false,
                        "members": [{"key": 0, "value": {"kind": "literal", "value": 1}}]
                    }
                }
            })
        );

        let decoded: Snapshot = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_throw_info_omits_missing_message() {
        let info = ThrowInfo {
            exception_type_name: "java.lang.ArithmeticException".into(),
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"exceptionTypeName": "java.lang.ArithmeticException"})
        );
    }

    #[test]
    fn test_heap_object_field_lookup() {
        let mut node = HeapObject::new(Shape::Aggregate, "Node", true);
        node.members.push(Member {
            key: MemberKey::Field("next".into()),
            value: Value::Reference(ObjectId(3)),
        });

        assert_eq!(node.field("next"), Some(&Value::Reference(ObjectId(3))));
        assert_eq!(node.field("prev"), None);
    }
}
