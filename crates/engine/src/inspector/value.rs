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

//! Value inspection.
//!
//! [`ValueInspector`] turns raw runtime values into document values and
//! collects every heap object reachable from them. An object is registered
//! in the heap before any of its members is looked at, and members are
//! expanded from a FIFO work list, so shared and cyclic object graphs of any
//! depth resolve to references without recursion.
//!
//! Shape rules that need to call into the target (collections and maps) make
//! every call before the object is registered. When a call fails the object
//! falls through to the next, less specific rule.

use std::collections::{HashSet, VecDeque};

use stepviz_common::{
    types::{
        Heap, HeapObject, Literal, Member, MemberKey, MethodRef, ObjectId, RawValue, Shape,
        ThreadId, TypeInfo, Value,
    },
    VirtualMachine, VmError,
};
use tracing::warn;

use super::shape;
use crate::errors::{Result, TraceError};

/// Members of a registered object still waiting to be inspected
enum Pending {
    Indexed(Vec<RawValue>),
    Keyed(Vec<(RawValue, RawValue)>),
    Fields(Vec<(String, RawValue)>),
}

/// Inspects values of one snapshot
pub struct ValueInspector<'a, V> {
    vm: &'a mut V,
    thread: ThreadId,
    program_types: &'a HashSet<String>,
    heap: Heap,
    pending: VecDeque<(ObjectId, Pending)>,
}

impl<'a, V: VirtualMachine> ValueInspector<'a, V> {
    /// Create an inspector invoking methods on `thread`
    pub fn new(vm: &'a mut V, thread: ThreadId, program_types: &'a HashSet<String>) -> Self {
        Self { vm, thread, program_types, heap: Heap::new(), pending: VecDeque::new() }
    }

    /// Inspect a value and everything reachable from it
    pub fn inspect(&mut self, raw: RawValue) -> Result<Value> {
        let value = self.resolve(raw)?;
        self.drain()?;
        Ok(value)
    }

    /// The heap of every object inspected so far
    pub fn into_heap(self) -> Heap {
        self.heap
    }

    fn drain(&mut self) -> Result<()> {
        while let Some((id, pending)) = self.pending.pop_front() {
            let mut members = Vec::new();
            match pending {
                Pending::Indexed(elements) => {
                    for (index, element) in elements.into_iter().enumerate() {
                        members.push(Member {
                            key: MemberKey::Index(index),
                            value: self.resolve(element)?,
                        });
                    }
                }
                Pending::Keyed(entries) => {
                    for (key, value) in entries {
                        let key = MemberKey::Value(self.resolve(key)?);
                        members.push(Member { key, value: self.resolve(value)? });
                    }
                }
                Pending::Fields(fields) => {
                    for (name, value) in fields {
                        let value = self.resolve(value)?;
                        members.push(Member { key: MemberKey::Field(name), value });
                    }
                }
            }
            if let Some(object) = self.heap.get_mut(&id) {
                object.members = members;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, raw: RawValue) -> Result<Value> {
        let id = match raw {
            RawValue::Null => return Ok(Value::Null),
            RawValue::Primitive(primitive) => return Ok(Literal::from(primitive).into()),
            RawValue::Object(id) => id,
        };
        if self.heap.contains_key(&id) {
            return Ok(Value::Reference(id));
        }

        let ty = self.vm.type_of(id)?;

        if shape::is_string(&ty) {
            return Ok(Literal::Text(self.vm.string_value(id)?).into());
        }

        if shape::is_boxed(&ty) {
            if let Some(RawValue::Primitive(primitive)) =
                self.vm.field_value(id, shape::BOXED_VALUE_FIELD)?
            {
                return Ok(Literal::from(primitive).into());
            }
        }

        if ty.is_array() {
            let elements = self.vm.array_values(id)?;
            return Ok(self.register(id, &ty, Shape::Array, false, Pending::Indexed(elements)));
        }

        if shape::is_collection(&ty) {
            if let Some(elements) = self.collection_elements(id)? {
                let shape = shape::collection_shape(&ty);
                return Ok(self.register(id, &ty, shape, false, Pending::Indexed(elements)));
            }
        }

        if shape::is_map(&ty) {
            if let Some(entries) = self.map_entries(id)? {
                return Ok(self.register(id, &ty, Shape::Map, false, Pending::Keyed(entries)));
            }
        }

        if ty.is_class() && self.program_types.contains(&ty.name) {
            let fields = self.vm.fields(id)?;
            return Ok(self.register(id, &ty, Shape::Aggregate, true, Pending::Fields(fields)));
        }

        Ok(Literal::opaque(&ty.name).into())
    }

    fn register(
        &mut self,
        id: ObjectId,
        ty: &TypeInfo,
        shape: Shape,
        user_defined: bool,
        members: Pending,
    ) -> Value {
        self.heap.insert(id, HeapObject::new(shape, ty.name.as_str(), user_defined));
        self.pending.push_back((id, members));
        Value::Reference(id)
    }

    fn collection_elements(&mut self, id: ObjectId) -> Result<Option<Vec<RawValue>>> {
        match self.invoke(id, shape::TO_ARRAY)? {
            Some(RawValue::Object(array)) => Ok(Some(self.vm.array_values(array)?)),
            _ => Ok(None),
        }
    }

    fn map_entries(&mut self, id: ObjectId) -> Result<Option<Vec<(RawValue, RawValue)>>> {
        let Some(RawValue::Object(entry_set)) = self.invoke(id, shape::ENTRY_SET)? else {
            return Ok(None);
        };
        let Some(entries) = self.collection_elements(entry_set)? else {
            return Ok(None);
        };

        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            let RawValue::Object(entry) = entry else {
                return Ok(None);
            };
            let (Some(key), Some(value)) =
                (self.invoke(entry, shape::GET_KEY)?, self.invoke(entry, shape::GET_VALUE)?)
            else {
                return Ok(None);
            };
            pairs.push((key, value));
        }
        Ok(Some(pairs))
    }

    /// Invoke `method`, absorbing every failure except a lost connection
    fn invoke(&mut self, object: ObjectId, method: MethodRef) -> Result<Option<RawValue>> {
        match self.vm.invoke_method(self.thread, object, method) {
            Ok(value) => Ok(Some(value)),
            Err(VmError::Disconnected) => Err(TraceError::Introspection(VmError::Disconnected)),
            Err(err) => {
                warn!("Falling back after {method} failed on object {object}: {err}");
                Ok(None)
            }
        }
    }
}
