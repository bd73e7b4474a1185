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

//! Shape recognition for runtime types.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use stepviz_common::types::{MethodRef, Shape, TypeInfo};

pub(crate) const STRING: &str = "java.lang.String";
pub(crate) const COLLECTION: &str = "java.util.Collection";
pub(crate) const LIST: &str = "java.util.List";
pub(crate) const LINKED_LIST: &str = "java.util.LinkedList";
pub(crate) const MAP: &str = "java.util.Map";

/// Field holding the primitive of a boxed value
pub(crate) const BOXED_VALUE_FIELD: &str = "value";
/// Field holding the detail message of a throwable
pub(crate) const DETAIL_MESSAGE_FIELD: &str = "detailMessage";

pub(crate) const TO_ARRAY: MethodRef =
    MethodRef::with_signature("toArray", "()[Ljava/lang/Object;");
pub(crate) const ENTRY_SET: MethodRef = MethodRef::named("entrySet");
pub(crate) const GET_KEY: MethodRef = MethodRef::named("getKey");
pub(crate) const GET_VALUE: MethodRef = MethodRef::named("getValue");

static BOXED_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "java.lang.Boolean",
        "java.lang.Character",
        "java.lang.Byte",
        "java.lang.Short",
        "java.lang.Integer",
        "java.lang.Long",
        "java.lang.Float",
        "java.lang.Double",
    ])
});

pub(crate) fn is_string(ty: &TypeInfo) -> bool {
    ty.name == STRING
}

pub(crate) fn is_boxed(ty: &TypeInfo) -> bool {
    BOXED_TYPES.contains(ty.name.as_str())
}

pub(crate) fn is_collection(ty: &TypeInfo) -> bool {
    ty.is_assignable_to(COLLECTION)
}

pub(crate) fn is_map(ty: &TypeInfo) -> bool {
    ty.is_assignable_to(MAP)
}

/// Shape of a collection, most specific family first
pub(crate) fn collection_shape(ty: &TypeInfo) -> Shape {
    if ty.is_assignable_to(LINKED_LIST) {
        Shape::LinkedSequence
    } else if ty.is_assignable_to(LIST) {
        Shape::OrderedSequence
    } else {
        Shape::Set
    }
}
