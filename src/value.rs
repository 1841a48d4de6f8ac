// Copyright 2026 Joyent, Inc.

//! The dynamic value model driven by the codec engine.
//!
//! Codecs convert between [`ThriftValue`] and the wire; descriptors map
//! between `ThriftValue` and whatever shape the application works with.
//! Enum constants travel as their validated `I32` value. Map entries keep
//! insertion order so a decoded value re-encodes to the same bytes.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A single Thrift value of any protocol category.
#[derive(Debug, Clone, PartialEq)]
pub enum ThriftValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Binary(Bytes),
    List(Vec<ThriftValue>),
    Set(Vec<ThriftValue>),
    Map(Vec<(ThriftValue, ThriftValue)>),
    Struct(StructValue),
}

impl ThriftValue {
    /// A short human-readable name for the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ThriftValue::Bool(_) => "bool",
            ThriftValue::I8(_) => "i8",
            ThriftValue::I16(_) => "i16",
            ThriftValue::I32(_) => "i32",
            ThriftValue::I64(_) => "i64",
            ThriftValue::Double(_) => "double",
            ThriftValue::String(_) => "string",
            ThriftValue::Binary(_) => "binary",
            ThriftValue::List(_) => "list",
            ThriftValue::Set(_) => "set",
            ThriftValue::Map(_) => "map",
            ThriftValue::Struct(_) => "struct",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ThriftValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ThriftValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ThriftValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ThriftValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            ThriftValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ThriftValue]> {
        match self {
            ThriftValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ThriftValue {
    fn from(v: bool) -> Self {
        ThriftValue::Bool(v)
    }
}

impl From<i8> for ThriftValue {
    fn from(v: i8) -> Self {
        ThriftValue::I8(v)
    }
}

impl From<i16> for ThriftValue {
    fn from(v: i16) -> Self {
        ThriftValue::I16(v)
    }
}

impl From<i32> for ThriftValue {
    fn from(v: i32) -> Self {
        ThriftValue::I32(v)
    }
}

impl From<i64> for ThriftValue {
    fn from(v: i64) -> Self {
        ThriftValue::I64(v)
    }
}

impl From<f64> for ThriftValue {
    fn from(v: f64) -> Self {
        ThriftValue::Double(v)
    }
}

impl From<&str> for ThriftValue {
    fn from(v: &str) -> Self {
        ThriftValue::String(String::from(v))
    }
}

impl From<String> for ThriftValue {
    fn from(v: String) -> Self {
        ThriftValue::String(v)
    }
}

/// A struct (or union, or exception) value: fields keyed by field id.
///
/// Union discipline is enforced by the struct codec, not by this container;
/// a union value is simply a `StructValue` holding one entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    fields: BTreeMap<i16, ThriftValue>,
}

impl StructValue {
    pub fn new() -> Self {
        StructValue::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, id: i16, value: impl Into<ThriftValue>) -> Self {
        self.fields.insert(id, value.into());
        self
    }

    pub fn set(&mut self, id: i16, value: ThriftValue) {
        self.fields.insert(id, value);
    }

    pub fn get(&self, id: i16) -> Option<&ThriftValue> {
        self.fields.get(&id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in id order.
    pub fn iter(&self) -> impl Iterator<Item = (i16, &ThriftValue)> + '_ {
        self.fields.iter().map(|(id, v)| (*id, v))
    }

    /// For union values: the id of the single set field, if exactly one
    /// field is set.
    pub fn union_variant(&self) -> Option<i16> {
        if self.fields.len() == 1 {
            self.fields.keys().next().copied()
        } else {
            None
        }
    }
}

impl From<StructValue> for ThriftValue {
    fn from(v: StructValue) -> Self {
        ThriftValue::Struct(v)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_value_fields_iterate_in_id_order() {
        let v = StructValue::new().with(7, "late").with(1, "early");
        let ids: Vec<i16> = v.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 7]);
    }

    #[test]
    fn union_variant_requires_exactly_one_field() {
        let empty = StructValue::new();
        assert_eq!(empty.union_variant(), None);

        let one = StructValue::new().with(2, 42);
        assert_eq!(one.union_variant(), Some(2));

        let two = StructValue::new().with(1, 1).with(2, 2);
        assert_eq!(two.union_variant(), None);
    }
}
