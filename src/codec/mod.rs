// Copyright 2026 Joyent, Inc.

//! Codecs convert between [`ThriftValue`]s and a Thrift protocol
//! reader/writer.
//!
//! Built-in codecs cover the scalar categories, enums, and the three
//! container shapes; [`structs`] holds the generic struct engine and
//! [`registry`] resolves a codec for any [`ThriftType`]. A codec never
//! blocks on I/O beyond the protocol reader/writer it is given.

use std::sync::Arc;

use crate::errors::ProtocolError;
use crate::metadata::{Coercion, EnumMetadata, ThriftType};
use crate::protocol::{ProtocolReader, ProtocolWriter, TType};
use crate::value::ThriftValue;

pub mod registry;
pub mod structs;

pub use registry::CodecRegistry;
pub use structs::StructCodec;

/// A bidirectional converter for one Thrift type.
pub trait ThriftCodec: Send + Sync {
    /// The type this codec reads and writes.
    fn thrift_type(&self) -> &ThriftType;

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError>;

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError>;
}

fn value_mismatch(
    expected: &'static str,
    value: &ThriftValue,
) -> ProtocolError {
    ProtocolError::invalid(format!(
        "expected a {} value, found {}",
        expected,
        value.kind()
    ))
}

macro_rules! scalar_codec {
    ($codec:ident, $ttype:expr, $variant:ident, $read:ident, $write:ident,
     $label:expr) => {
        pub struct $codec;

        impl ThriftCodec for $codec {
            fn thrift_type(&self) -> &ThriftType {
                &$ttype
            }

            fn read(
                &self,
                reader: &mut dyn ProtocolReader,
            ) -> Result<ThriftValue, ProtocolError> {
                Ok(ThriftValue::$variant(reader.$read()?))
            }

            fn write(
                &self,
                value: &ThriftValue,
                writer: &mut dyn ProtocolWriter,
            ) -> Result<(), ProtocolError> {
                match value {
                    ThriftValue::$variant(v) => writer.$write(*v),
                    other => Err(value_mismatch($label, other)),
                }
            }
        }
    };
}

scalar_codec!(BoolCodec, ThriftType::Bool, Bool, read_bool, write_bool, "bool");
scalar_codec!(I8Codec, ThriftType::I8, I8, read_i8, write_i8, "i8");
scalar_codec!(I16Codec, ThriftType::I16, I16, read_i16, write_i16, "i16");
scalar_codec!(I32Codec, ThriftType::I32, I32, read_i32, write_i32, "i32");
scalar_codec!(I64Codec, ThriftType::I64, I64, read_i64, write_i64, "i64");
scalar_codec!(
    DoubleCodec,
    ThriftType::Double,
    Double,
    read_double,
    write_double,
    "double"
);

pub struct StringCodec;

impl ThriftCodec for StringCodec {
    fn thrift_type(&self) -> &ThriftType {
        &ThriftType::String
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        Ok(ThriftValue::String(reader.read_string()?))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        match value {
            ThriftValue::String(v) => writer.write_string(v),
            other => Err(value_mismatch("string", other)),
        }
    }
}

pub struct BinaryCodec;

impl ThriftCodec for BinaryCodec {
    fn thrift_type(&self) -> &ThriftType {
        &ThriftType::Binary
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        Ok(ThriftValue::Binary(reader.read_binary()?))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        match value {
            ThriftValue::Binary(v) => writer.write_binary(v),
            other => Err(value_mismatch("binary", other)),
        }
    }
}

/// Enums are encoded as `I32`; the value is validated against the enum
/// descriptor in both directions.
pub struct EnumCodec {
    ttype: ThriftType,
    metadata: Arc<EnumMetadata>,
}

impl EnumCodec {
    pub fn new(metadata: Arc<EnumMetadata>) -> Self {
        EnumCodec {
            ttype: ThriftType::Enum(metadata.clone()),
            metadata,
        }
    }

    fn check(&self, value: i32) -> Result<i32, ProtocolError> {
        if self.metadata.contains_value(value) {
            Ok(value)
        } else {
            Err(ProtocolError::UnknownEnumValue {
                name: String::from(self.metadata.name()),
                value,
            })
        }
    }
}

impl ThriftCodec for EnumCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        Ok(ThriftValue::I32(self.check(reader.read_i32()?)?))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        match value {
            ThriftValue::I32(v) => writer.write_i32(self.check(*v)?),
            other => Err(value_mismatch("enum (i32)", other)),
        }
    }
}

pub struct ListCodec {
    ttype: ThriftType,
    element_wire: TType,
    element: Arc<dyn ThriftCodec>,
}

impl ListCodec {
    pub fn new(element_type: ThriftType, element: Arc<dyn ThriftCodec>) -> Self {
        ListCodec {
            element_wire: element_type.wire_type(),
            ttype: ThriftType::list(element_type),
            element,
        }
    }
}

impl ThriftCodec for ListCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        let (element, size) = reader.read_list_begin()?;
        if size > 0 && element != self.element_wire {
            return Err(ProtocolError::UnexpectedElementType {
                expected: self.element_wire,
                actual: element,
            });
        }
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(self.element.read(reader)?);
        }
        reader.read_list_end()?;
        Ok(ThriftValue::List(items))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        let items = match value {
            ThriftValue::List(items) => items,
            other => return Err(value_mismatch("list", other)),
        };
        writer.write_list_begin(self.element_wire, items.len())?;
        for item in items {
            self.element.write(item, writer)?;
        }
        writer.write_list_end()
    }
}

pub struct SetCodec {
    ttype: ThriftType,
    element_wire: TType,
    element: Arc<dyn ThriftCodec>,
}

impl SetCodec {
    pub fn new(element_type: ThriftType, element: Arc<dyn ThriftCodec>) -> Self {
        SetCodec {
            element_wire: element_type.wire_type(),
            ttype: ThriftType::set(element_type),
            element,
        }
    }
}

impl ThriftCodec for SetCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        let (element, size) = reader.read_set_begin()?;
        if size > 0 && element != self.element_wire {
            return Err(ProtocolError::UnexpectedElementType {
                expected: self.element_wire,
                actual: element,
            });
        }
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(self.element.read(reader)?);
        }
        reader.read_set_end()?;
        Ok(ThriftValue::Set(items))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        let items = match value {
            ThriftValue::Set(items) => items,
            other => return Err(value_mismatch("set", other)),
        };
        writer.write_set_begin(self.element_wire, items.len())?;
        for item in items {
            self.element.write(item, writer)?;
        }
        writer.write_set_end()
    }
}

pub struct MapCodec {
    ttype: ThriftType,
    key_wire: TType,
    value_wire: TType,
    key: Arc<dyn ThriftCodec>,
    value: Arc<dyn ThriftCodec>,
}

impl MapCodec {
    pub fn new(
        key_type: ThriftType,
        value_type: ThriftType,
        key: Arc<dyn ThriftCodec>,
        value: Arc<dyn ThriftCodec>,
    ) -> Self {
        MapCodec {
            key_wire: key_type.wire_type(),
            value_wire: value_type.wire_type(),
            ttype: ThriftType::map(key_type, value_type),
            key,
            value,
        }
    }
}

impl ThriftCodec for MapCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        let (key, value, size) = reader.read_map_begin()?;
        if size > 0 && (key != self.key_wire || value != self.value_wire) {
            return Err(ProtocolError::UnexpectedElementType {
                expected: self.key_wire,
                actual: key,
            });
        }
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let k = self.key.read(reader)?;
            let v = self.value.read(reader)?;
            entries.push((k, v));
        }
        reader.read_map_end()?;
        Ok(ThriftValue::Map(entries))
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        let entries = match value {
            ThriftValue::Map(entries) => entries,
            other => return Err(value_mismatch("map", other)),
        };
        writer.write_map_begin(self.key_wire, self.value_wire, entries.len())?;
        for (k, v) in entries {
            self.key.write(k, writer)?;
            self.value.write(v, writer)?;
        }
        writer.write_map_end()
    }
}

/// Wraps another codec and converts values through a registered coercion
/// on the way in and out.
pub struct CoercionCodec {
    ttype: ThriftType,
    inner: Arc<dyn ThriftCodec>,
    coercion: Coercion,
}

impl CoercionCodec {
    pub fn new(
        ident: &str,
        inner: Arc<dyn ThriftCodec>,
        coercion: Coercion,
    ) -> Self {
        CoercionCodec {
            ttype: ThriftType::Coerced {
                ident: String::from(ident),
                wire: Box::new(inner.thrift_type().clone()),
            },
            inner,
            coercion,
        }
    }
}

impl ThriftCodec for CoercionCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        let wire_value = self.inner.read(reader)?;
        (self.coercion.from_wire)(wire_value)
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        let wire_value = (self.coercion.to_wire)(value)?;
        self.inner.write(&wire_value, writer)
    }
}
