// Copyright 2026 Joyent, Inc.

//! The generic struct codec: drives a field table against a protocol
//! reader/writer, enforcing requiredness and union discipline and
//! skipping anything it does not recognize.

use std::sync::Arc;

use crate::codec::ThriftCodec;
use crate::errors::ProtocolError;
use crate::metadata::{
    ConstructionPlan, Requiredness, StructCategory, StructMetadata, ThriftType,
};
use crate::protocol::{skip, ProtocolReader, ProtocolWriter, TType};
use crate::value::{StructValue, ThriftValue};

struct FieldCodec {
    id: i16,
    name: String,
    requiredness: Requiredness,
    wire_type: TType,
    extractable: bool,
    codec: Arc<dyn ThriftCodec>,
}

/// Reads and writes one struct, union, or exception type, generically,
/// from its descriptor.
pub struct StructCodec {
    ttype: ThriftType,
    metadata: Arc<StructMetadata>,
    fields: Vec<FieldCodec>,
}

impl StructCodec {
    /// `field_codecs` must parallel `metadata.fields()`.
    pub fn new(
        ttype: ThriftType,
        metadata: Arc<StructMetadata>,
        field_codecs: Vec<Arc<dyn ThriftCodec>>,
    ) -> Self {
        let fields = metadata
            .fields()
            .iter()
            .zip(field_codecs)
            .map(|(field, codec)| FieldCodec {
                id: field.id,
                name: field.name.clone(),
                requiredness: field.requiredness,
                wire_type: field.ttype.wire_type(),
                extractable: field.extraction.is_some(),
                codec,
            })
            .collect();
        StructCodec {
            ttype,
            metadata,
            fields,
        }
    }

    fn slot_of(&self, id: i16) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    fn validate_read(
        &self,
        slots: &[Option<ThriftValue>],
    ) -> Result<(), ProtocolError> {
        if self.metadata.category() == StructCategory::Union {
            let count = slots.iter().filter(|s| s.is_some()).count();
            if count != 1 {
                return Err(ProtocolError::UnionCardinality {
                    name: String::from(self.metadata.name()),
                    count,
                });
            }
            return Ok(());
        }

        for (slot, field) in slots.iter().zip(&self.fields) {
            if slot.is_none() && field.requiredness == Requiredness::Required {
                return Err(ProtocolError::MissingRequiredField {
                    id: field.id,
                    name: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Assemble the decoded value following the construction plan:
    /// constructor arguments by parameter slot, then remaining injections
    /// in id order.
    fn construct(
        &self,
        mut slots: Vec<Option<ThriftValue>>,
    ) -> Result<ThriftValue, ProtocolError> {
        let mut value = StructValue::new();

        if let ConstructionPlan::Constructor { params } = self.metadata.plan() {
            for id in params {
                if let Some(index) = self.slot_of(*id) {
                    if let Some(v) = slots[index].take() {
                        value.set(*id, v);
                    }
                }
            }
        }

        // builder setters and per-field injections run in id order either
        // way; slots are already sorted by field id
        for (slot, field) in slots.iter_mut().zip(&self.fields) {
            if let Some(v) = slot.take() {
                value.set(field.id, v);
            }
        }

        Ok(ThriftValue::Struct(value))
    }
}

impl ThriftCodec for StructCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        reader.read_struct_begin()?;

        let mut slots: Vec<Option<ThriftValue>> =
            self.fields.iter().map(|_| None).collect();

        while let Some(header) = reader.read_field_begin()? {
            match self.slot_of(header.id) {
                // unknown field
                None => skip(reader, header.ttype)?,
                Some(index) => {
                    let field = &self.fields[index];
                    if field.wire_type != header.ttype {
                        // wire type drifted from the descriptor, treat
                        // the field as unknown
                        skip(reader, header.ttype)?;
                    } else {
                        slots[index] = Some(field.codec.read(reader)?);
                    }
                }
            }
            reader.read_field_end()?;
        }
        reader.read_struct_end()?;

        self.validate_read(&slots)?;
        self.construct(slots)
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        let fields = match value {
            ThriftValue::Struct(fields) => fields,
            other => {
                return Err(ProtocolError::invalid(format!(
                    "expected a {} struct value, found {}",
                    self.metadata.name(),
                    other.kind()
                )));
            }
        };

        if self.metadata.category() == StructCategory::Union {
            let count = self
                .fields
                .iter()
                .filter(|f| f.extractable && fields.get(f.id).is_some())
                .count();
            if count != 1 {
                return Err(ProtocolError::UnionCardinality {
                    name: String::from(self.metadata.name()),
                    count,
                });
            }
        }

        writer.write_struct_begin(self.metadata.name())?;
        for field in &self.fields {
            if !field.extractable {
                continue;
            }
            match fields.get(field.id) {
                Some(v) => {
                    writer.write_field_begin(
                        &field.name,
                        field.wire_type,
                        field.id,
                    )?;
                    field.codec.write(v, writer)?;
                    writer.write_field_end()?;
                }
                None if field.requiredness == Requiredness::Required => {
                    return Err(ProtocolError::MissingRequiredField {
                        id: field.id,
                        name: field.name.clone(),
                    });
                }
                None => (),
            }
        }
        writer.write_field_stop()?;
        writer.write_struct_end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{I32Codec, StringCodec};
    use crate::metadata::{FieldMetadata, TypeCatalog};
    use crate::protocol::ProtocolKind;
    use bytes::BytesMut;

    fn make_codec(
        meta: StructMetadata,
        codecs: Vec<Arc<dyn ThriftCodec>>,
    ) -> StructCodec {
        let catalog = TypeCatalog::new();
        let name = String::from(meta.name());
        let ttype = catalog.struct_type(&name, move |_| Ok(meta)).unwrap();
        let metadata = match &ttype {
            ThriftType::Struct(handle) => catalog.resolve(handle).unwrap(),
            _ => unreachable!(),
        };
        StructCodec::new(ttype, metadata, codecs)
    }

    fn bonk_codec() -> StructCodec {
        let meta = StructMetadata::builder("Bonk", StructCategory::Struct)
            .field(1, "message", ThriftType::String)
            .field(2, "type", ThriftType::I32)
            .designated_constructor(&["message", "type"])
            .build()
            .unwrap();
        make_codec(meta, vec![Arc::new(StringCodec), Arc::new(I32Codec)])
    }

    fn bonk_value() -> ThriftValue {
        ThriftValue::Struct(
            StructValue::new().with(1, "hello").with(2, 42),
        )
    }

    fn encode(
        codec: &StructCodec,
        value: &ThriftValue,
        protocol: ProtocolKind,
    ) -> BytesMut {
        let mut buf = BytesMut::new();
        codec
            .write(value, protocol.writer(&mut buf).as_mut())
            .unwrap();
        buf
    }

    #[test]
    fn binary_round_trip_of_simple_struct() {
        let codec = bonk_codec();
        let value = bonk_value();

        let buf = encode(&codec, &value, ProtocolKind::Binary);
        // field 1: type + id + len + "hello"; field 2: type + id + value;
        // stop byte
        assert_eq!(buf.len(), (1 + 2 + 4 + 5) + (1 + 2 + 4) + 1);

        let decoded = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn compact_protocol_parity() {
        let codec = bonk_codec();
        let value = bonk_value();
        let buf = encode(&codec, &value, ProtocolKind::Compact);
        let decoded = codec
            .read(ProtocolKind::Compact.reader(&buf).as_mut())
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let codec = bonk_codec();

        // hand-build a wire struct carrying an extra field id 99
        let mut buf = BytesMut::new();
        {
            let mut w = ProtocolKind::Binary.writer(&mut buf);
            w.write_struct_begin("Bonk").unwrap();
            w.write_field_begin("message", TType::String, 1).unwrap();
            w.write_string("hello").unwrap();
            w.write_field_end().unwrap();
            w.write_field_begin("mystery", TType::I32, 99).unwrap();
            w.write_i32(7).unwrap();
            w.write_field_end().unwrap();
            w.write_field_begin("type", TType::I32, 2).unwrap();
            w.write_i32(42).unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
        }

        let decoded = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap();
        assert_eq!(decoded, bonk_value());
    }

    #[test]
    fn mismatched_wire_type_is_skipped() {
        let codec = bonk_codec();

        // field 2 arrives as a string even though the descriptor says i32
        let mut buf = BytesMut::new();
        {
            let mut w = ProtocolKind::Binary.writer(&mut buf);
            w.write_struct_begin("Bonk").unwrap();
            w.write_field_begin("message", TType::String, 1).unwrap();
            w.write_string("hello").unwrap();
            w.write_field_end().unwrap();
            w.write_field_begin("type", TType::String, 2).unwrap();
            w.write_string("42").unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
        }

        let decoded = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap();
        let fields = decoded.as_struct().unwrap();
        assert_eq!(fields.get(1), Some(&ThriftValue::from("hello")));
        assert_eq!(fields.get(2), None);
    }

    #[test]
    fn missing_required_field_fails_decode() {
        let meta = StructMetadata::builder("Strict", StructCategory::Struct)
            .required(1, "must", ThriftType::I32)
            .optional(2, "may", ThriftType::I32)
            .build()
            .unwrap();
        let codec =
            make_codec(meta, vec![Arc::new(I32Codec), Arc::new(I32Codec)]);

        // only the optional field on the wire
        let mut buf = BytesMut::new();
        {
            let mut w = ProtocolKind::Binary.writer(&mut buf);
            w.write_struct_begin("Strict").unwrap();
            w.write_field_begin("may", TType::I32, 2).unwrap();
            w.write_i32(5).unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
        }

        let err = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap_err();
        match err {
            ProtocolError::MissingRequiredField { id, name } => {
                assert_eq!(id, 1);
                assert_eq!(name, "must");
            }
            other => panic!("expected MissingRequiredField, got {:?}", other),
        }
    }

    #[test]
    fn required_field_must_be_present_to_write() {
        let meta = StructMetadata::builder("Strict", StructCategory::Struct)
            .required(1, "must", ThriftType::I32)
            .build()
            .unwrap();
        let codec = make_codec(meta, vec![Arc::new(I32Codec)]);

        let mut buf = BytesMut::new();
        let err = codec
            .write(
                &ThriftValue::Struct(StructValue::new()),
                ProtocolKind::Binary.writer(&mut buf).as_mut(),
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingRequiredField { .. }));
    }

    #[test]
    fn absent_optional_fields_are_omitted() {
        let meta = StructMetadata::builder("Sparse", StructCategory::Struct)
            .optional(1, "a", ThriftType::I32)
            .optional(2, "b", ThriftType::I32)
            .build()
            .unwrap();
        let codec =
            make_codec(meta, vec![Arc::new(I32Codec), Arc::new(I32Codec)]);

        let value =
            ThriftValue::Struct(StructValue::new().with(2, 9));
        let buf = encode(&codec, &value, ProtocolKind::Binary);
        // one i32 field plus the stop byte
        assert_eq!(buf.len(), 1 + 2 + 4 + 1);

        let decoded = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap();
        assert_eq!(decoded, value);
    }

    fn result_union_codec() -> StructCodec {
        let meta = StructMetadata::builder("Outcome", StructCategory::Union)
            .field(1, "ok", ThriftType::I32)
            .field(2, "failure", ThriftType::String)
            .union_discriminator("set_field")
            .build()
            .unwrap();
        make_codec(meta, vec![Arc::new(I32Codec), Arc::new(StringCodec)])
    }

    #[test]
    fn union_round_trips_with_one_field_set() {
        let codec = result_union_codec();
        let value = ThriftValue::Struct(StructValue::new().with(2, "boom"));
        for protocol in [ProtocolKind::Binary, ProtocolKind::Compact] {
            let buf = encode(&codec, &value, protocol);
            let decoded =
                codec.read(protocol.reader(&buf).as_mut()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn union_decode_enforces_cardinality() {
        let codec = result_union_codec();

        for set_fields in [0usize, 2] {
            let mut buf = BytesMut::new();
            {
                let mut w = ProtocolKind::Binary.writer(&mut buf);
                w.write_struct_begin("Outcome").unwrap();
                if set_fields > 0 {
                    w.write_field_begin("ok", TType::I32, 1).unwrap();
                    w.write_i32(1).unwrap();
                    w.write_field_end().unwrap();
                    w.write_field_begin("failure", TType::String, 2)
                        .unwrap();
                    w.write_string("boom").unwrap();
                    w.write_field_end().unwrap();
                }
                w.write_field_stop().unwrap();
                w.write_struct_end().unwrap();
            }

            let err = codec
                .read(ProtocolKind::Binary.reader(&buf).as_mut())
                .unwrap_err();
            match err {
                ProtocolError::UnionCardinality { count, .. } => {
                    assert_eq!(count, set_fields)
                }
                other => {
                    panic!("expected UnionCardinality, got {:?}", other)
                }
            }
        }
    }

    #[test]
    fn union_write_enforces_cardinality() {
        let codec = result_union_codec();
        let mut buf = BytesMut::new();
        let err = codec
            .write(
                &ThriftValue::Struct(
                    StructValue::new().with(1, 1).with(2, "x"),
                ),
                ProtocolKind::Binary.writer(&mut buf).as_mut(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnionCardinality { count: 2, .. }
        ));
    }

    quickcheck::quickcheck! {
        fn prop_struct_roundtrip_on_both_protocols(
            message: String,
            count: i32
        ) -> bool {
            let codec = bonk_codec();
            let value = ThriftValue::Struct(
                StructValue::new().with(1, message).with(2, count),
            );
            [ProtocolKind::Binary, ProtocolKind::Compact]
                .iter()
                .all(|protocol| {
                    let mut buf = BytesMut::new();
                    codec
                        .write(&value, protocol.writer(&mut buf).as_mut())
                        .unwrap();
                    let decoded =
                        codec.read(protocol.reader(&buf).as_mut()).unwrap();
                    decoded == value
                })
        }
    }

    #[test]
    fn fields_without_extraction_are_not_written() {
        let mut write_only = FieldMetadata::new(2, "derived", ThriftType::I32);
        write_only.extraction = None;
        let meta = StructMetadata::builder("Partial", StructCategory::Struct)
            .field(1, "kept", ThriftType::I32)
            .field_meta(write_only)
            .build()
            .unwrap();
        let codec =
            make_codec(meta, vec![Arc::new(I32Codec), Arc::new(I32Codec)]);

        let value = ThriftValue::Struct(
            StructValue::new().with(1, 10).with(2, 20),
        );
        let buf = encode(&codec, &value, ProtocolKind::Binary);
        let decoded = codec
            .read(ProtocolKind::Binary.reader(&buf).as_mut())
            .unwrap();
        let fields = decoded.as_struct().unwrap();
        assert_eq!(fields.get(1), Some(&ThriftValue::I32(10)));
        assert_eq!(fields.get(2), None);
    }
}
