// Copyright 2026 Joyent, Inc.

//! The Thrift Binary Protocol: fixed-width scalars in network byte order,
//! `i32` length prefixes, one type byte and an `i16` id per field.
//!
//! Messages are written with the strict (versioned) header. On read both
//! the strict header and the old unversioned header are accepted, matching
//! the reference implementation's lenient-read behavior.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use num_traits::ToPrimitive;

use crate::errors::ProtocolError;
use crate::protocol::{
    FieldHeader, MessageType, ProtocolReader, ProtocolWriter, TMessage, TType,
};

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Decodes the binary protocol from a byte slice.
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BinaryReader { buf, consumed: 0 }
    }

    fn take(
        &mut self,
        count: usize,
        what: &'static str,
    ) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < count {
            return Err(ProtocolError::Eof(what));
        }
        let (head, rest) = self.buf.split_at(count);
        self.buf = rest;
        self.consumed += count;
        Ok(head)
    }

    fn take_u8(&mut self, what: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, what)?[0])
    }

    fn take_i32(&mut self, what: &'static str) -> Result<i32, ProtocolError> {
        Ok(BigEndian::read_i32(self.take(4, what)?))
    }

    fn take_len(&mut self, what: &'static str) -> Result<usize, ProtocolError> {
        let len = self.take_i32(what)?;
        if len < 0 {
            return Err(ProtocolError::invalid(format!(
                "negative {} length {}",
                what, len
            )));
        }
        Ok(len as usize)
    }

    fn take_string(
        &mut self,
        what: &'static str,
    ) -> Result<String, ProtocolError> {
        let len = self.take_len(what)?;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ProtocolError::invalid("string is not valid UTF-8"))
    }
}

impl<'a> ProtocolReader for BinaryReader<'a> {
    fn read_message_begin(&mut self) -> Result<TMessage, ProtocolError> {
        let header = self.take_i32("message header")? as u32;
        if header & 0x8000_0000 != 0 {
            // strict header: version word, then name and sequence id
            if header & VERSION_MASK != VERSION_1 {
                return Err(ProtocolError::BadVersion(header));
            }
            let message_type = MessageType::from_wire((header & 0xff) as u8)?;
            let name = self.take_string("message name")?;
            let sequence_id = self.take_i32("sequence id")?;
            Ok(TMessage::new(name, message_type, sequence_id))
        } else {
            // old unversioned header: name length was already consumed
            let raw = self.take(header as usize, "message name")?;
            let name = String::from_utf8(raw.to_vec()).map_err(|_| {
                ProtocolError::invalid("message name is not valid UTF-8")
            })?;
            let message_type =
                MessageType::from_wire(self.take_u8("message type")?)?;
            let sequence_id = self.take_i32("sequence id")?;
            Ok(TMessage::new(name, message_type, sequence_id))
        }
    }

    fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_field_begin(
        &mut self,
    ) -> Result<Option<FieldHeader>, ProtocolError> {
        let tag = self.take_u8("field type")?;
        if tag == 0 {
            return Ok(None);
        }
        let ttype = TType::from_wire(tag)?;
        let id = BigEndian::read_i16(self.take(2, "field id")?);
        Ok(Some(FieldHeader { ttype, id }))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.take_u8("bool")? != 0)
    }

    fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.take_u8("i8")? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(BigEndian::read_i16(self.take(2, "i16")?))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take_i32("i32")
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(BigEndian::read_i64(self.take(8, "i64")?))
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(BigEndian::read_f64(self.take(8, "double")?))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.take_string("string")
    }

    fn read_binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.take_len("binary")?;
        Ok(Bytes::copy_from_slice(self.take(len, "binary")?))
    }

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        let element = TType::from_wire(self.take_u8("list element type")?)?;
        let size = self.take_len("list size")?;
        Ok((element, size))
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        let element = TType::from_wire(self.take_u8("set element type")?)?;
        let size = self.take_len("set size")?;
        Ok((element, size))
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_map_begin(
        &mut self,
    ) -> Result<(TType, TType, usize), ProtocolError> {
        let key = TType::from_wire(self.take_u8("map key type")?)?;
        let value = TType::from_wire(self.take_u8("map value type")?)?;
        let size = self.take_len("map size")?;
        Ok((key, value, size))
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn position(&self) -> usize {
        self.consumed
    }
}

/// Encodes the binary protocol into a `BytesMut`.
pub struct BinaryWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> BinaryWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        BinaryWriter { buf }
    }

    fn put_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        if len > i32::max_value() as usize {
            return Err(ProtocolError::invalid(format!(
                "length {} exceeds the i32 wire limit",
                len
            )));
        }
        self.buf.put_i32(len as i32);
        Ok(())
    }
}

impl<'a> ProtocolWriter for BinaryWriter<'a> {
    fn write_message_begin(
        &mut self,
        message: &TMessage,
    ) -> Result<(), ProtocolError> {
        let type_tag = message.message_type.to_u32().unwrap_or(0);
        self.buf.put_u32(VERSION_1 | type_tag);
        self.write_string(&message.name)?;
        self.buf.put_i32(message.sequence_id);
        Ok(())
    }

    fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_field_begin(
        &mut self,
        _name: &str,
        ttype: TType,
        id: i16,
    ) -> Result<(), ProtocolError> {
        self.buf.put_u8(ttype.to_u8().unwrap_or(0));
        self.buf.put_i16(id);
        Ok(())
    }

    fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        self.buf.put_u8(0);
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.buf.put_u8(if value { 1 } else { 0 });
        Ok(())
    }

    fn write_i8(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.buf.put_i8(value);
        Ok(())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.buf.put_i16(value);
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.buf.put_i32(value);
        Ok(())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.buf.put_i64(value);
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.buf.put_f64(value);
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_binary(value.as_bytes())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.put_len(value.len())?;
        self.buf.put_slice(value);
        Ok(())
    }

    fn write_list_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError> {
        self.buf.put_u8(element.to_u8().unwrap_or(0));
        self.put_len(size)
    }

    fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_set_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError> {
        self.buf.put_u8(element.to_u8().unwrap_or(0));
        self.put_len(size)
    }

    fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_map_begin(
        &mut self,
        key: TType,
        value: TType,
        size: usize,
    ) -> Result<(), ProtocolError> {
        self.buf.put_u8(key.to_u8().unwrap_or(0));
        self.buf.put_u8(value.to_u8().unwrap_or(0));
        self.put_len(size)
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::skip;

    fn write_buf() -> BytesMut {
        BytesMut::new()
    }

    #[test]
    fn scalars_round_trip() {
        let mut buf = write_buf();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_bool(true).unwrap();
            w.write_i8(-5).unwrap();
            w.write_i16(-300).unwrap();
            w.write_i32(70_000).unwrap();
            w.write_i64(-5_000_000_000).unwrap();
            w.write_double(6.25).unwrap();
            w.write_string("hello").unwrap();
            w.write_binary(&[0xde, 0xad]).unwrap();
        }

        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_bool().unwrap(), true);
        assert_eq!(r.read_i8().unwrap(), -5);
        assert_eq!(r.read_i16().unwrap(), -300);
        assert_eq!(r.read_i32().unwrap(), 70_000);
        assert_eq!(r.read_i64().unwrap(), -5_000_000_000);
        assert_eq!(r.read_double().unwrap(), 6.25);
        assert_eq!(r.read_string().unwrap(), "hello");
        assert_eq!(r.read_binary().unwrap().as_ref(), &[0xde, 0xad]);
        assert_eq!(r.position(), buf.len());
    }

    #[test]
    fn i32_is_big_endian_fixed_width() {
        let mut buf = write_buf();
        BinaryWriter::new(&mut buf).write_i32(1).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 1]);
    }

    #[test]
    fn strict_message_header_round_trips() {
        let msg = TMessage::new("add", MessageType::Call, 7);
        let mut buf = write_buf();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_message_begin(&msg).unwrap();
            w.write_message_end().unwrap();
        }

        // version word, i32 name length, name bytes, i32 sequence id
        assert_eq!(buf.len(), 4 + 4 + 3 + 4);
        assert_eq!(&buf[..4], &[0x80, 0x01, 0x00, 0x01]);

        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_message_begin().unwrap(), msg);
    }

    #[test]
    fn old_unversioned_message_header_is_accepted() {
        let mut buf = write_buf();
        buf.put_i32(4); // name length
        buf.put_slice(b"ping");
        buf.put_u8(1); // CALL
        buf.put_i32(99);

        let msg = BinaryReader::new(&buf).read_message_begin().unwrap();
        assert_eq!(msg, TMessage::new("ping", MessageType::Call, 99));
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut buf = write_buf();
        buf.put_u32(0x8002_0001);
        buf.put_i32(0);
        buf.put_i32(0);

        match BinaryReader::new(&buf).read_message_begin() {
            Err(ProtocolError::BadVersion(v)) => {
                assert_eq!(v, 0x8002_0001)
            }
            other => panic!("expected BadVersion, got {:?}", other),
        }
    }

    #[test]
    fn truncated_buffer_reports_eof() {
        let mut buf = write_buf();
        BinaryWriter::new(&mut buf).write_i64(42).unwrap();
        let mut r = BinaryReader::new(&buf[..5]);
        assert!(matches!(r.read_i64(), Err(ProtocolError::Eof(_))));
    }

    quickcheck::quickcheck! {
        fn prop_i64_roundtrip(value: i64) -> bool {
            let mut buf = BytesMut::new();
            BinaryWriter::new(&mut buf).write_i64(value).unwrap();
            BinaryReader::new(&buf).read_i64().unwrap() == value
        }

        fn prop_double_roundtrip(value: f64) -> bool {
            let mut buf = BytesMut::new();
            BinaryWriter::new(&mut buf).write_double(value).unwrap();
            let decoded = BinaryReader::new(&buf).read_double().unwrap();
            decoded == value || (decoded.is_nan() && value.is_nan())
        }

        fn prop_string_roundtrip(value: String) -> bool {
            let mut buf = BytesMut::new();
            BinaryWriter::new(&mut buf).write_string(&value).unwrap();
            BinaryReader::new(&buf).read_string().unwrap() == value
        }
    }

    #[test]
    fn skip_consumes_a_nested_struct() {
        let mut buf = write_buf();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_struct_begin("Outer").unwrap();
            w.write_field_begin("inner", TType::Struct, 1).unwrap();
            w.write_struct_begin("Inner").unwrap();
            w.write_field_begin("xs", TType::List, 1).unwrap();
            w.write_list_begin(TType::I32, 3).unwrap();
            for i in 0..3 {
                w.write_i32(i).unwrap();
            }
            w.write_list_end().unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
        }

        let mut r = BinaryReader::new(&buf);
        skip(&mut r, TType::Struct).unwrap();
        assert_eq!(r.position(), buf.len());
    }
}
