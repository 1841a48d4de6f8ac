// Copyright 2026 Joyent, Inc.

//! The Thrift Compact Protocol: zig-zag varints for signed integers,
//! field-id deltas, bools folded into the field header, and short-form
//! container headers.
//!
//! Doubles are written little-endian, matching the Java implementation
//! this protocol must interoperate with.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use num_traits::ToPrimitive;

use crate::errors::ProtocolError;
use crate::protocol::{
    FieldHeader, MessageType, ProtocolReader, ProtocolWriter, TMessage, TType,
};

const PROTOCOL_ID: u8 = 0x82;
const VERSION: u8 = 1;
const VERSION_MASK: u8 = 0x1f;
const TYPE_SHIFT: u8 = 5;

// compact field/element type tags
const CT_BOOLEAN_TRUE: u8 = 0x01;
const CT_BOOLEAN_FALSE: u8 = 0x02;
const CT_BYTE: u8 = 0x03;
const CT_I16: u8 = 0x04;
const CT_I32: u8 = 0x05;
const CT_I64: u8 = 0x06;
const CT_DOUBLE: u8 = 0x07;
const CT_BINARY: u8 = 0x08;
const CT_LIST: u8 = 0x09;
const CT_SET: u8 = 0x0a;
const CT_MAP: u8 = 0x0b;
const CT_STRUCT: u8 = 0x0c;

fn compact_type(ttype: TType) -> u8 {
    match ttype {
        TType::Bool => CT_BOOLEAN_TRUE,
        TType::I8 => CT_BYTE,
        TType::I16 => CT_I16,
        TType::I32 => CT_I32,
        TType::I64 => CT_I64,
        TType::Double => CT_DOUBLE,
        TType::String => CT_BINARY,
        TType::List => CT_LIST,
        TType::Set => CT_SET,
        TType::Map => CT_MAP,
        TType::Struct => CT_STRUCT,
        TType::Stop | TType::Void => 0,
    }
}

fn element_type(tag: u8) -> Result<TType, ProtocolError> {
    match tag {
        CT_BOOLEAN_TRUE | CT_BOOLEAN_FALSE => Ok(TType::Bool),
        CT_BYTE => Ok(TType::I8),
        CT_I16 => Ok(TType::I16),
        CT_I32 => Ok(TType::I32),
        CT_I64 => Ok(TType::I64),
        CT_DOUBLE => Ok(TType::Double),
        CT_BINARY => Ok(TType::String),
        CT_LIST => Ok(TType::List),
        CT_SET => Ok(TType::Set),
        CT_MAP => Ok(TType::Map),
        CT_STRUCT => Ok(TType::Struct),
        other => Err(ProtocolError::UnknownType(other)),
    }
}

fn zigzag_encode_32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn zigzag_decode_32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn zigzag_encode_64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Decodes the compact protocol from a byte slice.
pub struct CompactReader<'a> {
    buf: &'a [u8],
    consumed: usize,
    last_field_id: i16,
    field_id_stack: Vec<i16>,
    pending_bool: Option<bool>,
}

impl<'a> CompactReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        CompactReader {
            buf,
            consumed: 0,
            last_field_id: 0,
            field_id_stack: Vec::new(),
            pending_bool: None,
        }
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

    fn take_varint_u64(
        &mut self,
        what: &'static str,
    ) -> Result<u64, ProtocolError> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.take_u8(what)?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(ProtocolError::invalid(format!(
                    "varint for {} is longer than 10 bytes",
                    what
                )));
            }
        }
    }

    fn take_varint_u32(
        &mut self,
        what: &'static str,
    ) -> Result<u32, ProtocolError> {
        let wide = self.take_varint_u64(what)?;
        if wide > u64::from(u32::max_value()) {
            return Err(ProtocolError::invalid(format!(
                "varint for {} overflows u32",
                what
            )));
        }
        Ok(wide as u32)
    }

    fn take_string(
        &mut self,
        what: &'static str,
    ) -> Result<String, ProtocolError> {
        let len = self.take_varint_u32(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ProtocolError::invalid("string is not valid UTF-8"))
    }

    fn take_collection_header(
        &mut self,
        what: &'static str,
    ) -> Result<(TType, usize), ProtocolError> {
        let header = self.take_u8(what)?;
        let element = element_type(header & 0x0f)?;
        let short_size = (header >> 4) & 0x0f;
        let size = if short_size == 0x0f {
            self.take_varint_u32(what)? as usize
        } else {
            short_size as usize
        };
        Ok((element, size))
    }
}

impl<'a> ProtocolReader for CompactReader<'a> {
    fn read_message_begin(&mut self) -> Result<TMessage, ProtocolError> {
        let protocol_id = self.take_u8("protocol id")?;
        if protocol_id != PROTOCOL_ID {
            return Err(ProtocolError::BadVersion(u32::from(protocol_id)));
        }
        let version_and_type = self.take_u8("version")?;
        if version_and_type & VERSION_MASK != VERSION {
            return Err(ProtocolError::BadVersion(u32::from(version_and_type)));
        }
        let message_type =
            MessageType::from_wire((version_and_type >> TYPE_SHIFT) & 0x07)?;
        let sequence_id = self.take_varint_u32("sequence id")? as i32;
        let name = self.take_string("message name")?;
        Ok(TMessage::new(name, message_type, sequence_id))
    }

    fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().ok_or_else(|| {
            ProtocolError::invalid("unbalanced struct end")
        })?;
        Ok(())
    }

    fn read_field_begin(
        &mut self,
    ) -> Result<Option<FieldHeader>, ProtocolError> {
        let header = self.take_u8("field header")?;
        if header == 0 {
            return Ok(None);
        }

        let tag = header & 0x0f;
        let delta = (header >> 4) & 0x0f;
        let id = if delta == 0 {
            zigzag_decode_32(self.take_varint_u32("field id")?) as i16
        } else {
            self.last_field_id + i16::from(delta)
        };
        self.last_field_id = id;

        if tag == CT_BOOLEAN_TRUE || tag == CT_BOOLEAN_FALSE {
            self.pending_bool = Some(tag == CT_BOOLEAN_TRUE);
        }

        Ok(Some(FieldHeader {
            ttype: element_type(tag)?,
            id,
        }))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        if let Some(value) = self.pending_bool.take() {
            return Ok(value);
        }
        Ok(self.take_u8("bool")? == CT_BOOLEAN_TRUE)
    }

    fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.take_u8("i8")? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(zigzag_decode_32(self.take_varint_u32("i16")?) as i16)
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(zigzag_decode_32(self.take_varint_u32("i32")?))
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(zigzag_decode_64(self.take_varint_u64("i64")?))
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(LittleEndian::read_f64(self.take(8, "double")?))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.take_string("string")
    }

    fn read_binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.take_varint_u32("binary")? as usize;
        Ok(Bytes::copy_from_slice(self.take(len, "binary")?))
    }

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        self.take_collection_header("list header")
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        self.take_collection_header("set header")
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_map_begin(
        &mut self,
    ) -> Result<(TType, TType, usize), ProtocolError> {
        let size = self.take_varint_u32("map size")? as usize;
        if size == 0 {
            return Ok((TType::Stop, TType::Stop, 0));
        }
        let types = self.take_u8("map types")?;
        let key = element_type((types >> 4) & 0x0f)?;
        let value = element_type(types & 0x0f)?;
        Ok((key, value, size))
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn position(&self) -> usize {
        self.consumed
    }
}

/// Encodes the compact protocol into a `BytesMut`.
pub struct CompactWriter<'a> {
    buf: &'a mut BytesMut,
    last_field_id: i16,
    field_id_stack: Vec<i16>,
    pending_bool_field: Option<i16>,
}

impl<'a> CompactWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        CompactWriter {
            buf,
            last_field_id: 0,
            field_id_stack: Vec::new(),
            pending_bool_field: None,
        }
    }

    fn put_varint_u64(&mut self, mut value: u64) {
        loop {
            if value & !0x7f == 0 {
                self.buf.put_u8(value as u8);
                return;
            }
            self.buf.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
    }

    fn put_varint_u32(&mut self, value: u32) {
        self.put_varint_u64(u64::from(value));
    }

    fn put_field_header(&mut self, tag: u8, id: i16) {
        let delta = i32::from(id) - i32::from(self.last_field_id);
        if delta > 0 && delta <= 15 {
            self.buf.put_u8(((delta as u8) << 4) | tag);
        } else {
            self.buf.put_u8(tag);
            self.put_varint_u32(zigzag_encode_32(i32::from(id)));
        }
        self.last_field_id = id;
    }
}

impl<'a> ProtocolWriter for CompactWriter<'a> {
    fn write_message_begin(
        &mut self,
        message: &TMessage,
    ) -> Result<(), ProtocolError> {
        let type_tag = message.message_type.to_u8().unwrap_or(0);
        self.buf.put_u8(PROTOCOL_ID);
        self.buf
            .put_u8((VERSION & VERSION_MASK) | (type_tag << TYPE_SHIFT));
        self.put_varint_u32(message.sequence_id as u32);
        self.write_string(&message.name)
    }

    fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().ok_or_else(|| {
            ProtocolError::invalid("unbalanced struct end")
        })?;
        Ok(())
    }

    fn write_field_begin(
        &mut self,
        _name: &str,
        ttype: TType,
        id: i16,
    ) -> Result<(), ProtocolError> {
        if ttype == TType::Bool {
            // folded into the header; emitted by the following write_bool
            self.pending_bool_field = Some(id);
        } else {
            self.put_field_header(compact_type(ttype), id);
        }
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
        let tag = if value { CT_BOOLEAN_TRUE } else { CT_BOOLEAN_FALSE };
        match self.pending_bool_field.take() {
            Some(id) => self.put_field_header(tag, id),
            None => self.buf.put_u8(tag),
        }
        Ok(())
    }

    fn write_i8(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.buf.put_i8(value);
        Ok(())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.put_varint_u32(zigzag_encode_32(i32::from(value)));
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.put_varint_u32(zigzag_encode_32(value));
        Ok(())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.put_varint_u64(zigzag_encode_64(value));
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        let mut raw = [0u8; 8];
        LittleEndian::write_f64(&mut raw, value);
        self.buf.put_slice(&raw);
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_binary(value.as_bytes())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        if value.len() > u32::max_value() as usize {
            return Err(ProtocolError::invalid("binary exceeds the u32 limit"));
        }
        self.put_varint_u32(value.len() as u32);
        self.buf.put_slice(value);
        Ok(())
    }

    fn write_list_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError> {
        let tag = compact_type(element);
        if size < 15 {
            self.buf.put_u8(((size as u8) << 4) | tag);
        } else {
            self.buf.put_u8(0xf0 | tag);
            self.put_varint_u32(size as u32);
        }
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_set_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError> {
        self.write_list_begin(element, size)
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
        self.put_varint_u32(size as u32);
        if size > 0 {
            self.buf
                .put_u8((compact_type(key) << 4) | compact_type(value));
        }
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}
