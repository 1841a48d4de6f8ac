// Copyright 2026 Joyent, Inc.

//! The abstract Thrift protocol: type tags, the message envelope, and the
//! reader/writer traits the codec engine drives.
//!
//! Concrete encodings live in [`binary`] and [`compact`]; message framing
//! for stream transports lives in [`framing`]. The contents of this module
//! are not needed for normal client or server consumers of this crate, but
//! they are exposed for the special case of someone needing to implement
//! custom protocol handling.

use bytes::BytesMut;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::errors::ProtocolError;

pub mod binary;
pub mod compact;
pub mod framing;

pub use binary::{BinaryReader, BinaryWriter};
pub use compact::{CompactReader, CompactWriter};
pub use framing::{Framing, MessageCodec};

/// The one-byte wire tag identifying a primitive or container category.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    I8 = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    pub(crate) fn from_wire(tag: u8) -> Result<TType, ProtocolError> {
        FromPrimitive::from_u8(tag).ok_or(ProtocolError::UnknownType(tag))
    }
}

/// The message envelope type.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    pub(crate) fn from_wire(tag: u8) -> Result<MessageType, ProtocolError> {
        FromPrimitive::from_u8(tag).ok_or(ProtocolError::UnknownMessageType(tag))
    }
}

/// The message envelope: method name, message type, and the client-chosen
/// sequence id the server echoes verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TMessage {
    pub name: String,
    pub message_type: MessageType,
    pub sequence_id: i32,
}

impl TMessage {
    pub fn new(
        name: impl Into<String>,
        message_type: MessageType,
        sequence_id: i32,
    ) -> Self {
        TMessage {
            name: name.into(),
            message_type,
            sequence_id,
        }
    }
}

/// The header of one struct field on the wire. `read_field_begin` returns
/// `None` instead when it encounters the STOP sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHeader {
    pub ttype: TType,
    pub id: i16,
}

/// Decoding side of a Thrift protocol over an in-memory buffer.
pub trait ProtocolReader {
    fn read_message_begin(&mut self) -> Result<TMessage, ProtocolError>;
    fn read_message_end(&mut self) -> Result<(), ProtocolError>;

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError>;
    fn read_struct_end(&mut self) -> Result<(), ProtocolError>;

    /// Returns `None` when the STOP sentinel terminates the field list.
    fn read_field_begin(&mut self) -> Result<Option<FieldHeader>, ProtocolError>;
    fn read_field_end(&mut self) -> Result<(), ProtocolError>;

    fn read_bool(&mut self) -> Result<bool, ProtocolError>;
    fn read_i8(&mut self) -> Result<i8, ProtocolError>;
    fn read_i16(&mut self) -> Result<i16, ProtocolError>;
    fn read_i32(&mut self) -> Result<i32, ProtocolError>;
    fn read_i64(&mut self) -> Result<i64, ProtocolError>;
    fn read_double(&mut self) -> Result<f64, ProtocolError>;
    fn read_string(&mut self) -> Result<String, ProtocolError>;
    fn read_binary(&mut self) -> Result<bytes::Bytes, ProtocolError>;

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError>;
    fn read_list_end(&mut self) -> Result<(), ProtocolError>;
    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError>;
    fn read_set_end(&mut self) -> Result<(), ProtocolError>;
    fn read_map_begin(&mut self)
        -> Result<(TType, TType, usize), ProtocolError>;
    fn read_map_end(&mut self) -> Result<(), ProtocolError>;

    /// The number of bytes consumed so far. Used by the unframed transport
    /// to locate message boundaries.
    fn position(&self) -> usize;
}

/// Encoding side of a Thrift protocol into an in-memory buffer.
pub trait ProtocolWriter {
    fn write_message_begin(&mut self, message: &TMessage)
        -> Result<(), ProtocolError>;
    fn write_message_end(&mut self) -> Result<(), ProtocolError>;

    fn write_struct_begin(&mut self, name: &str) -> Result<(), ProtocolError>;
    fn write_struct_end(&mut self) -> Result<(), ProtocolError>;

    fn write_field_begin(
        &mut self,
        name: &str,
        ttype: TType,
        id: i16,
    ) -> Result<(), ProtocolError>;
    fn write_field_end(&mut self) -> Result<(), ProtocolError>;
    fn write_field_stop(&mut self) -> Result<(), ProtocolError>;

    fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError>;
    fn write_i8(&mut self, value: i8) -> Result<(), ProtocolError>;
    fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError>;
    fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError>;
    fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError>;
    fn write_double(&mut self, value: f64) -> Result<(), ProtocolError>;
    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError>;
    fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError>;

    fn write_list_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError>;
    fn write_list_end(&mut self) -> Result<(), ProtocolError>;
    fn write_set_begin(
        &mut self,
        element: TType,
        size: usize,
    ) -> Result<(), ProtocolError>;
    fn write_set_end(&mut self) -> Result<(), ProtocolError>;
    fn write_map_begin(
        &mut self,
        key: TType,
        value: TType,
        size: usize,
    ) -> Result<(), ProtocolError>;
    fn write_map_end(&mut self) -> Result<(), ProtocolError>;
}

/// Consume one well-formed value of the given type. This is the only
/// recoverable operation on unknown fields: it discards nested structs,
/// containers, and scalars alike.
pub fn skip(
    reader: &mut dyn ProtocolReader,
    ttype: TType,
) -> Result<(), ProtocolError> {
    match ttype {
        TType::Bool => reader.read_bool().map(|_| ()),
        TType::I8 => reader.read_i8().map(|_| ()),
        TType::I16 => reader.read_i16().map(|_| ()),
        TType::I32 => reader.read_i32().map(|_| ()),
        TType::I64 => reader.read_i64().map(|_| ()),
        TType::Double => reader.read_double().map(|_| ()),
        TType::String => reader.read_binary().map(|_| ()),
        TType::Struct => {
            reader.read_struct_begin()?;
            while let Some(header) = reader.read_field_begin()? {
                skip(reader, header.ttype)?;
                reader.read_field_end()?;
            }
            reader.read_struct_end()
        }
        TType::List => {
            let (element, size) = reader.read_list_begin()?;
            for _ in 0..size {
                skip(reader, element)?;
            }
            reader.read_list_end()
        }
        TType::Set => {
            let (element, size) = reader.read_set_begin()?;
            for _ in 0..size {
                skip(reader, element)?;
            }
            reader.read_set_end()
        }
        TType::Map => {
            let (key, value, size) = reader.read_map_begin()?;
            for _ in 0..size {
                skip(reader, key)?;
                skip(reader, value)?;
            }
            reader.read_map_end()
        }
        TType::Stop | TType::Void => Err(ProtocolError::invalid(format!(
            "cannot skip a value of type {:?}",
            ttype
        ))),
    }
}

/// Selects which concrete protocol a connection speaks. The two encodings
/// are never mixed on one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Binary,
    Compact,
}

impl ProtocolKind {
    /// A reader decoding from `buf`.
    pub fn reader<'a>(&self, buf: &'a [u8]) -> Box<dyn ProtocolReader + 'a> {
        match self {
            ProtocolKind::Binary => Box::new(BinaryReader::new(buf)),
            ProtocolKind::Compact => Box::new(CompactReader::new(buf)),
        }
    }

    /// A writer appending to `buf`.
    pub fn writer<'a>(
        &self,
        buf: &'a mut BytesMut,
    ) -> Box<dyn ProtocolWriter + 'a> {
        match self {
            ProtocolKind::Binary => Box::new(BinaryWriter::new(buf)),
            ProtocolKind::Compact => Box::new(CompactWriter::new(buf)),
        }
    }
}
