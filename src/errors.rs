// Copyright 2026 Joyent, Inc.

//! Error types shared by the codec and RPC layers.
//!
//! The crate distinguishes four failure domains: metadata construction
//! (`MetadataError`), wire-format violations (`ProtocolError`), the standard
//! Thrift application exception (`ApplicationException`, which crosses the
//! wire in EXCEPTION messages), and transport failures (`TransportError`).
//! Exceptions declared on a service method are not errors in this sense;
//! they travel as values inside the `_result` struct and surface on the
//! client as [`Error::Declared`].

use std::io;
use std::time::Duration;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use thiserror::Error;

use crate::protocol::{ProtocolReader, ProtocolWriter, TType};
use crate::value::ThriftValue;

/// The category of a metadata construction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataErrorKind {
    /// Two fields in one struct declared the same id.
    DuplicateFieldId,
    /// Two fields in one struct declared the same name.
    DuplicateFieldName,
    /// A field id was negative (only the union discriminator sentinel may be).
    InvalidFieldId,
    /// A designated constructor referenced a parameter that is not a
    /// declared field.
    UnknownConstructorParameter,
    /// More than one constructor was marked as designated.
    MultipleConstructors,
    /// Two declared exceptions share a field id, or an id could not be
    /// inferred.
    InvalidExceptionId,
    /// A type reference could not be resolved to completed metadata.
    UnresolvedType,
    /// The referenced type is not of the expected category.
    InvalidTypeCategory,
}

/// A malformed user type description.
#[derive(Debug, Clone, Error)]
#[error("invalid thrift metadata for {type_ident}: {message}")]
pub struct MetadataError {
    pub kind: MetadataErrorKind,
    pub type_ident: String,
    pub message: String,
}

impl MetadataError {
    pub fn new(
        kind: MetadataErrorKind,
        type_ident: &str,
        message: impl Into<String>,
    ) -> Self {
        MetadataError {
            kind,
            type_ident: String::from(type_ident),
            message: message.into(),
        }
    }
}

/// A violation of the Thrift wire format or of the struct contract it
/// carries.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The buffer ended before a complete value could be read. The payload
    /// names the element being read when the bytes ran out.
    #[error("not enough bytes while reading {0}")]
    Eof(&'static str),

    /// The message header carried an unrecognized protocol version.
    #[error("unrecognized protocol version {0:#010x}")]
    BadVersion(u32),

    /// An unknown primitive type tag appeared on the wire.
    #[error("unknown thrift type tag {0}")]
    UnknownType(u8),

    /// The message envelope carried an unknown message type.
    #[error("unknown thrift message type {0}")]
    UnknownMessageType(u8),

    /// A field declared REQUIRED was absent from the wire.
    #[error("required field {name} (id {id}) was not set")]
    MissingRequiredField { id: i16, name: String },

    /// A union carried zero or more than one value.
    #[error("union {name} must have exactly one value, found {count}")]
    UnionCardinality { name: String, count: usize },

    /// An enum value had no corresponding constant.
    #[error("enum {name} does not have a value for {value}")]
    UnknownEnumValue { name: String, value: i32 },

    /// A container header declared an element type other than the one the
    /// codec was built for.
    #[error("expected {expected:?} elements, wire declared {actual:?}")]
    UnexpectedElementType { expected: TType, actual: TType },

    /// Anything else that makes the data unusable: bad UTF-8, negative
    /// lengths, a value that does not match the codec driving it.
    #[error("{0}")]
    InvalidData(String),
}

impl ProtocolError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ProtocolError::InvalidData(message.into())
    }
}

/// The kind carried by a `TApplicationException`, numbered as Apache Thrift
/// numbers them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ApplicationErrorKind {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
}

/// The standard Thrift application exception. Servers transmit it in
/// EXCEPTION messages; clients decode it and raise it to the caller.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct ApplicationException {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationException {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        ApplicationException {
            kind,
            message: message.into(),
        }
    }

    /// Decode the exception from the standard two-field wire struct.
    pub fn read(
        reader: &mut dyn ProtocolReader,
    ) -> Result<ApplicationException, ProtocolError> {
        let mut message = String::new();
        let mut kind = ApplicationErrorKind::Unknown;

        reader.read_struct_begin()?;
        while let Some(header) = reader.read_field_begin()? {
            match (header.id, header.ttype) {
                (1, TType::String) => message = reader.read_string()?,
                (2, TType::I32) => {
                    kind = FromPrimitive::from_i32(reader.read_i32()?)
                        .unwrap_or(ApplicationErrorKind::Unknown);
                }
                (_, ttype) => crate::protocol::skip(reader, ttype)?,
            }
            reader.read_field_end()?;
        }
        reader.read_struct_end()?;

        Ok(ApplicationException { kind, message })
    }

    /// Encode the exception as the standard two-field wire struct.
    pub fn write(
        &self,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        writer.write_struct_begin("TApplicationException")?;
        writer.write_field_begin("message", TType::String, 1)?;
        writer.write_string(&self.message)?;
        writer.write_field_end()?;
        writer.write_field_begin("type", TType::I32, 2)?;
        // to_i32 is total for this enum
        writer.write_i32(self.kind.to_i32().unwrap_or(0))?;
        writer.write_field_end()?;
        writer.write_field_stop()?;
        writer.write_struct_end()?;
        Ok(())
    }
}

/// A failure at the byte-transport layer: connect, read, write, or the
/// peer going away.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("connection closed")]
    Closed,
}

/// An error raised by a service handler. Declared exceptions carry the
/// exception struct name so the processor can route them to the matching
/// `_result` field; anything else becomes an internal-error EXCEPTION reply.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler threw {type_name}")]
    Thrown {
        type_name: String,
        value: ThriftValue,
    },

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// A declared exception: `type_name` must match the struct name of one
    /// of the method's declared exception types.
    pub fn thrown(type_name: &str, value: ThriftValue) -> Self {
        HandlerError::Thrown {
            type_name: String::from(type_name),
            value,
        }
    }
}

/// Umbrella error for calls through the RPC layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Application(#[from] ApplicationException),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An exception declared on the method, decoded from its `_result`
    /// field. The value is the exception struct as sent by the server.
    #[error("declared exception (result field id {id})")]
    Declared { id: i16, value: ThriftValue },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn application_error_kind_wire_values() {
        assert_eq!(ApplicationErrorKind::UnknownMethod.to_i32(), Some(1));
        assert_eq!(ApplicationErrorKind::BadSequenceId.to_i32(), Some(4));
        assert_eq!(
            <ApplicationErrorKind as FromPrimitive>::from_i32(7),
            Some(ApplicationErrorKind::ProtocolError)
        );
        assert_eq!(<ApplicationErrorKind as FromPrimitive>::from_i32(42), None);
    }

    #[test]
    fn metadata_error_display_names_the_type() {
        let err = MetadataError::new(
            MetadataErrorKind::DuplicateFieldId,
            "Bonk",
            "field id 1 declared twice",
        );
        let text = err.to_string();
        assert!(text.contains("Bonk"));
        assert!(text.contains("field id 1"));
    }
}
