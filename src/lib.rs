// Copyright 2026 Joyent, Inc.

//! thrift-rpc: a Thrift codec and RPC runtime
//!
//! This crate converts between in-memory values and the Apache Thrift wire
//! encoding (binary and compact), and dispatches remote method calls over
//! framed or unframed TCP transports.
//!
//! Protocol overview
//!
//! Communication between client and server consists of discrete _messages_
//! sent over the connection. Every message carries an envelope:
//!
//! * NAME     the method being invoked
//!
//! * TYPE     one of:
//!
//!     * CALL       0x1  a two-way request from a client
//!
//!     * REPLY      0x2  the server's answer, carrying the method's
//!                       `_result` struct
//!
//!     * EXCEPTION  0x3  the server's answer when the call failed outside
//!                       the method's declared contract
//!
//!     * ONEWAY     0x4  a request the client sends without reading a
//!                       reply
//!
//! * SEQID    a client-chosen `i32` echoed verbatim by the server, used to
//!            correlate replies
//!
//! The message body is always a single struct. A struct on the wire is a
//! sequence of fields, each tagged `(type, id)`, terminated by a STOP
//! byte; a reader that encounters a field id it does not know simply
//! skips that value, which is what makes Thrift schemas evolvable. A
//! request body is the synthetic `<method>_args` struct holding the
//! parameters at their field ids. A reply body is the synthetic
//! `<method>_result` struct: field id 0 carries the return value, and
//! each declared exception is carried at its assigned field id.
//!
//! Two encodings of this model are provided:
//!
//! | Encoding  | Integers                | Strings/containers                  |
//! | --------- | ----------------------- | ----------------------------------- |
//! | `binary`  | fixed-width, big-endian | `i32` length/size prefixes          |
//! | `compact` | zig-zag varints         | varint prefixes, short-form headers |
//!
//! The two are never mixed on one connection. On top of either encoding a
//! connection speaks one of two framings: `framed`, where every message
//! is preceded by a big-endian `i32` byte length, or `unframed`, where
//! message boundaries are discovered by parsing.
//!
//! What lives where
//!
//! * [`metadata`] describes user types to the runtime: thrift types, field
//!   tables, construction plans, enums, methods, and the memoizing
//!   catalog that ties recursive types together.
//! * [`codec`] turns those descriptors into codecs over
//!   [`value::ThriftValue`] and drives the generic struct read/write
//!   algorithms.
//! * [`protocol`] implements the two wire encodings and the framing
//!   codec.
//! * [`client`] and [`server`] frame method calls as messages: sequence
//!   ids, oneway semantics, declared-exception routing, and application
//!   exceptions.
//! * [`context`] lets event handlers observe every call a server
//!   processes.

#![allow(missing_docs)]

pub mod client;
pub mod codec;
pub mod context;
pub mod errors;
pub mod metadata;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod value;

pub use client::{
    ClientConfig, MethodHandler, RequestChannel, SequenceId, TcpChannel,
    ThriftClient,
};
pub use codec::{CodecRegistry, ThriftCodec};
pub use errors::{
    ApplicationErrorKind, ApplicationException, Error, HandlerError,
    MetadataError, ProtocolError, TransportError,
};
pub use metadata::{
    EnumMetadata, FieldMetadata, MethodMetadata, Requiredness, StructCategory,
    StructMetadata, ThriftType, TypeCatalog,
};
pub use protocol::{Framing, ProtocolKind};
pub use server::{
    serve_connection, HandlerFn, MethodProcessor, ServerConfig,
    ServiceProcessor,
};
pub use value::{StructValue, ThriftValue};
