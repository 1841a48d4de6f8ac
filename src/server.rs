// Copyright 2026 Joyent, Inc.

//! This module provides the interface for creating Thrift servers.
//!
//! A [`MethodProcessor`] decodes one method's `_args` struct, invokes the
//! handler, and encodes the `_result` (or EXCEPTION) envelope. A
//! [`ServiceProcessor`] routes incoming messages to processors by method
//! name and drives the event-handler chain; [`serve_connection`] runs one
//! framed connection against it until the peer goes away or the stream
//! becomes unusable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use slog::{debug, error, o, Drain, Logger};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::client::check_exception_type;
use crate::codec::{CodecRegistry, ThriftCodec};
use crate::context::{ContextChain, ThriftEventHandler};
use crate::errors::{
    ApplicationErrorKind, ApplicationException, Error, HandlerError,
    MetadataError,
};
use crate::metadata::{MethodMetadata, ThriftType};
use crate::protocol::{
    skip, Framing, MessageCodec, MessageType, ProtocolKind, ProtocolReader,
    ProtocolWriter, TMessage, TType,
};
use crate::stats::MethodStats;
use crate::value::ThriftValue;

/// A service method implementation. Arguments arrive in declared
/// parameter order; parameters missing from the wire are `None`. Declared
/// exceptions are returned as [`HandlerError::Thrown`]; anything else
/// becomes an internal-error EXCEPTION reply. Handlers are shared across
/// connections and must be safe for concurrent calls.
pub type HandlerFn = Box<
    dyn Fn(Vec<Option<ThriftValue>>) -> Result<Option<ThriftValue>, HandlerError>
        + Send
        + Sync,
>;

struct ParameterCodec {
    id: i16,
    index: usize,
    wire_type: TType,
    codec: Arc<dyn ThriftCodec>,
}

struct ExceptionProcessor {
    id: i16,
    codec: Arc<dyn ThriftCodec>,
}

/// Server-side framing of one service method.
pub struct MethodProcessor {
    name: String,
    qualified_name: String,
    result_struct_name: String,
    parameters: Vec<ParameterCodec>,
    success: Option<Arc<dyn ThriftCodec>>,
    success_wire: Option<TType>,
    exceptions: HashMap<String, ExceptionProcessor>,
    oneway: bool,
    handler: HandlerFn,
    stats: Arc<MethodStats>,
}

impl MethodProcessor {
    pub fn new(
        metadata: &MethodMetadata,
        registry: &CodecRegistry,
        handler: HandlerFn,
    ) -> Result<MethodProcessor, MetadataError> {
        let mut parameters = Vec::with_capacity(metadata.parameters().len());
        for (index, parameter) in metadata.parameters().iter().enumerate() {
            parameters.push(ParameterCodec {
                id: parameter.id,
                index,
                wire_type: parameter.ttype.wire_type(),
                codec: registry.codec_for(&parameter.ttype)?,
            });
        }

        // exception codecs are keyed by the user exception type so a
        // thrown exception routes to its declared result field
        let mut exceptions = HashMap::new();
        for (id, ttype) in metadata.exceptions() {
            check_exception_type(registry, ttype)?;
            let type_name = match ttype {
                ThriftType::Struct(handle) => String::from(handle.ident()),
                _ => unreachable!("checked above"),
            };
            exceptions.insert(
                type_name,
                ExceptionProcessor {
                    id: *id,
                    codec: registry.codec_for(ttype)?,
                },
            );
        }

        let (success, success_wire) = match metadata.return_type() {
            ThriftType::Void => (None, None),
            ttype => (
                Some(registry.codec_for(ttype)?),
                Some(ttype.wire_type()),
            ),
        };

        Ok(MethodProcessor {
            name: String::from(metadata.name()),
            qualified_name: String::from(metadata.qualified_name()),
            result_struct_name: format!("{}_result", metadata.name()),
            parameters,
            success,
            success_wire,
            exceptions,
            oneway: metadata.oneway(),
            handler,
            stats: Arc::new(MethodStats::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn oneway(&self) -> bool {
        self.oneway
    }

    pub fn stats(&self) -> &Arc<MethodStats> {
        &self.stats
    }

    /// Process one call whose `_args` struct is next in `reader`. Returns
    /// the encoded response, or `None` when the request was oneway. A
    /// protocol failure while decoding arguments is returned as an error
    /// so the caller can decide whether the transport survives it.
    pub fn process(
        &self,
        reader: &mut dyn ProtocolReader,
        protocol: ProtocolKind,
        sequence_id: i32,
        oneway_request: bool,
        chain: &mut ContextChain,
    ) -> Result<Option<BytesMut>, Error> {
        self.stats.add_invocation();
        let oneway = self.oneway || oneway_request;

        chain.pre_read();
        let read_start = Instant::now();
        let args = self.read_arguments(reader)?;
        self.stats.add_read_time(read_start.elapsed());
        chain.post_read(&args);

        let invoke_start = Instant::now();
        let outcome = (self.handler)(args);
        self.stats.add_invoke_time(invoke_start.elapsed());

        match outcome {
            Ok(result) => {
                self.stats.add_success();
                if oneway {
                    return Ok(None);
                }
                chain.pre_write(result.as_ref());
                let write_start = Instant::now();
                let buffer = self.write_result(protocol, sequence_id, &result)?;
                self.stats.add_write_time(write_start.elapsed());
                chain.post_write(result.as_ref());
                Ok(Some(buffer))
            }
            Err(HandlerError::Thrown { type_name, value }) => {
                self.stats.add_error();
                match self.exceptions.get(&type_name) {
                    Some(exception) if !oneway => {
                        let thrown = HandlerError::Thrown {
                            type_name: type_name.clone(),
                            value: value.clone(),
                        };
                        chain.pre_write_exception(&thrown);
                        let buffer = self.write_exception_result(
                            protocol,
                            sequence_id,
                            exception,
                            &value,
                        )?;
                        chain.post_write_exception(&thrown);
                        Ok(Some(buffer))
                    }
                    Some(_) => Ok(None),
                    None => {
                        // not a declared exception type for this method
                        self.unexpected_failure(
                            protocol,
                            sequence_id,
                            oneway,
                            chain,
                            format!(
                                "undeclared exception {} thrown by {}",
                                type_name, self.name
                            ),
                        )
                    }
                }
            }
            Err(HandlerError::Internal(message)) => {
                self.stats.add_error();
                self.unexpected_failure(
                    protocol,
                    sequence_id,
                    oneway,
                    chain,
                    format!(
                        "internal error processing {}: {}",
                        self.name, message
                    ),
                )
            }
        }
    }

    fn unexpected_failure(
        &self,
        protocol: ProtocolKind,
        sequence_id: i32,
        oneway: bool,
        chain: &mut ContextChain,
        message: String,
    ) -> Result<Option<BytesMut>, Error> {
        let exception = ApplicationException::new(
            ApplicationErrorKind::InternalError,
            message,
        );
        if oneway {
            return Ok(None);
        }
        chain.pre_write_exception(&exception);
        let buffer = write_application_exception(
            protocol,
            &self.name,
            sequence_id,
            &exception,
        )?;
        chain.post_write_exception(&exception);
        Ok(Some(buffer))
    }

    fn read_arguments(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<Vec<Option<ThriftValue>>, Error> {
        let mut args: Vec<Option<ThriftValue>> =
            self.parameters.iter().map(|_| None).collect();

        reader.read_struct_begin()?;
        while let Some(header) = reader.read_field_begin()? {
            match self.parameters.iter().find(|p| p.id == header.id) {
                None => skip(reader, header.ttype)?,
                Some(parameter) if parameter.wire_type != header.ttype => {
                    skip(reader, header.ttype)?
                }
                Some(parameter) => {
                    args[parameter.index] =
                        Some(parameter.codec.read(reader)?);
                }
            }
            reader.read_field_end()?;
        }
        reader.read_struct_end()?;

        Ok(args)
    }

    fn write_result(
        &self,
        protocol: ProtocolKind,
        sequence_id: i32,
        result: &Option<ThriftValue>,
    ) -> Result<BytesMut, Error> {
        let mut buffer = BytesMut::new();
        let mut writer = protocol.writer(&mut buffer);
        writer.write_message_begin(&TMessage::new(
            self.name.clone(),
            MessageType::Reply,
            sequence_id,
        ))?;
        writer.write_struct_begin(&self.result_struct_name)?;
        if let (Some(codec), Some(wire), Some(value)) =
            (&self.success, self.success_wire, result.as_ref())
        {
            writer.write_field_begin("success", wire, 0)?;
            codec.write(value, writer.as_mut())?;
            writer.write_field_end()?;
        }
        writer.write_field_stop()?;
        writer.write_struct_end()?;
        writer.write_message_end()?;
        drop(writer);
        Ok(buffer)
    }

    fn write_exception_result(
        &self,
        protocol: ProtocolKind,
        sequence_id: i32,
        exception: &ExceptionProcessor,
        value: &ThriftValue,
    ) -> Result<BytesMut, Error> {
        let mut buffer = BytesMut::new();
        let mut writer = protocol.writer(&mut buffer);
        writer.write_message_begin(&TMessage::new(
            self.name.clone(),
            MessageType::Reply,
            sequence_id,
        ))?;
        writer.write_struct_begin(&self.result_struct_name)?;
        writer.write_field_begin("exception", TType::Struct, exception.id)?;
        exception.codec.write(value, writer.as_mut())?;
        writer.write_field_end()?;
        writer.write_field_stop()?;
        writer.write_struct_end()?;
        writer.write_message_end()?;
        drop(writer);
        Ok(buffer)
    }
}

/// Encode an EXCEPTION message carrying a `TApplicationException`.
fn write_application_exception(
    protocol: ProtocolKind,
    method: &str,
    sequence_id: i32,
    exception: &ApplicationException,
) -> Result<BytesMut, Error> {
    let mut buffer = BytesMut::new();
    let mut writer = protocol.writer(&mut buffer);
    writer.write_message_begin(&TMessage::new(
        method,
        MessageType::Exception,
        sequence_id,
    ))?;
    exception.write(writer.as_mut())?;
    writer.write_message_end()?;
    drop(writer);
    Ok(buffer)
}

/// Server-side connection settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub protocol: ProtocolKind,
    pub framing: Framing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            protocol: ProtocolKind::Binary,
            framing: Framing::Framed,
        }
    }
}

impl ServerConfig {
    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

/// Routes messages to method processors and fans events out to the
/// registered handlers. Shared across connections.
#[derive(Default)]
pub struct ServiceProcessor {
    methods: HashMap<String, MethodProcessor>,
    event_handlers: Vec<Arc<dyn ThriftEventHandler>>,
}

impl ServiceProcessor {
    pub fn new() -> Self {
        ServiceProcessor::default()
    }

    pub fn method(mut self, processor: MethodProcessor) -> Self {
        self.methods
            .insert(String::from(processor.name()), processor);
        self
    }

    pub fn event_handler(
        mut self,
        handler: Arc<dyn ThriftEventHandler>,
    ) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn method_processor(&self, name: &str) -> Option<&MethodProcessor> {
        self.methods.get(name)
    }

    /// Process one complete request message. Returns the encoded response
    /// (`None` for oneway requests) or an error that must tear the
    /// connection down.
    pub fn process(
        &self,
        protocol: ProtocolKind,
        framing: Framing,
        request: &[u8],
    ) -> Result<Option<BytesMut>, Error> {
        let mut reader = protocol.reader(request);
        let message = reader.read_message_begin()?;
        let oneway_request = message.message_type == MessageType::Oneway;

        let method = match self.methods.get(&message.name) {
            Some(method) => method,
            None => {
                if oneway_request {
                    return Ok(None);
                }
                let exception = ApplicationException::new(
                    ApplicationErrorKind::UnknownMethod,
                    format!("invalid method name: '{}'", message.name),
                );
                return write_application_exception(
                    protocol,
                    &message.name,
                    message.sequence_id,
                    &exception,
                )
                .map(Some);
            }
        };

        let mut chain =
            ContextChain::new(&self.event_handlers, method.qualified_name());
        let outcome = method.process(
            reader.as_mut(),
            protocol,
            message.sequence_id,
            oneway_request,
            &mut chain,
        );
        chain.done();

        match outcome {
            Ok(response) => Ok(response),
            // a protocol failure while decoding arguments is recoverable
            // only when framing preserves message boundaries; an unframed
            // stream may be left mid-message and must be torn down
            Err(Error::Protocol(err)) if framing == Framing::Framed => {
                if oneway_request {
                    return Ok(None);
                }
                let exception = ApplicationException::new(
                    ApplicationErrorKind::ProtocolError,
                    err.to_string(),
                );
                write_application_exception(
                    protocol,
                    &message.name,
                    message.sequence_id,
                    &exception,
                )
                .map(Some)
            }
            Err(err) => Err(err),
        }
    }
}

/// Create a task to be used by the tokio runtime for handling one server
/// connection. The task completes when the client disconnects or the
/// connection becomes unusable.
pub async fn serve_connection(
    socket: TcpStream,
    processor: Arc<ServiceProcessor>,
    config: ServerConfig,
    log: Option<&Logger>,
) {
    // If no logger was provided use the slog StdLog drain by default
    let log = log
        .cloned()
        .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

    let mut framed = Framed::new(
        socket,
        MessageCodec::new(config.protocol, config.framing),
    );

    while let Some(frame) = framed.next().await {
        let request = match frame {
            Ok(request) => request,
            Err(err) => {
                error!(log, "failed to decode request"; "err" => %err);
                break;
            }
        };

        debug!(log, "processing thrift message");
        match processor.process(config.protocol, config.framing, &request) {
            Ok(Some(response)) => {
                if let Err(err) = framed.send(response).await {
                    error!(log, "failed to send response"; "err" => %err);
                    break;
                }
                debug!(log, "transmitted response to client");
            }
            Ok(None) => debug!(log, "oneway message, no response"),
            Err(err) => {
                error!(log, "failed to process connection"; "err" => %err);
                break;
            }
        }
    }
}
