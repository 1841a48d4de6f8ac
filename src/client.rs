// Copyright 2026 Joyent, Inc.

//! This module provides the interface for creating Thrift clients.
//!
//! A [`MethodHandler`] frames one service method's calls: it encodes the
//! `_args` envelope, sends it through a [`RequestChannel`], and decodes
//! the `_result` envelope, routing declared exceptions and application
//! exceptions back to the caller. [`TcpChannel`] is the stock channel
//! implementation over a tokio TCP connection; one conversation per
//! channel, requests strictly in order.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::AtomicI32;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use slog::{debug, o, Drain, Logger};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_util::codec::Framed;

use crate::codec::{CodecRegistry, ThriftCodec};
use crate::errors::{
    ApplicationErrorKind, ApplicationException, Error, MetadataError,
    MetadataErrorKind, ProtocolError, TransportError,
};
use crate::metadata::{MethodMetadata, StructCategory, ThriftType};
use crate::protocol::{
    skip, Framing, MessageCodec, MessageType, ProtocolKind, ProtocolReader,
    ProtocolWriter, TMessage, TType,
};
use crate::stats::MethodStats;
use crate::value::ThriftValue;

/// A sequence-id source that can safely be shared between threads. Ids are
/// opaque to the server, which echoes them verbatim; the client allocates
/// them sequentially from a circular positive `i32` space.
#[derive(Default)]
pub struct SequenceId(AtomicI32);

impl SequenceId {
    pub fn new() -> Self {
        SequenceId(AtomicI32::new(0))
    }
}

impl Iterator for SequenceId {
    type Item = i32;

    /// Returns the next sequence id and increments the value modulo
    /// `i32::MAX`.
    fn next(&mut self) -> Option<Self::Item> {
        let id_value = self.0.get_mut();
        let current = *id_value;
        *id_value = (*id_value + 1) % i32::max_value();

        Some(current)
    }
}

/// Callbacks a channel invokes for one request. `on_request_sent` fires
/// once the buffer is flushed; exactly one of the consuming callbacks
/// follows for two-way requests.
pub trait ChannelListener: Send {
    fn on_request_sent(&mut self) {}
    fn on_response_received(self: Box<Self>, buffer: BytesMut);
    fn on_channel_error(self: Box<Self>, error: TransportError);
}

/// The byte-transport contract the client core consumes: a sink for
/// encoded request buffers that reports completion through a listener.
pub trait RequestChannel: Send + Sync {
    /// The protocol this channel's peer speaks.
    fn protocol(&self) -> ProtocolKind;

    /// Queue one request. For oneway requests no response is read and the
    /// listener completes after the flush.
    fn send_asynchronous_request(
        &self,
        buffer: BytesMut,
        oneway: bool,
        listener: Box<dyn ChannelListener>,
    );

    /// Release the underlying connection. Idempotent.
    fn close(&self);
}

/// Client-side connection settings. The three timeouts are independent;
/// expiry of a read or write timeout fails the in-flight call and closes
/// the connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub protocol: ProtocolKind,
    pub framing: Framing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(60),
            protocol: ProtocolKind::Binary,
            framing: Framing::Framed,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

struct ChannelRequest {
    buffer: BytesMut,
    oneway: bool,
    listener: Box<dyn ChannelListener>,
}

/// A [`RequestChannel`] over one TCP connection, driven by a background
/// task. Requests on a channel are strictly serialized: the response to a
/// request is read before the next request is written.
pub struct TcpChannel {
    protocol: ProtocolKind,
    sender: Mutex<Option<mpsc::UnboundedSender<ChannelRequest>>>,
}

impl TcpChannel {
    /// Connect to a Thrift server, honoring the configured connect
    /// timeout.
    pub async fn connect(
        addr: &SocketAddr,
        config: &ClientConfig,
        log: Option<&Logger>,
    ) -> Result<TcpChannel, TransportError> {
        let stream =
            time::timeout(config.connect_timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    TransportError::ConnectTimeout(config.connect_timeout)
                })??;

        // If no logger was provided use the slog StdLog drain by default
        let log = log
            .cloned()
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

        let framed = Framed::new(
            stream,
            MessageCodec::new(config.protocol, config.framing),
        );
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(
            framed,
            receiver,
            config.read_timeout,
            config.write_timeout,
            log,
        ));

        Ok(TcpChannel {
            protocol: config.protocol,
            sender: Mutex::new(Some(sender)),
        })
    }
}

impl RequestChannel for TcpChannel {
    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    fn send_asynchronous_request(
        &self,
        buffer: BytesMut,
        oneway: bool,
        listener: Box<dyn ChannelListener>,
    ) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let request = ChannelRequest {
            buffer,
            oneway,
            listener,
        };
        match sender.as_ref() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(request)) = tx.send(request)
                {
                    request.listener.on_channel_error(TransportError::Closed);
                }
            }
            None => request.listener.on_channel_error(TransportError::Closed),
        }
    }

    fn close(&self) {
        // dropping the sender stops the connection task; take() makes the
        // close happen exactly once
        let mut sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        sender.take();
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    mut framed: Framed<TcpStream, MessageCodec>,
    mut receiver: mpsc::UnboundedReceiver<ChannelRequest>,
    read_timeout: Duration,
    write_timeout: Duration,
    log: Logger,
) {
    while let Some(mut request) = receiver.recv().await {
        match time::timeout(write_timeout, framed.send(request.buffer)).await {
            Err(_) => {
                debug!(log, "request write timed out");
                request.listener.on_channel_error(
                    TransportError::WriteTimeout(write_timeout),
                );
                break;
            }
            Ok(Err(err)) => {
                debug!(log, "request write failed"; "err" => %err);
                request.listener.on_channel_error(err.into());
                break;
            }
            Ok(Ok(())) => request.listener.on_request_sent(),
        }

        if request.oneway {
            continue;
        }

        match time::timeout(read_timeout, framed.next()).await {
            Err(_) => {
                debug!(log, "response read timed out");
                request.listener.on_channel_error(
                    TransportError::ReadTimeout(read_timeout),
                );
                break;
            }
            Ok(None) => {
                debug!(log, "connection closed by server");
                request.listener.on_channel_error(TransportError::Closed);
                break;
            }
            Ok(Some(Err(err))) => {
                debug!(log, "response read failed"; "err" => %err);
                request.listener.on_channel_error(err.into());
                break;
            }
            Ok(Some(Ok(buffer))) => {
                request.listener.on_response_received(buffer)
            }
        }
    }
}

struct ParameterHandler {
    id: i16,
    name: String,
    wire_type: TType,
    codec: Arc<dyn ThriftCodec>,
}

/// Client-side framing of one service method.
pub struct MethodHandler {
    name: String,
    parameters: Vec<ParameterHandler>,
    success: Option<Arc<dyn ThriftCodec>>,
    exceptions: Arc<HashMap<i16, Arc<dyn ThriftCodec>>>,
    oneway: bool,
    asynchronous: bool,
    stats: Arc<MethodStats>,
}

impl MethodHandler {
    pub fn new(
        metadata: &MethodMetadata,
        registry: &CodecRegistry,
    ) -> Result<MethodHandler, MetadataError> {
        // parameter codecs in declared order
        let mut parameters = Vec::with_capacity(metadata.parameters().len());
        for parameter in metadata.parameters() {
            parameters.push(ParameterHandler {
                id: parameter.id,
                name: parameter.name.clone(),
                wire_type: parameter.ttype.wire_type(),
                codec: registry.codec_for(&parameter.ttype)?,
            });
        }

        let mut exceptions = HashMap::new();
        for (id, ttype) in metadata.exceptions() {
            check_exception_type(registry, ttype)?;
            exceptions.insert(*id, registry.codec_for(ttype)?);
        }

        let success = match metadata.return_type() {
            ThriftType::Void => None,
            ttype => Some(registry.codec_for(ttype)?),
        };

        Ok(MethodHandler {
            name: String::from(metadata.name()),
            parameters,
            success,
            exceptions: Arc::new(exceptions),
            oneway: metadata.oneway(),
            asynchronous: metadata.asynchronous(),
            stats: Arc::new(MethodStats::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn oneway(&self) -> bool {
        self.oneway
    }

    /// Whether the method was declared with an asynchronous signature.
    pub fn asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub fn stats(&self) -> &Arc<MethodStats> {
        &self.stats
    }

    /// Invoke the method and wait for its outcome. Oneway methods return
    /// as soon as the request is flushed.
    pub async fn invoke(
        &self,
        channel: &dyn RequestChannel,
        sequence_id: i32,
        args: &[ThriftValue],
    ) -> Result<Option<ThriftValue>, Error> {
        let result =
            self.asynchronous_invoke(channel, sequence_id, args)?.await;
        match &result {
            Ok(_) => self.stats.add_success(),
            Err(_) => self.stats.add_error(),
        }
        result
    }

    /// Send the request and return a future that completes when the
    /// channel delivers the response (or, for oneway methods, as soon as
    /// the request is flushed).
    pub fn asynchronous_invoke(
        &self,
        channel: &dyn RequestChannel,
        sequence_id: i32,
        args: &[ThriftValue],
    ) -> Result<ResponseFuture, Error> {
        self.stats.add_invocation();

        let buffer =
            self.write_arguments(channel.protocol(), sequence_id, args)?;

        let (sender, receiver) = oneshot::channel();
        channel.send_asynchronous_request(
            buffer,
            self.oneway,
            Box::new(OneshotListener {
                oneway: self.oneway,
                sender: Some(sender),
            }),
        );

        Ok(ResponseFuture {
            receiver,
            decoder: ResponseDecoder {
                name: self.name.clone(),
                protocol: channel.protocol(),
                sequence_id,
                success: self.success.clone(),
                exceptions: self.exceptions.clone(),
            },
        })
    }

    fn write_arguments(
        &self,
        protocol: ProtocolKind,
        sequence_id: i32,
        args: &[ThriftValue],
    ) -> Result<BytesMut, Error> {
        if args.len() != self.parameters.len() {
            return Err(Error::Protocol(ProtocolError::invalid(format!(
                "{} takes {} arguments, {} given",
                self.name,
                self.parameters.len(),
                args.len()
            ))));
        }

        let message_type = if self.oneway {
            MessageType::Oneway
        } else {
            MessageType::Call
        };

        let mut buffer = BytesMut::new();
        let mut writer = protocol.writer(&mut buffer);
        writer.write_message_begin(&TMessage::new(
            self.name.clone(),
            message_type,
            sequence_id,
        ))?;
        writer.write_struct_begin(&format!("{}_args", self.name))?;
        for (parameter, arg) in self.parameters.iter().zip(args) {
            writer.write_field_begin(
                &parameter.name,
                parameter.wire_type,
                parameter.id,
            )?;
            parameter.codec.write(arg, writer.as_mut())?;
            writer.write_field_end()?;
        }
        writer.write_field_stop()?;
        writer.write_struct_end()?;
        writer.write_message_end()?;
        drop(writer);

        Ok(buffer)
    }
}

pub(crate) fn check_exception_type(
    registry: &CodecRegistry,
    ttype: &ThriftType,
) -> Result<(), MetadataError> {
    match ttype {
        ThriftType::Struct(handle) => {
            let metadata = registry.catalog().resolve(handle)?;
            if metadata.category() != StructCategory::Exception {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidTypeCategory,
                    handle.ident(),
                    "declared exception type is not an exception struct",
                ));
            }
            Ok(())
        }
        other => Err(MetadataError::new(
            MetadataErrorKind::InvalidTypeCategory,
            &format!("{:?}", other),
            "declared exception type must be a struct",
        )),
    }
}

struct OneshotListener {
    oneway: bool,
    sender: Option<oneshot::Sender<Result<Option<BytesMut>, TransportError>>>,
}

impl ChannelListener for OneshotListener {
    fn on_request_sent(&mut self) {
        if self.oneway {
            if let Some(sender) = self.sender.take() {
                let _ = sender.send(Ok(None));
            }
        }
    }

    fn on_response_received(mut self: Box<Self>, buffer: BytesMut) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Ok(Some(buffer)));
        }
    }

    fn on_channel_error(mut self: Box<Self>, error: TransportError) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err(error));
        }
    }
}

struct ResponseDecoder {
    name: String,
    protocol: ProtocolKind,
    sequence_id: i32,
    success: Option<Arc<dyn ThriftCodec>>,
    exceptions: Arc<HashMap<i16, Arc<dyn ThriftCodec>>>,
}

impl ResponseDecoder {
    fn decode(&self, buffer: &[u8]) -> Result<Option<ThriftValue>, Error> {
        let mut reader = self.protocol.reader(buffer);

        let message = reader.read_message_begin()?;
        if message.message_type == MessageType::Exception {
            let exception = ApplicationException::read(reader.as_mut())?;
            reader.read_message_end()?;
            return Err(exception.into());
        }
        if message.message_type != MessageType::Reply {
            return Err(ApplicationException::new(
                ApplicationErrorKind::InvalidMessageType,
                format!(
                    "received invalid message type {:?} from server",
                    message.message_type
                ),
            )
            .into());
        }
        if message.name != self.name {
            return Err(ApplicationException::new(
                ApplicationErrorKind::WrongMethodName,
                format!(
                    "wrong method name in reply: expected {} but received {}",
                    self.name, message.name
                ),
            )
            .into());
        }
        if message.sequence_id != self.sequence_id {
            return Err(ApplicationException::new(
                ApplicationErrorKind::BadSequenceId,
                format!("{} failed: out of sequence response", self.name),
            )
            .into());
        }

        let mut success = None;
        let mut declared: Option<(i16, ThriftValue)> = None;

        reader.read_struct_begin()?;
        while let Some(header) = reader.read_field_begin()? {
            if header.id == 0 {
                match &self.success {
                    Some(codec) => {
                        success = Some(codec.read(reader.as_mut())?)
                    }
                    None => skip(reader.as_mut(), header.ttype)?,
                }
            } else if let Some(codec) = self.exceptions.get(&header.id) {
                declared = Some((header.id, codec.read(reader.as_mut())?));
            } else {
                skip(reader.as_mut(), header.ttype)?;
            }
            reader.read_field_end()?;
        }
        reader.read_struct_end()?;
        reader.read_message_end()?;

        if let Some((id, value)) = declared {
            return Err(Error::Declared { id, value });
        }

        match &self.success {
            None => Ok(None),
            Some(_) => match success {
                Some(value) => Ok(Some(value)),
                None => Err(ApplicationException::new(
                    ApplicationErrorKind::MissingResult,
                    format!("{} failed: unknown result", self.name),
                )
                .into()),
            },
        }
    }
}

/// Completes with the decoded result, a declared exception, or a
/// transport/protocol error. If the channel goes away before answering,
/// the future completes with a closed-transport error.
pub struct ResponseFuture {
    receiver: oneshot::Receiver<Result<Option<BytesMut>, TransportError>>,
    decoder: ResponseDecoder,
}

impl Future for ResponseFuture {
    type Output = Result<Option<ThriftValue>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(TransportError::Closed.into()))
            }
            Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(error.into())),
            Poll::Ready(Ok(Ok(None))) => Poll::Ready(Ok(None)),
            Poll::Ready(Ok(Ok(Some(buffer)))) => {
                Poll::Ready(this.decoder.decode(&buffer))
            }
        }
    }
}

/// Named client settings shared by every channel it opens.
pub struct ThriftClient {
    name: String,
    config: ClientConfig,
}

impl ThriftClient {
    pub fn new(name: &str, config: ClientConfig) -> Self {
        ThriftClient {
            name: String::from(name),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn open(
        &self,
        addr: &SocketAddr,
        log: Option<&Logger>,
    ) -> Result<TcpChannel, TransportError> {
        TcpChannel::connect(addr, &self.config, log).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::{StructMetadata, TypeCatalog};

    #[test]
    fn sequence_ids_are_sequential() {
        let mut ids = SequenceId::new();
        assert_eq!(ids.next(), Some(0));
        assert_eq!(ids.next(), Some(1));
        assert_eq!(ids.next(), Some(2));
    }

    /// A channel that records requests and replies from a script.
    struct ScriptedChannel {
        protocol: ProtocolKind,
        response: Mutex<Option<Result<BytesMut, TransportError>>>,
        requests: Mutex<Vec<(BytesMut, bool)>>,
    }

    impl ScriptedChannel {
        fn new(
            protocol: ProtocolKind,
            response: Result<BytesMut, TransportError>,
        ) -> Self {
            ScriptedChannel {
                protocol,
                response: Mutex::new(Some(response)),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl RequestChannel for ScriptedChannel {
        fn protocol(&self) -> ProtocolKind {
            self.protocol
        }

        fn send_asynchronous_request(
            &self,
            buffer: BytesMut,
            oneway: bool,
            mut listener: Box<dyn ChannelListener>,
        ) {
            self.requests.lock().unwrap().push((buffer, oneway));
            listener.on_request_sent();
            if oneway {
                return;
            }
            match self.response.lock().unwrap().take() {
                Some(Ok(buffer)) => listener.on_response_received(buffer),
                Some(Err(error)) => listener.on_channel_error(error),
                None => listener.on_channel_error(TransportError::Closed),
            }
        }

        fn close(&self) {}
    }

    fn registry() -> CodecRegistry {
        CodecRegistry::new(Arc::new(TypeCatalog::new()))
    }

    fn add_handler(registry: &CodecRegistry) -> MethodHandler {
        let metadata = MethodMetadata::builder("Calculator", "add")
            .param("a", ThriftType::I32)
            .param("b", ThriftType::I32)
            .returns(ThriftType::I32)
            .build()
            .unwrap();
        MethodHandler::new(&metadata, registry).unwrap()
    }

    fn i32_reply(
        protocol: ProtocolKind,
        name: &str,
        sequence_id: i32,
        success: Option<i32>,
    ) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut w = protocol.writer(&mut buf);
        w.write_message_begin(&TMessage::new(
            name,
            MessageType::Reply,
            sequence_id,
        ))
        .unwrap();
        w.write_struct_begin("result").unwrap();
        if let Some(value) = success {
            w.write_field_begin("success", TType::I32, 0).unwrap();
            w.write_i32(value).unwrap();
            w.write_field_end().unwrap();
        }
        w.write_field_stop().unwrap();
        w.write_struct_end().unwrap();
        w.write_message_end().unwrap();
        drop(w);
        buf
    }

    #[tokio::test]
    async fn successful_call_decodes_the_result() {
        let registry = registry();
        let handler = add_handler(&registry);
        let reply = i32_reply(ProtocolKind::Binary, "add", 7, Some(5));
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(reply));

        let result = handler
            .invoke(&channel, 7, &[ThriftValue::I32(2), ThriftValue::I32(3)])
            .await
            .unwrap();
        assert_eq!(result, Some(ThriftValue::I32(5)));
        assert_eq!(handler.stats().snapshot().successes, 1);
    }

    #[tokio::test]
    async fn request_envelope_carries_call_type_and_args() {
        let registry = registry();
        let handler = add_handler(&registry);
        let reply = i32_reply(ProtocolKind::Binary, "add", 3, Some(0));
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(reply));

        handler
            .invoke(&channel, 3, &[ThriftValue::I32(1), ThriftValue::I32(2)])
            .await
            .unwrap();

        let requests = channel.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (buffer, oneway) = &requests[0];
        assert!(!oneway);

        let mut reader = ProtocolKind::Binary.reader(buffer);
        let message = reader.read_message_begin().unwrap();
        assert_eq!(message.name, "add");
        assert_eq!(message.message_type, MessageType::Call);
        assert_eq!(message.sequence_id, 3);

        reader.read_struct_begin().unwrap();
        let first = reader.read_field_begin().unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(reader.read_i32().unwrap(), 1);
        let second = reader.read_field_begin().unwrap().unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(reader.read_i32().unwrap(), 2);
        assert!(reader.read_field_begin().unwrap().is_none());
    }

    #[tokio::test]
    async fn oneway_methods_return_without_reading() {
        let registry = registry();
        let metadata = MethodMetadata::builder("Scribe", "log")
            .param("messages", ThriftType::list(ThriftType::String))
            .oneway()
            .build()
            .unwrap();
        let handler = MethodHandler::new(&metadata, &registry).unwrap();

        // no scripted response: reading would fail the call
        let channel = ScriptedChannel::new(
            ProtocolKind::Binary,
            Err(TransportError::Closed),
        );

        let args = vec![ThriftValue::List(vec![
            ThriftValue::from("a"),
            ThriftValue::from("b"),
        ])];
        let result = handler.invoke(&channel, 1, &args).await.unwrap();
        assert_eq!(result, None);

        let requests = channel.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (buffer, oneway) = &requests[0];
        assert!(oneway);
        let message = ProtocolKind::Binary
            .reader(buffer)
            .read_message_begin()
            .unwrap();
        assert_eq!(message.message_type, MessageType::Oneway);
    }

    #[tokio::test]
    async fn out_of_sequence_reply_is_rejected() {
        let registry = registry();
        let handler = add_handler(&registry);
        // server echoes sequence id 7 for request 8
        let reply = i32_reply(ProtocolKind::Binary, "add", 7, Some(5));
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(reply));

        let err = handler
            .invoke(&channel, 8, &[ThriftValue::I32(1), ThriftValue::I32(1)])
            .await
            .unwrap_err();
        match err {
            Error::Application(e) => {
                assert_eq!(e.kind, ApplicationErrorKind::BadSequenceId)
            }
            other => panic!("expected BadSequenceId, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_method_name_is_rejected() {
        let registry = registry();
        let handler = add_handler(&registry);
        let reply = i32_reply(ProtocolKind::Binary, "subtract", 1, Some(5));
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(reply));

        let err = handler
            .invoke(&channel, 1, &[ThriftValue::I32(1), ThriftValue::I32(1)])
            .await
            .unwrap_err();
        match err {
            Error::Application(e) => {
                assert_eq!(e.kind, ApplicationErrorKind::WrongMethodName)
            }
            other => panic!("expected WrongMethodName, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_result_is_rejected() {
        let registry = registry();
        let handler = add_handler(&registry);
        let reply = i32_reply(ProtocolKind::Binary, "add", 1, None);
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(reply));

        let err = handler
            .invoke(&channel, 1, &[ThriftValue::I32(1), ThriftValue::I32(1)])
            .await
            .unwrap_err();
        match err {
            Error::Application(e) => {
                assert_eq!(e.kind, ApplicationErrorKind::MissingResult)
            }
            other => panic!("expected MissingResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exception_messages_raise_application_exceptions() {
        let registry = registry();
        let handler = add_handler(&registry);

        let mut buf = BytesMut::new();
        {
            let mut w = ProtocolKind::Binary.writer(&mut buf);
            w.write_message_begin(&TMessage::new(
                "add",
                MessageType::Exception,
                1,
            ))
            .unwrap();
            ApplicationException::new(
                ApplicationErrorKind::InternalError,
                "boom",
            )
            .write(w.as_mut())
            .unwrap();
            w.write_message_end().unwrap();
        }
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(buf));

        let err = handler
            .invoke(&channel, 1, &[ThriftValue::I32(1), ThriftValue::I32(1)])
            .await
            .unwrap_err();
        match err {
            Error::Application(e) => {
                assert_eq!(e.kind, ApplicationErrorKind::InternalError);
                assert_eq!(e.message, "boom");
            }
            other => panic!("expected InternalError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn declared_exceptions_are_decoded_from_their_result_field() {
        let catalog = Arc::new(TypeCatalog::new());
        let div_by_zero = catalog
            .struct_type("DivByZero", |_| {
                StructMetadata::builder(
                    "DivByZero",
                    StructCategory::Exception,
                )
                .field(1, "message", ThriftType::String)
                .build()
            })
            .unwrap();
        let registry = CodecRegistry::new(catalog);

        let metadata = MethodMetadata::builder("Calculator", "divide")
            .param("dividend", ThriftType::I32)
            .param("divisor", ThriftType::I32)
            .returns(ThriftType::I32)
            .throws(div_by_zero)
            .build()
            .unwrap();
        let handler = MethodHandler::new(&metadata, &registry).unwrap();

        // _result carrying the exception at field id 1
        let mut buf = BytesMut::new();
        {
            let mut w = ProtocolKind::Binary.writer(&mut buf);
            w.write_message_begin(&TMessage::new(
                "divide",
                MessageType::Reply,
                1,
            ))
            .unwrap();
            w.write_struct_begin("divide_result").unwrap();
            w.write_field_begin("exception", TType::Struct, 1).unwrap();
            w.write_struct_begin("DivByZero").unwrap();
            w.write_field_begin("message", TType::String, 1).unwrap();
            w.write_string("division by zero").unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
            w.write_field_end().unwrap();
            w.write_field_stop().unwrap();
            w.write_struct_end().unwrap();
            w.write_message_end().unwrap();
        }
        let channel = ScriptedChannel::new(ProtocolKind::Binary, Ok(buf));

        let err = handler
            .invoke(&channel, 1, &[ThriftValue::I32(1), ThriftValue::I32(0)])
            .await
            .unwrap_err();
        match err {
            Error::Declared { id, value } => {
                assert_eq!(id, 1);
                let fields = value.as_struct().unwrap();
                assert_eq!(
                    fields.get(1),
                    Some(&ThriftValue::from("division by zero"))
                );
            }
            other => panic!("expected declared exception, got {:?}", other),
        }
    }

    #[test]
    fn transport_errors_surface_as_errors() {
        let registry = registry();
        let handler = add_handler(&registry);
        let channel = ScriptedChannel::new(
            ProtocolKind::Binary,
            Err(TransportError::Closed),
        );

        let err = tokio_test::block_on(handler.invoke(
            &channel,
            1,
            &[ThriftValue::I32(1), ThriftValue::I32(1)],
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }

    #[test]
    fn exception_types_must_be_exception_structs() {
        let catalog = Arc::new(TypeCatalog::new());
        let plain = catalog
            .struct_type("Plain", |_| {
                StructMetadata::builder("Plain", StructCategory::Struct)
                    .field(1, "x", ThriftType::I32)
                    .build()
            })
            .unwrap();
        let registry = CodecRegistry::new(catalog);

        let metadata = MethodMetadata::builder("S", "m")
            .returns(ThriftType::I32)
            .throws(plain)
            .build()
            .unwrap();
        let err = MethodHandler::new(&metadata, &registry)
            .err()
            .expect("expected error");
        assert_eq!(err.kind, MetadataErrorKind::InvalidTypeCategory);
    }
}
