// Copyright 2026 Joyent, Inc.

//! Message framing for stream transports.
//!
//! The codec core is independent of framing: both modes yield one complete
//! message buffer per item. `Framed` length-prefixes each message with a
//! big-endian `i32`. `Unframed` carries the raw byte stream, so message
//! boundaries are discovered by parsing: a partial parse reports
//! not-enough-bytes and the decoder waits for more input.

use std::io::{Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::ProtocolError;
use crate::protocol::{
    skip, ProtocolKind, ProtocolReader, ProtocolWriter, TType,
};

/// Frames larger than this fail decoding rather than buffering without
/// bound.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const FRAME_HEADER_SZ: usize = 4;

/// The framing mode a connection uses. `Unframed` is also known as
/// buffered in other Thrift implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Framed,
    Unframed,
}

/// A tokio codec producing one complete Thrift message buffer per item.
pub struct MessageCodec {
    protocol: ProtocolKind,
    framing: Framing,
}

impl MessageCodec {
    pub fn new(protocol: ProtocolKind, framing: Framing) -> Self {
        MessageCodec { protocol, framing }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }
}

/// Parse one message from the front of `buf` and return its encoded
/// length. A message body is always a single struct, so the skip machinery
/// finds the end without knowing the schema.
fn measure_message(
    protocol: ProtocolKind,
    buf: &[u8],
) -> Result<usize, ProtocolError> {
    let mut reader = protocol.reader(buf);
    reader.read_message_begin()?;
    skip(reader.as_mut(), TType::Struct)?;
    reader.read_message_end()?;
    Ok(reader.position())
}

impl Decoder for MessageCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Error> {
        match self.framing {
            Framing::Framed => {
                if buf.len() < FRAME_HEADER_SZ {
                    return Ok(None);
                }
                let frame_len = BigEndian::read_i32(&buf[..FRAME_HEADER_SZ]);
                if frame_len < 0 || frame_len as usize > MAX_FRAME_SIZE {
                    let msg = format!("invalid frame length {}", frame_len);
                    return Err(Error::new(ErrorKind::InvalidData, msg));
                }
                let frame_len = frame_len as usize;
                if buf.len() < FRAME_HEADER_SZ + frame_len {
                    buf.reserve(FRAME_HEADER_SZ + frame_len - buf.len());
                    return Ok(None);
                }
                buf.advance(FRAME_HEADER_SZ);
                Ok(Some(buf.split_to(frame_len)))
            }
            Framing::Unframed => match measure_message(self.protocol, buf) {
                Ok(msg_len) => Ok(Some(buf.split_to(msg_len))),
                Err(ProtocolError::Eof(_)) => {
                    // not enough bytes available yet, wait for more input
                    Ok(None)
                }
                Err(err) => {
                    let msg =
                        format!("failed to parse thrift message: {}", err);
                    Err(Error::new(ErrorKind::InvalidData, msg))
                }
            },
        }
    }
}

impl Encoder<BytesMut> for MessageCodec {
    type Error = Error;

    fn encode(
        &mut self,
        item: BytesMut,
        buf: &mut BytesMut,
    ) -> Result<(), Error> {
        match self.framing {
            Framing::Framed => {
                if item.len() > MAX_FRAME_SIZE {
                    let msg = format!("frame length {} too large", item.len());
                    return Err(Error::new(ErrorKind::InvalidData, msg));
                }
                buf.reserve(FRAME_HEADER_SZ + item.len());
                buf.put_i32(item.len() as i32);
            }
            Framing::Unframed => buf.reserve(item.len()),
        }
        buf.put_slice(&item);
        Ok(())
    }
}
