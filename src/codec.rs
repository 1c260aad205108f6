//! Length-prefixed framing for channel traffic.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by a
//! bincode body (standard configuration). The same [`RpcCodec`] serves both
//! ends of a connection: the server decodes [`Message`]s and encodes
//! [`Frame`]s, a client does the reverse.
//!
//! Oversized frames are rejected in both directions, and a body that decodes
//! without consuming all of its bytes is treated as malformed so that a
//! desynchronised peer is detected on the first bad frame.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Frame, Message, Wire};

pub mod error;

pub use error::{CodecError, EofError};

/// Length prefix header size (4 bytes, big-endian `u32`).
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Minimum frame length in bytes.
///
/// Limits passed to [`RpcCodec::new`] are clamped to at least this value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Limits passed to [`RpcCodec::new`] are clamped to at most this value to
/// prevent unbounded allocation driven by a hostile length prefix.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Frame length used when none is configured (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Codec used by server-side channels.
pub type ServerCodec = RpcCodec<Message, Frame>;

/// Codec used by client-side channels.
pub type ClientCodec = RpcCodec<Frame, Message>;

/// Codec decoding `In` values and encoding `Out` values.
///
/// # Examples
///
/// ```
/// use actorwire::{
///     codec::{ClientCodec, ServerCodec},
///     message::{Frame, Message},
/// };
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut client = ClientCodec::default();
/// let mut server = ServerCodec::default();
/// let mut wire = BytesMut::new();
///
/// client
///     .encode(Message::new(0, 7, b"ping".to_vec()), &mut wire)
///     .expect("encode request");
/// let request = server
///     .decode(&mut wire)
///     .expect("decode request")
///     .expect("complete frame");
/// assert_eq!(request.tag(), 7);
///
/// server
///     .encode(Frame::Choke { tag: 7 }, &mut wire)
///     .expect("encode reply");
/// let reply = client.decode(&mut wire).expect("decode reply");
/// assert_eq!(reply, Some(Frame::Choke { tag: 7 }));
/// ```
#[derive(Debug)]
pub struct RpcCodec<In, Out> {
    max_frame_length: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> RpcCodec<In, Out> {
    /// Construct a codec accepting frames up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to `[MIN_FRAME_LENGTH, MAX_FRAME_LENGTH]`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
            _marker: PhantomData,
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl<In, Out> Clone for RpcCodec<In, Out> {
    fn clone(&self) -> Self { Self::new(self.max_frame_length) }
}

impl<In, Out> Default for RpcCodec<In, Out> {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

fn read_length(header: [u8; LENGTH_HEADER_SIZE]) -> usize {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    let len = u32::from_be_bytes(header);
    len as usize
}

fn write_length(len: u32) -> [u8; LENGTH_HEADER_SIZE] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    len.to_be_bytes()
}

fn peek_length(src: &BytesMut) -> Option<usize> {
    src.get(..LENGTH_HEADER_SIZE)
        .and_then(|slice| <[u8; LENGTH_HEADER_SIZE]>::try_from(slice).ok())
        .map(read_length)
}

impl<In: Wire, Out> Decoder for RpcCodec<In, Out> {
    type Item = In;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(len) = peek_length(src) else {
            return Ok(None);
        };
        if len > self.max_frame_length {
            return Err(CodecError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            });
        }
        let total = LENGTH_HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_HEADER_SIZE);
        let body = src.split_to(len);
        let (item, consumed) = In::from_bytes(&body)?;
        if consumed != body.len() {
            return Err(CodecError::TrailingBytes {
                trailing: body.len() - consumed,
            });
        }
        Ok(Some(item))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            return Ok(None);
        }
        Err(truncation_error(src).into())
    }
}

/// Classify a connection that closed while `src` still held a partial frame.
fn truncation_error(src: &BytesMut) -> EofError {
    match peek_length(src) {
        Some(expected) => EofError::MidFrame {
            bytes_received: src.len().saturating_sub(LENGTH_HEADER_SIZE),
            expected,
        },
        None => EofError::MidHeader {
            bytes_received: src.len(),
            header_size: LENGTH_HEADER_SIZE,
        },
    }
}

impl<In, Out: Wire> Encoder<Out> for RpcCodec<In, Out> {
    type Error = CodecError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_bytes()?;
        let oversized = || CodecError::OversizedFrame {
            size: body.len(),
            max: self.max_frame_length,
        };
        if body.len() > self.max_frame_length {
            return Err(oversized());
        }
        let len = u32::try_from(body.len()).map_err(|_| oversized())?;
        dst.reserve(LENGTH_HEADER_SIZE + body.len());
        dst.put_slice(&write_length(len));
        dst.put_slice(&body);
        Ok(())
    }
}
