//! Wire types exchanged over a channel.
//!
//! Peers send [`Message`]s carrying a correlation tag; the actor answers each
//! tag with a sequence of [`Frame`]s terminated by [`Frame::Choke`].

use bincode::{
    Decode,
    Encode,
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

use crate::codec::MAX_FRAME_LENGTH;

/// Wrapper trait for values carried inside a wire frame.
///
/// Any type deriving [`Encode`] and [`Decode`] implements this trait through
/// the blanket implementation. The helpers use bincode's standard
/// configuration, which is also what [`crate::codec::RpcCodec`] uses.
///
/// Decoding is capped at [`MAX_FRAME_LENGTH`] bytes, so a length claimed
/// inside a body is rejected before bincode allocates for it.
pub trait Wire: Encode + Decode<()> {
    /// Serialize the value into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Deserialize a value from a byte slice, returning it along with the
    /// number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if deserialization fails.
    fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DecodeError>
    where
        Self: Sized,
    {
        decode_from_slice(
            bytes,
            config::standard().with_limit::<MAX_FRAME_LENGTH>(),
        )
    }
}

impl<T> Wire for T where T: Encode + Decode<()> {}

/// Correlation tag assigned by the peer to one request.
///
/// Tags are only unique within the lifetime of a single channel.
pub type Tag = u64;

/// Inbound request decoded from a channel.
///
/// # Examples
///
/// ```
/// use actorwire::message::Message;
///
/// let message = Message::new(1, 7, b"ping".to_vec());
/// assert_eq!(message.tag(), 7);
/// assert_eq!(message.payload(), b"ping");
/// ```
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u32,
    tag: Tag,
    payload: Vec<u8>,
}

impl Message {
    /// Create a new [`Message`].
    #[must_use]
    pub fn new(id: u32, tag: Tag, payload: Vec<u8>) -> Self { Self { id, tag, payload } }

    /// Application-defined message type identifier.
    #[must_use]
    pub const fn id(&self) -> u32 { self.id }

    /// Correlation tag replies must be addressed to.
    #[must_use]
    pub const fn tag(&self) -> Tag { self.tag }

    /// Borrow the raw payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Consume the message and return its payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> { self.payload }
}

/// Outbound frame addressed to a request tag.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A piece of the reply stream.
    Chunk {
        /// Tag of the request being answered.
        tag: Tag,
        /// Reply bytes.
        payload: Vec<u8>,
    },
    /// An application error for the request.
    Error {
        /// Tag of the request being answered.
        tag: Tag,
        /// Numeric error code.
        code: i32,
        /// Human readable reason.
        reason: String,
    },
    /// End of the reply stream for `tag`.
    Choke {
        /// Tag of the request being closed.
        tag: Tag,
    },
}

impl Frame {
    /// Return the tag this frame is addressed to.
    ///
    /// ```
    /// use actorwire::message::Frame;
    ///
    /// assert_eq!(Frame::Choke { tag: 3 }.tag(), 3);
    /// ```
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Chunk { tag, .. } | Self::Error { tag, .. } | Self::Choke { tag } => *tag,
        }
    }

    /// Whether this frame terminates its tag's stream.
    #[must_use]
    pub const fn is_choke(&self) -> bool { matches!(self, Self::Choke { .. }) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tag_covers_every_variant() {
        let frames = [
            Frame::Chunk {
                tag: 9,
                payload: vec![1],
            },
            Frame::Error {
                tag: 9,
                code: -1,
                reason: "nope".into(),
            },
            Frame::Choke { tag: 9 },
        ];
        assert!(frames.iter().all(|frame| frame.tag() == 9));
        assert_eq!(
            frames.iter().filter(|frame| frame.is_choke()).count(),
            1
        );
    }

    #[test]
    fn from_bytes_reports_consumed_length() {
        let message = Message::new(2, 40, vec![0xAA; 3]);
        let bytes = message.to_bytes().expect("encode message");
        let (decoded, consumed) = Message::from_bytes(&bytes).expect("decode message");
        assert_eq!(decoded, message);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn from_bytes_rejects_payload_length_beyond_frame_limit() {
        // id 0, tag 7, then a u64 varint claiming a 64 TiB payload.
        let mut bytes = vec![0x00, 0x07, 0xFD];
        bytes.extend_from_slice(&(1_u64 << 46).to_le_bytes());

        let err = Message::from_bytes(&bytes).expect_err("claimed length exceeds limit");
        assert!(matches!(err, DecodeError::LimitExceeded));
    }
}
