//! Error types for the codec layer.
//!
//! Errors are split between framing failures (the length prefix or frame
//! boundary is wrong), body failures (a complete frame whose contents cannot
//! be decoded or encoded) and end-of-stream conditions.

use std::io;

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// End-of-stream variants distinguishing a clean close from truncation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed the connection between two frames.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// The peer closed the connection while a length prefix was incomplete.
    #[error("premature EOF: {bytes_received} of {header_size} header bytes received")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Size of the complete header.
        header_size: usize,
    },

    /// The peer closed the connection while a frame body was incomplete.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Body bytes received before EOF.
        bytes_received: usize,
        /// Body length announced by the prefix.
        expected: usize,
    },
}

/// Errors raised while framing, decoding or encoding channel traffic.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A frame exceeded the configured maximum length.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Actual or announced frame size.
        size: usize,
        /// Maximum permitted frame size.
        max: usize,
    },

    /// A frame body could not be decoded.
    #[error("malformed frame body: {0}")]
    Decode(#[from] DecodeError),

    /// A frame body decoded but left unread bytes behind.
    #[error("frame body has {trailing} trailing bytes")]
    TrailingBytes {
        /// Number of bytes left over after decoding.
        trailing: usize,
    },

    /// An outbound value could not be encoded.
    #[error("failed to encode frame body: {0}")]
    Encode(#[from] EncodeError),

    /// The connection ended.
    #[error(transparent)]
    Eof(#[from] EofError),

    /// Transport-level I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Short label used for error metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OversizedFrame { .. } | Self::TrailingBytes { .. } | Self::Decode(_) => {
                "malformed"
            }
            Self::Encode(_) => "encode",
            Self::Eof(EofError::CleanClose) => "closed",
            Self::Eof(_) => "truncated",
            Self::Io(_) => "io",
        }
    }

    /// Whether the error reports an orderly close by the peer.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Eof(EofError::CleanClose)) }
}
