//! Failures reported by a channel's read or write direction.

use thiserror::Error;

use crate::codec::CodecError;

/// Reason a channel direction stopped.
///
/// Each direction reports at most one `ChannelError` through its failure
/// callback and performs no further I/O afterwards.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The read direction hit malformed input, an I/O error or end of
    /// stream.
    #[error("read failed: {0}")]
    Read(#[source] CodecError),

    /// The write direction failed to encode or flush a frame.
    #[error("write failed: {0}")]
    Write(#[source] CodecError),
}

impl ChannelError {
    /// Borrow the underlying codec error.
    #[must_use]
    pub fn codec_error(&self) -> &CodecError {
        match self {
            Self::Read(e) | Self::Write(e) => e,
        }
    }

    /// Short label used for error metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str { self.codec_error().kind() }

    /// Whether the peer simply hung up between frames.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { self.codec_error().is_clean_close() }
}
