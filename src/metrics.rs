//! Metric helpers for `actorwire`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled every helper compiles to a no-op, so call sites
//! never need their own feature gates.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live channels.
pub const CHANNELS_ACTIVE: &str = "actorwire_channels_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "actorwire_frames_processed_total";
/// Name of the counter tracking channel errors.
pub const ERRORS_TOTAL: &str = "actorwire_errors_total";
/// Name of the counter tracking panics raised by dispatch handlers.
pub const DISPATCH_PANICS: &str = "actorwire_dispatch_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Messages decoded from a peer.
    Inbound,
    /// Frames written to a peer.
    Outbound,
}

impl Direction {
    /// Label value recorded for this direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the live channels gauge.
pub fn inc_channels() {
    #[cfg(feature = "metrics")]
    gauge!(CHANNELS_ACTIVE).increment(1.0);
}

/// Decrement the live channels gauge.
pub fn dec_channels() {
    #[cfg(feature = "metrics")]
    gauge!(CHANNELS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a channel error labelled with `kind`.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a panic raised by a dispatch handler.
pub fn inc_dispatch_panics() {
    #[cfg(feature = "metrics")]
    counter!(DISPATCH_PANICS).increment(1);
}
