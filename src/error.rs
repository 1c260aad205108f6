//! Errors surfaced to the code controlling an actor.
//!
//! Only setup failures reach the caller. Once an actor is running, I/O and
//! decode failures are absorbed by evicting the affected channel.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors returned by [`crate::actor::Actor::run`] and the acceptor
/// constructors it relies on.
#[derive(Debug, Error)]
pub enum ActorError {
    /// An endpoint could not be bound.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// Endpoint that was requested.
        endpoint: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// A bound socket could not be registered with the reactor.
    #[error("failed to register listener for {endpoint}: {source}")]
    Listen {
        /// Resolved endpoint of the acceptor.
        endpoint: SocketAddr,
        /// Underlying registration error.
        #[source]
        source: io::Error,
    },

    /// The reactor thread could not be started.
    #[error("failed to spawn reactor thread: {0}")]
    Spawn(#[source] io::Error),
}

impl ActorError {
    /// Endpoint associated with the failure, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<SocketAddr> {
        match self {
            Self::Bind { endpoint, .. } | Self::Listen { endpoint, .. } => Some(*endpoint),
            Self::Spawn(_) => None,
        }
    }
}
