#![doc(html_root_url = "https://docs.rs/actorwire/latest")]
//! Public API for the `actorwire` library.
//!
//! This crate provides a single-threaded network actor: acceptors feed TCP
//! connections into a reactor thread, each connection is framed into request
//! [`Message`]s and reply [`Frame`]s, and requests are routed to a
//! [`Dispatch`] handler that answers through a tag-bound [`Upstream`].

pub mod acceptor;
pub mod actor;
pub mod channel;
pub mod codec;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod reactor;
pub mod upstream;

pub use acceptor::{Acceptor, BackoffConfig};
pub use actor::Actor;
pub use channel::{Channel, ChannelError, ChannelId, ClientChannel, ServerChannel};
pub use codec::{ClientCodec, CodecError, RpcCodec, ServerCodec};
pub use connector::{ConnectError, Connector};
pub use dispatch::{Dispatch, FnDispatch, from_fn};
pub use error::ActorError;
pub use message::{Frame, Message, Tag};
pub use metrics::{CHANNELS_ACTIVE, DISPATCH_PANICS, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use reactor::{Reactor, ReactorHandle};
pub use upstream::Upstream;
