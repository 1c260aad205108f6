//! Test helpers for exercising [`actorwire`] actors over real sockets.
//!
//! Actors own their reactor thread, so tests stay synchronous: start an
//! actor on a loopback port with [`start_actor`], talk to it with a
//! [`TestClient`] and record requests with a [`RecordingDispatch`].
//!
//! ```rust
//! use actorwire::Frame;
//! use actorwire_testing::{RecordingDispatch, Reply, TestClient, start_actor};
//!
//! let actor = start_actor(RecordingDispatch::new("doc", Reply::Pong));
//! let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");
//! client
//!     .send(actorwire::Message::new(0, 1, b"ping".to_vec()))
//!     .expect("send");
//! assert_eq!(
//!     client.expect_frame(),
//!     Frame::Chunk {
//!         tag: 1,
//!         payload: b"pong".to_vec()
//!     }
//! );
//! ```

pub mod client;
pub mod dispatch;
pub mod logging;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use actorwire::{Actor, Dispatch, Reactor};
pub use client::TestClient;
pub use dispatch::{RecordingDispatch, Reply};
pub use logging::{LoggerHandle, logger};

/// Loopback endpoint with an ephemeral port.
#[must_use]
pub fn loopback() -> SocketAddr { SocketAddr::from((Ipv4Addr::LOCALHOST, 0)) }

/// Build an actor around `dispatch` and run it on one loopback endpoint.
///
/// # Panics
///
/// Panics if the reactor cannot be built or the endpoint cannot be bound.
#[must_use]
pub fn start_actor<D: Dispatch>(dispatch: D) -> Actor<D> {
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let mut actor = Actor::new(reactor, dispatch);
    actor.run(&[loopback()]).expect("run actor");
    actor
}

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics if `timeout` elapses first.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        thread::sleep(Duration::from_millis(5));
    }
}
