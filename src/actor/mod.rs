//! Network actor: acceptors, a reactor thread and a [`Dispatch`] handler.
//!
//! [`Actor::run`] binds every endpoint on the calling thread, starts one
//! dedicated reactor thread and wires accepted connections into
//! [`ServerChannel`](crate::channel::ServerChannel)s. Decoded messages are
//! passed to [`Dispatch::invoke`] together with an
//! [`Upstream`](crate::upstream::Upstream) for replies. A channel whose read
//! or write direction fails is evicted; nothing is retried.

mod state;
mod thread_name;

use std::{
    net::SocketAddr,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use log::{error, info, warn};

use self::{state::Core, thread_name::thread_name};
use crate::{
    acceptor::{Acceptor, BackoffConfig},
    codec::{DEFAULT_MAX_FRAME_LENGTH, ServerCodec, clamp_frame_length},
    dispatch::Dispatch,
    error::ActorError,
    panic::format_panic,
    reactor::Reactor,
};

/// Serves a [`Dispatch`] handler on one or more TCP endpoints.
///
/// # Examples
///
/// ```
/// use std::{
///     net::{Ipv4Addr, SocketAddr},
///     sync::Arc,
/// };
///
/// use actorwire::{actor::Actor, dispatch::from_fn, reactor::Reactor};
///
/// let reactor = Arc::new(Reactor::new().expect("build reactor"));
/// let mut actor = Actor::new(
///     reactor,
///     from_fn("echo", |message, mut upstream| {
///         upstream.write(message.into_payload());
///         upstream.close();
///     }),
/// );
///
/// actor
///     .run(&[SocketAddr::from((Ipv4Addr::LOCALHOST, 0))])
///     .expect("bind");
/// assert_ne!(actor.endpoints()[0].port(), 0);
/// actor.terminate();
/// ```
pub struct Actor<D: Dispatch> {
    reactor: Arc<Reactor>,
    dispatch: Arc<D>,
    acceptors: Vec<Acceptor>,
    thread: Option<JoinHandle<()>>,
    max_frame_length: usize,
    backoff: BackoffConfig,
    live: Arc<AtomicUsize>,
}

impl<D: Dispatch> Actor<D> {
    /// Create an idle actor serving `dispatch` on `reactor`.
    #[must_use]
    pub fn new(reactor: Arc<Reactor>, dispatch: D) -> Self {
        Self {
            reactor,
            dispatch: Arc::new(dispatch),
            acceptors: Vec::new(),
            thread: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            backoff: BackoffConfig::default(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Limit the size of frames accepted from and written to peers.
    ///
    /// The value is clamped to
    /// [`MIN_FRAME_LENGTH`](crate::codec::MIN_FRAME_LENGTH)..=
    /// [`MAX_FRAME_LENGTH`](crate::codec::MAX_FRAME_LENGTH). Applies to the
    /// next [`run`](Self::run).
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = clamp_frame_length(max_frame_length);
        self
    }

    /// Override the retry pacing used after failed accepts.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Bind `endpoints` and start the reactor thread.
    ///
    /// Binding is all-or-nothing: if any endpoint fails, every socket bound
    /// so far is released and no thread is started. The call returns as soon
    /// as the thread is launched.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Bind`] naming the endpoint that could not be
    /// bound, [`ActorError::Listen`] if a socket cannot be registered with
    /// the reactor, and [`ActorError::Spawn`] if the thread cannot start.
    ///
    /// # Panics
    ///
    /// Panics if the actor is already running, or if its reactor is being
    /// run by some other thread.
    pub fn run(&mut self, endpoints: &[SocketAddr]) -> Result<(), ActorError> {
        assert!(
            self.thread.is_none(),
            "actor `{}` is already running",
            self.dispatch.name()
        );
        assert!(
            !self.reactor.is_running(),
            "reactor is already running on another thread"
        );

        let acceptors = endpoints
            .iter()
            .map(|&endpoint| Acceptor::new(endpoint))
            .collect::<Result<Vec<_>, _>>()?;
        let listeners = acceptors
            .iter()
            .map(|acceptor| acceptor.listen(&self.reactor))
            .collect::<Result<Vec<_>, _>>()?;

        let reactor = Arc::clone(&self.reactor);
        let thread = thread::Builder::new()
            .name(thread_name(self.dispatch.name()))
            .spawn(move || reactor.run())
            .map_err(ActorError::Spawn)?;

        let dispatch = Arc::clone(&self.dispatch);
        let codec = ServerCodec::new(self.max_frame_length);
        let live = Arc::clone(&self.live);
        let backoff = self.backoff;
        self.reactor.post(move || {
            let core = Core::new(dispatch, codec, live);
            for listener in listeners {
                let core = Rc::clone(&core);
                listener.bind(backoff, move |stream, peer_addr| {
                    core.on_connection(stream, peer_addr);
                });
            }
        });

        self.acceptors = acceptors;
        self.thread = Some(thread);
        info!(
            "actor started: name={}, endpoints={:?}",
            self.dispatch.name(),
            self.endpoints_unchecked()
        );
        Ok(())
    }

    /// Stop the reactor thread and release every endpoint.
    ///
    /// Callbacks already queued on the reactor run first. Returns once the
    /// thread has exited; all channels are closed by then.
    ///
    /// # Panics
    ///
    /// Panics if the actor is not running.
    pub fn terminate(&mut self) {
        let Some(thread) = self.thread.take() else {
            panic!("actor `{}` is not running", self.dispatch.name());
        };
        self.reactor.stop();
        if let Err(panic) = thread.join() {
            let panic_msg = format_panic(panic);
            error!(
                "reactor thread panicked: name={}, panic={panic_msg}",
                self.dispatch.name()
            );
        }
        self.acceptors.clear();
        self.live.store(0, Ordering::Release);
        info!("actor terminated: name={}", self.dispatch.name());
    }

    /// Concrete addresses of every bound endpoint.
    ///
    /// # Panics
    ///
    /// Panics if no endpoint is bound.
    #[must_use]
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        assert!(
            !self.acceptors.is_empty(),
            "actor `{}` has no bound endpoints",
            self.dispatch.name()
        );
        self.endpoints_unchecked()
    }

    fn endpoints_unchecked(&self) -> Vec<SocketAddr> {
        self.acceptors.iter().map(Acceptor::endpoint).collect()
    }

    /// Shared access to the dispatch handler.
    #[must_use]
    pub fn dispatch(&self) -> &D { &self.dispatch }

    /// Exclusive access to the dispatch handler while the actor is idle.
    pub fn dispatch_mut(&mut self) -> Option<&mut D> {
        if self.thread.is_some() {
            return None;
        }
        Arc::get_mut(&mut self.dispatch)
    }

    /// Whether the reactor thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool { self.thread.is_some() }

    /// Number of live channels in the reactor-side table.
    #[must_use]
    pub fn channel_count(&self) -> usize { self.live.load(Ordering::Acquire) }
}

impl<D: Dispatch> Drop for Actor<D> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            warn!(
                "actor dropped while running; terminating: name={}",
                self.dispatch.name()
            );
            self.terminate();
        }
    }
}

impl<D: Dispatch> std::fmt::Debug for Actor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.dispatch.name())
            .field("endpoints", &self.endpoints_unchecked())
            .field("running", &self.is_running())
            .field("channels", &self.channel_count())
            .finish_non_exhaustive()
    }
}
