//! Listening sockets feeding accepted connections into a reactor.
//!
//! Binding happens eagerly on the control thread in [`Acceptor::new`], so a
//! port conflict is reported to whoever asked for the endpoint. The accept
//! loop itself runs on the reactor: [`Acceptor::listen`] registers a
//! duplicate of the socket with the reactor's driver and
//! [`Listener::bind`] spawns the loop once the reactor thread picks it up.

mod backoff;

use std::net::{SocketAddr, TcpListener as StdTcpListener};

pub use backoff::BackoffConfig;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::sleep,
};

use crate::{error::ActorError, panic::run_guarded, reactor::Reactor};

/// A bound listening socket.
///
/// # Examples
///
/// ```
/// use std::net::{Ipv4Addr, SocketAddr};
///
/// use actorwire::acceptor::Acceptor;
///
/// let acceptor = Acceptor::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).expect("bind");
/// assert_ne!(acceptor.endpoint().port(), 0);
/// ```
#[derive(Debug)]
pub struct Acceptor {
    listener: StdTcpListener,
    endpoint: SocketAddr,
}

impl Acceptor {
    /// Bind `endpoint` and prepare it for non-blocking accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Bind`] if the address cannot be claimed.
    pub fn new(endpoint: SocketAddr) -> Result<Self, ActorError> {
        let bind_error = |source| ActorError::Bind { endpoint, source };
        let listener = StdTcpListener::bind(endpoint).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let endpoint = listener.local_addr().map_err(bind_error)?;
        Ok(Self { listener, endpoint })
    }

    /// The concrete address this acceptor is bound to.
    ///
    /// Differs from the requested endpoint when port 0 was used.
    #[must_use]
    pub fn endpoint(&self) -> SocketAddr { self.endpoint }

    /// Register a duplicate of the socket with `reactor`.
    ///
    /// The returned [`Listener`] can be moved to the reactor thread. The
    /// acceptor keeps the original descriptor, so the endpoint stays claimed
    /// until the acceptor is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Listen`] if the socket cannot be duplicated or
    /// registered.
    pub fn listen(&self, reactor: &Reactor) -> Result<Listener, ActorError> {
        let listen_error = |source| ActorError::Listen {
            endpoint: self.endpoint,
            source,
        };
        let duplicate = self.listener.try_clone().map_err(listen_error)?;
        let _guard = reactor.enter();
        let listener = TcpListener::from_std(duplicate).map_err(listen_error)?;
        Ok(Listener {
            listener,
            endpoint: self.endpoint,
        })
    }
}

/// Reactor-side half of an [`Acceptor`].
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    endpoint: SocketAddr,
}

impl Listener {
    /// Address the listener accepts on.
    #[must_use]
    pub fn endpoint(&self) -> SocketAddr { self.endpoint }

    /// Start accepting, passing each connection and its peer address to
    /// `handler`.
    ///
    /// Accept failures are logged and retried with exponential back-off; they
    /// never reach `handler`. The loop runs until the reactor stops or the
    /// returned handle is aborted.
    ///
    /// # Panics
    ///
    /// Panics if called outside the reactor thread (or any other
    /// [`LocalSet`](tokio::task::LocalSet) context).
    pub fn bind<H>(self, backoff: BackoffConfig, handler: H) -> JoinHandle<()>
    where
        H: FnMut(TcpStream, SocketAddr) + 'static,
    {
        tokio::task::spawn_local(accept_loop(self, backoff, handler))
    }
}

async fn accept_loop<H>(listener: Listener, backoff: BackoffConfig, mut handler: H)
where
    H: FnMut(TcpStream, SocketAddr),
{
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    debug!("acceptor listening: endpoint={}", listener.endpoint);
    loop {
        match listener.listener.accept().await {
            Ok((stream, peer_addr)) => {
                run_guarded("connection handler", || handler(stream, peer_addr));
                delay = backoff.initial_delay;
            }
            Err(e) => {
                warn!(
                    "accept error: error={e:?}, endpoint={}, retry_in={delay:?}",
                    listener.endpoint
                );
                sleep(delay).await;
                delay = backoff.next_delay(delay);
            }
        }
    }
}
