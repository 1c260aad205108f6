//! Outbound connections, the client-side counterpart of
//! [`Acceptor`](crate::acceptor::Acceptor).
//!
//! A connected stream is usually wrapped in a
//! [`ClientChannel`](crate::channel::ClientChannel), which writes
//! [`Message`](crate::message::Message)s and decodes
//! [`Frame`](crate::message::Frame)s.

use std::{io, net::SocketAddr, time::Duration};

use log::debug;
use thiserror::Error;
use tokio::{
    net::{TcpSocket, TcpStream},
    task::JoinHandle,
};

/// Default upper bound on connection establishment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while establishing an outbound connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The socket could not be created or the peer refused the connection.
    #[error("failed to connect to {endpoint}: {source}")]
    Io {
        /// Endpoint being connected to.
        endpoint: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The connection was not established within the configured timeout.
    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    Timeout {
        /// Endpoint being connected to.
        endpoint: SocketAddr,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

/// Connects to a single endpoint.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use actorwire::connector::{ConnectError, Connector};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ConnectError> {
/// let stream = Connector::new("127.0.0.1:9000".parse().expect("valid address"))
///     .timeout(Duration::from_secs(1))
///     .connect()
///     .await?;
/// # drop(stream);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Connector {
    endpoint: SocketAddr,
    timeout: Duration,
    nodelay: bool,
}

impl Connector {
    /// Prepare a connection to `endpoint`.
    #[must_use]
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }

    /// Bound connection establishment by `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure `TCP_NODELAY` on the connected socket. Enabled by default.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Endpoint this connector targets.
    #[must_use]
    pub fn endpoint(&self) -> SocketAddr { self.endpoint }

    /// Establish the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Io`] if the socket cannot be created or the
    /// peer rejects the connection, and [`ConnectError::Timeout`] if the
    /// configured timeout elapses first.
    pub async fn connect(self) -> Result<TcpStream, ConnectError> {
        let io_error = |source| ConnectError::Io {
            endpoint: self.endpoint,
            source,
        };
        let socket = if self.endpoint.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(io_error)?;

        let stream = tokio::time::timeout(self.timeout, socket.connect(self.endpoint))
            .await
            .map_err(|_| ConnectError::Timeout {
                endpoint: self.endpoint,
                timeout: self.timeout,
            })?
            .map_err(io_error)?;
        stream.set_nodelay(self.nodelay).map_err(io_error)?;
        debug!("connected: endpoint={}", self.endpoint);
        Ok(stream)
    }

    /// Connect in the background and hand the outcome to `handler`.
    ///
    /// # Panics
    ///
    /// Panics if called outside the reactor thread (or any other
    /// [`LocalSet`](tokio::task::LocalSet) context).
    pub fn bind<H>(self, handler: H) -> JoinHandle<()>
    where
        H: FnOnce(Result<TcpStream, ConnectError>) + 'static,
    {
        tokio::task::spawn_local(async move { handler(self.connect().await) })
    }
}
