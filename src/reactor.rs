//! Single-threaded cooperative event loop.
//!
//! A [`Reactor`] wraps a current-thread Tokio runtime and a
//! [`LocalSet`](tokio::task::LocalSet). [`Reactor::run`] drives socket
//! readiness for every task spawned with `spawn_local` from inside a callback
//! and executes posted callbacks in arrival order. Nothing on the reactor ever
//! runs concurrently with anything else on it, which is what lets channel and
//! actor state live in plain `Rc`/`RefCell` containers.
//!
//! [`Reactor::post`] is the only entry point safe to call from other threads.
//! Stop requests travel through the same queue, so every callback posted
//! before a stop still runs before [`Reactor::run`] returns.

use std::{
    fmt,
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::{
    runtime::{Builder, EnterGuard, Runtime},
    sync::mpsc,
    task::LocalSet,
};
use tracing::trace;

use crate::panic::run_guarded;

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Posted {
    Callback(Callback),
    Stop,
}

/// Cooperative event loop owned by one thread at a time.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, mpsc};
///
/// use actorwire::reactor::Reactor;
///
/// let reactor = Arc::new(Reactor::new().expect("build reactor"));
/// let (tx, rx) = mpsc::channel();
///
/// let worker = std::thread::spawn({
///     let reactor = Arc::clone(&reactor);
///     move || reactor.run()
/// });
///
/// reactor.post(move || tx.send("ran on the reactor").expect("send"));
/// reactor.stop();
/// worker.join().expect("reactor thread");
///
/// assert_eq!(rx.recv().expect("recv"), "ran on the reactor");
/// ```
pub struct Reactor {
    runtime: Runtime,
    queue: mpsc::UnboundedSender<Posted>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Posted>>>,
}

impl Reactor {
    /// Build a reactor with I/O and timer drivers enabled.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the underlying runtime cannot be created.
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (queue, inbox) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            queue,
            inbox: Mutex::new(Some(inbox)),
        })
    }

    fn inbox(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<Posted>>> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the event loop on the calling thread until a stop request is
    /// processed.
    ///
    /// Tasks spawned onto the reactor while it runs are dropped before this
    /// method returns. Callbacks posted after the stop request stay queued
    /// for the next call.
    ///
    /// # Panics
    ///
    /// Panics if the reactor is already running on another thread.
    pub fn run(&self) {
        let Some(mut inbox) = self.inbox().take() else {
            panic!("reactor is already running on another thread");
        };

        let local = LocalSet::new();
        self.runtime.block_on(local.run_until(drain(&mut inbox)));
        {
            let _guard = self.runtime.enter();
            drop(local);
        }

        *self.inbox() = Some(inbox);
    }

    /// Schedule `callback` to run on the reactor thread.
    ///
    /// Safe to call from any thread, including from inside another callback.
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        send(&self.queue, Posted::Callback(Box::new(callback)));
    }

    /// Request that [`run`](Self::run) return once every callback posted
    /// before this call has executed.
    pub fn stop(&self) { send(&self.queue, Posted::Stop); }

    /// Return a cloneable handle for posting from other threads.
    #[must_use]
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            queue: self.queue.clone(),
        }
    }

    /// Enter the reactor's runtime context.
    ///
    /// While the guard is alive, I/O sources created on the calling thread
    /// register with this reactor's driver.
    pub fn enter(&self) -> EnterGuard<'_> { self.runtime.enter() }

    /// Whether some thread is currently inside [`run`](Self::run).
    #[must_use]
    pub fn is_running(&self) -> bool { self.inbox().is_none() }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Cloneable, thread-safe handle for posting to a [`Reactor`].
#[derive(Clone)]
pub struct ReactorHandle {
    queue: mpsc::UnboundedSender<Posted>,
}

impl ReactorHandle {
    /// Schedule `callback` to run on the reactor thread.
    ///
    /// Posting to a reactor that has been dropped is a no-op.
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        send(&self.queue, Posted::Callback(Box::new(callback)));
    }

    /// Request that the reactor stop after draining earlier callbacks.
    pub fn stop(&self) { send(&self.queue, Posted::Stop); }
}

impl fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

fn send(queue: &mpsc::UnboundedSender<Posted>, posted: Posted) {
    if queue.send(posted).is_err() {
        trace!("reactor dropped; discarding posted request");
    }
}

async fn drain(inbox: &mut mpsc::UnboundedReceiver<Posted>) {
    while let Some(posted) = inbox.recv().await {
        match posted {
            Posted::Callback(callback) => {
                run_guarded("posted callback", callback);
            }
            Posted::Stop => return,
        }
    }
}
