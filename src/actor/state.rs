//! Reactor-side state of an [`Actor`](super::Actor).
//!
//! Everything here lives on the reactor thread behind an `Rc`. Channel
//! callbacks hold a `Weak` so a torn-down actor silently ignores late events.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    net::SocketAddr,
    rc::{Rc, Weak},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::info;
use tokio::net::TcpStream;
use tracing::trace;

use crate::{
    channel::{ChannelError, ChannelId, ServerChannel},
    codec::ServerCodec,
    dispatch::Dispatch,
    message::Message,
    metrics,
    panic::run_guarded,
    upstream::Upstream,
};

pub(super) struct Core<D> {
    dispatch: Arc<D>,
    codec: ServerCodec,
    channels: RefCell<HashMap<ChannelId, Arc<ServerChannel>>>,
    next_id: Cell<u64>,
    live: Arc<AtomicUsize>,
}

impl<D: Dispatch> Core<D> {
    pub(super) fn new(dispatch: Arc<D>, codec: ServerCodec, live: Arc<AtomicUsize>) -> Rc<Self> {
        Rc::new(Self {
            dispatch,
            codec,
            channels: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            live,
        })
    }

    /// Wrap an accepted connection and register it in the table.
    pub(super) fn on_connection(self: &Rc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let id = ChannelId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let mut channel = ServerChannel::new(id, stream, self.codec.clone());
        let core = Rc::downgrade(self);
        channel.bind_reader(
            {
                let core = core.clone();
                move |message| with_core(&core, |core| core.on_message(id, message))
            },
            {
                let core = core.clone();
                move |error| with_core(&core, |core| core.on_failure(id, &error))
            },
        );
        channel.bind_writer(move |error| with_core(&core, |core| core.on_failure(id, &error)));

        let live = {
            let mut channels = self.channels.borrow_mut();
            channels.insert(id, Arc::new(channel));
            channels.len()
        };
        self.live.store(live, Ordering::Release);
        info!("channel opened: channel={id}, peer={peer_addr}, live={live}");
    }

    fn on_message(&self, id: ChannelId, message: Message) {
        let channel = self.channels.borrow().get(&id).map(Arc::downgrade);
        let Some(channel) = channel else {
            trace!(channel = %id, tag = message.tag(), "message for evicted channel dropped");
            return;
        };
        let upstream = Upstream::new(channel, message.tag());
        if run_guarded("dispatch", || self.dispatch.invoke(message, upstream)).is_none() {
            metrics::inc_dispatch_panics();
        }
    }

    fn on_failure(&self, id: ChannelId, error: &ChannelError) {
        let (evicted, live) = {
            let mut channels = self.channels.borrow_mut();
            (channels.remove(&id), channels.len())
        };
        let Some(channel) = evicted else {
            return;
        };
        self.live.store(live, Ordering::Release);
        match channel.peer_addr() {
            Some(peer) => info!("channel evicted: channel={id}, peer={peer}, reason={error}, live={live}"),
            None => info!("channel evicted: channel={id}, reason={error}, live={live}"),
        }
    }
}

impl<D> Drop for Core<D> {
    fn drop(&mut self) { self.live.store(0, Ordering::Release); }
}

fn with_core<D>(core: &Weak<Core<D>>, f: impl FnOnce(&Core<D>)) {
    if let Some(core) = core.upgrade() {
        f(&core);
    }
}
