//! Per-connection wrapper with independent read and write directions.
//!
//! A [`Channel`] owns one TCP connection. The read direction decodes items
//! with [`RpcCodec`] and hands them to a message callback; the write
//! direction queues items and flushes them from a writer task. Each
//! direction reports its first failure through its own callback and then
//! goes quiet. The channel never removes itself from anywhere: owners evict
//! it from their failure callbacks, and dropping it aborts both direction
//! tasks and closes the socket.
//!
//! Binding spawns local tasks, so [`Channel::bind_reader`] and
//! [`Channel::bind_writer`] must be called on a reactor thread.

mod error;

use std::{fmt, net::SocketAddr};

pub use error::ChannelError;
use futures::{SinkExt, StreamExt};
use log::warn;
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::AbortHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::{
    codec::{CodecError, EofError, RpcCodec},
    message::{Frame, Message, Wire},
    metrics::{self, Direction},
};

/// Identifier of a channel within one actor.
///
/// Identifiers are handed out sequentially and never reused while the actor
/// lives, unlike OS descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Create a new [`ChannelId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl From<u64> for ChannelId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ChannelId({})", self.0) }
}

/// Channel accepted by a server: decodes [`Message`]s, writes [`Frame`]s.
pub type ServerChannel = Channel<Message, Frame>;

/// Channel opened by a client: decodes [`Frame`]s, writes [`Message`]s.
pub type ClientChannel = Channel<Frame, Message>;

type Reader<I, O> = FramedRead<OwnedReadHalf, RpcCodec<I, O>>;
type Writer<I, O> = FramedWrite<OwnedWriteHalf, RpcCodec<I, O>>;

/// RAII guard keeping the live-channel gauge in step with channel lifetimes.
struct LiveChannel;

impl LiveChannel {
    fn new() -> Self {
        metrics::inc_channels();
        Self
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) { metrics::dec_channels(); }
}

/// One connection split into a read direction and a write direction.
pub struct Channel<I, O> {
    id: ChannelId,
    peer_addr: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<O>,
    reader: Option<Reader<I, O>>,
    writer: Option<(Writer<I, O>, mpsc::UnboundedReceiver<O>)>,
    tasks: Vec<AbortHandle>,
    _live: LiveChannel,
}

impl<I, O> Channel<I, O>
where
    I: Wire + 'static,
    O: Wire + 'static,
{
    /// Wrap `stream`, framing both directions with `codec`.
    ///
    /// Nothing is read or written until the directions are bound; items
    /// passed to [`write`](Self::write) before then are queued.
    #[must_use]
    pub fn new(id: ChannelId, stream: TcpStream, codec: RpcCodec<I, O>) -> Self {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("failed to retrieve peer address: channel={id}, error={e}");
                None
            }
        };
        let (read_half, write_half) = stream.into_split();
        let (outbound, queued) = mpsc::unbounded_channel();
        Self {
            id,
            peer_addr,
            outbound,
            reader: Some(FramedRead::new(read_half, codec.clone())),
            writer: Some((FramedWrite::new(write_half, codec), queued)),
            tasks: Vec::with_capacity(2),
            _live: LiveChannel::new(),
        }
    }

    /// Start the read direction.
    ///
    /// `on_message` receives every decoded item in arrival order.
    /// `on_failure` runs once when decoding fails, the socket errors or the
    /// peer closes the connection; no reads happen afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the read direction is already bound, or if called outside a
    /// [`LocalSet`](tokio::task::LocalSet).
    pub fn bind_reader<M, F>(&mut self, on_message: M, on_failure: F)
    where
        M: FnMut(I) + 'static,
        F: FnOnce(ChannelError) + 'static,
    {
        let Some(reader) = self.reader.take() else {
            panic!("read direction of {} is already bound", self.id);
        };
        let task = tokio::task::spawn_local(read_loop(self.id, reader, on_message, on_failure));
        self.tasks.push(task.abort_handle());
    }

    /// Start the write direction.
    ///
    /// Queued items are encoded and flushed in enqueue order. `on_failure`
    /// runs once if encoding or flushing fails; the writer stops and later
    /// [`write`](Self::write) calls report `false`.
    ///
    /// # Panics
    ///
    /// Panics if the write direction is already bound, or if called outside
    /// a [`LocalSet`](tokio::task::LocalSet).
    pub fn bind_writer<F>(&mut self, on_failure: F)
    where
        F: FnOnce(ChannelError) + 'static,
    {
        let Some((writer, queued)) = self.writer.take() else {
            panic!("write direction of {} is already bound", self.id);
        };
        let task = tokio::task::spawn_local(write_loop(self.id, writer, queued, on_failure));
        self.tasks.push(task.abort_handle());
    }
}

impl<I, O> Channel<I, O> {
    /// Identifier assigned by the owner.
    #[must_use]
    pub fn id(&self) -> ChannelId { self.id }

    /// Remote address, if it could be determined at construction.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// Queue `item` on the write direction.
    ///
    /// Returns `false` if the write direction has already failed; the item
    /// is dropped in that case.
    pub fn write(&self, item: O) -> bool { self.outbound.send(item).is_ok() }
}

impl<I, O> fmt::Debug for Channel<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("reader_bound", &self.reader.is_none())
            .field("writer_bound", &self.writer.is_none())
            .finish_non_exhaustive()
    }
}

impl<I, O> Drop for Channel<I, O> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn report(id: ChannelId, error: &ChannelError) {
    if error.is_clean_close() {
        debug!(channel = %id, "peer closed channel");
    } else {
        metrics::inc_errors(error.kind());
        debug!(channel = %id, kind = error.kind(), %error, "channel direction failed");
    }
}

async fn read_loop<I, O, M, F>(id: ChannelId, mut reader: Reader<I, O>, mut on_message: M, on_failure: F)
where
    I: Wire,
    M: FnMut(I),
    F: FnOnce(ChannelError),
{
    let error = loop {
        match reader.next().await {
            Some(Ok(item)) => {
                metrics::inc_frames(Direction::Inbound);
                on_message(item);
            }
            Some(Err(e)) => break ChannelError::Read(e),
            None => break ChannelError::Read(CodecError::Eof(EofError::CleanClose)),
        }
    };
    report(id, &error);
    on_failure(error);
}

async fn write_loop<I, O, F>(
    id: ChannelId,
    mut writer: Writer<I, O>,
    mut queued: mpsc::UnboundedReceiver<O>,
    on_failure: F,
) where
    O: Wire,
    F: FnOnce(ChannelError),
{
    while let Some(item) = queued.recv().await {
        if let Err(e) = flush_batch(&mut writer, &mut queued, item).await {
            let error = ChannelError::Write(e);
            report(id, &error);
            on_failure(error);
            return;
        }
    }
}

/// Encode `first` plus everything already queued behind it, then flush once.
async fn flush_batch<I, O>(
    writer: &mut Writer<I, O>,
    queued: &mut mpsc::UnboundedReceiver<O>,
    first: O,
) -> Result<(), CodecError>
where
    O: Wire,
{
    writer.feed(first).await?;
    metrics::inc_frames(Direction::Outbound);
    while let Ok(item) = queued.try_recv() {
        writer.feed(item).await?;
        metrics::inc_frames(Direction::Outbound);
    }
    writer.flush().await
}

#[cfg(test)]
mod tests;
