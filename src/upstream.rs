//! Reply sink handed to [`Dispatch`](crate::dispatch::Dispatch) with every
//! request.
//!
//! An [`Upstream`] addresses frames to one tag on one channel. It only holds a
//! weak reference, so an evicted channel is released immediately and every
//! later call on the upstream quietly does nothing.

use std::sync::Weak;

use tracing::trace;

use crate::{
    channel::ServerChannel,
    message::{Frame, Tag},
};

/// Tag-bound, non-owning reply handle.
///
/// Not `Clone`: each request gets exactly one terminal [`Frame::Choke`].
#[derive(Debug)]
pub struct Upstream {
    channel: Weak<ServerChannel>,
    tag: Tag,
}

impl Upstream {
    /// Bind a reply sink for `tag` to `channel`.
    #[must_use]
    pub fn new(channel: Weak<ServerChannel>, tag: Tag) -> Self { Self { channel, tag } }

    /// Tag every frame from this upstream is addressed to.
    #[must_use]
    pub fn tag(&self) -> Tag { self.tag }

    /// Whether the upstream has been closed or its channel is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.channel.strong_count() == 0 }

    /// Queue a [`Frame::Chunk`] carrying `payload`.
    pub fn write(&self, payload: impl Into<Vec<u8>>) {
        self.send(Frame::Chunk {
            tag: self.tag,
            payload: payload.into(),
        });
    }

    /// Queue a [`Frame::Error`]. The stream stays open; call
    /// [`close`](Self::close) to end it.
    pub fn error(&self, code: i32, reason: impl Into<String>) {
        self.send(Frame::Error {
            tag: self.tag,
            code,
            reason: reason.into(),
        });
    }

    /// End the stream with a [`Frame::Choke`].
    ///
    /// The channel reference is released before the frame is queued, so only
    /// the first call sends anything and later writes are dropped.
    pub fn close(&mut self) {
        let Some(channel) = std::mem::take(&mut self.channel).upgrade() else {
            trace!(tag = self.tag, "close on released upstream");
            return;
        };
        channel.write(Frame::Choke { tag: self.tag });
    }

    fn send(&self, frame: Frame) {
        match self.channel.upgrade() {
            Some(channel) => {
                channel.write(frame);
            }
            None => trace!(tag = self.tag, "upstream released; frame dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::StreamExt;
    use tokio::{
        net::{TcpListener, TcpStream},
        task::LocalSet,
        time::timeout,
    };
    use tokio_util::codec::FramedRead;

    use super::*;
    use crate::{
        channel::{Channel, ChannelId},
        codec::{ClientCodec, ServerCodec},
    };

    type ClientReader = FramedRead<TcpStream, ClientCodec>;

    const WAIT: Duration = Duration::from_secs(5);

    /// Server channel with its writer bound, plus a frame reader on the peer.
    async fn bound_channel() -> (Arc<ServerChannel>, ClientReader) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let mut channel = Channel::new(
            ChannelId::new(1),
            accepted.expect("accept").0,
            ServerCodec::default(),
        );
        channel.bind_writer(|_| {});
        let reader = FramedRead::new(client.expect("connect"), ClientCodec::default());
        (Arc::new(channel), reader)
    }

    async fn next_frame(reader: &mut ClientReader) -> Option<Frame> {
        timeout(WAIT, reader.next())
            .await
            .expect("frame timeout")
            .map(|frame| frame.expect("decode frame"))
    }

    #[test]
    fn upstream_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Upstream>();
    }

    #[tokio::test]
    async fn frames_arrive_in_order_and_close_sends_one_choke() {
        LocalSet::new()
            .run_until(async {
                let (channel, mut reader) = bound_channel().await;
                let mut upstream = Upstream::new(Arc::downgrade(&channel), 7);

                upstream.write(b"pong".to_vec());
                upstream.error(5, "partial");
                upstream.close();
                upstream.close();
                upstream.write("late");

                assert_eq!(
                    next_frame(&mut reader).await,
                    Some(Frame::Chunk {
                        tag: 7,
                        payload: b"pong".to_vec(),
                    })
                );
                assert_eq!(
                    next_frame(&mut reader).await,
                    Some(Frame::Error {
                        tag: 7,
                        code: 5,
                        reason: "partial".into(),
                    })
                );
                assert_eq!(next_frame(&mut reader).await, Some(Frame::Choke { tag: 7 }));

                drop(channel);
                assert_eq!(next_frame(&mut reader).await, None);
            })
            .await;
    }

    #[tokio::test]
    async fn close_releases_only_this_upstream() {
        LocalSet::new()
            .run_until(async {
                let (channel, _reader) = bound_channel().await;
                let mut first = Upstream::new(Arc::downgrade(&channel), 1);
                let second = Upstream::new(Arc::downgrade(&channel), 2);

                first.close();

                assert!(first.is_closed());
                assert!(!second.is_closed());
                assert_eq!(first.tag(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn upstream_is_inert_once_channel_is_dropped() {
        LocalSet::new()
            .run_until(async {
                let (channel, _reader) = bound_channel().await;
                let mut upstream = Upstream::new(Arc::downgrade(&channel), 3);

                drop(channel);

                assert!(upstream.is_closed());
                upstream.write("ignored");
                upstream.error(1, "ignored");
                upstream.close();
            })
            .await;
    }
}
