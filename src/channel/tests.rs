//! Tests for [`Channel`] over loopback sockets.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rstest::rstest;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::LocalSet,
    time::timeout,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing_test::traced_test;

use super::*;
use crate::codec::{ClientCodec, MIN_FRAME_LENGTH, ServerCodec};

const WAIT: Duration = Duration::from_secs(5);

/// Returns `(accepted, client)` ends of a fresh loopback connection.
async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (accepted.expect("accept").0, client.expect("connect"))
}

fn server_channel(stream: TcpStream) -> ServerChannel {
    Channel::new(ChannelId::new(1), stream, ServerCodec::default())
}

/// Binds the read direction, forwarding messages and the failure to queues.
fn bind_reader_to_queues(
    channel: &mut ServerChannel,
) -> (
    mpsc::UnboundedReceiver<Message>,
    mpsc::UnboundedReceiver<ChannelError>,
) {
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (err_tx, err_rx) = mpsc::unbounded_channel();
    channel.bind_reader(
        move |message| {
            let _ = msg_tx.send(message);
        },
        move |error| {
            let _ = err_tx.send(error);
        },
    );
    (msg_rx, err_rx)
}

#[tokio::test]
async fn reader_delivers_messages_in_arrival_order() {
    LocalSet::new()
        .run_until(async {
            let (accepted, client) = socket_pair().await;
            let mut channel = server_channel(accepted);
            let (mut messages, _failures) = bind_reader_to_queues(&mut channel);

            let mut client = FramedWrite::new(client, ClientCodec::default());
            for tag in 1..=3 {
                client
                    .send(Message::new(0, tag, b"ping".to_vec()))
                    .await
                    .expect("send");
            }

            for tag in 1..=3 {
                let message = timeout(WAIT, messages.recv())
                    .await
                    .expect("message timeout")
                    .expect("message");
                assert_eq!(message.tag(), tag);
            }
        })
        .await;
}

#[tokio::test]
async fn reader_reports_clean_close_once() {
    LocalSet::new()
        .run_until(async {
            let (accepted, client) = socket_pair().await;
            let mut channel = server_channel(accepted);
            let (_messages, mut failures) = bind_reader_to_queues(&mut channel);

            drop(client);

            let error = timeout(WAIT, failures.recv())
                .await
                .expect("failure timeout")
                .expect("failure");
            assert!(error.is_clean_close());
            assert!(matches!(error, ChannelError::Read(_)));
            // Callback was FnOnce and the sender is gone with it.
            assert!(failures.recv().await.is_none());
        })
        .await;
}

#[tokio::test]
#[traced_test]
async fn reader_stops_on_malformed_input() {
    LocalSet::new()
        .run_until(async {
            let (accepted, mut client) = socket_pair().await;
            let mut channel = server_channel(accepted);
            let (mut messages, mut failures) = bind_reader_to_queues(&mut channel);

            client
                .write_all(&[0, 0, 0, 1, 0xfc])
                .await
                .expect("write garbage");

            let error = timeout(WAIT, failures.recv())
                .await
                .expect("failure timeout")
                .expect("failure");
            assert_eq!(error.kind(), "malformed");
            assert!(messages.try_recv().is_err());
        })
        .await;
    assert!(logs_contain("channel direction failed"));
}

#[tokio::test]
async fn writer_flushes_queued_frames_in_order() {
    LocalSet::new()
        .run_until(async {
            let (accepted, client) = socket_pair().await;
            let mut channel = server_channel(accepted);

            assert!(channel.write(Frame::Chunk {
                tag: 9,
                payload: b"a".to_vec(),
            }));
            assert!(channel.write(Frame::Choke { tag: 9 }));
            channel.bind_writer(|error| panic!("unexpected write failure: {error}"));

            let mut client = FramedRead::new(client, ClientCodec::default());
            let first = timeout(WAIT, client.next()).await.expect("timeout");
            let second = timeout(WAIT, client.next()).await.expect("timeout");
            assert_eq!(
                first.expect("frame").expect("decode"),
                Frame::Chunk {
                    tag: 9,
                    payload: b"a".to_vec(),
                }
            );
            assert!(second.expect("frame").expect("decode").is_choke());
        })
        .await;
}

#[tokio::test]
async fn writer_failure_rejects_later_writes() {
    LocalSet::new()
        .run_until(async {
            let (accepted, _client) = socket_pair().await;
            let mut channel = Channel::new(
                ChannelId::new(2),
                accepted,
                ServerCodec::new(MIN_FRAME_LENGTH),
            );
            let (err_tx, mut err_rx) = mpsc::unbounded_channel();
            channel.bind_writer(move |error| {
                let _ = err_tx.send(error);
            });

            assert!(channel.write(Frame::Chunk {
                tag: 1,
                payload: vec![0; MIN_FRAME_LENGTH * 2],
            }));
            let error = timeout(WAIT, err_rx.recv())
                .await
                .expect("failure timeout")
                .expect("failure");
            assert!(matches!(
                error,
                ChannelError::Write(CodecError::OversizedFrame { .. })
            ));

            tokio::task::yield_now().await;
            assert!(!channel.write(Frame::Choke { tag: 1 }));
        })
        .await;
}

#[tokio::test]
async fn dropping_channel_closes_connection() {
    LocalSet::new()
        .run_until(async {
            let (accepted, client) = socket_pair().await;
            let mut channel = server_channel(accepted);
            let _queues = bind_reader_to_queues(&mut channel);
            channel.bind_writer(|_| {});

            drop(channel);

            let mut client = FramedRead::new(client, ClientCodec::default());
            let next = timeout(WAIT, client.next()).await.expect("eof timeout");
            assert!(next.is_none(), "peer should observe end of stream");
        })
        .await;
}

#[rstest]
#[case::reader(true)]
#[case::writer(false)]
#[tokio::test]
#[should_panic(expected = "already bound")]
async fn binding_a_direction_twice_panics(#[case] reader: bool) {
    LocalSet::new()
        .run_until(async move {
            let (accepted, _client) = socket_pair().await;
            let mut channel = server_channel(accepted);
            if reader {
                let _first = bind_reader_to_queues(&mut channel);
                let _second = bind_reader_to_queues(&mut channel);
            } else {
                channel.bind_writer(|_| {});
                channel.bind_writer(|_| {});
            }
        })
        .await;
}

#[test]
fn channel_id_displays_inner_value() {
    assert_eq!(ChannelId::from(42).to_string(), "ChannelId(42)");
    assert_eq!(ChannelId::new(7).as_u64(), 7);
}
