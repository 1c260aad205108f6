//! End-to-end behaviour of [`Actor`] over loopback sockets.

use std::{net::TcpListener, sync::Arc, time::Duration};

use actorwire::{Actor, ActorError, Frame, Message, Reactor, dispatch::from_fn};
use actorwire_testing::{
    LoggerHandle,
    RecordingDispatch,
    Reply,
    TestClient,
    logger,
    loopback,
    start_actor,
    wait_until,
};
use rstest::rstest;
use serial_test::serial;

const WAIT: Duration = Duration::from_secs(5);

fn ping(tag: u64) -> Message { Message::new(1, tag, b"ping".to_vec()) }

fn chunk(tag: u64, payload: &[u8]) -> Frame {
    Frame::Chunk {
        tag,
        payload: payload.to_vec(),
    }
}

#[test]
fn ping_is_answered_with_pong_then_choke() {
    let actor = start_actor(RecordingDispatch::new("pong", Reply::Pong));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(7)).expect("send");

    assert_eq!(client.expect_frame(), chunk(7, b"pong"));
    assert_eq!(client.expect_frame(), Frame::Choke { tag: 7 });
}

#[test]
fn unanswered_request_then_disconnect_evicts_channel() {
    let actor = start_actor(RecordingDispatch::new("silent", Reply::Silent));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(3)).expect("send");
    client.expect_silence(Duration::from_millis(100));
    assert_eq!(actor.dispatch().wait_for(1, WAIT)[0].tag(), 3);
    assert_eq!(actor.channel_count(), 1);

    drop(client);

    wait_until(WAIT, || actor.channel_count() == 0);
    assert!(actor.is_running());
}

#[test]
fn replies_are_routed_to_the_originating_connection() {
    let actor = start_actor(RecordingDispatch::new("echo", Reply::Echo));
    let endpoint = actor.endpoints()[0];
    let mut first = TestClient::connect(endpoint).expect("connect first");
    let mut second = TestClient::connect(endpoint).expect("connect second");

    first
        .send(Message::new(0, 1, b"first".to_vec()))
        .expect("send first");
    second
        .send(Message::new(0, 1, b"second".to_vec()))
        .expect("send second");

    assert_eq!(
        first.collect_until_choke(1),
        vec![chunk(1, b"first"), Frame::Choke { tag: 1 }]
    );
    assert_eq!(
        second.collect_until_choke(1),
        vec![chunk(1, b"second"), Frame::Choke { tag: 1 }]
    );
}

#[test]
#[should_panic(expected = "already running")]
fn running_twice_without_terminate_panics() {
    let mut actor = start_actor(RecordingDispatch::new("twice", Reply::Silent));
    let _ = actor.run(&[loopback()]);
}

#[test]
fn writes_after_close_are_dropped() {
    let actor = start_actor(RecordingDispatch::new("stash", Reply::Stash));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(5)).expect("send");
    actor.dispatch().wait_for(1, WAIT);
    let mut upstream = actor
        .dispatch()
        .take_stashed()
        .pop()
        .expect("stashed upstream");

    upstream.write("before");
    upstream.close();
    upstream.write("after");
    upstream.error(1, "after");
    upstream.close();
    assert!(upstream.is_closed());

    assert_eq!(
        client.collect_until_choke(5),
        vec![chunk(5, b"before"), Frame::Choke { tag: 5 }]
    );
    client.expect_silence(Duration::from_millis(100));
}

#[test]
fn error_frames_precede_the_choke() {
    let actor = start_actor(RecordingDispatch::new(
        "error",
        Reply::Error {
            code: 42,
            reason: "unknown method".into(),
        },
    ));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(9)).expect("send");

    assert_eq!(
        client.collect_until_choke(9),
        vec![
            Frame::Error {
                tag: 9,
                code: 42,
                reason: "unknown method".into(),
            },
            Frame::Choke { tag: 9 },
        ]
    );
}

#[test]
fn chunks_of_pipelined_requests_keep_enqueue_order() {
    let actor = start_actor(RecordingDispatch::new(
        "chunks",
        Reply::Chunks(vec![b"a".to_vec(), b"b".to_vec()]),
    ));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(1)).expect("send first");
    client.send(ping(2)).expect("send second");

    assert_eq!(
        client.collect_until_choke(1),
        vec![chunk(1, b"a"), chunk(1, b"b"), Frame::Choke { tag: 1 }]
    );
    assert_eq!(
        client.collect_until_choke(2),
        vec![chunk(2, b"a"), chunk(2, b"b"), Frame::Choke { tag: 2 }]
    );
    let tags: Vec<_> = actor.dispatch().messages().iter().map(Message::tag).collect();
    assert_eq!(tags, vec![1, 2]);
}

#[test]
fn upstreams_of_evicted_channels_are_inert() {
    let actor = start_actor(RecordingDispatch::new("evicted", Reply::Stash));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(4)).expect("send");
    actor.dispatch().wait_for(1, WAIT);
    let mut upstream = actor
        .dispatch()
        .take_stashed()
        .pop()
        .expect("stashed upstream");

    drop(client);
    wait_until(WAIT, || actor.channel_count() == 0);

    assert!(upstream.is_closed());
    upstream.write("ignored");
    upstream.close();
}

#[test]
fn malformed_input_evicts_only_the_offending_channel() {
    let actor = start_actor(RecordingDispatch::new("pong", Reply::Pong));
    let endpoint = actor.endpoints()[0];
    let mut healthy = TestClient::connect(endpoint).expect("connect healthy");
    let mut broken = TestClient::connect(endpoint).expect("connect broken");
    wait_until(WAIT, || actor.channel_count() == 2);

    broken
        .send_raw(&[0, 0, 0, 1, 0xfc])
        .expect("send garbage");
    broken.expect_closed();
    wait_until(WAIT, || actor.channel_count() == 1);

    healthy.send(ping(8)).expect("send");
    assert_eq!(healthy.expect_frame(), chunk(8, b"pong"));
}

#[test]
fn oversized_payload_claim_evicts_only_the_offending_channel() {
    let actor = start_actor(RecordingDispatch::new("pong", Reply::Pong));
    let endpoint = actor.endpoints()[0];
    let mut healthy = TestClient::connect(endpoint).expect("connect healthy");
    let mut hostile = TestClient::connect(endpoint).expect("connect hostile");
    wait_until(WAIT, || actor.channel_count() == 2);

    // An 11-byte body whose payload length varint claims 64 TiB.
    let mut frame = vec![0, 0, 0, 11, 0x00, 0x07, 0xFD];
    frame.extend_from_slice(&(1_u64 << 46).to_le_bytes());
    hostile.send_raw(&frame).expect("send frame");
    hostile.expect_closed();
    wait_until(WAIT, || actor.channel_count() == 1);

    healthy.send(ping(6)).expect("send");
    assert_eq!(healthy.expect_frame(), chunk(6, b"pong"));
    assert!(actor.is_running());
    assert!(actor.dispatch().messages().iter().all(|m| m.tag() == 6));
}

#[test]
fn oversized_requests_are_rejected() {
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let mut actor =
        Actor::new(reactor, RecordingDispatch::new("small", Reply::Pong)).max_frame_length(64);
    actor.run(&[loopback()]).expect("run");
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client
        .send(Message::new(0, 1, vec![0; 128]))
        .expect("send oversized");

    client.expect_closed();
    assert!(actor.dispatch().messages().is_empty());
    actor.terminate();
}

#[test]
fn bind_failure_is_reported_and_leaves_actor_idle() {
    let blocker = TcpListener::bind(loopback()).expect("bind blocker");
    let taken = blocker.local_addr().expect("blocker address");
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let mut actor = Actor::new(reactor, RecordingDispatch::new("busy", Reply::Pong));

    let err = actor.run(&[loopback(), taken]).expect_err("port is taken");

    assert!(matches!(err, ActorError::Bind { endpoint, .. } if endpoint == taken));
    assert!(!actor.is_running());
}

#[test]
fn terminate_closes_open_connections() {
    let mut actor = start_actor(RecordingDispatch::new("closing", Reply::Silent));
    let endpoint = actor.endpoints()[0];
    let mut client = TestClient::connect(endpoint).expect("connect");
    wait_until(WAIT, || actor.channel_count() == 1);

    actor.terminate();

    assert!(!actor.is_running());
    assert_eq!(actor.channel_count(), 0);
    client.expect_eof();
    assert!(std::net::TcpStream::connect(endpoint).is_err());
}

#[test]
fn terminated_actor_can_run_again() {
    let mut actor = start_actor(RecordingDispatch::new("again", Reply::Pong));
    actor.terminate();

    actor.run(&[loopback()]).expect("second run");
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");
    client.send(ping(2)).expect("send");
    assert_eq!(client.expect_frame(), chunk(2, b"pong"));
}

#[test]
#[should_panic(expected = "is not running")]
fn terminate_without_run_panics() {
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let mut actor = Actor::new(reactor, from_fn("idle", |_, _| {}));
    actor.terminate();
}

#[test]
#[should_panic(expected = "no bound endpoints")]
fn endpoints_without_acceptors_panics() {
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let actor = Actor::new(reactor, from_fn("idle", |_, _| {}));
    let _ = actor.endpoints();
}

#[test]
fn endpoints_report_every_bound_port() {
    let reactor = Arc::new(Reactor::new().expect("build reactor"));
    let mut actor = Actor::new(reactor, RecordingDispatch::new("multi", Reply::Pong));
    actor.run(&[loopback(), loopback()]).expect("run");

    let endpoints = actor.endpoints();
    assert_eq!(endpoints.len(), 2);
    assert_ne!(endpoints[0], endpoints[1]);
    for endpoint in endpoints {
        let mut client = TestClient::connect(endpoint).expect("connect");
        client.send(ping(1)).expect("send");
        assert_eq!(client.expect_frame(), chunk(1, b"pong"));
    }
    actor.terminate();
}

#[rstest]
#[serial]
fn dispatch_panic_is_logged_and_contained(mut logger: LoggerHandle) {
    let actor = start_actor(RecordingDispatch::new("explosive", Reply::Panic));
    let mut client = TestClient::connect(actor.endpoints()[0]).expect("connect");

    client.send(ping(1)).expect("send");
    actor.dispatch().wait_for(1, WAIT);
    client.send(ping(2)).expect("send again");
    actor.dispatch().wait_for(2, WAIT);

    assert!(actor.is_running());
    assert_eq!(actor.channel_count(), 1);
    drop(actor);
    assert!(logger.contains("dispatch panicked"));
}

#[rstest]
#[serial]
fn dropping_a_running_actor_terminates_it(mut logger: LoggerHandle) {
    let actor = start_actor(RecordingDispatch::new("dropped", Reply::Pong));
    let endpoint = actor.endpoints()[0];

    drop(actor);

    assert!(std::net::TcpStream::connect(endpoint).is_err());
    assert!(logger.contains("actor dropped while running"));
}
