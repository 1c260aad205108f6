//! Blocking client speaking the actor's wire format.
//!
//! Tests drive actors from plain threads, so the client avoids an async
//! runtime entirely and uses a read timeout to keep hung tests bounded.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use actorwire::{ClientCodec, CodecError, Frame, Message};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// Read timeout applied to every [`TestClient`].
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous connection to an actor under test.
pub struct TestClient {
    stream: TcpStream,
    codec: ClientCodec,
    buffer: BytesMut,
}

impl TestClient {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while connecting or configuring the socket.
    pub fn connect(endpoint: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(endpoint)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            codec: ClientCodec::default(),
            buffer: BytesMut::new(),
        })
    }

    /// Local address of the client socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be queried.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.stream.local_addr() }

    /// Encode and write `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn send(&mut self, message: Message) -> Result<(), CodecError> {
        let mut dst = BytesMut::new();
        self.codec.encode(message, &mut dst)?;
        self.stream.write_all(&dst)?;
        Ok(())
    }

    /// Write raw bytes, bypassing the codec.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> { self.stream.write_all(bytes) }

    /// Read the next frame, or `None` once the server has closed the
    /// connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input, truncation, I/O failure or when
    /// the read timeout elapses.
    pub fn recv(&mut self) -> Result<Option<Frame>, CodecError> {
        let mut chunk = [0_u8; 4096];
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }
            let read = self.stream.read(&mut chunk)?;
            if read == 0 {
                return self.codec.decode_eof(&mut self.buffer);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next frame, panicking if none arrives.
    ///
    /// # Panics
    ///
    /// Panics on end of stream, timeout or decode failure.
    pub fn expect_frame(&mut self) -> Frame {
        match self.recv() {
            Ok(Some(frame)) => frame,
            Ok(None) => panic!("connection closed while waiting for a frame"),
            Err(e) => panic!("failed to receive frame: {e}"),
        }
    }

    /// Assert that the server closes the connection without sending more
    /// frames.
    ///
    /// # Panics
    ///
    /// Panics if a frame arrives or the connection stays open.
    pub fn expect_eof(&mut self) {
        match self.recv() {
            Ok(None) => {}
            Ok(Some(frame)) => panic!("expected end of stream, got {frame:?}"),
            Err(e) => panic!("expected end of stream, got error: {e}"),
        }
    }

    /// Assert that the server drops the connection, either with an orderly
    /// close or a reset.
    ///
    /// A reset is accepted because a server closing with unread input queued
    /// makes the kernel abort the connection.
    ///
    /// # Panics
    ///
    /// Panics if a frame arrives or the connection stays open.
    pub fn expect_closed(&mut self) {
        match self.recv() {
            Ok(None) => {}
            Err(CodecError::Io(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                ) => {}
            Ok(Some(frame)) => panic!("expected closed connection, got {frame:?}"),
            Err(e) => panic!("expected closed connection, got error: {e}"),
        }
    }

    /// Assert that no frame arrives within `wait`.
    ///
    /// # Panics
    ///
    /// Panics if a frame arrives, the connection closes, or the socket
    /// timeout cannot be adjusted.
    pub fn expect_silence(&mut self, wait: Duration) {
        self.stream
            .set_read_timeout(Some(wait))
            .expect("set short read timeout");
        let outcome = self.recv();
        self.stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("restore read timeout");
        match outcome {
            Err(CodecError::Io(e))
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Ok(Some(frame)) => panic!("expected silence, got {frame:?}"),
            Ok(None) => panic!("expected silence, connection closed"),
            Err(e) => panic!("expected silence, got error: {e}"),
        }
    }

    /// Receive frames up to and including the choke for `tag`.
    ///
    /// # Panics
    ///
    /// Panics if the stream ends or a frame for another tag arrives first.
    pub fn collect_until_choke(&mut self, tag: u64) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            let frame = self.expect_frame();
            assert_eq!(frame.tag(), tag, "frame addressed to unexpected tag");
            let done = frame.is_choke();
            frames.push(frame);
            if done {
                return frames;
            }
        }
    }
}
