//! Dispatch handlers that record what they see.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use actorwire::{Dispatch, Message, Upstream};

/// How a [`RecordingDispatch`] answers each request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Write `"pong"` and close.
    Pong,
    /// Write the request payload back and close.
    Echo,
    /// Write each chunk in order, then close.
    Chunks(Vec<Vec<u8>>),
    /// Send an error frame, then close.
    Error {
        /// Error code to report.
        code: i32,
        /// Reason to report.
        reason: String,
    },
    /// Drop the upstream without replying.
    Silent,
    /// Keep the upstream for the test to use later.
    Stash,
    /// Panic inside `invoke`.
    Panic,
}

#[derive(Default)]
struct Record {
    messages: Vec<Message>,
    stashed: Vec<Upstream>,
}

/// [`Dispatch`] that records every message and replies per [`Reply`].
pub struct RecordingDispatch {
    name: String,
    reply: Reply,
    record: Mutex<Record>,
    arrived: Condvar,
}

impl RecordingDispatch {
    /// Create a handler called `name` answering with `reply`.
    #[must_use]
    pub fn new(name: impl Into<String>, reply: Reply) -> Self {
        Self {
            name: name.into(),
            reply,
            record: Mutex::new(Record::default()),
            arrived: Condvar::new(),
        }
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages received so far, in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> { self.record().messages.clone() }

    /// Block until at least `count` messages have arrived.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Message> {
        let deadline = Instant::now() + timeout;
        let mut record = self.record();
        while record.messages.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(
                !remaining.is_zero(),
                "timed out waiting for {count} messages, saw {}",
                record.messages.len()
            );
            record = self
                .arrived
                .wait_timeout(record, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        record.messages.clone()
    }

    /// Take every upstream kept under [`Reply::Stash`].
    #[must_use]
    pub fn take_stashed(&self) -> Vec<Upstream> { std::mem::take(&mut self.record().stashed) }
}

impl Dispatch for RecordingDispatch {
    fn name(&self) -> &str { &self.name }

    fn invoke(&self, message: Message, mut upstream: Upstream) {
        let payload = message.payload().to_vec();
        {
            let mut record = self.record();
            record.messages.push(message);
            if matches!(self.reply, Reply::Stash) {
                record.stashed.push(upstream);
                self.arrived.notify_all();
                return;
            }
        }
        self.arrived.notify_all();

        match &self.reply {
            Reply::Pong => upstream.write("pong"),
            Reply::Echo => upstream.write(payload),
            Reply::Chunks(chunks) => {
                for chunk in chunks {
                    upstream.write(chunk.clone());
                }
            }
            Reply::Error { code, reason } => upstream.error(*code, reason.clone()),
            Reply::Silent => return,
            Reply::Stash => unreachable!("stashed upstreams return early"),
            Reply::Panic => panic!("dispatch `{}` exploded", self.name),
        }
        upstream.close();
    }
}
