//! Application entry point for decoded requests.
//!
//! An [`Actor`](crate::actor::Actor) owns one [`Dispatch`] implementation and
//! calls [`Dispatch::invoke`] on its reactor thread for every decoded
//! [`Message`]. Replies go back through the [`Upstream`] passed alongside.

use std::{fmt, sync::Arc};

use crate::{message::Message, upstream::Upstream};

/// Handler turning requests into replies.
///
/// `invoke` runs on the reactor thread and should return promptly. Long
/// running work belongs on another thread; the [`Upstream`] is `Send` and can
/// be moved there.
///
/// # Examples
///
/// ```
/// use actorwire::{dispatch::Dispatch, message::Message, upstream::Upstream};
///
/// struct Echo;
///
/// impl Dispatch for Echo {
///     fn name(&self) -> &str { "echo" }
///
///     fn invoke(&self, message: Message, mut upstream: Upstream) {
///         upstream.write(message.into_payload());
///         upstream.close();
///     }
/// }
/// ```
pub trait Dispatch: Send + Sync + 'static {
    /// Name used for the reactor thread.
    fn name(&self) -> &str;

    /// Handle one request.
    fn invoke(&self, message: Message, upstream: Upstream);
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn name(&self) -> &str { (**self).name() }

    fn invoke(&self, message: Message, upstream: Upstream) { (**self).invoke(message, upstream); }
}

impl<D: Dispatch + ?Sized> Dispatch for Box<D> {
    fn name(&self) -> &str { (**self).name() }

    fn invoke(&self, message: Message, upstream: Upstream) { (**self).invoke(message, upstream); }
}

/// [`Dispatch`] backed by a closure. Built with [`from_fn`].
pub struct FnDispatch<F> {
    name: String,
    handler: F,
}

impl<F> fmt::Debug for FnDispatch<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDispatch")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Dispatch for FnDispatch<F>
where
    F: Fn(Message, Upstream) + Send + Sync + 'static,
{
    fn name(&self) -> &str { &self.name }

    fn invoke(&self, message: Message, upstream: Upstream) { (self.handler)(message, upstream); }
}

/// Adapt `handler` into a [`Dispatch`] called `name`.
///
/// ```
/// use actorwire::dispatch::{Dispatch, from_fn};
///
/// let dispatch = from_fn("pong", |_message, mut upstream| {
///     upstream.write("pong");
///     upstream.close();
/// });
/// assert_eq!(dispatch.name(), "pong");
/// ```
pub fn from_fn<F>(name: impl Into<String>, handler: F) -> FnDispatch<F>
where
    F: Fn(Message, Upstream) + Send + Sync + 'static,
{
    FnDispatch {
        name: name.into(),
        handler,
    }
}
