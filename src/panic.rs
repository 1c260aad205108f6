//! Panic containment for callbacks running on the reactor thread.
//!
//! A panic escaping a callback would unwind through the event loop and take
//! every channel owned by the actor down with it. [`run_guarded`] catches the
//! panic, logs the payload and lets the loop carry on.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

use log::error;

/// Displayable view of a panic payload.
///
/// String payloads are shown verbatim; anything else falls back to `Debug`.
///
/// ```
/// use actorwire::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).to_string(), "bang");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Wrap a panic payload for logging.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Run `f`, returning `None` and logging under `context` if it panics.
pub(crate) fn run_guarded<R>(context: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            let panic_msg = format_panic(panic);
            error!("{context} panicked: panic={panic_msg}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_call_returns_value() {
        assert_eq!(run_guarded("adder", || 2 + 2), Some(4));
    }

    #[test]
    fn guarded_call_swallows_panic() {
        let result: Option<()> = run_guarded("exploder", || panic!("boom"));
        assert!(result.is_none());
    }
}
