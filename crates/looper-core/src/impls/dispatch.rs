//! Stock dispatchers: `NoopDispatch` (default for plain handles) and
//! `FnDispatch` (closure adapter).

use std::fmt;
use std::marker::PhantomData;

use crate::ports::{Dispatch, Message};

/// Discards every message. Handles bound without a dispatcher use this.
pub struct NoopDispatch<P = ()> {
    _marker: PhantomData<fn(P)>,
}

impl<P> NoopDispatch<P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P> Default for NoopDispatch<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for NoopDispatch<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopDispatch")
    }
}

impl<P: Send + 'static> Dispatch for NoopDispatch<P> {
    type Payload = P;

    fn dispatch(&self, message: Message<P>) {
        tracing::trace!(tag = message.tag, "no dispatcher bound, message discarded");
    }
}

/// Adapts a closure into a [`Dispatch`].
pub struct FnDispatch<F, P> {
    f: F,
    _marker: PhantomData<fn(P)>,
}

impl<F, P> Dispatch for FnDispatch<F, P>
where
    F: Fn(Message<P>) + Send + Sync + 'static,
    P: Send + 'static,
{
    type Payload = P;

    fn dispatch(&self, message: Message<P>) {
        (self.f)(message)
    }
}

/// Build a dispatcher from a closure.
///
/// ```ignore
/// let handle = Handle::with_dispatcher(&looper, dispatch_fn(|msg: Message<String>| {
///     println!("{}: {}", msg.tag, msg.payload);
/// }))?;
/// ```
pub fn dispatch_fn<F, P>(f: F) -> FnDispatch<F, P>
where
    F: Fn(Message<P>) + Send + Sync + 'static,
    P: Send + 'static,
{
    FnDispatch {
        f,
        _marker: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fn_dispatch_forwards_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = dispatch_fn(move |msg: Message<&'static str>| {
            sink.lock().unwrap().push((msg.tag, msg.payload));
        });

        dispatcher.dispatch(Message::new(1, "a"));
        dispatcher.dispatch(Message::new(7, "b"));

        assert_eq!(*seen.lock().unwrap(), vec![(1, "a"), (7, "b")]);
    }

    #[test]
    fn noop_dispatch_accepts_any_tag() {
        let dispatcher = NoopDispatch::<String>::new();
        dispatcher.dispatch(Message::new(-1, "dropped".to_string()));
        dispatcher.dispatch(Message::new(i32::MAX, String::new()));
    }
}
