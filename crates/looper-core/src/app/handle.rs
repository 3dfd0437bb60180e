//! Handle - a shareable capability to submit work to one loop.
//!
//! Payload messages travel as `Envelope<D>` boxed into `Box<dyn Deliver>`, so
//! one queue holds messages for dispatchers of any payload type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::looper::Looper;
use crate::domain::{Deliver, HandleId, ItemKind, LoopError};
use crate::impls::NoopDispatch;
use crate::ports::{Dispatch, Message};

/// Submits callables and payload messages to a loop.
///
/// A handle references the loop, it does not own it. Once the loop stops,
/// every submission fails with `LoopTerminated`. Clones share the id and
/// the dispatcher.
pub struct Handle<D: Dispatch = NoopDispatch> {
    id: HandleId,
    looper: Looper,
    dispatcher: Arc<D>,
}

impl Handle {
    /// Bind a handle without a payload dispatcher.
    ///
    /// Messages sent through it are discarded on the loop thread.
    pub fn bind(looper: &Looper) -> Result<Self, LoopError> {
        Self::with_dispatcher(looper, NoopDispatch::new())
    }
}

impl<D: Dispatch> Handle<D> {
    /// Bind a handle whose payload messages go to `dispatcher`.
    pub fn with_dispatcher(looper: &Looper, dispatcher: D) -> Result<Self, LoopError> {
        Self::with_shared_dispatcher(looper, Arc::new(dispatcher))
    }

    pub fn with_shared_dispatcher(looper: &Looper, dispatcher: Arc<D>) -> Result<Self, LoopError> {
        let state = looper.state();
        if state.is_pending() {
            return Err(LoopError::NotReady(looper.id()));
        }
        if !state.accepts_work() {
            return Err(LoopError::LoopTerminated(looper.id()));
        }

        let id = HandleId::generate();
        debug!(handle_id = %id, loop_id = %looper.id(), "handle bound");
        Ok(Self {
            id,
            looper: looper.clone(),
            dispatcher,
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    /// Run `f` on the loop thread as soon as it is free.
    ///
    /// Never runs `f` on the caller, even when called from the loop thread.
    pub fn post<F>(&self, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed(f, Duration::ZERO)
    }

    /// Run `f` on the loop thread no earlier than `delay` from now.
    pub fn post_delayed<F>(&self, f: F, delay: Duration) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.looper.submit(ItemKind::callable(f), delay)?;
        trace!(handle_id = %self.id, seq, ?delay, "callable posted");
        Ok(())
    }

    /// Deliver `(tag, payload)` to this handle's dispatcher on the loop thread.
    pub fn send(&self, tag: i32, payload: D::Payload) -> Result<(), LoopError> {
        self.send_message_delayed(Message::new(tag, payload), Duration::ZERO)
    }

    pub fn send_delayed(
        &self,
        tag: i32,
        payload: D::Payload,
        delay: Duration,
    ) -> Result<(), LoopError> {
        self.send_message_delayed(Message::new(tag, payload), delay)
    }

    pub fn send_message(&self, message: Message<D::Payload>) -> Result<(), LoopError> {
        self.send_message_delayed(message, Duration::ZERO)
    }

    pub fn send_message_delayed(
        &self,
        message: Message<D::Payload>,
        delay: Duration,
    ) -> Result<(), LoopError> {
        let tag = message.tag;
        let envelope = Envelope {
            dispatcher: Arc::clone(&self.dispatcher),
            message,
        };
        let seq = self
            .looper
            .submit(ItemKind::Message(Box::new(envelope)), delay)?;
        trace!(handle_id = %self.id, seq, tag, ?delay, "message sent");
        Ok(())
    }
}

impl<D: Dispatch> Clone for Handle<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            looper: self.looper.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<D: Dispatch> fmt::Debug for Handle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("loop_id", &self.looper.id())
            .finish()
    }
}

/// A payload message on its way to a dispatcher.
struct Envelope<D: Dispatch> {
    dispatcher: Arc<D>,
    message: Message<D::Payload>,
}

impl<D: Dispatch> Deliver for Envelope<D> {
    fn tag(&self) -> i32 {
        self.message.tag
    }

    fn deliver(self: Box<Self>) {
        let Envelope {
            dispatcher,
            message,
        } = *self;
        dispatcher.dispatch(message);
    }
}
