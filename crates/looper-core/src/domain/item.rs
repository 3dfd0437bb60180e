//! WorkItem - a unit of deferred execution owned by exactly one queue.

use std::fmt;
use std::time::Instant;

/// A zero-argument action to run on the loop thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A tagged payload bound to the dispatcher of the handle that sent it.
///
/// Object-safe: the queue stores payload messages of every
/// handle side by side, whatever their payload type.
pub trait Deliver: Send {
    fn tag(&self) -> i32;

    /// Invoke the dispatcher with the payload (consumes the message).
    fn deliver(self: Box<Self>);
}

pub enum ItemKind {
    Callable(Job),
    Message(Box<dyn Deliver>),
}

impl ItemKind {
    pub fn callable<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        ItemKind::Callable(Box::new(f))
    }

    /// Tag of a payload message, `None` for callables.
    pub fn tag(&self) -> Option<i32> {
        match self {
            ItemKind::Callable(_) => None,
            ItemKind::Message(message) => Some(message.tag()),
        }
    }
}

impl fmt::Debug for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Callable(_) => f.write_str("Callable"),
            ItemKind::Message(message) => write!(f, "Message(tag={})", message.tag()),
        }
    }
}

/// Scheduled item.
///
/// Invariant: `ready_at >= enqueued_at`. The item is consumed by [`WorkItem::run`],
/// so it can only ever execute once.
#[derive(Debug)]
pub struct WorkItem {
    pub(crate) seq: u64,
    pub(crate) enqueued_at: Instant,
    pub(crate) ready_at: Instant,
    pub(crate) kind: ItemKind,
}

impl WorkItem {
    pub(crate) fn new(seq: u64, enqueued_at: Instant, ready_at: Instant, kind: ItemKind) -> Self {
        debug_assert!(ready_at >= enqueued_at);
        Self {
            seq,
            enqueued_at,
            ready_at,
            kind,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn ready_at(&self) -> Instant {
        self.ready_at
    }

    pub fn is_immediate(&self) -> bool {
        self.ready_at == self.enqueued_at
    }

    pub fn tag(&self) -> Option<i32> {
        self.kind.tag()
    }

    /// Execute the action or deliver the payload on the current thread.
    pub fn run(self) {
        match self.kind {
            ItemKind::Callable(job) => job(),
            ItemKind::Message(message) => message.deliver(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    struct Recorder {
        tag: i32,
        seen: Arc<AtomicI32>,
    }

    impl Deliver for Recorder {
        fn tag(&self) -> i32 {
            self.tag
        }

        fn deliver(self: Box<Self>) {
            self.seen.store(self.tag, Ordering::SeqCst);
        }
    }

    #[test]
    fn callable_runs_once_when_item_runs() {
        let hits = Arc::new(AtomicI32::new(0));
        let h = Arc::clone(&hits);
        let now = Instant::now();
        let item = WorkItem::new(
            0,
            now,
            now,
            ItemKind::callable(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(item.is_immediate());
        assert_eq!(item.tag(), None);
        item.run();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn message_item_exposes_tag_and_delivers() {
        let seen = Arc::new(AtomicI32::new(0));
        let now = Instant::now();
        let item = WorkItem::new(
            3,
            now,
            now + Duration::from_millis(5),
            ItemKind::Message(Box::new(Recorder {
                tag: 42,
                seen: Arc::clone(&seen),
            })),
        );

        assert!(!item.is_immediate());
        assert_eq!(item.tag(), Some(42));
        assert_eq!(format!("{:?}", item.kind), "Message(tag=42)");
        item.run();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
