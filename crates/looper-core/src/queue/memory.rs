//! In-memory work queue: a delay-aware min-heap behind a mutex + condvar.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Poll, QueueClosed};
use crate::domain::{ItemKind, WorkItem};
use crate::ports::Clock;

/// Delays longer than this are clamped so `now + delay` cannot overflow.
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Heap entry.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap on
/// `(ready_at, seq)`: earliest first, insertion order among equals.
struct ScheduledItem(WorkItem);

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for ScheduledItem {}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .0
            .ready_at
            .cmp(&self.0.ready_at)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

struct QueueState {
    scheduled: BinaryHeap<ScheduledItem>,

    /// Next sequence number to assign (FIFO tie-break).
    next_seq: u64,

    /// No more pushes accepted.
    closed: bool,

    /// Set by a graceful close: items due at or before this instant still run.
    drain_until: Option<Instant>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            scheduled: BinaryHeap::new(),
            next_seq: 0,
            closed: false,
            drain_until: None,
        }
    }

    fn next(&mut self, now: Instant) -> Poll {
        let limit = if self.closed {
            match self.drain_until {
                Some(limit) => limit.min(now),
                None => return Poll::Finished,
            }
        } else {
            now
        };

        let due = matches!(self.scheduled.peek(), Some(top) if top.0.ready_at <= limit);
        if due && let Some(ScheduledItem(item)) = self.scheduled.pop() {
            return Poll::Ready(item);
        }

        if self.closed {
            Poll::Finished
        } else {
            Poll::Pending
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        self.scheduled.peek().map(|entry| entry.0.ready_at)
    }
}

/// Unbounded multi-producer, single-consumer work queue.
///
/// - `push` is safe from any thread, including the consumer itself.
/// - `try_pop` / `poll` / `wait` are for the owning loop thread only.
/// - An item is never returned before its `ready_at`.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    clock: Arc<dyn Clock>,
}

impl WorkQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            available: Condvar::new(),
            clock,
        }
    }

    // Item panics are caught outside the lock, so a poisoned guard still
    // holds consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Insert an item that becomes eligible after `delay`.
    ///
    /// Returns the item's sequence number. Wakes a blocked consumer so it
    /// recomputes its wake time.
    pub fn push(&self, kind: ItemKind, delay: Duration) -> Result<u64, QueueClosed> {
        let enqueued_at = self.clock.now();
        let ready_at = enqueued_at + delay.min(MAX_DELAY);

        let seq = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueClosed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .scheduled
                .push(ScheduledItem(WorkItem::new(seq, enqueued_at, ready_at, kind)));
            seq
        };

        // Notify outside the lock
        self.available.notify_one();
        Ok(seq)
    }

    /// Remove the next eligible item without blocking.
    pub fn try_pop(&self) -> Option<WorkItem> {
        match self.poll() {
            Poll::Ready(item) => Some(item),
            Poll::Pending | Poll::Finished => None,
        }
    }

    /// Non-blocking step for a busy-polling consumer.
    pub fn poll(&self) -> Poll {
        let now = self.clock.now();
        self.lock().next(now)
    }

    /// Block until an item is eligible, the queue is finished, or `quit` is set.
    ///
    /// Never returns [`Poll::Pending`]. `quit` is read under the queue lock and
    /// [`WorkQueue::close`] notifies under the same lock, so a quit cannot slip
    /// in between the check and the wait.
    pub fn wait(&self, quit: &AtomicBool) -> Poll {
        let mut state = self.lock();
        loop {
            if quit.load(Ordering::SeqCst) {
                return Poll::Finished;
            }

            let now = self.clock.now();
            match state.next(now) {
                Poll::Pending => {}
                done => return done,
            }

            state = match state.next_wake() {
                Some(wake_at) => {
                    let timeout = wake_at.saturating_duration_since(now);
                    self.available
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Stop accepting pushes and wake the consumer.
    ///
    /// - `None`: the consumer sees [`Poll::Finished`] right away.
    /// - `Some(t)`: items with `ready_at <= t` are still handed out first.
    ///
    /// A hard close always wins over a graceful one.
    pub fn close(&self, drain_until: Option<Instant>) {
        {
            let mut state = self.lock();
            if !state.closed {
                state.closed = true;
                state.drain_until = drain_until;
            } else if drain_until.is_none() {
                state.drain_until = None;
            }
            self.available.notify_all();
        }
    }

    /// Drop every pending item and return how many there were.
    pub fn discard(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().scheduled);
        // Dropped outside the lock: captured values may run arbitrary Drop code.
        pending.len()
    }

    pub fn len(&self) -> usize {
        self.lock().scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, SystemClock};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn manual_queue() -> (WorkQueue, ManualClock) {
        let clock = ManualClock::new();
        (WorkQueue::new(Arc::new(clock.clone())), clock)
    }

    fn record(log: &Arc<Mutex<Vec<u32>>>, n: u32) -> ItemKind {
        let log = Arc::clone(log);
        ItemKind::callable(move || log.lock().unwrap().push(n))
    }

    fn drain(queue: &WorkQueue) {
        while let Some(item) = queue.try_pop() {
            item.run();
        }
    }

    #[test]
    fn immediate_items_pop_in_insertion_order() {
        let (queue, _clock) = manual_queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..10 {
            queue.push(record(&log, n), Duration::ZERO).unwrap();
        }

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn delayed_item_is_held_until_ready() {
        let (queue, clock) = manual_queue();
        queue
            .push(ItemKind::callable(|| {}), Duration::from_millis(300))
            .unwrap();

        assert!(queue.try_pop().is_none());
        clock.advance(Duration::from_millis(299));
        assert!(queue.try_pop().is_none());
        clock.advance(Duration::from_millis(1));

        let item = queue.try_pop().expect("item due at 300ms");
        assert_eq!(item.ready_at() - item.enqueued_at(), Duration::from_millis(300));
    }

    #[test]
    fn earlier_ready_time_overtakes_insertion_order() {
        let (queue, clock) = manual_queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.push(record(&log, 1), Duration::from_millis(500)).unwrap();
        queue.push(record(&log, 2), Duration::from_millis(100)).unwrap();
        queue.push(record(&log, 3), Duration::ZERO).unwrap();

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![3]);

        clock.advance(Duration::from_millis(500));
        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn closed_queue_rejects_pushes() {
        let (queue, _clock) = manual_queue();
        queue.close(None);
        assert!(queue.is_closed());
        assert_eq!(
            queue.push(ItemKind::callable(|| {}), Duration::ZERO),
            Err(QueueClosed)
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn hard_close_finishes_with_items_pending() {
        let (queue, _clock) = manual_queue();
        queue.push(ItemKind::callable(|| {}), Duration::ZERO).unwrap();
        queue.close(None);

        assert!(matches!(queue.poll(), Poll::Finished));
        assert_eq!(queue.discard(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn graceful_close_drains_due_items_only() {
        let (queue, clock) = manual_queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.push(record(&log, 1), Duration::ZERO).unwrap();
        queue.push(record(&log, 2), Duration::ZERO).unwrap();
        queue.push(record(&log, 3), Duration::from_secs(1)).unwrap();

        queue.close(Some(clock.now()));
        clock.advance(Duration::from_secs(2));

        drain(&queue);
        assert!(matches!(queue.poll(), Poll::Finished));
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(queue.discard(), 1);
    }

    #[test]
    fn hard_close_overrides_graceful_close() {
        let (queue, clock) = manual_queue();
        queue.push(ItemKind::callable(|| {}), Duration::ZERO).unwrap();
        queue.close(Some(clock.now()));
        queue.close(None);
        assert!(matches!(queue.poll(), Poll::Finished));
    }

    #[test]
    fn wait_wakes_on_push_from_other_thread() {
        let queue = Arc::new(WorkQueue::new(Arc::new(SystemClock)));
        let quit = Arc::new(AtomicBool::new(false));

        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            let quit = Arc::clone(&quit);
            move || matches!(queue.wait(&quit), Poll::Ready(_))
        });

        thread::sleep(Duration::from_millis(50));
        queue.push(ItemKind::callable(|| {}), Duration::ZERO).unwrap();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn wait_sleeps_until_ready_time() {
        let queue = WorkQueue::new(Arc::new(SystemClock));
        let quit = AtomicBool::new(false);
        let start = Instant::now();
        queue
            .push(ItemKind::callable(|| {}), Duration::from_millis(80))
            .unwrap();

        assert!(matches!(queue.wait(&quit), Poll::Ready(_)));
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn wait_recomputes_wake_time_when_earlier_item_arrives() {
        let queue = Arc::new(WorkQueue::new(Arc::new(SystemClock)));
        let quit = Arc::new(AtomicBool::new(false));
        queue
            .push(ItemKind::callable(|| {}), Duration::from_secs(10))
            .unwrap();

        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            let quit = Arc::clone(&quit);
            move || match queue.wait(&quit) {
                Poll::Ready(item) => Some(item.seq()),
                _ => None,
            }
        });

        thread::sleep(Duration::from_millis(30));
        queue
            .push(ItemKind::callable(|| {}), Duration::from_millis(20))
            .unwrap();

        let start = Instant::now();
        assert_eq!(consumer.join().unwrap(), Some(1));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_returns_finished_on_quit() {
        let queue = Arc::new(WorkQueue::new(Arc::new(SystemClock)));
        let quit = Arc::new(AtomicBool::new(false));

        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            let quit = Arc::clone(&quit);
            move || matches!(queue.wait(&quit), Poll::Finished)
        });

        thread::sleep(Duration::from_millis(30));
        quit.store(true, Ordering::SeqCst);
        queue.close(None);
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let (queue, _clock) = manual_queue();
        let queue = Arc::new(queue);
        let hits = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let hits = Arc::clone(&hits);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let hits = Arc::clone(&hits);
                        queue
                            .push(
                                ItemKind::callable(move || {
                                    hits.fetch_add(1, Ordering::SeqCst);
                                }),
                                Duration::ZERO,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        assert_eq!(queue.len(), 800);
        drain(&queue);
        assert_eq!(hits.load(Ordering::SeqCst), 800);
    }
}
