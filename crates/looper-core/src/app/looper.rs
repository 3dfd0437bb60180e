//! Looper - a loop's shared state and the reference type clients hold.
//!
//! - `Looper` is a thin `Arc` wrapper; clones point at the same loop.
//! - The queue is built on the loop thread (`OnceLock`); Ready is published after.
//! - One loop per thread, tracked in a thread-local.
//! - The drain loop itself lives in `worker_loop`.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::builder::LoopBuilder;
use super::config::{LoopConfig, LoopMode};
use super::handle::Handle;
use super::status::{Counters, LoopCounts};
use super::worker_loop;
use crate::domain::{ItemKind, LoopError, LoopId, LoopState};
use crate::ports::Clock;
use crate::queue::{QueueClosed, WorkQueue};

thread_local! {
    static CURRENT: RefCell<Option<Looper>> = const { RefCell::new(None) };
}

static MAIN: OnceLock<Looper> = OnceLock::new();

/// Lifecycle cell: blocking waiters use the condvar, async observers the watch channel.
struct Lifecycle {
    state: Mutex<LoopState>,
    changed: Condvar,
    watch: watch::Sender<LoopState>,
}

impl Lifecycle {
    fn new() -> Self {
        let (watch, _) = watch::channel(LoopState::Uninitialized);
        Self {
            state: Mutex::new(LoopState::Uninitialized),
            changed: Condvar::new(),
            watch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self) -> LoopState {
        *self.lock()
    }

    fn publish(&self, state: &mut LoopState, next: LoopState) {
        *state = next;
        self.watch.send_replace(next);
        self.changed.notify_all();
    }

    /// Apply a legal transition; illegal ones are ignored and reported as `false`.
    fn advance(&self, next: LoopState) -> bool {
        let mut state = self.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        self.publish(&mut state, next);
        true
    }

    /// Publish `Ready`, or `Stopping` when `quit_requested` says a quit arrived
    /// while preparing. Waiters never observe the intermediate `Ready`.
    fn publish_ready(&self, quit_requested: impl FnOnce() -> bool) -> LoopState {
        let mut state = self.lock();
        if !state.can_transition_to(LoopState::Ready) {
            return *state;
        }
        let next = if quit_requested() {
            LoopState::Stopping
        } else {
            LoopState::Ready
        };
        self.publish(&mut state, next);
        next
    }

    /// Jump to `Terminated` from wherever the loop is. Returns `false` if it already was.
    fn terminate(&self) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            return false;
        }
        self.publish(&mut state, LoopState::Terminated);
        true
    }

    /// Block until `done(state)` holds or the deadline passes; returns the last state seen.
    fn wait_until(&self, done: impl Fn(LoopState) -> bool, deadline: Option<Instant>) -> LoopState {
        let mut state = self.lock();
        while !done(*state) {
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        *state
    }
}

pub(crate) struct LoopShared {
    id: LoopId,
    config: LoopConfig,
    clock: Arc<dyn Clock>,
    queue: OnceLock<WorkQueue>,
    thread: OnceLock<ThreadId>,
    quit: AtomicBool,
    lifecycle: Lifecycle,
    counters: Counters,
}

/// Reference to a loop. Cheap to clone, `Send + Sync`; never executes items itself.
#[derive(Clone)]
pub struct Looper {
    shared: Arc<LoopShared>,
}

impl Looper {
    pub(crate) fn new(config: LoopConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                id: LoopId::generate(),
                config,
                clock,
                queue: OnceLock::new(),
                thread: OnceLock::new(),
                quit: AtomicBool::new(false),
                lifecycle: Lifecycle::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Attach a new loop to the calling thread.
    ///
    /// Fails with `DuplicateLoopOnThread` if the thread already owns one.
    pub fn prepare(config: LoopConfig) -> Result<PreparedLoop, LoopError> {
        LoopBuilder::from_config(config).prepare()
    }

    /// Like [`Looper::prepare`], and register the loop as the process-wide main loop.
    pub fn prepare_main(config: LoopConfig) -> Result<PreparedLoop, LoopError> {
        LoopBuilder::from_config(config).prepare_main()
    }

    /// The loop attached to the calling thread, if any.
    pub fn current() -> Option<Looper> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// The process-wide main loop, once prepared. Stays registered after it terminates.
    pub fn main() -> Option<Looper> {
        MAIN.get().cloned()
    }

    pub fn id(&self) -> LoopId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn mode(&self) -> LoopMode {
        self.shared.config.mode
    }

    pub fn config(&self) -> &LoopConfig {
        &self.shared.config
    }

    pub fn state(&self) -> LoopState {
        self.shared.lifecycle.get()
    }

    pub fn is_main(&self) -> bool {
        MAIN.get().is_some_and(|main| main == self)
    }

    /// Is the calling thread this loop's thread?
    pub fn is_current_thread(&self) -> bool {
        self.shared.thread.get() == Some(&std::thread::current().id())
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.thread.get().copied()
    }

    pub fn is_quit_requested(&self) -> bool {
        self.shared.quit.load(Ordering::SeqCst)
    }

    /// Bind a plain handle (no payload dispatcher).
    pub fn handle(&self) -> Result<Handle, LoopError> {
        Handle::bind(self)
    }

    /// Request a cooperative stop. Idempotent.
    ///
    /// The item currently executing (if any) completes; nothing still queued
    /// starts afterwards, and further submissions fail with `LoopTerminated`.
    pub fn quit(&self) {
        let already = self.shared.quit.swap(true, Ordering::SeqCst);
        self.shared.lifecycle.advance(LoopState::Stopping);
        if let Some(queue) = self.shared.queue.get() {
            queue.close(None);
        }
        if !already {
            info!(loop_id = %self.id(), name = self.name(), "quit requested");
        }
    }

    /// Stop accepting submissions, run every item already due, then stop.
    ///
    /// Delayed items that are not due yet are dropped. A later [`Looper::quit`]
    /// still stops immediately.
    pub fn quit_safely(&self) {
        if self.is_quit_requested() {
            return;
        }
        let Some(queue) = self.shared.queue.get() else {
            // Not prepared yet: nothing can be queued, so this is a plain quit.
            return self.quit();
        };
        self.shared.lifecycle.advance(LoopState::Stopping);
        queue.close(Some(self.shared.clock.now()));
        info!(loop_id = %self.id(), name = self.name(), "quit requested (draining due items)");
    }

    pub fn counts(&self) -> LoopCounts {
        let pending = self.shared.queue.get().map_or(0, WorkQueue::len);
        self.shared.counters.snapshot(pending)
    }

    /// Block until the loop publishes readiness.
    ///
    /// Returns `LoopTerminated` if it stopped (or failed to prepare) instead.
    pub fn wait_ready(&self) -> Result<(), LoopError> {
        let state = self.shared.lifecycle.wait_until(|s| !s.is_pending(), None);
        self.readiness(state)
    }

    /// [`Looper::wait_ready`] with an upper bound; `NotReady` on timeout.
    pub fn wait_ready_timeout(&self, timeout: Duration) -> Result<(), LoopError> {
        let deadline = Instant::now() + timeout;
        let state = self
            .shared
            .lifecycle
            .wait_until(|s| !s.is_pending(), Some(deadline));
        self.readiness(state)
    }

    /// Await readiness from async code.
    pub async fn ready(&self) -> Result<(), LoopError> {
        let mut rx = self.watch_state();
        let state = *rx
            .wait_for(|s| !s.is_pending())
            .await
            .map_err(|_| LoopError::LoopTerminated(self.id()))?;
        self.readiness(state)
    }

    /// Lifecycle updates for async observers.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.shared.lifecycle.watch.subscribe()
    }

    /// Block until the loop has terminated.
    pub fn wait_terminated(&self) {
        self.shared.lifecycle.wait_until(LoopState::is_terminal, None);
    }

    /// Returns `true` if the loop terminated within `timeout`.
    pub fn wait_terminated_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.shared
            .lifecycle
            .wait_until(LoopState::is_terminal, Some(deadline))
            .is_terminal()
    }

    fn readiness(&self, state: LoopState) -> Result<(), LoopError> {
        if state.is_pending() {
            Err(LoopError::NotReady(self.id()))
        } else if state.accepts_work() {
            Ok(())
        } else {
            Err(LoopError::LoopTerminated(self.id()))
        }
    }

    /// Push an item onto this loop's queue.
    pub(crate) fn submit(&self, kind: ItemKind, delay: Duration) -> Result<u64, LoopError> {
        let Some(queue) = self.shared.queue.get() else {
            return Err(if self.state().is_terminal() {
                LoopError::LoopTerminated(self.id())
            } else {
                LoopError::NotReady(self.id())
            });
        };

        queue.push(kind, delay).map_err(|QueueClosed| {
            self.shared.counters.rejected();
            warn!(loop_id = %self.id(), name = self.name(), "submission rejected: loop is stopping");
            LoopError::LoopTerminated(self.id())
        })
    }

    /// Prepare on the calling thread: Preparing -> (queue constructed) -> Ready.
    pub(crate) fn attach_current_thread(&self) -> Result<(), LoopError> {
        self.shared.lifecycle.advance(LoopState::Preparing);

        if let Some(existing) = Looper::current() {
            self.shared.lifecycle.terminate();
            return Err(LoopError::DuplicateLoopOnThread {
                thread: current_thread_name(),
                existing: existing.id(),
            });
        }

        let _ = self.shared.thread.set(std::thread::current().id());
        let queue = self
            .shared
            .queue
            .get_or_init(|| WorkQueue::new(Arc::clone(&self.shared.clock)));
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));

        // A quit before readiness had no queue to close; close it before anyone can see Ready.
        let state = self.shared.lifecycle.publish_ready(|| {
            let quit = self.shared.quit.load(Ordering::SeqCst);
            if quit {
                queue.close(None);
            }
            quit
        });
        if state == LoopState::Stopping {
            info!(loop_id = %self.id(), name = self.name(), "loop prepared after quit; stopping");
        } else {
            info!(
                loop_id = %self.id(),
                name = self.name(),
                mode = ?self.mode(),
                thread = %current_thread_name(),
                "loop ready"
            );
        }
        Ok(())
    }

    pub(crate) fn register_main(&self) -> Result<(), LoopError> {
        MAIN.set(self.clone()).map_err(|_| {
            let existing = MAIN.get().map_or(self.id(), Looper::id);
            LoopError::MainLoopExists(existing)
        })
    }

    pub(crate) fn queue(&self) -> Option<&WorkQueue> {
        self.shared.queue.get()
    }

    pub(crate) fn quit_flag(&self) -> &AtomicBool {
        &self.shared.quit
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.shared.lifecycle.advance(LoopState::Running)
    }

    /// Tear down after the drain loop exits (or the thread dies). Idempotent.
    ///
    /// Pending items are discarded: shutdown is best effort, no drain guarantee.
    pub(crate) fn finish(&self) {
        self.shared.lifecycle.advance(LoopState::Stopping);
        if let Some(queue) = self.shared.queue.get() {
            queue.close(None);
            let dropped = queue.discard();
            if dropped > 0 {
                self.shared.counters.dropped(dropped);
                debug!(loop_id = %self.id(), dropped, "discarded pending items");
            }
        }

        if self.is_current_thread() {
            CURRENT.with(|current| {
                let mut current = current.borrow_mut();
                if current.as_ref() == Some(self) {
                    *current = None;
                }
            });
        }

        if self.shared.lifecycle.terminate() {
            let counts = self.counts();
            info!(
                loop_id = %self.id(),
                name = self.name(),
                executed = counts.executed,
                panicked = counts.panicked,
                dropped = counts.dropped,
                "loop terminated"
            );
        }
    }
}

impl PartialEq for Looper {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Looper {}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}

fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

/// A loop attached to the calling thread, not yet draining.
///
/// Not `Send`: the loop must be run on the thread that prepared it.
/// Dropping it without running terminates the loop.
pub struct PreparedLoop {
    looper: Looper,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for PreparedLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedLoop")
            .field("looper", &self.looper)
            .finish()
    }
}

impl PreparedLoop {
    pub(crate) fn new(looper: Looper) -> Self {
        Self {
            looper,
            _not_send: PhantomData,
        }
    }

    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    pub fn handle(&self) -> Result<Handle, LoopError> {
        Handle::bind(&self.looper)
    }

    /// Drain on the calling thread until quit; returns the final counts.
    pub fn run(self) -> LoopCounts {
        worker_loop::drain(&self.looper);
        self.looper.counts()
    }
}

impl Drop for PreparedLoop {
    fn drop(&mut self) {
        if !self.looper.state().is_terminal() {
            self.looper.quit();
            self.looper.finish();
        }
    }
}
