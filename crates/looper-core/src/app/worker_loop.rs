//! WorkerLoop - the drain loop a loop thread runs.
//!
//! Flow:
//! 1. Ready -> Running (skipped if quit was already requested)
//! 2. Take items the mode's way and run them; a panic is caught per item
//! 3. Teardown: discard what is left, publish Terminated

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use tracing::{error, trace};

use super::config::LoopMode;
use super::looper::Looper;
use crate::domain::WorkItem;
use crate::queue::{Poll, WorkQueue};

/// Run the loop on the calling thread until it is told to stop.
pub(crate) fn drain(looper: &Looper) {
    if let Some(queue) = looper.queue()
        && !looper.is_quit_requested()
    {
        looper.mark_running();
        match looper.mode() {
            LoopMode::BusyPoll => busy_poll(looper, queue),
            LoopMode::Blocking => blocking(looper, queue),
        }
    }
    looper.finish();
}

/// Mode A: spin without sleeping. The quit flag is read once per iteration.
fn busy_poll(looper: &Looper, queue: &WorkQueue) {
    let quit = looper.quit_flag();
    while !quit.load(Ordering::SeqCst) {
        match queue.poll() {
            Poll::Ready(item) => execute(looper, item),
            Poll::Pending => std::hint::spin_loop(),
            Poll::Finished => break,
        }
    }
}

/// Mode B: block until something is due.
fn blocking(looper: &Looper, queue: &WorkQueue) {
    loop {
        match queue.wait(looper.quit_flag()) {
            Poll::Ready(item) => execute(looper, item),
            Poll::Pending => continue,
            Poll::Finished => break,
        }
    }
}

/// Run one item; a panic is contained to that item.
fn execute(looper: &Looper, item: WorkItem) {
    let seq = item.seq();
    let tag = item.tag();
    trace!(loop_id = %looper.id(), seq, ?tag, "executing item");

    match panic::catch_unwind(AssertUnwindSafe(|| item.run())) {
        Ok(()) => looper.counters().executed(),
        Err(payload) => {
            looper.counters().panicked();
            error!(
                loop_id = %looper.id(),
                name = looper.name(),
                seq,
                ?tag,
                "work item panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
