//! Reply-to-owner: a worker loop answers the loop that handed it work.
//!
//! 1. The calling thread (T1) prepares the owner loop L1.
//! 2. A blocking worker loop L2 is spawned; T1 waits for its readiness signal.
//! 3. A delayed callable posted to L2 runs on T2 and replies to L1 through a handle.
//! 4. L1 quits when `Done` arrives.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::app::{Handle, LoopBuilder, LoopConfig, LoopCounts, LoopMode, Looper};
use crate::domain::LoopError;
use crate::ports::{Dispatch, Message};

/// Payload tags understood by the reply demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoTag {
    /// Text reply from the worker.
    Text = 1,
    /// Numeric value for the worker.
    Value = 2,
    /// Last reply; the owner stops after it.
    Done = 3,
}

impl DemoTag {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for DemoTag {
    /// The unrecognized tag.
    type Error = i32;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(DemoTag::Text),
            2 => Ok(DemoTag::Value),
            3 => Ok(DemoTag::Done),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyConfig {
    /// Loop prepared on the calling thread.
    pub owner: LoopConfig,
    /// Loop spawned on its own thread.
    pub worker: LoopConfig,
    /// Delay of the callable posted to the worker.
    pub delay: Duration,
    /// Text replies sent before `Done`.
    pub replies: u32,
    /// Value the owner sends to the worker.
    pub value: i64,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            owner: LoopConfig::new("owner"),
            worker: LoopConfig::new("reply-worker").with_mode(LoopMode::Blocking),
            delay: Duration::from_millis(300),
            replies: 1,
            value: 10,
        }
    }
}

/// One text reply as seen on the owner thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    /// Thread the reply was delivered on.
    pub received_on: String,
    pub received_at: DateTime<Utc>,
    /// Time since the callable was posted.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyReport {
    pub owner_thread: String,
    pub worker_thread: String,
    pub delay_ms: u64,
    pub replies: Vec<Reply>,
    /// Values the worker received from the owner.
    pub worker_values: Vec<i64>,
    pub owner_counts: LoopCounts,
    pub worker_counts: LoopCounts,
}

/// Receives replies on the owner loop.
pub struct OwnerDispatch {
    owner: Looper,
    posted_at: Instant,
    replies: Arc<Mutex<Vec<Reply>>>,
}

impl Dispatch for OwnerDispatch {
    type Payload = String;

    fn dispatch(&self, message: Message<String>) {
        match DemoTag::try_from(message.tag) {
            Ok(DemoTag::Text) => {
                let reply = Reply {
                    text: message.payload,
                    received_on: thread_label(),
                    received_at: Utc::now(),
                    elapsed_ms: millis(self.posted_at.elapsed()),
                };
                debug!(text = %reply.text, elapsed_ms = reply.elapsed_ms, "reply received");
                self.replies
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(reply);
            }
            Ok(DemoTag::Done) => {
                info!(loop_id = %self.owner.id(), "worker finished; stopping owner");
                self.owner.quit();
            }
            Ok(DemoTag::Value) => trace!("owner ignores value messages"),
            Err(tag) => trace!(tag, "unregistered tag ignored"),
        }
    }
}

/// Receives values on the worker loop.
pub struct WorkerDispatch {
    values: Arc<Mutex<Vec<i64>>>,
}

impl Dispatch for WorkerDispatch {
    type Payload = i64;

    fn dispatch(&self, message: Message<i64>) {
        match DemoTag::try_from(message.tag) {
            Ok(DemoTag::Value) => {
                debug!(value = message.payload, "worker received value");
                self.values
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message.payload);
            }
            Ok(DemoTag::Text | DemoTag::Done) => trace!("worker ignores reply messages"),
            Err(tag) => trace!(tag, "unregistered tag ignored"),
        }
    }
}

/// Run the reply-to-owner composition with the calling thread as the owner.
///
/// Blocks until the worker's `Done` reply arrives. The calling thread must
/// not already own a loop.
pub fn reply_to_owner(config: ReplyConfig) -> Result<ReplyReport, LoopError> {
    let owner = LoopBuilder::from_config(config.owner).prepare()?;
    let worker = LoopBuilder::from_config(config.worker).spawn()?;
    worker.wait_ready()?;

    let posted_at = Instant::now();
    let replies = Arc::new(Mutex::new(Vec::new()));
    let values = Arc::new(Mutex::new(Vec::new()));

    let to_owner = Handle::with_dispatcher(
        owner.looper(),
        OwnerDispatch {
            owner: owner.looper().clone(),
            posted_at,
            replies: Arc::clone(&replies),
        },
    )?;
    let to_worker = Handle::with_dispatcher(
        worker.looper(),
        WorkerDispatch {
            values: Arc::clone(&values),
        },
    )?;

    let count = config.replies;
    to_worker.post_delayed(
        move || {
            let from = thread_label();
            for n in 1..=count {
                let text = format!("reply {n}/{count} from {from}");
                if let Err(err) = to_owner.send(DemoTag::Text.code(), text) {
                    warn!("reply not delivered: {err}");
                }
            }
            if let Err(err) = to_owner.send(DemoTag::Done.code(), String::new()) {
                warn!("done not delivered: {err}");
            }
        },
        config.delay,
    )?;
    to_worker.send(DemoTag::Value.code(), config.value)?;

    let worker_thread = worker.looper().name().to_string();
    let owner_counts = owner.run();
    worker.quit();
    let worker_counts = worker.join()?;

    let replies = take(&replies);
    let worker_values = take(&values);
    Ok(ReplyReport {
        owner_thread: thread_label(),
        worker_thread,
        delay_ms: millis(config.delay),
        replies,
        worker_values,
        owner_counts,
        worker_counts,
    })
}

fn take<T>(shared: &Mutex<Vec<T>>) -> Vec<T> {
    std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner))
}

pub(crate) fn thread_label() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Ok(DemoTag::Text))]
    #[case(2, Ok(DemoTag::Value))]
    #[case(3, Ok(DemoTag::Done))]
    #[case(0, Err(0))]
    #[case(42, Err(42))]
    fn tags_map_to_variants(#[case] raw: i32, #[case] expected: Result<DemoTag, i32>) {
        assert_eq!(DemoTag::try_from(raw), expected);
    }

    #[test]
    fn tag_codes_round_trip() {
        for tag in [DemoTag::Text, DemoTag::Value, DemoTag::Done] {
            assert_eq!(DemoTag::try_from(tag.code()), Ok(tag));
        }
    }

    fn run_in_thread(config: ReplyConfig) -> ReplyReport {
        thread::Builder::new()
            .name("ui".to_string())
            .spawn(move || reply_to_owner(config))
            .unwrap()
            .join()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn worker_reply_reaches_owner_thread_after_delay() {
        let config = ReplyConfig {
            delay: Duration::from_millis(300),
            ..ReplyConfig::default()
        };
        let report = run_in_thread(config);

        assert_eq!(report.owner_thread, "ui");
        assert_eq!(report.worker_thread, "reply-worker");
        assert_eq!(report.replies.len(), 1);
        let reply = &report.replies[0];
        assert_eq!(reply.text, "reply 1/1 from reply-worker");
        assert_eq!(reply.received_on, "ui");
        assert!(reply.elapsed_ms >= 300);
        assert_eq!(report.worker_values, vec![10]);
    }

    #[test]
    fn multiple_replies_arrive_in_send_order() {
        let config = ReplyConfig {
            delay: Duration::from_millis(10),
            replies: 3,
            value: 7,
            ..ReplyConfig::default()
        };
        let report = run_in_thread(config);

        let texts: Vec<_> = report.replies.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "reply 1/3 from reply-worker",
                "reply 2/3 from reply-worker",
                "reply 3/3 from reply-worker",
            ]
        );
        assert_eq!(report.worker_values, vec![7]);
        // three texts plus done
        assert_eq!(report.owner_counts.executed, 4);
        // the delayed callable plus the value message
        assert_eq!(report.worker_counts.executed, 2);
    }

    #[test]
    fn owner_ignores_unregistered_tags() {
        let prepared = LoopBuilder::new("tags").prepare().unwrap();
        let replies = Arc::new(Mutex::new(Vec::new()));
        let handle = Handle::with_dispatcher(
            prepared.looper(),
            OwnerDispatch {
                owner: prepared.looper().clone(),
                posted_at: Instant::now(),
                replies: Arc::clone(&replies),
            },
        )
        .unwrap();

        handle.send(99, "ignored".to_string()).unwrap();
        handle.send(DemoTag::Value.code(), "ignored".to_string()).unwrap();
        handle.send(DemoTag::Done.code(), String::new()).unwrap();

        let counts = prepared.run();
        assert!(replies.lock().unwrap().is_empty());
        assert_eq!(counts.executed, 3);
        assert_eq!(counts.panicked, 0);
    }

    #[test]
    fn owner_thread_with_existing_loop_is_rejected() {
        let _existing = LoopBuilder::new("existing").prepare().unwrap();
        let err = reply_to_owner(ReplyConfig::default()).unwrap_err();
        assert!(matches!(err, LoopError::DuplicateLoopOnThread { .. }));
    }
}
