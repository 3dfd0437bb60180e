//! Demo - cross-thread compositions built on loops and handles.
//!
//! - **reply**: a worker loop answers the owner loop (reply-to-owner)
//! - **collect**: busy-poll workers run jobs, completions collected in arrival order

pub mod collect;
pub mod reply;

pub use self::collect::{CollectConfig, CollectReport, Completion, fire_and_collect};
pub use self::reply::{DemoTag, OwnerDispatch, Reply, ReplyConfig, ReplyReport, WorkerDispatch, reply_to_owner};
