//! Implementations - stock adapters for the ports.

pub mod dispatch;

pub use self::dispatch::{FnDispatch, NoopDispatch, dispatch_fn};
