//! Domain model (ids, work items, lifecycle state, errors).

pub mod errors;
pub mod ids;
pub mod item;
pub mod state;

pub use self::errors::LoopError;
pub use self::ids::{HandleId, Id, IdMarker, LoopId};
pub use self::item::{Deliver, ItemKind, Job, WorkItem};
pub use self::state::LoopState;
