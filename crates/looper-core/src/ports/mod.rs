//! Ports - 差し替え可能な境界
//!
//! 各 trait はループ本体から切り離された依存（時刻、メッセージ処理）を表します。
//! 実装は `impls`（または利用側）が提供します。

pub mod clock;
pub mod dispatch;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::dispatch::{Dispatch, Message};
