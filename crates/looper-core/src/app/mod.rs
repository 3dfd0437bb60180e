//! App - ループ本体とその周辺
//!
//! queue と ports を組み合わせて、スレッドに閉じたメッセージループを実装します。
//!
//! # 主要コンポーネント
//! - **LoopBuilder**: ループの構築（専用スレッド or 呼び出し元スレッド）
//! - **Looper**: ループへの参照（状態、readiness、quit）
//! - **LoopThread**: 専用スレッドで動くループの所有者
//! - **Handle**: ループへ callable / メッセージを投入する capability
//! - **WorkerLoop**: drain ループ（Mode A: busy-poll / Mode B: blocking）

pub mod builder;
pub mod config;
pub mod handle;
pub mod loop_thread;
pub mod looper;
pub mod status;
mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::LoopBuilder;
pub use self::config::{LoopConfig, LoopMode};
pub use self::handle::Handle;
pub use self::loop_thread::LoopThread;
pub use self::looper::{Looper, PreparedLoop};
pub use self::status::LoopCounts;
