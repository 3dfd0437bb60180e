//! looper-core
//!
//! スレッドに閉じたメッセージループ。遅延付きワークキューと、
//! それを専用スレッド上で処理するループと、任意のスレッドから
//! 仕事を投げられる Handle で構成されます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, state, errors）
//! - **ports**: 抽象化レイヤー（Clock, Dispatch）
//! - **queue**: 遅延付きワークキュー（min-heap + Condvar）
//! - **app**: ループ本体（builder, looper, loop_thread, handle, worker_loop）
//! - **impls**: ports の標準実装（NoopDispatch, FnDispatch）
//! - **demo**: スレッド間パターンのデモ（reply-to-owner, fire-and-collect）

pub mod app;
pub mod demo;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{Handle, LoopBuilder, LoopConfig, LoopCounts, LoopMode, LoopThread, Looper, PreparedLoop};
pub use domain::{HandleId, LoopError, LoopId, LoopState};
pub use ports::{Clock, Dispatch, ManualClock, Message, SystemClock};
