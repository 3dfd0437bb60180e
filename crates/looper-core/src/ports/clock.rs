//! Clock port - 時刻の抽象化
//!
//! キューは `ready_at` と実行可否を `Clock` から計算します。
//! テストでは [`ManualClock`] に差し替えて、時刻を決定的に進められます。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Clock は単調増加の現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - テストでは ManualClock を使用
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// SystemClock は `Instant::now()` をそのまま返す（本番用）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// ManualClock は `advance()` でのみ進む時計（テスト用）
///
/// clone 同士は同じ時刻を共有します。
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// 現在の実時刻から開始し、advance されるまで止まったまま
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
