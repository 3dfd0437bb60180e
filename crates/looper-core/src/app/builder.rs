//! LoopBuilder - ループの組み立て
//!
//! # Fail-fast 設計
//! - 設定の検証は `spawn()` / `prepare()` の時点で行う
//! - 不正な名前はスレッドを作る前に `InvalidConfig` で返す

use std::sync::Arc;
use std::time::Duration;

use super::config::{LoopConfig, LoopMode};
use super::loop_thread::LoopThread;
use super::looper::{Looper, PreparedLoop};
use crate::domain::LoopError;
use crate::ports::{Clock, SystemClock};

type StartHook = Box<dyn FnOnce() + Send + 'static>;
type PreparedHook = Box<dyn FnOnce(&Looper) + Send + 'static>;

/// LoopBuilder は新しいスレッド上（[`LoopBuilder::spawn`]）または
/// 呼び出し元スレッド上（[`LoopBuilder::prepare`]）にループを作る
///
/// # 使用例
/// ```ignore
/// let worker = LoopBuilder::new("worker")
///     .mode(LoopMode::Blocking)
///     .on_prepared(|looper| tracing::info!(id = %looper.id(), "up"))
///     .spawn()?;
/// worker.wait_ready()?;
/// let handle = worker.handle()?;
/// ```
pub struct LoopBuilder {
    config: LoopConfig,
    clock: Arc<dyn Clock>,
    on_start: Option<StartHook>,
    on_prepared: Option<PreparedHook>,
}

impl LoopBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(LoopConfig::new(name))
    }

    pub fn from_config(config: LoopConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            on_start: None,
            on_prepared: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn mode(mut self, mode: LoopMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// prepare 前にループスレッド上で実行（まだ Ready は公開されていない）
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Ready 公開後、最初のアイテムの前にループスレッド上で実行
    pub fn on_prepared<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Looper) + Send + 'static,
    {
        self.on_prepared = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// 専用スレッドを起動してループを prepare + run
    ///
    /// 即座に返る。ループは非同期に Ready になる
    pub fn spawn(self) -> Result<LoopThread, LoopError> {
        self.config.validate()?;
        let looper = Looper::new(self.config, self.clock);
        LoopThread::start(looper, self.on_start, self.on_prepared)
    }

    /// 呼び出し元スレッドにループを紐付ける（hook はその場で実行）
    pub fn prepare(self) -> Result<PreparedLoop, LoopError> {
        self.config.validate()?;
        if let Some(on_start) = self.on_start {
            on_start();
        }
        let looper = Looper::new(self.config, self.clock);
        looper.attach_current_thread()?;
        let prepared = PreparedLoop::new(looper);
        if let Some(on_prepared) = self.on_prepared {
            on_prepared(prepared.looper());
        }
        Ok(prepared)
    }

    /// [`LoopBuilder::prepare`] + プロセス全体のメインループとして登録
    pub fn prepare_main(self) -> Result<PreparedLoop, LoopError> {
        if let Some(main) = Looper::main() {
            return Err(LoopError::MainLoopExists(main.id()));
        }
        let prepared = self.prepare()?;
        prepared.looper().register_main()?;
        Ok(prepared)
    }
}
