//! LoopThread - a loop running on its own dedicated thread.

use std::thread::JoinHandle;

use tracing::error;

use super::builder::LoopBuilder;
use super::config::LoopConfig;
use super::handle::Handle;
use super::looper::Looper;
use super::status::LoopCounts;
use super::worker_loop;
use crate::domain::LoopError;

/// Owner of a loop thread.
///
/// The creator owns the thread's lifetime and is responsible for `quit()`.
/// Dropping a `LoopThread` that was never joined requests quit and detaches
/// the thread.
pub struct LoopThread {
    looper: Looper,
    join: Option<JoinHandle<()>>,
}

/// Terminates the loop even if the thread unwinds out of a hook.
struct FinishOnExit(Looper);

impl Drop for FinishOnExit {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl LoopThread {
    /// Spawn a loop thread from a config (default clock, no hooks).
    pub fn spawn(config: LoopConfig) -> Result<Self, LoopError> {
        LoopBuilder::from_config(config).spawn()
    }

    pub(crate) fn start(
        looper: Looper,
        on_start: Option<Box<dyn FnOnce() + Send + 'static>>,
        on_prepared: Option<Box<dyn FnOnce(&Looper) + Send + 'static>>,
    ) -> Result<Self, LoopError> {
        let thread_looper = looper.clone();
        let join = std::thread::Builder::new()
            .name(looper.name().to_string())
            .spawn(move || {
                let guard = FinishOnExit(thread_looper);
                if let Some(on_start) = on_start {
                    on_start();
                }
                if let Err(err) = guard.0.attach_current_thread() {
                    error!(loop_id = %guard.0.id(), "loop preparation failed: {err}");
                    return;
                }
                if let Some(on_prepared) = on_prepared {
                    on_prepared(&guard.0);
                }
                worker_loop::drain(&guard.0);
            })?;

        Ok(Self {
            looper,
            join: Some(join),
        })
    }

    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    /// Bind a plain handle; `NotReady` until the thread has prepared the loop.
    pub fn handle(&self) -> Result<Handle, LoopError> {
        Handle::bind(&self.looper)
    }

    /// Wait for readiness, bounded by the config's `ready_timeout_ms`.
    pub fn wait_ready(&self) -> Result<(), LoopError> {
        self.looper
            .wait_ready_timeout(self.looper.config().ready_timeout())
    }

    pub fn quit(&self) {
        self.looper.quit();
    }

    pub fn quit_safely(&self) {
        self.looper.quit_safely();
    }

    /// Wait for the thread to exit and return the loop's final counts.
    ///
    /// Does not request quit by itself.
    pub fn join(mut self) -> Result<LoopCounts, LoopError> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| LoopError::ThreadPanicked(self.looper.name().to_string()))?;
        }
        Ok(self.looper.counts())
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.looper.quit();
        }
    }
}
