//! # Runtime configuration.
//!
//! Provides [`RuntimeConfig`] centralized settings for the task engine.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `RuntimeBuilder::new(config).build()`
//! 2. **Shutdown**: `Runtime::shutdown_coordinator()` reads the timeout
//!
//! ## Sentinel values
//! - `shutdown_timeout = None` → wait for the application without bound
//! - `shutdown_timeout = Some(0s)` → do not wait at all
//! - `yield_budget = 0` → never force a yield

use std::time::Duration;

use crate::scheduler::{DEFAULT_YIELD_BUDGET, YieldBudget};
use crate::shutdown::ShutdownTimeout;

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `shutdown_timeout`: Maximum wait for the root task after a termination signal
/// - `yield_budget`: Operations between forced yields in [`TaskContext::checkpoint`](crate::TaskContext::checkpoint)
/// - `timer_thread_name`: OS thread name of the scheduler's timer thread
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over checking sentinels directly.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Maximum time to wait for graceful shutdown before forcing exit.
    ///
    /// When a termination signal is received:
    /// - The root task is interrupted
    /// - The runtime waits up to `shutdown_timeout` for the application to release its latch
    /// - On timeout, one diagnostic line is written and the exit code is `1`
    pub shutdown_timeout: Option<Duration>,

    /// Number of checkpoint operations before a task is forced to yield.
    ///
    /// - `0` = never yield
    /// - `n > 0` = yield (with `on_suspend`/`on_resume`) every `n` checkpoints
    pub yield_budget: u32,

    /// Name given to the scheduler's timer thread.
    pub timer_thread_name: String,
}

impl RuntimeConfig {
    /// Returns the shutdown timeout classified into its three forms.
    #[inline]
    pub fn shutdown_timeout(&self) -> ShutdownTimeout {
        ShutdownTimeout::from(self.shutdown_timeout)
    }

    /// Returns a fresh yield budget for a new task.
    #[inline]
    pub fn yield_budget(&self) -> YieldBudget {
        YieldBudget::new(self.yield_budget)
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `shutdown_timeout = 60s`
    /// - `yield_budget = 10_240`
    /// - `timer_thread_name = "fibervisor-timer"`
    fn default() -> Self {
        Self {
            shutdown_timeout: Some(Duration::from_secs(60)),
            yield_budget: DEFAULT_YIELD_BUDGET,
            timer_thread_name: "fibervisor-timer".to_string(),
        }
    }
}
