//! Scheduling substrate.
//!
//! ## Contents
//! - [`Scheduler`] deadline-ordered delayed execution on a timer thread, with [`CancelToken`]s
//! - [`Delay`]     overflow-free classification of requested delays
//! - [`YieldBudget`] operation countdown driving cooperative yields
//!
//! ## Quick wiring
//! ```text
//! Runtime { scheduler: Scheduler, cfg.yield_budget }
//!      └─► TaskContext::checkpoint() ticks its YieldBudget
//!           - exhausted → on_suspend, yield_now, on_resume, reset
//! ```

mod budget;
mod delay;
mod timer;

pub use budget::{DEFAULT_YIELD_BUDGET, YieldBudget};
pub use delay::Delay;
pub use timer::{CancelToken, Runnable, Scheduler};
