//! # fibervisor
//!
//! **Fibervisor** is a set of concurrency primitives for cooperative task runtimes.
//!
//! It provides the building blocks higher-level libraries (queues, streams, promises)
//! embed: lock-free and synchronized cells, a single-assignment variable, composable
//! lifecycle supervisors, a delay scheduler with yield budgets, and process-wide
//! graceful shutdown. A small tokio-backed task engine drives them.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────┐   ┌───────────────────────────┐   ┌───────────────────┐
//!  │ AtomicCell<T>│◄──│ SingleAssignmentVariable  │◄──│ShutdownCoordinator│
//!  │  (ArcSwap)   │   │  Pending(waiters) → Done  │   │ latch + timeout   │
//!  └──────┬───────┘   └─────────────┬─────────────┘   └─────────┬─────────┘
//!         │                         │ Fiber exit                │ interrupt root
//!         ▼                         ▼                           ▼
//!  ┌──────────────┐   ┌───────────────────────────────────────────────────┐
//!  │Synchronized  │   │  Runtime (task engine on tokio)                   │
//!  │Cell<T>       │   │  - fork / interrupt / join                        │
//!  │ + semaphore  │   │  - TaskContext::checkpoint (YieldBudget)          │
//!  └──────────────┘   │  - Scheduler (timer thread, CancelToken)          │
//!                     └─────────────────────────┬─────────────────────────┘
//!                                               │ on_start / on_suspend /
//!                                               │ on_resume / on_end
//!                                               ▼
//!                     ┌───────────────────────────────────────────────────┐
//!                     │  Supervisor tree  (None | Leaf | Both, a + b)     │
//!                     │  Track, LogSupervisor, user leaves                │
//!                     └───────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Runtime::fork(name, f)
//!   ├─► on_start(task, parent)
//!   ├─► f(ctx) ... ctx.checkpoint() ──► on_suspend ──► yield ──► on_resume
//!   ├─► exit decided (Success | Fail | Die | Interrupt)
//!   ├─► on_end(status, task)
//!   └─► exit published to every joiner
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Cells**         | Lock-free CAS updates and effectful serialized updates.      | [`AtomicCell`], [`SynchronizedCell`]        |
//! | **Variables**     | Complete-once values with cancellable waiters.               | [`SingleAssignmentVariable`], [`WaiterList`]|
//! | **Supervision**   | Composable lifecycle observers and patches.                  | [`Supervise`], [`Supervisor`], [`Track`]    |
//! | **Scheduling**    | Delayed execution and cooperative yield budgets.             | [`Scheduler`], [`CancelToken`], [`YieldBudget`] |
//! | **Tasks**         | Fork, interrupt and join tasks.                              | [`Runtime`], [`Fiber`], [`TaskContext`]     |
//! | **Shutdown**      | Signal-driven graceful shutdown with a timeout.              | [`ShutdownCoordinator`], [`ShutdownTimeout`]|
//! | **Errors**        | Typed exits and runtime errors.                              | [`Cause`], [`Exit`], [`RuntimeError`]       |
//! | **Configuration** | Centralize runtime settings.                                 | [`RuntimeConfig`], [`RuntimeBuilder`]       |
//!
//! ## Optional features
//! - `logging`: exports [`LogSupervisor`], a lifecycle logger on top of `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fibervisor::{Exit, RuntimeBuilder, RuntimeConfig, Supervisor, Track};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let track = std::sync::Arc::new(Track::new());
//!     let rt = RuntimeBuilder::new(RuntimeConfig::default())
//!         .with_supervisor(Supervisor::from_arc(track.clone()))
//!         .build()?;
//!
//!     let worker = rt.fork("worker", |mut ctx| async move {
//!         let mut sum = 0u64;
//!         for i in 0..100_000u64 {
//!             sum += i;
//!             ctx.checkpoint().await;
//!         }
//!         Ok::<_, String>(sum)
//!     });
//!
//!     let sleeper = rt.fork("sleeper", |ctx| async move {
//!         ctx.interruptible(tokio::time::sleep(Duration::from_secs(3600))).await;
//!         Ok::<_, String>(())
//!     });
//!
//!     assert_eq!(worker.join().await, Exit::Success(4_999_950_000));
//!     assert!(sleeper.interrupt().await.is_interrupted());
//!     assert!(track.is_empty());
//!     Ok(())
//! }
//! ```

mod cell;
mod error;
mod runtime;
mod scheduler;
mod shutdown;
mod supervision;
mod variable;

// ---- Public re-exports ----

pub use cell::{AtomicCell, SynchronizedCell};
pub use error::{Cause, EXIT_FAILURE, EXIT_SUCCESS, Exit, ExitStatus, RuntimeError};
pub use runtime::{
    Fiber, Runtime, RuntimeBuilder, RuntimeConfig, Task, TaskContext, TaskDescriptor, TaskId,
    global,
};
pub use scheduler::{CancelToken, DEFAULT_YIELD_BUDGET, Delay, Runnable, Scheduler, YieldBudget};
pub use shutdown::{
    Diagnostics, ShutdownCoordinator, ShutdownOutcome, ShutdownTimeout, fatal, terminate,
    wait_for_shutdown_signal,
};
pub use supervision::{Observation, Supervise, Supervisor, SupervisorPatch, Track};
pub use variable::{
    Await, Callback, Iter as WaiterIter, Registration, SingleAssignmentVariable, Waiter, WaiterId,
    WaiterList,
};

// Optional: tracing-backed lifecycle logger.
#[cfg(feature = "logging")]
pub use supervision::LogSupervisor;
