//! # Minimal task engine.
//!
//! [`Runtime`] forks tasks onto tokio, drives the supervisor hooks around them and wires
//! the shutdown coordinator for the application's root task.
//!
//! ## Architecture
//! ```text
//! Runtime::fork(name, f)
//!   ├─► supervisor.on_start(task, parent)
//!   └─► tokio::spawn
//!         ├─► f(TaskContext)              (panics caught → Cause::Die)
//!         ├─► exit decided                (interrupted → Cause::Interrupt(by))
//!         ├─► supervisor.on_end(status, task)
//!         └─► fiber exit published        (joiners resume here)
//!
//! Runtime::run(name, f)
//!   ├─► root = fork(name, f)
//!   ├─► watcher: root ends ──► coordinator.release(code)
//!   └─► coordinator.run_until_signal(root) ──► exit code
//! ```
//!
//! ## Rules
//! - `on_end` always runs before any joiner observes the exit.
//! - A task is forked with the supervisor current at fork time; later changes only affect
//!   later forks.
//! - [`global`] is created on first use and lives for the whole process.

mod builder;
mod config;
mod context;
mod fiber;
mod task;

pub use builder::RuntimeBuilder;
pub use config::RuntimeConfig;
pub use context::TaskContext;
pub use fiber::Fiber;
pub use task::{Task, TaskDescriptor, TaskId};

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::cell::AtomicCell;
use crate::error::{Cause, Exit, RuntimeError};
use crate::scheduler::Scheduler;
use crate::shutdown::{Diagnostics, ShutdownCoordinator, fatal, terminate};
use crate::supervision::{Supervisor, SupervisorPatch, panic_message};

/// Task engine: forks tasks, drives supervisors, owns the scheduler.
pub struct Runtime {
    cfg: RuntimeConfig,
    supervisor: AtomicCell<Supervisor>,
    scheduler: Scheduler,
    diagnostics: Diagnostics,
}

impl Runtime {
    /// Builds a runtime with `cfg` and no supervisors.
    pub fn new(cfg: RuntimeConfig) -> Result<Arc<Self>, RuntimeError> {
        RuntimeBuilder::new(cfg).build()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// Returns the delayed-execution service.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the supervisor new tasks are forked with.
    pub fn supervisor(&self) -> Supervisor {
        Supervisor::clone(&self.supervisor.load())
    }

    /// Appends every leaf of `supervisor` to the runtime's supervisor.
    pub fn add_supervisor(&self, supervisor: &Supervisor) {
        self.patch_supervisor(&SupervisorPatch::diff(&Supervisor::None, supervisor));
    }

    /// Removes one occurrence of every leaf of `supervisor`; absent leaves are ignored.
    pub fn remove_supervisor(&self, supervisor: &Supervisor) {
        let patch = supervisor
            .leaves()
            .into_iter()
            .fold(SupervisorPatch::empty(), |p, leaf| {
                p.combine(SupervisorPatch::Remove(leaf))
            });
        self.patch_supervisor(&patch);
    }

    /// Applies `patch` to the runtime's supervisor atomically.
    pub fn patch_supervisor(&self, patch: &SupervisorPatch) {
        self.supervisor.update(|current| patch.apply(current.clone()));
    }

    /// Forks a root task (no parent).
    ///
    /// Must be called from within a tokio runtime.
    pub fn fork<A, E, F, Fut>(self: &Arc<Self>, name: impl Into<Arc<str>>, f: F) -> Fiber<A, E>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let descriptor = TaskDescriptor::new(name, None);
        self.spawn_fiber(
            descriptor,
            None,
            CancellationToken::new(),
            self.supervisor(),
            f,
        )
    }

    pub(crate) fn spawn_fiber<A, E, F, Fut>(
        self: &Arc<Self>,
        descriptor: TaskDescriptor,
        parent: Option<TaskDescriptor>,
        token: CancellationToken,
        supervisor: Supervisor,
        f: F,
    ) -> Fiber<A, E>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let fiber = Fiber::new(descriptor.clone(), token.clone());
        supervisor.on_start(&descriptor, parent.as_ref());

        let ctx = TaskContext {
            descriptor: descriptor.clone(),
            token,
            budget: self.cfg.yield_budget(),
            supervisor: supervisor.clone(),
            runtime: Arc::clone(self),
        };
        let handle = fiber.clone();

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { f(ctx).await })
                .catch_unwind()
                .await;

            let exit = match outcome {
                Err(panic) => Exit::Failure(Cause::Die(panic_message(panic.as_ref()))),
                Ok(result) => match handle.interrupter() {
                    Some(by) => Exit::Failure(Cause::Interrupt(by)),
                    None => Exit::from(result),
                },
            };

            supervisor.on_end(&exit.status(), &descriptor);
            handle.exit_var().complete_with(exit);
        });

        fiber
    }

    /// Builds a shutdown coordinator from the configured timeout and diagnostics sink,
    /// timed on this runtime's scheduler.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        ShutdownCoordinator::new(self.cfg.shutdown_timeout())
            .with_diagnostics(self.diagnostics.clone())
            .with_scheduler(self.scheduler.clone())
    }

    /// Runs `f` as the application's root task and returns the process exit code.
    ///
    /// The root may end on its own, or a termination signal interrupts it and the
    /// configured shutdown timeout applies.
    pub async fn run<A, E, F, Fut>(self: &Arc<Self>, name: impl Into<Arc<str>>, f: F) -> i32
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let root = self.fork(name, f);
        let coordinator = Arc::new(self.shutdown_coordinator());

        let watcher = coordinator.watch(root.clone());

        let outcome = coordinator.run_until_signal(&root).await;
        watcher.abort();

        tracing::debug!(task = %root.id(), ?outcome, "application finished");
        outcome.exit_code()
    }

    /// Runs `f` as the application's root task on a fresh multi-threaded tokio runtime,
    /// then exits the process with the resulting code.
    pub fn run_main<A, E, F, Fut>(self: &Arc<Self>, name: impl Into<Arc<str>>, f: F) -> !
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let host = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(host) => host,
            Err(e) => fatal(&format!("cannot start tokio runtime: {e}")),
        };
        let code = host.block_on(self.run(name, f));
        terminate(code)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("cfg", &self.cfg)
            .field("supervisor", &*self.supervisor.load())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();

/// Returns the process-wide runtime, creating it with default config on first use.
///
/// Failing to start it is unrecoverable and aborts the process.
pub fn global() -> &'static Arc<Runtime> {
    GLOBAL.get_or_init(|| match Runtime::new(RuntimeConfig::default()) {
        Ok(runtime) => runtime,
        Err(e) => fatal(&format!("cannot start global runtime: {}", e.as_message())),
    })
}
