//! # Per-task context.
//!
//! Every task body receives a [`TaskContext`]. It is the task's side of the engine boundary:
//! cooperative interruption, the yield hook and forking of child tasks.
//!
//! ## Yield hook
//! ```text
//! checkpoint()
//!   ├─ budget left ──► return immediately
//!   └─ exhausted   ──► on_suspend ──► yield_now ──► on_resume ──► reset budget
//! ```
//!
//! ## Rules
//! - Call [`TaskContext::checkpoint`] inside long loops that rarely await.
//! - Interruption is only observed through this context; the body decides when to stop.
//! - Children inherit the supervisor the parent was forked with, and the parent's
//!   cancellation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::Runtime;
use super::fiber::Fiber;
use super::task::{TaskDescriptor, TaskId};
use crate::scheduler::YieldBudget;
use crate::supervision::Supervisor;

/// Execution context handed to a task body.
pub struct TaskContext {
    pub(crate) descriptor: TaskDescriptor,
    pub(crate) token: CancellationToken,
    pub(crate) budget: YieldBudget,
    pub(crate) supervisor: Supervisor,
    pub(crate) runtime: Arc<Runtime>,
}

impl TaskContext {
    /// Returns this task's descriptor.
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// Returns this task's id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.descriptor.id
    }

    /// Returns the runtime this task runs on.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Returns true once interruption has been requested.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once interruption has been requested.
    pub async fn interrupted(&self) {
        self.token.cancelled().await
    }

    /// Runs `fut` until it completes or the task is interrupted.
    ///
    /// Returns `None` on interruption; `fut` is dropped at its current await point.
    pub async fn interruptible<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Counts one operation and yields to other tasks once the budget is spent.
    ///
    /// Supervisors see `on_suspend` before the yield and `on_resume` after it.
    pub async fn checkpoint(&mut self) {
        if !self.budget.tick() {
            return;
        }
        self.supervisor.on_suspend(&self.descriptor);
        tokio::task::yield_now().await;
        self.supervisor.on_resume(&self.descriptor);
        self.budget.reset();
    }

    /// Forks a child task.
    ///
    /// The child records this task as its parent and is interrupted when this task is.
    pub fn fork<A, E, F, Fut>(&self, name: impl Into<Arc<str>>, f: F) -> Fiber<A, E>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let descriptor = TaskDescriptor::new(name, Some(self.descriptor.id));
        self.runtime.spawn_fiber(
            descriptor,
            Some(self.descriptor.clone()),
            self.token.child_token(),
            self.supervisor.clone(),
            f,
        )
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.descriptor)
            .field("interrupted", &self.token.is_cancelled())
            .field("budget", &self.budget)
            .finish()
    }
}
