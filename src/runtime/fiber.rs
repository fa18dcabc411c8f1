//! # Handle to a forked task.
//!
//! A [`Fiber`] is returned by [`Runtime::fork`](crate::Runtime::fork) and
//! [`TaskContext::fork`](crate::TaskContext::fork). It shares the task's exit variable, so
//! any number of clones can join it.
//!
//! ## Interruption
//! ```text
//! interrupt_as(by) ──► interrupted_by: None → Some(by)   (first interrupter wins)
//!                  └─► token.cancel()                    (children see it too)
//! task body        ──► observes ctx.is_interrupted() / ctx.interrupted()
//! task end         ──► Exit::Failure(Cause::Interrupt(by))
//! ```
//!
//! Interruption is cooperative: the body decides when to stop, and may run its own
//! cleanup first.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::task::{Task, TaskDescriptor, TaskId};
use crate::cell::AtomicCell;
use crate::error::{Exit, ExitStatus};
use crate::variable::SingleAssignmentVariable;

/// Handle to a running or finished task producing `Exit<A, E>`.
pub struct Fiber<A, E> {
    descriptor: TaskDescriptor,
    exit: Arc<SingleAssignmentVariable<Exit<A, E>>>,
    token: CancellationToken,
    interrupted_by: Arc<AtomicCell<Option<TaskId>>>,
}

impl<A, E> Fiber<A, E> {
    pub(crate) fn new(descriptor: TaskDescriptor, token: CancellationToken) -> Self {
        Self {
            descriptor,
            exit: Arc::new(SingleAssignmentVariable::new()),
            token,
            interrupted_by: Arc::new(AtomicCell::new(None)),
        }
    }

    /// Returns the task id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.descriptor.id
    }

    /// Returns true once the task has ended.
    pub fn is_done(&self) -> bool {
        self.exit.is_done()
    }

    /// Requests interruption on behalf of `by` without waiting.
    ///
    /// Only the first interrupter is recorded; later calls still cancel (idempotent).
    pub fn interrupt_as(&self, by: TaskId) {
        self.interrupted_by.compare_and_set(&None, Some(by));
        self.token.cancel();
    }

    /// Returns who requested interruption, if anyone did.
    ///
    /// Cancellation inherited from a parent's token is attributed to the parent.
    pub(crate) fn interrupter(&self) -> Option<TaskId> {
        if let Some(by) = *self.interrupted_by.load() {
            return Some(by);
        }
        self.token
            .is_cancelled()
            .then(|| self.descriptor.parent.unwrap_or(TaskId::EXTERNAL))
    }

    pub(crate) fn exit_var(&self) -> &SingleAssignmentVariable<Exit<A, E>> {
        &self.exit
    }
}

impl<A: Clone, E: Clone> Fiber<A, E> {
    /// Waits for the task to end.
    pub async fn join(&self) -> Exit<A, E> {
        self.exit.wait().await
    }

    /// Interrupts the task as an external caller and waits for it to end.
    pub async fn interrupt(&self) -> Exit<A, E> {
        self.interrupt_as(TaskId::EXTERNAL);
        self.join().await
    }

    /// Returns the exit if the task has ended, without waiting.
    pub fn poll(&self) -> Option<Exit<A, E>> {
        self.exit.poll()
    }
}

impl<A, E> Clone for Fiber<A, E> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            exit: Arc::clone(&self.exit),
            token: self.token.clone(),
            interrupted_by: Arc::clone(&self.interrupted_by),
        }
    }
}

impl<A, E> fmt::Debug for Fiber<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.descriptor.id)
            .field("name", &self.descriptor.name)
            .field("done", &self.exit.is_done())
            .finish()
    }
}

#[async_trait]
impl<A, E> Task for Fiber<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    fn interrupt_fork(&self, by: TaskId) {
        self.interrupt_as(by);
    }

    async fn await_exit(&self) -> ExitStatus {
        self.join().await.status()
    }
}
