//! # Task identity and the engine boundary.
//!
//! [`TaskId`] and [`TaskDescriptor`] identify a task to supervisors; the [`Task`] trait is
//! the narrow surface the shutdown coordinator (and any other embedder) needs from a
//! running task: who it is, how to interrupt it, and how to wait for its end.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;

use crate::error::ExitStatus;

/// Global sequence for task identities. `0` is reserved for [`TaskId::EXTERNAL`].
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Identity used for interruptions that come from outside any task
    /// (signals, embedders).
    pub const EXTERNAL: TaskId = TaskId(0);

    pub(crate) fn next() -> Self {
        Self(TASK_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Builds an id from a raw number (tests, FFI, logs).
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw number.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TaskId::EXTERNAL {
            f.write_str("#external")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// What supervisors see of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Unique id.
    pub id: TaskId,
    /// Human-readable name (not necessarily unique).
    pub name: Arc<str>,
    /// Id of the forking task, if any.
    pub parent: Option<TaskId>,
}

impl TaskDescriptor {
    /// Creates a descriptor with a fresh id.
    pub fn new(name: impl Into<Arc<str>>, parent: Option<TaskId>) -> Self {
        Self {
            id: TaskId::next(),
            name: name.into(),
            parent,
        }
    }
}

/// # Running task, as seen from outside.
///
/// Implemented by [`Fiber`](crate::Fiber); the shutdown coordinator only needs this view.
#[async_trait]
pub trait Task: Send + Sync {
    /// Returns the task's descriptor.
    fn descriptor(&self) -> &TaskDescriptor;

    /// Requests interruption on behalf of `by` without waiting for the task to end.
    fn interrupt_fork(&self, by: TaskId);

    /// Waits for the task to end and returns its summarized exit.
    async fn await_exit(&self) -> ExitStatus;
}
