//! # Live-task tracker.
//!
//! [`Track`] is a supervisor that keeps the set of tasks that have started and not yet
//! ended. Its state lives in a private [`AtomicCell`], so hooks never lock.
//!
//! ```text
//! on_start(task) ──► live.insert(task.id → task)
//! on_end(task)   ──► live.remove(task.id)
//! value()        ──► Vec<TaskDescriptor> (sorted by id)
//! ```
//!
//! Reads are a snapshot: a task may start or end right after [`Track::snapshot`] returns.

use std::collections::BTreeMap;

use crate::cell::AtomicCell;
use crate::error::ExitStatus;
use crate::runtime::{TaskDescriptor, TaskId};

use super::supervisor::{Observation, Supervise};

/// Supervisor tracking currently alive tasks.
#[derive(Default)]
pub struct Track {
    live: AtomicCell<BTreeMap<TaskId, TaskDescriptor>>,
}

impl Track {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns alive tasks sorted by id.
    pub fn snapshot(&self) -> Vec<TaskDescriptor> {
        self.live.load().values().cloned().collect()
    }

    /// Returns true if the task has started and not yet ended.
    pub fn is_alive(&self, id: TaskId) -> bool {
        self.live.load().contains_key(&id)
    }

    /// Returns the number of alive tasks.
    pub fn len(&self) -> usize {
        self.live.load().len()
    }

    /// Returns true if no task is alive.
    pub fn is_empty(&self) -> bool {
        self.live.load().is_empty()
    }
}

impl Supervise for Track {
    fn on_start(&self, task: &TaskDescriptor, _parent: Option<&TaskDescriptor>) {
        self.live.update(|live| {
            let mut next = live.clone();
            next.insert(task.id, task.clone());
            next
        });
    }

    fn on_end(&self, _exit: &ExitStatus, task: &TaskDescriptor) {
        self.live.update_some(|live| {
            live.contains_key(&task.id).then(|| {
                let mut next = live.clone();
                next.remove(&task.id);
                next
            })
        });
    }

    fn value(&self) -> Observation {
        Observation::new(self.snapshot())
    }

    fn name(&self) -> &'static str {
        "track"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_end_cycle() {
        let track = Track::new();
        let a = TaskDescriptor::new("a", None);
        let b = TaskDescriptor::new("b", Some(a.id));

        track.on_start(&a, None);
        track.on_start(&b, Some(&a));
        assert_eq!(track.len(), 2);
        assert!(track.is_alive(b.id));

        track.on_end(&ExitStatus::Success, &a);
        assert!(!track.is_alive(a.id));
        assert_eq!(track.snapshot(), vec![b.clone()]);

        let observed = track.value().downcast::<Vec<TaskDescriptor>>().unwrap();
        assert_eq!(observed, vec![b]);
    }

    #[test]
    fn test_end_of_unknown_task_is_ignored() {
        let track = Track::new();
        track.on_end(&ExitStatus::Success, &TaskDescriptor::new("ghost", None));
        assert!(track.is_empty());
    }
}
