//! # Lifecycle logger.
//!
//! A minimal supervisor that writes every lifecycle hook to [`tracing`].
//! Use it for tests, demos, or as a template for your own observers.
//!
//! ## Example output (with a `fmt` subscriber)
//! ```text
//! INFO  task started task=#3 name="worker" parent=Some(#1)
//! DEBUG task suspended task=#3
//! DEBUG task resumed task=#3
//! INFO  task ended task=#3 name="worker" exit=task_succeeded
//! WARN  task ended task=#4 name="fetch" exit=task_failed detail="connection refused"
//! ```

use crate::error::ExitStatus;
use crate::runtime::TaskDescriptor;

use super::supervisor::Supervise;

/// Supervisor that logs lifecycle hooks.
#[derive(Default)]
pub struct LogSupervisor;

impl LogSupervisor {
    /// Construct a new [`LogSupervisor`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Supervise for LogSupervisor {
    fn on_start(&self, task: &TaskDescriptor, parent: Option<&TaskDescriptor>) {
        tracing::info!(
            task = %task.id,
            name = %task.name,
            parent = ?parent.map(|p| p.id),
            "task started"
        );
    }

    fn on_end(&self, exit: &ExitStatus, task: &TaskDescriptor) {
        match exit {
            ExitStatus::Success => {
                tracing::info!(task = %task.id, name = %task.name, exit = exit.as_label(), "task ended");
            }
            ExitStatus::Interrupted(by) => {
                tracing::info!(
                    task = %task.id,
                    name = %task.name,
                    exit = exit.as_label(),
                    by = %by,
                    "task ended"
                );
            }
            ExitStatus::Failure(detail) | ExitStatus::Died(detail) => {
                tracing::warn!(
                    task = %task.id,
                    name = %task.name,
                    exit = exit.as_label(),
                    detail = %detail,
                    "task ended"
                );
            }
        }
    }

    fn on_suspend(&self, task: &TaskDescriptor) {
        tracing::debug!(task = %task.id, "task suspended");
    }

    fn on_resume(&self, task: &TaskDescriptor) {
        tracing::debug!(task = %task.id, "task resumed");
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Exit;
    use crate::runtime::{Runtime, RuntimeBuilder, RuntimeConfig, TaskId};
    use crate::supervision::Supervisor;

    #[test]
    fn test_every_hook_and_exit_is_logged() {
        let log = LogSupervisor::new();
        let parent = TaskDescriptor::new("parent", None);
        let task = TaskDescriptor::new("worker", Some(parent.id));

        log.on_start(&parent, None);
        log.on_start(&task, Some(&parent));
        log.on_suspend(&task);
        log.on_resume(&task);
        for exit in [
            ExitStatus::Success,
            ExitStatus::Failure("connection refused".into()),
            ExitStatus::Died("boom".into()),
            ExitStatus::Interrupted(TaskId::EXTERNAL),
        ] {
            log.on_end(&exit, &task);
        }
        assert_eq!(log.name(), "log");
    }

    #[tokio::test]
    async fn test_runtime_drives_log_supervisor() {
        let cfg = RuntimeConfig {
            yield_budget: 1,
            ..RuntimeConfig::default()
        };
        let rt: std::sync::Arc<Runtime> = RuntimeBuilder::new(cfg)
            .with_supervisor(Supervisor::leaf(LogSupervisor::new()))
            .build()
            .unwrap();

        let fiber = rt.fork("logged", |mut ctx| async move {
            ctx.checkpoint().await;
            ctx.checkpoint().await;
            Ok::<_, String>(7)
        });
        assert_eq!(fiber.join().await, Exit::Success(7));
    }
}
