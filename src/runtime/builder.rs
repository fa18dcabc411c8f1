use std::io::Write;
use std::sync::Arc;

use super::{Runtime, RuntimeConfig};
use crate::cell::AtomicCell;
use crate::error::RuntimeError;
use crate::scheduler::Scheduler;
use crate::shutdown::Diagnostics;
use crate::supervision::Supervisor;

/// Builder for constructing a [`Runtime`] with optional supervisors and diagnostics sink.
pub struct RuntimeBuilder {
    cfg: RuntimeConfig,
    supervisor: Supervisor,
    diagnostics: Option<Diagnostics>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: RuntimeConfig) -> Self {
        Self {
            cfg,
            supervisor: Supervisor::None,
            diagnostics: None,
        }
    }

    /// Adds a supervisor observing every task forked from the runtime.
    ///
    /// Calling it several times composes the supervisors left to right.
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor += supervisor;
        self
    }

    /// Redirects the shutdown-timeout diagnostic line (stderr by default).
    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Some(Diagnostics::new(sink));
        self
    }

    /// Builds and returns the runtime.
    ///
    /// Starts the scheduler's timer thread; fails only if the thread cannot be spawned.
    pub fn build(self) -> Result<Arc<Runtime>, RuntimeError> {
        let scheduler = Scheduler::new(self.cfg.timer_thread_name.clone())?;
        Ok(Arc::new(Runtime {
            cfg: self.cfg,
            supervisor: AtomicCell::new(self.supervisor),
            scheduler,
            diagnostics: self.diagnostics.unwrap_or_default(),
        }))
    }
}
