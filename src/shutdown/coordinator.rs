//! # Shutdown coordinator.
//!
//! [`ShutdownCoordinator`] runs the graceful-shutdown sequence exactly once per process
//! (or per coordinator), however many signals arrive.
//!
//! ## Sequence
//! 1. CAS `shutting_down: false → true`; losers return `None` at once.
//! 2. Interrupt the root task (non-blocking).
//! 3. Race the completion latch against the timeout.
//! 4. Latch first: [`ShutdownOutcome::Completed`] with the application's exit code.
//! 5. Timeout first: one diagnostic line, then [`ShutdownOutcome::TimedOut`] (exit code 1)
//!    even if finalizers are still running.
//!
//! ## Rules
//! - The latch is completed by [`release`](ShutdownCoordinator::release), normally from a
//!   watcher of the root task ([`watch`](ShutdownCoordinator::watch)).
//! - The timeout wait is bounded by the timeout, never by the finalizers.
//! - With a [`Scheduler`] attached the timeout is a scheduled entry on its timer thread,
//!   cancelled once the latch wins; without one, tokio's timer is used.
//! - Nothing is printed on the success path.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::signal::wait_for_shutdown_signal;
use crate::cell::AtomicCell;
use crate::error::{EXIT_FAILURE, RuntimeError};
use crate::runtime::{Task, TaskId};
use crate::scheduler::{CancelToken, Delay, Scheduler};
use crate::variable::SingleAssignmentVariable;

/// How long shutdown waits for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTimeout {
    /// Wait without bound.
    Infinite,
    /// Do not wait at all.
    Immediate,
    /// Wait up to this long.
    After(Duration),
}

impl From<Duration> for ShutdownTimeout {
    fn from(d: Duration) -> Self {
        match Delay::from_duration(d) {
            Delay::Immediate => ShutdownTimeout::Immediate,
            Delay::After(d) => ShutdownTimeout::After(d),
            Delay::Infinite => ShutdownTimeout::Infinite,
        }
    }
}

impl From<Option<Duration>> for ShutdownTimeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(ShutdownTimeout::Infinite, ShutdownTimeout::from)
    }
}

/// Result of a shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The application released the latch with this code.
    Completed(i32),
    /// The timeout elapsed first.
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },
    /// The timeout was zero and the application had not finished.
    Abandoned,
}

impl ShutdownOutcome {
    /// Returns the process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Completed(code) => *code,
            ShutdownOutcome::TimedOut { .. } | ShutdownOutcome::Abandoned => EXIT_FAILURE,
        }
    }
}

/// Shared sink for the shutdown diagnostic line (stderr by default).
#[derive(Clone)]
pub struct Diagnostics(Arc<Mutex<Box<dyn Write + Send>>>);

impl Diagnostics {
    /// Wraps a writer.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(sink))))
    }

    /// Writes to the process's standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Best effort: write errors are ignored.
    fn line(&self, args: fmt::Arguments<'_>) {
        let mut sink = self.0.lock();
        let _ = sink.write_fmt(args);
        let _ = sink.write_all(b"\n");
        let _ = sink.flush();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Diagnostics")
    }
}

/// Orchestrates graceful shutdown of the root task.
pub struct ShutdownCoordinator {
    shutting_down: AtomicCell<bool>,
    latch: SingleAssignmentVariable<i32>,
    outcome: SingleAssignmentVariable<ShutdownOutcome>,
    timeout: ShutdownTimeout,
    diagnostics: Diagnostics,
    scheduler: Option<Scheduler>,
}

/// Cancels a pending timeout entry when the race is decided either way.
struct Disarm(CancelToken);

impl Drop for Disarm {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl ShutdownCoordinator {
    /// Creates a coordinator writing diagnostics to stderr.
    pub fn new(timeout: impl Into<ShutdownTimeout>) -> Self {
        Self {
            shutting_down: AtomicCell::new(false),
            latch: SingleAssignmentVariable::new(),
            outcome: SingleAssignmentVariable::new(),
            timeout: timeout.into(),
            diagnostics: Diagnostics::stderr(),
            scheduler: None,
        }
    }

    /// Times the shutdown wait on `scheduler`'s timer thread.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Replaces the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Returns the configured timeout.
    pub fn timeout(&self) -> ShutdownTimeout {
        self.timeout
    }

    /// Returns true once a shutdown sequence has started.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutting_down.load()
    }

    /// Completes the latch with the application's exit code.
    ///
    /// Returns `false` if it was already released.
    pub fn release(&self, code: i32) -> bool {
        self.latch.complete_with(code)
    }

    /// Releases the latch with `root`'s exit code once it ends.
    pub fn watch<T>(self: &Arc<Self>, root: T) -> tokio::task::JoinHandle<()>
    where
        T: Task + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let status = root.await_exit().await;
            coordinator.release(status.exit_code());
        })
    }

    /// Runs the shutdown sequence against `root`.
    ///
    /// Only the first caller runs it and gets `Some`; everyone else gets `None`
    /// immediately and may wait for the result with [`outcome`](Self::outcome).
    pub async fn shutdown(&self, root: &dyn Task) -> Option<ShutdownOutcome> {
        if !self.shutting_down.compare_and_set(&false, true) {
            return None;
        }
        tracing::debug!(task = %root.descriptor().id, timeout = ?self.timeout, "shutdown started");
        root.interrupt_fork(TaskId::EXTERNAL);

        let outcome = match self.timeout {
            ShutdownTimeout::Infinite => ShutdownOutcome::Completed(self.latch.wait().await),
            ShutdownTimeout::Immediate => self
                .latch
                .poll()
                .map_or(ShutdownOutcome::Abandoned, ShutdownOutcome::Completed),
            ShutdownTimeout::After(after) => {
                tokio::select! {
                    biased;
                    code = self.latch.wait() => ShutdownOutcome::Completed(code),
                    () = self.elapsed(after) => {
                        let err = RuntimeError::ShutdownTimedOut { timeout: after };
                        tracing::warn!(label = err.as_label(), "{}", err.as_message());
                        self.diagnostics.line(format_args!(
                            "Timed out waiting for application to shut down after {after:?}."
                        ));
                        ShutdownOutcome::TimedOut { after }
                    }
                }
            }
        };

        tracing::debug!(?outcome, "shutdown finished");
        self.outcome.complete_with(outcome);
        Some(outcome)
    }

    /// Resolves once `after` has passed.
    async fn elapsed(&self, after: Duration) {
        let Some(scheduler) = &self.scheduler else {
            return tokio::time::sleep(after).await;
        };
        let fired = Arc::new(SingleAssignmentVariable::new());
        let signal = Arc::clone(&fired);
        let _disarm = Disarm(scheduler.schedule(
            move || {
                signal.complete_with(());
            },
            after,
        ));
        fired.wait().await
    }

    /// Waits for the outcome of the shutdown sequence, whoever runs it.
    pub async fn outcome(&self) -> ShutdownOutcome {
        self.outcome.wait().await
    }

    /// Waits for `root` to end on its own or for a termination signal, whichever is first.
    ///
    /// On a signal the shutdown sequence runs. If signals cannot be registered, a warning
    /// is logged and only the root's own end is awaited.
    pub async fn run_until_signal(&self, root: &dyn Task) -> ShutdownOutcome {
        let signalled = async {
            if let Err(e) = wait_for_shutdown_signal().await {
                let err = RuntimeError::from(e);
                tracing::warn!(
                    label = err.as_label(),
                    error = %err,
                    "signal listener unavailable; waiting for the application only"
                );
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            status = root.await_exit() => {
                if self.is_shutting_down() {
                    return self.outcome().await;
                }
                self.release(status.exit_code());
                let code = self.latch.poll().unwrap_or(status.exit_code());
                ShutdownOutcome::Completed(code)
            }
            () = signalled => match self.shutdown(root).await {
                Some(outcome) => outcome,
                None => self.outcome().await,
            },
        }
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutting_down", &self.is_shutting_down())
            .field("released", &self.latch.is_done())
            .field("timeout", &self.timeout)
            .field("scheduled", &self.scheduler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitStatus;
    use crate::runtime::TaskDescriptor;
    use async_trait::async_trait;
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Root whose finalizer takes `finalizer` and then releases the latch with `code`.
    struct App {
        descriptor: TaskDescriptor,
        token: CancellationToken,
    }

    impl App {
        fn start(coordinator: &Arc<ShutdownCoordinator>, finalizer: Duration, code: i32) -> Self {
            let app = Self {
                descriptor: TaskDescriptor::new("app", None),
                token: CancellationToken::new(),
            };
            let token = app.token.clone();
            let coordinator = Arc::clone(coordinator);
            tokio::spawn(async move {
                token.cancelled().await;
                tokio::time::sleep(finalizer).await;
                coordinator.release(code);
            });
            app
        }
    }

    #[async_trait]
    impl Task for App {
        fn descriptor(&self) -> &TaskDescriptor {
            &self.descriptor
        }
        fn interrupt_fork(&self, _by: TaskId) {
            self.token.cancel();
        }
        async fn await_exit(&self) -> ExitStatus {
            std::future::pending().await
        }
    }

    fn coordinator(timeout: impl Into<ShutdownTimeout>) -> (Arc<ShutdownCoordinator>, Captured) {
        let captured = Captured::default();
        let coordinator = ShutdownCoordinator::new(timeout)
            .with_diagnostics(Diagnostics::new(captured.clone()));
        (Arc::new(coordinator), captured)
    }

    #[tokio::test]
    async fn test_finalizer_within_timeout_keeps_exit_code() {
        let (coord, captured) = coordinator(Duration::from_millis(500));
        let app = App::start(&coord, Duration::from_millis(20), 3);

        let outcome = coord.shutdown(&app).await;
        assert_eq!(outcome, Some(ShutdownOutcome::Completed(3)));
        assert_eq!(outcome.map(|o| o.exit_code()), Some(3));
        assert!(captured.text().is_empty(), "nothing printed on success");
    }

    #[tokio::test]
    async fn test_finalizer_past_timeout_fails_after_timeout() {
        let timeout = Duration::from_millis(100);
        let (coord, captured) = coordinator(timeout);
        let app = App::start(&coord, Duration::from_secs(5), 0);

        let started = Instant::now();
        let outcome = coord.shutdown(&app).await;
        let waited = started.elapsed();

        assert_eq!(outcome, Some(ShutdownOutcome::TimedOut { after: timeout }));
        assert_eq!(outcome.map(|o| o.exit_code()), Some(EXIT_FAILURE));
        assert!(waited >= timeout);
        assert!(waited < Duration::from_secs(2), "must not wait for the finalizer");
        assert_eq!(
            captured.text(),
            "Timed out waiting for application to shut down after 100ms.\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shutdowns_run_once() {
        let (coord, captured) = coordinator(Duration::from_millis(50));
        let app = Arc::new(App::start(&coord, Duration::from_secs(5), 0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coord = Arc::clone(&coord);
            let app = Arc::clone(&app);
            handles.push(tokio::spawn(async move { coord.shutdown(app.as_ref()).await }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(coord.is_shutting_down());
        assert_eq!(captured.text().lines().count(), 1);
        assert!(matches!(coord.outcome().await, ShutdownOutcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_immediate_does_not_wait() {
        let (coord, captured) = coordinator(Duration::ZERO);
        assert_eq!(coord.timeout(), ShutdownTimeout::Immediate);
        let app = App::start(&coord, Duration::from_millis(50), 0);

        assert_eq!(coord.shutdown(&app).await, Some(ShutdownOutcome::Abandoned));
        assert_eq!(ShutdownOutcome::Abandoned.exit_code(), EXIT_FAILURE);
        assert!(captured.text().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_uses_code_when_already_released() {
        let (coord, _) = coordinator(Duration::ZERO);
        let app = App::start(&coord, Duration::from_secs(5), 0);
        coord.release(0);
        assert_eq!(coord.shutdown(&app).await, Some(ShutdownOutcome::Completed(0)));
    }

    #[tokio::test]
    async fn test_infinite_waits_for_latch() {
        let (coord, captured) = coordinator(None::<Duration>);
        assert_eq!(coord.timeout(), ShutdownTimeout::Infinite);
        let app = App::start(&coord, Duration::from_millis(150), 0);

        assert_eq!(coord.shutdown(&app).await, Some(ShutdownOutcome::Completed(0)));
        assert!(captured.text().is_empty());
    }

    fn scheduled(timeout: Duration) -> (Arc<ShutdownCoordinator>, Captured, Scheduler) {
        let captured = Captured::default();
        let scheduler = Scheduler::new("fibervisor-test-shutdown").unwrap();
        let coordinator = ShutdownCoordinator::new(timeout)
            .with_diagnostics(Diagnostics::new(captured.clone()))
            .with_scheduler(scheduler.clone());
        (Arc::new(coordinator), captured, scheduler)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_times_the_wait() {
        let timeout = Duration::from_millis(100);
        let (coord, captured, scheduler) = scheduled(timeout);
        let app = App::start(&coord, Duration::from_secs(5), 0);

        let started = Instant::now();
        let outcome = coord.shutdown(&app).await;

        assert_eq!(outcome, Some(ShutdownOutcome::TimedOut { after: timeout }));
        assert!(started.elapsed() >= timeout);
        assert_eq!(scheduler.pending(), 0, "timeout entry fired");
        assert_eq!(
            captured.text(),
            "Timed out waiting for application to shut down after 100ms.\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_released_latch_disarms_scheduled_timeout() {
        let (coord, captured, scheduler) = scheduled(Duration::from_secs(30));
        let app = App::start(&coord, Duration::from_millis(20), 4);

        assert_eq!(coord.shutdown(&app).await, Some(ShutdownOutcome::Completed(4)));
        assert!(captured.text().is_empty());
        assert_eq!(coord.outcome().await, ShutdownOutcome::Completed(4));
        scheduler.shutdown();
    }

    #[test]
    fn test_timeout_classification() {
        assert_eq!(ShutdownTimeout::from(Duration::MAX), ShutdownTimeout::Infinite);
        assert_eq!(
            ShutdownTimeout::from(Some(Duration::from_secs(1))),
            ShutdownTimeout::After(Duration::from_secs(1))
        );
        assert_eq!(ShutdownTimeout::from(Duration::ZERO), ShutdownTimeout::Immediate);
    }

    #[test]
    fn test_release_is_single_assignment() {
        let coord = ShutdownCoordinator::new(None::<Duration>);
        assert!(coord.release(0));
        assert!(!coord.release(1));
    }
}
