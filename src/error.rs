//! Error and exit types used by fibervisor.
//!
//! This module defines:
//!
//! - [`Cause`]: why a task did not succeed (typed failure, defect or interruption).
//! - [`Exit`]: the terminal value of a task (`Success` or `Failure(Cause)`).
//! - [`ExitStatus`]: untyped summary of an [`Exit`], handed to supervisors.
//! - [`RuntimeError`]: errors raised by the runtime itself.
//!
//! All of them provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::runtime::TaskId;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for failures, interruptions and shutdown timeouts.
pub const EXIT_FAILURE: i32 = 1;

/// # Why a task ended without a value.
///
/// The three causes are kept apart so callers can tell "cancelled" from "failed", and
/// supervisors can tell recoverable failures from defects.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Cause<E> {
    /// Ordinary, expected failure carrying a typed error.
    #[error("failed: {0}")]
    Fail(E),

    /// Unexpected fault (e.g. a panic inside the task). Not recoverable.
    #[error("defect: {0}")]
    Die(String),

    /// The task was interrupted by another task.
    #[error("interrupted by {0}")]
    Interrupt(TaskId),
}

impl<E> Cause<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fibervisor::Cause;
    ///
    /// let cause: Cause<String> = Cause::Die("oops".into());
    /// assert_eq!(cause.as_label(), "task_died");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Cause::Fail(_) => "task_failed",
            Cause::Die(_) => "task_died",
            Cause::Interrupt(_) => "task_interrupted",
        }
    }

    /// Returns true for [`Cause::Interrupt`].
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Cause::Interrupt(_))
    }

    /// Returns true for [`Cause::Die`].
    #[inline]
    pub fn is_defect(&self) -> bool {
        matches!(self, Cause::Die(_))
    }
}

impl<E: std::fmt::Display> Cause<E> {
    /// Returns a human-readable message with details about the cause.
    pub fn as_message(&self) -> String {
        match self {
            Cause::Fail(e) => format!("error: {e}"),
            Cause::Die(d) => format!("defect: {d}"),
            Cause::Interrupt(by) => format!("interrupted by {by}"),
        }
    }
}

/// Terminal value of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit<A, E> {
    Success(A),
    Failure(Cause<E>),
}

impl<A, E> Exit<A, E> {
    /// Returns true for [`Exit::Success`].
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success(_))
    }

    /// Returns true if the task was interrupted.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Exit::Failure(c) if c.is_interrupted())
    }

    /// Converts into a `Result`, keeping the cause as the error.
    pub fn into_result(self) -> Result<A, Cause<E>> {
        match self {
            Exit::Success(a) => Ok(a),
            Exit::Failure(c) => Err(c),
        }
    }

    /// Returns the process exit code this exit maps to.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}

impl<A, E: std::fmt::Display> Exit<A, E> {
    /// Summarizes this exit for supervisors, dropping the typed payloads.
    pub fn status(&self) -> ExitStatus {
        match self {
            Exit::Success(_) => ExitStatus::Success,
            Exit::Failure(Cause::Fail(e)) => ExitStatus::Failure(e.to_string()),
            Exit::Failure(Cause::Die(d)) => ExitStatus::Died(d.clone()),
            Exit::Failure(Cause::Interrupt(by)) => ExitStatus::Interrupted(*by),
        }
    }
}

impl<A, E> From<Result<A, E>> for Exit<A, E> {
    fn from(r: Result<A, E>) -> Self {
        match r {
            Ok(a) => Exit::Success(a),
            Err(e) => Exit::Failure(Cause::Fail(e)),
        }
    }
}

/// Untyped summary of a task's [`Exit`], delivered to supervisors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure(String),
    Died(String),
    Interrupted(TaskId),
}

impl ExitStatus {
    /// Returns the process exit code this status maps to.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitStatus::Success => EXIT_SUCCESS,
            _ => EXIT_FAILURE,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitStatus::Success => "task_succeeded",
            ExitStatus::Failure(_) => "task_failed",
            ExitStatus::Died(_) => "task_died",
            ExitStatus::Interrupted(_) => "task_interrupted",
        }
    }
}

/// # Errors produced by the fibervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Graceful shutdown did not finish before the configured timeout.
    #[error("timed out waiting for shutdown after {timeout:?}")]
    ShutdownTimedOut {
        /// The configured shutdown timeout.
        timeout: Duration,
    },

    /// Registering the termination signal listener failed.
    #[error("signal listener failed: {0}")]
    Signal(#[from] std::io::Error),

    /// The scheduler's timer thread could not be spawned.
    #[error("failed to spawn timer thread: {source}")]
    TimerThread {
        /// Underlying spawn error.
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fibervisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::ShutdownTimedOut { timeout: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "runtime_shutdown_timed_out");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ShutdownTimedOut { .. } => "runtime_shutdown_timed_out",
            RuntimeError::Signal(_) => "runtime_signal_failed",
            RuntimeError::TimerThread { .. } => "runtime_timer_thread_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::ShutdownTimedOut { timeout } => {
                format!("shutdown timed out after {timeout:?}")
            }
            RuntimeError::Signal(e) => format!("signal listener: {e}"),
            RuntimeError::TimerThread { source } => format!("timer thread: {source}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let ok: Exit<(), String> = Exit::Success(());
        let failed: Exit<(), String> = Exit::Failure(Cause::Fail("x".into()));
        assert_eq!(ok.exit_code(), EXIT_SUCCESS);
        assert_eq!(failed.exit_code(), EXIT_FAILURE);
        assert_eq!(ExitStatus::Interrupted(TaskId::from_raw(3)).exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_status_keeps_cause_kind() {
        let by = TaskId::from_raw(9);
        let cases: Vec<(Exit<u8, &str>, ExitStatus)> = vec![
            (Exit::Success(1), ExitStatus::Success),
            (Exit::Failure(Cause::Fail("bad")), ExitStatus::Failure("bad".into())),
            (Exit::Failure(Cause::Die("bug".into())), ExitStatus::Died("bug".into())),
            (Exit::Failure(Cause::Interrupt(by)), ExitStatus::Interrupted(by)),
        ];
        for (exit, status) in cases {
            assert_eq!(exit.status(), status);
        }
    }

    #[test]
    fn test_interruption_is_not_a_failure_value() {
        let exit: Exit<(), String> = Exit::Failure(Cause::Interrupt(TaskId::from_raw(1)));
        assert!(exit.is_interrupted());
        assert!(!Cause::<String>::Die("d".into()).is_interrupted());
        assert!(Cause::<String>::Die("d".into()).is_defect());
    }

    #[test]
    fn test_from_result() {
        let exit: Exit<u8, &str> = Err("nope").into();
        assert_eq!(exit.clone().into_result(), Err(Cause::Fail("nope")));
        assert_eq!(exit.status().as_label(), "task_failed");
    }
}
