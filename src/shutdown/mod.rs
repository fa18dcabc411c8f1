//! # Process-wide graceful shutdown.
//!
//! - [`ShutdownCoordinator`] turns a termination signal into an interruption of the root
//!   task and waits for the application, bounded by a [`ShutdownTimeout`].
//! - [`wait_for_shutdown_signal`] listens for platform termination signals.
//! - [`fatal`] and [`terminate`] leave the process.
//!
//! ```text
//! signal ──► shutdown(root) ──► CAS shutting_down ──► root.interrupt_fork()
//!                                   └─► race latch vs timeout
//!                                         ├─ latch   ──► Completed(code)
//!                                         └─ timeout ──► one diagnostic line, TimedOut
//! ```

mod coordinator;
mod signal;

pub use coordinator::{Diagnostics, ShutdownCoordinator, ShutdownOutcome, ShutdownTimeout};
pub use signal::wait_for_shutdown_signal;

use std::io::Write;

/// Reports a catastrophic host error and aborts the process.
///
/// Writes one best-effort line to stderr; no destructors or finalizers run.
pub fn fatal(msg: &str) -> ! {
    let _ = writeln!(std::io::stderr().lock(), "fatal: {msg}");
    std::process::abort()
}

/// Exits the process with `code`.
pub fn terminate(code: i32) -> ! {
    tracing::debug!(code, "terminating process");
    std::process::exit(code)
}
