//! # Task supervision.
//!
//! This module provides the [`Supervise`] trait, the composable [`Supervisor`] tree that
//! the runtime drives, and built-in observers.
//!
//! ## Architecture
//! ```text
//! Runtime::fork ──► Supervisor::on_start ──► leaf1.on_start, leaf2.on_start, ...
//! checkpoint()  ──► on_suspend / yield / on_resume
//! task end      ──► Supervisor::on_end  ──► then the fiber's exit is published
//! ```
//!
//! ## Observer types
//! - **Passive** observers react to hooks (logging, alerts): [`LogSupervisor`]
//!   (feature `logging`).
//! - **Stateful** observers accumulate state in private cells and expose it
//!   through [`Supervise::value`]: [`Track`].
//!
//! Trees change by value; [`SupervisorPatch`] records the difference between two trees.

#[cfg(feature = "logging")]
mod log;
mod patch;
mod supervisor;
mod track;

#[cfg(feature = "logging")]
pub use log::LogSupervisor;
pub use patch::SupervisorPatch;
pub use supervisor::{Observation, Supervise, Supervisor};
pub use track::Track;

pub(crate) use supervisor::panic_message;
