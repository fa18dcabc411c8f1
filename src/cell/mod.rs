//! Concurrently mutable cells.
//!
//! - [`AtomicCell`] lock-free holder updated by compare-and-set;
//! - [`SynchronizedCell`] effectful read-modify-write under a 1-permit semaphore.

mod atomic;
mod synchronized;

pub use atomic::AtomicCell;
pub use synchronized::SynchronizedCell;
