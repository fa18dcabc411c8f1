//! Single-assignment variables and their waiter lists.
//!
//! - [`SingleAssignmentVariable`] empty → completed exactly once, many observers;
//! - [`WaiterList`] persistent chain of pending callbacks backing the variable.

mod single;
mod waiters;

pub use single::{Await, Registration, SingleAssignmentVariable};
pub use waiters::{Callback, Iter, Waiter, WaiterId, WaiterList};
