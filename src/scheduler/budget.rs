//! # Operation budget for cooperative yielding.
//!
//! A task that never awaits anything pending would otherwise hold its worker forever.
//! [`YieldBudget`] counts operations and reports when the task should give the worker
//! back; the runtime's checkpoint then yields and resets it.

/// Default number of operations between forced yields.
pub const DEFAULT_YIELD_BUDGET: u32 = 10_240;

/// Countdown of operations before a forced yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldBudget {
    max_ops: u32,
    remaining: u32,
}

impl YieldBudget {
    /// Creates a budget of `max_ops` operations; `0` disables forced yields.
    pub const fn new(max_ops: u32) -> Self {
        Self {
            max_ops,
            remaining: max_ops,
        }
    }

    /// Counts one operation and returns true once the budget is exhausted.
    #[inline]
    pub fn tick(&mut self) -> bool {
        if self.max_ops == 0 {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    /// Starts a fresh budget.
    #[inline]
    pub fn reset(&mut self) {
        self.remaining = self.max_ops;
    }

    /// Returns how many operations remain before the next forced yield.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Default for YieldBudget {
    fn default() -> Self {
        Self::new(DEFAULT_YIELD_BUDGET)
    }
}
