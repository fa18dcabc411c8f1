//! # Lock-free atomic cell.
//!
//! [`AtomicCell`] holds a value behind an [`arc_swap::ArcSwap`] and mutates it only
//! through compare-and-set. Every value a reader can observe was installed by one
//! successful CAS, so torn intermediate states are never visible.
//!
//! ## Update loop
//! ```text
//! loop {
//!   current = load()
//!   (b, next) = f(&current)
//!   if CAS(current → next) { return b }   // identity of the Arc, not value
//! }
//! ```
//!
//! ## Rules
//! - All operations are total and non-blocking; the cell never fails.
//! - Update closures are `Fn`: they may run several times under contention and must be pure.
//! - The retry loop is unbounded. Under pathological contention it can livelock; adding
//!   backoff would not change the contract.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Atomic holder of a `T`, updated by compare-and-set.
pub struct AtomicCell<T> {
    inner: ArcSwap<T>,
}

impl<T> AtomicCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: ArcSwap::from_pointee(value),
        }
    }

    /// Returns a shared snapshot of the current value.
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replaces the current value unconditionally.
    #[inline]
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Replaces the current value and returns the previous snapshot.
    #[inline]
    pub fn get_and_set(&self, value: T) -> Arc<T> {
        self.inner.swap(Arc::new(value))
    }

    /// Installs `new` only if the cell still holds exactly the `current` snapshot.
    ///
    /// Compares by pointer identity. This is the primitive every other update is built on.
    pub fn compare_and_swap_ptr(&self, current: &Arc<T>, new: Arc<T>) -> bool {
        let prev = self.inner.compare_and_swap(current, new);
        Arc::ptr_eq(&*prev, current)
    }

    /// Atomically computes a return value and a replacement from the current value.
    ///
    /// `f` is retried until its result is installed by a successful CAS.
    pub fn modify<B, F>(&self, f: F) -> B
    where
        F: Fn(&T) -> (B, T),
    {
        loop {
            let current = self.load();
            let (out, next) = f(&current);
            if self.compare_and_swap_ptr(&current, Arc::new(next)) {
                return out;
            }
        }
    }

    /// Like [`modify`](Self::modify), but leaves the value untouched and returns `default`
    /// when `pf` is not defined for the current value.
    pub fn modify_some<B, F>(&self, default: B, pf: F) -> B
    where
        F: Fn(&T) -> Option<(B, T)>,
    {
        loop {
            let current = self.load();
            let Some((out, next)) = pf(&current) else {
                return default;
            };
            if self.compare_and_swap_ptr(&current, Arc::new(next)) {
                return out;
            }
        }
    }

    /// Applies `f` to the current value.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.modify(|v| ((), f(v)));
    }

    /// Applies `f` where defined; otherwise leaves the value unchanged.
    pub fn update_some<F>(&self, pf: F)
    where
        F: Fn(&T) -> Option<T>,
    {
        self.modify_some((), |v| pf(v).map(|next| ((), next)));
    }
}

impl<T: Clone> AtomicCell<T> {
    /// Returns a clone of the current value.
    #[inline]
    pub fn get(&self) -> T {
        T::clone(&**self.inner.load())
    }

    /// Applies `f` and returns the value seen before the update.
    pub fn get_and_update<F>(&self, f: F) -> T
    where
        F: Fn(&T) -> T,
    {
        self.modify(|v| (v.clone(), f(v)))
    }

    /// Applies `f` and returns the installed value.
    pub fn update_and_get<F>(&self, f: F) -> T
    where
        F: Fn(&T) -> T,
    {
        self.modify(|v| {
            let next = f(v);
            (next.clone(), next)
        })
    }

    /// Applies `pf` where defined and returns the value seen before the attempt.
    pub fn get_and_update_some<F>(&self, pf: F) -> T
    where
        F: Fn(&T) -> Option<T>,
    {
        loop {
            let current = self.load();
            let Some(next) = pf(&current) else {
                return T::clone(&current);
            };
            if self.compare_and_swap_ptr(&current, Arc::new(next)) {
                return T::clone(&current);
            }
        }
    }

    /// Applies `pf` where defined and returns the resulting value.
    pub fn update_some_and_get<F>(&self, pf: F) -> T
    where
        F: Fn(&T) -> Option<T>,
    {
        loop {
            let current = self.load();
            let Some(next) = pf(&current) else {
                return T::clone(&current);
            };
            let next = Arc::new(next);
            if self.compare_and_swap_ptr(&current, Arc::clone(&next)) {
                return T::clone(&next);
            }
        }
    }
}

impl<T: PartialEq> AtomicCell<T> {
    /// Installs `new` if the current value equals `expected`.
    ///
    /// Returns `false` without touching the cell when the values differ.
    pub fn compare_and_set(&self, expected: &T, new: T) -> bool {
        let new = Arc::new(new);
        loop {
            let current = self.load();
            if *current != *expected {
                return false;
            }
            // An equal value may have been re-installed between load and CAS; retry then.
            if self.compare_and_swap_ptr(&current, Arc::clone(&new)) {
                return true;
            }
        }
    }
}

impl<T: Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&*self.load()).finish()
    }
}
