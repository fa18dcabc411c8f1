//! # Persistent list of pending callbacks.
//!
//! [`WaiterList`] is an immutable singly-linked chain. Every "mutation" returns a new list
//! that shares structure with the old one, which lets the owning variable swap whole lists
//! in and out of its [`AtomicCell`](crate::cell::AtomicCell) with a single CAS.
//!
//! ## Complexity
//! - `prepend`: O(1), shares the old list as tail
//! - `remove`: O(n), materializes the prefix into a `Vec` and rebuilds it (no recursion)
//! - `complete_all` / `iter`: O(n), iterative
//!
//! A panicking callback is caught and logged; the remaining waiters are still notified.
//! - `Drop`: iterative, so chains of 10⁵+ nodes never exhaust the stack

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::supervision::panic_message;

/// Global counter for waiter identities.
static WAITER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered waiter, used for removal on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl WaiterId {
    fn next() -> Self {
        Self(WAITER_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Callback invoked once with the completed value.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A callback tagged with its identity.
pub struct Waiter<T> {
    id: WaiterId,
    callback: Callback<T>,
}

impl<T> Waiter<T> {
    /// Wraps `callback` under a fresh identity.
    pub fn new(callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            id: WaiterId::next(),
            callback: Arc::new(callback),
        }
    }

    /// Returns this waiter's identity.
    #[inline]
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Invokes the callback. A panic is caught and logged, never propagated.
    pub fn notify(&self, value: &T) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (self.callback)(value))) {
            tracing::warn!(
                waiter = ?self.id,
                info = %panic_message(panic.as_ref()),
                "waiter callback panicked; ignored"
            );
        }
    }
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("id", &self.id).finish()
    }
}

struct Node<T> {
    waiter: Waiter<T>,
    tail: WaiterList<T>,
}

/// Immutable chain of waiters, newest first.
pub struct WaiterList<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

impl<T> WaiterList<T> {
    /// Returns an empty list.
    pub const fn empty() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns the number of waiters.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no waiter is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns a new list with `waiter` in front of this one.
    pub fn prepend(&self, waiter: Waiter<T>) -> Self {
        Self {
            len: self.len + 1,
            head: Some(Arc::new(Node {
                waiter,
                tail: self.clone(),
            })),
        }
    }

    /// Returns a list without the waiter identified by `id`.
    ///
    /// Returns `None` when no such waiter is present, leaving the caller free to skip its CAS.
    pub fn remove(&self, id: WaiterId) -> Option<Self> {
        let mut prefix: Vec<Waiter<T>> = Vec::new();
        let mut cursor = self.head.as_ref();

        while let Some(node) = cursor {
            if node.waiter.id == id {
                let mut rebuilt = node.tail.clone();
                for waiter in prefix.into_iter().rev() {
                    rebuilt = rebuilt.prepend(waiter);
                }
                return Some(rebuilt);
            }
            prefix.push(node.waiter.clone());
            cursor = node.tail.head.as_ref();
        }
        None
    }

    /// Returns true if a waiter with this identity is present.
    pub fn contains(&self, id: WaiterId) -> bool {
        self.iter().any(|w| w.id == id)
    }

    /// Iterates over the waiters, newest first.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            cursor: self.head.as_deref(),
        }
    }

    /// Invokes every waiter with `value`, returning how many were notified.
    ///
    /// A panicking callback still counts as notified.
    pub fn complete_all(&self, value: &T) -> usize {
        let mut fired = 0;
        for waiter in self.iter() {
            waiter.notify(value);
            fired += 1;
        }
        fired
    }
}

impl<T> Clone for WaiterList<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for WaiterList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for WaiterList<T> {
    fn drop(&mut self) {
        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut node) => cursor = node.tail.head.take(),
                // Shared with another list; that owner unwinds the rest.
                Err(_) => break,
            }
        }
    }
}

impl<T> fmt::Debug for WaiterList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|w| w.id)).finish()
    }
}

/// Iterator over a [`WaiterList`].
pub struct Iter<'a, T> {
    cursor: Option<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Waiter<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        self.cursor = node.tail.head.as_deref();
        Some(&node.waiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> Waiter<u32> {
        let counter = Arc::clone(counter);
        Waiter::new(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        })
    }

    #[test]
    fn test_prepend_shares_tail() {
        let counter = Arc::new(AtomicUsize::new(0));
        let base = WaiterList::empty().prepend(counting(&counter));
        let a = base.prepend(counting(&counter));
        let b = base.prepend(counting(&counter));

        assert_eq!(base.len(), 1);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(a.complete_all(&0), 2);
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn test_remove_by_identity() {
        let counter = Arc::new(AtomicUsize::new(0));
        let w1 = counting(&counter);
        let w2 = counting(&counter);
        let w3 = counting(&counter);
        let (id1, id2, id3) = (w1.id(), w2.id(), w3.id());

        let list = WaiterList::empty().prepend(w1).prepend(w2).prepend(w3);
        let without = list.remove(id2).unwrap();

        assert_eq!(without.len(), 2);
        assert!(without.contains(id1));
        assert!(!without.contains(id2));
        assert!(without.contains(id3));
        assert!(list.contains(id2), "original list must be untouched");
        assert!(without.remove(id2).is_none());
    }

    #[test]
    fn test_random_removal_fires_only_survivors() {
        const TOTAL: usize = 10_000;
        const REMOVED: usize = 3_000;

        let counter = Arc::new(AtomicUsize::new(0));
        let mut list = WaiterList::empty();
        let mut ids = Vec::with_capacity(TOTAL);
        for _ in 0..TOTAL {
            let w = counting(&counter);
            ids.push(w.id());
            list = list.prepend(w);
        }

        ids.shuffle(&mut rand::rng());
        for id in &ids[..REMOVED] {
            list = list.remove(*id).unwrap();
        }

        assert_eq!(list.len(), TOTAL - REMOVED);
        assert_eq!(list.complete_all(&1), TOTAL - REMOVED);
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 7_000);
    }

    #[test]
    fn test_panicking_callback_does_not_skip_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let list = WaiterList::empty()
            .prepend(counting(&counter))
            .prepend(Waiter::new(|_: &u32| panic!("callback failure")))
            .prepend(counting(&counter));

        assert_eq!(list.complete_all(&1), 3);
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn test_large_list_is_stack_safe() {
        let mut list = WaiterList::empty();
        let mut first = None;
        for _ in 0..200_000 {
            let w = Waiter::new(|_: &u32| {});
            first.get_or_insert(w.id());
            list = list.prepend(w);
        }
        assert_eq!(list.iter().count(), 200_000);

        // Removing the oldest entry materializes the whole chain.
        let removed = list.remove(first.unwrap()).unwrap();
        assert_eq!(removed.len(), 199_999);

        drop(list);
        drop(removed);
    }
}
