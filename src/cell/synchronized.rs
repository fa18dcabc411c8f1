//! # Synchronized cell for effectful read-modify-write.
//!
//! [`SynchronizedCell`] pairs an [`AtomicCell`] with a 1-permit [`Semaphore`]. The permit
//! covers the whole read → async transform → write sequence, so effectful updates are
//! totally ordered relative to one another.
//!
//! ```text
//! modify_effectful(f):
//!   acquire permit (suspends while held)
//!     ├─ v = cell.get()
//!     ├─ (b, v') = f(v).await
//!     └─ cell.set(v')
//!   release permit (RAII; also on drop/interruption)
//! ```
//!
//! ## Rules
//! - `get` / `set` take the permit too, so they observe and publish immediately
//!   relative to effectful updates.
//! - `set_async` bypasses the permit: cheaper, but only eventually visible and
//!   unordered relative to in-flight effectful updates.
//! - A cancelled holder releases its permit when its future is dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use super::AtomicCell;

/// Cell whose updates may suspend, serialized by a binary semaphore.
pub struct SynchronizedCell<T> {
    cell: AtomicCell<T>,
    permit: Semaphore,
}

impl<T> SynchronizedCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            cell: AtomicCell::new(value),
            permit: Semaphore::new(1),
        }
    }

    /// Writes without taking the permit.
    ///
    /// The write races with any in-flight effectful update: whichever installs last wins.
    pub fn set_async(&self, value: T) {
        self.cell.set(value);
    }

    /// Writes under the permit.
    pub async fn set(&self, value: T) {
        let _guard = self.acquire().await;
        self.cell.set(value);
    }

    /// Returns a shared snapshot without waiting for the permit.
    pub fn snapshot(&self) -> Arc<T> {
        self.cell.load()
    }

    async fn acquire(&self) -> SemaphorePermit<'_> {
        match self.permit.acquire().await {
            Ok(p) => p,
            // The semaphore is owned here and never closed.
            Err(_) => unreachable!("synchronized cell permit closed"),
        }
    }
}

impl<T: Clone> SynchronizedCell<T> {
    /// Reads under the permit.
    pub async fn get(&self) -> T {
        let _guard = self.acquire().await;
        self.cell.get()
    }

    /// Reads only if no effectful update currently holds the permit.
    pub fn try_get(&self) -> Option<T> {
        let _guard = self.permit.try_acquire().ok()?;
        Some(self.cell.get())
    }

    /// Runs `f` on the current value under the permit and installs its result.
    pub async fn modify_effectful<B, F, Fut>(&self, f: F) -> B
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = (B, T)>,
    {
        let _guard = self.acquire().await;
        let (out, next) = f(self.cell.get()).await;
        self.cell.set(next);
        out
    }

    /// Fallible variant of [`modify_effectful`](Self::modify_effectful).
    ///
    /// On `Err` the value stays unchanged and the error is returned.
    pub async fn try_modify_effectful<B, E, F, Fut>(&self, f: F) -> Result<B, E>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(B, T), E>>,
    {
        let _guard = self.acquire().await;
        let (out, next) = f(self.cell.get()).await?;
        self.cell.set(next);
        Ok(out)
    }

    /// Replaces the value with the result of `f`.
    pub async fn update_effectful<F, Fut>(&self, f: F)
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = T>,
    {
        self.modify_effectful(|v| async move { ((), f(v).await) })
            .await
    }

    /// Replaces the value and returns the one it replaced.
    pub async fn get_and_update_effectful<F, Fut>(&self, f: F) -> T
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = T>,
    {
        self.modify_effectful(|v| async move {
            let next = f(v.clone()).await;
            (v, next)
        })
        .await
    }

    /// Replaces the value and returns the new one.
    pub async fn update_and_get_effectful<F, Fut>(&self, f: F) -> T
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = T>,
    {
        self.modify_effectful(|v| async move {
            let next = f(v).await;
            (next.clone(), next)
        })
        .await
    }

    /// Replaces the value only when `pf` yields `Some`.
    pub async fn update_some_effectful<F, Fut>(&self, pf: F)
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        self.modify_effectful(|v| async move {
            match pf(v.clone()).await {
                Some(next) => ((), next),
                None => ((), v),
            }
        })
        .await
    }
}
