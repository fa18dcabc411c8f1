//! # Single-assignment asynchronous variable.
//!
//! [`SingleAssignmentVariable`] starts `Pending` and is completed exactly once. Any number
//! of observers may wait for it, before or after completion.
//!
//! ## State machine
//! ```text
//! Pending(waiters) ──complete_with(v)──► Done(v)      (terminal)
//!
//! register(cb):   loop { Pending(ws) → CAS Pending(ws + cb) ; Done(v) → cb(v) now }
//! unregister(id): loop { Pending(ws) → CAS Pending(ws - id) ; Done(_) → false   }
//! complete_with:  loop { Pending(ws) → CAS Done(v) then fire ws ; Done(_) → false }
//! ```
//!
//! ## Rules
//! - Completion is linearizable at the CAS: exactly one `complete_with` returns `true`.
//! - Every waiter registered before completion is notified exactly once, after the CAS.
//! - A cancelled waiter is removed before its cancellation is honored and never fires.
//! - Notification order among waiters is unspecified.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

use super::waiters::{Waiter, WaiterId, WaiterList};
use crate::cell::AtomicCell;
use crate::error::{Cause, Exit};
use crate::runtime::TaskId;

/// Internal state of a variable.
enum State<T> {
    Pending(WaiterList<T>),
    Done(T),
}

/// Outcome of [`SingleAssignmentVariable::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The variable was already done; the callback has run on the caller's thread.
    Completed,
    /// The callback is queued; keep the id to unregister on cancellation.
    Pending(WaiterId),
}

/// Variable completed at most once, observable by many waiters.
pub struct SingleAssignmentVariable<T> {
    state: AtomicCell<State<T>>,
}

impl<T> SingleAssignmentVariable<T> {
    /// Creates a pending variable.
    pub fn new() -> Self {
        Self {
            state: AtomicCell::new(State::Pending(WaiterList::empty())),
        }
    }

    /// Returns true once the variable has been completed.
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(*self.state.load(), State::Done(_))
    }

    /// Returns the number of waiters currently queued (0 once done).
    pub fn waiter_count(&self) -> usize {
        match &*self.state.load() {
            State::Pending(waiters) => waiters.len(),
            State::Done(_) => 0,
        }
    }

    /// Completes the variable with `value`.
    ///
    /// Returns `true` for the single call that wins; every later call is a no-op returning
    /// `false`. Waiters are notified on the winning caller's thread, after the CAS.
    pub fn complete_with(&self, value: T) -> bool {
        let done = Arc::new(State::Done(value));
        loop {
            let current = self.state.load();
            let State::Pending(waiters) = &*current else {
                return false;
            };
            if self.state.compare_and_swap_ptr(&current, Arc::clone(&done)) {
                if let State::Done(value) = &*done {
                    waiters.complete_all(value);
                }
                return true;
            }
        }
    }

    /// Registers `callback` to run once with the completed value.
    ///
    /// Runs it immediately when the variable is already done, including when completion
    /// races with the registration.
    pub fn register(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Registration {
        let waiter = Waiter::new(callback);
        loop {
            let current = self.state.load();
            match &*current {
                State::Done(value) => {
                    waiter.notify(value);
                    return Registration::Completed;
                }
                State::Pending(waiters) => {
                    let next = Arc::new(State::Pending(waiters.prepend(waiter.clone())));
                    if self.state.compare_and_swap_ptr(&current, next) {
                        return Registration::Pending(waiter.id());
                    }
                }
            }
        }
    }

    /// Removes a pending waiter.
    ///
    /// Returns `false` if the variable is already done or the waiter is gone; in the first
    /// case the callback has fired or is firing.
    pub fn unregister(&self, id: WaiterId) -> bool {
        loop {
            let current = self.state.load();
            let State::Pending(waiters) = &*current else {
                return false;
            };
            let Some(rest) = waiters.remove(id) else {
                return false;
            };
            if self
                .state
                .compare_and_swap_ptr(&current, Arc::new(State::Pending(rest)))
            {
                return true;
            }
        }
    }
}

impl<T: Clone> SingleAssignmentVariable<T> {
    /// Returns the value if done, without blocking.
    pub fn poll(&self) -> Option<T> {
        match &*self.state.load() {
            State::Done(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Waits for completion.
    ///
    /// Dropping the returned future before it resolves deregisters its waiter.
    pub fn wait(&self) -> Await<'_, T> {
        Await {
            var: self,
            waker: Arc::new(AtomicWaker::new()),
            registered: None,
        }
    }
}

impl<A, E> SingleAssignmentVariable<Exit<A, E>> {
    /// Completes with a success.
    pub fn succeed(&self, value: A) -> bool {
        self.complete_with(Exit::Success(value))
    }

    /// Completes with a typed failure.
    pub fn fail(&self, error: E) -> bool {
        self.complete_with(Exit::Failure(Cause::Fail(error)))
    }

    /// Completes with a defect.
    pub fn die(&self, defect: impl Into<String>) -> bool {
        self.complete_with(Exit::Failure(Cause::Die(defect.into())))
    }

    /// Completes with an interruption attributed to `by`.
    pub fn interrupt(&self, by: TaskId) -> bool {
        self.complete_with(Exit::Failure(Cause::Interrupt(by)))
    }
}

impl<T> Default for SingleAssignmentVariable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SingleAssignmentVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.load() {
            State::Pending(waiters) => f
                .debug_struct("SingleAssignmentVariable")
                .field("state", &"pending")
                .field("waiters", &waiters.len())
                .finish(),
            State::Done(_) => f
                .debug_struct("SingleAssignmentVariable")
                .field("state", &"done")
                .finish(),
        }
    }
}

/// Future returned by [`SingleAssignmentVariable::wait`].
pub struct Await<'a, T> {
    var: &'a SingleAssignmentVariable<T>,
    waker: Arc<AtomicWaker>,
    registered: Option<WaiterId>,
}

impl<T: Clone> Future for Await<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        // Fast path: no suspension once done.
        if let Some(value) = this.var.poll() {
            this.registered = None;
            return Poll::Ready(value);
        }

        // Store the waker before checking again, so a completion in between still wakes us.
        this.waker.register(cx.waker());

        if this.registered.is_none() {
            let waker = Arc::clone(&this.waker);
            match this.var.register(move |_| waker.wake()) {
                Registration::Completed => {}
                Registration::Pending(id) => this.registered = Some(id),
            }
        }

        match this.var.poll() {
            Some(value) => {
                this.registered = None;
                Poll::Ready(value)
            }
            None => Poll::Pending,
        }
    }
}

impl<T> Drop for Await<'_, T> {
    fn drop(&mut self) {
        if let Some(id) = self.registered.take() {
            self.var.unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_complete_once() {
        let var = SingleAssignmentVariable::new();
        assert!(!var.is_done());
        assert_eq!(var.poll(), None);
        assert!(var.complete_with(1));
        assert!(!var.complete_with(2));
        assert!(var.is_done());
        assert_eq!(var.poll(), Some(1));
    }

    #[test]
    fn test_register_after_done_runs_immediately() {
        let var = SingleAssignmentVariable::new();
        var.complete_with(7u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let reg = var.register(move |v| {
            s.store(*v as usize, Ordering::SeqCst);
        });
        assert_eq!(reg, Registration::Completed);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_panicking_waiter_does_not_starve_others() {
        let var = SingleAssignmentVariable::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        var.register(move |_: &u32| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        var.register(|_: &u32| panic!("waiter failure"));

        assert!(var.complete_with(1));
        assert!(var.is_done());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Late registration runs inline and is isolated the same way.
        assert_eq!(var.register(|_| panic!("late failure")), Registration::Completed);
    }

    #[test]
    fn test_unregistered_waiter_never_fires() {
        let var = SingleAssignmentVariable::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let Registration::Pending(id) = var.register(move |_: &u8| {
            f.fetch_add(1, Ordering::SeqCst);
        }) else {
            panic!("variable should be pending");
        };
        assert!(var.unregister(id));
        assert!(!var.unregister(id));
        var.complete_with(0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(var.waiter_count(), 0);
    }

    #[test]
    fn test_removal_of_thirty_percent() {
        let var = SingleAssignmentVariable::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut ids = Vec::new();
        for _ in 0..10_000 {
            let f = Arc::clone(&fired);
            if let Registration::Pending(id) = var.register(move |_: &()| {
                f.fetch_add(1, Ordering::SeqCst);
            }) {
                ids.push(id);
            }
        }
        use rand::seq::SliceRandom;
        ids.shuffle(&mut rand::rng());
        for id in &ids[..3_000] {
            assert!(var.unregister(*id));
        }
        assert!(var.complete_with(()));
        assert_eq!(fired.load(Ordering::SeqCst), 7_000);
    }

    #[test]
    fn test_exactly_once_under_concurrent_completion() {
        let var: Arc<SingleAssignmentVariable<Exit<u32, String>>> =
            Arc::new(SingleAssignmentVariable::new());
        let handles: Vec<_> = (0..12u32)
            .map(|i| {
                let var = Arc::clone(&var);
                thread::spawn(move || match i % 3 {
                    0 => var.succeed(i),
                    1 => var.fail(format!("err-{i}")),
                    _ => var.interrupt(TaskId::from_raw(u64::from(i))),
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);

        let first = var.poll().unwrap();
        for _ in 0..10 {
            assert_eq!(var.poll().unwrap(), first);
        }
    }

    #[test]
    fn test_concurrent_add_remove_complete() {
        for _ in 0..20 {
            let var = Arc::new(SingleAssignmentVariable::<u64>::new());
            let fired = Arc::new(AtomicUsize::new(0));
            let kept = Arc::new(AtomicUsize::new(0));

            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let var = Arc::clone(&var);
                    let fired = Arc::clone(&fired);
                    let kept = Arc::clone(&kept);
                    thread::spawn(move || {
                        for n in 0..500 {
                            let f = Arc::clone(&fired);
                            let reg = var.register(move |_| {
                                f.fetch_add(1, Ordering::SeqCst);
                            });
                            match reg {
                                Registration::Completed => {
                                    kept.fetch_add(1, Ordering::SeqCst);
                                }
                                Registration::Pending(id) => {
                                    // Odd ones try to leave; losing the race to completion keeps them.
                                    if n % 2 == 1 && var.unregister(id) {
                                        continue;
                                    }
                                    kept.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                        }
                    })
                })
                .collect();

            thread::sleep(Duration::from_micros(200));
            var.complete_with(1);
            for w in workers {
                w.join().unwrap();
            }
            assert_eq!(fired.load(Ordering::SeqCst), kept.load(Ordering::SeqCst));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_lost_wakeups() {
        const BEFORE: usize = 64;
        const AFTER: usize = 16;

        let var = Arc::new(SingleAssignmentVariable::<u64>::new());
        let mut joins = Vec::new();
        for _ in 0..BEFORE {
            let var = Arc::clone(&var);
            joins.push(tokio::spawn(async move { var.wait().await }));
        }
        while var.waiter_count() < BEFORE {
            tokio::task::yield_now().await;
        }
        assert!(var.complete_with(42));
        for _ in 0..AFTER {
            let var = Arc::clone(&var);
            joins.push(tokio::spawn(async move { var.wait().await }));
        }
        for j in joins {
            assert_eq!(j.await.unwrap(), 42);
        }
    }

    #[tokio::test]
    async fn test_dropped_await_deregisters() {
        let var = SingleAssignmentVariable::<u8>::new();
        let res = tokio::time::timeout(Duration::from_millis(10), var.wait()).await;
        assert!(res.is_err());
        assert_eq!(var.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_exit_helpers() {
        let var: SingleAssignmentVariable<Exit<(), &str>> = SingleAssignmentVariable::new();
        assert!(var.die("bug"));
        assert!(!var.succeed(()));
        assert_eq!(var.wait().await, Exit::Failure(Cause::Die("bug".into())));
    }
}
