//! # Deadline-ordered delayed execution.
//!
//! [`Scheduler`] runs one-shot runnables after a delay on a dedicated timer thread.
//!
//! ## Architecture
//! ```text
//! schedule(r, delay)
//!   ├─ Immediate ──► r() on the caller's thread, no-op token
//!   ├─ Infinite  ──► no-op token, nothing queued
//!   └─ After(d)  ──► heap.push(Entry{deadline, seq, r}) ──► notify timer thread
//!
//! timer thread:
//!   loop {
//!     head cancelled   ──► pop, drop
//!     head in future   ──► wait_until(head.deadline) (or new entry)
//!     head due         ──► pop, CAS Pending→Fired, run r (panics caught)
//!   }
//! ```
//!
//! ## Rules
//! - Entries run in deadline order; equal deadlines run in scheduling order.
//! - [`CancelToken::cancel`] is best-effort: it wins only against an entry that has not fired.
//! - Cancelled entries are dropped lazily, when they reach the head of the queue.
//! - Runnables run on the timer thread and should be short; hand off heavy work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::delay::Delay;
use crate::cell::AtomicCell;
use crate::error::RuntimeError;
use crate::supervision::panic_message;

/// One-shot work item run by the scheduler.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Pending,
    Cancelled,
    Fired,
}

/// Handle to a scheduled runnable.
#[derive(Clone)]
pub struct CancelToken {
    state: Option<Arc<AtomicCell<TimerState>>>,
}

impl CancelToken {
    /// Token for work that was run immediately or will never run.
    pub fn noop() -> Self {
        Self { state: None }
    }

    /// Cancels the runnable if it has not fired yet.
    ///
    /// Returns `false` if it already fired, was already cancelled, or this is a no-op token.
    pub fn cancel(&self) -> bool {
        self.state.as_ref().is_some_and(|s| {
            s.compare_and_set(&TimerState::Pending, TimerState::Cancelled)
        })
    }

    /// Returns true if the runnable was cancelled before firing.
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| *s.load() == TimerState::Cancelled)
    }

    /// Returns true if the runnable has fired.
    pub fn is_fired(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| *s.load() == TimerState::Fired)
    }

    /// Returns true for tokens that refer to no queued entry.
    pub fn is_noop(&self) -> bool {
        self.state.is_none()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            None => f.write_str("CancelToken(noop)"),
            Some(s) => write!(f, "CancelToken({:?})", *s.load()),
        }
    }
}

struct Entry {
    deadline: Instant,
    seq: u64,
    state: Arc<AtomicCell<TimerState>>,
    runnable: Runnable,
}

impl Entry {
    fn is_cancelled(&self) -> bool {
        *self.state.load() == TimerState::Cancelled
    }

    fn fire(self) {
        if !self
            .state
            .compare_and_set(&TimerState::Pending, TimerState::Fired)
        {
            return;
        }
        if let Err(panic) = catch_unwind(AssertUnwindSafe(self.runnable)) {
            tracing::warn!(
                info = %panic_message(panic.as_ref()),
                "scheduled runnable panicked; timer thread continues"
            );
        }
    }
}

// Reversed so `BinaryHeap` pops the earliest deadline, then the lowest sequence.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

struct Inner {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Inner {
    fn stop(&self) {
        let abandoned = {
            let mut q = self.shared.queue.lock();
            if q.stopped {
                return;
            }
            q.stopped = true;
            std::mem::take(&mut q.heap)
        };
        self.shared.wakeup.notify_all();
        // Dropped unlocked: a captured value's `Drop` may call back into the scheduler.
        drop(abandoned);

        // A runnable dropping the last handle runs on the timer thread itself.
        if thread::current().id() != self.thread_id {
            if let Some(handle) = self.thread.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delayed-execution service backed by one timer thread.
///
/// Cloning is cheap; the thread stops when the last clone is dropped or on
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Starts a scheduler whose timer thread carries `thread_name`.
    pub fn new(thread_name: impl Into<String>) -> Result<Self, RuntimeError> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || drive(&worker))
            .map_err(|source| RuntimeError::TimerThread { source })?;

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                thread_id: handle.thread().id(),
                thread: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Runs `runnable` once `delay` has elapsed.
    ///
    /// - zero delay: runs synchronously before returning; the token is a no-op;
    /// - effectively infinite delay: never runs; the token is a no-op.
    pub fn schedule<F>(&self, runnable: F, delay: Duration) -> CancelToken
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_delay(runnable, Delay::from_duration(delay))
    }

    /// Like [`schedule`](Self::schedule) for an already classified delay.
    pub fn schedule_delay<F>(&self, runnable: F, delay: Delay) -> CancelToken
    where
        F: FnOnce() + Send + 'static,
    {
        match delay {
            Delay::Immediate => {
                runnable();
                CancelToken::noop()
            }
            Delay::Infinite => CancelToken::noop(),
            Delay::After(_) => match delay.deadline_from(Instant::now()) {
                Some(deadline) => self.enqueue(deadline, Box::new(runnable)),
                None => CancelToken::noop(),
            },
        }
    }

    /// Runs `runnable` at `deadline`; a deadline already passed runs it synchronously.
    pub fn schedule_at<F>(&self, runnable: F, deadline: Instant) -> CancelToken
    where
        F: FnOnce() + Send + 'static,
    {
        if deadline <= Instant::now() {
            runnable();
            return CancelToken::noop();
        }
        self.enqueue(deadline, Box::new(runnable))
    }

    /// Returns the number of queued entries, cancelled ones included until they are dropped.
    pub fn pending(&self) -> usize {
        self.inner.shared.queue.lock().heap.len()
    }

    /// Stops the timer thread and drops every queued entry without running it.
    ///
    /// Later calls to `schedule` with a finite delay return tokens that never fire.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    fn enqueue(&self, deadline: Instant, runnable: Runnable) -> CancelToken {
        let state = Arc::new(AtomicCell::new(TimerState::Pending));
        {
            let mut q = self.inner.shared.queue.lock();
            if q.stopped {
                return CancelToken::noop();
            }
            let seq = q.next_seq;
            q.next_seq += 1;
            q.heap.push(Entry {
                deadline,
                seq,
                state: Arc::clone(&state),
                runnable,
            });
        }
        self.inner.shared.wakeup.notify_one();
        CancelToken { state: Some(state) }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Timer thread body.
fn drive(shared: &Shared) {
    let mut q = shared.queue.lock();
    loop {
        if q.stopped {
            return;
        }
        let Some(head) = q.heap.peek() else {
            shared.wakeup.wait(&mut q);
            continue;
        };
        if head.is_cancelled() {
            let stale = q.heap.pop();
            drop(q);
            drop(stale);
            q = shared.queue.lock();
            continue;
        }
        let deadline = head.deadline;
        if deadline > Instant::now() {
            shared.wakeup.wait_until(&mut q, deadline);
            continue;
        }
        if let Some(entry) = q.heap.pop() {
            // Run without the lock so runnables may schedule more work.
            drop(q);
            entry.fire();
            q = shared.queue.lock();
        }
    }
}
