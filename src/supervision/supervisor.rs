//! # Composable task-lifecycle observers.
//!
//! A [`Supervisor`] is a tree of [`Supervise`] leaves. The engine calls its hooks at every
//! lifecycle point of every task; each leaf keeps whatever it observes in its own private
//! cells and exposes it through [`Supervise::value`].
//!
//! ## Composition
//! ```text
//! a + b          ──► Both(a, b)       hooks run a, then b
//! None + x == x == x + None
//! (a + b) + c    ≡   a + (b + c)      same left-to-right leaf order
//! a + a          ──► two registrations (never deduplicated)
//! ```
//!
//! ## Rules
//! - Hooks are synchronous and must not block.
//! - A panicking hook is caught and logged; it never unwinds into the observed task,
//!   and the remaining leaves still run.
//! - Trees are immutable once built; `+` composes by value.
//! - Traversal, comparison and drop use explicit stacks, so arbitrarily deep trees are safe.

use std::any::Any;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::ExitStatus;
use crate::runtime::TaskDescriptor;

/// Observer of task lifecycle events.
///
/// Every hook defaults to a no-op, so implementors override only what they need.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use fibervisor::{ExitStatus, Observation, Supervise, Supervisor, TaskDescriptor};
///
/// #[derive(Default)]
/// struct Failures(AtomicU64);
///
/// impl Supervise for Failures {
///     fn on_end(&self, exit: &ExitStatus, _task: &TaskDescriptor) {
///         if !matches!(exit, ExitStatus::Success) {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
///     fn value(&self) -> Observation {
///         Observation::new(self.0.load(Ordering::Relaxed))
///     }
/// }
///
/// let sup = Supervisor::none() + Supervisor::leaf(Failures::default());
/// assert_eq!(sup.leaves().len(), 1);
/// ```
pub trait Supervise: Send + Sync + 'static {
    /// Called when a task is forked, before it first runs.
    fn on_start(&self, _task: &TaskDescriptor, _parent: Option<&TaskDescriptor>) {}

    /// Called once the task's exit is decided, before any joiner can observe it.
    fn on_end(&self, _exit: &ExitStatus, _task: &TaskDescriptor) {}

    /// Called when the task yields its worker.
    fn on_suspend(&self, _task: &TaskDescriptor) {}

    /// Called when a yielded task runs again.
    fn on_resume(&self, _task: &TaskDescriptor) {}

    /// Returns what this supervisor has accumulated so far.
    fn value(&self) -> Observation {
        Observation::unit()
    }

    /// Returns the name used in logs.
    ///
    /// The default uses `type_name::<Self>()`; override it with something shorter when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased value reported by [`Supervise::value`].
///
/// Composite supervisors report `(Observation, Observation)` pairs.
pub struct Observation(Box<dyn Any + Send>);

impl Observation {
    /// Wraps a value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// The empty observation, `()`.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Borrows the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Takes the value out if it is a `T`, otherwise gives the observation back.
    pub fn downcast<T: Any>(mut self) -> Result<T, Self> {
        let inner = std::mem::replace(&mut self.0, Box::new(()));
        inner.downcast::<T>().map(|b| *b).map_err(Observation)
    }

    /// Splits a composite observation into its left and right parts.
    pub fn into_pair(self) -> Result<(Observation, Observation), Self> {
        self.downcast::<(Observation, Observation)>()
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        let mut nested: Vec<Observation> = Vec::new();
        split_pair(self, &mut nested);
        while let Some(mut obs) = nested.pop() {
            split_pair(&mut obs, &mut nested);
        }
    }
}

fn split_pair(obs: &mut Observation, nested: &mut Vec<Observation>) {
    if let Some((l, r)) = obs.0.downcast_mut::<(Observation, Observation)>() {
        nested.push(std::mem::replace(l, Observation::unit()));
        nested.push(std::mem::replace(r, Observation::unit()));
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observation(..)")
    }
}

/// Tree of supervisors, composed with `+`.
#[derive(Clone, Default)]
pub enum Supervisor {
    /// Observes nothing; identity of `+`.
    #[default]
    None,
    /// A single observer.
    Leaf(Arc<dyn Supervise>),
    /// Both sides, left first.
    Both(Arc<Supervisor>, Arc<Supervisor>),
}

impl Supervisor {
    /// The empty supervisor.
    #[inline]
    pub fn none() -> Self {
        Supervisor::None
    }

    /// Wraps an observer.
    pub fn leaf<S: Supervise>(s: S) -> Self {
        Supervisor::Leaf(Arc::new(s))
    }

    /// Wraps an observer the caller keeps a handle to (e.g. to query it later).
    pub fn from_arc(s: Arc<dyn Supervise>) -> Self {
        Supervisor::Leaf(s)
    }

    /// Returns true for [`Supervisor::None`].
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Supervisor::None)
    }

    /// Returns every leaf, left to right, duplicates included.
    pub fn leaves(&self) -> Vec<Arc<dyn Supervise>> {
        let mut out = Vec::new();
        self.for_each_leaf(|leaf| out.push(Arc::clone(leaf)));
        out
    }

    /// Rebuilds a left-nested tree from leaves in order.
    pub fn from_leaves<I>(leaves: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Supervise>>,
    {
        leaves
            .into_iter()
            .fold(Supervisor::None, |acc, leaf| acc + Supervisor::Leaf(leaf))
    }

    /// Returns the accumulated observation of the whole tree.
    ///
    /// `None` reports `()`, a leaf reports its own value and `Both` reports a
    /// `(left, right)` pair.
    pub fn value(&self) -> Observation {
        enum Step<'a> {
            Visit(&'a Supervisor),
            Pair,
        }

        let mut work = vec![Step::Visit(self)];
        let mut done: Vec<Observation> = Vec::new();
        while let Some(step) = work.pop() {
            match step {
                Step::Visit(Supervisor::None) => done.push(Observation::unit()),
                Step::Visit(Supervisor::Leaf(s)) => done.push(s.value()),
                Step::Visit(Supervisor::Both(l, r)) => {
                    work.push(Step::Pair);
                    work.push(Step::Visit(&**r));
                    work.push(Step::Visit(&**l));
                }
                Step::Pair => {
                    // Right was finished last, so it sits on top.
                    if let (Some(r), Some(l)) = (done.pop(), done.pop()) {
                        done.push(Observation::new((l, r)));
                    }
                }
            }
        }
        done.pop().unwrap_or_else(Observation::unit)
    }

    /// Visits leaves left to right without recursion.
    fn for_each_leaf(&self, mut f: impl FnMut(&Arc<dyn Supervise>)) {
        let mut stack: Vec<&Supervisor> = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Supervisor::None => {}
                Supervisor::Leaf(s) => f(s),
                Supervisor::Both(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
            }
        }
    }

    /// Runs `hook` on every leaf, isolating panics.
    fn dispatch(&self, hook: &'static str, f: impl Fn(&dyn Supervise)) {
        self.for_each_leaf(|leaf| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(leaf.as_ref()))) {
                tracing::warn!(
                    supervisor = leaf.name(),
                    hook,
                    info = %panic_message(panic.as_ref()),
                    "supervisor hook panicked; ignored"
                );
            }
        });
    }

    pub(crate) fn on_start(&self, task: &TaskDescriptor, parent: Option<&TaskDescriptor>) {
        self.dispatch("on_start", |s| s.on_start(task, parent));
    }

    pub(crate) fn on_end(&self, exit: &ExitStatus, task: &TaskDescriptor) {
        self.dispatch("on_end", |s| s.on_end(exit, task));
    }

    pub(crate) fn on_suspend(&self, task: &TaskDescriptor) {
        self.dispatch("on_suspend", |s| s.on_suspend(task));
    }

    pub(crate) fn on_resume(&self, task: &TaskDescriptor) {
        self.dispatch("on_resume", |s| s.on_resume(task));
    }
}

impl Add for Supervisor {
    type Output = Supervisor;

    fn add(self, rhs: Supervisor) -> Supervisor {
        match (self, rhs) {
            (Supervisor::None, r) => r,
            (l, Supervisor::None) => l,
            (l, r) => Supervisor::Both(Arc::new(l), Arc::new(r)),
        }
    }
}

impl AddAssign for Supervisor {
    fn add_assign(&mut self, rhs: Supervisor) {
        let lhs = std::mem::take(self);
        *self = lhs + rhs;
    }
}

impl PartialEq for Supervisor {
    /// Structural equality with leaves compared by identity.
    fn eq(&self, other: &Self) -> bool {
        let mut pairs: Vec<(&Supervisor, &Supervisor)> = vec![(self, other)];
        while let Some(pair) = pairs.pop() {
            match pair {
                (Supervisor::None, Supervisor::None) => {}
                (Supervisor::Leaf(a), Supervisor::Leaf(b)) if same_leaf(a, b) => {}
                (Supervisor::Both(al, ar), Supervisor::Both(bl, br)) => {
                    if !Arc::ptr_eq(ar, br) {
                        pairs.push((&**ar, &**br));
                    }
                    if !Arc::ptr_eq(al, bl) {
                        pairs.push((&**al, &**bl));
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let mut orphans: Vec<Supervisor> = Vec::new();
        detach_children(self, &mut orphans);
        while let Some(mut node) = orphans.pop() {
            detach_children(&mut node, &mut orphans);
        }
    }
}

/// Moves uniquely owned composite children out of `node`, leaving `None` behind.
///
/// Shared children are left alone; their last owner unwinds them.
fn detach_children(node: &mut Supervisor, orphans: &mut Vec<Supervisor>) {
    if let Supervisor::Both(l, r) = node {
        for child in [l, r] {
            if let Some(inner) = Arc::get_mut(child) {
                if matches!(inner, Supervisor::Both(..)) {
                    orphans.push(std::mem::take(inner));
                }
            }
        }
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        self.for_each_leaf(|leaf| names.push(leaf.name()));
        f.debug_tuple("Supervisor").field(&names).finish()
    }
}

/// Returns true if both handles point at the same observer.
#[inline]
pub(crate) fn same_leaf(a: &Arc<dyn Supervise>, b: &Arc<dyn Supervise>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Appends its tag to a shared journal on every `on_start`.
    struct Journal {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Supervise for Journal {
        fn on_start(&self, _task: &TaskDescriptor, _parent: Option<&TaskDescriptor>) {
            self.log.lock().push(self.tag);
        }
        fn value(&self) -> Observation {
            Observation::new(self.tag)
        }
    }

    fn journal(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Supervisor {
        Supervisor::leaf(Journal {
            tag,
            log: Arc::clone(log),
        })
    }

    fn starts(sup: &Supervisor, log: &Arc<Mutex<Vec<&'static str>>>) -> Vec<&'static str> {
        log.lock().clear();
        sup.on_start(&TaskDescriptor::new("t", None), None);
        log.lock().clone()
    }

    #[test]
    fn test_none_is_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s = journal("s", &log);
        assert_eq!(Supervisor::none() + s.clone(), s);
        assert_eq!(s.clone() + Supervisor::none(), s);
        assert!((Supervisor::none() + Supervisor::none()).is_none());
    }

    #[test]
    fn test_composition_is_associative_in_hook_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (journal("a", &log), journal("b", &log), journal("c", &log));

        let left = (a.clone() + b.clone()) + c.clone();
        let right = a + (b + c);
        assert_eq!(starts(&left, &log), vec!["a", "b", "c"]);
        assert_eq!(starts(&right, &log), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_repeated_composition_registers_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s = journal("s", &log);
        let twice = s.clone() + s;
        assert_eq!(twice.leaves().len(), 2);
        assert_eq!(starts(&twice, &log), vec!["s", "s"]);
    }

    #[test]
    fn test_add_assign() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sup = Supervisor::none();
        sup += journal("x", &log);
        sup += journal("y", &log);
        assert_eq!(starts(&sup, &log), vec!["x", "y"]);
    }

    #[test]
    fn test_panicking_hook_is_isolated() {
        struct Boom;
        impl Supervise for Boom {
            fn on_start(&self, _task: &TaskDescriptor, _parent: Option<&TaskDescriptor>) {
                panic!("hook failure");
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let sup = Supervisor::leaf(Boom) + journal("after", &log);
        assert_eq!(starts(&sup, &log), vec!["after"]);
    }

    #[test]
    fn test_value_pairs_follow_structure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sup = journal("l", &log) + journal("r", &log);
        let (l, r) = sup.value().into_pair().unwrap();
        assert_eq!(l.downcast::<&str>().unwrap(), "l");
        assert_eq!(r.downcast::<&str>().unwrap(), "r");
        assert!(Supervisor::none().value().downcast_ref::<()>().is_some());
    }

    #[test]
    fn test_deep_tree_is_stack_safe() {
        const DEPTH: usize = 100_000;

        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf = journal("n", &log);
        let build = || {
            let mut sup = Supervisor::none();
            for _ in 0..DEPTH {
                sup = leaf.clone() + sup;
            }
            sup
        };
        let (sup, twin) = (build(), build());

        assert_eq!(starts(&sup, &log).len(), DEPTH);
        assert!(sup == twin);
        assert!(sup != twin.clone() + leaf.clone());

        let value = sup.value();
        let (head, _rest) = value.into_pair().unwrap();
        assert_eq!(head.downcast::<&str>().unwrap(), "n");

        let shared = sup.clone();
        drop(sup);
        drop(twin);
        assert_eq!(shared.leaves().len(), DEPTH);
        drop(shared);
    }

    #[test]
    fn test_debug_lists_leaves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sup = journal("a", &log) + journal("b", &log);
        let out = format!("{sup:?}");
        assert_eq!(out.matches("Journal").count(), 2, "{out}");
    }
}
