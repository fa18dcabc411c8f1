//! # Multiset patches over supervisor trees.
//!
//! A [`SupervisorPatch`] records how one supervisor tree turns into another. Patches let a
//! child task inherit its parent's supervisor and replay later changes on top of it.
//!
//! Leaves are compared by identity and counted: a leaf present twice in the new tree and
//! once in the old one yields exactly one `Add`. Nothing is ever deduplicated.
//!
//! ```text
//! diff(old, new) ── apply(old) ──► tree with the same multiset of leaves as `new`
//! p1.combine(p2) ── apply(s)   ──► p2.apply(p1.apply(s))
//! ```

use std::sync::Arc;

use super::supervisor::{Supervise, Supervisor, same_leaf};

/// Change from one supervisor tree to another.
#[derive(Clone, Default)]
pub enum SupervisorPatch {
    /// No change.
    #[default]
    Empty,
    /// Append one occurrence of a leaf.
    Add(Arc<dyn Supervise>),
    /// Drop one occurrence of a leaf (no-op if absent).
    Remove(Arc<dyn Supervise>),
    /// Apply the first patch, then the second.
    AndThen(Box<SupervisorPatch>, Box<SupervisorPatch>),
}

impl SupervisorPatch {
    /// The patch that changes nothing.
    #[inline]
    pub fn empty() -> Self {
        SupervisorPatch::Empty
    }

    /// Computes the patch turning `old` into `new`.
    pub fn diff(old: &Supervisor, new: &Supervisor) -> Self {
        let mut unmatched: Vec<Option<Arc<dyn Supervise>>> =
            old.leaves().into_iter().map(Some).collect();
        let mut patch = SupervisorPatch::Empty;

        for leaf in new.leaves() {
            let hit = unmatched
                .iter_mut()
                .find(|slot| matches!(slot, Some(o) if same_leaf(o, &leaf)));
            match hit {
                Some(slot) => *slot = None,
                None => patch = patch.combine(SupervisorPatch::Add(leaf)),
            }
        }

        unmatched
            .into_iter()
            .flatten()
            .fold(patch, |p, stale| p.combine(SupervisorPatch::Remove(stale)))
    }

    /// Sequences `self` then `that`.
    pub fn combine(self, that: SupervisorPatch) -> Self {
        match (self, that) {
            (SupervisorPatch::Empty, p) | (p, SupervisorPatch::Empty) => p,
            (a, b) => SupervisorPatch::AndThen(Box::new(a), Box::new(b)),
        }
    }

    /// Applies the patch to `sup`.
    pub fn apply(&self, sup: Supervisor) -> Supervisor {
        let mut leaves = sup.leaves();
        let mut pending: Vec<&SupervisorPatch> = vec![self];

        while let Some(patch) = pending.pop() {
            match patch {
                SupervisorPatch::Empty => {}
                SupervisorPatch::Add(leaf) => leaves.push(Arc::clone(leaf)),
                SupervisorPatch::Remove(leaf) => {
                    if let Some(pos) = leaves.iter().position(|l| same_leaf(l, leaf)) {
                        leaves.remove(pos);
                    }
                }
                SupervisorPatch::AndThen(first, second) => {
                    pending.push(second);
                    pending.push(first);
                }
            }
        }

        if leaves.is_empty() {
            Supervisor::None
        } else {
            Supervisor::from_leaves(leaves)
        }
    }
}

impl Drop for SupervisorPatch {
    fn drop(&mut self) {
        let mut nested: Vec<SupervisorPatch> = Vec::new();
        detach_steps(self, &mut nested);
        while let Some(mut patch) = nested.pop() {
            detach_steps(&mut patch, &mut nested);
        }
    }
}

fn detach_steps(patch: &mut SupervisorPatch, nested: &mut Vec<SupervisorPatch>) {
    if let SupervisorPatch::AndThen(first, second) = patch {
        nested.push(std::mem::take(&mut **first));
        nested.push(std::mem::take(&mut **second));
    }
}

impl std::fmt::Debug for SupervisorPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorPatch::Empty => f.write_str("Empty"),
            SupervisorPatch::Add(s) => write!(f, "Add({})", s.name()),
            SupervisorPatch::Remove(s) => write!(f, "Remove({})", s.name()),
            SupervisorPatch::AndThen(a, b) => f.debug_tuple("AndThen").field(a).field(b).finish(),
        }
    }
}
