//! Persistent, scope-structured set of held locks.
//!
//! Every lexical scope that acquires locks gets its own [`HeldLockSet`] whose
//! parent is the set outside the scope. Adding a lock never mutates an
//! existing set, so leaving a scope is just going back to the parent value:
//! there is nothing to unwind on early returns or exceptions.

use crate::analysis::guard_expr::GuardExpr;

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HeldLockSet {
    parent: Option<Arc<HeldLockSet>>,
    local: Arc<[GuardExpr]>,
}

impl Default for HeldLockSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl HeldLockSet {
    pub fn empty() -> Self {
        HeldLockSet {
            parent: None,
            local: Arc::from(Vec::new()),
        }
    }

    /// A child scope of this set with no locks of its own yet.
    pub fn enter_scope(&self) -> HeldLockSet {
        HeldLockSet {
            parent: Some(Arc::new(self.clone())),
            local: Arc::from(Vec::new()),
        }
    }

    /// The set outside the current scope, if any.
    pub fn parent(&self) -> Option<&HeldLockSet> {
        self.parent.as_deref()
    }

    /// Locks acquired in the current scope, in acquisition order.
    pub fn local_locks(&self) -> &[GuardExpr] {
        &self.local
    }

    /// A new set that also holds `lock`. Already-held locks are not duplicated.
    pub fn plus(&self, lock: GuardExpr) -> HeldLockSet {
        if self.contains(&lock) {
            return self.clone();
        }
        let mut local: Vec<GuardExpr> = self.local.to_vec();
        local.push(lock);
        HeldLockSet {
            parent: self.parent.clone(),
            local: Arc::from(local),
        }
    }

    pub fn plus_all<I: IntoIterator<Item = GuardExpr>>(&self, locks: I) -> HeldLockSet {
        locks.into_iter().fold(self.clone(), |set, lock| set.plus(lock))
    }

    pub fn contains(&self, lock: &GuardExpr) -> bool {
        self.local.contains(lock) || self.parent.as_ref().is_some_and(|p| p.contains(lock))
    }

    /// Every held lock, outermost scope first.
    pub fn all_locks(&self) -> Vec<&GuardExpr> {
        let mut locks = match &self.parent {
            Some(parent) => parent.all_locks(),
            None => Vec::new(),
        };
        locks.extend(self.local.iter());
        locks
    }

    pub fn len(&self) -> usize {
        self.local.len() + self.parent.as_ref().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Same locks, regardless of how they are distributed over scopes.
impl PartialEq for HeldLockSet {
    fn eq(&self, other: &Self) -> bool {
        self.all_locks() == other.all_locks()
    }
}

impl Eq for HeldLockSet {}

impl fmt::Display for HeldLockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.all_locks().iter().map(|l| l.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(name: &str) -> GuardExpr {
        GuardExpr::opaque(name, None)
    }

    #[test]
    fn plus_is_idempotent() {
        let set = HeldLockSet::empty().plus(lock("a")).plus(lock("a"));
        assert_eq!(set.len(), 1);
        let nested = set.enter_scope().plus(lock("a"));
        assert_eq!(nested.len(), 1);
        assert!(nested.local_locks().is_empty());
    }

    #[test]
    fn all_locks_lists_parent_before_local() {
        let outer = HeldLockSet::empty().plus(lock("a")).plus(lock("b"));
        let inner = outer.enter_scope().plus(lock("c"));
        let names: Vec<String> = inner.all_locks().iter().map(|l| l.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(inner.to_string(), "{a, b, c}");
    }

    #[test]
    fn leaving_a_scope_restores_the_parent() {
        let outer = HeldLockSet::empty().plus(lock("a"));
        let inner = outer.enter_scope().plus(lock("b")).plus(lock("c"));
        assert_eq!(inner.parent(), Some(&outer));
        assert!(!outer.contains(&lock("b")));
        assert_eq!(outer.len(), 1);
    }

    #[test]
    fn plus_does_not_mutate_the_original() {
        let base = HeldLockSet::empty();
        let with = base.plus(lock("a"));
        assert!(base.is_empty());
        assert!(with.contains(&lock("a")));
    }

    #[test]
    fn equality_ignores_scope_structure() {
        let flat = HeldLockSet::empty().plus(lock("a")).plus(lock("b"));
        let scoped = HeldLockSet::empty().plus(lock("a")).enter_scope().plus(lock("b"));
        assert_eq!(flat, scoped);
    }

    #[test]
    fn sets_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HeldLockSet>();
    }
}
