//! Guard matching: decides whether each guarded access is satisfied by the
//! locks held at that point, and turns the failures into violations.

use crate::analysis::analyzer::{analyze, AccessEvent, AnalysisContext, LockEventListener};
use crate::analysis::ast::MethodDecl;
use crate::analysis::guard_expr::{GuardExpr, MemberScope};
use crate::analysis::held_locks::HeldLockSet;
use crate::analysis::span::Span;
use crate::analysis::types::{TypeName, TypeResolver};
use crate::config::CheckOptions;

use tracing::trace;

/// Why an access was not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// The guard is a read/write lock; which half is held is not modelled.
    ReadWriteLock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Satisfied,
    Excluded(Exclusion),
    Violation { message: String },
}

/// One access whose guard was not held.
#[derive(Debug, Clone)]
pub struct Violation {
    pub span: Span,
    /// Source form of the accessing expression.
    pub access: String,
    pub guard: GuardExpr,
    pub held: HeldLockSet,
    pub message: String,
}

/// Result of checking one member.
#[derive(Debug, Clone)]
pub enum MemberOutcome {
    /// Not analyzed at all (constructors).
    Exempt,
    Analyzed {
        accesses: usize,
        violations: Vec<Violation>,
    },
}

impl MemberOutcome {
    pub fn violations(&self) -> &[Violation] {
        match self {
            MemberOutcome::Exempt => &[],
            MemberOutcome::Analyzed { violations, .. } => violations,
        }
    }

    pub fn is_exempt(&self) -> bool {
        matches!(self, MemberOutcome::Exempt)
    }
}

/// The text reported for an access to `guard` while holding `held`.
pub fn build_message(guard: &GuardExpr, held: &HeldLockSet) -> String {
    if held.is_empty() {
        format!(
            "This access should be guarded by '{}', which is not currently held",
            guard
        )
    } else {
        let found: Vec<String> = held.all_locks().iter().map(|l| format!("'{}'", l)).collect();
        format!(
            "This access should be guarded by '{}'; instead found: {}",
            guard,
            found.join(", ")
        )
    }
}

pub struct GuardedByChecker<'a> {
    resolver: &'a dyn TypeResolver,
    read_write_lock_types: Vec<TypeName>,
}

impl<'a> GuardedByChecker<'a> {
    /// Read/write lock types that the resolver does not know are dropped:
    /// no exclusion applies for them.
    pub fn new(resolver: &'a dyn TypeResolver, options: &CheckOptions) -> Self {
        let read_write_lock_types = options
            .read_write_lock_types
            .iter()
            .filter_map(|name| resolver.resolve_by_qualified_name(name))
            .map(|symbol| symbol.name)
            .collect();
        Self {
            resolver,
            read_write_lock_types,
        }
    }

    fn is_read_write_lock(&self, guard: &GuardExpr) -> bool {
        guard.ty().is_some_and(|ty| {
            self.read_write_lock_types
                .iter()
                .any(|rw| self.resolver.is_subtype(ty, rw))
        })
    }

    pub fn evaluate(&self, guard: &GuardExpr, held: &HeldLockSet) -> Verdict {
        if self.is_read_write_lock(guard) {
            return Verdict::Excluded(Exclusion::ReadWriteLock);
        }
        if held.contains(guard) {
            return Verdict::Satisfied;
        }
        Verdict::Violation {
            message: build_message(guard, held),
        }
    }

    /// Analyze one method and evaluate every guarded access in it.
    pub fn check_method(
        &self,
        method: &MethodDecl,
        scope: &MemberScope,
        ctx: AnalysisContext<'_>,
    ) -> MemberOutcome {
        if method.is_constructor() {
            return MemberOutcome::Exempt;
        }
        let mut collector = ViolationCollector {
            checker: self,
            violations: Vec::new(),
        };
        let accesses = analyze(method, scope, ctx, &mut collector);
        MemberOutcome::Analyzed {
            accesses,
            violations: collector.violations,
        }
    }
}

struct ViolationCollector<'c, 'a> {
    checker: &'c GuardedByChecker<'a>,
    violations: Vec<Violation>,
}

impl LockEventListener for ViolationCollector<'_, '_> {
    fn handle_guarded_access(&mut self, event: AccessEvent<'_>) {
        match self.checker.evaluate(&event.guard, &event.held) {
            Verdict::Satisfied => {}
            Verdict::Excluded(reason) => {
                trace!(guard = %event.guard, ?reason, "access excluded");
            }
            Verdict::Violation { message } => self.violations.push(Violation {
                span: event.site,
                access: event.tree.to_string(),
                guard: event.guard,
                held: event.held,
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{ClassTable, FieldSymbol, READ_WRITE_LOCK, REENTRANT_LOCK, REENTRANT_READ_WRITE_LOCK};

    fn field(name: &str, ty: &str) -> GuardExpr {
        GuardExpr::field(
            Some(GuardExpr::self_reference(TypeName::new("C"))),
            FieldSymbol {
                owner: TypeName::new("C"),
                name: name.to_string(),
                ty: TypeName::new(ty),
                is_static: false,
            },
        )
    }

    #[test]
    fn message_without_held_locks() {
        let msg = build_message(&field("mu", "java.lang.Object"), &HeldLockSet::empty());
        assert_eq!(
            msg,
            "This access should be guarded by 'mu', which is not currently held"
        );
    }

    #[test]
    fn message_lists_held_locks_in_order() {
        let held = HeldLockSet::empty()
            .plus(GuardExpr::self_reference(TypeName::new("C")))
            .plus(field("other", "java.lang.Object"));
        let msg = build_message(&field("mu", "java.lang.Object"), &held);
        assert_eq!(
            msg,
            "This access should be guarded by 'mu'; instead found: 'this', 'other'"
        );
    }

    #[test]
    fn held_guard_is_satisfied() {
        let table = ClassTable::with_builtins();
        let checker = GuardedByChecker::new(&table, &CheckOptions::default());
        let mu = field("mu", REENTRANT_LOCK);
        let held = HeldLockSet::empty().plus(mu.clone());
        assert_eq!(checker.evaluate(&mu, &held), Verdict::Satisfied);
        assert!(matches!(
            checker.evaluate(&mu, &HeldLockSet::empty()),
            Verdict::Violation { .. }
        ));
    }

    #[test]
    fn read_write_locks_are_excluded() {
        let table = ClassTable::with_builtins();
        let checker = GuardedByChecker::new(&table, &CheckOptions::default());
        for ty in [READ_WRITE_LOCK, REENTRANT_READ_WRITE_LOCK] {
            assert_eq!(
                checker.evaluate(&field("rw", ty), &HeldLockSet::empty()),
                Verdict::Excluded(Exclusion::ReadWriteLock)
            );
        }
    }

    #[test]
    fn unknown_read_write_type_disables_exclusion() {
        let table = ClassTable::with_builtins();
        let options = CheckOptions {
            read_write_lock_types: vec!["com.example.NoSuchLock".to_string()],
            ..CheckOptions::default()
        };
        let checker = GuardedByChecker::new(&table, &options);
        assert!(matches!(
            checker.evaluate(&field("rw", REENTRANT_READ_WRITE_LOCK), &HeldLockSet::empty()),
            Verdict::Violation { .. }
        ));
    }

    #[test]
    fn opaque_guards_match_by_text() {
        let table = ClassTable::with_builtins();
        let checker = GuardedByChecker::new(&table, &CheckOptions::default());
        let guard = GuardExpr::opaque("locks.get(k)", None);
        let held = HeldLockSet::empty().plus(GuardExpr::opaque("locks.get(k)", None));
        assert_eq!(checker.evaluate(&guard, &held), Verdict::Satisfied);
    }

    #[test]
    fn constructors_are_exempt() {
        let table = ClassTable::with_builtins();
        let checker = GuardedByChecker::new(&table, &CheckOptions::default());
        let guards = Default::default();
        let vocabulary = Default::default();
        let ctx = AnalysisContext {
            resolver: &table,
            guards: &guards,
            vocabulary: &vocabulary,
        };
        let ctor = MethodDecl::constructor("C");
        let scope = MemberScope::top_level(TypeName::new("C"), false);
        assert!(checker.check_method(&ctor, &scope, ctx).is_exempt());

        let plain = MethodDecl::new("run");
        match checker.check_method(&plain, &scope, ctx) {
            MemberOutcome::Analyzed {
                accesses,
                violations,
            } => {
                assert_eq!(accesses, 0);
                assert!(violations.is_empty());
            }
            MemberOutcome::Exempt => panic!("plain methods are analyzed"),
        }
    }
}
