//! Held-lock analysis: which locks are provably held at every access.
//!
//! The analyzer walks one method body forward, carrying the [`HeldLockSet`]
//! live at each point by value. Lock acquisition is always lexically scoped:
//!
//! ```text
//! synchronized (mu) {        // body runs with {mu}
//!   x++;
//! }                          // back to the set from before the block
//!
//! lock.lock();
//! try {                      // {lock}: released in the finally below
//!   x++;
//! } finally {
//!   lock.unlock();
//! }
//! ```
//!
//! so the set after any statement is the set from before it, and nothing
//! acquired inside a branch leaks past the branch. Every read or write of a
//! guarded field and every call of a guarded method is reported to a
//! [`LockEventListener`] together with the required guard and the held set.

use crate::analysis::ast::{CatchClause, Expr, MethodDecl, Stmt};
use crate::analysis::guard_expr::{canonicalize, GuardContext, GuardExpr, GuardKind, Locals, MemberScope};
use crate::analysis::held_locks::HeldLockSet;
use crate::analysis::span::Span;
use crate::analysis::types::{TypeName, TypeResolver, LOCK};
use crate::analysis::validator::GuardTable;
use crate::config::CheckOptions;

use tracing::{debug, trace};

// ── Events ──────────────────────────────────────────────────────────

/// One access to guarded state.
#[derive(Debug, Clone)]
pub struct AccessEvent<'t> {
    /// The accessing expression.
    pub tree: &'t Expr,
    pub site: Span,
    /// The declared guard, re-expressed for this access's receiver.
    pub guard: GuardExpr,
    /// Locks held immediately before the expression is evaluated.
    pub held: HeldLockSet,
}

/// Receives access events in evaluation order.
pub trait LockEventListener {
    fn handle_guarded_access(&mut self, event: AccessEvent<'_>);
}

impl<F> LockEventListener for F
where
    F: FnMut(AccessEvent<'_>),
{
    fn handle_guarded_access(&mut self, event: AccessEvent<'_>) {
        self(event)
    }
}

// ── Lock vocabulary ─────────────────────────────────────────────────

/// Which calls count as explicit lock acquisition and release.
#[derive(Debug, Clone)]
pub struct LockVocabulary {
    pub acquire_methods: Vec<String>,
    pub release_methods: Vec<String>,
    /// Receivers must be a subtype of one of these.
    pub lock_types: Vec<TypeName>,
}

impl Default for LockVocabulary {
    fn default() -> Self {
        Self {
            acquire_methods: vec!["lock".to_string(), "lockInterruptibly".to_string()],
            release_methods: vec!["unlock".to_string()],
            lock_types: vec![TypeName::new(LOCK)],
        }
    }
}

impl LockVocabulary {
    pub fn from_options(options: &CheckOptions, resolver: &dyn TypeResolver) -> Self {
        Self {
            acquire_methods: options.acquire_methods.clone(),
            release_methods: options.release_methods.clone(),
            lock_types: options
                .lock_types
                .iter()
                .map(|t| {
                    resolver
                        .resolve_by_qualified_name(t)
                        .map(|s| s.name)
                        .unwrap_or_else(|| TypeName::new(t.clone()))
                })
                .collect(),
        }
    }
}

/// Read-only inputs shared by every method analysis of a unit.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub resolver: &'a dyn TypeResolver,
    pub guards: &'a GuardTable,
    pub vocabulary: &'a LockVocabulary,
}

// ── Analyzer ────────────────────────────────────────────────────────

/// Analyze one method body, reporting every guarded access to `listener`.
///
/// Constructors are never analyzed: objects are assumed thread-local until
/// construction finishes. Returns the number of events emitted.
pub fn analyze(
    method: &MethodDecl,
    scope: &MemberScope,
    ctx: AnalysisContext<'_>,
    listener: &mut dyn LockEventListener,
) -> usize {
    if method.is_constructor() {
        return 0;
    }
    debug!(method = %method.name, "analyzing held locks");

    let mut analyzer = HeldLockAnalyzer {
        ctx,
        scope,
        locals: Locals::default(),
        listener,
        events: 0,
    };
    for param in &method.params {
        let ty = analyzer.resolve_type(&param.ty);
        analyzer.locals.declare(&param.name, ty);
    }
    let held = analyzer.entry_locks(method);
    analyzer.visit_block(&method.body, &held);
    analyzer.events
}

struct HeldLockAnalyzer<'a, 'l> {
    ctx: AnalysisContext<'a>,
    scope: &'a MemberScope,
    locals: Locals,
    listener: &'l mut dyn LockEventListener,
    events: usize,
}

impl HeldLockAnalyzer<'_, '_> {
    fn resolve_type(&self, written: &str) -> TypeName {
        self.ctx
            .resolver
            .resolve_by_qualified_name(written)
            .map(|s| s.name)
            .unwrap_or_else(|| TypeName::new(written))
    }

    fn canonicalize(&self, expr: &Expr) -> GuardExpr {
        canonicalize(
            expr,
            &GuardContext::new(self.ctx.resolver, self.scope, &self.locals),
        )
    }

    /// Locks held on entry: the monitor of a synchronized method, and the
    /// method's own guard.
    fn entry_locks(&self, method: &MethodDecl) -> HeldLockSet {
        let mut held = HeldLockSet::empty();
        let Some(class) = self.scope.current_class() else {
            return held;
        };
        if method.is_synchronized {
            let monitor = if method.is_static {
                GuardExpr::class_literal(class.clone())
            } else {
                GuardExpr::self_reference(class.clone())
            };
            held = held.plus(monitor);
        }
        if let Some(Some(guard)) =
            self.ctx
                .guards
                .method_guard(self.ctx.resolver, class, &method.name, method.params.len())
        {
            held = held.plus(guard.clone());
        }
        held
    }

    fn emit(&mut self, tree: &Expr, guard: GuardExpr, held: &HeldLockSet) {
        self.events += 1;
        trace!(line = tree.span().line, access = %tree, guard = %guard, held = %held, "guarded access");
        self.listener.handle_guarded_access(AccessEvent {
            tree,
            site: tree.span(),
            guard,
            held: held.clone(),
        });
    }

    // ── Statements ──────────────────────────────────────────────

    fn visit_block(&mut self, stmts: &[Stmt], held: &HeldLockSet) {
        let mark = self.locals.mark();
        // lock() calls seen in this block that have not been released yet
        let mut pending: Vec<GuardExpr> = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Try {
                    body,
                    catches,
                    finally,
                    ..
                } => self.visit_try(body, catches, finally.as_deref(), held, &pending),
                _ => self.visit_stmt(stmt, held),
            }
            self.track_lock_calls(stmt, &mut pending);
        }
        self.locals.truncate(mark);
    }

    fn visit_stmt(&mut self, stmt: &Stmt, held: &HeldLockSet) {
        match stmt {
            Stmt::Expr { expr } => self.visit_expr(expr, held),
            Stmt::Local { name, ty, init, .. } => {
                if let Some(init) = init {
                    self.visit_expr(init, held);
                }
                let ty = self.resolve_type(ty);
                self.locals.declare(name, ty);
            }
            Stmt::Block { body, .. } => self.visit_block(body, held),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.visit_expr(cond, held);
                self.visit_block(then_branch, held);
                if let Some(else_branch) = else_branch {
                    self.visit_block(else_branch, held);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.visit_expr(cond, held);
                self.visit_block(body, held);
            }
            Stmt::DoWhile { body, cond, .. } => {
                self.visit_block(body, held);
                self.visit_expr(cond, held);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                let mark = self.locals.mark();
                for s in init {
                    self.visit_stmt(s, held);
                }
                if let Some(cond) = cond {
                    self.visit_expr(cond, held);
                }
                self.visit_block(body, held);
                for u in update {
                    self.visit_expr(u, held);
                }
                self.locals.truncate(mark);
            }
            Stmt::ForEach {
                var,
                ty,
                iterable,
                body,
                ..
            } => {
                self.visit_expr(iterable, held);
                let mark = self.locals.mark();
                let ty = self.resolve_type(ty);
                self.locals.declare(var, ty);
                self.visit_block(body, held);
                self.locals.truncate(mark);
            }
            Stmt::Switch { subject, cases, .. } => {
                self.visit_expr(subject, held);
                for case in cases {
                    for label in &case.labels {
                        self.visit_expr(label, held);
                    }
                    self.visit_block(&case.body, held);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.visit_expr(value, held);
                }
            }
            Stmt::Throw { value, .. } => self.visit_expr(value, held),
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
            Stmt::Synchronized { lock, body, .. } => {
                // The monitor expression is evaluated before the lock is taken.
                self.visit_expr(lock, held);
                let monitor = self.canonicalize(lock);
                trace!(monitor = %monitor, "entering synchronized block");
                self.visit_block(body, &held.enter_scope().plus(monitor));
            }
            Stmt::Try {
                body,
                catches,
                finally,
                ..
            } => self.visit_try(body, catches, finally.as_deref(), held, &mut Vec::new()),
        }
    }

    /// `try` statements are where explicit lock()/unlock() pairs are credited:
    /// a lock acquired before the `try` (or as its first statement) and
    /// released in its `finally` is held throughout the try and catch blocks.
    fn visit_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
        held: &HeldLockSet,
        pending: &[GuardExpr],
    ) {
        let released = finally
            .map(|stmts| self.released_locks(stmts))
            .unwrap_or_default();

        let mut acquired = pending.to_vec();
        if let Some(first) = body.first() {
            if let Some(lock) = self.lock_call(first, &self.ctx.vocabulary.acquire_methods) {
                acquired.push(lock);
            }
        }
        let credited: Vec<GuardExpr> = released
            .iter()
            .filter(|lock| acquired.contains(lock))
            .cloned()
            .collect();

        let inner = if credited.is_empty() {
            held.clone()
        } else {
            trace!(locks = credited.len(), "crediting lock/unlock pair");
            held.enter_scope().plus_all(credited)
        };

        self.visit_block(body, &inner);
        for catch in catches {
            let mark = self.locals.mark();
            let ty = self.resolve_type(&catch.ty);
            self.locals.declare(&catch.param, ty);
            self.visit_block(&catch.body, &inner);
            self.locals.truncate(mark);
        }
        if let Some(finally) = finally {
            self.visit_block(finally, held);
        }
    }

    /// The lock operated on by `stmt` if it is a bare `l.m()` call where `m`
    /// is one of `methods` and `l` is typed as a lock.
    fn lock_call(&self, stmt: &Stmt, methods: &[String]) -> Option<GuardExpr> {
        let Stmt::Expr {
            expr:
                Expr::Call {
                    receiver: Some(receiver),
                    method,
                    args,
                    ..
                },
        } = stmt
        else {
            return None;
        };
        if !args.is_empty() || !methods.iter().any(|m| m == method) {
            return None;
        }
        let lock = self.canonicalize(receiver);
        let ty = lock.ty()?;
        self.ctx
            .vocabulary
            .lock_types
            .iter()
            .any(|lock_type| self.ctx.resolver.is_subtype(ty, lock_type))
            .then_some(lock)
    }

    /// A release anywhere inside `stmt`, on any path, ends the pending
    /// acquisition.
    fn track_lock_calls(&self, stmt: &Stmt, pending: &mut Vec<GuardExpr>) {
        if let Some(lock) = self.lock_call(stmt, &self.ctx.vocabulary.acquire_methods) {
            if !pending.contains(&lock) {
                pending.push(lock);
            }
            return;
        }
        if pending.is_empty() {
            return;
        }
        let released = self.released_locks(std::slice::from_ref(stmt));
        pending.retain(|lock| !released.contains(lock));
    }

    /// Locks released anywhere in `stmts`, lambda bodies excepted.
    fn released_locks(&self, stmts: &[Stmt]) -> Vec<GuardExpr> {
        let mut released = Vec::new();
        self.collect_released(stmts, &mut released);
        released
    }

    fn collect_released(&self, stmts: &[Stmt], out: &mut Vec<GuardExpr>) {
        for stmt in stmts {
            match stmt {
                Stmt::Expr { .. } => {
                    if let Some(lock) = self.lock_call(stmt, &self.ctx.vocabulary.release_methods) {
                        if !out.contains(&lock) {
                            out.push(lock);
                        }
                    }
                }
                Stmt::Block { body, .. }
                | Stmt::Synchronized { body, .. }
                | Stmt::While { body, .. }
                | Stmt::DoWhile { body, .. }
                | Stmt::ForEach { body, .. } => self.collect_released(body, out),
                Stmt::For { init, body, .. } => {
                    self.collect_released(init, out);
                    self.collect_released(body, out);
                }
                Stmt::Switch { cases, .. } => {
                    for case in cases {
                        self.collect_released(&case.body, out);
                    }
                }
                Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.collect_released(then_branch, out);
                    if let Some(else_branch) = else_branch {
                        self.collect_released(else_branch, out);
                    }
                }
                Stmt::Try {
                    body,
                    catches,
                    finally,
                    ..
                } => {
                    self.collect_released(body, out);
                    for catch in catches {
                        self.collect_released(&catch.body, out);
                    }
                    if let Some(finally) = finally {
                        self.collect_released(finally, out);
                    }
                }
                _ => {}
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────

    fn visit_expr(&mut self, expr: &Expr, held: &HeldLockSet) {
        match expr {
            Expr::This { .. }
            | Expr::QualifiedThis { .. }
            | Expr::ClassLit { .. }
            | Expr::Literal { .. } => {}
            Expr::Name { name, .. } => {
                if self.locals.lookup(name).is_none() {
                    self.check_field_access(expr, held);
                }
            }
            Expr::Select { receiver, .. } => {
                self.visit_expr(receiver, held);
                self.check_field_access(expr, held);
            }
            Expr::Call {
                receiver,
                method,
                args,
                ..
            } => {
                if let Some(receiver) = receiver {
                    self.visit_expr(receiver, held);
                }
                for arg in args {
                    self.visit_expr(arg, held);
                }
                self.check_method_call(expr, receiver.as_deref(), method, args.len(), held);
            }
            Expr::New { args, .. } => {
                for arg in args {
                    self.visit_expr(arg, held);
                }
            }
            Expr::Assign { target, value, .. } => {
                self.visit_expr(target, held);
                self.visit_expr(value, held);
            }
            Expr::Unary { operand, .. } => self.visit_expr(operand, held),
            Expr::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs, held);
                self.visit_expr(rhs, held);
            }
            Expr::Conditional {
                cond,
                then_val,
                else_val,
                ..
            } => {
                self.visit_expr(cond, held);
                self.visit_expr(then_val, held);
                self.visit_expr(else_val, held);
            }
            Expr::Index { base, index, .. } => {
                self.visit_expr(base, held);
                self.visit_expr(index, held);
            }
            Expr::Cast { expr: inner, .. } => self.visit_expr(inner, held),
            Expr::Lambda { params, body, .. } => {
                // A lambda may run after the enclosing locks are released.
                let mark = self.locals.mark();
                for param in params {
                    let ty = self.resolve_type(&param.ty);
                    self.locals.declare(&param.name, ty);
                }
                self.visit_block(body, &HeldLockSet::empty());
                self.locals.truncate(mark);
            }
        }
    }

    fn check_field_access(&mut self, expr: &Expr, held: &HeldLockSet) {
        let access = self.canonicalize(expr);
        let GuardKind::FieldAccess { receiver, field } = access.kind() else {
            return;
        };
        let Some(declared) = self.ctx.guards.field_guard(field) else {
            return;
        };
        let required = match receiver {
            Some(receiver) => declared.rebind(receiver),
            None => declared.clone(),
        };
        self.emit(expr, required, held);
    }

    fn check_method_call(
        &mut self,
        expr: &Expr,
        receiver: Option<&Expr>,
        method: &str,
        arity: usize,
        held: &HeldLockSet,
    ) {
        let guards = self.ctx.guards;
        let resolver = self.ctx.resolver;
        let scope = self.scope;

        let required = match receiver {
            None => {
                // Innermost class declaring the method wins.
                let found = scope.frames().iter().enumerate().find_map(|(level, frame)| {
                    guards
                        .method_guard(resolver, &frame.name, method, arity)
                        .map(|guard| (level, frame, guard))
                });
                let Some((level, frame, Some(declared))) = found else {
                    return;
                };
                if !frame.instance_reachable || level == 0 {
                    declared.clone()
                } else {
                    declared.rebind(&GuardExpr::enclosing_instance(level, frame.name.clone()))
                }
            }
            Some(receiver) => {
                let base = self.canonicalize(receiver);
                match base.ty() {
                    Some(owner) => match guards.method_guard(resolver, owner, method, arity) {
                        Some(Some(declared)) => declared.rebind(&base),
                        _ => return,
                    },
                    None => {
                        // `Type.method()` on a static method.
                        let Some(owner) = receiver
                            .dotted_name()
                            .and_then(|name| resolver.resolve_by_qualified_name(&name))
                        else {
                            return;
                        };
                        match guards.method_guard(resolver, &owner.name, method, arity) {
                            Some(Some(declared)) => declared.clone(),
                            _ => return,
                        }
                    }
                }
            }
        };
        self.emit(expr, required, held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ast::{ClassDecl, CompilationUnit, FieldDecl, MethodDecl, Param};
    use crate::analysis::types::ClassTable;
    use crate::analysis::validator::validate_unit;
    use crate::analysis::class_sites;

    /// Owned copy of an event, for assertions.
    #[derive(Debug, Clone)]
    struct Recorded {
        access: String,
        guard: String,
        held: Vec<String>,
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Recorded>,
    }

    impl LockEventListener for Recorder {
        fn handle_guarded_access(&mut self, event: AccessEvent<'_>) {
            self.events.push(Recorded {
                access: event.tree.to_string(),
                guard: event.guard.to_string(),
                held: event.held.all_locks().iter().map(|l| l.to_string()).collect(),
            });
        }
    }

    fn counter(extra: Vec<MethodDecl>) -> ClassDecl {
        let mut class = ClassDecl::new("Counter")
            .field(FieldDecl::new("mu", "Object"))
            .field(FieldDecl::new("lock", "ReentrantLock"))
            .field(FieldDecl::new("x", "int").guarded_by("mu"))
            .field(FieldDecl::new("y", "int").guarded_by("lock"))
            .field(FieldDecl::new("peer", "Counter"));
        for m in extra {
            class = class.method(m);
        }
        class
    }

    /// Run the analyzer over every method named `name` in the unit.
    fn run(unit: &CompilationUnit, name: &str) -> Vec<Recorded> {
        let table = ClassTable::from_unit(unit);
        let validation = validate_unit(unit, &table);
        assert!(validation.errors.is_empty(), "{:?}", validation.errors);
        let vocabulary = LockVocabulary::default();
        let ctx = AnalysisContext {
            resolver: &table,
            guards: &validation.guards,
            vocabulary: &vocabulary,
        };
        let mut recorder = Recorder::default();
        for site in class_sites(unit) {
            for method in site.class.methods.iter().filter(|m| m.name == name) {
                let scope = site.scope(method.is_static);
                analyze(method, &scope, ctx, &mut recorder);
            }
        }
        recorder.events
    }

    fn unit_of(classes: Vec<ClassDecl>) -> CompilationUnit {
        CompilationUnit {
            classes,
            ..Default::default()
        }
    }

    fn inc(target: Expr) -> Stmt {
        Stmt::expr(Expr::Unary {
            op: "post++".to_string(),
            operand: Box::new(target),
            span: Span::dummy(),
        })
    }

    #[test]
    fn unsynchronized_read_sees_no_locks() {
        let unit = unit_of(vec![counter(vec![
            MethodDecl::new("get").body(vec![Stmt::ret(Some(Expr::name("x")))]),
        ])]);
        let events = run(&unit, "get");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].guard, "mu");
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn synchronized_block_holds_its_monitor_only_inside() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("get").body(vec![
            Stmt::synchronized(Expr::name("mu"), vec![inc(Expr::name("x"))]),
            inc(Expr::name("x")),
        ])])]);
        let events = run(&unit, "get");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].held, vec!["mu"]);
        assert!(events[1].held.is_empty());
    }

    #[test]
    fn release_happens_on_early_return_and_throw() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("get").body(vec![
            Stmt::if_else(
                Expr::name("flag"),
                vec![Stmt::synchronized(
                    Expr::name("mu"),
                    vec![Stmt::ret(Some(Expr::name("x")))],
                )],
                Some(vec![Stmt::synchronized(
                    Expr::this(),
                    vec![Stmt::throw(Expr::New {
                        class: "IllegalStateException".to_string(),
                        args: vec![Expr::name("x")],
                        span: Span::dummy(),
                    })],
                )]),
            ),
            Stmt::ret(Some(Expr::name("x"))),
        ])
        .param("flag", "boolean")])]);
        let events = run(&unit, "get");
        let helds: Vec<Vec<String>> = events.iter().map(|e| e.held.clone()).collect();
        assert_eq!(
            helds,
            vec![vec!["mu".to_string()], vec!["this".to_string()], vec![]]
        );
    }

    #[test]
    fn synchronized_method_holds_this_and_static_holds_class() {
        let class = ClassDecl::new("Registry")
            .field(FieldDecl::new("count", "int").static_field().guarded_by("Registry.class"))
            .field(FieldDecl::new("x", "int").guarded_by("this"))
            .method(MethodDecl::new("a").synchronized().body(vec![inc(Expr::name("x"))]))
            .method(
                MethodDecl::new("b")
                    .static_method()
                    .synchronized()
                    .body(vec![inc(Expr::name("count"))]),
            );
        let unit = unit_of(vec![class]);
        let a = run(&unit, "a");
        assert_eq!(a[0].held, vec!["this"]);
        assert_eq!(a[0].guard, "this");
        let b = run(&unit, "b");
        assert_eq!(b[0].held, vec!["Registry.class"]);
        assert_eq!(b[0].guard, "Registry.class");
    }

    #[test]
    fn monitor_expression_is_evaluated_before_acquisition() {
        let class = ClassDecl::new("Holder")
            .field(FieldDecl::new("mu", "Object"))
            .field(FieldDecl::new("inner", "Object").guarded_by("mu"))
            .method(MethodDecl::new("run").body(vec![Stmt::synchronized(
                Expr::name("inner"),
                vec![],
            )]));
        let events = run(&unit_of(vec![class]), "run");
        assert_eq!(events.len(), 1);
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn reentrant_acquisition_does_not_duplicate() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("get").body(vec![
            Stmt::synchronized(
                Expr::name("mu"),
                vec![Stmt::synchronized(
                    Expr::select(Expr::this(), "mu"),
                    vec![inc(Expr::name("x"))],
                )],
            ),
        ])])]);
        let events = run(&unit, "get");
        assert_eq!(events[0].held, vec!["mu"]);
    }

    fn lock_stmt() -> Stmt {
        Stmt::expr(Expr::call(Some(Expr::name("lock")), "lock", vec![]))
    }

    fn unlock_stmt() -> Stmt {
        Stmt::expr(Expr::call(Some(Expr::name("lock")), "unlock", vec![]))
    }

    #[test]
    fn lock_try_finally_unlock_is_credited() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            lock_stmt(),
            Stmt::try_finally(vec![inc(Expr::name("y"))], vec![], Some(vec![unlock_stmt()])),
            inc(Expr::name("y")),
        ])])]);
        let events = run(&unit, "bump");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].held, vec!["lock"]);
        assert!(events[1].held.is_empty());
    }

    #[test]
    fn lock_as_first_statement_of_try_is_credited() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            Stmt::try_finally(
                vec![lock_stmt(), inc(Expr::name("y"))],
                vec![CatchClause {
                    param: "e".to_string(),
                    ty: "Exception".to_string(),
                    body: vec![inc(Expr::name("y"))],
                }],
                Some(vec![unlock_stmt(), inc(Expr::name("y"))]),
            ),
        ])])]);
        let events = run(&unit, "bump");
        let helds: Vec<usize> = events.iter().map(|e| e.held.len()).collect();
        // try body, catch body, then finally (already released)
        assert_eq!(helds, vec![1, 1, 0]);
    }

    #[test]
    fn lock_without_finally_release_is_not_credited() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            lock_stmt(),
            inc(Expr::name("y")),
            unlock_stmt(),
        ])])]);
        let events = run(&unit, "bump");
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn unlock_before_try_cancels_pending_acquire() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            lock_stmt(),
            unlock_stmt(),
            Stmt::try_finally(vec![inc(Expr::name("y"))], vec![], Some(vec![unlock_stmt()])),
        ])])]);
        let events = run(&unit, "bump");
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn conditional_unlock_cancels_pending_acquire() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            lock_stmt(),
            Stmt::if_else(Expr::lit("true"), vec![unlock_stmt()], None),
            Stmt::try_finally(vec![inc(Expr::name("y"))], vec![], Some(vec![unlock_stmt()])),
        ])])]);
        let events = run(&unit, "bump");
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn nested_unlock_cancels_pending_acquire() {
        for wrapped in [
            Stmt::Block {
                body: vec![unlock_stmt()],
                span: Span::dummy(),
            },
            Stmt::While {
                cond: Expr::lit("true"),
                body: vec![unlock_stmt()],
                span: Span::dummy(),
            },
            Stmt::try_finally(vec![unlock_stmt()], vec![], None),
        ] {
            let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
                lock_stmt(),
                wrapped,
                Stmt::try_finally(vec![inc(Expr::name("y"))], vec![], Some(vec![unlock_stmt()])),
            ])])]);
            let events = run(&unit, "bump");
            assert!(events[0].held.is_empty());
        }
    }

    #[test]
    fn finally_release_without_acquire_is_not_credited() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("bump").body(vec![
            Stmt::try_finally(vec![inc(Expr::name("y"))], vec![], Some(vec![unlock_stmt()])),
        ])])]);
        let events = run(&unit, "bump");
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn explicit_receiver_rebinds_the_guard() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("copy")
            .param("other", "Counter")
            .body(vec![Stmt::synchronized(
                Expr::select(Expr::name("other"), "mu"),
                vec![Stmt::expr(Expr::assign(
                    Expr::name("x"),
                    Expr::select(Expr::name("other"), "x"),
                ))],
            )])])]);
        let events = run(&unit, "copy");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].access, "x");
        assert_eq!(events[0].guard, "mu");
        assert_eq!(events[1].access, "other.x");
        assert_eq!(events[1].guard, "other.mu");
        assert_eq!(events[1].held, vec!["other.mu"]);
    }

    #[test]
    fn lambdas_start_with_no_locks() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("later").body(vec![
            Stmt::synchronized(
                Expr::name("mu"),
                vec![Stmt::expr(Expr::call(
                    Some(Expr::name("executor")),
                    "submit",
                    vec![Expr::lambda(vec![], vec![inc(Expr::name("x"))])],
                ))],
            ),
        ])
        .param("executor", "Executor")])]);
        let events = run(&unit, "later");
        assert_eq!(events.len(), 1);
        assert!(events[0].held.is_empty());
    }

    #[test]
    fn guarded_method_calls_are_accesses_and_assume_their_guard() {
        let unit = unit_of(vec![counter(vec![
            MethodDecl::new("bumpLocked")
                .guarded_by("mu")
                .body(vec![inc(Expr::name("x"))]),
            MethodDecl::new("bump").body(vec![Stmt::expr(Expr::call(None, "bumpLocked", vec![]))]),
            MethodDecl::new("bumpPeer").body(vec![Stmt::expr(Expr::call(
                Some(Expr::name("peer")),
                "bumpLocked",
                vec![],
            ))]),
        ])]);
        let inside = run(&unit, "bumpLocked");
        assert_eq!(inside[0].held, vec!["mu"]);
        let call = run(&unit, "bump");
        assert_eq!(call[0].access, "bumpLocked()");
        assert_eq!(call[0].guard, "mu");
        let peer = run(&unit, "bumpPeer");
        assert_eq!(peer[0].guard, "peer.mu");
    }

    #[test]
    fn constructors_emit_nothing() {
        let unit = unit_of(vec![counter(vec![
            MethodDecl::constructor("Counter").body(vec![inc(Expr::name("x"))]),
        ])]);
        assert!(run(&unit, "Counter").is_empty());
    }

    #[test]
    fn locals_shadow_guarded_fields() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("get").body(vec![
            Stmt::local("x", "int", Some(Expr::lit("0"))),
            Stmt::ret(Some(Expr::name("x"))),
        ])])]);
        assert!(run(&unit, "get").is_empty());
    }

    #[test]
    fn inner_class_access_through_outer_lock() {
        let outer = ClassDecl::new("Outer")
            .field(FieldDecl::new("mu", "Object"))
            .field(FieldDecl::new("x", "int").guarded_by("mu"))
            .nested(ClassDecl::new("Outer.Inner").method(MethodDecl::new("run").body(vec![
                Stmt::synchronized(
                    Expr::select(Expr::qualified_this("Outer"), "mu"),
                    vec![inc(Expr::name("x"))],
                ),
                inc(Expr::name("x")),
            ])));
        let events = run(&unit_of(vec![outer]), "run");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].guard, "Outer.this.mu");
        assert_eq!(events[0].held, vec!["Outer.this.mu"]);
        assert!(events[1].held.is_empty());
    }

    #[test]
    fn events_follow_evaluation_order() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("swap").body(vec![
            Stmt::expr(Expr::assign(Expr::name("x"), Expr::name("y"))),
            Stmt::expr(Expr::binary("+", Expr::name("y"), Expr::name("x"))),
        ])])]);
        let order: Vec<String> = run(&unit, "swap").into_iter().map(|e| e.access).collect();
        assert_eq!(order, vec!["x", "y", "y", "x"]);
    }

    #[test]
    fn closures_are_listeners() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("get").body(vec![
            Stmt::ret(Some(Expr::binary("+", Expr::name("x"), Expr::name("y")))),
        ])])]);
        let table = ClassTable::from_unit(&unit);
        let validation = validate_unit(&unit, &table);
        let vocabulary = LockVocabulary::default();
        let ctx = AnalysisContext {
            resolver: &table,
            guards: &validation.guards,
            vocabulary: &vocabulary,
        };
        let mut lines = Vec::new();
        let mut listener = |event: AccessEvent<'_>| lines.push(event.guard.to_string());
        let sites = class_sites(&unit);
        let method = &sites[0].class.methods[0];
        let emitted = analyze(method, &sites[0].scope(false), ctx, &mut listener);
        assert_eq!(emitted, 2);
        assert_eq!(lines, vec!["mu", "lock"]);
    }

    #[test]
    fn lambda_params_are_locals() {
        let unit = unit_of(vec![counter(vec![MethodDecl::new("f").body(vec![Stmt::expr(
            Expr::lambda(vec![Param::new("x", "int")], vec![Stmt::ret(Some(Expr::name("x")))]),
        )])])]);
        assert!(run(&unit, "f").is_empty());
    }
}
