//! Canonical lock expressions.
//!
//! A [`GuardExpr`] names the object that has to be locked. Two syntactically
//! different host expressions that denote the same lock (`this.mu` and `mu`
//! in the same class, `Outer.this.mu` and `mu` in an inner class) canonicalize
//! to equal values. Expressions the model cannot decompose become
//! [`GuardKind::Opaque`] and only ever equal an opaque value with the same
//! printed text.

use crate::analysis::ast::Expr;
use crate::analysis::types::{FieldSymbol, TypeName, TypeResolver, CLASS};

use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// `this`
    SelfReference,
    /// An outer instance, `level` classes out from the current one.
    EnclosingInstance { level: usize, class: TypeName },
    /// A field. `receiver` is `None` for static fields.
    FieldAccess {
        receiver: Option<Box<GuardExpr>>,
        field: FieldSymbol,
    },
    /// `Type.class`
    ClassLiteral(TypeName),
    Opaque(String),
}

/// A canonical lock expression together with its static type, when known.
///
/// The type is only consulted by the read/write-lock exclusion; it does not
/// take part in equality.
#[derive(Debug, Clone)]
pub struct GuardExpr {
    kind: GuardKind,
    ty: Option<TypeName>,
}

impl PartialEq for GuardExpr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for GuardExpr {}

impl Hash for GuardExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl GuardExpr {
    pub fn self_reference(class: TypeName) -> Self {
        Self {
            kind: GuardKind::SelfReference,
            ty: Some(class),
        }
    }

    pub fn enclosing_instance(level: usize, class: TypeName) -> Self {
        Self {
            kind: GuardKind::EnclosingInstance {
                level,
                class: class.clone(),
            },
            ty: Some(class),
        }
    }

    pub fn field(receiver: Option<GuardExpr>, field: FieldSymbol) -> Self {
        let ty = Some(field.ty.clone());
        Self {
            kind: GuardKind::FieldAccess {
                receiver: receiver.map(Box::new),
                field,
            },
            ty,
        }
    }

    pub fn class_literal(class: TypeName) -> Self {
        Self {
            kind: GuardKind::ClassLiteral(class),
            ty: Some(TypeName::new(CLASS)),
        }
    }

    pub fn opaque(text: impl Into<String>, ty: Option<TypeName>) -> Self {
        Self {
            kind: GuardKind::Opaque(text.into()),
            ty,
        }
    }

    pub fn kind(&self) -> &GuardKind {
        &self.kind
    }

    pub fn ty(&self) -> Option<&TypeName> {
        self.ty.as_ref()
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.kind, GuardKind::Opaque(_))
    }

    /// Re-express a guard declared relative to its declaring object for an
    /// access through `receiver`.
    ///
    /// `x` guarded by `mu`, accessed as `other.x`, requires `other.mu`.
    pub fn rebind(&self, receiver: &GuardExpr) -> GuardExpr {
        if receiver.kind == GuardKind::SelfReference {
            return self.clone();
        }
        match &self.kind {
            GuardKind::SelfReference => receiver.clone(),
            GuardKind::EnclosingInstance { level, class } => match &receiver.kind {
                GuardKind::EnclosingInstance { level: outer, .. } => {
                    GuardExpr::enclosing_instance(level + outer, class.clone())
                }
                _ => GuardExpr::opaque(format!("{}.{}", receiver, self), self.ty.clone()),
            },
            GuardKind::FieldAccess {
                receiver: Some(inner),
                field,
            } => GuardExpr::field(Some(inner.rebind(receiver)), field.clone()),
            GuardKind::FieldAccess { receiver: None, .. } | GuardKind::ClassLiteral(_) => {
                self.clone()
            }
            GuardKind::Opaque(_) => {
                GuardExpr::opaque(format!("{}.{}", receiver, self), self.ty.clone())
            }
        }
    }

    /// A host expression that canonicalizes back to this value in the
    /// context it was produced in.
    pub fn to_expr(&self) -> Expr {
        match &self.kind {
            GuardKind::SelfReference => Expr::this(),
            GuardKind::EnclosingInstance { class, .. } => Expr::qualified_this(class.as_str()),
            GuardKind::FieldAccess {
                receiver: Some(r),
                field,
            } => Expr::select(r.to_expr(), &field.name),
            GuardKind::FieldAccess {
                receiver: None,
                field,
            } => Expr::select(Expr::name(field.owner.as_str()), &field.name),
            GuardKind::ClassLiteral(class) => Expr::class_lit(class.as_str()),
            GuardKind::Opaque(text) => Expr::name(text),
        }
    }
}

impl fmt::Display for GuardExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GuardKind::SelfReference => write!(f, "this"),
            GuardKind::EnclosingInstance { class, .. } => write!(f, "{}.this", class.simple_name()),
            GuardKind::FieldAccess {
                receiver: None,
                field,
            } => write!(f, "{}.{}", field.owner.simple_name(), field.name),
            GuardKind::FieldAccess {
                receiver: Some(r),
                field,
            } => {
                if r.kind == GuardKind::SelfReference {
                    write!(f, "{}", field.name)
                } else {
                    write!(f, "{}.{}", r, field.name)
                }
            }
            GuardKind::ClassLiteral(class) => write!(f, "{}.class", class.simple_name()),
            GuardKind::Opaque(text) => write!(f, "{}", text),
        }
    }
}

// ── Resolution context ──────────────────────────────────────────────

/// One class of the lexical class nesting around a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFrame {
    pub name: TypeName,
    /// Whether an instance of this class is reachable from the member.
    pub instance_reachable: bool,
}

/// Lexical class context of the member being analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberScope {
    /// Outermost first, each paired with "is a static nested class".
    classes: Vec<(TypeName, bool)>,
    /// Innermost first.
    frames: Vec<ClassFrame>,
}

impl MemberScope {
    /// `classes` is the lexical nesting outermost first, each paired with
    /// whether that class is a static nested class.
    pub fn new(classes: &[(TypeName, bool)], member_is_static: bool) -> Self {
        let mut frames = Vec::with_capacity(classes.len());
        let mut reachable = !member_is_static;
        for (name, is_static_class) in classes.iter().rev() {
            frames.push(ClassFrame {
                name: name.clone(),
                instance_reachable: reachable,
            });
            // An outer instance is only reachable through an inner (non-static) class.
            reachable = reachable && !is_static_class;
        }
        Self {
            classes: classes.to_vec(),
            frames,
        }
    }

    /// Scope of a member in a single top-level class.
    pub fn top_level(class: TypeName, member_is_static: bool) -> Self {
        Self::new(&[(class, false)], member_is_static)
    }

    pub fn frames(&self) -> &[ClassFrame] {
        &self.frames
    }

    pub fn current_class(&self) -> Option<&TypeName> {
        self.frames.first().map(|f| &f.name)
    }

    pub fn is_static(&self) -> bool {
        self.frames.first().map_or(true, |f| !f.instance_reachable)
    }

    /// The same lexical nesting, seen from a member with different static-ness.
    pub fn with_static(&self, member_is_static: bool) -> Self {
        Self::new(&self.classes, member_is_static)
    }
}

/// Local variables and parameters in scope, innermost last.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    vars: Vec<(String, TypeName)>,
}

impl Locals {
    pub fn declare(&mut self, name: &str, ty: TypeName) {
        self.vars.push((name.to_string(), ty));
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeName> {
        self.vars.iter().rev().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Current depth, for [`Locals::truncate`] when a block ends.
    pub fn mark(&self) -> usize {
        self.vars.len()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.vars.truncate(mark);
    }
}

/// Everything canonicalization needs to interpret a host expression.
#[derive(Clone, Copy)]
pub struct GuardContext<'a> {
    pub resolver: &'a dyn TypeResolver,
    pub scope: &'a MemberScope,
    pub locals: &'a Locals,
}

impl<'a> GuardContext<'a> {
    pub fn new(resolver: &'a dyn TypeResolver, scope: &'a MemberScope, locals: &'a Locals) -> Self {
        Self {
            resolver,
            scope,
            locals,
        }
    }

    /// The instance of the class `level` frames out, if reachable.
    fn instance_at(&self, level: usize) -> Option<GuardExpr> {
        let frame = self.scope.frames.get(level)?;
        if !frame.instance_reachable {
            return None;
        }
        Some(if level == 0 {
            GuardExpr::self_reference(frame.name.clone())
        } else {
            GuardExpr::enclosing_instance(level, frame.name.clone())
        })
    }

    fn level_of(&self, written: &str) -> Option<usize> {
        let resolved = self
            .resolver
            .resolve_by_qualified_name(written)
            .map(|s| s.name);
        self.scope.frames.iter().position(|f| match &resolved {
            Some(name) => &f.name == name,
            None => f.name.simple_name() == written,
        })
    }

    fn resolve_name(&self, name: &str) -> Option<GuardExpr> {
        if let Some(ty) = self.locals.lookup(name) {
            return Some(GuardExpr::opaque(name, Some(ty.clone())));
        }
        for (level, frame) in self.scope.frames.iter().enumerate() {
            if let Some(field) = self.resolver.resolve_field(&frame.name, name) {
                if field.is_static {
                    return Some(GuardExpr::field(None, field));
                }
                return self
                    .instance_at(level)
                    .map(|receiver| GuardExpr::field(Some(receiver), field));
            }
        }
        None
    }

    fn resolve_select(&self, receiver: &Expr, name: &str) -> Option<GuardExpr> {
        let base = canonicalize(receiver, self);
        if base.is_opaque() && base.ty.is_none() {
            // Not a value: maybe a type name qualifying a static field.
            let type_name = receiver.dotted_name()?;
            let owner = self.resolver.resolve_by_qualified_name(&type_name)?.name;
            let field = self.resolver.resolve_field(&owner, name)?;
            return field.is_static.then(|| GuardExpr::field(None, field));
        }
        let owner = base.ty.clone()?;
        let field = self.resolver.resolve_field(&owner, name)?;
        if field.is_static {
            Some(GuardExpr::field(None, field))
        } else {
            Some(GuardExpr::field(Some(base), field))
        }
    }
}

/// Canonicalize a host lock expression. Total: anything that cannot be
/// decomposed becomes an opaque value carrying its printed form.
pub fn canonicalize(expr: &Expr, ctx: &GuardContext<'_>) -> GuardExpr {
    let resolved = match expr {
        Expr::This { .. } => ctx.instance_at(0),
        Expr::QualifiedThis { class, .. } => {
            ctx.level_of(class).and_then(|level| ctx.instance_at(level))
        }
        Expr::Name { name, .. } => ctx.resolve_name(name),
        Expr::Select { receiver, name, .. } => ctx.resolve_select(receiver, name),
        Expr::ClassLit { class, .. } => {
            let class = ctx
                .resolver
                .resolve_by_qualified_name(class)
                .map(|s| s.name)
                .unwrap_or_else(|| TypeName::new(class.clone()));
            Some(GuardExpr::class_literal(class))
        }
        _ => None,
    };
    resolved.unwrap_or_else(|| GuardExpr::opaque(expr.to_string(), None))
}
