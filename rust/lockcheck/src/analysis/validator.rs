//! Guard annotation validation.
//!
//! Turns the annotation text of every guarded field and method into a
//! canonical [`GuardExpr`] before any method body is analyzed. Annotations
//! that are malformed or that do not name `this`, an enclosing instance, a
//! class literal or a field are rejected here; the declarations they sit on
//! are then simply not enforced.

use crate::analysis::ast::{CompilationUnit, Expr, GuardAnnotation};
use crate::analysis::guard_expr::{canonicalize, GuardContext, GuardExpr, Locals, MemberScope};
use crate::analysis::span::Span;
use crate::analysis::types::{FieldSymbol, TypeName, TypeResolver};
use crate::analysis::class_sites;
use crate::diagnostics::suggest_similar;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The annotation text is not a lock expression at all.
    Malformed {
        text: String,
        detail: String,
        span: Span,
    },
    /// Well-formed, but does not resolve to a lock the analysis can name.
    Unresolvable {
        text: String,
        member: String,
        suggestions: Vec<String>,
        span: Span,
    },
    /// A static member guarded by a lock that only exists per instance.
    InstanceGuardOnStatic {
        text: String,
        member: String,
        span: Span,
    },
}

impl GuardError {
    pub fn span(&self) -> Span {
        match self {
            GuardError::Malformed { span, .. }
            | GuardError::Unresolvable { span, .. }
            | GuardError::InstanceGuardOnStatic { span, .. } => *span,
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Malformed { text, detail, .. } => {
                write!(f, "Invalid guard expression '{}': {}", text, detail)
            }
            GuardError::Unresolvable { text, member, .. } => write!(
                f,
                "Invalid guard expression '{}' on '{}': could not resolve guard",
                text, member
            ),
            GuardError::InstanceGuardOnStatic { text, member, .. } => write!(
                f,
                "Invalid guard expression '{}' on static member '{}': instance guards cannot protect static state",
                text, member
            ),
        }
    }
}

impl std::error::Error for GuardError {}

// ── Parsing ─────────────────────────────────────────────────────────

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Parse annotation text into a host expression.
///
/// Accepted forms: `this`, `name`, `a.b.c`, `Outer.this`, `Outer.this.f`,
/// `Type.field`, `Type.class`.
pub fn parse_guard(text: &str, span: Span) -> Result<Expr, GuardError> {
    let malformed = |detail: String| GuardError::Malformed {
        text: text.to_string(),
        detail,
        span,
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty guard expression".to_string()));
    }

    let segments: Vec<&str> = trimmed.split('.').map(str::trim).collect();
    let last = segments.len() - 1;
    let mut expr: Option<Expr> = None;
    // Still a plain `a.b.c` chain that could name a type.
    let mut plain_chain = true;

    for (i, segment) in segments.iter().copied().enumerate() {
        match segment {
            "this" => {
                expr = Some(match expr.take() {
                    None => Expr::This { span },
                    Some(prefix) if plain_chain => {
                        let class = prefix.dotted_name().unwrap_or_default();
                        Expr::QualifiedThis { class, span }
                    }
                    Some(_) => {
                        return Err(malformed(
                            "'this' must come first or directly after a class name".to_string(),
                        ))
                    }
                });
                plain_chain = false;
            }
            "class" => {
                let class = match (&expr, plain_chain) {
                    (Some(prefix), true) => prefix.dotted_name().unwrap_or_default(),
                    _ => return Err(malformed("'.class' must follow a type name".to_string())),
                };
                if i != last {
                    return Err(malformed("nothing may follow '.class'".to_string()));
                }
                expr = Some(Expr::ClassLit { class, span });
            }
            name if is_identifier(name) => {
                expr = Some(match expr.take() {
                    None => Expr::Name {
                        name: name.to_string(),
                        span,
                    },
                    Some(receiver) => Expr::Select {
                        receiver: Box::new(receiver),
                        name: name.to_string(),
                        span,
                    },
                });
            }
            other => return Err(malformed(format!("unexpected '{}'", other))),
        }
    }

    expr.ok_or_else(|| malformed("empty guard expression".to_string()))
}

/// Parse and resolve one annotation in the scope of the member carrying it.
pub fn resolve_guard(
    annotation: &GuardAnnotation,
    member: &str,
    scope: &MemberScope,
    resolver: &dyn TypeResolver,
) -> Result<GuardExpr, GuardError> {
    let expr = parse_guard(&annotation.text, annotation.span)?;
    let locals = Locals::default();
    let guard = canonicalize(&expr, &GuardContext::new(resolver, scope, &locals));
    if !guard.is_opaque() {
        return Ok(guard);
    }

    if scope.is_static() {
        let instance_scope = scope.with_static(false);
        let as_instance = canonicalize(&expr, &GuardContext::new(resolver, &instance_scope, &locals));
        if !as_instance.is_opaque() {
            return Err(GuardError::InstanceGuardOnStatic {
                text: annotation.text.clone(),
                member: member.to_string(),
                span: annotation.span,
            });
        }
    }

    let suggestions = match (scope.current_class(), &expr) {
        (Some(class), Expr::Name { name, .. }) => {
            let fields = resolver.field_names(class);
            let candidates: Vec<&str> = fields
                .iter()
                .map(String::as_str)
                .filter(|f| *f != member)
                .collect();
            suggest_similar(name, &candidates, 2)
        }
        _ => Vec::new(),
    };

    Err(GuardError::Unresolvable {
        text: annotation.text.clone(),
        member: member.to_string(),
        suggestions,
        span: annotation.span,
    })
}

// ── Validated guards ────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MethodEntry {
    owner: TypeName,
    name: String,
    arity: usize,
    guard: Option<GuardExpr>,
}

/// Resolved guards for every validated declaration of a unit.
#[derive(Debug, Clone, Default)]
pub struct GuardTable {
    fields: HashMap<(TypeName, String), GuardExpr>,
    methods: Vec<MethodEntry>,
}

impl GuardTable {
    pub fn insert_field(&mut self, owner: TypeName, name: &str, guard: GuardExpr) {
        self.fields.insert((owner, name.to_string()), guard);
    }

    /// Record a method declaration; `guard` is `None` for unguarded methods,
    /// which still matter because they shadow guarded methods of outer classes.
    pub fn insert_method(&mut self, owner: TypeName, name: &str, arity: usize, guard: Option<GuardExpr>) {
        self.methods.push(MethodEntry {
            owner,
            name: name.to_string(),
            arity,
            guard,
        });
    }

    pub fn field_guard(&self, field: &FieldSymbol) -> Option<&GuardExpr> {
        self.fields.get(&(field.owner.clone(), field.name.clone()))
    }

    /// Look up a method callable on `owner`, taking the most derived
    /// declaration among `owner` and its supertypes. `None` when no such
    /// method is declared in the unit; `Some(None)` when the nearest
    /// declaration is unguarded.
    pub fn method_guard(
        &self,
        resolver: &dyn TypeResolver,
        owner: &TypeName,
        name: &str,
        arity: usize,
    ) -> Option<Option<&GuardExpr>> {
        let inherited: Vec<&MethodEntry> = self
            .methods
            .iter()
            .filter(|m| m.name == name && m.arity == arity)
            .filter(|m| resolver.is_subtype(owner, &m.owner))
            .collect();
        inherited
            .iter()
            .find(|m| &m.owner == owner)
            .or_else(|| {
                inherited.iter().find(|m| {
                    inherited
                        .iter()
                        .all(|other| resolver.is_subtype(&m.owner, &other.owner))
                })
            })
            .or_else(|| inherited.first())
            .copied()
            .map(|m| m.guard.as_ref())
    }

    pub fn guarded_field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn guarded_method_count(&self) -> usize {
        self.methods.iter().filter(|m| m.guard.is_some()).count()
    }
}

/// Result of validating a unit: the guards that resolved and the rejections.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub guards: GuardTable,
    pub errors: Vec<GuardError>,
}

/// Validate every guard annotation of `unit`.
pub fn validate_unit(unit: &CompilationUnit, resolver: &dyn TypeResolver) -> Validation {
    let mut validation = Validation::default();

    for site in class_sites(unit) {
        let owner = TypeName::new(site.class.name.clone());

        for field in &site.class.fields {
            let Some(annotation) = &field.guarded_by else {
                continue;
            };
            let scope = site.scope(field.is_static);
            match resolve_guard(annotation, &field.name, &scope, resolver) {
                Ok(guard) => {
                    debug!(field = %field.name, class = %owner, guard = %guard, "resolved field guard");
                    validation.guards.insert_field(owner.clone(), &field.name, guard);
                }
                Err(err) => {
                    warn!(field = %field.name, class = %owner, "{}", err);
                    validation.errors.push(err);
                }
            }
        }

        for method in &site.class.methods {
            let guard = match &method.guarded_by {
                None => None,
                Some(annotation) => {
                    let scope = site.scope(method.is_static);
                    match resolve_guard(annotation, &method.name, &scope, resolver) {
                        Ok(guard) => {
                            debug!(method = %method.name, class = %owner, guard = %guard, "resolved method guard");
                            Some(guard)
                        }
                        Err(err) => {
                            warn!(method = %method.name, class = %owner, "{}", err);
                            validation.errors.push(err);
                            None
                        }
                    }
                }
            };
            if !method.is_constructor() {
                validation
                    .guards
                    .insert_method(owner.clone(), &method.name, method.params.len(), guard);
            }
        }
    }

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ast::{ClassDecl, FieldDecl, MethodDecl};
    use crate::analysis::guard_expr::GuardKind;
    use crate::analysis::types::ClassTable;

    fn annotation(text: &str) -> GuardAnnotation {
        GuardAnnotation {
            text: text.to_string(),
            span: Span::line(1),
        }
    }

    #[test]
    fn parses_accepted_forms() {
        let cases = [
            ("this", "this"),
            ("mu", "mu"),
            ("a.b.c", "a.b.c"),
            ("Outer.this", "Outer.this"),
            ("Outer.this.mu", "Outer.this.mu"),
            ("pkg.Foo.class", "pkg.Foo.class"),
            ("  mu ", "mu"),
        ];
        for (text, printed) in cases {
            let expr = parse_guard(text, Span::dummy()).expect(text);
            assert_eq!(expr.to_string(), printed);
        }
    }

    #[test]
    fn rejects_malformed_text() {
        for text in ["", "   ", "getLock()", "a..b", "Foo.class.x", "this.class", "a.this.this", "1mu"] {
            let err = parse_guard(text, Span::dummy()).expect_err(text);
            assert!(matches!(err, GuardError::Malformed { .. }), "{}: {:?}", text, err);
        }
    }

    fn table() -> ClassTable {
        ClassTable::from_unit(&CompilationUnit {
            classes: vec![ClassDecl::new("Counter")
                .field(FieldDecl::new("mu", "Object"))
                .field(FieldDecl::new("LOCK", "Object").static_field())],
            ..Default::default()
        })
    }

    #[test]
    fn resolves_fields_and_this() {
        let table = table();
        let scope = MemberScope::top_level(TypeName::new("Counter"), false);
        let g = resolve_guard(&annotation("mu"), "x", &scope, &table).expect("mu resolves");
        assert!(matches!(g.kind(), GuardKind::FieldAccess { .. }));
        let g = resolve_guard(&annotation("this"), "x", &scope, &table).expect("this resolves");
        assert_eq!(g.kind(), &GuardKind::SelfReference);
        let g = resolve_guard(&annotation("Counter.class"), "x", &scope, &table).expect("class literal");
        assert!(matches!(g.kind(), GuardKind::ClassLiteral(_)));
    }

    #[test]
    fn unknown_names_are_unresolvable_with_suggestions() {
        let table = table();
        let scope = MemberScope::top_level(TypeName::new("Counter"), false);
        let err = resolve_guard(&annotation("mux"), "x", &scope, &table).expect_err("unknown");
        match err {
            GuardError::Unresolvable { suggestions, .. } => assert_eq!(suggestions, vec!["mu"]),
            other => panic!("expected Unresolvable, got {:?}", other),
        }
    }

    #[test]
    fn instance_guard_on_static_member_is_rejected() {
        let table = table();
        let scope = MemberScope::top_level(TypeName::new("Counter"), true);
        let err = resolve_guard(&annotation("mu"), "COUNT", &scope, &table).expect_err("instance guard");
        assert!(matches!(err, GuardError::InstanceGuardOnStatic { .. }));
        assert!(resolve_guard(&annotation("LOCK"), "COUNT", &scope, &table).is_ok());
    }

    #[test]
    fn validate_unit_collects_guards_and_errors() {
        let unit = CompilationUnit {
            classes: vec![ClassDecl::new("Counter")
                .field(FieldDecl::new("mu", "Object"))
                .field(FieldDecl::new("x", "int").guarded_by("mu"))
                .field(FieldDecl::new("y", "int").guarded_by("nope"))
                .method(MethodDecl::new("bump").guarded_by("this"))
                .method(MethodDecl::new("get"))],
            ..Default::default()
        };
        let table = ClassTable::from_unit(&unit);
        let validation = validate_unit(&unit, &table);
        assert_eq!(validation.guards.guarded_field_count(), 1);
        assert_eq!(validation.guards.guarded_method_count(), 1);
        assert_eq!(validation.errors.len(), 1);
        assert_eq!(
            validation.errors[0].to_string(),
            "Invalid guard expression 'nope' on 'y': could not resolve guard"
        );

        let owner = TypeName::new("Counter");
        assert!(matches!(
            validation.guards.method_guard(&table, &owner, "bump", 0),
            Some(Some(_))
        ));
        assert!(matches!(
            validation.guards.method_guard(&table, &owner, "get", 0),
            Some(None)
        ));
        assert!(validation.guards.method_guard(&table, &owner, "get", 1).is_none());
    }

    #[test]
    fn nearest_override_decides_the_method_guard() {
        let unit = CompilationUnit {
            classes: vec![
                ClassDecl::new("Base")
                    .field(FieldDecl::new("mu", "Object"))
                    .method(MethodDecl::new("foo").guarded_by("mu"))
                    .method(MethodDecl::new("bar").guarded_by("mu")),
                ClassDecl::new("Mid").extends("Base").method(MethodDecl::new("foo")),
                ClassDecl::new("Leaf").extends("Mid"),
            ],
            ..Default::default()
        };
        let table = ClassTable::from_unit(&unit);
        let validation = validate_unit(&unit, &table);
        assert!(validation.errors.is_empty(), "{:?}", validation.errors);

        let leaf = TypeName::new("Leaf");
        assert!(matches!(
            validation.guards.method_guard(&table, &leaf, "foo", 0),
            Some(None)
        ));
        assert!(matches!(
            validation.guards.method_guard(&table, &leaf, "bar", 0),
            Some(Some(_))
        ));
        assert!(matches!(
            validation.guards.method_guard(&table, &TypeName::new("Base"), "foo", 0),
            Some(Some(_))
        ));
    }
}
