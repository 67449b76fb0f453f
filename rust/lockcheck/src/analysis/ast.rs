//! Host syntax model consumed by the lock-discipline analysis.
//!
//! This is a deliberately small, Java-shaped tree: classes with fields,
//! methods and initializers, and method bodies made of statements and
//! expressions. Units are usually produced by a front end and handed over as
//! JSON; the builder helpers at the bottom of this file exist for hand-built
//! trees.

use crate::analysis::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One analysis unit: a set of (possibly nested) classes from a source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Path of the source file, used when rendering diagnostics.
    #[serde(default)]
    pub path: Option<String>,
    /// Source text, used for snippets in rendered diagnostics.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Qualified name (`pkg.Outer.Inner`).
    pub name: String,
    #[serde(default)]
    pub supertypes: Vec<String>,
    /// Static nested classes have no enclosing instance.
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub initializers: Vec<Initializer>,
    #[serde(default)]
    pub nested: Vec<ClassDecl>,
    #[serde(default)]
    pub span: Span,
}

/// A `@GuardedBy("...")`-style annotation as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardAnnotation {
    pub text: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Declared type as written (qualified, or a simple name).
    pub ty: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub guarded_by: Option<GuardAnnotation>,
    /// Field initializers are never analyzed for guarded accesses.
    #[serde(default)]
    pub initializer: Option<Expr>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    #[default]
    Method,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_synchronized: bool,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub guarded_by: Option<GuardAnnotation>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor
    }
}

/// Instance (`{ ... }`) or static (`static { ... }`) initializer block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initializer {
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

// ── Statements ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    Expr {
        expr: Expr,
    },
    Local {
        name: String,
        ty: String,
        #[serde(default)]
        init: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    Block {
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Option<Vec<Stmt>>,
        #[serde(default)]
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
        #[serde(default)]
        span: Span,
    },
    For {
        #[serde(default)]
        init: Vec<Stmt>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Vec<Expr>,
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    ForEach {
        var: String,
        ty: String,
        iterable: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        span: Span,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    Throw {
        value: Expr,
        #[serde(default)]
        span: Span,
    },
    Break {
        #[serde(default)]
        span: Span,
    },
    Continue {
        #[serde(default)]
        span: Span,
    },
    Synchronized {
        lock: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        catches: Vec<CatchClause>,
        #[serde(default)]
        finally: Option<Vec<Stmt>>,
        #[serde(default)]
        span: Span,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Empty for `default:`.
    #[serde(default)]
    pub labels: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: String,
    pub ty: String,
    pub body: Vec<Stmt>,
}

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    This {
        #[serde(default)]
        span: Span,
    },
    /// `Outer.this`
    QualifiedThis {
        class: String,
        #[serde(default)]
        span: Span,
    },
    /// A bare identifier: local, parameter, field or type name.
    Name {
        name: String,
        #[serde(default)]
        span: Span,
    },
    /// `receiver.name`: field access or a qualified name.
    Select {
        receiver: Box<Expr>,
        name: String,
        #[serde(default)]
        span: Span,
    },
    /// `Type.class`
    ClassLit {
        class: String,
        #[serde(default)]
        span: Span,
    },
    Call {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    /// `target = value`, or a compound assignment when `op` is set (`+=`).
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        #[serde(default)]
        op: Option<String>,
        #[serde(default)]
        span: Span,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Cast {
        ty: String,
        expr: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Lambda {
        #[serde(default)]
        params: Vec<Param>,
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    Literal {
        value: String,
        #[serde(default)]
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::This { span }
            | Expr::QualifiedThis { span, .. }
            | Expr::Name { span, .. }
            | Expr::Select { span, .. }
            | Expr::ClassLit { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Index { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::Literal { span, .. } => *span,
        }
    }

    /// Replace the span of this node (not of its children).
    pub fn at(mut self, at: Span) -> Self {
        match &mut self {
            Expr::This { span }
            | Expr::QualifiedThis { span, .. }
            | Expr::Name { span, .. }
            | Expr::Select { span, .. }
            | Expr::ClassLit { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Index { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::Literal { span, .. } => *span = at,
        }
        self
    }

    /// Dotted text of a `Name`/`Select` chain (`a.b.c`), if this is one.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name { name, .. } => Some(name.clone()),
            Expr::Select { receiver, name, .. } => {
                receiver.dotted_name().map(|prefix| format!("{}.{}", prefix, name))
            }
            _ => None,
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// Source-like printing. Opaque guard expressions use this text, so it has
/// to be deterministic.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::This { .. } => write!(f, "this"),
            Expr::QualifiedThis { class, .. } => write!(f, "{}.this", class),
            Expr::Name { name, .. } => write!(f, "{}", name),
            Expr::Select { receiver, name, .. } => write!(f, "{}.{}", receiver, name),
            Expr::ClassLit { class, .. } => write!(f, "{}.class", class),
            Expr::Call {
                receiver,
                method,
                args,
                ..
            } => {
                if let Some(r) = receiver {
                    write!(f, "{}.", r)?;
                }
                write!(f, "{}(", method)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::New { class, args, .. } => {
                write!(f, "new {}(", class)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Assign {
                target, value, op, ..
            } => match op {
                Some(op) => write!(f, "{} {}= {}", target, op, value),
                None => write!(f, "{} = {}", target, value),
            },
            Expr::Unary { op, operand, .. } => match op.as_str() {
                "post++" => write!(f, "{}++", operand),
                "post--" => write!(f, "{}--", operand),
                _ => write!(f, "{}{}", op, operand),
            },
            Expr::Binary { op, lhs, rhs, .. } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Conditional {
                cond,
                then_val,
                else_val,
                ..
            } => write!(f, "{} ? {} : {}", cond, then_val, else_val),
            Expr::Index { base, index, .. } => write!(f, "{}[{}]", base, index),
            Expr::Cast { ty, expr, .. } => write!(f, "(({}) {})", ty, expr),
            Expr::Lambda { params, .. } => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "({}) -> {{...}}", names.join(", "))
            }
            Expr::Literal { value, .. } => write!(f, "{}", value),
        }
    }
}

// ── Builders ────────────────────────────────────────────────────────

impl Expr {
    pub fn this() -> Self {
        Expr::This { span: Span::dummy() }
    }

    pub fn qualified_this(class: &str) -> Self {
        Expr::QualifiedThis {
            class: class.to_string(),
            span: Span::dummy(),
        }
    }

    pub fn name(name: &str) -> Self {
        Expr::Name {
            name: name.to_string(),
            span: Span::dummy(),
        }
    }

    pub fn select(receiver: Expr, name: &str) -> Self {
        Expr::Select {
            receiver: Box::new(receiver),
            name: name.to_string(),
            span: Span::dummy(),
        }
    }

    pub fn class_lit(class: &str) -> Self {
        Expr::ClassLit {
            class: class.to_string(),
            span: Span::dummy(),
        }
    }

    pub fn call(receiver: Option<Expr>, method: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: receiver.map(Box::new),
            method: method.to_string(),
            args,
            span: Span::dummy(),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
            op: None,
            span: Span::dummy(),
        }
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op: op.to_string(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span: Span::dummy(),
        }
    }

    pub fn lambda(params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Expr::Lambda {
            params,
            body,
            span: Span::dummy(),
        }
    }

    pub fn lit(value: &str) -> Self {
        Expr::Literal {
            value: value.to_string(),
            span: Span::dummy(),
        }
    }
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr { expr }
    }

    pub fn local(name: &str, ty: &str, init: Option<Expr>) -> Self {
        Stmt::Local {
            name: name.to_string(),
            ty: ty.to_string(),
            init,
            span: Span::dummy(),
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            value,
            span: Span::dummy(),
        }
    }

    pub fn throw(value: Expr) -> Self {
        Stmt::Throw {
            value,
            span: Span::dummy(),
        }
    }

    pub fn synchronized(lock: Expr, body: Vec<Stmt>) -> Self {
        Stmt::Synchronized {
            lock,
            body,
            span: Span::dummy(),
        }
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            span: Span::dummy(),
        }
    }

    pub fn try_finally(body: Vec<Stmt>, catches: Vec<CatchClause>, finally: Option<Vec<Stmt>>) -> Self {
        Stmt::Try {
            body,
            catches,
            finally,
            span: Span::dummy(),
        }
    }
}

impl Param {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }
}

impl FieldDecl {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            is_static: false,
            guarded_by: None,
            initializer: None,
            span: Span::dummy(),
        }
    }

    pub fn guarded_by(mut self, text: &str) -> Self {
        self.guarded_by = Some(GuardAnnotation {
            text: text.to_string(),
            span: self.span,
        });
        self
    }

    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }
}

impl MethodDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: MethodKind::Method,
            is_static: false,
            is_synchronized: false,
            params: Vec::new(),
            guarded_by: None,
            body: Vec::new(),
            span: Span::dummy(),
        }
    }

    pub fn constructor(class_simple_name: &str) -> Self {
        Self {
            kind: MethodKind::Constructor,
            ..Self::new(class_simple_name)
        }
    }

    pub fn synchronized(mut self) -> Self {
        self.is_synchronized = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn guarded_by(mut self, text: &str) -> Self {
        self.guarded_by = Some(GuardAnnotation {
            text: text.to_string(),
            span: self.span,
        });
        self
    }

    pub fn body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }
}

impl ClassDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supertypes: Vec::new(),
            is_static: false,
            fields: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            nested: Vec::new(),
            span: Span::dummy(),
        }
    }

    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertypes.push(supertype.to_string());
        self
    }

    pub fn static_class(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn initializer(mut self, is_static: bool, body: Vec<Stmt>) -> Self {
        self.initializers.push(Initializer {
            is_static,
            body,
            span: Span::dummy(),
        });
        self
    }

    pub fn nested(mut self, class: ClassDecl) -> Self {
        self.nested.push(class);
        self
    }

    /// Last segment of the qualified name.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}
