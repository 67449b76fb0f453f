//! Lock-discipline analysis: guard expressions, held-lock tracking, guard
//! matching and annotation validation, plus the host model they run on.

pub mod analyzer;
pub mod ast;
pub mod checker;
pub mod error_codes;
pub mod guard_expr;
pub mod held_locks;
pub mod span;
pub mod types;
pub mod validator;

use ast::{ClassDecl, CompilationUnit};
use guard_expr::MemberScope;
use types::TypeName;

/// A class of a unit together with its lexical nesting.
#[derive(Debug, Clone)]
pub struct ClassSite<'a> {
    pub class: &'a ClassDecl,
    /// Outermost first, ending with `class` itself; paired with "is static nested".
    pub nesting: Vec<(TypeName, bool)>,
}

impl ClassSite<'_> {
    /// Resolution scope for a member of this class.
    pub fn scope(&self, member_is_static: bool) -> MemberScope {
        MemberScope::new(&self.nesting, member_is_static)
    }
}

/// Every class of `unit`, nested classes included, in declaration order.
pub fn class_sites(unit: &CompilationUnit) -> Vec<ClassSite<'_>> {
    fn walk<'a>(class: &'a ClassDecl, outer: &[(TypeName, bool)], out: &mut Vec<ClassSite<'a>>) {
        let mut nesting = outer.to_vec();
        nesting.push((TypeName::new(class.name.clone()), class.is_static));
        out.push(ClassSite {
            class,
            nesting: nesting.clone(),
        });
        for nested in &class.nested {
            walk(nested, &nesting, out);
        }
    }

    let mut out = Vec::new();
    for class in &unit.classes {
        walk(class, &[], &mut out);
    }
    out
}
