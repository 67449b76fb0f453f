//! Type capability used by the analysis, and the class table implementing it.
//!
//! The analysis never looks at host type structures directly. Everything it
//! needs goes through [`TypeResolver`]: subtype tests, lookup of a type by
//! qualified name, and field resolution.

use crate::analysis::ast::{ClassDecl, CompilationUnit};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

pub const OBJECT: &str = "java.lang.Object";
pub const CLASS: &str = "java.lang.Class";
pub const LOCK: &str = "java.util.concurrent.locks.Lock";
pub const REENTRANT_LOCK: &str = "java.util.concurrent.locks.ReentrantLock";
pub const READ_WRITE_LOCK: &str = "java.util.concurrent.locks.ReadWriteLock";
pub const REENTRANT_READ_WRITE_LOCK: &str = "java.util.concurrent.locks.ReentrantReadWriteLock";

/// A resolved (or, for unknown types, verbatim) type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSymbol {
    pub name: TypeName,
}

/// A resolved field. Identity is the declaring class plus the field name.
#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub owner: TypeName,
    pub name: String,
    pub ty: TypeName,
    pub is_static: bool,
}

impl PartialEq for FieldSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name
    }
}

impl Eq for FieldSymbol {}

impl std::hash::Hash for FieldSymbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.name.hash(state);
    }
}

/// Symbol and type resolution service provided by the host.
pub trait TypeResolver: Send + Sync {
    /// Reflexive subtype test.
    fn is_subtype(&self, sub: &TypeName, sup: &TypeName) -> bool;

    fn resolve_by_qualified_name(&self, name: &str) -> Option<TypeSymbol>;

    /// Resolve a field named `name` visible as a member of `owner`, searching
    /// supertypes. The returned symbol names the declaring class.
    fn resolve_field(&self, owner: &TypeName, name: &str) -> Option<FieldSymbol>;

    /// Field names declared by `owner` and its supertypes. Only used to build
    /// suggestions; resolvers that cannot enumerate members return nothing.
    fn field_names(&self, _owner: &TypeName) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
struct ClassInfo {
    supertypes: Vec<TypeName>,
    fields: Vec<FieldSymbol>,
}

/// [`TypeResolver`] built from a [`CompilationUnit`] plus the handful of
/// library types the lock analysis cares about.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: HashMap<TypeName, ClassInfo>,
    /// simple name -> qualified names carrying it
    simple_names: HashMap<String, Vec<TypeName>>,
}

impl ClassTable {
    /// Table holding only the built-in library types.
    pub fn with_builtins() -> Self {
        let mut table = Self::default();
        table.insert_builtin(OBJECT, &[]);
        table.insert_builtin(CLASS, &[OBJECT]);
        table.insert_builtin(LOCK, &[OBJECT]);
        table.insert_builtin(REENTRANT_LOCK, &[LOCK]);
        table.insert_builtin(READ_WRITE_LOCK, &[OBJECT]);
        table.insert_builtin(REENTRANT_READ_WRITE_LOCK, &[READ_WRITE_LOCK]);
        table.insert_builtin(
            "java.util.concurrent.locks.ReentrantReadWriteLock.ReadLock",
            &[LOCK],
        );
        table.insert_builtin(
            "java.util.concurrent.locks.ReentrantReadWriteLock.WriteLock",
            &[LOCK],
        );
        table
    }

    pub fn from_unit(unit: &CompilationUnit) -> Self {
        let mut table = Self::with_builtins();

        // Names first, so that declared types can refer to any class in the unit.
        let mut flat: Vec<&ClassDecl> = Vec::new();
        for class in &unit.classes {
            collect_classes(class, &mut flat);
        }
        for class in &flat {
            table.register_name(TypeName::new(class.name.clone()));
        }

        for class in flat {
            let owner = TypeName::new(class.name.clone());
            let mut supertypes: Vec<TypeName> = class
                .supertypes
                .iter()
                .map(|s| table.resolve_written(s))
                .collect();
            if supertypes.is_empty() {
                supertypes.push(TypeName::new(OBJECT));
            }
            let fields = class
                .fields
                .iter()
                .map(|f| FieldSymbol {
                    owner: owner.clone(),
                    name: f.name.clone(),
                    ty: table.resolve_written(&f.ty),
                    is_static: f.is_static,
                })
                .collect();
            table.classes.insert(owner, ClassInfo { supertypes, fields });
        }
        table
    }

    /// Resolve a type as written in source: a qualified name, or a simple name
    /// that is unique in the table. Anything else is kept verbatim.
    pub fn resolve_written(&self, written: &str) -> TypeName {
        self.resolve_by_qualified_name(written)
            .map(|s| s.name)
            .unwrap_or_else(|| TypeName::new(written))
    }

    fn insert_builtin(&mut self, name: &str, supertypes: &[&str]) {
        let name = TypeName::new(name);
        self.register_name(name.clone());
        self.classes.insert(
            name,
            ClassInfo {
                supertypes: supertypes.iter().map(|s| TypeName::new(*s)).collect(),
                fields: Vec::new(),
            },
        );
    }

    fn register_name(&mut self, name: TypeName) {
        let entry = self
            .simple_names
            .entry(name.simple_name().to_string())
            .or_default();
        if !entry.contains(&name) {
            entry.push(name.clone());
        }
        self.classes.entry(name).or_insert_with(|| ClassInfo {
            supertypes: Vec::new(),
            fields: Vec::new(),
        });
    }

    /// `owner` followed by its supertypes, breadth first, each visited once.
    fn linearize(&self, owner: &TypeName) -> Vec<TypeName> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([owner.clone()]);
        while let Some(t) = queue.pop_front() {
            if !seen.insert(t.clone()) {
                continue;
            }
            if let Some(info) = self.classes.get(&t) {
                queue.extend(info.supertypes.iter().cloned());
            }
            order.push(t);
        }
        order
    }
}

fn collect_classes<'a>(class: &'a ClassDecl, out: &mut Vec<&'a ClassDecl>) {
    out.push(class);
    for nested in &class.nested {
        collect_classes(nested, out);
    }
}

impl TypeResolver for ClassTable {
    fn is_subtype(&self, sub: &TypeName, sup: &TypeName) -> bool {
        if sub == sup || sup.as_str() == OBJECT {
            return true;
        }
        self.linearize(sub).iter().any(|t| t == sup)
    }

    /// Also accepts a simple name when exactly one known type carries it.
    fn resolve_by_qualified_name(&self, name: &str) -> Option<TypeSymbol> {
        let exact = TypeName::new(name);
        if self.classes.contains_key(&exact) {
            return Some(TypeSymbol { name: exact });
        }
        match self.simple_names.get(name).map(|v| v.as_slice()) {
            Some([only]) => Some(TypeSymbol { name: only.clone() }),
            _ => None,
        }
    }

    fn resolve_field(&self, owner: &TypeName, name: &str) -> Option<FieldSymbol> {
        self.linearize(owner).iter().find_map(|t| {
            self.classes
                .get(t)
                .and_then(|info| info.fields.iter().find(|f| f.name == name).cloned())
        })
    }

    fn field_names(&self, owner: &TypeName) -> Vec<String> {
        self.linearize(owner)
            .iter()
            .filter_map(|t| self.classes.get(t))
            .flat_map(|info| info.fields.iter().map(|f| f.name.clone()))
            .collect()
    }
}
