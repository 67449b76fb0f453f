//! Stable error codes for lock-discipline diagnostics.
//!
//! Code ranges:
//!   E0700–E0709  Access violations
//!   E0710–E0719  Guard annotation rejections

use crate::analysis::validator::GuardError;

pub const UNGUARDED_ACCESS: &str = "E0700";
pub const MALFORMED_GUARD: &str = "E0710";
pub const UNRESOLVABLE_GUARD: &str = "E0711";
pub const INSTANCE_GUARD_ON_STATIC: &str = "E0712";

pub fn guard_error_code(e: &GuardError) -> &'static str {
    match e {
        GuardError::Malformed { .. } => MALFORMED_GUARD,
        GuardError::Unresolvable { .. } => UNRESOLVABLE_GUARD,
        GuardError::InstanceGuardOnStatic { .. } => INSTANCE_GUARD_ON_STATIC,
    }
}

/// Long-form explanation of a code, as printed by `lockcheck explain`.
pub fn error_doc(code: &str) -> &'static str {
    match code {
        "E0700" => "A field or method annotated as guarded by a lock was accessed on a path where that lock is not provably held. Wrap the access in a synchronized block on the guard, acquire it with lock() before a try whose finally calls unlock(), or annotate the enclosing method with the same guard.",
        "E0710" => "The guard annotation text is not a lock expression. Accepted forms are 'this', 'Outer.this', a field name, a dotted field path such as 'a.b.c', 'Type.field' and 'Type.class'.",
        "E0711" => "The guard annotation does not name a lock the analysis can resolve: it is not 'this', an enclosing instance, a class literal or a field visible from the annotated member. Check the spelling of the field.",
        "E0712" => "A static member is guarded by a lock that only exists per instance. Static state must be guarded by a static field or a class literal.",
        _ => "Unknown error code.",
    }
}

pub fn all_error_codes() -> Vec<(&'static str, &'static str)> {
    [
        UNGUARDED_ACCESS,
        MALFORMED_GUARD,
        UNRESOLVABLE_GUARD,
        INSTANCE_GUARD_ON_STATIC,
    ]
    .iter()
    .map(|&c| (c, error_doc(c)))
    .collect()
}
