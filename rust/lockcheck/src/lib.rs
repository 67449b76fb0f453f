//! lockcheck
//!
//! Verifies `@GuardedBy`-style lock-discipline annotations: every access to
//! a guarded field or method must happen while its guard is provably held.
//! Input is a JSON [`CompilationUnit`]; output is a [`CheckReport`] holding
//! one diagnostic per unguarded access and per rejected annotation.

pub mod analysis;
pub mod config;
pub mod diagnostics;

pub use analysis::ast::CompilationUnit;
pub use config::{CheckOptions, ConfigError};
pub use diagnostics::{Diagnostic, Severity};

use analysis::analyzer::{AnalysisContext, LockVocabulary};
use analysis::ast::MethodDecl;
use analysis::checker::{GuardedByChecker, MemberOutcome};
use analysis::class_sites;
use analysis::guard_expr::MemberScope;
use analysis::types::{ClassTable, TypeResolver};
use analysis::validator::validate_unit;
use diagnostics::{format_guard_error, format_violation, DiagnosticSink};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid unit '{origin}': {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of checking one unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub path: Option<String>,
    /// Rejected annotations first, then violations in member order.
    pub diagnostics: Vec<Diagnostic>,
    pub members_analyzed: usize,
    /// Constructors, which are never analyzed.
    pub members_exempt: usize,
    /// Guarded accesses seen across all analyzed members.
    pub accesses: usize,
    pub rejected_guards: usize,
}

impl CheckReport {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Check a unit against its own class table.
pub fn check_unit(unit: &CompilationUnit, options: &CheckOptions) -> CheckReport {
    let table = ClassTable::from_unit(unit);
    check_unit_with(unit, &table, options)
}

/// Check a unit, answering type questions through `resolver`.
pub fn check_unit_with(
    unit: &CompilationUnit,
    resolver: &dyn TypeResolver,
    options: &CheckOptions,
) -> CheckReport {
    let validation = validate_unit(unit, resolver);
    let mut report = CheckReport {
        path: unit.path.clone(),
        rejected_guards: validation.errors.len(),
        ..Default::default()
    };
    for error in &validation.errors {
        report.diagnostics.report(format_guard_error(error, unit));
    }

    let vocabulary = LockVocabulary::from_options(options, resolver);
    let ctx = AnalysisContext {
        resolver,
        guards: &validation.guards,
        vocabulary: &vocabulary,
    };
    let checker = GuardedByChecker::new(resolver, options);

    let sites = class_sites(unit);
    let members: Vec<(&MethodDecl, MemberScope)> = sites
        .iter()
        .flat_map(|site| {
            site.class
                .methods
                .iter()
                .map(move |m| (m, site.scope(m.is_static)))
        })
        .collect();

    let jobs = options.effective_jobs().min(members.len()).max(1);
    debug!(members = members.len(), jobs, "checking members");
    let outcomes: Vec<MemberOutcome> = if jobs == 1 {
        members
            .iter()
            .map(|(method, scope)| checker.check_method(method, scope, ctx))
            .collect()
    } else {
        check_parallel(&members, &checker, ctx, jobs)
    };

    for outcome in &outcomes {
        match outcome {
            MemberOutcome::Exempt => report.members_exempt += 1,
            MemberOutcome::Analyzed { accesses, .. } => {
                report.members_analyzed += 1;
                report.accesses += accesses;
            }
        }
        for violation in outcome.violations() {
            report.diagnostics.report(format_violation(violation, unit));
        }
    }

    info!(
        unit = unit.path.as_deref().unwrap_or("<unit>"),
        analyzed = report.members_analyzed,
        exempt = report.members_exempt,
        accesses = report.accesses,
        errors = report.error_count(),
        "unit checked"
    );
    report
}

/// Analyze members on `jobs` scoped workers. Each worker claims the next
/// member index and sends one report per member; reports are put back in
/// member order before returning.
fn check_parallel(
    members: &[(&MethodDecl, MemberScope)],
    checker: &GuardedByChecker<'_>,
    ctx: AnalysisContext<'_>,
    jobs: usize,
) -> Vec<MemberOutcome> {
    let (tx, rx) = crossbeam_channel::unbounded::<(usize, MemberOutcome)>();
    let next = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..jobs {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some((method, member_scope)) = members.get(index) else {
                    break;
                };
                let outcome = checker.check_method(method, member_scope, ctx);
                if tx.send((index, outcome)).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut reports: Vec<(usize, MemberOutcome)> = rx.iter().collect();
    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Decode a JSON unit and check it.
pub fn check_unit_json(json: &str, options: &CheckOptions) -> Result<CheckReport, CheckError> {
    let unit: CompilationUnit = serde_json::from_str(json).map_err(|source| CheckError::Json {
        origin: "<input>".to_string(),
        source,
    })?;
    Ok(check_unit(&unit, options))
}

/// Read, decode and check a JSON unit file. The file path stands in for the
/// unit's own path when it has none.
pub fn check_file(path: &Path, options: &CheckOptions) -> Result<CheckReport, CheckError> {
    let json = std::fs::read_to_string(path).map_err(|source| CheckError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut unit: CompilationUnit =
        serde_json::from_str(&json).map_err(|source| CheckError::Json {
            origin: path.display().to_string(),
            source,
        })?;
    if unit.path.is_none() {
        unit.path = Some(path.display().to_string());
    }
    Ok(check_unit(&unit, options))
}
