//! Rich error diagnostics with source snippets, colors, and suggestions.

use crate::analysis::ast::CompilationUnit;
use crate::analysis::checker::Violation;
use crate::analysis::error_codes::{guard_error_code, UNGUARDED_ACCESS};
use crate::analysis::span::Span;
use crate::analysis::validator::GuardError;

use serde::Serialize;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// A rendered diagnostic with source context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub col: Option<usize>,
    pub source_line: Option<String>,
    pub underline: Option<String>,
    pub suggestions: Vec<String>,
}

/// Where diagnostics go once produced.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

impl Diagnostic {
    /// An error anchored at `span`; dummy spans produce no location.
    pub fn error(code: &str, message: impl Into<String>, span: Span) -> Self {
        let located = !span.is_dummy();
        Diagnostic {
            severity: Severity::Error,
            code: Some(code.to_string()),
            message: message.into(),
            file: None,
            line: located.then_some(span.line),
            col: located.then_some(span.col),
            source_line: None,
            underline: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Fill in file name and source snippet from the unit, when it has them.
    pub fn attach_source(mut self, unit: &CompilationUnit, span: Span) -> Self {
        self.file = unit.path.clone();
        if let (Some(source), Some(line)) = (&unit.source, self.line) {
            self.source_line = get_source_line(source, line);
            if self.source_line.is_some() {
                let len = span.end.saturating_sub(span.start);
                self.underline = Some(make_underline(span.col, len));
            }
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render with ANSI colors for terminal
    pub fn render_ansi(&self) -> String {
        let mut out = String::new();

        // Header: error[E0700]: message
        let severity_label = match self.severity {
            Severity::Error => red("error"),
        };

        if let Some(ref code) = self.code {
            out.push_str(&format!("{}[{}]: ", severity_label, bold(code)));
        } else {
            out.push_str(&format!("{}: ", severity_label));
        }
        out.push_str(&bold(&self.message));
        out.push('\n');

        // Location: --> file:line:col
        if let Some(location) = self.location() {
            out.push_str(&format!("  {} {}\n", cyan("-->"), location));
        }

        if let (Some(line_num), Some(ref line_text), Some(ref underline)) =
            (self.line, &self.source_line, &self.underline)
        {
            out.push_str(&format!("   {}\n", cyan("|")));
            out.push_str(&format!(
                "{:>3} {} {}\n",
                cyan(&line_num.to_string()),
                cyan("|"),
                line_text
            ));
            out.push_str(&format!("   {} {}\n", cyan("|"), red(underline)));
        }

        if !self.suggestions.is_empty() {
            out.push_str(&format!("   {}\n", cyan("|")));
            for suggestion in &self.suggestions {
                out.push_str(&format!("   {} {}: {}\n", cyan("="), cyan("help"), suggestion));
            }
        }

        out
    }

    /// Render without colors (for tests and piping)
    pub fn render_plain(&self) -> String {
        let mut out = String::new();

        let severity_label = match self.severity {
            Severity::Error => "error",
        };

        if let Some(ref code) = self.code {
            out.push_str(&format!("{}[{}]: ", severity_label, code));
        } else {
            out.push_str(&format!("{}: ", severity_label));
        }
        out.push_str(&self.message);
        out.push('\n');

        if let Some(location) = self.location() {
            out.push_str(&format!("  --> {}\n", location));
        }

        if let (Some(line_num), Some(ref line_text), Some(ref underline)) =
            (self.line, &self.source_line, &self.underline)
        {
            out.push_str("   |\n");
            out.push_str(&format!("{:>3} | {}\n", line_num, line_text));
            out.push_str(&format!("   | {}\n", underline));
        }

        if !self.suggestions.is_empty() {
            out.push_str("   |\n");
            for suggestion in &self.suggestions {
                out.push_str(&format!("   = help: {}\n", suggestion));
            }
        }

        out
    }

    fn location(&self) -> Option<String> {
        let file = self.file.as_deref().unwrap_or("<unit>");
        match (self.line, self.col) {
            (Some(line), Some(col)) => Some(format!("{}:{}:{}", file, line, col)),
            (Some(line), None) => Some(format!("{}:{}", file, line)),
            _ => self.file.clone(),
        }
    }
}

// ANSI color helpers
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

fn cyan(s: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", s)
}

fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

// Source line extraction
fn get_source_line(source: &str, line: usize) -> Option<String> {
    source
        .lines()
        .nth(line.saturating_sub(1))
        .map(|s| s.to_string())
}

fn make_underline(col: usize, len: usize) -> String {
    format!(
        "{}{}",
        " ".repeat(col.saturating_sub(1)),
        "^".repeat(len.max(1))
    )
}

// Edit distance for suggestions
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a_chars.len(), b_chars.len());

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Single-row variant: prev[j] holds the distance for a[..i-1], b[..j].
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut cur = vec![0; b_len + 1];
    for i in 1..=a_len {
        cur[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b_len]
}

/// Up to three candidates within `max_distance` edits of `name`, closest first.
pub(crate) fn suggest_similar(name: &str, candidates: &[&str], max_distance: usize) -> Vec<String> {
    let mut matches: Vec<(usize, String)> = candidates
        .iter()
        .filter(|c| **c != name)
        .filter_map(|c| {
            let d = edit_distance(name, c);
            (d <= max_distance).then(|| (d, c.to_string()))
        })
        .collect();

    matches.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.cmp(b)));
    matches.dedup_by(|(_, a), (_, b)| a == b);
    matches.into_iter().map(|(_, s)| s).take(3).collect()
}

// ── Formatting analysis results ─────────────────────────────────────

/// Diagnostic for an access whose guard is not held.
pub fn format_violation(violation: &Violation, unit: &CompilationUnit) -> Diagnostic {
    let mut diag = Diagnostic::error(UNGUARDED_ACCESS, &violation.message, violation.span);
    if violation.held.is_empty() {
        diag = diag.with_suggestion(format!(
            "wrap the access in `synchronized ({}) {{ ... }}`",
            violation.guard
        ));
    }
    diag.attach_source(unit, violation.span)
}

/// Diagnostic for a rejected guard annotation.
pub fn format_guard_error(error: &GuardError, unit: &CompilationUnit) -> Diagnostic {
    let mut diag = Diagnostic::error(guard_error_code(error), error.to_string(), error.span());
    if let GuardError::Unresolvable { suggestions, .. } = error {
        for s in suggestions {
            diag = diag.with_suggestion(format!("did you mean '{}'?", s));
        }
    }
    diag.attach_source(unit, error.span())
}
