use serde::{Deserialize, Serialize};

/// Source location of a node in the analyzed compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start in the source
    pub start: usize,
    /// Byte offset of the end (exclusive) in the source
    pub end: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self { start, end, line, col }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0, line: 0, col: 0 }
    }

    /// A span that only knows its line, used by hand-built trees and tests.
    pub fn line(line: usize) -> Self {
        Self { start: 0, end: 0, line, col: 1 }
    }

    pub fn is_dummy(&self) -> bool {
        self.line == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_span_is_detected() {
        assert!(Span::dummy().is_dummy());
        assert!(!Span::line(3).is_dummy());
    }
}
