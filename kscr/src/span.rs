//! Source location tracking
//!
//! `Span` is a byte range used by the front-end for diagnostics.
//! `SourcePosition` is the (path, line, column) triple carried by every
//! bytecode node and reported in stack traces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A span in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// Name used for frames the runtime opens on its own behalf.
pub const SYSTEM_SOURCE: &str = "<system>";

/// A human-readable position inside a source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePosition {
    pub path: String,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(path: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    /// Position of runtime-internal frames (entrypoint, static initializers).
    pub fn system() -> Self {
        Self::new(SYSTEM_SOURCE, 0, 0)
    }

    /// Resolve a byte offset into a 1-based line and column.
    pub fn locate(path: &str, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => offset - nl,
            None => offset + 1,
        };
        Self::new(path, line, column)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [line {} pos {}]", self.path, self.line, self.column)
    }
}
