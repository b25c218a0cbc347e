//! Source positions.
//!
//! Every name the parser hands to the resolver carries a [`TextSpan`]. Spans
//! are byte offsets into one source file; [`LineMap`] turns them into
//! line/column pairs for diagnostics and the debugger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A byte offset from the start of the source.
pub type TextPos = u32;

/// A half-open byte range `[start, start + length)`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: TextPos,
    pub length: TextPos,
}

impl TextSpan {
    #[inline]
    pub fn new(start: TextPos, length: TextPos) -> Self {
        Self { start, length }
    }

    #[inline]
    pub fn from_bounds(start: TextPos, end: TextPos) -> Self {
        debug_assert!(end >= start);
        Self {
            start,
            length: end - start,
        }
    }

    /// A zero-length span, used for synthesized symbols (temporaries,
    /// constant slots, native registrations).
    #[inline]
    pub fn synthetic() -> Self {
        Self::default()
    }

    #[inline]
    pub fn end(&self) -> TextPos {
        self.start + self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn contains(&self, pos: TextPos) -> bool {
        pos >= self.start && pos < self.end()
    }

    /// Whether `other` lies entirely inside this span.
    #[inline]
    pub fn encloses(&self, other: &TextSpan) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    /// A span covering both spans.
    pub fn union(&self, other: &TextSpan) -> TextSpan {
        TextSpan::from_bounds(self.start.min(other.start), self.end().max(other.end()))
    }
}

impl fmt::Debug for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end())
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// A 1-based line and column.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Byte offsets of line starts, built once per source file.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<TextPos>,
}

impl LineMap {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, byte)| byte == b'\n')
                .map(|(i, _)| (i + 1) as TextPos),
        );
        Self { line_starts }
    }

    /// 0-based line containing `pos`.
    pub fn line_of(&self, pos: TextPos) -> usize {
        match self.line_starts.binary_search(&pos) {
            Ok(line) => line,
            Err(line) => line - 1,
        }
    }

    pub fn location(&self, pos: TextPos) -> SourceLocation {
        let line = self.line_of(pos);
        SourceLocation {
            line: line as u32 + 1,
            column: pos - self.line_starts[line] + 1,
        }
    }

    /// Byte offset of a 1-based line/column, or `None` past the last line.
    pub fn offset(&self, location: SourceLocation) -> Option<TextPos> {
        let line = location.line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(line)?;
        Some(start + location.column.saturating_sub(1))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_contains() {
        let span = TextSpan::new(5, 10);
        assert_eq!(span.end(), 15);
        assert!(span.contains(5));
        assert!(span.contains(14));
        assert!(!span.contains(15));
    }

    #[test]
    fn test_span_encloses() {
        let outer = TextSpan::from_bounds(0, 100);
        assert!(outer.encloses(&TextSpan::new(10, 5)));
        assert!(!outer.encloses(&TextSpan::new(95, 10)));
    }

    #[test]
    fn test_line_map_locations() {
        let map = LineMap::new("class A\n  func f\nend");
        assert_eq!(map.line_count(), 3);
        assert_eq!(map.location(0), SourceLocation { line: 1, column: 1 });
        assert_eq!(map.location(10), SourceLocation { line: 2, column: 3 });
        assert_eq!(map.offset(SourceLocation { line: 2, column: 3 }), Some(10));
        assert_eq!(map.offset(SourceLocation { line: 9, column: 1 }), None);
    }
}
