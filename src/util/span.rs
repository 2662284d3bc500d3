//! Source location tracking

use std::fmt;

/// Source position (line, column, and byte offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of input
    pub offset: usize,
}

impl Position {
    /// Create a new position
    #[inline]
    pub fn new(
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            line,
            column,
            offset: 0,
        }
    }

    /// Create a new position with offset
    #[inline]
    pub fn with_offset(
        line: usize,
        column: usize,
        offset: usize,
    ) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Create a dummy position
    #[inline]
    pub fn dummy() -> Self {
        Self {
            line: 0,
            column: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source span (start position to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start position (inclusive)
    pub start: Position,
    /// End position (exclusive)
    pub end: Position,
}

impl Span {
    /// Create a new span
    #[inline]
    pub fn new(
        start: Position,
        end: Position,
    ) -> Self {
        Self { start, end }
    }

    /// Create a dummy span
    #[inline]
    pub fn dummy() -> Self {
        Self {
            start: Position::dummy(),
            end: Position::dummy(),
        }
    }

    /// Span covering both `self` and `other`
    pub fn to(
        self,
        other: Span,
    ) -> Span {
        Span::new(self.start, other.end)
    }
}

impl fmt::Display for Span {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Maps locations in synthesized text back onto the user's input.
///
/// Wrapped input places the user's text after `line_offset` generated lines and
/// the wrapper's closing text after `user_lines` further lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceShim {
    /// Generated lines preceding the user's first line
    pub line_offset: usize,
    /// Number of lines in the user's text
    pub user_lines: usize,
}

impl SourceShim {
    /// Shim that leaves locations untouched
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a shim for user text embedded after `line_offset` lines
    pub fn new(
        line_offset: usize,
        user_text: &str,
    ) -> Self {
        Self {
            line_offset,
            user_lines: user_text.lines().count().max(1),
        }
    }

    /// Translate a position in the generated text to the user's text
    pub fn map_position(
        &self,
        pos: Position,
    ) -> Position {
        if self.line_offset == 0 || pos.line == 0 {
            return pos;
        }
        if pos.line <= self.line_offset {
            return Position::new(1, 1);
        }
        let line = pos.line - self.line_offset;
        if line > self.user_lines {
            return Position::new(self.user_lines, 1);
        }
        Position::new(line, pos.column)
    }

    /// Translate a span in the generated text to the user's text
    pub fn map_span(
        &self,
        span: Span,
    ) -> Span {
        Span::new(self.map_position(span.start), self.map_position(span.end))
    }
}
