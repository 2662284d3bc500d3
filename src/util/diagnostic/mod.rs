//! Compiler diagnostics
//!
//! Diagnostics produced by a front end while compiling one increment. Every
//! diagnostic carries a stable [`DiagnosticCode`]; the code decides the
//! severity and whether the diagnostic is meaningless in an incremental
//! setting (see [`DiagnosticCode::is_benign`]).

use std::fmt;

use crate::util::span::{SourceShim, Span};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Check whether this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Stable diagnostic codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// Character that cannot start a token
    InvalidCharacter,
    /// Integer literal out of range
    InvalidLiteral,
    /// Token that does not fit the grammar
    UnexpectedToken,
    /// Blocks or parentheses nested past the parser's limit
    NestingTooDeep,
    /// Use of a name that is not declared
    UndeclaredIdentifier,
    /// Second definition of an entity
    Redefinition,
    /// Redeclaration with a different kind or signature
    ConflictingDeclaration,
    /// Operand or value of the wrong type
    TypeMismatch,
    /// Wrong number of call arguments
    ArityMismatch,
    /// Call of something that is not a function
    NotCallable,
    /// Assignment to something that is not a variable
    NotAssignable,
    /// Variable declared with type `void`
    VoidVariable,
    /// `return` that does not match the function's type
    InvalidReturn,
    /// Expression statement whose value is discarded
    UnusedValue,
    /// Comparison whose result is discarded
    UnusedComparison,
    /// Value-returning function may fall off its end
    MissingReturn,
    /// Local name hides a global
    ShadowedGlobal,
}

/// Codes ignored while compiling incrementally.
///
/// Wrapped input routinely discards the value of its last expression, so
/// these warnings carry no information for an interactive session.
pub const BENIGN_CODES: &[DiagnosticCode] = &[
    DiagnosticCode::UnusedValue,
    DiagnosticCode::UnusedComparison,
];

impl DiagnosticCode {
    /// Code identifier, e.g. `E0003`
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::InvalidCharacter => "E0001",
            DiagnosticCode::InvalidLiteral => "E0002",
            DiagnosticCode::UnexpectedToken => "E0003",
            DiagnosticCode::NestingTooDeep => "E0004",
            DiagnosticCode::UndeclaredIdentifier => "E0101",
            DiagnosticCode::Redefinition => "E0102",
            DiagnosticCode::ConflictingDeclaration => "E0103",
            DiagnosticCode::TypeMismatch => "E0201",
            DiagnosticCode::ArityMismatch => "E0202",
            DiagnosticCode::NotCallable => "E0203",
            DiagnosticCode::NotAssignable => "E0204",
            DiagnosticCode::VoidVariable => "E0205",
            DiagnosticCode::InvalidReturn => "E0206",
            DiagnosticCode::UnusedValue => "W0001",
            DiagnosticCode::UnusedComparison => "W0002",
            DiagnosticCode::MissingReturn => "W0003",
            DiagnosticCode::ShadowedGlobal => "W0004",
        }
    }

    /// Severity implied by the code
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticCode::UnusedValue
            | DiagnosticCode::UnusedComparison
            | DiagnosticCode::MissingReturn
            | DiagnosticCode::ShadowedGlobal => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether the diagnostic is meaningless for incremental input
    pub fn is_benign(&self) -> bool {
        BENIGN_CODES.contains(self)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rendered diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Severity level
    pub severity: Severity,
    /// Rendered message
    pub message: String,
    /// Location in the compiled text
    pub span: Span,
}

impl Diagnostic {
    /// Create a diagnostic; severity follows from the code
    pub fn new(
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            span,
        }
    }

    /// Check whether this is an error
    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    /// Check whether the diagnostic is on the benign allow-list
    pub fn is_benign(&self) -> bool {
        self.code.is_benign()
    }

    /// Whether this diagnostic aborts the increment
    pub fn is_fatal(
        &self,
        fatal_warnings: bool,
    ) -> bool {
        !self.is_benign() && (self.is_error() || fatal_warnings)
    }

    /// Re-attribute the location to the user's original text
    pub fn remap(
        mut self,
        shim: &SourceShim,
    ) -> Self {
        self.span = shim.map_span(self.span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} at {}",
            self.severity, self.code, self.message, self.span
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::span::Position;

    #[test]
    fn test_benign_allow_list() {
        assert!(DiagnosticCode::UnusedValue.is_benign());
        assert!(DiagnosticCode::UnusedComparison.is_benign());
        assert!(!DiagnosticCode::MissingReturn.is_benign());
        assert!(!DiagnosticCode::UndeclaredIdentifier.is_benign());
    }

    #[test]
    fn test_fatality() {
        let span = Span::dummy();
        let error = Diagnostic::new(DiagnosticCode::TypeMismatch, "bad", span);
        let warning = Diagnostic::new(DiagnosticCode::MissingReturn, "maybe", span);
        let benign = Diagnostic::new(DiagnosticCode::UnusedValue, "unused", span);

        assert!(error.is_fatal(false));
        assert!(!warning.is_fatal(false));
        assert!(warning.is_fatal(true));
        assert!(!benign.is_fatal(true));
    }

    #[test]
    fn test_display_and_remap() {
        let span = Span::new(Position::new(2, 5), Position::new(2, 6));
        let diag = Diagnostic::new(DiagnosticCode::UndeclaredIdentifier, "use of `y`", span)
            .remap(&SourceShim::new(1, "y"));
        assert_eq!(diag.to_string(), "error[E0101]: use of `y` at 1:5");
    }
}
