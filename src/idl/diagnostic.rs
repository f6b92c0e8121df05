use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Phase of the pipeline that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticPhase {
    Lexer,
    Parser,
    TypeCheck,
}

/// Severity of an IDL diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A precise source position (1-indexed line/column) inside an IDL source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A half-open [start, end) span referencing a specific source.
///
/// The path is shared so that every node of a parsed fragment can carry its
/// location without re-allocating the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub path: Arc<Path>,
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(path: Arc<Path>, start: SourcePosition, end: SourcePosition) -> Self {
        Self { path, start, end }
    }

    pub fn point(path: Arc<Path>, position: SourcePosition) -> Self {
        Self {
            path,
            start: position,
            end: position,
        }
    }

    /// Span covering both `self` and `other`; assumes the same source.
    pub fn to(&self, other: &SourceSpan) -> SourceSpan {
        SourceSpan {
            path: self.path.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.path.display(),
            self.start.line,
            self.start.column
        )
    }
}

/// Structured diagnostic suitable for tooling integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlDiagnostic {
    pub phase: DiagnosticPhase,
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl IdlDiagnostic {
    pub fn new(
        phase: DiagnosticPhase,
        level: DiagnosticLevel,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            phase,
            level,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn error(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self::new(phase, DiagnosticLevel::Error, code, message, span)
    }

    pub fn format_human(&self) -> String {
        let location = self
            .span
            .as_ref()
            .map(|span| span.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!(
            "{level:?} {code}: {message} @ {location}",
            level = self.level,
            code = self.code,
            message = self.message,
            location = location
        )
    }
}

impl fmt::Display for IdlDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_includes_code_and_location() {
        let span = SourceSpan::point(Arc::from(Path::new("csr/mstatus.yaml")), SourcePosition::new(12, 5));
        let diag = IdlDiagnostic::error(
            DiagnosticPhase::TypeCheck,
            "typeck.width-mismatch",
            "width mismatch: 32 vs 64 in `+`",
            Some(span),
        );
        assert_eq!(
            diag.format_human(),
            "Error typeck.width-mismatch: width mismatch: 32 vs 64 in `+` @ csr/mstatus.yaml:12:5"
        );
    }

    #[test]
    fn joined_span_covers_both_ends() {
        let path: Arc<Path> = Arc::from(Path::new("a.idl"));
        let lhs = SourceSpan::new(path.clone(), SourcePosition::new(1, 4), SourcePosition::new(1, 6));
        let rhs = SourceSpan::new(path, SourcePosition::new(2, 1), SourcePosition::new(2, 9));
        let joined = lhs.to(&rhs);
        assert_eq!(joined.start, SourcePosition::new(1, 4));
        assert_eq!(joined.end, SourcePosition::new(2, 9));
    }
}
