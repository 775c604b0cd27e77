use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors stored before further ones are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error severity.
///
/// `Warning` is produced when the caller asked for errors-as-warnings and a
/// function was dropped from the pack instead of failing the whole build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Resolution,
    Layout,
    Assembly,
    Limit,
    Internal,
}

/// Numeric error code (E100–E999).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Name resolution (E100–E199) ──
    pub const UNKNOWN_VARIABLE: Self = Self(100);
    pub const FUNCTION_NOT_FOUND: Self = Self(101);
    pub const NOT_A_FUNCTION: Self = Self(102);
    pub const VARIABLE_REDEFINED: Self = Self(103);
    pub const DUPLICATE_FUNCTION: Self = Self(104);
    pub const DUPLICATE_PARAMETER: Self = Self(105);

    // ── Layout (E200–E299) ──
    pub const LAYOUT_MISMATCH: Self = Self(200);
    pub const ZERO_SIZED_VALUE: Self = Self(201);

    // ── Assembly (E300–E399) ──
    pub const JUMP_TOO_FAR: Self = Self(300);
    pub const LABEL_NOT_DEFINED: Self = Self(301);
    pub const LABEL_DEFINED_TWICE: Self = Self(302);
    pub const UNPATCHED_FUNCTION: Self = Self(303);

    // ── Resource limits (E400–E499) ──
    pub const ARENA_OVERFLOW: Self = Self(400);
    pub const STACK_OVERFLOW: Self = Self(401);
    pub const LIMIT_EXCEEDED: Self = Self(402);

    // ── Internal (E900–E999) ──
    pub const UNSUPPORTED_NODE: Self = Self(900);
    pub const INTERNAL: Self = Self(901);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Resolution,
            200..=299 => ErrorCategory::Layout,
            300..=399 => ErrorCategory::Assembly,
            400..=499 => ErrorCategory::Limit,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured compiler error, as reported to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FenError {
    /// Fully qualified name of the function being compiled, if any.
    pub function: Option<String>,
    pub code: ErrorCode,
    pub severity: Severity,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FenError {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            function: None,
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Downgrade to a warning.
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}] ", self.span, self.code, self.category)?;
        if let Some(function) = &self.function {
            write!(f, "in `{function}`: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FenError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution => write!(f, "resolution"),
            Self::Layout => write!(f, "layout"),
            Self::Assembly => write!(f, "assembly"),
            Self::Limit => write!(f, "limit"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors and warnings collected over one compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<FenError>,
    pub warnings: Vec<FenError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            total_errors: 0,
            total_warnings: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: FenError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    pub fn push_warning(&mut self, warning: FenError) {
        self.warnings.push(warning.as_warning());
        self.total_warnings += 1;
    }
}

impl Default for CompileErrors {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::UNKNOWN_VARIABLE.category(),
            ErrorCategory::Resolution
        );
        assert_eq!(ErrorCode::LAYOUT_MISMATCH.category(), ErrorCategory::Layout);
        assert_eq!(ErrorCode::JUMP_TOO_FAR.category(), ErrorCategory::Assembly);
        assert_eq!(ErrorCode::ARENA_OVERFLOW.category(), ErrorCategory::Limit);
        assert_eq!(ErrorCode::INTERNAL.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::FUNCTION_NOT_FOUND), "E101");
        assert_eq!(format!("{}", ErrorCode::JUMP_TOO_FAR), "E300");
    }

    #[test]
    fn test_display_mentions_function() {
        let err = FenError::new(
            ErrorCode::UNKNOWN_VARIABLE,
            "unknown variable `x`",
            Span::new(3, 9, 3, 10),
        )
        .in_function("main.f");
        assert_eq!(
            err.to_string(),
            "3:9: E100 [resolution] in `main.f`: unknown variable `x`"
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = FenError::new(
            ErrorCode::JUMP_TOO_FAR,
            "jump distance 70000 exceeds 65535",
            Span::new(12, 5, 40, 2),
        )
        .with_suggestion("please split function");

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"code\""));
        assert!(json.contains("\"line\""));
        assert!(json.contains("\"suggestion\""));

        let back: FenError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, err.code);
        assert_eq!(back.span, err.span);
    }

    #[test]
    fn test_compile_errors_max_limit() {
        let mut errs = CompileErrors::empty();
        for i in 0..25 {
            errs.push_error(FenError::new(
                ErrorCode::UNKNOWN_VARIABLE,
                format!("Error {i}"),
                Span::point(i as u32 + 1, 1),
            ));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.has_errors());
    }

    #[test]
    fn test_warnings_are_downgraded() {
        let mut errs = CompileErrors::empty();
        errs.push_warning(FenError::new(
            ErrorCode::FUNCTION_NOT_FOUND,
            "missing",
            Span::synthetic(),
        ));
        assert!(!errs.has_errors());
        assert_eq!(errs.warnings[0].severity, Severity::Warning);
    }
}
