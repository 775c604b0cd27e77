//! Conversion of back-end failures into user-facing diagnostics.

use fen_codegen::CodegenError;
use fen_types::{ErrorCode, FenError, Span};

pub fn error_code(error: &CodegenError) -> ErrorCode {
    match error {
        CodegenError::UnknownVariable { .. } => ErrorCode::UNKNOWN_VARIABLE,
        CodegenError::FunctionNotFound { .. } => ErrorCode::FUNCTION_NOT_FOUND,
        CodegenError::NotAFunction { .. } => ErrorCode::NOT_A_FUNCTION,
        CodegenError::VariableRedefined { .. } => ErrorCode::VARIABLE_REDEFINED,
        CodegenError::LayoutMismatch { .. } => ErrorCode::LAYOUT_MISMATCH,
        CodegenError::JumpTooFar { .. } => ErrorCode::JUMP_TOO_FAR,
        CodegenError::LabelNotDefined(_) => ErrorCode::LABEL_NOT_DEFINED,
        CodegenError::LabelDefinedTwice(_) => ErrorCode::LABEL_DEFINED_TWICE,
        CodegenError::ArenaOverflow { .. } => ErrorCode::ARENA_OVERFLOW,
        CodegenError::StackOverflow { .. } => ErrorCode::STACK_OVERFLOW,
        CodegenError::UnpatchedFunction(_) => ErrorCode::UNPATCHED_FUNCTION,
        CodegenError::LimitExceeded(_) => ErrorCode::LIMIT_EXCEEDED,
        CodegenError::UnsupportedNode(_) => ErrorCode::UNSUPPORTED_NODE,
        CodegenError::Malformed { .. } | CodegenError::Internal(_) => ErrorCode::INTERNAL,
    }
}

fn suggestion(error: &CodegenError) -> Option<&'static str> {
    match error {
        CodegenError::JumpTooFar { .. } => Some("split the function into smaller functions"),
        CodegenError::ArenaOverflow { .. } => Some("raise the arena capacity in the codegen configuration"),
        CodegenError::StackOverflow { .. } => Some("raise `stack_capacity` or split the function"),
        CodegenError::VariableRedefined { .. } => Some("rename one of the bindings"),
        _ => None,
    }
}

/// Structured form of `error`. Errors without their own location fall back
/// to `fallback`, usually the enclosing function's span.
pub fn to_fen_error(error: &CodegenError, function: Option<&str>, fallback: Span) -> FenError {
    let mut diagnostic = FenError::new(
        error_code(error),
        error.to_string(),
        error.span().unwrap_or(fallback),
    );
    if let Some(function) = function {
        diagnostic = diagnostic.in_function(function);
    }
    if let Some(hint) = suggestion(error) {
        diagnostic = diagnostic.with_suggestion(hint);
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;
    use fen_types::ErrorCategory;

    #[test]
    fn test_user_error_keeps_its_span() {
        let span = Span::new(4, 2, 4, 7);
        let error = CodegenError::UnknownVariable {
            name: "ghost".into(),
            span,
        };
        let diagnostic = to_fen_error(&error, Some("main.f"), Span::synthetic());
        assert_eq!(diagnostic.code, ErrorCode::UNKNOWN_VARIABLE);
        assert_eq!(diagnostic.category, ErrorCategory::Resolution);
        assert_eq!(diagnostic.span, span);
        assert_eq!(diagnostic.function.as_deref(), Some("main.f"));
        assert!(diagnostic.message.contains("ghost"));
    }

    #[test]
    fn test_jump_error_carries_suggestion() {
        let error = CodegenError::JumpTooFar {
            label: "end".into(),
            delta: 80_000,
        };
        let fallback = Span::new(1, 1, 9, 1);
        let diagnostic = to_fen_error(&error, None, fallback);
        assert_eq!(diagnostic.code, ErrorCode::JUMP_TOO_FAR);
        assert_eq!(diagnostic.span, fallback);
        assert!(diagnostic.suggestion.is_some());
    }

    #[test]
    fn test_internal_errors_share_one_code() {
        let malformed = CodegenError::Malformed {
            pc: 3,
            message: "x".into(),
        };
        assert_eq!(error_code(&malformed), ErrorCode::INTERNAL);
        assert_eq!(error_code(&CodegenError::Internal("y".into())), ErrorCode::INTERNAL);
    }
}
