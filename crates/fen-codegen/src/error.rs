//! Codegen error types.

use fen_types::Span;
use thiserror::Error;

/// Errors that can occur while lowering, assembling or packing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A variable reference did not resolve in any enclosing scope.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String, span: Span },

    /// A function reference did not resolve in the constant pool.
    #[error("function `{name}` not found")]
    FunctionNotFound { name: String, span: Span },

    /// A call or curry target does not have a function type.
    #[error("cannot call a value of type `{found}`")]
    NotAFunction { found: String, span: Span },

    /// The same name was bound twice in one scope.
    #[error("variable `{name}` is already defined in this scope")]
    VariableRedefined { name: String, span: Span },

    /// The target region does not match the static size of the expression.
    #[error("layout mismatch for {node}: target region is {target} octets, expression is {expected}")]
    LayoutMismatch {
        node: &'static str,
        target: u32,
        expected: u32,
        span: Span,
    },

    /// A forward label delta is negative or does not fit in 16 bits.
    #[error("illegal backward/overlong jump to `{label}` (delta {delta}); please split function")]
    JumpTooFar { label: String, delta: i64 },

    /// A referenced label was never placed.
    #[error("label `{0}` not defined")]
    LabelNotDefined(String),

    /// A label was placed twice.
    #[error("label `{0}` defined twice")]
    LabelDefinedTwice(String),

    /// An arena ran out of room.
    #[error("arena overflow in {arena}: {requested} octets requested at {cursor}, capacity {capacity}")]
    ArenaOverflow {
        arena: &'static str,
        requested: usize,
        cursor: usize,
        capacity: usize,
    },

    /// The per-function evaluation stack ran out of room.
    #[error("stack overflow: {requested} octets requested at {cursor}, capacity {capacity}")]
    StackOverflow {
        requested: u32,
        cursor: u32,
        capacity: u32,
    },

    /// A function stub reached the packer without a body.
    #[error("function `{0}` was reserved but never compiled")]
    UnpatchedFunction(String),

    /// An encoding limit (element count, region size, code size) was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The decorator produced a node the lowerer does not handle.
    #[error("unsupported node: {0}")]
    UnsupportedNode(String),

    /// A byte stream could not be decoded.
    #[error("malformed bytecode at {pc:#06x}: {message}")]
    Malformed { pc: usize, message: String },

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

/// The failure classes a caller can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Compile error in user code; the enclosing function is aborted.
    User,
    Layout,
    JumpDistance,
    ArenaOverflow,
    Label,
    Internal,
}

impl CodegenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownVariable { .. }
            | Self::FunctionNotFound { .. }
            | Self::NotAFunction { .. }
            | Self::VariableRedefined { .. } => ErrorKind::User,
            Self::LayoutMismatch { .. } | Self::LimitExceeded(_) => ErrorKind::Layout,
            Self::JumpTooFar { .. } => ErrorKind::JumpDistance,
            Self::ArenaOverflow { .. } | Self::StackOverflow { .. } => ErrorKind::ArenaOverflow,
            Self::LabelNotDefined(_) | Self::LabelDefinedTwice(_) => ErrorKind::Label,
            Self::UnpatchedFunction(_)
            | Self::UnsupportedNode(_)
            | Self::Malformed { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Source location, when the error is tied to a node.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnknownVariable { span, .. }
            | Self::FunctionNotFound { span, .. }
            | Self::NotAFunction { span, .. }
            | Self::VariableRedefined { span, .. }
            | Self::LayoutMismatch { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub fn is_user_error(&self) -> bool {
        self.kind() == ErrorKind::User
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_classified() {
        let err = CodegenError::UnknownVariable {
            name: "x".into(),
            span: Span::point(2, 4),
        };
        assert!(err.is_user_error());
        assert_eq!(err.span(), Some(Span::point(2, 4)));
    }

    #[test]
    fn test_jump_error_suggests_splitting() {
        let err = CodegenError::JumpTooFar {
            label: "end".into(),
            delta: 70_000,
        };
        assert_eq!(err.kind(), ErrorKind::JumpDistance);
        assert!(err.to_string().contains("please split function"));
    }

    #[test]
    fn test_label_errors_are_fatal() {
        let err = CodegenError::LabelNotDefined("else".into());
        assert_eq!(err.kind(), ErrorKind::Label);
        assert!(!err.is_user_error());
        assert_eq!(err.span(), None);
    }
}
