//! Structural checks on a decorated program before code generation.
//!
//! The back end assumes unique function names, unique parameter names and
//! values that occupy at least one octet. These are reported here, all at
//! once, instead of surfacing as the first internal error during lowering.

use std::collections::HashSet;

use fen_types::ast::{Param, Program, Type};
use fen_types::{CompileErrors, ErrorCode, FenError, Span};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("function `{0}` is defined more than once")]
    DuplicateFunction(String),

    #[error("parameter `{name}` of `{function}` is declared more than once")]
    DuplicateParameter { function: String, name: String },

    #[error("{what} of `{function}` has the zero-sized type `{ty}`")]
    ZeroSized {
        function: String,
        what: String,
        ty: String,
    },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateFunction(_) => ErrorCode::DUPLICATE_FUNCTION,
            Self::DuplicateParameter { .. } => ErrorCode::DUPLICATE_PARAMETER,
            Self::ZeroSized { .. } => ErrorCode::ZERO_SIZED_VALUE,
        }
    }

    fn function(&self) -> &str {
        match self {
            Self::DuplicateFunction(function)
            | Self::DuplicateParameter { function, .. }
            | Self::ZeroSized { function, .. } => function,
        }
    }

    pub fn into_fen_error(self, span: Span) -> FenError {
        let function = self.function().to_string();
        FenError::new(self.code(), self.to_string(), span).in_function(function)
    }
}

/// Collect every structural problem in `program`.
pub fn validate(program: &Program) -> CompileErrors {
    let mut errors = CompileErrors::empty();
    let mut names = HashSet::new();

    let signatures = program
        .externals
        .iter()
        .map(|e| (&e.name, &e.params, &e.return_type, e.span))
        .chain(
            program
                .functions
                .iter()
                .map(|f| (&f.name, &f.params, &f.return_type, f.span)),
        );

    for (name, params, return_type, span) in signatures {
        if !names.insert(name.name.as_str()) {
            errors.push_error(
                ValidationError::DuplicateFunction(name.name.clone()).into_fen_error(name.span),
            );
        }
        check_params(&name.name, params, &mut errors);
        if is_zero_sized(return_type) {
            errors.push_error(
                ValidationError::ZeroSized {
                    function: name.name.clone(),
                    what: "return value".into(),
                    ty: return_type.to_string(),
                }
                .into_fen_error(span),
            );
        }
    }
    errors
}

fn check_params(function: &str, params: &[Param], errors: &mut CompileErrors) {
    let mut seen = HashSet::new();
    for param in params {
        if !seen.insert(param.name.name.as_str()) {
            errors.push_error(
                ValidationError::DuplicateParameter {
                    function: function.to_string(),
                    name: param.name.name.clone(),
                }
                .into_fen_error(param.name.span),
            );
        }
        if is_zero_sized(&param.ty) {
            errors.push_error(
                ValidationError::ZeroSized {
                    function: function.to_string(),
                    what: format!("parameter `{}`", param.name.name),
                    ty: param.ty.to_string(),
                }
                .into_fen_error(param.name.span),
            );
        }
    }
}

fn is_zero_sized(ty: &Type) -> bool {
    ty.size().0 == 0
}
