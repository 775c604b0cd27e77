//! Fen back-end driver: orchestrates validation and code generation.
//!
//! ```text
//! decorated Program → validate → fen-codegen → pack + source map + SHA-256
//! ```
//!
//! Every failure is reported as a structured [`FenError`] with a numeric
//! code, a category and a span; nothing panics on bad input.

pub mod diagnostics;
pub mod validate;

use fen_codegen::types::COMPILER_VERSION;
use fen_codegen::{compile_with_config, CodegenConfig, SourceMap};
use fen_types::ast::Program;
use fen_types::{CompileErrors, Span};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use diagnostics::to_fen_error;
pub use validate::{validate, ValidationError};

/// Outcome of one compilation, serializable for tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    /// The packed artifact, when compilation succeeded.
    pub pack: Option<Vec<u8>>,
    /// Lowercase hex SHA-256 of `pack`.
    pub sha256: Option<String>,
    pub source_map: Option<SourceMap>,
    pub errors: CompileErrors,
    pub compiler_version: String,
}

impl CompileResult {
    fn failed(errors: CompileErrors) -> Self {
        Self {
            success: false,
            pack: None,
            sha256: None,
            source_map: None,
            errors,
            compiler_version: COMPILER_VERSION.to_string(),
        }
    }
}

/// Compile `program`, collecting every diagnostic instead of stopping at
/// the first.
pub fn compile_to_result(program: &Program, config: &CodegenConfig) -> CompileResult {
    let errors = validate(program);
    if errors.has_errors() {
        debug!("validation failed with {} errors", errors.total_errors);
        return CompileResult::failed(errors);
    }

    let mut errors = CompileErrors::empty();
    match compile_with_config(program, config) {
        Ok(pack) => {
            for warning in &pack.warnings {
                let span = program
                    .functions
                    .iter()
                    .find(|f| f.name.name == warning.function)
                    .map_or_else(Span::synthetic, |f| f.span);
                errors.push_warning(to_fen_error(&warning.error, Some(&warning.function), span));
            }
            let sha256 = pack_digest(&pack.octets);
            debug!("compiled {} octets, sha256 {sha256}", pack.octets.len());
            CompileResult {
                success: true,
                pack: Some(pack.octets),
                sha256: Some(sha256),
                source_map: Some(pack.source_map),
                errors,
                compiler_version: COMPILER_VERSION.to_string(),
            }
        }
        Err(error) => {
            errors.push_error(to_fen_error(&error, None, Span::synthetic()));
            CompileResult::failed(errors)
        }
    }
}

/// Compile with the default configuration, returning the pack or the
/// diagnostics.
pub fn compile(program: &Program) -> Result<Vec<u8>, CompileErrors> {
    let result = compile_to_result(program, &CodegenConfig::default());
    match result.pack {
        Some(pack) if result.success => Ok(pack),
        _ => Err(result.errors),
    }
}

/// [`compile_to_result`] serialized as JSON, for tooling that talks to the
/// back end over a string boundary.
///
/// ```json
/// {
///   "success": true,
///   "pack": [102, 101, 110, 112, ...],
///   "sha256": "…",
///   "source_map": { "entries": [...] },
///   "errors": { "errors": [], "warnings": [], "total_errors": 0, "total_warnings": 0 },
///   "compiler_version": "0.1.0"
/// }
/// ```
pub fn compile_to_json(program: &Program, config: &CodegenConfig) -> String {
    let result = compile_to_result(program, config);
    serde_json::to_string(&result).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"pack":null,"errors":{{"errors":[{{"message":"serialization error: {e}"}}],"warnings":[],"total_errors":1,"total_warnings":0}}}}"#
        )
    })
}

/// Validation diagnostics only, as JSON.
pub fn validate_to_json(program: &Program) -> String {
    serde_json::to_string(&validate(program)).unwrap_or_else(|e| {
        format!(
            r#"{{"errors":[{{"message":"serialization error: {e}"}}],"warnings":[],"total_errors":1,"total_warnings":0}}"#
        )
    })
}

/// Lowercase hex SHA-256 of a packed artifact.
pub fn pack_digest(octets: &[u8]) -> String {
    format!("{:x}", Sha256::digest(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_empty_input() {
        assert_eq!(
            pack_digest(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
