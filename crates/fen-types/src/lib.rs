//! Shared types for the Fen compiler back end.
//!
//! This crate defines the decorated AST handed over by the type checker,
//! the memory layout primitives every type is annotated with, source spans
//! and the structured error types reported to users.

mod error;
mod span;
pub mod ast;
pub mod layout;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, FenError, Severity, MAX_ERRORS};
pub use layout::{Layout, LayoutError, MemoryAlign, MemoryOffset, MemorySize};
pub use span::Span;

/// Result type used by the driver for user-facing failures.
pub type Result<T> = std::result::Result<T, FenError>;
