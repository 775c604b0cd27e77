//! Fen back end: lowers a decorated AST to stack-VM bytecode and packs it
//! together with its constants.
//!
//! # Architecture
//!
//! The input is a type-checked [`fen_types::ast::Program`] in which every
//! node carries its static type, and therefore its size and alignment.
//! There is no runtime type information: every value lives at a fixed
//! offset in the function's frame, known at compile time.
//!
//! ## Pipeline
//! - [`constants`]: strings and function descriptors get stable runtime
//!   addresses in two arenas (fixed-layout headers, variable-length blobs)
//! - [`expr`] / [`control`]: each expression is written into a target
//!   region the caller chose, temporaries come from a bump [`stack`]
//! - [`code`]: instructions with symbolic labels are assembled into octets,
//!   with forward-only 16-bit jumps
//! - [`pack`]: arenas and the constant ledger are framed into chunks
//!
//! ## Frame ABI
//!
//! `[ return | arg₁ | … | argₙ | temporaries ]`, with the return region at
//! offset 0 relative to the base pointer. See [`function`].

pub mod arena;
pub mod code;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod control;
pub mod disasm;
pub mod error;
pub mod expr;
pub mod function;
pub mod instruction;
pub mod layout;
pub mod pack;
pub mod scope;
pub mod source_map;
pub mod stack;
pub mod types;

pub use compiler::{
    compile, compile_with_config, compile_with_source_map, CodegenWarning, CompiledPack,
};
pub use config::CodegenConfig;
pub use error::{CodegenError, CodegenResult, ErrorKind};
pub use instruction::{Command, Instruction};
pub use pack::PackReader;
pub use source_map::SourceMap;
