//! Pack assembler.
//!
//! Orchestrates the back end:
//! 1. Register every host function with a complete descriptor
//! 2. Reserve a descriptor stub for every function with a body, so calls
//!    can reference functions that are compiled later
//! 3. Lower, assemble and patch each function in declaration order
//! 4. Pack the arenas and the ledger

use std::collections::HashSet;

use fen_types::ast::*;
use log::{debug, warn};

use crate::arena::ArenaPos;
use crate::config::CodegenConfig;
use crate::constants::{Constant, ConstantPool};
use crate::error::{CodegenError, CodegenResult};
use crate::function::{emit_function, signature_abi, CompiledFunction};
use crate::pack::write_pack;
use crate::source_map::{FunctionKind, SourceMap, SourceMapEntry};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile a decorated [`Program`] into a pack with the default configuration.
pub fn compile(program: &Program) -> CodegenResult<Vec<u8>> {
    Ok(compile_with_config(program, &CodegenConfig::default())?.octets)
}

/// Compile and also return the per-function source map.
pub fn compile_with_source_map(program: &Program) -> CodegenResult<(Vec<u8>, SourceMap)> {
    let pack = compile_with_config(program, &CodegenConfig::default())?;
    Ok((pack.octets, pack.source_map))
}

/// Compile with explicit arena capacities and error policy.
pub fn compile_with_config(program: &Program, config: &CodegenConfig) -> CodegenResult<CompiledPack> {
    Compiler::new(program, config).compile()
}

/// A user error demoted to a warning; the function was packed without opcodes.
#[derive(Debug, Clone, PartialEq)]
pub struct CodegenWarning {
    pub function: String,
    pub error: CodegenError,
}

/// Everything a compilation produced.
#[derive(Debug, Clone)]
pub struct CompiledPack {
    pub octets: Vec<u8>,
    pub source_map: SourceMap,
    /// Successfully compiled functions, in declaration order.
    pub functions: Vec<CompiledFunction>,
    pub warnings: Vec<CodegenWarning>,
}

impl CompiledPack {
    pub fn function(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

struct Compiler<'a> {
    program: &'a Program,
    config: &'a CodegenConfig,
    pool: ConstantPool,
    source_map: SourceMap,
    functions: Vec<CompiledFunction>,
    warnings: Vec<CodegenWarning>,
}

impl<'a> Compiler<'a> {
    fn new(program: &'a Program, config: &'a CodegenConfig) -> Self {
        Self {
            program,
            config,
            pool: ConstantPool::new(config.zero_memory_capacity, config.dynamic_memory_capacity),
            source_map: SourceMap::new(),
            functions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn compile(mut self) -> CodegenResult<CompiledPack> {
        self.register_externals()?;
        let stubs = self.register_stubs()?;

        for (def, stub) in self.program.functions.iter().zip(stubs) {
            self.compile_function(def, &stub)?;
        }

        let octets = write_pack(&self.pool, &self.program.type_info)?;
        debug!(
            "pack complete: {} functions, {} warnings, {} octets",
            self.functions.len(),
            self.warnings.len(),
            octets.len()
        );

        Ok(CompiledPack {
            octets,
            source_map: self.source_map,
            functions: self.functions,
            warnings: self.warnings,
        })
    }

    // ── Registration ─────────────────────────────────────────────────────

    fn register_externals(&mut self) -> CodegenResult<()> {
        for external in &self.program.externals {
            let abi = signature_abi(&external.return_type, &external.params)?;
            let constant = self
                .pool
                .allocate_external_function_stub(&external.name.name, abi)?;
            self.source_map.push(SourceMapEntry {
                name: external.name.name.clone(),
                kind: FunctionKind::External,
                descriptor_pos: constant.pos().offset(),
                opcodes_pos: 0,
                opcodes_len: 0,
                stack_used: 0,
                span: external.span,
            });
        }
        Ok(())
    }

    fn register_stubs(&mut self) -> CodegenResult<Vec<Constant>> {
        let mut seen = HashSet::new();
        let mut stubs = Vec::with_capacity(self.program.functions.len());
        for def in &self.program.functions {
            if !seen.insert(def.name.name.as_str()) {
                return Err(CodegenError::Internal(format!(
                    "function `{}` declared twice",
                    def.name.name
                )));
            }
            let abi = signature_abi(&def.return_type, &def.params)?;
            stubs.push(self.pool.allocate_function_stub(&def.name.name, abi)?);
        }
        Ok(stubs)
    }

    // ── Functions ────────────────────────────────────────────────────────

    fn compile_function(&mut self, def: &FunctionDef, stub: &Constant) -> CodegenResult<()> {
        let since = self.pool.checkpoint();
        match emit_function(def, stub, &mut self.pool, self.config) {
            Ok(compiled) => {
                self.source_map.push(SourceMapEntry {
                    name: compiled.name.clone(),
                    kind: FunctionKind::Function,
                    descriptor_pos: compiled.descriptor.offset(),
                    opcodes_pos: compiled.opcodes.pos.offset(),
                    opcodes_len: compiled.opcodes.size,
                    stack_used: compiled.stack_used,
                    span: def.span,
                });
                self.functions.push(compiled);
                Ok(())
            }
            Err(error) if self.config.errors_as_warnings && error.is_user_error() => {
                warn!("`{}` packed without a body: {error}", def.name.name);
                self.pool.abandon_function(stub.id, since)?;
                self.source_map.push(SourceMapEntry {
                    name: def.name.name.clone(),
                    kind: FunctionKind::Abandoned,
                    descriptor_pos: stub.pos().offset(),
                    opcodes_pos: 0,
                    opcodes_len: 0,
                    stack_used: 0,
                    span: def.span,
                });
                self.warnings.push(CodegenWarning {
                    function: def.name.name.clone(),
                    error,
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
