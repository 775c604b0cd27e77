//! Function emitter.
//!
//! Lays out the call frame, lowers the body into the return region,
//! appends `Return`, assembles the code and patches the function's
//! descriptor in the constant pool.
//!
//! Frame layout at the base pointer (the call ABI):
//!
//! ```text
//! [ return | arg₁ | arg₂ | … | argₙ | temporaries … ]
//! ```
//!
//! Each argument sits at the next offset aligned to its own type, exactly
//! as a call site lays out its argument block after an 8-aligned return
//! region.

use fen_types::ast::{FunctionDef, Param, Type};
use log::{debug, log_enabled, trace, Level};

use crate::code::{Assembled, Code};
use crate::config::CodegenConfig;
use crate::constants::{Constant, ConstantPool, FunctionAbi, FunctionMetadata};
use crate::disasm;
use crate::error::{CodegenError, CodegenResult};
use crate::expr::emit_expr;
use crate::instruction::Instruction;
use crate::layout::{TargetStackRange, ZeroMemoryPos};
use crate::arena::DynamicMemoryRange;
use crate::scope::ScopeVariables;
use crate::stack::StackAllocator;
use crate::types::FRAME_ALIGN;

// ══════════════════════════════════════════════════════════════════════════════
// FuncContext: per-function lowering state
// ══════════════════════════════════════════════════════════════════════════════

/// State shared by every lowering call inside one function body.
pub struct FuncContext<'c> {
    /// Fully qualified name of the function being lowered.
    pub name: String,
    pub pool: &'c mut ConstantPool,
    pub stack: StackAllocator,
    /// Parameter regions; `recur` copies new arguments into them.
    pub params: Vec<TargetStackRange>,
}

impl<'c> FuncContext<'c> {
    pub fn new(name: &str, pool: &'c mut ConstantPool, stack: StackAllocator) -> Self {
        Self {
            name: name.to_string(),
            pool,
            stack,
            params: Vec::new(),
        }
    }

    /// A fresh region sized and aligned for `ty`.
    pub fn allocate_for(&mut self, ty: &Type, tag: &str) -> CodegenResult<TargetStackRange> {
        self.stack.allocate_sized(ty.size(), ty.align(), tag)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Frame layout
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub ret: TargetStackRange,
    pub params: Vec<TargetStackRange>,
}

impl FrameLayout {
    /// Allocate the return region and parameters at the bottom of `stack`.
    pub fn allocate(
        stack: &mut StackAllocator,
        return_type: &Type,
        params: &[Param],
    ) -> CodegenResult<Self> {
        let ret = stack.allocate_sized(return_type.size(), FRAME_ALIGN, "return")?;
        let params = params
            .iter()
            .map(|p| stack.allocate_sized(p.ty.size(), p.ty.align(), &p.name.name))
            .collect::<CodegenResult<Vec<_>>>()?;
        Ok(Self { ret, params })
    }

    pub fn abi(&self) -> FunctionAbi {
        let params_end = self.params.last().map_or(self.ret.end(), |p| p.end());
        FunctionAbi {
            return_octet_size: self.ret.size.as_u32(),
            parameter_count: self.params.len() as u32,
            parameter_octet_size: params_end - self.ret.end(),
        }
    }
}

/// ABI of a signature, without lowering anything.
pub fn signature_abi(return_type: &Type, params: &[Param]) -> CodegenResult<FunctionAbi> {
    let mut scratch = StackAllocator::new(u32::MAX);
    Ok(FrameLayout::allocate(&mut scratch, return_type, params)?.abi())
}

// ══════════════════════════════════════════════════════════════════════════════
// Emission
// ══════════════════════════════════════════════════════════════════════════════

/// A lowered but not yet finalized function.
#[derive(Debug, Clone)]
pub struct LoweredFunction {
    pub code: Code,
    pub frame: FrameLayout,
    pub stack_used: u32,
}

/// A function whose descriptor has been patched.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub descriptor: ZeroMemoryPos,
    pub opcodes: DynamicMemoryRange,
    pub stack_used: u32,
    pub octets: Vec<u8>,
    /// The emitted instructions with labels resolved to program counters.
    pub instructions: Vec<Instruction<u16>>,
}

/// Lower a function body into a code buffer terminated by `Return`.
pub fn lower_function(
    def: &FunctionDef,
    pool: &mut ConstantPool,
    config: &CodegenConfig,
) -> CodegenResult<LoweredFunction> {
    let mut stack = StackAllocator::new(config.stack_capacity);
    let frame = FrameLayout::allocate(&mut stack, &def.return_type, &def.params)?;

    let mut scope = ScopeVariables::new();
    for (param, range) in def.params.iter().zip(&frame.params) {
        scope.define(&param.name.name, range.to_source(), param.name.span)?;
    }

    let mut ctx = FuncContext::new(&def.name.name, pool, stack);
    ctx.params = frame.params.clone();

    let mut code = Code::new();
    emit_expr(&def.body, frame.ret, &scope, &mut ctx, &mut code)?;
    code.emit(Instruction::Return);

    Ok(LoweredFunction {
        code,
        stack_used: ctx.stack.high_water_mark(),
        frame,
    })
}

/// Lower, assemble and finalize `def` into the stub `constant`.
pub fn emit_function(
    def: &FunctionDef,
    constant: &Constant,
    pool: &mut ConstantPool,
    config: &CodegenConfig,
) -> CodegenResult<CompiledFunction> {
    let lowered = lower_function(def, pool, config)?;
    if lowered.frame.abi() != constant.abi() {
        return Err(CodegenError::Internal(format!(
            "frame of `{}` does not match its registered signature",
            def.name.name
        )));
    }

    let assembled: Assembled = lowered.code.serialize()?;
    let instructions = lowered.code.resolved(&assembled)?;
    let opcodes = pool.finalize_function(
        constant.id,
        &assembled.octets,
        FunctionMetadata {
            total_stack_used: lowered.stack_used,
            type_index: def.type_index,
        },
    )?;

    debug!(
        "compiled `{}`: {} opcode octets, stack {}",
        def.name.name,
        assembled.octets.len(),
        lowered.stack_used
    );
    if log_enabled!(Level::Trace) {
        if let Ok(text) = disasm::listing(&assembled.octets) {
            trace!("`{}`:\n{text}", def.name.name);
        }
    }

    Ok(CompiledFunction {
        name: def.name.name.clone(),
        descriptor: constant.pos(),
        opcodes,
        stack_used: lowered.stack_used,
        octets: assembled.octets,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fen_types::ast::{Expr, TypeId};
    use fen_types::Span;

    use crate::types::*;

    fn def(name: &str, params: Vec<Param>, return_type: Type, body: Expr) -> FunctionDef {
        FunctionDef {
            name: fen_types::ast::Ident::new(name, Span::synthetic()),
            params,
            return_type,
            type_index: TypeId(0),
            body,
            span: Span::synthetic(),
        }
    }

    fn pool() -> ConstantPool {
        ConstantPool::new(DEFAULT_ZERO_MEMORY_CAPACITY, DEFAULT_DYNAMIC_MEMORY_CAPACITY)
    }

    #[test]
    fn test_frame_layout_follows_call_abi() {
        let mut stack = StackAllocator::new(1024);
        let frame = FrameLayout::allocate(
            &mut stack,
            &Type::bool(),
            &[Param::new("a", Type::bool()), Param::new("n", Type::int())],
        )
        .unwrap();
        assert_eq!(frame.ret.pos.0, 0);
        assert_eq!(frame.params[0].pos.0, 1);
        assert_eq!(frame.params[1].pos.0, 4);
        assert_eq!(
            frame.abi(),
            FunctionAbi {
                return_octet_size: 1,
                parameter_count: 2,
                parameter_octet_size: 7,
            }
        );
    }

    #[test]
    fn test_identity_function() {
        let mut pool = pool();
        let f = def(
            "main.id",
            vec![Param::new("x", Type::int())],
            Type::int(),
            Expr::var("x", Type::int()),
        );
        let abi = signature_abi(&f.return_type, &f.params).unwrap();
        let stub = pool.allocate_function_stub("main.id", abi).unwrap();
        let compiled = emit_function(&f, &stub, &mut pool, &CodegenConfig::default()).unwrap();
        // CopyMemory $0 <- $4:4 ; Return
        assert_eq!(
            compiled.octets,
            vec![0x2a, 0, 0, 0, 0, 4, 0, 0, 0, 4, 0, 0x0a]
        );
        assert_eq!(compiled.stack_used, 8);
        pool.check_patched().unwrap();
    }

    #[test]
    fn test_unknown_variable_aborts_function() {
        let mut pool = pool();
        let f = def("main.bad", vec![], Type::int(), Expr::var("ghost", Type::int()));
        let err = lower_function(&f, &mut pool, &CodegenConfig::default()).unwrap_err();
        assert!(matches!(err, CodegenError::UnknownVariable { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut pool = pool();
        let f = def(
            "main.dup",
            vec![Param::new("x", Type::int()), Param::new("x", Type::int())],
            Type::int(),
            Expr::int(0),
        );
        assert!(matches!(
            lower_function(&f, &mut pool, &CodegenConfig::default()),
            Err(CodegenError::VariableRedefined { .. })
        ));
    }

    #[test]
    fn test_stack_capacity_respected() {
        let mut pool = pool();
        let config = CodegenConfig {
            stack_capacity: 2,
            ..CodegenConfig::default()
        };
        let f = def("main.big", vec![], Type::int(), Expr::int(1));
        assert!(matches!(
            lower_function(&f, &mut pool, &config),
            Err(CodegenError::StackOverflow { .. })
        ));
    }
}
