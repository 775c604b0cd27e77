//! Expression lowering.
//!
//! Every expression is lowered into a target region the caller allocated
//! with exactly the expression's static size. Subexpressions whose value
//! the parent needs go into fresh stack regions, except plain variable
//! references, which are read where they already live.

use fen_types::ast::*;
use fen_types::MemoryOffset;
use log::trace;

use crate::code::Code;
use crate::constants::ConstantKind;
use crate::control::{emit_case_literal, emit_case_union, emit_guard, emit_if, emit_logical};
use crate::error::{CodegenError, CodegenResult};
use crate::function::FuncContext;
use crate::instruction::{ArgumentSlot, Command, Instruction};
use crate::layout::{SourceStackRange, StackSize, TargetStackRange};
use crate::scope::ScopeVariables;
use crate::types::FRAME_ALIGN;

/// Lower `expr` into `target`.
pub fn emit_expr(
    expr: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    check_target(expr, target)?;
    trace!("lower {} into {target}", expr.kind_name());

    match &expr.kind {
        // ── Literals ──────────────────────────────────────────────────────
        ExprKind::IntLit(value) | ExprKind::FixedLit(value) => {
            code.emit(Instruction::LoadInteger {
                dest: target.pos,
                value: *value,
            });
            Ok(())
        }
        ExprKind::BoolLit(value) => {
            code.emit(Instruction::LoadBool {
                dest: target.pos,
                value: *value,
            });
            Ok(())
        }
        ExprKind::CharLit(value) => {
            code.emit(Instruction::LoadRune {
                dest: target.pos,
                value: *value,
            });
            Ok(())
        }
        ExprKind::StringLit(s) => {
            let constant = ctx.pool.allocate_string(s)?;
            code.emit(Instruction::LoadZeroMemoryPointer {
                dest: target.pos,
                pointer: constant.pos(),
            });
            Ok(())
        }

        // ── References ───────────────────────────────────────────────────
        ExprKind::Variable(ident) => emit_variable(ident, expr, target, scope, code),
        ExprKind::FunctionRef(ident) => {
            let constant = ctx
                .pool
                .find_callable(&ident.name)
                .ok_or_else(|| CodegenError::FunctionNotFound {
                    name: ident.name.clone(),
                    span: ident.span,
                })?;
            code.emit(Instruction::LoadZeroMemoryPointer {
                dest: target.pos,
                pointer: constant.pos(),
            });
            Ok(())
        }

        // ── Operators ────────────────────────────────────────────────────
        ExprKind::Binary { left, op, right } => match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                emit_logical(left, *op, right, target, scope, ctx, code)
            }
            _ => emit_binary(expr, left, *op, right, target, scope, ctx, code),
        },
        ExprKind::Unary { op, operand } => emit_unary(expr, *op, operand, target, scope, ctx, code),

        // ── Control flow ─────────────────────────────────────────────────
        ExprKind::If(if_expr) => emit_if(if_expr, target, scope, ctx, code),
        ExprKind::Guard(guard) => emit_guard(guard, target, scope, ctx, code),
        ExprKind::CaseUnion(case) => emit_case_union(case, target, scope, ctx, code),
        ExprKind::CaseLiteral(case) => emit_case_literal(case, target, scope, ctx, code),

        // ── Aggregates ───────────────────────────────────────────────────
        ExprKind::RecordLit(inits) => emit_record_lit(expr, inits, target, scope, ctx, code),
        ExprKind::RecordUpdate { base, updates } => {
            emit_record_update(expr, base, updates, target, scope, ctx, code)
        }
        ExprKind::FieldAccess { base, path } => {
            emit_field_access(base, path, target, scope, ctx, code)
        }
        ExprKind::ListLit(items) => emit_collection(expr, items, false, target, scope, ctx, code),
        ExprKind::ArrayLit(items) => emit_collection(expr, items, true, target, scope, ctx, code),
        ExprKind::TupleLit(elements) => {
            for (index, element) in elements.iter().enumerate() {
                let field = expr.ty.field(&index.to_string()).ok_or_else(|| {
                    malformed_node(expr, format!("tuple has no element {index}"))
                })?;
                let slot = field_slot(target, field.offset, &field.ty)?;
                emit_expr(element, slot, scope, ctx, code)?;
            }
            Ok(())
        }
        ExprKind::VariantConstructor { variant, args } => {
            emit_variant(expr, variant, args, target, scope, ctx, code)
        }

        // ── Functions ────────────────────────────────────────────────────
        ExprKind::Call { function, args } => emit_call(function, args, target, scope, ctx, code),
        ExprKind::Recur(args) => emit_recur(expr, args, scope, ctx, code),
        ExprKind::Curry { function, args } => {
            emit_curry(expr, function, args, target, scope, ctx, code)
        }

        // ── Bindings ─────────────────────────────────────────────────────
        ExprKind::Let { bindings, body } => {
            let mut child = scope.make_child();
            for binding in bindings {
                let region = ctx.allocate_for(&binding.value.ty, &binding.name.name)?;
                emit_expr(&binding.value, region, &child, ctx, code)?;
                child.define(&binding.name.name, region.to_source(), binding.name.span)?;
            }
            emit_expr(body, target, &child, ctx, code)
        }

        // ── Desugared forms ──────────────────────────────────────────────
        ExprKind::Pipe(inner) | ExprKind::Interpolation(inner) => match inner {
            Some(inner) => emit_expr(inner, target, scope, ctx, code),
            None => Err(CodegenError::UnsupportedNode(format!(
                "{} without an expansion at {}",
                expr.kind_name(),
                expr.span
            ))),
        },
    }
}

/// Lower an operand and return where its value lives. Variables are read
/// in place; everything else goes to a fresh region.
pub fn emit_operand(
    expr: &Expr,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<SourceStackRange> {
    if let ExprKind::Variable(ident) = &expr.kind {
        let found = lookup(ident, scope)?;
        if found.size.as_u32() != expr.ty.size().0 {
            return Err(layout_mismatch(expr, found.size.as_u32()));
        }
        return Ok(found);
    }
    let region = ctx.allocate_for(&expr.ty, expr.kind_name())?;
    emit_expr(expr, region, scope, ctx, code)?;
    Ok(region.to_source())
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn check_target(expr: &Expr, target: TargetStackRange) -> CodegenResult<()> {
    if target.size.as_u32() != expr.ty.size().0 {
        return Err(layout_mismatch(expr, target.size.as_u32()));
    }
    Ok(())
}

fn layout_mismatch(expr: &Expr, actual: u32) -> CodegenError {
    CodegenError::LayoutMismatch {
        node: expr.kind_name(),
        target: actual,
        expected: expr.ty.size().0,
        span: expr.span,
    }
}

/// The decorated tree disagrees with its own types.
pub(crate) fn malformed_node(expr: &Expr, detail: String) -> CodegenError {
    CodegenError::UnsupportedNode(format!("{} at {}: {detail}", expr.kind_name(), expr.span))
}

fn lookup(ident: &Ident, scope: &ScopeVariables<'_>) -> CodegenResult<SourceStackRange> {
    scope
        .find(&ident.name)
        .ok_or_else(|| CodegenError::UnknownVariable {
            name: ident.name.clone(),
            span: ident.span,
        })
}

/// Sub-region of `target` for a field at `offset`.
pub(crate) fn field_slot(
    target: TargetStackRange,
    offset: MemoryOffset,
    ty: &Type,
) -> CodegenResult<TargetStackRange> {
    target.sub_range(offset, StackSize::from_memory_size(ty.size())?)
}

fn emit_variable(
    ident: &Ident,
    expr: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let found = lookup(ident, scope)?;
    if found.size != target.size {
        return Err(layout_mismatch(expr, found.size.as_u32()));
    }
    code.emit(Instruction::CopyMemory {
        dest: target.pos,
        source: found,
    });
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn binary_command(expr: &Expr, op: BinaryOp, operand: &Type) -> CodegenResult<Command> {
    let integer = operand.is_integer_like() || operand.kind == TypeKind::Char;
    let fixed = operand.kind == TypeKind::Fixed;
    let command = match op {
        BinaryOp::Add if integer => Command::IntAdd,
        BinaryOp::Subtract if integer => Command::IntSub,
        BinaryOp::Multiply if fixed => Command::FixedMul,
        BinaryOp::Divide if fixed => Command::FixedDiv,
        BinaryOp::Multiply if integer => Command::IntMul,
        BinaryOp::Divide if integer => Command::IntDiv,
        BinaryOp::Append if operand.kind == TypeKind::String => Command::StringAppend,
        BinaryOp::Append if matches!(operand.kind, TypeKind::List(_)) => Command::ListAppend,
        BinaryOp::Cons => Command::ListConj,
        BinaryOp::Equal if operand.is_integer_like() => Command::IntEqual,
        BinaryOp::NotEqual if operand.is_integer_like() => Command::IntNotEqual,
        BinaryOp::Equal => Command::ValueEqual,
        BinaryOp::NotEqual => Command::ValueNotEqual,
        BinaryOp::Less if operand.is_integer_like() => Command::IntLess,
        BinaryOp::LessOrEqual if operand.is_integer_like() => Command::IntLessOrEqual,
        BinaryOp::Greater if operand.is_integer_like() => Command::IntGreater,
        BinaryOp::GreaterOrEqual if operand.is_integer_like() => Command::IntGreaterOrEqual,
        BinaryOp::BitwiseAnd if operand.kind == TypeKind::Int => Command::IntBitwiseAnd,
        BinaryOp::BitwiseOr if operand.kind == TypeKind::Int => Command::IntBitwiseOr,
        BinaryOp::BitwiseXor if operand.kind == TypeKind::Int => Command::IntBitwiseXor,
        _ => {
            return Err(malformed_node(
                expr,
                format!("operator {op:?} is not defined on {operand}"),
            ))
        }
    };
    Ok(command)
}

#[allow(clippy::too_many_arguments)]
fn emit_binary(
    expr: &Expr,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    // `::` dispatches on the list, every other operator on its left operand.
    let operand_ty = if op == BinaryOp::Cons { &right.ty } else { &left.ty };
    let command = binary_command(expr, op, operand_ty)?;

    let a = emit_operand(left, scope, ctx, code)?;
    let b = emit_operand(right, scope, ctx, code)?;

    if command.is_value_compare() {
        code.emit(Instruction::ValueCompare {
            command,
            dest: target.pos,
            a: a.pos,
            b: b.pos,
            size: a.size,
        });
    } else {
        code.emit(Instruction::BinaryOperator {
            command,
            dest: target.pos,
            a: a.pos,
            b: b.pos,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_unary(
    expr: &Expr,
    op: UnaryOp,
    operand: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let command = match op {
        UnaryOp::Negate if operand.ty.is_integer_like() => Command::IntNegate,
        UnaryOp::Not if operand.ty.kind == TypeKind::Bool => Command::BoolLogicalNot,
        UnaryOp::BitwiseNot if operand.ty.kind == TypeKind::Int => Command::IntBitwiseNot,
        _ => {
            return Err(malformed_node(
                expr,
                format!("operator {op:?} is not defined on {}", operand.ty),
            ))
        }
    };
    let source = emit_operand(operand, scope, ctx, code)?;
    code.emit(Instruction::UnaryOperator {
        command,
        dest: target.pos,
        source: source.pos,
    });
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Aggregates
// ══════════════════════════════════════════════════════════════════════════════

fn emit_record_lit(
    expr: &Expr,
    inits: &[FieldInit],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    if inits.len() != expr.ty.fields().len() {
        return Err(malformed_node(
            expr,
            format!("{} initializers for {}", inits.len(), expr.ty),
        ));
    }
    // Type order, so output does not depend on source order.
    for field in expr.ty.fields() {
        let init = inits
            .iter()
            .find(|i| i.name.name == field.name)
            .ok_or_else(|| malformed_node(expr, format!("field `{}` not initialized", field.name)))?;
        let slot = field_slot(target, field.offset, &field.ty)?;
        emit_expr(&init.value, slot, scope, ctx, code)?;
    }
    Ok(())
}

fn emit_record_update(
    expr: &Expr,
    base: &Expr,
    updates: &[FieldInit],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let source = emit_operand(base, scope, ctx, code)?;
    code.emit(Instruction::CopyMemory {
        dest: target.pos,
        source,
    });
    for update in updates {
        let field = expr.ty.field(&update.name.name).ok_or_else(|| {
            malformed_node(expr, format!("{} has no field `{}`", expr.ty, update.name.name))
        })?;
        let slot = field_slot(target, field.offset, &field.ty)?;
        emit_expr(&update.value, slot, scope, ctx, code)?;
    }
    Ok(())
}

fn emit_field_access(
    base: &Expr,
    path: &[Ident],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let mut ty = &base.ty;
    let mut offset = MemoryOffset(0);
    for name in path {
        let field = ty
            .field(&name.name)
            .ok_or_else(|| malformed_node(base, format!("{ty} has no field `{}`", name.name)))?;
        offset = offset
            .0
            .checked_add(field.offset.0)
            .map(MemoryOffset)
            .ok_or_else(|| malformed_node(base, format!("offset of `{}` overflows", name.name)))?;
        ty = &field.ty;
    }

    let record = emit_operand(base, scope, ctx, code)?;
    let source = record.sub_range(offset, StackSize::from_memory_size(ty.size())?)?;
    code.emit(Instruction::CopyMemory {
        dest: target.pos,
        source,
    });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_collection(
    expr: &Expr,
    items: &[Expr],
    array: bool,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let item_ty = expr
        .ty
        .item()
        .ok_or_else(|| malformed_node(expr, format!("{} is not a collection", expr.ty)))?;
    if items.len() > usize::from(u8::MAX) {
        return Err(CodegenError::LimitExceeded(format!(
            "{} with {} elements at {} (max 255)",
            expr.kind_name(),
            items.len(),
            expr.span
        )));
    }
    let item_size = StackSize::from_memory_size(item_ty.size())?;

    // Regions first, so the elements sit side by side.
    let regions = items
        .iter()
        .map(|_| ctx.allocate_for(item_ty, "item"))
        .collect::<CodegenResult<Vec<_>>>()?;
    for (item, region) in items.iter().zip(&regions) {
        emit_expr(item, *region, scope, ctx, code)?;
    }

    let items = regions.iter().map(|r| r.to_source().pos).collect();
    let align = item_ty.align();
    code.emit(if array {
        Instruction::CreateArray {
            dest: target.pos,
            item_size,
            align,
            items,
        }
    } else {
        Instruction::CreateList {
            dest: target.pos,
            item_size,
            align,
            items,
        }
    });
    Ok(())
}

fn emit_variant(
    expr: &Expr,
    variant: &Ident,
    args: &[Expr],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let layout = expr
        .ty
        .variant(&variant.name)
        .ok_or_else(|| malformed_node(expr, format!("{} has no variant `{}`", expr.ty, variant.name)))?;
    if layout.fields.len() != args.len() {
        return Err(malformed_node(
            expr,
            format!(
                "variant `{}` takes {} values, got {}",
                variant.name,
                layout.fields.len(),
                args.len()
            ),
        ));
    }

    code.emit(Instruction::LoadRune {
        dest: target.pos,
        value: layout.tag,
    });
    for (field, arg) in layout.fields.iter().zip(args) {
        let slot = field_slot(target, field.offset, &field.ty)?;
        emit_expr(arg, slot, scope, ctx, code)?;
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

fn function_type<'e>(function: &'e Expr) -> CodegenResult<&'e FunctionType> {
    function
        .ty
        .as_function()
        .ok_or_else(|| CodegenError::NotAFunction {
            found: function.ty.to_string(),
            span: function.span,
        })
}

/// Allocate adjacent regions for `args`, then lower each into its own.
fn emit_argument_block(
    args: &[Expr],
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<Vec<TargetStackRange>> {
    let regions = args
        .iter()
        .map(|arg| ctx.allocate_for(&arg.ty, "arg"))
        .collect::<CodegenResult<Vec<_>>>()?;
    for (arg, region) in args.iter().zip(&regions) {
        emit_expr(arg, *region, scope, ctx, code)?;
    }
    Ok(regions)
}

fn emit_call(
    function: &Expr,
    args: &[Expr],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let signature = function_type(function)?;
    if signature.params.len() != args.len() {
        return Err(malformed_node(
            function,
            format!(
                "call passes {} arguments to `{}`",
                args.len(),
                function.ty
            ),
        ));
    }
    for (arg, param) in args.iter().zip(&signature.params) {
        if arg.ty.size() != param.size() {
            return Err(malformed_node(
                arg,
                format!("argument of type {} passed for {param}", arg.ty),
            ));
        }
    }
    if signature.ret.size().0 != target.size.as_u32() {
        return Err(malformed_node(
            function,
            format!(
                "returns {} octets into a {}-octet region",
                signature.ret.size().0,
                target.size.get()
            ),
        ));
    }
    let external = match &function.kind {
        ExprKind::FunctionRef(ident) => ctx
            .pool
            .find_callable(&ident.name)
            .is_some_and(|c| c.kind == ConstantKind::ExternalFunction),
        _ => false,
    };

    let mark = ctx.stack.cursor();
    let callee = emit_operand(function, scope, ctx, code)?;
    let ret = ctx
        .stack
        .allocate_sized(signature.ret.size(), FRAME_ALIGN, "call return")?;
    let regions = emit_argument_block(args, scope, ctx, code)?;

    if external {
        let slots = regions
            .iter()
            .map(|r| {
                let offset = u16::try_from(r.pos.0 - ret.pos.0).map_err(|_| {
                    CodegenError::LimitExceeded("external argument block over 65535 octets".into())
                })?;
                Ok(ArgumentSlot {
                    offset,
                    size: r.size,
                })
            })
            .collect::<CodegenResult<Vec<_>>>()?;
        if slots.len() > usize::from(u8::MAX) {
            return Err(CodegenError::LimitExceeded(format!(
                "{} external call arguments (max 255)",
                slots.len()
            )));
        }
        code.emit(Instruction::CallExternal {
            new_base: ret.pos,
            function: callee.pos,
            args: slots,
        });
    } else {
        code.emit(Instruction::Call {
            new_base: ret.pos,
            function: callee.pos,
        });
    }

    code.emit(Instruction::CopyMemory {
        dest: target.pos,
        source: ret.to_source(),
    });
    ctx.stack.set(mark)
}

fn emit_recur(
    expr: &Expr,
    args: &[Expr],
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    if args.len() != ctx.params.len() {
        return Err(malformed_node(
            expr,
            format!(
                "`{}` takes {} arguments, recur passes {}",
                ctx.name,
                ctx.params.len(),
                args.len()
            ),
        ));
    }

    // Every new value is computed into a temporary before any parameter is
    // overwritten, so `recur b a` swaps correctly.
    let mark = ctx.stack.cursor();
    let params = ctx.params.clone();
    let mut moves = Vec::with_capacity(args.len());
    for (param, arg) in params.iter().zip(args) {
        if let ExprKind::Variable(ident) = &arg.kind {
            if scope.find(&ident.name) == Some(param.to_source()) {
                continue;
            }
        }
        let temporary = ctx.allocate_for(&arg.ty, "recur arg")?;
        if temporary.size != param.size {
            return Err(malformed_node(expr, "recur argument size differs from parameter".into()));
        }
        emit_expr(arg, temporary, scope, ctx, code)?;
        moves.push((param.pos, temporary.to_source()));
    }
    for (dest, source) in moves {
        code.emit(Instruction::CopyMemory { dest, source });
    }
    code.emit(Instruction::TailCall);
    ctx.stack.set(mark)
}

#[allow(clippy::too_many_arguments)]
fn emit_curry(
    expr: &Expr,
    function: &Expr,
    args: &[Expr],
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    function_type(function)?;
    let result = function_type(expr)?;
    if args.is_empty() {
        return Err(malformed_node(expr, "partial application without arguments".into()));
    }

    let callee = emit_operand(function, scope, ctx, code)?;
    let regions = emit_argument_block(args, scope, ctx, code)?;

    let (first, last) = match (regions.first(), regions.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(CodegenError::Internal("empty curry argument block".into())),
    };
    let total = u16::try_from(last.end() - first.pos.0).map_err(|_| {
        CodegenError::LimitExceeded("curried arguments over 65535 octets".into())
    })?;

    code.emit(Instruction::Curry {
        dest: target.pos,
        type_id: result.type_id,
        function: callee.pos,
        args: SourceStackRange::new(first.pos.0, StackSize::new(total)?),
    });
    Ok(())
}
