//! Control flow lowering: short-circuit operators, `if`, guards and `case`.
//!
//! Every construct writes its result into the caller's target; branches
//! only decide which body writes it.

use fen_types::ast::*;

use crate::code::{Code, LabelId};
use crate::error::{CodegenError, CodegenResult};
use crate::expr::{emit_expr, emit_operand, malformed_node};
use crate::function::FuncContext;
use crate::instruction::{EnumArm, Instruction, IntArm, StringArm};
use crate::layout::{SourceStackRange, StackSize, TargetStackRange};
use crate::scope::ScopeVariables;
use crate::types::ENUM_DEFAULT_TAG;

/// `&&` / `||`: the left value is the result unless it decides nothing.
pub fn emit_logical(
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let after = code.create_label("after");
    emit_expr(left, target, scope, ctx, code)?;
    let test = target.to_source().pos;
    code.emit(if op == BinaryOp::LogicalAnd {
        Instruction::BranchFalse { test, label: after }
    } else {
        Instruction::BranchTrue { test, label: after }
    });
    emit_expr(right, target, scope, ctx, code)?;
    code.place_label(after);
    Ok(())
}

pub fn emit_if(
    if_expr: &IfExpr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let else_label = code.create_label("else");
    let end_label = code.create_label("end");

    let condition = emit_operand(&if_expr.condition, scope, ctx, code)?;
    code.emit(Instruction::BranchFalse {
        test: condition.pos,
        label: else_label,
    });
    emit_expr(&if_expr.then_branch, target, &scope.make_child(), ctx, code)?;
    code.emit(Instruction::Jump { label: end_label });
    code.place_label(else_label);
    emit_expr(&if_expr.else_branch, target, &scope.make_child(), ctx, code)?;
    code.place_label(end_label);
    Ok(())
}

pub fn emit_guard(
    guard: &GuardExpr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let end_label = code.create_label("guard_end");
    for arm in &guard.arms {
        let next = code.create_label("guard_next");
        let condition = emit_operand(&arm.condition, scope, ctx, code)?;
        code.emit(Instruction::BranchFalse {
            test: condition.pos,
            label: next,
        });
        emit_expr(&arm.body, target, &scope.make_child(), ctx, code)?;
        code.emit(Instruction::Jump { label: end_label });
        code.place_label(next);
    }
    emit_expr(&guard.default, target, &scope.make_child(), ctx, code)?;
    code.place_label(end_label);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// case
// ══════════════════════════════════════════════════════════════════════════════

/// Dispatch on a union tag. Payload bindings are views into the subject's
/// region, not copies.
pub fn emit_case_union(
    case: &CaseUnionExpr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let subject_expr = case.subject.as_ref();
    let subject = emit_operand(subject_expr, scope, ctx, code)?;

    let mut arms: Vec<(EnumArm<LabelId>, Option<&UnionArm>)> = Vec::new();
    for arm in &case.arms {
        let variant = subject_expr.ty.variant(&arm.variant.name).ok_or_else(|| {
            malformed_node(
                subject_expr,
                format!("{} has no variant `{}`", subject_expr.ty, arm.variant.name),
            )
        })?;
        let label = code.create_label(&arm.variant.name);
        arms.push((
            EnumArm {
                tag: variant.tag,
                label,
            },
            Some(arm),
        ));
    }
    if case.default.is_some() {
        let label = code.create_label("default");
        arms.push((
            EnumArm {
                tag: ENUM_DEFAULT_TAG,
                label,
            },
            None,
        ));
    }
    if arms.is_empty() {
        return Err(malformed_node(subject_expr, "case without arms".into()));
    }

    let end_label = code.create_label("case_end");
    code.emit(Instruction::EnumCase {
        test: subject.pos,
        arms: arms.iter().map(|(arm, _)| *arm).collect(),
    });

    let last = arms.len() - 1;
    for (index, (arm, union_arm)) in arms.iter().enumerate() {
        code.place_label(arm.label);

        let mut child_scope = scope.make_child();
        let body = match union_arm {
            Some(union_arm) => {
                bind_payload(subject_expr, subject, union_arm, &mut child_scope)?;
                &union_arm.body
            }
            None => case
                .default
                .as_deref()
                .ok_or_else(|| CodegenError::Internal("default arm without body".into()))?,
        };

        emit_arm_body(body, target, &child_scope, ctx, code)?;
        if index != last {
            code.emit(Instruction::Jump { label: end_label });
        }
    }
    code.place_label(end_label);
    Ok(())
}

fn bind_payload(
    subject_expr: &Expr,
    subject: SourceStackRange,
    arm: &UnionArm,
    scope: &mut ScopeVariables<'_>,
) -> CodegenResult<()> {
    let variant = subject_expr
        .ty
        .variant(&arm.variant.name)
        .ok_or_else(|| CodegenError::Internal(format!("variant `{}` vanished", arm.variant.name)))?;
    if arm.bindings.len() > variant.fields.len() {
        return Err(malformed_node(
            subject_expr,
            format!(
                "variant `{}` has {} fields, pattern binds {}",
                variant.name,
                variant.fields.len(),
                arm.bindings.len()
            ),
        ));
    }
    for (binding, field) in arm.bindings.iter().zip(&variant.fields) {
        if let Some(name) = binding {
            let view = subject.sub_range(field.offset, StackSize::from_memory_size(field.ty.size())?)?;
            scope.define(&name.name, view, name.span)?;
        }
    }
    Ok(())
}

/// Dispatch on an integer, rune or string literal. The default arm is
/// always present and comes last.
pub fn emit_case_literal(
    case: &CaseLiteralExpr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let subject_expr = case.subject.as_ref();
    let subject = emit_operand(subject_expr, scope, ctx, code)?;

    let labels: Vec<LabelId> = case
        .arms
        .iter()
        .map(|_| code.create_label("arm"))
        .collect();
    let default_label = code.create_label("default");
    let end_label = code.create_label("match_end");

    let strings = matches!(subject_expr.ty.kind, TypeKind::String);
    if strings {
        let mut arms = Vec::with_capacity(case.arms.len());
        for (arm, label) in case.arms.iter().zip(&labels) {
            let LiteralPattern::String(s) = &arm.pattern else {
                return Err(malformed_node(subject_expr, "non-string pattern on a string".into()));
            };
            let constant = ctx.pool.allocate_string(s)?;
            arms.push(StringArm {
                header: constant.pos(),
                label: *label,
            });
        }
        code.emit(Instruction::PatternMatchingString {
            test: subject.pos,
            arms,
            default: default_label,
        });
    } else {
        let mut arms = Vec::with_capacity(case.arms.len());
        for (arm, label) in case.arms.iter().zip(&labels) {
            let value = match &arm.pattern {
                LiteralPattern::Int(v) => *v,
                LiteralPattern::Char(c) => i32::from(*c),
                LiteralPattern::String(_) => {
                    return Err(malformed_node(
                        subject_expr,
                        format!("string pattern on {}", subject_expr.ty),
                    ))
                }
            };
            arms.push(IntArm {
                value,
                label: *label,
            });
        }
        code.emit(Instruction::PatternMatchingInt {
            test: subject.pos,
            arms,
            default: default_label,
        });
    }

    for (arm, label) in case.arms.iter().zip(&labels) {
        code.place_label(*label);
        emit_arm_body(&arm.body, target, &scope.make_child(), ctx, code)?;
        code.emit(Instruction::Jump { label: end_label });
    }
    code.place_label(default_label);
    emit_arm_body(&case.default, target, &scope.make_child(), ctx, code)?;
    code.place_label(end_label);
    Ok(())
}

/// Lower one `case` arm into its own buffer and append it to `code`.
fn emit_arm_body(
    body: &Expr,
    target: TargetStackRange,
    scope: &ScopeVariables<'_>,
    ctx: &mut FuncContext<'_>,
    code: &mut Code,
) -> CodegenResult<()> {
    let mut body_code = Code::new();
    emit_expr(body, target, scope, ctx, &mut body_code)?;
    code.merge(body_code)
}
