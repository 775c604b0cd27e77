//! Abstract instruction set of the stack VM.
//!
//! Instructions are plain data. The label type `L` is a parameter: the
//! lowerer emits `Instruction<LabelId>` and the disassembler decodes into
//! `Instruction<u16>` with absolute program counters, so both sides can be
//! compared directly.
//!
//! Serialization goes through [`OpcodeWriter`], which receives the
//! fundamental operand units in encoding order. The label assembler is one
//! implementation of it.

use std::fmt;

use fen_types::ast::TypeId;
use fen_types::{MemoryAlign, MemoryOffset};

use crate::error::{CodegenError, CodegenResult};
use crate::layout::{SourceStackPos, SourceStackRange, StackSize, TargetStackPos, ZeroMemoryPos};
use crate::types::ENUM_DEFAULT_TAG;

// ══════════════════════════════════════════════════════════════════════════════
// Commands
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Reserved; no instruction shape emits it.
    CreateStruct = 0x01,
    UpdateStruct = 0x02,
    LoadInteger = 0x03,
    LoadBool = 0x04,
    ListConj = 0x05,
    EnumCase = 0x06,
    BranchFalse = 0x07,
    Jump = 0x08,
    Call = 0x09,
    Return = 0x0a,
    CallExternal = 0x0b,
    TailCall = 0x0c,
    IntAdd = 0x0d,
    IntSub = 0x0e,
    IntMul = 0x0f,
    IntDiv = 0x10,
    IntEqual = 0x11,
    IntNotEqual = 0x12,
    IntLess = 0x13,
    IntLessOrEqual = 0x14,
    IntGreater = 0x15,
    IntGreaterOrEqual = 0x16,
    IntBitwiseAnd = 0x17,
    IntBitwiseOr = 0x18,
    IntBitwiseXor = 0x19,
    IntBitwiseNot = 0x1a,
    BoolLogicalNot = 0x1b,
    BranchTrue = 0x1c,
    PatternMatchingInt = 0x1d,
    ValueEqual = 0x1e,
    ValueNotEqual = 0x1f,
    Curry = 0x20,
    CreateList = 0x21,
    ListAppend = 0x22,
    /// Reserved; variant construction writes the union in place.
    CreateEnum = 0x23,
    StringAppend = 0x24,
    FixedMul = 0x25,
    FixedDiv = 0x26,
    IntNegate = 0x27,
    LoadRune = 0x28,
    CreateArray = 0x29,
    CopyMemory = 0x2a,
    LoadZeroMemoryPointer = 0x2b,
    PatternMatchingString = 0x2c,
}

impl Command {
    const ALL: [Command; 44] = [
        Self::CreateStruct,
        Self::UpdateStruct,
        Self::LoadInteger,
        Self::LoadBool,
        Self::ListConj,
        Self::EnumCase,
        Self::BranchFalse,
        Self::Jump,
        Self::Call,
        Self::Return,
        Self::CallExternal,
        Self::TailCall,
        Self::IntAdd,
        Self::IntSub,
        Self::IntMul,
        Self::IntDiv,
        Self::IntEqual,
        Self::IntNotEqual,
        Self::IntLess,
        Self::IntLessOrEqual,
        Self::IntGreater,
        Self::IntGreaterOrEqual,
        Self::IntBitwiseAnd,
        Self::IntBitwiseOr,
        Self::IntBitwiseXor,
        Self::IntBitwiseNot,
        Self::BoolLogicalNot,
        Self::BranchTrue,
        Self::PatternMatchingInt,
        Self::ValueEqual,
        Self::ValueNotEqual,
        Self::Curry,
        Self::CreateList,
        Self::ListAppend,
        Self::CreateEnum,
        Self::StringAppend,
        Self::FixedMul,
        Self::FixedDiv,
        Self::IntNegate,
        Self::LoadRune,
        Self::CreateArray,
        Self::CopyMemory,
        Self::LoadZeroMemoryPointer,
        Self::PatternMatchingString,
    ];

    pub fn from_u8(octet: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == octet)
    }

    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// `dest a b` operators.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::IntAdd
                | Self::IntSub
                | Self::IntMul
                | Self::IntDiv
                | Self::IntEqual
                | Self::IntNotEqual
                | Self::IntLess
                | Self::IntLessOrEqual
                | Self::IntGreater
                | Self::IntGreaterOrEqual
                | Self::IntBitwiseAnd
                | Self::IntBitwiseOr
                | Self::IntBitwiseXor
                | Self::FixedMul
                | Self::FixedDiv
                | Self::ListConj
                | Self::ListAppend
                | Self::StringAppend
        )
    }

    /// `dest src` operators.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::IntNegate | Self::IntBitwiseNot | Self::BoolLogicalNot
        )
    }

    pub fn is_value_compare(self) -> bool {
        matches!(self, Self::ValueEqual | Self::ValueNotEqual)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Instructions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumArm<L> {
    /// Variant tag, or `0xFF` for the default arm.
    pub tag: u8,
    pub label: L,
}

impl<L> EnumArm<L> {
    pub fn is_default(&self) -> bool {
        self.tag == ENUM_DEFAULT_TAG
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntArm<L> {
    pub value: i32,
    pub label: L,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringArm<L> {
    /// Header of the string constant to compare against.
    pub header: ZeroMemoryPos,
    pub label: L,
}

/// One argument of an external call, relative to the new base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSlot {
    pub offset: u16,
    pub size: StackSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUpdate {
    pub offset: u16,
    pub source: SourceStackRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction<L> {
    LoadInteger {
        dest: TargetStackPos,
        value: i32,
    },
    LoadBool {
        dest: TargetStackPos,
        value: bool,
    },
    LoadRune {
        dest: TargetStackPos,
        value: u8,
    },
    LoadZeroMemoryPointer {
        dest: TargetStackPos,
        pointer: ZeroMemoryPos,
    },
    CopyMemory {
        dest: TargetStackPos,
        source: SourceStackRange,
    },
    BinaryOperator {
        command: Command,
        dest: TargetStackPos,
        a: SourceStackPos,
        b: SourceStackPos,
    },
    UnaryOperator {
        command: Command,
        dest: TargetStackPos,
        source: SourceStackPos,
    },
    /// `ValueEqual` / `ValueNotEqual` over inline regions of `size` octets.
    ValueCompare {
        command: Command,
        dest: TargetStackPos,
        a: SourceStackPos,
        b: SourceStackPos,
        size: StackSize,
    },
    BranchFalse {
        test: SourceStackPos,
        label: L,
    },
    BranchTrue {
        test: SourceStackPos,
        label: L,
    },
    Jump {
        label: L,
    },
    EnumCase {
        test: SourceStackPos,
        arms: Vec<EnumArm<L>>,
    },
    PatternMatchingInt {
        test: SourceStackPos,
        arms: Vec<IntArm<L>>,
        default: L,
    },
    PatternMatchingString {
        test: SourceStackPos,
        arms: Vec<StringArm<L>>,
        default: L,
    },
    CreateList {
        dest: TargetStackPos,
        item_size: StackSize,
        align: MemoryAlign,
        items: Vec<SourceStackPos>,
    },
    CreateArray {
        dest: TargetStackPos,
        item_size: StackSize,
        align: MemoryAlign,
        items: Vec<SourceStackPos>,
    },
    Call {
        new_base: TargetStackPos,
        function: SourceStackPos,
    },
    CallExternal {
        new_base: TargetStackPos,
        function: SourceStackPos,
        args: Vec<ArgumentSlot>,
    },
    TailCall,
    Return,
    Curry {
        dest: TargetStackPos,
        type_id: TypeId,
        function: SourceStackPos,
        args: SourceStackRange,
    },
    UpdateStruct {
        dest: TargetStackPos,
        source: SourceStackRange,
        fields: Vec<FieldUpdate>,
    },
}

/// Receives operand units in encoding order.
pub trait OpcodeWriter<L> {
    fn command(&mut self, command: Command);
    fn target_stack_pos(&mut self, pos: TargetStackPos);
    fn source_stack_pos(&mut self, pos: SourceStackPos);
    fn stack_size(&mut self, size: StackSize);
    fn zero_memory_pos(&mut self, pos: ZeroMemoryPos);
    fn field_offset(&mut self, offset: u16);
    fn boolean(&mut self, value: bool);
    fn rune(&mut self, value: u8);
    fn int32(&mut self, value: i32);
    fn count(&mut self, count: u8);
    fn enum_value(&mut self, tag: u8);
    fn alignment(&mut self, align: MemoryAlign);
    /// Big-endian, unlike every other unit.
    fn type_id(&mut self, id: TypeId);
    /// Forward delta from the end of this field.
    fn label(&mut self, label: &L);
    /// Forward delta from the position `relative_to` resolves to.
    fn label_with_offset(&mut self, label: &L, relative_to: &L);
}

fn count_of(len: usize, what: &str) -> CodegenResult<u8> {
    u8::try_from(len).map_err(|_| CodegenError::LimitExceeded(format!("{len} {what} (max 255)")))
}

impl<L> Instruction<L> {
    pub fn command(&self) -> Command {
        match self {
            Self::LoadInteger { .. } => Command::LoadInteger,
            Self::LoadBool { .. } => Command::LoadBool,
            Self::LoadRune { .. } => Command::LoadRune,
            Self::LoadZeroMemoryPointer { .. } => Command::LoadZeroMemoryPointer,
            Self::CopyMemory { .. } => Command::CopyMemory,
            Self::BinaryOperator { command, .. }
            | Self::UnaryOperator { command, .. }
            | Self::ValueCompare { command, .. } => *command,
            Self::BranchFalse { .. } => Command::BranchFalse,
            Self::BranchTrue { .. } => Command::BranchTrue,
            Self::Jump { .. } => Command::Jump,
            Self::EnumCase { .. } => Command::EnumCase,
            Self::PatternMatchingInt { .. } => Command::PatternMatchingInt,
            Self::PatternMatchingString { .. } => Command::PatternMatchingString,
            Self::CreateList { .. } => Command::CreateList,
            Self::CreateArray { .. } => Command::CreateArray,
            Self::Call { .. } => Command::Call,
            Self::CallExternal { .. } => Command::CallExternal,
            Self::TailCall => Command::TailCall,
            Self::Return => Command::Return,
            Self::Curry { .. } => Command::Curry,
            Self::UpdateStruct { .. } => Command::UpdateStruct,
        }
    }

    /// Emit the encoding unit by unit.
    pub fn write<W: OpcodeWriter<L>>(&self, w: &mut W) -> CodegenResult<()> {
        let command = self.command();
        match self {
            Self::BinaryOperator { .. } if !command.is_binary() => {
                return Err(CodegenError::Internal(format!("{command} is not a binary operator")));
            }
            Self::UnaryOperator { .. } if !command.is_unary() => {
                return Err(CodegenError::Internal(format!("{command} is not a unary operator")));
            }
            Self::ValueCompare { .. } if !command.is_value_compare() => {
                return Err(CodegenError::Internal(format!("{command} is not a value comparison")));
            }
            _ => {}
        }
        w.command(command);

        match self {
            Self::LoadInteger { dest, value } => {
                w.target_stack_pos(*dest);
                w.int32(*value);
            }
            Self::LoadBool { dest, value } => {
                w.target_stack_pos(*dest);
                w.boolean(*value);
            }
            Self::LoadRune { dest, value } => {
                w.target_stack_pos(*dest);
                w.rune(*value);
            }
            Self::LoadZeroMemoryPointer { dest, pointer } => {
                w.target_stack_pos(*dest);
                w.zero_memory_pos(*pointer);
            }
            Self::CopyMemory { dest, source } => {
                w.target_stack_pos(*dest);
                w.source_stack_pos(source.pos);
                w.stack_size(source.size);
            }
            Self::BinaryOperator { dest, a, b, .. } => {
                w.target_stack_pos(*dest);
                w.source_stack_pos(*a);
                w.source_stack_pos(*b);
            }
            Self::UnaryOperator { dest, source, .. } => {
                w.target_stack_pos(*dest);
                w.source_stack_pos(*source);
            }
            Self::ValueCompare { dest, a, b, size, .. } => {
                w.target_stack_pos(*dest);
                w.source_stack_pos(*a);
                w.source_stack_pos(*b);
                w.stack_size(*size);
            }
            Self::BranchFalse { test, label } | Self::BranchTrue { test, label } => {
                w.source_stack_pos(*test);
                w.label(label);
            }
            Self::Jump { label } => w.label(label),
            Self::EnumCase { test, arms } => {
                w.source_stack_pos(*test);
                w.count(count_of(arms.len(), "enum case arms")?);
                let mut previous: Option<&L> = None;
                for arm in arms {
                    w.enum_value(arm.tag);
                    match previous {
                        None => w.label(&arm.label),
                        Some(prev) => w.label_with_offset(&arm.label, prev),
                    }
                    previous = Some(&arm.label);
                }
            }
            Self::PatternMatchingInt {
                test,
                arms,
                default,
            } => {
                w.source_stack_pos(*test);
                w.count(count_of(arms.len(), "pattern arms")?);
                let mut previous: Option<&L> = None;
                for arm in arms {
                    w.int32(arm.value);
                    write_chained_label(w, &arm.label, previous);
                    previous = Some(&arm.label);
                }
                write_chained_label(w, default, previous);
            }
            Self::PatternMatchingString {
                test,
                arms,
                default,
            } => {
                w.source_stack_pos(*test);
                w.count(count_of(arms.len(), "pattern arms")?);
                let mut previous: Option<&L> = None;
                for arm in arms {
                    w.zero_memory_pos(arm.header);
                    write_chained_label(w, &arm.label, previous);
                    previous = Some(&arm.label);
                }
                write_chained_label(w, default, previous);
            }
            Self::CreateList {
                dest,
                item_size,
                align,
                items,
            }
            | Self::CreateArray {
                dest,
                item_size,
                align,
                items,
            } => {
                w.target_stack_pos(*dest);
                w.stack_size(*item_size);
                w.alignment(*align);
                w.count(count_of(items.len(), "collection items")?);
                for item in items {
                    w.source_stack_pos(*item);
                }
            }
            Self::Call { new_base, function } => {
                w.target_stack_pos(*new_base);
                w.source_stack_pos(*function);
            }
            Self::CallExternal {
                new_base,
                function,
                args,
            } => {
                w.target_stack_pos(*new_base);
                w.source_stack_pos(*function);
                w.count(count_of(args.len(), "external arguments")?);
                for arg in args {
                    w.field_offset(arg.offset);
                    w.stack_size(arg.size);
                }
            }
            Self::TailCall | Self::Return => {}
            Self::Curry {
                dest,
                type_id,
                function,
                args,
            } => {
                w.target_stack_pos(*dest);
                w.type_id(*type_id);
                w.source_stack_pos(*function);
                w.source_stack_pos(args.pos);
                w.stack_size(args.size);
            }
            Self::UpdateStruct {
                dest,
                source,
                fields,
            } => {
                w.target_stack_pos(*dest);
                w.source_stack_pos(source.pos);
                w.stack_size(source.size);
                w.count(count_of(fields.len(), "updated fields")?);
                for field in fields {
                    w.field_offset(field.offset);
                    w.source_stack_pos(field.source.pos);
                    w.stack_size(field.source.size);
                }
            }
        }
        Ok(())
    }

    /// Every label referenced by this instruction, in encoding order.
    pub fn labels(&self) -> Vec<&L> {
        match self {
            Self::BranchFalse { label, .. } | Self::BranchTrue { label, .. } | Self::Jump { label } => {
                vec![label]
            }
            Self::EnumCase { arms, .. } => arms.iter().map(|a| &a.label).collect(),
            Self::PatternMatchingInt { arms, default, .. } => arms
                .iter()
                .map(|a| &a.label)
                .chain(std::iter::once(default))
                .collect(),
            Self::PatternMatchingString { arms, default, .. } => arms
                .iter()
                .map(|a| &a.label)
                .chain(std::iter::once(default))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrite every label, keeping all other operands.
    pub fn try_map_labels<M>(
        &self,
        mut f: impl FnMut(&L) -> CodegenResult<M>,
    ) -> CodegenResult<Instruction<M>> {
        Ok(match self {
            Self::LoadInteger { dest, value } => Instruction::LoadInteger {
                dest: *dest,
                value: *value,
            },
            Self::LoadBool { dest, value } => Instruction::LoadBool {
                dest: *dest,
                value: *value,
            },
            Self::LoadRune { dest, value } => Instruction::LoadRune {
                dest: *dest,
                value: *value,
            },
            Self::LoadZeroMemoryPointer { dest, pointer } => Instruction::LoadZeroMemoryPointer {
                dest: *dest,
                pointer: *pointer,
            },
            Self::CopyMemory { dest, source } => Instruction::CopyMemory {
                dest: *dest,
                source: *source,
            },
            Self::BinaryOperator { command, dest, a, b } => Instruction::BinaryOperator {
                command: *command,
                dest: *dest,
                a: *a,
                b: *b,
            },
            Self::UnaryOperator {
                command,
                dest,
                source,
            } => Instruction::UnaryOperator {
                command: *command,
                dest: *dest,
                source: *source,
            },
            Self::ValueCompare {
                command,
                dest,
                a,
                b,
                size,
            } => Instruction::ValueCompare {
                command: *command,
                dest: *dest,
                a: *a,
                b: *b,
                size: *size,
            },
            Self::BranchFalse { test, label } => Instruction::BranchFalse {
                test: *test,
                label: f(label)?,
            },
            Self::BranchTrue { test, label } => Instruction::BranchTrue {
                test: *test,
                label: f(label)?,
            },
            Self::Jump { label } => Instruction::Jump { label: f(label)? },
            Self::EnumCase { test, arms } => Instruction::EnumCase {
                test: *test,
                arms: arms
                    .iter()
                    .map(|arm| {
                        Ok(EnumArm {
                            tag: arm.tag,
                            label: f(&arm.label)?,
                        })
                    })
                    .collect::<CodegenResult<_>>()?,
            },
            Self::PatternMatchingInt {
                test,
                arms,
                default,
            } => Instruction::PatternMatchingInt {
                test: *test,
                arms: arms
                    .iter()
                    .map(|arm| {
                        Ok(IntArm {
                            value: arm.value,
                            label: f(&arm.label)?,
                        })
                    })
                    .collect::<CodegenResult<_>>()?,
                default: f(default)?,
            },
            Self::PatternMatchingString {
                test,
                arms,
                default,
            } => Instruction::PatternMatchingString {
                test: *test,
                arms: arms
                    .iter()
                    .map(|arm| {
                        Ok(StringArm {
                            header: arm.header,
                            label: f(&arm.label)?,
                        })
                    })
                    .collect::<CodegenResult<_>>()?,
                default: f(default)?,
            },
            Self::CreateList {
                dest,
                item_size,
                align,
                items,
            } => Instruction::CreateList {
                dest: *dest,
                item_size: *item_size,
                align: *align,
                items: items.clone(),
            },
            Self::CreateArray {
                dest,
                item_size,
                align,
                items,
            } => Instruction::CreateArray {
                dest: *dest,
                item_size: *item_size,
                align: *align,
                items: items.clone(),
            },
            Self::Call { new_base, function } => Instruction::Call {
                new_base: *new_base,
                function: *function,
            },
            Self::CallExternal {
                new_base,
                function,
                args,
            } => Instruction::CallExternal {
                new_base: *new_base,
                function: *function,
                args: args.clone(),
            },
            Self::TailCall => Instruction::TailCall,
            Self::Return => Instruction::Return,
            Self::Curry {
                dest,
                type_id,
                function,
                args,
            } => Instruction::Curry {
                dest: *dest,
                type_id: *type_id,
                function: *function,
                args: *args,
            },
            Self::UpdateStruct {
                dest,
                source,
                fields,
            } => Instruction::UpdateStruct {
                dest: *dest,
                source: *source,
                fields: fields.clone(),
            },
        })
    }
}

fn write_chained_label<L, W: OpcodeWriter<L>>(w: &mut W, label: &L, previous: Option<&L>) {
    match previous {
        None => w.label(label),
        Some(prev) => w.label_with_offset(label, prev),
    }
}

/// Convert a field offset to the 16-bit operand form.
pub fn field_offset(offset: MemoryOffset) -> CodegenResult<u16> {
    u16::try_from(offset.0)
        .map_err(|_| CodegenError::LimitExceeded(format!("field offset {} exceeds 65535", offset.0)))
}

// ══════════════════════════════════════════════════════════════════════════════
// Listing
// ══════════════════════════════════════════════════════════════════════════════

impl<L: fmt::Display> fmt::Display for Instruction<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<22}", self.command().to_string())?;
        match self {
            Self::LoadInteger { dest, value } => write!(f, "{dest} {value}"),
            Self::LoadBool { dest, value } => write!(f, "{dest} {value}"),
            Self::LoadRune { dest, value } => write!(f, "{dest} {value:#04x}"),
            Self::LoadZeroMemoryPointer { dest, pointer } => write!(f, "{dest} {pointer}"),
            Self::CopyMemory { dest, source } => write!(f, "{dest} {source}"),
            Self::BinaryOperator { dest, a, b, .. } => write!(f, "{dest} {a} {b}"),
            Self::UnaryOperator { dest, source, .. } => write!(f, "{dest} {source}"),
            Self::ValueCompare { dest, a, b, size, .. } => {
                write!(f, "{dest} {a} {b} ({} octets)", size.get())
            }
            Self::BranchFalse { test, label } | Self::BranchTrue { test, label } => {
                write!(f, "{test} -> {label}")
            }
            Self::Jump { label } => write!(f, "-> {label}"),
            Self::EnumCase { test, arms } => {
                write!(f, "{test}")?;
                for arm in arms {
                    if arm.is_default() {
                        write!(f, " [_ -> {}]", arm.label)?;
                    } else {
                        write!(f, " [{} -> {}]", arm.tag, arm.label)?;
                    }
                }
                Ok(())
            }
            Self::PatternMatchingInt {
                test,
                arms,
                default,
            } => {
                write!(f, "{test}")?;
                for arm in arms {
                    write!(f, " [{} -> {}]", arm.value, arm.label)?;
                }
                write!(f, " [_ -> {default}]")
            }
            Self::PatternMatchingString {
                test,
                arms,
                default,
            } => {
                write!(f, "{test}")?;
                for arm in arms {
                    write!(f, " [{} -> {}]", arm.header, arm.label)?;
                }
                write!(f, " [_ -> {default}]")
            }
            Self::CreateList {
                dest,
                item_size,
                align,
                items,
            }
            | Self::CreateArray {
                dest,
                item_size,
                align,
                items,
            } => {
                write!(f, "{dest} item={}/{align}", item_size.get())?;
                for item in items {
                    write!(f, " {item}")?;
                }
                Ok(())
            }
            Self::Call { new_base, function } => write!(f, "base={new_base} fn={function}"),
            Self::CallExternal {
                new_base,
                function,
                args,
            } => {
                write!(f, "base={new_base} fn={function}")?;
                for arg in args {
                    write!(f, " +{}:{}", arg.offset, arg.size.get())?;
                }
                Ok(())
            }
            Self::TailCall | Self::Return => Ok(()),
            Self::Curry {
                dest,
                type_id,
                function,
                args,
            } => write!(f, "{dest} type={} fn={function} args={args}", type_id.0),
            Self::UpdateStruct {
                dest,
                source,
                fields,
            } => {
                write!(f, "{dest} {source}")?;
                for field in fields {
                    write!(f, " +{}<-{}", field.offset, field.source)?;
                }
                Ok(())
            }
        }
    }
}
