//! Disassembler for function byte streams.
//!
//! Decodes into [`Instruction<u16>`] where every label is the absolute
//! program counter it resolves to, the same form as
//! [`Code::resolved`](crate::code::Code::resolved).

use std::fmt::Write as _;

use fen_types::ast::TypeId;
use fen_types::MemoryAlign;

use crate::error::{CodegenError, CodegenResult};
use crate::instruction::{
    ArgumentSlot, Command, EnumArm, FieldUpdate, Instruction, IntArm, StringArm,
};
use crate::layout::{SourceStackPos, SourceStackRange, StackSize, TargetStackPos, ZeroMemoryPos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub pc: usize,
    pub instruction: Instruction<u16>,
}

/// Decode a whole function.
pub fn disassemble(octets: &[u8]) -> CodegenResult<Vec<Decoded>> {
    let mut reader = Reader { octets, pc: 0 };
    let mut out = Vec::new();
    while reader.pc < octets.len() {
        let pc = reader.pc;
        let instruction = reader.instruction()?;
        out.push(Decoded { pc, instruction });
    }
    Ok(out)
}

/// Decode and render one instruction per line, prefixed with its pc.
pub fn listing(octets: &[u8]) -> CodegenResult<String> {
    let mut text = String::new();
    for decoded in disassemble(octets)? {
        // Writing to a String cannot fail.
        let _ = writeln!(text, "{:04x}  {}", decoded.pc, decoded.instruction);
    }
    Ok(text)
}

struct Reader<'a> {
    octets: &'a [u8],
    pc: usize,
}

impl Reader<'_> {
    fn malformed(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::Malformed {
            pc: self.pc,
            message: message.into(),
        }
    }

    fn take<const N: usize>(&mut self) -> CodegenResult<[u8; N]> {
        let end = self.pc + N;
        let slice = self
            .octets
            .get(self.pc..end)
            .ok_or_else(|| self.malformed(format!("truncated operand, need {N} octets")))?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(slice);
        self.pc = end;
        Ok(raw)
    }

    fn u8(&mut self) -> CodegenResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> CodegenResult<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> CodegenResult<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> CodegenResult<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn target(&mut self) -> CodegenResult<TargetStackPos> {
        Ok(TargetStackPos(self.u32()?))
    }

    fn source(&mut self) -> CodegenResult<SourceStackPos> {
        Ok(SourceStackPos(self.u32()?))
    }

    fn size(&mut self) -> CodegenResult<StackSize> {
        let raw = self.u16()?;
        StackSize::new(raw).map_err(|_| self.malformed("zero stack range"))
    }

    fn range(&mut self) -> CodegenResult<SourceStackRange> {
        let pos = self.u32()?;
        let size = self.size()?;
        Ok(SourceStackRange::new(pos, size))
    }

    fn boolean(&mut self) -> CodegenResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.malformed(format!("boolean operand {other}"))),
        }
    }

    fn align(&mut self) -> CodegenResult<MemoryAlign> {
        let raw = self.u8()?;
        MemoryAlign::new(raw).map_err(|e| self.malformed(e.to_string()))
    }

    fn absolute(&self, base: usize, delta: u16) -> CodegenResult<u16> {
        u16::try_from(base + usize::from(delta))
            .map_err(|_| self.malformed("label beyond 0xFFFF"))
    }

    /// Plain label: delta from the end of the operand.
    fn label(&mut self) -> CodegenResult<u16> {
        let delta = self.u16()?;
        self.absolute(self.pc, delta)
    }

    /// First arm label is plain, later ones chain off the previous arm.
    fn chained_label(&mut self, previous: Option<u16>) -> CodegenResult<u16> {
        match previous {
            None => self.label(),
            Some(prev) => {
                let delta = self.u16()?;
                self.absolute(usize::from(prev), delta)
            }
        }
    }

    fn instruction(&mut self) -> CodegenResult<Instruction<u16>> {
        let start = self.pc;
        let opcode = self.u8()?;
        let command = Command::from_u8(opcode).ok_or_else(|| CodegenError::Malformed {
            pc: start,
            message: format!("unknown opcode {opcode:#04x}"),
        })?;

        if command.is_binary() {
            return Ok(Instruction::BinaryOperator {
                command,
                dest: self.target()?,
                a: self.source()?,
                b: self.source()?,
            });
        }
        if command.is_unary() {
            return Ok(Instruction::UnaryOperator {
                command,
                dest: self.target()?,
                source: self.source()?,
            });
        }
        if command.is_value_compare() {
            return Ok(Instruction::ValueCompare {
                command,
                dest: self.target()?,
                a: self.source()?,
                b: self.source()?,
                size: self.size()?,
            });
        }

        Ok(match command {
            Command::LoadInteger => Instruction::LoadInteger {
                dest: self.target()?,
                value: self.i32()?,
            },
            Command::LoadBool => Instruction::LoadBool {
                dest: self.target()?,
                value: self.boolean()?,
            },
            Command::LoadRune => Instruction::LoadRune {
                dest: self.target()?,
                value: self.u8()?,
            },
            Command::LoadZeroMemoryPointer => Instruction::LoadZeroMemoryPointer {
                dest: self.target()?,
                pointer: ZeroMemoryPos(self.u32()?),
            },
            Command::CopyMemory => Instruction::CopyMemory {
                dest: self.target()?,
                source: self.range()?,
            },
            Command::BranchFalse => Instruction::BranchFalse {
                test: self.source()?,
                label: self.label()?,
            },
            Command::BranchTrue => Instruction::BranchTrue {
                test: self.source()?,
                label: self.label()?,
            },
            Command::Jump => Instruction::Jump {
                label: self.label()?,
            },
            Command::EnumCase => {
                let test = self.source()?;
                let count = self.u8()?;
                let mut arms = Vec::with_capacity(usize::from(count));
                let mut previous = None;
                for _ in 0..count {
                    let tag = self.u8()?;
                    let label = self.chained_label(previous)?;
                    previous = Some(label);
                    arms.push(EnumArm { tag, label });
                }
                Instruction::EnumCase { test, arms }
            }
            Command::PatternMatchingInt => {
                let test = self.source()?;
                let count = self.u8()?;
                let mut arms = Vec::with_capacity(usize::from(count));
                let mut previous = None;
                for _ in 0..count {
                    let value = self.i32()?;
                    let label = self.chained_label(previous)?;
                    previous = Some(label);
                    arms.push(IntArm { value, label });
                }
                let default = self.chained_label(previous)?;
                Instruction::PatternMatchingInt {
                    test,
                    arms,
                    default,
                }
            }
            Command::PatternMatchingString => {
                let test = self.source()?;
                let count = self.u8()?;
                let mut arms = Vec::with_capacity(usize::from(count));
                let mut previous = None;
                for _ in 0..count {
                    let header = ZeroMemoryPos(self.u32()?);
                    let label = self.chained_label(previous)?;
                    previous = Some(label);
                    arms.push(StringArm { header, label });
                }
                let default = self.chained_label(previous)?;
                Instruction::PatternMatchingString {
                    test,
                    arms,
                    default,
                }
            }
            Command::CreateList | Command::CreateArray => {
                let dest = self.target()?;
                let item_size = self.size()?;
                let align = self.align()?;
                let count = self.u8()?;
                let items = (0..count)
                    .map(|_| self.source())
                    .collect::<CodegenResult<Vec<_>>>()?;
                if command == Command::CreateList {
                    Instruction::CreateList {
                        dest,
                        item_size,
                        align,
                        items,
                    }
                } else {
                    Instruction::CreateArray {
                        dest,
                        item_size,
                        align,
                        items,
                    }
                }
            }
            Command::Call => Instruction::Call {
                new_base: self.target()?,
                function: self.source()?,
            },
            Command::CallExternal => {
                let new_base = self.target()?;
                let function = self.source()?;
                let count = self.u8()?;
                let mut args = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let offset = self.u16()?;
                    let size = self.size()?;
                    args.push(ArgumentSlot { offset, size });
                }
                Instruction::CallExternal {
                    new_base,
                    function,
                    args,
                }
            }
            Command::TailCall => Instruction::TailCall,
            Command::Return => Instruction::Return,
            Command::Curry => Instruction::Curry {
                dest: self.target()?,
                type_id: TypeId(u16::from_be_bytes(self.take()?)),
                function: self.source()?,
                args: self.range()?,
            },
            Command::UpdateStruct => {
                let dest = self.target()?;
                let source = self.range()?;
                let count = self.u8()?;
                let mut fields = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let offset = self.u16()?;
                    let source = self.range()?;
                    fields.push(FieldUpdate { offset, source });
                }
                Instruction::UpdateStruct {
                    dest,
                    source,
                    fields,
                }
            }
            Command::CreateStruct | Command::CreateEnum => {
                return Err(self.malformed(format!("reserved opcode {command}")));
            }
            // Operator classes were handled above.
            _ => return Err(self.malformed(format!("unexpected {command}"))),
        })
    }
}
