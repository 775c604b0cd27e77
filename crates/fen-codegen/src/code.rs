//! Code buffer, label manager and two-pass assembler.
//!
//! A [`Code`] is a flat list of instructions and label placements. Labels
//! are local to the buffer that created them; [`Code::merge`] renumbers a
//! child buffer's labels when it is appended to its parent.
//!
//! Serialization writes every instruction with a `0xFFFF` placeholder for
//! each label operand and records a [`LabelInject`]. Once every label has a
//! program counter, each inject is patched with the forward delta from its
//! origin: the end of the operand for plain labels, or the program counter
//! of a prior label for chained arm labels.

use std::fmt;

use fen_types::ast::TypeId;
use fen_types::MemoryAlign;

use crate::error::{CodegenError, CodegenResult};
use crate::instruction::{Command, Instruction, OpcodeWriter};
use crate::layout::{SourceStackPos, StackSize, TargetStackPos, ZeroMemoryPos};
use crate::types::LABEL_PLACEHOLDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeItem {
    Instruction(Instruction<LabelId>),
    /// Places a label at the current program counter; emits no bytes.
    VirtualLabel(LabelId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    items: Vec<CodeItem>,
    labels: Vec<LabelInfo>,
}

/// Output of [`Code::serialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub octets: Vec<u8>,
    /// Program counter of every label, indexed by [`LabelId`]. Labels that
    /// were created but never placed (and never referenced) stay `None`.
    pub label_pcs: Vec<Option<u16>>,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_label(&mut self, name: &str) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(LabelInfo {
            name: format!("{name}#{}", id.0),
        });
        id
    }

    pub fn place_label(&mut self, label: LabelId) {
        self.items.push(CodeItem::VirtualLabel(label));
    }

    pub fn emit(&mut self, instruction: Instruction<LabelId>) {
        self.items.push(CodeItem::Instruction(instruction));
    }

    /// Append `child`, shifting its label ids past this buffer's labels.
    pub fn merge(&mut self, child: Code) -> CodegenResult<()> {
        let base = self.labels.len() as u32;
        let shift = |label: &LabelId| -> CodegenResult<LabelId> { Ok(LabelId(label.0 + base)) };
        for item in &child.items {
            let item = match item {
                CodeItem::Instruction(instruction) => {
                    CodeItem::Instruction(instruction.try_map_labels(shift)?)
                }
                CodeItem::VirtualLabel(label) => CodeItem::VirtualLabel(LabelId(label.0 + base)),
            };
            self.items.push(item);
        }
        self.labels.extend(child.labels);
        Ok(())
    }

    pub fn items(&self) -> &[CodeItem] {
        &self.items
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction<LabelId>> {
        self.items.iter().filter_map(|item| match item {
            CodeItem::Instruction(instruction) => Some(instruction),
            CodeItem::VirtualLabel(_) => None,
        })
    }

    pub fn label_name(&self, label: LabelId) -> &str {
        self.labels
            .get(label.0 as usize)
            .map(|info| info.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Assemble into a self-contained byte stream.
    pub fn serialize(&self) -> CodegenResult<Assembled> {
        let mut asm = Assembler::default();
        let mut placed: Vec<Option<usize>> = vec![None; self.labels.len()];

        // Pass 1: linearize.
        for item in &self.items {
            match item {
                CodeItem::Instruction(instruction) => instruction.write(&mut asm)?,
                CodeItem::VirtualLabel(label) => {
                    let slot = placed.get_mut(label.0 as usize).ok_or_else(|| {
                        CodegenError::Internal(format!("label #{} was not created here", label.0))
                    })?;
                    if slot.is_some() {
                        return Err(CodegenError::LabelDefinedTwice(
                            self.label_name(*label).to_string(),
                        ));
                    }
                    *slot = Some(asm.octets.len());
                }
            }
        }

        // Pass 2: fix up.
        let pc_of = |label: LabelId| -> CodegenResult<usize> {
            placed
                .get(label.0 as usize)
                .copied()
                .flatten()
                .ok_or_else(|| CodegenError::LabelNotDefined(self.label_name(label).to_string()))
        };
        for inject in &asm.injects {
            let target = pc_of(inject.target)?;
            let origin = match inject.origin {
                InjectOrigin::Following(pc) => pc,
                InjectOrigin::Label(label) => pc_of(label)?,
            };
            let delta = target as i64 - origin as i64;
            if target > usize::from(u16::MAX) || !(0..=i64::from(u16::MAX)).contains(&delta) {
                return Err(CodegenError::JumpTooFar {
                    label: self.label_name(inject.target).to_string(),
                    delta,
                });
            }
            let bytes = (delta as u16).to_le_bytes();
            asm.octets[inject.at..inject.at + 2].copy_from_slice(&bytes);
        }

        // Unreferenced labels past 0xFFFF still have no 16-bit address.
        let label_pcs = placed
            .iter()
            .enumerate()
            .map(|(id, pc)| match pc {
                None => Ok(None),
                Some(pc) => u16::try_from(*pc).map(Some).map_err(|_| CodegenError::JumpTooFar {
                    label: self.label_name(LabelId(id as u32)).to_string(),
                    delta: *pc as i64,
                }),
            })
            .collect::<CodegenResult<Vec<_>>>()?;

        Ok(Assembled {
            octets: asm.octets,
            label_pcs,
        })
    }

    /// The instructions with labels replaced by absolute program counters,
    /// the same form the disassembler produces.
    pub fn resolved(&self, assembled: &Assembled) -> CodegenResult<Vec<Instruction<u16>>> {
        self.instructions()
            .map(|instruction| {
                instruction.try_map_labels(|label| {
                    assembled
                        .label_pcs
                        .get(label.0 as usize)
                        .copied()
                        .flatten()
                        .ok_or_else(|| {
                            CodegenError::LabelNotDefined(self.label_name(*label).to_string())
                        })
                })
            })
            .collect()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                CodeItem::Instruction(instruction) => {
                    let named = instruction
                        .try_map_labels(|l| -> CodegenResult<String> {
                            Ok(self.label_name(*l).to_string())
                        })
                        .map_err(|_| fmt::Error)?;
                    writeln!(f, "    {named}")?;
                }
                CodeItem::VirtualLabel(label) => writeln!(f, "{}:", self.label_name(*label))?,
            }
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Assembler
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InjectOrigin {
    /// Program counter right after the two delta octets.
    Following(usize),
    /// Program counter of a prior label.
    Label(LabelId),
}

/// A reserved label operand waiting for its delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LabelInject {
    at: usize,
    target: LabelId,
    origin: InjectOrigin,
}

#[derive(Debug, Default)]
struct Assembler {
    octets: Vec<u8>,
    injects: Vec<LabelInject>,
}

impl Assembler {
    fn reserve_label(&mut self, target: LabelId, origin: Option<LabelId>) {
        let at = self.octets.len();
        self.octets.extend_from_slice(&LABEL_PLACEHOLDER.to_le_bytes());
        let origin = match origin {
            Some(label) => InjectOrigin::Label(label),
            None => InjectOrigin::Following(at + 2),
        };
        self.injects.push(LabelInject { at, target, origin });
    }
}

impl OpcodeWriter<LabelId> for Assembler {
    fn command(&mut self, command: Command) {
        self.octets.push(command.opcode());
    }

    fn target_stack_pos(&mut self, pos: TargetStackPos) {
        self.octets.extend_from_slice(&pos.0.to_le_bytes());
    }

    fn source_stack_pos(&mut self, pos: SourceStackPos) {
        self.octets.extend_from_slice(&pos.0.to_le_bytes());
    }

    fn stack_size(&mut self, size: StackSize) {
        self.octets.extend_from_slice(&size.get().to_le_bytes());
    }

    fn zero_memory_pos(&mut self, pos: ZeroMemoryPos) {
        self.octets.extend_from_slice(&pos.0.to_le_bytes());
    }

    fn field_offset(&mut self, offset: u16) {
        self.octets.extend_from_slice(&offset.to_le_bytes());
    }

    fn boolean(&mut self, value: bool) {
        self.octets.push(u8::from(value));
    }

    fn rune(&mut self, value: u8) {
        self.octets.push(value);
    }

    fn int32(&mut self, value: i32) {
        self.octets.extend_from_slice(&value.to_le_bytes());
    }

    fn count(&mut self, count: u8) {
        self.octets.push(count);
    }

    fn enum_value(&mut self, tag: u8) {
        self.octets.push(tag);
    }

    fn alignment(&mut self, align: MemoryAlign) {
        self.octets.push(align.get());
    }

    fn type_id(&mut self, id: TypeId) {
        self.octets.extend_from_slice(&id.0.to_be_bytes());
    }

    fn label(&mut self, label: &LabelId) {
        self.reserve_label(*label, None);
    }

    fn label_with_offset(&mut self, label: &LabelId, relative_to: &LabelId) {
        self.reserve_label(*label, Some(*relative_to));
    }
}
