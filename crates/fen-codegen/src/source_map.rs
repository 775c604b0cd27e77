//! Source mapping: function descriptor → source location.
//!
//! One entry per compiled or external function, so a VM fault at a given
//! descriptor and opcode offset can be traced back to the function's
//! source span. Granularity is per function.

use serde::{Deserialize, Serialize};

use fen_types::Span;

/// A complete source map for one pack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Fully qualified function name.
    pub name: String,
    pub kind: FunctionKind,
    /// Position of the 88-octet descriptor in the fixed-layout arena.
    pub descriptor_pos: u32,
    /// Position of the opcodes in the blob arena (0 when there are none).
    pub opcodes_pos: u32,
    pub opcodes_len: u32,
    /// Stack high-water mark reserved per invocation.
    pub stack_used: u32,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Compiled from a body in this pack.
    Function,
    /// Provided by the host.
    External,
    /// Body failed to compile; packed without opcodes.
    Abandoned,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: SourceMapEntry) {
        self.entries.push(entry);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn find_by_descriptor(&self, pos: u32) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.descriptor_pos == pos)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}
