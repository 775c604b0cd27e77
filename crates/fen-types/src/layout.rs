//! Memory layout primitives and the reference layout oracle.
//!
//! Every [`crate::ast::Type`] carries a [`Layout`]. Composite types also
//! carry per-field offsets, computed here by the same rules the VM uses:
//!
//! | Kind    | Rule                                                          |
//! |---------|---------------------------------------------------------------|
//! | record  | fields sorted by name, each at the next offset aligned to it   |
//! | tuple   | same, in element order                                         |
//! | union   | 1-octet tag at 0, all payloads start at one shared offset      |
//!
//! Sizes are always rounded up to the alignment of the aggregate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("alignment must be a non-zero power of two, got {0}")]
    InvalidAlignment(u32),

    /// Tag `0xFF` is reserved for the default arm of a case.
    #[error("union `{name}` has {count} variants, at most 255 are supported")]
    TooManyVariants { name: String, count: usize },
}

/// Size of a value in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemorySize(pub u32);

/// Offset of a field from the start of its aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryOffset(pub u32);

/// Power-of-two alignment in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryAlign(u8);

impl MemoryAlign {
    pub const ONE: Self = Self(1);
    pub const FOUR: Self = Self(4);
    pub const EIGHT: Self = Self(8);

    pub fn new(align: u8) -> Result<Self, LayoutError> {
        if align == 0 || !align.is_power_of_two() {
            return Err(LayoutError::InvalidAlignment(u32::from(align)));
        }
        Ok(Self(align))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for MemoryAlign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MemoryOffset {
    /// Round up to the next multiple of `align`.
    pub fn align_up(self, align: MemoryAlign) -> Self {
        let a = u32::from(align.get());
        let rem = self.0 % a;
        if rem == 0 {
            self
        } else {
            Self(self.0 + (a - rem))
        }
    }

    pub fn advance(self, size: MemorySize) -> Self {
        Self(self.0 + size.0)
    }
}

/// Size and alignment of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub size: MemorySize,
    pub align: MemoryAlign,
}

// ── Well-known layouts ───────────────────────────────────────────────────────

/// `Int`, and `Fixed` (16.16, stored as `i32`).
pub const INT_LAYOUT: Layout = Layout::new(MemorySize(4), MemoryAlign::FOUR);
pub const BOOL_LAYOUT: Layout = Layout::new(MemorySize(1), MemoryAlign::ONE);
pub const CHAR_LAYOUT: Layout = Layout::new(MemorySize(1), MemoryAlign::ONE);
/// Strings, lists, arrays and function values are one pointer wide.
pub const POINTER_LAYOUT: Layout = Layout::new(MemorySize(8), MemoryAlign::EIGHT);
pub const UNIT_LAYOUT: Layout = Layout::new(MemorySize(0), MemoryAlign::ONE);

/// Size of the union tag placed at offset 0.
pub const UNION_TAG_SIZE: MemorySize = MemorySize(1);

impl Layout {
    pub const fn new(size: MemorySize, align: MemoryAlign) -> Self {
        Self { size, align }
    }
}

/// Computes field offsets one after the other, tracking the aggregate alignment.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    cursor: MemoryOffset,
    align: MemoryAlign,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::starting_at(MemoryOffset(0))
    }

    pub fn starting_at(offset: MemoryOffset) -> Self {
        Self {
            cursor: offset,
            align: MemoryAlign::ONE,
        }
    }

    /// Place a field and return its offset.
    pub fn place(&mut self, layout: Layout) -> MemoryOffset {
        let offset = self.cursor.align_up(layout.align);
        self.cursor = offset.advance(layout.size);
        self.align = self.align.max(layout.align);
        offset
    }

    pub fn end(&self) -> MemoryOffset {
        self.cursor
    }

    pub fn align(&self) -> MemoryAlign {
        self.align
    }

    /// Final layout, size rounded up to the aggregate alignment.
    pub fn finish(&self) -> Layout {
        let size = self.cursor.align_up(self.align);
        Layout::new(MemorySize(size.0), self.align)
    }
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_rejects_zero_and_non_power_of_two() {
        assert!(MemoryAlign::new(0).is_err());
        assert!(MemoryAlign::new(3).is_err());
        assert_eq!(MemoryAlign::new(8).unwrap(), MemoryAlign::EIGHT);
    }

    #[test]
    fn test_offset_align_up() {
        assert_eq!(MemoryOffset(0).align_up(MemoryAlign::FOUR), MemoryOffset(0));
        assert_eq!(MemoryOffset(1).align_up(MemoryAlign::FOUR), MemoryOffset(4));
        assert_eq!(MemoryOffset(9).align_up(MemoryAlign::EIGHT), MemoryOffset(16));
    }

    #[test]
    fn test_builder_pads_between_fields() {
        let mut b = LayoutBuilder::new();
        assert_eq!(b.place(BOOL_LAYOUT), MemoryOffset(0));
        assert_eq!(b.place(INT_LAYOUT), MemoryOffset(4));
        assert_eq!(b.place(BOOL_LAYOUT), MemoryOffset(8));
        let layout = b.finish();
        assert_eq!(layout.size, MemorySize(12));
        assert_eq!(layout.align, MemoryAlign::FOUR);
    }
}
