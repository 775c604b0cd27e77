//! Position and range types for the three address spaces the emitter writes to.
//!
//! - the per-call evaluation stack ([`TargetStackPos`] / [`SourceStackPos`])
//! - the fixed-layout arena ([`ZeroMemoryPos`])
//! - the blob arena ([`DynamicMemoryPos`])
//!
//! Each space has its own position type so that, for example, a blob offset
//! can never be handed to `LoadZeroMemoryPointer`.

use std::fmt;

use fen_types::{MemoryAlign, MemoryOffset, MemorySize};

use crate::error::{CodegenError, CodegenResult};

/// Round `pos` up to the next multiple of `align`.
///
/// `MemoryAlign` is never zero, so this cannot fail.
pub fn align_up(pos: usize, align: MemoryAlign) -> usize {
    let a = usize::from(align.get());
    let rem = pos % a;
    if rem == 0 {
        pos
    } else {
        pos + (a - rem)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Stack
// ══════════════════════════════════════════════════════════════════════════════

/// Stack offset an instruction writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetStackPos(pub u32);

/// Stack offset an instruction reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceStackPos(pub u32);

/// Size of a stack region in octets. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackSize(u16);

impl StackSize {
    pub fn new(size: u16) -> CodegenResult<Self> {
        if size == 0 {
            return Err(CodegenError::Internal(
                "stack region of size 0".to_string(),
            ));
        }
        Ok(Self(size))
    }

    /// Convert a layout size, failing if it is zero or wider than 16 bits.
    pub fn from_memory_size(size: MemorySize) -> CodegenResult<Self> {
        let narrow = u16::try_from(size.0).map_err(|_| {
            CodegenError::LimitExceeded(format!(
                "value of {} octets does not fit a stack range",
                size.0
            ))
        })?;
        Self::new(narrow)
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u32(self) -> u32 {
        u32::from(self.0)
    }
}

/// A stack region an expression is lowered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetStackRange {
    pub pos: TargetStackPos,
    pub size: StackSize,
}

/// A stack region an instruction reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceStackRange {
    pub pos: SourceStackPos,
    pub size: StackSize,
}

impl TargetStackRange {
    pub fn new(pos: u32, size: StackSize) -> Self {
        Self {
            pos: TargetStackPos(pos),
            size,
        }
    }

    /// The same region, read back after it has been written.
    pub fn to_source(self) -> SourceStackRange {
        SourceStackRange {
            pos: SourceStackPos(self.pos.0),
            size: self.size,
        }
    }

    /// A field inside this region.
    pub fn sub_range(self, offset: MemoryOffset, size: StackSize) -> CodegenResult<Self> {
        check_inside(self.pos.0, self.size, offset, size)?;
        Ok(Self::new(self.pos.0 + offset.0, size))
    }

    /// First position after the region.
    pub fn end(self) -> u32 {
        self.pos.0 + self.size.as_u32()
    }
}

impl SourceStackRange {
    pub fn new(pos: u32, size: StackSize) -> Self {
        Self {
            pos: SourceStackPos(pos),
            size,
        }
    }

    /// A field inside this region; used for case bindings that view into the subject.
    pub fn sub_range(self, offset: MemoryOffset, size: StackSize) -> CodegenResult<Self> {
        check_inside(self.pos.0, self.size, offset, size)?;
        Ok(Self::new(self.pos.0 + offset.0, size))
    }

    pub fn end(self) -> u32 {
        self.pos.0 + self.size.as_u32()
    }
}

fn check_inside(
    base: u32,
    outer: StackSize,
    offset: MemoryOffset,
    size: StackSize,
) -> CodegenResult<()> {
    let inside = offset
        .0
        .checked_add(size.as_u32())
        .is_some_and(|end| end <= outer.as_u32());
    if !inside {
        return Err(CodegenError::Internal(format!(
            "sub-range {}+{} escapes region ${base}:{}",
            offset.0,
            size.get(),
            outer.get()
        )));
    }
    Ok(())
}

impl fmt::Display for TargetStackPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

impl fmt::Display for SourceStackPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

impl fmt::Display for TargetStackRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pos, self.size.get())
    }
}

impl fmt::Display for SourceStackRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pos, self.size.get())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Arenas
// ══════════════════════════════════════════════════════════════════════════════

/// Offset into the fixed-layout arena (string headers, function descriptors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZeroMemoryPos(pub u32);

/// Offset into the blob arena (string bytes, opcodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DynamicMemoryPos(pub u32);

impl fmt::Display for ZeroMemoryPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zm#{:04X}", self.0)
    }
}

impl fmt::Display for DynamicMemoryPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dm#{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, MemoryAlign::EIGHT), 0);
        assert_eq!(align_up(1, MemoryAlign::EIGHT), 8);
        assert_eq!(align_up(8, MemoryAlign::EIGHT), 8);
        assert_eq!(align_up(5, MemoryAlign::ONE), 5);
        assert_eq!(align_up(6, MemoryAlign::FOUR), 8);
    }

    #[test]
    fn test_zero_stack_size_rejected() {
        assert!(StackSize::new(0).is_err());
        assert!(StackSize::from_memory_size(MemorySize(0)).is_err());
    }

    #[test]
    fn test_oversized_region_rejected() {
        let err = StackSize::from_memory_size(MemorySize(70_000)).unwrap_err();
        assert!(matches!(err, CodegenError::LimitExceeded(_)));
    }

    #[test]
    fn test_sub_range_stays_inside() {
        let whole = TargetStackRange::new(16, StackSize::new(16).unwrap());
        let field = whole
            .sub_range(MemoryOffset(8), StackSize::new(8).unwrap())
            .unwrap();
        assert_eq!(field.pos, TargetStackPos(24));
        assert!(whole
            .sub_range(MemoryOffset(12), StackSize::new(8).unwrap())
            .is_err());
    }

    #[test]
    fn test_sub_range_offset_overflow_is_an_error() {
        let whole = SourceStackRange::new(0, StackSize::new(8).unwrap());
        let err = whole
            .sub_range(MemoryOffset(u32::MAX - 2), StackSize::new(4).unwrap())
            .unwrap_err();
        assert!(matches!(err, CodegenError::Internal(_)));
    }

    #[test]
    fn test_target_reads_back_as_source() {
        let target = TargetStackRange::new(4, StackSize::new(4).unwrap());
        let source = target.to_source();
        assert_eq!(source.pos, SourceStackPos(4));
        assert_eq!(source.size, target.size);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn align_up_is_aligned_and_minimal(pos in 0usize..1_000_000, shift in 0u8..4) {
            let align = MemoryAlign::new(1 << shift).unwrap();
            let a = usize::from(align.get());
            let aligned = align_up(pos, align);
            prop_assert_eq!(aligned % a, 0);
            prop_assert!(aligned >= pos);
            prop_assert!(aligned - pos < a);
        }
    }
}
