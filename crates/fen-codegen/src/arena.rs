//! Append-only arenas backing the pack.
//!
//! Two arenas exist per pack: the fixed-layout arena ([`ZeroMemory`]) holds
//! small headers whose addresses instructions embed directly, and the blob
//! arena ([`DynamicMemory`]) holds the variable-length payloads those
//! headers point at. Both are pre-sized buffers with a bump cursor; bytes
//! are only changed after allocation through [`Arena::overwrite`], which
//! the constant pool uses to patch function descriptors.

use std::fmt;
use std::marker::PhantomData;

use fen_types::MemoryAlign;

use crate::error::{CodegenError, CodegenResult};
use crate::layout::{align_up, DynamicMemoryPos, ZeroMemoryPos};

/// A position type tied to one arena.
pub trait ArenaPos: Copy + fmt::Debug + fmt::Display {
    /// Name used in diagnostics.
    const ARENA_NAME: &'static str;

    fn from_offset(offset: u32) -> Self;
    fn offset(self) -> u32;
}

impl ArenaPos for ZeroMemoryPos {
    const ARENA_NAME: &'static str = "zero memory";

    fn from_offset(offset: u32) -> Self {
        Self(offset)
    }

    fn offset(self) -> u32 {
        self.0
    }
}

impl ArenaPos for DynamicMemoryPos {
    const ARENA_NAME: &'static str = "dynamic memory";

    fn from_offset(offset: u32) -> Self {
        Self(offset)
    }

    fn offset(self) -> u32 {
        self.0
    }
}

/// An allocated span inside an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaRange<P> {
    pub pos: P,
    pub size: u32,
}

/// Diagnostic record of one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation<P> {
    pub range: ArenaRange<P>,
    pub debug_tag: String,
}

pub type ZeroMemoryRange = ArenaRange<ZeroMemoryPos>;
pub type DynamicMemoryRange = ArenaRange<DynamicMemoryPos>;

/// Fixed-layout arena.
pub type ZeroMemory = Arena<ZeroMemoryPos>;
/// Blob arena.
pub type DynamicMemory = Arena<DynamicMemoryPos>;

#[derive(Debug, Clone)]
pub struct Arena<P: ArenaPos> {
    memory: Vec<u8>,
    cursor: usize,
    allocations: Vec<Allocation<P>>,
    _space: PhantomData<P>,
}

impl<P: ArenaPos> Arena<P> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memory: vec![0; capacity],
            cursor: 0,
            allocations: Vec::new(),
            _space: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Octets allocated so far, including alignment padding.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Reserve `size` zeroed octets at the next position aligned to `align`.
    pub fn allocate(
        &mut self,
        size: usize,
        align: MemoryAlign,
        debug_tag: &str,
    ) -> CodegenResult<ArenaRange<P>> {
        if size == 0 {
            return Err(CodegenError::Internal(format!(
                "zero-sized allocation `{debug_tag}` in {}",
                P::ARENA_NAME
            )));
        }
        let start = align_up(self.cursor, align);
        let end = start + size;
        if end > self.memory.len() {
            return Err(CodegenError::ArenaOverflow {
                arena: P::ARENA_NAME,
                requested: size,
                cursor: self.cursor,
                capacity: self.memory.len(),
            });
        }
        // Capacity is at most u32::MAX in practice; a larger arena cannot be addressed.
        let (Ok(pos), Ok(size32)) = (u32::try_from(start), u32::try_from(size)) else {
            return Err(CodegenError::LimitExceeded(format!(
                "{} offset {start} is not addressable",
                P::ARENA_NAME
            )));
        };
        self.cursor = end;

        let range = ArenaRange {
            pos: P::from_offset(pos),
            size: size32,
        };
        self.allocations.push(Allocation {
            range,
            debug_tag: debug_tag.to_string(),
        });
        Ok(range)
    }

    /// Allocate and copy `bytes` in.
    pub fn write(
        &mut self,
        bytes: &[u8],
        align: MemoryAlign,
        debug_tag: &str,
    ) -> CodegenResult<ArenaRange<P>> {
        let range = self.allocate(bytes.len(), align, debug_tag)?;
        let start = range.pos.offset() as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(range)
    }

    /// Patch previously allocated octets in place.
    pub fn overwrite(&mut self, pos: P, bytes: &[u8]) -> CodegenResult<()> {
        let start = pos.offset() as usize;
        let end = start + bytes.len();
        if end > self.cursor {
            return Err(CodegenError::Internal(format!(
                "overwrite of {} octets at {pos} past the end of {} ({})",
                bytes.len(),
                P::ARENA_NAME,
                self.cursor
            )));
        }
        self.memory[start..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, range: ArenaRange<P>) -> CodegenResult<&[u8]> {
        let start = range.pos.offset() as usize;
        let end = start + range.size as usize;
        if end > self.cursor {
            return Err(CodegenError::Internal(format!(
                "read of {} octets at {} past the end of {}",
                range.size,
                range.pos,
                P::ARENA_NAME
            )));
        }
        Ok(&self.memory[start..end])
    }

    /// The image up to the cursor.
    pub fn octets(&self) -> &[u8] {
        &self.memory[..self.cursor]
    }

    pub fn allocations(&self) -> &[Allocation<P>] {
        &self.allocations
    }

    /// Current end of the arena, for a later [`Arena::truncate`].
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            cursor: self.cursor,
            allocations: self.allocations.len(),
        }
    }

    /// Drop every allocation made since `mark` and zero their octets.
    pub fn truncate(&mut self, mark: ArenaMark) -> CodegenResult<()> {
        if mark.cursor > self.cursor || mark.allocations > self.allocations.len() {
            return Err(CodegenError::Internal(format!(
                "truncate of {} forward to {}",
                P::ARENA_NAME,
                mark.cursor
            )));
        }
        self.memory[mark.cursor..self.cursor].fill(0);
        self.cursor = mark.cursor;
        self.allocations.truncate(mark.allocations);
        Ok(())
    }
}

/// A point in an arena's allocation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    cursor: usize,
    allocations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_aligns_and_advances() {
        let mut arena = ZeroMemory::with_capacity(64);
        let a = arena.allocate(3, MemoryAlign::ONE, "a").unwrap();
        let b = arena.allocate(8, MemoryAlign::EIGHT, "b").unwrap();
        assert_eq!(a.pos, ZeroMemoryPos(0));
        assert_eq!(b.pos, ZeroMemoryPos(8));
        assert_eq!(arena.len(), 16);
        assert_eq!(arena.allocations()[1].debug_tag, "b");
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut arena = DynamicMemory::with_capacity(16);
        assert!(arena.allocate(0, MemoryAlign::ONE, "empty").is_err());
    }

    #[test]
    fn test_overflow() {
        let mut arena = DynamicMemory::with_capacity(16);
        arena.write(b"0123456789", MemoryAlign::ONE, "digits").unwrap();
        let err = arena.allocate(8, MemoryAlign::ONE, "more").unwrap_err();
        assert!(matches!(
            err,
            CodegenError::ArenaOverflow {
                arena: "dynamic memory",
                requested: 8,
                cursor: 10,
                capacity: 16
            }
        ));
        // The failed allocation leaves the cursor alone.
        assert_eq!(arena.len(), 10);
    }

    #[test]
    fn test_truncate_forgets_later_allocations() {
        let mut arena = DynamicMemory::with_capacity(32);
        arena.write(b"keep", MemoryAlign::ONE, "keep").unwrap();
        let mark = arena.mark();
        arena.write(b"drop me", MemoryAlign::EIGHT, "drop").unwrap();
        arena.truncate(mark).unwrap();
        assert_eq!(arena.octets(), b"keep");
        assert_eq!(arena.allocations().len(), 1);

        let again = arena.write(b"x", MemoryAlign::ONE, "x").unwrap();
        assert_eq!(again.pos, DynamicMemoryPos(4));
    }

    #[test]
    fn test_write_read_overwrite() {
        let mut arena = DynamicMemory::with_capacity(32);
        let range = arena.write(b"hello\0", MemoryAlign::ONE, "s").unwrap();
        assert_eq!(arena.read(range).unwrap(), b"hello\0");
        arena.overwrite(range.pos, b"J").unwrap();
        assert_eq!(arena.read(range).unwrap(), b"Jello\0");
        assert_eq!(arena.octets(), b"Jello\0");
    }

    #[test]
    fn test_overwrite_past_cursor_rejected() {
        let mut arena = ZeroMemory::with_capacity(32);
        arena.allocate(4, MemoryAlign::ONE, "x").unwrap();
        assert!(arena.overwrite(ZeroMemoryPos(2), &[1, 2, 3]).is_err());
    }
}
