//! Per-function bump allocator over the virtual evaluation stack.

use fen_types::{MemoryAlign, MemorySize};
use log::trace;

use crate::error::{CodegenError, CodegenResult};
use crate::layout::{align_up, StackSize, TargetStackRange};

#[derive(Debug, Clone)]
pub struct StackAllocator {
    cursor: u32,
    capacity: u32,
    high_water: u32,
}

impl StackAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            cursor: 0,
            capacity,
            high_water: 0,
        }
    }

    pub fn allocate(
        &mut self,
        size: StackSize,
        align: MemoryAlign,
        debug_tag: &str,
    ) -> CodegenResult<TargetStackRange> {
        let start = align_up(self.cursor as usize, align) as u64;
        let end = start + u64::from(size.get());
        if end > u64::from(self.capacity) {
            return Err(CodegenError::StackOverflow {
                requested: size.as_u32(),
                cursor: self.cursor,
                capacity: self.capacity,
            });
        }
        // Bounded by capacity above.
        let start = start as u32;
        self.cursor = end as u32;
        self.high_water = self.high_water.max(self.cursor);
        trace!("stack {debug_tag}: ${start:04X}:{}", size.get());
        Ok(TargetStackRange::new(start, size))
    }

    /// Allocate a region for a value of the given layout size.
    pub fn allocate_sized(
        &mut self,
        size: MemorySize,
        align: MemoryAlign,
        debug_tag: &str,
    ) -> CodegenResult<TargetStackRange> {
        self.allocate(StackSize::from_memory_size(size)?, align, debug_tag)
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Rewind to an earlier cursor. Regions above `pos` become free; the
    /// high-water mark is kept.
    pub fn set(&mut self, pos: u32) -> CodegenResult<()> {
        if pos > self.cursor {
            return Err(CodegenError::Internal(format!(
                "stack rewind forward from ${:04X} to ${pos:04X}",
                self.cursor
            )));
        }
        self.cursor = pos;
        Ok(())
    }

    pub fn high_water_mark(&self) -> u32 {
        self.high_water
    }
}
