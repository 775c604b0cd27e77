//! Binary layout constants shared by the emitter, the constant pool and the packer.
//!
//! # Constant headers (fixed-layout arena)
//!
//! ```text
//! string / resource name : 16 bytes  { blob_ptr: u64, length: u64 }
//! function               : 88 bytes  11 × u64, see FN_* offsets
//! ```
//!
//! # Pack container
//!
//! ```text
//! "fenp" | version: u32
//! chunk* : tag[4] | icon[4] | payload_len: u32 | payload
//! ```
//!
//! All integers are little-endian.

use fen_types::MemoryAlign;

// ── Arenas ───────────────────────────────────────────────────────────────────

/// Default capacity of the blob ("dynamic memory") arena.
pub const DEFAULT_DYNAMIC_MEMORY_CAPACITY: usize = 128 * 1024;
/// Default capacity of the fixed-layout ("zero memory") arena.
pub const DEFAULT_ZERO_MEMORY_CAPACITY: usize = 32 * 1024;
/// Default size of the per-function evaluation stack.
pub const DEFAULT_STACK_CAPACITY: u32 = 32 * 1024;

// ── Stack frames ─────────────────────────────────────────────────────────────

/// Alignment of a call frame base. Return regions at call sites use it so
/// argument offsets relative to the new base match the callee's own layout.
pub const FRAME_ALIGN: MemoryAlign = MemoryAlign::EIGHT;

// ── String header ────────────────────────────────────────────────────────────

pub const STRING_HEADER_SIZE: usize = 16;
pub const STRING_HEADER_ALIGN: MemoryAlign = MemoryAlign::EIGHT;

// ── Function descriptor ──────────────────────────────────────────────────────
// Byte offsets of each u64 slot, in declaration order.

pub const FUNCTION_DESCRIPTOR_SIZE: usize = 88;
pub const FUNCTION_DESCRIPTOR_ALIGN: MemoryAlign = MemoryAlign::EIGHT;

pub const FN_CURRY_OCTET_SIZE: usize = 0;
pub const FN_CURRY_OCTETS_PTR: usize = 8;
pub const FN_CURRY_FUNC_PTR: usize = 16;
pub const FN_PARAMETER_COUNT: usize = 24;
pub const FN_PARAMETER_OCTET_SIZE: usize = 32;
pub const FN_OPCODES_PTR: usize = 40;
pub const FN_OPCODES_LEN: usize = 48;
pub const FN_TOTAL_STACK_USED: usize = 56;
pub const FN_RETURN_OCTET_SIZE: usize = 64;
pub const FN_DEBUG_NAME_PTR: usize = 72;
/// Only the low four bytes of this slot are used.
pub const FN_TYPE_INDEX: usize = 80;

// ── Code ─────────────────────────────────────────────────────────────────────

/// Placeholder written where a label delta will be patched.
pub const LABEL_PLACEHOLDER: u16 = 0xFFFF;
/// Tag that marks the default arm of an `EnumCase`.
pub const ENUM_DEFAULT_TAG: u8 = 0xFF;

// ── Pack container ───────────────────────────────────────────────────────────

pub const PACK_MAGIC: [u8; 4] = *b"fenp";
pub const PACK_FORMAT_VERSION: u32 = 1;

/// A framed chunk: four-octet tag plus four-octet icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTag {
    pub tag: [u8; 4],
    pub icon: [u8; 4],
}

/// Pack marker, empty payload. 📦
pub const CHUNK_PACK: ChunkTag = ChunkTag {
    tag: *b"spk5",
    icon: [0xF0, 0x9F, 0x93, 0xA6],
};
/// Type information, copied through. 📜
pub const CHUNK_TYPE_INFO: ChunkTag = ChunkTag {
    tag: *b"sti0",
    icon: [0xF0, 0x9F, 0x93, 0x9C],
};
/// Fixed-layout arena. 📌
pub const CHUNK_ZERO_MEMORY: ChunkTag = ChunkTag {
    tag: *b"zme0",
    icon: [0xF0, 0x9F, 0x93, 0x8C],
};
/// Blob arena. 💻
pub const CHUNK_DYNAMIC_MEMORY: ChunkTag = ChunkTag {
    tag: *b"dme0",
    icon: [0xF0, 0x9F, 0x92, 0xBB],
};
/// Constant ledger. 🗒
pub const CHUNK_LEDGER: ChunkTag = ChunkTag {
    tag: *b"ldg0",
    icon: [0xF0, 0x9F, 0x97, 0x92],
};

/// Compiler version, recorded by the driver next to the pack digest.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");
