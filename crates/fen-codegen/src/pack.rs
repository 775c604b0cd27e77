//! Pack container: ledger plus framed chunks.
//!
//! ```text
//! "fenp" | version: u32
//! spk5 📦 | 0        |
//! sti0 📜 | len      | type info
//! zme0 📌 | len      | fixed-layout arena
//! dme0 💻 | len      | blob arena
//! ldg0 🗒 | len      | { kind: u32, payload_pos: u32 }* | { 0, 0 }
//! ```

use log::debug;

use crate::arena::ArenaPos;
use crate::constants::ConstantPool;
use crate::error::{CodegenError, CodegenResult};
use crate::types::*;

/// Ledger entries in registration order, terminated by an all-zero entry.
pub fn ledger(pool: &ConstantPool) -> Vec<u8> {
    let mut out = Vec::with_capacity((pool.len() + 1) * 8);
    for constant in pool.constants() {
        out.extend_from_slice(&constant.kind.ledger_id().to_le_bytes());
        out.extend_from_slice(&constant.header.pos.offset().to_le_bytes());
    }
    out.extend_from_slice(&[0; 8]);
    out
}

/// Assemble the final artifact. Refuses to pack while any function stub is
/// still unpatched.
pub fn write_pack(pool: &ConstantPool, type_info: &[u8]) -> CodegenResult<Vec<u8>> {
    pool.check_patched()?;

    let ledger = ledger(pool);
    let chunks: [(ChunkTag, &[u8]); 5] = [
        (CHUNK_PACK, &[]),
        (CHUNK_TYPE_INFO, type_info),
        (CHUNK_ZERO_MEMORY, pool.zero_memory().octets()),
        (CHUNK_DYNAMIC_MEMORY, pool.dynamic_memory().octets()),
        (CHUNK_LEDGER, &ledger),
    ];

    let mut out = Vec::new();
    out.extend_from_slice(&PACK_MAGIC);
    out.extend_from_slice(&PACK_FORMAT_VERSION.to_le_bytes());
    for (tag, payload) in chunks {
        write_chunk(&mut out, tag, payload)?;
    }

    debug!(
        "packed {} constants: zero memory {} octets, dynamic memory {} octets, total {}",
        pool.len(),
        pool.zero_memory().len(),
        pool.dynamic_memory().len(),
        out.len()
    );
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, tag: ChunkTag, payload: &[u8]) -> CodegenResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CodegenError::LimitExceeded(format!(
            "chunk {} of {} octets",
            String::from_utf8_lossy(&tag.tag),
            payload.len()
        ))
    })?;
    out.extend_from_slice(&tag.tag);
    out.extend_from_slice(&tag.icon);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Reading
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub tag: ChunkTag,
    pub payload: Vec<u8>,
}

/// A parsed pack, used by tests and tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackReader {
    pub version: u32,
    pub chunks: Vec<Chunk>,
}

impl PackReader {
    pub fn parse(octets: &[u8]) -> CodegenResult<Self> {
        let malformed = |pc: usize, message: &str| CodegenError::Malformed {
            pc,
            message: message.to_string(),
        };
        if octets.len() < 8 || octets[..4] != PACK_MAGIC {
            return Err(malformed(0, "missing pack magic"));
        }
        let version = u32::from_le_bytes([octets[4], octets[5], octets[6], octets[7]]);

        let mut chunks = Vec::new();
        let mut pos = 8;
        while pos < octets.len() {
            let header = octets
                .get(pos..pos + 12)
                .ok_or_else(|| malformed(pos, "truncated chunk header"))?;
            let tag = ChunkTag {
                tag: [header[0], header[1], header[2], header[3]],
                icon: [header[4], header[5], header[6], header[7]],
            };
            let len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
            let start = pos + 12;
            let payload = octets
                .get(start..start + len)
                .ok_or_else(|| malformed(start, "truncated chunk payload"))?;
            chunks.push(Chunk {
                tag,
                payload: payload.to_vec(),
            });
            pos = start + len;
        }
        Ok(Self { version, chunks })
    }

    pub fn chunk(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.chunks
            .iter()
            .find(|c| &c.tag.tag == tag)
            .map(|c| c.payload.as_slice())
    }

    /// `(kind, payload_pos)` pairs, without the terminator.
    pub fn ledger(&self) -> CodegenResult<Vec<(u32, u32)>> {
        let raw = self
            .chunk(&CHUNK_LEDGER.tag)
            .ok_or_else(|| CodegenError::Malformed {
                pc: 0,
                message: "no ledger chunk".into(),
            })?;
        let mut entries = Vec::new();
        for (index, entry) in raw.chunks(8).enumerate() {
            if entry.len() != 8 {
                return Err(CodegenError::Malformed {
                    pc: index * 8,
                    message: "partial ledger entry".into(),
                });
            }
            let kind = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let pos = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            if kind == 0 && pos == 0 {
                return Ok(entries);
            }
            entries.push((kind, pos));
        }
        Err(CodegenError::Malformed {
            pc: raw.len(),
            message: "ledger is not terminated".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FunctionAbi;

    fn pool() -> ConstantPool {
        ConstantPool::new(DEFAULT_ZERO_MEMORY_CAPACITY, DEFAULT_DYNAMIC_MEMORY_CAPACITY)
    }

    #[test]
    fn test_empty_pool_ledger_is_terminator_only() {
        assert_eq!(ledger(&pool()), vec![0; 8]);
    }

    #[test]
    fn test_chunk_order_and_framing() {
        let mut pool = pool();
        pool.allocate_string("hi").unwrap();
        let octets = write_pack(&pool, b"types").unwrap();
        assert_eq!(&octets[..4], b"fenp");

        let pack = PackReader::parse(&octets).unwrap();
        assert_eq!(pack.version, PACK_FORMAT_VERSION);
        let tags: Vec<_> = pack.chunks.iter().map(|c| c.tag).collect();
        assert_eq!(
            tags,
            vec![
                CHUNK_PACK,
                CHUNK_TYPE_INFO,
                CHUNK_ZERO_MEMORY,
                CHUNK_DYNAMIC_MEMORY,
                CHUNK_LEDGER
            ]
        );
        assert_eq!(pack.chunk(b"spk5"), Some(&[][..]));
        assert_eq!(pack.chunk(b"sti0"), Some(&b"types"[..]));
        assert_eq!(pack.chunk(b"dme0"), Some(&b"hi\0"[..]));
        assert_eq!(pack.ledger().unwrap(), vec![(1, 0)]);
        // spk5 header sits right after the outer header, icon included.
        assert_eq!(&octets[8..16], b"spk5\xF0\x9F\x93\xA6");
    }

    #[test]
    fn test_unpatched_stub_refuses_to_pack() {
        let mut pool = pool();
        pool.allocate_function_stub("main.f", FunctionAbi::default())
            .unwrap();
        assert!(matches!(
            write_pack(&pool, &[]),
            Err(CodegenError::UnpatchedFunction(_))
        ));
    }

    #[test]
    fn test_reader_rejects_garbage() {
        assert!(PackReader::parse(b"nope").is_err());
        assert!(PackReader::parse(b"fenp\x01\x00\x00\x00spk5").is_err());
    }
}
