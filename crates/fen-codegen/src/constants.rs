//! Constant pool: the single registry of runtime addresses for strings,
//! resource names and function descriptors.
//!
//! Every constant owns a header in the fixed-layout arena; variable-length
//! payloads (string bytes, opcodes, debug names) go to the blob arena.
//! Allocation is idempotent per `(kind, key)` and registration order is
//! preserved, because it becomes the ledger order the VM indexes by.

use std::collections::HashMap;

use fen_types::ast::TypeId;
use fen_types::MemoryAlign;

use crate::arena::{ArenaMark, ArenaPos, DynamicMemory, DynamicMemoryRange, ZeroMemory, ZeroMemoryRange};
use crate::error::{CodegenError, CodegenResult};
use crate::layout::ZeroMemoryPos;
use crate::types::*;

/// Ledger kind of a constant. Zero is reserved for the ledger terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    String = 1,
    ResourceName = 2,
    Function = 3,
    ExternalFunction = 4,
}

impl ConstantKind {
    pub fn ledger_id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::ResourceName => "resource name",
            Self::Function => "function",
            Self::ExternalFunction => "external function",
        }
    }
}

/// Index of a constant in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantId(pub usize);

/// Call ABI of a function, as recorded on its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionAbi {
    pub return_octet_size: u32,
    pub parameter_count: u32,
    /// Octets from the end of the return region to the end of the last parameter.
    pub parameter_octet_size: u32,
}

/// Values known only after a body has been compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub total_stack_used: u32,
    pub type_index: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// Header is complete.
    Ready,
    /// Descriptor reserved, body not compiled yet.
    Stub,
    /// Body failed under errors-as-warnings; packed without opcodes.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub id: ConstantId,
    pub kind: ConstantKind,
    /// The string payload or the fully qualified function name.
    pub key: String,
    pub header: ZeroMemoryRange,
    pub state: PatchState,
    abi: FunctionAbi,
}

impl Constant {
    pub fn pos(&self) -> ZeroMemoryPos {
        self.header.pos
    }

    pub fn abi(&self) -> FunctionAbi {
        self.abi
    }

    pub fn is_function(&self) -> bool {
        matches!(
            self.kind,
            ConstantKind::Function | ConstantKind::ExternalFunction
        )
    }
}

/// Pool state before a function body is lowered; see
/// [`ConstantPool::abandon_function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCheckpoint {
    constants: usize,
    zero_memory: ArenaMark,
    dynamic_memory: ArenaMark,
}

pub struct ConstantPool {
    constants: Vec<Constant>,
    index: HashMap<(ConstantKind, String), ConstantId>,
    zero_memory: ZeroMemory,
    dynamic_memory: DynamicMemory,
}

impl ConstantPool {
    pub fn new(zero_memory_capacity: usize, dynamic_memory_capacity: usize) -> Self {
        Self {
            constants: Vec::new(),
            index: HashMap::new(),
            zero_memory: ZeroMemory::with_capacity(zero_memory_capacity),
            dynamic_memory: DynamicMemory::with_capacity(dynamic_memory_capacity),
        }
    }

    // ── Strings ──────────────────────────────────────────────────────────

    pub fn allocate_string(&mut self, s: &str) -> CodegenResult<Constant> {
        self.allocate_text(ConstantKind::String, s)
    }

    pub fn allocate_resource_name(&mut self, s: &str) -> CodegenResult<Constant> {
        self.allocate_text(ConstantKind::ResourceName, s)
    }

    fn allocate_text(&mut self, kind: ConstantKind, s: &str) -> CodegenResult<Constant> {
        if let Some(existing) = self.lookup(kind, s) {
            return Ok(existing.clone());
        }

        let blob = self.write_null_terminated(s, kind.name())?;
        let mut header = [0u8; STRING_HEADER_SIZE];
        put_u64(&mut header, 0, u64::from(blob.pos.offset()));
        put_u64(&mut header, 8, s.len() as u64);
        let header = self
            .zero_memory
            .write(&header, STRING_HEADER_ALIGN, &format!("{} {s:?}", kind.name()))?;

        Ok(self.register(kind, s, header, PatchState::Ready, FunctionAbi::default()))
    }

    pub fn find_string(&self, s: &str) -> Option<&Constant> {
        self.lookup(ConstantKind::String, s)
    }

    // ── Functions ────────────────────────────────────────────────────────

    /// Reserve a zeroed descriptor for a function whose body is compiled later.
    pub fn allocate_function_stub(
        &mut self,
        fq_name: &str,
        abi: FunctionAbi,
    ) -> CodegenResult<Constant> {
        if let Some(existing) = self.lookup(ConstantKind::Function, fq_name) {
            return Ok(existing.clone());
        }
        let header = self.zero_memory.allocate(
            FUNCTION_DESCRIPTOR_SIZE,
            FUNCTION_DESCRIPTOR_ALIGN,
            &format!("fn {fq_name}"),
        )?;
        Ok(self.register(ConstantKind::Function, fq_name, header, PatchState::Stub, abi))
    }

    /// Register a host function. Its descriptor is complete immediately;
    /// the VM binds the implementation at load time.
    pub fn allocate_external_function_stub(
        &mut self,
        fq_name: &str,
        abi: FunctionAbi,
    ) -> CodegenResult<Constant> {
        if let Some(existing) = self.lookup(ConstantKind::ExternalFunction, fq_name) {
            return Ok(existing.clone());
        }
        let name = self.write_null_terminated(fq_name, "external fn name")?;

        let mut descriptor = [0u8; FUNCTION_DESCRIPTOR_SIZE];
        put_abi(&mut descriptor, abi);
        put_u64(&mut descriptor, FN_DEBUG_NAME_PTR, u64::from(name.pos.offset()));
        let header = self.zero_memory.write(
            &descriptor,
            FUNCTION_DESCRIPTOR_ALIGN,
            &format!("external fn {fq_name}"),
        )?;
        Ok(self.register(
            ConstantKind::ExternalFunction,
            fq_name,
            header,
            PatchState::Ready,
            abi,
        ))
    }

    /// Write compiled opcodes and patch the stub's descriptor.
    pub fn finalize_function(
        &mut self,
        id: ConstantId,
        opcodes: &[u8],
        metadata: FunctionMetadata,
    ) -> CodegenResult<DynamicMemoryRange> {
        let constant = self.stub(id)?;
        let (name, header, abi) = (constant.key.clone(), constant.header, constant.abi);

        let code = self
            .dynamic_memory
            .write(opcodes, MemoryAlign::ONE, &format!("opcodes {name}"))?;
        let debug_name = self.write_null_terminated(&name, "fn name")?;

        let mut descriptor = [0u8; FUNCTION_DESCRIPTOR_SIZE];
        put_abi(&mut descriptor, abi);
        put_u64(&mut descriptor, FN_OPCODES_PTR, u64::from(code.pos.offset()));
        put_u64(&mut descriptor, FN_OPCODES_LEN, u64::from(code.size));
        put_u64(&mut descriptor, FN_TOTAL_STACK_USED, u64::from(metadata.total_stack_used));
        put_u64(&mut descriptor, FN_DEBUG_NAME_PTR, u64::from(debug_name.pos.offset()));
        put_u64(&mut descriptor, FN_TYPE_INDEX, u64::from(metadata.type_index.0));
        self.zero_memory.overwrite(header.pos, &descriptor)?;

        self.constants[id.0].state = PatchState::Ready;
        Ok(code)
    }

    pub fn checkpoint(&self) -> PoolCheckpoint {
        PoolCheckpoint {
            constants: self.constants.len(),
            zero_memory: self.zero_memory.mark(),
            dynamic_memory: self.dynamic_memory.mark(),
        }
    }

    /// Give up on a stub whose body failed to compile. Constants and arena
    /// octets added since `since` are dropped; the descriptor keeps its ABI
    /// and debug name but no opcodes.
    pub fn abandon_function(&mut self, id: ConstantId, since: PoolCheckpoint) -> CodegenResult<()> {
        let constant = self.stub(id)?;
        let (name, header, abi) = (constant.key.clone(), constant.header, constant.abi);
        if id.0 >= since.constants {
            return Err(CodegenError::Internal(format!(
                "checkpoint for `{name}` was taken before its stub"
            )));
        }

        for dropped in self.constants.drain(since.constants..) {
            self.index.remove(&(dropped.kind, dropped.key));
        }
        self.zero_memory.truncate(since.zero_memory)?;
        self.dynamic_memory.truncate(since.dynamic_memory)?;

        let debug_name = self.write_null_terminated(&name, "fn name")?;
        let mut descriptor = [0u8; FUNCTION_DESCRIPTOR_SIZE];
        put_abi(&mut descriptor, abi);
        put_u64(&mut descriptor, FN_DEBUG_NAME_PTR, u64::from(debug_name.pos.offset()));
        self.zero_memory.overwrite(header.pos, &descriptor)?;

        self.constants[id.0].state = PatchState::Abandoned;
        Ok(())
    }

    pub fn find_function(&self, fq_name: &str) -> Option<&Constant> {
        self.lookup(ConstantKind::Function, fq_name)
    }

    pub fn find_external_function(&self, fq_name: &str) -> Option<&Constant> {
        self.lookup(ConstantKind::ExternalFunction, fq_name)
    }

    /// A compiled function first, then a host function of the same name.
    pub fn find_callable(&self, fq_name: &str) -> Option<&Constant> {
        self.find_function(fq_name)
            .or_else(|| self.find_external_function(fq_name))
    }

    // ── Pack support ─────────────────────────────────────────────────────

    /// Fails on the first function that was reserved but neither compiled
    /// nor abandoned.
    pub fn check_patched(&self) -> CodegenResult<()> {
        match self.constants.iter().find(|c| c.state == PatchState::Stub) {
            Some(stub) => Err(CodegenError::UnpatchedFunction(stub.key.clone())),
            None => Ok(()),
        }
    }

    /// Constants in registration order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn zero_memory(&self) -> &ZeroMemory {
        &self.zero_memory
    }

    pub fn dynamic_memory(&self) -> &DynamicMemory {
        &self.dynamic_memory
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn lookup(&self, kind: ConstantKind, key: &str) -> Option<&Constant> {
        self.index
            .get(&(kind, key.to_string()))
            .map(|id| &self.constants[id.0])
    }

    fn stub(&self, id: ConstantId) -> CodegenResult<&Constant> {
        let constant = self
            .constants
            .get(id.0)
            .ok_or_else(|| CodegenError::Internal(format!("no constant #{}", id.0)))?;
        if constant.kind != ConstantKind::Function || constant.state != PatchState::Stub {
            return Err(CodegenError::Internal(format!(
                "{} `{}` is not an open function stub",
                constant.kind.name(),
                constant.key
            )));
        }
        Ok(constant)
    }

    fn register(
        &mut self,
        kind: ConstantKind,
        key: &str,
        header: ZeroMemoryRange,
        state: PatchState,
        abi: FunctionAbi,
    ) -> Constant {
        let id = ConstantId(self.constants.len());
        let constant = Constant {
            id,
            kind,
            key: key.to_string(),
            header,
            state,
            abi,
        };
        self.index.insert((kind, key.to_string()), id);
        self.constants.push(constant.clone());
        constant
    }

    fn write_null_terminated(&mut self, s: &str, tag: &str) -> CodegenResult<DynamicMemoryRange> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.dynamic_memory.write(&bytes, MemoryAlign::ONE, tag)
    }
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_abi(descriptor: &mut [u8; FUNCTION_DESCRIPTOR_SIZE], abi: FunctionAbi) {
    put_u64(descriptor, FN_PARAMETER_COUNT, u64::from(abi.parameter_count));
    put_u64(descriptor, FN_PARAMETER_OCTET_SIZE, u64::from(abi.parameter_octet_size));
    put_u64(descriptor, FN_RETURN_OCTET_SIZE, u64::from(abi.return_octet_size));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ConstantPool {
        ConstantPool::new(DEFAULT_ZERO_MEMORY_CAPACITY, DEFAULT_DYNAMIC_MEMORY_CAPACITY)
    }

    fn u64_at(bytes: &[u8], offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    fn abi() -> FunctionAbi {
        FunctionAbi {
            return_octet_size: 1,
            parameter_count: 1,
            parameter_octet_size: 4,
        }
    }

    #[test]
    fn test_string_header_points_at_blob() {
        let mut pool = pool();
        let c = pool.allocate_string("hello").unwrap();
        assert_eq!(c.kind, ConstantKind::String);
        let header = pool.zero_memory().read(c.header).unwrap();
        assert_eq!(header.len(), STRING_HEADER_SIZE);
        let ptr = u64_at(header, 0) as usize;
        assert_eq!(u64_at(header, 8), 5);
        assert_eq!(&pool.dynamic_memory().octets()[ptr..ptr + 6], b"hello\0");
    }

    #[test]
    fn test_string_dedup() {
        let mut pool = pool();
        let a = pool.allocate_string("Ossian").unwrap();
        let b = pool.allocate_string("Ossian").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.dynamic_memory().octets(), b"Ossian\0");
        assert_eq!(pool.find_string("Ossian").map(|c| c.id), Some(a.id));
    }

    #[test]
    fn test_resource_name_is_separate_from_string() {
        let mut pool = pool();
        let s = pool.allocate_string("icon.png").unwrap();
        let r = pool.allocate_resource_name("icon.png").unwrap();
        assert_ne!(s.id, r.id);
        assert_eq!(r.kind.ledger_id(), 2);
    }

    #[test]
    fn test_stub_is_zeroed_until_finalized() {
        let mut pool = pool();
        let f = pool.allocate_function_stub("main.f", abi()).unwrap();
        assert_eq!(f.state, PatchState::Stub);
        assert!(pool.zero_memory().read(f.header).unwrap().iter().all(|b| *b == 0));
        assert!(matches!(
            pool.check_patched(),
            Err(CodegenError::UnpatchedFunction(name)) if name == "main.f"
        ));

        let code = pool
            .finalize_function(
                f.id,
                &[0x0a],
                FunctionMetadata {
                    total_stack_used: 12,
                    type_index: TypeId(7),
                },
            )
            .unwrap();
        pool.check_patched().unwrap();

        let descriptor = pool.zero_memory().read(f.header).unwrap();
        assert_eq!(u64_at(descriptor, FN_OPCODES_PTR), u64::from(code.pos.0));
        assert_eq!(u64_at(descriptor, FN_OPCODES_LEN), 1);
        assert_eq!(u64_at(descriptor, FN_PARAMETER_COUNT), 1);
        assert_eq!(u64_at(descriptor, FN_PARAMETER_OCTET_SIZE), 4);
        assert_eq!(u64_at(descriptor, FN_RETURN_OCTET_SIZE), 1);
        assert_eq!(u64_at(descriptor, FN_TOTAL_STACK_USED), 12);
        assert_eq!(u64_at(descriptor, FN_TYPE_INDEX), 7);
        assert_eq!(u64_at(descriptor, FN_CURRY_FUNC_PTR), 0);
        let name = u64_at(descriptor, FN_DEBUG_NAME_PTR) as usize;
        assert_eq!(&pool.dynamic_memory().octets()[name..name + 7], b"main.f\0");
    }

    #[test]
    fn test_finalize_twice_is_internal_error() {
        let mut pool = pool();
        let f = pool.allocate_function_stub("main.f", abi()).unwrap();
        let meta = FunctionMetadata {
            total_stack_used: 0,
            type_index: TypeId(0),
        };
        pool.finalize_function(f.id, &[0x0a], meta).unwrap();
        assert!(matches!(
            pool.finalize_function(f.id, &[0x0a], meta),
            Err(CodegenError::Internal(_))
        ));
    }

    #[test]
    fn test_stub_position_is_stable() {
        let mut pool = pool();
        let f = pool.allocate_function_stub("main.f", abi()).unwrap();
        pool.allocate_string("later").unwrap();
        let again = pool.allocate_function_stub("main.f", abi()).unwrap();
        assert_eq!(f.header, again.header);
    }

    #[test]
    fn test_abandoned_function_packs_without_opcodes() {
        let mut pool = pool();
        let f = pool.allocate_function_stub("main.broken", abi()).unwrap();
        let since = pool.checkpoint();
        pool.abandon_function(f.id, since).unwrap();
        pool.check_patched().unwrap();
        let descriptor = pool.zero_memory().read(f.header).unwrap();
        assert_eq!(u64_at(descriptor, FN_OPCODES_LEN), 0);
        assert_eq!(u64_at(descriptor, FN_PARAMETER_COUNT), 1);
    }

    #[test]
    fn test_abandon_drops_constants_from_the_failed_body() {
        let mut pool = pool();
        let f = pool.allocate_function_stub("main.broken", abi()).unwrap();
        pool.allocate_string("shared").unwrap();
        let since = pool.checkpoint();
        let zero_len = pool.zero_memory().len();

        // Lowering the body reused one string and added two constants.
        pool.allocate_string("shared").unwrap();
        pool.allocate_string("only here").unwrap();
        pool.allocate_resource_name("icon.png").unwrap();
        pool.abandon_function(f.id, since).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.zero_memory().len(), zero_len);
        assert!(pool.find_string("only here").is_none());
        assert!(pool.find_string("shared").is_some());
        let name = &pool.dynamic_memory().octets()[7..];
        assert_eq!(name, b"main.broken\0");

        // A later function can still register the dropped text.
        let again = pool.allocate_string("only here").unwrap();
        assert_eq!(again.id, ConstantId(2));
    }

    #[test]
    fn test_external_descriptor_written_at_registration() {
        let mut pool = pool();
        let e = pool
            .allocate_external_function_stub("host.log", abi())
            .unwrap();
        assert_eq!(e.state, PatchState::Ready);
        assert!(pool.find_function("host.log").is_none());
        assert_eq!(pool.find_callable("host.log").map(|c| c.id), Some(e.id));
        let descriptor = pool.zero_memory().read(e.header).unwrap();
        assert_eq!(u64_at(descriptor, FN_RETURN_OCTET_SIZE), 1);
        assert_eq!(u64_at(descriptor, FN_OPCODES_LEN), 0);
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut pool = pool();
        pool.allocate_string("b").unwrap();
        pool.allocate_function_stub("main.f", abi()).unwrap();
        pool.allocate_string("a").unwrap();
        pool.allocate_string("b").unwrap();
        let keys: Vec<_> = pool.constants().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "main.f", "a"]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn repeated_strings_are_stored_once(
            words in proptest::collection::vec("[a-z]{1,6}", 1..20),
            repeats in 1usize..4,
        ) {
            let mut pool = ConstantPool::new(DEFAULT_ZERO_MEMORY_CAPACITY, DEFAULT_DYNAMIC_MEMORY_CAPACITY);
            let mut first = HashMap::new();
            for _ in 0..repeats {
                for w in &words {
                    let c = pool.allocate_string(w).unwrap();
                    let pos = *first.entry(w.clone()).or_insert(c.header.pos);
                    prop_assert_eq!(pos, c.header.pos);
                }
            }
            let distinct: std::collections::HashSet<_> = words.iter().collect();
            prop_assert_eq!(pool.len(), distinct.len());
            let blob_len: usize = distinct.iter().map(|w| w.len() + 1).sum();
            prop_assert_eq!(pool.dynamic_memory().len(), blob_len);
        }
    }
}
