//! Integration tests for the pack container: chunk framing, ledger order
//! and the function descriptors the VM reads.

use fen_codegen::source_map::FunctionKind;
use fen_codegen::types::*;
use fen_codegen::{compile_with_config, CodegenConfig, CompiledPack, PackReader};
use fen_types::ast::*;
use fen_types::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn func(name: &str, params: Vec<Param>, return_type: Type, body: Expr) -> FunctionDef {
    FunctionDef {
        name: Ident::new(name, Span::synthetic()),
        params,
        return_type,
        type_index: TypeId(5),
        body,
        span: Span::new(2, 1, 2, 30),
    }
}

fn sample_program() -> Program {
    Program {
        functions: vec![
            func(
                "main.id",
                vec![Param::new("x", Type::int())],
                Type::int(),
                Expr::var("x", Type::int()),
            ),
            func("main.hello", vec![], Type::string(), Expr::string("hello")),
        ],
        externals: vec![ExternalFunctionDecl {
            name: Ident::new("host.log", Span::synthetic()),
            params: vec![Param::new("msg", Type::string())],
            return_type: Type::int(),
            span: Span::synthetic(),
        }],
        type_info: b"type-info".to_vec(),
    }
}

fn build(program: &Program, config: &CodegenConfig) -> (CompiledPack, PackReader) {
    let pack = compile_with_config(program, config).unwrap_or_else(|e| panic!("codegen failed: {e}"));
    let reader = PackReader::parse(&pack.octets).unwrap();
    (pack, reader)
}

fn u64_at(octets: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&octets[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn descriptor(reader: &PackReader, pos: u32) -> Vec<u8> {
    let zero = reader.chunk(b"zme0").unwrap();
    let start = pos as usize;
    zero[start..start + FUNCTION_DESCRIPTOR_SIZE].to_vec()
}

fn c_string(blob: &[u8], pos: u64) -> &[u8] {
    let start = pos as usize;
    let len = blob[start..].iter().position(|b| *b == 0).unwrap();
    &blob[start..start + len]
}

// ══════════════════════════════════════════════════════════════════════════════
// Container
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_chunks_in_fixed_order() {
    let (_, reader) = build(&sample_program(), &CodegenConfig::default());
    let tags: Vec<[u8; 4]> = reader.chunks.iter().map(|c| c.tag.tag).collect();
    assert_eq!(tags, vec![*b"spk5", *b"sti0", *b"zme0", *b"dme0", *b"ldg0"]);
    assert_eq!(reader.version, PACK_FORMAT_VERSION);
    assert!(reader.chunk(b"spk5").unwrap().is_empty());
    assert_eq!(reader.chunk(b"sti0").unwrap(), b"type-info");
}

#[test]
fn test_ledger_follows_registration_order() {
    let (_, reader) = build(&sample_program(), &CodegenConfig::default());
    // host functions, then every stub, then constants met while lowering
    assert_eq!(
        reader.ledger().unwrap(),
        vec![(4, 0), (3, 88), (3, 176), (1, 264)]
    );
    let raw = reader.chunk(b"ldg0").unwrap();
    assert_eq!(raw.len(), 5 * 8);
    assert_eq!(&raw[32..], &[0; 8]);
}

#[test]
fn test_function_descriptor_contents() {
    let (pack, reader) = build(&sample_program(), &CodegenConfig::default());
    let entry = pack.source_map.find_by_name("main.id").unwrap();
    let desc = descriptor(&reader, entry.descriptor_pos);
    let blob = reader.chunk(b"dme0").unwrap();

    assert_eq!(u64_at(&desc, FN_PARAMETER_COUNT), 1);
    assert_eq!(u64_at(&desc, FN_PARAMETER_OCTET_SIZE), 4);
    assert_eq!(u64_at(&desc, FN_RETURN_OCTET_SIZE), 4);
    assert_eq!(u64_at(&desc, FN_TOTAL_STACK_USED), 8);
    assert_eq!(u64_at(&desc, FN_TYPE_INDEX), 5);
    assert_eq!(u64_at(&desc, FN_CURRY_OCTET_SIZE), 0);

    let opcodes_pos = u64_at(&desc, FN_OPCODES_PTR);
    let opcodes_len = u64_at(&desc, FN_OPCODES_LEN);
    assert_eq!(opcodes_pos, u64::from(entry.opcodes_pos));
    assert_eq!(opcodes_len, u64::from(entry.opcodes_len));
    let code = &blob[opcodes_pos as usize..(opcodes_pos + opcodes_len) as usize];
    assert_eq!(code, pack.function("main.id").unwrap().octets.as_slice());

    assert_eq!(c_string(blob, u64_at(&desc, FN_DEBUG_NAME_PTR)), b"main.id");
}

#[test]
fn test_external_descriptor_has_abi_and_name_only() {
    let (pack, reader) = build(&sample_program(), &CodegenConfig::default());
    let entry = pack.source_map.find_by_name("host.log").unwrap();
    assert_eq!(entry.kind, FunctionKind::External);
    let desc = descriptor(&reader, entry.descriptor_pos);
    assert_eq!(u64_at(&desc, FN_PARAMETER_COUNT), 1);
    assert_eq!(u64_at(&desc, FN_RETURN_OCTET_SIZE), 4);
    assert_eq!(u64_at(&desc, FN_OPCODES_LEN), 0);
    let blob = reader.chunk(b"dme0").unwrap();
    assert_eq!(c_string(blob, u64_at(&desc, FN_DEBUG_NAME_PTR)), b"host.log");
}

#[test]
fn test_string_header_points_at_blob() {
    let (_, reader) = build(&sample_program(), &CodegenConfig::default());
    let zero = reader.chunk(b"zme0").unwrap();
    let blob = reader.chunk(b"dme0").unwrap();
    let header = 264;
    let ptr = u64_at(zero, header);
    let len = u64_at(zero, header + 8);
    assert_eq!(len, 5);
    assert_eq!(c_string(blob, ptr), b"hello");
}

#[test]
fn test_abandoned_function_is_packed_without_opcodes() {
    let mut program = sample_program();
    program.functions.push(func(
        "main.broken",
        vec![],
        Type::int(),
        Expr::var("missing", Type::int()),
    ));
    let config = CodegenConfig {
        errors_as_warnings: true,
        ..CodegenConfig::default()
    };
    let (pack, reader) = build(&program, &config);
    assert_eq!(pack.warnings.len(), 1);

    let entry = pack.source_map.find_by_name("main.broken").unwrap();
    assert_eq!(entry.kind, FunctionKind::Abandoned);
    let desc = descriptor(&reader, entry.descriptor_pos);
    assert_eq!(u64_at(&desc, FN_OPCODES_LEN), 0);
    assert_eq!(u64_at(&desc, FN_RETURN_OCTET_SIZE), 4);
    let blob = reader.chunk(b"dme0").unwrap();
    assert_eq!(c_string(blob, u64_at(&desc, FN_DEBUG_NAME_PTR)), b"main.broken");
}

#[test]
fn test_abandoned_function_leaves_no_constants_behind() {
    // broken = let s = "scratch" in missing
    let mut program = sample_program();
    program.functions.push(func(
        "main.broken",
        vec![],
        Type::int(),
        Expr::synthetic(
            ExprKind::Let {
                bindings: vec![LetBinding {
                    name: Ident::new("s", Span::synthetic()),
                    value: Expr::string("scratch"),
                }],
                body: Box::new(Expr::var("missing", Type::int())),
            },
            Type::int(),
        ),
    ));
    let config = CodegenConfig {
        errors_as_warnings: true,
        ..CodegenConfig::default()
    };
    let (pack, reader) = build(&program, &config);
    assert_eq!(pack.warnings.len(), 1);

    assert_eq!(
        reader.ledger().unwrap(),
        vec![(4, 0), (3, 88), (3, 176), (3, 264), (1, 352)]
    );
    let blob = reader.chunk(b"dme0").unwrap();
    assert!(!blob.windows(7).any(|w| w == b"scratch"));
    assert_eq!(reader.chunk(b"zme0").unwrap().len(), 352 + STRING_HEADER_SIZE);
}

#[test]
fn test_zero_memory_allocations_are_aligned() {
    let (_, reader) = build(&sample_program(), &CodegenConfig::default());
    for (_, pos) in reader.ledger().unwrap() {
        assert_eq!(pos % 8, 0);
    }
}
