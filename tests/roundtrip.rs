//! End-to-end scenarios: the text pipeline, the binary codec, and the round-trip laws tying
//! them together.

use wasm_syntax::{
    load_binary_module, parse_module, print_module, save_binary_module, validate_module,
    DataMode, FeatureSpec, InitializerExpression, LoadError, Module,
};

fn parse_ok(text: &str) -> Module {
    let (module, errors) = parse_module(text, FeatureSpec::default());
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    module
}

/// Resolves an error's locus back to a byte offset in the source.
fn error_offset(error: &wasm_syntax::Error) -> usize {
    error.locus.line_start_offset + error.locus.tabs as usize + error.locus.characters as usize
}

#[test]
fn minimal_module() {
    let module = parse_ok("(module)");

    assert!(module.types.is_empty());
    assert_eq!(module.functions.size(), 0);
    assert_eq!(module.tables.size(), 0);
    assert_eq!(module.memories.size(), 0);
    assert_eq!(module.globals.size(), 0);
    assert_eq!(module.exception_types.size(), 0);
    assert!(module.exports.is_empty());
    assert!(module.data_segments.is_empty());
    assert!(module.elem_segments.is_empty());
    assert_eq!(module.start_function_index, None);
    assert!(validate_module(&module).is_ok());
}

const IDENTITY: &str =
    r#"(module (func (export "id") (param i32) (result i32) local.get 0))"#;

#[test]
fn identity_function_and_export() {
    let module = parse_ok(IDENTITY);

    assert_eq!(module.functions.size(), 1);
    assert_eq!(module.exports.len(), 1);
    assert_eq!(module.exports[0].name, "id");
    assert_eq!(module.exports[0].index, 0);

    // The body is the single local.get plus the implicit end.
    let def = &module.functions.defs()[0];
    let ops: Vec<_> = wasm_syntax::operators::CodeReader::new(&def.code, &def.branch_tables)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].info().mnemonic, "local.get");
    assert_eq!(ops[1].info().mnemonic, "end");

    assert!(validate_module(&module).is_ok());
}

#[test]
fn forward_reference_resolves_without_diagnostics() {
    let module = parse_ok("(module (func call $g) (func $g))");

    assert_eq!(module.functions.size(), 2);
    let def = &module.functions.defs()[0];
    let ops: Vec<_> = wasm_syntax::operators::CodeReader::new(&def.code, &def.branch_tables)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ops[0].info().mnemonic, "call");
    assert_eq!(
        ops[0].imm,
        wasm_syntax::operators::Immediate::Call(1),
        "the call must resolve to function index 1"
    );
}

#[test]
fn unknown_name_is_a_single_localized_diagnostic() {
    let source = "(module (func call $nope))";
    let (_, errors) = parse_module(source, FeatureSpec::default());

    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unknown name"));
    assert_eq!(error_offset(&errors[0]), source.find("$nope").unwrap());
}

#[test]
fn validation_error_is_localized_to_the_offending_operator() {
    let source = "(module (func (result i32) i64.const 0))";
    let (_, errors) = parse_module(source, FeatureSpec::default());

    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("type mismatch"));
    let offset = error_offset(&errors[0]);
    let token_start = source.find("i64.const").unwrap();
    assert!(
        offset >= token_start && offset < token_start + "i64.const".len(),
        "locus {offset} must fall inside the i64.const token"
    );
}

#[test]
fn binary_round_trip_is_byte_exact() {
    let module = parse_ok(IDENTITY);
    let bytes = save_binary_module(&module).unwrap();

    let reloaded = load_binary_module(&bytes, FeatureSpec::default()).unwrap();
    assert!(reloaded.equals_ignoring_names(&module));

    let bytes_again = save_binary_module(&reloaded).unwrap();
    assert_eq!(bytes, bytes_again);
}

const ROUND_TRIP_SOURCES: &[&str] = &[
    "(module)",
    IDENTITY,
    r#"(module
        (memory 1 4)
        (global $counter (mut i64) (i64.const 0))
        (func (export "tick") (result i64)
            global.get $counter
            i64.const 1
            i64.add
            global.set $counter
            global.get $counter))"#,
    r#"(module
        (table 8 funcref)
        (type $binop (func (param i32 i32) (result i32)))
        (func $add (type $binop) local.get 0 local.get 1 i32.add)
        (func $dispatch (param i32 i32 i32) (result i32)
            local.get 1
            local.get 2
            local.get 0
            call_indirect (type $binop))
        (elem (i32.const 0) func $add))"#,
    r#"(module
        (memory 1)
        (func (export "fill") (param i32 i32)
            local.get 0
            i32.const 0
            local.get 1
            memory.fill)
        (data "passive"))"#,
    r#"(module
        (func (export "loops") (param i32) (result i32)
            (local i32)
            loop $again
                local.get 1
                i32.const 1
                i32.add
                local.set 1
                local.get 1
                local.get 0
                i32.lt_u
                br_if $again
            end
            local.get 1))"#,
    r#"(module
        (func (export "pick") (param i32) (result f64)
            local.get 0
            if (result f64)
                f64.const 0x1.8p1
            else
                f64.const -nan:0xdead
            end))"#,
];

#[test]
fn text_to_binary_to_text_is_idempotent() {
    for source in ROUND_TRIP_SOURCES {
        let module = parse_ok(source);
        let printed = print_module(&module);

        let bytes = save_binary_module(&module).unwrap();
        let reloaded = load_binary_module(&bytes, FeatureSpec::default()).unwrap();
        let reprinted = print_module(&reloaded);

        assert!(
            module.equals_ignoring_names(&reloaded),
            "binary round trip changed the module for:\n{source}"
        );
        assert_eq!(
            printed, reprinted,
            "printing after a binary round trip differs for:\n{source}"
        );
    }
}

#[test]
fn binary_to_text_to_binary_is_faithful() {
    for source in ROUND_TRIP_SOURCES {
        let bytes = save_binary_module(&parse_ok(source)).unwrap();

        let loaded = load_binary_module(&bytes, FeatureSpec::default()).unwrap();
        let printed = print_module(&loaded);
        let reparsed = parse_ok(&printed);
        let bytes_again = save_binary_module(&reparsed).unwrap();

        let strip = |bytes: &[u8]| {
            let module = load_binary_module(bytes, FeatureSpec::default()).unwrap();
            let mut module = module;
            module.remove_custom_sections("name");
            save_binary_module(&module).unwrap()
        };
        assert_eq!(
            strip(&bytes),
            strip(&bytes_again),
            "text round trip changed the binary for:\n{source}"
        );
    }
}

#[test]
fn text_and_binary_validation_verdicts_agree() {
    // A validation error injected into the binary directly must be rejected by the decoder
    // the same way the text parser rejects the equivalent source.
    let source = "(module (func (result i32) i64.const 0))";
    let (_, text_errors) = parse_module(source, FeatureSpec::default());
    assert!(text_errors.iter().any(|e| e.message.contains("type mismatch")));

    let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
    bytes.extend_from_slice(&[1, 5, 1, 0x60, 0, 1, 0x7F]); // type: () -> i32
    bytes.extend_from_slice(&[3, 2, 1, 0]); // function section
    bytes.extend_from_slice(&[10, 6, 1, 4, 0, 0x42, 0x00, 0x0B]); // i64.const 0; end

    match load_binary_module(&bytes, FeatureSpec::default()) {
        Err(LoadError::Invalid(message)) => assert!(message.contains("type mismatch")),
        other => panic!("expected an invalid-module error, got {other:?}"),
    }
}

#[test]
fn recursion_depth_is_bounded() {
    // Much deeper than max_syntax_recursion; must diagnose, not overflow the stack.
    let depth = 600;
    let mut source = String::from("(module (func ");
    for _ in 0..depth {
        source.push_str("(block ");
    }
    for _ in 0..depth {
        source.push(')');
    }
    source.push_str("))");

    let (_, errors) = parse_module(&source, FeatureSpec::default());
    assert!(
        errors.iter().any(|e| e.message.contains("recursion")),
        "expected a recursion-limit diagnostic, got: {errors:?}"
    );
}

#[test]
fn segments_and_start_survive_the_codec() {
    let module = parse_ok(
        r#"(module
            (memory 1)
            (func $init)
            (start $init)
            (data (i32.const 16) "\00\01\02")
            (data "passive"))"#,
    );
    let bytes = save_binary_module(&module).unwrap();
    let reloaded = load_binary_module(&bytes, FeatureSpec::default()).unwrap();

    assert_eq!(reloaded.start_function_index, Some(0));
    assert_eq!(reloaded.data_segments.len(), 2);
    assert_eq!(reloaded.data_segments[0].data, vec![0, 1, 2]);
    assert!(matches!(
        reloaded.data_segments[0].mode,
        DataMode::Active {
            memory_index: 0,
            offset: InitializerExpression::I32Const(16),
        }
    ));
    assert!(matches!(reloaded.data_segments[1].mode, DataMode::Passive));
}

#[test]
fn feature_gating_agrees_between_pipelines() {
    let source = "(module (func (result i32) i32.const 1 i32.extend8_s))";

    let (_, errors) = parse_module(source, FeatureSpec::mvp());
    assert!(errors.iter().any(|e| e.message.contains("feature")));

    let (module, errors) = parse_module(source, FeatureSpec::default());
    assert!(errors.is_empty());
    let bytes = save_binary_module(&module).unwrap();
    assert!(matches!(
        load_binary_module(&bytes, FeatureSpec::mvp()),
        Err(LoadError::Invalid(_))
    ));
}

#[test]
fn every_operator_round_trips_through_the_internal_codec() {
    use wasm_syntax::operators::{ImmKind, Immediate, Operator, OPERATORS};
    use wasm_syntax::{BlockType, ReferenceType, ValueType};

    for (index, info) in OPERATORS.iter().enumerate() {
        let imm = match info.imm {
            ImmKind::None => Immediate::None,
            ImmKind::AtomicFence => Immediate::AtomicFence,
            ImmKind::Block => Immediate::Block(BlockType::Value(ValueType::I64)),
            ImmKind::Branch => Immediate::Branch(1),
            ImmKind::CatchDepth => Immediate::CatchDepth(1),
            ImmKind::BranchTable => Immediate::BranchTable {
                branch_depths: vec![0, 1],
                default_depth: 2,
            },
            ImmKind::Call => Immediate::Call(3),
            ImmKind::CallIndirect => Immediate::CallIndirect {
                type_index: 1,
                table_index: 2,
            },
            ImmKind::FunctionRef => Immediate::FunctionRef(4),
            ImmKind::Local => Immediate::Local(5),
            ImmKind::Global => Immediate::Global(6),
            ImmKind::Table => Immediate::Table(7),
            ImmKind::TableCopy => Immediate::TableCopy {
                dest_table_index: 1,
                source_table_index: 2,
            },
            ImmKind::Memory => Immediate::Memory(1),
            ImmKind::MemoryCopy => Immediate::MemoryCopy {
                dest_memory_index: 1,
                source_memory_index: 0,
            },
            ImmKind::DataSegment => Immediate::DataSegment(1),
            ImmKind::DataSegmentAndMemory => Immediate::DataSegmentAndMemory {
                data_index: 1,
                memory_index: 0,
            },
            ImmKind::ElemSegment => Immediate::ElemSegment(1),
            ImmKind::ElemSegmentAndTable => Immediate::ElemSegmentAndTable {
                elem_index: 1,
                table_index: 0,
            },
            ImmKind::LoadStore | ImmKind::AtomicLoadStore => Immediate::LoadStore {
                alignment_log2: 0,
                offset: 64,
                memory_index: 0,
            },
            ImmKind::LoadStoreLane8
            | ImmKind::LoadStoreLane16
            | ImmKind::LoadStoreLane32
            | ImmKind::LoadStoreLane64 => Immediate::LoadStoreLane {
                alignment_log2: 0,
                offset: 8,
                memory_index: 0,
                lane: 1,
            },
            ImmKind::Lane2 | ImmKind::Lane4 | ImmKind::Lane8 | ImmKind::Lane16 => {
                Immediate::Lane(1)
            }
            ImmKind::Shuffle => Immediate::Shuffle([2; 16]),
            ImmKind::I32 => Immediate::I32(-42),
            ImmKind::I64 => Immediate::I64(1 << 40),
            ImmKind::F32 => Immediate::F32(0x7FC0_0001),
            ImmKind::F64 => Immediate::F64(0x7FF8_0000_0000_0001),
            ImmKind::V128 => Immediate::V128([9; 16]),
            ImmKind::RefType => Immediate::RefType(ReferenceType::ExternRef),
            ImmKind::TypedSelect => Immediate::TypedSelect(ValueType::ExternRef),
            ImmKind::ExceptionType => Immediate::ExceptionType(0),
        };
        let op = Operator {
            index: index as u16,
            imm,
        };

        // Internal encoding round trip.
        let mut code = Vec::new();
        let mut branch_tables = Vec::new();
        wasm_syntax::operators::encode_operator(&op, &mut code, &mut branch_tables);
        let (decoded, rest) =
            wasm_syntax::operators::decode_operator(&code, &branch_tables).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, op, "internal codec mismatch for {}", info.mnemonic);
    }
}

#[test]
fn mnemonics_lex_back_to_their_table_rows() {
    use wasm_syntax::operators::OPERATORS;
    use wasm_syntax::text::lexer::{lex, T_FIRST_OPERATOR};

    for (index, info) in OPERATORS.iter().enumerate() {
        if info.mnemonic == "select_t" {
            // The typed select is written as `select (result T)` in text.
            continue;
        }
        let (tokens, _) = lex(info.mnemonic, false);
        assert_eq!(
            tokens[0].ty,
            T_FIRST_OPERATOR + index as u16,
            "mnemonic {} must lex to its own token",
            info.mnemonic
        );
    }
}
