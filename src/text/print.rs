//! Renders a module as canonical WebAssembly text.
//!
//! The output is deterministic: identical modules print to byte-identical text. Definition
//! sites carry names from the module's "name" custom section when present, synthetic
//! `$f0`-style names otherwise; use sites are printed numerically so the text re-parses to a
//! structurally equal module regardless of naming.

use crate::model::{
    get_disassembly_names, BlockType, DataMode, ElemContents, ElemExpr, ElemMode, FunctionType,
    IndexType, InitializerExpression, Module, OrderedSectionId, ReferenceType,
};
use crate::operators::{natural_alignment_log2, CodeReader, Immediate, Operator};
use crate::text::numbers::{print_f32, print_f64};
use std::fmt::Write;

fn is_bare_name(text: &str) -> bool {
    !text.is_empty()
        && text.bytes().all(|byte| {
            byte.is_ascii_alphanumeric()
                || matches!(
                    byte,
                    b'\'' | b'_'
                        | b'+'
                        | b'*'
                        | b'/'
                        | b'~'
                        | b'='
                        | b'<'
                        | b'>'
                        | b'!'
                        | b'?'
                        | b'@'
                        | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'|'
                        | b':'
                        | b'`'
                        | b'.'
                        | b'-'
                        | b'^'
                        | b'\\'
                )
        })
}

/// The name to print at a definition site: the recorded name when it prints as a bare
/// `$name`, a synthetic `$<prefix><index>` otherwise.
fn definition_name(recorded: &str, prefix: &str, index: u32) -> String {
    if is_bare_name(recorded) {
        format!("${recorded}")
    } else {
        format!("${prefix}{index}")
    }
}

fn escape_string(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len() + 2);
    for &byte in bytes {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7E => escaped.push(byte as char),
            b'\n' => escaped.push_str("\\n"),
            b'\t' => escaped.push_str("\\t"),
            _ => {
                let _ = write!(escaped, "\\{byte:02x}");
            }
        }
    }
    escaped
}

fn print_value_types(keyword: &str, kinds: &[crate::model::ValueType], output: &mut String) {
    if kinds.is_empty() {
        return;
    }
    let _ = write!(output, " ({keyword}");
    for kind in kinds {
        let _ = write!(output, " {kind}");
    }
    output.push(')');
}

fn print_function_type(ty: &FunctionType, output: &mut String) {
    print_value_types("param", ty.parameters().kinds(), output);
    print_value_types("result", ty.results().kinds(), output);
}

fn print_size_constraints(size: &crate::model::SizeConstraints, output: &mut String) {
    let _ = write!(output, " {}", size.min);
    if size.max != u64::MAX {
        let _ = write!(output, " {}", size.max);
    }
}

fn print_initializer(expression: &InitializerExpression, output: &mut String) {
    match expression {
        InitializerExpression::I32Const(value) => {
            let _ = write!(output, "(i32.const {value})");
        }
        InitializerExpression::I64Const(value) => {
            let _ = write!(output, "(i64.const {value})");
        }
        InitializerExpression::F32Const(bits) => {
            let _ = write!(output, "(f32.const {})", print_f32(*bits));
        }
        InitializerExpression::F64Const(bits) => {
            let _ = write!(output, "(f64.const {})", print_f64(*bits));
        }
        InitializerExpression::V128Const(bytes) => {
            let _ = write!(output, "(v128.const i8x16");
            for byte in bytes {
                let _ = write!(output, " {byte}");
            }
            output.push(')');
        }
        InitializerExpression::GlobalGet(index) => {
            let _ = write!(output, "(global.get {index})");
        }
        InitializerExpression::RefNull(kind) => {
            let _ = write!(output, "(ref.null {})", heap_type_keyword(*kind));
        }
        InitializerExpression::RefFunc(index) => {
            let _ = write!(output, "(ref.func {index})");
        }
    }
}

fn heap_type_keyword(kind: ReferenceType) -> &'static str {
    match kind {
        ReferenceType::FuncRef => "func",
        ReferenceType::ExternRef => "extern",
    }
}

fn print_block_type(block_type: BlockType, output: &mut String) {
    match block_type {
        BlockType::NoResult => {}
        BlockType::Value(kind) => {
            let _ = write!(output, " (result {kind})");
        }
        BlockType::Indexed(type_index) => {
            let _ = write!(output, " (type {type_index})");
        }
    }
}

fn print_memarg(
    mnemonic: &str,
    alignment_log2: u8,
    offset: u64,
    memory_index: u32,
    output: &mut String,
) {
    if memory_index != 0 {
        let _ = write!(output, " {memory_index}");
    }
    if offset != 0 {
        let _ = write!(output, " offset={offset}");
    }
    if alignment_log2 != natural_alignment_log2(mnemonic) {
        let _ = write!(output, " align={}", 1u64 << alignment_log2);
    }
}

fn print_operator(op: &Operator, output: &mut String) {
    let info = op.info();
    if info.mnemonic == "select_t" {
        output.push_str("select");
    } else {
        output.push_str(info.mnemonic);
    }

    match &op.imm {
        Immediate::None | Immediate::AtomicFence => {}
        Immediate::Block(block_type) => print_block_type(*block_type, output),
        Immediate::Branch(depth) | Immediate::CatchDepth(depth) => {
            let _ = write!(output, " {depth}");
        }
        Immediate::BranchTable {
            branch_depths,
            default_depth,
        } => {
            for depth in branch_depths {
                let _ = write!(output, " {depth}");
            }
            let _ = write!(output, " {default_depth}");
        }
        Immediate::Call(index)
        | Immediate::FunctionRef(index)
        | Immediate::Local(index)
        | Immediate::Global(index)
        | Immediate::DataSegment(index)
        | Immediate::ElemSegment(index)
        | Immediate::ExceptionType(index) => {
            let _ = write!(output, " {index}");
        }
        Immediate::Table(index) | Immediate::Memory(index) => {
            if *index != 0 {
                let _ = write!(output, " {index}");
            }
        }
        Immediate::CallIndirect {
            type_index,
            table_index,
        } => {
            if *table_index != 0 {
                let _ = write!(output, " {table_index}");
            }
            let _ = write!(output, " (type {type_index})");
        }
        Immediate::TableCopy {
            dest_table_index,
            source_table_index,
        } => {
            if *dest_table_index != 0 || *source_table_index != 0 {
                let _ = write!(output, " {dest_table_index} {source_table_index}");
            }
        }
        Immediate::MemoryCopy {
            dest_memory_index,
            source_memory_index,
        } => {
            if *dest_memory_index != 0 || *source_memory_index != 0 {
                let _ = write!(output, " {dest_memory_index} {source_memory_index}");
            }
        }
        Immediate::DataSegmentAndMemory {
            data_index,
            memory_index,
        } => {
            if *memory_index != 0 {
                let _ = write!(output, " {memory_index}");
            }
            let _ = write!(output, " {data_index}");
        }
        Immediate::ElemSegmentAndTable {
            elem_index,
            table_index,
        } => {
            if *table_index != 0 {
                let _ = write!(output, " {table_index}");
            }
            let _ = write!(output, " {elem_index}");
        }
        Immediate::LoadStore {
            alignment_log2,
            offset,
            memory_index,
        } => print_memarg(info.mnemonic, *alignment_log2, *offset, *memory_index, output),
        Immediate::LoadStoreLane {
            alignment_log2,
            offset,
            memory_index,
            lane,
        } => {
            print_memarg(info.mnemonic, *alignment_log2, *offset, *memory_index, output);
            let _ = write!(output, " {lane}");
        }
        Immediate::Lane(lane) => {
            let _ = write!(output, " {lane}");
        }
        Immediate::Shuffle(lanes) => {
            for lane in lanes {
                let _ = write!(output, " {lane}");
            }
        }
        Immediate::I32(value) => {
            let _ = write!(output, " {value}");
        }
        Immediate::I64(value) => {
            let _ = write!(output, " {value}");
        }
        Immediate::F32(bits) => {
            let _ = write!(output, " {}", print_f32(*bits));
        }
        Immediate::F64(bits) => {
            let _ = write!(output, " {}", print_f64(*bits));
        }
        Immediate::V128(bytes) => {
            output.push_str(" i8x16");
            for byte in bytes {
                let _ = write!(output, " {byte}");
            }
        }
        Immediate::RefType(kind) => {
            let _ = write!(output, " {}", heap_type_keyword(*kind));
        }
        Immediate::TypedSelect(kind) => {
            let _ = write!(output, " (result {kind})");
        }
    }
}

fn print_function_body(def: &crate::model::FunctionDef, output: &mut String) {
    let ops: Vec<Operator> = CodeReader::new(&def.code, &def.branch_tables)
        .collect::<Result<_, _>>()
        .unwrap_or_default();

    let mut depth = 1usize;
    for (position, op) in ops.iter().enumerate() {
        let mnemonic = op.info().mnemonic;
        match mnemonic {
            "end" => {
                depth -= 1;
                if position == ops.len() - 1 {
                    // The function's own closing `end` is implied by the closing parenthesis.
                    break;
                }
            }
            "else" | "catch" | "catch_all" => depth -= 1,
            _ => {}
        }

        output.push('\n');
        for _ in 0..depth + 1 {
            output.push_str("  ");
        }
        print_operator(op, output);

        match mnemonic {
            "block" | "loop" | "if" | "try" | "else" | "catch" | "catch_all" => depth += 1,
            _ => {}
        }
    }
}

fn print_elem_contents(contents: &ElemContents, output: &mut String) {
    match contents {
        ElemContents::Indices(kind, indices) => {
            let _ = write!(output, " {}", kind.mnemonic());
            for index in indices {
                let _ = write!(output, " {index}");
            }
        }
        ElemContents::Expressions(element_type, exprs) => {
            let _ = write!(
                output,
                " {}",
                crate::model::ValueType::from(*element_type).mnemonic()
            );
            for expr in exprs {
                match expr {
                    ElemExpr::RefNull(kind) => {
                        let _ = write!(output, " (ref.null {})", heap_type_keyword(*kind));
                    }
                    ElemExpr::RefFunc(index) => {
                        let _ = write!(output, " (ref.func {index})");
                    }
                }
            }
        }
    }
}

/// Renders the module as a canonical S-expression.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{parse_module, print_module, FeatureSpec};
///
/// let (module, errors) = parse_module("(module (memory 1))", FeatureSpec::default());
/// assert!(errors.is_empty());
///
/// let text = print_module(&module);
/// assert!(text.contains("(memory $M0 1)"));
/// ```
pub fn print_module(module: &Module) -> String {
    let names = get_disassembly_names(module);
    let mut output = String::from("(module");

    for (index, ty) in module.types.iter().enumerate() {
        let name = definition_name(&names.types[index], "t", index as u32);
        let _ = write!(output, "\n  (type {name} (func");
        print_function_type(ty, &mut output);
        output.push_str("))");
    }

    for (index, import) in module.functions.imports().iter().enumerate() {
        let name = definition_name(&names.functions[index].name, "f", index as u32);
        let _ = write!(
            output,
            "\n  (import \"{}\" \"{}\" (func {name} (type {})))",
            escape_string(import.module_name.as_bytes()),
            escape_string(import.export_name.as_bytes()),
            import.ty
        );
    }
    for (index, import) in module.tables.imports().iter().enumerate() {
        let name = definition_name(&names.tables[index], "T", index as u32);
        let _ = write!(
            output,
            "\n  (import \"{}\" \"{}\" (table {name}",
            escape_string(import.module_name.as_bytes()),
            escape_string(import.export_name.as_bytes()),
        );
        print_table_type(&import.ty, &mut output);
        output.push_str("))");
    }
    for (index, import) in module.memories.imports().iter().enumerate() {
        let name = definition_name(&names.memories[index], "M", index as u32);
        let _ = write!(
            output,
            "\n  (import \"{}\" \"{}\" (memory {name}",
            escape_string(import.module_name.as_bytes()),
            escape_string(import.export_name.as_bytes()),
        );
        print_memory_type(&import.ty, &mut output);
        output.push_str("))");
    }
    for (index, import) in module.globals.imports().iter().enumerate() {
        let name = definition_name(&names.globals[index], "g", index as u32);
        let _ = write!(
            output,
            "\n  (import \"{}\" \"{}\" (global {name}",
            escape_string(import.module_name.as_bytes()),
            escape_string(import.export_name.as_bytes()),
        );
        print_global_type(&import.ty, &mut output);
        output.push_str("))");
    }
    for (index, import) in module.exception_types.imports().iter().enumerate() {
        let name = definition_name(&names.exception_types[index], "e", index as u32);
        let _ = write!(
            output,
            "\n  (import \"{}\" \"{}\" (exception_type {name}",
            escape_string(import.module_name.as_bytes()),
            escape_string(import.export_name.as_bytes()),
        );
        print_value_types("param", import.ty.parameters.kinds(), &mut output);
        output.push_str("))");
    }

    for (def_index, def) in module.tables.defs().iter().enumerate() {
        let index = module.tables.import_count() + def_index as u32;
        let name = definition_name(&names.tables[index as usize], "T", index);
        let _ = write!(output, "\n  (table {name}");
        print_table_type(&def.ty, &mut output);
        output.push(')');
    }
    for (def_index, def) in module.memories.defs().iter().enumerate() {
        let index = module.memories.import_count() + def_index as u32;
        let name = definition_name(&names.memories[index as usize], "M", index);
        let _ = write!(output, "\n  (memory {name}");
        print_memory_type(&def.ty, &mut output);
        output.push(')');
    }
    for (def_index, def) in module.globals.defs().iter().enumerate() {
        let index = module.globals.import_count() + def_index as u32;
        let name = definition_name(&names.globals[index as usize], "g", index);
        let _ = write!(output, "\n  (global {name}");
        print_global_type(&def.ty, &mut output);
        output.push(' ');
        print_initializer(&def.initializer, &mut output);
        output.push(')');
    }
    for (def_index, def) in module.exception_types.defs().iter().enumerate() {
        let index = module.exception_types.import_count() + def_index as u32;
        let name = definition_name(&names.exception_types[index as usize], "e", index);
        let _ = write!(output, "\n  (exception_type {name}");
        print_value_types("param", def.ty.parameters.kinds(), &mut output);
        output.push(')');
    }

    for export in &module.exports {
        let _ = write!(
            output,
            "\n  (export \"{}\" ({} {}))",
            escape_string(export.name.as_bytes()),
            export.kind.mnemonic(),
            export.index
        );
    }

    if let Some(index) = module.start_function_index {
        let _ = write!(output, "\n  (start {index})");
    }

    for (index, segment) in module.elem_segments.iter().enumerate() {
        let name = definition_name(&names.elem_segments[index], "E", index as u32);
        let _ = write!(output, "\n  (elem {name}");
        match &segment.mode {
            ElemMode::Active {
                table_index,
                offset,
            } => {
                if *table_index != 0 {
                    let _ = write!(output, " (table {table_index})");
                }
                output.push(' ');
                print_initializer(offset, &mut output);
            }
            ElemMode::Passive => {}
            ElemMode::Declared => output.push_str(" declare"),
        }
        print_elem_contents(&segment.contents, &mut output);
        output.push(')');
    }

    for (index, segment) in module.data_segments.iter().enumerate() {
        let name = definition_name(&names.data_segments[index], "D", index as u32);
        let _ = write!(output, "\n  (data {name}");
        if let DataMode::Active {
            memory_index,
            offset,
        } = &segment.mode
        {
            if *memory_index != 0 {
                let _ = write!(output, " (memory {memory_index})");
            }
            output.push(' ');
            print_initializer(offset, &mut output);
        }
        let _ = write!(output, " \"{}\")", escape_string(&segment.data));
    }

    for (def_index, def) in module.functions.defs().iter().enumerate() {
        let index = module.functions.import_count() + def_index as u32;
        let function_names = &names.functions[index as usize];
        let name = definition_name(&function_names.name, "f", index);
        let _ = write!(output, "\n  (func {name} (type {})", def.type_index);

        if let Some(ty) = module.types.get(def.type_index as usize) {
            print_function_type(ty, &mut output);
        }
        if !def.non_parameter_local_types.is_empty() {
            print_value_types("local", &def.non_parameter_local_types, &mut output);
        }
        print_function_body(def, &mut output);
        output.push_str("\n  )");
    }

    if module.feature_spec.custom_sections_in_text_format {
        for section in &module.custom_sections {
            if section.name == "name" {
                continue;
            }
            let _ = write!(
                output,
                "\n  (custom_section \"{}\"",
                escape_string(section.name.as_bytes())
            );
            if section.after_section != OrderedSectionId::ModuleBeginning {
                let _ = write!(output, " (after {})", section.after_section.mnemonic());
            }
            let _ = write!(output, " \"{}\")", escape_string(&section.data));
        }
    }

    output.push_str("\n)\n");
    output
}

fn print_table_type(ty: &crate::model::TableType, output: &mut String) {
    if ty.index_type == IndexType::I64 {
        output.push_str(" i64");
    }
    print_size_constraints(&ty.size, output);
    if ty.shared {
        output.push_str(" shared");
    }
    let _ = write!(
        output,
        " {}",
        crate::model::ValueType::from(ty.element_type).mnemonic()
    );
}

fn print_memory_type(ty: &crate::model::MemoryType, output: &mut String) {
    if ty.index_type == IndexType::I64 {
        output.push_str(" i64");
    }
    print_size_constraints(&ty.size, output);
    if ty.shared {
        output.push_str(" shared");
    }
}

fn print_global_type(ty: &crate::model::GlobalType, output: &mut String) {
    if ty.is_mutable() {
        let _ = write!(output, " (mut {})", ty.kind);
    } else {
        let _ = write!(output, " {}", ty.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;
    use crate::text::module::parse_module;

    fn reparse(text: &str) -> Module {
        let (module, errors) = parse_module(text, FeatureSpec::default());
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        module
    }

    #[test]
    fn printing_is_deterministic() {
        let module = reparse("(module (func (result i32) i32.const 7))");

        assert_eq!(print_module(&module), print_module(&module));
    }

    #[test]
    fn printed_modules_reparse_equal_ignoring_names() {
        let source = r#"(module
            (memory 1)
            (global $g (mut i32) (i32.const -3))
            (func $inc (export "inc") (param i32) (result i32)
                local.get 0
                i32.const 1
                i32.add)
            (func $main
                block (result i32)
                    i32.const 5
                    call $inc
                end
                drop)
            (start $main))"#;
        let module = reparse(source);

        let printed = print_module(&module);
        let reparsed = reparse(&printed);

        assert!(
            module.equals_ignoring_names(&reparsed),
            "round trip changed the module:\n{printed}"
        );
    }

    #[test]
    fn prints_control_structure_with_indentation() {
        let module = reparse(
            "(module (func (param i32) (result i32)
                local.get 0
                if (result i32)
                  i32.const 1
                else
                  i32.const 2
                end))",
        );

        let printed = print_module(&module);
        assert!(printed.contains("\n    if (result i32)"));
        assert!(printed.contains("\n      i32.const 1"));
        assert!(printed.contains("\n    else"));
        assert!(printed.contains("\n    end"));
    }

    #[test]
    fn float_literals_round_trip_bit_exact() {
        let source =
            "(module (func (result f64) f64.const nan:0xdead) (func (result f32) f32.const -0))";
        let module = reparse(source);

        let printed = print_module(&module);
        let reparsed = reparse(&printed);

        assert!(module.equals_ignoring_names(&reparsed), "{printed}");
    }

    #[test]
    fn data_bytes_are_escaped() {
        let (module, errors) = parse_module(
            "(module (memory 1) (data (i32.const 0) \"a\\00b\\ff\\\"\"))",
            FeatureSpec::default(),
        );
        assert!(errors.is_empty());

        let printed = print_module(&module);
        assert!(printed.contains(r#""a\00b\ff\"""#));

        let reparsed = reparse(&printed);
        assert_eq!(reparsed.data_segments[0].data, module.data_segments[0].data);
    }
}
