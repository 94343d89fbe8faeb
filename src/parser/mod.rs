//! Parser of the WebAssembly binary format.
//!
//! Sections are enforced in the standard order, with custom sections tolerated anywhere (each
//! remembers the standard section it followed). Operator streams are validated as they are
//! decoded and re-encoded into the internal layout, so the rest of the crate is
//! format-agnostic.

pub mod code;
mod sections;
pub mod values;

use crate::features::FeatureSpec;
use crate::model::{
    CustomSection, DataMode, DataSegment, ElemContents, ElemExpr, ElemMode, ElemSegment,
    ExceptionTypeDef, Export, ExternKind, FunctionDef, GlobalDef, Import, InitializerExpression,
    MemoryDef, Module, OrderedSectionId, TableDef,
};
use crate::parser::code::{
    decode_function_body, decode_initializer, read_byte, read_reference_type, read_u32,
};
use crate::parser::sections::ImportDesc;
use crate::parser::values::parse_name_string;
use nom::combinator::all_consuming;
use thiserror::Error;

/// A binary module load failure. `Malformed` is a syntactic error in the encoding itself;
/// `Invalid` is a well-formed encoding describing a module that fails validation.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("malformed module: {0}")]
    Malformed(String),
    #[error("invalid module: {0}")]
    Invalid(String),
}

fn malformed(message: impl Into<String>) -> LoadError {
    LoadError::Malformed(message.into())
}

/// A magic constant used to quickly identify WebAssembly binary file contents.
const PREAMBLE: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// The version of the binary WebAssembly format accepted.
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

fn section_order(id: u8) -> Option<OrderedSectionId> {
    match id {
        1 => Some(OrderedSectionId::Type),
        2 => Some(OrderedSectionId::Import),
        3 => Some(OrderedSectionId::Function),
        4 => Some(OrderedSectionId::Table),
        5 => Some(OrderedSectionId::Memory),
        6 => Some(OrderedSectionId::Global),
        13 => Some(OrderedSectionId::ExceptionType),
        7 => Some(OrderedSectionId::Export),
        8 => Some(OrderedSectionId::Start),
        9 => Some(OrderedSectionId::Elem),
        12 => Some(OrderedSectionId::DataCount),
        10 => Some(OrderedSectionId::Code),
        11 => Some(OrderedSectionId::Data),
        _ => None,
    }
}

fn extern_kind_code(code: u8) -> Option<ExternKind> {
    match code {
        0 => Some(ExternKind::Function),
        1 => Some(ExternKind::Table),
        2 => Some(ExternKind::Memory),
        3 => Some(ExternKind::Global),
        4 => Some(ExternKind::ExceptionType),
        _ => None,
    }
}

/// Reads the binary format into a module, validating as it goes.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{load_binary_module, FeatureSpec};
///
/// let module = load_binary_module(b"\x00\x61\x73\x6D\x01\x00\x00\x00", FeatureSpec::default())
///     .unwrap();
///
/// assert_eq!(module.functions.size(), 0);
/// assert_eq!(module.memories.size(), 0);
/// ```
pub fn load_binary_module(bytes: &[u8], features: FeatureSpec) -> Result<Module, LoadError> {
    if bytes.len() < 8 || bytes[0..4] != PREAMBLE {
        return Err(malformed("missing the \\0asm preamble"));
    }
    if bytes[4..8] != VERSION {
        return Err(malformed("unsupported binary format version"));
    }

    let mut module = Module::new(features);
    let mut last_section = OrderedSectionId::ModuleBeginning;
    let mut pending_function_types: Vec<u32> = Vec::new();
    let mut declared_data_count: Option<u32> = None;
    let mut saw_code_section = false;
    let mut saw_data_section = false;

    let mut input = &bytes[8..];
    while !input.is_empty() {
        let (id, rest) = read_byte(input)?;
        let (size, rest) = read_u32(rest)?;
        let size = size as usize;
        if size > rest.len() {
            return Err(malformed("section size overruns the input"));
        }
        let (payload, rest) = rest.split_at(size);
        input = rest;

        if id == 0 {
            let (payload, name) = parse_name_string(payload)
                .map_err(|_| malformed("custom section name is not valid UTF-8"))?;
            module.custom_sections.push(CustomSection {
                after_section: last_section,
                name,
                data: payload.to_vec(),
            });
            continue;
        }

        let order = section_order(id)
            .ok_or_else(|| malformed(format!("unknown section id {id}")))?;
        if order <= last_section {
            return Err(malformed(format!(
                "the {} section is out of order",
                order.mnemonic()
            )));
        }
        last_section = order;

        match order {
            OrderedSectionId::Type => {
                let (_, types) = all_consuming(sections::parse_type_section)(payload)
                    .map_err(|_| malformed("bad type section"))?;
                module.types = types;
            }
            OrderedSectionId::Import => {
                let (_, imports) = all_consuming(sections::parse_import_section)(payload)
                    .map_err(|_| malformed("bad import section"))?;
                for (module_name, export_name, desc) in imports {
                    match desc {
                        ImportDesc::Function(type_index) => {
                            module.functions.push_import(Import {
                                module_name,
                                export_name,
                                ty: type_index,
                            });
                        }
                        ImportDesc::Table(ty) => {
                            module.tables.push_import(Import {
                                module_name,
                                export_name,
                                ty,
                            });
                        }
                        ImportDesc::Memory(ty) => {
                            module.memories.push_import(Import {
                                module_name,
                                export_name,
                                ty,
                            });
                        }
                        ImportDesc::Global(ty) => {
                            module.globals.push_import(Import {
                                module_name,
                                export_name,
                                ty,
                            });
                        }
                        ImportDesc::ExceptionType(ty) => {
                            module.exception_types.push_import(Import {
                                module_name,
                                export_name,
                                ty,
                            });
                        }
                    }
                }
            }
            OrderedSectionId::Function => {
                let (_, type_indices) = all_consuming(sections::parse_function_section)(payload)
                    .map_err(|_| malformed("bad function section"))?;
                pending_function_types = type_indices;
            }
            OrderedSectionId::Table => {
                let (_, tables) = all_consuming(sections::parse_table_section)(payload)
                    .map_err(|_| malformed("bad table section"))?;
                for ty in tables {
                    module.tables.push_def(TableDef { ty });
                }
            }
            OrderedSectionId::Memory => {
                let (_, memories) = all_consuming(sections::parse_memory_section)(payload)
                    .map_err(|_| malformed("bad memory section"))?;
                for ty in memories {
                    module.memories.push_def(MemoryDef { ty });
                }
            }
            OrderedSectionId::Global => {
                decode_global_section(&mut module, payload)?;
            }
            OrderedSectionId::ExceptionType => {
                let (_, exception_types) =
                    all_consuming(sections::parse_exception_type_section)(payload)
                        .map_err(|_| malformed("bad exception type section"))?;
                for ty in exception_types {
                    module.exception_types.push_def(ExceptionTypeDef { ty });
                }
            }
            OrderedSectionId::Export => {
                let (_, exports) = all_consuming(sections::parse_export_section)(payload)
                    .map_err(|_| malformed("bad export section"))?;
                for (name, kind, index) in exports {
                    let kind = extern_kind_code(kind)
                        .ok_or_else(|| malformed(format!("unknown export kind {kind}")))?;
                    module.exports.push(Export { name, kind, index });
                }
            }
            OrderedSectionId::Start => {
                let (index, rest) = read_u32(payload)?;
                if !rest.is_empty() {
                    return Err(malformed("trailing bytes in the start section"));
                }
                module.start_function_index = Some(index);
            }
            OrderedSectionId::Elem => {
                decode_elem_section(&mut module, payload)?;
            }
            OrderedSectionId::DataCount => {
                let (count, rest) = read_u32(payload)?;
                if !rest.is_empty() {
                    return Err(malformed("trailing bytes in the data count section"));
                }
                declared_data_count = Some(count);
            }
            OrderedSectionId::Code => {
                saw_code_section = true;
                decode_code_section(
                    &mut module,
                    &pending_function_types,
                    declared_data_count,
                    payload,
                )?;
            }
            OrderedSectionId::Data => {
                saw_data_section = true;
                decode_data_section(&mut module, payload)?;
            }
            OrderedSectionId::ModuleBeginning => unreachable!(),
        }
    }

    if !pending_function_types.is_empty() && !saw_code_section {
        return Err(malformed(
            "the function section has no matching code section",
        ));
    }
    if let Some(count) = declared_data_count {
        let actual = module.data_segments.len() as u32;
        if actual != count && (saw_data_section || count != 0) {
            return Err(malformed(
                "the data count section disagrees with the data section",
            ));
        }
    }
    if module.data_segments.len() > module.feature_spec.max_data_segments {
        return Err(LoadError::Invalid("too many data segments".to_string()));
    }

    crate::validate::validate_module(&module)
        .map_err(|error| LoadError::Invalid(error.to_string()))?;

    Ok(module)
}

fn decode_global_section(module: &mut Module, payload: &[u8]) -> Result<(), LoadError> {
    let (count, mut input) = read_u32(payload)?;
    for _ in 0..count {
        let (rest, ty) = values::parse_global_type(input)
            .map_err(|_| malformed("bad global type"))?;
        let (initializer, rest) = decode_initializer(rest)?;
        module.globals.push_def(GlobalDef { ty, initializer });
        input = rest;
    }
    if !input.is_empty() {
        return Err(malformed("trailing bytes in the global section"));
    }
    Ok(())
}

fn decode_elem_kind(input: &[u8]) -> Result<(ExternKind, &[u8]), LoadError> {
    let (code, rest) = read_byte(input)?;
    extern_kind_code(code)
        .map(|kind| (kind, rest))
        .ok_or_else(|| malformed(format!("unknown elem kind {code}")))
}

fn decode_elem_exprs(mut input: &[u8]) -> Result<(Vec<ElemExpr>, &[u8]), LoadError> {
    let (count, rest) = read_u32(input)?;
    input = rest;
    let mut exprs = Vec::with_capacity((count as usize).min(1 << 16));
    for _ in 0..count {
        let (expression, rest) = decode_initializer(input)?;
        let expr = match expression {
            InitializerExpression::RefNull(kind) => ElemExpr::RefNull(kind),
            InitializerExpression::RefFunc(index) => ElemExpr::RefFunc(index),
            _ => {
                return Err(LoadError::Invalid(
                    "element expressions must be ref.null or ref.func".to_string(),
                ))
            }
        };
        exprs.push(expr);
        input = rest;
    }
    Ok((exprs, input))
}

fn decode_elem_indices(mut input: &[u8]) -> Result<(Vec<u32>, &[u8]), LoadError> {
    let (count, rest) = read_u32(input)?;
    input = rest;
    let mut indices = Vec::with_capacity((count as usize).min(1 << 16));
    for _ in 0..count {
        let (index, rest) = read_u32(input)?;
        indices.push(index);
        input = rest;
    }
    Ok((indices, input))
}

fn decode_elem_section(module: &mut Module, payload: &[u8]) -> Result<(), LoadError> {
    let (count, mut input) = read_u32(payload)?;
    for _ in 0..count {
        let (variant, rest) = read_u32(input)?;
        let (segment, rest) = match variant {
            0 => {
                let (offset, rest) = decode_initializer(rest)?;
                let (indices, rest) = decode_elem_indices(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Active {
                            table_index: 0,
                            offset,
                        },
                        contents: ElemContents::Indices(ExternKind::Function, indices),
                    },
                    rest,
                )
            }
            1 => {
                let (kind, rest) = decode_elem_kind(rest)?;
                let (indices, rest) = decode_elem_indices(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Passive,
                        contents: ElemContents::Indices(kind, indices),
                    },
                    rest,
                )
            }
            2 => {
                let (table_index, rest) = read_u32(rest)?;
                let (offset, rest) = decode_initializer(rest)?;
                let (kind, rest) = decode_elem_kind(rest)?;
                let (indices, rest) = decode_elem_indices(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Active {
                            table_index,
                            offset,
                        },
                        contents: ElemContents::Indices(kind, indices),
                    },
                    rest,
                )
            }
            3 => {
                let (kind, rest) = decode_elem_kind(rest)?;
                let (indices, rest) = decode_elem_indices(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Declared,
                        contents: ElemContents::Indices(kind, indices),
                    },
                    rest,
                )
            }
            4 => {
                let (offset, rest) = decode_initializer(rest)?;
                let (exprs, rest) = decode_elem_exprs(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Active {
                            table_index: 0,
                            offset,
                        },
                        contents: ElemContents::Expressions(
                            crate::model::ReferenceType::FuncRef,
                            exprs,
                        ),
                    },
                    rest,
                )
            }
            5 => {
                let (element_type, rest) = read_reference_type(rest)?;
                let (exprs, rest) = decode_elem_exprs(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Passive,
                        contents: ElemContents::Expressions(element_type, exprs),
                    },
                    rest,
                )
            }
            6 => {
                let (table_index, rest) = read_u32(rest)?;
                let (offset, rest) = decode_initializer(rest)?;
                let (element_type, rest) = read_reference_type(rest)?;
                let (exprs, rest) = decode_elem_exprs(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Active {
                            table_index,
                            offset,
                        },
                        contents: ElemContents::Expressions(element_type, exprs),
                    },
                    rest,
                )
            }
            7 => {
                let (element_type, rest) = read_reference_type(rest)?;
                let (exprs, rest) = decode_elem_exprs(rest)?;
                (
                    ElemSegment {
                        mode: ElemMode::Declared,
                        contents: ElemContents::Expressions(element_type, exprs),
                    },
                    rest,
                )
            }
            _ => return Err(malformed(format!("unknown elem segment variant {variant}"))),
        };
        module.elem_segments.push(segment);
        input = rest;
    }
    if !input.is_empty() {
        return Err(malformed("trailing bytes in the elem section"));
    }
    Ok(())
}

fn decode_data_section(module: &mut Module, payload: &[u8]) -> Result<(), LoadError> {
    let (count, mut input) = read_u32(payload)?;
    for _ in 0..count {
        let (variant, rest) = read_u32(input)?;
        let (mode, rest) = match variant {
            0 => {
                let (offset, rest) = decode_initializer(rest)?;
                (
                    DataMode::Active {
                        memory_index: 0,
                        offset,
                    },
                    rest,
                )
            }
            1 => (DataMode::Passive, rest),
            2 => {
                let (memory_index, rest) = read_u32(rest)?;
                let (offset, rest) = decode_initializer(rest)?;
                (
                    DataMode::Active {
                        memory_index,
                        offset,
                    },
                    rest,
                )
            }
            _ => return Err(malformed(format!("unknown data segment variant {variant}"))),
        };
        let (length, rest) = read_u32(rest)?;
        let length = length as usize;
        if length > rest.len() {
            return Err(malformed("data segment bytes overrun the section"));
        }
        let (data, rest) = rest.split_at(length);
        module.data_segments.push(DataSegment {
            mode,
            data: data.to_vec(),
        });
        input = rest;
    }
    if !input.is_empty() {
        return Err(malformed("trailing bytes in the data section"));
    }
    Ok(())
}

fn decode_code_section(
    module: &mut Module,
    pending_function_types: &[u32],
    declared_data_count: Option<u32>,
    payload: &[u8],
) -> Result<(), LoadError> {
    let (count, mut input) = read_u32(payload)?;
    if count as usize != pending_function_types.len() {
        return Err(malformed(
            "the function and code sections have mismatched lengths",
        ));
    }

    for &type_index in pending_function_types {
        let (size, rest) = read_u32(input)?;
        let size = size as usize;
        if size > rest.len() {
            return Err(malformed("function body overruns the code section"));
        }
        let (body, rest) = rest.split_at(size);
        input = rest;

        let function_type = module
            .types
            .get(type_index as usize)
            .ok_or_else(|| LoadError::Invalid(format!("invalid type index {type_index}")))?
            .clone();

        let (locals, code, branch_tables) =
            decode_function_body(module, &function_type, declared_data_count, body)?;
        module.functions.push_def(FunctionDef {
            type_index,
            non_parameter_local_types: locals,
            code,
            branch_tables,
        });
    }
    if !input.is_empty() {
        return Err(malformed("trailing bytes in the code section"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module() {
        let module =
            load_binary_module(b"\x00\x61\x73\x6D\x01\x00\x00\x00", FeatureSpec::default())
                .unwrap();

        assert!(module.types.is_empty());
        assert_eq!(module.functions.size(), 0);
    }

    #[test]
    fn bad_preamble_is_malformed() {
        assert!(matches!(
            load_binary_module(b"\x00asm\x02\x00\x00\x00", FeatureSpec::default()),
            Err(LoadError::Malformed(_))
        ));
        assert!(matches!(
            load_binary_module(b"nope", FeatureSpec::default()),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn custom_sections_record_their_position() {
        let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
        // A type section with no types.
        bytes.extend_from_slice(&[1, 1, 0]);
        // A custom section named "x" with one payload byte.
        bytes.extend_from_slice(&[0, 4, 1, b'x', 0xAB, 0xCD]);

        let module = load_binary_module(&bytes, FeatureSpec::default()).unwrap();
        let section = module.custom_section("x").unwrap();

        assert_eq!(section.after_section, OrderedSectionId::Type);
        assert_eq!(section.data, vec![0xAB, 0xCD]);
    }

    #[test]
    fn out_of_order_sections_are_malformed() {
        let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
        // A memory section, then a type section.
        bytes.extend_from_slice(&[5, 3, 1, 0, 1]);
        bytes.extend_from_slice(&[1, 1, 0]);

        assert!(matches!(
            load_binary_module(&bytes, FeatureSpec::default()),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn function_without_code_is_malformed() {
        let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
        // type () -> ()
        bytes.extend_from_slice(&[1, 4, 1, 0x60, 0, 0]);
        // function section referencing type 0, but no code section.
        bytes.extend_from_slice(&[3, 2, 1, 0]);

        assert!(matches!(
            load_binary_module(&bytes, FeatureSpec::default()),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn an_ill_typed_body_is_invalid() {
        let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
        // type: () -> i32
        bytes.extend_from_slice(&[1, 5, 1, 0x60, 0, 1, 0x7F]);
        bytes.extend_from_slice(&[3, 2, 1, 0]);
        // code: i64.const 0; end
        bytes.extend_from_slice(&[10, 6, 1, 4, 0, 0x42, 0x00, 0x0B]);

        assert!(matches!(
            load_binary_module(&bytes, FeatureSpec::default()),
            Err(LoadError::Invalid(_))
        ));
    }

    #[test]
    fn a_simple_function_loads() {
        let mut bytes = b"\x00\x61\x73\x6D\x01\x00\x00\x00".to_vec();
        // type: (i32) -> i32
        bytes.extend_from_slice(&[1, 6, 1, 0x60, 1, 0x7F, 1, 0x7F]);
        bytes.extend_from_slice(&[3, 2, 1, 0]);
        // export "id" (func 0)
        bytes.extend_from_slice(&[7, 6, 1, 2, b'i', b'd', 0, 0]);
        // code: local.get 0; end
        bytes.extend_from_slice(&[10, 6, 1, 4, 0, 0x20, 0x00, 0x0B]);

        let module = load_binary_module(&bytes, FeatureSpec::default()).unwrap();

        assert_eq!(module.functions.size(), 1);
        assert_eq!(module.exports.len(), 1);
        assert_eq!(module.exports[0].name, "id");
        assert_eq!(module.exports[0].index, 0);
    }
}
