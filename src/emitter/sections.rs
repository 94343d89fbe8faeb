//! Emission of the module's sections in the standard order, with custom sections placed at
//! the positions dictated by their `after_section` markers.

use crate::emitter::errors::EmitError;
use crate::emitter::instruction::{emit_elem_expr, emit_function_body, emit_initializer};
use crate::emitter::values::{
    emit_byte_vector, emit_global_type, emit_memory_type, emit_name, emit_reference_type,
    emit_table_type, emit_u32, emit_value_type,
};
use crate::model::{
    DataMode, ElemContents, ElemMode, ExceptionType, ExternKind, Module, OrderedSectionId,
    ReferenceType,
};
use std::io::Write;

/// A magic constant used to quickly identify WebAssembly binary file contents.
const PREAMBLE: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// The version of the binary WebAssembly format emitted.
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

fn extern_kind_code(kind: ExternKind) -> u8 {
    match kind {
        ExternKind::Function => 0,
        ExternKind::Table => 1,
        ExternKind::Memory => 2,
        ExternKind::Global => 3,
        ExternKind::ExceptionType => 4,
    }
}

fn wire_section_id(id: OrderedSectionId) -> u8 {
    match id {
        OrderedSectionId::ModuleBeginning => 0,
        OrderedSectionId::Type => 1,
        OrderedSectionId::Import => 2,
        OrderedSectionId::Function => 3,
        OrderedSectionId::Table => 4,
        OrderedSectionId::Memory => 5,
        OrderedSectionId::Global => 6,
        OrderedSectionId::ExceptionType => 13,
        OrderedSectionId::Export => 7,
        OrderedSectionId::Start => 8,
        OrderedSectionId::Elem => 9,
        OrderedSectionId::DataCount => 12,
        OrderedSectionId::Code => 10,
        OrderedSectionId::Data => 11,
    }
}

fn emit_section(id: OrderedSectionId, payload: &[u8], output: &mut Vec<u8>) -> Result<(), EmitError> {
    output.push(wire_section_id(id));
    emit_u32(payload.len() as u32, output)?;
    output.extend_from_slice(payload);
    Ok(())
}

fn emit_custom_sections_after(
    module: &Module,
    position: OrderedSectionId,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    for section in &module.custom_sections {
        if section.after_section != position {
            continue;
        }
        let mut payload = Vec::new();
        emit_name(&section.name, &mut payload)?;
        payload.extend_from_slice(&section.data);
        output.push(0);
        emit_u32(payload.len() as u32, output)?;
        output.extend_from_slice(&payload);
    }
    Ok(())
}

fn emit_exception_type(ty: &ExceptionType, output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_u32(ty.parameters.len() as u32, output)?;
    for &kind in ty.parameters.kinds() {
        emit_value_type(kind, output);
    }
    Ok(())
}

fn type_section(module: &Module) -> Result<Vec<u8>, EmitError> {
    let mut payload = Vec::new();
    emit_u32(module.types.len() as u32, &mut payload)?;
    for ty in &module.types {
        payload.push(0x60);
        emit_u32(ty.parameters().len() as u32, &mut payload)?;
        for &kind in ty.parameters().kinds() {
            emit_value_type(kind, &mut payload);
        }
        emit_u32(ty.results().len() as u32, &mut payload)?;
        for &kind in ty.results().kinds() {
            emit_value_type(kind, &mut payload);
        }
    }
    Ok(payload)
}

fn import_section(module: &Module) -> Result<Vec<u8>, EmitError> {
    let num_imports = module.functions.import_count()
        + module.tables.import_count()
        + module.memories.import_count()
        + module.globals.import_count()
        + module.exception_types.import_count();
    if num_imports == 0 {
        return Ok(Vec::new());
    }

    let mut payload = Vec::new();
    emit_u32(num_imports, &mut payload)?;
    for import in module.functions.imports() {
        emit_name(&import.module_name, &mut payload)?;
        emit_name(&import.export_name, &mut payload)?;
        payload.push(0x00);
        emit_u32(import.ty, &mut payload)?;
    }
    for import in module.tables.imports() {
        emit_name(&import.module_name, &mut payload)?;
        emit_name(&import.export_name, &mut payload)?;
        payload.push(0x01);
        emit_table_type(&import.ty, &mut payload)?;
    }
    for import in module.memories.imports() {
        emit_name(&import.module_name, &mut payload)?;
        emit_name(&import.export_name, &mut payload)?;
        payload.push(0x02);
        emit_memory_type(&import.ty, &mut payload)?;
    }
    for import in module.globals.imports() {
        emit_name(&import.module_name, &mut payload)?;
        emit_name(&import.export_name, &mut payload)?;
        payload.push(0x03);
        emit_global_type(&import.ty, &mut payload);
    }
    for import in module.exception_types.imports() {
        emit_name(&import.module_name, &mut payload)?;
        emit_name(&import.export_name, &mut payload)?;
        payload.push(0x04);
        emit_exception_type(&import.ty, &mut payload)?;
    }
    Ok(payload)
}

fn elem_section(module: &Module) -> Result<Vec<u8>, EmitError> {
    if module.elem_segments.is_empty() {
        return Ok(Vec::new());
    }
    let mut payload = Vec::new();
    emit_u32(module.elem_segments.len() as u32, &mut payload)?;
    for segment in &module.elem_segments {
        match (&segment.mode, &segment.contents) {
            (
                ElemMode::Active {
                    table_index: 0,
                    offset,
                },
                ElemContents::Indices(ExternKind::Function, indices),
            ) => {
                emit_u32(0, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
                emit_u32(indices.len() as u32, &mut payload)?;
                for &index in indices {
                    emit_u32(index, &mut payload)?;
                }
            }
            (
                ElemMode::Active {
                    table_index,
                    offset,
                },
                ElemContents::Indices(kind, indices),
            ) => {
                emit_u32(2, &mut payload)?;
                emit_u32(*table_index, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
                payload.push(extern_kind_code(*kind));
                emit_u32(indices.len() as u32, &mut payload)?;
                for &index in indices {
                    emit_u32(index, &mut payload)?;
                }
            }
            (ElemMode::Passive, ElemContents::Indices(kind, indices)) => {
                emit_u32(1, &mut payload)?;
                payload.push(extern_kind_code(*kind));
                emit_u32(indices.len() as u32, &mut payload)?;
                for &index in indices {
                    emit_u32(index, &mut payload)?;
                }
            }
            (ElemMode::Declared, ElemContents::Indices(kind, indices)) => {
                emit_u32(3, &mut payload)?;
                payload.push(extern_kind_code(*kind));
                emit_u32(indices.len() as u32, &mut payload)?;
                for &index in indices {
                    emit_u32(index, &mut payload)?;
                }
            }
            (
                ElemMode::Active {
                    table_index: 0,
                    offset,
                },
                ElemContents::Expressions(ReferenceType::FuncRef, exprs),
            ) => {
                emit_u32(4, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
                emit_u32(exprs.len() as u32, &mut payload)?;
                for expr in exprs {
                    emit_elem_expr(expr, &mut payload)?;
                }
            }
            (
                ElemMode::Active {
                    table_index,
                    offset,
                },
                ElemContents::Expressions(element_type, exprs),
            ) => {
                emit_u32(6, &mut payload)?;
                emit_u32(*table_index, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
                emit_reference_type(*element_type, &mut payload);
                emit_u32(exprs.len() as u32, &mut payload)?;
                for expr in exprs {
                    emit_elem_expr(expr, &mut payload)?;
                }
            }
            (ElemMode::Passive, ElemContents::Expressions(element_type, exprs)) => {
                emit_u32(5, &mut payload)?;
                emit_reference_type(*element_type, &mut payload);
                emit_u32(exprs.len() as u32, &mut payload)?;
                for expr in exprs {
                    emit_elem_expr(expr, &mut payload)?;
                }
            }
            (ElemMode::Declared, ElemContents::Expressions(element_type, exprs)) => {
                emit_u32(7, &mut payload)?;
                emit_reference_type(*element_type, &mut payload);
                emit_u32(exprs.len() as u32, &mut payload)?;
                for expr in exprs {
                    emit_elem_expr(expr, &mut payload)?;
                }
            }
        }
    }
    Ok(payload)
}

fn data_section(module: &Module) -> Result<Vec<u8>, EmitError> {
    if module.data_segments.is_empty() {
        return Ok(Vec::new());
    }
    let mut payload = Vec::new();
    emit_u32(module.data_segments.len() as u32, &mut payload)?;
    for segment in &module.data_segments {
        match &segment.mode {
            DataMode::Active {
                memory_index: 0,
                offset,
            } => {
                emit_u32(0, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
            }
            DataMode::Passive => emit_u32(1, &mut payload)?,
            DataMode::Active {
                memory_index,
                offset,
            } => {
                emit_u32(2, &mut payload)?;
                emit_u32(*memory_index, &mut payload)?;
                emit_initializer(offset, &mut payload)?;
            }
        }
        emit_byte_vector(&segment.data, &mut payload)?;
    }
    Ok(payload)
}

fn code_section(module: &Module) -> Result<Vec<u8>, EmitError> {
    if module.functions.defs().is_empty() {
        return Ok(Vec::new());
    }
    let mut payload = Vec::new();
    emit_u32(module.functions.defs().len() as u32, &mut payload)?;
    for (def_index, def) in module.functions.defs().iter().enumerate() {
        let function_index = module.functions.import_count() + def_index as u32;
        let mut body = Vec::new();
        emit_function_body(def, function_index, &mut body)?;
        emit_u32(body.len() as u32, &mut payload)?;
        payload.extend_from_slice(&body);
    }
    Ok(payload)
}

/// Emits the whole module, returning the number of bytes written.
pub fn emit_module<O: Write>(module: &Module, output: &mut O) -> Result<usize, EmitError> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&PREAMBLE);
    bytes.extend_from_slice(&VERSION);

    emit_custom_sections_after(module, OrderedSectionId::ModuleBeginning, &mut bytes)?;

    let sections: Vec<(OrderedSectionId, Vec<u8>)> = vec![
        (OrderedSectionId::Type, {
            if module.types.is_empty() {
                Vec::new()
            } else {
                type_section(module)?
            }
        }),
        (OrderedSectionId::Import, import_section(module)?),
        (OrderedSectionId::Function, {
            let defs = module.functions.defs();
            if defs.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(defs.len() as u32, &mut payload)?;
                for def in defs {
                    emit_u32(def.type_index, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::Table, {
            let defs = module.tables.defs();
            if defs.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(defs.len() as u32, &mut payload)?;
                for def in defs {
                    emit_table_type(&def.ty, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::Memory, {
            let defs = module.memories.defs();
            if defs.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(defs.len() as u32, &mut payload)?;
                for def in defs {
                    emit_memory_type(&def.ty, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::Global, {
            let defs = module.globals.defs();
            if defs.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(defs.len() as u32, &mut payload)?;
                for def in defs {
                    emit_global_type(&def.ty, &mut payload);
                    emit_initializer(&def.initializer, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::ExceptionType, {
            let defs = module.exception_types.defs();
            if defs.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(defs.len() as u32, &mut payload)?;
                for def in defs {
                    emit_exception_type(&def.ty, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::Export, {
            if module.exports.is_empty() {
                Vec::new()
            } else {
                let mut payload = Vec::new();
                emit_u32(module.exports.len() as u32, &mut payload)?;
                for export in &module.exports {
                    emit_name(&export.name, &mut payload)?;
                    payload.push(extern_kind_code(export.kind));
                    emit_u32(export.index, &mut payload)?;
                }
                payload
            }
        }),
        (OrderedSectionId::Start, {
            match module.start_function_index {
                Some(index) => {
                    let mut payload = Vec::new();
                    emit_u32(index, &mut payload)?;
                    payload
                }
                None => Vec::new(),
            }
        }),
        (OrderedSectionId::Elem, elem_section(module)?),
        (OrderedSectionId::DataCount, {
            if module.feature_spec.bulk_memory_operations && !module.data_segments.is_empty() {
                let mut payload = Vec::new();
                emit_u32(module.data_segments.len() as u32, &mut payload)?;
                payload
            } else {
                Vec::new()
            }
        }),
        (OrderedSectionId::Code, code_section(module)?),
        (OrderedSectionId::Data, data_section(module)?),
    ];

    for (id, payload) in sections {
        if !payload.is_empty() {
            emit_section(id, &payload, &mut bytes)?;
        }
        emit_custom_sections_after(module, id, &mut bytes)?;
    }

    output.write_all(&bytes)?;
    Ok(bytes.len())
}
