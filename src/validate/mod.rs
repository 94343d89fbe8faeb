//! Structural validation of a module: index bounds, type agreement, section ordering, and
//! full revalidation of every function body's operator stream.

mod code;

pub use code::{CodeValidator, ValidatingSink};

use crate::features::Feature;
use crate::model::names::decode_name_section;
use crate::model::{
    DataMode, DisassemblyNames, ElemContents, ElemMode, ExternKind, FunctionType, IndexType,
    InitializerExpression, Module, OrderedSectionId, ValueType,
};
use crate::operators::CodeReader;
use thiserror::Error;

/// A validation failure, carrying a descriptive message.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    /// A code or module structure check failed.
    #[error("{0}")]
    Invalid(String),
    /// A function body's internal operator stream did not decode.
    #[error("function {0} has a corrupt operator stream")]
    CorruptCode(u32),
}

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError::Invalid(message.into())
}

/// Validates the initializer expression grammar: only the restricted forms are legal, the
/// expression's type must match `expected`, and `global.get` may only reference an imported
/// immutable global.
fn validate_initializer(
    module: &Module,
    expression: &InitializerExpression,
    expected: ValueType,
    context: &str,
) -> Result<(), ValidationError> {
    let actual = match expression {
        InitializerExpression::I32Const(_) => ValueType::I32,
        InitializerExpression::I64Const(_) => ValueType::I64,
        InitializerExpression::F32Const(_) => ValueType::F32,
        InitializerExpression::F64Const(_) => ValueType::F64,
        InitializerExpression::V128Const(_) => ValueType::V128,
        InitializerExpression::GlobalGet(index) => {
            if *index >= module.globals.import_count() {
                return Err(invalid(format!(
                    "{context}: global.get initializers may only reference imported globals, \
                     but global {index} is not an import"
                )));
            }
            let ty = module
                .globals
                .get_type(*index)
                .ok_or_else(|| invalid(format!("{context}: invalid global index {index}")))?;
            if ty.is_mutable() {
                return Err(invalid(format!(
                    "{context}: global.get initializers may only reference immutable globals"
                )));
            }
            ty.kind
        }
        InitializerExpression::RefNull(kind) => (*kind).into(),
        InitializerExpression::RefFunc(index) => {
            if *index >= module.functions.size() {
                return Err(invalid(format!(
                    "{context}: invalid function index {index}"
                )));
            }
            ValueType::FuncRef
        }
    };

    if actual != expected {
        return Err(invalid(format!(
            "{context}: type mismatch: expected {expected}, found {actual}"
        )));
    }
    Ok(())
}

fn address_value_type(index_type: IndexType) -> ValueType {
    match index_type {
        IndexType::I32 => ValueType::I32,
        IndexType::I64 => ValueType::I64,
    }
}

fn validate_function_bodies(module: &Module) -> Result<(), ValidationError> {
    let num_types = module.types.len() as u32;
    for import in module.functions.imports() {
        if import.ty >= num_types {
            return Err(invalid(format!(
                "imported function '{}.{}' has invalid type index {}",
                import.module_name, import.export_name, import.ty
            )));
        }
    }

    let import_count = module.functions.import_count();
    for (def_index, def) in module.functions.defs().iter().enumerate() {
        let function_index = import_count + def_index as u32;
        if def.type_index >= num_types {
            return Err(invalid(format!(
                "function {function_index} has invalid type index {}",
                def.type_index
            )));
        }
        if def.non_parameter_local_types.len() > module.feature_spec.max_locals {
            return Err(invalid(format!(
                "function {function_index} declares too many locals"
            )));
        }

        let function_type = &module.types[def.type_index as usize];
        let locals: Vec<ValueType> = function_type
            .parameters()
            .kinds()
            .iter()
            .copied()
            .chain(def.non_parameter_local_types.iter().copied())
            .collect();

        let mut validator = CodeValidator::new(module, function_type, &locals);
        for op in CodeReader::new(&def.code, &def.branch_tables) {
            let op = op.map_err(|_| ValidationError::CorruptCode(function_index))?;
            validator.visit(&op).map_err(|error| {
                invalid(format!("in function {function_index}: {error}"))
            })?;
        }
        if !validator.is_finished() {
            return Err(invalid(format!(
                "function {function_index} is missing its final 'end'"
            )));
        }
    }
    Ok(())
}

fn validate_tables_and_memories(module: &Module) -> Result<(), ValidationError> {
    if module.tables.size() > 1 && !module.feature_spec.supports(Feature::ReferenceTypes) {
        return Err(invalid(
            "multiple tables require the reference-types feature",
        ));
    }
    if module.memories.size() > 1 && !module.feature_spec.supports(Feature::MultipleMemories) {
        return Err(invalid("multiple memories require the multi-memory feature"));
    }

    for index in 0..module.tables.size() {
        let ty = module.tables.get_type(index).expect("index in bounds");
        if ty.size.min > ty.size.max {
            return Err(invalid(format!(
                "table {index} has a minimum size above its maximum"
            )));
        }
        if ty.shared && !module.feature_spec.supports(Feature::SharedTables) {
            return Err(invalid("shared tables require the shared-tables feature"));
        }
    }

    for index in 0..module.memories.size() {
        let ty = module.memories.get_type(index).expect("index in bounds");
        if ty.size.min > ty.size.max {
            return Err(invalid(format!(
                "memory {index} has a minimum size above its maximum"
            )));
        }
        const MAX_PAGES: u64 = 1 << 16;
        if ty.index_type == IndexType::I32 && ty.size.min > MAX_PAGES {
            return Err(invalid(format!(
                "memory {index} has a minimum size above the 32-bit address space"
            )));
        }
        if ty.shared {
            if !module.feature_spec.supports(Feature::Atomics) {
                return Err(invalid("shared memories require the atomics feature"));
            }
            if ty.size.max == u64::MAX {
                return Err(invalid(format!(
                    "shared memory {index} must declare a maximum size"
                )));
            }
        }
    }
    Ok(())
}

fn validate_globals(module: &Module) -> Result<(), ValidationError> {
    if !module.feature_spec.supports(Feature::ImportExportMutableGlobals) {
        for (index, import) in module.globals.imports().iter().enumerate() {
            if import.ty.is_mutable() {
                return Err(invalid(format!(
                    "imported global {index} is mutable, which requires the mutable-globals feature"
                )));
            }
        }
    }

    for (def_index, def) in module.globals.defs().iter().enumerate() {
        let global_index = module.globals.import_count() + def_index as u32;
        validate_initializer(
            module,
            &def.initializer,
            def.ty.kind,
            &format!("global {global_index} initializer"),
        )?;
    }
    Ok(())
}

fn validate_segments(module: &Module) -> Result<(), ValidationError> {
    if module.data_segments.len() > module.feature_spec.max_data_segments {
        return Err(invalid("too many data segments"));
    }

    for (index, segment) in module.data_segments.iter().enumerate() {
        match &segment.mode {
            DataMode::Active {
                memory_index,
                offset,
            } => {
                let memory = module.memories.get_type(*memory_index).ok_or_else(|| {
                    invalid(format!(
                        "data segment {index} references invalid memory {memory_index}"
                    ))
                })?;
                validate_initializer(
                    module,
                    offset,
                    address_value_type(memory.index_type),
                    &format!("data segment {index} offset"),
                )?;
            }
            DataMode::Passive => {
                if !module.feature_spec.supports(Feature::BulkMemoryOperations) {
                    return Err(invalid(
                        "passive data segments require the bulk-memory feature",
                    ));
                }
            }
        }
    }

    for (index, segment) in module.elem_segments.iter().enumerate() {
        match &segment.mode {
            ElemMode::Active {
                table_index,
                offset,
            } => {
                let table = module.tables.get_type(*table_index).ok_or_else(|| {
                    invalid(format!(
                        "elem segment {index} references invalid table {table_index}"
                    ))
                })?;
                validate_initializer(
                    module,
                    offset,
                    address_value_type(table.index_type),
                    &format!("elem segment {index} offset"),
                )?;
                if let ElemContents::Expressions(element_type, _) = &segment.contents {
                    if *element_type != table.element_type {
                        return Err(invalid(format!(
                            "elem segment {index} element type does not match table {table_index}"
                        )));
                    }
                }
            }
            ElemMode::Passive | ElemMode::Declared => {
                if !module.feature_spec.supports(Feature::BulkMemoryOperations)
                    && !module.feature_spec.supports(Feature::ReferenceTypes)
                {
                    return Err(invalid(
                        "passive and declared elem segments require the bulk-memory feature",
                    ));
                }
            }
        }

        match &segment.contents {
            ElemContents::Expressions(_, exprs) => {
                for expr in exprs {
                    if let crate::model::ElemExpr::RefFunc(function_index) = expr {
                        if *function_index >= module.functions.size() {
                            return Err(invalid(format!(
                                "elem segment {index} references invalid function {function_index}"
                            )));
                        }
                    }
                }
            }
            ElemContents::Indices(kind, indices) => {
                if *kind != ExternKind::Function
                    && !module.feature_spec.allow_any_extern_kind_elem_segments
                {
                    return Err(invalid(format!(
                        "elem segment {index} has non-function contents, which requires the \
                         any-extern-kind-elems feature"
                    )));
                }
                let size = module.index_space_size(*kind);
                for &element in indices {
                    if element >= size {
                        return Err(invalid(format!(
                            "elem segment {index} references invalid {} {element}",
                            kind.mnemonic()
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_exports(module: &Module) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for export in &module.exports {
        if !seen.insert(export.name.as_str()) {
            return Err(invalid(format!(
                "duplicate export name '{}'",
                export.name
            )));
        }
        if export.index >= module.index_space_size(export.kind) {
            return Err(invalid(format!(
                "export '{}' references invalid {} {}",
                export.name,
                export.kind.mnemonic(),
                export.index
            )));
        }
        if export.kind == ExternKind::Global
            && !module.feature_spec.supports(Feature::ImportExportMutableGlobals)
        {
            let ty = module.globals.get_type(export.index).expect("index checked");
            if ty.is_mutable() {
                return Err(invalid(format!(
                    "exported global '{}' is mutable, which requires the mutable-globals feature",
                    export.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_start(module: &Module) -> Result<(), ValidationError> {
    let Some(index) = module.start_function_index else {
        return Ok(());
    };
    let ty = module
        .function_type(index)
        .ok_or_else(|| invalid(format!("start function index {index} is invalid")))?;
    if *ty != FunctionType::runnable() {
        return Err(invalid(
            "the start function must take no parameters and return no results",
        ));
    }
    Ok(())
}

fn validate_custom_sections(module: &Module) -> Result<(), ValidationError> {
    let mut last = OrderedSectionId::ModuleBeginning;
    for section in &module.custom_sections {
        if section.after_section < last {
            return Err(invalid(format!(
                "custom section '{}' is out of order",
                section.name
            )));
        }
        last = section.after_section;
    }

    if let Some(section) = module.custom_section("name") {
        let mut names = DisassemblyNames::for_module(module);
        decode_name_section(&section.data, &mut names)
            .map_err(|message| invalid(format!("invalid name section: {message}")))?;
    }
    Ok(())
}

/// Validates the whole module, returning the first failure.
///
/// The text parser and the binary decoder run the same checks incrementally; this entry point
/// re-checks an arbitrary in-memory module, including every function body.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{validate_module, FeatureSpec, Module};
///
/// assert!(validate_module(&Module::new(FeatureSpec::default())).is_ok());
/// ```
pub fn validate_module(module: &Module) -> Result<(), ValidationError> {
    validate_function_bodies(module)?;
    validate_tables_and_memories(module)?;
    validate_globals(module)?;
    validate_segments(module)?;
    validate_exports(module)?;
    validate_start(module)?;
    validate_custom_sections(module)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;
    use crate::model::{
        Export, FunctionDef, GlobalDef, GlobalType, Import, ResultType,
    };

    fn empty_module() -> Module {
        Module::new(FeatureSpec::default())
    }

    #[test]
    fn empty_module_is_valid() {
        assert!(validate_module(&empty_module()).is_ok());
    }

    #[test]
    fn start_signature_must_be_runnable() {
        let mut module = empty_module();
        module.types.push(FunctionType::new(
            ResultType::new(vec![ValueType::I32]),
            ResultType::empty(),
        ));
        module.functions.push_def(FunctionDef {
            type_index: 0,
            code: encoded_end(),
            ..Default::default()
        });
        module.start_function_index = Some(0);

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("start function"));
    }

    #[test]
    fn export_indices_are_checked() {
        let mut module = empty_module();
        module.exports.push(Export {
            name: "ghost".to_string(),
            kind: ExternKind::Function,
            index: 3,
        });

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("invalid func 3"));
    }

    #[test]
    fn duplicate_export_names_are_rejected() {
        let mut module = empty_module();
        module.types.push(FunctionType::runnable());
        module.functions.push_def(FunctionDef {
            type_index: 0,
            code: encoded_end(),
            ..Default::default()
        });
        for _ in 0..2 {
            module.exports.push(Export {
                name: "twice".to_string(),
                kind: ExternKind::Function,
                index: 0,
            });
        }

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("duplicate export"));
    }

    #[test]
    fn initializer_must_reference_imported_globals() {
        let mut module = empty_module();
        module.globals.push_def(GlobalDef {
            ty: GlobalType::immutable(ValueType::I32),
            initializer: InitializerExpression::I32Const(1),
        });
        module.globals.push_def(GlobalDef {
            ty: GlobalType::immutable(ValueType::I32),
            initializer: InitializerExpression::GlobalGet(0),
        });

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("imported"));
    }

    #[test]
    fn initializer_types_must_match() {
        let mut module = empty_module();
        module.globals.push_def(GlobalDef {
            ty: GlobalType::immutable(ValueType::I64),
            initializer: InitializerExpression::I32Const(1),
        });

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("type mismatch"));
    }

    #[test]
    fn mutable_global_import_is_feature_gated() {
        let mut module = empty_module();
        module.feature_spec.import_export_mutable_globals = false;
        module.globals.push_import(Import {
            module_name: "env".to_string(),
            export_name: "counter".to_string(),
            ty: GlobalType::mutable(ValueType::I32),
        });

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("mutable"));
    }

    #[test]
    fn custom_section_markers_must_be_ordered() {
        let mut module = empty_module();
        module.custom_sections.push(crate::model::CustomSection {
            after_section: OrderedSectionId::Data,
            name: "late".to_string(),
            data: vec![],
        });
        module.custom_sections.push(crate::model::CustomSection {
            after_section: OrderedSectionId::Type,
            name: "early".to_string(),
            data: vec![],
        });

        let error = validate_module(&module).unwrap_err();
        assert!(error.to_string().contains("out of order"));
    }

    fn encoded_end() -> Vec<u8> {
        let mut code = Vec::new();
        let mut branch_tables = Vec::new();
        crate::operators::codec::encode_operator(
            &crate::operators::Operator::named("end").unwrap(),
            &mut code,
            &mut branch_tables,
        );
        code
    }
}
