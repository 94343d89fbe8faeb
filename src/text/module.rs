//! Recursive-descent parsing of module declarations.
//!
//! Forward references are resolved through three ordered callback queues drained after the
//! declaration pass: post-type callbacks (signature references, once the type space is final),
//! post-declaration callbacks (export targets, segment bases, start references, once every
//! index space is final), and the function-body queue (bodies parsed last, against the
//! complete module).

use crate::features::FeatureSpec;
use crate::model::{
    CustomSection, DataMode, DataSegment, DisassemblyNames, ElemContents, ElemExpr, ElemMode,
    ElemSegment, ExceptionType, ExceptionTypeDef, Export, ExternKind, FunctionDef, FunctionNames,
    FunctionType, GlobalDef, GlobalType, Import, IndexType, InitializerExpression, MemoryDef,
    MemoryType, Module, Mutability, OrderedSectionId, ReferenceType, ResultType, SizeConstraints,
    TableDef, TableType, ValueType,
};
use crate::text::function::{self, PendingFunctionBody};
use crate::text::lexer::{
    lex, T_AFTER, T_CODE, T_CUSTOM_SECTION, T_DATA, T_DATA_COUNT, T_DECLARE, T_ELEM, T_EOF,
    T_EXCEPTION_TYPE, T_EXPORT, T_EXTERN, T_FUNC, T_GLOBAL, T_I32, T_I64, T_IMPORT, T_ITEM,
    T_LEFT_PAREN, T_LOCAL, T_MEMORY, T_MODULE, T_MUT, T_OFFSET, T_PARAM, T_RESULT,
    T_RIGHT_PAREN, T_SHARED, T_START, T_TABLE, T_TYPE,
};
use crate::text::parse::{
    bind_name, expected_error, op_token, parse_name_or_index_ref, parse_parenthesized,
    parse_string, parse_utf8_string, parse_v128, require, resolve_ref, try_parse_name,
    try_parse_name_or_index_ref, try_parse_parenthesized_tagged, try_parse_reference_type,
    try_parse_u64, try_parse_value_type, Cursor, Error, Name, NameToIndexMap, Parse, ParseAbort,
    ParseState, Reference,
};
use crate::text::parse::{parse_f32, parse_f64, parse_i32, parse_i64, parse_reference_type, parse_value_type};
use std::collections::HashMap;

/// A deferred resolution step, run once the declarations it depends on are final.
pub(crate) type Callback = Box<dyn FnOnce(&mut ModuleState, &mut ParseState)>;

/// State accumulated while parsing one module.
pub struct ModuleState {
    pub module: Module,
    pub disassembly: DisassemblyNames,

    pub(crate) type_to_index: HashMap<FunctionType, u32>,
    pub(crate) type_names: NameToIndexMap,
    pub(crate) function_names: NameToIndexMap,
    pub(crate) table_names: NameToIndexMap,
    pub(crate) memory_names: NameToIndexMap,
    pub(crate) global_names: NameToIndexMap,
    pub(crate) exception_type_names: NameToIndexMap,
    pub(crate) elem_names: NameToIndexMap,
    pub(crate) data_names: NameToIndexMap,

    pub(crate) start_offset: Option<u32>,

    pub(crate) post_type_callbacks: Vec<Callback>,
    pub(crate) post_declaration_callbacks: Vec<Callback>,
    pub(crate) pending_function_bodies: Vec<PendingFunctionBody>,
}

impl ModuleState {
    pub(crate) fn new(features: FeatureSpec) -> Self {
        ModuleState {
            module: Module::new(features),
            disassembly: DisassemblyNames::default(),
            type_to_index: HashMap::new(),
            type_names: NameToIndexMap::default(),
            function_names: NameToIndexMap::default(),
            table_names: NameToIndexMap::default(),
            memory_names: NameToIndexMap::default(),
            global_names: NameToIndexMap::default(),
            exception_type_names: NameToIndexMap::default(),
            elem_names: NameToIndexMap::default(),
            data_names: NameToIndexMap::default(),
            start_offset: None,
            post_type_callbacks: Vec::new(),
            post_declaration_callbacks: Vec::new(),
            pending_function_bodies: Vec::new(),
        }
    }

    pub(crate) fn post_type(&mut self, callback: impl FnOnce(&mut ModuleState, &mut ParseState) + 'static) {
        self.post_type_callbacks.push(Box::new(callback));
    }

    pub(crate) fn post_declaration(
        &mut self,
        callback: impl FnOnce(&mut ModuleState, &mut ParseState) + 'static,
    ) {
        self.post_declaration_callbacks.push(Box::new(callback));
    }

    pub(crate) fn name_map(&self, kind: ExternKind) -> &NameToIndexMap {
        match kind {
            ExternKind::Function => &self.function_names,
            ExternKind::Table => &self.table_names,
            ExternKind::Memory => &self.memory_names,
            ExternKind::Global => &self.global_names,
            ExternKind::ExceptionType => &self.exception_type_names,
        }
    }

    /// Resolves a reference to an entry of the index space named by `kind`.
    pub(crate) fn resolve_extern_ref(
        &self,
        state: &mut ParseState,
        kind: ExternKind,
        reference: &Reference,
    ) -> u32 {
        resolve_ref(
            state,
            self.name_map(kind),
            self.module.index_space_size(kind),
            reference,
        )
    }
}

/// An inline function signature and/or a reference to a declared type.
#[derive(Default)]
pub(crate) struct UnresolvedFunctionType {
    pub reference: Option<Reference>,
    pub explicit: FunctionType,
    pub has_explicit: bool,
}

/// Looks up the index for a signature, adding it to the type space if no equal signature has
/// been seen. Equal signatures share an index.
pub(crate) fn get_unique_function_type_index(
    module_state: &mut ModuleState,
    function_type: FunctionType,
) -> u32 {
    if let Some(&index) = module_state.type_to_index.get(&function_type) {
        return index;
    }
    let index = module_state.module.types.len() as u32;
    module_state.module.types.push(function_type.clone());
    module_state.type_to_index.insert(function_type, index);
    module_state.disassembly.types.push(String::new());
    index
}

/// Resolves a parsed type use to a type index, checking an inline signature against the
/// referenced declaration when both are present. Must run after the type space is final.
pub(crate) fn resolve_function_type(
    module_state: &mut ModuleState,
    state: &mut ParseState,
    unresolved: UnresolvedFunctionType,
) -> u32 {
    match unresolved.reference {
        Some(reference) => {
            let offset = reference.source_offset();
            let index = resolve_ref(
                state,
                &module_state.type_names,
                module_state.module.types.len() as u32,
                &reference,
            );
            if index != u32::MAX && unresolved.has_explicit {
                let declared = &module_state.module.types[index as usize];
                if *declared != unresolved.explicit {
                    state.error_at_offset(
                        offset as usize,
                        "inline function signature does not match the referenced type",
                    );
                }
            }
            index
        }
        None => get_unique_function_type_index(module_state, unresolved.explicit),
    }
}

/// Parses `(param …)*` then `(result …)*`, binding parameter names into `local_names`.
pub(crate) fn parse_function_type(
    cursor: &mut Cursor,
    state: &mut ParseState,
    local_names: &mut NameToIndexMap,
    local_disassembly: &mut Vec<String>,
) -> Parse<FunctionType> {
    let mut parameters: Vec<ValueType> = Vec::new();
    let mut results: Vec<ValueType> = Vec::new();

    while cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_PARAM {
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            if let Some(name) = try_parse_name(cursor, state) {
                let kind = parse_value_type(cursor, state)?;
                bind_name(state, local_names, &name, parameters.len() as u32);
                local_disassembly.push(name.text);
                parameters.push(kind);
            } else {
                while let Some(kind) = try_parse_value_type(cursor) {
                    local_disassembly.push(String::new());
                    parameters.push(kind);
                }
            }
            Ok(())
        })?;
    }

    while cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_RESULT {
        parse_parenthesized(cursor, state, |cursor, _state| {
            cursor.advance();
            while let Some(kind) = try_parse_value_type(cursor) {
                results.push(kind);
            }
            Ok(())
        })?;
    }

    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_PARAM {
        state.error_at_offset(cursor.offset(), "parameters must precede results");
        return Err(ParseAbort::Recover);
    }

    Ok(FunctionType::new(
        ResultType::new(parameters),
        ResultType::new(results),
    ))
}

/// Parses an optional `(type …)` reference and/or an inline signature declaration.
pub(crate) fn parse_function_type_ref_and_or_decl(
    cursor: &mut Cursor,
    state: &mut ParseState,
    local_names: &mut NameToIndexMap,
    local_disassembly: &mut Vec<String>,
) -> Parse<UnresolvedFunctionType> {
    let mut unresolved = UnresolvedFunctionType::default();

    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_TYPE {
        let mut reference = None;
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            reference = Some(parse_name_or_index_ref(cursor, state, "type reference")?);
            Ok(())
        })?;
        unresolved.reference = reference;
    }

    let before = cursor.position;
    unresolved.explicit = parse_function_type(cursor, state, local_names, local_disassembly)?;
    unresolved.has_explicit = cursor.position != before;

    Ok(unresolved)
}

fn parse_optional_shared(cursor: &mut Cursor) -> bool {
    if cursor.ty() == T_SHARED {
        cursor.advance();
        true
    } else {
        false
    }
}

fn parse_optional_index_type(cursor: &mut Cursor) -> IndexType {
    match cursor.ty() {
        T_I64 => {
            cursor.advance();
            IndexType::I64
        }
        T_I32 => {
            cursor.advance();
            IndexType::I32
        }
        _ => IndexType::I32,
    }
}

fn try_parse_size_constraints(
    cursor: &mut Cursor,
    state: &mut ParseState,
    max_max: u64,
) -> Parse<Option<SizeConstraints>> {
    let offset = cursor.offset();
    let Some(min) = try_parse_u64(cursor, state) else {
        return Ok(None);
    };
    let max = match try_parse_u64(cursor, state) {
        Some(max) => max,
        None => u64::MAX,
    };
    if min > max || min > max_max {
        state.error_at_offset(offset, "size minimum exceeds the maximum");
    }
    Ok(Some(SizeConstraints { min, max }))
}

fn parse_size_constraints(
    cursor: &mut Cursor,
    state: &mut ParseState,
    max_max: u64,
) -> Parse<SizeConstraints> {
    match try_parse_size_constraints(cursor, state, max_max)? {
        Some(size) => Ok(size),
        None => {
            expected_error(cursor, state, "size constraints");
            Err(ParseAbort::Recover)
        }
    }
}

fn parse_table_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<TableType> {
    let index_type = parse_optional_index_type(cursor);
    let size = parse_size_constraints(cursor, state, u64::from(u32::MAX))?;
    let shared = parse_optional_shared(cursor);
    let element_type = parse_reference_type(cursor, state)?;
    Ok(TableType {
        element_type,
        shared,
        index_type,
        size,
    })
}

fn parse_memory_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<MemoryType> {
    let index_type = parse_optional_index_type(cursor);
    let size = parse_size_constraints(cursor, state, 1 << 16)?;
    let shared = parse_optional_shared(cursor);
    Ok(MemoryType {
        shared,
        index_type,
        size,
    })
}

fn parse_global_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<GlobalType> {
    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_MUT {
        let mut kind = ValueType::I32;
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            kind = parse_value_type(cursor, state)?;
            Ok(())
        })?;
        Ok(GlobalType {
            mutability: Mutability::Mutable,
            kind,
        })
    } else {
        let kind = parse_value_type(cursor, state)?;
        Ok(GlobalType {
            mutability: Mutability::Immutable,
            kind,
        })
    }
}

fn parse_exception_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<ExceptionType> {
    let mut parameters = Vec::new();
    while cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_PARAM {
        parse_parenthesized(cursor, state, |cursor, _state| {
            cursor.advance();
            while let Some(kind) = try_parse_value_type(cursor) {
                parameters.push(kind);
            }
            Ok(())
        })?;
    }
    Ok(ExceptionType {
        parameters: ResultType::new(parameters),
    })
}

/// An initializer expression with its references not yet resolved.
pub(crate) enum UnresolvedInitializer {
    Resolved(InitializerExpression),
    GlobalGet(Reference),
    RefFunc(Reference),
}

/// Parses one initializer instruction (already inside its parentheses).
fn parse_initializer_instruction(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<UnresolvedInitializer> {
    let ty = cursor.ty();
    if ty == op_token("i32.const") {
        cursor.advance();
        let value = parse_i32(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::I32Const(value as i32),
        ))
    } else if ty == op_token("i64.const") {
        cursor.advance();
        let value = parse_i64(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::I64Const(value as i64),
        ))
    } else if ty == op_token("f32.const") {
        cursor.advance();
        let bits = parse_f32(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::F32Const(bits),
        ))
    } else if ty == op_token("f64.const") {
        cursor.advance();
        let bits = parse_f64(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::F64Const(bits),
        ))
    } else if ty == op_token("v128.const") {
        cursor.advance();
        let bytes = parse_v128(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::V128Const(bytes),
        ))
    } else if ty == op_token("global.get") {
        cursor.advance();
        let reference = parse_name_or_index_ref(cursor, state, "global reference")?;
        Ok(UnresolvedInitializer::GlobalGet(reference))
    } else if ty == op_token("ref.null") {
        cursor.advance();
        let kind = parse_referenced_type(cursor, state)?;
        Ok(UnresolvedInitializer::Resolved(
            InitializerExpression::RefNull(kind),
        ))
    } else if ty == op_token("ref.func") {
        cursor.advance();
        let reference = parse_name_or_index_ref(cursor, state, "function reference")?;
        Ok(UnresolvedInitializer::RefFunc(reference))
    } else {
        expected_error(cursor, state, "initializer expression");
        Err(ParseAbort::Recover)
    }
}

/// Parses the heap-type keyword of `ref.null`: `func` or `extern` (the reference-type
/// keywords are also accepted).
pub(crate) fn parse_referenced_type(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<ReferenceType> {
    match cursor.ty() {
        T_FUNC => {
            cursor.advance();
            Ok(ReferenceType::FuncRef)
        }
        T_EXTERN => {
            cursor.advance();
            Ok(ReferenceType::ExternRef)
        }
        _ => match try_parse_reference_type(cursor) {
            Some(kind) => Ok(kind),
            None => {
                expected_error(cursor, state, "reference type");
                Err(ParseAbort::Recover)
            }
        },
    }
}

/// Parses a parenthesized initializer expression.
fn parse_initializer_expression(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<UnresolvedInitializer> {
    let mut initializer = UnresolvedInitializer::Resolved(InitializerExpression::I32Const(0));
    parse_parenthesized(cursor, state, |cursor, state| {
        initializer = parse_initializer_instruction(cursor, state)?;
        Ok(())
    })?;
    Ok(initializer)
}

/// Resolves an initializer's references against the final index spaces.
pub(crate) fn resolve_initializer(
    module_state: &mut ModuleState,
    state: &mut ParseState,
    unresolved: UnresolvedInitializer,
) -> InitializerExpression {
    match unresolved {
        UnresolvedInitializer::Resolved(expression) => expression,
        UnresolvedInitializer::GlobalGet(reference) => {
            let index = module_state.resolve_extern_ref(state, ExternKind::Global, &reference);
            InitializerExpression::GlobalGet(index)
        }
        UnresolvedInitializer::RefFunc(reference) => {
            let index = module_state.resolve_extern_ref(state, ExternKind::Function, &reference);
            InitializerExpression::RefFunc(index)
        }
    }
}

fn error_if_follows_definitions(
    cursor: &Cursor,
    state: &mut ParseState,
    module_state: &ModuleState,
) {
    let module = &module_state.module;
    if module.functions.has_defs()
        || module.tables.has_defs()
        || module.memories.has_defs()
        || module.globals.has_defs()
        || module.exception_types.has_defs()
    {
        state.error_at_offset(
            cursor.offset(),
            "import declarations must precede all definitions",
        );
    }
}

fn try_parse_extern_kind(cursor: &mut Cursor) -> Option<ExternKind> {
    let kind = match cursor.ty() {
        T_FUNC => ExternKind::Function,
        T_TABLE => ExternKind::Table,
        T_MEMORY => ExternKind::Memory,
        T_GLOBAL => ExternKind::Global,
        T_EXCEPTION_TYPE => ExternKind::ExceptionType,
        _ => return None,
    };
    cursor.advance();
    Some(kind)
}

/// Parses `(import "module" "name" (kind $name? type))`.
fn parse_import(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    error_if_follows_definitions(cursor, state, module_state);

    let module_name = parse_utf8_string(cursor, state)?;
    let export_name = parse_utf8_string(cursor, state)?;

    parse_parenthesized(cursor, state, |cursor, state| {
        let kind_offset = cursor.offset();
        let Some(kind) = try_parse_extern_kind(cursor) else {
            expected_error(cursor, state, "import kind");
            return Err(ParseAbort::Recover);
        };
        if kind == ExternKind::ExceptionType && !state.features.exception_handling {
            state.error_at_offset(kind_offset, "exception type imports require the exception-handling feature");
        }
        let name = try_parse_name(cursor, state);
        parse_import_body(cursor, state, module_state, kind, name, module_name, export_name)
    })
}

/// Shared tail of explicit imports and inline `(func (import …))`-style imports: parses the
/// type, appends the import, and binds its name.
fn parse_import_body(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    kind: ExternKind,
    name: Option<Name>,
    module_name: String,
    export_name: String,
) -> Parse<()> {
    match kind {
        ExternKind::Function => {
            let mut local_names = NameToIndexMap::default();
            let mut local_disassembly = Vec::new();
            let unresolved =
                parse_function_type_ref_and_or_decl(cursor, state, &mut local_names, &mut local_disassembly)?;
            let index = module_state.module.functions.push_import(Import {
                module_name,
                export_name,
                ty: u32::MAX,
            });
            if let Some(name) = &name {
                bind_name(state, &mut module_state.function_names, name, index);
            }
            module_state.disassembly.functions.push(FunctionNames {
                name: name.map(|name| name.text).unwrap_or_default(),
                locals: local_disassembly,
                labels: Vec::new(),
            });
            module_state.post_type(move |module_state, state| {
                let type_index = resolve_function_type(module_state, state, unresolved);
                if let Some(import) = module_state
                    .module
                    .functions
                    .imports_mut()
                    .get_mut(index as usize)
                {
                    import.ty = type_index;
                }
            });
        }
        ExternKind::Table => {
            let ty = parse_table_type(cursor, state)?;
            let index = module_state.module.tables.push_import(Import {
                module_name,
                export_name,
                ty,
            });
            if let Some(name) = &name {
                bind_name(state, &mut module_state.table_names, name, index);
            }
            module_state
                .disassembly
                .tables
                .push(name.map(|name| name.text).unwrap_or_default());
        }
        ExternKind::Memory => {
            let ty = parse_memory_type(cursor, state)?;
            let index = module_state.module.memories.push_import(Import {
                module_name,
                export_name,
                ty,
            });
            if let Some(name) = &name {
                bind_name(state, &mut module_state.memory_names, name, index);
            }
            module_state
                .disassembly
                .memories
                .push(name.map(|name| name.text).unwrap_or_default());
        }
        ExternKind::Global => {
            let ty = parse_global_type(cursor, state)?;
            let index = module_state.module.globals.push_import(Import {
                module_name,
                export_name,
                ty,
            });
            if let Some(name) = &name {
                bind_name(state, &mut module_state.global_names, name, index);
            }
            module_state
                .disassembly
                .globals
                .push(name.map(|name| name.text).unwrap_or_default());
        }
        ExternKind::ExceptionType => {
            let ty = parse_exception_type(cursor, state)?;
            let index = module_state.module.exception_types.push_import(Import {
                module_name,
                export_name,
                ty,
            });
            if let Some(name) = &name {
                bind_name(state, &mut module_state.exception_type_names, name, index);
            }
            module_state
                .disassembly
                .exception_types
                .push(name.map(|name| name.text).unwrap_or_default());
        }
    }
    Ok(())
}

/// Parses `(export "name" (kind ref))`. The target is resolved after all declarations.
fn parse_export(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = parse_utf8_string(cursor, state)?;
    parse_parenthesized(cursor, state, |cursor, state| {
        let Some(kind) = try_parse_extern_kind(cursor) else {
            expected_error(cursor, state, "export kind");
            return Err(ParseAbort::Recover);
        };
        let reference = parse_name_or_index_ref(cursor, state, "export target")?;
        let export_index = module_state.module.exports.len();
        module_state.module.exports.push(Export {
            name,
            kind,
            index: u32::MAX,
        });
        module_state.post_declaration(move |module_state, state| {
            let index = module_state.resolve_extern_ref(state, kind, &reference);
            module_state.module.exports[export_index].index = index;
        });
        Ok(())
    })
}

/// Parses `(type $name? (func …))`.
fn parse_type(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);

    parse_parenthesized(cursor, state, |cursor, state| {
        require(cursor, state, T_FUNC)?;
        let mut local_names = NameToIndexMap::default();
        let mut local_disassembly = Vec::new();
        let function_type = parse_function_type(cursor, state, &mut local_names, &mut local_disassembly)?;

        let index = module_state.module.types.len() as u32;
        module_state.module.types.push(function_type.clone());
        module_state.type_to_index.entry(function_type).or_insert(index);
        if let Some(name) = &name {
            bind_name(state, &mut module_state.type_names, name, index);
        }
        module_state
            .disassembly
            .types
            .push(name.as_ref().map(|name| name.text.clone()).unwrap_or_default());
        Ok(())
    })
}

/// Parses `(start ref)`. A second start field is an error.
fn parse_start(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let offset = cursor.offset() as u32;
    let reference = parse_name_or_index_ref(cursor, state, "start function reference")?;

    if let Some(previous) = module_state.start_offset {
        state.error_at_offset(
            offset as usize,
            format!(
                "redundant start function declaration (previously declared at {})",
                state.describe_offset(previous as usize)
            ),
        );
    } else {
        module_state.start_offset = Some(offset);
        module_state.post_declaration(move |module_state, state| {
            let index = module_state.resolve_extern_ref(state, ExternKind::Function, &reference);
            module_state.module.start_function_index = Some(index);
        });
    }
    Ok(())
}

/// Parses inline `(export "name")` sugar on a definition, recording exports of the object
/// about to be created, and `(import "m" "n")` sugar, returning the import names.
fn parse_inline_import_export(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    kind: ExternKind,
) -> Parse<Option<(String, String)>> {
    let mut import_names = None;
    loop {
        if cursor.ty() != T_LEFT_PAREN {
            break;
        }
        match cursor.peek(1).ty {
            T_EXPORT => {
                let index = module_state.module.index_space_size(kind);
                parse_parenthesized(cursor, state, |cursor, state| {
                    cursor.advance();
                    let name = parse_utf8_string(cursor, state)?;
                    module_state.module.exports.push(Export { name, kind, index });
                    Ok(())
                })?;
            }
            T_IMPORT if import_names.is_none() => {
                let mut names = (String::new(), String::new());
                parse_parenthesized(cursor, state, |cursor, state| {
                    cursor.advance();
                    names.0 = parse_utf8_string(cursor, state)?;
                    names.1 = parse_utf8_string(cursor, state)?;
                    Ok(())
                })?;
                import_names = Some(names);
            }
            _ => break,
        }
    }
    Ok(import_names)
}

/// Parses `(global $name? <inline sugar> <type> <init>)`.
fn parse_global(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);
    let import_names = parse_inline_import_export(cursor, state, module_state, ExternKind::Global)?;

    if let Some((module_name, export_name)) = import_names {
        error_if_follows_definitions(cursor, state, module_state);
        return parse_import_body(
            cursor,
            state,
            module_state,
            ExternKind::Global,
            name,
            module_name,
            export_name,
        );
    }

    let ty = parse_global_type(cursor, state)?;
    let initializer = parse_initializer_expression(cursor, state)?;
    let index = module_state.module.globals.push_def(GlobalDef {
        ty,
        initializer: InitializerExpression::I32Const(0),
    });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.global_names, name, index);
    }
    module_state
        .disassembly
        .globals
        .push(name.map(|name| name.text).unwrap_or_default());
    module_state.post_declaration(move |module_state, state| {
        let resolved = resolve_initializer(module_state, state, initializer);
        if let Some(def) = module_state.module.globals.get_def_mut(index) {
            def.initializer = resolved;
        }
    });
    Ok(())
}

/// Parses `(exception_type $name? <inline sugar> (param …)?)`.
fn parse_exception_type_decl(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
) -> Parse<()> {
    if !state.features.exception_handling {
        state.error_at_offset(
            cursor.offset(),
            "exception type declarations require the exception-handling feature",
        );
    }
    let name = try_parse_name(cursor, state);
    let import_names =
        parse_inline_import_export(cursor, state, module_state, ExternKind::ExceptionType)?;

    if let Some((module_name, export_name)) = import_names {
        error_if_follows_definitions(cursor, state, module_state);
        return parse_import_body(
            cursor,
            state,
            module_state,
            ExternKind::ExceptionType,
            name,
            module_name,
            export_name,
        );
    }

    let ty = parse_exception_type(cursor, state)?;
    let index = module_state.module.exception_types.push_def(ExceptionTypeDef { ty });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.exception_type_names, name, index);
    }
    module_state
        .disassembly
        .exception_types
        .push(name.map(|name| name.text).unwrap_or_default());
    Ok(())
}

/// Parses the contents of an elem segment: either raw indices into an extern kind's index
/// space, or reference expressions of a declared element type.
fn parse_elem_contents(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<UnresolvedElemContents> {
    if let Some(element_type) = try_parse_reference_type(cursor) {
        // Expression encoding: `(item <expr>)` or an abbreviated `(<expr>)` per element.
        let mut exprs = Vec::new();
        while cursor.ty() == T_LEFT_PAREN {
            parse_parenthesized(cursor, state, |cursor, state| {
                if cursor.ty() == T_ITEM {
                    cursor.advance();
                    let mut expr = None;
                    parse_parenthesized(cursor, state, |cursor, state| {
                        expr = Some(parse_elem_expr_instruction(cursor, state)?);
                        Ok(())
                    })?;
                    if let Some(expr) = expr {
                        exprs.push(expr);
                    }
                } else {
                    exprs.push(parse_elem_expr_instruction(cursor, state)?);
                }
                Ok(())
            })?;
        }
        return Ok(UnresolvedElemContents::Expressions(element_type, exprs));
    }

    // Index encoding: an optional extern-kind keyword, then references. A bare reference
    // list is the MVP abbreviation for function indices.
    let kind = match cursor.ty() {
        T_FUNC => {
            cursor.advance();
            ExternKind::Function
        }
        T_TABLE => {
            cursor.advance();
            ExternKind::Table
        }
        T_MEMORY => {
            cursor.advance();
            ExternKind::Memory
        }
        T_GLOBAL => {
            cursor.advance();
            ExternKind::Global
        }
        _ => ExternKind::Function,
    };
    if kind != ExternKind::Function && !state.features.allow_any_extern_kind_elem_segments {
        state.error_at_offset(
            cursor.offset(),
            "elem segments of non-function kinds require the any-extern-kind-elems feature",
        );
    }

    let mut references = Vec::new();
    while let Some(reference) = try_parse_name_or_index_ref(cursor, state) {
        references.push(reference);
    }
    Ok(UnresolvedElemContents::Indices(kind, references))
}

enum UnresolvedElemContents {
    Expressions(ReferenceType, Vec<UnresolvedElemExpr>),
    Indices(ExternKind, Vec<Reference>),
}

enum UnresolvedElemExpr {
    RefNull(ReferenceType),
    RefFunc(Reference),
}

fn parse_elem_expr_instruction(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<UnresolvedElemExpr> {
    let ty = cursor.ty();
    if ty == op_token("ref.null") {
        cursor.advance();
        let kind = parse_referenced_type(cursor, state)?;
        Ok(UnresolvedElemExpr::RefNull(kind))
    } else if ty == op_token("ref.func") {
        cursor.advance();
        let reference = parse_name_or_index_ref(cursor, state, "function reference")?;
        Ok(UnresolvedElemExpr::RefFunc(reference))
    } else {
        expected_error(cursor, state, "element expression");
        Err(ParseAbort::Recover)
    }
}

fn resolve_elem_contents(
    module_state: &mut ModuleState,
    state: &mut ParseState,
    contents: UnresolvedElemContents,
) -> ElemContents {
    match contents {
        UnresolvedElemContents::Expressions(element_type, exprs) => ElemContents::Expressions(
            element_type,
            exprs
                .into_iter()
                .map(|expr| match expr {
                    UnresolvedElemExpr::RefNull(kind) => ElemExpr::RefNull(kind),
                    UnresolvedElemExpr::RefFunc(reference) => ElemExpr::RefFunc(
                        module_state.resolve_extern_ref(state, ExternKind::Function, &reference),
                    ),
                })
                .collect(),
        ),
        UnresolvedElemContents::Indices(kind, references) => ElemContents::Indices(
            kind,
            references
                .into_iter()
                .map(|reference| module_state.resolve_extern_ref(state, kind, &reference))
                .collect(),
        ),
    }
}

/// Parses `(elem $name? declare? (table ref)? <offset>? <contents>)`.
fn parse_elem(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);

    let declared = if cursor.ty() == T_DECLARE {
        cursor.advance();
        true
    } else {
        false
    };

    let mut table_reference = None;
    if !declared && cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_TABLE {
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            table_reference = Some(parse_name_or_index_ref(cursor, state, "table reference")?);
            Ok(())
        })?;
    }
    // An MVP-style bare table index.
    if !declared && table_reference.is_none() && cursor.ty() != T_LEFT_PAREN {
        if let Some(reference) = try_parse_name_or_index_ref(cursor, state) {
            table_reference = Some(reference);
        }
    }

    let mut offset = None;
    if !declared && cursor.ty() == T_LEFT_PAREN {
        if cursor.peek(1).ty == T_OFFSET {
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                offset = Some(parse_initializer_expression(cursor, state)?);
                Ok(())
            })?;
        } else if cursor.peek(1).ty != T_ITEM && !is_elem_list_start(cursor) {
            offset = Some(parse_initializer_expression(cursor, state)?);
        }
    }

    let contents = parse_elem_contents(cursor, state)?;
    let index = module_state.module.elem_segments.len() as u32;
    module_state.module.elem_segments.push(ElemSegment {
        mode: ElemMode::Passive,
        contents: ElemContents::Indices(ExternKind::Function, Vec::new()),
    });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.elem_names, name, index);
    }
    module_state
        .disassembly
        .elem_segments
        .push(name.map(|name| name.text).unwrap_or_default());

    let is_active = offset.is_some() || table_reference.is_some();
    module_state.post_declaration(move |module_state, state| {
        let mode = if declared {
            ElemMode::Declared
        } else if is_active {
            let table_index = match &table_reference {
                Some(reference) => {
                    module_state.resolve_extern_ref(state, ExternKind::Table, reference)
                }
                None => 0,
            };
            let offset = match offset {
                Some(offset) => resolve_initializer(module_state, state, offset),
                None => InitializerExpression::I32Const(0),
            };
            ElemMode::Active {
                table_index,
                offset,
            }
        } else {
            ElemMode::Passive
        };
        let contents = resolve_elem_contents(module_state, state, contents);
        let segment = &mut module_state.module.elem_segments[index as usize];
        segment.mode = mode;
        segment.contents = contents;
    });
    Ok(())
}

fn is_elem_list_start(cursor: &Cursor) -> bool {
    // `(ref.null …)` / `(ref.func …)` / `(item …)` begin element lists, anything else after a
    // '(' in elem position is an offset expression.
    let next = cursor.peek(1).ty;
    next == T_ITEM || next == op_token("ref.null") || next == op_token("ref.func")
}

/// Parses `(data $name? (memory ref)? <offset>? "bytes"*)`.
fn parse_data(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);

    let mut memory_reference = None;
    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_MEMORY {
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            memory_reference = Some(parse_name_or_index_ref(cursor, state, "memory reference")?);
            Ok(())
        })?;
    } else if cursor.ty() != T_LEFT_PAREN {
        if let Some(reference) = try_parse_name_or_index_ref(cursor, state) {
            memory_reference = Some(reference);
        }
    }

    let mut offset = None;
    if cursor.ty() == T_LEFT_PAREN {
        let tagged = try_parse_parenthesized_tagged(cursor, state, T_OFFSET, |cursor, state| {
            offset = Some(parse_initializer_expression(cursor, state)?);
            Ok(())
        })?;
        if !tagged {
            offset = Some(parse_initializer_expression(cursor, state)?);
        }
    }

    let mut data = Vec::new();
    while let Some(bytes) = crate::text::parse::try_parse_string(cursor, state) {
        data.extend_from_slice(&bytes);
    }

    let index = module_state.module.data_segments.len() as u32;
    module_state.module.data_segments.push(DataSegment {
        mode: DataMode::Passive,
        data,
    });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.data_names, name, index);
    }
    module_state
        .disassembly
        .data_segments
        .push(name.map(|name| name.text).unwrap_or_default());

    let is_active = offset.is_some() || memory_reference.is_some();
    module_state.post_declaration(move |module_state, state| {
        if !is_active {
            return;
        }
        let memory_index = match &memory_reference {
            Some(reference) => module_state.resolve_extern_ref(state, ExternKind::Memory, reference),
            None => 0,
        };
        let offset = match offset {
            Some(offset) => resolve_initializer(module_state, state, offset),
            None => InitializerExpression::I32Const(0),
        };
        module_state.module.data_segments[index as usize].mode = DataMode::Active {
            memory_index,
            offset,
        };
    });
    Ok(())
}

/// Parses `(table $name? <inline sugar> <type or inline elem>)`.
fn parse_table(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);
    let import_names = parse_inline_import_export(cursor, state, module_state, ExternKind::Table)?;

    if let Some((module_name, export_name)) = import_names {
        error_if_follows_definitions(cursor, state, module_state);
        return parse_import_body(
            cursor,
            state,
            module_state,
            ExternKind::Table,
            name,
            module_name,
            export_name,
        );
    }

    // Inline element segment form: `(table $t funcref (elem …))`, size taken from the list.
    let index_type = parse_optional_index_type(cursor);
    if let Some(element_type) = {
        let mut lookahead = *cursor;
        try_parse_reference_type(&mut lookahead).filter(|_| lookahead.ty() == T_LEFT_PAREN)
    } {
        let _ = try_parse_reference_type(cursor);
        let index = module_state.module.tables.size();
        let mut contents = None;
        parse_parenthesized(cursor, state, |cursor, state| {
            require(cursor, state, T_ELEM)?;
            contents = Some(parse_elem_contents(cursor, state)?);
            Ok(())
        })?;

        let num_elements = contents.as_ref().map(|contents| match contents {
            UnresolvedElemContents::Expressions(_, exprs) => exprs.len() as u64,
            UnresolvedElemContents::Indices(_, references) => references.len() as u64,
        });
        let size = SizeConstraints::bounded(num_elements.unwrap_or(0), num_elements.unwrap_or(0));
        module_state.module.tables.push_def(TableDef {
            ty: TableType {
                element_type,
                shared: false,
                index_type,
                size,
            },
        });
        if let Some(name) = &name {
            bind_name(state, &mut module_state.table_names, name, index);
        }
        module_state
            .disassembly
            .tables
            .push(name.map(|name| name.text).unwrap_or_default());

        let elem_index = module_state.module.elem_segments.len();
        module_state.module.elem_segments.push(ElemSegment {
            mode: ElemMode::Active {
                table_index: index,
                offset: InitializerExpression::I32Const(0),
            },
            contents: ElemContents::Indices(ExternKind::Function, Vec::new()),
        });
        module_state.disassembly.elem_segments.push(String::new());
        if let Some(contents) = contents {
            module_state.post_declaration(move |module_state, state| {
                let contents = resolve_elem_contents(module_state, state, contents);
                module_state.module.elem_segments[elem_index].contents = contents;
            });
        }
        return Ok(());
    }

    let mut ty = parse_table_type(cursor, state)?;
    ty.index_type = index_type;
    let index = module_state.module.tables.push_def(TableDef { ty });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.table_names, name, index);
    }
    module_state
        .disassembly
        .tables
        .push(name.map(|name| name.text).unwrap_or_default());
    Ok(())
}

/// Parses `(memory $name? <inline sugar> <type or inline data>)`.
fn parse_memory(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);
    let import_names = parse_inline_import_export(cursor, state, module_state, ExternKind::Memory)?;

    if let Some((module_name, export_name)) = import_names {
        error_if_follows_definitions(cursor, state, module_state);
        return parse_import_body(
            cursor,
            state,
            module_state,
            ExternKind::Memory,
            name,
            module_name,
            export_name,
        );
    }

    let index_type = parse_optional_index_type(cursor);

    // Inline data segment form: `(memory $m (data "bytes"))`, size derived from the bytes.
    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_DATA {
        let index = module_state.module.memories.size();
        let mut data = Vec::new();
        parse_parenthesized(cursor, state, |cursor, state| {
            require(cursor, state, T_DATA)?;
            while let Some(bytes) = crate::text::parse::try_parse_string(cursor, state) {
                data.extend_from_slice(&bytes);
            }
            Ok(())
        })?;

        const PAGE_SIZE: u64 = 65536;
        let num_pages = (data.len() as u64 + PAGE_SIZE - 1) / PAGE_SIZE;
        module_state.module.memories.push_def(MemoryDef {
            ty: MemoryType {
                shared: false,
                index_type,
                size: SizeConstraints::bounded(num_pages, num_pages),
            },
        });
        if let Some(name) = &name {
            bind_name(state, &mut module_state.memory_names, name, index);
        }
        module_state
            .disassembly
            .memories
            .push(name.map(|name| name.text).unwrap_or_default());

        module_state.module.data_segments.push(DataSegment {
            mode: DataMode::Active {
                memory_index: index,
                offset: InitializerExpression::I32Const(0),
            },
            data,
        });
        module_state.disassembly.data_segments.push(String::new());
        return Ok(());
    }

    let size = parse_size_constraints(cursor, state, 1 << 16)?;
    let shared = parse_optional_shared(cursor);
    let index = module_state.module.memories.push_def(MemoryDef {
        ty: MemoryType {
            shared,
            index_type,
            size,
        },
    });
    if let Some(name) = &name {
        bind_name(state, &mut module_state.memory_names, name, index);
    }
    module_state
        .disassembly
        .memories
        .push(name.map(|name| name.text).unwrap_or_default());
    Ok(())
}

/// Parses `(func $name? <inline sugar> <type use> <locals> <body>)`. The body tokens are
/// skipped now and parsed by the function-body queue against the complete module.
fn parse_func(cursor: &mut Cursor, state: &mut ParseState, module_state: &mut ModuleState) -> Parse<()> {
    let name = try_parse_name(cursor, state);
    let import_names = parse_inline_import_export(cursor, state, module_state, ExternKind::Function)?;

    if let Some((module_name, export_name)) = import_names {
        error_if_follows_definitions(cursor, state, module_state);
        return parse_import_body(
            cursor,
            state,
            module_state,
            ExternKind::Function,
            name,
            module_name,
            export_name,
        );
    }

    let mut local_names = NameToIndexMap::default();
    let mut local_disassembly = Vec::new();
    let unresolved =
        parse_function_type_ref_and_or_decl(cursor, state, &mut local_names, &mut local_disassembly)?;
    let num_parameters = local_disassembly.len() as u32;

    // Non-parameter locals: `(local $x i32)` or `(local i32 i64 …)`.
    let mut local_types = Vec::new();
    while cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_LOCAL {
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            if let Some(local_name) = try_parse_name(cursor, state) {
                let kind = parse_value_type(cursor, state)?;
                bind_name(
                    state,
                    &mut local_names,
                    &local_name,
                    num_parameters + local_types.len() as u32,
                );
                local_disassembly.push(local_name.text);
                local_types.push(kind);
            } else {
                while let Some(kind) = try_parse_value_type(cursor) {
                    local_disassembly.push(String::new());
                    local_types.push(kind);
                }
            }
            Ok(())
        })?;
        if local_types.len() > state.features.max_locals {
            state.error_at_offset(cursor.offset(), "too many locals");
            return Err(ParseAbort::Recover);
        }
    }

    let index = module_state.module.functions.push_def(FunctionDef {
        type_index: u32::MAX,
        non_parameter_local_types: local_types,
        code: Vec::new(),
        branch_tables: Vec::new(),
    });
    let def_index = (index - module_state.module.functions.import_count()) as usize;
    if let Some(name) = &name {
        bind_name(state, &mut module_state.function_names, name, index);
    }
    module_state.disassembly.functions.push(FunctionNames {
        name: name.map(|name| name.text).unwrap_or_default(),
        locals: local_disassembly,
        labels: Vec::new(),
    });

    module_state.post_type(move |module_state, state| {
        let type_index = resolve_function_type(module_state, state, unresolved);
        if let Some(def) = module_state.module.functions.get_def_mut(index) {
            def.type_index = type_index;
        }
    });

    module_state.pending_function_bodies.push(PendingFunctionBody {
        body_position: cursor.position,
        def_index,
        function_index: index,
        local_names,
    });

    // Leave the body for the third pass.
    let mut depth = 0usize;
    loop {
        match cursor.ty() {
            T_LEFT_PAREN => depth += 1,
            T_RIGHT_PAREN => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            T_EOF => {
                state.error_at_offset(cursor.offset(), "unexpected end of input in function body");
                return Err(ParseAbort::Fatal);
            }
            _ => {}
        }
        cursor.advance();
    }
}

/// Parses the ordered-section keyword in `(after …)`.
fn parse_ordered_section_id(cursor: &mut Cursor, state: &mut ParseState) -> Parse<OrderedSectionId> {
    let id = match cursor.ty() {
        T_MODULE => OrderedSectionId::ModuleBeginning,
        T_TYPE => OrderedSectionId::Type,
        T_IMPORT => OrderedSectionId::Import,
        T_FUNC => OrderedSectionId::Function,
        T_TABLE => OrderedSectionId::Table,
        T_MEMORY => OrderedSectionId::Memory,
        T_GLOBAL => OrderedSectionId::Global,
        T_EXCEPTION_TYPE => OrderedSectionId::ExceptionType,
        T_EXPORT => OrderedSectionId::Export,
        T_START => OrderedSectionId::Start,
        T_ELEM => OrderedSectionId::Elem,
        T_DATA_COUNT => OrderedSectionId::DataCount,
        T_CODE => OrderedSectionId::Code,
        T_DATA => OrderedSectionId::Data,
        _ => {
            expected_error(cursor, state, "section name");
            return Err(ParseAbort::Recover);
        }
    };
    cursor.advance();
    Ok(id)
}

/// Parses `(custom_section "name" (after <section>)? "bytes"*)`, feature-gated.
fn parse_custom_section(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
) -> Parse<()> {
    if !state.features.custom_sections_in_text_format {
        state.error_at_offset(
            cursor.offset(),
            "custom sections in the text format require the wat-custom-sections feature",
        );
    }

    let name_bytes = parse_string(cursor, state)?;
    let name = String::from_utf8(name_bytes).unwrap_or_default();

    let mut after_section = OrderedSectionId::ModuleBeginning;
    if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_AFTER {
        parse_parenthesized(cursor, state, |cursor, state| {
            cursor.advance();
            after_section = parse_ordered_section_id(cursor, state)?;
            Ok(())
        })?;
    }

    let mut data = Vec::new();
    while let Some(bytes) = crate::text::parse::try_parse_string(cursor, state) {
        data.extend_from_slice(&bytes);
    }

    module_state.module.custom_sections.push(CustomSection {
        after_section,
        name,
        data,
    });
    Ok(())
}

/// Parses one module field (the cursor is at its opening parenthesis).
fn parse_declaration(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
) -> Parse<()> {
    let tag = cursor.peek(1).ty;
    parse_parenthesized(cursor, state, |cursor, state| {
        match tag {
            T_TYPE | T_IMPORT | T_EXPORT | T_GLOBAL | T_MEMORY | T_TABLE | T_FUNC | T_DATA
            | T_ELEM | T_START | T_EXCEPTION_TYPE | T_CUSTOM_SECTION => cursor.advance(),
            _ => {
                expected_error(cursor, state, "module field");
                return Err(ParseAbort::Recover);
            }
        }
        match tag {
            T_TYPE => parse_type(cursor, state, module_state),
            T_IMPORT => parse_import(cursor, state, module_state),
            T_EXPORT => parse_export(cursor, state, module_state),
            T_GLOBAL => parse_global(cursor, state, module_state),
            T_MEMORY => parse_memory(cursor, state, module_state),
            T_TABLE => parse_table(cursor, state, module_state),
            T_FUNC => parse_func(cursor, state, module_state),
            T_DATA => parse_data(cursor, state, module_state),
            T_ELEM => parse_elem(cursor, state, module_state),
            T_START => parse_start(cursor, state, module_state),
            T_EXCEPTION_TYPE => parse_exception_type_decl(cursor, state, module_state),
            _ => parse_custom_section(cursor, state, module_state),
        }
    })
}

/// Parses the body of a module (the fields between `(module` and `)`), then drains the three
/// callback queues in order.
pub(crate) fn parse_module_body(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
) -> Parse<()> {
    while cursor.ty() == T_LEFT_PAREN {
        parse_declaration(cursor, state, module_state)?;
    }

    let post_type_callbacks = std::mem::take(&mut module_state.post_type_callbacks);
    for callback in post_type_callbacks {
        callback(module_state, state);
    }

    let post_declaration_callbacks = std::mem::take(&mut module_state.post_declaration_callbacks);
    for callback in post_declaration_callbacks {
        callback(module_state, state);
    }

    let pending_bodies = std::mem::take(&mut module_state.pending_function_bodies);
    for body in pending_bodies {
        function::parse_function_body(cursor.tokens, state, module_state, body);
    }

    // Pad the disassembly names out to the final index-space sizes (the type space can grow
    // while resolving inline signatures).
    module_state
        .disassembly
        .types
        .resize(module_state.module.types.len(), String::new());

    Ok(())
}

/// Parses `(module <fields>)` into a module together with its accumulated diagnostics.
///
/// Success is an empty error list; on errors the partially-built module is still returned.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{parse_module, FeatureSpec};
///
/// let (module, errors) = parse_module("(module)", FeatureSpec::default());
///
/// assert!(errors.is_empty());
/// assert_eq!(module.functions.size(), 0);
/// ```
pub fn parse_module(text: &str, features: FeatureSpec) -> (Module, Vec<Error>) {
    let (tokens, line_info) = lex(text, features.allow_legacy_instruction_names);
    let mut state = ParseState::new(text, &line_info, features.clone());
    let mut cursor = Cursor::new(&tokens);
    let mut module_state = ModuleState::new(features);

    let result = parse_parenthesized(&mut cursor, &mut state, |cursor, state| {
        require(cursor, state, T_MODULE)?;
        parse_module_body(cursor, state, &mut module_state)
    });

    if result.is_ok() && cursor.ty() != T_EOF {
        state.error_at_offset(cursor.offset(), "unexpected tokens after the module");
    }

    let ModuleState {
        mut module,
        disassembly,
        ..
    } = module_state;
    crate::model::set_disassembly_names(&mut module, &disassembly);

    let mut errors = state.errors;
    errors.sort_by_key(|error| {
        (
            error.locus.newlines,
            error.locus.tabs + error.locus.characters,
        )
    });
    (module, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Module {
        let (module, errors) = parse_module(text, FeatureSpec::default());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        module
    }

    #[test]
    fn minimal_module() {
        let module = parse_ok("(module)");

        assert!(module.types.is_empty());
        assert_eq!(module.functions.size(), 0);
        assert_eq!(module.tables.size(), 0);
        assert_eq!(module.memories.size(), 0);
        assert_eq!(module.globals.size(), 0);
        assert!(module.exports.is_empty());
        assert_eq!(module.start_function_index, None);
    }

    #[test]
    fn explicit_types_are_bound_and_deduplicated() {
        let module = parse_ok(
            "(module (type $t (func (param i32) (result i32))) (func (type $t) local.get 0))",
        );

        assert_eq!(module.types.len(), 1);
        assert_eq!(*module.functions.get_type(0).unwrap(), 0);
    }

    #[test]
    fn inline_signatures_share_indices() {
        let module = parse_ok(
            "(module (func (param i32)) (func (param i32)) (func (param f64)))",
        );

        assert_eq!(module.types.len(), 2);
    }

    #[test]
    fn imports_and_exports() {
        let module = parse_ok(
            r#"(module
                (import "env" "mem" (memory 1))
                (import "env" "tick" (func $tick))
                (func $run (export "run") call $tick)
                (export "mem2" (memory 0)))"#,
        );

        assert_eq!(module.memories.import_count(), 1);
        assert_eq!(module.functions.import_count(), 1);
        assert_eq!(module.exports.len(), 2);
        assert_eq!(module.exports[0].name, "run");
        assert_eq!(module.exports[0].index, 1);
        assert_eq!(module.exports[1].name, "mem2");
        assert_eq!(module.exports[1].index, 0);
    }

    #[test]
    fn import_after_definition_is_an_error() {
        let (_, errors) = parse_module(
            r#"(module (func) (import "a" "b" (func)))"#,
            FeatureSpec::default(),
        );
        assert!(errors
            .iter()
            .any(|error| error.message.contains("must precede")));
    }

    #[test]
    fn globals_with_initializers() {
        let module = parse_ok(
            r#"(module
                (global $zero i32 (i32.const 0))
                (global $pi (mut f64) (f64.const 3.14159))
                (global $alias i32 (global.get $zero)))"#,
        );

        let defs = module.globals.defs();
        assert_eq!(defs[0].initializer, InitializerExpression::I32Const(0));
        assert!(matches!(defs[1].initializer, InitializerExpression::F64Const(_)));
        assert_eq!(defs[2].initializer, InitializerExpression::GlobalGet(0));
        assert!(defs[1].ty.is_mutable());
    }

    #[test]
    fn active_and_passive_segments() {
        let module = parse_ok(
            r#"(module
                (memory 1)
                (table 2 funcref)
                (func $f)
                (data (i32.const 8) "abc")
                (data "passive")
                (elem (table 0) (i32.const 0) func $f)
                (elem funcref (ref.func $f) (ref.null func))
                (elem declare func $f))"#,
        );

        assert!(matches!(
            module.data_segments[0].mode,
            DataMode::Active { memory_index: 0, .. }
        ));
        assert_eq!(module.data_segments[0].data, b"abc");
        assert!(matches!(module.data_segments[1].mode, DataMode::Passive));

        assert!(matches!(module.elem_segments[0].mode, ElemMode::Active { .. }));
        assert!(matches!(module.elem_segments[1].mode, ElemMode::Passive));
        assert!(matches!(module.elem_segments[2].mode, ElemMode::Declared));
        match &module.elem_segments[1].contents {
            ElemContents::Expressions(ReferenceType::FuncRef, exprs) => {
                assert_eq!(exprs[0], ElemExpr::RefFunc(0));
                assert_eq!(exprs[1], ElemExpr::RefNull(ReferenceType::FuncRef));
            }
            other => panic!("unexpected contents {other:?}"),
        }
    }

    #[test]
    fn inline_table_elements_size_the_table() {
        let module = parse_ok("(module (func $f) (table funcref (elem $f $f $f)))");

        let table = module.tables.defs()[0];
        assert_eq!(table.ty.size, SizeConstraints::bounded(3, 3));
        assert_eq!(module.elem_segments.len(), 1);
        assert_eq!(module.elem_segments[0].contents.len(), 3);
    }

    #[test]
    fn inline_memory_data_sizes_the_memory() {
        let module = parse_ok(r#"(module (memory (data "xyz")))"#);

        let memory = module.memories.defs()[0];
        assert_eq!(memory.ty.size, SizeConstraints::bounded(1, 1));
        assert_eq!(module.data_segments[0].data, b"xyz");
    }

    #[test]
    fn start_function_forward_reference() {
        let module = parse_ok("(module (start $main) (func $main))");

        assert_eq!(module.start_function_index, Some(0));
    }

    #[test]
    fn duplicate_start_is_reported() {
        let (_, errors) = parse_module(
            "(module (func $f) (start $f) (start $f))",
            FeatureSpec::default(),
        );
        assert!(errors.iter().any(|e| e.message.contains("start")));
    }

    #[test]
    fn unknown_module_field_recovers() {
        let (module, errors) = parse_module("(module (widget 1 2 3) (func))", FeatureSpec::default());

        assert_eq!(errors.len(), 1);
        assert_eq!(module.functions.size(), 1);
    }

    #[test]
    fn custom_sections_in_text() {
        let mut features = FeatureSpec::default();
        features.custom_sections_in_text_format = true;
        let (module, errors) = parse_module(
            r#"(module (custom_section "notes" (after type) "\01\02"))"#,
            features,
        );

        assert!(errors.is_empty());
        let section = module.custom_section("notes").unwrap();
        assert_eq!(section.after_section, OrderedSectionId::Type);
        assert_eq!(section.data, vec![1, 2]);
    }

    #[test]
    fn shared_memory_type() {
        let module = parse_ok("(module (memory 1 2 shared))");

        let ty = module.memories.defs()[0].ty;
        assert!(ty.shared);
        assert_eq!(ty.size, SizeConstraints::bounded(1, 2));
    }

    #[test]
    fn exception_type_declarations() {
        let module = parse_ok("(module (exception_type $e (param i32 i64)))");

        assert_eq!(module.exception_types.size(), 1);
        let ty = &module.exception_types.defs()[0].ty;
        assert_eq!(ty.parameters.kinds(), &[ValueType::I32, ValueType::I64]);
    }
}
