//! WebAssembly model of modules and their segments.
//!
//! The module is a single value with no hidden aliasing: every cross-reference is a small
//! unsigned index into one of the typed index spaces, so the whole structure is trivially
//! clonable and comparable.

use crate::features::FeatureSpec;
use crate::model::indices::*;
use crate::model::types::*;

/// Describes an object imported into a module, carrying the names used to resolve it and its
/// declared type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Import<Ty> {
    pub module_name: String,
    pub export_name: String,
    pub ty: Ty,
}

/// Accesses the type carried by a definition, so an [`IndexSpace`] can answer type queries for
/// both of its segments.
pub trait TypeOf<Ty> {
    fn type_of(&self) -> &Ty;
}

/// An index space for imports and definitions of a specific kind.
///
/// The space is a two-segment array: an imports prefix followed by a defs suffix. Index 0
/// addresses the first import; imports always precede defs.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{Import, IndexSpace, TableDef, TableType};
/// # use wasm_syntax::{IndexType, ReferenceType, SizeConstraints};
///
/// # let table_type = TableType {
/// #     element_type: ReferenceType::FuncRef,
/// #     shared: false,
/// #     index_type: IndexType::I32,
/// #     size: SizeConstraints::at_least(0),
/// # };
/// let mut tables: IndexSpace<TableDef, TableType> = IndexSpace::default();
/// tables.push_import(Import {
///     module_name: "env".to_string(),
///     export_name: "indirect".to_string(),
///     ty: table_type,
/// });
/// tables.push_def(TableDef { ty: table_type });
///
/// assert_eq!(tables.size(), 2);
/// assert_eq!(tables.get_type(0), Some(&table_type));
/// assert_eq!(tables.get_type(1), Some(&table_type));
/// assert_eq!(tables.get_type(2), None);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexSpace<Def, Ty> {
    imports: Vec<Import<Ty>>,
    defs: Vec<Def>,
}

impl<Def, Ty> Default for IndexSpace<Def, Ty> {
    fn default() -> Self {
        IndexSpace {
            imports: Vec::new(),
            defs: Vec::new(),
        }
    }
}

impl<Def, Ty> IndexSpace<Def, Ty> {
    /// The total number of elements: imports plus defs.
    pub fn size(&self) -> u32 {
        (self.imports.len() + self.defs.len()) as u32
    }

    /// The imports prefix of this space.
    pub fn imports(&self) -> &[Import<Ty>] {
        &self.imports
    }

    /// Mutable access to the imports prefix, used to patch forward-referenced import types
    /// once the type space is final.
    pub fn imports_mut(&mut self) -> &mut [Import<Ty>] {
        &mut self.imports
    }

    /// The defs suffix of this space.
    pub fn defs(&self) -> &[Def] {
        &self.defs
    }

    /// Mutable access to the defs suffix.
    pub fn defs_mut(&mut self) -> &mut [Def] {
        &mut self.defs
    }

    /// The number of imports preceding the defs.
    pub fn import_count(&self) -> u32 {
        self.imports.len() as u32
    }

    /// Appends an import. Every import must be added before the first def so that imports
    /// precede defs in the index space.
    pub fn push_import(&mut self, import: Import<Ty>) -> u32 {
        let index = self.size();
        self.imports.push(import);
        index
    }

    /// Appends a definition and returns its index in the whole space.
    pub fn push_def(&mut self, def: Def) -> u32 {
        let index = self.size();
        self.defs.push(def);
        index
    }

    /// Whether any definitions (not imports) have been added yet.
    pub fn has_defs(&self) -> bool {
        !self.defs.is_empty()
    }

    /// The definition at the given whole-space index, or `None` if the index addresses an
    /// import or is out of bounds.
    pub fn get_def(&self, index: u32) -> Option<&Def> {
        (index as usize)
            .checked_sub(self.imports.len())
            .and_then(|def_index| self.defs.get(def_index))
    }

    /// Mutable access to the definition at the given whole-space index.
    pub fn get_def_mut(&mut self, index: u32) -> Option<&mut Def> {
        (index as usize)
            .checked_sub(self.imports.len())
            .and_then(|def_index| self.defs.get_mut(def_index))
    }
}

impl<Def: TypeOf<Ty>, Ty> IndexSpace<Def, Ty> {
    /// The type of the element at the given index, from either segment.
    pub fn get_type(&self, index: u32) -> Option<&Ty> {
        let index = index as usize;
        if index < self.imports.len() {
            Some(&self.imports[index].ty)
        } else {
            self.defs
                .get(index - self.imports.len())
                .map(TypeOf::type_of)
        }
    }
}

/// A function definition: its signature (as an index into the type space), the types of its
/// non-parameter locals, its validated operator stream in the internal encoding, and the
/// out-of-line branch tables referenced by `br_table` operators in the stream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionDef {
    pub type_index: TypeIndex,
    pub non_parameter_local_types: Vec<ValueType>,
    pub code: Vec<u8>,
    pub branch_tables: Vec<Vec<u32>>,
}

impl TypeOf<TypeIndex> for FunctionDef {
    fn type_of(&self) -> &TypeIndex {
        &self.type_index
    }
}

/// A table definition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableDef {
    pub ty: TableType,
}

impl TypeOf<TableType> for TableDef {
    fn type_of(&self) -> &TableType {
        &self.ty
    }
}

/// A memory definition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryDef {
    pub ty: MemoryType,
}

impl TypeOf<MemoryType> for MemoryDef {
    fn type_of(&self) -> &MemoryType {
        &self.ty
    }
}

/// A global definition: its type and the expression computing its initial value.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalDef {
    pub ty: GlobalType,
    pub initializer: InitializerExpression,
}

impl TypeOf<GlobalType> for GlobalDef {
    fn type_of(&self) -> &GlobalType {
        &self.ty
    }
}

/// An exception type definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExceptionTypeDef {
    pub ty: ExceptionType,
}

impl TypeOf<ExceptionType> for ExceptionTypeDef {
    fn type_of(&self) -> &ExceptionType {
        &self.ty
    }
}

/// An initializer expression: the restricted expression grammar allowed for global
/// initializers and active segment base offsets. Only these forms are legal.
///
/// Float constants are stored as bit patterns so that NaN payloads compare exactly.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitializerExpression {
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    V128Const([u8; 16]),
    GlobalGet(GlobalIndex),
    RefNull(ReferenceType),
    RefFunc(FunctionIndex),
}

/// A data segment: a literal sequence of bytes copied into a memory when the module is
/// instantiated (active) or by `memory.init` (passive).
#[derive(Clone, Debug, PartialEq)]
pub struct DataSegment {
    pub mode: DataMode,
    pub data: Vec<u8>,
}

/// The mode of a data segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DataMode {
    Active {
        memory_index: MemoryIndex,
        offset: InitializerExpression,
    },
    Passive,
}

/// An element expression: a literal reference used to initialize a table element.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemExpr {
    RefNull(ReferenceType),
    RefFunc(FunctionIndex),
}

/// The mode of an element segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ElemMode {
    Active {
        table_index: TableIndex,
        offset: InitializerExpression,
    },
    Passive,
    Declared,
}

/// The contents of an element segment: either reference expressions of a known element type,
/// or raw indices into a named extern kind's index space.
#[derive(Clone, Debug, PartialEq)]
pub enum ElemContents {
    Expressions(ReferenceType, Vec<ElemExpr>),
    Indices(ExternKind, Vec<u32>),
}

impl ElemContents {
    /// The number of elements in the segment.
    pub fn len(&self) -> usize {
        match self {
            ElemContents::Expressions(_, exprs) => exprs.len(),
            ElemContents::Indices(_, indices) => indices.len(),
        }
    }

    /// Whether the segment is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An element segment: a literal sequence of table elements.
#[derive(Clone, Debug, PartialEq)]
pub struct ElemSegment {
    pub mode: ElemMode,
    pub contents: ElemContents,
}

/// Describes an export from a module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// Identifies sections in the binary format of a module in the order they are required to
/// occur, plus the position before any standard section. Custom sections record the standard
/// section they follow as an `OrderedSectionId`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum OrderedSectionId {
    ModuleBeginning,
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    ExceptionType,
    Export,
    Start,
    Elem,
    DataCount,
    Code,
    Data,
}

impl OrderedSectionId {
    /// The keyword naming this section in the text format's `(custom_section … (after …))`
    /// syntax.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OrderedSectionId::ModuleBeginning => "module",
            OrderedSectionId::Type => "type",
            OrderedSectionId::Import => "import",
            OrderedSectionId::Function => "func",
            OrderedSectionId::Table => "table",
            OrderedSectionId::Memory => "memory",
            OrderedSectionId::Global => "global",
            OrderedSectionId::ExceptionType => "exception_type",
            OrderedSectionId::Export => "export",
            OrderedSectionId::Start => "start",
            OrderedSectionId::Elem => "elem",
            OrderedSectionId::DataCount => "data_count",
            OrderedSectionId::Code => "code",
            OrderedSectionId::Data => "data",
        }
    }
}

/// A custom (user) module section: an uninterpreted array of bytes with a name, positioned in
/// binary output immediately after the standard section named by `after_section`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomSection {
    pub after_section: OrderedSectionId,
    pub name: String,
    pub data: Vec<u8>,
}

/// The root of the IR: a WebAssembly module.
///
/// Built by the text parser or the binary decoder, and read by the validator, the binary
/// encoder, and the text printer.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{FeatureSpec, Module};
///
/// let module = Module::new(FeatureSpec::default());
///
/// assert_eq!(module.types.len(), 0);
/// assert_eq!(module.functions.size(), 0);
/// assert_eq!(module.start_function_index, None);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub feature_spec: FeatureSpec,

    pub types: Vec<FunctionType>,

    pub functions: IndexSpace<FunctionDef, TypeIndex>,
    pub tables: IndexSpace<TableDef, TableType>,
    pub memories: IndexSpace<MemoryDef, MemoryType>,
    pub globals: IndexSpace<GlobalDef, GlobalType>,
    pub exception_types: IndexSpace<ExceptionTypeDef, ExceptionType>,

    pub exports: Vec<Export>,
    pub data_segments: Vec<DataSegment>,
    pub elem_segments: Vec<ElemSegment>,
    pub custom_sections: Vec<CustomSection>,

    pub start_function_index: Option<FunctionIndex>,
}

impl Module {
    /// Creates an empty module accepting the given feature spec.
    pub fn new(feature_spec: FeatureSpec) -> Self {
        Module {
            feature_spec,
            types: Vec::new(),
            functions: IndexSpace::default(),
            tables: IndexSpace::default(),
            memories: IndexSpace::default(),
            globals: IndexSpace::default(),
            exception_types: IndexSpace::default(),
            exports: Vec::new(),
            data_segments: Vec::new(),
            elem_segments: Vec::new(),
            custom_sections: Vec::new(),
            start_function_index: None,
        }
    }

    /// The signature of the function at the given index in the function index space, resolved
    /// through the type space.
    pub fn function_type(&self, index: FunctionIndex) -> Option<&FunctionType> {
        let type_index = *self.functions.get_type(index)?;
        self.types.get(type_index as usize)
    }

    /// The size of the index space addressed by the given extern kind.
    pub fn index_space_size(&self, kind: ExternKind) -> u32 {
        match kind {
            ExternKind::Function => self.functions.size(),
            ExternKind::Table => self.tables.size(),
            ExternKind::Memory => self.memories.size(),
            ExternKind::Global => self.globals.size(),
            ExternKind::ExceptionType => self.exception_types.size(),
        }
    }

    /// Looks up the custom section with the given name, if present.
    pub fn custom_section(&self, name: &str) -> Option<&CustomSection> {
        self.custom_sections
            .iter()
            .find(|section| section.name == name)
    }

    /// Removes every custom section with the given name, returning whether any was present.
    pub fn remove_custom_sections(&mut self, name: &str) -> bool {
        let before = self.custom_sections.len();
        self.custom_sections.retain(|section| section.name != name);
        self.custom_sections.len() != before
    }

    /// Structural equality that disregards "name" custom sections, used by round-trip checks
    /// where disassembly names are allowed to differ.
    pub fn equals_ignoring_names(&self, other: &Module) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.remove_custom_sections("name");
        b.remove_custom_sections("name");
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_space_with_one_import() -> IndexSpace<FunctionDef, TypeIndex> {
        let mut functions = IndexSpace::default();
        functions.push_import(Import {
            module_name: "env".to_string(),
            export_name: "callback".to_string(),
            ty: 7,
        });
        functions
    }

    #[test]
    fn imports_precede_defs() {
        let mut functions = function_space_with_one_import();
        let def_index = functions.push_def(FunctionDef {
            type_index: 3,
            ..FunctionDef::default()
        });

        assert_eq!(def_index, 1);
        assert_eq!(functions.get_type(0), Some(&7));
        assert_eq!(functions.get_type(1), Some(&3));
        assert_eq!(functions.import_count(), 1);
    }

    #[test]
    fn get_def_skips_imports() {
        let mut functions = function_space_with_one_import();
        functions.push_def(FunctionDef::default());

        assert!(functions.get_def(0).is_none());
        assert!(functions.get_def(1).is_some());
        assert!(functions.get_def(2).is_none());
    }

    #[test]
    fn equality_ignoring_name_sections() {
        let mut a = Module::new(FeatureSpec::default());
        let b = Module::new(FeatureSpec::default());

        a.custom_sections.push(CustomSection {
            after_section: OrderedSectionId::Data,
            name: "name".to_string(),
            data: vec![1, 2, 3],
        });

        assert_ne!(a, b);
        assert!(a.equals_ignoring_names(&b));
    }

    #[test]
    fn ordered_section_ids_are_ordered() {
        assert!(OrderedSectionId::ModuleBeginning < OrderedSectionId::Type);
        assert!(OrderedSectionId::Type < OrderedSectionId::Import);
        assert!(OrderedSectionId::DataCount < OrderedSectionId::Code);
        assert!(OrderedSectionId::Code < OrderedSectionId::Data);
    }
}
