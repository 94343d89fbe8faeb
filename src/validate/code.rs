//! The streaming code validator: a visitor over an operator sequence that maintains a type
//! stack and a control stack, accepting exactly the operator set of the shared table.

use crate::features::Feature;
use crate::model::{
    BlockType, ExternKind, FunctionType, IndexType, Module, ReferenceType, ValueType,
};
use crate::operators::{
    natural_alignment_log2, ImmKind, Immediate, Operator, OperatorSink, Signature,
};
use crate::validate::ValidationError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
    Try,
    Catch,
    CatchAll,
}

struct ControlFrame {
    kind: FrameKind,
    params: Vec<ValueType>,
    results: Vec<ValueType>,
    /// The operand stack height at frame entry, not counting the frame's own params.
    height: usize,
    unreachable: bool,
}

/// Validates one function body (or constant expression) operator by operator.
///
/// On a mismatch the validator fails with a descriptive message; the caller may then feed an
/// `unreachable` operator to put the current frame into the polymorphic state so subsequent
/// operators still check.
pub struct CodeValidator<'module> {
    module: &'module Module,
    locals: &'module [ValueType],
    results: Vec<ValueType>,
    stack: Vec<ValueType>,
    control: Vec<ControlFrame>,
    declared_data_count: Option<u32>,
}

impl<'module> CodeValidator<'module> {
    pub fn new(
        module: &'module Module,
        function_type: &FunctionType,
        locals: &'module [ValueType],
    ) -> Self {
        let results = function_type.results().kinds().to_vec();
        CodeValidator {
            module,
            locals,
            results: results.clone(),
            stack: Vec::new(),
            control: vec![ControlFrame {
                kind: FrameKind::Function,
                params: Vec::new(),
                results,
                height: 0,
                unreachable: false,
            }],
            declared_data_count: None,
        }
    }

    /// Overrides the data segment count used for bounds checks, for the binary decoder whose
    /// code section precedes the data section (the declared count comes from the DataCount
    /// section).
    pub fn with_declared_data_count(mut self, count: Option<u32>) -> Self {
        self.declared_data_count = count;
        self
    }

    /// Whether every control frame, including the function frame, has been ended.
    pub fn is_finished(&self) -> bool {
        self.control.is_empty()
    }

    fn error(message: impl Into<String>) -> ValidationError {
        ValidationError::Invalid(message.into())
    }

    fn frame(&self) -> Result<&ControlFrame, ValidationError> {
        self.control
            .last()
            .ok_or_else(|| Self::error("operator after the end of the function body"))
    }

    fn push_operand(&mut self, kind: ValueType) {
        self.stack.push(kind);
    }

    /// Pops one operand, returning `None` when the frame is polymorphic and the stack slice
    /// is exhausted.
    fn pop_operand(&mut self) -> Result<Option<ValueType>, ValidationError> {
        let frame = self.frame()?;
        if self.stack.len() == frame.height {
            if frame.unreachable {
                return Ok(None);
            }
            return Err(Self::error(
                "type mismatch: expected an operand but the stack is empty",
            ));
        }
        Ok(self.stack.pop())
    }

    fn pop_expected(&mut self, expected: ValueType) -> Result<(), ValidationError> {
        match self.pop_operand()? {
            None => Ok(()),
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(Self::error(format!(
                "type mismatch: expected {expected}, found {found}"
            ))),
        }
    }

    /// Pops the signature's parameters right-to-left.
    fn pop_params(&mut self, params: &[ValueType]) -> Result<(), ValidationError> {
        for &param in params.iter().rev() {
            self.pop_expected(param)?;
        }
        Ok(())
    }

    fn push_results(&mut self, results: &[ValueType]) {
        for &result in results {
            self.push_operand(result);
        }
    }

    fn set_unreachable(&mut self) -> Result<(), ValidationError> {
        let height = self.frame()?.height;
        self.stack.truncate(height);
        self.control
            .last_mut()
            .expect("frame() checked the control stack")
            .unreachable = true;
        Ok(())
    }

    fn block_arity(&self, block_type: BlockType) -> Result<(Vec<ValueType>, Vec<ValueType>), ValidationError> {
        match block_type {
            BlockType::NoResult => Ok((Vec::new(), Vec::new())),
            BlockType::Value(kind) => Ok((Vec::new(), vec![kind])),
            BlockType::Indexed(type_index) => {
                let ty = self
                    .module
                    .types
                    .get(type_index as usize)
                    .ok_or_else(|| Self::error(format!("invalid type index {type_index}")))?;
                if (!ty.parameters().is_empty() || ty.results().len() > 1)
                    && !self
                        .module
                        .feature_spec
                        .supports(Feature::MultipleResultsAndBlockParams)
                {
                    return Err(Self::error(
                        "block parameters and multiple results require the multivalue feature",
                    ));
                }
                Ok((
                    ty.parameters().kinds().to_vec(),
                    ty.results().kinds().to_vec(),
                ))
            }
        }
    }

    fn push_frame(
        &mut self,
        kind: FrameKind,
        params: Vec<ValueType>,
        results: Vec<ValueType>,
    ) -> Result<(), ValidationError> {
        self.pop_params(&params)?;
        let height = self.stack.len();
        self.push_results(&params);
        self.control.push(ControlFrame {
            kind,
            params,
            results,
            height,
            unreachable: false,
        });
        Ok(())
    }

    /// The types a branch to the frame at `depth` must provide: a loop's params, any other
    /// frame's results.
    fn branch_types(&self, depth: u32) -> Result<Vec<ValueType>, ValidationError> {
        let depth = depth as usize;
        if depth >= self.control.len() {
            return Err(Self::error(format!(
                "branch depth {depth} exceeds the control stack"
            )));
        }
        let frame = &self.control[self.control.len() - 1 - depth];
        Ok(if frame.kind == FrameKind::Loop {
            frame.params.clone()
        } else {
            frame.results.clone()
        })
    }

    /// Pops a label's types and pushes them back, for conditional branches.
    fn check_branch_operands(&mut self, types: &[ValueType]) -> Result<(), ValidationError> {
        self.pop_params(types)?;
        self.push_results(types);
        Ok(())
    }

    /// Ends the current frame: its results must be exactly on the stack, and are pushed onto
    /// the enclosing frame.
    fn end_frame(&mut self) -> Result<(), ValidationError> {
        let frame = self.frame()?;
        let kind = frame.kind;
        let height = frame.height;
        let params = frame.params.clone();
        let results = frame.results.clone();

        if kind == FrameKind::If && params != results {
            return Err(Self::error(
                "type mismatch: an if without an else must have matching parameter and result types",
            ));
        }

        self.pop_params(&results)?;
        let frame = self.frame()?;
        if self.stack.len() != frame.height && !frame.unreachable {
            return Err(Self::error(
                "type mismatch: values remain on the stack at the end of a block",
            ));
        }
        self.stack.truncate(height);
        self.control.pop();
        self.push_results(&results);
        Ok(())
    }

    fn memory_index_type(&self, memory_index: u32) -> Result<IndexType, ValidationError> {
        self.module
            .memories
            .get_type(memory_index)
            .map(|ty| ty.index_type)
            .ok_or_else(|| Self::error(format!("invalid memory index {memory_index}")))
    }

    fn address_type(&self, index_type: IndexType) -> ValueType {
        match index_type {
            IndexType::I32 => ValueType::I32,
            IndexType::I64 => ValueType::I64,
        }
    }

    fn check_space_index(&self, kind: ExternKind, index: u32) -> Result<(), ValidationError> {
        if index >= self.module.index_space_size(kind) {
            return Err(Self::error(format!(
                "invalid {} index {index}",
                kind.mnemonic()
            )));
        }
        Ok(())
    }

    fn data_segment_count(&self) -> u32 {
        self.declared_data_count
            .unwrap_or(self.module.data_segments.len() as u32)
    }

    fn check_alignment(
        &self,
        mnemonic: &str,
        alignment_log2: u8,
        exact: bool,
    ) -> Result<(), ValidationError> {
        let natural = natural_alignment_log2(mnemonic);
        if exact && alignment_log2 != natural {
            return Err(Self::error(format!(
                "atomic operator alignment must be {}",
                1u32 << natural
            )));
        }
        if alignment_log2 > natural {
            return Err(Self::error(format!(
                "alignment must not be larger than {}",
                1u32 << natural
            )));
        }
        Ok(())
    }

    /// Validates one operator.
    pub fn visit(&mut self, op: &Operator) -> Result<(), ValidationError> {
        let info = op.info();

        if !self.module.feature_spec.supports(info.feature) {
            return Err(Self::error(format!(
                "'{}' requires a feature that is not enabled",
                info.mnemonic
            )));
        }
        if self.control.is_empty() {
            return Err(Self::error("operator after the end of the function body"));
        }

        self.check_immediate_bounds(info.imm, &op.imm, info.mnemonic)?;

        match info.sig {
            Signature::Fixed { params, results } => {
                // Memory-addressing operators substitute the addressed memory's index type
                // for the leading i32 address operand.
                if let Immediate::LoadStore { memory_index, .. }
                | Immediate::LoadStoreLane { memory_index, .. } = &op.imm
                {
                    let address = self.address_type(self.memory_index_type(*memory_index)?);
                    let mut params = params.to_vec();
                    if let Some(first) = params.first_mut() {
                        *first = address;
                    }
                    self.pop_params(&params)?;
                } else {
                    self.pop_params(params)?;
                }
                self.push_results(results);
                Ok(())
            }
            Signature::Special => self.visit_special(op),
        }
    }

    /// Bounds checks on index-space immediates, shared by every operator class.
    fn check_immediate_bounds(
        &self,
        kind: ImmKind,
        imm: &Immediate,
        mnemonic: &str,
    ) -> Result<(), ValidationError> {
        match imm {
            Immediate::Call(index) | Immediate::FunctionRef(index) => {
                self.check_space_index(ExternKind::Function, *index)
            }
            Immediate::Global(index) => self.check_space_index(ExternKind::Global, *index),
            Immediate::Table(index) => self.check_space_index(ExternKind::Table, *index),
            Immediate::TableCopy {
                dest_table_index,
                source_table_index,
            } => {
                self.check_space_index(ExternKind::Table, *dest_table_index)?;
                self.check_space_index(ExternKind::Table, *source_table_index)
            }
            Immediate::Memory(index) => self.check_space_index(ExternKind::Memory, *index),
            Immediate::MemoryCopy {
                dest_memory_index,
                source_memory_index,
            } => {
                self.check_space_index(ExternKind::Memory, *dest_memory_index)?;
                self.check_space_index(ExternKind::Memory, *source_memory_index)
            }
            Immediate::ExceptionType(index) => {
                self.check_space_index(ExternKind::ExceptionType, *index)
            }
            Immediate::DataSegment(index)
            | Immediate::DataSegmentAndMemory {
                data_index: index, ..
            } => {
                if let Immediate::DataSegmentAndMemory { memory_index, .. } = imm {
                    self.check_space_index(ExternKind::Memory, *memory_index)?;
                }
                if *index >= self.data_segment_count() {
                    return Err(Self::error(format!("invalid data segment index {index}")));
                }
                Ok(())
            }
            Immediate::ElemSegment(index)
            | Immediate::ElemSegmentAndTable {
                elem_index: index, ..
            } => {
                if let Immediate::ElemSegmentAndTable { table_index, .. } = imm {
                    self.check_space_index(ExternKind::Table, *table_index)?;
                }
                if *index as usize >= self.module.elem_segments.len() {
                    return Err(Self::error(format!("invalid elem segment index {index}")));
                }
                Ok(())
            }
            Immediate::CallIndirect {
                type_index,
                table_index,
            } => {
                if *type_index as usize >= self.module.types.len() {
                    return Err(Self::error(format!("invalid type index {type_index}")));
                }
                self.check_space_index(ExternKind::Table, *table_index)
            }
            Immediate::Local(index) => {
                if *index as usize >= self.locals.len() {
                    return Err(Self::error(format!("invalid local index {index}")));
                }
                Ok(())
            }
            Immediate::LoadStore {
                alignment_log2,
                memory_index,
                ..
            } => {
                self.check_space_index(ExternKind::Memory, *memory_index)?;
                let exact = kind == ImmKind::AtomicLoadStore;
                if exact
                    && self.module.feature_spec.require_shared_flag_for_atomic_operators
                    && !self
                        .module
                        .memories
                        .get_type(*memory_index)
                        .map(|ty| ty.shared)
                        .unwrap_or(false)
                {
                    return Err(Self::error(
                        "atomic operators require a shared memory",
                    ));
                }
                self.check_alignment(mnemonic, *alignment_log2, exact)
            }
            Immediate::LoadStoreLane {
                alignment_log2,
                memory_index,
                lane,
                offset: _,
            } => {
                self.check_space_index(ExternKind::Memory, *memory_index)?;
                self.check_alignment(mnemonic, *alignment_log2, false)?;
                let lanes = kind.lane_count().unwrap_or(16);
                if *lane >= lanes {
                    return Err(Self::error(format!("lane index must be less than {lanes}")));
                }
                Ok(())
            }
            Immediate::Lane(lane) => {
                let lanes = kind.lane_count().unwrap_or(16);
                if *lane >= lanes {
                    return Err(Self::error(format!("lane index must be less than {lanes}")));
                }
                Ok(())
            }
            Immediate::Shuffle(lanes) => {
                if lanes.iter().any(|&lane| lane >= 32) {
                    return Err(Self::error("shuffle lane indices must be less than 32"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn visit_special(&mut self, op: &Operator) -> Result<(), ValidationError> {
        match (op.info().mnemonic, &op.imm) {
            ("unreachable", _) => self.set_unreachable(),
            ("block", Immediate::Block(block_type)) => {
                let (params, results) = self.block_arity(*block_type)?;
                self.push_frame(FrameKind::Block, params, results)
            }
            ("loop", Immediate::Block(block_type)) => {
                let (params, results) = self.block_arity(*block_type)?;
                self.push_frame(FrameKind::Loop, params, results)
            }
            ("if", Immediate::Block(block_type)) => {
                let (params, results) = self.block_arity(*block_type)?;
                self.pop_expected(ValueType::I32)?;
                self.push_frame(FrameKind::If, params, results)
            }
            ("try", Immediate::Block(block_type)) => {
                let (params, results) = self.block_arity(*block_type)?;
                self.push_frame(FrameKind::Try, params, results)
            }
            ("else", _) => {
                let frame = self.frame()?;
                if frame.kind != FrameKind::If {
                    return Err(Self::error("'else' without a matching 'if'"));
                }
                let height = frame.height;
                let params = frame.params.clone();
                let results = frame.results.clone();
                self.pop_params(&results)?;
                let frame = self.frame()?;
                if self.stack.len() != frame.height && !frame.unreachable {
                    return Err(Self::error(
                        "type mismatch: values remain on the stack at 'else'",
                    ));
                }
                self.stack.truncate(height);
                let frame = self.control.last_mut().expect("frame() checked");
                frame.kind = FrameKind::Else;
                frame.unreachable = false;
                self.push_results(&params);
                Ok(())
            }
            ("catch", Immediate::ExceptionType(index)) => {
                let frame = self.frame()?;
                if !matches!(frame.kind, FrameKind::Try | FrameKind::Catch) {
                    return Err(Self::error("'catch' without a matching 'try'"));
                }
                let height = frame.height;
                let results = frame.results.clone();
                self.pop_params(&results)?;
                let frame = self.frame()?;
                if self.stack.len() != frame.height && !frame.unreachable {
                    return Err(Self::error(
                        "type mismatch: values remain on the stack at 'catch'",
                    ));
                }
                self.stack.truncate(height);
                let frame = self.control.last_mut().expect("frame() checked");
                frame.kind = FrameKind::Catch;
                frame.unreachable = false;
                let params = self
                    .module
                    .exception_types
                    .get_type(*index)
                    .ok_or_else(|| Self::error(format!("invalid exception_type index {index}")))?
                    .parameters
                    .kinds()
                    .to_vec();
                self.push_results(&params);
                Ok(())
            }
            ("catch_all", _) => {
                let frame = self.frame()?;
                if !matches!(frame.kind, FrameKind::Try | FrameKind::Catch) {
                    return Err(Self::error("'catch_all' without a matching 'try'"));
                }
                let height = frame.height;
                let results = frame.results.clone();
                self.pop_params(&results)?;
                let frame = self.frame()?;
                if self.stack.len() != frame.height && !frame.unreachable {
                    return Err(Self::error(
                        "type mismatch: values remain on the stack at 'catch_all'",
                    ));
                }
                self.stack.truncate(height);
                let frame = self.control.last_mut().expect("frame() checked");
                frame.kind = FrameKind::CatchAll;
                frame.unreachable = false;
                Ok(())
            }
            ("end", _) => self.end_frame(),
            ("br", Immediate::Branch(depth)) => {
                let types = self.branch_types(*depth)?;
                self.pop_params(&types)?;
                self.set_unreachable()
            }
            ("br_if", Immediate::Branch(depth)) => {
                self.pop_expected(ValueType::I32)?;
                let types = self.branch_types(*depth)?;
                self.check_branch_operands(&types)
            }
            (
                "br_table",
                Immediate::BranchTable {
                    branch_depths,
                    default_depth,
                },
            ) => {
                self.pop_expected(ValueType::I32)?;
                let default_types = self.branch_types(*default_depth)?;
                for &depth in branch_depths {
                    let types = self.branch_types(depth)?;
                    if types != default_types {
                        return Err(Self::error(
                            "type mismatch: br_table targets have inconsistent label types",
                        ));
                    }
                }
                self.pop_params(&default_types)?;
                self.set_unreachable()
            }
            ("return", _) => {
                let results = self.results.clone();
                self.pop_params(&results)?;
                self.set_unreachable()
            }
            ("call", Immediate::Call(index)) => {
                let ty = self
                    .module
                    .function_type(*index)
                    .ok_or_else(|| Self::error(format!("invalid function index {index}")))?
                    .clone();
                self.pop_params(ty.parameters().kinds())?;
                self.push_results(ty.results().kinds());
                Ok(())
            }
            (
                "call_indirect",
                Immediate::CallIndirect {
                    type_index,
                    table_index,
                },
            ) => {
                let table = *self
                    .module
                    .tables
                    .get_type(*table_index)
                    .ok_or_else(|| Self::error(format!("invalid table index {table_index}")))?;
                if table.element_type != ReferenceType::FuncRef {
                    return Err(Self::error(
                        "call_indirect requires a table with funcref elements",
                    ));
                }
                self.pop_expected(self.address_type(table.index_type))?;
                let ty = self.module.types[*type_index as usize].clone();
                self.pop_params(ty.parameters().kinds())?;
                self.push_results(ty.results().kinds());
                Ok(())
            }
            ("drop", _) => self.pop_operand().map(|_| ()),
            ("select", _) => {
                self.pop_expected(ValueType::I32)?;
                let first = self.pop_operand()?;
                let second = self.pop_operand()?;
                let kind = match (first, second) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (None, None) => None,
                    (Some(a), Some(b)) => {
                        return Err(Self::error(format!(
                            "type mismatch: select operands must agree, found {a} and {b}"
                        )));
                    }
                };
                if let Some(kind) = kind {
                    if kind.is_reference() {
                        return Err(Self::error(
                            "untyped select may not be used with reference types",
                        ));
                    }
                    self.push_operand(kind);
                } else {
                    // Both operands are polymorphic; the result is too. Model it as i32, which
                    // is only reachable in unreachable code anyway.
                    self.push_operand(ValueType::I32);
                }
                Ok(())
            }
            ("select_t", Immediate::TypedSelect(kind)) => {
                self.pop_expected(ValueType::I32)?;
                self.pop_expected(*kind)?;
                self.pop_expected(*kind)?;
                self.push_operand(*kind);
                Ok(())
            }
            ("local.get", Immediate::Local(index)) => {
                self.push_operand(self.locals[*index as usize]);
                Ok(())
            }
            ("local.set", Immediate::Local(index)) => {
                self.pop_expected(self.locals[*index as usize])
            }
            ("local.tee", Immediate::Local(index)) => {
                let kind = self.locals[*index as usize];
                self.pop_expected(kind)?;
                self.push_operand(kind);
                Ok(())
            }
            ("global.get", Immediate::Global(index)) => {
                let ty = *self.module.globals.get_type(*index).expect("index checked");
                self.push_operand(ty.kind);
                Ok(())
            }
            ("global.set", Immediate::Global(index)) => {
                let ty = *self.module.globals.get_type(*index).expect("index checked");
                if !ty.is_mutable() {
                    return Err(Self::error(format!(
                        "global {index} is immutable and cannot be assigned"
                    )));
                }
                self.pop_expected(ty.kind)
            }
            ("table.get", Immediate::Table(index)) => {
                let table = *self.module.tables.get_type(*index).expect("index checked");
                self.pop_expected(self.address_type(table.index_type))?;
                self.push_operand(table.element_type.into());
                Ok(())
            }
            ("table.set", Immediate::Table(index)) => {
                let table = *self.module.tables.get_type(*index).expect("index checked");
                self.pop_expected(table.element_type.into())?;
                self.pop_expected(self.address_type(table.index_type))
            }
            ("table.grow", Immediate::Table(index)) => {
                let table = *self.module.tables.get_type(*index).expect("index checked");
                let address = self.address_type(table.index_type);
                self.pop_expected(address)?;
                self.pop_expected(table.element_type.into())?;
                self.push_operand(address);
                Ok(())
            }
            ("table.fill", Immediate::Table(index)) => {
                let table = *self.module.tables.get_type(*index).expect("index checked");
                let address = self.address_type(table.index_type);
                self.pop_expected(address)?;
                self.pop_expected(table.element_type.into())?;
                self.pop_expected(address)
            }
            ("memory.size", Immediate::Memory(index)) => {
                let address = self.address_type(self.memory_index_type(*index)?);
                self.push_operand(address);
                Ok(())
            }
            ("memory.grow", Immediate::Memory(index)) => {
                let address = self.address_type(self.memory_index_type(*index)?);
                self.pop_expected(address)?;
                self.push_operand(address);
                Ok(())
            }
            ("ref.null", Immediate::RefType(kind)) => {
                self.push_operand((*kind).into());
                Ok(())
            }
            ("ref.is_null", _) => {
                match self.pop_operand()? {
                    None => {}
                    Some(kind) if kind.is_reference() => {}
                    Some(kind) => {
                        return Err(Self::error(format!(
                            "type mismatch: expected a reference, found {kind}"
                        )));
                    }
                }
                self.push_operand(ValueType::I32);
                Ok(())
            }
            ("throw", Immediate::ExceptionType(index)) => {
                let params = self
                    .module
                    .exception_types
                    .get_type(*index)
                    .expect("index checked")
                    .parameters
                    .kinds()
                    .to_vec();
                self.pop_params(&params)?;
                self.set_unreachable()
            }
            ("rethrow", Immediate::CatchDepth(depth)) => {
                let depth = *depth as usize;
                if depth >= self.control.len() {
                    return Err(Self::error(format!(
                        "rethrow depth {depth} exceeds the control stack"
                    )));
                }
                let frame = &self.control[self.control.len() - 1 - depth];
                if !matches!(frame.kind, FrameKind::Catch | FrameKind::CatchAll) {
                    return Err(Self::error("rethrow must target a catch clause"));
                }
                self.set_unreachable()
            }
            (mnemonic, _) => Err(Self::error(format!(
                "operator '{mnemonic}' has inconsistent immediates"
            ))),
        }
    }
}

/// The validate-then-encode proxy: validates each operator, forwarding it to the inner sink
/// only when it checks.
pub struct ValidatingSink<'module, S> {
    validator: CodeValidator<'module>,
    inner: S,
}

impl<'module, S> ValidatingSink<'module, S> {
    pub fn new(validator: CodeValidator<'module>, inner: S) -> Self {
        ValidatingSink { validator, inner }
    }

    pub fn validator(&self) -> &CodeValidator<'module> {
        &self.validator
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: OperatorSink> OperatorSink for ValidatingSink<'_, S> {
    fn operator(&mut self, op: Operator) -> Result<(), ValidationError> {
        self.validator.visit(&op)?;
        self.inner.operator(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;
    use crate::model::ResultType;
    use crate::operators::operator_index_by_mnemonic;

    fn op(mnemonic: &str, imm: Immediate) -> Operator {
        Operator {
            index: operator_index_by_mnemonic(mnemonic).unwrap(),
            imm,
        }
    }

    fn empty_module() -> Module {
        Module::new(FeatureSpec::default())
    }

    fn returns_i32() -> FunctionType {
        FunctionType::new(ResultType::empty(), ResultType::new(vec![ValueType::I32]))
    }

    #[test]
    fn accepts_a_well_typed_body() {
        let module = empty_module();
        let ty = returns_i32();
        let mut validator = CodeValidator::new(&module, &ty, &[ValueType::I32]);

        validator.visit(&op("local.get", Immediate::Local(0))).unwrap();
        validator.visit(&op("i32.const", Immediate::I32(1))).unwrap();
        validator.visit(&op("i32.add", Immediate::None)).unwrap();
        validator.visit(&op("end", Immediate::None)).unwrap();

        assert!(validator.is_finished());
    }

    #[test]
    fn reports_a_result_type_mismatch() {
        let module = empty_module();
        let ty = returns_i32();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator.visit(&op("i64.const", Immediate::I64(0))).unwrap();
        let error = validator.visit(&op("end", Immediate::None)).unwrap_err();

        assert!(error.to_string().contains("type mismatch"));
    }

    #[test]
    fn unreachable_makes_the_frame_polymorphic() {
        let module = empty_module();
        let ty = returns_i32();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator.visit(&op("unreachable", Immediate::None)).unwrap();
        // Anything type-checks now, including popping operands that were never pushed.
        validator.visit(&op("i32.add", Immediate::None)).unwrap();
        validator.visit(&op("end", Immediate::None)).unwrap();

        assert!(validator.is_finished());
    }

    #[test]
    fn branch_depths_are_checked() {
        let module = empty_module();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator
            .visit(&op("block", Immediate::Block(BlockType::NoResult)))
            .unwrap();
        validator.visit(&op("br", Immediate::Branch(1))).unwrap();
        let error = validator.visit(&op("br", Immediate::Branch(9))).unwrap_err();

        assert!(error.to_string().contains("depth"));
    }

    #[test]
    fn if_without_else_must_balance() {
        let module = empty_module();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator.visit(&op("i32.const", Immediate::I32(1))).unwrap();
        validator
            .visit(&op("if", Immediate::Block(BlockType::Value(ValueType::I32))))
            .unwrap();
        validator.visit(&op("i32.const", Immediate::I32(2))).unwrap();
        let error = validator.visit(&op("end", Immediate::None)).unwrap_err();

        assert!(error.to_string().contains("type mismatch"));
    }

    #[test]
    fn else_restores_the_parameter_state() {
        let module = empty_module();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator.visit(&op("i32.const", Immediate::I32(1))).unwrap();
        validator
            .visit(&op("if", Immediate::Block(BlockType::Value(ValueType::I32))))
            .unwrap();
        validator.visit(&op("i32.const", Immediate::I32(2))).unwrap();
        validator.visit(&op("else", Immediate::None)).unwrap();
        validator.visit(&op("i32.const", Immediate::I32(3))).unwrap();
        validator.visit(&op("end", Immediate::None)).unwrap();
        validator.visit(&op("drop", Immediate::None)).unwrap();
        validator.visit(&op("end", Immediate::None)).unwrap();

        assert!(validator.is_finished());
    }

    #[test]
    fn feature_gating_rejects_disabled_operators() {
        let mut module = empty_module();
        module.feature_spec = FeatureSpec::mvp();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[ValueType::I32]);

        let error = validator
            .visit(&op("i32.extend8_s", Immediate::None))
            .unwrap_err();

        assert!(error.to_string().contains("feature"));
    }

    #[test]
    fn select_requires_matching_operands() {
        let module = empty_module();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[]);

        validator.visit(&op("i32.const", Immediate::I32(1))).unwrap();
        validator.visit(&op("f64.const", Immediate::F64(0))).unwrap();
        validator.visit(&op("i32.const", Immediate::I32(0))).unwrap();
        let error = validator.visit(&op("select", Immediate::None)).unwrap_err();

        assert!(error.to_string().contains("select"));
    }

    #[test]
    fn local_indices_are_bounds_checked() {
        let module = empty_module();
        let ty = FunctionType::runnable();
        let mut validator = CodeValidator::new(&module, &ty, &[ValueType::I32]);

        assert!(validator.visit(&op("local.get", Immediate::Local(0))).is_ok());
        let error = validator
            .visit(&op("local.get", Immediate::Local(1)))
            .unwrap_err();

        assert!(error.to_string().contains("local"));
    }
}
