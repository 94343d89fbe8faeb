//! Parsing of function bodies: the flat instruction stream and folded s-expression forms,
//! label scopes, per-operator immediates, and the validate-then-encode pass over the parsed
//! operators.
//!
//! Bodies are parsed by the third callback queue, after every declaration is final. Each body
//! is parsed into an operator list (with the token offset of each operator retained for
//! diagnostics), then streamed through the validating sink into the internal encoding.

use crate::model::{BlockType, ExternKind, FunctionType, ValueType};
use crate::operators::{
    natural_alignment_log2, operator_index_by_mnemonic, ImmKind, Immediate, Operator,
    OperatorEncoder, OperatorSink, OPERATORS,
};
use crate::text::lexer::{
    Token, TokenType, T_ALIGN, T_EOF, T_FIRST_OPERATOR, T_LEFT_PAREN,
    T_LEGACY_INSTRUCTION_NAME, T_OFFSET, T_RESULT, T_RIGHT_PAREN, T_THEN,
};
use crate::text::module::{
    parse_function_type_ref_and_or_decl, parse_referenced_type, resolve_function_type,
    ModuleState, UnresolvedFunctionType,
};
use crate::text::parse::{
    expected_error, find_closing_parenthesis, op_token, parse_name_or_index_ref,
    parse_parenthesized, parse_u8, parse_v128, require, try_parse_keyword_assignment,
    try_parse_name, try_parse_name_or_index_ref, Cursor, Name, NameToIndexMap, Parse,
    ParseAbort, ParseState, Reference,
};
use crate::text::parse::{parse_f32, parse_f64, parse_i32, parse_i64};
use crate::validate::{CodeValidator, ValidatingSink};

/// A function definition whose body tokens were skipped during the declaration pass, to be
/// parsed once every index space is final.
pub(crate) struct PendingFunctionBody {
    pub body_position: usize,
    pub def_index: usize,
    pub function_index: u32,
    pub local_names: NameToIndexMap,
}

/// Per-body parsing state: the local name scope, the branch target stack, and the operator
/// list being accumulated.
struct FunctionState {
    local_names: NameToIndexMap,
    num_locals: u32,
    branch_targets: Vec<Option<String>>,
    label_names: Vec<String>,
    ops: Vec<(Operator, u32)>,
}

impl FunctionState {
    fn emit(&mut self, offset: u32, mnemonic: &str, imm: Immediate) {
        let index = operator_index_by_mnemonic(mnemonic).expect("known operator mnemonic");
        self.ops.push((Operator { index, imm }, offset));
    }

    fn emit_token(&mut self, offset: u32, index: u16, imm: Immediate) {
        self.ops.push((Operator { index, imm }, offset));
    }

    fn push_branch_target(&mut self, name: Option<&Name>) {
        self.branch_targets.push(name.map(|name| name.text.clone()));
        self.label_names
            .push(name.map(|name| name.text.clone()).unwrap_or_default());
    }

    fn pop_branch_target(&mut self) {
        self.branch_targets.pop();
    }

    /// Translates a branch-target reference to a relative depth.
    fn resolve_branch_target(
        &self,
        state: &mut ParseState,
        reference: &Reference,
    ) -> u32 {
        match reference {
            Reference::Index { index, .. } => *index,
            Reference::Name(name) => {
                for (position, target) in self.branch_targets.iter().enumerate().rev() {
                    if target.as_deref() == Some(name.text.as_str()) {
                        return (self.branch_targets.len() - 1 - position) as u32;
                    }
                }
                state.error_at_offset(
                    name.source_offset as usize,
                    format!("unknown name '${}'", name.text),
                );
                u32::MAX
            }
        }
    }
}

fn is_operator_token(ty: TokenType) -> bool {
    ty >= T_FIRST_OPERATOR && ((ty - T_FIRST_OPERATOR) as usize) < OPERATORS.len()
}

fn is_sequence_terminator(ty: TokenType) -> bool {
    ty == T_RIGHT_PAREN
        || ty == T_EOF
        || ty == op_token("end")
        || ty == op_token("else")
        || ty == op_token("catch")
        || ty == op_token("catch_all")
}

/// Parses an optional label name and the block type of a control structure.
fn parse_control_imm(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
) -> Parse<(Option<Name>, BlockType)> {
    let label = try_parse_name(cursor, state);

    let mut throwaway_names = NameToIndexMap::default();
    let mut throwaway_disassembly = Vec::new();
    let unresolved = parse_function_type_ref_and_or_decl(
        cursor,
        state,
        &mut throwaway_names,
        &mut throwaway_disassembly,
    )?;

    let block_type = resolve_block_type(module_state, state, unresolved);
    Ok((label, block_type))
}

fn resolve_block_type(
    module_state: &mut ModuleState,
    state: &mut ParseState,
    unresolved: UnresolvedFunctionType,
) -> BlockType {
    if unresolved.reference.is_some() {
        let index = resolve_function_type(module_state, state, unresolved);
        if index == u32::MAX {
            // The failed resolution was already reported; degrade to an empty block type so
            // the validator doesn't report the sentinel index again.
            return BlockType::NoResult;
        }
        return BlockType::Indexed(index);
    }
    let parameters = unresolved.explicit.parameters();
    let results = unresolved.explicit.results();
    if parameters.is_empty() && results.is_empty() {
        BlockType::NoResult
    } else if parameters.is_empty() && results.len() == 1 {
        BlockType::Value(results.kinds()[0])
    } else {
        BlockType::Indexed(crate::text::module::get_unique_function_type_index(
            module_state,
            unresolved.explicit,
        ))
    }
}

/// Checks an optional label name repeated at `end`/`else` against the target it closes.
fn parse_redundant_label(
    cursor: &mut Cursor,
    state: &mut ParseState,
    label: &Option<Name>,
) {
    if let Some(repeated) = try_parse_name(cursor, state) {
        if label.as_ref().map(|name| name.text.as_str()) != Some(repeated.text.as_str()) {
            state.error_at_offset(
                repeated.source_offset as usize,
                format!("label '${}' does not match the label it closes", repeated.text),
            );
        }
    }
}

/// Parses one operator's immediates, dispatching on the table's immediate kind.
fn parse_imm(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    op_index: u16,
) -> Parse<Immediate> {
    let info = &OPERATORS[op_index as usize];
    match info.imm {
        ImmKind::None | ImmKind::Block => Ok(Immediate::None),
        ImmKind::AtomicFence => Ok(Immediate::AtomicFence),
        ImmKind::Branch | ImmKind::CatchDepth => {
            let reference = parse_name_or_index_ref(cursor, state, "branch target")?;
            let depth = function_state.resolve_branch_target(state, &reference);
            Ok(if info.imm == ImmKind::Branch {
                Immediate::Branch(depth)
            } else {
                Immediate::CatchDepth(depth)
            })
        }
        ImmKind::BranchTable => {
            // The last target in the list is the default.
            let mut depths = Vec::new();
            let first = parse_name_or_index_ref(cursor, state, "branch target")?;
            depths.push(function_state.resolve_branch_target(state, &first));
            while let Some(reference) = try_parse_name_or_index_ref(cursor, state) {
                depths.push(function_state.resolve_branch_target(state, &reference));
            }
            let default_depth = depths.pop().unwrap();
            Ok(Immediate::BranchTable {
                branch_depths: depths,
                default_depth,
            })
        }
        ImmKind::Call => {
            let reference = parse_name_or_index_ref(cursor, state, "function reference")?;
            Ok(Immediate::Call(module_state.resolve_extern_ref(
                state,
                ExternKind::Function,
                &reference,
            )))
        }
        ImmKind::FunctionRef => {
            let reference = parse_name_or_index_ref(cursor, state, "function reference")?;
            Ok(Immediate::FunctionRef(module_state.resolve_extern_ref(
                state,
                ExternKind::Function,
                &reference,
            )))
        }
        ImmKind::CallIndirect => {
            let table_index = match (cursor.ty() != T_LEFT_PAREN)
                .then(|| try_parse_name_or_index_ref(cursor, state))
                .flatten()
            {
                Some(reference) => {
                    module_state.resolve_extern_ref(state, ExternKind::Table, &reference)
                }
                None => 0,
            };
            let mut throwaway_names = NameToIndexMap::default();
            let mut throwaway_disassembly = Vec::new();
            let unresolved = parse_function_type_ref_and_or_decl(
                cursor,
                state,
                &mut throwaway_names,
                &mut throwaway_disassembly,
            )?;
            let type_index = resolve_function_type(module_state, state, unresolved);
            Ok(Immediate::CallIndirect {
                type_index,
                table_index,
            })
        }
        ImmKind::Local => {
            let index = crate::text::parse::parse_and_resolve_ref(
                cursor,
                state,
                &function_state.local_names,
                function_state.num_locals,
                "local reference",
            )?;
            Ok(Immediate::Local(index))
        }
        ImmKind::Global => {
            let reference = parse_name_or_index_ref(cursor, state, "global reference")?;
            Ok(Immediate::Global(module_state.resolve_extern_ref(
                state,
                ExternKind::Global,
                &reference,
            )))
        }
        ImmKind::Table => Ok(Immediate::Table(parse_optional_space_ref(
            cursor,
            state,
            module_state,
            ExternKind::Table,
        ))),
        ImmKind::TableCopy => {
            let dest = parse_optional_space_ref(cursor, state, module_state, ExternKind::Table);
            let source = parse_optional_space_ref(cursor, state, module_state, ExternKind::Table);
            Ok(Immediate::TableCopy {
                dest_table_index: dest,
                source_table_index: source,
            })
        }
        ImmKind::Memory => Ok(Immediate::Memory(parse_optional_space_ref(
            cursor,
            state,
            module_state,
            ExternKind::Memory,
        ))),
        ImmKind::MemoryCopy => {
            let dest = parse_optional_space_ref(cursor, state, module_state, ExternKind::Memory);
            let source = parse_optional_space_ref(cursor, state, module_state, ExternKind::Memory);
            Ok(Immediate::MemoryCopy {
                dest_memory_index: dest,
                source_memory_index: source,
            })
        }
        ImmKind::DataSegment => {
            let reference = parse_name_or_index_ref(cursor, state, "data segment reference")?;
            let index = crate::text::parse::resolve_ref(
                state,
                &module_state.data_names,
                module_state.module.data_segments.len() as u32,
                &reference,
            );
            Ok(Immediate::DataSegment(index))
        }
        ImmKind::DataSegmentAndMemory => {
            // `memory.init <data>` or `memory.init <memory> <data>`.
            let first = parse_name_or_index_ref(cursor, state, "data segment reference")?;
            match try_parse_name_or_index_ref(cursor, state) {
                Some(second) => Ok(Immediate::DataSegmentAndMemory {
                    memory_index: module_state.resolve_extern_ref(
                        state,
                        ExternKind::Memory,
                        &first,
                    ),
                    data_index: crate::text::parse::resolve_ref(
                        state,
                        &module_state.data_names,
                        module_state.module.data_segments.len() as u32,
                        &second,
                    ),
                }),
                None => Ok(Immediate::DataSegmentAndMemory {
                    memory_index: 0,
                    data_index: crate::text::parse::resolve_ref(
                        state,
                        &module_state.data_names,
                        module_state.module.data_segments.len() as u32,
                        &first,
                    ),
                }),
            }
        }
        ImmKind::ElemSegment => {
            let reference = parse_name_or_index_ref(cursor, state, "elem segment reference")?;
            let index = crate::text::parse::resolve_ref(
                state,
                &module_state.elem_names,
                module_state.module.elem_segments.len() as u32,
                &reference,
            );
            Ok(Immediate::ElemSegment(index))
        }
        ImmKind::ElemSegmentAndTable => {
            let first = parse_name_or_index_ref(cursor, state, "elem segment reference")?;
            match try_parse_name_or_index_ref(cursor, state) {
                Some(second) => Ok(Immediate::ElemSegmentAndTable {
                    table_index: module_state.resolve_extern_ref(state, ExternKind::Table, &first),
                    elem_index: crate::text::parse::resolve_ref(
                        state,
                        &module_state.elem_names,
                        module_state.module.elem_segments.len() as u32,
                        &second,
                    ),
                }),
                None => Ok(Immediate::ElemSegmentAndTable {
                    table_index: 0,
                    elem_index: crate::text::parse::resolve_ref(
                        state,
                        &module_state.elem_names,
                        module_state.module.elem_segments.len() as u32,
                        &first,
                    ),
                }),
            }
        }
        ImmKind::LoadStore | ImmKind::AtomicLoadStore => {
            let memory_index = parse_optional_space_ref(cursor, state, module_state, ExternKind::Memory);
            let (alignment_log2, offset) = parse_memarg(cursor, state, info.mnemonic)?;
            Ok(Immediate::LoadStore {
                alignment_log2,
                offset,
                memory_index,
            })
        }
        ImmKind::LoadStoreLane8
        | ImmKind::LoadStoreLane16
        | ImmKind::LoadStoreLane32
        | ImmKind::LoadStoreLane64 => {
            // Lane accesses always target memory 0: whether the text grammar admits a memory
            // index here is an unresolved point, so none is parsed.
            let (alignment_log2, offset) = parse_memarg(cursor, state, info.mnemonic)?;
            let lane = parse_lane_index(cursor, state, info.imm.lane_count().unwrap())?;
            Ok(Immediate::LoadStoreLane {
                alignment_log2,
                offset,
                memory_index: 0,
                lane,
            })
        }
        ImmKind::Lane2 | ImmKind::Lane4 | ImmKind::Lane8 | ImmKind::Lane16 => {
            let lane = parse_lane_index(cursor, state, info.imm.lane_count().unwrap())?;
            Ok(Immediate::Lane(lane))
        }
        ImmKind::Shuffle => {
            let mut lanes = [0u8; 16];
            for lane in lanes.iter_mut() {
                *lane = parse_lane_index(cursor, state, 32)?;
            }
            Ok(Immediate::Shuffle(lanes))
        }
        ImmKind::I32 => Ok(Immediate::I32(parse_i32(cursor, state)? as i32)),
        ImmKind::I64 => Ok(Immediate::I64(parse_i64(cursor, state)? as i64)),
        ImmKind::F32 => Ok(Immediate::F32(parse_f32(cursor, state)?)),
        ImmKind::F64 => Ok(Immediate::F64(parse_f64(cursor, state)?)),
        ImmKind::V128 => Ok(Immediate::V128(parse_v128(cursor, state)?)),
        ImmKind::RefType => Ok(Immediate::RefType(parse_referenced_type(cursor, state)?)),
        ImmKind::TypedSelect => {
            // Reached when `select` is followed by an explicit `(result T)`.
            let mut kind = ValueType::I32;
            parse_parenthesized(cursor, state, |cursor, state| {
                require(cursor, state, T_RESULT)?;
                kind = crate::text::parse::parse_value_type(cursor, state)?;
                Ok(())
            })?;
            Ok(Immediate::TypedSelect(kind))
        }
        ImmKind::ExceptionType => {
            let reference = parse_name_or_index_ref(cursor, state, "exception type reference")?;
            Ok(Immediate::ExceptionType(module_state.resolve_extern_ref(
                state,
                ExternKind::ExceptionType,
                &reference,
            )))
        }
    }
}

/// Whether an immediate carries a reference that failed to resolve. The resolution failure
/// already produced a diagnostic; the operator is replaced by `unreachable` so the validator
/// doesn't report the sentinel index a second time.
fn has_unresolved_reference(imm: &Immediate) -> bool {
    const UNRESOLVED: u32 = u32::MAX;
    match imm {
        Immediate::Branch(index)
        | Immediate::CatchDepth(index)
        | Immediate::Call(index)
        | Immediate::FunctionRef(index)
        | Immediate::Local(index)
        | Immediate::Global(index)
        | Immediate::Table(index)
        | Immediate::Memory(index)
        | Immediate::DataSegment(index)
        | Immediate::ElemSegment(index)
        | Immediate::ExceptionType(index) => *index == UNRESOLVED,
        Immediate::BranchTable {
            branch_depths,
            default_depth,
        } => *default_depth == UNRESOLVED || branch_depths.contains(&UNRESOLVED),
        Immediate::CallIndirect {
            type_index,
            table_index,
        } => *type_index == UNRESOLVED || *table_index == UNRESOLVED,
        Immediate::TableCopy {
            dest_table_index,
            source_table_index,
        } => *dest_table_index == UNRESOLVED || *source_table_index == UNRESOLVED,
        Immediate::MemoryCopy {
            dest_memory_index,
            source_memory_index,
        } => *dest_memory_index == UNRESOLVED || *source_memory_index == UNRESOLVED,
        Immediate::DataSegmentAndMemory {
            data_index,
            memory_index,
        } => *data_index == UNRESOLVED || *memory_index == UNRESOLVED,
        Immediate::ElemSegmentAndTable {
            elem_index,
            table_index,
        } => *elem_index == UNRESOLVED || *table_index == UNRESOLVED,
        Immediate::LoadStore { memory_index, .. }
        | Immediate::LoadStoreLane { memory_index, .. } => *memory_index == UNRESOLVED,
        _ => false,
    }
}

fn parse_optional_space_ref(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    kind: ExternKind,
) -> u32 {
    match try_parse_name_or_index_ref(cursor, state) {
        Some(reference) => module_state.resolve_extern_ref(state, kind, &reference),
        None => 0,
    }
}

fn parse_memarg(
    cursor: &mut Cursor,
    state: &mut ParseState,
    mnemonic: &str,
) -> Parse<(u8, u64)> {
    let offset = try_parse_keyword_assignment(cursor, state, T_OFFSET)?.unwrap_or(0);

    let natural = natural_alignment_log2(mnemonic);
    let alignment_log2 = match try_parse_keyword_assignment(cursor, state, T_ALIGN)? {
        Some(alignment) => {
            if alignment == 0 || !alignment.is_power_of_two() {
                state.error_at_offset(cursor.offset(), "alignment must be a power of two");
                natural
            } else {
                alignment.trailing_zeros() as u8
            }
        }
        None => natural,
    };
    Ok((alignment_log2, offset))
}

fn parse_lane_index(cursor: &mut Cursor, state: &mut ParseState, lanes: u8) -> Parse<u8> {
    let offset = cursor.offset();
    let lane = parse_u8(cursor, state)?;
    if lane >= lanes {
        state.error_at_offset(offset, format!("lane index must be less than {lanes}"));
        return Ok(0);
    }
    Ok(lane)
}

/// Parses one instruction: a folded expression if the cursor is at `(`, a flat operator
/// otherwise.
fn parse_instruction(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    depth: usize,
) -> Parse<()> {
    if depth >= state.features.max_syntax_recursion {
        state.error_at_offset(cursor.offset(), "syntax recursion limit exceeded");
        return Err(ParseAbort::Fatal);
    }

    if cursor.ty() == T_LEFT_PAREN {
        return parse_expr(cursor, state, module_state, function_state, depth);
    }

    if cursor.ty() == T_LEGACY_INSTRUCTION_NAME {
        state.error_at_offset(
            cursor.offset(),
            "legacy instruction names require the legacy-instruction-names feature",
        );
        cursor.advance();
        return Ok(());
    }

    if !is_operator_token(cursor.ty()) {
        expected_error(cursor, state, "instruction");
        return Err(ParseAbort::Recover);
    }

    let op_index = cursor.ty() - T_FIRST_OPERATOR;
    let offset = cursor.token().begin;
    let mnemonic = OPERATORS[op_index as usize].mnemonic;
    match mnemonic {
        "block" | "loop" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;
            function_state.emit(offset, mnemonic, Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());
            parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
            let end_offset = cursor.token().begin;
            require_operator(cursor, state, "end")?;
            parse_redundant_label(cursor, state, &label);
            function_state.emit(end_offset, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "if" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;
            function_state.emit(offset, "if", Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());
            parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
            if cursor.ty() == op_token("else") {
                let else_offset = cursor.token().begin;
                cursor.advance();
                parse_redundant_label(cursor, state, &label);
                function_state.emit(else_offset, "else", Immediate::None);
                parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
            }
            let end_offset = cursor.token().begin;
            require_operator(cursor, state, "end")?;
            parse_redundant_label(cursor, state, &label);
            function_state.emit(end_offset, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "try" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;
            function_state.emit(offset, "try", Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());
            parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
            parse_catch_clauses(cursor, state, module_state, function_state, depth)?;
            let end_offset = cursor.token().begin;
            require_operator(cursor, state, "end")?;
            parse_redundant_label(cursor, state, &label);
            function_state.emit(end_offset, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "select" => {
            cursor.advance();
            if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_RESULT {
                let select_t = operator_index_by_mnemonic("select_t").unwrap();
                let imm = parse_imm(cursor, state, module_state, function_state, select_t)?;
                function_state.emit_token(offset, select_t, imm);
            } else {
                function_state.emit(offset, "select", Immediate::None);
            }
        }
        _ => {
            cursor.advance();
            let imm = parse_imm(cursor, state, module_state, function_state, op_index)?;
            if has_unresolved_reference(&imm) {
                function_state.emit(offset, "unreachable", Immediate::None);
            } else {
                function_state.emit_token(offset, op_index, imm);
            }
        }
    }
    Ok(())
}

/// Parses flat `catch`/`catch_all` clauses following a `try` body. At most one `catch_all`,
/// and it must come last.
fn parse_catch_clauses(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    depth: usize,
) -> Parse<()> {
    while cursor.ty() == op_token("catch") {
        let catch_offset = cursor.token().begin;
        cursor.advance();
        let catch_index = operator_index_by_mnemonic("catch").unwrap();
        let imm = parse_imm(cursor, state, module_state, function_state, catch_index)?;
        function_state.emit_token(catch_offset, catch_index, imm);
        parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
    }
    if cursor.ty() == op_token("catch_all") {
        let offset = cursor.token().begin;
        cursor.advance();
        function_state.emit(offset, "catch_all", Immediate::None);
        parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
        if cursor.ty() == op_token("catch") || cursor.ty() == op_token("catch_all") {
            state.error_at_offset(cursor.offset(), "'catch_all' must be the last catch clause");
            return Err(ParseAbort::Recover);
        }
    }
    Ok(())
}

/// Parses a folded expression: `( op imm* sub-expr* )`, where sub-expressions are emitted
/// before the operator. A recoverable failure inside the form emits `unreachable` so later
/// instructions still type-check in a known state, then skips to the enclosing `)`.
fn parse_expr(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    depth: usize,
) -> Parse<()> {
    let opening_position = cursor.position;
    require(cursor, state, T_LEFT_PAREN)?;

    if depth >= state.features.max_syntax_recursion {
        state.error_at_offset(cursor.offset(), "syntax recursion limit exceeded");
        return Err(ParseAbort::Fatal);
    }

    let result = parse_expr_inner(cursor, state, module_state, function_state, depth);
    match result {
        Ok(()) => match require(cursor, state, T_RIGHT_PAREN) {
            Ok(()) => Ok(()),
            Err(ParseAbort::Recover) => {
                function_state.emit(cursor.token().begin, "unreachable", Immediate::None);
                find_closing_parenthesis(cursor, state, opening_position)
            }
            Err(ParseAbort::Fatal) => Err(ParseAbort::Fatal),
        },
        Err(ParseAbort::Recover) => {
            function_state.emit(cursor.token().begin, "unreachable", Immediate::None);
            find_closing_parenthesis(cursor, state, opening_position)
        }
        Err(ParseAbort::Fatal) => Err(ParseAbort::Fatal),
    }
}

fn parse_expr_inner(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    depth: usize,
) -> Parse<()> {
    if !is_operator_token(cursor.ty()) {
        expected_error(cursor, state, "instruction");
        return Err(ParseAbort::Recover);
    }

    let op_index = cursor.ty() - T_FIRST_OPERATOR;
    let offset = cursor.token().begin;
    let mnemonic = OPERATORS[op_index as usize].mnemonic;
    match mnemonic {
        // Structure-closing operators have no folded form of their own.
        "end" | "else" | "catch" | "catch_all" => {
            expected_error(cursor, state, "instruction");
            return Err(ParseAbort::Recover);
        }
        "block" | "loop" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;
            function_state.emit(offset, mnemonic, Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());
            parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)?;
            function_state.emit(cursor.token().begin, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "if" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;

            // Folded condition expressions precede the `(then …)` clause.
            while cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty != T_THEN {
                parse_expr(cursor, state, module_state, function_state, depth + 1)?;
            }

            function_state.emit(offset, "if", Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());

            let mut parsed_then = false;
            if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_THEN {
                parse_parenthesized(cursor, state, |cursor, state| {
                    cursor.advance();
                    parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)
                })?;
                parsed_then = true;
            }
            if !parsed_then {
                expected_error(cursor, state, "'(then …)'");
                function_state.pop_branch_target();
                return Err(ParseAbort::Recover);
            }

            if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == op_token("else") {
                let else_offset = cursor.peek(1).begin;
                parse_parenthesized(cursor, state, |cursor, state| {
                    cursor.advance();
                    function_state.emit(else_offset, "else", Immediate::None);
                    parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)
                })?;
            }

            function_state.emit(cursor.token().begin, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "try" => {
            cursor.advance();
            let (label, block_type) = parse_control_imm(cursor, state, module_state)?;
            function_state.emit(offset, "try", Immediate::Block(block_type));
            function_state.push_branch_target(label.as_ref());

            // The body runs until a parenthesized catch clause or the closing parenthesis.
            while !at_folded_catch(cursor) && !is_sequence_terminator(cursor.ty()) {
                parse_instruction(cursor, state, module_state, function_state, depth + 1)?;
            }

            while at_folded_catch(cursor) {
                let is_catch_all = cursor.peek(1).ty == op_token("catch_all");
                let clause_offset = cursor.peek(1).begin;
                parse_parenthesized(cursor, state, |cursor, state| {
                    cursor.advance();
                    if is_catch_all {
                        function_state.emit(clause_offset, "catch_all", Immediate::None);
                    } else {
                        let catch_index = operator_index_by_mnemonic("catch").unwrap();
                        let imm =
                            parse_imm(cursor, state, module_state, function_state, catch_index)?;
                        function_state.emit_token(clause_offset, catch_index, imm);
                    }
                    parse_instr_sequence(cursor, state, module_state, function_state, depth + 1)
                })?;
                if is_catch_all {
                    break;
                }
            }

            function_state.emit(cursor.token().begin, "end", Immediate::None);
            function_state.pop_branch_target();
        }
        "select" => {
            cursor.advance();
            let mut select_index = operator_index_by_mnemonic("select").unwrap();
            let mut imm = Immediate::None;
            if cursor.ty() == T_LEFT_PAREN && cursor.peek(1).ty == T_RESULT {
                select_index = operator_index_by_mnemonic("select_t").unwrap();
                imm = parse_imm(cursor, state, module_state, function_state, select_index)?;
            }
            while cursor.ty() == T_LEFT_PAREN {
                parse_expr(cursor, state, module_state, function_state, depth + 1)?;
            }
            function_state.emit_token(offset, select_index, imm);
        }
        _ => {
            cursor.advance();
            let imm = parse_imm(cursor, state, module_state, function_state, op_index)?;
            while cursor.ty() == T_LEFT_PAREN {
                parse_expr(cursor, state, module_state, function_state, depth + 1)?;
            }
            if has_unresolved_reference(&imm) {
                function_state.emit(offset, "unreachable", Immediate::None);
            } else {
                function_state.emit_token(offset, op_index, imm);
            }
        }
    }
    Ok(())
}

fn at_folded_catch(cursor: &Cursor) -> bool {
    cursor.ty() == T_LEFT_PAREN
        && (cursor.peek(1).ty == op_token("catch") || cursor.peek(1).ty == op_token("catch_all"))
}

fn require_operator(cursor: &mut Cursor, state: &mut ParseState, mnemonic: &str) -> Parse<()> {
    if cursor.ty() == op_token(mnemonic) {
        cursor.advance();
        Ok(())
    } else {
        expected_error(cursor, state, &format!("'{mnemonic}'"));
        Err(ParseAbort::Recover)
    }
}

/// Parses instructions until a sequence terminator (`)`, `end`, `else`, `catch`,
/// `catch_all`, or EOF), leaving the terminator unconsumed.
fn parse_instr_sequence(
    cursor: &mut Cursor,
    state: &mut ParseState,
    module_state: &mut ModuleState,
    function_state: &mut FunctionState,
    depth: usize,
) -> Parse<()> {
    loop {
        if is_sequence_terminator(cursor.ty()) {
            return Ok(());
        }
        parse_instruction(cursor, state, module_state, function_state, depth)?;
    }
}

/// Parses, validates, and encodes one pending function body against the complete module.
pub(crate) fn parse_function_body(
    tokens: &[Token],
    state: &mut ParseState,
    module_state: &mut ModuleState,
    pending: PendingFunctionBody,
) {
    let mut cursor = Cursor {
        tokens,
        position: pending.body_position,
    };

    let function_type = module_state
        .module
        .function_type(pending.function_index)
        .cloned()
        .unwrap_or_else(FunctionType::runnable);
    let local_types: Vec<ValueType> = function_type
        .parameters()
        .kinds()
        .iter()
        .copied()
        .chain(
            module_state.module.functions.defs()[pending.def_index]
                .non_parameter_local_types
                .iter()
                .copied(),
        )
        .collect();

    let mut function_state = FunctionState {
        local_names: pending.local_names,
        num_locals: local_types.len() as u32,
        branch_targets: Vec::new(),
        label_names: Vec::new(),
        ops: Vec::new(),
    };

    // Parse the body into an operator list, recovering to the function's closing parenthesis
    // on a fatal inner failure.
    let parse_result =
        parse_instr_sequence(&mut cursor, state, module_state, &mut function_state, 0);
    if parse_result.is_ok() && !matches!(cursor.ty(), T_RIGHT_PAREN | T_EOF) {
        state.error_at_offset(cursor.offset(), "unexpected token in function body");
    }
    function_state.emit(cursor.token().begin, "end", Immediate::None);

    // Stream the operators through the validator into the internal encoding. A validation
    // failure is reported at the offending operator and replaced by `unreachable`, which
    // puts the validator into the polymorphic state so subsequent code still checks.
    let ops = function_state.ops;
    let (code, branch_tables, validation_errors) = {
        let module = &module_state.module;
        let validator = CodeValidator::new(module, &function_type, &local_types);
        let mut sink = ValidatingSink::new(validator, OperatorEncoder::new());
        let mut validation_errors = Vec::new();
        let mut previous_offset = None;
        for (op, offset) in ops {
            let is_end = op.info().mnemonic == "end";
            if let Err(error) = sink.operator(op) {
                // A mismatch detected at `end` is blamed on the operator that produced the
                // offending value, which is where the reader needs to look.
                let blamed = if is_end {
                    previous_offset.unwrap_or(offset)
                } else {
                    offset
                };
                validation_errors.push((blamed, error.to_string()));
                let unreachable = Operator::named("unreachable").unwrap();
                let _ = sink.operator(unreachable);
            }
            previous_offset = Some(offset);
        }
        let (code, branch_tables) = sink.into_inner().finish();
        (code, branch_tables, validation_errors)
    };
    for (offset, message) in validation_errors {
        state.error_at_offset(offset as usize, message);
    }

    if let Some(def) = module_state
        .module
        .functions
        .get_def_mut(pending.function_index)
    {
        def.code = code;
        def.branch_tables = branch_tables;
    }

    if let Some(names) = module_state
        .disassembly
        .functions
        .get_mut(pending.function_index as usize)
    {
        names.labels = function_state.label_names;
    }
}
