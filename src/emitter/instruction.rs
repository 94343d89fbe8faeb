//! Wire encoding of operators and initializer expressions, driven by the operator table.

use crate::emitter::errors::EmitError;
use crate::emitter::values::{emit_s32, emit_s64, emit_u32, emit_u64, emit_value_type};
use crate::leb128;
use crate::model::{BlockType, FunctionDef, InitializerExpression, ReferenceType, ValueType};
use crate::operators::{CodeReader, Immediate, Operator};

/// Emits an operator's wire opcode: the prefix byte (if any) followed by the opcode value,
/// LEB128-encoded for prefixed operators.
fn emit_opcode(op: &Operator, output: &mut Vec<u8>) -> Result<(), EmitError> {
    let opcode = op.info().opcode;
    if opcode.prefix != 0 {
        output.push(opcode.prefix);
        emit_u32(opcode.code, output)?;
    } else {
        output.push(opcode.code as u8);
    }
    Ok(())
}

fn emit_block_type(block_type: BlockType, output: &mut Vec<u8>) -> Result<(), EmitError> {
    match block_type {
        BlockType::NoResult => {
            leb128::encode_signed(-64i64, &mut *output)?;
        }
        BlockType::Value(kind) => {
            leb128::encode_signed(i64::from(kind.binary_code()) - 0x80, &mut *output)?;
        }
        BlockType::Indexed(type_index) => {
            leb128::encode_signed(i64::from(type_index), &mut *output)?;
        }
    }
    Ok(())
}

fn emit_memarg(
    alignment_log2: u8,
    offset: u64,
    memory_index: u32,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    if memory_index != 0 {
        emit_u32(u32::from(alignment_log2) | 0x40, output)?;
        emit_u32(memory_index, output)?;
    } else {
        emit_u32(u32::from(alignment_log2), output)?;
    }
    emit_u64(offset, output)
}

/// Emits one operator: its opcode, then its immediates in the wire layout.
pub fn emit_operator(op: &Operator, output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_opcode(op, output)?;
    match &op.imm {
        Immediate::None => {}
        Immediate::AtomicFence => output.push(0),
        Immediate::Block(block_type) => emit_block_type(*block_type, output)?,
        Immediate::Branch(depth) | Immediate::CatchDepth(depth) => emit_u32(*depth, output)?,
        Immediate::BranchTable {
            branch_depths,
            default_depth,
        } => {
            emit_u32(branch_depths.len() as u32, output)?;
            for depth in branch_depths {
                emit_u32(*depth, output)?;
            }
            emit_u32(*default_depth, output)?;
        }
        Immediate::Call(index)
        | Immediate::FunctionRef(index)
        | Immediate::Local(index)
        | Immediate::Global(index)
        | Immediate::Table(index)
        | Immediate::Memory(index)
        | Immediate::DataSegment(index)
        | Immediate::ElemSegment(index)
        | Immediate::ExceptionType(index) => emit_u32(*index, output)?,
        Immediate::CallIndirect {
            type_index,
            table_index,
        } => {
            emit_u32(*type_index, output)?;
            emit_u32(*table_index, output)?;
        }
        Immediate::TableCopy {
            dest_table_index,
            source_table_index,
        } => {
            emit_u32(*dest_table_index, output)?;
            emit_u32(*source_table_index, output)?;
        }
        Immediate::MemoryCopy {
            dest_memory_index,
            source_memory_index,
        } => {
            emit_u32(*dest_memory_index, output)?;
            emit_u32(*source_memory_index, output)?;
        }
        Immediate::DataSegmentAndMemory {
            data_index,
            memory_index,
        } => {
            emit_u32(*data_index, output)?;
            emit_u32(*memory_index, output)?;
        }
        Immediate::ElemSegmentAndTable {
            elem_index,
            table_index,
        } => {
            emit_u32(*elem_index, output)?;
            emit_u32(*table_index, output)?;
        }
        Immediate::LoadStore {
            alignment_log2,
            offset,
            memory_index,
        } => emit_memarg(*alignment_log2, *offset, *memory_index, output)?,
        Immediate::LoadStoreLane {
            alignment_log2,
            offset,
            memory_index,
            lane,
        } => {
            emit_memarg(*alignment_log2, *offset, *memory_index, output)?;
            output.push(*lane);
        }
        Immediate::Lane(lane) => output.push(*lane),
        Immediate::Shuffle(lanes) => output.extend_from_slice(lanes),
        Immediate::I32(value) => emit_s32(*value, output)?,
        Immediate::I64(value) => emit_s64(*value, output)?,
        Immediate::F32(bits) => output.extend_from_slice(&bits.to_le_bytes()),
        Immediate::F64(bits) => output.extend_from_slice(&bits.to_le_bytes()),
        Immediate::V128(bytes) => output.extend_from_slice(bytes),
        Immediate::RefType(kind) => output.push(ValueType::from(*kind).binary_code()),
        Immediate::TypedSelect(kind) => {
            emit_u32(1, output)?;
            emit_value_type(*kind, output);
        }
    }
    Ok(())
}

/// Emits an initializer expression: its single operator followed by `end`.
pub fn emit_initializer(
    expression: &InitializerExpression,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    let (mnemonic, imm) = match expression {
        InitializerExpression::I32Const(value) => ("i32.const", Immediate::I32(*value)),
        InitializerExpression::I64Const(value) => ("i64.const", Immediate::I64(*value)),
        InitializerExpression::F32Const(bits) => ("f32.const", Immediate::F32(*bits)),
        InitializerExpression::F64Const(bits) => ("f64.const", Immediate::F64(*bits)),
        InitializerExpression::V128Const(bytes) => ("v128.const", Immediate::V128(*bytes)),
        InitializerExpression::GlobalGet(index) => ("global.get", Immediate::Global(*index)),
        InitializerExpression::RefNull(kind) => ("ref.null", Immediate::RefType(*kind)),
        InitializerExpression::RefFunc(index) => ("ref.func", Immediate::FunctionRef(*index)),
    };
    let mut op = Operator::named(mnemonic).expect("initializer operators are in the table");
    op.imm = imm;
    emit_operator(&op, output)?;
    emit_operator(&Operator::named("end").unwrap(), output)
}

/// Emits one function body: the grouped local declarations, then the operator stream
/// translated from the internal encoding.
pub fn emit_function_body(
    def: &FunctionDef,
    function_index: u32,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    // Group consecutive locals of the same type into (count, type) runs.
    let mut runs: Vec<(u32, ValueType)> = Vec::new();
    for &kind in &def.non_parameter_local_types {
        match runs.last_mut() {
            Some((count, last)) if *last == kind => *count += 1,
            _ => runs.push((1, kind)),
        }
    }
    emit_u32(runs.len() as u32, output)?;
    for (count, kind) in runs {
        emit_u32(count, output)?;
        emit_value_type(kind, output);
    }

    for op in CodeReader::new(&def.code, &def.branch_tables) {
        let op = op.map_err(|_| EmitError::CorruptCode(function_index))?;
        emit_operator(&op, output)?;
    }
    Ok(())
}

/// Emits an element expression as a constant expression.
pub fn emit_elem_expr(
    expr: &crate::model::ElemExpr,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    let expression = match expr {
        crate::model::ElemExpr::RefNull(kind) => InitializerExpression::RefNull(*kind),
        crate::model::ElemExpr::RefFunc(index) => InitializerExpression::RefFunc(*index),
    };
    emit_initializer(&expression, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::operator_index_by_mnemonic;

    fn op(mnemonic: &str, imm: Immediate) -> Operator {
        Operator {
            index: operator_index_by_mnemonic(mnemonic).unwrap(),
            imm,
        }
    }

    #[test]
    fn emits_the_standard_opcodes() {
        let mut output = Vec::new();
        emit_operator(&op("local.get", Immediate::Local(0)), &mut output).unwrap();
        emit_operator(&op("i32.const", Immediate::I32(-1)), &mut output).unwrap();
        emit_operator(&op("end", Immediate::None), &mut output).unwrap();

        assert_eq!(output, vec![0x20, 0x00, 0x41, 0x7F, 0x0B]);
    }

    #[test]
    fn emits_prefixed_opcodes() {
        let mut output = Vec::new();
        emit_operator(
            &op(
                "memory.copy",
                Immediate::MemoryCopy {
                    dest_memory_index: 0,
                    source_memory_index: 0,
                },
            ),
            &mut output,
        )
        .unwrap();

        assert_eq!(output, vec![0xFC, 10, 0x00, 0x00]);
    }

    #[test]
    fn block_types_emit_as_s33() {
        let mut output = Vec::new();
        emit_block_type(BlockType::NoResult, &mut output).unwrap();
        emit_block_type(BlockType::Value(ValueType::I32), &mut output).unwrap();
        emit_block_type(BlockType::Indexed(3), &mut output).unwrap();

        assert_eq!(output, vec![0x40, 0x7F, 0x03]);
    }

    #[test]
    fn wire_operators_round_trip_through_the_decoder() {
        let ops = vec![
            op("block", Immediate::Block(BlockType::Value(ValueType::F64))),
            op(
                "i32.load",
                Immediate::LoadStore {
                    alignment_log2: 2,
                    offset: 16,
                    memory_index: 0,
                },
            ),
            op(
                "br_table",
                Immediate::BranchTable {
                    branch_depths: vec![0, 1],
                    default_depth: 2,
                },
            ),
            op("f64.const", Immediate::F64(0x4000_0000_0000_0000)),
            op("ref.null", Immediate::RefType(ReferenceType::ExternRef)),
            op("end", Immediate::None),
        ];

        let mut output = Vec::new();
        for operator in &ops {
            emit_operator(operator, &mut output).unwrap();
        }

        let mut input = output.as_slice();
        for operator in &ops {
            let (decoded, rest) = crate::parser::code::decode_wire_operator(input).unwrap();
            assert_eq!(&decoded, operator);
            input = rest;
        }
        assert!(input.is_empty());
    }
}
