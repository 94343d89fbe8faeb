//! Decoding of wire operator streams: initializer expressions and function bodies.
//!
//! Each decoded operator is re-encoded through the validating sink, so the in-memory layout of
//! a decoded function body is identical to one produced by the text pipeline.

use crate::leb128;
use crate::model::{BlockType, FunctionType, InitializerExpression, Module, ReferenceType, ValueType};
use crate::operators::{
    operator_index_by_opcode, ImmKind, Immediate, Opcode, Operator, OperatorEncoder,
    OperatorSink, OPERATORS,
};
use crate::parser::LoadError;
use crate::validate::{CodeValidator, ValidatingSink};

fn malformed(message: impl Into<String>) -> LoadError {
    LoadError::Malformed(message.into())
}

fn take<'input>(input: &'input [u8], length: usize) -> Result<(&'input [u8], &'input [u8]), LoadError> {
    if input.len() < length {
        return Err(malformed("unexpected end of code"));
    }
    Ok(input.split_at(length))
}

pub(crate) fn read_byte(input: &[u8]) -> Result<(u8, &[u8]), LoadError> {
    let (byte, rest) = take(input, 1)?;
    Ok((byte[0], rest))
}

pub(crate) fn read_u32(input: &[u8]) -> Result<(u32, &[u8]), LoadError> {
    leb128::parse_unsigned(input)
        .map(|(rest, value)| (value, rest))
        .map_err(|error| malformed(error.to_string()))
}

fn read_u64(input: &[u8]) -> Result<(u64, &[u8]), LoadError> {
    leb128::parse_unsigned(input)
        .map(|(rest, value)| (value, rest))
        .map_err(|error| malformed(error.to_string()))
}

fn read_s32(input: &[u8]) -> Result<(i32, &[u8]), LoadError> {
    leb128::parse_signed(input)
        .map(|(rest, value)| (value, rest))
        .map_err(|error| malformed(error.to_string()))
}

fn read_s64(input: &[u8]) -> Result<(i64, &[u8]), LoadError> {
    leb128::parse_signed(input)
        .map(|(rest, value)| (value, rest))
        .map_err(|error| malformed(error.to_string()))
}

fn read_value_type(input: &[u8]) -> Result<(ValueType, &[u8]), LoadError> {
    let (byte, rest) = read_byte(input)?;
    ValueType::from_binary_code(byte)
        .map(|kind| (kind, rest))
        .ok_or_else(|| malformed(format!("invalid value type byte {byte:#04x}")))
}

pub(crate) fn read_reference_type(input: &[u8]) -> Result<(ReferenceType, &[u8]), LoadError> {
    let (kind, rest) = read_value_type(input)?;
    ReferenceType::try_from(kind)
        .map(|kind| (kind, rest))
        .map_err(|()| malformed("expected a reference type"))
}

fn read_block_type(input: &[u8]) -> Result<(BlockType, &[u8]), LoadError> {
    let (value, rest) = leb128::parse_s33(input)
        .map(|(rest, value)| (value, rest))
        .map_err(|error| malformed(error.to_string()))?;
    if value >= 0 {
        return Ok((BlockType::Indexed(value as u32), rest));
    }
    if value == -64 {
        return Ok((BlockType::NoResult, rest));
    }
    // Negative one-byte encodings are the value types.
    let byte = (value + 0x80) as u8;
    ValueType::from_binary_code(byte)
        .map(|kind| (BlockType::Value(kind), rest))
        .ok_or_else(|| malformed(format!("invalid block type {value}")))
}

/// A memarg: the alignment (log2) with the multi-memory flag bit, then the offset and the
/// optional memory index.
fn read_memarg(input: &[u8]) -> Result<((u8, u64, u32), &[u8]), LoadError> {
    let (mut align, input) = read_u32(input)?;
    let (memory_index, input) = if align & 0x40 != 0 {
        align &= !0x40;
        read_u32(input)?
    } else {
        (0, input)
    };
    if align > 63 {
        return Err(malformed("alignment exponent is out of range"));
    }
    let (offset, input) = read_u64(input)?;
    Ok(((align as u8, offset, memory_index), input))
}

/// Decodes the opcode and immediates of one operator.
pub(crate) fn decode_wire_operator(input: &[u8]) -> Result<(Operator, &[u8]), LoadError> {
    let (first, rest) = read_byte(input)?;
    let (opcode, rest) = if matches!(first, 0xFC | 0xFD | 0xFE) {
        let (sub, rest) = read_u32(rest)?;
        (
            Opcode {
                prefix: first,
                code: sub,
            },
            rest,
        )
    } else {
        (
            Opcode {
                prefix: 0,
                code: u32::from(first),
            },
            rest,
        )
    };

    let index = operator_index_by_opcode(opcode)
        .ok_or_else(|| malformed(format!("unknown opcode {:#04x}/{}", opcode.prefix, opcode.code)))?;
    let info = &OPERATORS[index as usize];

    let (imm, rest) = match info.imm {
        ImmKind::None => (Immediate::None, rest),
        ImmKind::AtomicFence => {
            let (reserved, rest) = read_byte(rest)?;
            if reserved != 0 {
                return Err(malformed("atomic.fence reserved byte must be zero"));
            }
            (Immediate::AtomicFence, rest)
        }
        ImmKind::Block => {
            let (block_type, rest) = read_block_type(rest)?;
            (Immediate::Block(block_type), rest)
        }
        ImmKind::Branch => {
            let (depth, rest) = read_u32(rest)?;
            (Immediate::Branch(depth), rest)
        }
        ImmKind::CatchDepth => {
            let (depth, rest) = read_u32(rest)?;
            (Immediate::CatchDepth(depth), rest)
        }
        ImmKind::BranchTable => {
            let (count, mut rest) = read_u32(rest)?;
            let mut branch_depths = Vec::with_capacity((count as usize).min(1 << 16));
            for _ in 0..count {
                let (depth, next) = read_u32(rest)?;
                branch_depths.push(depth);
                rest = next;
            }
            let (default_depth, rest) = read_u32(rest)?;
            (
                Immediate::BranchTable {
                    branch_depths,
                    default_depth,
                },
                rest,
            )
        }
        ImmKind::Call => {
            let (function_index, rest) = read_u32(rest)?;
            (Immediate::Call(function_index), rest)
        }
        ImmKind::CallIndirect => {
            let (type_index, rest) = read_u32(rest)?;
            let (table_index, rest) = read_u32(rest)?;
            (
                Immediate::CallIndirect {
                    type_index,
                    table_index,
                },
                rest,
            )
        }
        ImmKind::FunctionRef => {
            let (function_index, rest) = read_u32(rest)?;
            (Immediate::FunctionRef(function_index), rest)
        }
        ImmKind::Local => {
            let (local_index, rest) = read_u32(rest)?;
            (Immediate::Local(local_index), rest)
        }
        ImmKind::Global => {
            let (global_index, rest) = read_u32(rest)?;
            (Immediate::Global(global_index), rest)
        }
        ImmKind::Table => {
            let (table_index, rest) = read_u32(rest)?;
            (Immediate::Table(table_index), rest)
        }
        ImmKind::TableCopy => {
            let (dest_table_index, rest) = read_u32(rest)?;
            let (source_table_index, rest) = read_u32(rest)?;
            (
                Immediate::TableCopy {
                    dest_table_index,
                    source_table_index,
                },
                rest,
            )
        }
        ImmKind::Memory => {
            let (memory_index, rest) = read_u32(rest)?;
            (Immediate::Memory(memory_index), rest)
        }
        ImmKind::MemoryCopy => {
            let (dest_memory_index, rest) = read_u32(rest)?;
            let (source_memory_index, rest) = read_u32(rest)?;
            (
                Immediate::MemoryCopy {
                    dest_memory_index,
                    source_memory_index,
                },
                rest,
            )
        }
        ImmKind::DataSegment => {
            let (data_index, rest) = read_u32(rest)?;
            (Immediate::DataSegment(data_index), rest)
        }
        ImmKind::DataSegmentAndMemory => {
            let (data_index, rest) = read_u32(rest)?;
            let (memory_index, rest) = read_u32(rest)?;
            (
                Immediate::DataSegmentAndMemory {
                    data_index,
                    memory_index,
                },
                rest,
            )
        }
        ImmKind::ElemSegment => {
            let (elem_index, rest) = read_u32(rest)?;
            (Immediate::ElemSegment(elem_index), rest)
        }
        ImmKind::ElemSegmentAndTable => {
            let (elem_index, rest) = read_u32(rest)?;
            let (table_index, rest) = read_u32(rest)?;
            (
                Immediate::ElemSegmentAndTable {
                    elem_index,
                    table_index,
                },
                rest,
            )
        }
        ImmKind::LoadStore | ImmKind::AtomicLoadStore => {
            let ((alignment_log2, offset, memory_index), rest) = read_memarg(rest)?;
            (
                Immediate::LoadStore {
                    alignment_log2,
                    offset,
                    memory_index,
                },
                rest,
            )
        }
        ImmKind::LoadStoreLane8
        | ImmKind::LoadStoreLane16
        | ImmKind::LoadStoreLane32
        | ImmKind::LoadStoreLane64 => {
            let ((alignment_log2, offset, memory_index), rest) = read_memarg(rest)?;
            let (lane, rest) = read_byte(rest)?;
            (
                Immediate::LoadStoreLane {
                    alignment_log2,
                    offset,
                    memory_index,
                    lane,
                },
                rest,
            )
        }
        ImmKind::Lane2 | ImmKind::Lane4 | ImmKind::Lane8 | ImmKind::Lane16 => {
            let (lane, rest) = read_byte(rest)?;
            (Immediate::Lane(lane), rest)
        }
        ImmKind::Shuffle => {
            let (lanes, rest) = take(rest, 16)?;
            (Immediate::Shuffle(lanes.try_into().unwrap()), rest)
        }
        ImmKind::I32 => {
            let (value, rest) = read_s32(rest)?;
            (Immediate::I32(value), rest)
        }
        ImmKind::I64 => {
            let (value, rest) = read_s64(rest)?;
            (Immediate::I64(value), rest)
        }
        ImmKind::F32 => {
            let (bytes, rest) = take(rest, 4)?;
            (
                Immediate::F32(u32::from_le_bytes(bytes.try_into().unwrap())),
                rest,
            )
        }
        ImmKind::F64 => {
            let (bytes, rest) = take(rest, 8)?;
            (
                Immediate::F64(u64::from_le_bytes(bytes.try_into().unwrap())),
                rest,
            )
        }
        ImmKind::V128 => {
            let (bytes, rest) = take(rest, 16)?;
            (Immediate::V128(bytes.try_into().unwrap()), rest)
        }
        ImmKind::RefType => {
            let (kind, rest) = read_reference_type(rest)?;
            (Immediate::RefType(kind), rest)
        }
        ImmKind::TypedSelect => {
            let (count, rest) = read_u32(rest)?;
            if count != 1 {
                return Err(malformed("typed select must name exactly one result type"));
            }
            let (kind, rest) = read_value_type(rest)?;
            (Immediate::TypedSelect(kind), rest)
        }
        ImmKind::ExceptionType => {
            let (exception_index, rest) = read_u32(rest)?;
            (Immediate::ExceptionType(exception_index), rest)
        }
    };

    Ok((Operator { index, imm }, rest))
}

/// Decodes an initializer expression: one constant-form operator followed by `end`. Only the
/// restricted grammar is legal.
pub(crate) fn decode_initializer(input: &[u8]) -> Result<(InitializerExpression, &[u8]), LoadError> {
    let (op, rest) = decode_wire_operator(input)?;
    let expression = match (op.info().mnemonic, op.imm) {
        ("i32.const", Immediate::I32(value)) => InitializerExpression::I32Const(value),
        ("i64.const", Immediate::I64(value)) => InitializerExpression::I64Const(value),
        ("f32.const", Immediate::F32(bits)) => InitializerExpression::F32Const(bits),
        ("f64.const", Immediate::F64(bits)) => InitializerExpression::F64Const(bits),
        ("v128.const", Immediate::V128(bytes)) => InitializerExpression::V128Const(bytes),
        ("global.get", Immediate::Global(index)) => InitializerExpression::GlobalGet(index),
        ("ref.null", Immediate::RefType(kind)) => InitializerExpression::RefNull(kind),
        ("ref.func", Immediate::FunctionRef(index)) => InitializerExpression::RefFunc(index),
        (mnemonic, _) => {
            return Err(LoadError::Invalid(format!(
                "'{mnemonic}' is not a legal initializer expression"
            )))
        }
    };

    let (end, rest) = decode_wire_operator(rest)?;
    if end.info().mnemonic != "end" {
        return Err(malformed("initializer expression is missing its 'end'"));
    }
    Ok((expression, rest))
}

/// Decodes one function body: the local declarations, then the operator stream, which is
/// validated and re-encoded into the internal layout.
pub(crate) fn decode_function_body(
    module: &Module,
    function_type: &FunctionType,
    declared_data_count: Option<u32>,
    body: &[u8],
) -> Result<(Vec<ValueType>, Vec<u8>, Vec<Vec<u32>>), LoadError> {
    // Locals: a vector of (count, type) runs.
    let (num_runs, mut input) = read_u32(body)?;
    let mut locals = Vec::new();
    for _ in 0..num_runs {
        let (count, rest) = read_u32(input)?;
        let (kind, rest) = read_value_type(rest)?;
        if locals.len() + count as usize
            > module.feature_spec.max_locals + function_type.parameters().len()
        {
            return Err(LoadError::Invalid("too many locals".to_string()));
        }
        locals.extend(std::iter::repeat(kind).take(count as usize));
        input = rest;
    }

    let all_locals: Vec<ValueType> = function_type
        .parameters()
        .kinds()
        .iter()
        .copied()
        .chain(locals.iter().copied())
        .collect();

    let validator = CodeValidator::new(module, function_type, &all_locals)
        .with_declared_data_count(declared_data_count);
    let mut sink = ValidatingSink::new(validator, OperatorEncoder::new());

    let mut depth = 1usize;
    let mut num_labels = 0usize;
    while depth > 0 {
        let (op, rest) = decode_wire_operator(input)?;
        input = rest;
        match op.info().mnemonic {
            "block" | "loop" | "if" | "try" => {
                depth += 1;
                num_labels += 1;
                if num_labels > module.feature_spec.max_labels_per_function {
                    return Err(LoadError::Invalid("too many labels".to_string()));
                }
            }
            "end" => depth -= 1,
            _ => {}
        }
        sink.operator(op)
            .map_err(|error| LoadError::Invalid(error.to_string()))?;
    }

    if !input.is_empty() {
        return Err(malformed("trailing bytes after a function body"));
    }

    let (code, branch_tables) = sink.into_inner().finish();
    Ok((locals, code, branch_tables))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_operators() {
        // i32.const 5; i32.const -1; i32.add
        let bytes = [0x41, 0x05, 0x41, 0x7F, 0x6A];

        let (op, rest) = decode_wire_operator(&bytes).unwrap();
        assert_eq!(op.info().mnemonic, "i32.const");
        assert_eq!(op.imm, Immediate::I32(5));

        let (op, rest) = decode_wire_operator(rest).unwrap();
        assert_eq!(op.imm, Immediate::I32(-1));

        let (op, rest) = decode_wire_operator(rest).unwrap();
        assert_eq!(op.info().mnemonic, "i32.add");
        assert!(rest.is_empty());
    }

    #[test]
    fn decodes_prefixed_operators() {
        // memory.copy 0 0
        let bytes = [0xFC, 10, 0x00, 0x00];
        let (op, _) = decode_wire_operator(&bytes).unwrap();

        assert_eq!(op.info().mnemonic, "memory.copy");
    }

    #[test]
    fn unknown_opcodes_are_malformed() {
        assert!(matches!(
            decode_wire_operator(&[0xFF]),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn block_types_decode() {
        // block (result i32) end
        let bytes = [0x02, 0x7F, 0x0B];
        let (op, _) = decode_wire_operator(&bytes).unwrap();

        assert_eq!(op.imm, Immediate::Block(BlockType::Value(ValueType::I32)));
    }

    #[test]
    fn memarg_with_memory_flag() {
        // i32.load align=4(log2 2)|0x40 memory=1 offset=8
        let bytes = [0x28, 0x42, 0x01, 0x08];
        let (op, _) = decode_wire_operator(&bytes).unwrap();

        assert_eq!(
            op.imm,
            Immediate::LoadStore {
                alignment_log2: 2,
                offset: 8,
                memory_index: 1,
            }
        );
    }

    #[test]
    fn initializers_reject_general_code() {
        // i32.add is not part of the initializer grammar.
        let bytes = [0x6A, 0x0B];
        assert!(matches!(
            decode_initializer(&bytes),
            Err(LoadError::Invalid(_))
        ));
    }

    #[test]
    fn initializers_decode() {
        let bytes = [0x41, 0x2A, 0x0B];
        let (expression, rest) = decode_initializer(&bytes).unwrap();

        assert_eq!(expression, InitializerExpression::I32Const(42));
        assert!(rest.is_empty());
    }
}
