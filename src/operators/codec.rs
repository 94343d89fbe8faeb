//! The internal fixed-width encoding of validated operator streams.
//!
//! Function bodies are stored as a byte string of `(operator index, immediate)` records in this
//! encoding regardless of which pipeline produced them, so the printer and the binary encoder
//! are format-agnostic. `br_table` label vectors live out-of-line in the function's branch
//! table array; the record stores the array index.

use crate::model::{BlockType, ReferenceType, ValueType};
use crate::operators::{ImmKind, Immediate, Operator, OPERATORS};

/// Raised when an internal operator stream does not decode. Streams are only ever produced by
/// [`encode_operator`], so this indicates corruption rather than bad user input.
#[derive(Debug, thiserror::Error)]
#[error("malformed internal operator stream")]
pub struct InternalCodeError;

/// Appends one operator record to `code`. A `br_table` immediate's label vector is moved into
/// `branch_tables` and replaced by its index.
pub fn encode_operator(op: &Operator, code: &mut Vec<u8>, branch_tables: &mut Vec<Vec<u32>>) {
    code.extend_from_slice(&op.index.to_le_bytes());

    match &op.imm {
        Immediate::None | Immediate::AtomicFence => {}
        Immediate::Block(block_type) => encode_block_type(*block_type, code),
        Immediate::Branch(depth)
        | Immediate::Call(depth)
        | Immediate::FunctionRef(depth)
        | Immediate::Local(depth)
        | Immediate::Global(depth)
        | Immediate::Table(depth)
        | Immediate::Memory(depth)
        | Immediate::DataSegment(depth)
        | Immediate::ElemSegment(depth)
        | Immediate::ExceptionType(depth)
        | Immediate::CatchDepth(depth) => encode_u32(*depth, code),
        Immediate::BranchTable {
            branch_depths,
            default_depth,
        } => {
            let table_index = branch_tables.len() as u32;
            branch_tables.push(branch_depths.clone());
            encode_u32(*default_depth, code);
            encode_u32(table_index, code);
        }
        Immediate::CallIndirect {
            type_index,
            table_index,
        } => {
            encode_u32(*type_index, code);
            encode_u32(*table_index, code);
        }
        Immediate::TableCopy {
            dest_table_index,
            source_table_index,
        } => {
            encode_u32(*dest_table_index, code);
            encode_u32(*source_table_index, code);
        }
        Immediate::MemoryCopy {
            dest_memory_index,
            source_memory_index,
        } => {
            encode_u32(*dest_memory_index, code);
            encode_u32(*source_memory_index, code);
        }
        Immediate::DataSegmentAndMemory {
            data_index,
            memory_index,
        } => {
            encode_u32(*data_index, code);
            encode_u32(*memory_index, code);
        }
        Immediate::ElemSegmentAndTable {
            elem_index,
            table_index,
        } => {
            encode_u32(*elem_index, code);
            encode_u32(*table_index, code);
        }
        Immediate::LoadStore {
            alignment_log2,
            offset,
            memory_index,
        } => {
            code.push(*alignment_log2);
            code.extend_from_slice(&offset.to_le_bytes());
            encode_u32(*memory_index, code);
        }
        Immediate::LoadStoreLane {
            alignment_log2,
            offset,
            memory_index,
            lane,
        } => {
            code.push(*alignment_log2);
            code.extend_from_slice(&offset.to_le_bytes());
            encode_u32(*memory_index, code);
            code.push(*lane);
        }
        Immediate::Lane(lane) => code.push(*lane),
        Immediate::Shuffle(lanes) => code.extend_from_slice(lanes),
        Immediate::I32(value) => code.extend_from_slice(&value.to_le_bytes()),
        Immediate::I64(value) => code.extend_from_slice(&value.to_le_bytes()),
        Immediate::F32(bits) => code.extend_from_slice(&bits.to_le_bytes()),
        Immediate::F64(bits) => code.extend_from_slice(&bits.to_le_bytes()),
        Immediate::V128(bytes) => code.extend_from_slice(bytes),
        Immediate::RefType(kind) => code.push(ValueType::from(*kind).binary_code()),
        Immediate::TypedSelect(kind) => code.push(kind.binary_code()),
    }
}

fn encode_u32(value: u32, code: &mut Vec<u8>) {
    code.extend_from_slice(&value.to_le_bytes());
}

fn encode_block_type(block_type: BlockType, code: &mut Vec<u8>) {
    match block_type {
        BlockType::NoResult => code.push(0),
        BlockType::Value(kind) => {
            code.push(1);
            code.push(kind.binary_code());
        }
        BlockType::Indexed(type_index) => {
            code.push(2);
            encode_u32(type_index, code);
        }
    }
}

/// Decodes the operator record at the front of `code`, returning it and the remaining bytes.
pub fn decode_operator<'code>(
    code: &'code [u8],
    branch_tables: &[Vec<u32>],
) -> Result<(Operator, &'code [u8]), InternalCodeError> {
    let (index_bytes, code) = split(code, 2)?;
    let index = u16::from_le_bytes([index_bytes[0], index_bytes[1]]);
    let info = OPERATORS.get(index as usize).ok_or(InternalCodeError)?;

    let (imm, code) = match info.imm {
        ImmKind::None | ImmKind::AtomicFence => {
            let imm = if info.imm == ImmKind::AtomicFence {
                Immediate::AtomicFence
            } else {
                Immediate::None
            };
            (imm, code)
        }
        ImmKind::Block => {
            let (tag, code) = split(code, 1)?;
            match tag[0] {
                0 => (Immediate::Block(BlockType::NoResult), code),
                1 => {
                    let (kind, code) = split(code, 1)?;
                    let kind = ValueType::from_binary_code(kind[0]).ok_or(InternalCodeError)?;
                    (Immediate::Block(BlockType::Value(kind)), code)
                }
                2 => {
                    let (type_index, code) = decode_u32(code)?;
                    (Immediate::Block(BlockType::Indexed(type_index)), code)
                }
                _ => return Err(InternalCodeError),
            }
        }
        ImmKind::Branch => decode_index(code, Immediate::Branch)?,
        ImmKind::Call => decode_index(code, Immediate::Call)?,
        ImmKind::FunctionRef => decode_index(code, Immediate::FunctionRef)?,
        ImmKind::Local => decode_index(code, Immediate::Local)?,
        ImmKind::Global => decode_index(code, Immediate::Global)?,
        ImmKind::Table => decode_index(code, Immediate::Table)?,
        ImmKind::Memory => decode_index(code, Immediate::Memory)?,
        ImmKind::DataSegment => decode_index(code, Immediate::DataSegment)?,
        ImmKind::ElemSegment => decode_index(code, Immediate::ElemSegment)?,
        ImmKind::ExceptionType => decode_index(code, Immediate::ExceptionType)?,
        ImmKind::CatchDepth => decode_index(code, Immediate::CatchDepth)?,
        ImmKind::BranchTable => {
            let (default_depth, code) = decode_u32(code)?;
            let (table_index, code) = decode_u32(code)?;
            let branch_depths = branch_tables
                .get(table_index as usize)
                .ok_or(InternalCodeError)?
                .clone();
            (
                Immediate::BranchTable {
                    branch_depths,
                    default_depth,
                },
                code,
            )
        }
        ImmKind::CallIndirect => {
            let (type_index, code) = decode_u32(code)?;
            let (table_index, code) = decode_u32(code)?;
            (
                Immediate::CallIndirect {
                    type_index,
                    table_index,
                },
                code,
            )
        }
        ImmKind::TableCopy => {
            let (dest_table_index, code) = decode_u32(code)?;
            let (source_table_index, code) = decode_u32(code)?;
            (
                Immediate::TableCopy {
                    dest_table_index,
                    source_table_index,
                },
                code,
            )
        }
        ImmKind::MemoryCopy => {
            let (dest_memory_index, code) = decode_u32(code)?;
            let (source_memory_index, code) = decode_u32(code)?;
            (
                Immediate::MemoryCopy {
                    dest_memory_index,
                    source_memory_index,
                },
                code,
            )
        }
        ImmKind::DataSegmentAndMemory => {
            let (data_index, code) = decode_u32(code)?;
            let (memory_index, code) = decode_u32(code)?;
            (
                Immediate::DataSegmentAndMemory {
                    data_index,
                    memory_index,
                },
                code,
            )
        }
        ImmKind::ElemSegmentAndTable => {
            let (elem_index, code) = decode_u32(code)?;
            let (table_index, code) = decode_u32(code)?;
            (
                Immediate::ElemSegmentAndTable {
                    elem_index,
                    table_index,
                },
                code,
            )
        }
        ImmKind::LoadStore | ImmKind::AtomicLoadStore => {
            let (alignment, code) = split(code, 1)?;
            let (offset_bytes, code) = split(code, 8)?;
            let (memory_index, code) = decode_u32(code)?;
            (
                Immediate::LoadStore {
                    alignment_log2: alignment[0],
                    offset: u64::from_le_bytes(offset_bytes.try_into().unwrap()),
                    memory_index,
                },
                code,
            )
        }
        ImmKind::LoadStoreLane8
        | ImmKind::LoadStoreLane16
        | ImmKind::LoadStoreLane32
        | ImmKind::LoadStoreLane64 => {
            let (alignment, code) = split(code, 1)?;
            let (offset_bytes, code) = split(code, 8)?;
            let (memory_index, code) = decode_u32(code)?;
            let (lane, code) = split(code, 1)?;
            (
                Immediate::LoadStoreLane {
                    alignment_log2: alignment[0],
                    offset: u64::from_le_bytes(offset_bytes.try_into().unwrap()),
                    memory_index,
                    lane: lane[0],
                },
                code,
            )
        }
        ImmKind::Lane2 | ImmKind::Lane4 | ImmKind::Lane8 | ImmKind::Lane16 => {
            let (lane, code) = split(code, 1)?;
            (Immediate::Lane(lane[0]), code)
        }
        ImmKind::Shuffle => {
            let (lanes, code) = split(code, 16)?;
            (Immediate::Shuffle(lanes.try_into().unwrap()), code)
        }
        ImmKind::I32 => {
            let (bytes, code) = split(code, 4)?;
            (Immediate::I32(i32::from_le_bytes(bytes.try_into().unwrap())), code)
        }
        ImmKind::I64 => {
            let (bytes, code) = split(code, 8)?;
            (Immediate::I64(i64::from_le_bytes(bytes.try_into().unwrap())), code)
        }
        ImmKind::F32 => {
            let (bytes, code) = split(code, 4)?;
            (Immediate::F32(u32::from_le_bytes(bytes.try_into().unwrap())), code)
        }
        ImmKind::F64 => {
            let (bytes, code) = split(code, 8)?;
            (Immediate::F64(u64::from_le_bytes(bytes.try_into().unwrap())), code)
        }
        ImmKind::V128 => {
            let (bytes, code) = split(code, 16)?;
            (Immediate::V128(bytes.try_into().unwrap()), code)
        }
        ImmKind::RefType => {
            let (kind, code) = split(code, 1)?;
            let kind = ValueType::from_binary_code(kind[0])
                .and_then(|v| ReferenceType::try_from(v).ok())
                .ok_or(InternalCodeError)?;
            (Immediate::RefType(kind), code)
        }
        ImmKind::TypedSelect => {
            let (kind, code) = split(code, 1)?;
            let kind = ValueType::from_binary_code(kind[0]).ok_or(InternalCodeError)?;
            (Immediate::TypedSelect(kind), code)
        }
    };

    Ok((Operator { index, imm }, code))
}

fn split(code: &[u8], len: usize) -> Result<(&[u8], &[u8]), InternalCodeError> {
    if code.len() < len {
        Err(InternalCodeError)
    } else {
        Ok(code.split_at(len))
    }
}

fn decode_u32(code: &[u8]) -> Result<(u32, &[u8]), InternalCodeError> {
    let (bytes, code) = split(code, 4)?;
    Ok((u32::from_le_bytes(bytes.try_into().unwrap()), code))
}

fn decode_index(
    code: &[u8],
    build: fn(u32) -> Immediate,
) -> Result<(Immediate, &[u8]), InternalCodeError> {
    let (value, code) = decode_u32(code)?;
    Ok((build(value), code))
}

/// Iterates the operator records of an internal code byte string.
pub struct CodeReader<'def> {
    code: &'def [u8],
    branch_tables: &'def [Vec<u32>],
}

impl<'def> CodeReader<'def> {
    pub fn new(code: &'def [u8], branch_tables: &'def [Vec<u32>]) -> Self {
        CodeReader {
            code,
            branch_tables,
        }
    }
}

impl Iterator for CodeReader<'_> {
    type Item = Result<Operator, InternalCodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.code.is_empty() {
            return None;
        }
        match decode_operator(self.code, self.branch_tables) {
            Ok((op, rest)) => {
                self.code = rest;
                Some(Ok(op))
            }
            Err(error) => {
                // Stop after reporting corruption once.
                self.code = &[];
                Some(Err(error))
            }
        }
    }
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
    fn round_trips_every_immediate_shape() {
        let ops = vec![
            op("nop", Immediate::None),
            op("block", Immediate::Block(BlockType::Value(ValueType::I32))),
            op("br", Immediate::Branch(2)),
            op(
                "br_table",
                Immediate::BranchTable {
                    branch_depths: vec![0, 1, 2],
                    default_depth: 3,
                },
            ),
            op(
                "call_indirect",
                Immediate::CallIndirect {
                    type_index: 4,
                    table_index: 0,
                },
            ),
            op(
                "i32.load",
                Immediate::LoadStore {
                    alignment_log2: 2,
                    offset: 1024,
                    memory_index: 0,
                },
            ),
            op("i64.const", Immediate::I64(-5)),
            op("f64.const", Immediate::F64(0x7FF8_0000_0000_0001)),
            op("v128.const", Immediate::V128([7; 16])),
            op("i8x16.shuffle", Immediate::Shuffle([1; 16])),
            op("ref.null", Immediate::RefType(ReferenceType::ExternRef)),
            op(
                "v128.load8_lane",
                Immediate::LoadStoreLane {
                    alignment_log2: 0,
                    offset: 8,
                    memory_index: 0,
                    lane: 15,
                },
            ),
        ];

        let mut code = Vec::new();
        let mut branch_tables = Vec::new();
        for op in &ops {
            encode_operator(op, &mut code, &mut branch_tables);
        }

        let decoded: Vec<Operator> = CodeReader::new(&code, &branch_tables)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(decoded, ops);
        assert_eq!(branch_tables.len(), 1);
        assert_eq!(branch_tables[0], vec![0, 1, 2]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut code = Vec::new();
        let mut branch_tables = Vec::new();
        encode_operator(&op("i32.const", Immediate::I32(1)), &mut code, &mut branch_tables);
        code.pop();

        let result: Result<Vec<Operator>, _> = CodeReader::new(&code, &branch_tables).collect();

        assert!(result.is_err());
    }
}
