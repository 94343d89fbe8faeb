//! The authoritative WebAssembly operator table and the operator stream plumbing built on it.
//!
//! Every consumer of operators — the text lexer's keyword list, the text parser's dispatch,
//! the binary decoder, the binary encoder, the validator, and the printer — iterates the one
//! table declared in [`table`], so the operator set and its byte encodings agree everywhere by
//! construction.

pub mod codec;
mod sink;
pub mod table;

pub use codec::{decode_operator, encode_operator, CodeReader};
pub use sink::{OperatorEncoder, OperatorSink};
pub use table::OPERATORS;

use crate::features::Feature;
use crate::model::{BlockType, ReferenceType, ValueType};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The wire opcode of an operator: an optional prefix byte followed by a (possibly
/// LEB128-encoded) opcode value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Opcode {
    /// The prefix byte (0xFC, 0xFD, or 0xFE), or zero for single-byte opcodes.
    pub prefix: u8,
    pub code: u32,
}

/// The kind of immediate an operator carries, used to drive immediate parsing, encoding, and
/// decoding from the table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImmKind {
    None,
    Block,
    Branch,
    BranchTable,
    Call,
    CallIndirect,
    FunctionRef,
    Local,
    Global,
    Table,
    TableCopy,
    Memory,
    MemoryCopy,
    DataSegment,
    DataSegmentAndMemory,
    ElemSegment,
    ElemSegmentAndTable,
    LoadStore,
    AtomicLoadStore,
    AtomicFence,
    /// A lane index into a vector with the given lane count.
    Lane2,
    Lane4,
    Lane8,
    Lane16,
    /// A memarg plus a lane index; the suffix is the lane width in bits.
    LoadStoreLane8,
    LoadStoreLane16,
    LoadStoreLane32,
    LoadStoreLane64,
    Shuffle,
    I32,
    I64,
    F32,
    F64,
    V128,
    RefType,
    TypedSelect,
    ExceptionType,
    CatchDepth,
}

impl ImmKind {
    /// The number of lanes addressed by a lane-index immediate, if this is one.
    pub fn lane_count(self) -> Option<u8> {
        match self {
            ImmKind::Lane2 | ImmKind::LoadStoreLane64 => Some(2),
            ImmKind::Lane4 | ImmKind::LoadStoreLane32 => Some(4),
            ImmKind::Lane8 | ImmKind::LoadStoreLane16 => Some(8),
            ImmKind::Lane16 | ImmKind::LoadStoreLane8 => Some(16),
            ImmKind::Shuffle => Some(16),
            _ => None,
        }
    }

    /// Whether this immediate kind addresses a memory through a memarg.
    pub fn is_load_store(self) -> bool {
        matches!(
            self,
            ImmKind::LoadStore
                | ImmKind::AtomicLoadStore
                | ImmKind::LoadStoreLane8
                | ImmKind::LoadStoreLane16
                | ImmKind::LoadStoreLane32
                | ImmKind::LoadStoreLane64
        )
    }
}

/// An operator's immediate values, decoded from either format.
#[derive(Clone, Debug, PartialEq)]
pub enum Immediate {
    None,
    Block(BlockType),
    Branch(u32),
    BranchTable {
        branch_depths: Vec<u32>,
        default_depth: u32,
    },
    Call(u32),
    CallIndirect {
        type_index: u32,
        table_index: u32,
    },
    FunctionRef(u32),
    Local(u32),
    Global(u32),
    Table(u32),
    TableCopy {
        dest_table_index: u32,
        source_table_index: u32,
    },
    Memory(u32),
    MemoryCopy {
        dest_memory_index: u32,
        source_memory_index: u32,
    },
    DataSegment(u32),
    DataSegmentAndMemory {
        data_index: u32,
        memory_index: u32,
    },
    ElemSegment(u32),
    ElemSegmentAndTable {
        elem_index: u32,
        table_index: u32,
    },
    LoadStore {
        alignment_log2: u8,
        offset: u64,
        memory_index: u32,
    },
    AtomicFence,
    Lane(u8),
    LoadStoreLane {
        alignment_log2: u8,
        offset: u64,
        memory_index: u32,
        lane: u8,
    },
    Shuffle([u8; 16]),
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    V128([u8; 16]),
    RefType(ReferenceType),
    TypedSelect(ValueType),
    ExceptionType(u32),
    CatchDepth(u32),
}

/// The stack signature of an operator.
///
/// `Fixed` signatures list operand types popped (right-to-left) and result types pushed.
/// `Special` operators — control flow, branches, calls, variable access, and the other
/// context-dependent forms — are typed by the validator from their immediates instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signature {
    Fixed {
        params: &'static [ValueType],
        results: &'static [ValueType],
    },
    Special,
}

/// One row of the authoritative operator table.
#[derive(Copy, Clone, Debug)]
pub struct OperatorInfo {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub imm: ImmKind,
    pub sig: Signature,
    pub feature: Feature,
}

/// An operator together with its decoded immediates. The `index` identifies the row of
/// [`OPERATORS`] describing it.
#[derive(Clone, Debug, PartialEq)]
pub struct Operator {
    pub index: u16,
    pub imm: Immediate,
}

impl Operator {
    /// The table row describing this operator.
    pub fn info(&self) -> &'static OperatorInfo {
        &OPERATORS[self.index as usize]
    }

    /// Builds an operator from its text mnemonic, for operators without immediates.
    pub fn named(mnemonic: &str) -> Option<Operator> {
        operator_index_by_mnemonic(mnemonic).map(|index| Operator {
            index,
            imm: Immediate::None,
        })
    }
}

/// The natural alignment (log2 of the access width in bytes) of a memory-access operator,
/// derived from its mnemonic. The text parser uses it as the default `align=` value and the
/// validator as the upper bound (exact bound, for atomics).
pub fn natural_alignment_log2(mnemonic: &str) -> u8 {
    if mnemonic.contains("8x8") || mnemonic.contains("16x4") || mnemonic.contains("32x2") {
        3
    } else if mnemonic.contains("load8") || mnemonic.contains("store8") || mnemonic.contains("rmw8.")
    {
        0
    } else if mnemonic.contains("load16") || mnemonic.contains("store16") || mnemonic.contains("rmw16.")
    {
        1
    } else if mnemonic.contains("load32")
        || mnemonic.contains("store32")
        || mnemonic.contains("rmw32.")
        || mnemonic.contains("wait32")
        || mnemonic.ends_with("notify")
    {
        2
    } else if mnemonic.contains("load64") || mnemonic.contains("store64") || mnemonic.contains("wait64")
    {
        3
    } else if mnemonic.starts_with("v128") {
        4
    } else if mnemonic.starts_with("i64") || mnemonic.starts_with("f64") {
        3
    } else {
        2
    }
}

/// Looks up an operator's table index by its text mnemonic.
pub fn operator_index_by_mnemonic(mnemonic: &str) -> Option<u16> {
    static MNEMONIC_TO_INDEX: Lazy<HashMap<&'static str, u16>> = Lazy::new(|| {
        OPERATORS
            .iter()
            .enumerate()
            .map(|(index, info)| (info.mnemonic, index as u16))
            .collect()
    });
    MNEMONIC_TO_INDEX.get(mnemonic).copied()
}

/// Looks up an operator's table index by its wire opcode.
pub fn operator_index_by_opcode(opcode: Opcode) -> Option<u16> {
    static OPCODE_TO_INDEX: Lazy<HashMap<Opcode, u16>> = Lazy::new(|| {
        OPERATORS
            .iter()
            .enumerate()
            .map(|(index, info)| (info.opcode, index as u16))
            .collect()
    });
    OPCODE_TO_INDEX.get(&opcode).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = HashMap::new();
        for info in OPERATORS.iter() {
            assert!(
                seen.insert(info.mnemonic, info.opcode).is_none(),
                "duplicate mnemonic {}",
                info.mnemonic
            );
        }
    }

    #[test]
    fn opcodes_are_unique() {
        let mut seen = HashMap::new();
        for info in OPERATORS.iter() {
            assert!(
                seen.insert(info.opcode, info.mnemonic).is_none(),
                "duplicate opcode {:?} ({})",
                info.opcode,
                info.mnemonic
            );
        }
    }

    #[test]
    fn table_fits_in_token_space() {
        assert!(OPERATORS.len() < u16::MAX as usize);
    }

    #[test]
    fn lookups_agree_with_the_table() {
        for (index, info) in OPERATORS.iter().enumerate() {
            assert_eq!(
                operator_index_by_mnemonic(info.mnemonic),
                Some(index as u16)
            );
            assert_eq!(operator_index_by_opcode(info.opcode), Some(index as u16));
        }
    }

    #[test]
    fn named_operator_lookup() {
        let op = Operator::named("unreachable").unwrap();

        assert_eq!(op.info().mnemonic, "unreachable");
        assert_eq!(op.info().opcode, Opcode { prefix: 0, code: 0 });
    }
}
