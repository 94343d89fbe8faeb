//! The authoritative operator table.
//!
//! One row per operator: wire opcode, text mnemonic, immediate kind, stack signature, and the
//! feature proposal the operator belongs to. The lexer keyword list, the text parser dispatch,
//! the binary codec, the validator, and the printer are all generated from this declaration.
//!
//! For operators that address a memory, the first `I32` parameter is the address operand; the
//! validator substitutes the addressed memory's index type for it, so 64-bit memories
//! type-check without separate table rows.

use crate::features::Feature;
use crate::model::ValueType;
use crate::operators::{ImmKind, Opcode, OperatorInfo, Signature};

macro_rules! op {
    ($prefix:expr, $code:expr, $mnemonic:expr, $imm:ident, $feature:ident, special) => {
        OperatorInfo {
            opcode: Opcode {
                prefix: $prefix,
                code: $code,
            },
            mnemonic: $mnemonic,
            imm: ImmKind::$imm,
            sig: Signature::Special,
            feature: Feature::$feature,
        }
    };
    ($prefix:expr, $code:expr, $mnemonic:expr, $imm:ident, $feature:ident,
     [$($param:ident),*] -> [$($result:ident),*]) => {
        OperatorInfo {
            opcode: Opcode {
                prefix: $prefix,
                code: $code,
            },
            mnemonic: $mnemonic,
            imm: ImmKind::$imm,
            sig: Signature::Fixed {
                params: &[$(ValueType::$param),*],
                results: &[$(ValueType::$result),*],
            },
            feature: Feature::$feature,
        }
    };
}

/// The operator table. Order is insignificant except that a row's position is the operator's
/// stable internal index, used in token values and the internal code encoding.
pub static OPERATORS: &[OperatorInfo] = &[
    // Control instructions.
    op!(0, 0x00, "unreachable", None, Mvp, special),
    op!(0, 0x01, "nop", None, Mvp, [] -> []),
    op!(0, 0x02, "block", Block, Mvp, special),
    op!(0, 0x03, "loop", Block, Mvp, special),
    op!(0, 0x04, "if", Block, Mvp, special),
    op!(0, 0x05, "else", None, Mvp, special),
    op!(0, 0x06, "try", Block, ExceptionHandling, special),
    op!(0, 0x07, "catch", ExceptionType, ExceptionHandling, special),
    op!(0, 0x08, "throw", ExceptionType, ExceptionHandling, special),
    op!(0, 0x09, "rethrow", CatchDepth, ExceptionHandling, special),
    op!(0, 0x0B, "end", None, Mvp, special),
    op!(0, 0x0C, "br", Branch, Mvp, special),
    op!(0, 0x0D, "br_if", Branch, Mvp, special),
    op!(0, 0x0E, "br_table", BranchTable, Mvp, special),
    op!(0, 0x0F, "return", None, Mvp, special),
    op!(0, 0x10, "call", Call, Mvp, special),
    op!(0, 0x11, "call_indirect", CallIndirect, Mvp, special),
    op!(0, 0x19, "catch_all", None, ExceptionHandling, special),
    // Parametric instructions.
    op!(0, 0x1A, "drop", None, Mvp, special),
    op!(0, 0x1B, "select", None, Mvp, special),
    op!(0, 0x1C, "select_t", TypedSelect, ReferenceTypes, special),
    // Variable instructions.
    op!(0, 0x20, "local.get", Local, Mvp, special),
    op!(0, 0x21, "local.set", Local, Mvp, special),
    op!(0, 0x22, "local.tee", Local, Mvp, special),
    op!(0, 0x23, "global.get", Global, Mvp, special),
    op!(0, 0x24, "global.set", Global, Mvp, special),
    // Table access.
    op!(0, 0x25, "table.get", Table, ReferenceTypes, special),
    op!(0, 0x26, "table.set", Table, ReferenceTypes, special),
    // Memory loads and stores.
    op!(0, 0x28, "i32.load", LoadStore, Mvp, [I32] -> [I32]),
    op!(0, 0x29, "i64.load", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x2A, "f32.load", LoadStore, Mvp, [I32] -> [F32]),
    op!(0, 0x2B, "f64.load", LoadStore, Mvp, [I32] -> [F64]),
    op!(0, 0x2C, "i32.load8_s", LoadStore, Mvp, [I32] -> [I32]),
    op!(0, 0x2D, "i32.load8_u", LoadStore, Mvp, [I32] -> [I32]),
    op!(0, 0x2E, "i32.load16_s", LoadStore, Mvp, [I32] -> [I32]),
    op!(0, 0x2F, "i32.load16_u", LoadStore, Mvp, [I32] -> [I32]),
    op!(0, 0x30, "i64.load8_s", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x31, "i64.load8_u", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x32, "i64.load16_s", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x33, "i64.load16_u", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x34, "i64.load32_s", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x35, "i64.load32_u", LoadStore, Mvp, [I32] -> [I64]),
    op!(0, 0x36, "i32.store", LoadStore, Mvp, [I32, I32] -> []),
    op!(0, 0x37, "i64.store", LoadStore, Mvp, [I32, I64] -> []),
    op!(0, 0x38, "f32.store", LoadStore, Mvp, [I32, F32] -> []),
    op!(0, 0x39, "f64.store", LoadStore, Mvp, [I32, F64] -> []),
    op!(0, 0x3A, "i32.store8", LoadStore, Mvp, [I32, I32] -> []),
    op!(0, 0x3B, "i32.store16", LoadStore, Mvp, [I32, I32] -> []),
    op!(0, 0x3C, "i64.store8", LoadStore, Mvp, [I32, I64] -> []),
    op!(0, 0x3D, "i64.store16", LoadStore, Mvp, [I32, I64] -> []),
    op!(0, 0x3E, "i64.store32", LoadStore, Mvp, [I32, I64] -> []),
    op!(0, 0x3F, "memory.size", Memory, Mvp, special),
    op!(0, 0x40, "memory.grow", Memory, Mvp, special),
    // Constants.
    op!(0, 0x41, "i32.const", I32, Mvp, [] -> [I32]),
    op!(0, 0x42, "i64.const", I64, Mvp, [] -> [I64]),
    op!(0, 0x43, "f32.const", F32, Mvp, [] -> [F32]),
    op!(0, 0x44, "f64.const", F64, Mvp, [] -> [F64]),
    // i32 comparisons.
    op!(0, 0x45, "i32.eqz", None, Mvp, [I32] -> [I32]),
    op!(0, 0x46, "i32.eq", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x47, "i32.ne", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x48, "i32.lt_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x49, "i32.lt_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4A, "i32.gt_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4B, "i32.gt_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4C, "i32.le_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4D, "i32.le_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4E, "i32.ge_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x4F, "i32.ge_u", None, Mvp, [I32, I32] -> [I32]),
    // i64 comparisons.
    op!(0, 0x50, "i64.eqz", None, Mvp, [I64] -> [I32]),
    op!(0, 0x51, "i64.eq", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x52, "i64.ne", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x53, "i64.lt_s", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x54, "i64.lt_u", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x55, "i64.gt_s", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x56, "i64.gt_u", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x57, "i64.le_s", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x58, "i64.le_u", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x59, "i64.ge_s", None, Mvp, [I64, I64] -> [I32]),
    op!(0, 0x5A, "i64.ge_u", None, Mvp, [I64, I64] -> [I32]),
    // f32 comparisons.
    op!(0, 0x5B, "f32.eq", None, Mvp, [F32, F32] -> [I32]),
    op!(0, 0x5C, "f32.ne", None, Mvp, [F32, F32] -> [I32]),
    op!(0, 0x5D, "f32.lt", None, Mvp, [F32, F32] -> [I32]),
    op!(0, 0x5E, "f32.gt", None, Mvp, [F32, F32] -> [I32]),
    op!(0, 0x5F, "f32.le", None, Mvp, [F32, F32] -> [I32]),
    op!(0, 0x60, "f32.ge", None, Mvp, [F32, F32] -> [I32]),
    // f64 comparisons.
    op!(0, 0x61, "f64.eq", None, Mvp, [F64, F64] -> [I32]),
    op!(0, 0x62, "f64.ne", None, Mvp, [F64, F64] -> [I32]),
    op!(0, 0x63, "f64.lt", None, Mvp, [F64, F64] -> [I32]),
    op!(0, 0x64, "f64.gt", None, Mvp, [F64, F64] -> [I32]),
    op!(0, 0x65, "f64.le", None, Mvp, [F64, F64] -> [I32]),
    op!(0, 0x66, "f64.ge", None, Mvp, [F64, F64] -> [I32]),
    // i32 arithmetic.
    op!(0, 0x67, "i32.clz", None, Mvp, [I32] -> [I32]),
    op!(0, 0x68, "i32.ctz", None, Mvp, [I32] -> [I32]),
    op!(0, 0x69, "i32.popcnt", None, Mvp, [I32] -> [I32]),
    op!(0, 0x6A, "i32.add", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x6B, "i32.sub", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x6C, "i32.mul", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x6D, "i32.div_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x6E, "i32.div_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x6F, "i32.rem_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x70, "i32.rem_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x71, "i32.and", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x72, "i32.or", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x73, "i32.xor", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x74, "i32.shl", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x75, "i32.shr_s", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x76, "i32.shr_u", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x77, "i32.rotl", None, Mvp, [I32, I32] -> [I32]),
    op!(0, 0x78, "i32.rotr", None, Mvp, [I32, I32] -> [I32]),
    // i64 arithmetic.
    op!(0, 0x79, "i64.clz", None, Mvp, [I64] -> [I64]),
    op!(0, 0x7A, "i64.ctz", None, Mvp, [I64] -> [I64]),
    op!(0, 0x7B, "i64.popcnt", None, Mvp, [I64] -> [I64]),
    op!(0, 0x7C, "i64.add", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x7D, "i64.sub", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x7E, "i64.mul", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x7F, "i64.div_s", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x80, "i64.div_u", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x81, "i64.rem_s", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x82, "i64.rem_u", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x83, "i64.and", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x84, "i64.or", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x85, "i64.xor", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x86, "i64.shl", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x87, "i64.shr_s", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x88, "i64.shr_u", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x89, "i64.rotl", None, Mvp, [I64, I64] -> [I64]),
    op!(0, 0x8A, "i64.rotr", None, Mvp, [I64, I64] -> [I64]),
    // f32 arithmetic.
    op!(0, 0x8B, "f32.abs", None, Mvp, [F32] -> [F32]),
    op!(0, 0x8C, "f32.neg", None, Mvp, [F32] -> [F32]),
    op!(0, 0x8D, "f32.ceil", None, Mvp, [F32] -> [F32]),
    op!(0, 0x8E, "f32.floor", None, Mvp, [F32] -> [F32]),
    op!(0, 0x8F, "f32.trunc", None, Mvp, [F32] -> [F32]),
    op!(0, 0x90, "f32.nearest", None, Mvp, [F32] -> [F32]),
    op!(0, 0x91, "f32.sqrt", None, Mvp, [F32] -> [F32]),
    op!(0, 0x92, "f32.add", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x93, "f32.sub", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x94, "f32.mul", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x95, "f32.div", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x96, "f32.min", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x97, "f32.max", None, Mvp, [F32, F32] -> [F32]),
    op!(0, 0x98, "f32.copysign", None, Mvp, [F32, F32] -> [F32]),
    // f64 arithmetic.
    op!(0, 0x99, "f64.abs", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9A, "f64.neg", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9B, "f64.ceil", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9C, "f64.floor", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9D, "f64.trunc", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9E, "f64.nearest", None, Mvp, [F64] -> [F64]),
    op!(0, 0x9F, "f64.sqrt", None, Mvp, [F64] -> [F64]),
    op!(0, 0xA0, "f64.add", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA1, "f64.sub", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA2, "f64.mul", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA3, "f64.div", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA4, "f64.min", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA5, "f64.max", None, Mvp, [F64, F64] -> [F64]),
    op!(0, 0xA6, "f64.copysign", None, Mvp, [F64, F64] -> [F64]),
    // Conversions.
    op!(0, 0xA7, "i32.wrap_i64", None, Mvp, [I64] -> [I32]),
    op!(0, 0xA8, "i32.trunc_f32_s", None, Mvp, [F32] -> [I32]),
    op!(0, 0xA9, "i32.trunc_f32_u", None, Mvp, [F32] -> [I32]),
    op!(0, 0xAA, "i32.trunc_f64_s", None, Mvp, [F64] -> [I32]),
    op!(0, 0xAB, "i32.trunc_f64_u", None, Mvp, [F64] -> [I32]),
    op!(0, 0xAC, "i64.extend_i32_s", None, Mvp, [I32] -> [I64]),
    op!(0, 0xAD, "i64.extend_i32_u", None, Mvp, [I32] -> [I64]),
    op!(0, 0xAE, "i64.trunc_f32_s", None, Mvp, [F32] -> [I64]),
    op!(0, 0xAF, "i64.trunc_f32_u", None, Mvp, [F32] -> [I64]),
    op!(0, 0xB0, "i64.trunc_f64_s", None, Mvp, [F64] -> [I64]),
    op!(0, 0xB1, "i64.trunc_f64_u", None, Mvp, [F64] -> [I64]),
    op!(0, 0xB2, "f32.convert_i32_s", None, Mvp, [I32] -> [F32]),
    op!(0, 0xB3, "f32.convert_i32_u", None, Mvp, [I32] -> [F32]),
    op!(0, 0xB4, "f32.convert_i64_s", None, Mvp, [I64] -> [F32]),
    op!(0, 0xB5, "f32.convert_i64_u", None, Mvp, [I64] -> [F32]),
    op!(0, 0xB6, "f32.demote_f64", None, Mvp, [F64] -> [F32]),
    op!(0, 0xB7, "f64.convert_i32_s", None, Mvp, [I32] -> [F64]),
    op!(0, 0xB8, "f64.convert_i32_u", None, Mvp, [I32] -> [F64]),
    op!(0, 0xB9, "f64.convert_i64_s", None, Mvp, [I64] -> [F64]),
    op!(0, 0xBA, "f64.convert_i64_u", None, Mvp, [I64] -> [F64]),
    op!(0, 0xBB, "f64.promote_f32", None, Mvp, [F32] -> [F64]),
    op!(0, 0xBC, "i32.reinterpret_f32", None, Mvp, [F32] -> [I32]),
    op!(0, 0xBD, "i64.reinterpret_f64", None, Mvp, [F64] -> [I64]),
    op!(0, 0xBE, "f32.reinterpret_i32", None, Mvp, [I32] -> [F32]),
    op!(0, 0xBF, "f64.reinterpret_i64", None, Mvp, [I64] -> [F64]),
    // Sign extension.
    op!(0, 0xC0, "i32.extend8_s", None, SignExtension, [I32] -> [I32]),
    op!(0, 0xC1, "i32.extend16_s", None, SignExtension, [I32] -> [I32]),
    op!(0, 0xC2, "i64.extend8_s", None, SignExtension, [I64] -> [I64]),
    op!(0, 0xC3, "i64.extend16_s", None, SignExtension, [I64] -> [I64]),
    op!(0, 0xC4, "i64.extend32_s", None, SignExtension, [I64] -> [I64]),
    // Reference instructions.
    op!(0, 0xD0, "ref.null", RefType, ReferenceTypes, special),
    op!(0, 0xD1, "ref.is_null", None, ReferenceTypes, special),
    op!(0, 0xD2, "ref.func", FunctionRef, ReferenceTypes, [] -> [FuncRef]),
    // Saturating truncation (0xFC prefix).
    op!(0xFC, 0, "i32.trunc_sat_f32_s", None, NonTrappingFloatToInt, [F32] -> [I32]),
    op!(0xFC, 1, "i32.trunc_sat_f32_u", None, NonTrappingFloatToInt, [F32] -> [I32]),
    op!(0xFC, 2, "i32.trunc_sat_f64_s", None, NonTrappingFloatToInt, [F64] -> [I32]),
    op!(0xFC, 3, "i32.trunc_sat_f64_u", None, NonTrappingFloatToInt, [F64] -> [I32]),
    op!(0xFC, 4, "i64.trunc_sat_f32_s", None, NonTrappingFloatToInt, [F32] -> [I64]),
    op!(0xFC, 5, "i64.trunc_sat_f32_u", None, NonTrappingFloatToInt, [F32] -> [I64]),
    op!(0xFC, 6, "i64.trunc_sat_f64_s", None, NonTrappingFloatToInt, [F64] -> [I64]),
    op!(0xFC, 7, "i64.trunc_sat_f64_u", None, NonTrappingFloatToInt, [F64] -> [I64]),
    // Bulk memory and table operations (0xFC prefix).
    op!(0xFC, 8, "memory.init", DataSegmentAndMemory, BulkMemoryOperations, [I32, I32, I32] -> []),
    op!(0xFC, 9, "data.drop", DataSegment, BulkMemoryOperations, [] -> []),
    op!(0xFC, 10, "memory.copy", MemoryCopy, BulkMemoryOperations, [I32, I32, I32] -> []),
    op!(0xFC, 11, "memory.fill", Memory, BulkMemoryOperations, [I32, I32, I32] -> []),
    op!(0xFC, 12, "table.init", ElemSegmentAndTable, BulkMemoryOperations, [I32, I32, I32] -> []),
    op!(0xFC, 13, "elem.drop", ElemSegment, BulkMemoryOperations, [] -> []),
    op!(0xFC, 14, "table.copy", TableCopy, BulkMemoryOperations, [I32, I32, I32] -> []),
    op!(0xFC, 15, "table.grow", Table, ReferenceTypes, special),
    op!(0xFC, 16, "table.size", Table, ReferenceTypes, [] -> [I32]),
    op!(0xFC, 17, "table.fill", Table, ReferenceTypes, special),
    // SIMD loads, stores, and constants (0xFD prefix).
    op!(0xFD, 0, "v128.load", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 1, "v128.load8x8_s", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 2, "v128.load8x8_u", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 3, "v128.load16x4_s", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 4, "v128.load16x4_u", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 5, "v128.load32x2_s", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 6, "v128.load32x2_u", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 7, "v128.load8_splat", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 8, "v128.load16_splat", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 9, "v128.load32_splat", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 10, "v128.load64_splat", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 11, "v128.store", LoadStore, Simd, [I32, V128] -> []),
    op!(0xFD, 12, "v128.const", V128, Simd, [] -> [V128]),
    op!(0xFD, 13, "i8x16.shuffle", Shuffle, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 14, "i8x16.swizzle", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 15, "i8x16.splat", None, Simd, [I32] -> [V128]),
    op!(0xFD, 16, "i16x8.splat", None, Simd, [I32] -> [V128]),
    op!(0xFD, 17, "i32x4.splat", None, Simd, [I32] -> [V128]),
    op!(0xFD, 18, "i64x2.splat", None, Simd, [I64] -> [V128]),
    op!(0xFD, 19, "f32x4.splat", None, Simd, [F32] -> [V128]),
    op!(0xFD, 20, "f64x2.splat", None, Simd, [F64] -> [V128]),
    // SIMD lane access.
    op!(0xFD, 21, "i8x16.extract_lane_s", Lane16, Simd, [V128] -> [I32]),
    op!(0xFD, 22, "i8x16.extract_lane_u", Lane16, Simd, [V128] -> [I32]),
    op!(0xFD, 23, "i8x16.replace_lane", Lane16, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 24, "i16x8.extract_lane_s", Lane8, Simd, [V128] -> [I32]),
    op!(0xFD, 25, "i16x8.extract_lane_u", Lane8, Simd, [V128] -> [I32]),
    op!(0xFD, 26, "i16x8.replace_lane", Lane8, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 27, "i32x4.extract_lane", Lane4, Simd, [V128] -> [I32]),
    op!(0xFD, 28, "i32x4.replace_lane", Lane4, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 29, "i64x2.extract_lane", Lane2, Simd, [V128] -> [I64]),
    op!(0xFD, 30, "i64x2.replace_lane", Lane2, Simd, [V128, I64] -> [V128]),
    op!(0xFD, 31, "f32x4.extract_lane", Lane4, Simd, [V128] -> [F32]),
    op!(0xFD, 32, "f32x4.replace_lane", Lane4, Simd, [V128, F32] -> [V128]),
    op!(0xFD, 33, "f64x2.extract_lane", Lane2, Simd, [V128] -> [F64]),
    op!(0xFD, 34, "f64x2.replace_lane", Lane2, Simd, [V128, F64] -> [V128]),
    // SIMD comparisons.
    op!(0xFD, 35, "i8x16.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 36, "i8x16.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 37, "i8x16.lt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 38, "i8x16.lt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 39, "i8x16.gt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 40, "i8x16.gt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 41, "i8x16.le_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 42, "i8x16.le_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 43, "i8x16.ge_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 44, "i8x16.ge_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 45, "i16x8.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 46, "i16x8.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 47, "i16x8.lt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 48, "i16x8.lt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 49, "i16x8.gt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 50, "i16x8.gt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 51, "i16x8.le_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 52, "i16x8.le_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 53, "i16x8.ge_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 54, "i16x8.ge_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 55, "i32x4.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 56, "i32x4.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 57, "i32x4.lt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 58, "i32x4.lt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 59, "i32x4.gt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 60, "i32x4.gt_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 61, "i32x4.le_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 62, "i32x4.le_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 63, "i32x4.ge_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 64, "i32x4.ge_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 65, "f32x4.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 66, "f32x4.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 67, "f32x4.lt", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 68, "f32x4.gt", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 69, "f32x4.le", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 70, "f32x4.ge", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 71, "f64x2.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 72, "f64x2.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 73, "f64x2.lt", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 74, "f64x2.gt", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 75, "f64x2.le", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 76, "f64x2.ge", None, Simd, [V128, V128] -> [V128]),
    // SIMD bitwise operations.
    op!(0xFD, 77, "v128.not", None, Simd, [V128] -> [V128]),
    op!(0xFD, 78, "v128.and", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 79, "v128.andnot", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 80, "v128.or", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 81, "v128.xor", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 82, "v128.bitselect", None, Simd, [V128, V128, V128] -> [V128]),
    op!(0xFD, 83, "v128.any_true", None, Simd, [V128] -> [I32]),
    // SIMD lane loads and stores. The text parser hard-codes memory 0 for these; an optional
    // memory index immediate is an unresolved point in the text grammar.
    op!(0xFD, 84, "v128.load8_lane", LoadStoreLane8, Simd, [I32, V128] -> [V128]),
    op!(0xFD, 85, "v128.load16_lane", LoadStoreLane16, Simd, [I32, V128] -> [V128]),
    op!(0xFD, 86, "v128.load32_lane", LoadStoreLane32, Simd, [I32, V128] -> [V128]),
    op!(0xFD, 87, "v128.load64_lane", LoadStoreLane64, Simd, [I32, V128] -> [V128]),
    op!(0xFD, 88, "v128.store8_lane", LoadStoreLane8, Simd, [I32, V128] -> []),
    op!(0xFD, 89, "v128.store16_lane", LoadStoreLane16, Simd, [I32, V128] -> []),
    op!(0xFD, 90, "v128.store32_lane", LoadStoreLane32, Simd, [I32, V128] -> []),
    op!(0xFD, 91, "v128.store64_lane", LoadStoreLane64, Simd, [I32, V128] -> []),
    op!(0xFD, 92, "v128.load32_zero", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 93, "v128.load64_zero", LoadStore, Simd, [I32] -> [V128]),
    op!(0xFD, 94, "f32x4.demote_f64x2_zero", None, Simd, [V128] -> [V128]),
    op!(0xFD, 95, "f64x2.promote_low_f32x4", None, Simd, [V128] -> [V128]),
    // i8x16 operations.
    op!(0xFD, 96, "i8x16.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 97, "i8x16.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 98, "i8x16.popcnt", None, Simd, [V128] -> [V128]),
    op!(0xFD, 99, "i8x16.all_true", None, Simd, [V128] -> [I32]),
    op!(0xFD, 100, "i8x16.bitmask", None, Simd, [V128] -> [I32]),
    op!(0xFD, 101, "i8x16.narrow_i16x8_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 102, "i8x16.narrow_i16x8_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 103, "f32x4.ceil", None, Simd, [V128] -> [V128]),
    op!(0xFD, 104, "f32x4.floor", None, Simd, [V128] -> [V128]),
    op!(0xFD, 105, "f32x4.trunc", None, Simd, [V128] -> [V128]),
    op!(0xFD, 106, "f32x4.nearest", None, Simd, [V128] -> [V128]),
    op!(0xFD, 107, "i8x16.shl", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 108, "i8x16.shr_s", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 109, "i8x16.shr_u", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 110, "i8x16.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 111, "i8x16.add_sat_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 112, "i8x16.add_sat_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 113, "i8x16.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 114, "i8x16.sub_sat_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 115, "i8x16.sub_sat_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 116, "f64x2.ceil", None, Simd, [V128] -> [V128]),
    op!(0xFD, 117, "f64x2.floor", None, Simd, [V128] -> [V128]),
    op!(0xFD, 118, "i8x16.min_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 119, "i8x16.min_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 120, "i8x16.max_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 121, "i8x16.max_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 122, "f64x2.trunc", None, Simd, [V128] -> [V128]),
    op!(0xFD, 123, "i8x16.avgr_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 124, "i16x8.extadd_pairwise_i8x16_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 125, "i16x8.extadd_pairwise_i8x16_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 126, "i32x4.extadd_pairwise_i16x8_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 127, "i32x4.extadd_pairwise_i16x8_u", None, Simd, [V128] -> [V128]),
    // i16x8 operations.
    op!(0xFD, 128, "i16x8.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 129, "i16x8.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 130, "i16x8.q15mulr_sat_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 131, "i16x8.all_true", None, Simd, [V128] -> [I32]),
    op!(0xFD, 132, "i16x8.bitmask", None, Simd, [V128] -> [I32]),
    op!(0xFD, 133, "i16x8.narrow_i32x4_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 134, "i16x8.narrow_i32x4_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 135, "i16x8.extend_low_i8x16_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 136, "i16x8.extend_high_i8x16_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 137, "i16x8.extend_low_i8x16_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 138, "i16x8.extend_high_i8x16_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 139, "i16x8.shl", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 140, "i16x8.shr_s", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 141, "i16x8.shr_u", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 142, "i16x8.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 143, "i16x8.add_sat_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 144, "i16x8.add_sat_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 145, "i16x8.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 146, "i16x8.sub_sat_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 147, "i16x8.sub_sat_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 148, "f64x2.nearest", None, Simd, [V128] -> [V128]),
    op!(0xFD, 149, "i16x8.mul", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 150, "i16x8.min_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 151, "i16x8.min_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 152, "i16x8.max_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 153, "i16x8.max_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 155, "i16x8.avgr_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 156, "i16x8.extmul_low_i8x16_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 157, "i16x8.extmul_high_i8x16_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 158, "i16x8.extmul_low_i8x16_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 159, "i16x8.extmul_high_i8x16_u", None, Simd, [V128, V128] -> [V128]),
    // i32x4 operations.
    op!(0xFD, 160, "i32x4.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 161, "i32x4.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 163, "i32x4.all_true", None, Simd, [V128] -> [I32]),
    op!(0xFD, 164, "i32x4.bitmask", None, Simd, [V128] -> [I32]),
    op!(0xFD, 167, "i32x4.extend_low_i16x8_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 168, "i32x4.extend_high_i16x8_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 169, "i32x4.extend_low_i16x8_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 170, "i32x4.extend_high_i16x8_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 171, "i32x4.shl", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 172, "i32x4.shr_s", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 173, "i32x4.shr_u", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 174, "i32x4.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 177, "i32x4.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 181, "i32x4.mul", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 182, "i32x4.min_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 183, "i32x4.min_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 184, "i32x4.max_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 185, "i32x4.max_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 186, "i32x4.dot_i16x8_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 188, "i32x4.extmul_low_i16x8_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 189, "i32x4.extmul_high_i16x8_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 190, "i32x4.extmul_low_i16x8_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 191, "i32x4.extmul_high_i16x8_u", None, Simd, [V128, V128] -> [V128]),
    // i64x2 operations.
    op!(0xFD, 192, "i64x2.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 193, "i64x2.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 195, "i64x2.all_true", None, Simd, [V128] -> [I32]),
    op!(0xFD, 196, "i64x2.bitmask", None, Simd, [V128] -> [I32]),
    op!(0xFD, 199, "i64x2.extend_low_i32x4_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 200, "i64x2.extend_high_i32x4_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 201, "i64x2.extend_low_i32x4_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 202, "i64x2.extend_high_i32x4_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 203, "i64x2.shl", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 204, "i64x2.shr_s", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 205, "i64x2.shr_u", None, Simd, [V128, I32] -> [V128]),
    op!(0xFD, 206, "i64x2.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 209, "i64x2.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 213, "i64x2.mul", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 214, "i64x2.eq", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 215, "i64x2.ne", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 216, "i64x2.lt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 217, "i64x2.gt_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 218, "i64x2.le_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 219, "i64x2.ge_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 220, "i64x2.extmul_low_i32x4_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 221, "i64x2.extmul_high_i32x4_s", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 222, "i64x2.extmul_low_i32x4_u", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 223, "i64x2.extmul_high_i32x4_u", None, Simd, [V128, V128] -> [V128]),
    // f32x4 operations.
    op!(0xFD, 224, "f32x4.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 225, "f32x4.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 227, "f32x4.sqrt", None, Simd, [V128] -> [V128]),
    op!(0xFD, 228, "f32x4.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 229, "f32x4.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 230, "f32x4.mul", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 231, "f32x4.div", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 232, "f32x4.min", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 233, "f32x4.max", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 234, "f32x4.pmin", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 235, "f32x4.pmax", None, Simd, [V128, V128] -> [V128]),
    // f64x2 operations.
    op!(0xFD, 236, "f64x2.abs", None, Simd, [V128] -> [V128]),
    op!(0xFD, 237, "f64x2.neg", None, Simd, [V128] -> [V128]),
    op!(0xFD, 239, "f64x2.sqrt", None, Simd, [V128] -> [V128]),
    op!(0xFD, 240, "f64x2.add", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 241, "f64x2.sub", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 242, "f64x2.mul", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 243, "f64x2.div", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 244, "f64x2.min", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 245, "f64x2.max", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 246, "f64x2.pmin", None, Simd, [V128, V128] -> [V128]),
    op!(0xFD, 247, "f64x2.pmax", None, Simd, [V128, V128] -> [V128]),
    // SIMD conversions.
    op!(0xFD, 248, "i32x4.trunc_sat_f32x4_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 249, "i32x4.trunc_sat_f32x4_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 250, "f32x4.convert_i32x4_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 251, "f32x4.convert_i32x4_u", None, Simd, [V128] -> [V128]),
    op!(0xFD, 252, "i32x4.trunc_sat_f64x2_s_zero", None, Simd, [V128] -> [V128]),
    op!(0xFD, 253, "i32x4.trunc_sat_f64x2_u_zero", None, Simd, [V128] -> [V128]),
    op!(0xFD, 254, "f64x2.convert_low_i32x4_s", None, Simd, [V128] -> [V128]),
    op!(0xFD, 255, "f64x2.convert_low_i32x4_u", None, Simd, [V128] -> [V128]),
    // Atomic operations (0xFE prefix).
    op!(0xFE, 0x00, "memory.atomic.notify", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x01, "memory.atomic.wait32", AtomicLoadStore, Atomics, [I32, I32, I64] -> [I32]),
    op!(0xFE, 0x02, "memory.atomic.wait64", AtomicLoadStore, Atomics, [I32, I64, I64] -> [I32]),
    op!(0xFE, 0x03, "atomic.fence", AtomicFence, Atomics, [] -> []),
    op!(0xFE, 0x10, "i32.atomic.load", AtomicLoadStore, Atomics, [I32] -> [I32]),
    op!(0xFE, 0x11, "i64.atomic.load", AtomicLoadStore, Atomics, [I32] -> [I64]),
    op!(0xFE, 0x12, "i32.atomic.load8_u", AtomicLoadStore, Atomics, [I32] -> [I32]),
    op!(0xFE, 0x13, "i32.atomic.load16_u", AtomicLoadStore, Atomics, [I32] -> [I32]),
    op!(0xFE, 0x14, "i64.atomic.load8_u", AtomicLoadStore, Atomics, [I32] -> [I64]),
    op!(0xFE, 0x15, "i64.atomic.load16_u", AtomicLoadStore, Atomics, [I32] -> [I64]),
    op!(0xFE, 0x16, "i64.atomic.load32_u", AtomicLoadStore, Atomics, [I32] -> [I64]),
    op!(0xFE, 0x17, "i32.atomic.store", AtomicLoadStore, Atomics, [I32, I32] -> []),
    op!(0xFE, 0x18, "i64.atomic.store", AtomicLoadStore, Atomics, [I32, I64] -> []),
    op!(0xFE, 0x19, "i32.atomic.store8", AtomicLoadStore, Atomics, [I32, I32] -> []),
    op!(0xFE, 0x1A, "i32.atomic.store16", AtomicLoadStore, Atomics, [I32, I32] -> []),
    op!(0xFE, 0x1B, "i64.atomic.store8", AtomicLoadStore, Atomics, [I32, I64] -> []),
    op!(0xFE, 0x1C, "i64.atomic.store16", AtomicLoadStore, Atomics, [I32, I64] -> []),
    op!(0xFE, 0x1D, "i64.atomic.store32", AtomicLoadStore, Atomics, [I32, I64] -> []),
    op!(0xFE, 0x1E, "i32.atomic.rmw.add", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x1F, "i64.atomic.rmw.add", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x20, "i32.atomic.rmw8.add_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x21, "i32.atomic.rmw16.add_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x22, "i64.atomic.rmw8.add_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x23, "i64.atomic.rmw16.add_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x24, "i64.atomic.rmw32.add_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x25, "i32.atomic.rmw.sub", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x26, "i64.atomic.rmw.sub", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x27, "i32.atomic.rmw8.sub_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x28, "i32.atomic.rmw16.sub_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x29, "i64.atomic.rmw8.sub_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x2A, "i64.atomic.rmw16.sub_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x2B, "i64.atomic.rmw32.sub_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x2C, "i32.atomic.rmw.and", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x2D, "i64.atomic.rmw.and", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x2E, "i32.atomic.rmw8.and_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x2F, "i32.atomic.rmw16.and_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x30, "i64.atomic.rmw8.and_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x31, "i64.atomic.rmw16.and_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x32, "i64.atomic.rmw32.and_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x33, "i32.atomic.rmw.or", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x34, "i64.atomic.rmw.or", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x35, "i32.atomic.rmw8.or_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x36, "i32.atomic.rmw16.or_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x37, "i64.atomic.rmw8.or_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x38, "i64.atomic.rmw16.or_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x39, "i64.atomic.rmw32.or_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x3A, "i32.atomic.rmw.xor", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x3B, "i64.atomic.rmw.xor", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x3C, "i32.atomic.rmw8.xor_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x3D, "i32.atomic.rmw16.xor_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x3E, "i64.atomic.rmw8.xor_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x3F, "i64.atomic.rmw16.xor_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x40, "i64.atomic.rmw32.xor_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x41, "i32.atomic.rmw.xchg", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x42, "i64.atomic.rmw.xchg", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x43, "i32.atomic.rmw8.xchg_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x44, "i32.atomic.rmw16.xchg_u", AtomicLoadStore, Atomics, [I32, I32] -> [I32]),
    op!(0xFE, 0x45, "i64.atomic.rmw8.xchg_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x46, "i64.atomic.rmw16.xchg_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x47, "i64.atomic.rmw32.xchg_u", AtomicLoadStore, Atomics, [I32, I64] -> [I64]),
    op!(0xFE, 0x48, "i32.atomic.rmw.cmpxchg", AtomicLoadStore, Atomics, [I32, I32, I32] -> [I32]),
    op!(0xFE, 0x49, "i64.atomic.rmw.cmpxchg", AtomicLoadStore, Atomics, [I32, I64, I64] -> [I64]),
    op!(0xFE, 0x4A, "i32.atomic.rmw8.cmpxchg_u", AtomicLoadStore, Atomics, [I32, I32, I32] -> [I32]),
    op!(0xFE, 0x4B, "i32.atomic.rmw16.cmpxchg_u", AtomicLoadStore, Atomics, [I32, I32, I32] -> [I32]),
    op!(0xFE, 0x4C, "i64.atomic.rmw8.cmpxchg_u", AtomicLoadStore, Atomics, [I32, I64, I64] -> [I64]),
    op!(0xFE, 0x4D, "i64.atomic.rmw16.cmpxchg_u", AtomicLoadStore, Atomics, [I32, I64, I64] -> [I64]),
    op!(0xFE, 0x4E, "i64.atomic.rmw32.cmpxchg_u", AtomicLoadStore, Atomics, [I32, I64, I64] -> [I64]),
];

/// Legacy mnemonic aliases accepted when `allow_legacy_instruction_names` is set. Each pair is
/// the legacy spelling and the modern mnemonic it aliases.
pub static LEGACY_OPERATOR_ALIASES: &[(&str, &str)] = &[
    ("get_local", "local.get"),
    ("set_local", "local.set"),
    ("tee_local", "local.tee"),
    ("get_global", "global.get"),
    ("set_global", "global.set"),
    ("current_memory", "memory.size"),
    ("grow_memory", "memory.grow"),
    ("i32.wrap/i64", "i32.wrap_i64"),
    ("i32.trunc_s/f32", "i32.trunc_f32_s"),
    ("i32.trunc_u/f32", "i32.trunc_f32_u"),
    ("i32.trunc_s/f64", "i32.trunc_f64_s"),
    ("i32.trunc_u/f64", "i32.trunc_f64_u"),
    ("i64.extend_s/i32", "i64.extend_i32_s"),
    ("i64.extend_u/i32", "i64.extend_i32_u"),
    ("i64.trunc_s/f32", "i64.trunc_f32_s"),
    ("i64.trunc_u/f32", "i64.trunc_f32_u"),
    ("i64.trunc_s/f64", "i64.trunc_f64_s"),
    ("i64.trunc_u/f64", "i64.trunc_f64_u"),
    ("f32.convert_s/i32", "f32.convert_i32_s"),
    ("f32.convert_u/i32", "f32.convert_i32_u"),
    ("f32.convert_s/i64", "f32.convert_i64_s"),
    ("f32.convert_u/i64", "f32.convert_i64_u"),
    ("f32.demote/f64", "f32.demote_f64"),
    ("f64.convert_s/i32", "f64.convert_i32_s"),
    ("f64.convert_u/i32", "f64.convert_i32_u"),
    ("f64.convert_s/i64", "f64.convert_i64_s"),
    ("f64.convert_u/i64", "f64.convert_i64_u"),
    ("f64.promote/f32", "f64.promote_f32"),
    ("i32.reinterpret/f32", "i32.reinterpret_f32"),
    ("i64.reinterpret/f64", "i64.reinterpret_f64"),
    ("f32.reinterpret/i32", "f32.reinterpret_i32"),
    ("f64.reinterpret/i64", "f64.reinterpret_i64"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::operator_index_by_mnemonic;

    #[test]
    fn legacy_aliases_resolve_to_table_rows() {
        for (legacy, modern) in LEGACY_OPERATOR_ALIASES {
            assert!(
                operator_index_by_mnemonic(modern).is_some(),
                "alias {legacy} targets unknown mnemonic {modern}"
            );
            assert!(
                operator_index_by_mnemonic(legacy).is_none(),
                "legacy spelling {legacy} must not be a primary mnemonic"
            );
        }
    }

    #[test]
    fn load_store_rows_lead_with_an_address_operand() {
        for info in OPERATORS {
            if info.imm.is_load_store() {
                if let Signature::Fixed { params, .. } = info.sig {
                    assert_eq!(
                        params.first(),
                        Some(&ValueType::I32),
                        "{} must take its address first",
                        info.mnemonic
                    );
                }
            }
        }
    }
}
