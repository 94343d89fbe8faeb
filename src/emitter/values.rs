//! Emitters for the primitive values of the WebAssembly binary format.

use crate::emitter::errors::EmitError;
use crate::leb128;
use crate::model::{
    GlobalType, IndexType, MemoryType, Mutability, ReferenceType, SizeConstraints, TableType,
    ValueType,
};

pub fn emit_u32(value: u32, output: &mut Vec<u8>) -> Result<(), EmitError> {
    leb128::encode_unsigned(value, output)?;
    Ok(())
}

pub fn emit_u64(value: u64, output: &mut Vec<u8>) -> Result<(), EmitError> {
    leb128::encode_unsigned(value, output)?;
    Ok(())
}

pub fn emit_s32(value: i32, output: &mut Vec<u8>) -> Result<(), EmitError> {
    leb128::encode_signed(value, output)?;
    Ok(())
}

pub fn emit_s64(value: i64, output: &mut Vec<u8>) -> Result<(), EmitError> {
    leb128::encode_signed(value, output)?;
    Ok(())
}

pub fn emit_name(name: &str, output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_u32(name.len() as u32, output)?;
    output.extend_from_slice(name.as_bytes());
    Ok(())
}

pub fn emit_byte_vector(bytes: &[u8], output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_u32(bytes.len() as u32, output)?;
    output.extend_from_slice(bytes);
    Ok(())
}

pub fn emit_value_type(kind: ValueType, output: &mut Vec<u8>) {
    output.push(kind.binary_code());
}

pub fn emit_reference_type(kind: ReferenceType, output: &mut Vec<u8>) {
    output.push(ValueType::from(kind).binary_code());
}

/// Emits the limits flags byte (bit 0: maximum present, bit 1: shared, bit 2: 64-bit index
/// type) followed by the bounds.
pub fn emit_limits(
    size: &SizeConstraints,
    shared: bool,
    index_type: IndexType,
    output: &mut Vec<u8>,
) -> Result<(), EmitError> {
    let has_max = size.max != u64::MAX;
    let mut flags = 0u8;
    if has_max {
        flags |= 0b001;
    }
    if shared {
        flags |= 0b010;
    }
    if index_type == IndexType::I64 {
        flags |= 0b100;
    }
    output.push(flags);
    emit_u64(size.min, output)?;
    if has_max {
        emit_u64(size.max, output)?;
    }
    Ok(())
}

pub fn emit_table_type(ty: &TableType, output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_reference_type(ty.element_type, output);
    emit_limits(&ty.size, ty.shared, ty.index_type, output)
}

pub fn emit_memory_type(ty: &MemoryType, output: &mut Vec<u8>) -> Result<(), EmitError> {
    emit_limits(&ty.size, ty.shared, ty.index_type, output)
}

pub fn emit_global_type(ty: &GlobalType, output: &mut Vec<u8>) {
    emit_value_type(ty.kind, output);
    output.push(match ty.mutability {
        Mutability::Immutable => 0,
        Mutability::Mutable => 1,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_round_trip_through_the_parser() {
        let mut output = Vec::new();
        emit_limits(
            &SizeConstraints::bounded(1, 2),
            true,
            IndexType::I32,
            &mut output,
        )
        .unwrap();

        let (_, (size, shared, index_type)) =
            crate::parser::values::parse_limits(&output).unwrap();
        assert_eq!(size, SizeConstraints::bounded(1, 2));
        assert!(shared);
        assert_eq!(index_type, IndexType::I32);
    }

    #[test]
    fn unbounded_limits_omit_the_maximum() {
        let mut output = Vec::new();
        emit_limits(
            &SizeConstraints::at_least(3),
            false,
            IndexType::I32,
            &mut output,
        )
        .unwrap();

        assert_eq!(output, vec![0x00, 3]);
    }
}
