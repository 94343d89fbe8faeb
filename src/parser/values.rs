//! nom parsers for the primitive values of the WebAssembly binary format.

use crate::leb128;
use crate::model::{
    GlobalType, IndexType, MemoryType, Mutability, ReferenceType, SizeConstraints, TableType,
    ValueType,
};
use nom::bytes::complete::{tag, take};
use nom::combinator::{map, map_res};
use nom::error::{Error as NomError, ErrorKind, ParseError};
use nom::multi::fold_many_m_n;
use nom::{IResult, Parser};

fn leb_error(input: &[u8]) -> nom::Err<NomError<&[u8]>> {
    nom::Err::Error(NomError::from_error_kind(input, ErrorKind::TooLarge))
}

/// Parses a single byte and verifies the parsed byte matches the given byte.
pub fn match_byte<'input>(byte: u8) -> impl FnMut(&'input [u8]) -> IResult<&'input [u8], u8> {
    map(tag([byte]), |bytes: &'input [u8]| bytes[0])
}

/// Parses one byte.
pub fn parse_byte(input: &[u8]) -> IResult<&[u8], u8> {
    map(take(1usize), |bytes: &[u8]| bytes[0])(input)
}

/// Parses an unsigned 32-bit integer using LEB128 (Little-Endian Base 128) encoding.
///
/// See <https://webassembly.github.io/spec/core/binary/values.html#integers>
pub fn parse_u32(input: &[u8]) -> IResult<&[u8], u32> {
    leb128::parse_unsigned(input).map_err(|_| leb_error(input))
}

/// Parses an unsigned 64-bit integer using LEB128 encoding.
pub fn parse_u64(input: &[u8]) -> IResult<&[u8], u64> {
    leb128::parse_unsigned(input).map_err(|_| leb_error(input))
}

/// Parses a signed 32-bit integer using LEB128 encoding.
pub fn parse_s32(input: &[u8]) -> IResult<&[u8], i32> {
    leb128::parse_signed(input).map_err(|_| leb_error(input))
}

/// Parses a signed 64-bit integer using LEB128 encoding.
pub fn parse_s64(input: &[u8]) -> IResult<&[u8], i64> {
    leb128::parse_signed(input).map_err(|_| leb_error(input))
}

/// Parses the signed 33-bit integer used by block types.
pub fn parse_s33(input: &[u8]) -> IResult<&[u8], i64> {
    leb128::parse_s33(input).map_err(|_| leb_error(input))
}

/// Parses a WebAssembly byte vector.
///
/// See <https://webassembly.github.io/spec/core/binary/values.html#bytes>
pub fn parse_byte_vector(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, length) = parse_u32(input)?;
    take(length as usize)(input)
}

/// Parses a WebAssembly name value: a UTF-8 string.
///
/// See <https://webassembly.github.io/spec/core/binary/values.html#names>
pub fn parse_name_string(input: &[u8]) -> IResult<&[u8], String> {
    map(
        map_res(parse_byte_vector, std::str::from_utf8),
        str::to_string,
    )(input)
}

/// Parses a WebAssembly encoded vector of items from the input.
///
/// See <https://webassembly.github.io/spec/core/binary/conventions.html#vectors>
pub fn parse_vector<'input, O, P>(
    parser: P,
) -> impl FnMut(&'input [u8]) -> IResult<&'input [u8], Vec<O>>
where
    P: Copy + Parser<&'input [u8], O, NomError<&'input [u8]>>,
{
    move |input| {
        let (input, length) = parse_u32(input)?;
        let length = length as usize;
        fold_many_m_n(
            length,
            length,
            parser,
            move || Vec::with_capacity(length.min(1 << 16)),
            |mut accumulator, item| {
                accumulator.push(item);
                accumulator
            },
        )(input)
    }
}

/// Parses a value type byte.
pub fn parse_value_type(input: &[u8]) -> IResult<&[u8], ValueType> {
    map_res(parse_byte, |byte| {
        ValueType::from_binary_code(byte).ok_or(())
    })(input)
}

/// Parses a reference type byte.
pub fn parse_reference_type(input: &[u8]) -> IResult<&[u8], ReferenceType> {
    map_res(parse_byte, |byte| {
        ValueType::from_binary_code(byte)
            .and_then(|kind| ReferenceType::try_from(kind).ok())
            .ok_or(())
    })(input)
}

/// Parses the limits of a table or memory: a flags byte (bit 0: maximum present, bit 1:
/// shared, bit 2: 64-bit index type) followed by the bounds.
pub fn parse_limits(input: &[u8]) -> IResult<&[u8], (SizeConstraints, bool, IndexType)> {
    let (input, flags) = parse_byte(input)?;
    if flags > 0b111 {
        return Err(leb_error(input));
    }
    let shared = flags & 0b010 != 0;
    let index_type = if flags & 0b100 != 0 {
        IndexType::I64
    } else {
        IndexType::I32
    };
    let (input, min) = parse_u64(input)?;
    let (input, max) = if flags & 0b001 != 0 {
        parse_u64(input)?
    } else {
        (input, u64::MAX)
    };
    Ok((input, (SizeConstraints { min, max }, shared, index_type)))
}

/// Parses a table type: element type then limits.
pub fn parse_table_type(input: &[u8]) -> IResult<&[u8], TableType> {
    let (input, element_type) = parse_reference_type(input)?;
    let (input, (size, shared, index_type)) = parse_limits(input)?;
    Ok((
        input,
        TableType {
            element_type,
            shared,
            index_type,
            size,
        },
    ))
}

/// Parses a memory type: just limits.
pub fn parse_memory_type(input: &[u8]) -> IResult<&[u8], MemoryType> {
    let (input, (size, shared, index_type)) = parse_limits(input)?;
    Ok((
        input,
        MemoryType {
            shared,
            index_type,
            size,
        },
    ))
}

/// Parses a global type: value type then a mutability byte.
pub fn parse_global_type(input: &[u8]) -> IResult<&[u8], GlobalType> {
    let (input, kind) = parse_value_type(input)?;
    let (input, mutability) = map_res(parse_byte, |byte| match byte {
        0 => Ok(Mutability::Immutable),
        1 => Ok(Mutability::Mutable),
        _ => Err(()),
    })(input)?;
    Ok((input, GlobalType { mutability, kind }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unsigned_leb128() {
        let input = [0xE5, 0x8E, 0x26, 0xFF];
        let (remaining, actual) = parse_u32(&input).unwrap();

        assert_eq!(actual, 624485);
        assert_eq!(remaining, &[0xFF]);
    }

    #[test]
    fn parse_name_with_remaining() {
        let mut input = vec![5u8];
        input.extend_from_slice(b"hello");
        input.push(42);

        let (remaining, name) = parse_name_string(&input).unwrap();

        assert_eq!(name, "hello");
        assert_eq!(remaining, &[42]);
    }

    #[test]
    fn vectors_are_length_prefixed() {
        let input = [3, 7, 8, 9, 0xFF];
        let (remaining, items) = parse_vector(parse_byte)(&input).unwrap();

        assert_eq!(items, vec![7, 8, 9]);
        assert_eq!(remaining, &[0xFF]);
    }

    #[test]
    fn limits_flags() {
        let (_, (size, shared, index_type)) = parse_limits(&[0x00, 1]).unwrap();
        assert_eq!(size, SizeConstraints::at_least(1));
        assert!(!shared);
        assert_eq!(index_type, IndexType::I32);

        let (_, (size, shared, _)) = parse_limits(&[0x03, 1, 2]).unwrap();
        assert_eq!(size, SizeConstraints::bounded(1, 2));
        assert!(shared);

        let (_, (_, _, index_type)) = parse_limits(&[0x04, 0]).unwrap();
        assert_eq!(index_type, IndexType::I64);
    }

    #[test]
    fn invalid_value_types_are_rejected() {
        assert!(parse_value_type(&[0x7F]).is_ok());
        assert!(parse_value_type(&[0x11]).is_err());
    }

    #[test]
    fn match_byte_matching() {
        let input = [42, 3];
        let (remaining, actual) = match_byte(42)(&input).unwrap();

        assert_eq!(actual, 42);
        assert_eq!(remaining, &[3]);
    }
}
