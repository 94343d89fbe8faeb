//! nom parsers for the declaration sections of the binary format.

use crate::model::{
    ExceptionType, FunctionType, GlobalType, MemoryType, ResultType, TableType, ValueType,
};
use crate::parser::values::{
    match_byte, parse_byte, parse_global_type, parse_memory_type, parse_name_string,
    parse_table_type, parse_u32, parse_value_type, parse_vector,
};
use nom::combinator::map;
use nom::error::{Error as NomError, ErrorKind, ParseError};
use nom::sequence::tuple;
use nom::IResult;

/// Parses a function type: `0x60` then the parameter and result vectors.
///
/// See <https://webassembly.github.io/spec/core/binary/types.html#function-types>
pub fn parse_function_type(input: &[u8]) -> IResult<&[u8], FunctionType> {
    let (input, _) = match_byte(0x60)(input)?;
    let (input, parameters) = parse_vector(parse_value_type)(input)?;
    let (input, results) = parse_vector(parse_value_type)(input)?;
    Ok((
        input,
        FunctionType::new(ResultType::new(parameters), ResultType::new(results)),
    ))
}

/// Parses the exception-type payload of a tag definition or import: its parameter types.
pub fn parse_exception_type(input: &[u8]) -> IResult<&[u8], ExceptionType> {
    map(parse_vector(parse_value_type), |parameters| ExceptionType {
        parameters: ResultType::new(parameters),
    })(input)
}

/// The type carried by an import, by extern kind.
pub enum ImportDesc {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
    ExceptionType(ExceptionType),
}

/// Parses one import: module name, export name, and a kind-tagged description.
///
/// See <https://webassembly.github.io/spec/core/binary/modules.html#import-section>
pub fn parse_import(input: &[u8]) -> IResult<&[u8], (String, String, ImportDesc)> {
    let (input, (module_name, export_name)) = tuple((parse_name_string, parse_name_string))(input)?;
    let (input, kind) = parse_byte(input)?;
    let (input, desc) = match kind {
        0x00 => map(parse_u32, ImportDesc::Function)(input)?,
        0x01 => map(parse_table_type, ImportDesc::Table)(input)?,
        0x02 => map(parse_memory_type, ImportDesc::Memory)(input)?,
        0x03 => map(parse_global_type, ImportDesc::Global)(input)?,
        0x04 => map(parse_exception_type, ImportDesc::ExceptionType)(input)?,
        _ => {
            return Err(nom::Err::Error(NomError::from_error_kind(
                input,
                ErrorKind::Tag,
            )))
        }
    };
    Ok((input, (module_name, export_name, desc)))
}

/// Parses one export: name, kind byte, and index.
///
/// See <https://webassembly.github.io/spec/core/binary/modules.html#export-section>
pub fn parse_export(input: &[u8]) -> IResult<&[u8], (String, u8, u32)> {
    tuple((parse_name_string, parse_byte, parse_u32))(input)
}

/// Parses the type section payload.
pub fn parse_type_section(input: &[u8]) -> IResult<&[u8], Vec<FunctionType>> {
    parse_vector(parse_function_type)(input)
}

/// Parses the function section payload: the type index of each defined function.
pub fn parse_function_section(input: &[u8]) -> IResult<&[u8], Vec<u32>> {
    parse_vector(parse_u32)(input)
}

/// Parses the table section payload.
pub fn parse_table_section(input: &[u8]) -> IResult<&[u8], Vec<TableType>> {
    parse_vector(parse_table_type)(input)
}

/// Parses the memory section payload.
pub fn parse_memory_section(input: &[u8]) -> IResult<&[u8], Vec<MemoryType>> {
    parse_vector(parse_memory_type)(input)
}

/// Parses the exception-type section payload.
pub fn parse_exception_type_section(input: &[u8]) -> IResult<&[u8], Vec<ExceptionType>> {
    parse_vector(parse_exception_type)(input)
}

/// Parses the import section payload.
pub fn parse_import_section(input: &[u8]) -> IResult<&[u8], Vec<(String, String, ImportDesc)>> {
    parse_vector(parse_import)(input)
}

/// Parses the export section payload.
pub fn parse_export_section(input: &[u8]) -> IResult<&[u8], Vec<(String, u8, u32)>> {
    parse_vector(parse_export)(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexType, Mutability, SizeConstraints};

    #[test]
    fn function_types_decode() {
        // (param i32 i64) (result f64)
        let bytes = [0x60, 2, 0x7F, 0x7E, 1, 0x7C];
        let (_, ty) = parse_function_type(&bytes).unwrap();

        assert_eq!(ty.parameters().kinds(), &[ValueType::I32, ValueType::I64]);
        assert_eq!(ty.results().kinds(), &[ValueType::F64]);
    }

    #[test]
    fn function_type_requires_the_marker() {
        assert!(parse_function_type(&[0x61, 0, 0]).is_err());
    }

    #[test]
    fn imports_decode() {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(b"env");
        bytes.push(3);
        bytes.extend_from_slice(b"mem");
        bytes.extend_from_slice(&[0x02, 0x01, 1, 2]);

        let (_, (module_name, export_name, desc)) = parse_import(&bytes).unwrap();

        assert_eq!(module_name, "env");
        assert_eq!(export_name, "mem");
        match desc {
            ImportDesc::Memory(ty) => {
                assert_eq!(ty.size, SizeConstraints::bounded(1, 2));
                assert_eq!(ty.index_type, IndexType::I32);
            }
            _ => panic!("expected a memory import"),
        }
    }

    #[test]
    fn global_types_decode() {
        let (_, ty) = parse_global_type(&[0x7F, 0x01]).unwrap();

        assert_eq!(ty.kind, ValueType::I32);
        assert_eq!(ty.mutability, Mutability::Mutable);
        assert!(parse_global_type(&[0x7F, 0x02]).is_err());
    }
}
