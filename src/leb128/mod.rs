//! Little-Endian Base 128 encoding and decoding of signed and unsigned integers.

mod errors;

pub use errors::Leb128Error;

use std::io::Write;
use std::mem::size_of;

/// The bit that marks an encoding group as a continuation.
const CONTINUATION: u8 = 0x80;

/// The number of payload bits per LEB128 encoding group.
const GROUP_BITS: u32 = 7;

/// The zero-indexed position of the sign bit within a group.
const SIGN_BIT: u8 = 0x40;

/// Maximum size (in bytes) of an LEB128-encoded integer type.
///
/// See <https://en.wikipedia.org/wiki/LEB128>
const fn max_encoded_size(bits: usize) -> usize {
    (bits + GROUP_BITS as usize - 1) / GROUP_BITS as usize
}

/// Parses an unsigned integer using LEB128 (Little-Endian Base 128) encoding.
/// Returns the remaining input and the parsed integer.
///
/// The encoding is bounded by the size of `T`: a value that needs more groups than `T` has
/// bits, or whose final group carries bits beyond `T`'s width, is an overflow.
///
/// # Examples
/// ```rust
/// use wasm_syntax::leb128::parse_unsigned;
///
/// let (remaining, value): (&[u8], u32) = parse_unsigned(&[0xE5, 0x8E, 0x26, 0xFF]).unwrap();
///
/// assert_eq!(value, 624485);
/// assert_eq!(remaining, &[0xFF]);
/// ```
pub fn parse_unsigned<T>(input: &[u8]) -> Result<(&[u8], T), Leb128Error>
where
    T: TryFrom<u128>,
{
    let bits = size_of::<T>() * 8;
    let max_size = max_encoded_size(bits);

    let mut result: u128 = 0;
    for (index, &byte) in input.iter().enumerate() {
        if index >= max_size {
            return Err(Leb128Error::Overflow(index + 1, max_size));
        }

        result |= u128::from(byte & !CONTINUATION) << (index as u32 * GROUP_BITS);

        if byte & CONTINUATION == 0 {
            let value = T::try_from(result).map_err(|_| Leb128Error::Overflow(index + 1, max_size))?;
            return Ok((&input[index + 1..], value));
        }
    }

    Err(Leb128Error::Invalid)
}

/// Parses a signed integer using LEB128 (Little-Endian Base 128) encoding.
/// Returns the remaining input and the parsed integer.
pub fn parse_signed<T>(input: &[u8]) -> Result<(&[u8], T), Leb128Error>
where
    T: TryFrom<i128>,
{
    let bits = size_of::<T>() * 8;
    let max_size = max_encoded_size(bits);
    let (remaining, result, groups) = parse_signed_groups(input, max_size)?;

    let value = T::try_from(result).map_err(|_| Leb128Error::Overflow(groups, max_size))?;
    Ok((remaining, value))
}

/// Parses the signed 33-bit integer encoding used by block types in the binary format.
pub fn parse_s33(input: &[u8]) -> Result<(&[u8], i64), Leb128Error> {
    let max_size = max_encoded_size(33);
    let (remaining, result, groups) = parse_signed_groups(input, max_size)?;

    if result < -(1_i128 << 32) || result >= (1_i128 << 32) {
        return Err(Leb128Error::Overflow(groups, max_size));
    }
    Ok((remaining, result as i64))
}

fn parse_signed_groups(input: &[u8], max_size: usize) -> Result<(&[u8], i128, usize), Leb128Error> {
    let mut result: i128 = 0;
    for (index, &byte) in input.iter().enumerate() {
        if index >= max_size {
            return Err(Leb128Error::Overflow(index + 1, max_size));
        }

        result |= i128::from(byte & !CONTINUATION) << (index as u32 * GROUP_BITS);

        if byte & CONTINUATION == 0 {
            let used_bits = (index as u32 + 1) * GROUP_BITS;
            if byte & SIGN_BIT != 0 && used_bits < 128 {
                result |= -1i128 << used_bits;
            }
            return Ok((&input[index + 1..], result, index + 1));
        }
    }

    Err(Leb128Error::Invalid)
}

/// Encodes an unsigned integer using LEB128 (Little-Endian Base 128) encoding.
/// Returns the number of bytes written.
///
/// # Examples
/// ```rust
/// use wasm_syntax::leb128::encode_unsigned;
///
/// let mut output = Vec::new();
/// let written = encode_unsigned(624485u32, &mut output).unwrap();
///
/// assert_eq!(written, 3);
/// assert_eq!(output, vec![0xE5, 0x8E, 0x26]);
/// ```
pub fn encode_unsigned<I, O: Write>(input: I, mut output: O) -> Result<usize, Leb128Error>
where
    I: Into<u128>,
{
    let mut value = input.into();
    let mut written = 0;

    loop {
        let mut byte = (value as u8) & !CONTINUATION;
        value >>= GROUP_BITS;

        if value != 0 {
            byte |= CONTINUATION;
        }

        output.write_all(&[byte])?;
        written += 1;

        if value == 0 {
            break;
        }
    }

    Ok(written)
}

/// Encodes a signed integer using LEB128 (Little-Endian Base 128) encoding.
/// Returns the number of bytes written.
pub fn encode_signed<I, O: Write>(input: I, mut output: O) -> Result<usize, Leb128Error>
where
    I: Into<i128>,
{
    let mut value = input.into();
    let mut written = 0;

    loop {
        let byte = (value as u8) & !CONTINUATION;
        value >>= GROUP_BITS;

        // The encoding is complete once the remaining value is pure sign extension and the
        // group's sign bit agrees with it.
        let done = (value == 0 && byte & SIGN_BIT == 0) || (value == -1 && byte & SIGN_BIT != 0);

        output.write_all(&[if done { byte } else { byte | CONTINUATION }])?;
        written += 1;

        if done {
            break;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn parse_unsigned_large() {
        let input = [0xE5, 0x8E, 0x26];
        let (remaining, actual): (&[u8], u32) = parse_unsigned(&input).unwrap();

        assert_eq!(actual, 624485);
        assert!(remaining.is_empty());
    }

    #[test]
    fn parse_unsigned_with_remaining() {
        let input = [64, 0xFF];
        let (remaining, actual): (&[u8], u8) = parse_unsigned(&input).unwrap();

        assert_eq!(actual, 64);
        assert_eq!(remaining, &[0xFF]);
    }

    #[test]
    fn parse_unsigned_truncated() {
        let input = [0xE5, 0x8E];

        let result: Result<(&[u8], u32), _> = parse_unsigned(&input);

        assert!(result.is_err());
    }

    #[test]
    fn parse_unsigned_overlong() {
        // Six continuation groups cannot fit in a u32.
        let input = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];

        let result: Result<(&[u8], u32), _> = parse_unsigned(&input);

        assert!(result.is_err());
    }

    #[test]
    fn parse_signed_negative() {
        let input = [0xC0, 0xBB, 0x78];
        let (remaining, actual): (&[u8], i32) = parse_signed(&input).unwrap();

        assert_eq!(actual, -123456);
        assert!(remaining.is_empty());
    }

    #[test]
    fn encode_signed_negative_one() {
        let mut output = Vec::new();
        let written = encode_signed(-1i32, &mut output).unwrap();

        assert_eq!(written, 1);
        assert_eq!(output, vec![0x7F]);
    }

    #[test]
    fn encode_signed_group_boundary() {
        // 64 has the sign bit of its first group set, so it needs a second group.
        let mut output = Vec::new();
        let written = encode_signed(64i32, &mut output).unwrap();

        assert_eq!(written, 2);
        assert_eq!(output, vec![0xC0, 0x00]);
    }

    #[test]
    fn parse_s33_block_type() {
        // -64 is the one-byte encoding 0x40, the empty block type.
        let (remaining, actual) = parse_s33(&[0x40]).unwrap();

        assert_eq!(actual, -64);
        assert!(remaining.is_empty());
    }

    #[quickcheck]
    fn unsigned_round_trip(value: u64) -> bool {
        let mut encoded = Vec::new();
        encode_unsigned(value, &mut encoded).unwrap();

        let (remaining, decoded): (&[u8], u64) = parse_unsigned(&encoded).unwrap();
        remaining.is_empty() && decoded == value
    }

    #[quickcheck]
    fn signed_round_trip(value: i64) -> bool {
        let mut encoded = Vec::new();
        encode_signed(value, &mut encoded).unwrap();

        let (remaining, decoded): (&[u8], i64) = parse_signed(&encoded).unwrap();
        remaining.is_empty() && decoded == value
    }
}
