//! Parsing and printing of numeric literals.
//!
//! Integer parsing enforces a caller-provided bound and saturates on overflow so the caller
//! can report one diagnostic and continue. Decimal floats delegate to the standard library's
//! correctly-rounded decimal converter; hexadecimal floats go through an exact
//! round-to-nearest-even conversion implemented here, since the standard parser does not
//! accept them.

/// The bit layout of a binary floating point format.
#[derive(Copy, Clone, Debug)]
pub struct FloatFormat {
    pub exponent_bits: u32,
    pub significand_bits: u32,
}

pub const F32_FORMAT: FloatFormat = FloatFormat {
    exponent_bits: 8,
    significand_bits: 23,
};

pub const F64_FORMAT: FloatFormat = FloatFormat {
    exponent_bits: 11,
    significand_bits: 52,
};

impl FloatFormat {
    fn bias(&self) -> i32 {
        (1 << (self.exponent_bits - 1)) - 1
    }

    fn max_exponent_field(&self) -> u64 {
        (1 << self.exponent_bits) - 1
    }

    fn max_significand(&self) -> u64 {
        (1 << self.significand_bits) - 1
    }

    fn sign_bit(&self) -> u64 {
        1 << (self.exponent_bits + self.significand_bits)
    }

    fn infinity_bits(&self) -> u64 {
        self.max_exponent_field() << self.significand_bits
    }
}

/// The outcome of parsing a numeric literal: the value (saturated if out of range) and an
/// optional diagnostic message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NumberParse<T> {
    pub value: T,
    pub error: Option<String>,
}

impl<T> NumberParse<T> {
    fn ok(value: T) -> Self {
        NumberParse { value, error: None }
    }

    fn with_error(value: T, error: impl Into<String>) -> Self {
        NumberParse {
            value,
            error: Some(error.into()),
        }
    }
}

fn parse_sign(text: &mut &[u8]) -> bool {
    match text.first() {
        Some(b'-') => {
            *text = &text[1..];
            true
        }
        Some(b'+') => {
            *text = &text[1..];
            false
        }
        _ => false,
    }
}

fn hexit_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Parses hexits after a `0x`/`0X` prefix, skipping `_` separators. Saturates at `max_value`
/// and reports overflow once; trailing hexits are still consumed so parsing can continue past
/// the literal.
fn parse_hex_unsigned(text: &mut &[u8], max_value: u64, context: &str) -> NumberParse<u64> {
    debug_assert!(text.len() >= 2 && text[0] == b'0' && (text[1] == b'x' || text[1] == b'X'));
    *text = &text[2..];

    let mut result: u64 = 0;
    while let Some(&byte) = text.first() {
        if byte == b'_' {
            *text = &text[1..];
            continue;
        }
        let Some(hexit) = hexit_value(byte) else {
            break;
        };
        if result > (max_value - u64::from(hexit)) / 16 {
            while let Some(&byte) = text.first() {
                if byte == b'_' || hexit_value(byte).is_some() {
                    *text = &text[1..];
                } else {
                    break;
                }
            }
            return NumberParse::with_error(max_value, format!("{context} is too large"));
        }
        result = result * 16 + u64::from(hexit);
        *text = &text[1..];
    }
    NumberParse::ok(result)
}

/// Parses decimal digits, skipping `_` separators, with the same saturating overflow behavior
/// as [`parse_hex_unsigned`].
fn parse_decimal_unsigned(text: &mut &[u8], max_value: u64, context: &str) -> NumberParse<u64> {
    let mut result: u64 = 0;
    while let Some(&byte) = text.first() {
        if byte == b'_' {
            *text = &text[1..];
            continue;
        }
        if !byte.is_ascii_digit() {
            break;
        }
        let digit = u64::from(byte - b'0');
        if result > (max_value - digit) / 10 {
            while let Some(&byte) = text.first() {
                if byte == b'_' || byte.is_ascii_digit() {
                    *text = &text[1..];
                } else {
                    break;
                }
            }
            return NumberParse::with_error(max_value, format!("{context} is too large"));
        }
        result = result * 10 + digit;
        *text = &text[1..];
    }
    NumberParse::ok(result)
}

/// Parses an integer literal (the text starting at a decimal or hex int token) against the
/// given signed/unsigned bounds. The result is the two's complement bit pattern.
pub fn parse_int(text: &str, is_hex: bool, min_signed: i64, max_unsigned: u64) -> NumberParse<u64> {
    let mut bytes = text.as_bytes();
    let negative = parse_sign(&mut bytes);
    let bound = if negative {
        (min_signed as u64).wrapping_neg()
    } else {
        max_unsigned
    };
    let magnitude = if is_hex {
        parse_hex_unsigned(&mut bytes, bound, "int literal")
    } else {
        parse_decimal_unsigned(&mut bytes, bound, "int literal")
    };
    NumberParse {
        value: if negative {
            magnitude.value.wrapping_neg()
        } else {
            magnitude.value
        },
        error: magnitude.error,
    }
}

/// Parses a NaN literal (`nan` or `nan:0xPAYLOAD`), returning the bit pattern in the given
/// format's layout. A bare `nan` sets only the top significand bit; an explicit zero payload
/// is an error that substitutes significand 1.
pub fn parse_nan(text: &str, format: FloatFormat) -> NumberParse<u64> {
    let mut bytes = text.as_bytes();
    let negative = parse_sign(&mut bytes);
    debug_assert!(bytes.starts_with(b"nan"));
    bytes = &bytes[3..];

    let mut bits = format.infinity_bits();
    if negative {
        bits |= format.sign_bit();
    }

    let mut error = None;
    if bytes.first() == Some(&b':') {
        bytes = &bytes[1..];
        let payload = parse_hex_unsigned(&mut bytes, format.max_significand(), "NaN significand");
        let significand = if payload.value == 0 {
            error = Some("NaN significand must be non-zero".to_string());
            1
        } else {
            payload.value
        };
        if payload.error.is_some() {
            error = payload.error;
        }
        bits |= significand;
    } else {
        bits |= 1 << (format.significand_bits - 1);
    }

    NumberParse { value: bits, error }
}

/// Parses an infinity literal, returning the bit pattern in the given format's layout.
pub fn parse_infinity(text: &str, format: FloatFormat) -> u64 {
    let mut bytes = text.as_bytes();
    let negative = parse_sign(&mut bytes);
    let mut bits = format.infinity_bits();
    if negative {
        bits |= format.sign_bit();
    }
    bits
}

fn is_float_char(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
        || matches!(
            byte,
            b'x' | b'X' | b'p' | b'P' | b'+' | b'-' | b'.' | b'_'
        )
}

/// Parses a finite float literal (decimal or hexadecimal), returning the bit pattern in the
/// given format's layout. The text must start at a numeric token accepted by the lexer.
pub fn parse_float(text: &str, format: FloatFormat) -> NumberParse<u64> {
    // Take the maximal run of numeric characters and drop the separators.
    let end = text
        .bytes()
        .position(|byte| !is_float_char(byte))
        .unwrap_or(text.len());
    let literal: String = text[..end].chars().filter(|&c| c != '_').collect();

    let mut bytes = literal.as_bytes();
    let negative = parse_sign(&mut bytes);
    let sign_bits = if negative { format.sign_bit() } else { 0 };

    if bytes.len() >= 2 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X') {
        let magnitude = parse_hex_float_magnitude(&bytes[2..], format);
        return NumberParse {
            value: magnitude.value | sign_bits,
            error: magnitude.error,
        };
    }

    let unsigned = std::str::from_utf8(bytes).expect("the literal is ASCII");
    let bits = if format.significand_bits == F64_FORMAT.significand_bits {
        let value: f64 = unsigned.parse().expect("the lexer accepted a decimal float");
        value.to_bits()
    } else {
        let value: f32 = unsigned.parse().expect("the lexer accepted a decimal float");
        u64::from(value.to_bits())
    };

    if bits == format.infinity_bits() {
        return NumberParse::with_error(bits | sign_bits, "float literal is too large");
    }
    NumberParse::ok(bits | sign_bits)
}

/// Exact hexadecimal-float conversion: accumulates the significant hexits with a sticky bit
/// for everything beyond 64 bits, then rounds to nearest, ties to even.
fn parse_hex_float_magnitude(mut bytes: &[u8], format: FloatFormat) -> NumberParse<u64> {
    let mut mantissa: u64 = 0;
    let mut sticky = false;
    // Exponent of the mantissa's least significant bit, in base 2.
    let mut lsb_exponent: i64 = 0;
    let mut seen_point = false;

    while let Some(&byte) = bytes.first() {
        if byte == b'.' {
            debug_assert!(!seen_point);
            seen_point = true;
            bytes = &bytes[1..];
            continue;
        }
        let Some(hexit) = hexit_value(byte) else {
            break;
        };
        bytes = &bytes[1..];

        if mantissa >> 60 == 0 {
            mantissa = mantissa * 16 + u64::from(hexit);
            if seen_point {
                lsb_exponent -= 4;
            }
        } else {
            // The mantissa is saturated; further hexits only contribute magnitude or sticky.
            sticky |= hexit != 0;
            if !seen_point {
                lsb_exponent += 4;
            }
        }
    }

    if let Some(&byte) = bytes.first() {
        if byte == b'p' || byte == b'P' {
            bytes = &bytes[1..];
            let exp_negative = parse_sign(&mut bytes);
            // Exponents beyond the saturation bound land on infinity or zero below anyway.
            let exponent = parse_decimal_unsigned(&mut bytes, 1 << 20, "float exponent");
            let magnitude = exponent.value as i64;
            lsb_exponent += if exp_negative { -magnitude } else { magnitude };
        }
    }

    round_pack(mantissa, sticky, lsb_exponent, format)
}

/// Rounds `mantissa * 2^lsb_exponent` (with `sticky` marking discarded low bits) into the
/// format, producing magnitude bits.
fn round_pack(mantissa: u64, mut sticky: bool, lsb_exponent: i64, format: FloatFormat) -> NumberParse<u64> {
    if mantissa == 0 {
        return NumberParse::ok(0);
    }

    let msb = 63 - mantissa.leading_zeros() as i64;
    let value_exponent = msb + lsb_exponent;
    let bias = format.bias() as i64;
    let min_normal_exponent = 1 - bias;

    // How many low bits must be dropped so the kept mantissa has the right width.
    let drop = if value_exponent >= min_normal_exponent {
        msb - format.significand_bits as i64
    } else {
        // Subnormal: the kept mantissa's LSB must land on the format's minimum exponent.
        min_normal_exponent - format.significand_bits as i64 - lsb_exponent
    };

    let (mut kept, round_up) = if drop <= 0 {
        (mantissa << (-drop).min(63), false)
    } else if drop > 64 {
        sticky |= mantissa != 0;
        (0u64, false)
    } else {
        let kept = if drop == 64 { 0 } else { mantissa >> drop };
        let dropped = if drop == 64 {
            mantissa
        } else {
            mantissa & ((1u64 << drop) - 1)
        };
        let half = 1u64 << (drop - 1);
        sticky |= dropped & (half - 1) != 0;
        let round_up = dropped >= half && (dropped > half || sticky || kept & 1 == 1);
        (kept, round_up)
    };
    if round_up {
        kept += 1;
    }

    // Renormalize after a rounding carry and assemble the fields.
    let mut exponent_field = if value_exponent >= min_normal_exponent {
        value_exponent + bias
    } else {
        0
    };
    if kept >> (format.significand_bits + 1) != 0 {
        kept >>= 1;
        exponent_field += 1;
    } else if exponent_field == 0 && kept >> format.significand_bits != 0 {
        // A subnormal rounded up into the smallest normal.
        exponent_field = 1;
    }

    if exponent_field >= format.max_exponent_field() as i64 {
        return NumberParse::with_error(format.infinity_bits(), "float literal is too large");
    }

    let significand = kept & format.max_significand();
    NumberParse::ok(((exponent_field as u64) << format.significand_bits) | significand)
}

/// Prints an f32 bit pattern as a literal that parses back to the same bits.
pub fn print_f32(bits: u32) -> String {
    let value = f32::from_bits(bits);
    let negative = bits >> 31 != 0;
    let payload = bits & 0x007F_FFFF;
    print_float(value.is_nan(), value.is_infinite(), negative, u64::from(payload), 22, || {
        format!("{value}")
    })
}

/// Prints an f64 bit pattern as a literal that parses back to the same bits.
pub fn print_f64(bits: u64) -> String {
    let value = f64::from_bits(bits);
    let negative = bits >> 63 != 0;
    let payload = bits & 0x000F_FFFF_FFFF_FFFF;
    print_float(value.is_nan(), value.is_infinite(), negative, payload, 51, || {
        format!("{value}")
    })
}

fn print_float(
    is_nan: bool,
    is_infinite: bool,
    negative: bool,
    payload: u64,
    quiet_bit: u32,
    finite: impl Fn() -> String,
) -> String {
    let sign = if negative { "-" } else { "" };
    if is_nan {
        if payload == 1 << quiet_bit {
            format!("{sign}nan")
        } else {
            format!("{sign}nan:0x{payload:x}")
        }
    } else if is_infinite {
        format!("{sign}inf")
    } else {
        // The shortest round-tripping decimal form; the parser's decimal converter is
        // correctly rounded, so this is bit-exact. The sign is part of the value.
        finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn parses_bounded_integers() {
        assert_eq!(parse_int("42", false, i64::from(i32::MIN), u64::from(u32::MAX)).value, 42);
        assert_eq!(
            parse_int("-1", false, i64::from(i32::MIN), u64::from(u32::MAX)).value as u32,
            u32::MAX
        );
        assert_eq!(parse_int("0xff", true, 0, 255).value, 255);
        assert_eq!(parse_int("1_000_000", false, 0, u64::MAX).value, 1_000_000);
    }

    #[test]
    fn integer_overflow_saturates_with_a_diagnostic() {
        let result = parse_int("4294967296", false, i64::from(i32::MIN), u64::from(u32::MAX));
        assert_eq!(result.value, u64::from(u32::MAX));
        assert!(result.error.as_deref().unwrap().contains("too large"));

        let result = parse_int("-2147483649", false, i64::from(i32::MIN), u64::from(u32::MAX));
        assert!(result.error.is_some());
    }

    #[test]
    fn parses_decimal_floats_exactly() {
        assert_eq!(parse_float("0.5", F64_FORMAT).value, 0.5f64.to_bits());
        assert_eq!(parse_float("-2.5", F64_FORMAT).value, (-2.5f64).to_bits());
        assert_eq!(parse_float("1e10", F64_FORMAT).value, 1e10f64.to_bits());
        assert_eq!(
            parse_float("0.1", F32_FORMAT).value,
            u64::from(0.1f32.to_bits())
        );
    }

    #[test]
    fn parses_hex_floats_exactly() {
        assert_eq!(parse_float("0x1p0", F64_FORMAT).value, 1.0f64.to_bits());
        assert_eq!(parse_float("0x1.8p1", F64_FORMAT).value, 3.0f64.to_bits());
        assert_eq!(parse_float("0x3p-1", F64_FORMAT).value, 1.5f64.to_bits());
        assert_eq!(parse_float("-0x1p-1", F64_FORMAT).value, (-0.5f64).to_bits());
        assert_eq!(
            parse_float("0x1.fffffep127", F32_FORMAT).value,
            u64::from(f32::MAX.to_bits())
        );
        assert_eq!(
            parse_float("0x1.fffffffffffffp1023", F64_FORMAT).value,
            f64::MAX.to_bits()
        );
        // The smallest subnormals.
        assert_eq!(parse_float("0x1p-1074", F64_FORMAT).value, 1);
        assert_eq!(parse_float("0x1p-149", F32_FORMAT).value, 1);
        // Below half the smallest subnormal rounds to zero.
        assert_eq!(parse_float("0x1p-1076", F64_FORMAT).value, 0);
    }

    #[test]
    fn hex_float_rounding_is_to_nearest_even() {
        // 53 significant bits plus a tie: rounds to even (down).
        assert_eq!(
            parse_float("0x1.00000000000008p0", F64_FORMAT).value,
            1.0f64.to_bits()
        );
        // A tie with the kept LSB set rounds up.
        assert_eq!(
            parse_float("0x1.00000000000018p0", F64_FORMAT).value,
            f64::from_bits(1.0f64.to_bits() + 2).to_bits()
        );
        // Beyond-the-tie bits force rounding up.
        assert_eq!(
            parse_float("0x1.000000000000081p0", F64_FORMAT).value,
            f64::from_bits(1.0f64.to_bits() + 1).to_bits()
        );
    }

    #[test]
    fn hex_float_overflow_is_reported() {
        let result = parse_float("0x1p1024", F64_FORMAT);
        assert_eq!(result.value, F64_FORMAT.infinity_bits());
        assert!(result.error.is_some());
    }

    #[test]
    fn nan_literals() {
        // A bare NaN sets only the top significand bit.
        assert_eq!(parse_nan("nan", F64_FORMAT).value, 0x7FF8_0000_0000_0000);
        assert_eq!(
            parse_nan("-nan", F32_FORMAT).value,
            u64::from(0xFFC0_0000u32)
        );
        assert_eq!(
            parse_nan("nan:0x7", F64_FORMAT).value,
            0x7FF0_0000_0000_0007
        );

        // An explicit zero significand is rejected but substitutes 1.
        let zero_payload = parse_nan("nan:0x0", F64_FORMAT);
        assert_eq!(zero_payload.value, 0x7FF0_0000_0000_0001);
        assert!(zero_payload
            .error
            .as_deref()
            .unwrap()
            .contains("must be non-zero"));
    }

    #[test]
    fn infinity_literals() {
        assert_eq!(parse_infinity("inf", F64_FORMAT), f64::INFINITY.to_bits());
        assert_eq!(
            parse_infinity("-inf", F64_FORMAT),
            f64::NEG_INFINITY.to_bits()
        );
    }

    #[test]
    fn printed_nans_round_trip() {
        assert_eq!(print_f64(0x7FF8_0000_0000_0000), "nan");
        assert_eq!(print_f64(0xFFF8_0000_0000_0000), "-nan");
        assert_eq!(print_f64(0x7FF0_0000_0000_0007), "nan:0x7");
        assert_eq!(print_f32(0x7FC0_0001), "nan:0x400001");
    }

    #[quickcheck]
    fn printed_f64_round_trips(bits: u64) -> bool {
        let printed = print_f64(bits);
        let reparsed = if printed.contains("nan") {
            parse_nan(&printed, F64_FORMAT).value
        } else if printed.contains("inf") {
            parse_infinity(&printed, F64_FORMAT)
        } else {
            parse_float(&printed, F64_FORMAT).value
        };
        reparsed == bits
    }

    #[quickcheck]
    fn printed_f32_round_trips(bits: u32) -> bool {
        let printed = print_f32(bits);
        let reparsed = if printed.contains("nan") {
            parse_nan(&printed, F32_FORMAT).value
        } else if printed.contains("inf") {
            parse_infinity(&printed, F32_FORMAT)
        } else {
            parse_float(&printed, F32_FORMAT).value
        };
        reparsed as u32 == bits
    }
}
