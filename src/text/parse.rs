//! Shared plumbing for the recursive-descent text parsers: the token cursor, the three error
//! modalities, name binding and reference resolution, and token-level literal parsing.
//!
//! Diagnostics accumulate on [`ParseState`] and parsing continues; a recoverable failure
//! unwinds as `Err(ParseAbort::Recover)` to the nearest [`parse_parenthesized`] scope, which
//! skips to the matching `)`; a fatal failure unwinds to the entry point.

use crate::features::FeatureSpec;
use crate::model::{ReferenceType, ValueType};
use crate::operators::operator_index_by_mnemonic;
use crate::text::lexer::{
    calc_locus_from_offset, describe_token, LineInfo, TextFileLocus, Token, TokenType, T_EQUALS,
    T_EXTERNREF, T_F32, T_F32X4, T_F64, T_F64X2, T_FIRST_OPERATOR, T_FLOAT_INF, T_FLOAT_NAN,
    T_FUNCREF, T_DECIMAL_FLOAT, T_DECIMAL_INT, T_HEX_FLOAT, T_HEX_INT, T_I16X8, T_I32, T_I32X4,
    T_I64, T_I64X2, T_I8X16, T_LEFT_PAREN, T_NAME, T_QUOTED_NAME, T_RIGHT_PAREN, T_STRING,
    T_V128, T_EOF,
};
use crate::text::numbers::{
    self, FloatFormat, F32_FORMAT, F64_FORMAT,
};
use std::collections::HashMap;

/// A text parse or validation diagnostic: a resolved source location and a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    pub locus: TextFileLocus,
    pub message: String,
}

/// Internal control flow for abandoning a parse.
///
/// `Recover` unwinds to the nearest enclosing parenthesized scope; `Fatal` unwinds to the
/// top-level entry point. Neither leaks out of the crate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseAbort {
    Recover,
    Fatal,
}

pub type Parse<T> = Result<T, ParseAbort>;

/// State shared across one parse: the source, its line table, the accepted features, and the
/// accumulated diagnostics.
pub struct ParseState<'s> {
    pub source: &'s str,
    pub line_info: &'s LineInfo,
    pub features: FeatureSpec,
    pub errors: Vec<Error>,
    pub recursion_depth: usize,
}

impl<'s> ParseState<'s> {
    pub fn new(source: &'s str, line_info: &'s LineInfo, features: FeatureSpec) -> Self {
        ParseState {
            source,
            line_info,
            features,
            errors: Vec::new(),
            recursion_depth: 0,
        }
    }

    /// Records a diagnostic at the given byte offset.
    pub fn error_at_offset(&mut self, offset: usize, message: impl Into<String>) {
        let locus = calc_locus_from_offset(self.source, self.line_info, offset);
        self.errors.push(Error {
            locus,
            message: message.into(),
        });
    }

    /// Resolves a byte offset to a locus, for embedding in another diagnostic's message.
    pub fn describe_offset(&self, offset: usize) -> String {
        calc_locus_from_offset(self.source, self.line_info, offset).describe()
    }
}

/// The token cursor threaded through the parsers. Reads past the end saturate on the final
/// EOF token.
#[derive(Copy, Clone)]
pub struct Cursor<'t> {
    pub tokens: &'t [Token],
    pub position: usize,
}

impl<'t> Cursor<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        debug_assert!(matches!(tokens.last(), Some(token) if token.ty == T_EOF));
        Cursor {
            tokens,
            position: 0,
        }
    }

    pub fn token(&self) -> Token {
        self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub fn ty(&self) -> TokenType {
        self.token().ty
    }

    pub fn peek(&self, ahead: usize) -> Token {
        self.tokens[(self.position + ahead).min(self.tokens.len() - 1)]
    }

    pub fn offset(&self) -> usize {
        self.token().begin as usize
    }

    pub fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    /// The source text starting at the current token. Literal parsers stop at the first byte
    /// that isn't part of the literal.
    pub fn text<'s>(&self, state: &ParseState<'s>) -> &'s str {
        &state.source[self.offset()..]
    }
}

/// The token type of an operator's text mnemonic.
pub(crate) fn op_token(mnemonic: &str) -> TokenType {
    T_FIRST_OPERATOR + operator_index_by_mnemonic(mnemonic).expect("known operator mnemonic")
}

/// Records an "expected X" diagnostic at the current token.
pub fn expected_error(cursor: &Cursor, state: &mut ParseState, expected: &str) {
    let found = describe_token(cursor.ty());
    state.error_at_offset(cursor.offset(), format!("expected {expected} but found {found}"));
}

/// Requires the current token to have the given type, consuming it; otherwise records a
/// diagnostic and recovers.
pub fn require(cursor: &mut Cursor, state: &mut ParseState, ty: TokenType) -> Parse<()> {
    if cursor.ty() == ty {
        cursor.advance();
        Ok(())
    } else {
        expected_error(cursor, state, &describe_token(ty));
        Err(ParseAbort::Recover)
    }
}

/// Finds the parenthesis closing the s-expression opened at `opening_position`, leaving the
/// cursor just past it. Reaching EOF instead is fatal.
pub fn find_closing_parenthesis(
    cursor: &mut Cursor,
    state: &mut ParseState,
    opening_position: usize,
) -> Parse<()> {
    let mut depth = 1usize;
    loop {
        match cursor.ty() {
            T_LEFT_PAREN => depth += 1,
            T_RIGHT_PAREN => {
                depth -= 1;
                if depth == 0 {
                    cursor.advance();
                    return Ok(());
                }
            }
            T_EOF => {
                let opening_offset = cursor.tokens[opening_position].begin as usize;
                state.error_at_offset(
                    cursor.offset(),
                    format!(
                        "reached end of input while looking for the ')' closing the '(' at {}",
                        state.describe_offset(opening_offset)
                    ),
                );
                return Err(ParseAbort::Fatal);
            }
            _ => {}
        }
        cursor.advance();
    }
}

/// Parses the surrounding parentheses for an inner parser, bounding recursion depth and
/// handling recovery at the closing parenthesis.
pub fn parse_parenthesized<F>(cursor: &mut Cursor, state: &mut ParseState, inner: F) -> Parse<()>
where
    F: FnOnce(&mut Cursor, &mut ParseState) -> Parse<()>,
{
    let opening_position = cursor.position;
    require(cursor, state, T_LEFT_PAREN)?;

    state.recursion_depth += 1;
    let result = if state.recursion_depth > state.features.max_syntax_recursion {
        state.error_at_offset(cursor.offset(), "syntax recursion limit exceeded");
        Err(ParseAbort::Fatal)
    } else {
        inner(cursor, state).and_then(|()| require(cursor, state, T_RIGHT_PAREN))
    };
    state.recursion_depth -= 1;

    match result {
        Ok(()) => Ok(()),
        Err(ParseAbort::Recover) => find_closing_parenthesis(cursor, state, opening_position),
        Err(ParseAbort::Fatal) => Err(ParseAbort::Fatal),
    }
}

/// Tries to parse `'(' tag inner ')'`. Returns false without consuming anything if the next
/// two tokens aren't `(` and the tag.
pub fn try_parse_parenthesized_tagged<F>(
    cursor: &mut Cursor,
    state: &mut ParseState,
    tag: TokenType,
    inner: F,
) -> Parse<bool>
where
    F: FnOnce(&mut Cursor, &mut ParseState) -> Parse<()>,
{
    if cursor.ty() != T_LEFT_PAREN || cursor.peek(1).ty != tag {
        return Ok(false);
    }
    parse_parenthesized(cursor, state, |cursor, state| {
        cursor.advance();
        inner(cursor, state)
    })?;
    Ok(true)
}

/// A name (`$whatever`) parsed from the source, carrying the offset it was parsed from so
/// redefinitions can point at the previous site.
#[derive(Clone, Debug)]
pub struct Name {
    pub text: String,
    pub source_offset: u32,
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Name {}

/// A map from name to index-space index, remembering each binding site.
#[derive(Default)]
pub struct NameToIndexMap {
    bindings: HashMap<String, (u32, u32)>,
}

impl NameToIndexMap {
    pub fn get(&self, text: &str) -> Option<u32> {
        self.bindings.get(text).map(|&(index, _)| index)
    }
}

/// Binds a name to an index, reporting a redefinition (pointing at the previous binding site)
/// and overwriting so parsing can continue.
pub fn bind_name(state: &mut ParseState, map: &mut NameToIndexMap, name: &Name, index: u32) {
    if let Some((_, previous_offset)) = map
        .bindings
        .insert(name.text.clone(), (index, name.source_offset))
    {
        state.error_at_offset(
            name.source_offset as usize,
            format!(
                "redefinition of name '${}' (previously defined at {})",
                name.text,
                state.describe_offset(previous_offset as usize)
            ),
        );
    }
}

/// A yet-to-be-resolved named or numeric designator of an index-space entry.
#[derive(Clone, Debug)]
pub enum Reference {
    Name(Name),
    Index { index: u32, source_offset: u32 },
}

impl Reference {
    pub fn source_offset(&self) -> u32 {
        match self {
            Reference::Name(name) => name.source_offset,
            Reference::Index { source_offset, .. } => *source_offset,
        }
    }
}

/// Resolves a reference against a name map and an index bound. On failure records one
/// diagnostic and returns `u32::MAX` so dependent checks can keep going.
pub fn resolve_ref(
    state: &mut ParseState,
    map: &NameToIndexMap,
    max_index: u32,
    reference: &Reference,
) -> u32 {
    match reference {
        Reference::Name(name) => match map.get(&name.text) {
            Some(index) => index,
            None => {
                state.error_at_offset(
                    name.source_offset as usize,
                    format!("unknown name '${}'", name.text),
                );
                u32::MAX
            }
        },
        Reference::Index {
            index,
            source_offset,
        } => {
            if *index >= max_index {
                state.error_at_offset(
                    *source_offset as usize,
                    format!("invalid index {index}: must be less than {max_index}"),
                );
                u32::MAX
            } else {
                *index
            }
        }
    }
}

/// Tries to parse a `$name` token, decoding the quoted form when the feature allows it.
pub fn try_parse_name(cursor: &mut Cursor, state: &mut ParseState) -> Option<Name> {
    let token = cursor.token();
    match token.ty {
        T_NAME => {
            let text = cursor.text(state);
            let end = text[1..]
                .bytes()
                .position(|byte| !is_name_byte(byte))
                .map(|position| position + 1)
                .unwrap_or(text.len());
            let name = Name {
                text: text[1..end].to_string(),
                source_offset: token.begin,
            };
            cursor.advance();
            Some(name)
        }
        T_QUOTED_NAME => {
            if !state.features.quoted_names_in_text_format {
                state.error_at_offset(
                    token.begin as usize,
                    "quoted names are not allowed unless the quoted-names feature is enabled",
                );
            }
            // Skip the '$' and decode the string literal that follows.
            let text = cursor.text(state);
            let (bytes, _) = decode_string_body(&text[1..]);
            cursor.advance();
            match String::from_utf8(bytes) {
                Ok(decoded) if !decoded.is_empty() => Some(Name {
                    text: decoded,
                    source_offset: token.begin,
                }),
                _ => {
                    state.error_at_offset(
                        token.begin as usize,
                        "quoted name must be non-empty, valid UTF-8",
                    );
                    Some(Name {
                        text: String::new(),
                        source_offset: token.begin,
                    })
                }
            }
        }
        _ => None,
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'\'' | b'_'
                | b'+'
                | b'*'
                | b'/'
                | b'~'
                | b'='
                | b'<'
                | b'>'
                | b'!'
                | b'?'
                | b'@'
                | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'|'
                | b':'
                | b'`'
                | b'.'
                | b'-'
                | b'^'
                | b'\\'
        )
}

/// Parses a `$name`, recovering with a diagnostic naming the context if absent.
pub fn parse_name(cursor: &mut Cursor, state: &mut ParseState, context: &str) -> Parse<Name> {
    match try_parse_name(cursor, state) {
        Some(name) => Ok(name),
        None => {
            expected_error(cursor, state, context);
            Err(ParseAbort::Recover)
        }
    }
}

/// Tries to parse a reference: either a `$name` or a numeric index.
pub fn try_parse_name_or_index_ref(cursor: &mut Cursor, state: &mut ParseState) -> Option<Reference> {
    if let Some(name) = try_parse_name(cursor, state) {
        return Some(Reference::Name(name));
    }
    let source_offset = cursor.token().begin;
    try_parse_u32(cursor, state).map(|index| Reference::Index {
        index,
        source_offset,
    })
}

/// Parses a reference, recovering with a diagnostic naming the context if absent.
pub fn parse_name_or_index_ref(
    cursor: &mut Cursor,
    state: &mut ParseState,
    context: &str,
) -> Parse<Reference> {
    match try_parse_name_or_index_ref(cursor, state) {
        Some(reference) => Ok(reference),
        None => {
            expected_error(cursor, state, context);
            Err(ParseAbort::Recover)
        }
    }
}

/// Parses and resolves a reference in one step.
pub fn parse_and_resolve_ref(
    cursor: &mut Cursor,
    state: &mut ParseState,
    map: &NameToIndexMap,
    max_index: u32,
    context: &str,
) -> Parse<u32> {
    let reference = parse_name_or_index_ref(cursor, state, context)?;
    Ok(resolve_ref(state, map, max_index, &reference))
}

/// Tries to parse a value-type keyword.
pub fn try_parse_value_type(cursor: &mut Cursor) -> Option<ValueType> {
    let kind = match cursor.ty() {
        T_I32 => ValueType::I32,
        T_I64 => ValueType::I64,
        T_F32 => ValueType::F32,
        T_F64 => ValueType::F64,
        T_V128 => ValueType::V128,
        T_FUNCREF => ValueType::FuncRef,
        T_EXTERNREF => ValueType::ExternRef,
        _ => return None,
    };
    cursor.advance();
    Some(kind)
}

/// Parses a value-type keyword, recovering with a diagnostic if absent.
pub fn parse_value_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<ValueType> {
    match try_parse_value_type(cursor) {
        Some(kind) => Ok(kind),
        None => {
            expected_error(cursor, state, "value type");
            Err(ParseAbort::Recover)
        }
    }
}

/// Tries to parse a reference-type keyword.
pub fn try_parse_reference_type(cursor: &mut Cursor) -> Option<ReferenceType> {
    let kind = match cursor.ty() {
        T_FUNCREF => ReferenceType::FuncRef,
        T_EXTERNREF => ReferenceType::ExternRef,
        _ => return None,
    };
    cursor.advance();
    Some(kind)
}

/// Parses a reference-type keyword, recovering with a diagnostic if absent.
pub fn parse_reference_type(cursor: &mut Cursor, state: &mut ParseState) -> Parse<ReferenceType> {
    match try_parse_reference_type(cursor) {
        Some(kind) => Ok(kind),
        None => {
            expected_error(cursor, state, "reference type");
            Err(ParseAbort::Recover)
        }
    }
}

/// Tries to parse an integer literal token within the given bounds, returning its two's
/// complement bit pattern. Overflow is reported once and saturates.
pub fn try_parse_int(
    cursor: &mut Cursor,
    state: &mut ParseState,
    min_signed: i64,
    max_unsigned: u64,
) -> Option<u64> {
    let is_hex = match cursor.ty() {
        T_DECIMAL_INT => false,
        T_HEX_INT => true,
        _ => return None,
    };
    let offset = cursor.offset();
    let parsed = numbers::parse_int(cursor.text(state), is_hex, min_signed, max_unsigned);
    if let Some(message) = parsed.error {
        state.error_at_offset(offset, message);
    }
    cursor.advance();
    Some(parsed.value)
}

pub fn try_parse_u32(cursor: &mut Cursor, state: &mut ParseState) -> Option<u32> {
    try_parse_int(cursor, state, 0, u64::from(u32::MAX)).map(|bits| bits as u32)
}

pub fn try_parse_u64(cursor: &mut Cursor, state: &mut ParseState) -> Option<u64> {
    try_parse_int(cursor, state, 0, u64::MAX)
}

fn parse_int_or_recover(
    cursor: &mut Cursor,
    state: &mut ParseState,
    min_signed: i64,
    max_unsigned: u64,
    context: &str,
) -> Parse<u64> {
    match try_parse_int(cursor, state, min_signed, max_unsigned) {
        Some(bits) => Ok(bits),
        None => {
            expected_error(cursor, state, context);
            Err(ParseAbort::Recover)
        }
    }
}

pub fn parse_u8(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u8> {
    parse_int_or_recover(cursor, state, i64::from(i8::MIN), u64::from(u8::MAX), "i8 literal")
        .map(|bits| bits as u8)
}

pub fn parse_u32(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u32> {
    parse_int_or_recover(cursor, state, 0, u64::from(u32::MAX), "u32 literal").map(|bits| bits as u32)
}

pub fn parse_u64(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u64> {
    parse_int_or_recover(cursor, state, 0, u64::MAX, "u64 literal")
}

/// Uninterpreted integers admit the whole range from the signed minimum to the unsigned
/// maximum of their width.
pub fn parse_i8(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u8> {
    parse_int_or_recover(cursor, state, i64::from(i8::MIN), u64::from(u8::MAX), "i8 literal")
        .map(|bits| bits as u8)
}

pub fn parse_i16(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u16> {
    parse_int_or_recover(cursor, state, i64::from(i16::MIN), u64::from(u16::MAX), "i16 literal")
        .map(|bits| bits as u16)
}

pub fn parse_i32(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u32> {
    parse_int_or_recover(cursor, state, i64::from(i32::MIN), u64::from(u32::MAX), "i32 literal")
        .map(|bits| bits as u32)
}

pub fn parse_i64(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u64> {
    parse_int_or_recover(cursor, state, i64::MIN, u64::MAX, "i64 literal")
}

fn try_parse_float_bits(
    cursor: &mut Cursor,
    state: &mut ParseState,
    format: FloatFormat,
) -> Option<u64> {
    let offset = cursor.offset();
    let parsed = match cursor.ty() {
        T_DECIMAL_INT | T_DECIMAL_FLOAT | T_HEX_INT | T_HEX_FLOAT => {
            numbers::parse_float(cursor.text(state), format)
        }
        T_FLOAT_NAN => numbers::parse_nan(cursor.text(state), format),
        T_FLOAT_INF => numbers::NumberParse {
            value: numbers::parse_infinity(cursor.text(state), format),
            error: None,
        },
        _ => return None,
    };
    if let Some(message) = parsed.error {
        state.error_at_offset(offset, message);
    }
    cursor.advance();
    Some(parsed.value)
}

pub fn try_parse_f32(cursor: &mut Cursor, state: &mut ParseState) -> Option<u32> {
    try_parse_float_bits(cursor, state, F32_FORMAT).map(|bits| bits as u32)
}

pub fn try_parse_f64(cursor: &mut Cursor, state: &mut ParseState) -> Option<u64> {
    try_parse_float_bits(cursor, state, F64_FORMAT)
}

pub fn parse_f32(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u32> {
    match try_parse_f32(cursor, state) {
        Some(bits) => Ok(bits),
        None => {
            expected_error(cursor, state, "f32 literal");
            Err(ParseAbort::Recover)
        }
    }
}

pub fn parse_f64(cursor: &mut Cursor, state: &mut ParseState) -> Parse<u64> {
    match try_parse_f64(cursor, state) {
        Some(bits) => Ok(bits),
        None => {
            expected_error(cursor, state, "f64 literal");
            Err(ParseAbort::Recover)
        }
    }
}

/// Parses a 128-bit vector literal: a lane-format keyword followed by that many lane literals.
pub fn parse_v128(cursor: &mut Cursor, state: &mut ParseState) -> Parse<[u8; 16]> {
    let mut bytes = [0u8; 16];
    match cursor.ty() {
        T_I8X16 => {
            cursor.advance();
            for lane in 0..16 {
                bytes[lane] = parse_i8(cursor, state)?;
            }
        }
        T_I16X8 => {
            cursor.advance();
            for lane in 0..8 {
                let value = parse_i16(cursor, state)?;
                bytes[lane * 2..lane * 2 + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        T_I32X4 => {
            cursor.advance();
            for lane in 0..4 {
                let value = parse_i32(cursor, state)?;
                bytes[lane * 4..lane * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
        T_I64X2 => {
            cursor.advance();
            for lane in 0..2 {
                let value = parse_i64(cursor, state)?;
                bytes[lane * 8..lane * 8 + 8].copy_from_slice(&value.to_le_bytes());
            }
        }
        T_F32X4 => {
            cursor.advance();
            for lane in 0..4 {
                let value = parse_f32(cursor, state)?;
                bytes[lane * 4..lane * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
        T_F64X2 => {
            cursor.advance();
            for lane in 0..2 {
                let value = parse_f64(cursor, state)?;
                bytes[lane * 8..lane * 8 + 8].copy_from_slice(&value.to_le_bytes());
            }
        }
        _ => {
            expected_error(cursor, state, "v128 lane format");
            return Err(ParseAbort::Recover);
        }
    }
    Ok(bytes)
}

/// Decodes the body of a string literal starting at its opening quote. Returns the decoded
/// bytes and an optional error message. The lexer guarantees the overall shape.
fn decode_string_body(text: &str) -> (Vec<u8>, Option<String>) {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'"'));

    let mut decoded = Vec::new();
    let mut error = None;
    let mut position = 1usize;
    while position < bytes.len() {
        match bytes[position] {
            b'"' => break,
            b'\\' => {
                position += 1;
                match bytes.get(position) {
                    Some(b'n') => {
                        decoded.push(b'\n');
                        position += 1;
                    }
                    Some(b'r') => {
                        decoded.push(b'\r');
                        position += 1;
                    }
                    Some(b't') => {
                        decoded.push(b'\t');
                        position += 1;
                    }
                    Some(b'\\') => {
                        decoded.push(b'\\');
                        position += 1;
                    }
                    Some(b'\'') => {
                        decoded.push(b'\'');
                        position += 1;
                    }
                    Some(b'"') => {
                        decoded.push(b'"');
                        position += 1;
                    }
                    Some(b'u') => {
                        // \u{HEX...}: a Unicode scalar value encoded as UTF-8.
                        position += 2;
                        let mut codepoint: u32 = 0;
                        let mut overflow = false;
                        while let Some(&byte) = bytes.get(position) {
                            if byte == b'}' {
                                position += 1;
                                break;
                            }
                            let hexit = match byte {
                                b'0'..=b'9' => byte - b'0',
                                b'a'..=b'f' => byte - b'a' + 10,
                                b'A'..=b'F' => byte - b'A' + 10,
                                _ => break,
                            };
                            codepoint = codepoint
                                .checked_mul(16)
                                .and_then(|c| c.checked_add(u32::from(hexit)))
                                .unwrap_or_else(|| {
                                    overflow = true;
                                    0
                                });
                            position += 1;
                        }
                        match char::from_u32(codepoint).filter(|_| !overflow) {
                            Some(scalar) => {
                                let mut buffer = [0u8; 4];
                                decoded.extend_from_slice(scalar.encode_utf8(&mut buffer).as_bytes());
                            }
                            None => {
                                error = Some(format!(
                                    "invalid Unicode codepoint {codepoint:#x} in string escape"
                                ));
                            }
                        }
                    }
                    Some(&high) if high.is_ascii_hexdigit() => {
                        let low = bytes.get(position + 1).copied().unwrap_or(b'0');
                        let byte = (hexit(high) << 4) | hexit(low);
                        decoded.push(byte);
                        position += 2;
                    }
                    _ => {
                        error = Some("unrecognized string escape".to_string());
                        position += 1;
                    }
                }
            }
            byte => {
                decoded.push(byte);
                position += 1;
            }
        }
    }
    (decoded, error)
}

fn hexit(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        _ => byte - b'A' + 10,
    }
}

/// Tries to parse a string literal token into raw bytes.
pub fn try_parse_string(cursor: &mut Cursor, state: &mut ParseState) -> Option<Vec<u8>> {
    if cursor.ty() != T_STRING {
        return None;
    }
    let offset = cursor.offset();
    let (decoded, error) = decode_string_body(cursor.text(state));
    if let Some(message) = error {
        state.error_at_offset(offset, message);
    }
    cursor.advance();
    Some(decoded)
}

/// Parses a string literal, recovering with a diagnostic if absent.
pub fn parse_string(cursor: &mut Cursor, state: &mut ParseState) -> Parse<Vec<u8>> {
    match try_parse_string(cursor, state) {
        Some(bytes) => Ok(bytes),
        None => {
            expected_error(cursor, state, "string literal");
            Err(ParseAbort::Recover)
        }
    }
}

/// Parses a string literal that must be valid UTF-8 (module names, export names).
pub fn parse_utf8_string(cursor: &mut Cursor, state: &mut ParseState) -> Parse<String> {
    let offset = cursor.offset();
    let bytes = parse_string(cursor, state)?;
    match String::from_utf8(bytes) {
        Ok(string) => Ok(string),
        Err(_) => {
            state.error_at_offset(offset, "string is not valid UTF-8");
            Ok(String::new())
        }
    }
}

/// Consumes `offset=N` or `align=N` if the keyword matches, returning the value.
pub fn try_parse_keyword_assignment(
    cursor: &mut Cursor,
    state: &mut ParseState,
    keyword: TokenType,
) -> Parse<Option<u64>> {
    if cursor.ty() != keyword {
        return Ok(None);
    }
    cursor.advance();
    require(cursor, state, T_EQUALS)?;
    parse_u64(cursor, state).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::lexer::lex;

    fn with_state<T>(
        source: &str,
        run: impl FnOnce(&mut Cursor, &mut ParseState) -> T,
    ) -> (T, Vec<Error>) {
        let (tokens, line_info) = lex(source, false);
        let mut state = ParseState::new(source, &line_info, FeatureSpec::default());
        let mut cursor = Cursor::new(&tokens);
        let result = run(&mut cursor, &mut state);
        (result, state.errors)
    }

    #[test]
    fn parses_names_and_references() {
        let (name, errors) = with_state("$foo", |cursor, state| {
            try_parse_name(cursor, state).unwrap()
        });
        assert_eq!(name.text, "foo");
        assert!(errors.is_empty());

        let (reference, _) = with_state("7", |cursor, state| {
            try_parse_name_or_index_ref(cursor, state).unwrap()
        });
        assert!(matches!(reference, Reference::Index { index: 7, .. }));
    }

    #[test]
    fn binding_reports_redefinitions() {
        let ((), errors) = with_state("$x $x", |cursor, state| {
            let mut map = NameToIndexMap::default();
            let first = try_parse_name(cursor, state).unwrap();
            let second = try_parse_name(cursor, state).unwrap();
            bind_name(state, &mut map, &first, 0);
            bind_name(state, &mut map, &second, 1);
            assert_eq!(map.get("x"), Some(1));
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("redefinition"));
    }

    #[test]
    fn unknown_names_resolve_to_sentinel() {
        let (resolved, errors) = with_state("$ghost", |cursor, state| {
            let map = NameToIndexMap::default();
            let reference = try_parse_name_or_index_ref(cursor, state).unwrap();
            resolve_ref(state, &map, 10, &reference)
        });
        assert_eq!(resolved, u32::MAX);
        assert!(errors[0].message.contains("unknown name"));
    }

    #[test]
    fn string_escapes_decode() {
        let (bytes, errors) = with_state(r#""a\n\00\u{41}""#, |cursor, state| {
            parse_string(cursor, state).unwrap()
        });
        assert_eq!(bytes, b"a\n\0A");
        assert!(errors.is_empty());
    }

    #[test]
    fn surrogate_codepoints_are_rejected() {
        let ((), errors) = with_state(r#""\u{d800}""#, |cursor, state| {
            parse_string(cursor, state).map(|_| ()).unwrap()
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("codepoint"));
    }

    #[test]
    fn quoted_names_are_feature_gated() {
        let source = r#"$"spaced name""#;
        let (tokens, line_info) = lex(source, false);

        let mut state = ParseState::new(source, &line_info, FeatureSpec::default());
        let mut cursor = Cursor::new(&tokens);
        let _ = try_parse_name(&mut cursor, &mut state);
        assert!(!state.errors.is_empty());

        let mut features = FeatureSpec::default();
        features.quoted_names_in_text_format = true;
        let mut state = ParseState::new(source, &line_info, features);
        let mut cursor = Cursor::new(&tokens);
        let name = try_parse_name(&mut cursor, &mut state).unwrap();
        assert_eq!(name.text, "spaced name");
        assert!(state.errors.is_empty());
    }

    #[test]
    fn parenthesized_recovery_skips_to_matching_close() {
        let ((), errors) = with_state("(func junk! (nested) more) (table)", |cursor, state| {
            parse_parenthesized(cursor, state, |cursor, state| {
                require(cursor, state, T_FUNCREF).map(|_| ())
            })
            .unwrap();
            // Recovery must leave the cursor at the next form.
            assert_eq!(cursor.ty(), T_LEFT_PAREN);
        });
        assert!(!errors.is_empty());
    }

    #[test]
    fn eof_during_recovery_is_fatal() {
        let (result, _) = with_state("(func", |cursor, state| {
            parse_parenthesized(cursor, state, |cursor, state| {
                require(cursor, state, T_FUNCREF).map(|_| ())
            })
        });
        assert_eq!(result, Err(ParseAbort::Fatal));
    }

    #[test]
    fn v128_lane_literals() {
        let (bytes, errors) = with_state("i32x4 1 2 3 4", |cursor, state| {
            parse_v128(cursor, state).unwrap()
        });
        assert!(errors.is_empty());
        assert_eq!(
            bytes,
            [1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]
        );
    }
}
