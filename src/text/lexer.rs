//! The table-driven lexer for the WebAssembly text format.
//!
//! The lexer is driven by a DFA compiled once (per legacy-names mode) from the union of all
//! token regexps and literal keywords, including every operator mnemonic from the operator
//! table. It emits a packed array of `(token type, begin offset)` pairs terminated by an EOF
//! token, plus a [`LineInfo`] table for resolving byte offsets to line/column loci.

use crate::operators::table::LEGACY_OPERATOR_ALIASES;
use crate::operators::{operator_index_by_mnemonic, OPERATORS};
use crate::text::charset::CharSet;
use crate::text::nfa::{
    terminal_state, token_of_terminal, Builder, Machine, StateIndex,
    EDGE_DOESNT_CONSUME_INPUT_FLAG, UNMATCHED_CHARACTER_TERMINAL,
};
use crate::text::regexp;
use once_cell::sync::Lazy;
use std::cell::Cell;

pub type TokenType = u16;

pub const T_EOF: TokenType = 0;
pub const T_UNTERMINATED_COMMENT: TokenType = 1;
pub const T_UNRECOGNIZED: TokenType = 2;
pub const T_LEGACY_INSTRUCTION_NAME: TokenType = 3;
pub const T_DECIMAL_FLOAT: TokenType = 4;
pub const T_DECIMAL_INT: TokenType = 5;
pub const T_HEX_FLOAT: TokenType = 6;
pub const T_HEX_INT: TokenType = 7;
pub const T_FLOAT_NAN: TokenType = 8;
pub const T_FLOAT_INF: TokenType = 9;
pub const T_CANONICAL_NAN: TokenType = 10;
pub const T_ARITHMETIC_NAN: TokenType = 11;
pub const T_STRING: TokenType = 12;
pub const T_NAME: TokenType = 13;
pub const T_QUOTED_NAME: TokenType = 14;
pub const T_LEFT_PAREN: TokenType = 15;
pub const T_RIGHT_PAREN: TokenType = 16;
pub const T_EQUALS: TokenType = 17;

pub const T_MODULE: TokenType = 18;
pub const T_FUNC: TokenType = 19;
pub const T_TYPE: TokenType = 20;
pub const T_TABLE: TokenType = 21;
pub const T_EXPORT: TokenType = 22;
pub const T_IMPORT: TokenType = 23;
pub const T_MEMORY: TokenType = 24;
pub const T_DATA: TokenType = 25;
pub const T_ELEM: TokenType = 26;
pub const T_START: TokenType = 27;
pub const T_PARAM: TokenType = 28;
pub const T_RESULT: TokenType = 29;
pub const T_LOCAL: TokenType = 30;
pub const T_GLOBAL: TokenType = 31;
pub const T_ASSERT_RETURN: TokenType = 32;
pub const T_ASSERT_RETURN_CANONICAL_NAN: TokenType = 33;
pub const T_ASSERT_RETURN_ARITHMETIC_NAN: TokenType = 34;
pub const T_ASSERT_RETURN_FUNC: TokenType = 35;
pub const T_ASSERT_TRAP: TokenType = 36;
pub const T_ASSERT_THROWS: TokenType = 37;
pub const T_ASSERT_INVALID: TokenType = 38;
pub const T_ASSERT_UNLINKABLE: TokenType = 39;
pub const T_ASSERT_MALFORMED: TokenType = 40;
pub const T_ASSERT_EXHAUSTION: TokenType = 41;
pub const T_INVOKE: TokenType = 42;
pub const T_GET: TokenType = 43;
pub const T_ALIGN: TokenType = 44;
pub const T_OFFSET: TokenType = 45;
pub const T_ITEM: TokenType = 46;
pub const T_THEN: TokenType = 47;
pub const T_REGISTER: TokenType = 48;
pub const T_MUT: TokenType = 49;
pub const T_I32: TokenType = 50;
pub const T_I64: TokenType = 51;
pub const T_F32: TokenType = 52;
pub const T_F64: TokenType = 53;
pub const T_V128: TokenType = 54;
pub const T_I8X16: TokenType = 55;
pub const T_I16X8: TokenType = 56;
pub const T_I32X4: TokenType = 57;
pub const T_I64X2: TokenType = 58;
pub const T_F32X4: TokenType = 59;
pub const T_F64X2: TokenType = 60;
pub const T_FUNCREF: TokenType = 61;
pub const T_EXTERNREF: TokenType = 62;
pub const T_EXTERN: TokenType = 63;
pub const T_DECLARE: TokenType = 64;
pub const T_SHARED: TokenType = 65;
pub const T_QUOTE: TokenType = 66;
pub const T_BINARY: TokenType = 67;
pub const T_EXCEPTION_TYPE: TokenType = 68;
pub const T_CUSTOM_SECTION: TokenType = 69;
pub const T_AFTER: TokenType = 70;
pub const T_DATA_COUNT: TokenType = 71;
pub const T_CODE: TokenType = 72;
pub const T_REF_EXTERN: TokenType = 73;

/// Operator mnemonic tokens are assigned `T_FIRST_OPERATOR + operator table index`.
pub const T_FIRST_OPERATOR: TokenType = 74;

/// The literal keyword tokens and their spellings.
static KEYWORD_TOKENS: &[(TokenType, &str)] = &[
    (T_MODULE, "module"),
    (T_FUNC, "func"),
    (T_TYPE, "type"),
    (T_TABLE, "table"),
    (T_EXPORT, "export"),
    (T_IMPORT, "import"),
    (T_MEMORY, "memory"),
    (T_DATA, "data"),
    (T_ELEM, "elem"),
    (T_START, "start"),
    (T_PARAM, "param"),
    (T_RESULT, "result"),
    (T_LOCAL, "local"),
    (T_GLOBAL, "global"),
    (T_ASSERT_RETURN, "assert_return"),
    (T_ASSERT_RETURN_CANONICAL_NAN, "assert_return_canonical_nan"),
    (T_ASSERT_RETURN_ARITHMETIC_NAN, "assert_return_arithmetic_nan"),
    (T_ASSERT_RETURN_FUNC, "assert_return_func"),
    (T_ASSERT_TRAP, "assert_trap"),
    (T_ASSERT_THROWS, "assert_throws"),
    (T_ASSERT_INVALID, "assert_invalid"),
    (T_ASSERT_UNLINKABLE, "assert_unlinkable"),
    (T_ASSERT_MALFORMED, "assert_malformed"),
    (T_ASSERT_EXHAUSTION, "assert_exhaustion"),
    (T_INVOKE, "invoke"),
    (T_GET, "get"),
    (T_ALIGN, "align"),
    (T_OFFSET, "offset"),
    (T_ITEM, "item"),
    (T_THEN, "then"),
    (T_REGISTER, "register"),
    (T_MUT, "mut"),
    (T_I32, "i32"),
    (T_I64, "i64"),
    (T_F32, "f32"),
    (T_F64, "f64"),
    (T_V128, "v128"),
    (T_I8X16, "i8x16"),
    (T_I16X8, "i16x8"),
    (T_I32X4, "i32x4"),
    (T_I64X2, "i64x2"),
    (T_F32X4, "f32x4"),
    (T_F64X2, "f64x2"),
    (T_FUNCREF, "funcref"),
    (T_EXTERNREF, "externref"),
    (T_EXTERN, "extern"),
    (T_DECLARE, "declare"),
    (T_SHARED, "shared"),
    (T_QUOTE, "quote"),
    (T_BINARY, "binary"),
    (T_EXCEPTION_TYPE, "exception_type"),
    (T_CUSTOM_SECTION, "custom_section"),
    (T_AFTER, "after"),
    (T_DATA_COUNT, "data_count"),
    (T_CODE, "code"),
    (T_REF_EXTERN, "ref.extern"),
];

/// Keyword spellings recognized only as legacy aliases.
static LEGACY_KEYWORD_ALIASES: &[(TokenType, &str)] = &[(T_FUNCREF, "anyfunc")];

/// The token regexps. Multiple patterns may share a token type.
static REGEXP_TOKENS: &[(TokenType, &str)] = &[
    (T_DECIMAL_INT, r"[+\-]?\d+(_\d+)*"),
    (
        T_DECIMAL_FLOAT,
        r"[+\-]?\d+(_\d+)*\.(\d+(_\d+)*)*([eE][+\-]?\d+(_\d+)*)?",
    ),
    (T_DECIMAL_FLOAT, r"[+\-]?\d+(_\d+)*[eE][+\-]?\d+(_\d+)*"),
    (T_HEX_INT, r"[+\-]?0[xX][\da-fA-F]+(_[\da-fA-F]+)*"),
    (
        T_HEX_FLOAT,
        r"[+\-]?0[xX][\da-fA-F]+(_[\da-fA-F]+)*\.([\da-fA-F]+(_[\da-fA-F]+)*)*([pP][+\-]?\d+(_\d+)*)?",
    ),
    (
        T_HEX_FLOAT,
        r"[+\-]?0[xX][\da-fA-F]+(_[\da-fA-F]+)*[pP][+\-]?\d+(_\d+)*",
    ),
    (
        T_FLOAT_NAN,
        r"[+\-]?nan(:0[xX][\da-fA-F]+(_[\da-fA-F]+)*)?",
    ),
    (T_FLOAT_INF, r"[+\-]?inf"),
    (
        T_STRING,
        r#""([^"\n\\]|\\([^0-9a-fA-Fu]|[0-9a-fA-F][0-9a-fA-F]|u\{[0-9a-fA-F]+\}))*""#,
    ),
    (T_NAME, r"\$[a-zA-Z0-9'_+*/~=<>!?@#$%&|:`.\-\^\\]+"),
    (
        T_QUOTED_NAME,
        r#"\$"([^"\n\\]|\\([^0-9a-fA-Fu]|[0-9a-fA-F][0-9a-fA-F]|u\{[0-9a-fA-F]+\}))*""#,
    ),
];

/// A human-readable description of a token type, used in diagnostics.
pub fn describe_token(ty: TokenType) -> String {
    match ty {
        T_EOF => "eof".to_string(),
        T_UNTERMINATED_COMMENT => "unterminated comment".to_string(),
        T_UNRECOGNIZED => "unrecognized token".to_string(),
        T_LEGACY_INSTRUCTION_NAME => "legacy operator name".to_string(),
        T_DECIMAL_FLOAT => "decimal float literal".to_string(),
        T_DECIMAL_INT => "decimal int literal".to_string(),
        T_HEX_FLOAT => "hexadecimal float literal".to_string(),
        T_HEX_INT => "hexadecimal int literal".to_string(),
        T_FLOAT_NAN => "float NaN literal".to_string(),
        T_FLOAT_INF => "float infinity literal".to_string(),
        T_CANONICAL_NAN => "float canonical NaN literal".to_string(),
        T_ARITHMETIC_NAN => "float arithmetic NaN literal".to_string(),
        T_STRING => "string literal".to_string(),
        T_NAME => "name literal".to_string(),
        T_QUOTED_NAME => "quoted name literal".to_string(),
        T_LEFT_PAREN => "'('".to_string(),
        T_RIGHT_PAREN => "')'".to_string(),
        T_EQUALS => "'='".to_string(),
        _ => {
            if let Some(index) = (ty >= T_FIRST_OPERATOR)
                .then(|| (ty - T_FIRST_OPERATOR) as usize)
                .filter(|&index| index < OPERATORS.len())
            {
                return format!("'{}'", OPERATORS[index].mnemonic);
            }
            for (keyword_ty, spelling) in KEYWORD_TOKENS {
                if *keyword_ty == ty {
                    return format!("'{spelling}'");
                }
            }
            "unknown token".to_string()
        }
    }
}

/// A lexed token: its type and the byte offset where it begins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub ty: TokenType,
    pub begin: u32,
}

/// The byte offsets of every line start, with a one-entry cache for repeated locus queries on
/// the same line.
pub struct LineInfo {
    line_starts: Vec<u32>,
    last_query: Cell<(u32, u32)>,
}

impl LineInfo {
    /// The number of line starts recorded (one per line, plus the end-of-input sentinel).
    pub fn num_line_starts(&self) -> usize {
        self.line_starts.len()
    }

    /// The byte offset where the given zero-based line begins.
    pub fn line_start(&self, line: usize) -> u32 {
        self.line_starts[line]
    }
}

/// A location in a text file, resolved on demand from a byte offset and the [`LineInfo`] of
/// the original source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextFileLocus {
    pub line_start_offset: usize,
    pub line_end_offset: usize,
    pub newlines: u32,
    pub tabs: u32,
    pub characters: u32,
}

impl TextFileLocus {
    /// The one-based line number.
    pub fn line_number(&self) -> u32 {
        self.newlines + 1
    }

    /// The one-based column, counting each tab as `spaces_per_tab` columns.
    pub fn column(&self, spaces_per_tab: u32) -> u32 {
        self.tabs * spaces_per_tab + self.characters + 1
    }

    /// Formats the locus as `line:column`.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.line_number(), self.column(4))
    }
}

fn token_separator_set() -> CharSet {
    let mut set = CharSet::empty();
    for byte in [b' ', b'\t', b'\r', b'\n', b'=', b'(', b')', b';', 0] {
        set.add(byte);
    }
    set
}

/// Adds a state whose only purpose is to peek at the byte following a token: any token
/// separator enters `final_state` without consuming the separator.
fn create_token_separator_peek_state(builder: &mut Builder, final_state: StateIndex) -> StateIndex {
    let separator_state = builder.add_state();
    builder.add_edge(
        separator_state,
        &token_separator_set(),
        final_state | EDGE_DOESNT_CONSUME_INPUT_FLAG,
    );
    separator_state
}

/// Adds a literal string one byte at a time, reusing existing states reachable by the same
/// prefix.
fn add_literal_string_to_nfa(
    string: &str,
    builder: &mut Builder,
    mut initial_state: StateIndex,
    final_state: StateIndex,
) {
    let bytes = string.as_bytes();
    for (index, &byte) in bytes.iter().enumerate() {
        let is_last = index == bytes.len() - 1;
        let mut next_state = builder.get_non_terminal_edge(initial_state, byte);
        if next_state < 0 || is_last {
            next_state = if is_last {
                final_state
            } else {
                builder.add_state()
            };
            builder.add_edge(initial_state, &CharSet::single(byte), next_state);
        }
        initial_state = next_state;
    }
}

fn add_literal_token_to_nfa(
    literal: &str,
    builder: &mut Builder,
    token: TokenType,
    is_token_separator: bool,
) {
    let mut final_state = terminal_state(token);
    if !is_token_separator {
        final_state = create_token_separator_peek_state(builder, final_state);
    }
    add_literal_string_to_nfa(literal, builder, 0, final_state);
}

fn build_machine(allow_legacy_instruction_names: bool) -> Machine {
    let mut builder = Builder::new();

    for (token, pattern) in REGEXP_TOKENS {
        let final_state = create_token_separator_peek_state(&mut builder, terminal_state(*token));
        regexp::add_to_nfa(pattern, &mut builder, 0, final_state)
            .expect("the lexer's token patterns are well-formed");
    }

    add_literal_token_to_nfa("(", &mut builder, T_LEFT_PAREN, true);
    add_literal_token_to_nfa(")", &mut builder, T_RIGHT_PAREN, true);
    add_literal_token_to_nfa("=", &mut builder, T_EQUALS, true);
    add_literal_token_to_nfa("nan:canonical", &mut builder, T_CANONICAL_NAN, false);
    add_literal_token_to_nfa("nan:arithmetic", &mut builder, T_ARITHMETIC_NAN, false);

    for (token, spelling) in KEYWORD_TOKENS {
        add_literal_token_to_nfa(spelling, &mut builder, *token, false);
    }

    for (index, info) in OPERATORS.iter().enumerate() {
        add_literal_token_to_nfa(
            info.mnemonic,
            &mut builder,
            T_FIRST_OPERATOR + index as TokenType,
            false,
        );
    }

    for (legacy, modern) in LEGACY_OPERATOR_ALIASES {
        let token = if allow_legacy_instruction_names {
            T_FIRST_OPERATOR + operator_index_by_mnemonic(modern).unwrap()
        } else {
            T_LEGACY_INSTRUCTION_NAME
        };
        add_literal_token_to_nfa(legacy, &mut builder, token, false);
    }
    for (modern_token, legacy) in LEGACY_KEYWORD_ALIASES {
        let token = if allow_legacy_instruction_names {
            *modern_token
        } else {
            T_LEGACY_INSTRUCTION_NAME
        };
        add_literal_token_to_nfa(legacy, &mut builder, token, false);
    }

    Machine::new(builder).expect("the lexer's token set compiles to an unambiguous DFA")
}

static MODERN_MACHINE: Lazy<Machine> = Lazy::new(|| build_machine(false));
static LEGACY_MACHINE: Lazy<Machine> = Lazy::new(|| build_machine(true));

fn is_recovery_point_byte(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | 0x0C | b'(' | b')')
}

/// Lexes a source string into tokens and line information.
///
/// Comments and whitespace are consumed here; an unterminated block comment produces an
/// `T_UNTERMINATED_COMMENT` token and skips the rest of the input, and an unrecognized byte
/// produces one `T_UNRECOGNIZED` token and skips to the next whitespace or parenthesis so
/// parsing can resume.
pub fn lex(source: &str, allow_legacy_instruction_names: bool) -> (Vec<Token>, LineInfo) {
    let machine: &Machine = if allow_legacy_instruction_names {
        &LEGACY_MACHINE
    } else {
        &MODERN_MACHINE
    };

    let bytes = source.as_bytes();
    let len = bytes.len();
    let byte_at = |index: usize| bytes.get(index).copied().unwrap_or(0);

    let mut tokens: Vec<Token> = Vec::with_capacity(len / 4 + 1);
    let mut line_starts: Vec<u32> = vec![0];

    let mut position = 0usize;
    'lexing: loop {
        // Skip whitespace and comments, keeping track of newlines.
        loop {
            match byte_at(position) {
                // Single line comments.
                b';' => {
                    if byte_at(position + 1) != b';' {
                        break;
                    }
                    position += 2;
                    while position < len {
                        if bytes[position] == b'\n' {
                            line_starts.push((position + 1) as u32);
                            position += 1;
                            break;
                        }
                        position += 1;
                    }
                }
                // Delimited, possibly nested, comments.
                b'(' => {
                    if byte_at(position + 1) != b';' {
                        break;
                    }
                    let first_comment_byte = position;
                    position += 2;
                    let mut comment_depth = 1u32;
                    while comment_depth > 0 {
                        if byte_at(position) == b';' && byte_at(position + 1) == b')' {
                            comment_depth -= 1;
                            position += 2;
                        } else if byte_at(position) == b'(' && byte_at(position + 1) == b';' {
                            comment_depth += 1;
                            position += 2;
                        } else if position >= len {
                            tokens.push(Token {
                                ty: T_UNTERMINATED_COMMENT,
                                begin: first_comment_byte as u32,
                            });
                            position = len;
                            break;
                        } else {
                            if bytes[position] == b'\n' {
                                line_starts.push((position + 1) as u32);
                            }
                            position += 1;
                        }
                    }
                }
                b'\n' => {
                    line_starts.push((position + 1) as u32);
                    position += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0C => {
                    position += 1;
                }
                _ => break,
            }
        }

        // Feed the machine from the first non-whitespace byte.
        let token_begin = position;
        let (terminal, next_position) = machine.feed(bytes, position);
        position = next_position;
        if terminal != UNMATCHED_CHARACTER_TERMINAL {
            tokens.push(Token {
                ty: token_of_terminal(terminal),
                begin: token_begin as u32,
            });
        } else if token_begin < len {
            tokens.push(Token {
                ty: T_UNRECOGNIZED,
                begin: token_begin as u32,
            });
            while position < len && !is_recovery_point_byte(bytes[position]) {
                position += 1;
            }
        } else {
            break 'lexing;
        }
    }

    tokens.push(Token {
        ty: T_EOF,
        begin: len as u32,
    });

    // An extra line start for the end of the input lets line ends be found with
    // line_starts[line + 1].
    line_starts.push((len + 1) as u32);

    (
        tokens,
        LineInfo {
            line_starts,
            last_query: Cell::new((0, 0)),
        },
    )
}

/// Translates a byte offset into a full locus using the line-start table.
///
/// A one-entry cache remembers the tab count of the previous query so that reporting many
/// errors on one line doesn't rescan the line from its start each time.
pub fn calc_locus_from_offset(source: &str, line_info: &LineInfo, offset: usize) -> TextFileLocus {
    let line_starts = &line_info.line_starts;

    // Binary search for the last line start at or before the offset.
    let mut min_line = 0usize;
    let mut max_line = line_starts.len() - 1;
    while max_line > min_line {
        let median = (min_line + max_line + 1) / 2;
        if (offset as u32) < line_starts[median] {
            max_line = median - 1;
        } else {
            min_line = median;
        }
    }

    let mut locus = TextFileLocus {
        newlines: min_line as u32,
        line_start_offset: line_starts[min_line] as usize,
        line_end_offset: line_starts[min_line + 1] as usize - 1,
        tabs: 0,
        characters: 0,
    };

    // Reuse the tab count from the previous query when it lies earlier on the same line.
    let (cached_offset, cached_tabs) = line_info.last_query.get();
    let mut scan_from = locus.line_start_offset;
    if (cached_offset as usize) < offset && (cached_offset as usize) > locus.line_start_offset {
        scan_from = cached_offset as usize;
        locus.tabs = cached_tabs;
    }

    for byte in source.as_bytes()[scan_from..offset.min(source.len())].iter() {
        if *byte == b'\t' {
            locus.tabs += 1;
        }
    }
    locus.characters = (offset - locus.line_start_offset) as u32 - locus.tabs;

    line_info.last_query.set((offset as u32, locus.tabs));

    locus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        let (tokens, _) = lex(source, false);
        tokens.iter().map(|token| token.ty).collect()
    }

    #[test]
    fn lexes_a_minimal_module() {
        assert_eq!(
            token_types("(module)"),
            vec![T_LEFT_PAREN, T_MODULE, T_RIGHT_PAREN, T_EOF]
        );
    }

    #[test]
    fn lexes_operator_mnemonics() {
        let local_get = T_FIRST_OPERATOR + operator_index_by_mnemonic("local.get").unwrap();
        let i32_add = T_FIRST_OPERATOR + operator_index_by_mnemonic("i32.add").unwrap();

        assert_eq!(
            token_types("local.get 0 i32.add"),
            vec![local_get, T_DECIMAL_INT, i32_add, T_EOF]
        );
    }

    #[test]
    fn keyword_prefixes_do_not_shadow_operators() {
        // "i32" is a keyword and a prefix of many mnemonics.
        assert_eq!(token_types("i32"), vec![T_I32, T_EOF]);
        let i32_load16_s = T_FIRST_OPERATOR + operator_index_by_mnemonic("i32.load16_s").unwrap();
        assert_eq!(token_types("i32.load16_s"), vec![i32_load16_s, T_EOF]);
    }

    #[test]
    fn lexes_number_literals() {
        assert_eq!(
            token_types("1 -2_000 0x1f 1.5 1e10 0x1p4 nan nan:0x7 inf -inf"),
            vec![
                T_DECIMAL_INT,
                T_DECIMAL_INT,
                T_HEX_INT,
                T_DECIMAL_FLOAT,
                T_DECIMAL_FLOAT,
                T_HEX_FLOAT,
                T_FLOAT_NAN,
                T_FLOAT_NAN,
                T_FLOAT_INF,
                T_FLOAT_INF,
                T_EOF
            ]
        );
    }

    #[test]
    fn lexes_strings_and_names() {
        assert_eq!(
            token_types(r#""hello" "a\00b" "\u{1F600}" $foo $a+b"#),
            vec![T_STRING, T_STRING, T_STRING, T_NAME, T_NAME, T_EOF]
        );
    }

    #[test]
    fn line_comments_and_block_comments_are_skipped() {
        let source = "(module ;; comment\n (; multi\n line (; nested ;) ;) )";
        assert_eq!(
            token_types(source),
            vec![T_LEFT_PAREN, T_MODULE, T_RIGHT_PAREN, T_EOF]
        );
    }

    #[test]
    fn unterminated_comment_token() {
        let types = token_types("(module (; never closed");
        assert!(types.contains(&T_UNTERMINATED_COMMENT));
        assert_eq!(*types.last().unwrap(), T_EOF);
    }

    #[test]
    fn unrecognized_bytes_recover_at_whitespace() {
        let types = token_types("\u{1}\u{2}bogus (module)");
        assert_eq!(
            types,
            vec![T_UNRECOGNIZED, T_LEFT_PAREN, T_MODULE, T_RIGHT_PAREN, T_EOF]
        );
    }

    #[test]
    fn legacy_names_mode() {
        let local_get = T_FIRST_OPERATOR + operator_index_by_mnemonic("local.get").unwrap();

        let (tokens, _) = lex("get_local", true);
        assert_eq!(tokens[0].ty, local_get);

        let (tokens, _) = lex("get_local", false);
        assert_eq!(tokens[0].ty, T_LEGACY_INSTRUCTION_NAME);
    }

    #[test]
    fn token_offsets_point_into_the_source() {
        let source = "(module (func))";
        let (tokens, _) = lex(source, false);

        for token in &tokens {
            assert!(token.begin as usize <= source.len());
        }
        assert_eq!(tokens[1].begin, 1);
        assert_eq!(tokens[3].begin, 9);
    }

    #[test]
    fn locus_resolution() {
        let source = "(module\n\t(func)\n)";
        let (_, line_info) = lex(source, false);

        let locus = calc_locus_from_offset(source, &line_info, source.find("func").unwrap());
        assert_eq!(locus.line_number(), 2);
        assert_eq!(locus.tabs, 1);
        assert_eq!(locus.characters, 1);
        assert_eq!(locus.column(4), 6);

        // The cache path: a second query further along the same line.
        let locus = calc_locus_from_offset(source, &line_info, source.find("func").unwrap() + 2);
        assert_eq!(locus.line_number(), 2);
        assert_eq!(locus.characters, 3);
    }

    #[test]
    fn line_starts_bracket_every_offset() {
        let source = "a\nbb\n\nccc\n";
        let (_, line_info) = lex(source, false);

        for offset in 0..=source.len() {
            let locus = calc_locus_from_offset(source, &line_info, offset);
            assert!(locus.line_start_offset <= offset);
            assert!(offset <= locus.line_end_offset || offset == source.len());
            let line = &source[locus.line_start_offset..locus.line_end_offset.min(source.len())];
            assert!(!line.contains('\n'));
        }
    }
}
