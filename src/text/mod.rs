//! The WebAssembly text format pipeline: the table-driven lexer and its automata, literal
//! parsing, the recursive-descent module and test-script parsers, and the printer.

pub mod charset;
pub(crate) mod function;
pub mod lexer;
pub mod module;
pub mod nfa;
pub mod numbers;
pub mod parse;
pub mod print;
pub mod regexp;
pub mod script;

pub use lexer::{calc_locus_from_offset, describe_token, lex, LineInfo, TextFileLocus, Token};
pub use module::parse_module;
pub use parse::Error;
pub use print::print_module;
pub use script::{
    parse_test_commands, Action, Command, CommandKind, ConstValue, ExpectedResult, ModuleSource,
};
