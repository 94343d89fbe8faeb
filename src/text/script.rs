//! Parsing of test scripts: module definitions, actions, and assertion commands.

use crate::features::FeatureSpec;
use crate::model::{Module, ReferenceType};
use crate::parser::load_binary_module;
use crate::text::lexer::{
    calc_locus_from_offset, lex, TextFileLocus, T_ARITHMETIC_NAN, T_ASSERT_EXHAUSTION,
    T_ASSERT_INVALID, T_ASSERT_MALFORMED, T_ASSERT_RETURN, T_ASSERT_RETURN_ARITHMETIC_NAN,
    T_ASSERT_RETURN_CANONICAL_NAN, T_ASSERT_RETURN_FUNC, T_ASSERT_THROWS, T_ASSERT_TRAP,
    T_ASSERT_UNLINKABLE, T_BINARY, T_CANONICAL_NAN, T_EOF, T_GET, T_INVOKE, T_LEFT_PAREN,
    T_MODULE, T_QUOTE, T_REF_EXTERN, T_REGISTER,
};
use crate::text::module::{parse_module, parse_module_body, ModuleState};
use crate::text::parse::{
    expected_error, op_token, parse_parenthesized, parse_u32, parse_utf8_string, parse_v128,
    try_parse_name, try_parse_string, Cursor, Error, Parse, ParseAbort, ParseState,
};
use crate::text::parse::{parse_f32, parse_f64, parse_i32, parse_i64};
use crate::text::module::parse_referenced_type;

/// A constant argument or result value in a test command.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    V128([u8; 16]),
    RefNull(ReferenceType),
    RefExtern(u32),
}

/// An expected result of an `assert_return`, including the NaN pattern expectations.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpectedResult {
    Value(ConstValue),
    F32CanonicalNan,
    F32ArithmeticNan,
    F64CanonicalNan,
    F64ArithmeticNan,
}

/// Something a test command does: define a module, invoke an export, or read an exported
/// global.
#[derive(Debug)]
pub enum Action {
    Module {
        internal_name: Option<String>,
        module: Box<Module>,
    },
    Invoke {
        module_name: Option<String>,
        export_name: String,
        arguments: Vec<ConstValue>,
    },
    Get {
        module_name: Option<String>,
        export_name: String,
    },
}

/// The source form of a module inside an assertion, kept unparsed where the assertion is
/// about the parse itself.
#[derive(Debug)]
pub enum ModuleSource {
    Parsed(Box<Module>),
    Quote(Vec<u8>),
    Binary(Vec<u8>),
}

/// One test command.
#[derive(Debug)]
pub struct Command {
    pub kind: CommandKind,
    pub locus: TextFileLocus,
}

#[derive(Debug)]
pub enum CommandKind {
    Register {
        name: String,
        module_name: Option<String>,
    },
    Action(Action),
    AssertReturn {
        action: Action,
        expected: Vec<ExpectedResult>,
    },
    AssertReturnCanonicalNan {
        action: Action,
    },
    AssertReturnArithmeticNan {
        action: Action,
    },
    AssertReturnFunc {
        action: Action,
    },
    AssertTrap {
        action: Action,
        expected_message: String,
    },
    AssertExhaustion {
        action: Action,
        expected_message: String,
    },
    AssertThrows {
        action: Action,
    },
    AssertInvalid {
        module: ModuleSource,
        diagnostics: Vec<Error>,
        expected_message: String,
    },
    AssertMalformed {
        module: ModuleSource,
        diagnostics: Vec<Error>,
        expected_message: String,
    },
    AssertUnlinkable {
        action: Action,
        expected_message: String,
    },
}

/// Parses a constant expression value: `(i32.const 1)`, `(ref.null func)`, `(ref.extern 2)`,
/// with the NaN pattern literals allowed when `allow_patterns` is set.
fn parse_const_value(
    cursor: &mut Cursor,
    state: &mut ParseState,
    allow_patterns: bool,
) -> Parse<ExpectedResult> {
    let mut result = None;
    parse_parenthesized(cursor, state, |cursor, state| {
        let ty = cursor.ty();
        if ty == op_token("i32.const") {
            cursor.advance();
            result = Some(ExpectedResult::Value(ConstValue::I32(
                parse_i32(cursor, state)? as i32,
            )));
        } else if ty == op_token("i64.const") {
            cursor.advance();
            result = Some(ExpectedResult::Value(ConstValue::I64(
                parse_i64(cursor, state)? as i64,
            )));
        } else if ty == op_token("f32.const") {
            cursor.advance();
            result = Some(match cursor.ty() {
                T_CANONICAL_NAN if allow_patterns => {
                    cursor.advance();
                    ExpectedResult::F32CanonicalNan
                }
                T_ARITHMETIC_NAN if allow_patterns => {
                    cursor.advance();
                    ExpectedResult::F32ArithmeticNan
                }
                _ => ExpectedResult::Value(ConstValue::F32(parse_f32(cursor, state)?)),
            });
        } else if ty == op_token("f64.const") {
            cursor.advance();
            result = Some(match cursor.ty() {
                T_CANONICAL_NAN if allow_patterns => {
                    cursor.advance();
                    ExpectedResult::F64CanonicalNan
                }
                T_ARITHMETIC_NAN if allow_patterns => {
                    cursor.advance();
                    ExpectedResult::F64ArithmeticNan
                }
                _ => ExpectedResult::Value(ConstValue::F64(parse_f64(cursor, state)?)),
            });
        } else if ty == op_token("v128.const") {
            cursor.advance();
            result = Some(ExpectedResult::Value(ConstValue::V128(parse_v128(
                cursor, state,
            )?)));
        } else if ty == op_token("ref.null") {
            cursor.advance();
            result = Some(ExpectedResult::Value(ConstValue::RefNull(
                parse_referenced_type(cursor, state)?,
            )));
        } else if ty == T_REF_EXTERN {
            cursor.advance();
            result = Some(ExpectedResult::Value(ConstValue::RefExtern(parse_u32(
                cursor, state,
            )?)));
        } else {
            expected_error(cursor, state, "constant value");
            return Err(ParseAbort::Recover);
        }
        Ok(())
    })?;
    result.ok_or(ParseAbort::Recover)
}

fn parse_argument(cursor: &mut Cursor, state: &mut ParseState) -> Parse<ConstValue> {
    match parse_const_value(cursor, state, false)? {
        ExpectedResult::Value(value) => Ok(value),
        _ => Err(ParseAbort::Recover),
    }
}

/// Parses the inside of a `(module …)` form: an optional internal name, then either `quote`
/// or `binary` inline sources or ordinary module fields.
fn parse_module_variant(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<(Option<String>, ModuleSource, Vec<Error>)> {
    let internal_name = try_parse_name(cursor, state).map(|name| name.text);

    match cursor.ty() {
        T_QUOTE => {
            cursor.advance();
            let mut text = Vec::new();
            while let Some(bytes) = try_parse_string(cursor, state) {
                text.extend_from_slice(&bytes);
            }
            Ok((internal_name, ModuleSource::Quote(text), Vec::new()))
        }
        T_BINARY => {
            cursor.advance();
            let mut bytes = Vec::new();
            while let Some(chunk) = try_parse_string(cursor, state) {
                bytes.extend_from_slice(&chunk);
            }
            Ok((internal_name, ModuleSource::Binary(bytes), Vec::new()))
        }
        _ => {
            // Ordinary module fields, parsed with their own diagnostic list so assertion
            // commands can decide what a parse failure means.
            let mut module_state = ModuleState::new(state.features.clone());
            let outer_errors = std::mem::take(&mut state.errors);
            let result = parse_module_body(cursor, state, &mut module_state);
            let diagnostics = std::mem::replace(&mut state.errors, outer_errors);
            if result.is_err() {
                state.errors.extend(diagnostics.clone());
                result?;
            }

            let ModuleState {
                mut module,
                disassembly,
                ..
            } = module_state;
            crate::model::set_disassembly_names(&mut module, &disassembly);
            Ok((internal_name, ModuleSource::Parsed(Box::new(module)), diagnostics))
        }
    }
}

/// Resolves a module source into a loadable module, reporting assertion-independent failures
/// (a quoted module that doesn't lex, a binary module that doesn't decode) as diagnostics.
fn realize_module_source(
    state: &mut ParseState,
    offset: usize,
    source: ModuleSource,
    diagnostics: Vec<Error>,
) -> Option<Box<Module>> {
    match source {
        ModuleSource::Parsed(module) => {
            state.errors.extend(diagnostics);
            Some(module)
        }
        ModuleSource::Quote(text) => match String::from_utf8(text) {
            Ok(text) => {
                let (module, errors) = parse_module(&text, state.features.clone());
                if let Some(first) = errors.first() {
                    state.error_at_offset(
                        offset,
                        format!(
                            "in quoted module at {}: {}",
                            first.locus.describe(),
                            first.message
                        ),
                    );
                }
                Some(Box::new(module))
            }
            Err(_) => {
                state.error_at_offset(offset, "quoted module is not valid UTF-8");
                None
            }
        },
        ModuleSource::Binary(bytes) => match load_binary_module(&bytes, state.features.clone()) {
            Ok(module) => Some(Box::new(module)),
            Err(error) => {
                state.error_at_offset(offset, format!("in binary module: {error}"));
                None
            }
        },
    }
}

/// Parses an action: a module definition, `(invoke …)`, or `(get …)`.
fn parse_action(cursor: &mut Cursor, state: &mut ParseState) -> Parse<Action> {
    let offset = cursor.offset();
    let tag = cursor.peek(1).ty;
    let mut action = None;
    parse_parenthesized(cursor, state, |cursor, state| {
        match tag {
            T_MODULE => {
                cursor.advance();
                let (internal_name, source, diagnostics) = parse_module_variant(cursor, state)?;
                let module = realize_module_source(state, offset, source, diagnostics)
                    .unwrap_or_else(|| Box::new(Module::new(state.features.clone())));
                action = Some(Action::Module {
                    internal_name,
                    module,
                });
            }
            T_INVOKE => {
                cursor.advance();
                let module_name = try_parse_name(cursor, state).map(|name| name.text);
                let export_name = parse_utf8_string(cursor, state)?;
                let mut arguments = Vec::new();
                while cursor.ty() == T_LEFT_PAREN {
                    arguments.push(parse_argument(cursor, state)?);
                }
                action = Some(Action::Invoke {
                    module_name,
                    export_name,
                    arguments,
                });
            }
            T_GET => {
                cursor.advance();
                let module_name = try_parse_name(cursor, state).map(|name| name.text);
                let export_name = parse_utf8_string(cursor, state)?;
                action = Some(Action::Get {
                    module_name,
                    export_name,
                });
            }
            _ => {
                expected_error(cursor, state, "action");
                return Err(ParseAbort::Recover);
            }
        }
        Ok(())
    })?;
    action.ok_or(ParseAbort::Recover)
}

/// Parses a `(module …)` form inside an assertion, without realizing quote/binary sources.
fn parse_assertion_module(
    cursor: &mut Cursor,
    state: &mut ParseState,
) -> Parse<(ModuleSource, Vec<Error>)> {
    let mut parsed = None;
    parse_parenthesized(cursor, state, |cursor, state| {
        if cursor.ty() != T_MODULE {
            expected_error(cursor, state, "'module'");
            return Err(ParseAbort::Recover);
        }
        cursor.advance();
        let (_, source, diagnostics) = parse_module_variant(cursor, state)?;
        parsed = Some((source, diagnostics));
        Ok(())
    })?;
    parsed.ok_or(ParseAbort::Recover)
}

fn parse_command(cursor: &mut Cursor, state: &mut ParseState) -> Parse<Option<Command>> {
    let offset = cursor.offset();
    let locus = calc_locus_from_offset(state.source, state.line_info, offset);
    let tag = cursor.peek(1).ty;

    let kind = match tag {
        T_MODULE | T_INVOKE | T_GET => CommandKind::Action(parse_action(cursor, state)?),
        T_REGISTER => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let name = parse_utf8_string(cursor, state)?;
                let module_name = try_parse_name(cursor, state).map(|name| name.text);
                kind = Some(CommandKind::Register { name, module_name });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_RETURN => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let action = parse_action(cursor, state)?;
                let mut expected = Vec::new();
                while cursor.ty() == T_LEFT_PAREN {
                    expected.push(parse_const_value(cursor, state, true)?);
                }
                kind = Some(CommandKind::AssertReturn { action, expected });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_RETURN_CANONICAL_NAN | T_ASSERT_RETURN_ARITHMETIC_NAN | T_ASSERT_RETURN_FUNC => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let action = parse_action(cursor, state)?;
                kind = Some(match tag {
                    T_ASSERT_RETURN_CANONICAL_NAN => {
                        CommandKind::AssertReturnCanonicalNan { action }
                    }
                    T_ASSERT_RETURN_ARITHMETIC_NAN => {
                        CommandKind::AssertReturnArithmeticNan { action }
                    }
                    _ => CommandKind::AssertReturnFunc { action },
                });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_TRAP | T_ASSERT_EXHAUSTION => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let action = parse_action(cursor, state)?;
                let expected_message = parse_utf8_string(cursor, state)?;
                kind = Some(if tag == T_ASSERT_TRAP {
                    CommandKind::AssertTrap {
                        action,
                        expected_message,
                    }
                } else {
                    CommandKind::AssertExhaustion {
                        action,
                        expected_message,
                    }
                });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_THROWS => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let action = parse_action(cursor, state)?;
                kind = Some(CommandKind::AssertThrows { action });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_INVALID | T_ASSERT_MALFORMED => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let (module, diagnostics) = parse_assertion_module(cursor, state)?;
                let expected_message = parse_utf8_string(cursor, state)?;
                kind = Some(if tag == T_ASSERT_INVALID {
                    CommandKind::AssertInvalid {
                        module,
                        diagnostics,
                        expected_message,
                    }
                } else {
                    CommandKind::AssertMalformed {
                        module,
                        diagnostics,
                        expected_message,
                    }
                });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        T_ASSERT_UNLINKABLE => {
            let mut kind = None;
            parse_parenthesized(cursor, state, |cursor, state| {
                cursor.advance();
                let action = parse_action(cursor, state)?;
                let expected_message = parse_utf8_string(cursor, state)?;
                kind = Some(CommandKind::AssertUnlinkable {
                    action,
                    expected_message,
                });
                Ok(())
            })?;
            kind.ok_or(ParseAbort::Recover)?
        }
        _ => {
            // Skip an unrecognized form with one diagnostic.
            parse_parenthesized(cursor, state, |cursor, state| {
                expected_error(cursor, state, "test command");
                Err(ParseAbort::Recover)
            })?;
            return Ok(None);
        }
    };

    Ok(Some(Command { kind, locus }))
}

/// Parses a test script: a sequence of commands.
///
/// The errors returned are those of the script structure and of non-assertion modules;
/// assertion commands carry their module diagnostics so the driver can match them against the
/// expectation.
pub fn parse_test_commands(text: &str, features: FeatureSpec) -> (Vec<Command>, Vec<Error>) {
    let (tokens, line_info) = lex(text, features.allow_legacy_instruction_names);
    let mut state = ParseState::new(text, &line_info, features);
    let mut cursor = Cursor::new(&tokens);
    let mut commands = Vec::new();

    while cursor.ty() != T_EOF {
        if cursor.ty() != T_LEFT_PAREN {
            expected_error(&mut cursor, &mut state, "a command");
            break;
        }
        match parse_command(&mut cursor, &mut state) {
            Ok(Some(command)) => commands.push(command),
            Ok(None) => {}
            Err(ParseAbort::Recover) => {}
            Err(ParseAbort::Fatal) => break,
        }
    }

    (commands, state.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Vec<Command> {
        let (commands, errors) = parse_test_commands(text, FeatureSpec::default());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        commands
    }

    #[test]
    fn module_and_invocations() {
        let commands = parse_ok(
            r#"(module $m (func (export "f") (param i32) (result i32) local.get 0))
               (invoke "f" (i32.const 3))
               (assert_return (invoke $m "f" (i32.const 4)) (i32.const 4))"#,
        );

        assert_eq!(commands.len(), 3);
        match &commands[0].kind {
            CommandKind::Action(Action::Module {
                internal_name,
                module,
            }) => {
                assert_eq!(internal_name.as_deref(), Some("m"));
                assert_eq!(module.functions.size(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
        match &commands[2].kind {
            CommandKind::AssertReturn { action, expected } => {
                assert!(matches!(action, Action::Invoke { .. }));
                assert_eq!(expected, &[ExpectedResult::Value(ConstValue::I32(4))]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn nan_pattern_expectations() {
        let commands = parse_ok(
            r#"(module (func (export "f") (result f32) f32.const 0))
               (assert_return (invoke "f") (f32.const nan:canonical))
               (assert_return (invoke "f") (f64.const nan:arithmetic))"#,
        );

        match &commands[1].kind {
            CommandKind::AssertReturn { expected, .. } => {
                assert_eq!(expected, &[ExpectedResult::F32CanonicalNan]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        match &commands[2].kind {
            CommandKind::AssertReturn { expected, .. } => {
                assert_eq!(expected, &[ExpectedResult::F64ArithmeticNan]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn assert_invalid_keeps_its_diagnostics() {
        let commands = parse_ok(
            r#"(assert_invalid
                 (module (func (result i32) i64.const 0))
                 "type mismatch")"#,
        );

        match &commands[0].kind {
            CommandKind::AssertInvalid {
                diagnostics,
                expected_message,
                ..
            } => {
                assert!(diagnostics
                    .iter()
                    .any(|error| error.message.contains("type mismatch")));
                assert_eq!(expected_message, "type mismatch");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn assert_malformed_quote_is_not_parsed() {
        let commands = parse_ok(
            r#"(assert_malformed (module quote "(module (func") "unexpected end")"#,
        );

        match &commands[0].kind {
            CommandKind::AssertMalformed { module, .. } => {
                assert!(matches!(module, ModuleSource::Quote(_)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn register_and_trap_commands() {
        let commands = parse_ok(
            r#"(module $m (func (export "f")))
               (register "spectest" $m)
               (assert_trap (invoke "f") "unreachable")"#,
        );

        assert!(matches!(
            &commands[1].kind,
            CommandKind::Register { name, module_name }
                if name == "spectest" && module_name.as_deref() == Some("m")
        ));
        assert!(matches!(
            &commands[2].kind,
            CommandKind::AssertTrap { expected_message, .. } if expected_message == "unreachable"
        ));
    }

    #[test]
    fn command_loci_point_at_their_forms() {
        let script = "(module)\n(invoke \"f\")";
        let (commands, _) = parse_test_commands(script, FeatureSpec::default());

        assert_eq!(commands[0].locus.line_number(), 1);
        assert_eq!(commands[1].locus.line_number(), 2);
    }

    #[test]
    fn binary_modules_decode() {
        let commands = parse_ok(r#"(module binary "\00\61\73\6d\01\00\00\00")"#);

        match &commands[0].kind {
            CommandKind::Action(Action::Module { module, .. }) => {
                assert_eq!(module.functions.size(), 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
