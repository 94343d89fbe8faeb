//! Compiles POSIX-like regular expressions into NFA sub-automata by Thompson construction.
//!
//! Grammar: concatenation, `|` alternation, the `*` `+` `?` quantifiers, `(`…`)` grouping,
//! `[`…`]` character classes with ranges and `^` negation, the escapes
//! `\n \r \t \f \\ \" \' \-` (plus any escaped punctuation), `.` (any byte except newline),
//! and `\d` / `\D`.

use crate::text::charset::CharSet;
use crate::text::nfa::{Builder, StateIndex};

/// An error in a regular expression pattern. Patterns are part of the lexer definition, so an
/// error here is a defect in the token table rather than in user input.
#[derive(Debug, thiserror::Error)]
#[error("malformed regular expression at byte {offset}: {message}")]
pub struct RegexpError {
    pub offset: usize,
    pub message: &'static str,
}

enum Node {
    Set(CharSet),
    Seq(Vec<Node>),
    Alt(Vec<Node>),
    ZeroOrMore(Box<Node>),
    OneOrMore(Box<Node>),
    Optional(Box<Node>),
}

/// Parses `pattern` and appends its sub-automaton to the builder, connecting `initial_state`
/// to `final_state`.
pub fn add_to_nfa(
    pattern: &str,
    builder: &mut Builder,
    initial_state: StateIndex,
    final_state: StateIndex,
) -> Result<(), RegexpError> {
    let node = Parser {
        bytes: pattern.as_bytes(),
        position: 0,
    }
    .parse()?;
    emit(&node, builder, initial_state, final_state);
    Ok(())
}

struct Parser<'pattern> {
    bytes: &'pattern [u8],
    position: usize,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<Node, RegexpError> {
        let node = self.parse_alternation()?;
        if self.position != self.bytes.len() {
            return Err(self.error("unexpected ')'"));
        }
        Ok(node)
    }

    fn error(&self, message: &'static str) -> RegexpError {
        RegexpError {
            offset: self.position,
            message,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.position += 1;
        }
        byte
    }

    fn parse_alternation(&mut self) -> Result<Node, RegexpError> {
        let mut alternatives = vec![self.parse_concatenation()?];
        while self.peek() == Some(b'|') {
            self.position += 1;
            alternatives.push(self.parse_concatenation()?);
        }
        if alternatives.len() == 1 {
            Ok(alternatives.pop().unwrap())
        } else {
            Ok(Node::Alt(alternatives))
        }
    }

    fn parse_concatenation(&mut self) -> Result<Node, RegexpError> {
        let mut sequence = Vec::new();
        while let Some(byte) = self.peek() {
            if byte == b'|' || byte == b')' {
                break;
            }
            sequence.push(self.parse_quantified()?);
        }
        if sequence.len() == 1 {
            Ok(sequence.pop().unwrap())
        } else {
            Ok(Node::Seq(sequence))
        }
    }

    fn parse_quantified(&mut self) -> Result<Node, RegexpError> {
        let atom = self.parse_atom()?;
        match self.peek() {
            Some(b'*') => {
                self.position += 1;
                Ok(Node::ZeroOrMore(Box::new(atom)))
            }
            Some(b'+') => {
                self.position += 1;
                Ok(Node::OneOrMore(Box::new(atom)))
            }
            Some(b'?') => {
                self.position += 1;
                Ok(Node::Optional(Box::new(atom)))
            }
            _ => Ok(atom),
        }
    }

    fn parse_atom(&mut self) -> Result<Node, RegexpError> {
        match self.bump() {
            None => Err(self.error("unexpected end of pattern")),
            Some(b'(') => {
                let group = self.parse_alternation()?;
                if self.bump() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(group)
            }
            Some(b'[') => self.parse_class().map(Node::Set),
            Some(b'.') => {
                let mut any = CharSet::empty().complement();
                any.remove(b'\n');
                any.remove(0);
                Ok(Node::Set(any))
            }
            Some(b'\\') => self.parse_escape().map(Node::Set),
            Some(b'*') | Some(b'+') | Some(b'?') => Err(self.error("dangling quantifier")),
            Some(byte) => Ok(Node::Set(CharSet::single(byte))),
        }
    }

    fn parse_escape(&mut self) -> Result<CharSet, RegexpError> {
        match self.bump() {
            None => Err(self.error("unexpected end of escape")),
            Some(b'n') => Ok(CharSet::single(b'\n')),
            Some(b'r') => Ok(CharSet::single(b'\r')),
            Some(b't') => Ok(CharSet::single(b'\t')),
            Some(b'f') => Ok(CharSet::single(0x0C)),
            Some(b'd') => Ok(digit_set()),
            Some(b'D') => {
                let mut set = digit_set().complement();
                set.remove(0);
                Ok(set)
            }
            Some(byte) if !byte.is_ascii_alphanumeric() => Ok(CharSet::single(byte)),
            Some(_) => Err(self.error("unknown escape")),
        }
    }

    fn parse_class(&mut self) -> Result<CharSet, RegexpError> {
        let negated = if self.peek() == Some(b'^') {
            self.position += 1;
            true
        } else {
            false
        };

        let mut set = CharSet::empty();
        loop {
            let first = match self.bump() {
                None => return Err(self.error("unterminated character class")),
                Some(b']') => break,
                Some(b'\\') => {
                    let escaped = self.parse_escape()?;
                    if escaped.len() != 1 {
                        // \d and \D expand to whole sets inside a class.
                        set = set.union(&escaped);
                        continue;
                    }
                    escaped.smallest_member().unwrap()
                }
                Some(byte) => byte,
            };

            if self.peek() == Some(b'-') && self.bytes.get(self.position + 1) != Some(&b']') {
                self.position += 1;
                let last = match self.bump() {
                    None => return Err(self.error("unterminated character class")),
                    Some(b'\\') => {
                        let escaped = self.parse_escape()?;
                        escaped
                            .smallest_member()
                            .ok_or_else(|| self.error("bad range bound"))?
                    }
                    Some(byte) => byte,
                };
                if last < first {
                    return Err(self.error("reversed character range"));
                }
                set.add_range(first, last);
            } else {
                set.add(first);
            }
        }

        if negated {
            let mut complemented = set.complement();
            // The null sentinel terminating lexer input is never a valid token byte.
            complemented.remove(0);
            Ok(complemented)
        } else {
            Ok(set)
        }
    }
}

fn digit_set() -> CharSet {
    let mut set = CharSet::empty();
    set.add_range(b'0', b'9');
    set
}

/// Emits Thompson-construction states and edges for `node` between `entry` and `exit`.
fn emit(node: &Node, builder: &mut Builder, entry: StateIndex, exit: StateIndex) {
    match node {
        Node::Set(set) => builder.add_edge(entry, set, exit),
        Node::Seq(children) => {
            let mut current = entry;
            for (index, child) in children.iter().enumerate() {
                let next = if index == children.len() - 1 {
                    exit
                } else {
                    builder.add_state()
                };
                emit(child, builder, current, next);
                current = next;
            }
            if children.is_empty() {
                builder.add_epsilon_edge(entry, exit);
            }
        }
        Node::Alt(alternatives) => {
            for alternative in alternatives {
                let alt_entry = builder.add_state();
                let alt_exit = builder.add_state();
                builder.add_epsilon_edge(entry, alt_entry);
                emit(alternative, builder, alt_entry, alt_exit);
                builder.add_epsilon_edge(alt_exit, exit);
            }
        }
        Node::ZeroOrMore(child) => {
            let loop_entry = builder.add_state();
            let loop_exit = builder.add_state();
            builder.add_epsilon_edge(entry, loop_entry);
            emit(child, builder, loop_entry, loop_exit);
            builder.add_epsilon_edge(loop_exit, loop_entry);
            builder.add_epsilon_edge(entry, exit);
            builder.add_epsilon_edge(loop_exit, exit);
        }
        Node::OneOrMore(child) => {
            let loop_entry = builder.add_state();
            let loop_exit = builder.add_state();
            builder.add_epsilon_edge(entry, loop_entry);
            emit(child, builder, loop_entry, loop_exit);
            builder.add_epsilon_edge(loop_exit, loop_entry);
            builder.add_epsilon_edge(loop_exit, exit);
        }
        Node::Optional(child) => {
            emit(child, builder, entry, exit);
            builder.add_epsilon_edge(entry, exit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::nfa::{terminal_state, token_of_terminal, Machine, UNMATCHED_CHARACTER_TERMINAL};

    fn machine_for(pattern: &str) -> Machine {
        let mut builder = Builder::new();
        add_to_nfa(pattern, &mut builder, 0, terminal_state(0)).unwrap();
        Machine::new(builder).unwrap()
    }

    fn accepts(machine: &Machine, input: &str) -> bool {
        // Terminate the input the way the lexer does so trailing context is deterministic.
        let mut bytes = input.as_bytes().to_vec();
        bytes.push(0);
        let (terminal, consumed) = machine.feed(&bytes, 0);
        terminal != UNMATCHED_CHARACTER_TERMINAL
            && token_of_terminal(terminal) == 0
            && consumed == input.len()
    }

    #[test]
    fn quantifiers() {
        let machine = machine_for("ab*c+");

        assert!(accepts(&machine, "ac"));
        assert!(accepts(&machine, "abbbcc"));
        assert!(!accepts(&machine, "ab"));
        assert!(!accepts(&machine, "bc"));
    }

    #[test]
    fn alternation_and_grouping() {
        let machine = machine_for("(foo|ba(r|z))?!");

        assert!(accepts(&machine, "foo!"));
        assert!(accepts(&machine, "bar!"));
        assert!(accepts(&machine, "baz!"));
        assert!(accepts(&machine, "!"));
        assert!(!accepts(&machine, "bax!"));
    }

    #[test]
    fn character_classes() {
        let machine = machine_for("[a-f0-9]+");

        assert!(accepts(&machine, "deadbeef42"));
        assert!(!accepts(&machine, "xyz"));
    }

    #[test]
    fn negated_class_and_dot() {
        let machine = machine_for("[^\"]*\".");

        assert!(accepts(&machine, "abc\"x"));
        assert!(!accepts(&machine, "abc"));
    }

    #[test]
    fn digit_escapes() {
        let digits = machine_for("[+\\-]?\\d+(_\\d+)*");

        assert!(accepts(&digits, "123"));
        assert!(accepts(&digits, "-1_000"));
        assert!(accepts(&digits, "+7"));
        assert!(!accepts(&digits, "1_"));
        assert!(!accepts(&digits, "_1"));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let mut builder = Builder::new();
        assert!(add_to_nfa("[z-a]", &mut builder, 0, terminal_state(0)).is_err());
    }
}
