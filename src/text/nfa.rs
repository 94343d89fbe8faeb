//! Nondeterministic finite automaton construction and its compilation into a table-driven
//! deterministic machine.
//!
//! Terminal states are encoded as negative indices: `terminal(t) = MAX_TERMINAL_STATE_INDEX - t`.
//! The `EDGE_DOESNT_CONSUME_INPUT_FLAG` bit may be OR'd onto a terminal to make the machine
//! rewind one byte when entering it, which lets keyword edges peek at the following separator
//! without consuming it.

use crate::text::charset::CharSet;
use std::collections::{BTreeMap, HashMap};

/// An index of an NFA or DFA state. A negative index is a terminal state.
pub type StateIndex = i16;

/// A flag set on terminal transitions that don't consume any input.
pub const EDGE_DOESNT_CONSUME_INPUT_FLAG: StateIndex = 0x4000;

/// An implicit terminal state indicating the machine didn't recognize the input.
pub const UNMATCHED_CHARACTER_TERMINAL: StateIndex = i16::MIN;

/// The largest negative state index that doesn't have `EDGE_DOESNT_CONSUME_INPUT_FLAG` set.
pub const MAXIMUM_TERMINAL_STATE_INDEX: StateIndex = -16385;

/// Encodes a token value as a terminal state index.
pub fn terminal_state(token: u16) -> StateIndex {
    MAXIMUM_TERMINAL_STATE_INDEX - token as StateIndex
}

/// Decodes a terminal state index back to its token value.
pub fn token_of_terminal(terminal: StateIndex) -> u16 {
    (MAXIMUM_TERMINAL_STATE_INDEX - terminal) as u16
}

#[derive(Default)]
struct NfaState {
    /// Labelled edges, keyed by target state so parallel edges to the same target merge their
    /// predicates.
    next_state_to_predicate: BTreeMap<StateIndex, CharSet>,
    epsilon_next_states: Vec<StateIndex>,
}

/// Holds the states of an under-construction NFA. The initial state is always state 0.
pub struct Builder {
    states: Vec<NfaState>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        let mut builder = Builder { states: Vec::new() };
        builder.add_state();
        builder
    }

    /// Adds a state and returns its index.
    pub fn add_state(&mut self) -> StateIndex {
        assert!(self.states.len() < i16::MAX as usize);
        self.states.push(NfaState::default());
        (self.states.len() - 1) as StateIndex
    }

    /// Adds an edge from `initial_state` to `next_state` taken on any byte in `predicate`.
    pub fn add_edge(&mut self, initial_state: StateIndex, predicate: &CharSet, next_state: StateIndex) {
        let existing = self.states[initial_state as usize]
            .next_state_to_predicate
            .entry(next_state)
            .or_insert_with(CharSet::empty);
        *existing = existing.union(predicate);
    }

    /// Adds an epsilon edge from `initial_state` to `next_state`.
    pub fn add_epsilon_edge(&mut self, initial_state: StateIndex, next_state: StateIndex) {
        let epsilons = &mut self.states[initial_state as usize].epsilon_next_states;
        if !epsilons.contains(&next_state) {
            epsilons.push(next_state);
        }
    }

    /// Finds an existing non-terminal edge from `initial_state` on the given byte, used to
    /// share prefixes when adding literal strings.
    pub fn get_non_terminal_edge(&self, initial_state: StateIndex, byte: u8) -> StateIndex {
        for (&next_state, predicate) in &self.states[initial_state as usize].next_state_to_predicate
        {
            if next_state >= 0 && predicate.contains(byte) {
                return next_state;
            }
        }
        UNMATCHED_CHARACTER_TERMINAL
    }
}

/// An error compiling an NFA into a deterministic machine.
#[derive(Debug, thiserror::Error)]
pub enum NfaBuildError {
    #[error("NFA has multiple possible terminal states for the same input")]
    AmbiguousTerminals,
    #[error("DFA state count exceeds the supported maximum")]
    TooManyStates,
    #[error("too many distinct successor states follow one state set")]
    TooManySuccessors,
}

struct DfaState {
    next_state_by_char: [StateIndex; 256],
}

impl Default for DfaState {
    fn default() -> Self {
        DfaState {
            next_state_by_char: [UNMATCHED_CHARACTER_TERMINAL | EDGE_DOESNT_CONSUME_INPUT_FLAG;
                256],
        }
    }
}

/// An NFA compiled into a DFA with character-class table compression, executable byte by byte.
pub struct Machine {
    char_to_offset: [u32; 256],
    next_state: Vec<StateIndex>,
    num_classes: usize,
    num_states: usize,
}

impl Machine {
    /// Compiles the builder's NFA by subset construction, then merges bytes whose transition
    /// columns are identical into equivalence classes to shrink the dispatch table.
    pub fn new(builder: Builder) -> Result<Machine, NfaBuildError> {
        let dfa_states = convert_to_dfa(&builder)?;
        let num_states = dfa_states.len();
        if num_states > 16384 {
            return Err(NfaBuildError::TooManyStates);
        }

        // Transpose the [state][byte] transition map to [byte][state] and sort the columns so
        // identical ones become adjacent.
        let mut transitions_by_char: Vec<(u8, Vec<StateIndex>)> = (0..=255u8)
            .map(|byte| {
                let column = dfa_states
                    .iter()
                    .map(|state| state.next_state_by_char[byte as usize])
                    .collect();
                (byte, column)
            })
            .collect();
        transitions_by_char.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        // Coalesce identical columns into character equivalence classes, remembering one
        // representative byte per class.
        let mut char_to_class = [0u8; 256];
        let mut representative_chars = Vec::new();
        for (index, (byte, column)) in transitions_by_char.iter().enumerate() {
            if index == 0 || *column != transitions_by_char[index - 1].1 {
                representative_chars.push(*byte);
            }
            char_to_class[*byte as usize] = (representative_chars.len() - 1) as u8;
        }
        let num_classes = representative_chars.len();

        // Build the packed [class][state] transition table.
        let mut next_state = vec![0 as StateIndex; num_classes * num_states];
        for (class_index, &representative) in representative_chars.iter().enumerate() {
            for (state_index, state) in dfa_states.iter().enumerate() {
                next_state[class_index * num_states + state_index] =
                    state.next_state_by_char[representative as usize];
            }
        }

        // The per-byte indirection bakes in the row stride.
        let mut char_to_offset = [0u32; 256];
        for byte in 0..256 {
            char_to_offset[byte] = (num_states * char_to_class[byte] as usize) as u32;
        }

        Ok(Machine {
            char_to_offset,
            next_state,
            num_classes,
            num_states,
        })
    }

    /// Feeds bytes into the machine starting at `start` until it reaches a terminal state.
    /// Returns the terminal (with the don't-consume flag already applied) and the position of
    /// the first byte not consumed. Bytes past the end of the input read as zero.
    pub fn feed(&self, input: &[u8], start: usize) -> (StateIndex, usize) {
        let mut state: usize = 0;
        let mut position = start;
        loop {
            let byte = input.get(position).copied().unwrap_or(0);
            let next = self.next_state[state + self.char_to_offset[byte as usize] as usize];
            position += 1;
            if next < 0 {
                if next & EDGE_DOESNT_CONSUME_INPUT_FLAG != 0 {
                    position -= 1;
                    return (next & !EDGE_DOESNT_CONSUME_INPUT_FLAG, position);
                }
                return (next, position);
            }
            state = next as usize;
        }
    }

    /// The number of character equivalence classes in the dispatch table.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The number of DFA states.
    pub fn num_states(&self) -> usize {
        self.num_states
    }
}

/// Standard subset construction: each DFA state is a set of NFA states closed under epsilon
/// transitions. At most one terminal may appear in any one closure.
fn convert_to_dfa(builder: &Builder) -> Result<Vec<DfaState>, NfaBuildError> {
    const MAX_LOCAL_STATES: usize = 64;

    let mut dfa_states: Vec<DfaState> = vec![DfaState::default()];
    let mut nfa_set_to_dfa_state: HashMap<Vec<StateIndex>, StateIndex> = HashMap::new();
    let mut dfa_state_to_nfa_set: Vec<Vec<StateIndex>> = vec![vec![0]];
    let mut pending: Vec<StateIndex> = vec![0];

    nfa_set_to_dfa_state.insert(vec![0], 0);

    while let Some(current_dfa_state) = pending.pop() {
        let current_set = dfa_state_to_nfa_set[current_dfa_state as usize].clone();

        // Expand the set to its epsilon closure.
        let mut closure = current_set.clone();
        let mut scan_index = 0;
        while scan_index < closure.len() {
            let state = closure[scan_index];
            scan_index += 1;
            if state >= 0 {
                for &epsilon_next in &builder.states[state as usize].epsilon_next_states {
                    if !closure.contains(&epsilon_next) {
                        closure.push(epsilon_next);
                    }
                }
            }
        }

        // Split the closure into its non-terminal states and (at most) one terminal.
        let mut non_terminal_states = Vec::new();
        let mut current_terminal =
            UNMATCHED_CHARACTER_TERMINAL | EDGE_DOESNT_CONSUME_INPUT_FLAG;
        let mut has_terminal = false;
        for &state in &closure {
            if state >= 0 {
                if !non_terminal_states.contains(&state) {
                    non_terminal_states.push(state);
                }
            } else {
                if has_terminal && state | EDGE_DOESNT_CONSUME_INPUT_FLAG != current_terminal {
                    return Err(NfaBuildError::AmbiguousTerminals);
                }
                has_terminal = true;
                current_terminal = state | EDGE_DOESNT_CONSUME_INPUT_FLAG;
            }
        }

        // Build a compact index of every state reachable from the closure, so a successor set
        // can be represented as a 64-bit mask while transposing to [byte][successors].
        let mut state_to_local: BTreeMap<StateIndex, usize> = BTreeMap::new();
        let mut local_to_state: Vec<StateIndex> = Vec::new();
        for &state in &non_terminal_states {
            for &next in builder.states[state as usize].next_state_to_predicate.keys() {
                state_to_local.entry(next).or_insert_with(|| {
                    local_to_state.push(next);
                    local_to_state.len() - 1
                });
            }
        }
        state_to_local.entry(current_terminal).or_insert_with(|| {
            local_to_state.push(current_terminal);
            local_to_state.len() - 1
        });
        if local_to_state.len() > MAX_LOCAL_STATES {
            return Err(NfaBuildError::TooManySuccessors);
        }

        let mut char_to_local_set = [0u64; 256];
        for &state in &non_terminal_states {
            for (&next, predicate) in &builder.states[state as usize].next_state_to_predicate {
                let local_bit = 1u64 << state_to_local[&next];
                for byte in predicate.members() {
                    char_to_local_set[byte as usize] |= local_bit;
                }
            }
        }

        // Bytes with no explicit successor fall into the closure's terminal.
        let terminal_local_set = 1u64 << state_to_local[&current_terminal];
        for local_set in char_to_local_set.iter_mut() {
            if *local_set == 0 {
                *local_set = terminal_local_set;
            }
        }

        // For each distinct successor set, find or create the corresponding DFA state.
        let mut local_set_to_dfa_state: HashMap<u64, StateIndex> = HashMap::new();
        for byte in 0..256 {
            let local_set = char_to_local_set[byte];
            if local_set_to_dfa_state.contains_key(&local_set) {
                continue;
            }

            let mut next_set: Vec<StateIndex> = (0..MAX_LOCAL_STATES)
                .filter(|bit| local_set & (1u64 << bit) != 0)
                .map(|bit| local_to_state[bit])
                .collect();
            next_set.sort_unstable();

            let next_dfa_state = if next_set.len() == 1 && next_set[0] < 0 {
                // A pure terminal successor is encoded directly in the transition table.
                next_set[0]
            } else if let Some(&existing) = nfa_set_to_dfa_state.get(&next_set) {
                existing
            } else {
                if dfa_states.len() >= 16384 {
                    return Err(NfaBuildError::TooManyStates);
                }
                let new_dfa_state = dfa_states.len() as StateIndex;
                nfa_set_to_dfa_state.insert(next_set.clone(), new_dfa_state);
                dfa_state_to_nfa_set.push(next_set);
                dfa_states.push(DfaState::default());
                pending.push(new_dfa_state);
                new_dfa_state
            };
            local_set_to_dfa_state.insert(local_set, next_dfa_state);
        }

        let dfa_state = &mut dfa_states[current_dfa_state as usize];
        for byte in 0..256 {
            dfa_state.next_state_by_char[byte] = local_set_to_dfa_state[&char_to_local_set[byte]];
        }
    }

    Ok(dfa_states)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charset(bytes: &[u8]) -> CharSet {
        let mut set = CharSet::empty();
        for &byte in bytes {
            set.add(byte);
        }
        set
    }

    /// Builds a machine accepting "ab" as token 0 and "ac" as token 1, terminating on 'z'.
    fn two_keyword_machine() -> Machine {
        let mut builder = Builder::new();
        let after_a = builder.add_state();
        let after_ab = builder.add_state();
        let after_ac = builder.add_state();
        builder.add_edge(0, &charset(b"a"), after_a);
        builder.add_edge(after_a, &charset(b"b"), after_ab);
        builder.add_edge(after_a, &charset(b"c"), after_ac);
        builder.add_edge(
            after_ab,
            &charset(b"z"),
            terminal_state(0) | EDGE_DOESNT_CONSUME_INPUT_FLAG,
        );
        builder.add_edge(
            after_ac,
            &charset(b"z"),
            terminal_state(1) | EDGE_DOESNT_CONSUME_INPUT_FLAG,
        );
        Machine::new(builder).unwrap()
    }

    #[test]
    fn accepts_distinct_keywords() {
        let machine = two_keyword_machine();

        let (terminal, next) = machine.feed(b"abz", 0);
        assert_eq!(token_of_terminal(terminal), 0);
        assert_eq!(next, 2, "the separator byte must not be consumed");

        let (terminal, next) = machine.feed(b"acz", 0);
        assert_eq!(token_of_terminal(terminal), 1);
        assert_eq!(next, 2);
    }

    #[test]
    fn unmatched_input_reports_the_unmatched_terminal() {
        let machine = two_keyword_machine();

        let (terminal, next) = machine.feed(b"q", 0);
        assert_eq!(terminal, UNMATCHED_CHARACTER_TERMINAL);
        assert_eq!(next, 0, "nothing may be consumed on an immediate mismatch");
    }

    #[test]
    fn epsilon_closure_merges_alternatives() {
        // Two epsilon-bridged sub-automata accepting "x" and "y" with the same terminal.
        let mut builder = Builder::new();
        let x_entry = builder.add_state();
        let y_entry = builder.add_state();
        builder.add_epsilon_edge(0, x_entry);
        builder.add_epsilon_edge(0, y_entry);
        builder.add_edge(x_entry, &charset(b"x"), terminal_state(7));
        builder.add_edge(y_entry, &charset(b"y"), terminal_state(7));
        let machine = Machine::new(builder).unwrap();

        assert_eq!(token_of_terminal(machine.feed(b"x", 0).0), 7);
        assert_eq!(token_of_terminal(machine.feed(b"y", 0).0), 7);
    }

    #[test]
    fn ambiguous_terminals_fail_hard() {
        // "a" accepts as both token 0 and token 1.
        let mut builder = Builder::new();
        builder.add_edge(0, &charset(b"a"), terminal_state(0));
        builder.add_edge(0, &charset(b"a"), terminal_state(1));

        assert!(matches!(
            Machine::new(builder),
            Err(NfaBuildError::AmbiguousTerminals)
        ));
    }

    #[test]
    fn character_classes_are_compressed() {
        let machine = two_keyword_machine();

        // The alphabet {a, b, c, z} plus "everything else" needs only a handful of classes.
        assert!(machine.num_classes() <= 6);
        assert!(machine.num_states() >= 3);
    }

    #[test]
    fn every_state_byte_pair_has_exactly_one_successor() {
        // Determinism: feeding any byte from any reachable configuration either consumes it and
        // moves to exactly one state, or rewinds exactly one byte into a terminal.
        let machine = two_keyword_machine();
        for byte in 0..=255u8 {
            let input = [byte];
            let (terminal, next) = machine.feed(&input, 0);
            assert!(terminal < 0);
            assert!(next <= 1);
        }
    }
}
