//! The composable operator sink interface.
//!
//! Both front ends drive a sink as they produce each operator: the text parser and the binary
//! decoder feed a validating sink that wraps this module's [`OperatorEncoder`], expressing
//! "validate, then encode" as plain composition without an intermediate operator buffer.

use crate::operators::codec::encode_operator;
use crate::operators::Operator;
use crate::validate::ValidationError;

/// Consumes a stream of operators, one at a time.
///
/// A sink failure carries no source location; the caller owns the mapping from the failed
/// operator back to a token or byte offset.
pub trait OperatorSink {
    fn operator(&mut self, op: Operator) -> Result<(), ValidationError>;
}

/// A sink that appends each operator to an internal-encoding byte string. Never fails.
#[derive(Debug, Default)]
pub struct OperatorEncoder {
    code: Vec<u8>,
    branch_tables: Vec<Vec<u32>>,
}

impl OperatorEncoder {
    pub fn new() -> Self {
        OperatorEncoder::default()
    }

    /// The encoded byte string and the out-of-line branch tables accumulated so far.
    pub fn finish(self) -> (Vec<u8>, Vec<Vec<u32>>) {
        (self.code, self.branch_tables)
    }
}

impl OperatorSink for OperatorEncoder {
    fn operator(&mut self, op: Operator) -> Result<(), ValidationError> {
        encode_operator(&op, &mut self.code, &mut self.branch_tables);
        Ok(())
    }
}
