/// An error in LEB128 encoding or decoding.
#[derive(thiserror::Error, Debug)]
pub enum Leb128Error {
    #[error("The parsed integer requires {0} encoding groups, but the target type admits at most {1}.")]
    Overflow(usize, usize),
    #[error("The given input does not contain a complete LEB128-encoded integer.")]
    Invalid,
    #[error("Failed to write to the given output.")]
    WriteFailure(#[from] std::io::Error),
}
