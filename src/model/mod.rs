//! The model of the WebAssembly syntax.

pub mod indices;
pub mod module;
pub mod names;
pub mod types;

pub use indices::*;
pub use module::*;
pub use names::{get_disassembly_names, set_disassembly_names, DisassemblyNames, FunctionNames};
pub use types::*;
