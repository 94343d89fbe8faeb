//! Emit WebAssembly binary format.

mod errors;
mod instruction;
mod sections;
mod values;

pub use errors::EmitError;

use crate::model::Module;
use sections::emit_module;
use std::io::Write;

/// Emits the binary representation of a module to a `Write` output, returning the number of
/// bytes written.
///
/// The encoding is the byte-exact inverse of the binary parser on any module this crate
/// produces.
///
/// # Examples
/// ```rust
/// use wasm_syntax::{emit_binary, FeatureSpec, Module};
///
/// let mut buffer = Vec::new();
/// emit_binary(&Module::new(FeatureSpec::default()), &mut buffer).unwrap();
///
/// assert_eq!(buffer, vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
/// ```
pub fn emit_binary<O: Write>(module: &Module, output: &mut O) -> Result<usize, EmitError> {
    emit_module(module, output)
}

/// Emits the binary representation of a module into a byte vector.
pub fn save_binary_module(module: &Module) -> Result<Vec<u8>, EmitError> {
    let mut bytes = Vec::new();
    emit_binary(module, &mut bytes)?;
    Ok(bytes)
}

/// Counts the number of bytes written, but does else nothing with the bytes.
#[derive(Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq)]
pub struct CountingWrite {
    bytes: usize,
}

impl CountingWrite {
    /// Create a default instance of a counting write.
    pub fn new() -> Self {
        CountingWrite::default()
    }

    /// The number of bytes written so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Write for CountingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes += buf.len();

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.bytes += buf.len();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;
    use crate::parser::load_binary_module;
    use crate::text::module::parse_module;

    fn round_trip(text: &str) -> (Module, Vec<u8>) {
        let (module, errors) = parse_module(text, FeatureSpec::default());
        assert!(errors.is_empty(), "parse errors: {errors:?}");

        let bytes = save_binary_module(&module).unwrap();
        let reloaded = load_binary_module(&bytes, FeatureSpec::default()).unwrap();
        (reloaded, bytes)
    }

    #[test]
    fn empty_module() {
        let mut buffer = Vec::new();
        let written = emit_binary(&Module::new(FeatureSpec::default()), &mut buffer).unwrap();

        assert_eq!(written, 8);
        assert_eq!(buffer, b"\x00\x61\x73\x6D\x01\x00\x00\x00");
    }

    #[test]
    fn counting_write_counts() {
        let mut counter = CountingWrite::new();
        let written = emit_binary(&Module::new(FeatureSpec::default()), &mut counter).unwrap();

        assert_eq!(written, counter.bytes());
    }

    #[test]
    fn emitted_modules_reload_identically() {
        let (reloaded, bytes) = round_trip(
            r#"(module
                (memory 1)
                (global $g (mut i32) (i32.const 7))
                (func (export "bump") (result i32)
                    global.get $g
                    i32.const 1
                    i32.add
                    global.set $g
                    global.get $g))"#,
        );

        // Re-emitting the reloaded module reproduces the same bytes.
        let bytes_again = save_binary_module(&reloaded).unwrap();
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn segments_survive_the_round_trip() {
        let (reloaded, _) = round_trip(
            r#"(module
                (memory 1)
                (table 4 funcref)
                (func $f)
                (data (i32.const 0) "seed")
                (data "passive bytes")
                (elem (i32.const 0) func $f)
                (elem funcref (ref.func $f)))"#,
        );

        assert_eq!(reloaded.data_segments.len(), 2);
        assert_eq!(reloaded.data_segments[0].data, b"seed");
        assert_eq!(reloaded.elem_segments.len(), 2);
    }
}
