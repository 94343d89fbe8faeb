//! A WebAssembly front end: conversion between the standard binary encoding and the standard
//! S-expression text encoding over a shared syntax model, guarded by a structural validator.
//!
//! Four pipelines run over the one in-memory [`Module`] representation:
//!
//! - [`parse_module`] lexes, parses, and validates text into a module;
//! - [`print_module`] renders a module back to canonical text;
//! - [`load_binary_module`] decodes and validates the binary format;
//! - [`emit_binary`] / [`save_binary_module`] encode a module into the binary format.
//!
//! [`parse_test_commands`] additionally parses the assertion commands of spec test scripts,
//! and [`validate_module`] re-checks an arbitrary in-memory module. Which proposed extensions
//! are accepted is controlled by the [`FeatureSpec`] threaded through every entry point.

pub mod emitter;
pub mod features;
pub mod leb128;
pub mod model;
pub mod operators;
pub mod parser;
pub mod text;
pub mod validate;

pub use features::{Feature, FeatureSpec};
pub use model::*;

pub use emitter::{emit_binary, save_binary_module, CountingWrite, EmitError};
pub use parser::{load_binary_module, LoadError};
pub use text::{parse_module, parse_test_commands, print_module, Error, TextFileLocus};
pub use validate::{validate_module, ValidationError};
