//! diswasm — WebAssembly decompiler for LLVM-produced modules.
//!
//! This crate turns a WebAssembly binary into C-like pseudocode: stack
//! variables, structured control flow, function signatures, string literals,
//! the indirect-call function table and an annotated dump of initialized
//! memory.

pub mod codegen;
pub mod error;
pub mod ir;
pub mod memory;
pub mod parser;
pub mod stat;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use error::DecompileError;
use codegen::generate_module;
use ir::expand_module;
use parser::parse_wasm;

/// Configuration options for decompilation
#[derive(Debug, Clone, Default)]
pub struct DecompileOptions {
    /// Only emit functions reachable through the function table
    pub gadgets: bool,
}

/// Decompile a WebAssembly module to pseudocode.
///
/// Fails on the first unsupported construct; there is no partial output.
///
/// # Arguments
/// * `wasm_bytes` - Raw WebAssembly binary data
/// * `options` - Decompilation configuration options
///
/// # Example
/// ```no_run
/// use diswasm::{decompile, DecompileOptions};
///
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let text = decompile(&wasm_bytes, &DecompileOptions::default()).unwrap();
/// std::fs::write("output.c", text).unwrap();
/// ```
pub fn decompile(wasm_bytes: &[u8], options: &DecompileOptions) -> Result<String> {
    let parsed = parse_wasm(wasm_bytes).context("failed to parse WebAssembly module")?;

    let module = expand_module(&parsed).context("failed to expand module")?;

    generate_module(&module, options.gadgets).context("failed to generate pseudocode")
}
