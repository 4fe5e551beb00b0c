//! Intermediate Representation (IR) for Wasm → pseudocode decompilation.
//!
//! Function bodies are rebuilt from the flat operator stream into expression
//! trees with structured control flow. Every generator reads the same tree.

mod types;
pub use types::*;

pub mod ident;
pub use ident::{IdentId, IdentTable, Identifier, IdentifierResolver};

pub mod builder;
pub use builder::{expand_module, ModuleContext};
