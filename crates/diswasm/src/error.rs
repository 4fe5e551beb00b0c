//! Fatal error categories.
//!
//! Every variant aborts the whole run. They are raised through `anyhow` so the
//! pipeline can attach context, and recovered with `downcast_ref` when a caller
//! needs to know which category fired.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("Unsupported backend: {0} (expected llvm32 or llvm64)")]
    UnsupportedBackend(String),

    #[error("Unresolved identifier: {0} does not name any function")]
    UnresolvedIdentifier(String),

    #[error("Duplicate identifier: {0} names more than one function")]
    DuplicateIdentifier(String),

    #[error("Non-constant offset in function table segment {0}")]
    NonConstantTableOffset(usize),

    #[error("Unsupported instruction: {0}")]
    UnsupportedInstruction(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("Malformed function body: {0}")]
    MalformedBody(String),
}

/// Finds the typed category behind an `anyhow` error chain.
pub fn category(err: &anyhow::Error) -> Option<&DecompileError> {
    err.chain().find_map(|e| e.downcast_ref::<DecompileError>())
}
