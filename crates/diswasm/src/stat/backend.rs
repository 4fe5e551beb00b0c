use crate::ir::{Expr, Global, WasmType};
use log::warn;
use std::fmt;

/// Toolchain family and pointer width.
///
/// LLVM keeps its shadow stack pointer in the first mutable integer global
/// with a constant initializer; that global's index is carried along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Llvm32 { stack_pointer: u32 },
    Llvm64 { stack_pointer: u32 },
    Unknown,
}

impl Backend {
    pub fn stack_pointer(&self) -> Option<u32> {
        match self {
            Backend::Llvm32 { stack_pointer } | Backend::Llvm64 { stack_pointer } => {
                Some(*stack_pointer)
            }
            Backend::Unknown => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Backend::Unknown)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Llvm32 { .. } => write!(f, "llvm32"),
            Backend::Llvm64 { .. } => write!(f, "llvm64"),
            Backend::Unknown => write!(f, "unknown"),
        }
    }
}

fn is_stack_pointer_candidate(global: &Global) -> bool {
    global.mutable && global.ty.is_integer() && matches!(global.init, Some(Expr::Const(_)))
}

pub(super) fn detect(globals: &[Global]) -> Backend {
    let mut candidates = globals
        .iter()
        .enumerate()
        .filter(|(_, g)| is_stack_pointer_candidate(g));

    let Some((index, global)) = candidates.next() else {
        return Backend::Unknown;
    };
    let others = candidates.count();
    if others > 0 {
        warn!(
            "{} globals look like a stack pointer; using {} ({})",
            others + 1,
            global.name,
            index
        );
    }

    let stack_pointer = index as u32;
    match global.ty {
        WasmType::I64 => Backend::Llvm64 { stack_pointer },
        _ => Backend::Llvm32 { stack_pointer },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrValue;

    fn global(ty: WasmType, mutable: bool, init: Option<Expr>) -> Global {
        Global {
            name: "g".to_string(),
            ty,
            mutable,
            init,
        }
    }

    fn i32_const(v: i32) -> Option<Expr> {
        Some(Expr::Const(IrValue::I32(v)))
    }

    #[test]
    fn first_mutable_integer_global_wins() {
        let globals = vec![
            global(WasmType::I32, false, i32_const(0)),
            global(WasmType::F64, true, Some(Expr::Const(IrValue::F64(0.0)))),
            global(WasmType::I32, true, i32_const(65536)),
            global(WasmType::I64, true, Some(Expr::Const(IrValue::I64(0)))),
        ];
        let backend = detect(&globals);
        assert_eq!(backend, Backend::Llvm32 { stack_pointer: 2 });
        assert_eq!(backend.to_string(), "llvm32");
    }

    #[test]
    fn wide_stack_pointer_is_llvm64() {
        let globals = vec![global(
            WasmType::I64,
            true,
            Some(Expr::Const(IrValue::I64(1 << 20))),
        )];
        assert_eq!(detect(&globals), Backend::Llvm64 { stack_pointer: 0 });
    }

    #[test]
    fn imported_or_computed_globals_do_not_count() {
        let globals = vec![
            global(WasmType::I32, true, None),
            global(
                WasmType::I32,
                true,
                Some(Expr::GlobalGet {
                    index: 0,
                    ty: WasmType::I32,
                }),
            ),
        ];
        let backend = detect(&globals);
        assert_eq!(backend, Backend::Unknown);
        assert!(!backend.is_supported());
        assert_eq!(backend.stack_pointer(), None);
    }

    #[test]
    fn detection_is_deterministic() {
        let globals = vec![global(WasmType::I32, true, i32_const(8))];
        assert_eq!(detect(&globals), detect(&globals));
    }
}
