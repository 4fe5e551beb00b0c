//! Module statistics: toolchain detection and per-function compression.
//!
//! Both queries are pure functions of the expanded module and are computed at
//! most once per module. The cache lives inside [`ExpandedModule`] and is
//! dropped with it.

mod backend;
mod pressure;

pub use backend::Backend;
pub use pressure::Pressure;

use crate::ir::ExpandedModule;
use log::debug;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;

/// Memoized statistics of one module.
#[derive(Debug, Default)]
pub struct StatCache {
    backend: OnceCell<Backend>,
    pressure: RefCell<HashMap<u32, Pressure>>,
}

/// Toolchain that produced the module, detected once.
pub fn backend(module: &ExpandedModule) -> Backend {
    *module
        .stats
        .backend
        .get_or_init(|| backend::detect(&module.globals))
}

/// Compression level of the function at `index`, classified once.
pub fn pressure(module: &ExpandedModule, index: u32) -> Pressure {
    if let Some(p) = module.stats.pressure.borrow().get(&index) {
        return *p;
    }
    let stack_pointer = backend(module).stack_pointer();
    let p = match module.functions.get(index as usize) {
        Some(func) => pressure::classify(func, stack_pointer),
        None => Pressure::Maximum,
    };
    debug!("function {} classified as O[{}] ({:?})", index, p.level(), p);
    module.stats.pressure.borrow_mut().insert(index, p);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expand_module;
    use crate::parser::parse_wasm;

    fn expand(wat: &str) -> ExpandedModule {
        let wasm = wat::parse_str(wat).unwrap();
        expand_module(&parse_wasm(&wasm).unwrap()).unwrap()
    }

    #[test]
    fn results_are_cached() {
        let module = expand(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (result i32) i32.const 1))"#,
        );
        assert_eq!(backend(&module), backend(&module));
        let first = pressure(&module, 0);
        assert_eq!(module.stats.pressure.borrow().len(), 1);
        assert_eq!(pressure(&module, 0), first);
        assert_eq!(first, Pressure::Maximum);
    }

    #[test]
    fn unknown_function_is_maximum() {
        let module = expand("(module)");
        assert_eq!(pressure(&module, 7), Pressure::Maximum);
        assert_eq!(backend(&module), Backend::Unknown);
    }
}
