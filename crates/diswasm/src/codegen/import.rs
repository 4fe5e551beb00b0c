//! Declarations for imported functions.

use super::syntax::{quote, type_name};
use super::Disassembler;
use crate::ir::{ExpandedModule, Function, FunctionKind};
use anyhow::{bail, Result};

pub struct ImportStub<'m> {
    module: &'m ExpandedModule,
}

impl<'m> ImportStub<'m> {
    pub fn new(module: &'m ExpandedModule) -> Self {
        Self { module }
    }
}

impl Disassembler for ImportStub<'_> {
    fn disassemble(&self, func: &Function) -> Result<String> {
        let FunctionKind::Imported { module, base } = &func.kind else {
            bail!("{} is not imported", self.module.function_name(func));
        };
        let index = self.module.function_index(func);
        let name = self.module.function_name(func);
        let params: Vec<&str> = func.params.iter().map(|t| type_name(*t, None)).collect();
        Ok(format!(
            "// [-1] Imported function $func{}, known as {}\n\
             import {} {}({}) from /* module */ {} /* export */ {};",
            index,
            name,
            type_name(func.result, None),
            name,
            params.join(", "),
            quote(module),
            quote(base)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expand_module;
    use crate::parser::parse_wasm;

    #[test]
    fn import_declaration() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "puts" (func (param i32 i64) (result i32)))
                (import "env" "weird-name" (func)))"#,
        )
        .unwrap();
        let module = expand_module(&parse_wasm(&wasm).unwrap()).unwrap();
        let stub = ImportStub::new(&module);

        assert_eq!(
            stub.disassemble(&module.functions[0]).unwrap(),
            "// [-1] Imported function $func0, known as fimport_puts\n\
             import int fimport_puts(int, long) from /* module */ \"env\" /* export */ \"puts\";"
        );
        assert!(stub
            .disassemble(&module.functions[1])
            .unwrap()
            .contains("known as fimport$1"));
    }
}
