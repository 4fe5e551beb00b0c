//! Direct generator for compressed functions.
//!
//! Nothing is inferred: parameters, locals and globals keep synthesized names
//! and every memory access is a typed pointer dereference.

use super::lower::Lower;
use super::node::Node;
use super::render::Renderer;
use super::syntax::{local_name, type_name};
use super::{function_text, header, Disassembler};
use crate::ir::{ExpandedModule, Function};
use anyhow::Result;

pub struct DirectGenerator<'m> {
    module: &'m ExpandedModule,
    level: i8,
}

impl<'m> DirectGenerator<'m> {
    pub fn new(module: &'m ExpandedModule, level: i8) -> Self {
        Self { module, level }
    }
}

impl Disassembler for DirectGenerator<'_> {
    fn disassemble(&self, func: &Function) -> Result<String> {
        let mut lowering = DirectLowering {
            module: self.module,
            func,
        };
        let statements = lowering.body_statements()?;

        let params = func.params.len() as u32;
        let decls: Vec<String> = func
            .locals()
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let index = params + i as u32;
                format!(
                    "// local index={}\n{} {};",
                    index,
                    type_name(*ty, None),
                    local_name(index)
                )
            })
            .collect();

        let mut renderer = Renderer::new();
        let lines: Vec<String> = statements
            .iter()
            .filter_map(|s| renderer.statement(s))
            .collect();

        let head = header(self.module, func, self.level, "Disassembly");
        Ok(function_text(head, &decls, &lines))
    }
}

struct DirectLowering<'m, 'f> {
    module: &'m ExpandedModule,
    func: &'f Function,
}

impl Lower for DirectLowering<'_, '_> {
    fn module(&self) -> &ExpandedModule {
        self.module
    }

    fn function(&self) -> &Function {
        self.func
    }

    fn local_get(&mut self, index: u32) -> Result<Node> {
        self.variable(index)
    }

    fn local_set(&mut self, index: u32, value: Node, _tee: bool) -> Result<Node> {
        Ok(Node::Assign {
            target: Box::new(self.variable(index)?),
            value: Box::new(value),
        })
    }
}
