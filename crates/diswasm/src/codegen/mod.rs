//! Code generation — emits C-like pseudocode from the expanded module.
//!
//! # Architecture
//!
//! ```text
//!                ExpandedModule
//!                      │
//!                      ▼
//!          stat::pressure(function) ──► Strategy
//!                      │
//!        ┌─────────────┼──────────────────┐
//!        ▼             ▼                  ▼
//!   ImportStub    FrameGenerator     DirectGenerator
//!   (level -1)     (level 0)          (levels 1, 2)
//!                      │                  │
//!                      └──── Lower ───────┘
//!                              │  (IR → Node)
//!                              ▼
//!                          Renderer
//!                              │
//!                              ▼
//!                 module::generate_module
//!          functions, function tables, memory dump
//! ```
//!
//! # Sub-modules
//!
//! - **`module`**: output assembly and the gadgets filter
//! - **`import`**: declarations for imported functions
//! - **`direct`**: plain translation for compressed functions
//! - **`frame`**: stack-frame reconstruction for `-O0` functions
//! - **`lower`**: the shared IR walk with generator hooks
//! - **`node`** / **`render`**: the printable tree and its text form
//! - **`syntax`**: C spelling of types, numbers and operators

mod direct;
mod frame;
mod import;
mod lower;
pub mod module;
mod node;
mod render;
pub mod syntax;

pub use direct::DirectGenerator;
pub use frame::FrameGenerator;
pub use import::ImportStub;
pub use module::generate_module;

use crate::ir::{ExpandedModule, Function};
use crate::memory::MemoryImage;
use crate::stat::{self, Pressure};
use anyhow::Result;
use log::debug;
use syntax::{indent, param_name, quote, type_name};

/// Turns one function into pseudocode, header included.
pub trait Disassembler {
    fn disassemble(&self, func: &Function) -> Result<String>;
}

/// Generator selected for a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Imported,
    FullFrame { frame_size: i64 },
    Direct { level: i8 },
}

impl From<Pressure> for Strategy {
    fn from(pressure: Pressure) -> Self {
        match pressure {
            Pressure::Imported => Strategy::Imported,
            Pressure::Decompressed { frame_size } => Strategy::FullFrame { frame_size },
            Pressure::Minor { statement } => {
                debug!("stack adjustment at statement {} left as is", statement);
                Strategy::Direct { level: 1 }
            }
            Pressure::Maximum => Strategy::Direct { level: 2 },
        }
    }
}

/// Classifies `func` and runs the matching generator.
pub fn disassemble_function(
    module: &ExpandedModule,
    memory: &MemoryImage,
    func: &Function,
) -> Result<String> {
    let index = module.function_index(func);
    match Strategy::from(stat::pressure(module, index)) {
        Strategy::Imported => ImportStub::new(module).disassemble(func),
        Strategy::FullFrame { frame_size } => {
            FrameGenerator::new(module, memory, frame_size).disassemble(func)
        }
        Strategy::Direct { level } => DirectGenerator::new(module, level).disassemble(func),
    }
}

/// Header comment, optional export line and signature, up to the brace.
fn header(module: &ExpandedModule, func: &Function, level: i8, kind: &str) -> String {
    let index = module.function_index(func);
    let name = module.function_name(func);
    let mut out = format!(
        "// O[{}] {} of $func{}, known as {}\n",
        level, kind, index, name
    );
    if let Some(key) = &func.export {
        let key = quote(key);
        out.push_str(&format!(
            "export {}; // $func{} is exported to {}\n",
            key, index, key
        ));
    }
    let params: Vec<String> = func
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{} {}", type_name(*ty, None), param_name(i as u32)))
        .collect();
    out.push_str(&format!(
        "{} {}({}) ",
        type_name(func.result, None),
        name,
        params.join(", ")
    ));
    out
}

/// Function body: declarations, a blank line, then statements.
fn function_text(header: String, decls: &[String], statements: &[String]) -> String {
    let mut out = header;
    out.push_str("{\n");
    for decl in decls {
        out.push_str(&indent(decl));
        out.push('\n');
    }
    if !decls.is_empty() {
        out.push('\n');
    }
    for stmt in statements {
        out.push_str(&indent(stmt));
        out.push('\n');
    }
    out.push_str("}\n");
    out
}
