//! WebAssembly module parser.
//!
//! Thin layer over `wasmparser` that collects the sections the decompiler
//! needs. Function bodies are kept as raw operator bytes and only decoded by
//! the expander.

use crate::error::DecompileError;
use anyhow::{bail, Context, Result};
use log::warn;
use std::collections::HashMap;
use wasmparser::{
    ExternalKind, FuncType, KnownCustom, Name, Operator, Parser, Payload, TypeRef, ValType,
};

/// Constant initializer of a global or segment offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// `global.get N`, legal for imported globals only.
    GlobalGet(u32),
}

/// A global defined by the module.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub val_type: ValType,
    pub mutable: bool,
    pub init: InitExpr,
}

/// An active element segment targeting table 0.
#[derive(Debug, Clone)]
pub struct ElementSegment {
    /// Start index in the table. Not guaranteed to be a constant.
    pub offset: InitExpr,
    /// Absolute function indices stored from `offset` onwards.
    pub func_indices: Vec<u32>,
}

/// An active data segment targeting memory 0.
#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExportInfo {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct ImportInfo {
    pub module_name: String,
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// Index into the type section.
    Function(u32),
    Global { val_type: ValType, mutable: bool },
}

/// Entries of the `name` custom section the decompiler uses.
#[derive(Debug, Clone, Default)]
pub struct NameSection {
    pub functions: HashMap<u32, String>,
    pub globals: HashMap<u32, String>,
}

/// Parsed WebAssembly module.
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub types: Vec<FuncType>,

    /// Function and global imports, in import order. Memory and table
    /// imports carry nothing the decompiler renders and are dropped.
    pub imports: Vec<ImportInfo>,

    /// Functions defined in the module (code section order).
    pub functions: Vec<ParsedFunction>,

    /// Globals defined in the module. Imported globals precede them in the
    /// global index space.
    pub globals: Vec<GlobalInfo>,

    pub element_segments: Vec<ElementSegment>,

    pub data_segments: Vec<DataSegment>,

    pub exports: Vec<ExportInfo>,

    pub names: NameSection,

    pub num_imported_functions: u32,

    pub num_imported_globals: u32,
}

/// A single function in the module.
#[derive(Debug, Clone)]
pub struct ParsedFunction {
    /// Index into the types section
    pub type_idx: u32,

    /// Declared locals, expanded one entry per local
    pub locals: Vec<ValType>,

    /// Function body (Wasm bytecode)
    pub body: Vec<u8>,
}

impl ParsedModule {
    /// Function type of an absolute function index.
    pub fn func_type(&self, func_idx: u32) -> Option<&FuncType> {
        let type_idx = if func_idx < self.num_imported_functions {
            self.imports
                .iter()
                .filter_map(|imp| match imp.kind {
                    ImportKind::Function(t) => Some(t),
                    ImportKind::Global { .. } => None,
                })
                .nth(func_idx as usize)?
        } else {
            self.functions
                .get((func_idx - self.num_imported_functions) as usize)?
                .type_idx
        };
        self.types.get(type_idx as usize)
    }

    /// Value type of an absolute global index.
    pub fn global_type(&self, global_idx: u32) -> Option<ValType> {
        if global_idx < self.num_imported_globals {
            self.imports
                .iter()
                .filter_map(|imp| match imp.kind {
                    ImportKind::Global { val_type, .. } => Some(val_type),
                    ImportKind::Function(_) => None,
                })
                .nth(global_idx as usize)
        } else {
            self.globals
                .get((global_idx - self.num_imported_globals) as usize)
                .map(|g| g.val_type)
        }
    }
}

/// Evaluate a wasmparser ConstExpr into an `InitExpr`.
fn eval_const_expr(const_expr: &wasmparser::ConstExpr) -> Result<InitExpr> {
    let mut reader = const_expr.get_operators_reader();
    let op = reader.read().context("reading const expr operator")?;
    match op {
        Operator::I32Const { value } => Ok(InitExpr::I32(value)),
        Operator::I64Const { value } => Ok(InitExpr::I64(value)),
        Operator::F32Const { value } => Ok(InitExpr::F32(f32::from_bits(value.bits()))),
        Operator::F64Const { value } => Ok(InitExpr::F64(f64::from_bits(value.bits()))),
        Operator::GlobalGet { global_index } => Ok(InitExpr::GlobalGet(global_index)),
        _ => bail!(DecompileError::UnsupportedInstruction(format!(
            "{:?} in constant expression",
            op
        ))),
    }
}

/// Parse an active element segment, or return None for passive/declared segments.
fn parse_element_segment(element: wasmparser::Element) -> Result<Option<ElementSegment>> {
    let offset = match element.kind {
        wasmparser::ElementKind::Active {
            table_index,
            offset_expr,
        } => {
            let tidx = table_index.unwrap_or(0);
            if tidx != 0 {
                bail!(DecompileError::UnsupportedInstruction(format!(
                    "element segment for table {}",
                    tidx
                )));
            }
            eval_const_expr(&offset_expr)?
        }
        wasmparser::ElementKind::Passive | wasmparser::ElementKind::Declared => return Ok(None),
    };

    let mut func_indices = Vec::new();
    match element.items {
        wasmparser::ElementItems::Functions(funcs) => {
            for func_idx in funcs {
                func_indices.push(func_idx.context("reading element func index")?);
            }
        }
        wasmparser::ElementItems::Expressions(_, exprs) => {
            for expr in exprs {
                let expr = expr.context("reading element expression")?;
                let mut reader = expr.get_operators_reader();
                match reader.read().context("reading element operator")? {
                    Operator::RefFunc { function_index } => func_indices.push(function_index),
                    op => bail!(DecompileError::UnsupportedInstruction(format!(
                        "{:?} in element segment",
                        op
                    ))),
                }
            }
        }
    }

    Ok(Some(ElementSegment {
        offset,
        func_indices,
    }))
}

/// Parse an active data segment, or return None for passive segments.
fn parse_data_segment(data: wasmparser::Data) -> Result<Option<DataSegment>> {
    match data.kind {
        wasmparser::DataKind::Active {
            memory_index: 0,
            offset_expr,
        } => {
            let offset = match eval_const_expr(&offset_expr)? {
                InitExpr::I32(v) => v as u32 as u64,
                InitExpr::I64(v) => v as u64,
                other => bail!(DecompileError::UnsupportedInstruction(format!(
                    "data segment offset {:?}",
                    other
                ))),
            };
            Ok(Some(DataSegment {
                offset,
                data: data.data.to_vec(),
            }))
        }
        wasmparser::DataKind::Passive => Ok(None),
        wasmparser::DataKind::Active { memory_index, .. } => {
            bail!(DecompileError::UnsupportedInstruction(format!(
                "data segment for memory {}",
                memory_index
            )));
        }
    }
}

/// Parse a function code section entry, extracting locals and bytecode.
fn parse_code_entry(body: wasmparser::FunctionBody, type_idx: u32) -> Result<ParsedFunction> {
    let mut locals = Vec::new();
    let locals_reader = body.get_locals_reader().context("getting locals reader")?;
    for local in locals_reader {
        let (count, val_type) = local.context("reading local")?;
        for _ in 0..count {
            locals.push(val_type);
        }
    }

    let operators_reader = body
        .get_operators_reader()
        .context("getting operators reader")?;
    let mut binary_reader = operators_reader.get_binary_reader();
    let remaining = binary_reader.bytes_remaining();
    let body_bytes = binary_reader
        .read_bytes(remaining)
        .context("reading body bytes")?;

    Ok(ParsedFunction {
        type_idx,
        locals,
        body: body_bytes.to_vec(),
    })
}

fn parse_name_section(reader: wasmparser::NameSectionReader, names: &mut NameSection) -> Result<()> {
    for subsection in reader {
        let (map, target) = match subsection.context("reading name subsection")? {
            Name::Function(map) => (map, &mut names.functions),
            Name::Global(map) => (map, &mut names.globals),
            _ => continue,
        };
        for naming in map {
            let naming = naming.context("reading naming")?;
            target.insert(naming.index, naming.name.to_string());
        }
    }
    Ok(())
}

/// Parse a WebAssembly binary into a structured module.
pub fn parse_wasm(wasm_bytes: &[u8]) -> Result<ParsedModule> {
    let parser = Parser::new(0);

    let mut module = ParsedModule::default();
    let mut function_types: Vec<u32> = Vec::new();

    for payload in parser.parse_all(wasm_bytes) {
        let payload = payload.context("parsing wasm payload")?;

        match payload {
            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    let rec_group = rec_group.context("reading rec group")?;
                    for sub_type in rec_group.types() {
                        if let wasmparser::CompositeInnerType::Func(func_ty) =
                            &sub_type.composite_type.inner
                        {
                            module.types.push(func_ty.clone());
                        }
                    }
                }
            }

            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.context("reading import")?;
                    let kind = match import.ty {
                        TypeRef::Func(type_idx) => {
                            module.num_imported_functions += 1;
                            ImportKind::Function(type_idx)
                        }
                        TypeRef::Global(global_ty) => {
                            module.num_imported_globals += 1;
                            ImportKind::Global {
                                val_type: global_ty.content_type,
                                mutable: global_ty.mutable,
                            }
                        }
                        _ => continue,
                    };
                    module.imports.push(ImportInfo {
                        module_name: import.module.to_string(),
                        name: import.name.to_string(),
                        kind,
                    });
                }
            }

            Payload::FunctionSection(reader) => {
                for func_type_idx in reader {
                    function_types.push(func_type_idx.context("reading function type index")?);
                }
            }

            Payload::CodeSectionEntry(body) => {
                let type_idx = *function_types
                    .get(module.functions.len())
                    .context("code entry without a matching function declaration")?;
                module.functions.push(parse_code_entry(body, type_idx)?);
            }

            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.context("reading global")?;
                    module.globals.push(GlobalInfo {
                        val_type: global.ty.content_type,
                        mutable: global.ty.mutable,
                        init: eval_const_expr(&global.init_expr)?,
                    });
                }
            }

            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element.context("reading element segment")?;
                    if let Some(segment) = parse_element_segment(element)? {
                        module.element_segments.push(segment);
                    }
                }
            }

            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.context("reading export")?;
                    module.exports.push(ExportInfo {
                        name: export.name.to_string(),
                        kind: export.kind,
                        index: export.index,
                    });
                }
            }

            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.context("reading data segment")?;
                    if let Some(segment) = parse_data_segment(data)? {
                        module.data_segments.push(segment);
                    }
                }
            }

            Payload::CustomSection(reader) => {
                if let KnownCustom::Name(names) = reader.as_known() {
                    if let Err(e) = parse_name_section(names, &mut module.names) {
                        warn!("ignoring malformed name section: {:#}", e);
                    }
                }
            }

            _ => {}
        }
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_module() {
        let wasm = wat::parse_str("(module)").unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.types.len(), 0);
        assert_eq!(module.functions.len(), 0);
    }

    #[test]
    fn second_table_segments_are_unsupported() {
        let wasm = wat::parse_str(
            r#"(module
                (table 1 funcref)
                (table $other 1 funcref)
                (elem (table $other) (i32.const 0) func $f)
                (func $f))"#,
        )
        .unwrap();
        let err = parse_wasm(&wasm).unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(DecompileError::UnsupportedInstruction(_))
        ));
    }

    #[test]
    fn parse_locals_are_expanded() {
        let wat = r#"
            (module
                (func (param i32) (local i32 i32 f64)
                    nop
                )
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(
            module.functions[0].locals,
            vec![ValType::I32, ValType::I32, ValType::F64]
        );
    }

    #[test]
    fn parse_mutable_global() {
        let wat = r#"
            (module
                (global (mut i32) (i32.const 66560))
                (global f64 (f64.const 1.5))
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.globals.len(), 2);
        assert!(module.globals[0].mutable);
        assert_eq!(module.globals[0].init, InitExpr::I32(66560));
        assert!(!module.globals[1].mutable);
        assert_eq!(module.globals[1].init, InitExpr::F64(1.5));
    }

    #[test]
    fn parse_global_initialized_from_import() {
        let wat = r#"
            (module
                (import "env" "base" (global $base i32))
                (global (mut i32) (global.get $base))
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.num_imported_globals, 1);
        assert_eq!(module.globals[0].init, InitExpr::GlobalGet(0));
        assert_eq!(module.global_type(0), Some(ValType::I32));
    }

    #[test]
    fn parse_element_segment_with_offset() {
        let wat = r#"
            (module
                (table 4 funcref)
                (func $a)
                (func $b)
                (elem (i32.const 1) $a $b)
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.element_segments.len(), 1);
        assert_eq!(module.element_segments[0].offset, InitExpr::I32(1));
        assert_eq!(module.element_segments[0].func_indices, vec![0, 1]);
    }

    #[test]
    fn parse_element_segment_expressions() {
        let wat = r#"
            (module
                (table 2 funcref)
                (func $a)
                (elem (i32.const 0) funcref (ref.func $a))
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.element_segments[0].func_indices, vec![0]);
    }

    #[test]
    fn parse_data_segments() {
        let wat = r#"
            (module
                (memory 1)
                (data (i32.const 16) "Hello")
                (data (i32.const 1024) "\00\01")
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.data_segments.len(), 2);
        assert_eq!(module.data_segments[0].offset, 16);
        assert_eq!(module.data_segments[0].data, b"Hello");
        assert_eq!(module.data_segments[1].offset, 1024);
    }

    #[test]
    fn parse_name_section_entries() {
        let wat = r#"
            (module
                (import "env" "puts" (func $puts (param i32)))
                (global $counter (mut i32) (i32.const 0))
                (func $main)
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        assert_eq!(module.names.functions.get(&0).map(String::as_str), Some("puts"));
        assert_eq!(module.names.functions.get(&1).map(String::as_str), Some("main"));
        assert_eq!(module.names.globals.get(&0).map(String::as_str), Some("counter"));
    }

    #[test]
    fn parse_function_import_and_types() {
        let wat = r#"
            (module
                (import "env" "log" (func (param i32)))
                (import "env" "mem" (memory 1))
                (func (result i32)
                    i32.const 42
                )
                (export "answer" (func 1))
            )
        "#;
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();

        assert_eq!(module.imports.len(), 1);
        assert_eq!(module.imports[0].module_name, "env");
        assert_eq!(module.imports[0].name, "log");
        assert!(matches!(module.imports[0].kind, ImportKind::Function(0)));
        assert_eq!(module.num_imported_functions, 1);

        assert_eq!(module.func_type(0).map(|t| t.params().len()), Some(1));
        assert_eq!(module.func_type(1).map(|t| t.results().len()), Some(1));
        assert!(module.func_type(2).is_none());

        assert_eq!(module.exports[0].name, "answer");
        assert_eq!(module.exports[0].kind, ExternalKind::Func);
        assert_eq!(module.exports[0].index, 1);
    }
}
