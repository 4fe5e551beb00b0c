//! # Module Expander
//!
//! Turns a `ParsedModule` into an `ExpandedModule`.
//!
//! ```text
//! ParsedModule
//!      │
//!      ├─ raw_function_names() ─► IdentifierResolver::intern (one per function)
//!      ├─ ModuleContext        ─► signatures, global types, interned names
//!      │
//!      ├─ for each function:
//!      │     import  ─► FunctionKind::Imported
//!      │     defined ─► FunctionBuilder::translate_operator (per operator)
//!      │                  └── close() at each `end` folds a frame into its parent
//!      │
//!      ├─ element segments (entries interned), data segments, globals
//!      │
//!      └─ IdentifierResolver::resolve ─► IdentTable ─► ExpandedModule
//! ```
//!
//! Names given to functions without a name-section entry follow the usual
//! toolchain convention: `fimport$N` for the N-th imported function, the
//! decimal function index otherwise (displayed as `$funcN`).

pub mod core;
mod translate;

pub use self::core::ModuleContext;

use self::core::{signature, FunctionBuilder};
use super::ident::{display_form, IdentifierResolver};
use super::types::*;
use crate::parser::{ImportKind, InitExpr, ParsedFunction, ParsedModule};
use crate::stat::StatCache;
use anyhow::{Context, Result};
use log::debug;
use std::collections::{HashMap, HashSet};
use wasmparser::ExternalKind;

/// Expand a parsed module into IR, resolving every function identifier.
pub fn expand_module(parsed: &ParsedModule) -> Result<ExpandedModule> {
    let mut resolver = IdentifierResolver::new();
    let raw_names = raw_function_names(parsed);
    let func_idents: Vec<_> = raw_names.iter().map(|n| resolver.intern(n)).collect();

    let total = parsed.num_imported_functions as usize + parsed.functions.len();
    let func_types = (0..total as u32)
        .map(|i| {
            parsed
                .func_type(i)
                .with_context(|| format!("function {} has no type", i))
        })
        .collect::<Result<Vec<_>>>()?;
    let global_types = (0..parsed.num_imported_globals + parsed.globals.len() as u32)
        .map(|i| {
            let vt = parsed
                .global_type(i)
                .with_context(|| format!("global {} has no type", i))?;
            WasmType::from_wasmparser(vt)
        })
        .collect::<Result<Vec<_>>>()?;

    let ctx = ModuleContext {
        types: &parsed.types,
        func_types,
        func_idents,
        global_types,
    };

    let mut exports: HashMap<u32, String> = HashMap::new();
    for export in &parsed.exports {
        if export.kind == ExternalKind::Func {
            exports.entry(export.index).or_insert_with(|| export.name.clone());
        }
    }

    let function_imports = parsed.imports.iter().filter_map(|imp| match imp.kind {
        ImportKind::Function(_) => Some((imp.module_name.clone(), imp.name.clone())),
        ImportKind::Global { .. } => None,
    });
    let mut functions = Vec::with_capacity(total);
    for (i, (module, base)) in function_imports.enumerate() {
        let (params, result) = signature(ctx.func_types[i])?;
        functions.push(Function {
            name: ctx.func_idents[i],
            params,
            result,
            kind: FunctionKind::Imported { module, base },
            export: exports.remove(&(i as u32)),
        });
    }
    for (local_idx, func) in parsed.functions.iter().enumerate() {
        let index = parsed.num_imported_functions as usize + local_idx;
        let (params, result) = signature(ctx.func_types[index])?;
        let (locals, body) = expand_body(&ctx, func, &params, result)
            .with_context(|| format!("failed to expand function {}", raw_names[index]))?;
        functions.push(Function {
            name: ctx.func_idents[index],
            params,
            result,
            kind: FunctionKind::Local { locals, body },
            export: exports.remove(&(index as u32)),
        });
    }

    let mut element_segments = Vec::with_capacity(parsed.element_segments.len());
    for segment in &parsed.element_segments {
        let entries = segment
            .func_indices
            .iter()
            .map(|i| {
                raw_names
                    .get(*i as usize)
                    .map(|n| resolver.intern(n))
                    .with_context(|| format!("element segment names unknown function {}", i))
            })
            .collect::<Result<Vec<_>>>()?;
        element_segments.push(ElementSegment {
            entries,
            offset: init_expr(&segment.offset, &ctx.global_types),
        });
    }

    let data_segments = parsed
        .data_segments
        .iter()
        .map(|seg| DataSegment {
            offset: seg.offset,
            data: seg.data.clone(),
        })
        .collect();

    let globals = build_globals(parsed, &ctx.global_types);

    let identifiers = resolver
        .resolve(&functions)
        .context("failed to resolve function identifiers")?;

    debug!(
        "expanded {} functions ({} imported), {} globals, {} table segments, {} data segments",
        functions.len(),
        parsed.num_imported_functions,
        globals.len(),
        element_segments.len(),
        parsed.data_segments.len()
    );

    Ok(ExpandedModule {
        functions,
        globals,
        element_segments,
        data_segments,
        identifiers,
        stats: StatCache::default(),
    })
}

/// Internal names of every function by absolute index.
///
/// Names are made unique by their printed form, so `1` (shown as `$func1`)
/// and a name-section entry `$func1` do not collide.
fn raw_function_names(parsed: &ParsedModule) -> Vec<String> {
    let total = parsed.num_imported_functions + parsed.functions.len() as u32;
    let mut seen = HashSet::new();
    (0..total)
        .map(|i| {
            let name = match parsed.names.functions.get(&i) {
                Some(name) => name.clone(),
                None if i < parsed.num_imported_functions => format!("fimport${}", i),
                None => i.to_string(),
            };
            let mut unique = name.clone();
            let mut n = 0;
            while !seen.insert(display_form(&unique)) {
                unique = if n == 0 {
                    format!("{}.{}", name, i)
                } else {
                    format!("{}.{}.{}", name, i, n)
                };
                n += 1;
            }
            unique
        })
        .collect()
}

fn build_globals(parsed: &ParsedModule, global_types: &[WasmType]) -> Vec<Global> {
    let imported = parsed.imports.iter().filter_map(|imp| match imp.kind {
        ImportKind::Global { mutable, .. } => Some(mutable),
        ImportKind::Function(_) => None,
    });
    let mut globals = Vec::with_capacity(global_types.len());
    for (i, mutable) in imported.enumerate() {
        globals.push(Global {
            name: global_name(parsed, i as u32, format!("gimport${}", i)),
            ty: global_types[i],
            mutable,
            init: None,
        });
    }
    for (local_idx, global) in parsed.globals.iter().enumerate() {
        let index = parsed.num_imported_globals as usize + local_idx;
        globals.push(Global {
            name: global_name(parsed, index as u32, format!("global${}", index)),
            ty: global_types[index],
            mutable: global.mutable,
            init: Some(init_expr(&global.init, global_types)),
        });
    }
    globals
}

fn global_name(parsed: &ParsedModule, index: u32, fallback: String) -> String {
    parsed.names.globals.get(&index).cloned().unwrap_or(fallback)
}

fn init_expr(init: &InitExpr, global_types: &[WasmType]) -> Expr {
    match *init {
        InitExpr::I32(v) => Expr::Const(IrValue::I32(v)),
        InitExpr::I64(v) => Expr::Const(IrValue::I64(v)),
        InitExpr::F32(v) => Expr::Const(IrValue::F32(v)),
        InitExpr::F64(v) => Expr::Const(IrValue::F64(v)),
        InitExpr::GlobalGet(index) => Expr::GlobalGet {
            index,
            ty: global_types
                .get(index as usize)
                .copied()
                .unwrap_or(WasmType::I32),
        },
    }
}

/// Decode the bytecode of a function body.
fn parse_function_operators(body: &[u8]) -> Result<Vec<wasmparser::Operator<'_>>> {
    let mut operators = Vec::new();
    let mut binary_reader = wasmparser::BinaryReader::new(body, 0);

    while !binary_reader.eof() {
        let op = binary_reader
            .read_operator()
            .context("failed to read operator")?;
        operators.push(op);
    }

    Ok(operators)
}

/// Rebuild one body; returns its locals (scratch locals included) and tree.
fn expand_body(
    ctx: &ModuleContext,
    func: &ParsedFunction,
    params: &[WasmType],
    result: WasmType,
) -> Result<(Vec<WasmType>, Expr)> {
    let mut local_types = params.to_vec();
    for vt in &func.locals {
        local_types.push(WasmType::from_wasmparser(*vt)?);
    }

    let mut builder = FunctionBuilder::new(ctx, local_types, result);
    for op in parse_function_operators(&func.body)? {
        builder.translate_operator(&op)?;
    }

    let body = builder.body.take().ok_or_else(|| {
        crate::error::DecompileError::MalformedBody("function body never ends".to_string())
    })?;
    let locals = builder.local_types.split_off(params.len());
    Ok((locals, body))
}
