//! Output assembly: function bodies, then function tables, then the memory
//! dump.

use super::disassemble_function;
use crate::error::DecompileError;
use crate::ir::{ElementSegment, ExpandedModule, Expr};
use crate::memory::MemoryImage;
use crate::stat;
use anyhow::{bail, Context, Result};
use log::info;

/// Generates pseudocode for the whole module.
///
/// With `gadgets` set, only functions stored in some function table are
/// emitted. Tables and the memory dump are always printed.
pub fn generate_module(module: &ExpandedModule, gadgets: bool) -> Result<String> {
    let backend = stat::backend(module);
    if !backend.is_supported() {
        bail!(DecompileError::UnsupportedBackend(backend.to_string()));
    }
    info!("Backend: {}", backend);

    let memory = MemoryImage::from_segments(&module.data_segments)?;
    let mut out = String::new();
    let mut emitted = 0usize;

    for func in &module.functions {
        let index = module.function_index(func);
        if gadgets && !module.is_in_table(index) {
            continue;
        }
        let text = disassemble_function(module, &memory, func).with_context(|| {
            format!(
                "failed to decompile $func{} ({})",
                index,
                module.function_name(func)
            )
        })?;
        out.push('\n');
        out.push_str(&text);
        emitted += 1;
    }

    for (i, segment) in module.element_segments.iter().enumerate() {
        out.push_str(&function_table(module, i, segment)?);
    }

    if !memory.is_empty() {
        out.push_str(&memory.dump());
    }

    info!(
        "Emitted {} of {} functions, {} tables",
        emitted,
        module.functions.len(),
        module.element_segments.len()
    );
    Ok(out)
}

/// Table literal for one element segment, padded with `NULL` up to its offset.
fn function_table(module: &ExpandedModule, i: usize, segment: &ElementSegment) -> Result<String> {
    let offset = match &segment.offset {
        Expr::Const(value) => value
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(DecompileError::NonConstantTableOffset(i))?,
        _ => bail!(DecompileError::NonConstantTableOffset(i)),
    };

    let mut entries = vec!["NULL,".to_string(); offset];
    for id in &segment.entries {
        let ident = module.identifiers.get(*id);
        let func = module
            .functions
            .get(ident.index as usize)
            .ok_or_else(|| DecompileError::UnresolvedIdentifier(ident.name.clone()))?;
        let params: Vec<String> = func.params.iter().map(|p| p.to_string()).collect();
        entries.push(format!(
            "{}, // $func{} {} ({})",
            ident.name,
            ident.index,
            func.result,
            params.join(", ")
        ));
    }

    let title = if i == 0 {
        "// Function table".to_string()
    } else {
        format!("// Function table (segment {})", i)
    };
    let mut out = format!("\n{}\n(*__function_table[{}])() = {{\n", title, entries.len());
    for entry in &entries {
        out.push_str("  ");
        out.push_str(entry);
        out.push('\n');
    }
    out.push_str("};");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::category;
    use crate::ir::expand_module;
    use crate::parser::parse_wasm;

    fn generate(wat: &str, gadgets: bool) -> Result<String> {
        let wasm = wat::parse_str(wat).unwrap();
        let module = expand_module(&parse_wasm(&wasm).unwrap()).unwrap();
        generate_module(&module, gadgets)
    }

    const TABLED: &str = r#"(module
        (global $sp (mut i32) (i32.const 65536))
        (table 3 funcref)
        (elem (i32.const 1) $first $second)
        (func $first (param i32 i64) (result i32) (local.get 0))
        (func $second)
        (func $hidden (result i32) (i32.const 7)))"#;

    #[test]
    fn table_is_padded_to_its_offset() {
        let out = generate(TABLED, false).unwrap();
        assert!(out.ends_with(
            "\n// Function table\n(*__function_table[3])() = {\n  NULL,\n  \
             first, // $func0 i32 (i32, i64)\n  second, // $func1 void ()\n};"
        ));
    }

    #[test]
    fn functions_come_first_each_on_a_fresh_line() {
        let out = generate(TABLED, false).unwrap();
        assert!(out.starts_with("\n// O[2] Disassembly of $func0, known as first\n"));
        let first = out.find("known as first").unwrap();
        let hidden = out.find("known as hidden").unwrap();
        let table = out.find("// Function table").unwrap();
        assert!(first < hidden && hidden < table);
    }

    #[test]
    fn gadgets_keep_only_table_entries() {
        let out = generate(TABLED, true).unwrap();
        assert!(out.contains("known as first"));
        assert!(out.contains("known as second"));
        assert!(!out.contains("known as hidden"));
        assert!(out.contains("(*__function_table[3])()"));
    }

    #[test]
    fn later_segments_are_numbered() {
        let out = generate(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (table 4 funcref)
                (elem (i32.const 0) $f)
                (elem (i32.const 2) $f)
                (func $f))"#,
            false,
        )
        .unwrap();
        assert!(out.contains("\n// Function table\n(*__function_table[1])() = {\n  f, // $func0 void ()\n};"));
        assert!(out.contains("\n// Function table (segment 1)\n(*__function_table[3])() = {\n  NULL,\n  NULL,\n"));
    }

    #[test]
    fn imported_table_offset_is_rejected() {
        let err = generate(
            r#"(module
                (import "env" "base" (global $base i32))
                (global $sp (mut i32) (i32.const 65536))
                (table 4 funcref)
                (elem (global.get $base) $f)
                (func $f))"#,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            category(&err),
            Some(DecompileError::NonConstantTableOffset(0))
        ));
    }

    #[test]
    fn module_without_stack_pointer_is_unsupported() {
        let err = generate("(module (func $f))", false).unwrap_err();
        assert!(matches!(
            category(&err),
            Some(DecompileError::UnsupportedBackend(name)) if name == "unknown"
        ));
    }

    #[test]
    fn data_past_the_address_space_is_rejected() {
        let err = generate(
            r#"(module
                (global $sp (mut i64) (i64.const 65536))
                (memory i64 1)
                (data (i64.const -1) "ab"))"#,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            category(&err),
            Some(DecompileError::MalformedBody(_))
        ));
    }

    #[test]
    fn memory_dump_comes_last() {
        let out = generate(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (memory 1)
                (data (i32.const 0) "hi\00")
                (func $f))"#,
            false,
        )
        .unwrap();
        let dump = out.find("/****INITIALIZED MEMORY DUMP****/").unwrap();
        assert!(out.find("known as f").unwrap() < dump);
        assert!(out.ends_with("// 00000000: 68 69 00 : \"hi\\x00\"\n"));
    }
}
