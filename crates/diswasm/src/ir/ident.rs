//! Function identifiers.
//!
//! Names are collected while the module is expanded and only bound to function
//! indices once the whole function list exists. The resolver owns the pending
//! names; `resolve` consumes it, so nothing carries over to the next module.

use super::types::{Function, FunctionKind};
use crate::error::DecompileError;
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};

/// Handle to an interned identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentId(u32);

/// A display name bound to a function index.
#[derive(Debug, Clone, Eq)]
pub struct Identifier {
    pub name: String,
    pub index: u32,
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

/// Resolved identifiers, indexed by [`IdentId`].
#[derive(Debug, Clone, Default)]
pub struct IdentTable {
    entries: Vec<Identifier>,
}

impl IdentTable {
    pub fn get(&self, id: IdentId) -> &Identifier {
        &self.entries[id.0 as usize]
    }
}

/// Collects identifiers during expansion.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    names: Vec<String>,
    interned: HashMap<String, IdentId>,
}

/// Decodes `\xx` byte escapes (lowercase hex) into characters.
fn decode_escapes(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push((hi << 4 | lo) as char);
                i += 3;
                continue;
            }
        }
        let ch = raw[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Name a raw internal name is printed as.
pub(crate) fn display_form(raw: &str) -> String {
    display_name(decode_escapes(raw))
}

/// Purely numeric names become `$func<N>`.
fn display_name(decoded: String) -> String {
    if !decoded.is_empty() && decoded.bytes().all(|b| b.is_ascii_digit()) {
        format!("$func{}", decoded)
    } else {
        decoded
    }
}

/// Matches `^[a-z$_][a-z$_0-9]*$`, case-insensitive.
fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '$' || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_')
}

impl IdentifierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw name and returns its handle. The same raw name always
    /// yields the same handle.
    pub fn intern(&mut self, raw: &str) -> IdentId {
        if let Some(id) = self.interned.get(raw) {
            return *id;
        }
        let id = IdentId(self.names.len() as u32);
        self.names.push(display_form(raw));
        self.interned.insert(raw.to_string(), id);
        id
    }

    /// Binds every pending identifier to a function index.
    ///
    /// Imported functions still carrying a synthetic `fimport$` name are
    /// renamed after their host export when that export is a bare identifier
    /// not already used by another function. No two functions may share a
    /// name, before or after the renames.
    pub fn resolve(self, functions: &[Function]) -> Result<IdentTable> {
        let initial = name_map(functions, &self.names)?;
        let mut taken: HashSet<String> = initial.keys().cloned().collect();

        let mut entries = Vec::with_capacity(self.names.len());
        for name in self.names {
            let Some(&index) = initial.get(&name) else {
                bail!(DecompileError::UnresolvedIdentifier(name));
            };
            let mut name = name;
            if name.starts_with("fimport$") {
                if let Some(FunctionKind::Imported { base, .. }) =
                    functions.get(index as usize).map(|f| &f.kind)
                {
                    let renamed = format!("fimport_{}", base);
                    if is_bare_identifier(base) && taken.insert(renamed.clone()) {
                        name = renamed;
                    }
                }
            }
            entries.push(Identifier { name, index });
        }

        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        name_map(functions, &names)?;
        Ok(IdentTable { entries })
    }
}

/// Display name -> function index; a name claimed twice is fatal.
fn name_map(functions: &[Function], names: &[String]) -> Result<HashMap<String, u32>> {
    let mut map = HashMap::with_capacity(functions.len());
    for (i, f) in functions.iter().enumerate() {
        let name = &names[f.name.0 as usize];
        if let Some(first) = map.insert(name.clone(), i as u32) {
            bail!(DecompileError::DuplicateIdentifier(format!(
                "{} ($func{} and $func{})",
                name, first, i
            )));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Expr, WasmType};

    fn imported(name: IdentId, base: &str) -> Function {
        Function {
            name,
            params: vec![],
            result: WasmType::Void,
            kind: FunctionKind::Imported {
                module: "env".to_string(),
                base: base.to_string(),
            },
            export: None,
        }
    }

    fn local(name: IdentId) -> Function {
        Function {
            name,
            params: vec![],
            result: WasmType::Void,
            kind: FunctionKind::Local {
                locals: vec![],
                body: Expr::Nop,
            },
            export: None,
        }
    }

    #[test]
    fn numeric_names_become_func_labels() {
        let mut resolver = IdentifierResolver::new();
        let id = resolver.intern("3");
        assert_eq!(resolver.names[id.0 as usize], "$func3");
    }

    #[test]
    fn escapes_are_decoded() {
        assert_eq!(decode_escapes("a\\2eb"), "a.b");
        assert_eq!(decode_escapes("odd\\"), "odd\\");
        assert_eq!(decode_escapes("\\zz"), "\\zz");
    }

    #[test]
    fn interning_is_stable() {
        let mut resolver = IdentifierResolver::new();
        let a = resolver.intern("main");
        let b = resolver.intern("main");
        assert_eq!(a, b);
        assert_eq!(resolver.names.len(), 1);
    }

    #[test]
    fn resolution_binds_indices_and_renames_imports() {
        let mut resolver = IdentifierResolver::new();
        let puts = resolver.intern("fimport$0");
        let weird = resolver.intern("fimport$1");
        let main = resolver.intern("2");
        let call_target = resolver.intern("fimport$0");
        let functions = vec![
            imported(puts, "puts"),
            imported(weird, "not-bare"),
            local(main),
        ];

        let table = resolver.resolve(&functions).unwrap();
        assert_eq!(table.get(puts).name, "fimport_puts");
        assert_eq!(table.get(call_target).index, 0);
        assert_eq!(table.get(weird).name, "fimport$1");
        assert_eq!(table.get(main).name, "$func2");
        assert_eq!(table.get(main).index, 2);
    }

    #[test]
    fn index_round_trips_for_every_function() {
        let mut resolver = IdentifierResolver::new();
        let ids: Vec<IdentId> = ["fimport$0", "1", "helper"]
            .iter()
            .map(|n| resolver.intern(n))
            .collect();
        let functions = vec![imported(ids[0], "1bad"), local(ids[1]), local(ids[2])];
        let table = resolver.resolve(&functions).unwrap();
        for (i, f) in functions.iter().enumerate() {
            assert_eq!(table.get(f.name).index, i as u32);
        }
    }

    #[test]
    fn unknown_name_is_fatal() {
        let mut resolver = IdentifierResolver::new();
        let main = resolver.intern("main");
        resolver.intern("missing");
        let err = resolver.resolve(&[local(main)]).unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(DecompileError::UnresolvedIdentifier(name)) if name == "missing"
        ));
    }

    #[test]
    fn rename_skips_names_already_in_use() {
        let mut resolver = IdentifierResolver::new();
        let import = resolver.intern("fimport$0");
        let local_fn = resolver.intern("fimport_puts");
        let functions = vec![imported(import, "puts"), local(local_fn)];
        let table = resolver.resolve(&functions).unwrap();
        assert_eq!(table.get(import).name, "fimport$0");
        assert_eq!(table.get(local_fn).name, "fimport_puts");
        assert_eq!(table.get(local_fn).index, 1);
    }

    #[test]
    fn colliding_display_names_are_fatal() {
        let mut resolver = IdentifierResolver::new();
        let named = resolver.intern("$func1");
        let numbered = resolver.intern("1");
        let err = resolver
            .resolve(&[local(named), local(numbered)])
            .unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(DecompileError::DuplicateIdentifier(_))
        ));
    }

    #[test]
    fn identifiers_compare_by_index() {
        let a = Identifier {
            name: "a".into(),
            index: 1,
        };
        let b = Identifier {
            name: "b".into(),
            index: 1,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn bare_identifier_pattern() {
        assert!(is_bare_identifier("puts"));
        assert!(is_bare_identifier("$_x9"));
        assert!(!is_bare_identifier("9x"));
        assert!(!is_bare_identifier("a-b"));
        assert!(!is_bare_identifier(""));
    }
}
