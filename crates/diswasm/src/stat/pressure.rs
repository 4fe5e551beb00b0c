use crate::ir::{Expr, Function, IrValue};

/// How much of a function's stack frame survived compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    /// Host function; no body.
    Imported,
    /// `-O0` prologue: the frame base lives in a local.
    Decompressed { frame_size: i64 },
    /// The stack pointer is adjusted in place by the statement at this index.
    Minor { statement: usize },
    /// Nothing left to recover.
    Maximum,
}

impl Pressure {
    pub fn level(&self) -> i8 {
        match self {
            Pressure::Imported => -1,
            Pressure::Decompressed { .. } => 0,
            Pressure::Minor { .. } => 1,
            Pressure::Maximum => 2,
        }
    }
}

pub(super) fn classify(func: &Function, stack_pointer: Option<u32>) -> Pressure {
    let Some(body) = func.body() else {
        return Pressure::Imported;
    };
    let Expr::Block { children, .. } = body else {
        return Pressure::Maximum;
    };
    let Some(sp) = stack_pointer else {
        return Pressure::Maximum;
    };

    if let Some(frame_size) = frame_prologue(children, sp) {
        return Pressure::Decompressed { frame_size };
    }
    if children.len() > 1 {
        if let Some(statement) = children.iter().position(|s| is_stack_adjustment(s, sp)) {
            return Pressure::Minor { statement };
        }
    }
    Pressure::Maximum
}

/// Matches
///
/// ```text
/// (local.set $a (global.get $sp))
/// (local.set $b (iN.const size))
/// (local.set $c (iN.sub (local.get $a) (local.get $b)))
/// ```
///
/// with the two operands in either order.
fn frame_prologue(body: &[Expr], sp: u32) -> Option<i64> {
    let [first, second, third, ..] = body else {
        return None;
    };

    let (base, value) = plain_set(first)?;
    if !matches!(value, Expr::GlobalGet { index, .. } if *index == sp) {
        return None;
    }

    let (size_local, value) = plain_set(second)?;
    let Expr::Const(size) = value else {
        return None;
    };
    let frame_size = size.as_integer()?;

    let (_, value) = plain_set(third)?;
    let Expr::Binary { op, left, right } = value else {
        return None;
    };
    if !(op.is_sub() || op.is_add()) {
        return None;
    }
    let (Expr::LocalGet { index: l, .. }, Expr::LocalGet { index: r, .. }) =
        (left.as_ref(), right.as_ref())
    else {
        return None;
    };
    let matches = (*l == base && *r == size_local) || (*l == size_local && *r == base);
    matches.then_some(frame_size)
}

fn plain_set(expr: &Expr) -> Option<(u32, &Expr)> {
    match expr {
        Expr::LocalSet {
            index,
            value,
            tee: false,
            ..
        } => Some((*index, value)),
        _ => None,
    }
}

/// `global.set $sp (local.set|tee $x (iN.add|sub (global.get $sp) (iN.const c)))`
fn is_stack_adjustment(stmt: &Expr, sp: u32) -> bool {
    let Expr::GlobalSet { index, value } = stmt else {
        return false;
    };
    if *index != sp {
        return false;
    }
    let Expr::LocalSet { value, .. } = value.as_ref() else {
        return false;
    };
    let Expr::Binary { op, left, right } = value.as_ref() else {
        return false;
    };
    if !(op.is_add() || op.is_sub()) {
        return false;
    }
    let is_sp = |e: &Expr| matches!(e, Expr::GlobalGet { index, .. } if *index == sp);
    let is_const = |e: &Expr| matches!(e, Expr::Const(IrValue::I32(_) | IrValue::I64(_)));
    (is_sp(left) && is_const(right)) || (is_const(left) && is_sp(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{expand_module, ExpandedModule};
    use crate::parser::parse_wasm;

    fn expand(wat: &str) -> ExpandedModule {
        let wasm = wat::parse_str(wat).unwrap();
        expand_module(&parse_wasm(&wasm).unwrap()).unwrap()
    }

    fn classify_all(module: &ExpandedModule) -> Vec<Pressure> {
        module
            .functions
            .iter()
            .map(|f| classify(f, Some(0)))
            .collect()
    }

    const PROLOGUE: &str = r#"
        (local.set 1 (global.get $sp))
        (local.set 2 (i32.const 16))
        (local.set 3 (i32.sub (local.get 1) (local.get 2)))
        (global.set $sp (local.get 3))
    "#;

    #[test]
    fn o0_prologue_recovers_frame_size() {
        let module = expand(&format!(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (param i32) (local i32 i32 i32)
                    {}))"#,
            PROLOGUE
        ));
        assert_eq!(
            classify_all(&module),
            vec![Pressure::Decompressed { frame_size: 16 }]
        );
    }

    #[test]
    fn o0_prologue_accepts_swapped_operands() {
        let module = expand(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (local i32 i32 i32)
                    (local.set 0 (global.get $sp))
                    (local.set 1 (i32.const 32))
                    (local.set 2 (i32.add (local.get 1) (local.get 0)))))"#,
        );
        assert_eq!(
            classify_all(&module),
            vec![Pressure::Decompressed { frame_size: 32 }]
        );
    }

    #[test]
    fn o0_prologue_rejects_foreign_locals() {
        let module = expand(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (local i32 i32 i32 i32)
                    (local.set 0 (global.get $sp))
                    (local.set 1 (i32.const 32))
                    (local.set 2 (i32.sub (local.get 0) (local.get 3)))))"#,
        );
        assert_eq!(classify_all(&module), vec![Pressure::Maximum]);
    }

    #[test]
    fn o1_stack_adjustment_in_either_order() {
        let module = expand(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (local i32)
                    (call 1)
                    (global.set $sp (local.tee 0 (i32.sub (global.get $sp) (i32.const 16)))))
                (func (local i32)
                    (global.set $sp (local.tee 0 (i32.add (i32.const -16) (global.get $sp))))
                    (call 1)))"#,
        );
        assert_eq!(
            classify_all(&module),
            vec![
                Pressure::Minor { statement: 1 },
                Pressure::Minor { statement: 0 }
            ]
        );
    }

    #[test]
    fn imports_and_expression_bodies() {
        let module = expand(
            r#"(module
                (import "env" "f" (func))
                (global $sp (mut i32) (i32.const 65536))
                (func (result i32) (i32.const 1)))"#,
        );
        let levels: Vec<i8> = module
            .functions
            .iter()
            .map(|f| classify(f, Some(0)).level())
            .collect();
        assert_eq!(levels, vec![-1, 2]);
    }

    #[test]
    fn without_stack_pointer_everything_is_maximum() {
        let module = expand(&format!(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func (param i32) (local i32 i32 i32)
                    {}))"#,
            PROLOGUE
        ));
        assert_eq!(classify(&module.functions[0], None), Pressure::Maximum);
    }
}
