//! Builder state: control frames and the per-frame expression stacks.
//!
//! Each frame owns the expressions emitted inside it, in order. Values and
//! statements share the list; a value is any entry whose type is not void.

use super::super::ident::IdentId;
use super::super::types::*;
use crate::error::DecompileError;
use anyhow::{bail, Result};
use wasmparser::{BlockType, FuncType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

/// Control flow frame for one open construct.
#[derive(Debug)]
pub(super) struct Frame {
    pub(super) kind: FrameKind,
    pub(super) label: Label,
    pub(super) result: WasmType,
    pub(super) exprs: Vec<Expr>,
    /// Set after an unconditional transfer; the rest of the frame is dead.
    pub(super) unreachable: bool,
    /// Some branch names this frame's label.
    pub(super) targeted: bool,
    /// `if` condition, kept until the construct closes.
    pub(super) condition: Option<Expr>,
    /// Finished `then` arm once `else` was seen, with its reachability.
    pub(super) then_arm: Option<(Vec<Expr>, bool)>,
}

impl Frame {
    pub(super) fn new(kind: FrameKind, label: Label, result: WasmType) -> Self {
        Self {
            kind,
            label,
            result,
            exprs: Vec::new(),
            unreachable: false,
            targeted: false,
            condition: None,
            then_arm: None,
        }
    }

    /// Type of the values a branch to this frame carries.
    pub(super) fn branch_type(&self) -> WasmType {
        match self.kind {
            FrameKind::Loop => WasmType::Void,
            _ => self.result,
        }
    }
}

/// Converts a wasmparser signature, rejecting multi-value results.
pub(crate) fn signature(ty: &FuncType) -> Result<(Vec<WasmType>, WasmType)> {
    let params = ty
        .params()
        .iter()
        .map(|vt| WasmType::from_wasmparser(*vt))
        .collect::<Result<Vec<_>>>()?;
    let result = match ty.results() {
        [] => WasmType::Void,
        [vt] => WasmType::from_wasmparser(*vt)?,
        _ => bail!(DecompileError::UnsupportedInstruction(
            "multi-value result".to_string()
        )),
    };
    Ok((params, result))
}

/// Module-level lookups needed while translating a body.
#[derive(Debug)]
pub struct ModuleContext<'a> {
    /// Type section, by type index.
    pub types: &'a [FuncType],

    /// Function types by absolute function index.
    pub func_types: Vec<&'a FuncType>,

    /// Interned name of every function, by absolute index.
    pub func_idents: Vec<IdentId>,

    /// Value type of every global, by absolute index.
    pub global_types: Vec<WasmType>,
}

/// Rebuilds one function body as a tree.
pub(super) struct FunctionBuilder<'c, 'a> {
    pub(super) ctx: &'c ModuleContext<'a>,

    /// Parameters then declared locals, followed by scratch locals added here.
    pub(super) local_types: Vec<WasmType>,

    pub(super) frames: Vec<Frame>,

    pub(super) next_label: u32,

    /// Nesting depth of constructs opened inside dead code.
    pub(super) dead_depth: u32,

    /// Finished body, set when the function frame closes.
    pub(super) body: Option<Expr>,
}

impl<'c, 'a> FunctionBuilder<'c, 'a> {
    pub(super) fn new(ctx: &'c ModuleContext<'a>, local_types: Vec<WasmType>, result: WasmType) -> Self {
        Self {
            ctx,
            local_types,
            frames: vec![Frame::new(FrameKind::Function, Label(0), result)],
            next_label: 1,
            dead_depth: 0,
            body: None,
        }
    }

    pub(super) fn top(&mut self) -> Result<&mut Frame> {
        match self.frames.last_mut() {
            Some(frame) => Ok(frame),
            None => bail!(DecompileError::MalformedBody(
                "operator after the end of the function".to_string()
            )),
        }
    }

    pub(super) fn push(&mut self, expr: Expr) -> Result<()> {
        let frame = self.top()?;
        if expr.is_terminator() {
            frame.unreachable = true;
        }
        frame.exprs.push(expr);
        Ok(())
    }

    pub(super) fn is_dead(&self) -> bool {
        self.frames.last().is_some_and(|f| f.unreachable)
    }

    /// Pops the most recent value of the current frame.
    ///
    /// If void statements were emitted after that value, it is first stored
    /// into a fresh scratch local so the statements keep running after it.
    pub(super) fn pop_value(&mut self, what: &str) -> Result<Expr> {
        let frame = self.top()?;
        let Some(pos) = frame.exprs.iter().rposition(|e| e.ty() != WasmType::Void) else {
            bail!(DecompileError::MalformedBody(format!(
                "Stack underflow for {}",
                what
            )));
        };
        if pos + 1 == frame.exprs.len() {
            return frame
                .exprs
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Stack underflow for {}", what));
        }

        let value = frame.exprs.remove(pos);
        let ty = value.ty();
        let index = self.local_types.len() as u32;
        self.local_types.push(ty);
        self.top()?.exprs.insert(
            pos,
            Expr::LocalSet {
                index,
                value: Box::new(value),
                tee: false,
                ty: WasmType::Void,
            },
        );
        Ok(Expr::LocalGet { index, ty })
    }

    /// Pops `n` values, returned in stack order (deepest first).
    pub(super) fn pop_values(&mut self, n: usize, what: &str) -> Result<Vec<Expr>> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop_value(what)?);
        }
        values.reverse();
        Ok(values)
    }

    pub(super) fn block_type(&self, blockty: &BlockType) -> Result<WasmType> {
        match blockty {
            BlockType::Empty => Ok(WasmType::Void),
            BlockType::Type(vt) => WasmType::from_wasmparser(*vt),
            BlockType::FuncType(idx) => {
                let ty = self
                    .ctx
                    .types
                    .get(*idx as usize)
                    .ok_or_else(|| anyhow::anyhow!("unknown block type {}", idx))?;
                if !ty.params().is_empty() {
                    bail!(DecompileError::UnsupportedInstruction(
                        "block with parameters".to_string()
                    ));
                }
                Ok(signature(ty)?.1)
            }
        }
    }

    pub(super) fn open(&mut self, kind: FrameKind, result: WasmType) {
        let label = Label(self.next_label);
        self.next_label += 1;
        self.frames.push(Frame::new(kind, label, result));
    }

    /// Frame a relative branch depth refers to, marking it as targeted.
    pub(super) fn branch_target(&mut self, relative_depth: u32) -> Result<(usize, Label, WasmType)> {
        let len = self.frames.len();
        if relative_depth as usize >= len {
            bail!(DecompileError::MalformedBody(format!(
                "branch depth {} exceeds control stack depth {}",
                relative_depth, len
            )));
        }
        let pos = len - 1 - relative_depth as usize;
        let frame = &self.frames[pos];
        Ok((pos, frame.label, frame.branch_type()))
    }

    pub(super) fn mark_targeted(&mut self, pos: usize) {
        if let Some(frame) = self.frames.get_mut(pos) {
            frame.targeted = true;
        }
    }

    /// Moves the frame's result value behind any trailing statements.
    pub(super) fn settle_result(&mut self) -> Result<()> {
        let frame = self.top()?;
        if frame.result == WasmType::Void || frame.unreachable {
            return Ok(());
        }
        let value = self.pop_value("block result")?;
        self.push(value)
    }

    /// Closes the innermost frame at `end`.
    pub(super) fn close(&mut self) -> Result<()> {
        self.settle_result()?;
        let Some(frame) = self.frames.pop() else {
            bail!(DecompileError::MalformedBody("unbalanced end".to_string()));
        };
        let label = frame.targeted.then_some(frame.label);

        match frame.kind {
            FrameKind::Function => {
                let body = match label {
                    Some(label) => Expr::Block {
                        label: Some(label),
                        children: frame.exprs,
                        ty: frame.result,
                    },
                    None => block_or_singleton(frame.exprs, frame.result),
                };
                self.body = Some(body);
            }
            FrameKind::Block => {
                let parent_dead = frame.unreachable && !frame.targeted;
                if label.is_some() {
                    self.top()?.exprs.push(Expr::Block {
                        label,
                        children: frame.exprs,
                        ty: frame.result,
                    });
                } else {
                    self.top()?.exprs.extend(frame.exprs);
                }
                self.top()?.unreachable |= parent_dead;
            }
            FrameKind::Loop => {
                let parent_dead = frame.unreachable;
                let body = block_or_singleton(frame.exprs, frame.result);
                let parent = self.top()?;
                parent.exprs.push(Expr::Loop {
                    label,
                    body: Box::new(body),
                    ty: frame.result,
                });
                parent.unreachable |= parent_dead;
            }
            FrameKind::If | FrameKind::Else => {
                let condition = frame.condition.ok_or_else(|| {
                    DecompileError::MalformedBody("if without condition".to_string())
                })?;
                let (if_true, if_false, parent_dead) = match frame.then_arm {
                    Some((then_exprs, then_dead)) => (
                        block_or_singleton(then_exprs, frame.result),
                        Some(Box::new(block_or_singleton(frame.exprs, frame.result))),
                        then_dead && frame.unreachable && !frame.targeted,
                    ),
                    None => (block_or_singleton(frame.exprs, frame.result), None, false),
                };
                let node = Expr::If {
                    condition: Box::new(condition),
                    if_true: Box::new(if_true),
                    if_false,
                    ty: frame.result,
                };
                let node = match label {
                    Some(label) => Expr::Block {
                        label: Some(label),
                        children: vec![node],
                        ty: frame.result,
                    },
                    None => node,
                };
                let parent = self.top()?;
                parent.exprs.push(node);
                parent.unreachable |= parent_dead;
            }
        }
        Ok(())
    }
}

/// A lone expression stays as is; anything else becomes an unlabeled block.
pub(super) fn block_or_singleton(mut children: Vec<Expr>, ty: WasmType) -> Expr {
    match children.len() {
        0 => Expr::Nop,
        1 => children.pop().unwrap_or(Expr::Nop),
        _ => Expr::Block {
            label: None,
            children,
            ty,
        },
    }
}
