//! IR → [`Node`] lowering shared by the body generators.
//!
//! The walk itself is fixed; generators customize how variables, constants,
//! arithmetic and memory accesses are lowered by overriding the hooks.

use super::node::{with_implicit_return, Node};
use super::syntax::{global_name, type_name};
use crate::error::DecompileError;
use crate::ir::*;
use anyhow::{bail, Result};

/// C type of the pointee of a memory access.
pub fn access_type(ty: WasmType, arg: &MemArg) -> String {
    let mut name = String::new();
    if arg.atomic {
        name.push_str("_Atomic ");
    }
    if ty.is_integer() && !arg.signed && arg.bytes < ty.byte_size() {
        name.push_str("unsigned ");
    }
    name.push_str(type_name(ty, Some(arg.bytes)));
    name
}

pub trait Lower {
    fn module(&self) -> &ExpandedModule;

    fn function(&self) -> &Function;

    fn local_get(&mut self, index: u32) -> Result<Node>;

    fn local_set(&mut self, index: u32, value: Node, tee: bool) -> Result<Node>;

    fn global_get(&mut self, index: u32) -> Node {
        Node::Global(self.global_display(index))
    }

    fn global_set(&mut self, index: u32, value: Node) -> Node {
        Node::Assign {
            target: Box::new(Node::Global(self.global_display(index))),
            value: Box::new(value),
        }
    }

    fn constant(&mut self, value: IrValue) -> Node {
        Node::constant(value)
    }

    fn binary(&mut self, op: BinOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn load(&mut self, ptr: Node, arg: &MemArg, ty: WasmType) -> Node {
        Node::Deref {
            ptr: Box::new(ptr),
            offset: arg.offset,
            ty: access_type(ty, arg),
        }
    }

    fn store(&mut self, ptr: Node, value: Node, value_ty: WasmType, arg: &MemArg) -> Node {
        Node::Assign {
            target: Box::new(Node::Deref {
                ptr: Box::new(ptr),
                offset: arg.offset,
                ty: access_type(value_ty, arg),
            }),
            value: Box::new(value),
        }
    }

    fn global_display(&self, index: u32) -> String {
        match self.module().globals.get(index as usize) {
            Some(global) => global_name(&global.name),
            None => format!("global{}", index),
        }
    }

    /// Parameter or local reference by absolute index.
    fn variable(&self, index: u32) -> Result<Node> {
        let func = self.function();
        let params = func.params.len() as u32;
        if index < params {
            Ok(Node::Param(index))
        } else if ((index - params) as usize) < func.locals().len() {
            Ok(Node::Local(index))
        } else {
            bail!(DecompileError::MalformedBody(format!(
                "local index {} out of range",
                index
            )))
        }
    }

    fn lower(&mut self, expr: &Expr) -> Result<Node> {
        let node = match expr {
            Expr::LocalGet { index, .. } => self.local_get(*index)?,
            Expr::LocalSet {
                index, value, tee, ..
            } => {
                let value = self.lower(value)?;
                self.local_set(*index, value, *tee)?
            }
            Expr::GlobalGet { index, .. } => self.global_get(*index),
            Expr::GlobalSet { index, value } => {
                let value = self.lower(value)?;
                self.global_set(*index, value)
            }
            Expr::Call { target, args, .. } => {
                let name = self.module().identifiers.get(*target).name.clone();
                Node::Call {
                    name,
                    args: self.lower_all(args)?,
                }
            }
            Expr::CallIndirect { target, args, .. } => {
                let args = self.lower_all(args)?;
                Node::CallIndirect {
                    target: self.lower_boxed(target)?,
                    args,
                }
            }
            Expr::Const(value) => self.constant(*value),
            Expr::Unary { op, value } => Node::Unary {
                op: *op,
                value: self.lower_boxed(value)?,
            },
            Expr::Binary { op, left, right } => {
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                self.binary(*op, left, right)
            }
            Expr::Select {
                condition,
                if_true,
                if_false,
                ..
            } => {
                let if_true = self.lower_boxed(if_true)?;
                let if_false = self.lower_boxed(if_false)?;
                Node::Select {
                    condition: self.lower_boxed(condition)?,
                    if_true,
                    if_false,
                }
            }
            Expr::Drop(value) => self.lower(value)?,
            Expr::Return(value) => Node::Return(self.lower_opt(value)?),
            Expr::Nop => Node::Nop,
            Expr::Unreachable => Node::Unreachable,
            Expr::Block {
                label, children, ..
            } => Node::Block {
                label: *label,
                children: self.lower_statements(children)?,
            },
            Expr::If {
                condition,
                if_true,
                if_false,
                ty,
            } => Node::If {
                condition: self.lower_boxed(condition)?,
                if_true: self.lower_boxed(if_true)?,
                if_false: self.lower_opt(if_false)?,
                value: *ty != WasmType::Void,
            },
            Expr::Loop { label, body, .. } => Node::Loop {
                label: *label,
                body: self.lower_boxed(body)?,
            },
            Expr::Br {
                label,
                condition,
                value,
            } => {
                let value = self.lower_opt(value)?;
                Node::Br {
                    label: *label,
                    condition: self.lower_opt(condition)?,
                    value,
                }
            }
            Expr::Switch {
                labels,
                default,
                condition,
                value,
            } => {
                let value = self.lower_opt(value)?;
                Node::Switch {
                    labels: labels.clone(),
                    default: *default,
                    condition: self.lower_boxed(condition)?,
                    value,
                }
            }
            Expr::Load { ptr, arg, ty } => {
                let ptr = self.lower(ptr)?;
                self.load(ptr, arg, *ty)
            }
            Expr::Store { ptr, value, arg } => {
                let ptr = self.lower(ptr)?;
                let value_ty = value.ty();
                let value = self.lower(value)?;
                self.store(ptr, value, value_ty, arg)
            }
            Expr::MemorySize => Node::MemorySize,
            Expr::MemoryGrow { delta } => Node::MemoryGrow(self.lower_boxed(delta)?),
            Expr::MemoryCopy { dest, src, len } => Node::MemoryCopy {
                dest: self.lower_boxed(dest)?,
                src: self.lower_boxed(src)?,
                len: self.lower_boxed(len)?,
            },
            Expr::MemoryFill { dest, value, len } => Node::MemoryFill {
                dest: self.lower_boxed(dest)?,
                value: self.lower_boxed(value)?,
                len: self.lower_boxed(len)?,
            },
        };
        Ok(node)
    }

    fn lower_boxed(&mut self, expr: &Expr) -> Result<Box<Node>> {
        Ok(Box::new(self.lower(expr)?))
    }

    fn lower_opt(&mut self, expr: &Option<Box<Expr>>) -> Result<Option<Box<Node>>> {
        expr.as_deref().map(|e| self.lower_boxed(e)).transpose()
    }

    fn lower_all(&mut self, exprs: &[Expr]) -> Result<Vec<Node>> {
        exprs.iter().map(|e| self.lower(e)).collect()
    }

    /// Lowers a statement list, dropping statements that print nothing.
    fn lower_statements(&mut self, exprs: &[Expr]) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let node = self.lower(expr)?;
            if !matches!(node, Node::Nop) {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Top-level statements of the function, with the implicit return made
    /// explicit.
    fn body_statements(&mut self) -> Result<Vec<Node>> {
        let func = self.function();
        let returns = func.result != WasmType::Void;
        let Some(body) = func.body().cloned() else {
            return Ok(Vec::new());
        };

        match &body {
            Expr::Block {
                label, children, ..
            } => {
                let mut statements = Vec::with_capacity(children.len());
                for child in children {
                    let node = self.lower(child)?;
                    if !matches!(node, Node::Nop) {
                        statements.push((node, child.ty() != WasmType::Void));
                    }
                }
                let statements = with_implicit_return(statements, returns);
                Ok(match label {
                    Some(label) => vec![Node::Block {
                        label: Some(*label),
                        children: statements,
                    }],
                    None => statements,
                })
            }
            Expr::Nop => Ok(Vec::new()),
            other => {
                let node = self.lower(other)?;
                let value = other.ty() != WasmType::Void;
                Ok(with_implicit_return(vec![(node, value)], returns))
            }
        }
    }
}
