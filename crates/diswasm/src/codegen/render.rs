//! Text rendering of [`Node`] trees.
//!
//! Structured control flow maps onto labeled C scopes: a `block` is a labeled
//! brace scope, a `loop` is `while (1)` with a trailing `break`, and branches
//! become `break label` or `continue label` depending on what the label names.

use super::frame::FrameLayout;
use super::node::Node;
use super::syntax::{
    apply_binary, apply_unary, binary_template, hex, indent, local_name, number, param_name,
    slot_name, terminate, unary_template, Template,
};
use crate::ir::Label;
use std::collections::HashMap;

#[derive(Default)]
pub struct Renderer<'a> {
    /// Label -> names a loop.
    loops: HashMap<Label, bool>,
    frame: Option<&'a FrameLayout>,
}

impl<'a> Renderer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: &'a FrameLayout) -> Self {
        Self {
            loops: HashMap::new(),
            frame: Some(frame),
        }
    }

    /// One statement, terminated; `None` for statements that print nothing.
    pub fn statement(&mut self, node: &Node) -> Option<String> {
        let text = self.expr(node);
        if text.is_empty() {
            None
        } else {
            Some(terminate(&text))
        }
    }

    pub fn expr(&mut self, node: &Node) -> String {
        match node {
            Node::Param(i) => param_name(*i),
            Node::Local(i) => local_name(*i),
            Node::Global(name) => name.clone(),
            Node::Slot { offset, diff } => {
                if *diff == 0 {
                    slot_name(*offset)
                } else {
                    format!("*(&{} + {})", slot_name(*offset), diff)
                }
            }
            Node::StackBase => self.stack_base(),
            Node::StackAddress(c) => self.stack_address(*c),
            Node::StackPointer => "__stack_pointer".to_string(),
            Node::Deref { ptr, offset, ty } => {
                let ptr = self.operand(ptr);
                let addr = if *offset == 0 {
                    ptr
                } else if ptr == "0x0" {
                    hex(*offset as i64)
                } else {
                    format!("{} + {}", ptr, hex(*offset as i64))
                };
                format!("*(({} *) {})", ty, addr)
            }
            Node::Assign { target, value } => {
                format!("{} = {}", self.expr(target), self.expr(value))
            }
            Node::Call { name, args } => format!("{}({})", name, self.args(args)),
            Node::CallIndirect { target, args } => {
                format!("__function_table[{}]({})", self.expr(target), self.args(args))
            }
            Node::Const { value, text } => match text {
                Some(text) => format!("{} /* \"{}\" */", number(value), text),
                None => number(value),
            },
            Node::Unary { op, value } => {
                let value = match unary_template(*op) {
                    Template::Call(_) => self.expr(value),
                    _ => self.operand(value),
                };
                apply_unary(*op, &value)
            }
            Node::Binary { op, left, right } => {
                let (left, right) = match binary_template(*op) {
                    Template::Call(_) => (self.expr(left), self.expr(right)),
                    _ => (self.operand(left), self.operand(right)),
                };
                apply_binary(*op, &left, &right)
            }
            Node::Select {
                condition,
                if_true,
                if_false,
            } => self.ternary(condition, if_true, if_false),
            Node::Return(value) => match value {
                Some(value) => format!("return {}", self.expr(value)),
                None => "return".to_string(),
            },
            Node::Nop => String::new(),
            Node::Unreachable => "abort(\"unreachable\")".to_string(),
            Node::Block { label, children } => {
                if let Some(label) = label {
                    self.loops.insert(*label, false);
                }
                let lines = self.lines(children);
                let head = match label {
                    Some(label) => format!("{}: {{", label),
                    None => "{".to_string(),
                };
                scope(&head, &lines)
            }
            Node::If {
                condition,
                if_true,
                if_false,
                value,
            } => {
                if *value {
                    if let Some(if_false) = if_false {
                        if if_true.is_expression() && if_false.is_expression() {
                            return self.ternary(condition, if_true, if_false);
                        }
                    }
                }
                let head = format!("if ({}) {{", self.expr(condition));
                let then_lines = self.arm(if_true);
                let mut out = scope(&head, &then_lines);
                if let Some(if_false) = if_false {
                    let else_lines = self.arm(if_false);
                    out.push(' ');
                    out.push_str(&scope("else {", &else_lines));
                }
                out
            }
            Node::Loop { label, body } => {
                if let Some(label) = label {
                    self.loops.insert(*label, true);
                }
                let children: Vec<Node> = match body.as_ref() {
                    Node::Block {
                        label: None,
                        children,
                    } => children.clone(),
                    other => vec![other.clone()],
                };
                let mut lines = self.lines(&children);
                if !children.last().is_some_and(Node::is_terminator) {
                    lines.push(match label {
                        Some(label) => format!("break {};", label),
                        None => "break;".to_string(),
                    });
                }
                let head = match label {
                    Some(label) => format!("{}: while (1) {{", label),
                    None => "while (1) {".to_string(),
                };
                scope(&head, &lines)
            }
            Node::Br {
                label,
                condition,
                value,
            } => {
                let guard = match condition {
                    Some(c) => format!("if ({}) ", self.expr(c)),
                    None => String::new(),
                };
                let value = self.carried(value);
                format!("{}{}{} {}", guard, self.jump(label), value, label)
            }
            Node::Switch {
                labels,
                default,
                condition,
                value,
            } => {
                let value = self.carried(value);
                let mut cases: Vec<String> = labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| format!("case {}: {}{} {};", i, self.jump(label), value, label))
                    .collect();
                if let Some(label) = default {
                    cases.push(format!("default: {}{} {};", self.jump(label), value, label));
                }
                let head = format!("switch ({}) {{", self.expr(condition));
                scope(&head, &cases)
            }
            Node::MemorySize => "__get_memory_size()".to_string(),
            Node::MemoryGrow(delta) => format!("__grow_memory_size({})", self.expr(delta)),
            Node::MemoryCopy { dest, src, len } => format!(
                "__memory_copy({}, {}, {})",
                self.expr(dest),
                self.expr(src),
                self.expr(len)
            ),
            Node::MemoryFill { dest, value, len } => format!(
                "__memory_fill({}, {}, {})",
                self.expr(dest),
                self.expr(value),
                self.expr(len)
            ),
        }
    }

    /// Renders a sub-expression, parenthesized when it is not atomic.
    fn operand(&mut self, node: &Node) -> String {
        let text = self.expr(node);
        if self.is_compound(node) {
            format!("({})", text)
        } else {
            text
        }
    }

    fn is_compound(&self, node: &Node) -> bool {
        match node {
            Node::Binary { op, .. } => !matches!(binary_template(*op), Template::Call(_)),
            Node::Unary { op, .. } => !matches!(unary_template(*op), Template::Call(_)),
            Node::Select { .. } | Node::Assign { .. } | Node::If { .. } => true,
            Node::StackAddress(c) => self.frame.and_then(|f| f.slot_at(*c)).is_none(),
            _ => false,
        }
    }

    fn ternary(&mut self, condition: &Node, if_true: &Node, if_false: &Node) -> String {
        format!(
            "{} ? {} : {}",
            self.operand(condition),
            self.operand(if_true),
            self.operand(if_false)
        )
    }

    fn args(&mut self, args: &[Node]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn carried(&mut self, value: &Option<Box<Node>>) -> String {
        match value {
            Some(v) => format!("({})", self.expr(v)),
            None => String::new(),
        }
    }

    fn jump(&self, label: &Label) -> &'static str {
        if self.loops.get(label).copied().unwrap_or(false) {
            "continue"
        } else {
            "break"
        }
    }

    fn lines(&mut self, children: &[Node]) -> Vec<String> {
        children.iter().filter_map(|c| self.statement(c)).collect()
    }

    /// Statements of an `if` arm; an unlabeled block is opened up.
    fn arm(&mut self, node: &Node) -> Vec<String> {
        match node {
            Node::Block {
                label: None,
                children,
            } => self.lines(children),
            other => self.statement(other).into_iter().collect(),
        }
    }

    fn stack_base(&self) -> String {
        match self.frame.and_then(|f| f.slot_at(0)) {
            Some((0, 0)) => format!("&{}", slot_name(0)),
            _ => "__stack_base".to_string(),
        }
    }

    fn stack_address(&self, c: i64) -> String {
        match self.frame.and_then(|f| f.slot_at(c)) {
            Some((offset, 0)) => format!("&{}", slot_name(offset)),
            Some((offset, diff)) => format!("&{}[{}]", slot_name(offset), diff),
            None => format!("{} + {}", self.stack_base(), hex(c)),
        }
    }
}

/// `head` followed by indented lines and a closing brace.
fn scope(head: &str, lines: &[String]) -> String {
    let mut out = head.to_string();
    for line in lines {
        out.push('\n');
        out.push_str(&indent(line));
    }
    out.push_str("\n}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, IrValue};

    fn c(v: i32) -> Box<Node> {
        Box::new(Node::constant(IrValue::I32(v)))
    }

    #[test]
    fn nested_operands_are_parenthesized() {
        let node = Node::Binary {
            op: BinOp::I32Mul,
            left: Box::new(Node::Binary {
                op: BinOp::I32Add,
                left: Box::new(Node::Param(0)),
                right: c(1),
            }),
            right: Box::new(Node::Local(2)),
        };
        assert_eq!(Renderer::new().expr(&node), "(param0 + 0x1) * local2");
    }

    #[test]
    fn loops_continue_and_blocks_break() {
        let node = Node::Block {
            label: Some(Label(1)),
            children: vec![Node::Loop {
                label: Some(Label(2)),
                body: Box::new(Node::Block {
                    label: None,
                    children: vec![
                        Node::Br {
                            label: Label(1),
                            condition: Some(Box::new(Node::Param(0))),
                            value: None,
                        },
                        Node::Br {
                            label: Label(2),
                            condition: None,
                            value: None,
                        },
                    ],
                }),
            }],
        };
        let text = Renderer::new().expr(&node);
        assert_eq!(
            text,
            "label$1: {\n  label$2: while (1) {\n    if (param0) break label$1;\n    continue label$2;\n  }\n}"
        );
    }

    #[test]
    fn loop_gets_trailing_break() {
        let node = Node::Loop {
            label: Some(Label(1)),
            body: Box::new(Node::Assign {
                target: Box::new(Node::Local(0)),
                value: c(1),
            }),
        };
        assert_eq!(
            Renderer::new().expr(&node),
            "label$1: while (1) {\n  local0 = 0x1;\n  break label$1;\n}"
        );
    }

    #[test]
    fn switch_cases() {
        let node = Node::Switch {
            labels: vec![Label(1), Label(2)],
            default: Some(Label(1)),
            condition: Box::new(Node::Param(0)),
            value: None,
        };
        assert_eq!(
            Renderer::new().expr(&node),
            "switch (param0) {\n  case 0: break label$1;\n  case 1: break label$2;\n  default: break label$1;\n}"
        );
    }

    #[test]
    fn if_else_and_ternary() {
        let stmt = Node::If {
            condition: Box::new(Node::Param(0)),
            if_true: Box::new(Node::Return(None)),
            if_false: Some(Box::new(Node::Unreachable)),
            value: false,
        };
        assert_eq!(
            Renderer::new().statement(&stmt).unwrap(),
            "if (param0) {\n  return;\n} else {\n  abort(\"unreachable\");\n}"
        );

        let value = Node::If {
            condition: Box::new(Node::Param(0)),
            if_true: c(1),
            if_false: Some(c(2)),
            value: true,
        };
        assert_eq!(Renderer::new().expr(&value), "param0 ? 0x1 : 0x2");
    }

    #[test]
    fn dereferences() {
        let deref = |ptr: Box<Node>, offset| Node::Deref {
            ptr,
            offset,
            ty: "unsigned char".to_string(),
        };
        let mut r = Renderer::new();
        assert_eq!(r.expr(&deref(c(0), 16)), "*((unsigned char *) 0x10)");
        assert_eq!(
            r.expr(&deref(Box::new(Node::Param(1)), 0)),
            "*((unsigned char *) param1)"
        );
        assert_eq!(
            r.expr(&deref(Box::new(Node::Param(1)), 4)),
            "*((unsigned char *) param1 + 0x4)"
        );
    }

    #[test]
    fn nop_prints_nothing() {
        assert_eq!(Renderer::new().statement(&Node::Nop), None);
        let text = Node::Const {
            value: IrValue::I32(1024),
            text: Some("hi".to_string()),
        };
        assert_eq!(Renderer::new().expr(&text), "0x400 /* \"hi\" */");
    }
}
