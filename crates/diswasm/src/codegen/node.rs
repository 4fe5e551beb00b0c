//! Printable tree produced by the generators.
//!
//! Generators never annotate the IR. Whatever they learn about a function
//! (registers, stack slots, string constants) ends up in this tree or in
//! their own side tables.

use crate::ir::{BinOp, IrValue, Label, UnOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Param(u32),
    Local(u32),
    Global(String),
    /// Stack slot starting at `offset`, accessed `diff` bytes in.
    Slot {
        offset: i64,
        diff: i64,
    },
    /// Recovered frame base.
    StackBase,
    /// Frame base plus a constant.
    StackAddress(i64),
    StackPointer,
    /// Typed dereference `*((ty *) ptr + offset)`.
    Deref {
        ptr: Box<Node>,
        offset: u64,
        ty: String,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    Call {
        name: String,
        args: Vec<Node>,
    },
    CallIndirect {
        target: Box<Node>,
        args: Vec<Node>,
    },
    /// Constant, with the string it points at when known.
    Const {
        value: IrValue,
        text: Option<String>,
    },
    Unary {
        op: UnOp,
        value: Box<Node>,
    },
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Select {
        condition: Box<Node>,
        if_true: Box<Node>,
        if_false: Box<Node>,
    },
    Return(Option<Box<Node>>),
    Nop,
    Unreachable,
    Block {
        label: Option<Label>,
        children: Vec<Node>,
    },
    If {
        condition: Box<Node>,
        if_true: Box<Node>,
        if_false: Option<Box<Node>>,
        /// The construct yields a value.
        value: bool,
    },
    Loop {
        label: Option<Label>,
        body: Box<Node>,
    },
    Br {
        label: Label,
        condition: Option<Box<Node>>,
        value: Option<Box<Node>>,
    },
    Switch {
        labels: Vec<Label>,
        default: Option<Label>,
        condition: Box<Node>,
        value: Option<Box<Node>>,
    },
    MemorySize,
    MemoryGrow(Box<Node>),
    MemoryCopy {
        dest: Box<Node>,
        src: Box<Node>,
        len: Box<Node>,
    },
    MemoryFill {
        dest: Box<Node>,
        value: Box<Node>,
        len: Box<Node>,
    },
}

impl Node {
    pub fn constant(value: IrValue) -> Self {
        Node::Const { value, text: None }
    }

    /// Control never falls through this node.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Node::Return(_)
                | Node::Unreachable
                | Node::Switch { .. }
                | Node::Br {
                    condition: None,
                    ..
                }
        )
    }

    /// Evaluating the node twice, or not at all, would be observable.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Node::Param(_)
            | Node::Local(_)
            | Node::Global(_)
            | Node::Slot { .. }
            | Node::StackBase
            | Node::StackAddress(_)
            | Node::StackPointer
            | Node::Const { .. }
            | Node::Nop
            | Node::MemorySize => false,
            Node::Deref { ptr, .. } => ptr.has_side_effects(),
            Node::Unary { value, .. } => value.has_side_effects(),
            Node::Binary { left, right, .. } => left.has_side_effects() || right.has_side_effects(),
            Node::Select {
                condition,
                if_true,
                if_false,
            } => {
                condition.has_side_effects()
                    || if_true.has_side_effects()
                    || if_false.has_side_effects()
            }
            _ => true,
        }
    }

    /// Fits inside a larger expression without becoming a statement.
    pub fn is_expression(&self) -> bool {
        !matches!(
            self,
            Node::Return(_)
                | Node::Nop
                | Node::Unreachable
                | Node::Block { .. }
                | Node::Loop { .. }
                | Node::Br { .. }
                | Node::Switch { .. }
                | Node::If { value: false, .. }
        )
    }
}

/// Prefixes the last value-producing statement with `return`.
///
/// `statements` pairs each node with whether its source produced a value.
pub fn with_implicit_return(statements: Vec<(Node, bool)>, returns_value: bool) -> Vec<Node> {
    let last_value = if returns_value {
        statements.iter().rposition(|(_, value)| *value)
    } else {
        None
    };
    statements
        .into_iter()
        .enumerate()
        .map(|(i, (node, _))| {
            if Some(i) == last_value {
                returning(node)
            } else {
                node
            }
        })
        .collect()
}

/// Returns the value of `node`, descending into typed `if` arms that cannot
/// print as a ternary.
fn returning(node: Node) -> Node {
    match node {
        Node::If {
            condition,
            if_true,
            if_false: Some(if_false),
            value: true,
        } if !(if_true.is_expression() && if_false.is_expression()) => Node::If {
            condition,
            if_true: Box::new(returning_arm(*if_true)),
            if_false: Some(Box::new(returning_arm(*if_false))),
            value: false,
        },
        node if node.is_expression() => Node::Return(Some(Box::new(node))),
        node => node,
    }
}

fn returning_arm(arm: Node) -> Node {
    match arm {
        Node::Block {
            label: None,
            mut children,
        } => {
            if let Some(last) = children.pop() {
                children.push(if last.is_terminator() {
                    last
                } else {
                    returning(last)
                });
            }
            Node::Block {
                label: None,
                children,
            }
        }
        arm if arm.is_terminator() => arm,
        arm => returning(arm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_return_targets_last_value() {
        let stmts = vec![
            (Node::Local(1), true),
            (Node::Call { name: "f".into(), args: vec![] }, false),
            (Node::Local(2), true),
            (Node::Nop, false),
        ];
        let out = with_implicit_return(stmts, true);
        assert_eq!(out[0], Node::Local(1));
        assert_eq!(out[2], Node::Return(Some(Box::new(Node::Local(2)))));
    }

    #[test]
    fn implicit_return_moves_into_statement_arms() {
        let call = Node::Call {
            name: "g".into(),
            args: vec![],
        };
        let one = Node::constant(IrValue::I32(1));
        let two = Node::constant(IrValue::I32(2));
        let typed_if = Node::If {
            condition: Box::new(Node::Param(0)),
            if_true: Box::new(Node::Block {
                label: None,
                children: vec![call.clone(), one.clone()],
            }),
            if_false: Some(Box::new(two.clone())),
            value: true,
        };

        let out = with_implicit_return(vec![(typed_if, true)], true);
        assert_eq!(
            out,
            vec![Node::If {
                condition: Box::new(Node::Param(0)),
                if_true: Box::new(Node::Block {
                    label: None,
                    children: vec![call, Node::Return(Some(Box::new(one)))],
                }),
                if_false: Some(Box::new(Node::Return(Some(Box::new(two))))),
                value: false,
            }]
        );
    }

    #[test]
    fn ternary_if_is_returned_whole() {
        let typed_if = Node::If {
            condition: Box::new(Node::Param(0)),
            if_true: Box::new(Node::constant(IrValue::I32(1))),
            if_false: Some(Box::new(Node::constant(IrValue::I32(2)))),
            value: true,
        };
        let out = with_implicit_return(vec![(typed_if.clone(), true)], true);
        assert_eq!(out, vec![Node::Return(Some(Box::new(typed_if)))]);
    }

    #[test]
    fn void_functions_keep_statements() {
        let stmts = vec![(Node::Local(1), true)];
        assert_eq!(with_implicit_return(stmts, false), vec![Node::Local(1)]);
    }

    #[test]
    fn side_effects() {
        let call = Node::Call {
            name: "f".into(),
            args: vec![],
        };
        assert!(call.has_side_effects());
        let sum = Node::Binary {
            op: BinOp::I32Add,
            left: Box::new(Node::Param(0)),
            right: Box::new(Node::constant(IrValue::I32(1))),
        };
        assert!(!sum.has_side_effects());
        assert!(Node::MemoryGrow(Box::new(Node::Param(0))).has_side_effects());
    }
}
