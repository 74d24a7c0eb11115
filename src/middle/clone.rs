//! Structural deep copies of AST subtrees.
//!
//! Every optimization pass duplicates subtrees through this one function.
//! The clone preserves node kind, operator, literal value, variable and
//! function ids, and source position, and shares nothing with its source:
//! mutating one tree can never be observed through the other.

use crate::frontend::ast::{Node, NodeKind};

pub fn deep_clone(node: &Node) -> Node {
    let kind = match &node.kind {
        NodeKind::IntLiteral(value) => NodeKind::IntLiteral(*value),
        NodeKind::FloatLiteral(value) => NodeKind::FloatLiteral(*value),
        NodeKind::CharLiteral(value) => NodeKind::CharLiteral(*value),
        NodeKind::StringLiteral(value) => NodeKind::StringLiteral(value.clone()),
        NodeKind::Var(var) => NodeKind::Var(*var),
        NodeKind::Break => NodeKind::Break,
        NodeKind::Continue => NodeKind::Continue,
        NodeKind::Unary { op, operand } => NodeKind::Unary {
            op: *op,
            operand: Box::new(deep_clone(operand)),
        },
        NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
            op: *op,
            lhs: Box::new(deep_clone(lhs)),
            rhs: Box::new(deep_clone(rhs)),
        },
        NodeKind::Cast { to, operand } => NodeKind::Cast {
            to: *to,
            operand: Box::new(deep_clone(operand)),
        },
        NodeKind::Size { operand } => NodeKind::Size {
            operand: Box::new(deep_clone(operand)),
        },
        NodeKind::Index { base, index } => NodeKind::Index {
            base: Box::new(deep_clone(base)),
            index: Box::new(deep_clone(index)),
        },
        NodeKind::Call { target, args } => NodeKind::Call {
            target: *target,
            args: args.iter().map(deep_clone).collect(),
        },
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => NodeKind::If {
            condition: Box::new(deep_clone(condition)),
            then_branch: Box::new(deep_clone(then_branch)),
            else_branch: else_branch.as_ref().map(|e| Box::new(deep_clone(e))),
        },
        NodeKind::While { condition, body } => NodeKind::While {
            condition: Box::new(deep_clone(condition)),
            body: Box::new(deep_clone(body)),
        },
        NodeKind::Return(expr) => NodeKind::Return(Box::new(deep_clone(expr))),
        NodeKind::Block(children) => NodeKind::Block(children.iter().map(deep_clone).collect()),
        NodeKind::TailLoop { assignments } => NodeKind::TailLoop {
            assignments: assignments
                .iter()
                .map(|(param, expr)| (*param, deep_clone(expr)))
                .collect(),
        },
    };

    Node::new(node.span, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::ast::{BinaryOp, UnaryOp},
        frontend::lexer::Span,
        index::Index,
        middle::symbol::VarId,
    };

    fn span(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    fn sample_tree() -> Node {
        // while (i < 10) { s = s + -i; }
        let i = VarId::new(0);
        let s = VarId::new(1);

        let condition = Node::new(
            span(0),
            NodeKind::Binary {
                op: BinaryOp::LessThan,
                lhs: Box::new(Node::new(span(1), NodeKind::Var(i))),
                rhs: Box::new(Node::new(span(2), NodeKind::IntLiteral(10))),
            },
        );
        let step = Node::new(
            span(3),
            NodeKind::Binary {
                op: BinaryOp::Assign,
                lhs: Box::new(Node::new(span(4), NodeKind::Var(s))),
                rhs: Box::new(Node::new(
                    span(5),
                    NodeKind::Binary {
                        op: BinaryOp::Add,
                        lhs: Box::new(Node::new(span(6), NodeKind::Var(s))),
                        rhs: Box::new(Node::new(
                            span(7),
                            NodeKind::Unary {
                                op: UnaryOp::Negate,
                                operand: Box::new(Node::new(span(8), NodeKind::Var(i))),
                            },
                        )),
                    },
                )),
            },
        );
        Node::new(
            span(9),
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(Node::new(span(10), NodeKind::Block(vec![step]))),
            },
        )
    }

    #[test]
    fn clone_is_structurally_equal() {
        let original = sample_tree();
        let copy = deep_clone(&original);
        assert_eq!(original, copy);
    }

    #[test]
    fn clone_preserves_node_count_and_spans() {
        let original = sample_tree();
        let copy = deep_clone(&original);
        assert_eq!(original.count_nodes(), copy.count_nodes());
        assert_eq!(original.span, copy.span);
    }

    #[test]
    fn clone_does_not_alias_its_source() {
        let original = sample_tree();
        let mut copy = deep_clone(&original);

        // Rewrite the copy's loop bound and check the original is untouched
        let NodeKind::While { condition, .. } = &mut copy.kind else {
            panic!("expected while");
        };
        let NodeKind::Binary { rhs, .. } = &mut condition.kind else {
            panic!("expected comparison");
        };
        rhs.kind = NodeKind::IntLiteral(99);

        let NodeKind::While { condition, .. } = &original.kind else {
            panic!("expected while");
        };
        let NodeKind::Binary { rhs, .. } = &condition.kind else {
            panic!("expected comparison");
        };
        assert_eq!(rhs.kind, NodeKind::IntLiteral(10));
    }
}
