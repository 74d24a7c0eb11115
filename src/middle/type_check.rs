//! Tubular type checker
//!
//! Typing is computed bottom-up over expression subtrees and validated
//! top-down over statements. There is no inference: every variable and
//! function signature already has a declared type in the symbol table, so
//! checking a subtree never mutates anything and can be repeated at will.
//! That property matters because the optimization passes re-run the checker
//! over every subtree they synthesize; a failure there aborts the rewrite
//! instead of reporting to the user.

use colored::Colorize;

use crate::{
    frontend::{
        ast::{BinaryOp, CastKind, Function, Node, NodeKind, UnaryOp},
        lexer::Span,
        SourceFile,
    },
    middle::{symbol::SymbolTable, ty::Type},
};

#[derive(Debug)]
pub struct TypeError {
    pub span: Span,
    pub kind: TypeErrorKind,
}

#[derive(Debug)]
pub enum TypeErrorKind {
    Mismatch {
        expected: Type,
        actual: Type,
    },
    InvalidOperand {
        op: &'static str,
        found: Type,
    },
    InvalidAssignmentTarget,
    ArgumentLengthMismatch {
        expected: usize,
        actual: usize,
    },
    IllegalLoopControlFlow {
        keyword: &'static str,
    },
    /// A statement-only node appeared where an expression was required
    NotAnExpression,
}

impl TypeError {
    fn new(span: Span, kind: TypeErrorKind) -> Self {
        Self { span, kind }
    }

    pub fn report(&self, source_file: &SourceFile) {
        let message = match &self.kind {
            TypeErrorKind::Mismatch { expected, actual } => {
                format!("expected type {expected} but found {actual}")
            }
            TypeErrorKind::InvalidOperand { op, found } => {
                format!("operator '{op}' cannot be applied to type {found}")
            }
            TypeErrorKind::InvalidAssignmentTarget => {
                "left-hand side of '=' must be a variable".to_string()
            }
            TypeErrorKind::ArgumentLengthMismatch { expected, actual } => {
                format!("expected {expected} argument(s) to this function but found {actual}")
            }
            TypeErrorKind::IllegalLoopControlFlow { keyword } => {
                format!("`{keyword}` statement can only be used within loops")
            }
            TypeErrorKind::NotAnExpression => {
                "statement found where an expression was required".to_string()
            }
        };

        eprintln!(
            "{}: {} {}",
            "error".red(),
            message,
            format!("(at {})", source_file.format_span_position(self.span)).white()
        );
        source_file.highlight_span(self.span);
    }
}

/// Validates a whole function body against its declared signature
pub fn check_function(function: &Function, symbols: &SymbolTable) -> Result<(), TypeError> {
    let return_type = symbols.function(function.id).return_type;
    check_statement(&function.body, symbols, return_type, 0)
}

/// Validates a subtree rebuilt by a pass. Rebuilt subtrees never introduce
/// new loops around existing `break`/`continue` statements, so loop context
/// is assumed for them.
pub fn check_subtree(
    node: &Node,
    symbols: &SymbolTable,
    return_type: Type,
) -> Result<(), TypeError> {
    check_statement(node, symbols, return_type, 1)
}

fn check_statement(
    node: &Node,
    symbols: &SymbolTable,
    return_type: Type,
    loop_depth: usize,
) -> Result<(), TypeError> {
    match &node.kind {
        NodeKind::Block(children) => {
            for child in children {
                check_statement(child, symbols, return_type, loop_depth)?;
            }
            Ok(())
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            expect_numeric(condition, symbols, "if")?;
            check_statement(then_branch, symbols, return_type, loop_depth)?;
            if let Some(else_branch) = else_branch {
                check_statement(else_branch, symbols, return_type, loop_depth)?;
            }
            Ok(())
        }
        NodeKind::While { condition, body } => {
            expect_numeric(condition, symbols, "while")?;
            check_statement(body, symbols, return_type, loop_depth + 1)
        }
        NodeKind::Return(expr) => {
            let actual = expr_type(expr, symbols)?;
            if !actual.can_convert_to(return_type) {
                return Err(TypeError::new(
                    expr.span,
                    TypeErrorKind::Mismatch {
                        expected: return_type,
                        actual,
                    },
                ));
            }
            Ok(())
        }
        NodeKind::Break => expect_loop_context(node, loop_depth, "break"),
        NodeKind::Continue => expect_loop_context(node, loop_depth, "continue"),
        NodeKind::TailLoop { assignments } => {
            for (param, expr) in assignments {
                let expected = symbols.type_of(*param);
                let actual = expr_type(expr, symbols)?;
                if !actual.can_convert_to(expected) {
                    return Err(TypeError::new(
                        expr.span,
                        TypeErrorKind::Mismatch { expected, actual },
                    ));
                }
            }
            Ok(())
        }
        // Anything else is an expression statement
        _ => expr_type(node, symbols).map(|_| ()),
    }
}

fn expect_loop_context(node: &Node, loop_depth: usize, keyword: &'static str) -> Result<(), TypeError> {
    if loop_depth == 0 {
        return Err(TypeError::new(
            node.span,
            TypeErrorKind::IllegalLoopControlFlow { keyword },
        ));
    }
    Ok(())
}

fn expect_numeric(
    condition: &Node,
    symbols: &SymbolTable,
    op: &'static str,
) -> Result<(), TypeError> {
    let found = expr_type(condition, symbols)?;
    if !found.is_numeric() {
        return Err(TypeError::new(
            condition.span,
            TypeErrorKind::InvalidOperand { op, found },
        ));
    }
    Ok(())
}

/// Computes the type of an expression subtree, validating it along the way
pub fn expr_type(node: &Node, symbols: &SymbolTable) -> Result<Type, TypeError> {
    match &node.kind {
        NodeKind::IntLiteral(_) => Ok(Type::Int),
        NodeKind::FloatLiteral(_) => Ok(Type::Double),
        NodeKind::CharLiteral(_) => Ok(Type::Char),
        NodeKind::StringLiteral(_) => Ok(Type::String),
        NodeKind::Var(var) => Ok(symbols.type_of(*var)),
        NodeKind::Unary { op, operand } => {
            let inner = expr_type(operand, symbols)?;
            match op {
                UnaryOp::Negate if inner.is_numeric() => {
                    Ok(if inner.is_double() { Type::Double } else { Type::Int })
                }
                UnaryOp::Negate => Err(invalid_operand(node.span, "-", inner)),
                UnaryOp::Not if !inner.is_double() && inner.is_numeric() => Ok(Type::Int),
                UnaryOp::Not => Err(invalid_operand(node.span, "!", inner)),
                UnaryOp::Sqrt if inner.is_double() => Ok(Type::Double),
                UnaryOp::Sqrt => Err(invalid_operand(node.span, "sqrt", inner)),
            }
        }
        NodeKind::Binary { op, lhs, rhs } => binary_type(node.span, *op, lhs, rhs, symbols),
        NodeKind::Cast { to, operand } => {
            let inner = expr_type(operand, symbols)?;
            match to {
                CastKind::ToInt if inner.is_numeric() => Ok(Type::Int),
                CastKind::ToInt => Err(invalid_operand(node.span, ":int", inner)),
                CastKind::ToDouble if inner.is_numeric() => Ok(Type::Double),
                CastKind::ToDouble => Err(invalid_operand(node.span, ":double", inner)),
                // No runtime helper renders a double; only ints, chars, and
                // strings can become strings
                CastKind::ToString if !inner.is_double() => Ok(Type::String),
                CastKind::ToString => Err(invalid_operand(node.span, ":string", inner)),
            }
        }
        NodeKind::Size { operand } => {
            let inner = expr_type(operand, symbols)?;
            if !inner.is_string() {
                return Err(invalid_operand(node.span, "size", inner));
            }
            Ok(Type::Int)
        }
        NodeKind::Index { base, index } => {
            let base_type = expr_type(base, symbols)?;
            if !base_type.is_string() {
                return Err(invalid_operand(node.span, "[]", base_type));
            }
            let index_type = expr_type(index, symbols)?;
            if index_type.is_double() || !index_type.is_numeric() {
                return Err(invalid_operand(node.span, "[]", index_type));
            }
            Ok(Type::Char)
        }
        NodeKind::Call { target, args } => {
            let signature = symbols.function(*target);
            if args.len() != signature.param_types.len() {
                return Err(TypeError::new(
                    node.span,
                    TypeErrorKind::ArgumentLengthMismatch {
                        expected: signature.param_types.len(),
                        actual: args.len(),
                    },
                ));
            }
            for (arg, expected) in args.iter().zip(signature.param_types.iter()) {
                let actual = expr_type(arg, symbols)?;
                if !actual.can_convert_to(*expected) {
                    return Err(TypeError::new(
                        arg.span,
                        TypeErrorKind::Mismatch {
                            expected: *expected,
                            actual,
                        },
                    ));
                }
            }
            Ok(signature.return_type)
        }
        NodeKind::If { .. }
        | NodeKind::While { .. }
        | NodeKind::Return(_)
        | NodeKind::Block(_)
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::TailLoop { .. } => Err(TypeError::new(node.span, TypeErrorKind::NotAnExpression)),
    }
}

fn binary_type(
    span: Span,
    op: BinaryOp,
    lhs: &Node,
    rhs: &Node,
    symbols: &SymbolTable,
) -> Result<Type, TypeError> {
    if op == BinaryOp::Assign {
        let NodeKind::Var(var) = lhs.kind else {
            return Err(TypeError::new(span, TypeErrorKind::InvalidAssignmentTarget));
        };
        let expected = symbols.type_of(var);
        let actual = expr_type(rhs, symbols)?;
        if !actual.can_convert_to(expected) {
            return Err(TypeError::new(
                rhs.span,
                TypeErrorKind::Mismatch { expected, actual },
            ));
        }
        return Ok(expected);
    }

    let left = expr_type(lhs, symbols)?;
    let right = expr_type(rhs, symbols)?;

    match op {
        BinaryOp::Add if left.is_string() && right.is_string() => Ok(Type::String),
        BinaryOp::Multiply if left.is_string() && right.is_numeric() && !right.is_double() => {
            Ok(Type::String)
        }
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
            if !left.is_numeric() {
                return Err(invalid_operand(lhs.span, op.text(), left));
            }
            if !right.is_numeric() {
                return Err(invalid_operand(rhs.span, op.text(), right));
            }
            Ok(left.unify_numeric(right))
        }
        BinaryOp::Modulus => {
            if left.is_double() || !left.is_numeric() {
                return Err(invalid_operand(lhs.span, "%", left));
            }
            if right.is_double() || !right.is_numeric() {
                return Err(invalid_operand(rhs.span, "%", right));
            }
            Ok(Type::Int)
        }
        BinaryOp::Equals | BinaryOp::NotEquals if left.is_string() || right.is_string() => {
            if left != right {
                return Err(TypeError::new(
                    span,
                    TypeErrorKind::Mismatch {
                        expected: left,
                        actual: right,
                    },
                ));
            }
            Ok(Type::Int)
        }
        BinaryOp::Equals
        | BinaryOp::NotEquals
        | BinaryOp::LessThan
        | BinaryOp::LessThanOrEqualTo
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqualTo => {
            if !left.is_numeric() {
                return Err(invalid_operand(lhs.span, op.text(), left));
            }
            if !right.is_numeric() {
                return Err(invalid_operand(rhs.span, op.text(), right));
            }
            Ok(Type::Int)
        }
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            for (side, ty) in [(lhs, left), (rhs, right)] {
                if ty.is_double() || !ty.is_numeric() {
                    return Err(invalid_operand(side.span, op.text(), ty));
                }
            }
            Ok(Type::Int)
        }
        BinaryOp::Assign => unreachable!("handled above"),
    }
}

fn invalid_operand(span: Span, op: &'static str, found: Type) -> TypeError {
    TypeError::new(span, TypeErrorKind::InvalidOperand { op, found })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::NodeKind;

    fn span() -> Span {
        Span::new(0, 0)
    }

    fn int(value: i64) -> Node {
        Node::new(span(), NodeKind::IntLiteral(value))
    }

    fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        Node::new(
            span(),
            NodeKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    #[test]
    fn arithmetic_promotes_to_double() {
        let symbols = SymbolTable::new();
        let expr = binary(
            BinaryOp::Add,
            int(1),
            Node::new(span(), NodeKind::FloatLiteral(2.0)),
        );
        assert_eq!(expr_type(&expr, &symbols).unwrap(), Type::Double);
    }

    #[test]
    fn modulus_rejects_double() {
        let symbols = SymbolTable::new();
        let expr = binary(
            BinaryOp::Modulus,
            Node::new(span(), NodeKind::FloatLiteral(2.0)),
            int(1),
        );
        assert!(expr_type(&expr, &symbols).is_err());
    }

    #[test]
    fn string_equality_is_int() {
        let symbols = SymbolTable::new();
        let expr = binary(
            BinaryOp::Equals,
            Node::new(span(), NodeKind::StringLiteral("a".into())),
            Node::new(span(), NodeKind::StringLiteral("b".into())),
        );
        assert_eq!(expr_type(&expr, &symbols).unwrap(), Type::Int);
    }

    #[test]
    fn string_ordering_is_rejected() {
        let symbols = SymbolTable::new();
        let expr = binary(
            BinaryOp::LessThan,
            Node::new(span(), NodeKind::StringLiteral("a".into())),
            Node::new(span(), NodeKind::StringLiteral("b".into())),
        );
        assert!(expr_type(&expr, &symbols).is_err());
    }

    #[test]
    fn assignment_requires_variable_target() {
        let symbols = SymbolTable::new();
        let expr = binary(BinaryOp::Assign, int(1), int(2));
        assert!(matches!(
            expr_type(&expr, &symbols),
            Err(TypeError {
                kind: TypeErrorKind::InvalidAssignmentTarget,
                ..
            })
        ));
    }

    #[test]
    fn assignment_converts_into_declared_type() {
        let mut symbols = SymbolTable::new();
        let var = symbols.add_var("x", Type::Double);
        let expr = binary(
            BinaryOp::Assign,
            Node::new(span(), NodeKind::Var(var)),
            int(1),
        );
        assert_eq!(expr_type(&expr, &symbols).unwrap(), Type::Double);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let symbols = SymbolTable::new();
        let body = Node::new(span(), NodeKind::Block(vec![Node::new(span(), NodeKind::Break)]));
        assert!(check_statement(&body, &symbols, Type::Int, 0).is_err());
    }
}
