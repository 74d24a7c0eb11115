//! Loop unrolling.
//!
//! Candidates are counted `while` loops: the condition compares a variable
//! against an integer literal with `<`, `<=`, `>`, or `>=`, and the body is
//! a block containing exactly one assignment to that variable of the form
//! `v = v + 1` or `v = v - 1` (plus any other statements free of breaks,
//! continues, and returns). A candidate is rewritten into a block holding a
//! main loop whose body is `factor` offset-rewritten copies of the original
//! statements ending in one combined step, followed by an untouched clone
//! of the original loop that consumes the leftover iterations.

use crate::{
    frontend::ast::{BinaryOp, Function, Node, NodeKind, Program},
    frontend::lexer::Span,
    middle::{clone::deep_clone, passes::Pass, symbol::SymbolTable, symbol::VarId},
};

#[derive(Debug, Clone)]
pub struct UnrollConfig {
    /// How many body copies the main loop executes per iteration; `<= 1`
    /// turns the pass off
    pub factor: i64,
    /// Also consider loops whose bound is not a literal (they still fail
    /// condition adjustment and are kept intact)
    pub aggressive: bool,
    /// Permit loops containing nested loops, and decreasing loops
    pub allow_nested: bool,
}

impl Default for UnrollConfig {
    fn default() -> Self {
        Self {
            factor: 4,
            aggressive: false,
            allow_nested: false,
        }
    }
}

#[derive(Debug)]
struct LoopInfo {
    var: VarId,
    step: i64,
    increasing: bool,
    inclusive: bool,
    bound: Option<i64>,
    /// Index of the induction assignment within the body block
    increment_index: usize,
}

pub struct LoopUnrollingPass {
    config: UnrollConfig,
}

impl LoopUnrollingPass {
    pub fn new(config: UnrollConfig) -> Self {
        Self { config }
    }
}

impl Pass for LoopUnrollingPass {
    fn name(&self) -> &'static str {
        "LoopUnrolling"
    }

    fn run(&mut self, program: &mut Program, _symbols: &SymbolTable) {
        if self.config.factor <= 1 {
            return;
        }

        for function in &mut program.functions {
            self.process_function(function);
        }
    }
}

impl LoopUnrollingPass {
    fn process_function(&self, function: &mut Function) {
        self.process_node(&mut function.body);
    }

    fn process_node(&self, node: &mut Node) {
        if let NodeKind::Block(_) = node.kind {
            self.process_block(node);
            return;
        }

        node.for_each_child_mut(&mut |child| self.process_node(child));
    }

    fn process_block(&self, block: &mut Node) {
        let NodeKind::Block(children) = &mut block.kind else {
            return;
        };

        for child in children.iter_mut() {
            if let NodeKind::While { .. } = child.kind {
                if let Some(info) = self.analyse_loop(child) {
                    if self.loop_eligible(&info) {
                        if let Some(replacement) = self.build_replacement(child, &info) {
                            *child = replacement;
                            continue;
                        }
                    }
                }

                // Not eligible or the rewrite failed; look for candidates
                // inside the loop body instead
                let NodeKind::While { body, .. } = &mut child.kind else {
                    unreachable!();
                };
                self.process_node(body);
            } else {
                self.process_node(child);
            }
        }
    }

    fn loop_eligible(&self, info: &LoopInfo) -> bool {
        if !self.config.aggressive && info.bound.is_none() {
            return false;
        }
        // Decreasing loops ride on the nested-unrolling switch to guard
        // against unexpected patterns
        if !info.increasing && !self.config.allow_nested {
            return false;
        }
        if info.step.abs() != 1 {
            return false;
        }
        info.bound.is_some()
    }

    fn analyse_loop(&self, loop_node: &Node) -> Option<LoopInfo> {
        let NodeKind::While { condition, body } = &loop_node.kind else {
            return None;
        };

        let NodeKind::Block(statements) = &body.kind else {
            return None;
        };

        let (var, increasing, inclusive, bound) = extract_condition(condition)?;

        if !self.config.allow_nested && contains_nested_loop(body) {
            return None;
        }
        if contains_control_transfer(body) {
            return None;
        }

        let (increment_index, step) = find_increment(statements, var)?;

        if increasing && step <= 0 {
            return None;
        }
        if !increasing && step >= 0 {
            return None;
        }

        if count_assignments(body, var) > 1 {
            return None;
        }

        Some(LoopInfo {
            var,
            step,
            increasing,
            inclusive,
            bound,
            increment_index,
        })
    }

    fn build_replacement(&self, loop_node: &Node, info: &LoopInfo) -> Option<Node> {
        let main_loop = self.build_main_loop(loop_node, info)?;
        let remainder = deep_clone(loop_node);

        Some(Node::new(
            loop_node.span,
            NodeKind::Block(vec![main_loop, remainder]),
        ))
    }

    fn build_main_loop(&self, loop_node: &Node, info: &LoopInfo) -> Option<Node> {
        let NodeKind::While { condition, body } = &loop_node.kind else {
            return None;
        };

        let adjusted = self.build_adjusted_condition(condition.span, info)?;
        let unrolled = self.build_unrolled_body(body, info)?;

        Some(Node::new(
            loop_node.span,
            NodeKind::While {
                condition: Box::new(adjusted),
                body: Box::new(unrolled),
            },
        ))
    }

    /// The main loop may only start a batch when all `factor` iterations
    /// are still within the original bound:
    ///
    ///   increasing, `<`  : v <= bound - factor
    ///   increasing, `<=` : v <= bound - factor
    ///   decreasing, `>`  : v >  bound + (factor - 1)
    ///   decreasing, `>=` : v >= bound + factor
    fn build_adjusted_condition(&self, span: Span, info: &LoopInfo) -> Option<Node> {
        let bound = info.bound?;
        let factor = self.config.factor;

        let (op, new_bound) = if info.increasing {
            (BinaryOp::LessThanOrEqualTo, bound - factor)
        } else if info.inclusive {
            (BinaryOp::GreaterThanOrEqualTo, bound + factor)
        } else {
            (BinaryOp::GreaterThan, bound + (factor - 1))
        };

        Some(make_comparison(span, info.var, op, new_bound))
    }

    fn build_unrolled_body(&self, body: &Node, info: &LoopInfo) -> Option<Node> {
        let NodeKind::Block(statements) = &body.kind else {
            return None;
        };

        let mut unrolled = Vec::new();
        for iteration in 0..self.config.factor {
            let offset = iteration * info.step;
            for (index, statement) in statements.iter().enumerate() {
                if index == info.increment_index {
                    continue;
                }
                unrolled.push(clone_with_offset(statement, info.var, offset)?);
            }
        }

        let increment_span = statements[info.increment_index].span;
        unrolled.push(make_increment(
            increment_span,
            info.var,
            info.step * self.config.factor,
        ));

        Some(Node::new(body.span, NodeKind::Block(unrolled)))
    }
}

/// Recognizes `v <op> <literal>` loop conditions. `==`/`!=` are rejected:
/// no bound adjustment is safe for them in general.
fn extract_condition(condition: &Node) -> Option<(VarId, bool, bool, Option<i64>)> {
    let NodeKind::Binary { op, lhs, rhs } = &condition.kind else {
        return None;
    };

    let (increasing, inclusive) = match op {
        BinaryOp::LessThan => (true, false),
        BinaryOp::LessThanOrEqualTo => (true, true),
        BinaryOp::GreaterThan => (false, false),
        BinaryOp::GreaterThanOrEqualTo => (false, true),
        _ => return None,
    };

    let NodeKind::Var(var) = lhs.kind else {
        return None;
    };

    let bound = match rhs.kind {
        NodeKind::IntLiteral(value) => Some(value),
        _ => None,
    };

    Some((var, increasing, inclusive, bound))
}

/// Finds the induction step among the block's direct children: an
/// assignment `v = v + k`, `v = v - k`, or `v = k + v` with a literal `k`
fn find_increment(statements: &[Node], var: VarId) -> Option<(usize, i64)> {
    for (index, statement) in statements.iter().enumerate() {
        let NodeKind::Binary {
            op: BinaryOp::Assign,
            lhs,
            rhs,
        } = &statement.kind
        else {
            continue;
        };
        if lhs.kind != NodeKind::Var(var) {
            continue;
        }
        if let Some(step) = parse_increment(rhs, var) {
            return Some((index, step));
        }
    }
    None
}

fn parse_increment(expr: &Node, var: VarId) -> Option<i64> {
    let NodeKind::Binary { op, lhs, rhs } = &expr.kind else {
        return None;
    };

    let sign = match op {
        BinaryOp::Add => 1,
        BinaryOp::Subtract => -1,
        _ => return None,
    };

    if lhs.kind == NodeKind::Var(var) {
        if let NodeKind::IntLiteral(value) = rhs.kind {
            return Some(sign * value);
        }
    }

    // `k + v` also counts, but `k - v` does not
    if *op == BinaryOp::Add && rhs.kind == NodeKind::Var(var) {
        if let NodeKind::IntLiteral(value) = lhs.kind {
            return Some(value);
        }
    }

    None
}

fn contains_nested_loop(body: &Node) -> bool {
    body.contains(&|node| matches!(node.kind, NodeKind::While { .. }))
}

fn contains_control_transfer(body: &Node) -> bool {
    body.contains(&|node| {
        matches!(
            node.kind,
            NodeKind::Break | NodeKind::Continue | NodeKind::Return(_) | NodeKind::TailLoop { .. }
        )
    })
}

fn count_assignments(node: &Node, var: VarId) -> usize {
    let mut count = 0;
    if let NodeKind::Binary {
        op: BinaryOp::Assign,
        lhs,
        ..
    } = &node.kind
    {
        if lhs.kind == NodeKind::Var(var) {
            count += 1;
        }
    }
    node.for_each_child(&mut |child| count += count_assignments(child, var));
    count
}

/// Clones a statement, rewriting every read of `var` into `var + offset`
/// (or `var - |offset|` for negative offsets)
fn clone_with_offset(node: &Node, var: VarId, offset: i64) -> Option<Node> {
    let kind = match &node.kind {
        NodeKind::Var(v) => {
            if *v != var || offset == 0 {
                return Some(deep_clone(node));
            }
            let op = if offset > 0 {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            NodeKind::Binary {
                op,
                lhs: Box::new(Node::new(node.span, NodeKind::Var(*v))),
                rhs: Box::new(Node::new(node.span, NodeKind::IntLiteral(offset.abs()))),
            }
        }
        NodeKind::IntLiteral(_)
        | NodeKind::FloatLiteral(_)
        | NodeKind::CharLiteral(_)
        | NodeKind::StringLiteral(_)
        | NodeKind::Break
        | NodeKind::Continue => return Some(deep_clone(node)),
        NodeKind::Unary { op, operand } => NodeKind::Unary {
            op: *op,
            operand: Box::new(clone_with_offset(operand, var, offset)?),
        },
        NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
            op: *op,
            lhs: Box::new(clone_with_offset(lhs, var, offset)?),
            rhs: Box::new(clone_with_offset(rhs, var, offset)?),
        },
        NodeKind::Cast { to, operand } => NodeKind::Cast {
            to: *to,
            operand: Box::new(clone_with_offset(operand, var, offset)?),
        },
        NodeKind::Size { operand } => NodeKind::Size {
            operand: Box::new(clone_with_offset(operand, var, offset)?),
        },
        NodeKind::Index { base, index } => NodeKind::Index {
            base: Box::new(clone_with_offset(base, var, offset)?),
            index: Box::new(clone_with_offset(index, var, offset)?),
        },
        NodeKind::Call { target, args } => NodeKind::Call {
            target: *target,
            args: args
                .iter()
                .map(|arg| clone_with_offset(arg, var, offset))
                .collect::<Option<Vec<_>>>()?,
        },
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => NodeKind::If {
            condition: Box::new(clone_with_offset(condition, var, offset)?),
            then_branch: Box::new(clone_with_offset(then_branch, var, offset)?),
            else_branch: match else_branch {
                Some(else_branch) => Some(Box::new(clone_with_offset(else_branch, var, offset)?)),
                None => None,
            },
        },
        NodeKind::While { condition, body } => NodeKind::While {
            condition: Box::new(clone_with_offset(condition, var, offset)?),
            body: Box::new(clone_with_offset(body, var, offset)?),
        },
        NodeKind::Return(expr) => NodeKind::Return(Box::new(clone_with_offset(expr, var, offset)?)),
        NodeKind::Block(children) => NodeKind::Block(
            children
                .iter()
                .map(|child| clone_with_offset(child, var, offset))
                .collect::<Option<Vec<_>>>()?,
        ),
        NodeKind::TailLoop { .. } => return Some(deep_clone(node)),
    };

    Some(Node::new(node.span, kind))
}

fn make_comparison(span: Span, var: VarId, op: BinaryOp, bound: i64) -> Node {
    Node::new(
        span,
        NodeKind::Binary {
            op,
            lhs: Box::new(Node::new(span, NodeKind::Var(var))),
            rhs: Box::new(Node::new(span, NodeKind::IntLiteral(bound))),
        },
    )
}

fn make_increment(span: Span, var: VarId, delta: i64) -> Node {
    let op = if delta >= 0 {
        BinaryOp::Add
    } else {
        BinaryOp::Subtract
    };
    let step = Node::new(span, NodeKind::IntLiteral(delta.abs()));
    let rhs = Node::new(
        span,
        NodeKind::Binary {
            op,
            lhs: Box::new(Node::new(span, NodeKind::Var(var))),
            rhs: Box::new(step),
        },
    );
    Node::new(
        span,
        NodeKind::Binary {
            op: BinaryOp::Assign,
            lhs: Box::new(Node::new(span, NodeKind::Var(var))),
            rhs: Box::new(rhs),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{parser::Parser, SourceFile, SourceFileOrigin};

    fn parse(input: &str) -> Program {
        let source = SourceFile {
            contents: input.to_string(),
            origin: SourceFileOrigin::Memory,
        };
        Parser::parse_program(&source).0
    }

    fn run_pass(input: &str, config: UnrollConfig) -> Program {
        let mut program = parse(input);
        let symbols = SymbolTable::new();
        LoopUnrollingPass::new(config).run(&mut program, &symbols);
        program
    }

    const COUNTED_SUM: &str = "function f() : int {\n\
         int i = 0; int s = 0;\n\
         while (i < 10) { s = s + i; i = i + 1; }\n\
         return s;\n}";

    fn body_children(program: &Program) -> &[Node] {
        let NodeKind::Block(children) = &program.functions[0].body.kind else {
            panic!("expected block body");
        };
        children
    }

    #[test]
    fn factor_one_is_identity() {
        let untouched = parse(COUNTED_SUM);
        let program = run_pass(
            COUNTED_SUM,
            UnrollConfig {
                factor: 1,
                ..UnrollConfig::default()
            },
        );
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn unrolls_counted_loop_by_four() {
        let program = run_pass(COUNTED_SUM, UnrollConfig::default());
        let children = body_children(&program);

        // The while statement (third child) becomes a block of main loop +
        // remainder loop
        let NodeKind::Block(parts) = &children[2].kind else {
            panic!("loop should be replaced by a block");
        };
        assert_eq!(parts.len(), 2);

        let NodeKind::While { condition, body } = &parts[0].kind else {
            panic!("first part should be the main loop");
        };

        // i <= 10 - 4
        let NodeKind::Binary { op, rhs, .. } = &condition.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOp::LessThanOrEqualTo);
        assert_eq!(rhs.kind, NodeKind::IntLiteral(6));

        // Four copies of `s = s + <i offset>` plus the combined step
        let NodeKind::Block(unrolled) = &body.kind else {
            panic!("expected unrolled block");
        };
        assert_eq!(unrolled.len(), 5);

        // Second copy reads i + 1
        let NodeKind::Binary { rhs: assigned, .. } = &unrolled[1].kind else {
            panic!("expected assignment");
        };
        let NodeKind::Binary { rhs: offset, .. } = &assigned.kind else {
            panic!("expected s + (i + 1)");
        };
        let NodeKind::Binary { op, rhs: step, .. } = &offset.kind else {
            panic!("expected i + 1");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(step.kind, NodeKind::IntLiteral(1));

        // Combined step: i = i + 4
        let NodeKind::Binary {
            op: BinaryOp::Assign,
            rhs: combined,
            ..
        } = &unrolled[4].kind
        else {
            panic!("expected the combined induction step");
        };
        let NodeKind::Binary { rhs: total, .. } = &combined.kind else {
            panic!("expected i + 4");
        };
        assert_eq!(total.kind, NodeKind::IntLiteral(4));

        // Remainder is the untouched original loop
        let NodeKind::While { condition, .. } = &parts[1].kind else {
            panic!("second part should be the remainder loop");
        };
        let NodeKind::Binary { op, rhs, .. } = &condition.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOp::LessThan);
        assert_eq!(rhs.kind, NodeKind::IntLiteral(10));
    }

    #[test]
    fn rejects_equality_predicates() {
        let source = "function f() : int {\n\
             int i = 0;\n\
             while (i != 10) { i = i + 1; }\n\
             return i;\n}";
        let untouched = parse(source);
        let program = run_pass(source, UnrollConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn rejects_non_unit_steps() {
        let source = "function f() : int {\n\
             int i = 0;\n\
             while (i < 10) { i = i + 2; }\n\
             return i;\n}";
        let untouched = parse(source);
        let program = run_pass(source, UnrollConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn rejects_loops_with_breaks() {
        let source = "function f() : int {\n\
             int i = 0;\n\
             while (i < 10) { if (i == 5) break; i = i + 1; }\n\
             return i;\n}";
        let untouched = parse(source);
        let program = run_pass(source, UnrollConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn rejects_non_literal_bounds() {
        let source = "function f(int n) : int {\n\
             int i = 0;\n\
             while (i < n) { i = i + 1; }\n\
             return i;\n}";
        let untouched = parse(source);
        let program = run_pass(source, UnrollConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn decreasing_loops_require_the_nested_switch() {
        let source = "function f() : int {\n\
             int i = 10; int s = 0;\n\
             while (i > 0) { s = s + i; i = i - 1; }\n\
             return s;\n}";

        let untouched = parse(source);
        let program = run_pass(source, UnrollConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);

        let program = run_pass(
            source,
            UnrollConfig {
                allow_nested: true,
                ..UnrollConfig::default()
            },
        );
        let children = body_children(&program);
        let NodeKind::Block(parts) = &children[2].kind else {
            panic!("loop should be replaced by a block");
        };

        // i > 0 + (4 - 1)
        let NodeKind::While { condition, body } = &parts[0].kind else {
            panic!("expected main loop");
        };
        let NodeKind::Binary { op, rhs, .. } = &condition.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOp::GreaterThan);
        assert_eq!(rhs.kind, NodeKind::IntLiteral(3));

        // Combined step is i = i - 4
        let NodeKind::Block(unrolled) = &body.kind else {
            panic!("expected unrolled block");
        };
        let NodeKind::Binary { rhs: combined, .. } = &unrolled.last().unwrap().kind else {
            panic!("expected assignment");
        };
        let NodeKind::Binary { op, rhs: total, .. } = &combined.kind else {
            panic!("expected i - 4");
        };
        assert_eq!(*op, BinaryOp::Subtract);
        assert_eq!(total.kind, NodeKind::IntLiteral(4));
    }

    #[test]
    fn nested_candidate_inside_rejected_loop_is_unrolled() {
        let source = "function f(int n) : int {\n\
             int i = 0; int s = 0;\n\
             while (i < n) {\n\
               int j = 0;\n\
               while (j < 8) { s = s + 1; j = j + 1; }\n\
               i = i + 1;\n\
             }\n\
             return s;\n}";
        let program = run_pass(source, UnrollConfig::default());

        // The outer loop is kept (non-literal bound, nested loop) but the
        // inner counted loop is rewritten
        let children = body_children(&program);
        let NodeKind::While { body, .. } = &children[2].kind else {
            panic!("outer loop should survive");
        };
        let NodeKind::Block(outer_body) = &body.kind else {
            panic!("expected outer body block");
        };
        assert!(outer_body
            .iter()
            .any(|child| matches!(&child.kind, NodeKind::Block(parts) if parts.len() == 2)));
    }
}
