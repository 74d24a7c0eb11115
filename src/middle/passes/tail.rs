//! Tail-recursion loopification.
//!
//! A function whose body returns a direct call to itself in tail position
//! is rewritten as an infinite loop: the tail call becomes a parallel
//! reassignment of the parameters followed by a jump back to the loop top.
//! The reassignments must be ordered so that no parameter is overwritten
//! while another replacement still reads its old value; a dependency cycle
//! (as in `return swap(y, x)`) cannot be ordered without a temporary, so
//! that rewrite is abandoned and the recursion kept.
//!
//! Returns nested inside loops are left alone: the synthesized jump binds
//! to the innermost loop, and only the loop this pass creates is a valid
//! target.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::{
    frontend::ast::{Function, Node, NodeKind, Program},
    frontend::lexer::Span,
    middle::{
        clone::deep_clone,
        passes::Pass,
        symbol::{SymbolTable, VarId},
        ty::Type,
        type_check,
    },
};

#[derive(Debug, Clone)]
pub struct TailConfig {
    pub enabled: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub struct TailRecursionPass {
    config: TailConfig,
}

impl TailRecursionPass {
    pub fn new(config: TailConfig) -> Self {
        Self { config }
    }
}

impl Pass for TailRecursionPass {
    fn name(&self) -> &'static str {
        "TailRecursion"
    }

    fn run(&mut self, program: &mut Program, symbols: &SymbolTable) {
        if !self.config.enabled {
            return;
        }

        for function in &mut program.functions {
            optimize_function(function, symbols);
        }
    }
}

fn optimize_function(function: &mut Function, symbols: &SymbolTable) {
    let mut changed = false;
    let transformed = transform_node(&function.body, function, symbols, &mut changed);
    if !changed {
        return;
    }

    let span = function.span;
    let return_type = symbols.function(function.id).return_type;

    // while (1) { <transformed body> } followed by an unreachable default
    // return that keeps every path yielding a value
    let loop_node = Node::new(
        span,
        NodeKind::While {
            condition: Box::new(Node::new(span, NodeKind::IntLiteral(1))),
            body: Box::new(transformed),
        },
    );
    let trailing_return = Node::new(
        span,
        NodeKind::Return(Box::new(default_literal(return_type, span))),
    );

    function.body = Node::new(span, NodeKind::Block(vec![loop_node, trailing_return]));
}

fn default_literal(ty: Type, span: Span) -> Node {
    let kind = match ty {
        Type::Int => NodeKind::IntLiteral(0),
        Type::Char => NodeKind::CharLiteral(0),
        Type::Double => NodeKind::FloatLiteral(0.0),
        Type::String => NodeKind::StringLiteral(String::new()),
    };
    Node::new(span, kind)
}

fn transform_node(
    node: &Node,
    function: &Function,
    symbols: &SymbolTable,
    changed: &mut bool,
) -> Node {
    match &node.kind {
        NodeKind::Return(expr) => {
            if let NodeKind::Call { target, args } = &expr.kind {
                if *target == function.id && args.len() == function.params.len() {
                    if let Some(tail) = build_tail_jump(node.span, args, function, symbols) {
                        *changed = true;
                        return tail;
                    }
                }
            }
            deep_clone(node)
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = deep_clone(condition);
            let then_branch = transform_as_block(then_branch, function, symbols, changed);
            let else_branch = else_branch
                .as_ref()
                .map(|branch| Box::new(transform_as_block(branch, function, symbols, changed)));

            Node::new(
                node.span,
                NodeKind::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch,
                },
            )
        }
        NodeKind::Block(children) => {
            let children = children
                .iter()
                .map(|child| transform_node(child, function, symbols, changed))
                .collect();
            Node::new(node.span, NodeKind::Block(children))
        }
        _ => deep_clone(node),
    }
}

/// Scalar branches are wrapped in blocks so the rewritten tree always has
/// block-shaped branch bodies
fn transform_as_block(
    node: &Node,
    function: &Function,
    symbols: &SymbolTable,
    changed: &mut bool,
) -> Node {
    let transformed = transform_node(node, function, symbols, changed);
    match transformed.kind {
        NodeKind::Block(_) => transformed,
        _ => Node::new(transformed.span, NodeKind::Block(vec![transformed])),
    }
}

/// Turns `return self(a1, ..., ak)` into an ordered parameter reassignment.
/// Returns `None` when no safe ordering exists.
fn build_tail_jump(
    span: Span,
    args: &[Node],
    function: &Function,
    symbols: &SymbolTable,
) -> Option<Node> {
    let params = &function.params;

    // Identity assignments (argument is exactly the parameter) are dropped;
    // only the rest take part in the ordering
    let mut pending: Vec<(usize, Node)> = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if arg.kind == NodeKind::Var(params[i]) {
            continue;
        }
        pending.push((i, deep_clone(arg)));
    }

    let order = order_parallel_assignments(&pending, params)?;

    let assignments: Vec<(VarId, Node)> = order
        .into_iter()
        .map(|position| {
            let (index, expr) = &pending[position];
            (params[*index], deep_clone(expr))
        })
        .collect();

    let tail = Node::new(span, NodeKind::TailLoop { assignments });

    let return_type = symbols.function(function.id).return_type;
    if type_check::check_subtree(&tail, symbols, return_type).is_err() {
        return None;
    }

    Some(tail)
}

/// Orders the pending assignments with Kahn's algorithm. An edge `i -> j`
/// (i must be assigned before j) exists when replacement `i` reads the old
/// value of the parameter that `j` overwrites. A cycle yields `None`.
fn order_parallel_assignments(pending: &[(usize, Node)], params: &[VarId]) -> Option<Vec<usize>> {
    let param_positions: HashMap<VarId, usize> = pending
        .iter()
        .enumerate()
        .map(|(position, (index, _))| (params[*index], position))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); pending.len()];
    let mut indegree: Vec<usize> = vec![0; pending.len()];

    for (position, (_, expr)) in pending.iter().enumerate() {
        let mut reads = HashSet::new();
        collect_var_reads(expr, &mut reads);

        for read in reads {
            if let Some(&overwriter) = param_positions.get(&read) {
                if overwriter != position {
                    successors[position].push(overwriter);
                    indegree[overwriter] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..pending.len()).filter(|i| indegree[*i] == 0).collect();
    let mut order = Vec::with_capacity(pending.len());

    while let Some(position) = queue.pop_front() {
        order.push(position);
        for &next in &successors[position] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != pending.len() {
        return None; // cycle: breaking it needs a temporary
    }

    Some(order)
}

fn collect_var_reads(node: &Node, reads: &mut HashSet<VarId>) {
    if let NodeKind::Var(var) = node.kind {
        reads.insert(var);
    }
    node.for_each_child(&mut |child| collect_var_reads(child, reads));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{parser::Parser, SourceFile, SourceFileOrigin};

    fn parse(input: &str) -> (Program, SymbolTable) {
        let source = SourceFile {
            contents: input.to_string(),
            origin: SourceFileOrigin::Memory,
        };
        Parser::parse_program(&source)
    }

    fn run_pass(input: &str, config: TailConfig) -> (Program, SymbolTable) {
        let (mut program, symbols) = parse(input);
        TailRecursionPass::new(config).run(&mut program, &symbols);
        (program, symbols)
    }

    const FACT_ACC: &str = "function fact_acc(int n, int a) : int {\n\
         if (n <= 1) return a;\n\
         return fact_acc(n - 1, n * a);\n}";

    #[test]
    fn loopifies_accumulator_factorial() {
        let (program, symbols) = run_pass(FACT_ACC, TailConfig::default());
        let function = &program.functions[0];

        let NodeKind::Block(children) = &function.body.kind else {
            panic!("expected block body");
        };
        assert_eq!(children.len(), 2);

        // Body is now while (1) { ... } plus an unreachable default return
        let NodeKind::While { condition, body } = &children[0].kind else {
            panic!("expected synthetic loop");
        };
        assert_eq!(condition.kind, NodeKind::IntLiteral(1));
        let NodeKind::Return(default) = &children[1].kind else {
            panic!("expected trailing return");
        };
        assert_eq!(default.kind, NodeKind::IntLiteral(0));

        // The tail call became a parameter reassignment; the write to `a`
        // must come first because the write to `n` destroys the value the
        // `a` update reads
        let NodeKind::Block(statements) = &body.kind else {
            panic!("expected transformed body block");
        };
        let NodeKind::TailLoop { assignments } = &statements[1].kind else {
            panic!("expected tail jump");
        };
        assert_eq!(assignments.len(), 2);
        assert_eq!(symbols.var_name(assignments[0].0), "a");
        assert_eq!(symbols.var_name(assignments[1].0), "n");
    }

    #[test]
    fn refuses_cyclic_parameter_dependencies() {
        let source = "function swap_call(int x, int y) : int {\n\
             if (x == 0) return y;\n\
             return swap_call(y, x - 1);\n}";
        let (untouched, _) = parse(source);
        let (program, _) = run_pass(source, TailConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn identity_arguments_are_skipped() {
        let source = "function countdown(int n, int base) : int {\n\
             if (n <= 0) return base;\n\
             return countdown(n - 1, base);\n}";
        let (program, symbols) = run_pass(source, TailConfig::default());

        let NodeKind::Block(children) = &program.functions[0].body.kind else {
            panic!("expected block body");
        };
        let NodeKind::While { body, .. } = &children[0].kind else {
            panic!("expected synthetic loop");
        };
        let NodeKind::Block(statements) = &body.kind else {
            panic!("expected body block");
        };
        let NodeKind::TailLoop { assignments } = &statements[1].kind else {
            panic!("expected tail jump");
        };
        assert_eq!(assignments.len(), 1);
        assert_eq!(symbols.var_name(assignments[0].0), "n");
    }

    #[test]
    fn disabled_pass_is_identity() {
        let (untouched, _) = parse(FACT_ACC);
        let (program, _) = run_pass(FACT_ACC, TailConfig { enabled: false });
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn returns_inside_loops_are_not_rewritten() {
        let source = "function f(int n) : int {\n\
             while (n > 0) { return f(n - 1); }\n\
             return 0;\n}";
        let (untouched, _) = parse(source);
        let (program, _) = run_pass(source, TailConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }

    #[test]
    fn non_recursive_functions_are_untouched() {
        let source = "function f(int n) : int { return n + 1; }";
        let (untouched, _) = parse(source);
        let (program, _) = run_pass(source, TailConfig::default());
        assert_eq!(program.functions[0], untouched.functions[0]);
    }
}
