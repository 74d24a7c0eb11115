//! Function inlining.
//!
//! A callee is inlineable when its whole body is a single return of a pure
//! expression: only literals, parameter reads, operators, conversions,
//! indexing, and length-of, with no calls, assignments, or control flow.
//! Each parameter may be read at most once so arguments are never
//! duplicated, and an argument bound to a parameter the callee never reads
//! must itself be free of side effects, because inlining drops it.
//!
//! Call sites are rewritten to a clone of the callee's return expression
//! with parameter reads replaced by clones of the arguments. Substituted
//! results that still contain calls are inlined again, up to the configured
//! depth. Any rewrite that cannot be completed leaves the call untouched.

use hashbrown::{HashMap, HashSet};

use crate::{
    frontend::ast::{BinaryOp, CastKind, Node, NodeKind, Program},
    middle::{
        clone::deep_clone,
        passes::Pass,
        symbol::{FunId, SymbolTable, VarId},
        ty::Type,
        type_check,
    },
};

#[derive(Debug, Clone)]
pub struct InlineConfig {
    pub enabled: bool,
    pub aggressive: bool,
    pub allow_recursive: bool,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            aggressive: false,
            allow_recursive: false,
            max_depth: 3,
            max_nodes: 40,
        }
    }
}

#[derive(Debug)]
struct FunctionInfo {
    recursive: bool,
    params: Vec<VarId>,
    /// Clone of the pure return expression; present only when inlineable
    return_expr: Option<Node>,
    /// How often each parameter is read by the return expression
    param_usage: HashMap<VarId, usize>,
}

pub struct FunctionInliningPass {
    config: InlineConfig,
    infos: HashMap<FunId, FunctionInfo>,
}

impl FunctionInliningPass {
    pub fn new(config: InlineConfig) -> Self {
        Self {
            config,
            infos: HashMap::new(),
        }
    }
}

impl Pass for FunctionInliningPass {
    fn name(&self) -> &'static str {
        "FunctionInlining"
    }

    fn run(&mut self, program: &mut Program, symbols: &SymbolTable) {
        if !self.config.enabled {
            return;
        }

        self.infos = collect_function_infos(program, &self.config);

        for function in &mut program.functions {
            self.inline_node(&mut function.body, 0, symbols);
        }

        self.infos.clear();
    }
}

fn collect_function_infos(
    program: &Program,
    config: &InlineConfig,
) -> HashMap<FunId, FunctionInfo> {
    let mut infos = HashMap::new();

    for function in &program.functions {
        let recursive = function.body.contains(&|node| {
            matches!(node.kind, NodeKind::Call { target, .. } if target == function.id)
        });

        let mut info = FunctionInfo {
            recursive,
            params: function.params.clone(),
            return_expr: None,
            param_usage: HashMap::new(),
        };

        if let Some(expr) = extract_return_expression(&function.body) {
            let param_set: HashSet<VarId> = info.params.iter().copied().collect();
            let mut usage = HashMap::new();

            if is_pure_expression(expr, &param_set, &mut usage)
                && usage.values().all(|count| *count <= 1)
            {
                let limit = if config.aggressive {
                    config.max_nodes * 2
                } else {
                    config.max_nodes
                };

                if expr.count_nodes() <= limit {
                    info.return_expr = Some(deep_clone(expr));
                    info.param_usage = usage;
                }
            }
        }

        infos.insert(function.id, info);
    }

    infos
}

/// The body must reduce to a single `return <expr>;`, either directly or as
/// the sole statement of a block
fn extract_return_expression(body: &Node) -> Option<&Node> {
    match &body.kind {
        NodeKind::Return(expr) => Some(expr),
        NodeKind::Block(children) => match children.as_slice() {
            [only] => match &only.kind {
                NodeKind::Return(expr) => Some(expr),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn is_pure_expression(
    expr: &Node,
    params: &HashSet<VarId>,
    usage: &mut HashMap<VarId, usize>,
) -> bool {
    match &expr.kind {
        NodeKind::IntLiteral(_)
        | NodeKind::FloatLiteral(_)
        | NodeKind::CharLiteral(_)
        | NodeKind::StringLiteral(_) => true,
        NodeKind::Var(var) => {
            if !params.contains(var) {
                return false;
            }
            *usage.entry(*var).or_default() += 1;
            true
        }
        NodeKind::Unary { operand, .. } => is_pure_expression(operand, params, usage),
        NodeKind::Binary { op, lhs, rhs } => {
            if *op == BinaryOp::Assign {
                return false;
            }
            is_pure_expression(lhs, params, usage) && is_pure_expression(rhs, params, usage)
        }
        NodeKind::Cast { operand, .. } | NodeKind::Size { operand } => {
            is_pure_expression(operand, params, usage)
        }
        NodeKind::Index { base, index } => {
            is_pure_expression(base, params, usage) && is_pure_expression(index, params, usage)
        }
        // Conservative: no nested calls, no control structures
        _ => false,
    }
}

/// Whether evaluating this expression could have an observable effect.
/// Calls may do anything; assignments write variables.
fn has_side_effects(expr: &Node) -> bool {
    expr.contains(&|node| {
        matches!(
            node.kind,
            NodeKind::Call { .. }
                | NodeKind::Binary {
                    op: BinaryOp::Assign,
                    ..
                }
        )
    })
}

impl FunctionInliningPass {
    fn inline_node(&self, node: &mut Node, depth: usize, symbols: &SymbolTable) {
        node.for_each_child_mut(&mut |child| {
            if let NodeKind::Call { target, args } = &child.kind {
                if let Some(replacement) = self.try_inline_call(*target, args, depth, symbols) {
                    *child = replacement;
                    // Re-scan the substituted result for calls carried in by
                    // the arguments; each substitution costs one depth level
                    self.inline_node(child, depth + 1, symbols);
                    return;
                }
            }
            self.inline_node(child, depth, symbols);
        });
    }

    fn try_inline_call(
        &self,
        target: FunId,
        args: &[Node],
        depth: usize,
        symbols: &SymbolTable,
    ) -> Option<Node> {
        let replacement = self.build_inlined_expression(target, args, depth, symbols)?;

        // Never install a subtree the type checker would reject
        if type_check::expr_type(&replacement, symbols).is_err() {
            return None;
        }

        Some(replacement)
    }

    fn build_inlined_expression(
        &self,
        target: FunId,
        args: &[Node],
        depth: usize,
        symbols: &SymbolTable,
    ) -> Option<Node> {
        let info = self.infos.get(&target)?;
        let return_expr = info.return_expr.as_ref()?;

        if info.recursive && !self.config.allow_recursive {
            return None;
        }
        if depth >= self.config.max_depth {
            return None;
        }
        if args.len() != info.params.len() {
            return None;
        }

        // An argument for a parameter the callee never reads is dropped by
        // the rewrite, so it must not carry side effects
        for (param, arg) in info.params.iter().zip(args) {
            let reads = info.param_usage.get(param).copied().unwrap_or(0);
            if reads == 0 && has_side_effects(arg) {
                return None;
            }
        }

        let mut substitution: HashMap<VarId, Option<Node>> = HashMap::new();
        for (param, arg) in info.params.iter().zip(args) {
            let bound = converted_argument(deep_clone(arg), *param, symbols)?;
            substitution.insert(*param, Some(bound));
        }

        substitute_expression(return_expr, &mut substitution)
    }
}

/// Clones `expr` with parameter reads replaced by the mapped argument
/// clones. Each mapped argument may be taken once; a second read means
/// the analysis was violated and the rewrite aborts. Calls carried in by
/// substituted arguments are picked up by the caller's re-scan of the
/// installed result.
fn substitute_expression(
    expr: &Node,
    substitution: &mut HashMap<VarId, Option<Node>>,
) -> Option<Node> {
    let kind = match &expr.kind {
        NodeKind::IntLiteral(_)
        | NodeKind::FloatLiteral(_)
        | NodeKind::CharLiteral(_)
        | NodeKind::StringLiteral(_) => return Some(deep_clone(expr)),
        NodeKind::Var(var) => {
            return match substitution.get_mut(var) {
                Some(slot) => slot.take(),
                None => Some(deep_clone(expr)),
            };
        }
        NodeKind::Unary { op, operand } => NodeKind::Unary {
            op: *op,
            operand: Box::new(substitute_expression(operand, substitution)?),
        },
        NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
            op: *op,
            lhs: Box::new(substitute_expression(lhs, substitution)?),
            rhs: Box::new(substitute_expression(rhs, substitution)?),
        },
        NodeKind::Cast { to, operand } => NodeKind::Cast {
            to: *to,
            operand: Box::new(substitute_expression(operand, substitution)?),
        },
        NodeKind::Size { operand } => NodeKind::Size {
            operand: Box::new(substitute_expression(operand, substitution)?),
        },
        NodeKind::Index { base, index } => NodeKind::Index {
            base: Box::new(substitute_expression(base, substitution)?),
            index: Box::new(substitute_expression(index, substitution)?),
        },
        // The purity analysis keeps calls, assignments, and control flow
        // out of inlineable return expressions; anything else here means
        // the analysis was violated, so the rewrite aborts
        _ => return None,
    };

    Some(Node::new(expr.span, kind))
}

/// A call converts each argument to the parameter's type at the boundary;
/// substituting the raw argument would lose that conversion, so arguments
/// whose type differs from the parameter's are wrapped in the equivalent
/// cast
fn converted_argument(arg: Node, param: VarId, symbols: &SymbolTable) -> Option<Node> {
    let param_type = symbols.type_of(param);
    let arg_type = type_check::expr_type(&arg, symbols).ok()?;

    let cast = match param_type {
        Type::Double if !arg_type.is_double() => CastKind::ToDouble,
        Type::Int | Type::Char if arg_type.is_double() => CastKind::ToInt,
        _ => return Some(arg),
    };

    let span = arg.span;
    Some(Node::new(
        span,
        NodeKind::Cast {
            to: cast,
            operand: Box::new(arg),
        },
    ))
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

    fn run_pass(input: &str, config: InlineConfig) -> (Program, SymbolTable) {
        let (mut program, symbols) = parse(input);
        FunctionInliningPass::new(config).run(&mut program, &symbols);
        (program, symbols)
    }

    fn return_expr_of(program: &Program, index: usize) -> &Node {
        let NodeKind::Block(children) = &program.functions[index].body.kind else {
            panic!("function body should be a block");
        };
        let NodeKind::Return(expr) = &children.last().unwrap().kind else {
            panic!("expected a trailing return");
        };
        expr
    }

    #[test]
    fn inlines_single_return_callee() {
        let (program, _) = run_pass(
            "function inc(int x) : int { return x + 1; }\n\
             function main() : int { return inc(41); }",
            InlineConfig::default(),
        );

        let expr = return_expr_of(&program, 1);
        let NodeKind::Binary { op, lhs, rhs } = &expr.kind else {
            panic!("call should be replaced by the callee's expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(lhs.kind, NodeKind::IntLiteral(41));
        assert_eq!(rhs.kind, NodeKind::IntLiteral(1));
    }

    #[test]
    fn disabled_pass_is_identity() {
        let source = "function inc(int x) : int { return x + 1; }\n\
                      function main() : int { return inc(41); }";
        let (program, _) = run_pass(
            source,
            InlineConfig {
                enabled: false,
                ..InlineConfig::default()
            },
        );
        assert!(matches!(
            return_expr_of(&program, 1).kind,
            NodeKind::Call { .. }
        ));
    }

    #[test]
    fn rejects_parameter_read_twice() {
        let (program, _) = run_pass(
            "function square(int x) : int { return x * x; }\n\
             function main() : int { return square(7); }",
            InlineConfig::default(),
        );
        assert!(matches!(
            return_expr_of(&program, 1).kind,
            NodeKind::Call { .. }
        ));
    }

    #[test]
    fn rejects_recursive_callee() {
        let (program, _) = run_pass(
            "function f(int n) : int { return f(n); }\n\
             function main() : int { return f(1); }",
            InlineConfig::default(),
        );
        assert!(matches!(
            return_expr_of(&program, 1).kind,
            NodeKind::Call { .. }
        ));
    }

    #[test]
    fn rejects_dropping_argument_with_side_effects() {
        // `pick` ignores its second parameter; passing a call there must
        // block the inline since the rewrite would erase the call. The
        // argument itself may still be inlined afterwards, but the `pick`
        // call has to survive.
        let (program, symbols) = run_pass(
            "function noise() : int { return 1; }\n\
             function pick(int a, int b) : int { return a; }\n\
             function main() : int { return pick(3, noise()); }",
            InlineConfig::default(),
        );
        let NodeKind::Call { target, .. } = return_expr_of(&program, 2).kind else {
            panic!("the pick call must survive");
        };
        assert_eq!(symbols.function_name(target), "pick");
    }

    #[test]
    fn dropping_pure_argument_is_allowed() {
        let (program, _) = run_pass(
            "function pick(int a, int b) : int { return a; }\n\
             function main() : int { return pick(3, 4); }",
            InlineConfig::default(),
        );
        assert_eq!(return_expr_of(&program, 1).kind, NodeKind::IntLiteral(3));
    }

    #[test]
    fn calls_nested_in_arguments_are_inlined_too() {
        // A callee that itself calls is never pure, so chains only form
        // through arguments: inc(inc(1)) -> inc(1) + 1 -> (1 + 1) + 1
        let (program, _) = run_pass(
            "function inc(int x) : int { return x + 1; }\n\
             function main() : int { return inc(inc(1)); }",
            InlineConfig::default(),
        );

        let expr = return_expr_of(&program, 1);
        let NodeKind::Binary { op, lhs, rhs } = &expr.kind else {
            panic!("expected addition");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(rhs.kind, NodeKind::IntLiteral(1));
        let NodeKind::Binary { op, lhs, rhs } = &lhs.kind else {
            panic!("expected nested addition");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(lhs.kind, NodeKind::IntLiteral(1));
        assert_eq!(rhs.kind, NodeKind::IntLiteral(1));
    }

    #[test]
    fn depth_limit_leaves_remaining_calls_intact() {
        let (program, symbols) = run_pass(
            "function inc(int x) : int { return x + 1; }\n\
             function main() : int { return inc(inc(inc(1))); }",
            InlineConfig {
                max_depth: 1,
                ..InlineConfig::default()
            },
        );

        // One substitution is allowed; the result it splices in sits at the
        // depth limit, so the calls inside it must survive
        let expr = return_expr_of(&program, 1);
        let NodeKind::Binary { op, lhs, rhs } = &expr.kind else {
            panic!("expected addition");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(rhs.kind, NodeKind::IntLiteral(1));
        let NodeKind::Call { target, args } = &lhs.kind else {
            panic!("inner call should survive the depth limit");
        };
        assert_eq!(symbols.function_name(*target), "inc");
        assert!(matches!(args[0].kind, NodeKind::Call { .. }));
    }

    #[test]
    fn argument_conversions_survive_inlining() {
        // The call boundary truncates the double argument; the substituted
        // expression has to keep doing that
        let (program, _) = run_pass(
            "function keep(int x) : int { return x; }\n\
             function main() : int { return keep(2.5); }",
            InlineConfig::default(),
        );
        let expr = return_expr_of(&program, 1);
        let NodeKind::Cast {
            to: CastKind::ToInt,
            operand,
        } = &expr.kind
        else {
            panic!("substituted argument should be wrapped in a truncation");
        };
        assert_eq!(operand.kind, NodeKind::FloatLiteral(2.5));
    }

    #[test]
    fn node_limit_blocks_large_callees() {
        let (program, _) = run_pass(
            "function big(int x) : int { return x + 1 + 2 + 3 + 4; }\n\
             function main() : int { return big(1); }",
            InlineConfig {
                max_nodes: 3,
                ..InlineConfig::default()
            },
        );
        assert!(matches!(
            return_expr_of(&program, 1).kind,
            NodeKind::Call { .. }
        ));
    }
}
