use hashbrown::HashMap;

use crate::{
    frontend::{
        ast::{BinaryOp, CastKind, Function, Node, NodeKind, Program, UnaryOp},
        lexer::{Keyword, Lexer, Span, Token, TokenKind, TypeName},
        SourceFile,
    },
    middle::{
        symbol::{FunId, SymbolTable, VarId},
        ty::Type,
        type_check,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
    NonAssoc,
}

/// Binary operator table: precedence level (lower binds tighter) and
/// associativity, straight from the language definition
fn binary_op_info(kind: TokenKind) -> Option<(usize, Assoc, BinaryOp)> {
    let info = match kind {
        TokenKind::Asterisk => (1, Assoc::Left, BinaryOp::Multiply),
        TokenKind::Divide => (1, Assoc::Left, BinaryOp::Divide),
        TokenKind::Modulus => (1, Assoc::Left, BinaryOp::Modulus),
        TokenKind::Plus => (2, Assoc::Left, BinaryOp::Add),
        TokenKind::Minus => (2, Assoc::Left, BinaryOp::Subtract),
        TokenKind::LessThan => (3, Assoc::NonAssoc, BinaryOp::LessThan),
        TokenKind::LessThanOrEqualTo => (3, Assoc::NonAssoc, BinaryOp::LessThanOrEqualTo),
        TokenKind::GreaterThan => (3, Assoc::NonAssoc, BinaryOp::GreaterThan),
        TokenKind::GreaterThanOrEqualTo => (3, Assoc::NonAssoc, BinaryOp::GreaterThanOrEqualTo),
        TokenKind::DoubleEquals => (4, Assoc::NonAssoc, BinaryOp::Equals),
        TokenKind::NotEquals => (4, Assoc::NonAssoc, BinaryOp::NotEquals),
        TokenKind::LogicalAnd => (5, Assoc::Left, BinaryOp::LogicalAnd),
        TokenKind::LogicalOr => (6, Assoc::Left, BinaryOp::LogicalOr),
        TokenKind::Equals => (7, Assoc::Right, BinaryOp::Assign),
        _ => return None,
    };
    Some(info)
}

const TOP_PRECEDENCE: usize = 1000;

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    symbols: SymbolTable,
    /// Innermost scope last; names resolve back-to-front
    scopes: Vec<HashMap<String, VarId>>,
    function_names: HashMap<String, FunId>,
    /// Variables declared inside the body of the function currently being
    /// parsed (parameters excluded)
    current_locals: Vec<VarId>,
}

impl<'source> Parser<'source> {
    /// Parses a whole source file into a program plus the symbol table its
    /// ids resolve against. All parse errors are fatal.
    pub fn parse_program(source: &'source SourceFile) -> (Program, SymbolTable) {
        let mut parser = Self {
            lexer: Lexer::new(source),
            symbols: SymbolTable::new(),
            scopes: Vec::new(),
            function_names: HashMap::new(),
            current_locals: Vec::new(),
        };

        let mut functions = Vec::new();
        while parser.lexer.peek().is_some() {
            functions.push(parser.parse_function());
        }

        (Program { functions }, parser.symbols)
    }

    /* Token helpers */

    fn report_fatal_error(&self, offending_span: Span, message: &str) -> ! {
        eprintln!(
            "{} ({}:{}:{})",
            message,
            self.lexer.source().origin,
            self.lexer.source().row_for_position(offending_span.start),
            self.lexer
                .source()
                .column_for_position(offending_span.start)
        );
        self.lexer.source().highlight_span(offending_span);
        std::process::exit(1);
    }

    fn end_span(&self) -> Span {
        let end = self.lexer.source().contents.len();
        Span::new(end.saturating_sub(1), end)
    }

    fn advance(&mut self, expecting: &str) -> Token {
        match self.lexer.next() {
            Some(token) => token,
            None => self.report_fatal_error(
                self.end_span(),
                &format!("Unexpected end of file ({expecting})"),
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Token {
        let token = self.advance(message);
        if token.kind != kind {
            self.report_fatal_error(token.span, message);
        }
        token
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.lexer.peek().map(|t| t.kind)
    }

    fn use_if(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.lexer.next();
            return true;
        }
        false
    }

    fn token_text(&self, token: &Token) -> &str {
        self.lexer.source().value_of_span(token.span)
    }

    /* Scope helpers */

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name_token: &Token, ty: Type) -> VarId {
        let name = self.token_text(name_token).to_string();

        let already_declared = self
            .scopes
            .last()
            .is_some_and(|scope| scope.contains_key(&name));
        if already_declared {
            self.report_fatal_error(
                name_token.span,
                &format!("Variable '{name}' is already declared in this scope."),
            );
        }

        let id = self.symbols.add_var(&name, ty);
        self.scopes
            .last_mut()
            .expect("a scope must be active")
            .insert(name, id);
        id
    }

    fn lookup_var(&self, name: &str) -> Option<VarId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Computes an expression's type, reporting fatally on a type error.
    /// The parser needs types while it builds the tree (sqrt promotion,
    /// call argument checking).
    fn type_of(&self, node: &Node) -> Type {
        match type_check::expr_type(node, &self.symbols) {
            Ok(ty) => ty,
            Err(error) => {
                error.report(self.lexer.source());
                std::process::exit(1);
            }
        }
    }

    /* Functions */

    // A function has the format:
    //    function ID ( PARAMETERS ) : TYPE { STATEMENT_BLOCK }
    // where PARAMETERS is empty or a comma-separated list of "TYPE ID" and
    // the statement block must guarantee a return on every path.
    fn parse_function(&mut self) -> Function {
        self.expect(
            TokenKind::Keyword(Keyword::Function),
            "Outermost scope must define functions.",
        );

        self.push_scope();

        let name_token = self.expect(TokenKind::Identifier, "Function must have a name.");
        let name = self.token_text(&name_token).to_string();
        if self.function_names.contains_key(&name) {
            self.report_fatal_error(
                name_token.span,
                &format!("Function '{name}' is already defined."),
            );
        }

        self.expect(
            TokenKind::OpenParen,
            "Function declaration must have '(' after name.",
        );

        let mut param_ids = Vec::new();
        let mut param_types = Vec::new();
        while !self.use_if(TokenKind::CloseParen) {
            let type_token = self.advance("function parameter type");
            let TokenKind::TypeName(type_name) = type_token.kind else {
                self.report_fatal_error(
                    type_token.span,
                    "Function parameters must have a type followed by identifier.",
                );
            };
            let id_token = self.expect(
                TokenKind::Identifier,
                "Function parameters must have a type followed by identifier.",
            );

            let ty = Type::from(type_name);
            param_ids.push(self.declare_var(&id_token, ty));
            param_types.push(ty);

            if !self.use_if(TokenKind::Comma) && self.peek_kind() != Some(TokenKind::CloseParen) {
                let offending = self.lexer.peek().map(|t| t.span).unwrap_or(id_token.span);
                self.report_fatal_error(offending, "Parameters must be separated by commas (',').");
            }
        }

        self.expect(TokenKind::Colon, "Function must declare a return type.");
        let return_token = self.advance("function return type");
        let TokenKind::TypeName(return_name) = return_token.kind else {
            self.report_fatal_error(return_token.span, "Function must declare a return type.");
        };

        let fun_id = self
            .symbols
            .add_function(&name, param_types, Type::from(return_name));
        self.function_names.insert(name.clone(), fun_id);

        // Parameters are declared by now; everything added from here on is a
        // body local the back end must emit
        self.current_locals.clear();
        let body = self.parse_statement_list();
        self.pop_scope();

        if !body.guarantees_return() {
            self.report_fatal_error(
                name_token.span,
                &format!("Function '{name}' must guarantee a return statement through all paths."),
            );
        }

        Function {
            span: name_token.span,
            id: fun_id,
            params: param_ids,
            locals: std::mem::take(&mut self.current_locals),
            body,
        }
    }

    /* Statements */

    fn parse_statement(&mut self) -> Option<Node> {
        match self.peek_kind() {
            Some(TokenKind::TypeName(_)) => self.parse_statement_declare(),
            Some(TokenKind::Keyword(Keyword::If)) => Some(self.parse_statement_if()),
            Some(TokenKind::Keyword(Keyword::While)) => Some(self.parse_statement_while()),
            Some(TokenKind::Keyword(Keyword::Return)) => Some(self.parse_statement_return()),
            Some(TokenKind::Keyword(Keyword::Break)) => Some(self.parse_statement_break()),
            Some(TokenKind::Keyword(Keyword::Continue)) => Some(self.parse_statement_continue()),
            Some(TokenKind::OpenBrace) => Some(self.parse_statement_list()),
            Some(TokenKind::Semicolon) => {
                self.lexer.next();
                None
            }
            _ => Some(self.parse_statement_expression()),
        }
    }

    fn parse_statement_declare(&mut self) -> Option<Node> {
        let type_token = self.advance("declaration type");
        let TokenKind::TypeName(type_name) = type_token.kind else {
            unreachable!("caller matched a type name");
        };
        let id_token = self.expect(
            TokenKind::Identifier,
            "Declarations must have a type followed by identifier.",
        );
        let var = self.declare_var(&id_token, Type::from(type_name));

        if self.use_if(TokenKind::Semicolon) {
            self.current_locals.push(var);
            return None; // Variable added, nothing else to do.
        }

        self.expect(
            TokenKind::Equals,
            "Expected ';' or '=' after declaration of variable.",
        );
        let rhs = self.parse_expression(TOP_PRECEDENCE);
        self.expect(TokenKind::Semicolon, "Expected ';' after declaration.");

        self.current_locals.push(var);

        let lhs = Node::new(id_token.span, NodeKind::Var(var));
        Some(Node::new(
            id_token.span,
            NodeKind::Binary {
                op: BinaryOp::Assign,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        ))
    }

    fn parse_statement_if(&mut self) -> Node {
        let if_token = self.advance("if statement");
        self.expect(TokenKind::OpenParen, "If commands must be followed by a '('.");
        let condition = self.parse_expression(TOP_PRECEDENCE);
        self.expect(TokenKind::CloseParen, "Expected ')' after if condition.");
        let then_branch = self.parse_statement_or_empty_block(if_token.span);

        let else_branch = if self.use_if(TokenKind::Keyword(Keyword::Else)) {
            Some(Box::new(self.parse_statement_or_empty_block(if_token.span)))
        } else {
            None
        };

        Node::new(
            if_token.span,
            NodeKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
        )
    }

    fn parse_statement_while(&mut self) -> Node {
        let while_token = self.advance("while statement");
        self.expect(
            TokenKind::OpenParen,
            "While commands must be followed by a '('.",
        );
        let condition = self.parse_expression(TOP_PRECEDENCE);
        self.expect(TokenKind::CloseParen, "Expected ')' after while condition.");
        let body = self.parse_statement_or_empty_block(while_token.span);

        Node::new(
            while_token.span,
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
        )
    }

    /// A branch or loop body may be a bare `;`, which parses to nothing; an
    /// empty block stands in so the node always has a child
    fn parse_statement_or_empty_block(&mut self, span: Span) -> Node {
        self.parse_statement()
            .unwrap_or_else(|| Node::new(span, NodeKind::Block(Vec::new())))
    }

    fn parse_statement_return(&mut self) -> Node {
        let token = self.advance("return statement");
        let expr = self.parse_statement_expression();
        Node::new(token.span, NodeKind::Return(Box::new(expr)))
    }

    fn parse_statement_break(&mut self) -> Node {
        let token = self.advance("break statement");
        self.expect(TokenKind::Semicolon, "Expected ';' after 'break'.");
        Node::new(token.span, NodeKind::Break)
    }

    fn parse_statement_continue(&mut self) -> Node {
        let token = self.advance("continue statement");
        self.expect(TokenKind::Semicolon, "Expected ';' after 'continue'.");
        Node::new(token.span, NodeKind::Continue)
    }

    fn parse_statement_expression(&mut self) -> Node {
        let out = self.parse_expression(TOP_PRECEDENCE);
        self.expect(TokenKind::Semicolon, "Expected ';' after expression.");
        out
    }

    fn parse_statement_list(&mut self) -> Node {
        let open = self.expect(TokenKind::OpenBrace, "Statement blocks must start with '{'.");
        self.push_scope();

        let mut children = Vec::new();
        while self
            .peek_kind()
            .is_some_and(|kind| kind != TokenKind::CloseBrace)
        {
            if let Some(statement) = self.parse_statement() {
                children.push(statement);
            }
        }

        self.pop_scope();
        self.expect(TokenKind::CloseBrace, "Statement blocks must end with '}'.");

        Node::new(open.span, NodeKind::Block(children))
    }

    /* Expressions */

    // Parse expressions by precedence climbing. The level input determines
    // how restrictive this parse should be: only operators at the target
    // level or tighter are consumed.
    fn parse_expression(&mut self, prec_limit: usize) -> Node {
        let mut cur_node = self.parse_unary_term();

        // If we get a non-associative op, we must skip the next one at the
        // same level
        let mut skip_prec = TOP_PRECEDENCE;

        while let Some(op_token) = self.lexer.peek() {
            let Some((level, assoc, op)) = binary_op_info(op_token.kind) else {
                break; // Not an op token; stop here!
            };

            // If precedence of the next operator is too high, return what
            // we have
            if level > prec_limit {
                break;
            }

            if level == skip_prec {
                self.report_fatal_error(
                    op_token.span,
                    &format!("Operator '{op}' is non-associative."),
                );
            }

            // We have a binary operation to use, so consume it
            self.lexer.next();

            let next_limit = if assoc == Assoc::Right { level } else { level - 1 };
            let rhs = self.parse_expression(next_limit);

            cur_node = Node::new(
                op_token.span,
                NodeKind::Binary {
                    op,
                    lhs: Box::new(cur_node),
                    rhs: Box::new(rhs),
                },
            );

            skip_prec = if assoc == Assoc::NonAssoc {
                level
            } else {
                TOP_PRECEDENCE
            };
        }

        cur_node
    }

    // Convert any token representing a unary value into a node (i.e. a leaf
    // in an expression and associated unary operators)
    fn parse_unary_term(&mut self) -> Node {
        let token = self.advance("expression");

        // Operator + does nothing...
        if token.kind == TokenKind::Plus {
            return self.parse_unary_term();
        }

        if token.kind == TokenKind::Minus {
            let operand = self.parse_unary_term();
            return Node::new(
                token.span,
                NodeKind::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                },
            );
        }

        if token.kind == TokenKind::Bang {
            let operand = self.parse_unary_term();
            return Node::new(
                token.span,
                NodeKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            );
        }

        let mut out = match token.kind {
            // Allow full expressions in parentheses
            TokenKind::OpenParen => {
                let expr = self.parse_expression(TOP_PRECEDENCE);
                self.expect(TokenKind::CloseParen, "Expected ')' to close expression.");
                expr
            }
            TokenKind::Identifier => {
                if self.peek_kind() == Some(TokenKind::OpenParen) {
                    self.parse_function_call(&token)
                } else {
                    let name = self.token_text(&token);
                    let Some(var) = self.lookup_var(name) else {
                        self.report_fatal_error(
                            token.span,
                            &format!("Unknown variable '{name}'."),
                        );
                    };
                    let var_node = Node::new(token.span, NodeKind::Var(var));

                    if self.peek_kind() == Some(TokenKind::OpenBracket) {
                        self.parse_index(&token, var_node)
                    } else {
                        var_node
                    }
                }
            }
            TokenKind::IntegerLiteral => {
                let text = self.token_text(&token);
                match text.parse::<i64>() {
                    Ok(value) => Node::new(token.span, NodeKind::IntLiteral(value)),
                    Err(_) => self.report_fatal_error(
                        token.span,
                        &format!("Integer literal '{text}' is out of range."),
                    ),
                }
            }
            TokenKind::FloatLiteral => {
                let text = self.token_text(&token);
                match text.parse::<f64>() {
                    Ok(value) => Node::new(token.span, NodeKind::FloatLiteral(value)),
                    Err(_) => self.report_fatal_error(
                        token.span,
                        &format!("Invalid float literal '{text}'."),
                    ),
                }
            }
            TokenKind::CharLiteral => {
                let value = self.char_literal_value(&token);
                Node::new(token.span, NodeKind::CharLiteral(value))
            }
            TokenKind::StringLiteral => {
                let value = self.string_literal_value(&token);
                Node::new(token.span, NodeKind::StringLiteral(value))
            }
            TokenKind::Keyword(Keyword::Sqrt) => {
                self.expect(TokenKind::OpenParen, "'sqrt' must be followed by '('.");
                let mut operand = self.parse_expression(TOP_PRECEDENCE);
                self.expect(TokenKind::CloseParen, "Expected ')' after sqrt argument.");
                operand = self.promote_to_double(operand);
                Node::new(
                    token.span,
                    NodeKind::Unary {
                        op: UnaryOp::Sqrt,
                        operand: Box::new(operand),
                    },
                )
            }
            TokenKind::Keyword(Keyword::Size) => {
                self.expect(TokenKind::OpenParen, "'size' must be followed by '('.");
                let operand = self.parse_expression(TOP_PRECEDENCE);
                self.expect(TokenKind::CloseParen, "Expected ')' after size argument.");
                Node::new(
                    token.span,
                    NodeKind::Size {
                        operand: Box::new(operand),
                    },
                )
            }
            _ => {
                let text = self.token_text(&token).to_string();
                self.report_fatal_error(token.span, &format!("Unexpected token '{text}'"))
            }
        };

        // Check to see if the term is followed by a type modifier
        if self.use_if(TokenKind::Colon) {
            let type_token = self.advance("type modifier");
            let TokenKind::TypeName(type_name) = type_token.kind else {
                self.report_fatal_error(type_token.span, "Expected a type specified after ':'.");
            };

            out = match type_name {
                TypeName::Double => Node::new(
                    type_token.span,
                    NodeKind::Cast {
                        to: CastKind::ToDouble,
                        operand: Box::new(out),
                    },
                ),
                TypeName::Int => Node::new(
                    type_token.span,
                    NodeKind::Cast {
                        to: CastKind::ToInt,
                        operand: Box::new(out),
                    },
                ),
                TypeName::String => Node::new(
                    type_token.span,
                    NodeKind::Cast {
                        to: CastKind::ToString,
                        operand: Box::new(out),
                    },
                ),
                // ':char' is accepted and does nothing
                TypeName::Char => out,
            };
        }

        out
    }

    /// Wraps the node in a to-double conversion unless it already is one
    fn promote_to_double(&self, node: Node) -> Node {
        if self.type_of(&node).is_double() {
            return node;
        }
        let span = node.span;
        Node::new(
            span,
            NodeKind::Cast {
                to: CastKind::ToDouble,
                operand: Box::new(node),
            },
        )
    }

    fn parse_function_call(&mut self, name_token: &Token) -> Node {
        let name = self.token_text(name_token).to_string();
        let Some(&fun_id) = self.function_names.get(name.as_str()) else {
            self.report_fatal_error(name_token.span, &format!("Unknown function '{name}'."));
        };

        self.expect(TokenKind::OpenParen, "Function calls must use '('.");
        let mut args = Vec::new();
        while !self.use_if(TokenKind::CloseParen) {
            args.push(self.parse_expression(TOP_PRECEDENCE));
            if !self.use_if(TokenKind::Comma) && self.peek_kind() != Some(TokenKind::CloseParen) {
                self.report_fatal_error(
                    name_token.span,
                    "Expected ',' or ')' in function call arguments.",
                );
            }
        }

        let signature = self.symbols.function(fun_id);
        if args.len() != signature.param_types.len() {
            self.report_fatal_error(
                name_token.span,
                &format!(
                    "Function '{name}' expects {} arguments but got {}.",
                    signature.param_types.len(),
                    args.len()
                ),
            );
        }

        let param_types = signature.param_types.clone();
        for (i, (arg, expected)) in args.iter().zip(param_types).enumerate() {
            if !self.type_of(arg).can_convert_to(expected) {
                self.report_fatal_error(
                    arg.span,
                    &format!("Argument {} of function '{name}' has type mismatch.", i + 1),
                );
            }
        }

        Node::new(
            name_token.span,
            NodeKind::Call {
                target: fun_id,
                args,
            },
        )
    }

    fn parse_index(&mut self, token: &Token, base: Node) -> Node {
        self.expect(TokenKind::OpenBracket, "Indexing must use '['.");
        let index = self.parse_expression(TOP_PRECEDENCE);
        self.expect(TokenKind::CloseBracket, "Expected ']' after index.");
        Node::new(
            token.span,
            NodeKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
        )
    }

    /* Literal decoding */

    fn char_literal_value(&self, token: &Token) -> u8 {
        let bytes = self.token_text(token).as_bytes();
        // bytes[0] and the final byte are the quotes
        match bytes.get(1) {
            Some(b'\\') => match bytes.get(2) {
                Some(b'n') => b'\n',
                Some(b't') => b'\t',
                Some(b'r') => b'\r',
                Some(b'0') => 0,
                Some(other) => *other,
                None => self.report_fatal_error(token.span, "Empty character literal."),
            },
            Some(other) => *other,
            None => self.report_fatal_error(token.span, "Empty character literal."),
        }
    }

    fn string_literal_value(&self, token: &Token) -> String {
        let text = self.token_text(token);
        let inner = &text[1..text.len() - 1];

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => break,
            }
        }
        out
    }
}
