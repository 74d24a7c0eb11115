//! WAT module generation.
//!
//! The module layout is fixed: exported linear memory, the static data
//! segments, one data segment per string literal, the `$free_mem` global,
//! the runtime helper functions, then the user functions in declaration
//! order. The helper bodies are part of the compiled artifact's contract
//! with the runtime and are emitted exactly as the runtime expects them.
//!
//! User code is emitted in stack style, one instruction per line. Locals
//! are named `$var{N}` after their variable id; `$temp{N}` scratch locals
//! are added for operations that need to hold an address across a store.

use hashbrown::HashMap;

use crate::{
    backend::wat::WatWriter,
    frontend::ast::{BinaryOp, CastKind, Function, Node, NodeKind, Program, UnaryOp},
    index::Index,
    middle::{
        symbol::{SymbolTable, VarId},
        ty::Type,
        type_check,
    },
};

/// Offsets 0, 2, and 13 hold the static segments below; literals start
/// right after the empty-string sentinel
const FIRST_LITERAL_OFFSET: u32 = 14;

pub fn generate_module(program: &Program, symbols: &SymbolTable) -> String {
    let mut writer = WatWriter::new();
    let strings = StringTable::collect(program);

    writer.code("(module");
    writer.indent(2);

    writer.comment_line(";; Define a memory block with ten pages (640KB)");
    writer
        .code("(memory (export \"memory\") 1)")
        .code("(data (i32.const 0) \"0\\00\")")
        .code("(data (i32.const 2) \"0123456789\\00\")")
        .code("(data (i32.const 13) \"\\00\")");

    for (offset, text) in &strings.segments {
        writer.code(format!(
            "(data (i32.const {offset}) \"{}\\00\")",
            escape_wat_string(text.as_bytes())
        ));
    }

    writer
        .code(format!(
            "(global $free_mem (mut i32) (i32.const {}))",
            strings.free_mem
        ))
        .blank();

    emit_helpers(&mut writer);

    for function in &program.functions {
        FunctionEmitter::new(symbols, &strings, &mut writer).emit(function);
    }

    writer.indent(-2);
    writer.code(")").comment("END program module");

    writer.finish()
}

/* String literal data segments */

struct StringTable {
    /// Deduplicated literal text with its assigned offset, in first-seen
    /// order
    segments: Vec<(u32, String)>,
    offsets: HashMap<String, u32>,
    free_mem: u32,
}

impl StringTable {
    fn collect(program: &Program) -> Self {
        let mut table = Self {
            segments: Vec::new(),
            offsets: HashMap::new(),
            free_mem: FIRST_LITERAL_OFFSET,
        };

        for function in &program.functions {
            table.collect_node(&function.body);
        }

        table
    }

    fn collect_node(&mut self, node: &Node) {
        if let NodeKind::StringLiteral(text) = &node.kind {
            if !self.offsets.contains_key(text) {
                let offset = self.free_mem;
                self.offsets.insert(text.clone(), offset);
                self.segments.push((offset, text.clone()));
                self.free_mem += text.len() as u32 + 1;
            }
        }
        node.for_each_child(&mut |child| self.collect_node(child));
    }

    fn offset_of(&self, text: &str) -> u32 {
        self.offsets[text]
    }
}

fn escape_wat_string(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:02x}")),
        }
    }
    out
}

/* User functions */

struct FunctionEmitter<'a> {
    symbols: &'a SymbolTable,
    strings: &'a StringTable,
    writer: &'a mut WatWriter,
    return_type: Type,
    next_label: usize,
    /// Innermost loop label last; break/continue/tail jumps target it
    loop_labels: Vec<usize>,
    next_temp: usize,
}

impl<'a> FunctionEmitter<'a> {
    fn new(symbols: &'a SymbolTable, strings: &'a StringTable, writer: &'a mut WatWriter) -> Self {
        Self {
            symbols,
            strings,
            writer,
            return_type: Type::Int,
            next_label: 0,
            loop_labels: Vec::new(),
            next_temp: 0,
        }
    }

    fn emit(mut self, function: &Function) {
        let info = self.symbols.function(function.id);
        self.return_type = info.return_type;

        let mut header = format!("(func ${} (export \"{}\")", info.name, info.name);
        for param in &function.params {
            header.push_str(&format!(
                " (param {} {})",
                local_name(*param),
                wat_type(self.symbols.type_of(*param))
            ));
        }
        header.push_str(&format!(" (result {})", wat_type(info.return_type)));
        self.writer.code(header);
        self.writer.indent(2);

        for local in &function.locals {
            self.writer.code(format!(
                "(local {} {})",
                local_name(*local),
                wat_type(self.symbols.type_of(*local))
            ));
        }
        for temp in 0..count_temps(&function.body, self.symbols) {
            self.writer.code(format!("(local $temp{temp} i32)"));
        }

        let NodeKind::Block(statements) = &function.body.kind else {
            unreachable!("function bodies are blocks");
        };
        for statement in statements {
            self.emit_statement(statement);
        }

        // Every path returns, but the validator cannot always see that
        // through branches; a trailing trap satisfies the result type
        if !matches!(statements.last().map(|s| &s.kind), Some(NodeKind::Return(_))) {
            self.writer.code("(unreachable)");
        }

        self.writer.indent(-2);
        self.writer.code(")").blank();
    }

    /* Statements */

    fn emit_statement(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Block(children) => {
                for child in children {
                    self.emit_statement(child);
                }
            }
            NodeKind::Binary {
                op: BinaryOp::Assign,
                lhs,
                rhs,
            } => {
                let NodeKind::Var(var) = lhs.kind else {
                    unreachable!("assignment targets are variables after type checking");
                };
                let target = self.symbols.type_of(var);
                let produced = self.emit_expression(rhs);
                self.convert(produced, target);
                self.writer.code(format!("(local.set {})", local_name(var)));
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.emit_condition(condition);
                self.writer.code("(if");
                self.writer.indent(2);
                self.writer.code("(then");
                self.writer.indent(2);
                self.emit_statement(then_branch);
                self.writer.indent(-2);
                self.writer.code(")");
                if let Some(else_branch) = else_branch {
                    self.writer.code("(else");
                    self.writer.indent(2);
                    self.emit_statement(else_branch);
                    self.writer.indent(-2);
                    self.writer.code(")");
                }
                self.writer.indent(-2);
                self.writer.code(")");
            }
            NodeKind::While { condition, body } => {
                let label = self.next_label;
                self.next_label += 1;

                self.writer.code(format!("(block $exit{label}"));
                self.writer.indent(2);
                self.writer.code(format!("(loop $loop{label}"));
                self.writer.indent(2);

                self.emit_condition(condition);
                self.writer.code("(i32.eqz)");
                self.writer.code(format!("(br_if $exit{label})"));

                self.loop_labels.push(label);
                self.emit_statement(body);
                self.loop_labels.pop();

                self.writer.code(format!("(br $loop{label})"));
                self.writer.indent(-2);
                self.writer.code(")");
                self.writer.indent(-2);
                self.writer.code(")");
            }
            NodeKind::Return(expr) => {
                let produced = self.emit_expression(expr);
                self.convert(produced, self.return_type);
                self.writer.code("(return)");
            }
            NodeKind::Break => {
                let label = self.innermost_loop();
                self.writer.code(format!("(br $exit{label})"));
            }
            NodeKind::Continue => {
                let label = self.innermost_loop();
                self.writer.code(format!("(br $loop{label})"));
            }
            NodeKind::TailLoop { assignments } => {
                for (param, expr) in assignments {
                    let target = self.symbols.type_of(*param);
                    let produced = self.emit_expression(expr);
                    self.convert(produced, target);
                    self.writer
                        .code(format!("(local.set {})", local_name(*param)));
                }
                let label = self.innermost_loop();
                self.writer.code(format!("(br $loop{label})"));
            }
            // Expression statement: evaluate and discard the value
            _ => {
                self.emit_expression(node);
                self.writer.code("(drop)");
            }
        }
    }

    fn innermost_loop(&self) -> usize {
        *self
            .loop_labels
            .last()
            .expect("loop control flow outside a loop survived type checking")
    }

    /// Emits a condition and normalizes it to an i32 truth value
    fn emit_condition(&mut self, condition: &Node) {
        let produced = self.emit_expression(condition);
        if produced.is_double() {
            self.writer.code("(f64.const 0)");
            self.writer.code("(f64.ne)");
        }
    }

    /* Expressions */

    fn emit_expression(&mut self, node: &Node) -> Type {
        match &node.kind {
            NodeKind::IntLiteral(value) => {
                self.writer.code(format!("(i32.const {value})"));
                Type::Int
            }
            NodeKind::FloatLiteral(value) => {
                self.writer.code(format!("(f64.const {value:?})"));
                Type::Double
            }
            NodeKind::CharLiteral(value) => {
                self.writer.code(format!("(i32.const {value})"));
                Type::Char
            }
            NodeKind::StringLiteral(text) => {
                self.writer
                    .code(format!("(i32.const {})", self.strings.offset_of(text)));
                Type::String
            }
            NodeKind::Var(var) => {
                self.writer.code(format!("(local.get {})", local_name(*var)));
                self.symbols.type_of(*var)
            }
            NodeKind::Unary { op, operand } => self.emit_unary(*op, operand),
            NodeKind::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
            NodeKind::Cast { to, operand } => self.emit_cast(*to, operand),
            NodeKind::Size { operand } => {
                self.emit_expression(operand);
                self.writer.code("(call $_strlen)");
                Type::Int
            }
            NodeKind::Index { base, index } => {
                self.emit_expression(base);
                let index_type = self.emit_expression(index);
                self.convert(index_type, Type::Int);
                self.writer.code("(i32.add)");
                self.writer.code("(i32.load8_u)");
                Type::Char
            }
            NodeKind::Call { target, args } => {
                let info = self.symbols.function(*target);
                let name = info.name.clone();
                let param_types = info.param_types.clone();
                for (arg, param_type) in args.iter().zip(param_types) {
                    let produced = self.emit_expression(arg);
                    self.convert(produced, param_type);
                }
                self.writer.code(format!("(call ${name})"));
                self.symbols.function(*target).return_type
            }
            _ => unreachable!("statement node in expression position survived type checking"),
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Node) -> Type {
        match op {
            UnaryOp::Negate => {
                if self.type_of(operand).is_double() {
                    self.emit_expression(operand);
                    self.writer.code("(f64.neg)");
                    Type::Double
                } else {
                    self.writer.code("(i32.const 0)");
                    self.emit_expression(operand);
                    self.writer.code("(i32.sub)");
                    Type::Int
                }
            }
            UnaryOp::Not => {
                self.emit_expression(operand);
                self.writer.code("(i32.eqz)");
                Type::Int
            }
            UnaryOp::Sqrt => {
                self.emit_expression(operand);
                self.writer.code("(f64.sqrt)");
                Type::Double
            }
        }
    }

    fn emit_cast(&mut self, to: CastKind, operand: &Node) -> Type {
        match to {
            CastKind::ToInt => {
                let produced = self.emit_expression(operand);
                if produced.is_double() {
                    self.writer.code("(i32.trunc_f64_s)");
                }
                Type::Int
            }
            CastKind::ToDouble => {
                let produced = self.emit_expression(operand);
                if !produced.is_double() {
                    self.writer.code("(f64.convert_i32_s)");
                }
                Type::Double
            }
            CastKind::ToString => match self.type_of(operand) {
                Type::String => {
                    self.emit_expression(operand);
                    Type::String
                }
                Type::Int => {
                    self.emit_expression(operand);
                    self.writer.code("(call $_int2string)");
                    Type::String
                }
                Type::Double => {
                    unreachable!("double-to-string conversion survived type checking")
                }
                // A char becomes a fresh one-byte string
                Type::Char => {
                    let temp = self.next_temp;
                    self.next_temp += 1;

                    self.writer.code("(i32.const 1)");
                    self.writer.code("(call $_alloc_str)");
                    self.writer.code(format!("(local.set $temp{temp})"));
                    self.writer.code(format!("(local.get $temp{temp})"));
                    self.emit_expression(operand);
                    self.writer.code("i32.store8");
                    self.writer.code(format!("(local.get $temp{temp})"));
                    Type::String
                }
            },
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> Type {
        if op == BinaryOp::Assign {
            // Assignment in expression position leaves the stored value on
            // the stack
            let NodeKind::Var(var) = lhs.kind else {
                unreachable!("assignment targets are variables after type checking");
            };
            let target = self.symbols.type_of(var);
            let produced = self.emit_expression(rhs);
            self.convert(produced, target);
            self.writer.code(format!("(local.tee {})", local_name(var)));
            return target;
        }

        let left = self.type_of(lhs);
        let right = self.type_of(rhs);

        // String operations go through the runtime helpers
        if left.is_string() || right.is_string() {
            return self.emit_string_binary(op, lhs, rhs);
        }

        match op {
            BinaryOp::LogicalAnd => return self.emit_logical_and(lhs, rhs),
            BinaryOp::LogicalOr => return self.emit_logical_or(lhs, rhs),
            _ => {}
        }

        let unified = left.unify_numeric(right);
        // Modulus has no f64 instruction and is int-only by typing
        let unified = if op == BinaryOp::Modulus { Type::Int } else { unified };

        let produced = self.emit_expression(lhs);
        self.convert(produced, unified);
        let produced = self.emit_expression(rhs);
        self.convert(produced, unified);

        let double = unified.is_double();
        let instruction = match op {
            BinaryOp::Add => ["(i32.add)", "(f64.add)"],
            BinaryOp::Subtract => ["(i32.sub)", "(f64.sub)"],
            BinaryOp::Multiply => ["(i32.mul)", "(f64.mul)"],
            BinaryOp::Divide => ["(i32.div_s)", "(f64.div)"],
            BinaryOp::Modulus => ["(i32.rem_s)", "(i32.rem_s)"],
            BinaryOp::LessThan => ["(i32.lt_s)", "(f64.lt)"],
            BinaryOp::LessThanOrEqualTo => ["(i32.le_s)", "(f64.le)"],
            BinaryOp::GreaterThan => ["(i32.gt_s)", "(f64.gt)"],
            BinaryOp::GreaterThanOrEqualTo => ["(i32.ge_s)", "(f64.ge)"],
            BinaryOp::Equals => ["(i32.eq)", "(f64.eq)"],
            BinaryOp::NotEquals => ["(i32.ne)", "(f64.ne)"],
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::Assign => {
                unreachable!("handled above")
            }
        };
        self.writer.code(instruction[double as usize]);

        if op.is_comparison() {
            Type::Int
        } else {
            unified
        }
    }

    fn emit_string_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> Type {
        match op {
            BinaryOp::Add => {
                self.emit_expression(lhs);
                self.emit_expression(rhs);
                self.writer.code("(call $_strcat)");
                Type::String
            }
            BinaryOp::Multiply => {
                self.emit_expression(lhs);
                let count = self.emit_expression(rhs);
                self.convert(count, Type::Int);
                self.writer.code("(call $_repeat_string)");
                Type::String
            }
            BinaryOp::Equals => {
                self.emit_expression(lhs);
                self.emit_expression(rhs);
                self.writer.code("(call $_str_cmp)");
                Type::Int
            }
            BinaryOp::NotEquals => {
                self.emit_expression(lhs);
                self.emit_expression(rhs);
                self.writer.code("(call $_str_cmp)");
                self.writer.code("(i32.eqz)");
                Type::Int
            }
            _ => unreachable!("string operator survived type checking"),
        }
    }

    fn emit_logical_and(&mut self, lhs: &Node, rhs: &Node) -> Type {
        self.emit_expression(lhs);
        self.writer.code("(if (result i32)");
        self.writer.indent(2);
        self.writer.code("(then");
        self.writer.indent(2);
        self.emit_expression(rhs);
        self.writer.code("(i32.const 0)");
        self.writer.code("(i32.ne)");
        self.writer.indent(-2);
        self.writer.code(")");
        self.writer.code("(else");
        self.writer.indent(2);
        self.writer.code("(i32.const 0)");
        self.writer.indent(-2);
        self.writer.code(")");
        self.writer.indent(-2);
        self.writer.code(")");
        Type::Int
    }

    fn emit_logical_or(&mut self, lhs: &Node, rhs: &Node) -> Type {
        self.emit_expression(lhs);
        self.writer.code("(if (result i32)");
        self.writer.indent(2);
        self.writer.code("(then");
        self.writer.indent(2);
        self.writer.code("(i32.const 1)");
        self.writer.indent(-2);
        self.writer.code(")");
        self.writer.code("(else");
        self.writer.indent(2);
        self.emit_expression(rhs);
        self.writer.code("(i32.const 0)");
        self.writer.code("(i32.ne)");
        self.writer.indent(-2);
        self.writer.code(")");
        self.writer.indent(-2);
        self.writer.code(")");
        Type::Int
    }

    fn convert(&mut self, from: Type, to: Type) {
        if from.is_double() && !to.is_double() && to.is_numeric() {
            self.writer.code("(i32.trunc_f64_s)");
        } else if !from.is_double() && from.is_numeric() && to.is_double() {
            self.writer.code("(f64.convert_i32_s)");
        }
    }

    fn type_of(&self, node: &Node) -> Type {
        type_check::expr_type(node, self.symbols).expect("expression was type checked")
    }
}

fn local_name(var: VarId) -> String {
    format!("$var{}", var.index())
}

fn wat_type(ty: Type) -> &'static str {
    match ty {
        Type::Double => "f64",
        Type::Int | Type::Char | Type::String => "i32",
    }
}

/// Scratch locals needed by the body: one per char-to-string conversion
fn count_temps(node: &Node, symbols: &SymbolTable) -> usize {
    let mut count = 0;
    if let NodeKind::Cast {
        to: CastKind::ToString,
        operand,
    } = &node.kind
    {
        if matches!(type_check::expr_type(operand, symbols), Ok(Type::Char)) {
            count += 1;
        }
    }
    node.for_each_child(&mut |child| count += count_temps(child, symbols));
    count
}

/* Runtime helpers, emitted verbatim into every module */

fn emit_helpers(writer: &mut WatWriter) {
    writer
        .code(";; Function to allocate a string; add one to size and places null there.")
        .code("(func $_alloc_str (param $size i32) (result i32)")
        .code("  (local $null_pos i32) ;; Local variable to place null terminator.")
        .code("  (global.get $free_mem)")
        .comment("Old free mem is alloc start.")
        .code("  (global.get $free_mem)")
        .comment("Adjust new free mem.")
        .code("  (local.get $size)")
        .code("  (i32.add)")
        .code("  (local.set $null_pos)")
        .code("  (i32.store8 (local.get $null_pos) (i32.const 0))")
        .comment("Place null terminator.")
        .code("  (i32.add (i32.const 1) (local.get $null_pos))")
        .code("  (global.set $free_mem)")
        .comment("Update free memory start.")
        .code(")")
        .blank();

    writer
        .code(";; Function to calculate the length of a null-terminated string.")
        .code("(func $_strlen (param $str i32) (result i32)")
        .code("  (local $length i32) ;; Local variable to store the string length.")
        .code("  (local.set $length (i32.const 0)) ;; Initialize length to 0.")
        .code("  (block $exit ;; Outer block for loop termination.")
        .code("    (loop $check")
        .code("      (br_if $exit (i32.eq (i32.load8_u (local.get $str)) (i32.const 0)))")
        .comment("If the current byte is null, exit the loop.")
        .code("      (local.set $str (i32.add (local.get $str) (i32.const 1)))")
        .comment("Increment the pointer and the length counter.")
        .code("      (local.set $length (i32.add (local.get $length) (i32.const 1)))")
        .code("      (br $check)")
        .comment("Continue the loop.")
        .code("    )")
        .code("  )")
        .code("  (local.get $length) ;; Return the calculated length.")
        .code(")")
        .blank();

    writer
        .code(";; Function to copy a specific number of bytes from one location to another.")
        .code("(func $_memcpy (param $src i32) (param $dest i32) (param $size i32)")
        .code("  (block $done")
        .code("    (loop $copy")
        .code("      (br_if $done (i32.eqz (local.get $size)))")
        .comment("Exit the loop when $size reaches 0.")
        .code("      (i32.store8 (local.get $dest) (i32.load8_u (local.get $src)))")
        .comment("Copy the current byte from source to destination.")
        .code("      (local.set $src (i32.add (local.get $src) (i32.const 1)))")
        .comment("Increment source and destination pointers.")
        .code("      (local.set $dest (i32.add (local.get $dest) (i32.const 1)))")
        .comment("Decrement size.")
        .code("      (local.set $size (i32.sub (local.get $size) (i32.const 1)))")
        .code("      (br $copy)")
        .comment("Repeat the loop.")
        .code("    )")
        .code("  )")
        .code(")")
        .blank();

    writer
        .code(";; Function to concatenate two strings.")
        .code("(func $_strcat (param $str1 i32) (param $str2 i32) (result i32)")
        .code("  (local $len1 i32) ;; Length of the first string.")
        .code("  (local $len2 i32) ;; Length of the second string.")
        .code("  (local $result i32) ;; Pointer to the new concatenated string.")
        .code("  ;; Calculate the length of the first string.")
        .code("  (local.set $len1 (call $_strlen (local.get $str1)))")
        .code("  ;; Calculate the length of the second string.")
        .code("  (local.set $len2 (call $_strlen (local.get $str2)))")
        .code("  ;; Allocate memory for the concatenated string using _alloc_str.")
        .code("  (local.set $result (call $_alloc_str (i32.add (local.get $len1) (local.get $len2))))")
        .code("  ;; Copy the first string into the allocated memory.")
        .code("  (call $_memcpy (local.get $str1) (local.get $result) (local.get $len1))")
        .code("  ;; Copy the second string immediately after the first string in the allocated memory.")
        .code("  (call $_memcpy (local.get $str2) (i32.add (local.get $result) (local.get $len1)) (local.get $len2)) ;; Include null terminator.")
        .code("  ;; Return the pointer to the concatenated string.")
        .code("  (local.get $result)")
        .code(")")
        .blank();

    writer
        .code(";; Function to swap the first two values on the stack.")
        .code("(func $_swap (param $a i32) (param $b i32) (result i32 i32)")
        .code("  (local.get $b)")
        .code("  (local.get $a)")
        .code(")")
        .blank();

    writer
        .code(";; Function to repeat a string a given number of times")
        .code("(func $_repeat_string (param $str i32) (param $count i32) (result i32)")
        .code("  (local $result i32)")
        .comment("Pointer to the resulting string")
        .code("  (local $str_len i32)")
        .comment("Length of the input string")
        .code("  (local $total_len i32)")
        .comment("Total length of the resulting string")
        .code("  (local $temp_dest i32)")
        .comment("Temporary pointer for destination")
        .code("  (local.set $str_len (call $_strlen (local.get $str)))")
        .code("  (local.set $total_len (i32.mul (local.get $str_len) (local.get $count)))")
        .code("  (local.set $result (call $_alloc_str (local.get $total_len)))")
        .code("  (local.set $temp_dest (local.get $result))")
        .code("  (block $exit_loop")
        .code("    (loop $repeat_loop")
        .code("      (br_if $exit_loop (i32.eqz (local.get $count)))")
        .code("      (call $_memcpy (local.get $str) (local.get $temp_dest) (local.get $str_len))")
        .code("      (local.set $temp_dest (i32.add (local.get $temp_dest) (local.get $str_len)))")
        .code("      (local.set $count (i32.sub (local.get $count) (i32.const 1)))")
        .code("      (br $repeat_loop)")
        .code("    )")
        .code("  )")
        .code("  (local.get $result)")
        .code(")")
        .blank();

    writer
        .code("(func $_int2string (param $var0 i32) (result i32)")
        .code("  (local $var2 i32)")
        .code("  (local $var3 i32)")
        .code("  (local $var4 i32)")
        .code("  (local $temp0 i32)")
        .code("  (local $temp1 i32)")
        .code("  (local.get $var0)")
        .code("  (i32.const 0)")
        .code("  (i32.eq)")
        .code("  (if")
        .code("    (then")
        .code("      (i32.const 0)")
        .code("      (return)")
        .code("    )")
        .code("  )")
        .code("  (i32.const 2)")
        .code("  (local.set $var2)")
        .code("  (i32.const 0)")
        .code("  (local.set $var3)")
        .code("  (local.get $var0)")
        .code("  (i32.const 0)")
        .code("  (i32.lt_s)")
        .code("  (if")
        .code("    (then")
        .code("      (i32.const 1)")
        .code("      (local.set $var3)")
        .code("      (local.get $var0)")
        .code("      (i32.const 0)")
        .code("      (i32.const 1)")
        .code("      (i32.sub)")
        .code("      (i32.mul)")
        .code("      (local.set $var0)")
        .code("    )")
        .code("  )")
        .code("  (i32.const 13)")
        .code("  (local.set $var4)")
        .code("  (block $exit1")
        .code("    (loop $loop1")
        .code("      (local.get $var0)")
        .code("      (i32.const 0)")
        .code("      (i32.gt_s)")
        .code("      (i32.eqz)")
        .code("      (br_if $exit1)")
        .code("      (i32.const 2)")
        .code("      call $_alloc_str")
        .code("      (local.set $temp0)")
        .code("      (local.get $temp0)")
        .code("      (local.get $var2)")
        .code("      (local.get $var0)")
        .code("      (i32.const 10)")
        .code("      (i32.rem_s)")
        .code("      (i32.add)")
        .code("      (i32.load8_u)")
        .code("      i32.store8")
        .code("      (local.get $temp0)")
        .code("      (local.get $var4)")
        .code("      call $_strcat")
        .code("      (local.set $var4)")
        .code("      (local.get $var0)")
        .code("      (i32.const 10)")
        .code("      (i32.div_s)")
        .code("      (local.set $var0)")
        .code("      (br $loop1)")
        .code("    )")
        .code("  )")
        .code("  (local.get $var3)")
        .code("  (if")
        .code("    (then")
        .code("      (i32.const 2)")
        .code("      call $_alloc_str")
        .code("      (local.set $temp1)")
        .code("      (local.get $temp1)")
        .code("      (i32.const 45)")
        .code("      i32.store8")
        .code("      (local.get $temp1)")
        .code("      (local.get $var4)")
        .code("      call $_strcat")
        .code("      (local.set $var4)")
        .code("    )")
        .code("  )")
        .code("  (local.get $var4)")
        .code(")")
        .blank();

    writer
        .code("(func $_str_cmp (param $lhs i32) (param $rhs i32) (result i32)")
        .code("  (local $len1 i32)")
        .code("  (local $len2 i32)")
        .code("  (local.set $len1 (call $_strlen (local.get $lhs)))")
        .code("  (local.set $len2 (call $_strlen (local.get $rhs)))")
        .code("  (i32.ne (local.get $len1) (local.get $len2))")
        .code("  (if (then")
        .code("    (return (i32.const 0))")
        .code("  ))")
        .code("  (block $exit")
        .code("    (loop $compare")
        .code("      (i32.eqz (local.get $len1))")
        .code("      (br_if $exit)")
        .code("      (i32.load8_u (local.get $lhs))")
        .code("      (i32.load8_u (local.get $rhs))")
        .code("      (i32.ne)")
        .code("      (if (then")
        .code("        (return (i32.const 0))")
        .code("      ))")
        .code("      (local.set $lhs (i32.add (local.get $lhs) (i32.const 1)))")
        .code("      (local.set $rhs (i32.add (local.get $rhs) (i32.const 1)))")
        .code("      (local.set $len1 (i32.sub (local.get $len1) (i32.const 1)))")
        .code("      (br $compare)")
        .code("    )")
        .code("  )")
        .code("  (i32.const 1)")
        .code(")")
        .blank();
}
