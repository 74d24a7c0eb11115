use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{peek_nth, PeekNth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::frontend::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    line_number: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword),   // while
    TypeName(TypeName), // int
    Identifier,         // main

    /* Literals */
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0
    CharLiteral,    // 'A'
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Colon,        // :

    /* Unary Ops */
    Bang, // !

    /* Unary + Binary Ops */
    Minus, // -

    /* Binary Ops */
    Plus,                 // +
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals, // =
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Function,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    Sqrt,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TypeName {
    Int,
    Char,
    Double,
    String,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('!', TokenKind::Bang),
        ('-', TokenKind::Minus),
        ('+', TokenKind::Plus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line_number: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &SourceFile {
        self.source
    }

    fn report_fatal_error(&self, message: &str) -> ! {
        eprintln!(
            "Fatal error reported in Lexer ({}:{}):",
            self.source.origin,
            self.line_number + 1,
        );
        eprintln!("{message}");
        std::process::exit(1);
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            if c == '\n' {
                self.line_number += 1;
            }

            self.chars.next();
            self.position += 1;
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.chars.next();
            self.position += 1;
        }
    }

    fn read_wrapped_escapable(&mut self, wrapper: char, kind: TokenKind) -> Token {
        let start_position = self.position;

        // Consume first wrapper
        assert!(self.chars.next().is_some());
        self.position += 1;

        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                self.report_fatal_error(&format!(
                    "Reached end of line while reading wrapped literal: {:?}",
                    kind
                ));
            }

            // Consume chars within the wrapped literal
            self.chars.next();
            self.position += 1;

            // If we encountered an escape sequence, keep going
            if c == '\\' && self.chars.peek().is_some_and(|c| *c == wrapper) {
                self.chars.next();
                self.position += 1;
            }

            if c == wrapper {
                return Token {
                    span: self.new_span(start_position),
                    kind,
                };
            }
        }

        self.report_fatal_error(&format!(
            "Reached end of file while reading wrapped literal: {:?}",
            kind
        ))
    }

    // Keyword, type name, or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else if let Ok(type_name) = value.parse() {
            TokenKind::TypeName(type_name)
        } else {
            TokenKind::Identifier
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;
        let mut kind = TokenKind::IntegerLiteral;

        assert!(self.chars.peek().is_some());

        while let Some(c) = self.chars.peek().copied() {
            if c == '.' {
                kind = TokenKind::FloatLiteral;
                self.read_decimal_part();
                break;
            }

            if !c.is_ascii_digit() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_decimal_part(&mut self) -> Token {
        let start_position = self.position;

        assert!(self.chars.next().is_some());
        self.position += 1;

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        Token {
            kind: TokenKind::FloatLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.position += 1;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.chars.next();

        self.position += 2;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Option<Token> {
        if !self.peek_buffer.is_empty() {
            return self.peek_buffer.front().cloned();
        }

        if let Some(token) = self.next() {
            self.peek_buffer.push_back(token);
        }

        self.peek_buffer.front().cloned()
    }

    pub fn next(&mut self) -> Option<Token> {
        if !self.peek_buffer.is_empty() {
            return self.peek_buffer.pop_front();
        }

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii() {
                self.report_fatal_error(&format!("Unexpected non-ascii character in stream: `{c}`"))
            }

            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.chars.peek_nth(1).is_some_and(|c| *c == '/') => {
                    self.ignore_line();
                    continue;
                }

                // String literals
                '"' => self.read_wrapped_escapable('"', TokenKind::StringLiteral),
                // Char literals
                '\'' => self.read_wrapped_escapable('\'', TokenKind::CharLiteral),

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number(),
                '.' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_decimal_part()
                }

                // Identifiers, keywords, and type names
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                // Double Equals (==)
                '=' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::DoubleEquals)
                }
                // Not Equals (!=)
                '!' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::NotEquals)
                }
                // Less than or equal (<=)
                '<' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::LessThanOrEqualTo)
                }
                // Greater than or equal (>=)
                '>' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }
                // Logical And (&&)
                '&' if self.chars.peek_nth(1).is_some_and(|c| *c == '&') => {
                    self.read_double(TokenKind::LogicalAnd)
                }
                // Logical Or (||)
                '|' if self.chars.peek_nth(1).is_some_and(|c| *c == '|') => {
                    self.read_double(TokenKind::LogicalOr)
                }

                s if SINGLE_TOKENS.contains_key(&s) => {
                    self.read_single(*SINGLE_TOKENS.get(&s).unwrap())
                }
                c => self.report_fatal_error(&format!("Unexpected character in stream: `{c}`")),
            };

            return Some(token);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::SourceFileOrigin;

    fn lex_kinds(input: &str) -> Vec<TokenKind> {
        let source = SourceFile {
            contents: input.to_string(),
            origin: SourceFileOrigin::Memory,
        };
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();
        while let Some(token) = lexer.next() {
            kinds.push(token.kind);
        }
        kinds
    }

    #[test]
    fn lexes_function_header() {
        assert_eq!(
            lex_kinds("function main() : int {"),
            vec![
                TokenKind::Keyword(Keyword::Function),
                TokenKind::Identifier,
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::Colon,
                TokenKind::TypeName(TypeName::Int),
                TokenKind::OpenBrace,
            ]
        );
    }

    #[test]
    fn lexes_two_char_operators() {
        assert_eq!(
            lex_kinds("<= >= == != && ||"),
            vec![
                TokenKind::LessThanOrEqualTo,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::DoubleEquals,
                TokenKind::NotEquals,
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
            ]
        );
    }

    #[test]
    fn lexes_literals_and_skips_comments() {
        assert_eq!(
            lex_kinds("42 3.5 'a' \"hi\" // trailing\n7"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::CharLiteral,
                TokenKind::StringLiteral,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn sqrt_and_size_are_keywords() {
        assert_eq!(
            lex_kinds("sqrt size sized"),
            vec![
                TokenKind::Keyword(Keyword::Sqrt),
                TokenKind::Keyword(Keyword::Size),
                TokenKind::Identifier,
            ]
        );
    }
}
