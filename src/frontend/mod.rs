use std::path::PathBuf;

use colored::Colorize;

use self::lexer::Span;

pub mod ast;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// One-based line number of a byte position
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// One-based column number of a byte position
    pub fn column_for_position(&self, position: usize) -> usize {
        let clamped = position.min(self.contents.len());
        let line_start = self.contents[..clamped]
            .rfind('\n')
            .map(|n| n + 1)
            .unwrap_or(0);
        clamped - line_start + 1
    }

    pub fn format_span_position(&self, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.origin,
            self.row_for_position(span.start),
            self.column_for_position(span.start)
        )
    }

    /// Prints the source line containing the start of the span with a caret
    /// marker underneath the offending range
    pub fn highlight_span(&self, span: Span) {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start]
            .rfind('\n')
            .map(|n| n + 1)
            .unwrap_or(0);
        let line_end = self.contents[start..]
            .find('\n')
            .map(|n| start + n)
            .unwrap_or(self.contents.len());

        let line = &self.contents[line_start..line_end];
        let row = self.row_for_position(start);
        let gutter = format!("{row} | ");

        eprintln!("{}{}", gutter.white(), line);

        let marker_len = (span.end.min(line_end)).saturating_sub(start).max(1);
        eprintln!(
            "{}{}",
            " ".repeat(gutter.len() + (start - line_start)),
            "^".repeat(marker_len).red()
        );
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
