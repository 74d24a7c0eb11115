//! Line-oriented WAT output buffer.
//!
//! Code is collected as indented lines with optional trailing `;;`
//! comments and rendered in one go at the end, so the generator can build
//! the module incrementally without worrying about the output stream.

#[derive(Debug, Default)]
pub struct WatWriter {
    lines: Vec<Line>,
    indent: usize,
}

#[derive(Debug)]
struct Line {
    indent: usize,
    code: String,
    comment: Option<String>,
}

impl WatWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a code line at the current indentation
    pub fn code(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line {
            indent: self.indent,
            code: text.into(),
            comment: None,
        });
        self
    }

    /// Attaches a `;;` comment to the most recent line
    pub fn comment(&mut self, text: &str) -> &mut Self {
        if let Some(line) = self.lines.last_mut() {
            line.comment = Some(text.to_string());
        }
        self
    }

    /// Appends a standalone comment line
    pub fn comment_line(&mut self, text: &str) -> &mut Self {
        self.code(text)
    }

    pub fn blank(&mut self) -> &mut Self {
        self.code("")
    }

    pub fn indent(&mut self, delta: isize) {
        self.indent = self.indent.saturating_add_signed(delta);
    }

    pub fn finish(self) -> String {
        let mut out = String::new();
        for line in self.lines {
            if line.code.is_empty() && line.comment.is_none() {
                out.push('\n');
                continue;
            }

            out.push_str(&" ".repeat(line.indent));
            out.push_str(&line.code);
            if let Some(comment) = line.comment {
                out.push_str(" ;; ");
                out.push_str(&comment);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_indentation_and_comments() {
        let mut writer = WatWriter::new();
        writer.code("(module");
        writer.indent(2);
        writer.code("(memory 1)").comment("one page");
        writer.indent(-2);
        writer.code(")");

        assert_eq!(writer.finish(), "(module\n  (memory 1) ;; one page\n)\n");
    }

    #[test]
    fn blank_lines_stay_empty() {
        let mut writer = WatWriter::new();
        writer.indent(2);
        writer.blank();
        assert_eq!(writer.finish(), "\n");
    }
}
