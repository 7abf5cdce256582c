//! Append-only text buffer with a mutable indent level.
//!
//! Every code-emitting component writes through an [`IndentedWriter`]. Nested
//! blocks inside one component use [`IndentedWriter::indented`] so the level is
//! restored when the closure returns. Loops are the exception: a loop header is
//! opened by one flow element and closed by another, so loop handlers adjust the
//! level with [`IndentedWriter::set_indent_level`] and rely on the flow pass to
//! pair them.

use tracing::warn;

/// Default indent unit (four spaces).
pub const DEFAULT_INDENT: &str = "    ";

/// Text buffer that prefixes lines with the current indent.
#[derive(Debug, Clone)]
pub struct IndentedWriter {
    buffer: String,
    one_indent: String,
    indent_level: i32,
}

impl Default for IndentedWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndentedWriter {
    /// Writer with the default four-space indent.
    pub fn new() -> Self {
        Self::with_indent_width(DEFAULT_INDENT.len())
    }

    /// Writer indenting by `width` spaces per level.
    pub fn with_indent_width(width: usize) -> Self {
        Self {
            buffer: String::new(),
            one_indent: " ".repeat(width),
            indent_level: 0,
        }
    }

    /// Append `text` after the current indent. The caller supplies any newline.
    pub fn write_indented(&mut self, text: &str) {
        let level = usize::try_from(self.indent_level).unwrap_or(0);
        for _ in 0..level {
            self.buffer.push_str(&self.one_indent);
        }
        self.buffer.push_str(text);
    }

    /// Append `text` with no indent.
    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Append an empty line without trailing indentation.
    pub fn blank_line(&mut self) {
        self.buffer.push('\n');
    }

    /// Write each line of a possibly multi-line fragment at the current indent.
    pub fn write_lines(&mut self, code: &str) {
        for line in code.lines() {
            if line.trim().is_empty() {
                self.blank_line();
            } else {
                self.write_indented(line);
                self.buffer.push('\n');
            }
        }
    }

    /// Change the indent level, absolutely or relative to the current one.
    ///
    /// Levels below zero are stored as given and render as no indentation.
    pub fn set_indent_level(&mut self, level: i32, relative: bool) {
        if relative {
            self.indent_level += level;
        } else {
            self.indent_level = level;
        }
        if self.indent_level < 0 {
            warn!(level = self.indent_level, "indent level went below zero");
        }
    }

    /// Current indent level.
    pub fn indent_level(&self) -> i32 {
        self.indent_level
    }

    /// Run `f` one level deeper, restoring the previous level afterwards.
    pub fn indented<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.indent_level;
        self.indent_level += 1;
        let result = f(self);
        self.indent_level = saved;
        result
    }

    /// Text written so far.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Consume the writer and return its text.
    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuilderError, BuilderResult};

    #[test]
    fn indents_by_level() {
        let mut w = IndentedWriter::new();
        w.write_indented("a\n");
        w.set_indent_level(2, false);
        w.write_indented("b\n");
        w.set_indent_level(-1, true);
        w.write_indented("c\n");
        assert_eq!(w.as_str(), "a\n        b\n    c\n");
    }

    #[test]
    fn indented_restores_level_on_early_return() {
        let mut w = IndentedWriter::with_indent_width(2);
        let result: BuilderResult<()> = w.indented(|w| {
            w.write_indented("x\n");
            w.indented(|w| -> BuilderResult<()> {
                w.write_indented("y\n");
                Err(BuilderError::InvalidName("y".into()))
            })?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(w.indent_level(), 0);
        assert_eq!(w.as_str(), "  x\n    y\n");
    }

    #[test]
    fn negative_levels_render_flush_left() {
        let mut w = IndentedWriter::new();
        w.set_indent_level(-2, true);
        w.write_indented("z");
        assert_eq!(w.indent_level(), -2);
        assert_eq!(w.as_str(), "z");
    }

    #[test]
    fn write_lines_skips_indent_on_blank_lines() {
        let mut w = IndentedWriter::new();
        w.indented(|w| w.write_lines("a = 1\n\nb = 2"));
        assert_eq!(w.as_str(), "    a = 1\n\n    b = 2\n");
    }
}
