//! Command-stream formatter: accumulates a PDF content stream and
//! enforces the draw-state-stack nesting invariants (q/Q, BT/ET, BMC/EMC).

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    Text,
    SaveState,
    MarkedContent,
    Dictionary,
}

impl DrawState {
    fn name(self) -> &'static str {
        match self {
            DrawState::Text => "BT",
            DrawState::SaveState => "q",
            DrawState::MarkedContent => "BMC/BDC",
            DrawState::Dictionary => "<<",
        }
    }
}

pub struct ContentStreamFormatter {
    buf: String,
    stack: Vec<DrawState>,
    indent: usize,
}

impl Default for ContentStreamFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStreamFormatter {
    pub fn new() -> Self {
        ContentStreamFormatter {
            buf: String::new(),
            stack: Vec::new(),
            indent: 0,
        }
    }

    fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.buf.push(' ');
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    /// Appends a raw already-formatted operand+operator line at the
    /// current indent, e.g. `"1 0 0.3 rg"`.
    pub fn append(&mut self, line: &str) {
        self.write_line(line);
    }

    /// Appends `args... op`, space separated.
    pub fn append_command(&mut self, args: &[String], op: &str) {
        if args.is_empty() {
            self.write_line(op);
        } else {
            self.write_line(&format!("{} {op}", args.join(" ")));
        }
    }

    pub fn begin_text(&mut self) -> Result<()> {
        if let Some(&DrawState::Text) = self.stack.last() {
            return Err(Error::NestedBmc);
        }
        if self.stack.iter().any(|s| *s == DrawState::Text) {
            return Err(Error::NestedBmc);
        }
        self.write_line("BT");
        self.indent += 2;
        self.stack.push(DrawState::Text);
        Ok(())
    }

    pub fn end_text(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(DrawState::Text) => {
                self.indent -= 2;
                self.write_line("ET");
                Ok(())
            }
            Some(other) => {
                self.stack.push(other);
                Err(Error::DrawStateEndMismatch {
                    expected: "ET",
                    found: other.name(),
                })
            }
            None => Err(Error::DrawStateEndMismatch {
                expected: "ET",
                found: "<empty>",
            }),
        }
    }

    pub fn save_state(&mut self) -> Result<()> {
        self.write_line("q");
        self.indent += 2;
        self.stack.push(DrawState::SaveState);
        Ok(())
    }

    pub fn restore_state(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(DrawState::SaveState) => {
                self.indent -= 2;
                self.write_line("Q");
                Ok(())
            }
            Some(other) => {
                self.stack.push(other);
                Err(Error::DrawStateEndMismatch {
                    expected: "Q",
                    found: other.name(),
                })
            }
            None => Err(Error::DrawStateEndMismatch {
                expected: "Q",
                found: "<empty>",
            }),
        }
    }

    pub fn begin_marked_content(&mut self, line: &str) -> Result<()> {
        if self.stack.iter().any(|s| *s == DrawState::MarkedContent) {
            return Err(Error::NestedBmc);
        }
        self.write_line(line);
        self.indent += 2;
        self.stack.push(DrawState::MarkedContent);
        Ok(())
    }

    pub fn end_marked_content(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(DrawState::MarkedContent) => {
                self.indent -= 2;
                self.write_line("EMC");
                Ok(())
            }
            Some(other) => {
                self.stack.push(other);
                Err(Error::EmcOnEmpty)
            }
            None => Err(Error::EmcOnEmpty),
        }
    }

    /// Stack must be empty when serializing a page or form XObject.
    pub fn steal(self) -> Result<String> {
        if let Some(top) = self.stack.last() {
            return Err(match top {
                DrawState::MarkedContent => Error::UnclosedMarkedContent,
                other => Error::DrawStateEndMismatch {
                    expected: "<empty>",
                    found: other.name(),
                },
            });
        }
        Ok(self.buf)
    }

    pub fn is_balanced(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_text_and_save_restore() {
        let mut f = ContentStreamFormatter::new();
        f.save_state().unwrap();
        f.begin_text().unwrap();
        f.append("/F1 12 Tf");
        f.end_text().unwrap();
        f.restore_state().unwrap();
        let out = f.steal().unwrap();
        assert!(out.contains("BT"));
        assert!(out.contains("ET"));
    }

    #[test]
    fn q_without_matching_save_errors() {
        let mut f = ContentStreamFormatter::new();
        let err = f.restore_state().unwrap_err();
        assert!(matches!(err, Error::DrawStateEndMismatch { .. }));
    }

    #[test]
    fn unclosed_marked_content_on_steal() {
        let mut f = ContentStreamFormatter::new();
        f.begin_marked_content("/Span BMC").unwrap();
        let err = f.steal().unwrap_err();
        assert!(matches!(err, Error::UnclosedMarkedContent));
    }

    #[test]
    fn nested_bmc_rejected() {
        let mut f = ContentStreamFormatter::new();
        f.begin_marked_content("/Span BMC").unwrap();
        let err = f.begin_marked_content("/Span BMC").unwrap_err();
        assert!(matches!(err, Error::NestedBmc));
    }

    #[test]
    fn emc_on_empty_errors() {
        let mut f = ContentStreamFormatter::new();
        let err = f.end_marked_content().unwrap_err();
        assert!(matches!(err, Error::EmcOnEmpty));
    }
}
