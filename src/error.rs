//! Structured parse failure reported by both parsers.
//!
//! The value keeps the original offending line and column; the three-line
//! caret rendering (with long lines windowed to 120 characters) is produced
//! on demand by the `Display` impl.

use std::fmt;

/// Widest line rendering before windowing kicks in, in characters.
const MAX_RENDERED_LINE: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    /// Human-readable description, e.g. `Syntax error`.
    pub error: String,
    /// Offending line text as entered, untrimmed.
    pub line: String,
    /// 1-based character column of the offending position.
    pub column_number: usize,
    /// 1-based source line number, when known.
    pub line_number: Option<usize>,
    /// Optional message line prepended to the rendering.
    pub prefix: Option<String>,
}

pub type ParseResult<T> = Result<T, ParserError>;

impl ParserError {
    pub fn new(error: impl Into<String>, line: impl Into<String>) -> ParserError {
        ParserError {
            error: error.into(),
            line: line.into(),
            column_number: 1,
            line_number: None,
            prefix: None,
        }
    }

    pub fn with_column(mut self, column_number: usize) -> ParserError {
        self.column_number = column_number;
        self
    }

    pub fn with_line_number(mut self, line_number: usize) -> ParserError {
        self.line_number = Some(line_number);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> ParserError {
        self.prefix = Some(prefix.into());
        self
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            writeln!(f, "{prefix}")?;
        }
        match self.line_number {
            Some(line_number) => writeln!(f, "{}, line number {}:", self.error, line_number)?,
            None => writeln!(f, "{}:", self.error)?,
        }

        let (view, caret_column) = windowed_line(&self.line, self.column_number);
        writeln!(f, "{view}")?;
        write!(f, "{}^", " ".repeat(caret_column))
    }
}

impl std::error::Error for ParserError {}

/// Build the rendered view of `line` and the zero-based caret offset into
/// it. Lines longer than 120 characters are windowed around the column with
/// `... ` / ` ...` markers; the stored line and column are untouched.
fn windowed_line(line: &str, column_number: usize) -> (String, usize) {
    let chars: Vec<char> = line.chars().collect();
    let column = column_number.saturating_sub(1).min(chars.len());
    if chars.len() <= MAX_RENDERED_LINE {
        return (line.to_string(), column);
    }

    let mut start = column.saturating_sub(MAX_RENDERED_LINE / 2);
    let end = (start + MAX_RENDERED_LINE).min(chars.len());
    start = end.saturating_sub(MAX_RENDERED_LINE);

    let truncated_left = start > 0;
    let truncated_right = end < chars.len();

    let mut view = String::new();
    if truncated_left {
        view.push_str("... ");
    }
    view.extend(&chars[start..end]);
    if truncated_right {
        view.push_str(" ...");
    }

    let caret = column - start + if truncated_left { 4 } else { 0 };
    (view, caret)
}
