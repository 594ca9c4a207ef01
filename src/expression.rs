//! Expression parser: recursive descent over a single expression string.
//!
//! Tokens are matched by anchored regexes that each skip leading whitespace.
//! Operator precedence is not encoded as grammar levels; `parse_binary`
//! builds a left-leaning tree one operator at a time and re-associates each
//! new operator into the existing tree's right spine (see `reassociate`).

use regex::Regex;
use thiserror::Error;

use crate::error::ParserError;
use crate::model::{BinaryOperator, Expression, UnaryOperator};

/// Expression-level failure, positioned as a byte offset into the
/// expression text. The statement parser remaps offsets into source-line
/// columns before surfacing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum ExprError {
    #[error("Syntax error")]
    Syntax { offset: usize },
    #[error("Unmatched parenthesis")]
    UnmatchedParenthesis { offset: usize },
}

impl ExprError {
    pub(crate) fn offset(self) -> usize {
        match self {
            ExprError::Syntax { offset } => offset,
            ExprError::UnmatchedParenthesis { offset } => offset,
        }
    }
}

pub(crate) type ExprResult<T> = Result<T, ExprError>;

/// Parse a complete expression. Trailing non-whitespace is rejected.
pub fn parse_expression(text: &str) -> Result<Expression, ParserError> {
    parse(text).map_err(|error| {
        ParserError::new(error.to_string(), text).with_column(char_column(text, error.offset()))
    })
}

/// 1-based character column for a byte offset into `text`.
pub(crate) fn char_column(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count() + 1
}

pub(crate) fn parse(text: &str) -> ExprResult<Expression> {
    let mut cursor = Cursor { text, pos: 0 };
    let expr = parse_binary(&mut cursor)?;
    cursor.skip_whitespace();
    if cursor.pos < text.len() {
        return Err(ExprError::Syntax { offset: cursor.pos });
    }
    Ok(expr)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Match an anchored pattern at the current position and consume it.
    fn take(&mut self, pattern: &Regex) -> Option<regex::Captures<'a>> {
        let captures = pattern.captures(self.rest())?;
        self.pos += captures[0].len();
        Some(captures)
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Offset of the first unconsumed non-whitespace character.
    fn error_offset(&self) -> usize {
        let rest = self.rest();
        self.pos + (rest.len() - rest.trim_start().len())
    }
}

fn parse_binary(cursor: &mut Cursor) -> ExprResult<Expression> {
    let mut left = parse_unary(cursor)?;
    while let Some(op) = match_binary_operator(cursor) {
        let right = parse_unary(cursor)?;
        left = reassociate(op, left, right);
    }
    Ok(left)
}

/// Fold a new `(op, right)` pair into the already-built `left` tree.
///
/// When `op` binds tighter than the tree's root operator, descend the right
/// spine through binary nodes that `op` also out-binds and splice the new
/// node around the spine's tail. Same-rank operators never descend, so
/// chains like `1 - 2 + 3` stay left-leaning.
fn reassociate(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    let descends = |expr: &Expression| {
        matches!(expr, Expression::Binary(node) if op.binds_tighter_than(node.op))
    };
    if !descends(&left) {
        return Expression::binary(op, left, right);
    }

    let mut root = left;
    let mut cursor = &mut root;
    loop {
        let node = match cursor {
            Expression::Binary(node) => node,
            _ => unreachable!("re-association cursor only rests on binary nodes"),
        };
        if descends(&node.right) {
            cursor = &mut node.right;
        } else {
            let tail = std::mem::replace(&mut node.right, Expression::Number(0.0));
            node.right = Expression::binary(op, tail, right);
            break;
        }
    }
    root
}

fn match_binary_operator(cursor: &mut Cursor) -> Option<BinaryOperator> {
    let captures = cursor.take(regex!(
        r"^\s*(\*\*|<=|>=|==|!=|&&|\|\||\*|/|%|\+|-|<|>)"
    ))?;
    let op = match &captures[1] {
        "**" => BinaryOperator::Exponent,
        "*" => BinaryOperator::Multiply,
        "/" => BinaryOperator::Divide,
        "%" => BinaryOperator::Modulo,
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Subtract,
        "<=" => BinaryOperator::LessEqual,
        "<" => BinaryOperator::Less,
        ">=" => BinaryOperator::GreaterEqual,
        ">" => BinaryOperator::Greater,
        "==" => BinaryOperator::Equal,
        "!=" => BinaryOperator::NotEqual,
        "&&" => BinaryOperator::And,
        "||" => BinaryOperator::Or,
        symbol => unreachable!("operator pattern matched '{symbol}'"),
    };
    Some(op)
}

fn parse_unary(cursor: &mut Cursor) -> ExprResult<Expression> {
    // Group
    if cursor.take(regex!(r"^\s*\(")).is_some() {
        let inner = parse_binary(cursor)?;
        if cursor.take(regex!(r"^\s*\)")).is_none() {
            return Err(ExprError::UnmatchedParenthesis {
                offset: cursor.error_offset(),
            });
        }
        return Ok(Expression::group(inner));
    }

    // Number literal. Tried before the prefix operators so a leading sign
    // belongs to the literal: `-3` is a number, `-x` a unary negation.
    let number_start = cursor.pos;
    if let Some(captures) = cursor.take(regex!(r"^\s*([+-]?[0-9]+(?:\.[0-9]*)?(?:e[+-][0-9]+)?)"))
    {
        let value: f64 = captures[1].parse().map_err(|_| ExprError::Syntax {
            offset: number_start,
        })?;
        return Ok(Expression::Number(value));
    }

    // Prefix unary
    if let Some(captures) = cursor.take(regex!(r"^\s*(!|-)")) {
        let op = if &captures[1] == "!" {
            UnaryOperator::Not
        } else {
            UnaryOperator::Negate
        };
        let expr = parse_unary(cursor)?;
        return Ok(Expression::unary(op, expr));
    }

    // Call
    if let Some(captures) = cursor.take(regex!(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(")) {
        let name = captures[1].to_string();
        let args = parse_arguments(cursor)?;
        return Ok(Expression::call(name, args));
    }

    // String literals
    if let Some(captures) = cursor.take(regex!(r"^\s*'((?:\\'|\\\\|[^'])*)'")) {
        return Ok(Expression::String(unescape(&captures[1], '\'')));
    }
    if let Some(captures) = cursor.take(regex!(r#"^\s*"((?:\\"|\\\\|[^"])*)""#)) {
        return Ok(Expression::String(unescape(&captures[1], '"')));
    }

    // Variable
    if let Some(captures) = cursor.take(regex!(r"^\s*([A-Za-z_][A-Za-z0-9_]*)")) {
        return Ok(Expression::Variable(captures[1].to_string()));
    }

    // Bracketed variable: any characters except `]`, with `\]` and `\\`
    // escapes; surrounding whitespace inside the brackets is stripped.
    if let Some(captures) = cursor.take(regex!(r"^\s*\[\s*((?:\\\]|\\\\|[^\]])*?)\s*\]")) {
        return Ok(Expression::Variable(unescape(&captures[1], ']')));
    }

    Err(ExprError::Syntax {
        offset: cursor.error_offset(),
    })
}

fn parse_arguments(cursor: &mut Cursor) -> ExprResult<Vec<Expression>> {
    let mut args = Vec::new();
    if cursor.take(regex!(r"^\s*\)")).is_some() {
        return Ok(args);
    }
    loop {
        args.push(parse_binary(cursor)?);
        if cursor.take(regex!(r"^\s*,")).is_some() {
            continue;
        }
        if cursor.take(regex!(r"^\s*\)")).is_some() {
            return Ok(args);
        }
        return Err(ExprError::UnmatchedParenthesis {
            offset: cursor.error_offset(),
        });
    }
}

/// Resolve `\\` and `\<terminator>` escapes; any other backslash is kept.
pub(crate) fn unescape(text: &str, terminator: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == terminator || next == '\\' => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}
