//! Script model shared by the statement and expression parsers.
//!
//! The parser builds these nodes once; downstream consumers either walk them
//! directly or serialize them. The serde representation is the canonical
//! document form: every statement and expression is a single-key tagged
//! object, operators appear as their source-text symbol, and optional fields
//! are omitted when absent.

use serde::{Deserialize, Serialize};

/// Top-level container returned by `parse_script`. Statements appear in
/// source order after block lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statement {
    /// Assignment if `name` is present, bare expression statement otherwise.
    Expr(ExprStatement),
    Function(FunctionStatement),
    /// A jump target.
    Label(String),
    Jump(JumpStatement),
    Return(ReturnStatement),
    /// Include URL, already unescaped.
    Include(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionStatement {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub statements: Vec<Statement>,
    #[serde(
        rename = "async",
        default,
        skip_serializing_if = "is_false"
    )]
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpStatement {
    pub label: String,
    /// Unconditional when absent, taken-when-truthy otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Number(f64),
    String(String),
    Variable(String),
    /// Preserves parenthesization in the model.
    Group(Box<Expression>),
    Unary(Box<UnaryExpression>),
    Binary(Box<BinaryExpression>),
    Function(FunctionExpression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    pub op: UnaryOperator,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub op: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
}

/// A call expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpression {
    pub name: String,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "-")]
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    #[serde(rename = "**")]
    Exponent,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "%")]
    Modulo,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinaryOperator {
    /// Rank in the precedence lattice; larger binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Exponent => 7,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
            BinaryOperator::Add | BinaryOperator::Subtract => 5,
            BinaryOperator::LessEqual
            | BinaryOperator::Less
            | BinaryOperator::GreaterEqual
            | BinaryOperator::Greater => 4,
            BinaryOperator::Equal | BinaryOperator::NotEqual => 3,
            BinaryOperator::And => 2,
            BinaryOperator::Or => 1,
        }
    }

    /// Whether `self` may be pushed down into a subtree rooted at `other`.
    /// Same-rank operators stay put, which keeps left-associative chains
    /// left-leaning.
    pub fn binds_tighter_than(self, other: BinaryOperator) -> bool {
        self.precedence() > other.precedence()
    }
}

impl Expression {
    pub fn number(value: f64) -> Expression {
        Expression::Number(value)
    }

    pub fn variable(name: impl Into<String>) -> Expression {
        Expression::Variable(name.into())
    }

    pub fn group(expr: Expression) -> Expression {
        Expression::Group(Box::new(expr))
    }

    pub fn unary(op: UnaryOperator, expr: Expression) -> Expression {
        Expression::Unary(Box::new(UnaryExpression { op, expr }))
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary(Box::new(BinaryExpression { op, left, right }))
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Expression {
        Expression::Function(FunctionExpression {
            name: name.into(),
            args,
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statements_serialize_as_single_key_objects() {
        let script = Script {
            statements: vec![
                Statement::Expr(ExprStatement {
                    name: Some("x".to_string()),
                    expr: Expression::number(1.0),
                }),
                Statement::Label("target".to_string()),
                Statement::Jump(JumpStatement {
                    label: "target".to_string(),
                    expr: None,
                }),
                Statement::Return(ReturnStatement { expr: None }),
                Statement::Include("https://example.com/lib.lns".to_string()),
            ],
        };

        let value = serde_json::to_value(&script).expect("serialize");
        assert_eq!(
            value,
            json!({
                "statements": [
                    {"expr": {"name": "x", "expr": {"number": 1.0}}},
                    {"label": "target"},
                    {"jump": {"label": "target"}},
                    {"return": {}},
                    {"include": "https://example.com/lib.lns"},
                ]
            })
        );
    }

    #[test]
    fn operators_serialize_as_source_symbols() {
        let expr = Expression::binary(
            BinaryOperator::Exponent,
            Expression::variable("a"),
            Expression::unary(UnaryOperator::Not, Expression::variable("b")),
        );
        let value = serde_json::to_value(&expr).expect("serialize");
        assert_eq!(
            value,
            json!({
                "binary": {
                    "op": "**",
                    "left": {"variable": "a"},
                    "right": {"unary": {"op": "!", "expr": {"variable": "b"}}},
                }
            })
        );
    }

    #[test]
    fn async_flag_is_present_only_when_true() {
        let plain = Statement::Function(FunctionStatement {
            name: "f".to_string(),
            args: vec![],
            statements: vec![],
            is_async: false,
        });
        let value = serde_json::to_value(&plain).expect("serialize");
        assert_eq!(
            value,
            json!({"function": {"name": "f", "args": [], "statements": []}})
        );

        let tagged = Statement::Function(FunctionStatement {
            name: "g".to_string(),
            args: vec!["a".to_string()],
            statements: vec![],
            is_async: true,
        });
        let value = serde_json::to_value(&tagged).expect("serialize");
        assert_eq!(
            value,
            json!({"function": {"name": "g", "args": ["a"], "statements": [], "async": true}})
        );
    }

    #[test]
    fn canonical_form_round_trips() {
        let script = Script {
            statements: vec![Statement::Jump(JumpStatement {
                label: "done".to_string(),
                expr: Some(Expression::binary(
                    BinaryOperator::Less,
                    Expression::variable("i"),
                    Expression::number(10.0),
                )),
            })],
        };
        let text = serde_json::to_string(&script).expect("serialize");
        let back: Script = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, script);
    }
}
