//! `linescript` library crate.
//!
//! High-level layout:
//! - frontend: `parser` (line dispatch + block lowering) calls into
//!   `expression` (precedence re-association); both produce the shared
//!   serializable model (`model`)
//! - failures surface as a single `error::ParserError` value

/// Compile a pattern once, on first use.
macro_rules! regex {
    ($pattern:expr) => {{
        static REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        REGEX.get_or_init(|| regex::Regex::new($pattern).unwrap_or_else(|error| panic!("{error}")))
    }};
}

pub mod error;
pub mod expression;
pub mod model;
pub mod parser;

pub use error::{ParseResult, ParserError};
pub use expression::parse_expression;
pub use model::Script;
pub use parser::{parse_script, parse_script_parts};
