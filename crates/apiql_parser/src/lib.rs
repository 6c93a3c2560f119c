//! SQL tokenizer and parser producing a closed statement AST.
//!
//! Table expression nodes carry a [`ast::NodeId`] that is stable for the
//! lifetime of the parsed statement and can be used as a lookup key.

pub mod ast;
pub mod errors;
pub mod keywords;
pub mod parser;
pub mod statement;
pub mod tokens;
pub mod visitor;

pub use errors::{ParseError, Result};
pub use parser::{parse, parse_statement};
pub use statement::Statement;
