use std::fmt;

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Error produced while tokenizing or parsing a statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ParseError {
    pub msg: String,
    /// Line and column (both 1-based) the error was raised at, if known.
    pub location: Option<(usize, usize)>,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        ParseError {
            msg: msg.into(),
            location: None,
        }
    }

    pub fn with_location(msg: impl Into<String>, line: usize, col: usize) -> Self {
        ParseError {
            msg: msg.into(),
            location: Some((line, col)),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some((line, col)) => write!(f, "{} (line {line}, column {col})", self.msg),
            None => write!(f, "{}", self.msg),
        }
    }
}
