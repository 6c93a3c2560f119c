pub mod ddl;
pub use ddl::*;
pub mod exec;
pub use exec::*;
pub mod expr;
pub use expr::*;
pub mod from;
pub use from::*;
pub mod modify;
pub use modify::*;
pub mod query;
pub use query::*;
pub mod select;
pub use select::*;
pub mod show;
pub use show::*;
pub mod variable;
pub use variable::*;

use std::fmt;

use crate::errors::{ParseError, Result};
use crate::parser::Parser;
use crate::tokens::{Token, Word};

pub trait AstParseable: Sized {
    /// Parse an instance of Self from the provided parser.
    ///
    /// It's assumed that the parser is in the correct state for parsing Self,
    /// and if it isn't, an error should be returned.
    fn parse(parser: &mut Parser) -> Result<Self>;
}


/// Identity of a table expression node within a single parsed statement.
///
/// Assigned by the parser in the order nodes are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident {
    pub value: String,
    pub quoted: bool,
}

impl Ident {
    pub fn from_string(s: impl Into<String>) -> Self {
        Ident {
            value: s.into(),
            quoted: false,
        }
    }

    pub(crate) fn from_word(w: &Word) -> Self {
        Ident {
            value: w.value.clone(),
            quoted: w.quote.is_some(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl AstParseable for Ident {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok,
            None => {
                return Err(ParseError::new(
                    "Expected identifier, found end of statement",
                ));
            }
        };

        match &tok.token {
            Token::Word(w) => Ok(Ident::from_word(w)),
            other => Err(ParseError::with_location(
                format!("Unexpected token '{other}'. Expected an identifier."),
                tok.line,
                tok.col,
            )),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectReference(pub Vec<Ident>);

impl ObjectReference {
    /// Create an object from an iterator of strings.
    ///
    /// Useful in tests, probably unlikely that it should be used anywhere else.
    pub fn from_strings<S>(strings: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        ObjectReference(strings.into_iter().map(Ident::from_string).collect())
    }

    pub fn base(&self) -> Result<&Ident> {
        match self.0.last() {
            Some(ident) => Ok(ident),
            None => Err(ParseError::new("Empty object reference")),
        }
    }

    /// Iterate over the parts of the reference as strings.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|ident| ident.as_str())
    }
}

impl AstParseable for ObjectReference {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let mut idents = Vec::new();
        loop {
            idents.push(Ident::parse(parser)?);

            // Check if the next token is a period for possible compound
            // identifiers. If not, we're done.
            if !parser.consume_token(&Token::Period) {
                break;
            }
        }

        Ok(ObjectReference(idents))
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strings: Vec<_> = self.parts().collect();
        write!(f, "{}", strings.join("."))
    }
}
