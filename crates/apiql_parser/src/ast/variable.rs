use crate::errors::{ParseError, Result};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, Ident, ObjectReference};

/// `SET <name> = <value>` or `SET <name> TO <value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVariable {
    pub reference: ObjectReference,
    pub value: Expr,
}

impl AstParseable for SetVariable {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::SET)?;

        let name = ObjectReference::parse(parser)?;
        if parser.parse_keyword(Keyword::TO) || parser.consume_token(&Token::Eq) {
            let expr = Expr::parse(parser)?;
            return Ok(SetVariable {
                reference: name,
                value: expr,
            });
        }

        Err(ParseError::new(format!(
            "Expected 'SET {name} TO <value>' or 'SET {name} = <value>'"
        )))
    }
}

/// `USE <provider>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Use {
    pub provider: Ident,
}

impl AstParseable for Use {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::USE)?;
        let provider = Ident::parse(parser)?;
        Ok(Use { provider })
    }
}

/// `SLEEP <millis>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sleep {
    pub duration: Expr,
}

impl AstParseable for Sleep {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::SLEEP)?;
        let duration = Expr::parse(parser)?;
        Ok(Sleep { duration })
    }
}
