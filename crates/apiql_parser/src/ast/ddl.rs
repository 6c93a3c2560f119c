use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Ident, ObjectReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: Ident,
    /// Data type as written, e.g. `varchar(20)`.
    pub data_type: String,
}

impl AstParseable for ColumnDef {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let name = Ident::parse(parser)?;
        let mut data_type = Ident::parse(parser)?.value;
        if parser.consume_token(&Token::LeftParen) {
            let mut parts = Vec::new();
            loop {
                match parser.next().map(|t| t.token.clone()) {
                    Some(Token::Number(n)) => parts.push(n),
                    _ => return Err(parser.expected("a number in type modifier")),
                }
                if !parser.consume_token(&Token::Comma) {
                    break;
                }
            }
            parser.expect_token(&Token::RightParen)?;
            data_type = format!("{data_type}({})", parts.join(","));
        }
        Ok(ColumnDef { name, data_type })
    }
}

/// `CREATE TABLE [IF NOT EXISTS] <reference> (<column defs>)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub if_not_exists: bool,
    pub reference: ObjectReference,
    pub columns: Vec<ColumnDef>,
}

impl AstParseable for CreateTable {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::CREATE)?;
        parser.expect_keyword(Keyword::TABLE)?;
        let if_not_exists =
            parser.parse_keyword_sequence(&[Keyword::IF, Keyword::NOT, Keyword::EXISTS]);
        let reference = ObjectReference::parse(parser)?;
        let columns = parser.parse_parenthesized_comma_separated(ColumnDef::parse)?;
        Ok(CreateTable {
            if_not_exists,
            reference,
            columns,
        })
    }
}

/// `DROP TABLE [IF EXISTS] <reference>, ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    pub if_exists: bool,
    pub references: Vec<ObjectReference>,
}

impl AstParseable for DropTable {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::DROP)?;
        parser.expect_keyword(Keyword::TABLE)?;
        let if_exists = parser.parse_keyword_sequence(&[Keyword::IF, Keyword::EXISTS]);
        let references = parser.parse_comma_separated(ObjectReference::parse)?;
        Ok(DropTable {
            if_exists,
            references,
        })
    }
}
