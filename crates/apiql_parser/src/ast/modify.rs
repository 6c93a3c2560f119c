use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, Ident, ObjectReference};

/// `INSERT INTO <table> [(<cols>)] VALUES (<exprs>), ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: ObjectReference,
    pub columns: Vec<Ident>,
    pub rows: Vec<Vec<Expr>>,
}

impl AstParseable for Insert {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::INSERT)?;
        parser.expect_keyword(Keyword::INTO)?;

        let table = ObjectReference::parse(parser)?;

        let columns = if matches!(parser.peek().map(|t| &t.token), Some(Token::LeftParen)) {
            parser.parse_parenthesized_comma_separated(Ident::parse)?
        } else {
            Vec::new()
        };

        parser.expect_keyword(Keyword::VALUES)?;
        let rows = parser.parse_comma_separated(|parser| {
            parser.expect_token(&Token::LeftParen)?;
            let exprs = parser.parse_comma_separated(Expr::parse)?;
            parser.expect_token(&Token::RightParen)?;
            Ok(exprs)
        })?;

        Ok(Insert {
            table,
            columns,
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: Ident,
    pub value: Expr,
}

impl AstParseable for Assignment {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let column = Ident::parse(parser)?;
        parser.expect_token(&Token::Eq)?;
        let value = Expr::parse(parser)?;
        Ok(Assignment { column, value })
    }
}

/// `UPDATE <table> SET <col> = <expr>, ... [WHERE <expr>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub table: ObjectReference,
    pub assignments: Vec<Assignment>,
    pub where_expr: Option<Expr>,
}

impl AstParseable for Update {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::UPDATE)?;
        let table = ObjectReference::parse(parser)?;
        parser.expect_keyword(Keyword::SET)?;
        let assignments = parser.parse_comma_separated(Assignment::parse)?;

        let where_expr = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        Ok(Update {
            table,
            assignments,
            where_expr,
        })
    }
}

/// `DELETE FROM <table> [WHERE <expr>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub table: ObjectReference,
    pub where_expr: Option<Expr>,
}

impl AstParseable for Delete {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::DELETE)?;
        parser.expect_keyword(Keyword::FROM)?;
        let table = ObjectReference::parse(parser)?;

        let where_expr = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        Ok(Delete { table, where_expr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use crate::ast::{BinaryOperator, Literal};
    use pretty_assertions::assert_eq;

    fn lit_str(s: &str) -> Expr {
        Expr::Literal(Literal::SingleQuotedString(s.to_string()))
    }

    #[test]
    fn insert_with_columns() {
        let insert: Insert =
            parse_ast("INSERT INTO github.repos.issues (title, body) VALUES ('a', 'b'), ('c', 'd')")
                .unwrap();
        let expected = Insert {
            table: ObjectReference::from_strings(["github", "repos", "issues"]),
            columns: vec![Ident::from_string("title"), Ident::from_string("body")],
            rows: vec![
                vec![lit_str("a"), lit_str("b")],
                vec![lit_str("c"), lit_str("d")],
            ],
        };
        assert_eq!(expected, insert);
    }

    #[test]
    fn update_with_where() {
        let update: Update = parse_ast("UPDATE t SET x = 1, y = 'z' WHERE id = 4").unwrap();
        let expected = Update {
            table: ObjectReference::from_strings(["t"]),
            assignments: vec![
                Assignment {
                    column: Ident::from_string("x"),
                    value: Expr::Literal(Literal::Number("1".to_string())),
                },
                Assignment {
                    column: Ident::from_string("y"),
                    value: lit_str("z"),
                },
            ],
            where_expr: Some(Expr::BinaryExpr {
                left: Box::new(Expr::Ident(Ident::from_string("id"))),
                op: BinaryOperator::Eq,
                right: Box::new(Expr::Literal(Literal::Number("4".to_string()))),
            }),
        };
        assert_eq!(expected, update);
    }

    #[test]
    fn delete_without_where() {
        let delete: Delete = parse_ast("DELETE FROM t").unwrap();
        assert_eq!(
            Delete {
                table: ObjectReference::from_strings(["t"]),
                where_expr: None,
            },
            delete
        );
    }

    #[test]
    fn insert_requires_values() {
        parse_ast::<Insert>("INSERT INTO t (a)").unwrap_err();
    }
}
