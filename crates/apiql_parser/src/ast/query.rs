use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, SelectNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryNode {
    pub body: QueryNodeBody,
    pub order_by: Vec<OrderByNode>,
    pub limit: LimitModifier,
}

impl AstParseable for QueryNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let body = QueryNodeBody::parse(parser)?;

        let order_by = if parser.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
            parser.parse_comma_separated(OrderByNode::parse)?
        } else {
            Vec::new()
        };

        let limit = LimitModifier::parse(parser)?;

        Ok(QueryNode {
            body,
            order_by,
            limit,
        })
    }
}

impl QueryNode {
    /// Returns if the parser is at the start of a query node.
    pub fn is_query_node_start(parser: &Parser) -> bool {
        match parser.peek() {
            Some(tok) => tok.is_keyword(Keyword::SELECT) || tok.token == Token::LeftParen,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNodeBody {
    Select(Box<SelectNode>),
    Nested(Box<QueryNode>),
    Set {
        left: Box<QueryNodeBody>,
        right: Box<QueryNodeBody>,
        operation: SetOperation,
        all: bool,
    },
}

impl AstParseable for QueryNodeBody {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_inner(parser, 0)
    }
}

impl QueryNodeBody {
    fn parse_inner(parser: &mut Parser, precedence: u8) -> Result<Self> {
        let mut body = if parser.parse_keyword(Keyword::SELECT) {
            QueryNodeBody::Select(Box::new(SelectNode::parse(parser)?))
        } else if parser.consume_token(&Token::LeftParen) {
            let nested = QueryNode::parse(parser)?;
            parser.expect_token(&Token::RightParen)?;
            QueryNodeBody::Nested(Box::new(nested))
        } else {
            return Err(parser.expected("SELECT"));
        };

        // Parse set operation(s)
        while let Some(kw) = parser.peek_keyword() {
            let (op, next_precedence) = match kw {
                Keyword::UNION => (SetOperation::Union, 10),
                Keyword::EXCEPT => (SetOperation::Except, 10),
                Keyword::INTERSECT => (SetOperation::Intersect, 20),
                _ => break,
            };

            if precedence >= next_precedence {
                break;
            }

            let _ = parser.next();
            let all = match parser.parse_one_of_keywords(&[Keyword::ALL, Keyword::DISTINCT]) {
                Some(kw) => kw == Keyword::ALL,
                None => false,
            };

            body = QueryNodeBody::Set {
                left: Box::new(body),
                right: Box::new(Self::parse_inner(parser, next_precedence)?),
                operation: op,
                all,
            };
        }

        Ok(body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    Except,
    Intersect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByNode {
    pub expr: Expr,
    /// `Some(true)` for ASC, `Some(false)` for DESC.
    pub asc: Option<bool>,
}

impl AstParseable for OrderByNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let expr = Expr::parse(parser)?;
        let asc = match parser.parse_one_of_keywords(&[Keyword::ASC, Keyword::DESC]) {
            Some(Keyword::ASC) => Some(true),
            Some(_) => Some(false),
            None => None,
        };
        Ok(OrderByNode { expr, asc })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LimitModifier {
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

impl AstParseable for LimitModifier {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let mut limit = None;
        let mut offset = None;

        if parser.parse_keyword(Keyword::LIMIT) {
            let first = Expr::parse(parser)?;
            if parser.consume_token(&Token::Comma) {
                // `LIMIT <offset>, <limit>`
                offset = Some(first);
                limit = Some(Expr::parse(parser)?);
            } else {
                limit = Some(first);
            }
        }

        if offset.is_none() && parser.parse_keyword(Keyword::OFFSET) {
            offset = Some(Expr::parse(parser)?);
        }

        Ok(LimitModifier { limit, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use crate::ast::{Ident, Literal, SelectExpr};
    use pretty_assertions::assert_eq;

    fn select_literal(n: &str) -> QueryNodeBody {
        QueryNodeBody::Select(Box::new(SelectNode {
            hints: Vec::new(),
            distinct: false,
            projections: vec![SelectExpr::Expr(Expr::Literal(Literal::Number(
                n.to_string(),
            )))],
            from: None,
            where_expr: None,
            group_by: Vec::new(),
            having: None,
        }))
    }

    #[test]
    fn union_all() {
        let query: QueryNode = parse_ast("SELECT 1 UNION ALL SELECT 2 UNION SELECT 3").unwrap();
        let expected = QueryNode {
            body: QueryNodeBody::Set {
                left: Box::new(QueryNodeBody::Set {
                    left: Box::new(select_literal("1")),
                    right: Box::new(select_literal("2")),
                    operation: SetOperation::Union,
                    all: true,
                }),
                right: Box::new(select_literal("3")),
                operation: SetOperation::Union,
                all: false,
            },
            order_by: Vec::new(),
            limit: LimitModifier::default(),
        };
        assert_eq!(expected, query);
    }

    #[test]
    fn order_by_limit_offset() {
        let query: QueryNode = parse_ast("SELECT 1 ORDER BY a DESC, b LIMIT 10 OFFSET 5").unwrap();
        assert_eq!(
            vec![
                OrderByNode {
                    expr: Expr::Ident(Ident::from_string("a")),
                    asc: Some(false),
                },
                OrderByNode {
                    expr: Expr::Ident(Ident::from_string("b")),
                    asc: None,
                },
            ],
            query.order_by
        );
        assert_eq!(
            LimitModifier {
                limit: Some(Expr::Literal(Literal::Number("10".to_string()))),
                offset: Some(Expr::Literal(Literal::Number("5".to_string()))),
            },
            query.limit
        );
    }

    #[test]
    fn mysql_style_limit() {
        let query: QueryNode = parse_ast("SELECT 1 LIMIT 5, 10").unwrap();
        assert_eq!(
            LimitModifier {
                limit: Some(Expr::Literal(Literal::Number("10".to_string()))),
                offset: Some(Expr::Literal(Literal::Number("5".to_string()))),
            },
            query.limit
        );
    }

    #[test]
    fn intersect_binds_tighter() {
        let query: QueryNode = parse_ast("SELECT 1 UNION SELECT 2 INTERSECT SELECT 3").unwrap();
        match query.body {
            QueryNodeBody::Set {
                operation, right, ..
            } => {
                assert_eq!(SetOperation::Union, operation);
                assert!(matches!(
                    *right,
                    QueryNodeBody::Set {
                        operation: SetOperation::Intersect,
                        ..
                    }
                ));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
