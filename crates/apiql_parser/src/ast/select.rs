use crate::errors::{ParseError, Result};
use crate::keywords::{Keyword, RESERVED_FOR_COLUMN_ALIAS};
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, FromNode, Ident, ObjectReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectNode {
    /// Optimizer hints from `/*+ ... */` comments directly after SELECT.
    pub hints: Vec<String>,
    /// DISTINCT
    pub distinct: bool,
    /// Projection list. May included wildcards.
    pub projections: Vec<SelectExpr>,
    /// FROM
    pub from: Option<FromNode>,
    /// WHERE
    pub where_expr: Option<Expr>,
    /// GROUP BY
    pub group_by: Vec<Expr>,
    /// HAVING
    pub having: Option<Expr>,
}

impl AstParseable for SelectNode {
    /// Parse a select node. Assumes SELECT has already been consumed.
    fn parse(parser: &mut Parser) -> Result<Self> {
        let mut hints = Vec::new();
        while let Some(Token::Hint(hint)) = parser.peek().map(|t| &t.token) {
            hints.push(hint.clone());
            parser.idx += 1;
        }

        let distinct = matches!(
            parser.parse_one_of_keywords(&[Keyword::DISTINCT, Keyword::ALL]),
            Some(Keyword::DISTINCT)
        );

        // Select list
        let projections = parser.parse_comma_separated(SelectExpr::parse)?;

        // FROM
        let from = if parser.parse_keyword(Keyword::FROM) {
            Some(FromNode::parse(parser)?)
        } else {
            None
        };

        // WHERE
        let where_expr = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        // GROUP BY
        let group_by = if parser.parse_keyword_sequence(&[Keyword::GROUP, Keyword::BY]) {
            parser.parse_comma_separated(Expr::parse)?
        } else {
            Vec::new()
        };

        // HAVING
        let having = if parser.parse_keyword(Keyword::HAVING) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        Ok(SelectNode {
            hints,
            distinct,
            projections,
            from,
            where_expr,
            group_by,
            having,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectExpr {
    /// An unaliases expression.
    Expr(Expr),
    /// An aliased expression.
    ///
    /// `<expr> AS <ident>`
    AliasedExpr(Expr, Ident),
    /// A qualified wild card.
    ///
    /// `<reference>.*`
    QualifiedWildcard(ObjectReference),
    /// An unqualifed wild card.
    Wildcard,
}

impl AstParseable for SelectExpr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let idx = parser.idx; // Needed for resetting the position if this is just an expression.

        let tok = match parser.peek() {
            Some(tok) => tok,
            None => {
                return Err(ParseError::new(
                    "Expected select expression, found end of statement",
                ));
            }
        };

        // `*`
        if matches!(tok.token, Token::Mul) {
            parser.idx += 1;
            return Ok(SelectExpr::Wildcard);
        }

        // `ident.ident.*`
        if matches!(tok.token, Token::Word(_)) {
            let mut idents = Vec::new();
            while let Some(Token::Word(w)) = parser.peek().map(|t| &t.token) {
                idents.push(Ident::from_word(w));
                parser.idx += 1;
                if !parser.consume_token(&Token::Period) {
                    break;
                }
                if parser.consume_token(&Token::Mul) {
                    return Ok(SelectExpr::QualifiedWildcard(ObjectReference(idents)));
                }
            }
            // Not a qualified wildcard, reset.
            parser.idx = idx;
        }

        let expr = Expr::parse(parser)?;
        match parser.parse_alias(RESERVED_FOR_COLUMN_ALIAS)? {
            Some(alias) => Ok(SelectExpr::AliasedExpr(expr, alias)),
            None => Ok(SelectExpr::Expr(expr)),
        }
    }
}

impl SelectExpr {
    /// Name of the output column this expression produces.
    pub fn output_name(&self) -> Option<String> {
        match self {
            Self::Expr(expr) => Some(match expr.column_name() {
                Some(name) => name.to_string(),
                None => expr.to_string(),
            }),
            Self::AliasedExpr(_, alias) => Some(alias.value.clone()),
            Self::QualifiedWildcard(_) | Self::Wildcard => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use crate::ast::{BinaryOperator, FromBaseTable, FromNodeBody, Literal, NodeId};
    use pretty_assertions::assert_eq;

    #[test]
    fn select_expr_variants() {
        // (input, expected)
        let tests = [
            ("*", SelectExpr::Wildcard),
            (
                "a.*",
                SelectExpr::QualifiedWildcard(ObjectReference::from_strings(["a"])),
            ),
            (
                "a.b",
                SelectExpr::Expr(Expr::CompoundIdent(vec![
                    Ident::from_string("a"),
                    Ident::from_string("b"),
                ])),
            ),
            (
                "a AS b",
                SelectExpr::AliasedExpr(
                    Expr::Ident(Ident::from_string("a")),
                    Ident::from_string("b"),
                ),
            ),
            (
                "a b",
                SelectExpr::AliasedExpr(
                    Expr::Ident(Ident::from_string("a")),
                    Ident::from_string("b"),
                ),
            ),
        ];

        for (input, expected) in tests {
            let got: SelectExpr = parse_ast(input).unwrap();
            assert_eq!(expected, got, "{input}");
        }
    }

    #[test]
    fn full_select() {
        let node: SelectNode =
            parse_ast("/*+ STRAIGHT_JOIN */ DISTINCT id, name FROM t WHERE id > 1 GROUP BY name HAVING id")
                .unwrap();
        let expected = SelectNode {
            hints: vec!["STRAIGHT_JOIN".to_string()],
            distinct: true,
            projections: vec![
                SelectExpr::Expr(Expr::Ident(Ident::from_string("id"))),
                SelectExpr::Expr(Expr::Ident(Ident::from_string("name"))),
            ],
            from: Some(FromNode {
                id: NodeId(0),
                alias: None,
                body: FromNodeBody::BaseTable(FromBaseTable {
                    reference: ObjectReference::from_strings(["t"]),
                }),
            }),
            where_expr: Some(Expr::BinaryExpr {
                left: Box::new(Expr::Ident(Ident::from_string("id"))),
                op: BinaryOperator::Gt,
                right: Box::new(Expr::Literal(Literal::Number("1".to_string()))),
            }),
            group_by: vec![Expr::Ident(Ident::from_string("name"))],
            having: Some(Expr::Ident(Ident::from_string("id"))),
        };
        assert_eq!(expected, node);
    }

    #[test]
    fn output_names() {
        let expr: SelectExpr = parse_ast("t.login").unwrap();
        assert_eq!(Some("login".to_string()), expr.output_name());

        let expr: SelectExpr = parse_ast("1 + 2").unwrap();
        assert_eq!(Some("1 + 2".to_string()), expr.output_name());

        let expr: SelectExpr = parse_ast("count(*) AS n").unwrap();
        assert_eq!(Some("n".to_string()), expr.output_name());
    }
}
