use std::fmt;

use crate::errors::Result;
use crate::keywords::{Keyword, RESERVED_FOR_TABLE_ALIAS};
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, FunctionArg, Ident, NodeId, ObjectReference, QueryNode};

/// A table expression in a FROM clause.
///
/// Joins are built left-deep, `a JOIN b JOIN c` is `(a JOIN b) JOIN c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromNode {
    pub id: NodeId,
    pub alias: Option<Ident>,
    pub body: FromNodeBody,
}

impl AstParseable for FromNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let mut node = Self::parse_base_from(parser)?;

        loop {
            if parser.consume_token(&Token::Comma) {
                // <left>, <right>
                let right = Self::parse_base_from(parser)?;
                node = Self::join(parser, node, right, JoinType::Comma, JoinCondition::None);
                continue;
            }

            let join_type = match Self::parse_join_type(parser)? {
                Some(join_type) => join_type,
                None => break, // Not a join, let the caller handle the next part.
            };

            let right = Self::parse_base_from(parser)?;

            let join_condition = if join_type.is_natural() || join_type == JoinType::Cross {
                JoinCondition::None
            } else {
                match parser.parse_one_of_keywords(&[Keyword::ON, Keyword::USING]) {
                    Some(Keyword::ON) => JoinCondition::On(Expr::parse(parser)?),
                    Some(_) => JoinCondition::Using(
                        parser.parse_parenthesized_comma_separated(Ident::parse)?,
                    ),
                    None => JoinCondition::None,
                }
            };

            node = Self::join(parser, node, right, join_type, join_condition);
        }

        Ok(node)
    }
}

impl FromNode {
    /// Parse a single table, subquery, or table function along with its
    /// alias. Does not parse joins.
    pub fn parse_base_from(parser: &mut Parser) -> Result<Self> {
        if parser.consume_token(&Token::LeftParen) {
            // Subquery
            //
            // `FROM (SELECT * FROM my_table) AS alias`
            let query = QueryNode::parse(parser)?;
            parser.expect_token(&Token::RightParen)?;
            let alias = parser.parse_alias(RESERVED_FOR_TABLE_ALIAS)?;
            return Ok(FromNode {
                id: parser.next_node_id(),
                alias,
                body: FromNodeBody::Subquery(FromSubquery { query }),
            });
        }

        // Table or table function.
        let reference = ObjectReference::parse(parser)?;
        let body = if matches!(parser.peek().map(|t| &t.token), Some(Token::LeftParen)) {
            let args = parser.parse_parenthesized_comma_separated(FunctionArg::parse)?;
            FromNodeBody::TableFunction(FromTableFunction { reference, args })
        } else {
            FromNodeBody::BaseTable(FromBaseTable { reference })
        };
        let alias = parser.parse_alias(RESERVED_FOR_TABLE_ALIAS)?;

        Ok(FromNode {
            id: parser.next_node_id(),
            alias,
            body,
        })
    }

    fn join(
        parser: &mut Parser,
        left: FromNode,
        right: FromNode,
        join_type: JoinType,
        join_condition: JoinCondition,
    ) -> FromNode {
        FromNode {
            id: parser.next_node_id(),
            alias: None,
            body: FromNodeBody::Join(FromJoin {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                join_condition,
            }),
        }
    }

    /// Parse the keywords introducing a join, if any.
    fn parse_join_type(parser: &mut Parser) -> Result<Option<JoinType>> {
        let kw = match parser.peek_keyword() {
            Some(kw) => kw,
            None => return Ok(None),
        };

        let join_type = match kw {
            Keyword::JOIN | Keyword::INNER => {
                parser.parse_keyword(Keyword::INNER); // Optional INNER
                parser.expect_keyword(Keyword::JOIN)?;
                JoinType::Inner
            }
            Keyword::CROSS => {
                parser.expect_keyword(Keyword::CROSS)?;
                parser.expect_keyword(Keyword::JOIN)?;
                JoinType::Cross
            }
            Keyword::STRAIGHT_JOIN => {
                parser.expect_keyword(Keyword::STRAIGHT_JOIN)?;
                JoinType::Straight
            }
            Keyword::LEFT | Keyword::RIGHT => {
                let _ = parser.next();
                let is_left = kw == Keyword::LEFT;
                let modifier = parser.parse_one_of_keywords(&[
                    Keyword::OUTER,
                    Keyword::SEMI,
                    Keyword::ANTI,
                ]);
                parser.expect_keyword(Keyword::JOIN)?;
                match (is_left, modifier) {
                    (true, Some(Keyword::SEMI)) => JoinType::LeftSemi,
                    (true, Some(Keyword::ANTI)) => JoinType::LeftAnti,
                    (false, Some(Keyword::SEMI)) => JoinType::RightSemi,
                    (false, Some(Keyword::ANTI)) => JoinType::RightAnti,
                    (true, Some(Keyword::OUTER)) => JoinType::LeftOuter,
                    (false, Some(Keyword::OUTER)) => JoinType::RightOuter,
                    (true, _) => JoinType::Left,
                    (false, _) => JoinType::Right,
                }
            }
            Keyword::FULL => {
                parser.expect_keyword(Keyword::FULL)?;
                parser.parse_keyword(Keyword::OUTER); // Optional OUTER
                parser.expect_keyword(Keyword::JOIN)?;
                JoinType::Full
            }
            Keyword::NATURAL => {
                parser.expect_keyword(Keyword::NATURAL)?;
                let side = parser.parse_one_of_keywords(&[Keyword::LEFT, Keyword::RIGHT]);
                parser.parse_keyword(Keyword::OUTER); // Optional OUTER
                parser.expect_keyword(Keyword::JOIN)?;
                match side {
                    Some(Keyword::LEFT) => JoinType::NaturalLeft,
                    Some(_) => JoinType::NaturalRight,
                    None => JoinType::Natural,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(join_type))
    }

    /// Iterate over the ids of every non-join node in this tree, left to
    /// right.
    pub fn leaf_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_leaf_ids(&mut ids);
        ids
    }

    fn collect_leaf_ids(&self, ids: &mut Vec<NodeId>) {
        match &self.body {
            FromNodeBody::Join(join) => {
                join.left.collect_leaf_ids(ids);
                join.right.collect_leaf_ids(ids);
            }
            _ => ids.push(self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromNodeBody {
    BaseTable(FromBaseTable),
    Subquery(FromSubquery),
    TableFunction(FromTableFunction),
    Join(FromJoin),
}

impl FromNodeBody {
    /// Short name of the kind of table expression.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BaseTable(_) => "base table",
            Self::Subquery(_) => "subquery",
            Self::TableFunction(_) => "table function",
            Self::Join(_) => "join",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromBaseTable {
    pub reference: ObjectReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromSubquery {
    pub query: QueryNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromTableFunction {
    pub reference: ObjectReference,
    pub args: Vec<FunctionArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromJoin {
    pub left: Box<FromNode>,
    pub right: Box<FromNode>,
    pub join_type: JoinType,
    pub join_condition: JoinCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// `a, b`
    Comma,
    /// `a CROSS JOIN b`
    Cross,
    /// `a [INNER] JOIN b`
    Inner,
    /// `a STRAIGHT_JOIN b`
    Straight,
    /// `a LEFT JOIN b`
    Left,
    /// `a LEFT OUTER JOIN b`
    LeftOuter,
    /// `a RIGHT JOIN b`
    Right,
    /// `a RIGHT OUTER JOIN b`
    RightOuter,
    /// `a FULL [OUTER] JOIN b`
    Full,
    /// `a NATURAL JOIN b`
    Natural,
    /// `a NATURAL LEFT [OUTER] JOIN b`
    NaturalLeft,
    /// `a NATURAL RIGHT [OUTER] JOIN b`
    NaturalRight,
    LeftSemi,
    LeftAnti,
    RightSemi,
    RightAnti,
}

impl JoinType {
    pub fn is_natural(&self) -> bool {
        matches!(self, Self::Natural | Self::NaturalLeft | Self::NaturalRight)
    }

    /// Whether unmatched rows of the left side are kept.
    pub fn preserves_left(&self) -> bool {
        matches!(
            self,
            Self::Left | Self::LeftOuter | Self::NaturalLeft | Self::Full
        )
    }

    /// Whether unmatched rows of the right side are kept.
    pub fn preserves_right(&self) -> bool {
        matches!(
            self,
            Self::Right | Self::RightOuter | Self::NaturalRight | Self::Full
        )
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Comma => ",",
            Self::Cross => "cross join",
            Self::Inner => "join",
            Self::Straight => "straight_join",
            Self::Left => "left join",
            Self::LeftOuter => "left outer join",
            Self::Right => "right join",
            Self::RightOuter => "right outer join",
            Self::Full => "full outer join",
            Self::Natural => "natural join",
            Self::NaturalLeft => "natural left join",
            Self::NaturalRight => "natural right join",
            Self::LeftSemi => "left semi join",
            Self::LeftAnti => "left anti join",
            Self::RightSemi => "right semi join",
            Self::RightAnti => "right anti join",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<Ident>),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use crate::ast::{BinaryOperator, Literal, SelectExpr};
    use pretty_assertions::assert_eq;

    fn base(id: u32, name: &str, alias: Option<&str>) -> FromNode {
        FromNode {
            id: NodeId(id),
            alias: alias.map(Ident::from_string),
            body: FromNodeBody::BaseTable(FromBaseTable {
                reference: ObjectReference::from_strings(name.split('.')),
            }),
        }
    }

    fn join(id: u32, left: FromNode, right: FromNode, join_type: JoinType) -> FromNode {
        FromNode {
            id: NodeId(id),
            alias: None,
            body: FromNodeBody::Join(FromJoin {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                join_condition: JoinCondition::None,
            }),
        }
    }

    #[test]
    fn base_table_with_alias() {
        let node: FromNode = parse_ast("github.repos.issues AS i").unwrap();
        assert_eq!(base(0, "github.repos.issues", Some("i")), node);

        let node: FromNode = parse_ast("github.repos.issues i").unwrap();
        assert_eq!(base(0, "github.repos.issues", Some("i")), node);
    }

    #[test]
    fn left_outer_join_on() {
        let node: FromNode = parse_ast("a LEFT OUTER JOIN b ON a.id = b.id").unwrap();
        let expected = FromNode {
            id: NodeId(2),
            alias: None,
            body: FromNodeBody::Join(FromJoin {
                left: Box::new(base(0, "a", None)),
                right: Box::new(base(1, "b", None)),
                join_type: JoinType::LeftOuter,
                join_condition: JoinCondition::On(Expr::BinaryExpr {
                    left: Box::new(Expr::CompoundIdent(vec![
                        Ident::from_string("a"),
                        Ident::from_string("id"),
                    ])),
                    op: BinaryOperator::Eq,
                    right: Box::new(Expr::CompoundIdent(vec![
                        Ident::from_string("b"),
                        Ident::from_string("id"),
                    ])),
                }),
            }),
        };
        assert_eq!(expected, node);
    }

    #[test]
    fn joins_are_left_deep() {
        let node: FromNode = parse_ast("a, b CROSS JOIN c").unwrap();
        let expected = join(
            4,
            join(2, base(0, "a", None), base(1, "b", None), JoinType::Comma),
            base(3, "c", None),
            JoinType::Cross,
        );
        assert_eq!(expected, node);
        assert_eq!(vec![NodeId(0), NodeId(1), NodeId(3)], node.leaf_ids());
    }

    #[test]
    fn join_keywords() {
        // (input, expected)
        let tests = [
            ("a JOIN b", JoinType::Inner),
            ("a INNER JOIN b", JoinType::Inner),
            ("a STRAIGHT_JOIN b", JoinType::Straight),
            ("a LEFT JOIN b", JoinType::Left),
            ("a LEFT OUTER JOIN b", JoinType::LeftOuter),
            ("a RIGHT JOIN b", JoinType::Right),
            ("a RIGHT OUTER JOIN b", JoinType::RightOuter),
            ("a FULL OUTER JOIN b", JoinType::Full),
            ("a FULL JOIN b", JoinType::Full),
            ("a NATURAL JOIN b", JoinType::Natural),
            ("a NATURAL LEFT JOIN b", JoinType::NaturalLeft),
            ("a NATURAL RIGHT OUTER JOIN b", JoinType::NaturalRight),
            ("a LEFT SEMI JOIN b", JoinType::LeftSemi),
            ("a LEFT ANTI JOIN b", JoinType::LeftAnti),
        ];

        for (input, expected) in tests {
            let node: FromNode = parse_ast(input).unwrap();
            match node.body {
                FromNodeBody::Join(join) => assert_eq!(expected, join.join_type, "{input}"),
                other => panic!("unexpected body for {input}: {other:?}"),
            }
        }
    }

    #[test]
    fn subquery_with_alias() {
        let node: FromNode = parse_ast("(SELECT 1) AS s").unwrap();
        assert_eq!(NodeId(0), node.id);
        assert_eq!(Some(Ident::from_string("s")), node.alias);
        match node.body {
            FromNodeBody::Subquery(sq) => match sq.query.body {
                crate::ast::QueryNodeBody::Select(select) => assert_eq!(
                    vec![SelectExpr::Expr(Expr::Literal(Literal::Number(
                        "1".to_string()
                    )))],
                    select.projections
                ),
                other => panic!("unexpected query body: {other:?}"),
            },
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn table_function() {
        let node: FromNode = parse_ast("read_json('x')").unwrap();
        assert_eq!("table function", node.body.kind());
    }

    #[test]
    fn using_condition() {
        let node: FromNode = parse_ast("a JOIN b USING (id, name)").unwrap();
        match node.body {
            FromNodeBody::Join(join) => assert_eq!(
                JoinCondition::Using(vec![Ident::from_string("id"), Ident::from_string("name")]),
                join.join_condition
            ),
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
