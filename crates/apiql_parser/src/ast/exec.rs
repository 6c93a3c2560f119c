use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Expr, Ident, NodeId, ObjectReference};

/// `EXEC [/*+ hints */] <provider.service.resource.method> [@arg = <expr>, ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exec {
    pub hints: Vec<String>,
    pub target: ExecTarget,
}

impl AstParseable for Exec {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::EXEC)?;

        let mut hints = Vec::new();
        while let Some(Token::Hint(hint)) = parser.peek().map(|t| &t.token) {
            hints.push(hint.clone());
            parser.idx += 1;
        }

        let target = ExecTarget::parse(parser)?;
        Ok(Exec { hints, target })
    }
}

/// The method an EXEC statement invokes. Routed like a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub id: NodeId,
    pub method: ObjectReference,
    pub args: Vec<ExecArg>,
}

impl AstParseable for ExecTarget {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let method = ObjectReference::parse(parser)?;

        let args = if matches!(parser.peek().map(|t| &t.token), Some(Token::At)) {
            parser.parse_comma_separated(ExecArg::parse)?
        } else {
            Vec::new()
        };

        Ok(ExecTarget {
            id: parser.next_node_id(),
            method,
            args,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecArg {
    pub name: Ident,
    pub value: Expr,
}

impl AstParseable for ExecArg {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_token(&Token::At)?;
        let name = Ident::parse(parser)?;
        parser.expect_token(&Token::Eq)?;
        let value = Expr::parse(parser)?;
        Ok(ExecArg { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use crate::ast::testutil::parse_ast;
    use pretty_assertions::assert_eq;

    #[test]
    fn exec_with_args() {
        let exec: Exec =
            parse_ast("EXEC github.repos.repos.create @owner = 'me', @private = true").unwrap();
        let expected = Exec {
            hints: Vec::new(),
            target: ExecTarget {
                id: NodeId(0),
                method: ObjectReference::from_strings(["github", "repos", "repos", "create"]),
                args: vec![
                    ExecArg {
                        name: Ident::from_string("owner"),
                        value: Expr::Literal(Literal::SingleQuotedString("me".to_string())),
                    },
                    ExecArg {
                        name: Ident::from_string("private"),
                        value: Expr::Literal(Literal::Boolean(true)),
                    },
                ],
            },
        };
        assert_eq!(expected, exec);
    }

    #[test]
    fn exec_no_args() {
        let exec: Exec = parse_ast("EXEC /*+ AWAIT */ p.s.r.m").unwrap();
        assert_eq!(vec!["AWAIT".to_string()], exec.hints);
        assert!(exec.target.args.is_empty());
    }
}
