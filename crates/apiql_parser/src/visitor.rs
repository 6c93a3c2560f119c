//! Double dispatch over the AST.
//!
//! Every node type maps to exactly one `AstNode` variant. Visitors match on
//! `AstNode` and decide themselves which children to descend into.

use crate::ast::{
    CreateTable, Delete, Describe, DropTable, Exec, ExecTarget, Expr, FromNode, Ident, Insert,
    JoinCondition, LimitModifier, Literal, ObjectReference, OrderByNode, QueryNode, QueryNodeBody,
    SelectExpr, SelectNode, SetVariable, Show, Sleep, Update, Use,
};
use crate::statement::{ExplainNode, Statement};

#[derive(Debug, Clone, Copy)]
pub enum AstNode<'a> {
    Statement(&'a Statement),
    Query(&'a QueryNode),
    QueryBody(&'a QueryNodeBody),
    Select(&'a SelectNode),
    /// Optimizer hint comments of a SELECT or EXEC.
    Hints(&'a [String]),
    SelectExpr(&'a SelectExpr),
    From(&'a FromNode),
    JoinCondition(&'a JoinCondition),
    Expr(&'a Expr),
    OrderBy(&'a OrderByNode),
    Limit(&'a LimitModifier),
    Insert(&'a Insert),
    Update(&'a Update),
    Delete(&'a Delete),
    Exec(&'a Exec),
    ExecTarget(&'a ExecTarget),
    Show(&'a Show),
    Describe(&'a Describe),
    Explain(&'a ExplainNode),
    Use(&'a Use),
    SetVariable(&'a SetVariable),
    Sleep(&'a Sleep),
    CreateTable(&'a CreateTable),
    DropTable(&'a DropTable),
    ObjectReference(&'a ObjectReference),
    Ident(&'a Ident),
    Literal(&'a Literal),
}

pub trait AstVisitor {
    type Error;

    fn visit(&mut self, node: AstNode<'_>) -> Result<(), Self::Error>;
}

pub trait Accept {
    fn accept<V: AstVisitor>(&self, visitor: &mut V) -> Result<(), V::Error>;
}

macro_rules! impl_accept {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Accept for $ty {
                fn accept<V: AstVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
                    visitor.visit(AstNode::$variant(self))
                }
            }
        )*
    };
}

impl_accept!(
    Statement => Statement,
    QueryNode => Query,
    QueryNodeBody => QueryBody,
    SelectNode => Select,
    SelectExpr => SelectExpr,
    FromNode => From,
    JoinCondition => JoinCondition,
    Expr => Expr,
    OrderByNode => OrderBy,
    LimitModifier => Limit,
    Insert => Insert,
    Update => Update,
    Delete => Delete,
    Exec => Exec,
    ExecTarget => ExecTarget,
    Show => Show,
    Describe => Describe,
    ExplainNode => Explain,
    Use => Use,
    SetVariable => SetVariable,
    Sleep => Sleep,
    CreateTable => CreateTable,
    DropTable => DropTable,
    ObjectReference => ObjectReference,
    Ident => Ident,
    Literal => Literal,
);

impl<T: Accept> Accept for Option<T> {
    fn accept<V: AstVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        match self {
            Some(node) => node.accept(visitor),
            None => Ok(()),
        }
    }
}

impl<T: Accept> Accept for [T] {
    fn accept<V: AstVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for node in self {
            node.accept(visitor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    /// Records the order nodes are visited in, descending into queries.
    #[derive(Default)]
    struct Recorder {
        visited: Vec<String>,
    }

    impl AstVisitor for Recorder {
        type Error = String;

        fn visit(&mut self, node: AstNode<'_>) -> Result<(), Self::Error> {
            match node {
                AstNode::Statement(Statement::Query(query)) => query.accept(self),
                AstNode::Query(query) => {
                    self.visited.push("query".to_string());
                    query.body.accept(self)?;
                    query.order_by.accept(self)
                }
                AstNode::QueryBody(QueryNodeBody::Select(select)) => select.accept(self),
                AstNode::Select(select) => {
                    self.visit(AstNode::Hints(&select.hints))?;
                    select.projections.accept(self)?;
                    select.from.accept(self)?;
                    select.where_expr.accept(self)
                }
                AstNode::Hints(hints) => {
                    self.visited.push(format!("hints:{}", hints.len()));
                    Ok(())
                }
                AstNode::SelectExpr(_) => {
                    self.visited.push("projection".to_string());
                    Ok(())
                }
                AstNode::From(from) => {
                    self.visited.push(format!("from:{}", from.id));
                    Ok(())
                }
                AstNode::Expr(_) => {
                    self.visited.push("expr".to_string());
                    Ok(())
                }
                AstNode::OrderBy(_) => {
                    self.visited.push("order_by".to_string());
                    Ok(())
                }
                other => Err(format!("unexpected node: {other:?}")),
            }
        }
    }

    #[test]
    fn visit_order() {
        let stmt = parse_statement("SELECT a, b FROM t WHERE a = 1 ORDER BY b").unwrap();
        let mut recorder = Recorder::default();
        stmt.accept(&mut recorder).unwrap();
        assert_eq!(
            vec![
                "query",
                "hints:0",
                "projection",
                "projection",
                "from:#0",
                "expr",
                "order_by"
            ],
            recorder.visited
        );
    }

    #[test]
    fn visitor_errors_propagate() {
        let stmt = parse_statement("DELETE FROM t").unwrap();
        let mut recorder = Recorder::default();
        let err = stmt.accept(&mut recorder).unwrap_err();
        assert!(err.starts_with("unexpected node"), "{err}");
    }
}
