use apiql_parser::Statement;
use apiql_parser::ast::{
    BinaryOperator, Expr, FromJoin, FromNode, FromNodeBody, JoinCondition, JoinType,
    QueryNodeBody, UnaryOperator,
};
use apiql_parser::visitor::{Accept, AstNode, AstVisitor};
use tracing::{debug, trace};

use super::hierarchy::validate_reference;
use super::meta::{AnnotationCtxMap, TableMap};
use super::param_router::TableRef;
use super::RoutedTables;
use crate::context::HandlerContext;
use crate::errors::RoutingError;

/// Walks a statement, routing every table reference and recording which
/// tables sit on the optional side of an outer join.
///
/// The maps are only meaningful if the visit succeeded.
#[derive(Debug)]
pub struct TableRouteVisitor<'a> {
    ctx: &'a HandlerContext,
    tables: TableMap,
    annotations: AnnotationCtxMap,
}

impl<'a> TableRouteVisitor<'a> {
    pub fn new(ctx: &'a HandlerContext) -> Self {
        TableRouteVisitor {
            ctx,
            tables: TableMap::new(),
            annotations: AnnotationCtxMap::new(),
        }
    }

    pub fn tables(&self) -> &TableMap {
        &self.tables
    }

    pub fn annotations(&self) -> &AnnotationCtxMap {
        &self.annotations
    }

    pub fn into_routes(self) -> RoutedTables {
        RoutedTables {
            tables: self.tables,
            annotations: self.annotations,
        }
    }

    fn route_table(&mut self, table: TableRef<'_>) -> Result<(), RoutingError> {
        let node_id = table.node_id();
        let annotation = self.ctx.router().route(table, self.ctx)?;
        let meta = annotation.table.clone().ok_or(RoutingError::NilTable)?;
        trace!(%node_id, kind = %meta.kind, "routed table reference");

        self.tables.insert(node_id, meta);
        self.annotations.insert(node_id, annotation);
        Ok(())
    }

    fn visit_from(&mut self, from: &FromNode) -> Result<(), RoutingError> {
        match &from.body {
            FromNodeBody::BaseTable(table) => {
                validate_reference(&table.reference)?;
                self.route_table(TableRef::From(from))
            }
            FromNodeBody::Subquery(_) => self.route_table(TableRef::From(from)),
            FromNodeBody::TableFunction(_) => Err(RoutingError::UnsupportedTable(
                from.body.kind().to_string(),
            )),
            FromNodeBody::Join(join) => {
                join.left.accept(self)?;
                join.right.accept(self)?;
                join.join_condition.accept(self)?;
                self.hoist_join(join)
            }
        }
    }

    fn hoist_join(&mut self, join: &FromJoin) -> Result<(), RoutingError> {
        match join.join_type {
            JoinType::LeftOuter => self.mark_hoistable(&join.right, "right", join.join_type),
            JoinType::RightOuter => self.mark_hoistable(&join.left, "left", join.join_type),
            JoinType::Left
            | JoinType::Right
            | JoinType::Inner
            | JoinType::Straight
            | JoinType::Comma
            | JoinType::Cross
            | JoinType::NaturalLeft
            | JoinType::NaturalRight => Ok(()),
            JoinType::Full
            | JoinType::Natural
            | JoinType::LeftSemi
            | JoinType::LeftAnti
            | JoinType::RightSemi
            | JoinType::RightAnti => Err(RoutingError::UnknownJoinType(join.join_type.to_string())),
        }
    }

    fn mark_hoistable(
        &mut self,
        side: &FromNode,
        side_name: &'static str,
        join_type: JoinType,
    ) -> Result<(), RoutingError> {
        let meta = self
            .tables
            .get(&side.id)
            .ok_or_else(|| RoutingError::MissingJoinSide {
                side: side_name,
                join_type: join_type.to_string(),
            })?;
        debug!(node_id = %side.id, %join_type, "marking table as on clause hoistable");
        meta.set_on_clause_hoistable();
        Ok(())
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<(), RoutingError> {
        match expr {
            Expr::BinaryExpr {
                left,
                op: BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor,
                right,
            } => {
                left.accept(self)?;
                right.accept(self)
            }
            Expr::UnaryExpr {
                op: UnaryOperator::Not,
                expr,
            } => expr.accept(self),
            Expr::IsNull { expr, .. } | Expr::IsBool { expr, .. } => expr.accept(self),
            Expr::Nested(expr) => expr.accept(self),
            Expr::BinaryExpr { .. }
            | Expr::UnaryExpr { .. }
            | Expr::Ident(_)
            | Expr::CompoundIdent(_)
            | Expr::Literal(_)
            | Expr::InList { .. }
            | Expr::InSubquery { .. }
            | Expr::Between { .. }
            | Expr::Like { .. }
            | Expr::Function(_)
            | Expr::Tuple(_)
            | Expr::Subquery(_)
            | Expr::Exists { .. } => Ok(()),
        }
    }
}

impl AstVisitor for TableRouteVisitor<'_> {
    type Error = RoutingError;

    fn visit(&mut self, node: AstNode<'_>) -> Result<(), Self::Error> {
        match node {
            AstNode::Statement(stmt) => match stmt {
                Statement::Query(query) => query.accept(self),
                Statement::Insert(insert) => insert.accept(self),
                Statement::Update(update) => update.accept(self),
                Statement::Delete(delete) => delete.accept(self),
                Statement::Exec(exec) => exec.accept(self),
                Statement::Show(show) => show.accept(self),
                Statement::Describe(describe) => describe.accept(self),
                Statement::Explain(explain) => explain.accept(self),
                Statement::Use(use_stmt) => use_stmt.accept(self),
                Statement::SetVariable(set) => set.accept(self),
                Statement::Sleep(sleep) => sleep.accept(self),
                Statement::CreateTable(create) => create.accept(self),
                Statement::DropTable(drop) => drop.accept(self),
                Statement::Begin | Statement::Commit | Statement::Rollback => Ok(()),
            },
            AstNode::Query(query) => {
                query.body.accept(self)?;
                query.order_by.accept(self)?;
                query.limit.accept(self)
            }
            AstNode::QueryBody(body) => match body {
                QueryNodeBody::Select(select) => select.accept(self),
                QueryNodeBody::Nested(query) => query.accept(self),
                QueryNodeBody::Set { left, right, .. } => {
                    left.accept(self)?;
                    right.accept(self)
                }
            },
            AstNode::Select(select) => {
                self.visit(AstNode::Hints(&select.hints))?;
                select.projections.accept(self)?;
                select.from.accept(self)?;
                select.where_expr.accept(self)?;
                select.group_by.accept(self)?;
                select.having.accept(self)
            }
            AstNode::From(from) => self.visit_from(from),
            AstNode::JoinCondition(condition) => match condition {
                JoinCondition::On(expr) => expr.accept(self),
                JoinCondition::Using(_) | JoinCondition::None => Ok(()),
            },
            AstNode::Expr(expr) => self.visit_expr(expr),
            AstNode::Exec(exec) => {
                self.visit(AstNode::Hints(&exec.hints))?;
                exec.target.accept(self)
            }
            AstNode::ExecTarget(target) => self.route_table(TableRef::Exec(target)),
            AstNode::Explain(explain) => explain.body.accept(self),
            // DML targets are resolved when executing.
            AstNode::Insert(_) | AstNode::Update(_) | AstNode::Delete(_) => Ok(()),
            AstNode::Hints(_)
            | AstNode::SelectExpr(_)
            | AstNode::OrderBy(_)
            | AstNode::Limit(_)
            | AstNode::Show(_)
            | AstNode::Describe(_)
            | AstNode::Use(_)
            | AstNode::SetVariable(_)
            | AstNode::Sleep(_)
            | AstNode::CreateTable(_)
            | AstNode::DropTable(_)
            | AstNode::ObjectReference(_)
            | AstNode::Ident(_)
            | AstNode::Literal(_) => Ok(()),
        }
    }
}
