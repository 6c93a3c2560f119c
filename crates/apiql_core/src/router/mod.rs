//! Resolution of table references to provider resources.

pub mod hierarchy;
pub mod meta;
pub mod param_router;
pub mod visitor;

use std::sync::Arc;

use apiql_parser::ast::{NodeId, QueryNode};
use apiql_parser::visitor::Accept;

pub use hierarchy::HierarchyIds;
pub use meta::{AnnotationCtx, AnnotationCtxMap, TableKind, TableMap, TableMeta};
pub use param_router::{ParameterRouter, StandardParameterRouter, TableRef};
pub use visitor::TableRouteVisitor;

use crate::context::HandlerContext;
use crate::errors::RoutingError;

/// Tables referenced by a statement.
#[derive(Debug, Clone, Default)]
pub struct RoutedTables {
    pub tables: TableMap,
    pub annotations: AnnotationCtxMap,
}

impl RoutedTables {
    /// Check if every referenced table is an internal catalog table. A
    /// statement without any tables is not internal.
    pub fn is_pg_internal_only(&self) -> bool {
        !self.tables.is_empty() && self.tables.values().all(|meta| meta.is_internal())
    }

    /// Find the table for a node, including tables inside subqueries.
    pub fn lookup(&self, id: NodeId) -> Option<&Arc<TableMeta>> {
        lookup_in(&self.tables, id)
    }

    pub fn annotation(&self, id: NodeId) -> Option<&AnnotationCtx> {
        self.annotations.get(&id)
    }
}

fn lookup_in(tables: &TableMap, id: NodeId) -> Option<&Arc<TableMeta>> {
    if let Some(meta) = tables.get(&id) {
        return Some(meta);
    }
    tables.values().find_map(|meta| match &meta.kind {
        TableKind::Subquery { tables, .. } => lookup_in(tables, id),
        _ => None,
    })
}

/// A parsed statement together with its routed tables.
#[derive(Debug)]
pub struct RoutedStatement<'a> {
    pub statement: &'a apiql_parser::Statement,
    pub routes: RoutedTables,
    /// Text of the statement.
    pub query: &'a str,
}

pub fn route_statement(
    statement: &apiql_parser::Statement,
    ctx: &HandlerContext,
) -> Result<RoutedTables, RoutingError> {
    let mut visitor = TableRouteVisitor::new(ctx);
    statement.accept(&mut visitor)?;
    Ok(visitor.into_routes())
}

pub fn route_query(query: &QueryNode, ctx: &HandlerContext) -> Result<RoutedTables, RoutingError> {
    let mut visitor = TableRouteVisitor::new(ctx);
    query.accept(&mut visitor)?;
    Ok(visitor.into_routes())
}
