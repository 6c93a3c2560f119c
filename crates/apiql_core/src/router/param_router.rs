use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use apiql_parser::ast::{ExecTarget, FromNode, FromNodeBody, NodeId, ObjectReference};
use tracing::debug;

use super::hierarchy::HierarchyIds;
use super::meta::{AnnotationCtx, TableKind, TableMeta};
use super::route_query;
use crate::context::HandlerContext;
use crate::errors::RoutingError;
use crate::exec::catalog::InternalCatalog;
use crate::exec::eval::constant_value;
use crate::registry::ProviderRegistry;

/// A node that references a table.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    From(&'a FromNode),
    Exec(&'a ExecTarget),
}

impl TableRef<'_> {
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::From(from) => from.id,
            Self::Exec(target) => target.id,
        }
    }
}

/// Resolves a single table reference.
pub trait ParameterRouter: Debug + Sync + Send {
    fn route(&self, table: TableRef<'_>, ctx: &HandlerContext)
    -> Result<AnnotationCtx, RoutingError>;
}

/// Routes table references against a provider registry.
#[derive(Debug)]
pub struct StandardParameterRouter {
    registry: Arc<ProviderRegistry>,
}

impl StandardParameterRouter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        StandardParameterRouter { registry }
    }

    fn route_base_table(
        &self,
        from: &FromNode,
        reference: &ObjectReference,
        ctx: &HandlerContext,
    ) -> Result<AnnotationCtx, RoutingError> {
        let alias = from.alias.as_ref().map(|a| a.value.clone());
        let parts: Vec<&str> = reference.parts().collect();

        if let [schema, name] = parts.as_slice() {
            if InternalCatalog::is_internal_schema(schema) {
                let (schema, name) = InternalCatalog::lookup(schema, name).ok_or_else(|| {
                    RoutingError::Unresolved {
                        reference: reference.to_string(),
                        reason: "no such catalog table".to_string(),
                    }
                })?;
                debug!(node_id = %from.id, %schema, %name, "routed internal table");
                let meta = TableMeta::new(
                    TableKind::Internal {
                        schema: schema.to_string(),
                        name: name.to_string(),
                    },
                    alias,
                );
                return Ok(AnnotationCtx::new(from.id, Arc::new(meta)));
            }
        }

        let current = ctx.current_provider();
        let ids = HierarchyIds::from_table_reference(reference, current.as_deref())?;
        let hierarchy = self.resolve(reference, ids)?;
        debug!(node_id = %from.id, %hierarchy, "routed resource");

        let meta = TableMeta::new(TableKind::Resource { hierarchy }, alias);
        Ok(AnnotationCtx::new(from.id, Arc::new(meta)))
    }

    fn route_subquery(
        &self,
        from: &FromNode,
        query: &apiql_parser::ast::QueryNode,
        ctx: &HandlerContext,
    ) -> Result<AnnotationCtx, RoutingError> {
        let routes = route_query(query, ctx)?;
        let internal_only = routes.is_pg_internal_only();
        debug!(node_id = %from.id, %internal_only, tables = routes.tables.len(), "routed subquery");

        let meta = TableMeta::new(
            TableKind::Subquery {
                internal_only,
                tables: routes.tables,
            },
            from.alias.as_ref().map(|a| a.value.clone()),
        );
        Ok(AnnotationCtx::new(from.id, Arc::new(meta)))
    }

    fn route_exec(
        &self,
        target: &ExecTarget,
        ctx: &HandlerContext,
    ) -> Result<AnnotationCtx, RoutingError> {
        let current = ctx.current_provider();
        let ids = HierarchyIds::from_method_reference(&target.method, current.as_deref())?;
        let hierarchy = self.resolve(&target.method, ids)?;

        let mut parameters = BTreeMap::new();
        for arg in &target.args {
            let value = constant_value(&arg.value).map_err(|e| RoutingError::Unresolved {
                reference: target.method.to_string(),
                reason: format!("argument @{}: {e}", arg.name),
            })?;
            parameters.insert(arg.name.value.clone(), value);
        }
        debug!(node_id = %target.id, %hierarchy, args = parameters.len(), "routed method");

        let meta = TableMeta::new(TableKind::Method { hierarchy }, None);
        Ok(AnnotationCtx::new(target.id, Arc::new(meta)).with_parameters(parameters))
    }

    /// Check the identifiers against the registry, returning them with the
    /// registry's spelling.
    fn resolve(
        &self,
        reference: &ObjectReference,
        ids: HierarchyIds,
    ) -> Result<HierarchyIds, RoutingError> {
        let unresolved = |reason: String| RoutingError::Unresolved {
            reference: reference.to_string(),
            reason,
        };

        let (provider_name, provider) = self
            .registry
            .provider(&ids.provider)
            .ok_or_else(|| unresolved(format!("unknown provider '{}'", ids.provider)))?;
        let (service_name, service) = provider
            .service(&ids.service)
            .ok_or_else(|| unresolved(format!("unknown service '{}'", ids.service)))?;
        let (resource_name, resource) = service
            .resource(&ids.resource)
            .ok_or_else(|| unresolved(format!("unknown resource '{}'", ids.resource)))?;

        let method = match &ids.method {
            Some(method) => {
                let (method_name, _) = resource
                    .method(method)
                    .ok_or_else(|| unresolved(format!("unknown method '{method}'")))?;
                Some(method_name.to_string())
            }
            None => None,
        };

        Ok(HierarchyIds {
            provider: provider_name.to_string(),
            service: service_name.to_string(),
            resource: resource_name.to_string(),
            method,
        })
    }
}

impl ParameterRouter for StandardParameterRouter {
    fn route(
        &self,
        table: TableRef<'_>,
        ctx: &HandlerContext,
    ) -> Result<AnnotationCtx, RoutingError> {
        match table {
            TableRef::From(from) => match &from.body {
                FromNodeBody::BaseTable(base) => self.route_base_table(from, &base.reference, ctx),
                FromNodeBody::Subquery(subquery) => self.route_subquery(from, &subquery.query, ctx),
                other => Err(RoutingError::UnsupportedTable(other.kind().to_string())),
            },
            TableRef::Exec(target) => self.route_exec(target, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use apiql_parser::Statement;
    use apiql_parser::parse_statement;
    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::exec::testutil::NoopExecutor;
    use crate::registry::testutil::test_registry;
    use crate::router::route_statement;

    fn test_context() -> HandlerContext {
        HandlerContext::new(
            RuntimeConfig::default(),
            Arc::new(test_registry()),
            Arc::new(NoopExecutor),
        )
    }

    #[test]
    fn routes_fully_qualified_resource() {
        let ctx = test_context();
        let stmt = parse_statement("SELECT * FROM GitHub.repos.issues i").unwrap();
        let routes = route_statement(&stmt, &ctx).unwrap();

        let meta = routes.lookup(NodeId(0)).unwrap();
        assert_eq!(Some("i".to_string()), meta.alias);
        assert_eq!("github.repos.issues", meta.hierarchy().unwrap().to_string());
        assert!(!routes.is_pg_internal_only());
    }

    #[test]
    fn two_part_reference_needs_provider() {
        let ctx = test_context();
        let stmt = parse_statement("SELECT * FROM repos.issues").unwrap();
        let err = route_statement(&stmt, &ctx).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidHierarchy { .. }), "{err}");

        ctx.use_provider("github").unwrap();
        route_statement(&stmt, &ctx).unwrap();
    }

    #[test]
    fn unknown_resource() {
        let ctx = test_context();
        let stmt = parse_statement("SELECT * FROM github.repos.pulls").unwrap();
        let err = route_statement(&stmt, &ctx).unwrap_err();
        assert!(matches!(err, RoutingError::Unresolved { .. }), "{err}");
    }

    #[test]
    fn internal_catalog_tables() {
        let ctx = test_context();
        let stmt = parse_statement(
            "SELECT n.nspname FROM pg_catalog.pg_namespace n JOIN (SELECT * FROM information_schema.tables) t ON n.nspname = t.table_catalog",
        )
        .unwrap();
        let routes = route_statement(&stmt, &ctx).unwrap();
        assert!(routes.is_pg_internal_only());

        let stmt = parse_statement("SELECT * FROM pg_catalog.pg_class").unwrap();
        route_statement(&stmt, &ctx).unwrap_err();
    }

    #[test]
    fn subquery_with_remote_table_is_not_internal() {
        let ctx = test_context();
        let stmt = parse_statement(
            "SELECT * FROM pg_catalog.pg_type, (SELECT * FROM github.repos.issues) s",
        )
        .unwrap();
        let routes = route_statement(&stmt, &ctx).unwrap();
        assert!(!routes.is_pg_internal_only());
        // Inner table is reachable through the subquery.
        assert!(routes.lookup(NodeId(1)).unwrap().hierarchy().is_some());
    }

    #[test]
    fn exec_arguments_become_parameters() {
        let ctx = test_context();
        let stmt =
            parse_statement("EXEC github.repos.repos.create @org = 'acme', @name = 'x' || 'y'")
                .unwrap();
        let target_id = match &stmt {
            Statement::Exec(exec) => exec.target.id,
            other => panic!("unexpected statement: {other:?}"),
        };
        let routes = route_statement(&stmt, &ctx).unwrap();
        let annotation = routes.annotation(target_id).unwrap();
        assert_eq!(Some(&json!("acme")), annotation.parameters.get("org"));
        assert_eq!(Some(&json!("xy")), annotation.parameters.get("name"));
    }

    #[test]
    fn table_functions_unsupported() {
        let ctx = test_context();
        let stmt = parse_statement("SELECT * FROM read_json('x')").unwrap();
        let err = route_statement(&stmt, &ctx).unwrap_err();
        assert_eq!(RoutingError::UnsupportedTable("table function".to_string()), err);
    }
}
