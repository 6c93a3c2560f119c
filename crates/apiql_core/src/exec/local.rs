//! Statements answered without contacting a provider.

use std::time::Duration;

use apiql_parser::ast::{Describe, ObjectReference, SetVariable, Show, ShowKind, Sleep, Use};
use serde_json::{Value, json};
use tracing::debug;

use super::QueryResult;
use super::eval::{constant_value, like_match, value_to_string};
use crate::config::SessionVars;
use crate::context::HandlerContext;
use crate::errors::{ExecutionError, RoutingError};
use crate::registry::{AuthConfig, Provider, Service};
use crate::router::{HierarchyIds, RoutedTables, TableKind};

type Result<T> = std::result::Result<T, ExecutionError>;

/// Rows of a SHOW, with the index of the column LIKE applies to.
struct Listing {
    columns: Vec<&'static str>,
    rows: Vec<Vec<Value>>,
    name_idx: usize,
}

impl Listing {
    fn into_result(self, like: Option<&str>) -> QueryResult {
        let rows = match like {
            Some(pattern) => self
                .rows
                .into_iter()
                .filter(|row| {
                    row.get(self.name_idx)
                        .is_some_and(|v| like_match(&value_to_string(v), pattern))
                })
                .collect(),
            None => self.rows,
        };
        QueryResult::with_rows(self.columns.iter().map(|c| c.to_string()).collect(), rows)
    }
}

pub fn show(show: &Show, ctx: &HandlerContext) -> Result<QueryResult> {
    let current = ctx.current_provider();
    let scope: Vec<&str> = match &show.from {
        Some(reference) => reference.parts().collect(),
        None => Vec::new(),
    };

    let listing = match &show.kind {
        ShowKind::Providers => {
            let rows = ctx
                .registry()
                .providers
                .iter()
                .map(|(name, provider)| {
                    let mut row = vec![json!(name), json!(provider.base_url)];
                    if show.extended {
                        row.push(json!(auth_kind(provider)));
                    }
                    row
                })
                .collect();
            let mut columns = vec!["provider", "base_url"];
            if show.extended {
                columns.push("auth");
            }
            Listing {
                columns,
                rows,
                name_idx: 0,
            }
        }
        ShowKind::Services => {
            let provider_name = match scope.as_slice() {
                [provider] => *provider,
                [] => current.as_deref().ok_or_else(no_provider)?,
                _ => return Err(invalid_scope(show)),
            };
            let (provider_name, provider) = lookup_provider(ctx, provider_name)?;
            let rows = provider
                .services
                .iter()
                .map(|(name, service)| {
                    let mut row = vec![json!(provider_name), json!(name)];
                    if show.extended {
                        row.push(json!(service.description.as_deref().unwrap_or_default()));
                    }
                    row
                })
                .collect();
            let mut columns = vec!["provider", "service"];
            if show.extended {
                columns.push("description");
            }
            Listing {
                columns,
                rows,
                name_idx: 1,
            }
        }
        ShowKind::Resources => {
            let services: Vec<(&str, &str, &Service)> = match (scope.as_slice(), &current) {
                ([provider, service], _) => {
                    let (provider_name, provider) = lookup_provider(ctx, provider)?;
                    let (service_name, service) = lookup_service(provider, service)?;
                    vec![(provider_name, service_name, service)]
                }
                // With a current provider a single name is one of its services.
                ([service], Some(current)) => {
                    let (provider_name, provider) = lookup_provider(ctx, current)?;
                    let (service_name, service) = lookup_service(provider, service)?;
                    vec![(provider_name, service_name, service)]
                }
                ([provider], None) => all_services(lookup_provider(ctx, provider)?),
                ([], Some(current)) => all_services(lookup_provider(ctx, current)?),
                ([], None) => return Err(no_provider()),
                _ => return Err(invalid_scope(show)),
            };

            let mut rows = Vec::new();
            for (provider_name, service_name, service) in services {
                for (name, resource) in &service.resources {
                    let mut row = vec![json!(provider_name), json!(service_name), json!(name)];
                    if show.extended {
                        row.push(json!(resource.path));
                    }
                    rows.push(row);
                }
            }
            let mut columns = vec!["provider", "service", "resource"];
            if show.extended {
                columns.push("path");
            }
            Listing {
                columns,
                rows,
                name_idx: 2,
            }
        }
        ShowKind::Methods => {
            let reference = show.from.as_ref().ok_or_else(|| {
                ExecutionError::Evaluation("SHOW METHODS requires IN <resource>".to_string())
            })?;
            let ids = HierarchyIds::from_table_reference(reference, current.as_deref())?;
            let (_, resource) = ctx
                .registry()
                .resource(&ids.provider, &ids.service, &ids.resource)
                .ok_or_else(|| unresolved(reference, "unknown resource"))?;

            let rows = resource
                .methods
                .iter()
                .map(|(name, method)| {
                    let mut row = vec![json!(name), json!(method.verb)];
                    if show.extended {
                        row.push(json!(method.path.as_deref().unwrap_or(&resource.path)));
                    }
                    row
                })
                .collect();
            let mut columns = vec!["method", "verb"];
            if show.extended {
                columns.push("path");
            }
            Listing {
                columns,
                rows,
                name_idx: 0,
            }
        }
        ShowKind::Variable(reference) => {
            let name = reference.to_string();
            if !name.eq_ignore_ascii_case("all") {
                let value = ctx.get_variable(&name)?;
                return Ok(QueryResult::with_rows(vec![name], vec![vec![value]]));
            }

            let rows = SessionVars::settings()
                .into_iter()
                .map(|(name, description)| {
                    Ok(vec![json!(name), ctx.get_variable(name)?, json!(description)])
                })
                .collect::<Result<Vec<_>>>()?;
            Listing {
                columns: vec!["name", "setting", "description"],
                rows,
                name_idx: 0,
            }
        }
    };

    Ok(listing.into_result(show.like.as_deref()))
}

pub fn describe(describe: &Describe, ctx: &HandlerContext) -> Result<QueryResult> {
    let current = ctx.current_provider();
    let ids = HierarchyIds::from_table_reference(&describe.reference, current.as_deref())?;
    let (_, resource) = ctx
        .registry()
        .resource(&ids.provider, &ids.service, &ids.resource)
        .ok_or_else(|| unresolved(&describe.reference, "unknown resource"))?;

    let rows = resource
        .columns
        .iter()
        .map(|col| {
            let mut row = vec![json!(col.name()), json!(col.data_type())];
            if describe.extended {
                row.push(json!(col.description()));
            }
            row
        })
        .collect();

    let mut columns = vec!["column_name".to_string(), "data_type".to_string()];
    if describe.extended {
        columns.push("description".to_string());
    }
    Ok(QueryResult::with_rows(columns, rows))
}

/// Render the routing decisions made for a statement.
pub fn explain(routes: &RoutedTables) -> QueryResult {
    let mut rows = Vec::new();
    collect_explain_rows(&routes.tables, &mut rows);
    QueryResult::with_rows(
        ["node_id", "table", "kind", "alias", "on_clause_hoistable"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rows,
    )
}

fn collect_explain_rows(tables: &crate::router::TableMap, rows: &mut Vec<Vec<Value>>) {
    for (node_id, meta) in tables {
        rows.push(vec![
            json!(node_id.0),
            json!(meta.display_name()),
            json!(meta.kind.to_string()),
            meta.alias.as_ref().map(|a| json!(a)).unwrap_or(Value::Null),
            json!(meta.is_on_clause_hoistable()),
        ]);
        if let TableKind::Subquery { tables, .. } = &meta.kind {
            collect_explain_rows(tables, rows);
        }
    }
}

pub fn use_provider(use_stmt: &Use, ctx: &HandlerContext) -> Result<QueryResult> {
    ctx.use_provider(use_stmt.provider.as_str())?;
    Ok(QueryResult::ack("USE"))
}

pub fn set_variable(set: &SetVariable, ctx: &HandlerContext) -> Result<QueryResult> {
    let value = match &set.value {
        // `SET application_name = cli` reads as a bare word.
        apiql_parser::ast::Expr::Ident(ident) => Value::String(ident.value.clone()),
        expr => constant_value(expr)?,
    };
    let name = set.reference.to_string();
    debug!(%name, %value, "setting session variable");
    ctx.set_variable(&name, &value)?;
    Ok(QueryResult::ack("SET"))
}

/// Sleep for a number of milliseconds.
pub async fn sleep(sleep: &Sleep) -> Result<QueryResult> {
    let value = constant_value(&sleep.duration)?;
    let millis = value.as_u64().ok_or_else(|| {
        ExecutionError::Evaluation(format!(
            "SLEEP expects a non-negative number of milliseconds, got {value}"
        ))
    })?;
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Ok(QueryResult::ack("SLEEP"))
}

fn auth_kind(provider: &Provider) -> &'static str {
    match provider.auth {
        AuthConfig::None => "none",
        AuthConfig::Bearer { .. } => "bearer",
        AuthConfig::ApiKey { .. } => "api_key",
        AuthConfig::Basic { .. } => "basic",
    }
}

fn all_services<'a>(
    (provider_name, provider): (&'a str, &'a Provider),
) -> Vec<(&'a str, &'a str, &'a Service)> {
    provider
        .services
        .iter()
        .map(|(name, service)| (provider_name, name.as_str(), service))
        .collect()
}

fn lookup_provider<'a>(ctx: &'a HandlerContext, name: &str) -> Result<(&'a str, &'a Provider)> {
    ctx.registry()
        .provider(name)
        .ok_or_else(|| ExecutionError::UnknownProvider(name.to_string()))
}

fn lookup_service<'a>(provider: &'a Provider, name: &str) -> Result<(&'a str, &'a Service)> {
    provider
        .service(name)
        .ok_or_else(|| ExecutionError::Evaluation(format!("unknown service '{name}'")))
}

fn no_provider() -> ExecutionError {
    ExecutionError::Evaluation(
        "no provider selected, use IN <provider> or USE <provider>".to_string(),
    )
}

fn invalid_scope(show: &Show) -> ExecutionError {
    let scope = show
        .from
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_default();
    ExecutionError::Evaluation(format!("invalid scope '{scope}' for SHOW {}", show.kind))
}

fn unresolved(reference: &ObjectReference, reason: &str) -> ExecutionError {
    ExecutionError::Routing(RoutingError::Unresolved {
        reference: reference.to_string(),
        reason: reason.to_string(),
    })
}
