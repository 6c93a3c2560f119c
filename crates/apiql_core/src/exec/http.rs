//! Execution of statements as http requests against providers.

use std::collections::{BTreeMap, BTreeSet};

use apiql_parser::Statement;
use apiql_parser::ast::{Delete, Exec, Expr, Insert, ObjectReference, Update};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use super::catalog::InternalCatalog;
use super::eval::{constant_value, value_to_string};
use super::query::{QueryRunner, Relation, ScanRequest, TableScanner, equality_params};
use super::{QueryExecutor, QueryResult};
use crate::config::RuntimeConfig;
use crate::context::{AuthContext, HandlerContext};
use crate::errors::{ExecutionError, RoutingError};
use crate::registry::{Provider, Resource};
use crate::router::{HierarchyIds, RoutedStatement, RoutedTables, TableKind};

type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(HttpExecutor { client })
    }

    /// Send a request, returning the parsed json body.
    ///
    /// Empty bodies are returned as null.
    async fn send(
        &self,
        ctx: &HandlerContext,
        provider: &str,
        verb: &str,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value> {
        let method = Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
            .map_err(|_| ExecutionError::InvalidMethod(verb.to_string()))?;

        let mut builder = self.client.request(method, url);
        builder = match ctx.auth_context(provider)? {
            AuthContext::None => builder,
            AuthContext::Bearer { token } => builder.bearer_auth(token),
            AuthContext::ApiKey { header, key } => builder.header(header, key),
            AuthContext::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        };
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let request = builder.build()?;

        let log = ctx.http_log_enabled();
        if log {
            info!(method = %request.method(), url = %request.url(), "sending http request");
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        if log {
            info!(status = status.as_u16(), "received http response");
        }

        let text = response.text().await?;
        if status.as_u16() >= 300 {
            return Err(ExecutionError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn insert(&self, insert: &Insert, ctx: &HandlerContext) -> Result<QueryResult> {
        let target = resolve_target(&insert.table, ctx)?;

        let columns: Vec<String> = if insert.columns.is_empty() {
            target.resource.column_names()
        } else {
            insert.columns.iter().map(|c| c.value.clone()).collect()
        };
        if columns.is_empty() {
            return Err(ExecutionError::Evaluation(format!(
                "INSERT into '{}' requires a column list",
                insert.table
            )));
        }

        let mut count = 0;
        for row in &insert.rows {
            if row.len() != columns.len() {
                return Err(ExecutionError::Evaluation(format!(
                    "INSERT has {} columns but {} values",
                    columns.len(),
                    row.len()
                )));
            }

            let mut body = Map::new();
            for (column, expr) in columns.iter().zip(row) {
                body.insert(column.clone(), constant_value(expr)?);
            }
            let params: BTreeMap<String, Value> = body.clone().into_iter().collect();
            let (url, _) = build_url(target.provider, &target.resource.path, &params)?;

            self.send(
                ctx,
                &target.ids.provider,
                &target.resource.verbs.insert,
                url,
                Some(&Value::Object(body)),
            )
            .await?;
            count += 1;
        }

        Ok(QueryResult::ack(format!("INSERT {count}")))
    }

    async fn update(&self, update: &Update, ctx: &HandlerContext) -> Result<QueryResult> {
        let target = resolve_target(&update.table, ctx)?;
        let params = where_params(update.where_expr.as_ref(), &update.table);
        let (url, _) = build_url(target.provider, &target.resource.path, &params)?;

        let mut body = Map::new();
        for assignment in &update.assignments {
            body.insert(
                assignment.column.value.clone(),
                constant_value(&assignment.value)?,
            );
        }

        self.send(
            ctx,
            &target.ids.provider,
            &target.resource.verbs.update,
            url,
            Some(&Value::Object(body)),
        )
        .await?;
        Ok(QueryResult::ack("UPDATE 1"))
    }

    async fn delete(&self, delete: &Delete, ctx: &HandlerContext) -> Result<QueryResult> {
        let target = resolve_target(&delete.table, ctx)?;
        let params = where_params(delete.where_expr.as_ref(), &delete.table);
        let (url, _) = build_url(target.provider, &target.resource.path, &params)?;

        self.send(
            ctx,
            &target.ids.provider,
            &target.resource.verbs.delete,
            url,
            None,
        )
        .await?;
        Ok(QueryResult::ack("DELETE 1"))
    }

    async fn exec(
        &self,
        exec: &Exec,
        routes: &RoutedTables,
        ctx: &HandlerContext,
    ) -> Result<QueryResult> {
        let annotation = routes.annotation(exec.target.id).ok_or_else(|| {
            ExecutionError::Evaluation(format!("method '{}' was not routed", exec.target.method))
        })?;
        let ids = annotation
            .hierarchy
            .as_ref()
            .ok_or(ExecutionError::Routing(RoutingError::NilTable))?;
        let method_name = ids.method.as_deref().unwrap_or_default();

        let (provider, resource) = ctx
            .registry()
            .resource(&ids.provider, &ids.service, &ids.resource)
            .ok_or_else(|| unresolved(&exec.target.method, "unknown resource"))?;
        let (_, method) = resource
            .method(method_name)
            .ok_or_else(|| unresolved(&exec.target.method, "unknown method"))?;

        let path = method.path.as_deref().unwrap_or(&resource.path);
        let (url, _) = build_url(provider, path, &annotation.parameters)?;
        let body: Map<String, Value> = annotation
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let response = self
            .send(ctx, &ids.provider, &method.verb, url, Some(&Value::Object(body)))
            .await?;
        if response.is_null() {
            return Ok(QueryResult::ack("EXEC"));
        }
        let items = extract_items(response, None)?;
        Ok(Relation::from_json_items(&[], items).into_result())
    }
}

#[async_trait]
impl QueryExecutor for HttpExecutor {
    async fn execute(
        &self,
        stmt: &RoutedStatement<'_>,
        ctx: &HandlerContext,
    ) -> Result<QueryResult> {
        debug!(
            kind = stmt.statement.kind(),
            tables = stmt.routes.tables.len(),
            "executing statement over http"
        );
        match stmt.statement {
            Statement::Query(query) => QueryRunner::new(&stmt.routes, self, ctx).run(query).await,
            Statement::Insert(insert) => self.insert(insert, ctx).await,
            Statement::Update(update) => self.update(update, ctx).await,
            Statement::Delete(delete) => self.delete(delete, ctx).await,
            Statement::Exec(exec) => self.exec(exec, &stmt.routes, ctx).await,
            other => Err(ExecutionError::Unsupported(format!(
                "{} statements",
                other.kind()
            ))),
        }
    }
}

#[async_trait]
impl TableScanner for HttpExecutor {
    async fn scan(&self, request: ScanRequest<'_>, ctx: &HandlerContext) -> Result<Relation> {
        let hierarchy = match &request.meta.kind {
            TableKind::Resource { hierarchy } => hierarchy,
            TableKind::Internal { .. } => return InternalCatalog.scan(request, ctx).await,
            other => {
                return Err(ExecutionError::Unsupported(format!(
                    "scanning {other} table '{}'",
                    request.meta.display_name()
                )));
            }
        };

        let (provider, resource) = ctx
            .registry()
            .resource(&hierarchy.provider, &hierarchy.service, &hierarchy.resource)
            .ok_or_else(|| {
                ExecutionError::Routing(RoutingError::Unresolved {
                    reference: hierarchy.to_string(),
                    reason: "resource no longer exists".to_string(),
                })
            })?;

        let params = request.equality_params();
        let (mut url, mut used) = build_url(provider, &resource.path, &params)?;
        let appended = append_query_params(&mut url, resource, &params, &used);
        used.extend(appended);

        let body = self
            .send(ctx, &hierarchy.provider, &resource.verbs.select, url, None)
            .await?;
        let items = extract_items(body, resource.items_key.as_deref())?;
        let mut rel = Relation::from_json_items(&resource.column_names(), items);
        rel.add_parameter_columns(params.iter().filter(|(name, _)| used.contains(*name)));
        Ok(rel)
    }
}

struct Target<'a> {
    ids: HierarchyIds,
    provider: &'a Provider,
    resource: &'a Resource,
}

fn resolve_target<'a>(reference: &ObjectReference, ctx: &'a HandlerContext) -> Result<Target<'a>> {
    let current = ctx.current_provider();
    let ids = HierarchyIds::from_table_reference(reference, current.as_deref())?;
    let (provider, resource) = ctx
        .registry()
        .resource(&ids.provider, &ids.service, &ids.resource)
        .ok_or_else(|| unresolved(reference, "unknown resource"))?;
    Ok(Target {
        ids,
        provider,
        resource,
    })
}

fn unresolved(reference: &ObjectReference, reason: &str) -> ExecutionError {
    ExecutionError::Routing(RoutingError::Unresolved {
        reference: reference.to_string(),
        reason: reason.to_string(),
    })
}

fn where_params(where_expr: Option<&Expr>, table: &ObjectReference) -> BTreeMap<String, Value> {
    let qualifier = table.base().map(|ident| ident.as_str()).unwrap_or_default();
    match where_expr {
        Some(expr) => equality_params(&expr.conjuncts(), qualifier),
        None => BTreeMap::new(),
    }
}

/// Build the url for a path template, filling `{name}` placeholders from
/// params. Returns the url and the names of the params used.
pub fn build_url(
    provider: &Provider,
    template: &str,
    params: &BTreeMap<String, Value>,
) -> Result<(Url, BTreeSet<String>)> {
    let mut url = Url::parse(&provider.base_url)?;
    let mut used = BTreeSet::new();

    let mut segments = Vec::new();
    for segment in template.split('/').filter(|s| !s.is_empty()) {
        segments.push(fill_segment(segment, template, params, &mut used)?);
    }

    url.path_segments_mut()
        .map_err(|_| {
            ExecutionError::Unsupported(format!(
                "base url '{}' cannot have a path",
                provider.base_url
            ))
        })?
        .pop_if_empty()
        .extend(segments);

    Ok((url, used))
}

fn fill_segment(
    segment: &str,
    template: &str,
    params: &BTreeMap<String, Value>,
    used: &mut BTreeSet<String>,
) -> Result<String> {
    let mut out = String::new();
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);

        let name = &rest[start + 1..start + len];
        let (key, value) = params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .ok_or_else(|| ExecutionError::MissingParameter {
                param: name.to_string(),
                path: template.to_string(),
            })?;
        out.push_str(&value_to_string(value));
        used.insert(key.clone());

        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn append_query_params(
    url: &mut Url,
    resource: &Resource,
    params: &BTreeMap<String, Value>,
    used: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut appended = BTreeSet::new();
    let mut pairs = Vec::new();
    for name in &resource.query_params {
        let found = params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name) && !used.contains(*k));
        if let Some((key, value)) = found {
            pairs.push((name.as_str(), value_to_string(value)));
            appended.insert(key.clone());
        }
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    appended
}

/// Turn a response body into row items.
fn extract_items(body: Value, items_key: Option<&str>) -> Result<Vec<Value>> {
    match (body, items_key) {
        (Value::Null, _) => Ok(Vec::new()),
        (Value::Array(items), _) => Ok(items),
        (Value::Object(mut obj), Some(key)) => match obj.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Ok(vec![other]),
        },
        (other, _) => Ok(vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::testutil::test_registry;

    fn provider() -> Provider {
        test_registry().providers["github"].clone()
    }

    #[test]
    fn fills_path_template() {
        let params = BTreeMap::from([
            ("owner".to_string(), json!("acme")),
            ("Repo".to_string(), json!("my repo")),
            ("state".to_string(), json!("open")),
        ]);
        let (url, used) = build_url(&provider(), "/repos/{owner}/{repo}/issues", &params).unwrap();
        assert_eq!("http://127.0.0.1:1/repos/acme/my%20repo/issues", url.as_str());
        assert_eq!(
            BTreeSet::from(["Repo".to_string(), "owner".to_string()]),
            used
        );
    }

    #[test]
    fn missing_path_param() {
        let err = build_url(&provider(), "/orgs/{org}/repos", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingParameter { ref param, .. } if param == "org"));
    }

    #[test]
    fn query_params_appended() {
        let registry = test_registry();
        let (provider, resource) = registry.resource("github", "repos", "issues").unwrap();
        let params = BTreeMap::from([
            ("owner".to_string(), json!("a")),
            ("repo".to_string(), json!("b")),
            ("state".to_string(), json!("open")),
        ]);
        let (mut url, used) = build_url(provider, &resource.path, &params).unwrap();
        let appended = append_query_params(&mut url, resource, &params, &used);
        assert_eq!(Some("state=open"), url.query());
        assert_eq!(BTreeSet::from(["state".to_string()]), appended);
    }

    #[test]
    fn items_from_response() {
        assert_eq!(2, extract_items(json!([1, 2]), None).unwrap().len());
        assert_eq!(
            vec![json!({"a": 1})],
            extract_items(json!({"a": 1}), None).unwrap()
        );
        assert_eq!(
            vec![json!(1)],
            extract_items(json!({"items": [1], "total": 1}), Some("items")).unwrap()
        );
        assert!(extract_items(Value::Null, None).unwrap().is_empty());
    }
}
