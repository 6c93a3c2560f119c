//! Query evaluation over fetched tables.
//!
//! Each table reference is fetched through a [`TableScanner`]. Joins,
//! filters, grouping, ordering and set operations are then evaluated
//! locally on the fetched rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use apiql_parser::ast::{
    BinaryOperator, Expr, FromJoin, FromNode, FromNodeBody, JoinCondition, JoinType,
    LimitModifier, Literal, OrderByNode, QueryNode, QueryNodeBody, SelectExpr, SelectNode,
    SetOperation,
};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use super::QueryResult;
use super::eval::{
    compare, constant_value, contains_aggregate, eval_expr, eval_grouped, eval_predicate,
    literal_value, sort_cmp,
};
use crate::context::HandlerContext;
use crate::errors::ExecutionError;
use crate::router::RoutedTables;
use crate::router::meta::TableMeta;

type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        ColumnRef {
            qualifier: qualifier.map(|q| q.to_string()),
            name: name.into(),
        }
    }

    /// Check if a possibly qualified reference names this column. Columns
    /// without a qualifier match any qualifier.
    pub fn matches(&self, qualifier: Option<&str>, name: &str) -> bool {
        if !self.name.eq_ignore_ascii_case(name) {
            return false;
        }
        match (qualifier, &self.qualifier) {
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            _ => true,
        }
    }
}

/// An in-memory table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    pub columns: Vec<ColumnRef>,
    pub rows: Vec<Vec<Value>>,
}

impl Relation {
    /// Relation with no columns and one row, the input of a SELECT without
    /// FROM.
    pub fn single_empty_row() -> Self {
        Relation {
            columns: Vec::new(),
            rows: vec![Vec::new()],
        }
    }

    /// Build a relation from json items.
    ///
    /// Columns are taken from `known_columns` if not empty, otherwise from
    /// the keys of the items in order of first appearance. Items that aren't
    /// objects produce a single `value` column.
    pub fn from_json_items(known_columns: &[String], items: Vec<Value>) -> Self {
        let mut names: Vec<String> = known_columns.to_vec();
        if names.is_empty() {
            for item in &items {
                match item {
                    Value::Object(obj) => {
                        for key in obj.keys() {
                            if !names.contains(key) {
                                names.push(key.clone());
                            }
                        }
                    }
                    _ => {
                        if !names.iter().any(|n| n == "value") {
                            names.push("value".to_string());
                        }
                    }
                }
            }
        }

        let rows = items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut obj) => names
                    .iter()
                    .map(|name| obj.remove(name).unwrap_or(Value::Null))
                    .collect(),
                other => names
                    .iter()
                    .map(|name| if name == "value" { other.clone() } else { Value::Null })
                    .collect(),
            })
            .collect();

        Relation {
            columns: names.into_iter().map(|n| ColumnRef::new(None, n)).collect(),
            rows,
        }
    }

    /// Add a constant column for every request parameter the rows don't
    /// already carry, so predicates on parameters still match after the
    /// fetch.
    pub fn add_parameter_columns<'p>(
        &mut self,
        params: impl IntoIterator<Item = (&'p String, &'p Value)>,
    ) {
        for (name, value) in params {
            if self.columns.iter().any(|col| col.name.eq_ignore_ascii_case(name)) {
                continue;
            }
            self.columns.push(ColumnRef::new(None, name.clone()));
            for row in &mut self.rows {
                row.push(value.clone());
            }
        }
    }

    pub fn qualify(&mut self, qualifier: &str) {
        for col in &mut self.columns {
            col.qualifier = Some(qualifier.to_string());
        }
    }

    pub fn filter(&mut self, predicate: &Expr) -> Result<()> {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if eval_predicate(predicate, &self.columns, &row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    fn dedup(&mut self) {
        let mut unique: Vec<Vec<Value>> = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        self.rows = unique;
    }

    pub fn into_result(self) -> QueryResult {
        QueryResult::with_rows(
            self.columns.into_iter().map(|c| c.name).collect(),
            self.rows,
        )
    }
}

/// A request to fetch one table.
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub meta: &'a TableMeta,
    /// Name the table's columns are qualified with in the query.
    pub qualifier: &'a str,
    /// Conjuncts that may be used to narrow the fetch. Scanners are free to
    /// ignore them, rows are filtered again after scanning.
    pub filters: &'a [&'a Expr],
}

impl ScanRequest<'_> {
    pub fn equality_params(&self) -> BTreeMap<String, Value> {
        equality_params(self.filters, self.qualifier)
    }
}

/// Collect `column = constant` conjuncts referencing columns of the table
/// named `qualifier`. Unqualified columns are assumed to belong to it.
pub fn equality_params(filters: &[&Expr], qualifier: &str) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    for filter in filters {
        let Expr::BinaryExpr {
            left,
            op: BinaryOperator::Eq,
            right,
        } = filter
        else {
            continue;
        };

        let (column, value) = match (left.as_ref(), right.as_ref()) {
            (col, Expr::Literal(lit)) | (Expr::Literal(lit), col) => (col, lit),
            _ => continue,
        };

        let name = match column {
            Expr::Ident(ident) => ident.as_str(),
            Expr::CompoundIdent(idents) => match idents.as_slice() {
                [.., q, ident] if q.as_str().eq_ignore_ascii_case(qualifier) => ident.as_str(),
                [ident] => ident.as_str(),
                _ => continue,
            },
            _ => continue,
        };

        if matches!(value, Literal::Null) {
            continue;
        }
        params
            .entry(name.to_string())
            .or_insert_with(|| literal_value(value));
    }
    params
}

/// Fetches the rows of a single routed table.
#[async_trait]
pub trait TableScanner: Sync + Send {
    async fn scan(&self, request: ScanRequest<'_>, ctx: &HandlerContext) -> Result<Relation>;
}

/// Evaluates a query against routed tables.
pub struct QueryRunner<'a> {
    routes: &'a RoutedTables,
    scanner: &'a dyn TableScanner,
    ctx: &'a HandlerContext,
}

impl<'a> QueryRunner<'a> {
    pub fn new(
        routes: &'a RoutedTables,
        scanner: &'a dyn TableScanner,
        ctx: &'a HandlerContext,
    ) -> Self {
        QueryRunner {
            routes,
            scanner,
            ctx,
        }
    }

    pub async fn run(&self, query: &QueryNode) -> Result<QueryResult> {
        Ok(self.run_query(query).await?.into_result())
    }

    fn run_query<'b>(&'b self, query: &'b QueryNode) -> BoxFuture<'b, Result<Relation>> {
        async move {
            let mut rel = self.run_body(&query.body).await?;
            order_by(&mut rel, &query.order_by)?;
            apply_limit(&mut rel, &query.limit)?;
            Ok(rel)
        }
        .boxed()
    }

    fn run_body<'b>(&'b self, body: &'b QueryNodeBody) -> BoxFuture<'b, Result<Relation>> {
        async move {
            match body {
                QueryNodeBody::Select(select) => self.run_select(select).await,
                QueryNodeBody::Nested(query) => self.run_query(query).await,
                QueryNodeBody::Set {
                    left,
                    right,
                    operation,
                    all,
                } => {
                    let (left, right) =
                        futures::try_join!(self.run_body(left), self.run_body(right))?;
                    set_operation(left, right, *operation, *all)
                }
            }
        }
        .boxed()
    }

    async fn run_select(&self, select: &SelectNode) -> Result<Relation> {
        let where_conjuncts = match &select.where_expr {
            Some(expr) => expr.conjuncts(),
            None => Vec::new(),
        };

        let mut input = match &select.from {
            Some(from) => self.run_from(from, where_conjuncts).await?,
            None => Relation::single_empty_row(),
        };

        if let Some(where_expr) = &select.where_expr {
            input.filter(where_expr)?;
        }

        let grouped = !select.group_by.is_empty()
            || select.having.is_some()
            || select.projections.iter().any(|proj| match proj {
                SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                    contains_aggregate(expr)
                }
                _ => false,
            });

        let mut out = if grouped {
            project_grouped(select, input)?
        } else {
            project(&select.projections, &input)?
        };

        if select.distinct {
            out.dedup();
        }
        Ok(out)
    }

    fn run_from<'b>(
        &'b self,
        from: &'b FromNode,
        filters: Vec<&'b Expr>,
    ) -> BoxFuture<'b, Result<Relation>> {
        async move {
            match &from.body {
                FromNodeBody::BaseTable(table) => {
                    let meta = self.table(from)?;
                    let qualifier = match &from.alias {
                        Some(alias) => alias.as_str().to_string(),
                        None => table
                            .reference
                            .base()
                            .map(|ident| ident.as_str().to_string())
                            .map_err(|e| ExecutionError::Evaluation(e.to_string()))?,
                    };
                    trace!(
                        node_id = %from.id,
                        %qualifier,
                        filters = filters.len(),
                        "scanning table"
                    );
                    let request = ScanRequest {
                        meta: meta.as_ref(),
                        qualifier: &qualifier,
                        filters: &filters,
                    };
                    let mut rel = self.scanner.scan(request, self.ctx).await?;
                    rel.qualify(&qualifier);
                    Ok(rel)
                }
                FromNodeBody::Subquery(subquery) => {
                    let mut rel = self.run_query(&subquery.query).await?;
                    if let Some(alias) = &from.alias {
                        rel.qualify(alias.as_str());
                    }
                    Ok(rel)
                }
                FromNodeBody::TableFunction(_) => Err(ExecutionError::Unsupported(
                    "table functions".to_string(),
                )),
                FromNodeBody::Join(join) => self.run_join(join, filters).await,
            }
        }
        .boxed()
    }

    async fn run_join(&self, join: &FromJoin, filters: Vec<&Expr>) -> Result<Relation> {
        let on_conjuncts = match &join.join_condition {
            JoinCondition::On(expr) => expr.conjuncts(),
            _ => Vec::new(),
        };

        // The optional side of an outer join only sees its ON predicates.
        // The preserved side only sees predicates that apply after the join.
        let left_optional = self.is_hoistable(&join.left) || join.join_type.preserves_right();
        let right_optional = self.is_hoistable(&join.right) || join.join_type.preserves_left();
        let side_filters = |optional: bool, other_optional: bool| {
            match (optional, other_optional) {
                (true, true) => Vec::new(),
                (true, false) => on_conjuncts.clone(),
                (false, true) => filters.clone(),
                (false, false) => filters.iter().chain(on_conjuncts.iter()).copied().collect(),
            }
        };
        let left_filters = side_filters(left_optional, right_optional);
        let right_filters = side_filters(right_optional, left_optional);

        let (left, right) = futures::try_join!(
            self.run_from(&join.left, left_filters),
            self.run_from(&join.right, right_filters)
        )?;

        join_relations(left, right, join.join_type, &join.join_condition)
    }

    fn table(&self, from: &FromNode) -> Result<&'a Arc<TableMeta>> {
        self.routes.lookup(from.id).ok_or_else(|| {
            ExecutionError::Evaluation(format!("table for node {} was not routed", from.id))
        })
    }

    fn is_hoistable(&self, from: &FromNode) -> bool {
        match &from.body {
            FromNodeBody::Join(_) => false,
            _ => self
                .routes
                .lookup(from.id)
                .map(|meta| meta.is_on_clause_hoistable())
                .unwrap_or(false),
        }
    }
}

fn join_relations(
    left: Relation,
    right: Relation,
    join_type: JoinType,
    condition: &JoinCondition,
) -> Result<Relation> {
    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().cloned());

    // Natural joins compare every column name both sides have.
    let using: Option<Vec<String>> = match condition {
        JoinCondition::Using(idents) => {
            Some(idents.iter().map(|i| i.as_str().to_string()).collect())
        }
        _ if join_type.is_natural() => Some(
            left.columns
                .iter()
                .filter(|l| right.columns.iter().any(|r| r.name.eq_ignore_ascii_case(&l.name)))
                .map(|l| l.name.clone())
                .collect(),
        ),
        _ => None,
    };

    let row_matches = |l: &[Value], r: &[Value], row: &[Value]| -> Result<bool> {
        if let Some(names) = &using {
            for name in names {
                let lv = column_value(&left.columns, l, name)?;
                let rv = column_value(&right.columns, r, name)?;
                if compare(lv, rv) != Some(std::cmp::Ordering::Equal) {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        match condition {
            JoinCondition::On(expr) => eval_predicate(expr, &columns, row),
            _ => Ok(true),
        }
    };

    let keep_left = join_type.preserves_left();
    let keep_right = join_type.preserves_right();

    let mut pairs = Vec::new();
    let mut left_matched = vec![false; left.rows.len()];
    let mut right_matched = vec![false; right.rows.len()];
    for (li, l) in left.rows.iter().enumerate() {
        for (ri, r) in right.rows.iter().enumerate() {
            let mut row = l.clone();
            row.extend(r.iter().cloned());
            if row_matches(l, r, &row)? {
                left_matched[li] = true;
                right_matched[ri] = true;
                pairs.push(row);
            }
        }
    }

    let semi_anti = |rel: &Relation, matched: &[bool], want: bool| Relation {
        columns: rel.columns.clone(),
        rows: rel
            .rows
            .iter()
            .zip(matched)
            .filter(|(_, m)| **m == want)
            .map(|(row, _)| row.clone())
            .collect(),
    };

    match join_type {
        JoinType::LeftSemi => return Ok(semi_anti(&left, &left_matched, true)),
        JoinType::LeftAnti => return Ok(semi_anti(&left, &left_matched, false)),
        JoinType::RightSemi => return Ok(semi_anti(&right, &right_matched, true)),
        JoinType::RightAnti => return Ok(semi_anti(&right, &right_matched, false)),
        _ => (),
    }

    let mut rows = pairs;
    if keep_left {
        for (l, matched) in left.rows.iter().zip(&left_matched) {
            if !matched {
                let mut row = l.clone();
                row.extend(std::iter::repeat_n(Value::Null, right.columns.len()));
                rows.push(row);
            }
        }
    }
    if keep_right {
        for (r, matched) in right.rows.iter().zip(&right_matched) {
            if !matched {
                let mut row = vec![Value::Null; left.columns.len()];
                row.extend(r.iter().cloned());
                rows.push(row);
            }
        }
    }

    Ok(Relation { columns, rows })
}

fn column_value<'v>(columns: &[ColumnRef], row: &'v [Value], name: &str) -> Result<&'v Value> {
    columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(name))
        .and_then(|idx| row.get(idx))
        .ok_or_else(|| ExecutionError::Evaluation(format!("unknown join column '{name}'")))
}

enum ProjectionItem<'a> {
    Column(usize),
    Expr(&'a Expr),
}

fn project(projections: &[SelectExpr], input: &Relation) -> Result<Relation> {
    let mut items = Vec::new();
    let mut columns = Vec::new();

    for proj in projections {
        match proj {
            SelectExpr::Wildcard => {
                for (idx, col) in input.columns.iter().enumerate() {
                    items.push(ProjectionItem::Column(idx));
                    columns.push(col.clone());
                }
            }
            SelectExpr::QualifiedWildcard(reference) => {
                let qualifier = reference
                    .base()
                    .map_err(|e| ExecutionError::Evaluation(e.to_string()))?;
                let before = items.len();
                for (idx, col) in input.columns.iter().enumerate() {
                    let matches = col
                        .qualifier
                        .as_deref()
                        .is_some_and(|q| q.eq_ignore_ascii_case(qualifier.as_str()));
                    if matches {
                        items.push(ProjectionItem::Column(idx));
                        columns.push(col.clone());
                    }
                }
                if items.len() == before {
                    return Err(ExecutionError::Evaluation(format!(
                        "unknown table '{reference}'"
                    )));
                }
            }
            SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                let name = proj.output_name().unwrap_or_else(|| expr.to_string());
                items.push(ProjectionItem::Expr(expr));
                columns.push(ColumnRef::new(None, name));
            }
        }
    }

    let mut rows = Vec::with_capacity(input.rows.len());
    for row in &input.rows {
        let out = items
            .iter()
            .map(|item| match item {
                ProjectionItem::Column(idx) => Ok(row.get(*idx).cloned().unwrap_or(Value::Null)),
                ProjectionItem::Expr(expr) => eval_expr(expr, &input.columns, row),
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(out);
    }

    Ok(Relation { columns, rows })
}

fn project_grouped(select: &SelectNode, input: Relation) -> Result<Relation> {
    let mut groups: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();
    if select.group_by.is_empty() {
        groups.push((Vec::new(), input.rows));
    } else {
        for row in input.rows {
            let key = select
                .group_by
                .iter()
                .map(|expr| eval_expr(expr, &input.columns, &row))
                .collect::<Result<Vec<_>>>()?;
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }
    }

    let mut columns = Vec::new();
    for proj in &select.projections {
        match proj {
            SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                columns.push(ColumnRef::new(
                    None,
                    proj.output_name().unwrap_or_else(|| expr.to_string()),
                ));
            }
            SelectExpr::Wildcard | SelectExpr::QualifiedWildcard(_) => {
                return Err(ExecutionError::Evaluation(
                    "wildcards cannot be used with aggregates".to_string(),
                ));
            }
        }
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        if let Some(having) = &select.having {
            if eval_grouped(having, &input.columns, &group)? != Value::Bool(true) {
                continue;
            }
        }
        let out = select
            .projections
            .iter()
            .map(|proj| match proj {
                SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                    eval_grouped(expr, &input.columns, &group)
                }
                _ => Ok(Value::Null),
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(out);
    }

    Ok(Relation { columns, rows })
}

fn set_operation(
    left: Relation,
    right: Relation,
    operation: SetOperation,
    all: bool,
) -> Result<Relation> {
    if left.columns.len() != right.columns.len() {
        return Err(ExecutionError::Evaluation(format!(
            "set operation inputs have different column counts: {} and {}",
            left.columns.len(),
            right.columns.len()
        )));
    }

    let mut out = Relation {
        columns: left.columns,
        rows: Vec::new(),
    };
    match operation {
        SetOperation::Union => {
            out.rows = left.rows;
            out.rows.extend(right.rows);
        }
        SetOperation::Except => {
            out.rows = left
                .rows
                .into_iter()
                .filter(|row| !right.rows.contains(row))
                .collect();
        }
        SetOperation::Intersect => {
            out.rows = left
                .rows
                .into_iter()
                .filter(|row| right.rows.contains(row))
                .collect();
        }
    }

    if !all {
        out.dedup();
    }
    Ok(out)
}

fn order_by(rel: &mut Relation, order_by: &[OrderByNode]) -> Result<()> {
    if order_by.is_empty() {
        return Ok(());
    }

    let mut keyed = Vec::with_capacity(rel.rows.len());
    for row in rel.rows.drain(..) {
        let keys = order_by
            .iter()
            .map(|node| order_key(&node.expr, &rel.columns, &row))
            .collect::<Result<Vec<_>>>()?;
        keyed.push((keys, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (idx, node) in order_by.iter().enumerate() {
            let ord = sort_cmp(&a[idx], &b[idx]);
            let ord = if node.asc == Some(false) {
                ord.reverse()
            } else {
                ord
            };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    rel.rows = keyed.into_iter().map(|(_, row)| row).collect();
    Ok(())
}

/// `ORDER BY 2` orders by the second output column.
fn order_key(expr: &Expr, columns: &[ColumnRef], row: &[Value]) -> Result<Value> {
    if let Expr::Literal(Literal::Number(n)) = expr {
        if let Ok(pos) = n.parse::<usize>() {
            return match pos.checked_sub(1).and_then(|idx| row.get(idx)) {
                Some(val) => Ok(val.clone()),
                None => Err(ExecutionError::Evaluation(format!(
                    "ORDER BY position {pos} is out of range"
                ))),
            };
        }
    }
    eval_expr(expr, columns, row)
}

fn apply_limit(rel: &mut Relation, limit: &LimitModifier) -> Result<()> {
    let offset = match &limit.offset {
        Some(expr) => count_value(expr)?,
        None => 0,
    };
    let count = match &limit.limit {
        Some(expr) => count_value(expr)?,
        None => usize::MAX,
    };
    rel.rows = std::mem::take(&mut rel.rows)
        .into_iter()
        .skip(offset)
        .take(count)
        .collect();
    Ok(())
}

fn count_value(expr: &Expr) -> Result<usize> {
    let val = constant_value(expr)?;
    val.as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| ExecutionError::Evaluation(format!("expected a non-negative integer, got {val}")))
}
