//! Catalog tables answered without contacting any provider.

use async_trait::async_trait;
use serde_json::json;

use super::query::{Relation, ScanRequest, TableScanner};
use crate::context::HandlerContext;
use crate::errors::ExecutionError;
use crate::registry::ProviderRegistry;
use crate::router::meta::TableKind;

pub const PG_CATALOG: &str = "pg_catalog";
pub const INFORMATION_SCHEMA: &str = "information_schema";

/// Internal tables as (schema, name) pairs.
const TABLES: &[(&str, &str)] = &[
    (INFORMATION_SCHEMA, "tables"),
    (PG_CATALOG, "pg_namespace"),
    (PG_CATALOG, "pg_type"),
];

/// Oid of the first namespace generated for a provider.
const FIRST_PROVIDER_OID: u64 = 16384;

const PG_TYPES: &[(u64, &str, i64)] = &[
    (16, "bool", 1),
    (20, "int8", 8),
    (23, "int4", 4),
    (25, "text", -1),
    (114, "json", -1),
    (701, "float8", 8),
    (1043, "varchar", -1),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct InternalCatalog;

impl InternalCatalog {
    pub fn is_internal_schema(schema: &str) -> bool {
        schema.eq_ignore_ascii_case(PG_CATALOG) || schema.eq_ignore_ascii_case(INFORMATION_SCHEMA)
    }

    /// Returns the canonical (schema, name) if the table exists.
    pub fn lookup(schema: &str, name: &str) -> Option<(&'static str, &'static str)> {
        TABLES
            .iter()
            .find(|(s, n)| s.eq_ignore_ascii_case(schema) && n.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn relation(
        &self,
        schema: &str,
        name: &str,
        registry: &ProviderRegistry,
    ) -> Result<Relation, ExecutionError> {
        let columns =
            |names: &[&str]| -> Vec<String> { names.iter().map(|n| n.to_string()).collect() };

        match Self::lookup(schema, name) {
            Some((INFORMATION_SCHEMA, "tables")) => {
                let mut items = Vec::new();
                for (schema, table) in TABLES {
                    items.push(json!({
                        "table_catalog": "apiql",
                        "table_schema": schema,
                        "table_name": table,
                        "table_type": "SYSTEM VIEW",
                    }));
                }
                for (provider_name, provider) in &registry.providers {
                    for (service_name, service) in &provider.services {
                        for resource_name in service.resources.keys() {
                            items.push(json!({
                                "table_catalog": provider_name,
                                "table_schema": service_name,
                                "table_name": resource_name,
                                "table_type": "BASE TABLE",
                            }));
                        }
                    }
                }
                Ok(Relation::from_json_items(
                    &columns(&["table_catalog", "table_schema", "table_name", "table_type"]),
                    items,
                ))
            }
            Some((PG_CATALOG, "pg_namespace")) => {
                let mut items = vec![
                    json!({"oid": 11, "nspname": PG_CATALOG}),
                    json!({"oid": 13000, "nspname": INFORMATION_SCHEMA}),
                ];
                for (idx, provider_name) in registry.providers.keys().enumerate() {
                    items.push(json!({
                        "oid": FIRST_PROVIDER_OID + idx as u64,
                        "nspname": provider_name,
                    }));
                }
                Ok(Relation::from_json_items(&columns(&["oid", "nspname"]), items))
            }
            Some((PG_CATALOG, "pg_type")) => {
                let items = PG_TYPES
                    .iter()
                    .map(|(oid, name, len)| json!({"oid": oid, "typname": name, "typlen": len}))
                    .collect();
                Ok(Relation::from_json_items(
                    &columns(&["oid", "typname", "typlen"]),
                    items,
                ))
            }
            _ => Err(ExecutionError::Evaluation(format!(
                "unknown internal table '{schema}.{name}'"
            ))),
        }
    }
}

#[async_trait]
impl TableScanner for InternalCatalog {
    async fn scan(
        &self,
        request: ScanRequest<'_>,
        ctx: &HandlerContext,
    ) -> Result<Relation, ExecutionError> {
        match &request.meta.kind {
            TableKind::Internal { schema, name } => self.relation(schema, name, ctx.registry()),
            other => Err(ExecutionError::Unsupported(format!(
                "scanning {other} table '{}' from the internal catalog",
                request.meta.display_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testutil::test_registry;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(
            Some((PG_CATALOG, "pg_type")),
            InternalCatalog::lookup("PG_CATALOG", "PG_TYPE")
        );
        assert_eq!(None, InternalCatalog::lookup("pg_catalog", "pg_class"));
        assert!(InternalCatalog::is_internal_schema("Information_Schema"));
    }

    #[test]
    fn tables_lists_registry_resources() {
        let rel = InternalCatalog
            .relation(INFORMATION_SCHEMA, "tables", &test_registry())
            .unwrap();
        let names: Vec<_> = rel
            .rows
            .iter()
            .filter(|row| row[3] == json!("BASE TABLE"))
            .map(|row| row[2].as_str().unwrap().to_string())
            .collect();
        assert_eq!(vec!["issues", "repos"], names);
    }

    #[test]
    fn namespaces_include_providers() {
        let rel = InternalCatalog
            .relation(PG_CATALOG, "pg_namespace", &test_registry())
            .unwrap();
        assert_eq!(3, rel.rows.len());
        assert_eq!(json!("github"), rel.rows[2][1]);
    }
}
