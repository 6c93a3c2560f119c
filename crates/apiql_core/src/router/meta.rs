use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use apiql_parser::ast::NodeId;
use serde_json::Value;

use super::hierarchy::HierarchyIds;

/// Routed tables keyed by the id of the node referencing them.
pub type TableMap = BTreeMap<NodeId, Arc<TableMeta>>;

/// Annotations keyed by node id. Covers every key of the matching
/// [`TableMap`].
pub type AnnotationCtxMap = BTreeMap<NodeId, AnnotationCtx>;

#[derive(Debug, Clone)]
pub enum TableKind {
    /// A resource served by a provider.
    Resource { hierarchy: HierarchyIds },
    /// A method invoked with EXEC.
    Method { hierarchy: HierarchyIds },
    /// A catalog table answered locally.
    Internal { schema: String, name: String },
    /// A subquery in a FROM clause, routed separately.
    Subquery { internal_only: bool, tables: TableMap },
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource { .. } => write!(f, "resource"),
            Self::Method { .. } => write!(f, "method"),
            Self::Internal { .. } => write!(f, "internal"),
            Self::Subquery { .. } => write!(f, "subquery"),
        }
    }
}

/// Back-end description of a single table reference.
#[derive(Debug)]
pub struct TableMeta {
    pub kind: TableKind,
    pub alias: Option<String>,
    on_clause_hoistable: AtomicBool,
}

impl TableMeta {
    pub fn new(kind: TableKind, alias: Option<String>) -> Self {
        TableMeta {
            kind,
            alias,
            on_clause_hoistable: AtomicBool::new(false),
        }
    }

    pub fn is_internal(&self) -> bool {
        match &self.kind {
            TableKind::Internal { .. } => true,
            TableKind::Subquery { internal_only, .. } => *internal_only,
            _ => false,
        }
    }

    /// Mark the table as the optional side of an outer join. Predicates in
    /// the join's ON clause may then only be applied while joining.
    pub fn set_on_clause_hoistable(&self) {
        self.on_clause_hoistable.store(true, Ordering::Relaxed);
    }

    pub fn is_on_clause_hoistable(&self) -> bool {
        self.on_clause_hoistable.load(Ordering::Relaxed)
    }

    pub fn hierarchy(&self) -> Option<&HierarchyIds> {
        match &self.kind {
            TableKind::Resource { hierarchy } | TableKind::Method { hierarchy } => Some(hierarchy),
            _ => None,
        }
    }

    /// Name used to qualify columns coming from this table.
    pub fn display_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.kind {
            TableKind::Resource { hierarchy } | TableKind::Method { hierarchy } => {
                hierarchy.to_string()
            }
            TableKind::Internal { schema, name } => format!("{schema}.{name}"),
            TableKind::Subquery { .. } => "subquery".to_string(),
        }
    }
}

/// Result of routing a single table reference.
#[derive(Debug, Clone)]
pub struct AnnotationCtx {
    pub node_id: NodeId,
    /// Resolved table. Routers may leave this unset, which the visitor
    /// rejects.
    pub table: Option<Arc<TableMeta>>,
    pub hierarchy: Option<HierarchyIds>,
    /// Constant parameters known at routing time, e.g. EXEC arguments.
    pub parameters: BTreeMap<String, Value>,
}

impl AnnotationCtx {
    pub fn new(node_id: NodeId, table: Arc<TableMeta>) -> Self {
        let hierarchy = table.hierarchy().cloned();
        AnnotationCtx {
            node_id,
            table: Some(table),
            hierarchy,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}
