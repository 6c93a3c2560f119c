use std::fmt;

use apiql_parser::ast::ObjectReference;

use crate::errors::RoutingError;

/// Identifiers locating a resource (or a method on a resource) within the
/// provider registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HierarchyIds {
    pub provider: String,
    pub service: String,
    pub resource: String,
    pub method: Option<String>,
}

impl HierarchyIds {
    /// Build identifiers for a table reference.
    ///
    /// Accepts `provider.service.resource`, or `service.resource` when a
    /// current provider is set.
    pub fn from_table_reference(
        reference: &ObjectReference,
        current_provider: Option<&str>,
    ) -> Result<Self, RoutingError> {
        validate_reference(reference)?;
        let parts: Vec<&str> = reference.parts().collect();

        match (parts.as_slice(), current_provider) {
            ([provider, service, resource], _) => Ok(HierarchyIds {
                provider: provider.to_string(),
                service: service.to_string(),
                resource: resource.to_string(),
                method: None,
            }),
            ([service, resource], Some(provider)) => Ok(HierarchyIds {
                provider: provider.to_string(),
                service: service.to_string(),
                resource: resource.to_string(),
                method: None,
            }),
            ([_, _], None) => Err(invalid(
                reference,
                "no provider selected, use a fully qualified name or USE <provider>",
            )),
            _ => Err(invalid(
                reference,
                "expected provider.service.resource or service.resource",
            )),
        }
    }

    /// Build identifiers for an EXEC method reference.
    ///
    /// Accepts `provider.service.resource.method`, or
    /// `service.resource.method` when a current provider is set.
    pub fn from_method_reference(
        reference: &ObjectReference,
        current_provider: Option<&str>,
    ) -> Result<Self, RoutingError> {
        let parts: Vec<&str> = reference.parts().collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid(reference, "empty identifier"));
        }

        match (parts.as_slice(), current_provider) {
            ([provider, service, resource, method], _) => Ok(HierarchyIds {
                provider: provider.to_string(),
                service: service.to_string(),
                resource: resource.to_string(),
                method: Some(method.to_string()),
            }),
            ([service, resource, method], Some(provider)) => Ok(HierarchyIds {
                provider: provider.to_string(),
                service: service.to_string(),
                resource: resource.to_string(),
                method: Some(method.to_string()),
            }),
            _ => Err(invalid(
                reference,
                "expected provider.service.resource.method",
            )),
        }
    }
}

impl fmt::Display for HierarchyIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.provider, self.service, self.resource)?;
        if let Some(method) = &self.method {
            write!(f, ".{method}")?;
        }
        Ok(())
    }
}

/// Check that a table reference is structurally usable before routing.
pub fn validate_reference(reference: &ObjectReference) -> Result<(), RoutingError> {
    if reference.0.is_empty() || reference.0.len() > 3 {
        return Err(invalid(reference, "expected between one and three identifiers"));
    }
    if reference.parts().any(|p| p.is_empty()) {
        return Err(invalid(reference, "empty identifier"));
    }
    Ok(())
}

fn invalid(reference: &ObjectReference, reason: &str) -> RoutingError {
    RoutingError::InvalidHierarchy {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}
