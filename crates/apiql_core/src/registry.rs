//! Provider registry describing the REST back-ends queries are routed to.
//!
//! A registry is a tree of providers, services and resources loaded from
//! json:
//!
//! ```json
//! {
//!   "providers": {
//!     "github": {
//!       "base_url": "https://api.github.com",
//!       "auth": { "type": "bearer", "token_env": "GITHUB_TOKEN" },
//!       "services": {
//!         "repos": {
//!           "resources": {
//!             "issues": {
//!               "path": "/repos/{owner}/{repo}/issues",
//!               "columns": ["id", "title", "state"]
//!             }
//!           }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistry {
    #[serde(default)]
    pub providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    pub fn from_json(s: &str) -> Result<Self, RegistryError> {
        let registry: ProviderRegistry = serde_json::from_str(s)?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Look up a provider, ignoring ascii case.
    pub fn provider(&self, name: &str) -> Option<(&str, &Provider)> {
        lookup(&self.providers, name)
    }

    /// Look up a resource by its provider, service and resource names.
    pub fn resource(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Option<(&Provider, &Resource)> {
        let (_, provider) = self.provider(provider)?;
        let (_, service) = provider.service(service)?;
        let (_, resource) = service.resource(resource)?;
        Some((provider, resource))
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for (provider_name, provider) in &self.providers {
            url::Url::parse(&provider.base_url).map_err(|e| {
                RegistryError::Invalid(format!(
                    "provider '{provider_name}' has an invalid base_url '{}': {e}",
                    provider.base_url
                ))
            })?;

            for (service_name, service) in &provider.services {
                for (resource_name, resource) in &service.resources {
                    if !resource.path.starts_with('/') {
                        return Err(RegistryError::Invalid(format!(
                            "resource '{provider_name}.{service_name}.{resource_name}' path must start with '/'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

impl Provider {
    pub fn service(&self, name: &str) -> Option<(&str, &Service)> {
        lookup(&self.services, name)
    }
}

/// How requests to a provider are authenticated.
///
/// Secrets are never stored in the registry, only the names of environment
/// variables holding them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token_env: String,
    },
    ApiKey {
        header: String,
        key_env: String,
    },
    Basic {
        username_env: String,
        password_env: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
}

impl Service {
    pub fn resource(&self, name: &str) -> Option<(&str, &Resource)> {
        lookup(&self.resources, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Path template relative to the provider's base url. `{name}`
    /// placeholders are filled from query predicates.
    pub path: String,
    #[serde(default)]
    pub verbs: VerbMap,
    /// Known columns. When empty, columns are taken from the response.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Predicates on these columns are sent as url query parameters.
    #[serde(default)]
    pub query_params: Vec<String>,
    /// Key of the array holding rows when the response is an object.
    #[serde(default)]
    pub items_key: Option<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, Method>,
}

impl Resource {
    pub fn method(&self, name: &str) -> Option<(&str, &Method)> {
        lookup(&self.methods, name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }
}

/// A column either written as a bare name or with a type and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, rename = "type")]
        data_type: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { name, .. } => name,
        }
    }

    pub fn data_type(&self) -> &str {
        match self {
            Self::Detailed {
                data_type: Some(t), ..
            } => t,
            _ => "json",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Detailed {
                description: Some(d),
                ..
            } => d,
            _ => "",
        }
    }
}

/// Http methods used for each kind of statement against a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbMap {
    #[serde(default = "default_select")]
    pub select: String,
    #[serde(default = "default_insert")]
    pub insert: String,
    #[serde(default = "default_update")]
    pub update: String,
    #[serde(default = "default_delete")]
    pub delete: String,
}

impl Default for VerbMap {
    fn default() -> Self {
        VerbMap {
            select: default_select(),
            insert: default_insert(),
            update: default_update(),
            delete: default_delete(),
        }
    }
}

fn default_select() -> String {
    "GET".to_string()
}

fn default_insert() -> String {
    "POST".to_string()
}

fn default_update() -> String {
    "PATCH".to_string()
}

fn default_delete() -> String {
    "DELETE".to_string()
}

/// A method invocable with EXEC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    #[serde(default = "default_insert")]
    pub verb: String,
    /// Path template. Defaults to the resource's path.
    #[serde(default)]
    pub path: Option<String>,
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<(&'a str, &'a V)> {
    if let Some((k, v)) = map.get_key_value(name) {
        return Some((k.as_str(), v));
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(k, v)| (k.as_str(), v))
}


#[cfg(test)]
mod tests {
    use super::testutil::test_registry;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_ignores_case() {
        let registry = test_registry();
        let (name, provider) = registry.provider("GitHub").unwrap();
        assert_eq!("github", name);
        let (_, service) = provider.service("REPOS").unwrap();
        assert!(service.resource("Issues").is_some());
        assert!(service.resource("pulls").is_none());
    }

    #[test]
    fn defaults_applied() {
        let registry = test_registry();
        let (_, provider) = registry.provider("github").unwrap();
        let (_, service) = provider.service("repos").unwrap();
        let (_, resource) = service.resource("issues").unwrap();
        assert_eq!(VerbMap::default(), resource.verbs);
        assert_eq!(None, resource.items_key);
        assert_eq!(
            AuthConfig::Bearer {
                token_env: "APIQL_TEST_GITHUB_TOKEN".to_string()
            },
            provider.auth
        );
    }

    #[test]
    fn detailed_columns() {
        let registry = test_registry();
        let (_, provider) = registry.provider("github").unwrap();
        let (_, service) = provider.service("repos").unwrap();
        let (_, resource) = service.resource("repos").unwrap();
        assert_eq!(vec!["id", "name"], resource.column_names());
        assert_eq!("int", resource.columns[0].data_type());
        assert_eq!("json", resource.columns[1].data_type());
        assert_eq!("Repository id", resource.columns[0].description());
    }

    #[test]
    fn invalid_path_rejected() {
        let json = r#"{"providers": {"p": {"base_url": "http://localhost", "services": {"s": {"resources": {"r": {"path": "nope"}}}}}}}"#;
        let err = ProviderRegistry::from_json(json).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)), "{err}");
    }

    #[test]
    fn invalid_base_url_rejected() {
        let json = r#"{"providers": {"p": {"base_url": "not a url"}}}"#;
        let err = ProviderRegistry::from_json(json).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)), "{err}");
    }
}
