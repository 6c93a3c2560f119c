use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{RuntimeConfig, SessionVars};
use crate::errors::ExecutionError;
use crate::exec::QueryExecutor;
use crate::registry::{AuthConfig, ProviderRegistry};
use crate::router::{ParameterRouter, StandardParameterRouter};

/// Everything a statement needs while it is being handled.
///
/// Cloning is cheap. Clones share session variables and the cancellation
/// token with the original, but start without query text. Use
/// [`HandlerContext::fork`] to get a fully independent context for a new
/// session.
#[derive(Debug)]
pub struct HandlerContext {
    vars: Arc<RwLock<SessionVars>>,
    registry: Arc<ProviderRegistry>,
    router: Arc<dyn ParameterRouter>,
    executor: Arc<dyn QueryExecutor>,
    config: Arc<RuntimeConfig>,
    cancel: Arc<Mutex<CancellationToken>>,
    raw_query: String,
    query: String,
}

impl HandlerContext {
    pub fn new(
        config: RuntimeConfig,
        registry: Arc<ProviderRegistry>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        let router = Arc::new(StandardParameterRouter::new(registry.clone()));
        HandlerContext {
            vars: Arc::new(RwLock::new(SessionVars::new(&config))),
            registry,
            router,
            executor,
            config: Arc::new(config),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            raw_query: String::new(),
            query: String::new(),
        }
    }

    pub fn with_router(mut self, router: Arc<dyn ParameterRouter>) -> Self {
        self.router = router;
        self
    }

    /// Deep copy for use by another session.
    pub fn fork(&self) -> Self {
        HandlerContext {
            vars: Arc::new(RwLock::new(self.vars.read().clone())),
            registry: self.registry.clone(),
            router: self.router.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            raw_query: self.raw_query.clone(),
            query: self.query.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<dyn ParameterRouter> {
        &self.router
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Full text of the compound query this statement came from.
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Text of the single statement being handled.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_raw_query(&mut self, raw_query: impl Into<String>) {
        self.raw_query = raw_query.into();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// A token cancelled when the session is cancelled.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.lock().child_token()
    }

    /// Cancel everything currently executing. Statements started afterwards
    /// are unaffected.
    pub fn cancel(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    pub fn current_provider(&self) -> Option<String> {
        self.vars.read().current_provider.clone()
    }

    pub fn use_provider(&self, provider: &str) -> Result<(), ExecutionError> {
        let (name, _) = self
            .registry
            .provider(provider)
            .ok_or_else(|| ExecutionError::UnknownProvider(provider.to_string()))?;
        debug!(provider = %name, "using provider");
        self.vars.write().current_provider = Some(name.to_string());
        Ok(())
    }

    pub fn set_variable(&self, name: &str, value: &Value) -> Result<(), ExecutionError> {
        self.vars.write().set(name, value)
    }

    pub fn get_variable(&self, name: &str) -> Result<Value, ExecutionError> {
        self.vars.read().get(name)
    }

    pub fn http_log_enabled(&self) -> bool {
        self.vars.read().http_log_enabled
    }

    /// Resolve credentials for a provider from the environment.
    pub fn auth_context(&self, provider: &str) -> Result<AuthContext, ExecutionError> {
        let (_, provider_conf) = self
            .registry
            .provider(provider)
            .ok_or_else(|| ExecutionError::UnknownProvider(provider.to_string()))?;

        Ok(match &provider_conf.auth {
            AuthConfig::None => AuthContext::None,
            AuthConfig::Bearer { token_env } => AuthContext::Bearer {
                token: read_env(token_env)?,
            },
            AuthConfig::ApiKey { header, key_env } => AuthContext::ApiKey {
                header: header.clone(),
                key: read_env(key_env)?,
            },
            AuthConfig::Basic {
                username_env,
                password_env,
            } => AuthContext::Basic {
                username: read_env(username_env)?,
                password: read_env(password_env)?,
            },
        })
    }
}

impl Clone for HandlerContext {
    fn clone(&self) -> Self {
        HandlerContext {
            vars: self.vars.clone(),
            registry: self.registry.clone(),
            router: self.router.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            raw_query: String::new(),
            query: String::new(),
        }
    }
}

fn read_env(name: &str) -> Result<String, ExecutionError> {
    std::env::var(name).map_err(|_| ExecutionError::MissingCredentials(name.to_string()))
}

/// Credentials attached to outgoing requests.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthContext {
    None,
    Bearer { token: String },
    ApiKey { header: String, key: String },
    Basic { username: String, password: String },
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bearer { .. } => write!(f, "Bearer(..)"),
            Self::ApiKey { header, .. } => write!(f, "ApiKey({header}, ..)"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ..)"),
        }
    }
}
