use std::path::PathBuf;

pub type Result<T, E = ApiqlError> = std::result::Result<T, E>;

/// Top-level error for everything that can go wrong while handling a query.
#[derive(Debug, thiserror::Error)]
pub enum ApiqlError {
    #[error(transparent)]
    Parse(#[from] apiql_parser::ParseError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    TransactionState(#[from] TransactionStateError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no statements produced any output")]
    NoOutput,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while resolving table references of a statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("nil table returned")]
    NilTable,

    #[error("unsupported table expression: {0}")]
    UnsupportedTable(String),

    #[error("unknown join type: {0}")]
    UnknownJoinType(String),

    #[error("nil {side} table in {join_type}")]
    MissingJoinSide {
        side: &'static str,
        join_type: String,
    },

    #[error("could not resolve '{reference}': {reason}")]
    Unresolved { reference: String, reason: String },

    #[error("invalid hierarchy identifiers '{reference}': {reason}")]
    InvalidHierarchy { reference: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionStateError {
    #[error("no parent transaction manager available")]
    NoParent,

    #[error("cannot enqueue statement outside of a transaction")]
    EnqueueAtRoot,

    #[error("cannot enqueue unprepared statement")]
    Unprepared,

    #[error("maximum transaction depth of {max} exceeded")]
    MaxDepthExceeded { max: usize },
}

/// Errors raised while executing a routed statement.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("http response status code: {status}, response body: {body}")]
    Http { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("missing required parameter '{param}' for '{path}'")]
    MissingParameter { param: String, path: String },

    #[error("missing credentials, environment variable '{0}' is not set")]
    MissingCredentials(String),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid value for setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("statement execution cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("failed to obtain generation id: {0}")]
    Generation(String),

    #[error("failed to obtain session id: {0}")]
    SessionId(String),

    #[error("invalid transaction configuration: {0}")]
    TxnConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid registry json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid registry: {0}")]
    Invalid(String),
}

#[allow(unused_macros)]
macro_rules! internal {
    ($($arg:tt)*) => {
        crate::errors::ApiqlError::Internal(std::format!($($arg)*))
    };
}
pub(crate) use internal;
