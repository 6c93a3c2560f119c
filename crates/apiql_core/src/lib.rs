//! Execution of SQL statements against REST APIs.
//!
//! Providers and their resources are described by a [`registry::ProviderRegistry`].
//! A [`session::Session`] splits query text into statements, resolves table
//! references to provider resources, and executes them. Mutating statements
//! inside a transaction are deferred until COMMIT.

pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod registry;
pub mod render;
pub mod router;
pub mod session;
pub mod splitter;
pub mod statement;
pub mod txn;

pub use context::HandlerContext;
pub use errors::{ApiqlError, Result};
pub use exec::{ExecutorOutput, QueryExecutor, QueryResult};
pub use session::{Session, SessionFactory};
