//! Nested transactions over providers without transaction support.
//!
//! Mutating statements inside a transaction are queued and only sent to
//! providers on COMMIT.

pub mod coordinator;
pub mod manager;

pub use coordinator::{TxnContext, TxnCoordinator};
pub use manager::{CommitResult, TransactionManager, TxnFrame};
