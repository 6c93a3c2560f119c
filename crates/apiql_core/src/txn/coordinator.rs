use tracing::debug;

use super::manager::TransactionManager;
use crate::errors::SessionError;

/// Transaction state a statement was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnContext {
    /// Depth of the active transaction, 0 outside of any transaction.
    pub depth: usize,
    pub txn_id: u64,
}

/// Hands out transaction managers for new sessions.
#[derive(Debug, Clone)]
pub struct TxnCoordinator {
    max_depth: Option<usize>,
}

impl TxnCoordinator {
    pub fn new(max_depth: Option<usize>) -> Result<Self, SessionError> {
        if max_depth == Some(0) {
            return Err(SessionError::TxnConfig(
                "max transaction depth must be at least 1".to_string(),
            ));
        }
        Ok(TxnCoordinator { max_depth })
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn new_root(&self) -> TransactionManager {
        debug!(max_depth = ?self.max_depth, "creating root transaction manager");
        TransactionManager::new_root(self.max_depth)
    }
}
