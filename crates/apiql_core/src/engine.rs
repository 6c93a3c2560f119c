//! Generation and session id allocation.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{Result, SessionError};

/// Source of monotonic identifiers shared by all sessions.
///
/// A generation groups sessions created by one engine lifetime. Session ids
/// are unique within a generation.
pub trait SqlEngine: Debug + Sync + Send {
    /// The current generation, if one was allocated yet.
    fn current_generation_id(&self) -> Result<Option<u64>>;

    /// Allocate a new generation and make it current.
    fn next_generation_id(&self) -> Result<u64>;

    fn next_session_id(&self, generation_id: u64) -> Result<u64>;
}

#[derive(Debug, Default)]
struct EngineState {
    generation: Option<u64>,
    next_session: u64,
}

/// Engine keeping its counters in memory.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SqlEngine for InMemoryEngine {
    fn current_generation_id(&self) -> Result<Option<u64>> {
        Ok(self.state.lock().generation)
    }

    fn next_generation_id(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let generation = state.generation.map(|g| g + 1).unwrap_or(1);
        state.generation = Some(generation);
        state.next_session = 0;
        Ok(generation)
    }

    fn next_session_id(&self, generation_id: u64) -> Result<u64> {
        let mut state = self.state.lock();
        if state.generation != Some(generation_id) {
            return Err(SessionError::SessionId(format!(
                "generation {generation_id} is not current"
            ))
            .into());
        }
        state.next_session += 1;
        Ok(state.next_session)
    }
}

/// Per-session transaction id source.
#[derive(Debug)]
pub struct TxnCounterManager {
    pub generation_id: u64,
    pub session_id: u64,
    next_txn: AtomicU64,
}

impl TxnCounterManager {
    /// Allocate a session id in the current generation, creating a generation
    /// if none exists yet.
    pub fn new(engine: &Arc<dyn SqlEngine>) -> Result<Self> {
        let generation_id = match engine.current_generation_id() {
            Ok(Some(id)) => id,
            Ok(None) => engine.next_generation_id()?,
            Err(e) => {
                debug!(%e, "failed to read current generation, allocating a new one");
                engine.next_generation_id()?
            }
        };
        let session_id = engine.next_session_id(generation_id)?;
        debug!(%generation_id, %session_id, "allocated session id");

        Ok(TxnCounterManager {
            generation_id,
            session_id,
            next_txn: AtomicU64::new(1),
        })
    }

    pub fn next_txn_id(&self) -> u64 {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_generation_on_first_use() {
        let engine: Arc<dyn SqlEngine> = Arc::new(InMemoryEngine::new());
        assert_eq!(None, engine.current_generation_id().unwrap());

        let first = TxnCounterManager::new(&engine).unwrap();
        let second = TxnCounterManager::new(&engine).unwrap();
        assert_eq!(1, first.generation_id);
        assert_eq!(1, second.generation_id);
        assert_eq!(1, first.session_id);
        assert_eq!(2, second.session_id);
    }

    #[test]
    fn txn_ids_increase() {
        let engine: Arc<dyn SqlEngine> = Arc::new(InMemoryEngine::new());
        let counter = TxnCounterManager::new(&engine).unwrap();
        assert_eq!(1, counter.next_txn_id());
        assert_eq!(2, counter.next_txn_id());
    }

    #[test]
    fn stale_generation_rejected() {
        let engine = InMemoryEngine::new();
        let old = engine.next_generation_id().unwrap();
        engine.next_generation_id().unwrap();
        engine.next_session_id(old).unwrap_err();
    }
}
