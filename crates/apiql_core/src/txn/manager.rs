use std::collections::VecDeque;

use tracing::debug;

use crate::errors::TransactionStateError;
use crate::exec::ExecutorOutput;
use crate::statement::Statement;

/// One level of transaction nesting.
#[derive(Debug)]
pub struct TxnFrame {
    depth: usize,
    queue: VecDeque<Statement>,
}

impl TxnFrame {
    fn new(depth: usize) -> Self {
        TxnFrame {
            depth,
            queue: VecDeque::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of queued statements.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Outputs of the statements run by a commit, and whether the commit itself
/// succeeded.
#[derive(Debug)]
pub struct CommitResult {
    pub outputs: Vec<ExecutorOutput>,
    pub result: Result<(), TransactionStateError>,
}

/// Stack of transaction frames. The last frame is the active one.
#[derive(Debug)]
pub struct TransactionManager {
    root: TxnFrame,
    nested: Vec<TxnFrame>,
    max_depth: Option<usize>,
}

impl TransactionManager {
    pub fn new_root(max_depth: Option<usize>) -> Self {
        TransactionManager {
            root: TxnFrame::new(0),
            nested: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.nested.len()
    }

    pub fn is_root(&self) -> bool {
        self.nested.is_empty()
    }

    pub fn current(&self) -> &TxnFrame {
        self.nested.last().unwrap_or(&self.root)
    }

    fn current_mut(&mut self) -> &mut TxnFrame {
        self.nested.last_mut().unwrap_or(&mut self.root)
    }

    /// The frame below the active one.
    pub fn parent(&self) -> Option<&TxnFrame> {
        match self.nested.len() {
            0 => None,
            1 => Some(&self.root),
            n => self.nested.get(n - 2),
        }
    }

    /// Start a nested transaction, returning the new depth.
    pub fn begin(&mut self) -> Result<usize, TransactionStateError> {
        let depth = self.depth() + 1;
        if let Some(max) = self.max_depth {
            if depth > max {
                return Err(TransactionStateError::MaxDepthExceeded { max });
            }
        }
        self.nested.push(TxnFrame::new(depth));
        debug!(%depth, "began transaction");
        Ok(depth)
    }

    /// Run the queued statements of the active transaction in order, then
    /// return to the parent transaction.
    ///
    /// A failing statement doesn't stop the remaining ones. Effects of
    /// statements already sent are not undone.
    pub async fn commit(&mut self) -> CommitResult {
        let queued: Vec<Statement> = self.current_mut().queue.drain(..).collect();
        debug!(depth = self.depth(), queued = queued.len(), "committing transaction");

        let mut outputs = Vec::with_capacity(queued.len());
        for stmt in queued {
            outputs.push(stmt.execute().await);
        }

        let result = match self.nested.pop() {
            Some(frame) => {
                debug!(depth = frame.depth, "committed transaction");
                Ok(())
            }
            None => Err(TransactionStateError::NoParent),
        };

        CommitResult { outputs, result }
    }

    /// Discard the queued statements of the active transaction and return to
    /// the parent transaction. Returns the number of discarded statements.
    pub fn rollback(&mut self) -> Result<usize, TransactionStateError> {
        if self.parent().is_none() {
            return Err(TransactionStateError::NoParent);
        }
        match self.nested.pop() {
            Some(frame) => {
                debug!(depth = frame.depth, discarded = frame.len(), "rolled back transaction");
                Ok(frame.len())
            }
            None => Err(TransactionStateError::NoParent),
        }
    }

    pub fn enqueue(&mut self, stmt: Statement) -> Result<(), TransactionStateError> {
        if self.is_root() {
            return Err(TransactionStateError::EnqueueAtRoot);
        }
        if !stmt.is_prepared() {
            return Err(TransactionStateError::Unprepared);
        }
        let frame = self.current_mut();
        frame.queue.push_back(stmt);
        debug!(depth = frame.depth, queued = frame.len(), "queued statement");
        Ok(())
    }
}
