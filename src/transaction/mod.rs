// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Command Pattern: buffered writes applied at COMMIT, dropped on ROLLBACK
// - Observer: commit hooks queued during the transaction, fired after COMMIT
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{CommitHook, PayloadSlot, Transaction, TransactionId, TransactionState};
