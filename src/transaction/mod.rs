// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Serializable transactions over the record store:
// - Each transaction works on a private copy of the tables (persistent maps,
//   so the copy is O(1))
// - Commit is first-committer-wins per row: a transaction that writes a row
//   another transaction committed after it began is aborted with a
//   serialization failure. Writers of disjoint rows both commit.
// - Changes are logged per transaction and replayed on recovery
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::{Change, RowKey};
pub use manager::{TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
