// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId};
use crate::storage::Tables;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues transaction ids and keeps lifecycle counters for one database.
#[derive(Debug)]
pub struct TransactionManager {
    next_id: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub conflicts: u64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Used after recovery so new ids never repeat ids already in the log.
    pub fn starting_at(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id.max(1)),
            begun: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn begin(&self, base_version: u64, tables: Tables) -> Transaction {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.begun.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, base_version, tables)
    }

    pub fn record_commit(&self, txn: &mut Transaction) {
        txn.mark_committed();
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self, txn: &mut Transaction) {
        if txn.state().is_active() {
            txn.mark_aborted();
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_conflict(&self, txn: &mut Transaction) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        self.record_abort(txn);
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionState;

    #[test]
    fn ids_are_monotonic() {
        let manager = TransactionManager::starting_at(10);
        let first = manager.begin(0, Tables::new());
        let second = manager.begin(0, Tables::new());
        assert_eq!(first.id(), TransactionId(10));
        assert!(second.id() > first.id());
    }

    #[test]
    fn counters_track_outcomes() {
        let manager = TransactionManager::new();
        let mut committed = manager.begin(0, Tables::new());
        let mut aborted = manager.begin(0, Tables::new());
        let mut conflicted = manager.begin(0, Tables::new());

        manager.record_commit(&mut committed);
        manager.record_abort(&mut aborted);
        manager.record_abort(&mut aborted);
        manager.record_conflict(&mut conflicted);

        assert_eq!(committed.state(), TransactionState::Committed);
        assert_eq!(
            manager.stats(),
            TransactionStats {
                begun: 3,
                committed: 1,
                aborted: 2,
                conflicts: 1,
            }
        );
    }
}
