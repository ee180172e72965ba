// ============================================================================
// Transaction State Management
// ============================================================================
//
// A transaction owns a private copy of the tables taken at `begin`, plus the
// committed version that copy was based on. Reads see the copy (including the
// transaction's own writes); writes go through the constraint checks of
// `Tables` and are recorded in the change log.
//
// State transitions:
//   Active ──commit──> Committed
//     │
//     └──rollback / conflict──> Aborted
//
// ============================================================================

use super::Change;
use crate::core::{Chamber, ChamberName, Deceased, StoreError, StoreResult};
use crate::storage::Tables;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identifier for a transaction, issued per database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Committed version the working copy was cloned from
    base_version: u64,
    tables: Tables,
    changes: Vec<Change>,
    start_time: Instant,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, base_version: u64, tables: Tables) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            base_version,
            tables,
            changes: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Read view: committed state as of `begin` plus this transaction's writes.
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn insert_chamber(&mut self, chamber: Chamber) -> StoreResult<()> {
        self.ensure_active()?;
        self.tables.insert_chamber(chamber.clone())?;
        self.changes.push(Change::PutChamber(chamber));
        Ok(())
    }

    pub fn update_chamber(&mut self, chamber: Chamber) -> StoreResult<()> {
        self.ensure_active()?;
        self.tables.update_chamber(chamber.clone())?;
        self.changes.push(Change::PutChamber(chamber));
        Ok(())
    }

    pub fn delete_chamber(&mut self, name: ChamberName) -> StoreResult<Option<Chamber>> {
        self.ensure_active()?;
        let removed = self.tables.delete_chamber(name)?;
        if removed.is_some() {
            self.changes.push(Change::DeleteChamber(name));
        }
        Ok(removed)
    }

    pub fn put_deceased(&mut self, record: Deceased) -> StoreResult<()> {
        self.ensure_active()?;
        self.tables.put_deceased(record.clone())?;
        self.changes.push(Change::PutDeceased(record));
        Ok(())
    }

    pub fn delete_deceased(&mut self, id: Uuid) -> StoreResult<Option<Deceased>> {
        self.ensure_active()?;
        let removed = self.tables.delete_deceased(id);
        if removed.is_some() {
            self.changes.push(Change::DeleteDeceased(id));
        }
        Ok(removed)
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.changes.clear();
        self.state = TransactionState::Aborted;
    }

    pub(crate) fn take_tables(&mut self) -> Tables {
        std::mem::take(&mut self.tables)
    }

    fn ensure_active(&self) -> StoreResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(StoreError::TransactionNotActive(self.id.0))
        }
    }
}
