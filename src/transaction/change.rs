// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write inside a transaction is recorded as a `Change`. The change log
// of a committed transaction is what reaches the write-ahead log, and replay
// applies the same changes in the same order.
//
// Each change also names the row it writes. Commit compares these rows with
// the rows written since the transaction began to detect write-write
// conflicts.
//
// ============================================================================

use crate::core::{Chamber, ChamberName, Deceased};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change {
    /// Insert or replace a chamber row
    PutChamber(Chamber),

    /// Delete a chamber row
    DeleteChamber(ChamberName),

    /// Insert or replace a deceased record
    PutDeceased(Deceased),

    /// Delete a deceased record
    DeleteDeceased(Uuid),
}

/// Primary key of a row, qualified by its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    Chamber(ChamberName),
    Deceased(Uuid),
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKey::Chamber(name) => write!(f, "chambers/{name}"),
            RowKey::Deceased(id) => write!(f, "deceased/{id}"),
        }
    }
}

impl Change {
    /// The row this change writes.
    pub fn row(&self) -> RowKey {
        match self {
            Change::PutChamber(chamber) => RowKey::Chamber(chamber.name),
            Change::DeleteChamber(name) => RowKey::Chamber(*name),
            Change::PutDeceased(record) => RowKey::Deceased(record.id),
            Change::DeleteDeceased(id) => RowKey::Deceased(*id),
        }
    }
}
