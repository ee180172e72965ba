// ============================================================================
// Mortuary Library
// ============================================================================
//
// Chamber occupancy tracking for a mortuary facility:
// - core:        domain types and errors
// - storage:     typed tables, constraints, WAL and snapshots
// - transaction: serializable transactions with conflict detection
// - facade:      the `Database` handle
// - occupancy:   chamber and deceased-record operations
// - web:         axum REST API
//
// ============================================================================

pub mod config;
pub mod core;
pub mod facade;
pub mod occupancy;
pub mod storage;
pub mod transaction;
pub mod web;

pub use crate::core::{
    Chamber, ChamberName, ChamberStatus, Deceased, DeceasedStatus, MAX_CHAMBER_CAPACITY,
    MortuaryError, MortuaryResult, Placement, StoreError, StoreResult, UnitName,
};
pub use facade::{Database, DatabaseOptions};
pub use occupancy::OccupancyManager;
pub use storage::DurabilityMode;
pub use web::{AppState, build_router};
