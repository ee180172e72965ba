use super::types::{ChamberName, DeceasedStatus, UnitName};
use thiserror::Error;
use uuid::Uuid;

/// Integrity rules enforced by the record store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Constraint {
    #[error("chamber {0} already exists")]
    DuplicateChamber(ChamberName),

    #[error("unit {0} is already occupied")]
    DuplicateUnit(UnitName),

    #[error("chamber {0} does not exist")]
    MissingChamber(ChamberName),

    #[error("unit {unit} is outside chamber capacity {capacity}")]
    UnitOutOfRange { unit: UnitName, capacity: u32 },

    #[error("record {0} has a terminal status but still holds a unit")]
    PlacementOnTerminalRecord(Uuid),

    #[error("chamber {chamber} occupancy {occupancy} exceeds capacity {capacity}")]
    OccupancyExceedsCapacity {
        chamber: ChamberName,
        occupancy: u32,
        capacity: u32,
    },

    #[error("chamber {0} is still referenced by stored records")]
    ChamberInUse(ChamberName),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(Constraint),

    #[error("write-write conflict: transaction {txn} was based on version {based_on}, store is at {current}")]
    SerializationFailure {
        txn: u64,
        based_on: u64,
        current: u64,
    },

    #[error("transaction {0} is not active")]
    TransactionNotActive(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl From<Constraint> for StoreError {
    fn from(constraint: Constraint) -> Self {
        StoreError::ConstraintViolation(constraint)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum MortuaryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("chamber {0} not found")]
    ChamberNotFound(ChamberName),

    #[error("deceased record {0} not found")]
    DeceasedNotFound(Uuid),

    #[error("no chamber is currently accepting new records")]
    NoChamberAvailable,

    #[error("cannot assign automatically: every chamber is full or out of service")]
    AllChambersUnavailable,

    #[error("chamber {0} already exists")]
    ChamberExists(ChamberName),

    #[error("chamber {name} is unavailable: {reason}")]
    ChamberUnavailable { name: ChamberName, reason: String },

    #[error("chamber {name} still holds {occupancy} record(s)")]
    ChamberOccupied { name: ChamberName, occupancy: u32 },

    #[error("chamber {name} capacity {requested} is below its occupied units (highest unit {highest})")]
    CapacityBelowOccupancy {
        name: ChamberName,
        requested: u32,
        highest: u32,
    },

    #[error("unit {0} is already taken, retry the request")]
    UnitTaken(UnitName),

    #[error("deceased record {id} is already assigned to unit {unit}")]
    AlreadyAssigned { id: Uuid, unit: UnitName },

    #[error("cannot move deceased record from {from} to {to}")]
    InvalidTransition {
        from: DeceasedStatus,
        to: DeceasedStatus,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl MortuaryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(name: ChamberName, reason: impl Into<String>) -> Self {
        Self::ChamberUnavailable {
            name,
            reason: reason.into(),
        }
    }

    /// Conflicts caused by concurrent writers; the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MortuaryError::UnitTaken(_)
                | MortuaryError::Store(StoreError::SerializationFailure { .. })
        )
    }
}

impl From<StoreError> for MortuaryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConstraintViolation(Constraint::DuplicateUnit(unit)) => {
                MortuaryError::UnitTaken(unit)
            }
            StoreError::ConstraintViolation(Constraint::DuplicateChamber(name)) => {
                MortuaryError::ChamberExists(name)
            }
            StoreError::ConstraintViolation(Constraint::MissingChamber(name)) => {
                MortuaryError::ChamberNotFound(name)
            }
            other => MortuaryError::Store(other),
        }
    }
}

pub type MortuaryResult<T> = std::result::Result<T, MortuaryError>;
