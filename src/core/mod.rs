pub mod error;
pub mod types;

pub use error::{Constraint, MortuaryError, MortuaryResult, StoreError, StoreResult};
pub use types::{
    Chamber, ChamberName, ChamberStatus, Deceased, DeceasedStatus, MAX_CHAMBER_CAPACITY, Placement,
    UnitName,
};
