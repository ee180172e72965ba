pub mod commands;
pub mod manager;
pub mod unit_finder;

pub use commands::{
    ChamberChanges, ChamberTarget, ChamberView, DeceasedChanges, DeceasedFilter, NewChamber,
    NewDeceased, validate_capacity,
};
pub use manager::OccupancyManager;
pub use unit_finder::{available_units, lowest_free_unit};
