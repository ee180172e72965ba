pub mod persistence;
pub mod table;

pub use persistence::{
    DatabaseSnapshot, DurabilityMode, PersistenceManager, Recovered, SnapshotManager, WalEntry,
    WalManager,
};
pub use table::Tables;
