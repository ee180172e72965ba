// ============================================================================
// Chamber Occupancy Manager
// ============================================================================
//
// Owns the relationship between chambers and the deceased records placed in
// them. Every operation that touches a record and its chamber runs in one
// store transaction, so both rows change together or not at all.
//
// Occupancy counters are recomputed from the unit index inside the same
// transaction after each placement change, never carried over from an
// earlier read.
//
// ============================================================================

use super::commands::{
    ChamberChanges, ChamberTarget, ChamberView, DeceasedChanges, DeceasedFilter, NewChamber,
    NewDeceased, validate_capacity,
};
use super::unit_finder::{available_units, lowest_free_unit};
use crate::core::{
    Chamber, ChamberName, ChamberStatus, Deceased, DeceasedStatus, MortuaryError, MortuaryResult,
    Placement, UnitName,
};
use crate::facade::Database;
use crate::storage::Tables;
use crate::transaction::Transaction;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct OccupancyManager {
    db: Database,
}

impl OccupancyManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------
    // Chambers
    // ------------------------------------------------------------------

    pub async fn create_chamber(&self, new: NewChamber) -> MortuaryResult<ChamberView> {
        validate_capacity(new.capacity)?;

        let view = self
            .db
            .transaction(|txn| {
                let chamber = Chamber::new(new.name, new.capacity, new.status);
                txn.insert_chamber(chamber.clone())?;
                Ok::<_, MortuaryError>(chamber_view(txn.tables(), chamber))
            })
            .await?;

        info!(chamber = %new.name, capacity = new.capacity, "chamber created");
        Ok(view)
    }

    pub async fn update_chamber(
        &self,
        name: ChamberName,
        changes: ChamberChanges,
    ) -> MortuaryResult<ChamberView> {
        if !changes.has_changes() {
            return Err(MortuaryError::validation(
                "at least one of capacity or status must be provided",
            ));
        }
        if let Some(capacity) = changes.capacity {
            validate_capacity(capacity)?;
        }

        let view = self
            .db
            .transaction(|txn| {
                let mut chamber = existing_chamber(txn.tables(), name)?;

                if let Some(capacity) = changes.capacity {
                    let occupied = txn.tables().occupied_units(name);
                    let highest = occupied.last().copied().unwrap_or(0);
                    if capacity < chamber.current_occupancy || capacity < highest {
                        return Err(MortuaryError::CapacityBelowOccupancy {
                            name,
                            requested: capacity,
                            highest,
                        });
                    }
                    chamber.capacity = capacity;
                }

                if let Some(status) = changes.status {
                    // Non-administrative states are always derived from occupancy.
                    chamber.status = if status.is_administrative() {
                        status
                    } else {
                        ChamberStatus::Available
                    };
                }

                chamber.refresh_status();
                chamber.touch();
                txn.update_chamber(chamber.clone())?;
                Ok::<_, MortuaryError>(chamber_view(txn.tables(), chamber))
            })
            .await?;

        info!(
            chamber = %name,
            capacity = view.chamber.capacity,
            status = %view.chamber.status,
            "chamber updated"
        );
        Ok(view)
    }

    /// Deletes an empty chamber. Occupied chambers are rejected.
    pub async fn delete_chamber(&self, name: ChamberName) -> MortuaryResult<Chamber> {
        let removed = self
            .db
            .transaction(|txn| {
                let chamber = existing_chamber(txn.tables(), name)?;
                let occupants = txn.tables().occupant_count(name);
                if chamber.current_occupancy > 0 || occupants > 0 {
                    return Err(MortuaryError::ChamberOccupied {
                        name,
                        occupancy: chamber.current_occupancy.max(occupants),
                    });
                }
                txn.delete_chamber(name)?;
                Ok::<_, MortuaryError>(chamber)
            })
            .await?;

        info!(chamber = %name, "chamber deleted");
        Ok(removed)
    }

    pub async fn get_chamber(&self, name: ChamberName) -> MortuaryResult<ChamberView> {
        self.db
            .read(|tables| {
                let chamber = existing_chamber(tables, name)?;
                Ok(chamber_view(tables, chamber))
            })
            .await
    }

    pub async fn list_chambers(&self) -> Vec<ChamberView> {
        self.db
            .read(|tables| {
                tables
                    .chambers()
                    .map(|chamber| chamber_view(tables, chamber.clone()))
                    .collect()
            })
            .await
    }

    /// First chamber, in name order, that can take another record.
    pub async fn find_available_chamber(&self) -> MortuaryResult<ChamberView> {
        self.db
            .read(|tables| {
                let chamber = first_accepting(tables).ok_or(MortuaryError::NoChamberAvailable)?;
                Ok(chamber_view(tables, chamber))
            })
            .await
    }

    /// Recomputes every chamber's occupancy from stored placements and
    /// returns the chambers that had to be corrected.
    pub async fn reconcile(&self) -> MortuaryResult<Vec<Chamber>> {
        let corrected = self
            .db
            .transaction(|txn| {
                let names: Vec<ChamberName> =
                    txn.tables().chambers().map(|chamber| chamber.name).collect();
                let mut corrected = Vec::new();
                for name in names {
                    let before = existing_chamber(txn.tables(), name)?;
                    let after = sync_occupancy(txn, name)?;
                    if before.current_occupancy != after.current_occupancy
                        || before.status != after.status
                    {
                        corrected.push(after);
                    }
                }
                Ok::<_, MortuaryError>(corrected)
            })
            .await?;

        for chamber in &corrected {
            info!(
                chamber = %chamber.name,
                occupancy = chamber.current_occupancy,
                status = %chamber.status,
                "chamber occupancy reconciled"
            );
        }
        Ok(corrected)
    }

    // ------------------------------------------------------------------
    // Deceased records
    // ------------------------------------------------------------------

    /// Creates a record, optionally placing it in the same transaction.
    pub async fn create_deceased(&self, new: NewDeceased) -> MortuaryResult<Deceased> {
        new.validate()?;

        let record = self
            .db
            .transaction(|txn| {
                let now = Utc::now();
                let mut record = Deceased {
                    id: Uuid::new_v4(),
                    first_name: new.first_name.trim().to_string(),
                    last_name: new.last_name.trim().to_string(),
                    date_of_birth: new.date_of_birth,
                    date_of_death: new.date_of_death,
                    cause_of_death: new.cause_of_death.clone(),
                    status: DeceasedStatus::InFacility,
                    placement: None,
                    created_at: now,
                    updated_at: now,
                };
                match new.target {
                    Some(target) => place(txn, &mut record, target)?,
                    None => txn.put_deceased(record.clone())?,
                }
                Ok::<_, MortuaryError>(record)
            })
            .await?;

        match record.placement {
            Some(placement) => info!(
                deceased_id = %record.id,
                unit = %placement.unit_name(),
                "deceased record created and assigned"
            ),
            None => info!(deceased_id = %record.id, "deceased record created"),
        }
        Ok(record)
    }

    /// Places an in-facility, unassigned record into the lowest free unit of
    /// the target chamber.
    pub async fn assign(&self, id: Uuid, target: ChamberTarget) -> MortuaryResult<Deceased> {
        let record = self
            .db
            .transaction(|txn| {
                let mut record = existing_deceased(txn.tables(), id)?;
                if record.status.is_terminal() {
                    return Err(MortuaryError::InvalidTransition {
                        from: record.status,
                        to: DeceasedStatus::InFacility,
                    });
                }
                if let Some(placement) = record.placement {
                    return Err(MortuaryError::AlreadyAssigned {
                        id,
                        unit: placement.unit_name(),
                    });
                }
                place(txn, &mut record, target)?;
                Ok::<_, MortuaryError>(record)
            })
            .await?;

        if let Some(placement) = record.placement {
            info!(deceased_id = %id, unit = %placement.unit_name(), "deceased record assigned");
        }
        Ok(record)
    }

    /// Moves a record to `status`. A terminal status releases its unit.
    pub async fn transition_status(
        &self,
        id: Uuid,
        status: DeceasedStatus,
    ) -> MortuaryResult<Deceased> {
        self.update_deceased(id, DeceasedChanges::status(status))
            .await
    }

    pub async fn update_deceased(
        &self,
        id: Uuid,
        changes: DeceasedChanges,
    ) -> MortuaryResult<Deceased> {
        changes.validate()?;

        let (record, released) = self
            .db
            .transaction(|txn| {
                let mut record = existing_deceased(txn.tables(), id)?;
                if let Some(first_name) = changes.first_name.as_deref() {
                    record.first_name = first_name.trim().to_string();
                }
                if let Some(last_name) = changes.last_name.as_deref() {
                    record.last_name = last_name.trim().to_string();
                }
                if let Some(cause) = changes.cause_of_death.as_ref() {
                    record.cause_of_death = Some(cause.clone());
                }

                let mut released = None;
                if let Some(status) = changes.status
                    && status != record.status
                {
                    if record.status.is_terminal() && !status.is_terminal() {
                        return Err(MortuaryError::InvalidTransition {
                            from: record.status,
                            to: status,
                        });
                    }
                    record.status = status;
                    if status.is_terminal() {
                        released = record.placement.take();
                    }
                }

                record.touch();
                txn.put_deceased(record.clone())?;
                if let Some(placement) = released {
                    sync_occupancy(txn, placement.chamber)?;
                }
                Ok::<_, MortuaryError>((record, released))
            })
            .await?;

        match released {
            Some(placement) => info!(
                deceased_id = %id,
                status = %record.status,
                unit = %placement.unit_name(),
                "deceased record released unit"
            ),
            None => debug!(deceased_id = %id, status = %record.status, "deceased record updated"),
        }
        Ok(record)
    }

    /// Deletes a record, freeing its unit if it still holds one.
    pub async fn delete_deceased(&self, id: Uuid) -> MortuaryResult<Deceased> {
        let removed = self
            .db
            .transaction(|txn| {
                let removed = txn
                    .delete_deceased(id)?
                    .ok_or(MortuaryError::DeceasedNotFound(id))?;
                if let Some(placement) = removed.placement {
                    sync_occupancy(txn, placement.chamber)?;
                }
                Ok::<_, MortuaryError>(removed)
            })
            .await?;

        info!(deceased_id = %id, "deceased record deleted");
        Ok(removed)
    }

    pub async fn get_deceased(&self, id: Uuid) -> MortuaryResult<Deceased> {
        self.db
            .read(|tables| existing_deceased(tables, id))
            .await
    }

    /// Records matching `filter`, oldest first.
    pub async fn list_deceased(&self, filter: DeceasedFilter) -> Vec<Deceased> {
        let mut records: Vec<Deceased> = self
            .db
            .read(|tables| {
                tables
                    .deceased_records()
                    .filter(|record| filter.status.is_none_or(|status| record.status == status))
                    .filter(|record| {
                        filter.chamber.is_none_or(|chamber| {
                            record.placement.is_some_and(|p| p.chamber == chamber)
                        })
                    })
                    .filter(|record| {
                        filter
                            .unit
                            .is_none_or(|unit| tables.unit_holder(unit) == Some(record.id))
                    })
                    .cloned()
                    .collect()
            })
            .await;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}

// ----------------------------------------------------------------------
// Transaction-scoped helpers
// ----------------------------------------------------------------------

fn existing_chamber(tables: &Tables, name: ChamberName) -> MortuaryResult<Chamber> {
    tables
        .chamber(name)
        .cloned()
        .ok_or(MortuaryError::ChamberNotFound(name))
}

fn existing_deceased(tables: &Tables, id: Uuid) -> MortuaryResult<Deceased> {
    tables
        .deceased(id)
        .cloned()
        .ok_or(MortuaryError::DeceasedNotFound(id))
}

fn first_accepting(tables: &Tables) -> Option<Chamber> {
    tables
        .chambers()
        .find(|chamber| chamber.is_accepting())
        .cloned()
}

fn chamber_view(tables: &Tables, chamber: Chamber) -> ChamberView {
    let available_units = if chamber.status.is_administrative() {
        Vec::new()
    } else {
        available_units(chamber.capacity, &tables.occupied_units(chamber.name))
            .into_iter()
            .map(|number| UnitName::new(chamber.name, number))
            .collect()
    };
    ChamberView {
        chamber,
        available_units,
    }
}

/// Resolves the target chamber and checks it can take one more record.
fn resolve_target(tables: &Tables, target: ChamberTarget) -> MortuaryResult<Chamber> {
    match target {
        ChamberTarget::AnyAvailable => {
            first_accepting(tables).ok_or(MortuaryError::AllChambersUnavailable)
        }
        ChamberTarget::Named(name) => {
            let chamber = existing_chamber(tables, name)?;
            match chamber.status {
                ChamberStatus::Maintenance => {
                    Err(MortuaryError::unavailable(name, "chamber is under maintenance"))
                }
                ChamberStatus::OutOfOrder => {
                    Err(MortuaryError::unavailable(name, "chamber is out of order"))
                }
                _ if chamber.current_occupancy >= chamber.capacity => {
                    Err(MortuaryError::unavailable(name, "chamber is at full capacity"))
                }
                _ => Ok(chamber),
            }
        }
    }
}

/// Lowest free unit in `chamber`, read from this transaction's view.
fn find_free_unit(tables: &Tables, chamber: &Chamber) -> MortuaryResult<UnitName> {
    lowest_free_unit(chamber.capacity, &tables.occupied_units(chamber.name))
        .map(|number| UnitName::new(chamber.name, number))
        .ok_or_else(|| MortuaryError::unavailable(chamber.name, "no free unit left"))
}

fn place(txn: &mut Transaction, record: &mut Deceased, target: ChamberTarget) -> MortuaryResult<()> {
    let chamber = resolve_target(txn.tables(), target)?;
    let unit = find_free_unit(txn.tables(), &chamber)?;

    record.status = DeceasedStatus::InFacility;
    record.placement = Some(Placement {
        chamber: chamber.name,
        unit: unit.number,
    });
    record.touch();
    txn.put_deceased(record.clone())?;
    sync_occupancy(txn, chamber.name)?;
    Ok(())
}

/// Sets the chamber's counter to the number of records placed in it and
/// re-derives its status.
fn sync_occupancy(txn: &mut Transaction, name: ChamberName) -> MortuaryResult<Chamber> {
    let mut chamber = existing_chamber(txn.tables(), name)?;
    let occupancy = txn.tables().occupant_count(name);
    let before = (chamber.current_occupancy, chamber.status);

    chamber.current_occupancy = occupancy;
    chamber.refresh_status();
    if (chamber.current_occupancy, chamber.status) != before {
        chamber.touch();
        txn.update_chamber(chamber.clone())?;
    }
    Ok(chamber)
}
