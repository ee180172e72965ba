use crate::core::{
    Chamber, ChamberName, Constraint, Deceased, DeceasedStatus, StoreResult, UnitName,
};
use crate::transaction::Change;
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The two relations of the record store plus the unit index.
///
/// Backed by persistent maps, so cloning a `Tables` for a transaction snapshot
/// is O(1) and writes inside the transaction never touch committed state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    chambers: OrdMap<ChamberName, Chamber>,
    deceased: OrdMap<Uuid, Deceased>,
    // Unique index over placements of in-facility records. Rebuilt on load.
    #[serde(skip)]
    units: OrdMap<UnitName, Uuid>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chamber(&self, name: ChamberName) -> Option<&Chamber> {
        self.chambers.get(&name)
    }

    /// Chambers in name order.
    pub fn chambers(&self) -> impl Iterator<Item = &Chamber> {
        self.chambers.values()
    }

    pub fn deceased(&self, id: Uuid) -> Option<&Deceased> {
        self.deceased.get(&id)
    }

    pub fn deceased_records(&self) -> impl Iterator<Item = &Deceased> {
        self.deceased.values()
    }

    pub fn chamber_count(&self) -> usize {
        self.chambers.len()
    }

    pub fn deceased_count(&self) -> usize {
        self.deceased.len()
    }

    /// Unit numbers held by in-facility records in `chamber`.
    pub fn occupied_units(&self, chamber: ChamberName) -> BTreeSet<u32> {
        self.chamber_units(chamber)
            .map(|(unit, _)| unit.number)
            .collect()
    }

    /// Authoritative occupant count, read from the unit index.
    pub fn occupant_count(&self, chamber: ChamberName) -> u32 {
        self.chamber_units(chamber).count() as u32
    }

    /// Index entries of one chamber; units sort by chamber first.
    fn chamber_units(&self, chamber: ChamberName) -> impl Iterator<Item = (&UnitName, &Uuid)> {
        self.units
            .range(UnitName::new(chamber, 0)..=UnitName::new(chamber, u32::MAX))
    }

    /// Record currently holding `unit`, if any.
    pub fn unit_holder(&self, unit: UnitName) -> Option<Uuid> {
        self.units.get(&unit).copied()
    }

    pub fn insert_chamber(&mut self, chamber: Chamber) -> StoreResult<()> {
        if self.chambers.contains_key(&chamber.name) {
            return Err(Constraint::DuplicateChamber(chamber.name).into());
        }
        check_occupancy(&chamber)?;
        self.chambers.insert(chamber.name, chamber);
        Ok(())
    }

    pub fn update_chamber(&mut self, chamber: Chamber) -> StoreResult<()> {
        if !self.chambers.contains_key(&chamber.name) {
            return Err(Constraint::MissingChamber(chamber.name).into());
        }
        check_occupancy(&chamber)?;
        if let Some(highest) = self.occupied_units(chamber.name).into_iter().next_back()
            && highest > chamber.capacity
        {
            return Err(Constraint::UnitOutOfRange {
                unit: UnitName::new(chamber.name, highest),
                capacity: chamber.capacity,
            }
            .into());
        }
        self.chambers.insert(chamber.name, chamber);
        Ok(())
    }

    /// Restricted delete: fails while any record is placed in the chamber.
    pub fn delete_chamber(&mut self, name: ChamberName) -> StoreResult<Option<Chamber>> {
        // Only in-facility records hold placements, so the unit index sees all of them.
        if self.chamber_units(name).next().is_some() {
            return Err(Constraint::ChamberInUse(name).into());
        }
        Ok(self.chambers.remove(&name))
    }

    /// Insert or replace a record, enforcing placement constraints.
    pub fn put_deceased(&mut self, record: Deceased) -> StoreResult<()> {
        if let Some(placement) = record.placement {
            if record.status != DeceasedStatus::InFacility {
                return Err(Constraint::PlacementOnTerminalRecord(record.id).into());
            }
            let chamber = self
                .chambers
                .get(&placement.chamber)
                .ok_or(Constraint::MissingChamber(placement.chamber))?;
            let unit = placement.unit_name();
            if placement.unit == 0 || placement.unit > chamber.capacity {
                return Err(Constraint::UnitOutOfRange {
                    unit,
                    capacity: chamber.capacity,
                }
                .into());
            }
            if let Some(holder) = self.units.get(&unit)
                && *holder != record.id
            {
                return Err(Constraint::DuplicateUnit(unit).into());
            }
        }

        if let Some(previous) = self.deceased.get(&record.id)
            && let Some(old) = previous.placement
        {
            self.units.remove(&old.unit_name());
        }
        if let Some(placement) = record.placement {
            self.units.insert(placement.unit_name(), record.id);
        }
        self.deceased.insert(record.id, record);
        Ok(())
    }

    pub fn delete_deceased(&mut self, id: Uuid) -> Option<Deceased> {
        let removed = self.deceased.remove(&id)?;
        if let Some(placement) = removed.placement {
            self.units.remove(&placement.unit_name());
        }
        Some(removed)
    }

    /// Replays one logged change. Used by WAL recovery and by commits that
    /// land on a newer version than they started from.
    pub fn apply(&mut self, change: &Change) -> StoreResult<()> {
        match change {
            Change::PutChamber(chamber) => {
                if self.chambers.contains_key(&chamber.name) {
                    self.update_chamber(chamber.clone())
                } else {
                    self.insert_chamber(chamber.clone())
                }
            }
            Change::DeleteChamber(name) => self.delete_chamber(*name).map(|_| ()),
            Change::PutDeceased(record) => self.put_deceased(record.clone()),
            Change::DeleteDeceased(id) => {
                self.delete_deceased(*id);
                Ok(())
            }
        }
    }

    /// Rebuilds the unit index from stored placements.
    pub fn rebuild_indexes(&mut self) -> StoreResult<()> {
        let mut units = OrdMap::new();
        for record in self.deceased.values() {
            if let Some(placement) = record.placement {
                let unit = placement.unit_name();
                if units.insert(unit, record.id).is_some() {
                    return Err(Constraint::DuplicateUnit(unit).into());
                }
            }
        }
        self.units = units;
        Ok(())
    }
}

fn check_occupancy(chamber: &Chamber) -> StoreResult<()> {
    if chamber.current_occupancy > chamber.capacity {
        return Err(Constraint::OccupancyExceedsCapacity {
            chamber: chamber.name,
            occupancy: chamber.current_occupancy,
            capacity: chamber.capacity,
        }
        .into());
    }
    Ok(())
}
