use crate::core::{
    Chamber, ChamberName, ChamberStatus, DeceasedStatus, MAX_CHAMBER_CAPACITY, MortuaryError,
    MortuaryResult, UnitName,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

const MAX_NAME_LEN: usize = 100;
const MAX_CAUSE_LEN: usize = 2000;

#[derive(Debug, Clone)]
pub struct NewChamber {
    pub name: ChamberName,
    pub capacity: u32,
    pub status: Option<ChamberStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ChamberChanges {
    pub capacity: Option<u32>,
    pub status: Option<ChamberStatus>,
}

impl ChamberChanges {
    pub fn has_changes(&self) -> bool {
        self.capacity.is_some() || self.status.is_some()
    }
}

/// Where an assignment should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamberTarget {
    Named(ChamberName),
    /// The first chamber, in name order, that is accepting records.
    AnyAvailable,
}

#[derive(Debug, Clone)]
pub struct NewDeceased {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub cause_of_death: Option<String>,
    pub target: Option<ChamberTarget>,
}

impl NewDeceased {
    pub fn validate(&self) -> MortuaryResult<()> {
        validate_person_name("first_name", &self.first_name)?;
        validate_person_name("last_name", &self.last_name)?;
        validate_cause(self.cause_of_death.as_deref())?;
        validate_dates(self.date_of_birth, self.date_of_death)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeceasedChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub cause_of_death: Option<String>,
    pub status: Option<DeceasedStatus>,
}

impl DeceasedChanges {
    pub fn status(status: DeceasedStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.first_name.is_some()
            || self.last_name.is_some()
            || self.cause_of_death.is_some()
            || self.status.is_some()
    }

    pub fn validate(&self) -> MortuaryResult<()> {
        if !self.has_changes() {
            return Err(MortuaryError::validation(
                "at least one field must be provided",
            ));
        }
        if let Some(first_name) = self.first_name.as_deref() {
            validate_person_name("first_name", first_name)?;
        }
        if let Some(last_name) = self.last_name.as_deref() {
            validate_person_name("last_name", last_name)?;
        }
        validate_cause(self.cause_of_death.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeceasedFilter {
    pub status: Option<DeceasedStatus>,
    pub chamber: Option<ChamberName>,
    /// Only the record currently holding this unit.
    pub unit: Option<UnitName>,
}

/// A chamber together with the units still free in it.
#[derive(Debug, Clone, Serialize)]
pub struct ChamberView {
    #[serde(flatten)]
    pub chamber: Chamber,
    pub available_units: Vec<UnitName>,
}

/// Capacity must be in `1..=MAX_CHAMBER_CAPACITY`.
pub fn validate_capacity(capacity: u32) -> MortuaryResult<()> {
    if capacity == 0 || capacity > MAX_CHAMBER_CAPACITY {
        return Err(MortuaryError::validation(format!(
            "capacity must be between 1 and {MAX_CHAMBER_CAPACITY}, got {capacity}"
        )));
    }
    Ok(())
}

fn validate_person_name(field: &str, value: &str) -> MortuaryResult<()> {
    if value.trim().is_empty() {
        return Err(MortuaryError::validation(format!("{field} must not be blank")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(MortuaryError::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_cause(cause: Option<&str>) -> MortuaryResult<()> {
    if let Some(cause) = cause
        && cause.chars().count() > MAX_CAUSE_LEN
    {
        return Err(MortuaryError::validation(format!(
            "cause_of_death must be at most {MAX_CAUSE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_dates(date_of_birth: Option<NaiveDate>, date_of_death: NaiveDate) -> MortuaryResult<()> {
    if date_of_death > Utc::now().date_naive() {
        return Err(MortuaryError::validation(
            "date_of_death must not be in the future",
        ));
    }
    if let Some(date_of_birth) = date_of_birth
        && date_of_birth > date_of_death
    {
        return Err(MortuaryError::validation(
            "date_of_birth must not be after date_of_death",
        ));
    }
    Ok(())
}
