use super::error::{MortuaryError, MortuaryResult};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

lazy_static! {
    static ref UNIT_NAME_RE: Regex = Regex::new(r"^([1-9][0-9]*)([A-Z])$").unwrap();
}

// ============================================================================
// Chamber identity
// ============================================================================

/// Chamber identity: a single uppercase ASCII letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChamberName(char);

impl ChamberName {
    pub fn new(letter: char) -> MortuaryResult<Self> {
        if letter.is_ascii_uppercase() {
            Ok(Self(letter))
        } else {
            Err(MortuaryError::validation(format!(
                "chamber name must be a single uppercase letter A-Z, got '{letter}'"
            )))
        }
    }

    pub fn letter(&self) -> char {
        self.0
    }
}

impl FromStr for ChamberName {
    type Err = MortuaryError;

    fn from_str(raw: &str) -> MortuaryResult<Self> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Self::new(letter),
            _ => Err(MortuaryError::validation(format!(
                "chamber name must be a single uppercase letter A-Z, got '{raw}'"
            ))),
        }
    }
}

impl TryFrom<String> for ChamberName {
    type Error = MortuaryError;

    fn try_from(raw: String) -> MortuaryResult<Self> {
        raw.parse()
    }
}

impl From<ChamberName> for String {
    fn from(name: ChamberName) -> Self {
        name.0.to_string()
    }
}

impl fmt::Display for ChamberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChamberStatus {
    Available,
    Occupied,
    Maintenance,
    OutOfOrder,
}

impl ChamberStatus {
    /// Maintenance and out-of-order are set by administrators and never derived.
    pub fn is_administrative(&self) -> bool {
        matches!(self, ChamberStatus::Maintenance | ChamberStatus::OutOfOrder)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChamberStatus::Available => "AVAILABLE",
            ChamberStatus::Occupied => "OCCUPIED",
            ChamberStatus::Maintenance => "MAINTENANCE",
            ChamberStatus::OutOfOrder => "OUT_OF_ORDER",
        }
    }
}

impl FromStr for ChamberStatus {
    type Err = MortuaryError;

    fn from_str(raw: &str) -> MortuaryResult<Self> {
        match raw {
            "AVAILABLE" => Ok(ChamberStatus::Available),
            "OCCUPIED" => Ok(ChamberStatus::Occupied),
            "MAINTENANCE" => Ok(ChamberStatus::Maintenance),
            "OUT_OF_ORDER" => Ok(ChamberStatus::OutOfOrder),
            other => Err(MortuaryError::validation(format!(
                "invalid chamber status '{other}': expected one of AVAILABLE, OCCUPIED, MAINTENANCE, OUT_OF_ORDER"
            ))),
        }
    }
}

impl fmt::Display for ChamberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeceasedStatus {
    InFacility,
    Released,
    Processed,
}

impl DeceasedStatus {
    /// Released and processed records no longer occupy a unit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeceasedStatus::Released | DeceasedStatus::Processed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeceasedStatus::InFacility => "IN_FACILITY",
            DeceasedStatus::Released => "RELEASED",
            DeceasedStatus::Processed => "PROCESSED",
        }
    }
}

impl FromStr for DeceasedStatus {
    type Err = MortuaryError;

    fn from_str(raw: &str) -> MortuaryResult<Self> {
        match raw {
            "IN_FACILITY" => Ok(DeceasedStatus::InFacility),
            "RELEASED" => Ok(DeceasedStatus::Released),
            "PROCESSED" => Ok(DeceasedStatus::Processed),
            other => Err(MortuaryError::validation(format!(
                "invalid status '{other}': expected one of IN_FACILITY, RELEASED, PROCESSED"
            ))),
        }
    }
}

impl fmt::Display for DeceasedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Units
// ============================================================================

/// A numbered slot inside a chamber, rendered as `<number><letter>` (e.g. `3C`).
///
/// Ordering is by chamber first, then number, so a chamber's units form a
/// contiguous range in ordered maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct UnitName {
    pub chamber: ChamberName,
    pub number: u32,
}

impl UnitName {
    pub fn new(chamber: ChamberName, number: u32) -> Self {
        Self { chamber, number }
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.chamber)
    }
}

impl FromStr for UnitName {
    type Err = MortuaryError;

    fn from_str(raw: &str) -> MortuaryResult<Self> {
        let captures = UNIT_NAME_RE
            .captures(raw)
            .ok_or_else(|| MortuaryError::validation(format!("invalid unit name '{raw}'")))?;
        let number = captures[1]
            .parse::<u32>()
            .map_err(|_| MortuaryError::validation(format!("unit number out of range in '{raw}'")))?;
        let chamber = captures[2].parse::<ChamberName>()?;
        Ok(Self { chamber, number })
    }
}

impl From<UnitName> for String {
    fn from(unit: UnitName) -> Self {
        unit.to_string()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Largest number of units a single chamber may have.
pub const MAX_CHAMBER_CAPACITY: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chamber {
    pub name: ChamberName,
    pub capacity: u32,
    pub current_occupancy: u32,
    pub status: ChamberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chamber {
    pub fn new(name: ChamberName, capacity: u32, status: Option<ChamberStatus>) -> Self {
        let now = Utc::now();
        let mut chamber = Self {
            name,
            capacity,
            current_occupancy: 0,
            status: status.unwrap_or(ChamberStatus::Available),
            created_at: now,
            updated_at: now,
        };
        chamber.refresh_status();
        chamber
    }

    /// Status implied by occupancy, keeping administrative states untouched.
    pub fn derived_status(&self) -> ChamberStatus {
        if self.status.is_administrative() {
            self.status
        } else if self.current_occupancy >= self.capacity {
            ChamberStatus::Occupied
        } else {
            ChamberStatus::Available
        }
    }

    pub fn refresh_status(&mut self) {
        self.status = self.derived_status();
    }

    pub fn is_accepting(&self) -> bool {
        !self.status.is_administrative() && self.current_occupancy < self.capacity
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Where an in-facility record is stored. Chamber and unit travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub chamber: ChamberName,
    pub unit: u32,
}

impl Placement {
    pub fn unit_name(&self) -> UnitName {
        UnitName::new(self.chamber, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deceased {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub cause_of_death: Option<String>,
    pub status: DeceasedStatus,
    pub placement: Option<Placement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deceased {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
