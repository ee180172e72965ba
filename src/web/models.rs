use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{
    ChamberName, ChamberStatus, Deceased, DeceasedStatus, MAX_CHAMBER_CAPACITY, MortuaryError,
    MortuaryResult, UnitName,
};
use crate::occupancy::{
    ChamberChanges, ChamberTarget, ChamberView, DeceasedChanges, DeceasedFilter, NewChamber,
    NewDeceased, validate_capacity,
};
use crate::transaction::TransactionStats;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: u64,
    pub persistent: bool,
    pub transactions: TransactionStats,
}

// ============================================================================
// Chambers
// ============================================================================

/// `GET /chambers` answers with one chamber when a name is given, else all.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChamberListing {
    One(ChamberView),
    All(Vec<ChamberView>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChamberRequest {
    pub name: String,
    pub capacity: i64,
    pub status: Option<String>,
}

impl CreateChamberRequest {
    pub fn into_command(self) -> MortuaryResult<NewChamber> {
        Ok(NewChamber {
            name: self.name.trim().parse()?,
            capacity: parse_capacity(self.capacity)?,
            status: self
                .status
                .as_deref()
                .map(str::parse::<ChamberStatus>)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateChamberRequest {
    pub capacity: Option<i64>,
    pub status: Option<String>,
}

impl UpdateChamberRequest {
    pub fn into_changes(self) -> MortuaryResult<ChamberChanges> {
        Ok(ChamberChanges {
            capacity: self.capacity.map(parse_capacity).transpose()?,
            status: self
                .status
                .as_deref()
                .map(str::parse::<ChamberStatus>)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChamberQuery {
    pub chamber_name: Option<String>,
}

impl ChamberQuery {
    pub fn name(&self) -> MortuaryResult<Option<ChamberName>> {
        self.chamber_name
            .as_deref()
            .map(|raw| raw.trim().parse())
            .transpose()
    }

    pub fn required_name(&self) -> MortuaryResult<ChamberName> {
        self.name()?
            .ok_or_else(|| MortuaryError::validation("chamber_name query parameter is required"))
    }
}

fn parse_capacity(raw: i64) -> MortuaryResult<u32> {
    let capacity = u32::try_from(raw).map_err(|_| {
        MortuaryError::validation(format!(
            "capacity must be between 1 and {MAX_CHAMBER_CAPACITY}, got {raw}"
        ))
    })?;
    validate_capacity(capacity)?;
    Ok(capacity)
}

// ============================================================================
// Deceased records
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeceasedRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub cause_of_death: Option<String>,
    pub chamber_name: Option<String>,
    #[serde(default)]
    pub auto_assign: bool,
}

impl CreateDeceasedRequest {
    pub fn into_command(self) -> MortuaryResult<NewDeceased> {
        let target = match (self.chamber_name.as_deref(), self.auto_assign) {
            (Some(_), true) => {
                return Err(MortuaryError::validation(
                    "provide either chamber_name or auto_assign, not both",
                ));
            }
            (Some(raw), false) => Some(ChamberTarget::Named(raw.trim().parse()?)),
            (None, true) => Some(ChamberTarget::AnyAvailable),
            (None, false) => None,
        };

        Ok(NewDeceased {
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            date_of_death: self.date_of_death,
            cause_of_death: self.cause_of_death,
            target,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDeceasedRequest {
    pub status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub cause_of_death: Option<String>,
}

impl UpdateDeceasedRequest {
    pub fn into_changes(self) -> MortuaryResult<DeceasedChanges> {
        Ok(DeceasedChanges {
            status: self
                .status
                .as_deref()
                .map(str::parse::<DeceasedStatus>)
                .transpose()?,
            first_name: self.first_name,
            last_name: self.last_name,
            cause_of_death: self.cause_of_death,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignDeceasedRequest {
    /// Absent means "any available chamber".
    pub chamber_name: Option<String>,
}

impl AssignDeceasedRequest {
    pub fn target(&self) -> MortuaryResult<ChamberTarget> {
        match self.chamber_name.as_deref() {
            Some(raw) => Ok(ChamberTarget::Named(raw.trim().parse()?)),
            None => Ok(ChamberTarget::AnyAvailable),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeceasedQuery {
    pub id: Option<String>,
    pub status: Option<String>,
    pub chamber_name: Option<String>,
    /// Unit label such as `3C`.
    pub unit_name: Option<String>,
}

impl DeceasedQuery {
    pub fn id(&self) -> MortuaryResult<Option<Uuid>> {
        self.id
            .as_deref()
            .map(|raw| {
                Uuid::parse_str(raw.trim())
                    .map_err(|_| MortuaryError::validation(format!("invalid record id '{raw}'")))
            })
            .transpose()
    }

    pub fn required_id(&self) -> MortuaryResult<Uuid> {
        self.id()?
            .ok_or_else(|| MortuaryError::validation("id query parameter is required"))
    }

    pub fn filter(&self) -> MortuaryResult<DeceasedFilter> {
        Ok(DeceasedFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<DeceasedStatus>)
                .transpose()?,
            chamber: self
                .chamber_name
                .as_deref()
                .map(|raw| raw.trim().parse())
                .transpose()?,
            unit: self
                .unit_name
                .as_deref()
                .map(|raw| raw.trim().parse::<UnitName>())
                .transpose()?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DeceasedListing {
    One(DeceasedResponse),
    All(Vec<DeceasedResponse>),
}

/// Wire shape of a deceased record: placement flattened into chamber and unit.
#[derive(Debug, Clone, Serialize)]
pub struct DeceasedResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub cause_of_death: Option<String>,
    pub status: DeceasedStatus,
    pub chamber_name: Option<ChamberName>,
    pub unit_number: Option<u32>,
    pub unit_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Deceased> for DeceasedResponse {
    fn from(record: Deceased) -> Self {
        Self {
            id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            date_of_birth: record.date_of_birth,
            date_of_death: record.date_of_death,
            cause_of_death: record.cause_of_death,
            status: record.status,
            chamber_name: record.placement.map(|p| p.chamber),
            unit_number: record.placement.map(|p| p.unit),
            unit_name: record.placement.map(|p| p.unit_name().to_string()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
