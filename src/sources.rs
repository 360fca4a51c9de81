//! Collaborators the engine pulls from and the raw row shapes they return.
//!
//! Each case store names its columns differently. Rows cross this boundary as
//! [`RawCase`] and are turned into [`CaseRecord`] by [`RawCase::normalize`]
//! before any other component sees them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{CaseRecord, CaseSource, DateWindow, Technician};

#[derive(Debug, Clone, PartialEq)]
pub struct IndividualCaseRow {
    pub id: Uuid,
    pub assigned_technician_id: Uuid,
    pub status: String,
    pub price: Option<Decimal>,
    pub pest_type: Option<String>,
    pub completed_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusinessCaseRow {
    pub id: Uuid,
    pub primary_assignee_id: Uuid,
    pub status: String,
    pub case_price: Option<Decimal>,
    pub pest_category: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractCaseRow {
    pub id: Uuid,
    pub technician_id: Uuid,
    pub case_status: String,
    pub total_amount: Option<Decimal>,
    pub pest_kind: Option<String>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawCase {
    Individual(IndividualCaseRow),
    Business(BusinessCaseRow),
    Contract(ContractCaseRow),
}

impl RawCase {
    pub fn source(&self) -> CaseSource {
        match self {
            RawCase::Individual(_) => CaseSource::Individual,
            RawCase::Business(_) => CaseSource::Business,
            RawCase::Contract(_) => CaseSource::Contract,
        }
    }

    pub fn normalize(self) -> CaseRecord {
        let source = self.source();
        match self {
            RawCase::Individual(row) => CaseRecord {
                case_id: row.id,
                technician_id: row.assigned_technician_id,
                source,
                amount: row.price,
                pest_type: row.pest_type,
                completed_at: row.completed_date,
                status: row.status,
            },
            RawCase::Business(row) => CaseRecord {
                case_id: row.id,
                technician_id: row.primary_assignee_id,
                source,
                amount: row.case_price,
                pest_type: row.pest_category,
                completed_at: row.completed_at,
                status: row.status,
            },
            RawCase::Contract(row) => CaseRecord {
                case_id: row.id,
                technician_id: row.technician_id,
                source,
                amount: row.total_amount,
                pest_type: row.pest_kind,
                completed_at: row.closed_at,
                status: row.case_status,
            },
        }
    }
}

/// One of the three case stores.
///
/// Implementations filter on assignee, the source's completion vocabulary,
/// non-null amount and `window`.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn fetch_completed(
        &self,
        source: CaseSource,
        technician_ids: &[Uuid],
        window: DateWindow,
    ) -> anyhow::Result<Vec<RawCase>>;
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn technicians(&self) -> anyhow::Result<Vec<Technician>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledHours {
    pub technician_id: Uuid,
    pub scheduled_hours: f64,
    pub original_work_hours: f64,
    pub absence_hours: f64,
}

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    async fn hours(
        &self,
        technician_ids: &[Uuid],
        window: DateWindow,
    ) -> anyhow::Result<Vec<ScheduledHours>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub technician_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Vehicle positions for a day, in any order.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    async fn positions(
        &self,
        technician_ids: &[Uuid],
        date: NaiveDate,
    ) -> anyhow::Result<Vec<PositionFix>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn contract_rows_map_their_own_column_names() {
        let tech = Uuid::new_v4();
        let closed_at = Utc.with_ymd_and_hms(2026, 4, 2, 13, 0, 0).unwrap();
        let record = RawCase::Contract(ContractCaseRow {
            id: Uuid::new_v4(),
            technician_id: tech,
            case_status: "invoiced".to_string(),
            total_amount: Some(dec!(20000)),
            pest_kind: Some("rats".to_string()),
            closed_at,
        })
        .normalize();

        assert_eq!(record.source, CaseSource::Contract);
        assert_eq!(record.technician_id, tech);
        assert_eq!(record.amount, Some(dec!(20000)));
        assert_eq!(record.pest_type.as_deref(), Some("rats"));
        assert_eq!(record.completed_at, closed_at);
        assert!(record.is_completed());
    }

    #[test]
    fn business_rows_keep_missing_pest_category() {
        let record = RawCase::Business(BusinessCaseRow {
            id: Uuid::new_v4(),
            primary_assignee_id: Uuid::new_v4(),
            status: "completed".to_string(),
            case_price: Some(dec!(5000)),
            pest_category: None,
            completed_at: Utc.with_ymd_and_hms(2026, 4, 3, 9, 30, 0).unwrap(),
        })
        .normalize();

        assert_eq!(record.source, CaseSource::Business);
        assert_eq!(record.pest_label(), "unknown");
    }

    #[test]
    fn individual_store_does_not_accept_contract_statuses() {
        let record = RawCase::Individual(IndividualCaseRow {
            id: Uuid::new_v4(),
            assigned_technician_id: Uuid::new_v4(),
            status: "invoiced".to_string(),
            price: Some(dec!(900)),
            pest_type: Some("wasps".to_string()),
            completed_date: Utc.with_ymd_and_hms(2026, 4, 4, 8, 0, 0).unwrap(),
        })
        .normalize();

        assert!(!record.is_completed());
    }
}
