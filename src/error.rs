use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::CaseSource;

/// Failures raised by the analytics engine.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("case store '{store}' unavailable: {message}")]
    SourceUnavailable { store: CaseSource, message: String },

    #[error("no active technicians in the requested cohort")]
    EmptyCohort,

    #[error("invalid window: end {end} is before start {start}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("malformed {store} case {case_id}: {reason}")]
    MalformedRecord {
        store: CaseSource,
        case_id: Uuid,
        reason: String,
    },

    #[error("technician {0} is not part of the active cohort")]
    UnknownTechnician(Uuid),

    #[error("roster lookup failed: {0}")]
    Roster(String),

    #[error("scheduling lookup failed: {0}")]
    Scheduling(String),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_window_names_both_dates() {
        let err = AnalyticsError::InvalidWindow {
            start: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "invalid window: end 2026-03-01 is before start 2026-03-10"
        );
    }

    #[test]
    fn source_unavailable_names_the_store() {
        let err = AnalyticsError::SourceUnavailable {
            store: CaseSource::Contract,
            message: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "case store 'contract' unavailable: connection reset"
        );
    }
}
