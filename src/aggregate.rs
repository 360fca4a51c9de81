use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{CaseRecord, DateWindow, PerformanceSnapshot, SourceTotals};

/// Revenue and case counts split by source. Merging is associative and
/// commutative, so any grouping of the same records folds to the same value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseTotals {
    pub revenue_by_source: SourceTotals<Decimal>,
    pub cases_by_source: SourceTotals<u32>,
}

impl CaseTotals {
    pub fn of(record: &CaseRecord) -> Self {
        let mut totals = Self::default();
        *totals.revenue_by_source.get_mut(record.source) = record.amount.unwrap_or(Decimal::ZERO);
        *totals.cases_by_source.get_mut(record.source) = 1;
        totals
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            revenue_by_source: self.revenue_by_source + other.revenue_by_source,
            cases_by_source: self.cases_by_source + other.cases_by_source,
        }
    }

    pub fn total_revenue(&self) -> Decimal {
        self.revenue_by_source.sum()
    }

    pub fn total_cases(&self) -> u32 {
        self.cases_by_source.sum()
    }

    pub fn avg_case_value(&self) -> Decimal {
        average(self.total_revenue(), self.total_cases())
    }

    pub fn into_snapshot(self, technician_id: Uuid, period: DateWindow) -> PerformanceSnapshot {
        PerformanceSnapshot {
            technician_id,
            period,
            total_revenue: self.total_revenue(),
            total_cases: self.total_cases(),
            revenue_by_source: self.revenue_by_source,
            cases_by_source: self.cases_by_source,
            avg_case_value: self.avg_case_value(),
            rank: None,
        }
    }
}

/// Mean value rounded to cents, zero when there is nothing to divide by.
pub fn average(total: Decimal, count: u32) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        (total / Decimal::from(count)).round_dp(2)
    }
}

/// Groups records under `key` and folds each group into [`CaseTotals`].
pub fn fold_by<'a, I, K, F>(records: I, key: F) -> BTreeMap<K, CaseTotals>
where
    I: IntoIterator<Item = &'a CaseRecord>,
    K: Ord,
    F: Fn(&CaseRecord) -> K,
{
    records.into_iter().fold(BTreeMap::new(), |mut groups, record| {
        let totals = CaseTotals::of(record);
        groups
            .entry(key(record))
            .and_modify(|existing: &mut CaseTotals| *existing = existing.merge(totals))
            .or_insert(totals);
        groups
    })
}

pub fn check_record(record: &CaseRecord) -> Result<(), AnalyticsError> {
    let malformed = |reason: String| AnalyticsError::MalformedRecord {
        store: record.source,
        case_id: record.case_id,
        reason,
    };

    if !record.is_completed() {
        return Err(malformed(format!(
            "status '{}' is not a completed status",
            record.status
        )));
    }
    match record.amount {
        None => Err(malformed("amount is missing".to_string())),
        Some(amount) if amount < Decimal::ZERO => {
            Err(malformed(format!("amount {amount} is negative")))
        }
        Some(_) => Ok(()),
    }
}

/// Drops records that must not reach aggregation and returns how many went.
pub fn sanitize(records: Vec<CaseRecord>) -> (Vec<CaseRecord>, usize) {
    let mut dropped = 0usize;
    let kept = records
        .into_iter()
        .filter(|record| match check_record(record) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "dropping case record");
                dropped += 1;
                false
            }
        })
        .collect();
    (kept, dropped)
}

/// Per-technician snapshots, unranked.
pub fn aggregate(
    records: &[CaseRecord],
    period: DateWindow,
) -> BTreeMap<Uuid, PerformanceSnapshot> {
    fold_by(records, |record| record.technician_id)
        .into_iter()
        .map(|(technician_id, totals)| (technician_id, totals.into_snapshot(technician_id, period)))
        .collect()
}
