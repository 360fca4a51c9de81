use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;

use crate::models::{CohortAverage, PerformanceSnapshot};

/// Orders by revenue, then case count, then technician id so equal revenue
/// never depends on the order the stores returned rows in.
fn by_standing(a: &PerformanceSnapshot, b: &PerformanceSnapshot) -> Ordering {
    b.total_revenue
        .cmp(&a.total_revenue)
        .then_with(|| b.total_cases.cmp(&a.total_cases))
        .then_with(|| a.technician_id.cmp(&b.technician_id))
}

/// Sorts snapshots best first and numbers them 1..=N.
pub fn rank(mut snapshots: Vec<PerformanceSnapshot>) -> Vec<PerformanceSnapshot> {
    snapshots.sort_by(by_standing);
    for (position, snapshot) in snapshots.iter_mut().enumerate() {
        snapshot.rank = Some(position as u32 + 1);
    }
    snapshots
}

pub fn cohort_average(snapshots: &[PerformanceSnapshot]) -> CohortAverage {
    if snapshots.is_empty() {
        return CohortAverage {
            total_revenue: 0.0,
            total_cases: 0.0,
            avg_case_value: 0.0,
        };
    }

    let count = snapshots.len() as f64;
    let sum_of = |value: fn(&PerformanceSnapshot) -> f64| -> f64 {
        snapshots.iter().map(value).sum::<f64>()
    };

    CohortAverage {
        total_revenue: sum_of(|s| s.total_revenue.to_f64().unwrap_or(0.0)) / count,
        total_cases: sum_of(|s| f64::from(s.total_cases)) / count,
        avg_case_value: sum_of(|s| s.avg_case_value.to_f64().unwrap_or(0.0)) / count,
    }
}
