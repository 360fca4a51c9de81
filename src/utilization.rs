use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{DateWindow, EfficiencyRating, UtilizationRecord};

pub const LOW_BELOW_PERCENT: f64 = 60.0;
pub const OVERBOOKED_ABOVE_PERCENT: f64 = 95.0;

#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationInput {
    pub technician_id: Uuid,
    pub period: DateWindow,
    pub scheduled_hours: f64,
    pub original_work_hours: f64,
    pub absence_hours: f64,
    pub cases_assigned: u32,
    pub avg_case_value: Decimal,
}

pub fn rate(utilization_percent: f64) -> EfficiencyRating {
    if utilization_percent < LOW_BELOW_PERCENT {
        EfficiencyRating::Low
    } else if utilization_percent <= OVERBOOKED_ABOVE_PERCENT {
        EfficiencyRating::Optimal
    } else {
        EfficiencyRating::Overbooked
    }
}

/// Utilization against hours left after absence. A technician absent the
/// whole period gets 0% and a `Low` rating; check
/// [`UtilizationRecord::is_fully_absent`] before displaying it.
pub fn utilization(input: UtilizationInput) -> UtilizationRecord {
    let original_work_hours = non_negative(input.original_work_hours);
    let absence_hours = non_negative(input.absence_hours);
    let total_work_hours = (original_work_hours - absence_hours).max(0.0);
    let scheduled_hours = non_negative(input.scheduled_hours);

    let utilization_percent = if total_work_hours > 0.0 {
        scheduled_hours / total_work_hours * 100.0
    } else {
        0.0
    };

    UtilizationRecord {
        technician_id: input.technician_id,
        period: input.period,
        scheduled_hours,
        total_work_hours,
        original_work_hours,
        absence_hours: original_work_hours - total_work_hours,
        cases_assigned: input.cases_assigned,
        avg_case_value: input.avg_case_value,
        utilization_percent,
        efficiency_rating: rate(utilization_percent),
    }
}

fn non_negative(hours: f64) -> f64 {
    if hours.is_finite() {
        hours.max(0.0)
    } else {
        0.0
    }
}
