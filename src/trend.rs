use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::aggregate::fold_by;
use crate::models::{CaseRecord, DateWindow, TrendPoint};

/// `[today - months_back months, today]`.
pub fn trend_window(now: DateTime<Utc>, months_back: u32) -> DateWindow {
    let today = now.date_naive();
    let start = today
        .checked_sub_months(Months::new(months_back))
        .unwrap_or(NaiveDate::MIN);
    DateWindow { start, end: today }
}

fn month_label((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

/// Sparse monthly series: a month appears for a technician only if that
/// technician completed something in it.
pub fn monthly_trend(
    records: &[CaseRecord],
    months_back: u32,
    now: DateTime<Utc>,
) -> Vec<TrendPoint> {
    let window = trend_window(now, months_back);
    let in_window = records
        .iter()
        .filter(|record| window.contains(record.completed_at));

    fold_by(in_window, |record| {
        let completed = record.completed_at;
        ((completed.year(), completed.month()), record.technician_id)
    })
    .into_iter()
    .map(|((month, technician_id), totals)| TrendPoint {
        month: month_label(month),
        technician_id,
        total_revenue: totals.total_revenue(),
        total_cases: totals.total_cases(),
        revenue_by_source: totals.revenue_by_source,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::models::CaseSource;
    use crate::testing::{at, day, record};

    #[test]
    fn window_reaches_back_whole_months() {
        let window = trend_window(at(2026, 10, 18), 6);
        assert_eq!(window.start, day(2026, 4, 18));
        assert_eq!(window.end, day(2026, 10, 18));
    }

    #[test]
    fn buckets_by_calendar_month_and_skips_empty_months() {
        let tech = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, tech, dec!(100), None, at(2026, 7, 3)),
            record(CaseSource::Contract, tech, dec!(250), None, at(2026, 7, 28)),
            record(CaseSource::Business, tech, dec!(75), None, at(2026, 9, 1)),
        ];

        let points = monthly_trend(&records, 6, at(2026, 10, 18));

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].month, "2026-07");
        assert_eq!(points[0].total_revenue, dec!(350));
        assert_eq!(points[0].total_cases, 2);
        assert_eq!(points[0].revenue_by_source.contract, dec!(250));
        assert_eq!(points[1].month, "2026-09");
        assert!(points.iter().all(|point| point.month != "2026-08"));
    }

    #[test]
    fn ignores_records_before_the_window() {
        let tech = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, tech, dec!(100), None, at(2025, 12, 30)),
            record(CaseSource::Individual, tech, dec!(60), None, at(2026, 9, 2)),
        ];

        let points = monthly_trend(&records, 3, at(2026, 10, 18));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].month, "2026-09");
    }

    #[test]
    fn separates_technicians_within_a_month() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, a, dec!(10), None, at(2026, 8, 3)),
            record(CaseSource::Individual, b, dec!(20), None, at(2026, 8, 4)),
        ];

        let points = monthly_trend(&records, 12, at(2026, 10, 18));
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|point| point.month == "2026-08"));
    }
}
