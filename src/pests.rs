//! Pest-type specialization per technician and across the cohort.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::aggregate::{average, fold_by};
use crate::models::{
    CaseRecord, CaseSource, PestOverview, PestSpecialization, TechnicianExpertise,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SpecializationKey {
    technician_id: Uuid,
    pest_type: String,
    source: CaseSource,
}

/// One row per (technician, pest type, source). Cases without a pest type
/// land in the `unknown` category.
pub fn specialize(records: &[CaseRecord]) -> Vec<PestSpecialization> {
    fold_by(records, |record| SpecializationKey {
        technician_id: record.technician_id,
        pest_type: record.pest_label().to_string(),
        source: record.source,
    })
    .into_iter()
    .map(|(key, totals)| PestSpecialization {
        technician_id: key.technician_id,
        pest_type: key.pest_type,
        source: key.source,
        case_count: totals.total_cases(),
        total_revenue: totals.total_revenue(),
        avg_case_value: totals.avg_case_value(),
    })
    .collect()
}

#[derive(Default)]
struct PestRollup {
    case_count: u32,
    total_revenue: Decimal,
    revenue_by_technician: BTreeMap<Uuid, Decimal>,
}

/// Per pest type totals across technicians and sources, highest revenue first.
pub fn overview(specializations: &[PestSpecialization]) -> Vec<PestOverview> {
    let mut rollups: BTreeMap<&str, PestRollup> = BTreeMap::new();
    for row in specializations {
        let rollup = rollups.entry(row.pest_type.as_str()).or_default();
        rollup.case_count += row.case_count;
        rollup.total_revenue += row.total_revenue;
        *rollup
            .revenue_by_technician
            .entry(row.technician_id)
            .or_insert(Decimal::ZERO) += row.total_revenue;
    }

    let mut rows: Vec<PestOverview> = rollups
        .into_iter()
        .map(|(pest_type, rollup)| {
            // BTreeMap iteration is id-ordered, so the lowest id wins a tie.
            let leading_technician_id = rollup
                .revenue_by_technician
                .iter()
                .fold(None::<(Uuid, Decimal)>, |best, (id, revenue)| match best {
                    Some((_, top)) if top >= *revenue => best,
                    _ => Some((*id, *revenue)),
                })
                .map(|(id, _)| id);

            PestOverview {
                pest_type: pest_type.to_string(),
                case_count: rollup.case_count,
                total_revenue: rollup.total_revenue,
                avg_case_value: average(rollup.total_revenue, rollup.case_count),
                technician_count: rollup.revenue_by_technician.len(),
                leading_technician_id,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_revenue
            .cmp(&a.total_revenue)
            .then_with(|| a.pest_type.cmp(&b.pest_type))
    });
    rows
}

/// Source-agnostic view of what each technician handles, busiest pest first.
pub fn technician_expertise(specializations: &[PestSpecialization]) -> Vec<TechnicianExpertise> {
    let mut grouped: BTreeMap<(Uuid, &str), (u32, Decimal)> = BTreeMap::new();
    let mut cases_per_technician: BTreeMap<Uuid, u32> = BTreeMap::new();

    for row in specializations {
        let entry = grouped
            .entry((row.technician_id, row.pest_type.as_str()))
            .or_insert((0, Decimal::ZERO));
        entry.0 += row.case_count;
        entry.1 += row.total_revenue;
        *cases_per_technician.entry(row.technician_id).or_insert(0) += row.case_count;
    }

    let mut rows: Vec<TechnicianExpertise> = grouped
        .into_iter()
        .map(|((technician_id, pest_type), (case_count, total_revenue))| {
            let all_cases = cases_per_technician
                .get(&technician_id)
                .copied()
                .unwrap_or(0);
            TechnicianExpertise {
                technician_id,
                pest_type: pest_type.to_string(),
                case_count,
                total_revenue,
                share_of_cases: if all_cases == 0 {
                    0.0
                } else {
                    f64::from(case_count) / f64::from(all_cases)
                },
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.technician_id
            .cmp(&b.technician_id)
            .then_with(|| b.case_count.cmp(&a.case_count))
            .then_with(|| a.pest_type.cmp(&b.pest_type))
    });
    rows
}

/// Distinct technicians that handled at least one case of `pest_type`.
pub fn specialists(specializations: &[PestSpecialization], pest_type: &str) -> BTreeSet<Uuid> {
    specializations
        .iter()
        .filter(|row| row.pest_type.eq_ignore_ascii_case(pest_type))
        .map(|row| row.technician_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testing::{at, record};

    #[test]
    fn groups_by_technician_pest_and_source() {
        let tech = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, tech, dec!(1000), Some("rats"), at(2026, 6, 1)),
            record(CaseSource::Individual, tech, dec!(500), Some("rats"), at(2026, 6, 2)),
            record(CaseSource::Contract, tech, dec!(3000), Some("rats"), at(2026, 6, 3)),
            record(CaseSource::Business, tech, dec!(200), Some("wasps"), at(2026, 6, 4)),
        ];

        let rows = specialize(&records);

        assert_eq!(rows.len(), 3);
        let private_rats = rows
            .iter()
            .find(|row| row.pest_type == "rats" && row.source == CaseSource::Individual)
            .unwrap();
        assert_eq!(private_rats.case_count, 2);
        assert_eq!(private_rats.total_revenue, dec!(1500));
        assert_eq!(private_rats.avg_case_value, dec!(750));
    }

    #[test]
    fn missing_pest_type_becomes_unknown() {
        let tech = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Business, tech, dec!(100), None, at(2026, 6, 1)),
            record(CaseSource::Business, tech, dec!(100), Some("  "), at(2026, 6, 2)),
        ];

        let rows = specialize(&records);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pest_type, "unknown");
        assert_eq!(rows[0].case_count, 2);
    }

    #[test]
    fn overview_orders_by_revenue_and_counts_technicians() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, a, dec!(400), Some("ants"), at(2026, 6, 1)),
            record(CaseSource::Contract, b, dec!(900), Some("ants"), at(2026, 6, 2)),
            record(CaseSource::Business, a, dec!(5000), Some("bedbugs"), at(2026, 6, 3)),
        ];

        let rows = overview(&specialize(&records));

        assert_eq!(rows[0].pest_type, "bedbugs");
        assert_eq!(rows[0].technician_count, 1);
        assert_eq!(rows[1].pest_type, "ants");
        assert_eq!(rows[1].technician_count, 2);
        assert_eq!(rows[1].case_count, 2);
        assert_eq!(rows[1].avg_case_value, dec!(650));
        assert_eq!(rows[1].leading_technician_id, Some(b));
    }

    #[test]
    fn expertise_shares_sum_to_one_per_technician() {
        let tech = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, tech, dec!(10), Some("mice"), at(2026, 6, 1)),
            record(CaseSource::Contract, tech, dec!(10), Some("mice"), at(2026, 6, 2)),
            record(CaseSource::Business, tech, dec!(10), Some("mice"), at(2026, 6, 3)),
            record(CaseSource::Business, tech, dec!(10), Some("wasps"), at(2026, 6, 4)),
        ];

        let rows = technician_expertise(&specialize(&records));

        assert_eq!(rows[0].pest_type, "mice");
        assert_eq!(rows[0].case_count, 3);
        assert!((rows[0].share_of_cases - 0.75).abs() < 1e-9);
        let total: f64 = rows.iter().map(|row| row.share_of_cases).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn specialists_match_case_insensitively() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let records = vec![
            record(CaseSource::Individual, a, dec!(10), Some("Rats"), at(2026, 6, 1)),
            record(CaseSource::Individual, b, dec!(10), Some("wasps"), at(2026, 6, 1)),
        ];

        let found = specialists(&specialize(&records), "rats");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![a]);
    }
}
