use std::collections::HashMap;
use std::fmt::Write;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    DateWindow, Diagnostics, PerformanceSnapshot, PestOverview, RouteOptimization, Technician,
    UtilizationRecord,
};

/// Amount with two decimals and space-separated thousands, e.g. `12 500.00`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    format!("{}{grouped}.{fraction}", if negative { "-" } else { "" })
}

/// Display label for a utilization row; fully absent technicians are not "low".
pub fn utilization_label(record: &UtilizationRecord) -> &'static str {
    if record.is_fully_absent() {
        "fully absent"
    } else {
        record.efficiency_rating.as_str()
    }
}

pub fn technician_names(roster: &[Technician]) -> HashMap<Uuid, &str> {
    roster
        .iter()
        .map(|technician| (technician.id, technician.name.as_str()))
        .collect()
}

fn name_of<'a>(names: &HashMap<Uuid, &'a str>, id: &Uuid) -> String {
    names
        .get(id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| id.to_string())
}

pub fn describe_diagnostics(diagnostics: &Diagnostics) -> Vec<String> {
    let mut notes = Vec::new();
    if !diagnostics.failed_sources.is_empty() {
        let sources: Vec<&str> = diagnostics
            .failed_sources
            .iter()
            .map(|source| source.as_str())
            .collect();
        notes.push(format!("Missing data from: {}", sources.join(", ")));
    }
    if diagnostics.timed_out {
        notes.push("Some data sources did not answer in time".to_string());
    }
    if diagnostics.telemetry_unavailable {
        notes.push("Vehicle telemetry unavailable, route distances are estimated".to_string());
    }
    if diagnostics.dropped_records > 0 {
        notes.push(format!(
            "{} malformed case record(s) skipped",
            diagnostics.dropped_records
        ));
    }
    notes
}

pub struct ReportInput<'a> {
    pub window: DateWindow,
    pub roster: &'a [Technician],
    pub ranking: &'a [PerformanceSnapshot],
    pub utilization: &'a [UtilizationRecord],
    pub pests: &'a [PestOverview],
    pub routes: &'a [RouteOptimization],
    pub diagnostics: &'a [&'a Diagnostics],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let names = technician_names(input.roster);
    let mut output = String::new();

    let _ = writeln!(output, "# Technician Performance Report");
    let _ = writeln!(output, "Period {} to {}", input.window.start, input.window.end);

    let mut notes: Vec<String> = input
        .diagnostics
        .iter()
        .flat_map(|diagnostics| describe_diagnostics(diagnostics))
        .collect();
    notes.sort();
    notes.dedup();
    if !notes.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Partial data:");
        for note in &notes {
            let _ = writeln!(output, "> - {note}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue Ranking");
    if input.ranking.is_empty() {
        let _ = writeln!(output, "No active technicians for this period.");
    } else {
        for snapshot in input.ranking {
            let _ = writeln!(
                output,
                "{}. {}: {} across {} cases (avg {}; individual {}, business {}, contract {})",
                snapshot.rank.unwrap_or_default(),
                name_of(&names, &snapshot.technician_id),
                format_amount(snapshot.total_revenue),
                snapshot.total_cases,
                format_amount(snapshot.avg_case_value),
                format_amount(snapshot.revenue_by_source.individual),
                format_amount(snapshot.revenue_by_source.business),
                format_amount(snapshot.revenue_by_source.contract),
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Utilization");
    if input.utilization.is_empty() {
        let _ = writeln!(output, "No schedule data for this period.");
    } else {
        for record in input.utilization {
            let _ = writeln!(
                output,
                "- {}: {:.1}% of {:.1} h available ({}), {} cases",
                name_of(&names, &record.technician_id),
                record.utilization_percent,
                record.total_work_hours,
                utilization_label(record),
                record.cases_assigned
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pest Expertise");
    if input.pests.is_empty() {
        let _ = writeln!(output, "No completed cases in this period.");
    } else {
        for pest in input.pests {
            let leader = pest
                .leading_technician_id
                .map(|id| name_of(&names, &id))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "- {}: {} cases, {} revenue, {} technicians (led by {})",
                pest.pest_type,
                pest.case_count,
                format_amount(pest.total_revenue),
                pest.technician_count,
                leader
            );
        }
    }

    if !input.routes.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Routes on {}", input.routes[0].date);
        for route in input.routes {
            let _ = writeln!(
                output,
                "- {}: score {} ({}), {:.1} km over {} cases [{}]",
                name_of(&names, &route.technician_id),
                route.optimization_score,
                route.route_efficiency.as_str(),
                route.total_distance_km,
                route.total_cases,
                route.data_source.as_str()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{CaseSource, EfficiencyRating};
    use crate::testing::{day, technician, window};
    use crate::utilization::{utilization, UtilizationInput};

    #[test]
    fn amounts_group_thousands() {
        assert_eq!(format_amount(dec!(1234567.891)), "1 234 567.89");
        assert_eq!(format_amount(dec!(950)), "950.00");
        assert_eq!(format_amount(dec!(-12500)), "-12 500.00");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn fully_absent_is_labelled_apart_from_low() {
        let period = window(day(2026, 5, 4), day(2026, 5, 8));
        let absent = utilization(UtilizationInput {
            technician_id: Uuid::new_v4(),
            period,
            scheduled_hours: 0.0,
            original_work_hours: 40.0,
            absence_hours: 40.0,
            cases_assigned: 0,
            avg_case_value: Decimal::ZERO,
        });
        let quiet = utilization(UtilizationInput {
            technician_id: Uuid::new_v4(),
            period,
            scheduled_hours: 10.0,
            original_work_hours: 40.0,
            absence_hours: 0.0,
            cases_assigned: 2,
            avg_case_value: dec!(500),
        });

        assert_eq!(absent.efficiency_rating, EfficiencyRating::Low);
        assert_eq!(utilization_label(&absent), "fully absent");
        assert_eq!(utilization_label(&quiet), "low");
    }

    #[test]
    fn telemetry_outage_is_noted() {
        let mut diagnostics = Diagnostics::default();
        assert!(describe_diagnostics(&diagnostics).is_empty());

        diagnostics.record_telemetry_outage();
        assert!(diagnostics.partial_data);
        assert_eq!(
            describe_diagnostics(&diagnostics),
            vec!["Vehicle telemetry unavailable, route distances are estimated".to_string()]
        );
    }

    #[test]
    fn report_names_technicians_and_flags_partial_data() {
        let tove = technician("Tove");
        let period = window(day(2026, 5, 1), day(2026, 5, 31));
        let mut snapshot = PerformanceSnapshot::empty(tove.id, period);
        snapshot.total_revenue = dec!(12500);
        snapshot.revenue_by_source.contract = dec!(12500);
        snapshot.total_cases = 1;
        snapshot.cases_by_source.contract = 1;
        snapshot.avg_case_value = dec!(12500);
        snapshot.rank = Some(1);

        let mut diagnostics = Diagnostics::default();
        diagnostics.record_failure(CaseSource::Business, "connection refused".to_string());

        let roster = [tove];
        let ranking = [snapshot];
        let report = build_report(&ReportInput {
            window: period,
            roster: &roster,
            ranking: &ranking,
            utilization: &[],
            pests: &[],
            routes: &[],
            diagnostics: &[&diagnostics],
        });

        assert!(report.contains("1. Tove: 12 500.00 across 1 cases"));
        assert!(report.contains("Missing data from: business"));
        assert!(report.contains("No schedule data for this period."));
    }
}
