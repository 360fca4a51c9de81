//! Technician-versus-cohort deltas and the rules that turn them into advice.

use rust_decimal::prelude::ToPrimitive;

use crate::models::{CohortAverage, Comparison, PerformanceSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Revenue,
    Cases,
    AvgCaseValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Below,
    Above,
}

/// Fires when the metric's delta is strictly below / above `threshold_pct`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub metric: Metric,
    pub direction: Direction,
    pub threshold_pct: f64,
    pub recommendation: &'static str,
}

impl Rule {
    pub const fn new(
        metric: Metric,
        direction: Direction,
        threshold_pct: f64,
        recommendation: &'static str,
    ) -> Self {
        Self {
            metric,
            direction,
            threshold_pct,
            recommendation,
        }
    }

    pub fn matches(&self, comparison: &Comparison) -> bool {
        let delta = match self.metric {
            Metric::Revenue => comparison.revenue_delta_pct,
            Metric::Cases => comparison.cases_delta_pct,
            Metric::AvgCaseValue => comparison.avg_case_value_delta_pct,
        };
        match self.direction {
            Direction::Below => delta < self.threshold_pct,
            Direction::Above => delta > self.threshold_pct,
        }
    }
}

/// Evaluated in order; every matching rule adds its recommendation.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule::new(
        Metric::Revenue,
        Direction::Below,
        -10.0,
        "Focus on value-adding services to lift revenue",
    ),
    Rule::new(
        Metric::Revenue,
        Direction::Above,
        20.0,
        "Share expertise with the team",
    ),
    Rule::new(
        Metric::Cases,
        Direction::Below,
        -15.0,
        "Review scheduling to take on more cases",
    ),
    Rule::new(
        Metric::Cases,
        Direction::Above,
        25.0,
        "Watch the workload to avoid overbooking",
    ),
    Rule::new(
        Metric::AvgCaseValue,
        Direction::Below,
        -10.0,
        "Offer follow-up treatments and prevention packages",
    ),
    Rule::new(
        Metric::AvgCaseValue,
        Direction::Above,
        15.0,
        "Coach colleagues on premium service sales",
    ),
];

/// `(value - average) / average * 100`, zero when the average is zero.
pub fn delta_pct(value: f64, average: f64) -> f64 {
    if average == 0.0 {
        0.0
    } else {
        (value - average) / average * 100.0
    }
}

pub fn compare_with_rules(
    snapshot: &PerformanceSnapshot,
    average: &CohortAverage,
    rules: &[Rule],
) -> Comparison {
    let mut comparison = Comparison {
        technician_id: snapshot.technician_id,
        revenue_delta_pct: delta_pct(
            snapshot.total_revenue.to_f64().unwrap_or(0.0),
            average.total_revenue,
        ),
        cases_delta_pct: delta_pct(f64::from(snapshot.total_cases), average.total_cases),
        avg_case_value_delta_pct: delta_pct(
            snapshot.avg_case_value.to_f64().unwrap_or(0.0),
            average.avg_case_value,
        ),
        recommendations: Vec::new(),
    };

    comparison.recommendations = rules
        .iter()
        .filter(|rule| rule.matches(&comparison))
        .map(|rule| rule.recommendation.to_string())
        .collect();
    comparison
}

pub fn compare(snapshot: &PerformanceSnapshot, average: &CohortAverage) -> Comparison {
    compare_with_rules(snapshot, average, DEFAULT_RULES)
}
