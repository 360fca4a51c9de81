use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalyticsError;

/// Pest category used when a case carries no pest type.
pub const UNKNOWN_PEST: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSource {
    Individual,
    Business,
    Contract,
}

impl CaseSource {
    pub const ALL: [CaseSource; 3] = [
        CaseSource::Individual,
        CaseSource::Business,
        CaseSource::Contract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseSource::Individual => "individual",
            CaseSource::Business => "business",
            CaseSource::Contract => "contract",
        }
    }

    /// Status strings each store uses for a finished case.
    pub fn completed_statuses(&self) -> &'static [&'static str] {
        match self {
            CaseSource::Individual | CaseSource::Business => &["completed"],
            CaseSource::Contract => &["completed", "closed", "invoiced"],
        }
    }

    pub fn is_completed(&self, status: &str) -> bool {
        let status = status.trim();
        self.completed_statuses()
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(status))
    }
}

impl fmt::Display for CaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseSource {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" | "private" => Ok(CaseSource::Individual),
            "business" => Ok(CaseSource::Business),
            "contract" => Ok(CaseSource::Contract),
            other => Err(anyhow::anyhow!("unknown case source '{other}'")),
        }
    }
}

/// One value per case store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceTotals<T> {
    pub individual: T,
    pub business: T,
    pub contract: T,
}

impl<T> SourceTotals<T> {
    pub fn get(&self, source: CaseSource) -> &T {
        match source {
            CaseSource::Individual => &self.individual,
            CaseSource::Business => &self.business,
            CaseSource::Contract => &self.contract,
        }
    }

    pub fn get_mut(&mut self, source: CaseSource) -> &mut T {
        match source {
            CaseSource::Individual => &mut self.individual,
            CaseSource::Business => &mut self.business,
            CaseSource::Contract => &mut self.contract,
        }
    }
}

impl<T: Copy + std::iter::Sum<T>> SourceTotals<T> {
    pub fn sum(&self) -> T {
        CaseSource::ALL.iter().map(|source| *self.get(*source)).sum()
    }
}

impl<T: Copy + std::ops::Add<Output = T>> std::ops::Add for SourceTotals<T> {
    type Output = SourceTotals<T>;

    fn add(self, other: Self) -> Self::Output {
        SourceTotals {
            individual: self.individual + other.individual,
            business: self.business + other.business,
            contract: self.contract + other.contract,
        }
    }
}

/// Canonical case shape every downstream component works on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRecord {
    pub case_id: Uuid,
    pub technician_id: Uuid,
    pub source: CaseSource,
    pub amount: Option<Decimal>,
    pub pest_type: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub status: String,
}

impl CaseRecord {
    pub fn is_completed(&self) -> bool {
        self.source.is_completed(&self.status)
    }

    pub fn pest_label(&self) -> &str {
        match self.pest_type.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => UNKNOWN_PEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub email: String,
    pub active: bool,
}

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalyticsError> {
        if end < start {
            return Err(AnalyticsError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the window.
    pub fn ends_before(&self) -> DateTime<Utc> {
        match self.end.succ_opt() {
            Some(next) => next.and_time(NaiveTime::MIN).and_utc(),
            None => DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at() && at < self.ends_before()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub technician_id: Uuid,
    pub period: DateWindow,
    pub total_revenue: Decimal,
    pub total_cases: u32,
    pub revenue_by_source: SourceTotals<Decimal>,
    pub cases_by_source: SourceTotals<u32>,
    pub avg_case_value: Decimal,
    pub rank: Option<u32>,
}

impl PerformanceSnapshot {
    pub fn empty(technician_id: Uuid, period: DateWindow) -> Self {
        Self {
            technician_id,
            period,
            total_revenue: Decimal::ZERO,
            total_cases: 0,
            revenue_by_source: SourceTotals::default(),
            cases_by_source: SourceTotals::default(),
            avg_case_value: Decimal::ZERO,
            rank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyRating {
    Low,
    Optimal,
    Overbooked,
}

impl EfficiencyRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            EfficiencyRating::Low => "low",
            EfficiencyRating::Optimal => "optimal",
            EfficiencyRating::Overbooked => "overbooked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationRecord {
    pub technician_id: Uuid,
    pub period: DateWindow,
    pub scheduled_hours: f64,
    pub total_work_hours: f64,
    pub original_work_hours: f64,
    pub absence_hours: f64,
    pub cases_assigned: u32,
    pub avg_case_value: Decimal,
    pub utilization_percent: f64,
    pub efficiency_rating: EfficiencyRating,
}

impl UtilizationRecord {
    /// No work hours left after absence; displays must not call this "low".
    pub fn is_fully_absent(&self) -> bool {
        self.total_work_hours <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// `YYYY-MM`
    pub month: String,
    pub technician_id: Uuid,
    pub total_revenue: Decimal,
    pub total_cases: u32,
    pub revenue_by_source: SourceTotals<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PestSpecialization {
    pub technician_id: Uuid,
    pub pest_type: String,
    pub source: CaseSource,
    pub case_count: u32,
    pub total_revenue: Decimal,
    pub avg_case_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PestOverview {
    pub pest_type: String,
    pub case_count: u32,
    pub total_revenue: Decimal,
    pub avg_case_value: Decimal,
    pub technician_count: usize,
    pub leading_technician_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianExpertise {
    pub technician_id: Uuid,
    pub pest_type: String,
    pub case_count: u32,
    pub total_revenue: Decimal,
    pub share_of_cases: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteEfficiency {
    Excellent,
    Good,
    Average,
    Poor,
}

impl RouteEfficiency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteEfficiency::Excellent => "excellent",
            RouteEfficiency::Good => "good",
            RouteEfficiency::Average => "average",
            RouteEfficiency::Poor => "poor",
        }
    }
}

/// Where the distance figure of a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Telemetry,
    Estimated,
    Error,
}

impl PositionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSource::Telemetry => "telemetry",
            PositionSource::Estimated => "estimated",
            PositionSource::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOptimization {
    pub technician_id: Uuid,
    pub date: NaiveDate,
    pub total_cases: u32,
    pub total_distance_km: f64,
    pub avg_distance_per_case_km: f64,
    pub optimization_score: u8,
    pub route_efficiency: RouteEfficiency,
    pub data_source: PositionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAverage {
    pub total_revenue: f64,
    pub total_cases: f64,
    pub avg_case_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub technician_id: Uuid,
    pub revenue_delta_pct: f64,
    pub cases_delta_pct: f64,
    pub avg_case_value_delta_pct: f64,
    pub recommendations: Vec<String>,
}

/// What went wrong while collecting the data behind a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub partial_data: bool,
    pub failed_sources: Vec<CaseSource>,
    pub source_errors: Vec<String>,
    pub dropped_records: usize,
    pub timed_out: bool,
    /// Vehicle telemetry failed or did not answer; distances are estimates.
    pub telemetry_unavailable: bool,
}

impl Diagnostics {
    pub fn record_failure(&mut self, source: CaseSource, message: String) {
        if !self.failed_sources.contains(&source) {
            self.failed_sources.push(source);
            self.failed_sources.sort();
        }
        let failure = AnalyticsError::SourceUnavailable {
            store: source,
            message,
        };
        self.source_errors.push(failure.to_string());
        self.partial_data = true;
    }

    pub fn record_timeout(&mut self) {
        self.timed_out = true;
        self.partial_data = true;
    }

    pub fn record_telemetry_outage(&mut self) {
        self.telemetry_unavailable = true;
        self.partial_data = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis<T> {
    pub data: T,
    pub diagnostics: Diagnostics,
}
