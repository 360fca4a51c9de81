//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{CaseRecord, CaseSource, DateWindow, Technician};
use crate::sources::{
    BusinessCaseRow, CaseStore, ContractCaseRow, IndividualCaseRow, PositionFix, RawCase,
    RosterProvider, ScheduleProvider, ScheduledHours, TelemetryProvider,
};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn window(start: NaiveDate, end: NaiveDate) -> DateWindow {
    DateWindow::new(start, end).unwrap()
}

pub fn technician(name: &str) -> Technician {
    Technician {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role: "technician".to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        active: true,
    }
}

pub fn raw(
    source: CaseSource,
    technician_id: Uuid,
    amount: Decimal,
    pest: Option<&str>,
    completed_at: DateTime<Utc>,
) -> RawCase {
    let id = Uuid::new_v4();
    let pest = pest.map(str::to_string);
    match source {
        CaseSource::Individual => RawCase::Individual(IndividualCaseRow {
            id,
            assigned_technician_id: technician_id,
            status: "completed".to_string(),
            price: Some(amount),
            pest_type: pest,
            completed_date: completed_at,
        }),
        CaseSource::Business => RawCase::Business(BusinessCaseRow {
            id,
            primary_assignee_id: technician_id,
            status: "completed".to_string(),
            case_price: Some(amount),
            pest_category: pest,
            completed_at,
        }),
        CaseSource::Contract => RawCase::Contract(ContractCaseRow {
            id,
            technician_id,
            case_status: "closed".to_string(),
            total_amount: Some(amount),
            pest_kind: pest,
            closed_at: completed_at,
        }),
    }
}

pub fn record(
    source: CaseSource,
    technician_id: Uuid,
    amount: Decimal,
    pest: Option<&str>,
    completed_at: DateTime<Utc>,
) -> CaseRecord {
    raw(source, technician_id, amount, pest, completed_at).normalize()
}

#[derive(Default)]
pub struct FakeStore {
    pub rows: Vec<RawCase>,
    pub failing: Vec<CaseSource>,
    pub slow: Vec<CaseSource>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn with_rows(rows: Vec<RawCase>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CaseStore for FakeStore {
    async fn fetch_completed(
        &self,
        source: CaseSource,
        technician_ids: &[Uuid],
        window: DateWindow,
    ) -> anyhow::Result<Vec<RawCase>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = if self.slow.contains(&source) { 5_000 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&source) {
            anyhow::bail!("connection refused");
        }

        Ok(self
            .rows
            .iter()
            .filter(|row| row.source() == source)
            .filter(|row| {
                let record = (*row).clone().normalize();
                technician_ids.contains(&record.technician_id)
                    && window.contains(record.completed_at)
            })
            .cloned()
            .collect())
    }
}

pub struct FakeRoster(pub Vec<Technician>);

#[async_trait]
impl RosterProvider for FakeRoster {
    async fn technicians(&self) -> anyhow::Result<Vec<Technician>> {
        Ok(self.0.clone())
    }
}

pub struct FakeSchedule(pub Vec<ScheduledHours>);

#[async_trait]
impl ScheduleProvider for FakeSchedule {
    async fn hours(
        &self,
        technician_ids: &[Uuid],
        _window: DateWindow,
    ) -> anyhow::Result<Vec<ScheduledHours>> {
        Ok(self
            .0
            .iter()
            .filter(|hours| technician_ids.contains(&hours.technician_id))
            .cloned()
            .collect())
    }
}

pub enum FakeTelemetry {
    Track(Vec<PositionFix>),
    Down,
}

#[async_trait]
impl TelemetryProvider for FakeTelemetry {
    async fn positions(
        &self,
        technician_ids: &[Uuid],
        _date: NaiveDate,
    ) -> anyhow::Result<Vec<PositionFix>> {
        match self {
            FakeTelemetry::Track(fixes) => Ok(fixes
                .iter()
                .filter(|fix| technician_ids.contains(&fix.technician_id))
                .cloned()
                .collect()),
            FakeTelemetry::Down => anyhow::bail!("telemetry provider returned 503"),
        }
    }
}

/// Schedule and telemetry provider that never answers.
pub struct Stalled;

#[async_trait]
impl ScheduleProvider for Stalled {
    async fn hours(
        &self,
        _technician_ids: &[Uuid],
        _window: DateWindow,
    ) -> anyhow::Result<Vec<ScheduledHours>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("schedule provider woke up")
    }
}

#[async_trait]
impl TelemetryProvider for Stalled {
    async fn positions(
        &self,
        _technician_ids: &[Uuid],
        _date: NaiveDate,
    ) -> anyhow::Result<Vec<PositionFix>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("telemetry provider woke up")
    }
}
