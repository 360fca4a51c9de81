//! Entry points consumed by the presentation layer.
//!
//! Every call re-reads the roster and the case stores; nothing is cached
//! between calls.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{aggregate, sanitize};
use crate::compare::compare;
use crate::config::EngineConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::fetch::SourceFetcher;
use crate::models::{
    Analysis, CaseRecord, Comparison, DateWindow, Diagnostics, PerformanceSnapshot,
    PestOverview, PestSpecialization, RouteOptimization, Technician, TechnicianExpertise,
    TrendPoint, UtilizationRecord,
};
use crate::pests;
use crate::ranking::{cohort_average, rank};
use crate::routing::{track_length_km, DistanceEstimator, RouteOptimizer, TrackReading};
use crate::sources::{
    CaseStore, PositionFix, RosterProvider, ScheduleProvider, ScheduledHours, TelemetryProvider,
};
use crate::trend::{monthly_trend, trend_window};
use crate::utilization::{utilization, UtilizationInput};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PestReport {
    pub specializations: Vec<PestSpecialization>,
    pub overview: Vec<PestOverview>,
    pub expertise: Vec<TechnicianExpertise>,
}

pub struct AnalyticsEngine {
    roster: Arc<dyn RosterProvider>,
    schedule: Arc<dyn ScheduleProvider>,
    telemetry: Arc<dyn TelemetryProvider>,
    fetcher: SourceFetcher,
    router: RouteOptimizer,
    timeout: Duration,
}

/// How a collaborator call bounded by the deadline and the caller's token ended.
enum Bounded<T> {
    Answered(anyhow::Result<T>),
    TimedOut,
    Cancelled,
}

async fn bounded<T>(
    timeout: Duration,
    cancel: &CancellationToken,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Bounded<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(answer) => Bounded::Answered(answer),
            Err(_) => Bounded::TimedOut,
        },
    }
}

impl AnalyticsEngine {
    pub fn new(
        store: Arc<dyn CaseStore>,
        roster: Arc<dyn RosterProvider>,
        schedule: Arc<dyn ScheduleProvider>,
        telemetry: Arc<dyn TelemetryProvider>,
        estimator: Box<dyn DistanceEstimator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            roster,
            schedule,
            telemetry,
            fetcher: SourceFetcher::new(store, config),
            router: RouteOptimizer::new(estimator),
            timeout: config.timeout,
        }
    }

    /// Active technicians, optionally narrowed to `only`.
    pub async fn active_cohort(&self, only: Option<&[Uuid]>) -> AnalyticsResult<Vec<Technician>> {
        let roster = self
            .roster
            .technicians()
            .await
            .map_err(|err| AnalyticsError::Roster(format!("{err:#}")))?;

        let cohort: Vec<Technician> = roster
            .into_iter()
            .filter(|technician| technician.active)
            .filter(|technician| match only {
                Some(ids) if !ids.is_empty() => ids.contains(&technician.id),
                _ => true,
            })
            .collect();

        if cohort.is_empty() {
            return Err(AnalyticsError::EmptyCohort);
        }
        Ok(cohort)
    }

    async fn collect(
        &self,
        cohort: &[Technician],
        window: DateWindow,
        cancel: &CancellationToken,
    ) -> (Vec<CaseRecord>, Diagnostics) {
        let ids: Vec<Uuid> = cohort.iter().map(|technician| technician.id).collect();
        let outcome = self.fetcher.fetch(&ids, window, cancel).await;
        let mut diagnostics = outcome.diagnostics;

        let (records, dropped) = sanitize(outcome.records);
        diagnostics.dropped_records = dropped;

        let records: Vec<CaseRecord> = records
            .into_iter()
            .filter(|record| ids.contains(&record.technician_id))
            .collect();

        if diagnostics.partial_data {
            warn!(
                failed = ?diagnostics.failed_sources,
                timed_out = diagnostics.timed_out,
                "serving partial case data"
            );
        }
        (records, diagnostics)
    }

    pub async fn cohort_performance(
        &self,
        technician_ids: Option<&[Uuid]>,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<Vec<PerformanceSnapshot>>> {
        let window = DateWindow::new(start, end)?;
        let cohort = self.active_cohort(technician_ids).await?;
        let (records, diagnostics) = self.collect(&cohort, window, cancel).await;

        let mut totals = aggregate(&records, window);
        let snapshots = cohort
            .iter()
            .map(|technician| {
                totals
                    .remove(&technician.id)
                    .unwrap_or_else(|| PerformanceSnapshot::empty(technician.id, window))
            })
            .collect();
        let ranked = rank(snapshots);

        info!(
            %window,
            technicians = ranked.len(),
            records = records.len(),
            partial = diagnostics.partial_data,
            "cohort performance computed"
        );
        Ok(Analysis {
            data: ranked,
            diagnostics,
        })
    }

    pub async fn monthly_trend(
        &self,
        months_back: u32,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<Vec<TrendPoint>>> {
        let window = trend_window(now, months_back);
        let cohort = self.active_cohort(None).await?;
        let (records, diagnostics) = self.collect(&cohort, window, cancel).await;
        let points = monthly_trend(&records, months_back, now);

        info!(%window, points = points.len(), "monthly trend computed");
        Ok(Analysis {
            data: points,
            diagnostics,
        })
    }

    pub async fn pest_specialization(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<PestReport>> {
        let window = DateWindow::new(start, end)?;
        let cohort = self.active_cohort(None).await?;
        let (records, diagnostics) = self.collect(&cohort, window, cancel).await;

        let specializations = pests::specialize(&records);
        let report = PestReport {
            overview: pests::overview(&specializations),
            expertise: pests::technician_expertise(&specializations),
            specializations,
        };

        info!(%window, pest_types = report.overview.len(), "pest specialization computed");
        Ok(Analysis {
            data: report,
            diagnostics,
        })
    }

    pub async fn utilization(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<Vec<UtilizationRecord>>> {
        let window = DateWindow::new(start, end)?;
        let cohort = self.active_cohort(None).await?;
        let ids: Vec<Uuid> = cohort.iter().map(|technician| technician.id).collect();

        let answer = match bounded(self.timeout, cancel, self.schedule.hours(&ids, window)).await {
            Bounded::Answered(answer) => answer,
            Bounded::TimedOut => {
                return Err(AnalyticsError::Scheduling(format!(
                    "no answer within {} ms",
                    self.timeout.as_millis()
                )))
            }
            Bounded::Cancelled => {
                return Err(AnalyticsError::Scheduling("cancelled by caller".to_string()))
            }
        };
        let hours: BTreeMap<Uuid, ScheduledHours> = answer
            .map_err(|err| AnalyticsError::Scheduling(format!("{err:#}")))?
            .into_iter()
            .map(|hours| (hours.technician_id, hours))
            .collect();

        let (records, diagnostics) = self.collect(&cohort, window, cancel).await;
        let totals = aggregate(&records, window);

        let mut rows: Vec<UtilizationRecord> = cohort
            .iter()
            .map(|technician| {
                let scheduled = hours.get(&technician.id);
                let snapshot = totals.get(&technician.id);
                utilization(UtilizationInput {
                    technician_id: technician.id,
                    period: window,
                    scheduled_hours: scheduled.map_or(0.0, |h| h.scheduled_hours),
                    original_work_hours: scheduled.map_or(0.0, |h| h.original_work_hours),
                    absence_hours: scheduled.map_or(0.0, |h| h.absence_hours),
                    cases_assigned: snapshot.map_or(0, |s| s.total_cases),
                    avg_case_value: snapshot.map(|s| s.avg_case_value).unwrap_or_default(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.utilization_percent
                .total_cmp(&a.utilization_percent)
                .then_with(|| a.technician_id.cmp(&b.technician_id))
        });

        info!(%window, technicians = rows.len(), "utilization computed");
        Ok(Analysis {
            data: rows,
            diagnostics,
        })
    }

    pub async fn route_optimization(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<Vec<RouteOptimization>>> {
        let window = DateWindow::single_day(date);
        let cohort = self.active_cohort(None).await?;
        let (records, mut diagnostics) = self.collect(&cohort, window, cancel).await;

        let busy: Vec<(Uuid, u32)> = aggregate(&records, window)
            .into_iter()
            .filter(|(_, snapshot)| snapshot.total_cases > 0)
            .map(|(id, snapshot)| (id, snapshot.total_cases))
            .collect();
        let busy_ids: Vec<Uuid> = busy.iter().map(|(id, _)| *id).collect();

        let positions = self.telemetry.positions(&busy_ids, date);
        let tracks: Option<BTreeMap<Uuid, Vec<PositionFix>>> =
            match bounded(self.timeout, cancel, positions).await {
                Bounded::Answered(Ok(fixes)) => {
                    Some(fixes.into_iter().fold(BTreeMap::new(), |mut by_tech, fix| {
                        by_tech
                            .entry(fix.technician_id)
                            .or_insert_with(Vec::new)
                            .push(fix);
                        by_tech
                    }))
                }
                Bounded::Answered(Err(err)) => {
                    let message = format!("{err:#}");
                    warn!(error = %message, %date, "telemetry unavailable, estimating distances");
                    diagnostics.record_telemetry_outage();
                    None
                }
                Bounded::TimedOut | Bounded::Cancelled => {
                    warn!(%date, "telemetry did not answer, estimating distances");
                    diagnostics.record_timeout();
                    diagnostics.record_telemetry_outage();
                    None
                }
            };

        let mut routes: Vec<RouteOptimization> = busy
            .into_iter()
            .map(|(technician_id, case_count)| {
                let reading = match &tracks {
                    None => TrackReading::ProviderError,
                    Some(tracks) => tracks
                        .get(&technician_id)
                        .and_then(|fixes| track_length_km(fixes))
                        .map_or(TrackReading::Missing, |distance_km| TrackReading::Measured {
                            distance_km,
                        }),
                };
                self.router
                    .optimize(technician_id, date, case_count, reading)
            })
            .collect();
        routes.sort_by(|a, b| {
            b.optimization_score
                .cmp(&a.optimization_score)
                .then_with(|| a.technician_id.cmp(&b.technician_id))
        });

        info!(%date, routes = routes.len(), "route optimization computed");
        Ok(Analysis {
            data: routes,
            diagnostics,
        })
    }

    pub async fn technician_comparison(
        &self,
        technician_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> AnalyticsResult<Analysis<Comparison>> {
        let performance = self.cohort_performance(None, start, end, cancel).await?;
        let snapshot = performance
            .data
            .iter()
            .find(|snapshot| snapshot.technician_id == technician_id)
            .ok_or(AnalyticsError::UnknownTechnician(technician_id))?;

        let average = cohort_average(&performance.data);
        Ok(Analysis {
            data: compare(snapshot, &average),
            diagnostics: performance.diagnostics,
        })
    }
}
