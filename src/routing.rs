//! Route optimization score for a technician's day.
//!
//! Distance comes from the vehicle track when telemetry has one. Otherwise it
//! is estimated per case by a [`DistanceEstimator`]; the estimate is a
//! modeling approximation, not a measurement.

use std::sync::Mutex;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::config::DistanceModel;
use crate::models::{PositionSource, RouteEfficiency, RouteOptimization};
use crate::sources::PositionFix;

pub const BASELINE_SCORE: i32 = 70;
pub const BUSY_DAY_MIN_CASES: u32 = 6;
pub const BUSY_DAY_BONUS: i32 = 15;
pub const SHORT_HOP_KM: f64 = 8.0;
pub const SHORT_HOP_BONUS: i32 = 10;
pub const TELEMETRY_BONUS: i32 = 5;

const EARTH_RADIUS_KM: f64 = 6371.0;

pub trait DistanceEstimator: Send + Sync {
    fn total_km(&self, case_count: u32) -> f64;
}

/// Same distance for every case.
pub struct FixedDistance {
    pub km_per_case: f64,
}

impl DistanceEstimator for FixedDistance {
    fn total_km(&self, case_count: u32) -> f64 {
        self.km_per_case * f64::from(case_count)
    }
}

/// Each case draws its distance uniformly from `[min, max]` km.
pub struct UniformDistance {
    min_km: f64,
    max_km: f64,
    rng: Mutex<StdRng>,
}

impl UniformDistance {
    pub fn new(model: &DistanceModel) -> Self {
        let rng = match model.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            min_km: model.min_km_per_case.min(model.max_km_per_case),
            max_km: model.max_km_per_case.max(model.min_km_per_case),
            rng: Mutex::new(rng),
        }
    }
}

impl DistanceEstimator for UniformDistance {
    fn total_km(&self, case_count: u32) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (0..case_count)
            .map(|_| rng.gen_range(self.min_km..=self.max_km))
            .sum()
    }
}

/// What telemetry had to say about a technician's day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackReading {
    Measured { distance_km: f64 },
    Missing,
    ProviderError,
}

pub fn haversine_km(from: &PositionFix, to: &PositionFix) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Length of the path through `fixes` in time order; `None` with fewer than
/// two fixes.
pub fn track_length_km(fixes: &[PositionFix]) -> Option<f64> {
    if fixes.len() < 2 {
        return None;
    }
    let mut ordered: Vec<&PositionFix> = fixes.iter().collect();
    ordered.sort_by_key(|fix| fix.recorded_at);
    Some(
        ordered
            .windows(2)
            .map(|pair| haversine_km(pair[0], pair[1]))
            .sum(),
    )
}

pub fn score(case_count: u32, avg_distance_per_case_km: f64, from_telemetry: bool) -> u8 {
    let mut score = BASELINE_SCORE;
    if case_count > BUSY_DAY_MIN_CASES {
        score += BUSY_DAY_BONUS;
    }
    if case_count > 0 && avg_distance_per_case_km < SHORT_HOP_KM {
        score += SHORT_HOP_BONUS;
    }
    if from_telemetry {
        score += TELEMETRY_BONUS;
    }
    score.clamp(0, 100) as u8
}

pub fn classify(score: u8) -> RouteEfficiency {
    match score {
        85..=u8::MAX => RouteEfficiency::Excellent,
        75..=84 => RouteEfficiency::Good,
        60..=74 => RouteEfficiency::Average,
        _ => RouteEfficiency::Poor,
    }
}

pub struct RouteOptimizer {
    estimator: Box<dyn DistanceEstimator>,
}

impl RouteOptimizer {
    pub fn new(estimator: Box<dyn DistanceEstimator>) -> Self {
        Self { estimator }
    }

    pub fn optimize(
        &self,
        technician_id: Uuid,
        date: NaiveDate,
        case_count: u32,
        reading: TrackReading,
    ) -> RouteOptimization {
        let (total_distance_km, data_source) = match reading {
            TrackReading::Measured { distance_km } => (distance_km, PositionSource::Telemetry),
            TrackReading::Missing => (self.estimator.total_km(case_count), PositionSource::Estimated),
            TrackReading::ProviderError => (self.estimator.total_km(case_count), PositionSource::Error),
        };
        let avg_distance_per_case_km = if case_count == 0 {
            0.0
        } else {
            total_distance_km / f64::from(case_count)
        };
        let optimization_score = score(
            case_count,
            avg_distance_per_case_km,
            data_source == PositionSource::Telemetry,
        );

        RouteOptimization {
            technician_id,
            date,
            total_cases: case_count,
            total_distance_km: round_km(total_distance_km),
            avg_distance_per_case_km: round_km(avg_distance_per_case_km),
            optimization_score,
            route_efficiency: classify(optimization_score),
            data_source,
        }
    }
}

fn round_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}
