use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::GroundStation;

/// Fixed cadence of every trajectory sample.
pub const SAMPLE_INTERVAL_MS: i64 = 100;

pub fn sample_interval() -> Duration {
    Duration::milliseconds(SAMPLE_INTERVAL_MS)
}

/// One propagated look angle from the station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub altitude_km: f64,
}

/// A visibility window with its 100 ms look-angle series.
#[derive(Debug, Clone, Serialize)]
pub struct RawPass {
    pub satellite: String,
    pub norad_id: u32,
    /// Index of this pass among the satellite's passes on the same UTC day.
    pub detail_index: u32,
    pub samples: Vec<RawSample>,
}

impl RawPass {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// Visibility window found by the coarse scan, before resampling.
#[derive(Debug, Clone, Serialize)]
pub struct PassWindow {
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    pub tca: DateTime<Utc>,
    pub max_elevation_deg: f64,
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub tle: String,
    pub start: DateTime<Utc>,
    pub duration_days: u32,
    pub min_elevation_deg: f64,
    pub station: GroundStation,
}
