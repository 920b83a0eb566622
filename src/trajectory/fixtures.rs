//! Synthetic passes shared by unit tests across the crate.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::predict::{RawPass, RawSample};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn at(start: DateTime<Utc>, index: usize) -> DateTime<Utc> {
    start + Duration::milliseconds(100 * index as i64)
}

/// Low pass with a constant azimuth slew of `rate_deg_s`.
pub fn samples_with_rate(count: usize, rate_deg_s: f64) -> Vec<RawSample> {
    samples_with_rate_from(base_time(), count, rate_deg_s)
}

pub fn samples_with_rate_from(
    start: DateTime<Utc>,
    count: usize,
    rate_deg_s: f64,
) -> Vec<RawSample> {
    (0..count)
        .map(|i| RawSample {
            timestamp: at(start, i),
            azimuth_deg: 100.0 + i as f64 * rate_deg_s / 10.0,
            elevation_deg: 20.0 + i as f64 * 0.001,
            range_km: 1500.0,
            altitude_km: 500.0,
        })
        .collect()
}

/// Straight west-to-east track passing `lateral` (in track heights) north of zenith.
pub fn overhead_pass(lateral: f64, duration_s: usize) -> Vec<RawSample> {
    let count = duration_s * 10 + 1;
    let start = base_time();
    (0..count)
        .map(|i| {
            let s = -3.0 + 6.0 * i as f64 / (count - 1) as f64;
            let norm = (s * s + lateral * lateral + 1.0).sqrt();
            RawSample {
                timestamp: at(start, i),
                azimuth_deg: s.atan2(lateral).to_degrees().rem_euclid(360.0),
                elevation_deg: (1.0 / norm).asin().to_degrees(),
                range_km: 500.0 * norm,
                altitude_km: 500.0,
            }
        })
        .collect()
}

pub fn raw_pass(samples: Vec<RawSample>) -> RawPass {
    RawPass {
        satellite: "TESTSAT".to_string(),
        norad_id: 99999,
        detail_index: 0,
        samples,
    }
}
