use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Coordinate-transform rendering of a pass.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariantKind {
    /// Raw two-axis geometry.
    Original,
    /// Tilt-corrected three-axis mapping, train at 0, azimuth in [0, 360).
    AxisTransformed,
    /// As `AxisTransformed`, azimuth unwrapped into the cable-wrap band.
    FinalTransformed,
    KeyholeAxisTransformed,
    KeyholeFinalTransformed,
    /// Wrapped mapping at the train angle minimising peak azimuth rate.
    KeyholeOptimizedFinalTransformed,
}

impl VariantKind {
    pub const ALL: [VariantKind; 6] = [
        VariantKind::Original,
        VariantKind::AxisTransformed,
        VariantKind::FinalTransformed,
        VariantKind::KeyholeAxisTransformed,
        VariantKind::KeyholeFinalTransformed,
        VariantKind::KeyholeOptimizedFinalTransformed,
    ];

    pub fn is_keyhole(self) -> bool {
        matches!(
            self,
            VariantKind::KeyholeAxisTransformed
                | VariantKind::KeyholeFinalTransformed
                | VariantKind::KeyholeOptimizedFinalTransformed
        )
    }
}

/// Geometry and dynamics summary of one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassMetrics {
    pub start_azimuth_deg: f64,
    pub start_elevation_deg: f64,
    pub end_azimuth_deg: f64,
    pub end_elevation_deg: f64,
    pub max_elevation_deg: f64,
    pub max_elevation_time: DateTime<Utc>,
    pub max_az_rate: f64,
    pub max_el_rate: f64,
    pub max_az_accel: f64,
    pub max_el_accel: f64,
}

/// Effect of the train-angle search on peak azimuth rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub optimized_train_angle_deg: f64,
    pub original_max_az_rate: f64,
    pub optimized_max_az_rate: f64,
    pub improvement: f64,
    pub improvement_rate_pct: f64,
}

impl OptimizationSummary {
    pub fn new(train_angle_deg: f64, original_max_az_rate: f64, optimized_max_az_rate: f64) -> Self {
        let improvement = original_max_az_rate - optimized_max_az_rate;
        let improvement_rate_pct = if original_max_az_rate > 0.0 {
            improvement / original_max_az_rate * 100.0
        } else {
            0.0
        };
        Self {
            optimized_train_angle_deg: train_angle_deg,
            original_max_az_rate,
            optimized_max_az_rate,
            improvement,
            improvement_rate_pct,
        }
    }
}

/// Master record of one pass in one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassMaster {
    pub pass_id: u64,
    pub satellite: String,
    pub norad_id: u32,
    pub detail_index: u32,
    pub variant: VariantKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub point_count: usize,
    /// Train axis position this variant was rendered for.
    pub train_angle_deg: f64,
    pub metrics: PassMetrics,
    /// Decided once from the `FinalTransformed` variant; shared by all rows.
    pub is_keyhole: bool,
    pub recommended_train_angle_deg: f64,
    pub optimization: Option<OptimizationSummary>,
}

impl PassMaster {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// One 100 ms sample of a pass variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackingPoint {
    pub index: u32,
    pub timestamp: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub altitude_km: f64,
    pub train_deg: f64,
    /// One-second "sum method" rates, absent for the first second.
    pub az_rate: Option<f64>,
    pub el_rate: Option<f64>,
    pub az_accel: Option<f64>,
    pub el_accel: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct VariantTrack {
    pub master: PassMaster,
    pub points: Arc<[TrackingPoint]>,
}

/// All variants of one pass, published and replaced as a unit.
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub pass_id: u64,
    pub detail_index: u32,
    pub variants: BTreeMap<VariantKind, VariantTrack>,
}

impl PassRecord {
    pub fn variant(&self, kind: VariantKind) -> Option<&VariantTrack> {
        self.variants.get(&kind)
    }
}
