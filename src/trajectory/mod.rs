//! Multi-variant pass trajectories and keyhole handling.

mod error;
mod generator;
mod keyhole;
mod materialize;
mod selector;
mod store;
mod transform;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::TrajectoryError;
pub use generator::TrajectoryGenerator;
pub use keyhole::{
    rate_profile, recommended_train_angle, KeyholeAnalyzer, KeyholeAssessment, MountGeometry,
    OptimizedTrain, RateProfile, MIN_RATE_SAMPLES, RATE_WINDOW,
};
pub use materialize::materialize;
pub use selector::VariantSelector;
pub use store::TrajectoryStore;
pub use transform::{tilt_transform, unwrap_into_band, wrapped_delta, MountAngles};
pub use types::{
    OptimizationSummary, PassMaster, PassMetrics, PassRecord, TrackingPoint, VariantKind,
    VariantTrack,
};

#[cfg(test)]
pub(crate) fn test_analyzer(threshold: f64) -> KeyholeAnalyzer {
    KeyholeAnalyzer::new(
        crate::config::KeyholeConfig {
            azimuth_velocity_threshold_deg_s: threshold,
            ..Default::default()
        },
        MountGeometry {
            tilt_deg: 7.0,
            wrap_limit_deg: 270.0,
        },
    )
}
