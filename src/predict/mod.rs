//! Orbital prediction: SGP4 propagation from TLEs into 100 ms look-angle series.

mod error;
mod ground_station;
mod pass_finder;
mod propagation;
mod tle;
mod types;

pub use error::PredictError;
pub use ground_station::GroundStation;
pub use pass_finder::{predict_passes, sample_window, Sgp4Propagator};
pub use propagation::propagate_sample;
pub use tle::{load_tle_file, parse_multi_tle, parse_tle_lines, TleSet};
pub use types::{
    sample_interval, PassWindow, RawPass, RawSample, ScheduleRequest, SAMPLE_INTERVAL_MS,
};

/// Source of raw pass geometry for a satellite.
pub trait Propagator: Send + Sync {
    fn generate_schedule(&self, request: &ScheduleRequest) -> Result<Vec<RawPass>, PredictError>;
}
