use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::guards::{time_window, ArrivalMonitor, TimeWindow};
use crate::protocol::sample_index_at;
use crate::trajectory::{PassMaster, TrackingPoint, VariantKind, VariantTrack};

/// Progress of the preparation moves for one pass.
#[derive(Debug, Clone, Default)]
pub struct PrepareProgress {
    pub train_commanded_at: Option<DateTime<Utc>>,
    pub train_arrived_at: Option<DateTime<Utc>>,
    pub train_stabilized: bool,
    pub move_commanded_at: Option<DateTime<Utc>>,
    pub arrival: ArrivalMonitor,
    pub az_el_arrived: bool,
}

impl PrepareProgress {
    pub fn is_complete(&self) -> bool {
        self.train_arrived_at.is_some() && self.train_stabilized && self.az_el_arrived
    }

    /// Mark every step done without hardware confirmation.
    pub fn force_complete(&mut self, now: DateTime<Utc>) {
        self.train_arrived_at.get_or_insert(now);
        self.train_stabilized = true;
        self.az_el_arrived = true;
    }
}

/// Everything the guards and enter-actions need to drive one pass.
#[derive(Debug, Clone)]
pub struct PassContext {
    pub pass_id: u64,
    pub variant: VariantKind,
    pub master: PassMaster,
    pub points: Arc<[TrackingPoint]>,
    pub progress: PrepareProgress,
    pub header_sent: bool,
    pub initial_data_sent: bool,
}

impl PassContext {
    /// `None` when the track has no samples.
    pub fn new(track: VariantTrack) -> Option<Self> {
        if track.points.is_empty() {
            return None;
        }
        Some(Self {
            pass_id: track.master.pass_id,
            variant: track.master.variant,
            master: track.master,
            points: track.points,
            progress: PrepareProgress::default(),
            header_sent: false,
            initial_data_sent: false,
        })
    }

    /// Clear the one-shot markers.
    pub fn reset(&mut self) {
        self.progress = PrepareProgress::default();
        self.header_sent = false;
        self.initial_data_sent = false;
    }

    pub fn train_target_deg(&self) -> f64 {
        self.master.train_angle_deg
    }

    pub fn start_point(&self) -> &TrackingPoint {
        &self.points[0]
    }

    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        time_window(&self.master, now)
    }

    pub fn sample_index(&self, now: DateTime<Utc>) -> usize {
        sample_index_at(self.master.start, now, self.points.len())
    }
}
