use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PreparePhase {
    TrainMoving,
    TrainStabilizing,
    MovingToTarget,
}

/// Lifecycle of the antenna with respect to the active pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    Idle,
    Stowed,
    Preparing(PreparePhase),
    Waiting,
    Tracking,
    PostTracking,
    Completed,
    Error,
}

impl TrackingState {
    pub fn name(self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Stowed => "stowed",
            TrackingState::Preparing(PreparePhase::TrainMoving) => "preparing/train_moving",
            TrackingState::Preparing(PreparePhase::TrainStabilizing) => {
                "preparing/train_stabilizing"
            }
            TrackingState::Preparing(PreparePhase::MovingToTarget) => "preparing/moving_to_target",
            TrackingState::Waiting => "waiting",
            TrackingState::Tracking => "tracking",
            TrackingState::PostTracking => "post_tracking",
            TrackingState::Completed => "completed",
            TrackingState::Error => "error",
        }
    }

    /// States left only once hardware motion has progressed.
    pub fn is_motion_phase(self) -> bool {
        matches!(self, TrackingState::Preparing(_) | TrackingState::Waiting)
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TrackingState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
