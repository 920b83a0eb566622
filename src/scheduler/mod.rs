//! Multi-pass coordination and the control loop that owns the antenna.

mod clock;
mod queue;
mod runner;

pub use clock::ReferenceClock;
pub use queue::{PassQueueCoordinator, ScheduleTrackingContext};
pub use runner::{ControlCommand, ControlHandle, ControlMode, ControlRunner, ControlStatus};
