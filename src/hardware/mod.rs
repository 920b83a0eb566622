//! Seams to the antenna firmware link and the shared telemetry store.

mod error;
mod sim;
mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::protocol::{DataBurst, HeaderFrame};

pub use error::LinkError;
pub use sim::{SentFrame, SimulatedAntenna, STOW_POSITION};
pub use types::{AxisAngles, AxisCommand, AxisMask, AxisTelemetry, MotorStatus, PointingCommand};

/// Framed command link to the antenna firmware. Calls do not wait for motion.
pub trait Transport: Send + Sync {
    fn send_header(&self, frame: &HeaderFrame) -> Result<(), LinkError>;
    fn send_initial_burst(&self, frame: &DataBurst) -> Result<(), LinkError>;
    fn send_additional_burst(&self, frame: &DataBurst) -> Result<(), LinkError>;
    fn command_axes(&self, command: &AxisCommand) -> Result<(), LinkError>;
    fn stow(&self) -> Result<(), LinkError>;
    fn sync_clock(&self, reference: DateTime<Utc>) -> Result<(), LinkError>;
    fn is_healthy(&self) -> bool;
}

/// Live readings and published tracking state shared with other consumers.
pub trait TelemetryStore: Send + Sync {
    fn latest(&self) -> AxisTelemetry;
    fn set_tracking_state(&self, state: &str);
    fn set_active_pass_id(&self, pass_id: Option<u64>);
    fn set_commanded(&self, command: Option<PointingCommand>);
    /// Forget everything published for the previous pass.
    fn clear_live(&self);
}

/// The transport and telemetry store of one antenna.
#[derive(Clone)]
pub struct Antenna {
    pub transport: Arc<dyn Transport>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Antenna {
    pub fn new(transport: Arc<dyn Transport>, telemetry: Arc<dyn TelemetryStore>) -> Self {
        Self {
            transport,
            telemetry,
        }
    }

    pub fn simulated(sim: &Arc<SimulatedAntenna>) -> Self {
        Self {
            transport: sim.clone(),
            telemetry: sim.clone(),
        }
    }
}
