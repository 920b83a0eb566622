use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which axes an [`AxisCommand`] moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AxisMask(u8);

impl AxisMask {
    pub const AZIMUTH: AxisMask = AxisMask(0b001);
    pub const ELEVATION: AxisMask = AxisMask(0b010);
    pub const TRAIN: AxisMask = AxisMask(0b100);
    pub const AZ_EL: AxisMask = AxisMask(0b011);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: AxisMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AxisMask {
    type Output = AxisMask;

    fn bitor(self, rhs: AxisMask) -> AxisMask {
        AxisMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AxisAngles {
    pub azimuth: f64,
    pub elevation: f64,
    pub train: f64,
}

/// Point-to-point move; axes outside `mask` ignore their target and speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisCommand {
    pub mask: AxisMask,
    pub targets: AxisAngles,
    pub speeds: AxisAngles,
}

impl AxisCommand {
    pub fn train(target_deg: f64, speed_deg_s: f64) -> Self {
        Self {
            mask: AxisMask::TRAIN,
            targets: AxisAngles {
                train: target_deg,
                ..Default::default()
            },
            speeds: AxisAngles {
                train: speed_deg_s,
                ..Default::default()
            },
        }
    }

    pub fn az_el(azimuth_deg: f64, elevation_deg: f64, speed_deg_s: f64) -> Self {
        Self {
            mask: AxisMask::AZ_EL,
            targets: AxisAngles {
                azimuth: azimuth_deg,
                elevation: elevation_deg,
                train: 0.0,
            },
            speeds: AxisAngles {
                azimuth: speed_deg_s,
                elevation: speed_deg_s,
                train: 0.0,
            },
        }
    }
}

/// Motor status word reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotorStatus(pub u8);

impl MotorStatus {
    pub const AZ_MOVING: u8 = 0x01;
    pub const EL_MOVING: u8 = 0x02;
    pub const TRAIN_MOVING: u8 = 0x04;
    pub const FAULT: u8 = 0x80;

    pub fn az_el_stopped(self) -> bool {
        self.0 & (Self::AZ_MOVING | Self::EL_MOVING) == 0
    }

    pub fn fault(self) -> bool {
        self.0 & Self::FAULT != 0
    }
}

/// Most recent measured axis state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AxisTelemetry {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub train_deg: f64,
    pub motor_status: MotorStatus,
}

/// Outbound pointing target published while a pass is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointingCommand {
    pub timestamp: DateTime<Utc>,
    pub sample_index: usize,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub train_deg: f64,
}
