use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::error::LinkError;
use super::types::{AxisAngles, AxisCommand, AxisMask, AxisTelemetry, MotorStatus, PointingCommand};
use super::{TelemetryStore, Transport};
use crate::config::AntennaConfig;
use crate::protocol::{DataBurst, HeaderFrame};

/// Park position: boresight at zenith, train centred.
pub const STOW_POSITION: AxisAngles = AxisAngles {
    azimuth: 0.0,
    elevation: 90.0,
    train: 0.0,
};

const ARRIVED_EPSILON_DEG: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    Header(HeaderFrame),
    InitialBurst(DataBurst),
    AdditionalBurst(DataBurst),
}

#[derive(Debug)]
struct SimState {
    position: AxisAngles,
    target: AxisAngles,
    speeds: AxisAngles,
    healthy: bool,
    stuck_moving: bool,
    frames: Vec<SentFrame>,
    commands: Vec<AxisCommand>,
    stows: usize,
    clock_syncs: Vec<DateTime<Utc>>,
    tracking_state: String,
    active_pass_id: Option<u64>,
    commanded: Option<PointingCommand>,
}

/// In-process antenna: records every frame and command and slews its axes
/// toward their targets when advanced.
#[derive(Debug)]
pub struct SimulatedAntenna {
    slew_speed_deg_s: f64,
    train_speed_deg_s: f64,
    state: Mutex<SimState>,
}

impl SimulatedAntenna {
    pub fn new(slew_speed_deg_s: f64, train_speed_deg_s: f64) -> Self {
        Self {
            slew_speed_deg_s,
            train_speed_deg_s,
            state: Mutex::new(SimState {
                position: STOW_POSITION,
                target: STOW_POSITION,
                speeds: AxisAngles {
                    azimuth: slew_speed_deg_s,
                    elevation: slew_speed_deg_s,
                    train: train_speed_deg_s,
                },
                healthy: true,
                stuck_moving: false,
                frames: Vec::new(),
                commands: Vec::new(),
                stows: 0,
                clock_syncs: Vec::new(),
                tracking_state: "idle".to_string(),
                active_pass_id: None,
                commanded: None,
            }),
        }
    }

    pub fn from_config(config: &AntennaConfig) -> Self {
        Self::new(config.slew_speed_deg_s, config.train_speed_deg_s)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move every axis toward its target for `dt` of simulated time.
    pub fn advance(&self, dt: Duration) {
        let secs = dt.as_secs_f64();
        let mut state = self.lock();
        let SimState {
            position,
            target,
            speeds,
            ..
        } = &mut *state;
        position.azimuth = step_toward(position.azimuth, target.azimuth, speeds.azimuth * secs);
        position.elevation =
            step_toward(position.elevation, target.elevation, speeds.elevation * secs);
        position.train = step_toward(position.train, target.train, speeds.train * secs);
    }

    /// Advance in real time until the task is aborted.
    pub fn spawn_motion(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let sim = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                sim.advance(period);
            }
        })
    }

    /// Teleport all axes, cancelling any motion.
    pub fn set_position(&self, angles: AxisAngles) {
        let mut state = self.lock();
        state.position = angles;
        state.target = angles;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    /// Make az/el report "moving" even when on target.
    pub fn set_stuck_moving(&self, stuck: bool) {
        self.lock().stuck_moving = stuck;
    }

    pub fn position(&self) -> AxisAngles {
        self.lock().position
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.lock().frames.clone()
    }

    pub fn commands(&self) -> Vec<AxisCommand> {
        self.lock().commands.clone()
    }

    pub fn stow_count(&self) -> usize {
        self.lock().stows
    }

    pub fn clock_syncs(&self) -> Vec<DateTime<Utc>> {
        self.lock().clock_syncs.clone()
    }

    pub fn tracking_state(&self) -> String {
        self.lock().tracking_state.clone()
    }

    pub fn active_pass_id(&self) -> Option<u64> {
        self.lock().active_pass_id
    }

    pub fn commanded(&self) -> Option<PointingCommand> {
        self.lock().commanded
    }

    fn check_link(state: &SimState) -> Result<(), LinkError> {
        if state.healthy {
            Ok(())
        } else {
            Err(LinkError::Disconnected)
        }
    }
}

fn step_toward(current: f64, target: f64, max_step: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(delta)
    }
}

impl Transport for SimulatedAntenna {
    fn send_header(&self, frame: &HeaderFrame) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        state.frames.push(SentFrame::Header(frame.clone()));
        Ok(())
    }

    fn send_initial_burst(&self, frame: &DataBurst) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        state.frames.push(SentFrame::InitialBurst(frame.clone()));
        Ok(())
    }

    fn send_additional_burst(&self, frame: &DataBurst) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        state.frames.push(SentFrame::AdditionalBurst(frame.clone()));
        Ok(())
    }

    fn command_axes(&self, command: &AxisCommand) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        if command.mask.contains(AxisMask::AZIMUTH) {
            state.target.azimuth = command.targets.azimuth;
            state.speeds.azimuth = command.speeds.azimuth;
        }
        if command.mask.contains(AxisMask::ELEVATION) {
            state.target.elevation = command.targets.elevation;
            state.speeds.elevation = command.speeds.elevation;
        }
        if command.mask.contains(AxisMask::TRAIN) {
            state.target.train = command.targets.train;
            state.speeds.train = command.speeds.train;
        }
        state.commands.push(*command);
        Ok(())
    }

    fn stow(&self) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        state.target = STOW_POSITION;
        state.speeds = AxisAngles {
            azimuth: self.slew_speed_deg_s,
            elevation: self.slew_speed_deg_s,
            train: self.train_speed_deg_s,
        };
        state.stows += 1;
        Ok(())
    }

    fn sync_clock(&self, reference: DateTime<Utc>) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_link(&state)?;
        state.clock_syncs.push(reference);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.lock().healthy
    }
}

impl TelemetryStore for SimulatedAntenna {
    fn latest(&self) -> AxisTelemetry {
        let state = self.lock();
        let mut bits = 0;
        if state.stuck_moving || (state.position.azimuth - state.target.azimuth).abs() > ARRIVED_EPSILON_DEG {
            bits |= MotorStatus::AZ_MOVING;
        }
        if state.stuck_moving
            || (state.position.elevation - state.target.elevation).abs() > ARRIVED_EPSILON_DEG
        {
            bits |= MotorStatus::EL_MOVING;
        }
        if (state.position.train - state.target.train).abs() > ARRIVED_EPSILON_DEG {
            bits |= MotorStatus::TRAIN_MOVING;
        }
        if !state.healthy {
            bits |= MotorStatus::FAULT;
        }
        AxisTelemetry {
            azimuth_deg: state.position.azimuth,
            elevation_deg: state.position.elevation,
            train_deg: state.position.train,
            motor_status: MotorStatus(bits),
        }
    }

    fn set_tracking_state(&self, tracking_state: &str) {
        self.lock().tracking_state = tracking_state.to_string();
    }

    fn set_active_pass_id(&self, pass_id: Option<u64>) {
        self.lock().active_pass_id = pass_id;
    }

    fn set_commanded(&self, command: Option<PointingCommand>) {
        let mut state = self.lock();
        // the firmware follows the burst data, so the dish sits on the command
        if let Some(cmd) = command {
            state.position.azimuth = cmd.azimuth_deg;
            state.position.elevation = cmd.elevation_deg;
            state.target.azimuth = cmd.azimuth_deg;
            state.target.elevation = cmd.elevation_deg;
        }
        state.commanded = command;
    }

    fn clear_live(&self) {
        let mut state = self.lock();
        state.commanded = None;
        state.active_pass_id = None;
    }
}
