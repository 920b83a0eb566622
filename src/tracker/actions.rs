use chrono::{DateTime, Utc};

use super::context::PassContext;
use super::error::TrackingError;
use super::state::{PreparePhase, TrackingState};
use crate::config::AntennaConfig;
use crate::hardware::{Antenna, AxisCommand, PointingCommand};
use crate::protocol::{DataBurst, ProtocolFramer};

/// Enter-actions and per-tick outputs shared by both state machines.
#[derive(Clone)]
pub struct Actuator {
    antenna: Antenna,
    framer: ProtocolFramer,
    slew_speed_deg_s: f64,
    train_speed_deg_s: f64,
}

impl Actuator {
    pub fn new(antenna: Antenna, framer: ProtocolFramer, config: &AntennaConfig) -> Self {
        Self {
            antenna,
            framer,
            slew_speed_deg_s: config.slew_speed_deg_s,
            train_speed_deg_s: config.train_speed_deg_s,
        }
    }

    pub fn antenna(&self) -> &Antenna {
        &self.antenna
    }

    pub fn framer(&self) -> &ProtocolFramer {
        &self.framer
    }

    /// Run the one-shot action of `state` and publish it.
    pub fn enter(
        &self,
        state: TrackingState,
        ctx: Option<&mut PassContext>,
        now: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        match (state, ctx) {
            (TrackingState::Stowed, ctx) => {
                // leaving the pass geometry invalidates any preparation
                if let Some(ctx) = ctx {
                    ctx.progress = Default::default();
                }
                self.antenna.transport.stow()?;
            }
            (TrackingState::Preparing(PreparePhase::TrainMoving), Some(ctx)) => {
                self.command_train(ctx, now)?;
            }
            (TrackingState::Preparing(PreparePhase::MovingToTarget), Some(ctx)) => {
                self.command_start_position(ctx, now)?;
            }
            (TrackingState::Waiting, Some(ctx)) => {
                self.send_header(ctx)?;
            }
            (TrackingState::Tracking, Some(ctx)) => {
                self.update_pointing(ctx, now);
                self.send_header(ctx)?;
                self.send_initial_data(ctx, now)?;
            }
            (TrackingState::PostTracking | TrackingState::Completed | TrackingState::Idle, _) => {
                self.antenna.telemetry.set_commanded(None);
            }
            _ => {}
        }
        self.antenna.telemetry.set_tracking_state(state.name());
        Ok(())
    }

    pub fn command_train(&self, ctx: &mut PassContext, now: DateTime<Utc>) -> Result<(), TrackingError> {
        if ctx.progress.train_commanded_at.is_some() {
            return Ok(());
        }
        let target = ctx.train_target_deg();
        log::info!(
            "Pass {}: moving train to {:.2}° ({})",
            ctx.pass_id,
            target,
            ctx.variant
        );
        self.antenna
            .transport
            .command_axes(&AxisCommand::train(target, self.train_speed_deg_s))?;
        ctx.progress.train_commanded_at = Some(now);
        Ok(())
    }

    pub fn command_start_position(
        &self,
        ctx: &mut PassContext,
        now: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        if ctx.progress.move_commanded_at.is_some() {
            return Ok(());
        }
        let start = *ctx.start_point();
        log::info!(
            "Pass {}: moving to start az {:.2}° el {:.2}°",
            ctx.pass_id,
            start.azimuth_deg,
            start.elevation_deg
        );
        self.antenna.transport.command_axes(&AxisCommand::az_el(
            start.azimuth_deg,
            start.elevation_deg,
            self.slew_speed_deg_s,
        ))?;
        ctx.progress.move_commanded_at = Some(now);
        Ok(())
    }

    pub fn send_header(&self, ctx: &mut PassContext) -> Result<(), TrackingError> {
        if ctx.header_sent {
            return Ok(());
        }
        let header = self.framer.build_header(ctx.pass_id)?;
        self.antenna.transport.send_header(&header)?;
        log::info!(
            "Pass {}: header sent, {} samples",
            ctx.pass_id,
            header.total_samples
        );
        ctx.header_sent = true;
        Ok(())
    }

    pub fn send_initial_data(
        &self,
        ctx: &mut PassContext,
        now: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        if ctx.initial_data_sent {
            return Ok(());
        }
        let burst = self.framer.build_initial_burst(ctx.pass_id, now)?;
        self.antenna.transport.send_initial_burst(&burst)?;
        log::info!(
            "Pass {}: initial burst sent from index {} ({} samples)",
            ctx.pass_id,
            burst.start_index,
            burst.len()
        );
        ctx.initial_data_sent = true;
        Ok(())
    }

    /// Publish the sample for `now` as the outbound pointing command.
    pub fn update_pointing(&self, ctx: &PassContext, now: DateTime<Utc>) {
        let index = ctx.sample_index(now);
        let point = &ctx.points[index];
        self.antenna.telemetry.set_commanded(Some(PointingCommand {
            timestamp: point.timestamp,
            sample_index: index,
            azimuth_deg: point.azimuth_deg,
            elevation_deg: point.elevation_deg,
            train_deg: point.train_deg,
        }));
    }

    /// Answer a firmware request for more samples of the active pass.
    pub fn send_additional_data(
        &self,
        pass_id: u64,
        start_index_ms: u64,
        count: usize,
    ) -> Result<DataBurst, TrackingError> {
        let burst = self
            .framer
            .build_additional_burst(pass_id, start_index_ms, count)?;
        self.antenna.transport.send_additional_burst(&burst)?;
        Ok(burst)
    }

    pub fn stow(&self) -> Result<(), TrackingError> {
        self.antenna.transport.stow()?;
        Ok(())
    }
}
