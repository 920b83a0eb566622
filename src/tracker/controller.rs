use chrono::{DateTime, Utc};

use super::actions::Actuator;
use super::context::PassContext;
use super::error::TrackingError;
use super::guards::{self, TimeWindow, TransitionGate};
use super::state::{PreparePhase, TrackingState};
use crate::config::TrackingConfig;
use crate::protocol::DataBurst;
use crate::trajectory::VariantSelector;

/// Sequences hardware moves and frames for one pass, one tick at a time.
pub struct TrackingController {
    config: TrackingConfig,
    selector: VariantSelector,
    actuator: Actuator,
    state: TrackingState,
    context: Option<PassContext>,
    gate: TransitionGate,
    last_error: Option<String>,
}

impl TrackingController {
    pub fn new(config: TrackingConfig, selector: VariantSelector, actuator: Actuator) -> Self {
        Self {
            config,
            selector,
            actuator,
            state: TrackingState::Idle,
            context: None,
            gate: TransitionGate::default(),
            last_error: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn context(&self) -> Option<&PassContext> {
        self.context.as_ref()
    }

    pub fn pass_id(&self) -> Option<u64> {
        self.context.as_ref().map(|ctx| ctx.pass_id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Begin a pass, superseding whatever was in flight.
    ///
    /// When `now` already lies inside the pass the controller goes straight
    /// to tracking without moving the train.
    pub fn start(&mut self, pass_id: u64, now: DateTime<Utc>) -> Result<TrackingState, TrackingError> {
        let track = self
            .selector
            .select_track(pass_id)
            .ok_or(TrackingError::PassNotFound(pass_id))?;
        let ctx = PassContext::new(track).ok_or(TrackingError::EmptyPass(pass_id))?;
        self.reset();
        self.actuator.antenna().telemetry.clear_live();
        log::info!(
            "Starting pass {} ({}) with {}, keyhole: {}, train {:.2}°",
            pass_id,
            ctx.master.satellite,
            ctx.variant,
            ctx.master.is_keyhole,
            ctx.train_target_deg()
        );
        self.actuator
            .antenna()
            .telemetry
            .set_active_pass_id(Some(pass_id));

        let first = match ctx.window(now) {
            TimeWindow::Inside => {
                log::info!("Pass {} already in progress, tracking immediately", pass_id);
                TrackingState::Tracking
            }
            TimeWindow::After => {
                log::warn!("Pass {} ended at {}, nothing to track", pass_id, ctx.master.end);
                TrackingState::Completed
            }
            TimeWindow::Before => TrackingState::Preparing(PreparePhase::TrainMoving),
        };
        self.context = Some(ctx);

        if let Err(err) = self.transition(first, now, true) {
            self.fail(&err);
            return Err(err);
        }
        Ok(self.state)
    }

    /// Abandon the pass and stow.
    pub fn stop(&mut self) -> Result<(), TrackingError> {
        if let Some(pass_id) = self.pass_id() {
            log::info!("Stopping pass {}", pass_id);
        }
        self.reset();
        let telemetry = &self.actuator.antenna().telemetry;
        telemetry.clear_live();
        telemetry.set_tracking_state(TrackingState::Idle.name());
        self.actuator.stow()
    }

    /// Drop all pass state without touching the hardware.
    pub fn reset(&mut self) {
        self.state = TrackingState::Idle;
        self.context = None;
        self.gate.reset();
        self.last_error = None;
    }

    /// Advance by one control tick. Failures land in [`TrackingState::Error`].
    pub fn tick(&mut self, now: DateTime<Utc>) -> TrackingState {
        if let Err(err) = self.step(now) {
            self.fail(&err);
        }
        self.state
    }

    pub fn additional_data(
        &self,
        start_index_ms: u64,
        count: usize,
    ) -> Result<DataBurst, TrackingError> {
        let pass_id = self.pass_id().ok_or(TrackingError::NoActivePass)?;
        self.actuator
            .send_additional_data(pass_id, start_index_ms, count)
    }

    fn step(&mut self, now: DateTime<Utc>) -> Result<(), TrackingError> {
        let active = matches!(
            self.state,
            TrackingState::Preparing(_) | TrackingState::Waiting | TrackingState::Tracking
        );
        let Some(ctx) = self.context.as_mut() else {
            return Ok(());
        };
        if !active {
            return Ok(());
        }

        let telemetry = self.actuator.antenna().telemetry.latest();
        guards::refresh_progress(ctx, &telemetry, now, &self.config);

        let next = match (self.state, ctx.window(now)) {
            (_, TimeWindow::After) => Some(TrackingState::Completed),
            (TrackingState::Tracking, TimeWindow::Inside) => {
                self.actuator.update_pointing(ctx, now);
                None
            }
            (_, TimeWindow::Inside) => {
                if !ctx.progress.is_complete() {
                    log::warn!(
                        "Pass {} started before preparation finished, tracking from {}",
                        ctx.pass_id,
                        self.state
                    );
                    ctx.progress.force_complete(now);
                }
                Some(TrackingState::Tracking)
            }
            (TrackingState::Preparing(_), TimeWindow::Before) => Some(
                guards::preparation_phase(&ctx.progress)
                    .map_or(TrackingState::Waiting, TrackingState::Preparing),
            ),
            _ => None,
        };

        if let Some(next) = next {
            let forced = !(self.state.is_motion_phase() && next.is_motion_phase());
            self.transition(next, now, forced)?;
        }
        Ok(())
    }

    fn transition(
        &mut self,
        next: TrackingState,
        now: DateTime<Utc>,
        forced: bool,
    ) -> Result<bool, TrackingError> {
        if next == self.state {
            return Ok(false);
        }
        if !forced && !self.gate.ready(now, self.config.min_transition_interval) {
            return Ok(false);
        }

        let pass_id = self.pass_id().unwrap_or_default();
        log::info!("Pass {}: {} -> {}", pass_id, self.state, next);
        self.state = next;
        self.gate.mark(now);
        self.actuator.enter(next, self.context.as_mut(), now)?;

        if next == TrackingState::Completed {
            self.actuator
                .antenna()
                .telemetry
                .set_active_pass_id(None);
            log::info!("Pass {} completed", pass_id);
        }
        Ok(true)
    }

    fn fail(&mut self, err: &TrackingError) {
        log::error!(
            "Tracking failed in {} for pass {:?}: {}",
            self.state,
            self.pass_id(),
            err
        );
        self.state = TrackingState::Error;
        self.last_error = Some(err.to_string());
        self.actuator
            .antenna()
            .telemetry
            .set_tracking_state(TrackingState::Error.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AxisAngles, AxisMask, SentFrame};
    use crate::tracker::testing::Rig;
    use crate::trajectory::fixtures::{base_time, overhead_pass, raw_pass, samples_with_rate};
    use crate::trajectory::VariantKind;

    fn controller(rig: &Rig) -> TrackingController {
        TrackingController::new(rig.config.clone(), rig.selector.clone(), rig.actuator.clone())
    }

    #[test]
    fn unknown_pass_issues_no_hardware_action() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        assert!(matches!(
            ctl.start(42, base_time()),
            Err(TrackingError::PassNotFound(42))
        ));
        assert_eq!(ctl.state(), TrackingState::Idle);
        assert!(rig.sim.commands().is_empty());
        assert!(rig.sim.frames().is_empty());
    }

    #[test]
    fn start_inside_window_skips_to_tracking() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        let now = base_time() + chrono::Duration::seconds(10);

        assert_eq!(ctl.start(1, now).unwrap(), TrackingState::Tracking);
        assert!(rig.sim.commands().is_empty());

        let frames = rig.sim.frames();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], SentFrame::Header(_)));
        match &frames[1] {
            SentFrame::InitialBurst(burst) => assert_eq!(burst.start_index, 100),
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(rig.sim.commanded().unwrap().sample_index, 100);
        assert_eq!(rig.sim.tracking_state(), "tracking");
        assert_eq!(rig.sim.active_pass_id(), Some(1));

        // one tick later the command follows the clock
        ctl.tick(now + chrono::Duration::milliseconds(300));
        assert_eq!(rig.sim.commanded().unwrap().sample_index, 103);
        assert_eq!(rig.sim.frames().len(), 2);
    }

    #[test]
    fn start_after_end_completes() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        let state = ctl.start(1, base_time() + chrono::Duration::minutes(5)).unwrap();
        assert_eq!(state, TrackingState::Completed);
        assert!(rig.sim.commands().is_empty());
    }

    #[test]
    fn prepares_then_tracks_exactly_at_start() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        let t0 = base_time();
        let mut now = t0 - chrono::Duration::seconds(150);

        assert_eq!(
            ctl.start(1, now).unwrap(),
            TrackingState::Preparing(PreparePhase::TrainMoving)
        );

        let mut seen = vec![ctl.state()];
        let mut tracking_at = None;
        while now < t0 + chrono::Duration::seconds(1) {
            now = rig.step(now);
            let state = ctl.tick(now);
            if seen.last() != Some(&state) {
                seen.push(state);
                if state == TrackingState::Tracking {
                    tracking_at = Some(now);
                }
            }
        }

        assert_eq!(
            seen,
            vec![
                TrackingState::Preparing(PreparePhase::TrainMoving),
                TrackingState::Preparing(PreparePhase::TrainStabilizing),
                TrackingState::Preparing(PreparePhase::MovingToTarget),
                TrackingState::Waiting,
                TrackingState::Tracking,
            ]
        );
        assert_eq!(tracking_at, Some(t0));

        let commands = rig.sim.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].mask, AxisMask::TRAIN);
        assert_eq!(commands[0].targets.train, 0.0);
        assert_eq!(commands[1].mask, AxisMask::AZ_EL);

        let headers = rig
            .sim
            .frames()
            .iter()
            .filter(|f| matches!(f, SentFrame::Header(_)))
            .count();
        assert_eq!(headers, 1);
        assert!(matches!(rig.sim.frames().last(), Some(SentFrame::InitialBurst(b)) if b.start_index == 0));
    }

    #[test]
    fn train_already_on_target_clears_quickly() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        let mut now = base_time() - chrono::Duration::seconds(150);
        let started = now;
        ctl.start(1, now).unwrap();

        while ctl.state() != TrackingState::Preparing(PreparePhase::MovingToTarget) {
            now = rig.step(now);
            ctl.tick(now);
        }
        // 500 ms pre-check plus 3 s stabilization
        assert_eq!(now - started, chrono::Duration::milliseconds(3500));
    }

    #[test]
    fn preparation_steps_wait_out_the_transition_gate() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        let t = base_time() - chrono::Duration::seconds(60);
        ctl.start(1, t).unwrap();

        // train reports on target in the same tick it was commanded
        ctl.context.as_mut().unwrap().progress.train_arrived_at = Some(t);

        let ms = chrono::Duration::milliseconds;
        assert_eq!(
            ctl.tick(t + ms(400)),
            TrackingState::Preparing(PreparePhase::TrainMoving)
        );
        assert_eq!(
            ctl.tick(t + ms(500)),
            TrackingState::Preparing(PreparePhase::TrainStabilizing)
        );
    }

    #[test]
    fn keyhole_pass_commands_selected_train_angle() {
        let rig = Rig::new(vec![raw_pass(overhead_pass(0.02, 300))]);
        let mut ctl = controller(&rig);
        ctl.start(1, base_time() - chrono::Duration::seconds(60)).unwrap();

        let ctx = ctl.context().unwrap();
        assert_eq!(ctx.variant, VariantKind::KeyholeOptimizedFinalTransformed);
        let commands = rig.sim.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].targets.train, ctx.master.train_angle_deg);
        assert_ne!(commands[0].targets.train, 0.0);
    }

    #[test]
    fn link_failure_lands_in_error_until_restart() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        rig.sim.set_healthy(false);

        let now = base_time() - chrono::Duration::seconds(60);
        assert!(matches!(ctl.start(1, now), Err(TrackingError::Link(_))));
        assert_eq!(ctl.state(), TrackingState::Error);
        assert!(ctl.last_error().is_some());
        assert_eq!(ctl.tick(now + chrono::Duration::seconds(1)), TrackingState::Error);

        rig.sim.set_healthy(true);
        assert_eq!(
            ctl.start(1, now).unwrap(),
            TrackingState::Preparing(PreparePhase::TrainMoving)
        );
        assert!(ctl.last_error().is_none());
    }

    #[test]
    fn stop_stows_and_clears_live_state() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        ctl.start(1, base_time() + chrono::Duration::seconds(1)).unwrap();
        ctl.stop().unwrap();

        assert_eq!(ctl.state(), TrackingState::Idle);
        assert_eq!(rig.sim.stow_count(), 1);
        assert_eq!(rig.sim.active_pass_id(), None);
        assert!(rig.sim.commanded().is_none());
        assert_eq!(rig.sim.tracking_state(), "idle");
        assert!(matches!(ctl.additional_data(0, 10), Err(TrackingError::NoActivePass)));
    }

    #[test]
    fn tracking_ends_at_los() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(100, 1.0))]);
        let mut ctl = controller(&rig);
        ctl.start(1, base_time()).unwrap();
        assert_eq!(ctl.tick(base_time() + chrono::Duration::milliseconds(9800)), TrackingState::Tracking);
        assert_eq!(ctl.tick(base_time() + chrono::Duration::milliseconds(9900)), TrackingState::Completed);
        assert_eq!(rig.sim.active_pass_id(), None);
    }

    #[test]
    fn additional_data_goes_out_on_the_link() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        let mut ctl = controller(&rig);
        ctl.start(1, base_time()).unwrap();
        let burst = ctl.additional_data(5000, 25).unwrap();
        assert_eq!(burst.start_index, 50);
        assert_eq!(burst.len(), 25);
        assert!(matches!(rig.sim.frames().last(), Some(SentFrame::AdditionalBurst(_))));
    }

    #[test]
    fn stuck_motors_still_reach_waiting() {
        let rig = Rig::new(vec![raw_pass(samples_with_rate(600, 1.0))]);
        rig.sim.set_position(AxisAngles::default());
        rig.sim.set_stuck_moving(true);
        let mut ctl = controller(&rig);
        let mut now = base_time() - chrono::Duration::seconds(119);
        ctl.start(1, now).unwrap();
        while now < base_time() - chrono::Duration::seconds(1) && ctl.state() != TrackingState::Waiting {
            now = rig.step(now);
            ctl.tick(now);
        }
        assert_eq!(ctl.state(), TrackingState::Waiting);
    }
}
