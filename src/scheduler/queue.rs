use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::config::TrackingConfig;
use crate::protocol::DataBurst;
use crate::tracker::{
    preparation_phase, refresh_progress, span, Actuator, PassContext, TimeWindow, TrackingError,
    TrackingState, TransitionGate,
};
use crate::trajectory::VariantSelector;

/// Queue entry for one pass.
#[derive(Debug, Clone)]
pub struct ScheduleTrackingContext {
    pub pass: PassContext,
}

impl ScheduleTrackingContext {
    pub fn new(pass: PassContext) -> Self {
        Self { pass }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.pass.master.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.pass.master.end
    }
}

/// Drives a sequence of passes, deriving the state of the active pass from
/// the reference time on every tick.
pub struct PassQueueCoordinator {
    config: TrackingConfig,
    selector: VariantSelector,
    actuator: Actuator,
    queue: VecDeque<ScheduleTrackingContext>,
    active: Option<ScheduleTrackingContext>,
    state: TrackingState,
    gate: TransitionGate,
    error_since: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl PassQueueCoordinator {
    pub fn new(config: TrackingConfig, selector: VariantSelector, actuator: Actuator) -> Self {
        Self {
            config,
            selector,
            actuator,
            queue: VecDeque::new(),
            active: None,
            state: TrackingState::Idle,
            gate: TransitionGate::default(),
            error_since: None,
            last_failure: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn active(&self) -> Option<&ScheduleTrackingContext> {
        self.active.as_ref()
    }

    pub fn active_pass_id(&self) -> Option<u64> {
        self.active.as_ref().map(|ctx| ctx.pass.pass_id)
    }

    /// Passes waiting behind the active one.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replace the queue with `pass_ids`, ordered by start time.
    ///
    /// Unknown and already finished passes are skipped. Returns the number
    /// of passes accepted.
    pub fn load(&mut self, pass_ids: &[u64], now: DateTime<Utc>) -> Result<usize, TrackingError> {
        let mut contexts: Vec<ScheduleTrackingContext> = Vec::with_capacity(pass_ids.len());
        for &pass_id in pass_ids {
            let Some(track) = self.selector.select_track(pass_id) else {
                log::warn!("Queue: pass {} not found, skipping", pass_id);
                continue;
            };
            let Some(pass) = PassContext::new(track) else {
                log::warn!("Queue: pass {} has no samples, skipping", pass_id);
                continue;
            };
            if pass.master.end <= now {
                log::info!("Queue: pass {} already ended, skipping", pass_id);
                continue;
            }
            contexts.push(ScheduleTrackingContext::new(pass));
        }
        if contexts.is_empty() {
            return Err(TrackingError::EmptyQueue);
        }
        contexts.sort_by_key(|ctx| (ctx.start(), ctx.pass.pass_id));
        let accepted = contexts.len();

        self.reset();
        self.actuator.antenna().telemetry.clear_live();
        self.queue = contexts.into();
        log::info!("Queue loaded with {} passes", accepted);
        self.activate_next(now);
        self.tick(now);
        Ok(accepted)
    }

    /// Abandon the queue and stow.
    pub fn stop(&mut self) -> Result<(), TrackingError> {
        if self.active.is_some() || !self.queue.is_empty() {
            log::info!("Queue stopped with {} passes pending", self.queue.len());
        }
        self.reset();
        let telemetry = &self.actuator.antenna().telemetry;
        telemetry.clear_live();
        telemetry.set_tracking_state(TrackingState::Idle.name());
        self.actuator.stow()
    }

    /// Drop all queue state without touching the hardware.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.active = None;
        self.state = TrackingState::Idle;
        self.gate.reset();
        self.error_since = None;
        self.last_failure = None;
        self.last_error = None;
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TrackingState {
        self.run_step(now, false)
    }

    /// The reference clock jumped: re-derive the state immediately.
    pub fn on_time_offset(&mut self, now: DateTime<Utc>) -> TrackingState {
        if let Some(active) = &self.active {
            log::info!(
                "Reference time moved to {}, re-evaluating pass {}",
                now,
                active.pass.pass_id
            );
        }
        self.run_step(now, true)
    }

    pub fn additional_data(
        &self,
        start_index_ms: u64,
        count: usize,
    ) -> Result<DataBurst, TrackingError> {
        let pass_id = self.active_pass_id().ok_or(TrackingError::NoActivePass)?;
        self.actuator
            .send_additional_data(pass_id, start_index_ms, count)
    }

    fn run_step(&mut self, now: DateTime<Utc>, force: bool) -> TrackingState {
        let result = if self.state == TrackingState::Error {
            self.recover(now)
        } else {
            self.step(now, force)
        };
        if let Err(err) = result {
            self.fail(&err, now);
        }
        self.state
    }

    fn step(&mut self, now: DateTime<Utc>, force: bool) -> Result<(), TrackingError> {
        // at most one pass switch per queued pass
        for _ in 0..=self.queue.len() + 1 {
            let telemetry = self.actuator.antenna().telemetry.latest();
            let Some(active) = self.active.as_mut() else {
                return Ok(());
            };
            refresh_progress(&mut active.pass, &telemetry, now, &self.config);

            let derived = self.derive_state(now);
            if derived != self.state {
                let motion = self.state.is_motion_phase() && derived.is_motion_phase();
                self.transition(derived, now, force || !motion)?;
            } else if self.state == TrackingState::Tracking {
                if let Some(active) = &self.active {
                    self.actuator.update_pointing(&active.pass, now);
                }
            }

            if self.state != TrackingState::PostTracking {
                return Ok(());
            }
            if !self.activate_next(now) {
                self.finish(now)?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// State implied by the reference time and the active pass's progress.
    fn derive_state(&mut self, now: DateTime<Utc>) -> TrackingState {
        let Some(active) = self.active.as_mut() else {
            return TrackingState::Idle;
        };
        let pass = &mut active.pass;
        match pass.window(now) {
            TimeWindow::Inside => {
                if !pass.progress.is_complete() {
                    log::warn!(
                        "Pass {}: state jump into tracking from {}, preparation forced complete",
                        pass.pass_id,
                        self.state
                    );
                    pass.progress.force_complete(now);
                }
                TrackingState::Tracking
            }
            TimeWindow::After => TrackingState::PostTracking,
            TimeWindow::Before => {
                if pass.master.start - now > span(self.config.preparation_window) {
                    TrackingState::Stowed
                } else {
                    preparation_phase(&pass.progress)
                        .map_or(TrackingState::Waiting, TrackingState::Preparing)
                }
            }
        }
    }

    fn transition(
        &mut self,
        next: TrackingState,
        now: DateTime<Utc>,
        forced: bool,
    ) -> Result<bool, TrackingError> {
        if !forced && !self.gate.ready(now, self.config.min_transition_interval) {
            return Ok(false);
        }
        log::info!(
            "Queue pass {:?}: {} -> {}",
            self.active_pass_id(),
            self.state,
            next
        );
        self.state = next;
        self.gate.mark(now);
        self.actuator
            .enter(next, self.active.as_mut().map(|ctx| &mut ctx.pass), now)?;
        Ok(true)
    }

    /// Make the next unexpired queued pass active. `false` when none remain.
    fn activate_next(&mut self, now: DateTime<Utc>) -> bool {
        let telemetry = &self.actuator.antenna().telemetry;
        while let Some(mut next) = self.queue.pop_front() {
            if next.end() <= now {
                log::info!("Queue: pass {} expired while waiting, skipping", next.pass.pass_id);
                continue;
            }
            next.pass.reset();
            log::info!(
                "Queue: pass {} ({}) is next, AOS {}",
                next.pass.pass_id,
                next.pass.master.satellite,
                next.start()
            );
            telemetry.set_commanded(None);
            telemetry.set_active_pass_id(Some(next.pass.pass_id));
            self.active = Some(next);
            return true;
        }
        self.active = None;
        false
    }

    fn finish(&mut self, now: DateTime<Utc>) -> Result<(), TrackingError> {
        log::info!("Queue complete, stowing");
        self.transition(TrackingState::Completed, now, true)?;
        let telemetry = &self.actuator.antenna().telemetry;
        telemetry.set_active_pass_id(None);
        self.actuator.stow()
    }

    fn recover(&mut self, now: DateTime<Utc>) -> Result<(), TrackingError> {
        let first = self.error_since.unwrap_or(now);
        let last = self.last_failure.unwrap_or(first);
        if now - last < span(self.config.error_recovery_dwell) {
            return Ok(());
        }

        if now - first >= span(self.config.error_recovery_cap) {
            log::error!(
                "Queue could not recover within {:?}, stopping",
                self.config.error_recovery_cap
            );
            if let Err(err) = self.stop() {
                log::warn!("Stow after failed recovery did not go out: {}", err);
            }
            return Ok(());
        }

        let antenna = self.actuator.antenna();
        if !antenna.transport.is_healthy() || antenna.telemetry.latest().motor_status.fault() {
            log::warn!("Link unhealthy or motors faulted, recovery deferred");
            self.last_failure = Some(now);
            return Ok(());
        }

        log::info!("Link healthy, resuming queue");
        self.state = TrackingState::Idle;
        self.step(now, true)?;
        self.error_since = None;
        self.last_failure = None;
        self.last_error = None;
        log::info!("Recovered into {}", self.state);
        Ok(())
    }

    fn fail(&mut self, err: &TrackingError, now: DateTime<Utc>) {
        log::error!(
            "Queue failed in {} for pass {:?}: {}",
            self.state,
            self.active_pass_id(),
            err
        );
        self.state = TrackingState::Error;
        self.error_since.get_or_insert(now);
        self.last_failure = Some(now);
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
    use crate::hardware::{AxisMask, SentFrame};
    use crate::tracker::testing::Rig;
    use crate::tracker::PreparePhase;
    use crate::trajectory::fixtures::{base_time, raw_pass, samples_with_rate_from};

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    /// Two one-minute passes, 10 and 20 minutes after base time.
    fn two_pass_rig() -> Rig {
        Rig::new(vec![
            raw_pass(samples_with_rate_from(base_time() + minutes(10), 600, 1.0)),
            raw_pass(samples_with_rate_from(base_time() + minutes(20), 600, 1.0)),
        ])
    }

    fn coordinator(rig: &Rig) -> PassQueueCoordinator {
        PassQueueCoordinator::new(rig.config.clone(), rig.selector.clone(), rig.actuator.clone())
    }

    #[test]
    fn far_pass_parks_the_antenna() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        assert_eq!(queue.load(&[2, 1], base_time()).unwrap(), 2);

        assert_eq!(queue.active_pass_id(), Some(1));
        assert_eq!(queue.queued(), 1);
        assert_eq!(queue.state(), TrackingState::Stowed);
        assert_eq!(rig.sim.stow_count(), 1);
        assert_eq!(rig.sim.tracking_state(), "stowed");

        // repeated ticks do not repeat the stow
        queue.tick(base_time() + chrono::Duration::seconds(1));
        assert_eq!(rig.sim.stow_count(), 1);
    }

    #[test]
    fn enters_preparation_two_minutes_before_start() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        queue.load(&[1, 2], base_time()).unwrap();

        let just_outside = base_time() + minutes(8) - chrono::Duration::milliseconds(100);
        assert_eq!(queue.tick(just_outside), TrackingState::Stowed);
        assert_eq!(
            queue.tick(base_time() + minutes(8)),
            TrackingState::Preparing(PreparePhase::TrainMoving)
        );
        assert_eq!(rig.sim.commands()[0].mask, AxisMask::TRAIN);
    }

    #[test]
    fn runs_through_both_passes_and_stows_at_the_end() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        let mut now = base_time() + minutes(7);
        queue.load(&[1, 2], now).unwrap();

        let mut tracked = Vec::new();
        while now < base_time() + minutes(22) {
            now = rig.step(now);
            let state = queue.tick(now);
            if state == TrackingState::Tracking && tracked.last() != queue.active_pass_id().as_ref() {
                tracked.push(queue.active_pass_id().unwrap_or_default());
            }
        }

        assert_eq!(tracked, vec![1, 2]);
        assert_eq!(queue.state(), TrackingState::Completed);
        assert_eq!(queue.active_pass_id(), None);
        // parked at load, parked between the passes, final stow
        assert_eq!(rig.sim.stow_count(), 3);

        let initial_bursts = rig
            .sim
            .frames()
            .iter()
            .filter(|f| matches!(f, SentFrame::InitialBurst(_)))
            .count();
        assert_eq!(initial_bursts, 2);
    }

    #[test]
    fn time_offset_into_pass_jumps_straight_to_tracking() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        queue.load(&[1, 2], base_time()).unwrap();
        assert_eq!(queue.state(), TrackingState::Stowed);

        let jumped = base_time() + minutes(10) + chrono::Duration::seconds(30);
        assert_eq!(queue.on_time_offset(jumped), TrackingState::Tracking);
        assert!(queue.active().unwrap().pass.progress.is_complete());

        let burst = rig
            .sim
            .frames()
            .into_iter()
            .find_map(|f| match f {
                SentFrame::InitialBurst(b) => Some(b),
                _ => None,
            })
            .unwrap();
        assert_eq!(burst.start_index, 300);
        // no train or az/el move on a state jump
        assert!(rig.sim.commands().is_empty());
    }

    #[test]
    fn time_offset_past_a_pass_moves_to_the_next() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        queue.load(&[1, 2], base_time()).unwrap();

        let state = queue.on_time_offset(base_time() + minutes(15));
        assert_eq!(state, TrackingState::Stowed);
        assert_eq!(queue.active_pass_id(), Some(2));
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn expired_and_unknown_passes_are_not_queued() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        assert!(matches!(
            queue.load(&[1, 2, 9], base_time() + minutes(30)),
            Err(TrackingError::EmptyQueue)
        ));
        assert_eq!(queue.load(&[1, 2, 9], base_time() + minutes(15)).unwrap(), 1);
        assert_eq!(queue.active_pass_id(), Some(2));
    }

    #[test]
    fn recovers_after_dwell_when_link_returns() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        rig.sim.set_healthy(false);
        let t = base_time();
        queue.load(&[1, 2], t).unwrap();
        assert_eq!(queue.state(), TrackingState::Error);

        rig.sim.set_healthy(true);
        assert_eq!(queue.tick(t + chrono::Duration::seconds(4)), TrackingState::Error);
        assert_eq!(queue.tick(t + chrono::Duration::seconds(5)), TrackingState::Stowed);
        assert!(queue.last_error().is_none());
        assert_eq!(rig.sim.stow_count(), 1);
    }

    #[test]
    fn recovery_waits_for_the_link_then_resumes_preparation() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        let t = base_time() + minutes(7);
        queue.load(&[1, 2], t).unwrap();
        assert_eq!(queue.state(), TrackingState::Stowed);

        // the train command at the start of preparation does not go out
        rig.sim.set_healthy(false);
        let failed_at = base_time() + minutes(8);
        assert_eq!(queue.tick(failed_at), TrackingState::Error);
        assert!(queue.last_error().is_some());

        // still down after the dwell: the next attempt is another dwell away
        let seconds = chrono::Duration::seconds;
        assert_eq!(queue.tick(failed_at + seconds(5)), TrackingState::Error);
        rig.sim.set_healthy(true);
        assert_eq!(queue.tick(failed_at + seconds(9)), TrackingState::Error);

        let resumed = queue.tick(failed_at + seconds(10));
        assert_eq!(resumed, TrackingState::Preparing(PreparePhase::TrainMoving));
        assert!(queue.last_error().is_none());
        assert_eq!(queue.active_pass_id(), Some(1));
        let commands = rig.sim.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].mask, AxisMask::TRAIN);
    }

    #[test]
    fn motion_transitions_are_spaced_by_the_gate() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        let t = base_time() + minutes(8);
        queue.load(&[1, 2], t).unwrap();
        assert_eq!(queue.state(), TrackingState::Preparing(PreparePhase::TrainMoving));

        let progress = &mut queue.active.as_mut().unwrap().pass.progress;
        progress.train_arrived_at = Some(t);

        let ms = chrono::Duration::milliseconds;
        assert_eq!(
            queue.tick(t + ms(400)),
            TrackingState::Preparing(PreparePhase::TrainMoving)
        );
        assert_eq!(
            queue.tick(t + ms(500)),
            TrackingState::Preparing(PreparePhase::TrainStabilizing)
        );
    }

    #[test]
    fn gives_up_after_recovery_cap() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        rig.sim.set_healthy(false);
        let t = base_time();
        queue.load(&[1, 2], t).unwrap();

        let mut now = t;
        while now < t + chrono::Duration::seconds(29) {
            now = now + chrono::Duration::seconds(1);
            assert_eq!(queue.tick(now), TrackingState::Error);
        }
        assert_eq!(queue.tick(t + chrono::Duration::seconds(35)), TrackingState::Idle);
        assert_eq!(queue.active_pass_id(), None);
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn stop_clears_queue_and_stows() {
        let rig = two_pass_rig();
        let mut queue = coordinator(&rig);
        queue.load(&[1, 2], base_time() + minutes(9)).unwrap();
        queue.stop().unwrap();
        assert_eq!(queue.state(), TrackingState::Idle);
        assert_eq!(queue.queued(), 0);
        assert_eq!(rig.sim.active_pass_id(), None);
        assert_eq!(queue.tick(base_time() + minutes(10)), TrackingState::Idle);
    }
}
