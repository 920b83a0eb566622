//! Transition guards shared by the single-pass controller and the queue
//! coordinator. Everything here is a function of a [`PassContext`], the
//! latest telemetry and the reference time.

use chrono::{DateTime, Utc};

use super::context::{PassContext, PrepareProgress};
use super::state::PreparePhase;
use crate::config::TrackingConfig;
use crate::hardware::AxisTelemetry;
use crate::trajectory::PassMaster;

/// Convert a configured duration, saturating on overflow.
pub(crate) fn span(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Before,
    /// `start <= now < end`
    Inside,
    After,
}

pub fn time_window(master: &PassMaster, now: DateTime<Utc>) -> TimeWindow {
    if now < master.start {
        TimeWindow::Before
    } else if now < master.end {
        TimeWindow::Inside
    } else {
        TimeWindow::After
    }
}

/// Train is on target and the pre-check delay since the command has passed.
pub fn train_arrived(
    progress: &PrepareProgress,
    target_deg: f64,
    telemetry: &AxisTelemetry,
    now: DateTime<Utc>,
    config: &TrackingConfig,
) -> bool {
    let Some(commanded_at) = progress.train_commanded_at else {
        return false;
    };
    now - commanded_at >= span(config.command_precheck)
        && (target_deg - telemetry.train_deg).abs() <= config.train_tolerance_deg
}

pub fn train_stabilized(
    progress: &PrepareProgress,
    now: DateTime<Utc>,
    config: &TrackingConfig,
) -> bool {
    progress
        .train_arrived_at
        .is_some_and(|arrived| now - arrived >= span(config.train_stabilization))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Pending,
    /// On target with motors stopped for the settle time.
    Settled,
    /// On target but motors still report motion.
    Forced,
    TimedOut,
}

/// Tracks how long the az/el axes have been on target.
#[derive(Debug, Clone, Default)]
pub struct ArrivalMonitor {
    close_since: Option<DateTime<Utc>>,
    stopped_since: Option<DateTime<Utc>>,
}

impl ArrivalMonitor {
    pub fn poll(
        &mut self,
        commanded_at: DateTime<Utc>,
        target: (f64, f64),
        telemetry: &AxisTelemetry,
        now: DateTime<Utc>,
        config: &TrackingConfig,
    ) -> Arrival {
        if now - commanded_at >= span(config.move_timeout) {
            return Arrival::TimedOut;
        }

        let error = (telemetry.azimuth_deg - target.0)
            .abs()
            .max((telemetry.elevation_deg - target.1).abs());
        if error >= config.az_el_tolerance_deg {
            self.close_since = None;
            self.stopped_since = None;
            return Arrival::Pending;
        }

        let close_since = *self.close_since.get_or_insert(now);
        if telemetry.motor_status.az_el_stopped() {
            let stopped_since = *self.stopped_since.get_or_insert(now);
            if now - stopped_since >= span(config.arrival_settle) {
                return Arrival::Settled;
            }
        } else {
            self.stopped_since = None;
            if now - close_since >= span(config.forced_arrival) {
                return Arrival::Forced;
            }
        }
        Arrival::Pending
    }
}

/// Fold the latest telemetry into the context's preparation flags.
pub fn refresh_progress(
    ctx: &mut PassContext,
    telemetry: &AxisTelemetry,
    now: DateTime<Utc>,
    config: &TrackingConfig,
) {
    let target_train = ctx.train_target_deg();
    let start = *ctx.start_point();
    let pass_id = ctx.pass_id;
    let progress = &mut ctx.progress;

    if progress.train_arrived_at.is_none()
        && train_arrived(progress, target_train, telemetry, now, config)
    {
        log::debug!("Pass {}: train at {:.2}°", pass_id, telemetry.train_deg);
        progress.train_arrived_at = Some(now);
    }
    if !progress.train_stabilized && train_stabilized(progress, now, config) {
        progress.train_stabilized = true;
    }

    if progress.az_el_arrived {
        return;
    }
    let Some(commanded_at) = progress.move_commanded_at else {
        return;
    };
    match progress.arrival.poll(
        commanded_at,
        (start.azimuth_deg, start.elevation_deg),
        telemetry,
        now,
        config,
    ) {
        Arrival::Pending => {}
        Arrival::Settled => progress.az_el_arrived = true,
        Arrival::Forced => {
            log::warn!(
                "Pass {}: forcing arrival, on target but motors still report motion (status {:#04x})",
                pass_id,
                telemetry.motor_status.0
            );
            progress.az_el_arrived = true;
        }
        Arrival::TimedOut => {
            log::warn!(
                "Pass {}: start position not reached within {:?}, continuing at az {:.2}° el {:.2}°",
                pass_id,
                config.move_timeout,
                telemetry.azimuth_deg,
                telemetry.elevation_deg
            );
            progress.az_el_arrived = true;
        }
    }
}

/// Preparation phase implied by the flags, `None` once all moves are done.
pub fn preparation_phase(progress: &PrepareProgress) -> Option<PreparePhase> {
    if progress.train_arrived_at.is_none() {
        Some(PreparePhase::TrainMoving)
    } else if !progress.train_stabilized {
        Some(PreparePhase::TrainStabilizing)
    } else if !progress.az_el_arrived {
        Some(PreparePhase::MovingToTarget)
    } else {
        None
    }
}

/// Enforces the minimum spacing between motion-driven transitions.
#[derive(Debug, Clone, Default)]
pub struct TransitionGate {
    last: Option<DateTime<Utc>>,
}

impl TransitionGate {
    pub fn ready(&self, now: DateTime<Utc>, min_interval: std::time::Duration) -> bool {
        match self.last {
            Some(last) => now - last >= span(min_interval),
            None => true,
        }
    }

    pub fn mark(&mut self, now: DateTime<Utc>) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MotorStatus;
    use crate::trajectory::fixtures::base_time;

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    fn telemetry(az: f64, el: f64, train: f64, status: u8) -> AxisTelemetry {
        AxisTelemetry {
            azimuth_deg: az,
            elevation_deg: el,
            train_deg: train,
            motor_status: MotorStatus(status),
        }
    }

    #[test]
    fn train_needs_precheck_delay_and_tolerance() {
        let config = TrackingConfig::default();
        let t0 = base_time();
        let mut progress = PrepareProgress::default();
        let on_target = telemetry(0.0, 0.0, 12.05, 0);

        assert!(!train_arrived(&progress, 12.0, &on_target, t0, &config));
        progress.train_commanded_at = Some(t0);
        assert!(!train_arrived(&progress, 12.0, &on_target, t0 + ms(400), &config));
        assert!(train_arrived(&progress, 12.0, &on_target, t0 + ms(500), &config));
        let off = telemetry(0.0, 0.0, 11.8, 0);
        assert!(!train_arrived(&progress, 12.0, &off, t0 + ms(900), &config));
    }

    #[test]
    fn stabilization_counts_from_arrival() {
        let config = TrackingConfig::default();
        let t0 = base_time();
        let progress = PrepareProgress {
            train_arrived_at: Some(t0),
            ..Default::default()
        };
        assert!(!train_stabilized(&progress, t0 + ms(2900), &config));
        assert!(train_stabilized(&progress, t0 + ms(3000), &config));
    }

    #[test]
    fn arrival_settles_after_motors_stop() {
        let config = TrackingConfig::default();
        let t0 = base_time();
        let mut monitor = ArrivalMonitor::default();
        let target = (120.0, 30.0);

        let moving = telemetry(119.0, 30.0, 0.0, MotorStatus::AZ_MOVING);
        assert_eq!(monitor.poll(t0, target, &moving, t0 + ms(100), &config), Arrival::Pending);

        let stopped = telemetry(120.01, 29.99, 0.0, 0);
        let t1 = t0 + ms(5000);
        assert_eq!(monitor.poll(t0, target, &stopped, t1, &config), Arrival::Pending);
        assert_eq!(monitor.poll(t0, target, &stopped, t1 + ms(2900), &config), Arrival::Pending);
        assert_eq!(monitor.poll(t0, target, &stopped, t1 + ms(3000), &config), Arrival::Settled);
    }

    #[test]
    fn arrival_forced_when_motors_never_report_stopped() {
        let config = TrackingConfig::default();
        let t0 = base_time();
        let mut monitor = ArrivalMonitor::default();
        let close = telemetry(120.0, 30.0, 0.0, MotorStatus::AZ_MOVING | MotorStatus::EL_MOVING);
        assert_eq!(monitor.poll(t0, (120.0, 30.0), &close, t0 + ms(1000), &config), Arrival::Pending);
        assert_eq!(monitor.poll(t0, (120.0, 30.0), &close, t0 + ms(10_900), &config), Arrival::Pending);
        assert_eq!(monitor.poll(t0, (120.0, 30.0), &close, t0 + ms(11_000), &config), Arrival::Forced);
    }

    #[test]
    fn arrival_times_out_far_from_target() {
        let config = TrackingConfig::default();
        let t0 = base_time();
        let mut monitor = ArrivalMonitor::default();
        let far = telemetry(10.0, 80.0, 0.0, MotorStatus::AZ_MOVING);
        assert_eq!(monitor.poll(t0, (120.0, 30.0), &far, t0 + ms(119_900), &config), Arrival::Pending);
        assert_eq!(monitor.poll(t0, (120.0, 30.0), &far, t0 + ms(120_000), &config), Arrival::TimedOut);
    }

    #[test]
    fn phase_follows_flag_progress() {
        let t0 = base_time();
        let mut progress = PrepareProgress::default();
        assert_eq!(preparation_phase(&progress), Some(PreparePhase::TrainMoving));
        progress.train_arrived_at = Some(t0);
        assert_eq!(preparation_phase(&progress), Some(PreparePhase::TrainStabilizing));
        progress.train_stabilized = true;
        assert_eq!(preparation_phase(&progress), Some(PreparePhase::MovingToTarget));
        progress.az_el_arrived = true;
        assert_eq!(preparation_phase(&progress), None);
        assert!(progress.is_complete());
    }

    #[test]
    fn gate_spaces_transitions() {
        let t0 = base_time();
        let min = std::time::Duration::from_millis(500);
        let mut gate = TransitionGate::default();
        assert!(gate.ready(t0, min));
        gate.mark(t0);
        assert!(!gate.ready(t0 + ms(400), min));
        assert!(gate.ready(t0 + ms(500), min));
    }
}
