use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::clock::ReferenceClock;
use super::queue::PassQueueCoordinator;
use crate::config::TrackingConfig;
use crate::protocol::DataBurst;
use crate::tracker::{Actuator, TrackingController, TrackingError, TrackingState};
use crate::trajectory::{VariantKind, VariantSelector};

const EVICT_INTERVAL: Duration = Duration::from_secs(60);

/// Which state machine currently owns the antenna.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlMode {
    Idle,
    SinglePass,
    Queue,
}

/// Snapshot published after every tick and command.
#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    pub mode: ControlMode,
    pub state: TrackingState,
    pub pass_id: Option<u64>,
    pub variant: Option<VariantKind>,
    pub queued: usize,
    pub reference_time: DateTime<Utc>,
    pub clock_offset_ms: i64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum ControlCommand {
    StartPass {
        pass_id: u64,
        response_tx: oneshot::Sender<Result<TrackingState, TrackingError>>,
    },
    Stop {
        response_tx: oneshot::Sender<Result<(), TrackingError>>,
    },
    LoadQueue {
        pass_ids: Vec<u64>,
        response_tx: oneshot::Sender<Result<usize, TrackingError>>,
    },
    /// Move the reference clock; the active machine re-evaluates at once.
    SetTimeOffset {
        offset: chrono::Duration,
        response_tx: oneshot::Sender<ControlStatus>,
    },
    AdditionalData {
        start_index_ms: u64,
        count: usize,
        response_tx: oneshot::Sender<Result<DataBurst, TrackingError>>,
    },
    SyncClock {
        response_tx: oneshot::Sender<Result<DateTime<Utc>, TrackingError>>,
    },
    /// Drop all derived tracking data; bursts fall back to the store.
    ClearCache {
        response_tx: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the control loop.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
    status_rx: watch::Receiver<ControlStatus>,
}

impl ControlHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> Result<T, TrackingError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(command(response_tx))
            .await
            .map_err(|_| TrackingError::ControlLoopClosed)?;
        response_rx
            .await
            .map_err(|_| TrackingError::ControlLoopClosed)
    }

    pub async fn start_pass(&self, pass_id: u64) -> Result<TrackingState, TrackingError> {
        self.request(|response_tx| ControlCommand::StartPass {
            pass_id,
            response_tx,
        })
        .await?
    }

    pub async fn stop(&self) -> Result<(), TrackingError> {
        self.request(|response_tx| ControlCommand::Stop { response_tx })
            .await?
    }

    pub async fn load_queue(&self, pass_ids: Vec<u64>) -> Result<usize, TrackingError> {
        self.request(|response_tx| ControlCommand::LoadQueue {
            pass_ids,
            response_tx,
        })
        .await?
    }

    pub async fn set_time_offset(
        &self,
        offset: chrono::Duration,
    ) -> Result<ControlStatus, TrackingError> {
        self.request(|response_tx| ControlCommand::SetTimeOffset {
            offset,
            response_tx,
        })
        .await
    }

    pub async fn additional_data(
        &self,
        start_index_ms: u64,
        count: usize,
    ) -> Result<DataBurst, TrackingError> {
        self.request(|response_tx| ControlCommand::AdditionalData {
            start_index_ms,
            count,
            response_tx,
        })
        .await?
    }

    /// Push the reference time to the firmware. Returns the time sent.
    pub async fn sync_clock(&self) -> Result<DateTime<Utc>, TrackingError> {
        self.request(|response_tx| ControlCommand::SyncClock { response_tx })
            .await?
    }

    /// Returns the number of cache entries dropped.
    pub async fn clear_cache(&self) -> Result<usize, TrackingError> {
        self.request(|response_tx| ControlCommand::ClearCache { response_tx })
            .await
    }

    pub fn status(&self) -> ControlStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlStatus> {
        self.status_rx.clone()
    }
}

/// Owns both state machines and drives whichever is active from a single
/// task, so hardware commands for the antenna are never interleaved.
pub struct ControlRunner {
    tick: Duration,
    actuator: Actuator,
    controller: TrackingController,
    queue: PassQueueCoordinator,
    clock: ReferenceClock,
    mode: ControlMode,
    rx: mpsc::Receiver<ControlCommand>,
    status_tx: watch::Sender<ControlStatus>,
}

impl ControlRunner {
    pub fn new(
        config: TrackingConfig,
        selector: VariantSelector,
        actuator: Actuator,
        clock: ReferenceClock,
    ) -> (Self, ControlHandle) {
        let (tx, rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(ControlStatus {
            mode: ControlMode::Idle,
            state: TrackingState::Idle,
            pass_id: None,
            variant: None,
            queued: 0,
            reference_time: clock.now(),
            clock_offset_ms: clock.offset().num_milliseconds(),
            last_error: None,
        });

        let runner = Self {
            tick: config.tick,
            controller: TrackingController::new(
                config.clone(),
                selector.clone(),
                actuator.clone(),
            ),
            queue: PassQueueCoordinator::new(config, selector, actuator.clone()),
            actuator,
            clock,
            mode: ControlMode::Idle,
            rx,
            status_tx,
        };
        let handle = ControlHandle { tx, status_rx };
        (runner, handle)
    }

    pub async fn run(mut self) {
        log::info!("Control loop starting, tick {:?}", self.tick);
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut evict = tokio::time::interval(EVICT_INTERVAL);
        evict.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                _ = evict.tick() => {
                    let evicted = self.actuator.framer().cache().evict_expired();
                    if evicted > 0 {
                        log::debug!("Evicted {} expired tracking data entries", evicted);
                    }
                }
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
            self.publish_status();
        }

        log::info!("Control loop stopped");
    }

    fn on_tick(&mut self) {
        let now = self.clock.now();
        match self.mode {
            ControlMode::Idle => {}
            ControlMode::SinglePass => {
                self.controller.tick(now);
            }
            ControlMode::Queue => {
                self.queue.tick(now);
            }
        }
    }

    fn handle(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::StartPass {
                pass_id,
                response_tx,
            } => {
                let result = self.start_pass(pass_id);
                let _ = response_tx.send(result);
            }
            ControlCommand::Stop { response_tx } => {
                let _ = response_tx.send(self.stop());
            }
            ControlCommand::LoadQueue {
                pass_ids,
                response_tx,
            } => {
                let result = self.load_queue(&pass_ids);
                let _ = response_tx.send(result);
            }
            ControlCommand::SetTimeOffset {
                offset,
                response_tx,
            } => {
                self.set_time_offset(offset);
                let _ = response_tx.send(self.snapshot());
            }
            ControlCommand::AdditionalData {
                start_index_ms,
                count,
                response_tx,
            } => {
                let result = match self.mode {
                    ControlMode::SinglePass => {
                        self.controller.additional_data(start_index_ms, count)
                    }
                    ControlMode::Queue => self.queue.additional_data(start_index_ms, count),
                    ControlMode::Idle => Err(TrackingError::NoActivePass),
                };
                let _ = response_tx.send(result);
            }
            ControlCommand::SyncClock { response_tx } => {
                let now = self.clock.now();
                let result = self
                    .actuator
                    .antenna()
                    .transport
                    .sync_clock(now)
                    .map(|()| now)
                    .map_err(TrackingError::from);
                let _ = response_tx.send(result);
            }
            ControlCommand::ClearCache { response_tx } => {
                let dropped = self.actuator.framer().cache().clear();
                log::info!("Tracking data cache cleared, {} entries dropped", dropped);
                let _ = response_tx.send(dropped);
            }
        }
    }

    fn start_pass(&mut self, pass_id: u64) -> Result<TrackingState, TrackingError> {
        let now = self.clock.now();
        if self.mode == ControlMode::Queue {
            log::info!("Single pass {} supersedes the queue", pass_id);
        }
        let result = self.controller.start(pass_id, now);
        match &result {
            Ok(_) | Err(TrackingError::Link(_)) => {
                self.queue.reset();
                self.mode = ControlMode::SinglePass;
            }
            Err(err) => log::warn!("Pass {} not started: {}", pass_id, err),
        }
        result
    }

    fn load_queue(&mut self, pass_ids: &[u64]) -> Result<usize, TrackingError> {
        let now = self.clock.now();
        let accepted = self.queue.load(pass_ids, now)?;
        self.controller.reset();
        self.mode = ControlMode::Queue;
        Ok(accepted)
    }

    fn stop(&mut self) -> Result<(), TrackingError> {
        let result = match self.mode {
            ControlMode::Queue => self.queue.stop(),
            ControlMode::SinglePass | ControlMode::Idle => self.controller.stop(),
        };
        self.controller.reset();
        self.queue.reset();
        self.mode = ControlMode::Idle;
        result
    }

    fn set_time_offset(&mut self, offset: chrono::Duration) {
        log::info!(
            "Reference clock offset {} ms -> {} ms",
            self.clock.offset().num_milliseconds(),
            offset.num_milliseconds()
        );
        self.clock.set_offset(offset);
        let now = self.clock.now();
        match self.mode {
            ControlMode::Idle => {}
            ControlMode::SinglePass => {
                self.controller.tick(now);
            }
            ControlMode::Queue => {
                self.queue.on_time_offset(now);
            }
        }
    }

    fn snapshot(&self) -> ControlStatus {
        let (state, pass_id, variant, last_error) = match self.mode {
            ControlMode::Queue => (
                self.queue.state(),
                self.queue.active_pass_id(),
                self.queue.active().map(|ctx| ctx.pass.variant),
                self.queue.last_error(),
            ),
            ControlMode::SinglePass | ControlMode::Idle => (
                self.controller.state(),
                self.controller.pass_id(),
                self.controller.context().map(|ctx| ctx.variant),
                self.controller.last_error(),
            ),
        };
        ControlStatus {
            mode: self.mode,
            state,
            pass_id,
            variant,
            queued: self.queue.queued(),
            reference_time: self.clock.now(),
            clock_offset_ms: self.clock.offset().num_milliseconds(),
            last_error: last_error.map(str::to_string),
        }
    }

    fn publish_status(&self) {
        let status = self.snapshot();
        self.status_tx.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::testing::Rig;

    fn spawn(rig: &Rig) -> ControlHandle {
        let (runner, handle) = ControlRunner::new(
            rig.config.clone(),
            rig.selector.clone(),
            rig.actuator.clone(),
            ReferenceClock::new(),
        );
        tokio::spawn(runner.run());
        handle
    }

    #[tokio::test]
    async fn start_pass_in_progress_tracks_immediately() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        assert_eq!(handle.start_pass(1).await.unwrap(), TrackingState::Tracking);
        let burst = handle.additional_data(5000, 25).await.unwrap();
        assert_eq!(burst.start_index, 50);
        assert_eq!(burst.len(), 25);

        let mut rx = handle.subscribe();
        let status = rx
            .wait_for(|s| s.mode == ControlMode::SinglePass)
            .await
            .unwrap()
            .clone();
        assert_eq!(status.pass_id, Some(1));
        assert_eq!(status.state, TrackingState::Tracking);
        assert_eq!(status.variant, Some(VariantKind::FinalTransformed));
    }

    #[tokio::test]
    async fn unknown_pass_leaves_runner_idle() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        assert!(matches!(
            handle.start_pass(42).await,
            Err(TrackingError::PassNotFound(42))
        ));
        assert!(matches!(
            handle.additional_data(0, 10).await,
            Err(TrackingError::NoActivePass)
        ));
        assert_eq!(handle.status().mode, ControlMode::Idle);
    }

    #[tokio::test]
    async fn time_offset_moves_the_queue_into_the_next_pass() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        assert_eq!(handle.load_queue(vec![2]).await.unwrap(), 1);
        let status = handle.set_time_offset(chrono::Duration::zero()).await.unwrap();
        assert_eq!(status.mode, ControlMode::Queue);
        assert_eq!(status.state, TrackingState::Stowed);

        let status = handle
            .set_time_offset(chrono::Duration::minutes(10) + chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(status.state, TrackingState::Tracking);
        assert_eq!(status.pass_id, Some(2));
        assert_eq!(status.clock_offset_ms, 630_000);
    }

    #[tokio::test]
    async fn starting_a_pass_supersedes_the_queue() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        handle.load_queue(vec![1, 2]).await.unwrap();
        handle.start_pass(2).await.unwrap();
        let status = handle.set_time_offset(chrono::Duration::zero()).await.unwrap();
        assert_eq!(status.mode, ControlMode::SinglePass);
        assert_eq!(status.queued, 0);
        assert_eq!(status.pass_id, Some(2));
    }

    #[tokio::test]
    async fn stop_stows_and_goes_idle() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        handle.start_pass(1).await.unwrap();
        handle.stop().await.unwrap();
        let status = handle.set_time_offset(chrono::Duration::zero()).await.unwrap();
        assert_eq!(status.mode, ControlMode::Idle);
        assert_eq!(status.state, TrackingState::Idle);
        assert_eq!(rig.sim.stow_count(), 1);
        assert_eq!(rig.sim.tracking_state(), "idle");
    }

    #[tokio::test]
    async fn clock_sync_sends_reference_time() {
        let rig = Rig::live();
        let handle = spawn(&rig);

        handle
            .set_time_offset(chrono::Duration::hours(1))
            .await
            .unwrap();
        let sent = handle.sync_clock().await.unwrap();
        assert_eq!(rig.sim.clock_syncs(), vec![sent]);
        assert!(sent > Utc::now() + chrono::Duration::minutes(59));
    }

    #[tokio::test]
    async fn clear_cache_drops_derived_data() {
        let rig = Rig::live();
        let handle = spawn(&rig);
        let cache = rig.actuator.framer().cache();
        cache.build(&rig.selector, 1).unwrap();
        cache.build(&rig.selector, 2).unwrap();

        assert_eq!(handle.clear_cache().await.unwrap(), 2);
        assert!(cache.is_empty());

        // bursts still come from the store
        handle.start_pass(1).await.unwrap();
        assert_eq!(handle.additional_data(0, 10).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn closed_loop_reports_error() {
        let rig = Rig::live();
        let (runner, handle) = ControlRunner::new(
            rig.config.clone(),
            rig.selector.clone(),
            rig.actuator.clone(),
            ReferenceClock::new(),
        );
        drop(runner);
        assert!(matches!(
            handle.stop().await,
            Err(TrackingError::ControlLoopClosed)
        ));
    }
}
