use std::sync::Arc;

use crate::config::Config;
use crate::predict::TleSet;
use crate::protocol::ProtocolFramer;
use crate::scheduler::ControlHandle;
use crate::trajectory::{TrajectoryGenerator, VariantSelector};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub selector: VariantSelector,
    pub framer: ProtocolFramer,
    pub control: ControlHandle,
    pub generator: TrajectoryGenerator,
    /// Satellites the schedule is generated for.
    pub tles: Arc<[TleSet]>,
}

/// Running control loop over a live pass (id 1) and one ten minutes out (id 2).
///
/// Regeneration yields one pass per satellite, five minutes after the
/// request start.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, crate::tracker::testing::Rig) {
    use crate::predict::{PredictError, Propagator, RawPass, ScheduleRequest};
    use crate::scheduler::{ControlRunner, ReferenceClock};
    use crate::tracker::testing::Rig;
    use crate::trajectory::fixtures::{raw_pass, samples_with_rate_from};
    use crate::trajectory::test_analyzer;

    struct UpcomingPass;

    impl Propagator for UpcomingPass {
        fn generate_schedule(&self, request: &ScheduleRequest) -> Result<Vec<RawPass>, PredictError> {
            let start = request.start + chrono::Duration::minutes(5);
            Ok(vec![raw_pass(samples_with_rate_from(start, 600, 1.0))])
        }
    }

    let rig = Rig::live();
    let (runner, control) = ControlRunner::new(
        rig.config.clone(),
        rig.selector.clone(),
        rig.actuator.clone(),
        ReferenceClock::new(),
    );
    tokio::spawn(runner.run());

    let generator = TrajectoryGenerator::new(
        rig.store.clone(),
        test_analyzer(5.0),
        Arc::new(UpcomingPass),
        1,
    );
    let tle = TleSet {
        name: Some("TESTSAT".to_string()),
        line1: "1 99999U".to_string(),
        line2: "2 99999".to_string(),
    };

    let state = AppState {
        config: Arc::new(Config::default()),
        selector: rig.selector.clone(),
        framer: rig.actuator.framer().clone(),
        control,
        generator,
        tles: Arc::from(vec![tle]),
    };
    (state, rig)
}
