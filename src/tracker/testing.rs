use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::actions::Actuator;
use crate::config::{AntennaConfig, TrackingConfig};
use crate::hardware::{Antenna, AxisAngles, SimulatedAntenna};
use crate::predict::RawPass;
use crate::protocol::{ProtocolFramer, TrackingDataCache};
use crate::trajectory::fixtures::{raw_pass, samples_with_rate_from};
use crate::trajectory::{materialize, test_analyzer, TrajectoryStore, VariantSelector};

/// Simulated antenna wired to a store holding the given passes (ids from 1).
pub(crate) struct Rig {
    pub sim: Arc<SimulatedAntenna>,
    pub store: Arc<TrajectoryStore>,
    pub selector: VariantSelector,
    pub actuator: Actuator,
    pub config: TrackingConfig,
}

impl Rig {
    pub fn new(passes: Vec<RawPass>) -> Self {
        let store = Arc::new(TrajectoryStore::new());
        let analyzer = test_analyzer(5.0);
        let records = passes
            .iter()
            .enumerate()
            .map(|(i, raw)| materialize(i as u64 + 1, raw, &analyzer))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        store.publish_all(records).unwrap();

        let selector = VariantSelector::new(store.clone());
        let framer = ProtocolFramer::new(
            selector.clone(),
            Arc::new(TrackingDataCache::new(Duration::from_secs(3600))),
        );
        let antenna_config = AntennaConfig::default();
        let sim = Arc::new(SimulatedAntenna::from_config(&antenna_config));
        sim.set_position(AxisAngles::default());
        let actuator = Actuator::new(Antenna::simulated(&sim), framer, &antenna_config);

        Self {
            sim,
            store,
            selector,
            actuator,
            config: TrackingConfig::default(),
        }
    }

    /// Pass 1 began ten seconds ago, pass 2 starts in ten minutes. Both last
    /// two minutes.
    pub fn live() -> Self {
        let now = Utc::now();
        Self::new(vec![
            raw_pass(samples_with_rate_from(
                now - chrono::Duration::seconds(10),
                1200,
                1.0,
            )),
            raw_pass(samples_with_rate_from(
                now + chrono::Duration::minutes(10),
                1200,
                1.0,
            )),
        ])
    }

    /// Advance the simulated dish one tick and return the new reference time.
    pub fn step(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.sim.advance(Duration::from_millis(100));
        now + chrono::Duration::milliseconds(100)
    }
}
