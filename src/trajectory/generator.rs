use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::error::TrajectoryError;
use super::keyhole::KeyholeAnalyzer;
use super::materialize::materialize;
use super::store::TrajectoryStore;
use crate::predict::{Propagator, ScheduleRequest};

/// Runs propagation, variant rendering and keyhole search off the control loop.
///
/// At most `workers` requests are processed at once; each request's passes
/// are published to the store in one batch.
#[derive(Clone)]
pub struct TrajectoryGenerator {
    store: Arc<TrajectoryStore>,
    analyzer: Arc<KeyholeAnalyzer>,
    propagator: Arc<dyn Propagator>,
    permits: Arc<Semaphore>,
    next_id: Arc<AtomicU64>,
}

impl TrajectoryGenerator {
    pub fn new(
        store: Arc<TrajectoryStore>,
        analyzer: KeyholeAnalyzer,
        propagator: Arc<dyn Propagator>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            analyzer: Arc::new(analyzer),
            propagator,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generate and publish synchronously, returning the new pass ids.
    pub fn generate(&self, request: &ScheduleRequest) -> Result<Vec<u64>, TrajectoryError> {
        let raw_passes = self.propagator.generate_schedule(request)?;

        let records = raw_passes
            .iter()
            .filter(|raw| !raw.samples.is_empty())
            .map(|raw| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                materialize(id, raw, &self.analyzer)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<u64> = records.iter().map(|r| r.pass_id).collect();
        let keyholes = records
            .iter()
            .filter(|r| r.variants.values().any(|t| t.master.is_keyhole))
            .count();
        self.store.publish_all(records)?;

        log::info!(
            "Generated {} passes ({} keyhole) starting {}",
            ids.len(),
            keyholes,
            request.start
        );
        Ok(ids)
    }

    /// Queue a request on the bounded worker pool.
    pub fn submit(&self, request: ScheduleRequest) -> JoinHandle<Result<Vec<u64>, TrajectoryError>> {
        let generator = self.clone();
        tokio::spawn(async move {
            let _permit = generator
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TrajectoryError::Worker(e.to_string()))?;

            tokio::task::spawn_blocking(move || generator.generate(&request))
                .await
                .map_err(|e| TrajectoryError::Worker(e.to_string()))?
        })
    }

    /// Run every request on the pool and collect the new pass ids. Failed
    /// requests are logged and skipped.
    pub async fn generate_all(&self, requests: Vec<ScheduleRequest>) -> Vec<u64> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| self.submit(request))
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(new)) => ids.extend(new),
                Ok(Err(e)) => log::warn!("Skipping satellite: {}", e),
                Err(e) => log::warn!("Generation task failed: {}", e),
            }
        }
        ids
    }

    /// Drop every published pass and generate the schedule afresh.
    pub async fn regenerate(&self, requests: Vec<ScheduleRequest>) -> Vec<u64> {
        let dropped = self.store.len();
        self.store.clear();
        log::info!("Schedule regeneration dropped {} passes", dropped);
        self.generate_all(requests).await
    }
}
