use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::trajectory::VariantSelector;

/// Flattened sample of the operational variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedSample {
    pub timestamp: DateTime<Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
}

#[derive(Debug)]
struct CacheEntry {
    samples: Arc<[CachedSample]>,
    built_at: Instant,
}

/// Index-addressable sample arrays per pass, rebuilt in the background.
#[derive(Debug)]
pub struct TrackingDataCache {
    ttl: Duration,
    entries: RwLock<HashMap<u64, CacheEntry>>,
    building: Mutex<HashSet<u64>>,
}

impl TrackingDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            building: Mutex::new(HashSet::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Samples for the pass if an unexpired entry exists.
    pub fn get(&self, pass_id: u64) -> Option<Arc<[CachedSample]>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&pass_id)
            .filter(|entry| entry.built_at.elapsed() < self.ttl)
            .map(|entry| entry.samples.clone())
    }

    pub fn insert(&self, pass_id: u64, samples: Arc<[CachedSample]>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                pass_id,
                CacheEntry {
                    samples,
                    built_at: Instant::now(),
                },
            );
    }

    /// Build the entry now from the operational variant.
    pub fn build(&self, selector: &VariantSelector, pass_id: u64) -> Option<Arc<[CachedSample]>> {
        let track = selector.select_track(pass_id)?;
        let samples: Arc<[CachedSample]> = track
            .points
            .iter()
            .map(|p| CachedSample {
                timestamp: p.timestamp,
                elevation_deg: p.elevation_deg,
                azimuth_deg: p.azimuth_deg,
            })
            .collect();
        log::debug!(
            "Built tracking data cache for pass {} ({}, {} samples)",
            pass_id,
            track.master.variant,
            samples.len()
        );
        self.insert(pass_id, samples.clone());
        Some(samples)
    }

    /// Rebuild off the calling thread. A build already in flight for the
    /// same pass absorbs the request.
    pub fn schedule_rebuild(self: &Arc<Self>, selector: VariantSelector, pass_id: u64) {
        let Some(slot) = self.claim(pass_id) else {
            return;
        };

        let cache = Arc::clone(self);
        let job = move || {
            let _slot = slot;
            if cache.build(&selector, pass_id).is_none() {
                log::debug!("Cache rebuild skipped, pass {} no longer exists", pass_id);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }

    fn claim(self: &Arc<Self>, pass_id: u64) -> Option<BuildSlot> {
        let mut building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        building.insert(pass_id).then(|| BuildSlot {
            cache: Arc::clone(self),
            pass_id,
        })
    }

    /// Drop expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.built_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks a pass as being rebuilt until dropped, also when the build panics.
struct BuildSlot {
    cache: Arc<TrackingDataCache>,
    pass_id: u64,
}

impl Drop for BuildSlot {
    fn drop(&mut self) {
        self.cache
            .building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.pass_id);
    }
}
